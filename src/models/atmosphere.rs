use crate::models::common::PhysicsConfig;

/// 密度の下限値（kg/m³）
const MIN_DENSITY: f64 = 1e-9;
/// 対流圏界面の高度（m）
const TROPOPAUSE_ALT: f64 = 11_000.0;
/// 成層圏下部（等温層）の上端高度（m）
const STRATOSPHERE_LOWER_ALT: f64 = 20_000.0;
/// 成層圏中部（逆転層）の上端高度（m）
const STRATOSPHERE_MID_ALT: f64 = 32_000.0;
/// 成層圏中部の気温増加率（K/m）
const STRATOSPHERE_MID_LAPSE: f64 = 0.001;
/// 32km以上の簡易モデルの下限気温（K）
const UPPER_MIN_TEMPERATURE: f64 = 186.87;
/// 32km以上の簡易モデルにおける海面気温からのオフセット（K）
const UPPER_TEMPERATURE_OFFSET: f64 = 71.5;
/// 32km以上の簡易モデルの気温増加率（K/m）
const UPPER_LAPSE: f64 = 0.0028;

/// 標準大気モデル
///
/// 高度から大気密度を求める4層の近似モデルです。
///
/// | 高度 | 気温 | 気圧 |
/// |------|------|------|
/// | 0–11km | 線形減少 | 静水圧平衡（べき乗則） |
/// | 11–20km | 一定 | 指数減少 |
/// | 20–32km | 線形増加 | 静水圧平衡（べき乗則） |
/// | 32km以上 | 固定オフセット気温 | 指数減少（簡易） |
///
/// 各層の基準値（11km・20kmでの気温と気圧）は `PhysicsConfig` の
/// 海面定数から生成時に一度だけ計算します。
#[derive(Debug, Clone)]
pub struct AtmosphereModel {
    gravity: f64,
    gas_constant: f64,
    sea_level_temperature: f64,
    sea_level_pressure: f64,
    lapse_rate: f64,
    tropopause_temperature: f64,
    tropopause_pressure: f64,
    stratosphere_mid_pressure: f64,
}

impl AtmosphereModel {
    pub fn new(config: &PhysicsConfig) -> Self {
        let gravity = config.gravity_magnitude();
        let gas_constant = config.gas_constant;
        let t0 = config.sea_level_temperature;
        let p0 = config.sea_level_pressure;
        let lapse_rate = config.lapse_rate;

        let tropopause_temperature = t0 + lapse_rate * TROPOPAUSE_ALT;
        let tropopause_pressure =
            p0 * (tropopause_temperature / t0).powf(-gravity / (lapse_rate * gas_constant));
        let stratosphere_mid_pressure = tropopause_pressure
            * (-gravity * (STRATOSPHERE_LOWER_ALT - TROPOPAUSE_ALT)
                / (gas_constant * tropopause_temperature))
                .exp();

        Self {
            gravity,
            gas_constant,
            sea_level_temperature: t0,
            sea_level_pressure: p0,
            lapse_rate,
            tropopause_temperature,
            tropopause_pressure,
            stratosphere_mid_pressure,
        }
    }

    /// 指定高度（m）での気温（K）と気圧（Pa）
    pub fn temperature_pressure(&self, altitude: f64) -> (f64, f64) {
        let g = self.gravity;
        let r = self.gas_constant;

        if altitude < TROPOPAUSE_ALT {
            let temperature = self.sea_level_temperature + self.lapse_rate * altitude;
            let ratio = temperature / self.sea_level_temperature;
            let pressure = self.sea_level_pressure * ratio.powf(-g / (self.lapse_rate * r));
            (temperature, pressure)
        } else if altitude < STRATOSPHERE_LOWER_ALT {
            let temperature = self.tropopause_temperature;
            let delta_h = altitude - TROPOPAUSE_ALT;
            let pressure = self.tropopause_pressure * (-g * delta_h / (r * temperature)).exp();
            (temperature, pressure)
        } else if altitude < STRATOSPHERE_MID_ALT {
            let base_temperature = self.tropopause_temperature;
            let temperature =
                base_temperature + STRATOSPHERE_MID_LAPSE * (altitude - STRATOSPHERE_LOWER_ALT);
            let ratio = temperature / base_temperature;
            let pressure =
                self.stratosphere_mid_pressure * ratio.powf(-g / (STRATOSPHERE_MID_LAPSE * r));
            (temperature, pressure)
        } else {
            let temperature = (self.sea_level_temperature - UPPER_TEMPERATURE_OFFSET
                + UPPER_LAPSE * (altitude - STRATOSPHERE_MID_ALT))
                .max(UPPER_MIN_TEMPERATURE);
            let pressure = self.sea_level_pressure * (-g * altitude / (r * temperature)).exp();
            (temperature, pressure)
        }
    }

    /// 指定高度（m）での大気密度（kg/m³）
    ///
    /// 理想気体の状態方程式 `ρ = p / (R·T)` で求め、常に正の値を返します。
    pub fn density(&self, altitude: f64) -> f64 {
        let (temperature, pressure) = self.temperature_pressure(altitude);
        let density = pressure / (self.gas_constant * temperature);
        if density.is_finite() {
            density.max(MIN_DENSITY)
        } else {
            MIN_DENSITY
        }
    }
}

impl Default for AtmosphereModel {
    fn default() -> Self {
        Self::new(&PhysicsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sea_level_density() {
        let atmosphere = AtmosphereModel::default();
        let rho = atmosphere.density(0.0);
        assert!((rho - 1.225).abs() < 1e-3, "rho0 = {}", rho);
    }

    #[test]
    fn test_band_reference_values() {
        let atmosphere = AtmosphereModel::default();
        let (t11, p11) = atmosphere.temperature_pressure(11_000.0);
        assert!((t11 - 216.65).abs() < 1e-9);
        assert!((p11 - 22_632.0).abs() < 50.0, "p11 = {}", p11);
        let (_, p20) = atmosphere.temperature_pressure(20_000.0);
        assert!((p20 - 5_474.9).abs() < 20.0, "p20 = {}", p20);
    }

    #[test]
    fn test_density_positive_and_monotonic_within_bands() {
        let atmosphere = AtmosphereModel::default();
        let bands = [
            (0.0, 10_999.0),
            (11_000.0, 19_999.0),
            (20_000.0, 31_999.0),
            (32_000.0, 50_000.0),
        ];
        for (lo, hi) in bands {
            let mut previous = f64::INFINITY;
            let mut h = lo;
            while h <= hi {
                let rho = atmosphere.density(h);
                assert!(rho > 0.0, "density at {} must be positive", h);
                assert!(rho <= previous, "density increased at {} m", h);
                previous = rho;
                h += 250.0;
            }
        }
    }

    #[test]
    fn test_density_floor() {
        let atmosphere = AtmosphereModel::default();
        assert!(atmosphere.density(1.0e7) >= MIN_DENSITY);
    }
}
