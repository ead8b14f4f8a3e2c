//! # Guidance モジュール
//!
//! ミサイルとターゲットの状態、相対運動から誘導指令加速度を計算します。
//!
//! ## 誘導則
//!
//! - **PN**: 比例航法 `N·Vc·(Ω × LOS)`
//! - **PP**: 純追尾。LOS方向の速度ベクトルへ時定数 0.1 秒で追従
//! - **APN**: PN + ターゲット加速度（LOS直交成分）の `N/2` 倍
//! - **OGL**: PN + 残り時間で重み付けしたターゲット加速度補償
//! - **custom**: 利用者が式言語で記述した誘導則（[`formula`] を参照）
//!
//! PN・APN・OGL には重力と抗力の補償項を共通に加えます。
//! 計算した指令は飽和前の値であり、最大加速度による制限はミサイル側で行います。

pub mod formula;

use crate::models::{
    atmosphere::AtmosphereModel,
    common::{EPSILON, PhysicsConfig, Vector3},
    missile::Missile,
    relative::RelativeMotion,
    target::TargetState,
};
use formula::{FormulaError, Inputs, Program};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// 純追尾の速度追従時定数（秒）
const PURSUIT_TIME_CONSTANT: f64 = 0.1;

fn default_navigation_ratio() -> f64 {
    3.0
}

/// 誘導則の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LawType {
    #[serde(rename = "PN")]
    ProportionalNavigation,
    #[serde(rename = "PP")]
    PurePursuit,
    #[serde(rename = "APN")]
    AugmentedProportionalNavigation,
    #[serde(rename = "OGL")]
    OptimalGuidance,
    #[serde(rename = "custom")]
    Custom,
}

impl LawType {
    pub fn name(&self) -> &'static str {
        match self {
            LawType::ProportionalNavigation => "PN",
            LawType::PurePursuit => "PP",
            LawType::AugmentedProportionalNavigation => "APN",
            LawType::OptimalGuidance => "OGL",
            LawType::Custom => "custom",
        }
    }
}

/// シナリオの `guidance` セクション
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidanceSettings {
    pub law: LawType,
    /// 航法比
    #[serde(rename = "N", default = "default_navigation_ratio")]
    pub navigation_ratio: f64,
    /// 独自誘導則から `params.NAME` で参照する値
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
    /// 独自誘導則のソース
    #[serde(default)]
    pub custom_source: Option<String>,
}

impl Default for GuidanceSettings {
    fn default() -> Self {
        Self {
            law: LawType::ProportionalNavigation,
            navigation_ratio: default_navigation_ratio(),
            params: BTreeMap::new(),
            custom_source: None,
        }
    }
}

/// 利用者定義の誘導則
///
/// ソースは登録時に一度だけコンパイルされ、ソースが変わった場合にのみ再コンパイルされます。
/// 評価に失敗したステップの指令はゼロベクトルになり、失敗回数が記録されます。
#[derive(Debug, Clone)]
pub struct CustomLaw {
    source: String,
    navigation_ratio: f64,
    params: BTreeMap<String, f64>,
    program: Option<Program>,
    failures: Cell<u64>,
}

impl CustomLaw {
    /// ソースをコンパイルして誘導則を作成
    pub fn compile(
        source: &str,
        navigation_ratio: f64,
        params: BTreeMap<String, f64>,
    ) -> Result<Self, FormulaError> {
        let program = formula::compile(source, &params)?;
        Ok(Self {
            source: source.to_string(),
            navigation_ratio,
            params,
            program: Some(program),
            failures: Cell::new(0),
        })
    }

    /// ソースの差し替え
    ///
    /// 同じソースであれば何もしません。コンパイルに失敗した場合、
    /// 正しいソースが登録されるまでこの誘導則は常にゼロ指令を返します。
    pub fn set_source(&mut self, source: &str) -> Result<(), FormulaError> {
        if self.source == source && self.program.is_some() {
            return Ok(());
        }
        self.source = source.to_string();
        match formula::compile(source, &self.params) {
            Ok(program) => {
                self.program = Some(program);
                Ok(())
            }
            Err(e) => {
                self.program = None;
                Err(e)
            }
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_compiled(&self) -> bool {
        self.program.is_some()
    }

    /// 評価に失敗した回数
    pub fn failures(&self) -> u64 {
        self.failures.get()
    }

    fn evaluate(&self, missile: &Missile, target: &TargetState, relative: &RelativeMotion) -> Vector3 {
        let Some(program) = &self.program else {
            self.failures.set(self.failures.get() + 1);
            warn!(failures = self.failures.get(), "CUSTOM_GUIDANCE_FAILED: 誘導則がコンパイルされていません");
            return Vector3::ZERO;
        };

        let inputs = Inputs {
            missile: missile.state(),
            target,
            relative,
            navigation_ratio: self.navigation_ratio,
        };
        match formula::evaluate(program, &inputs) {
            Ok(command) => command,
            Err(e) => {
                self.failures.set(self.failures.get() + 1);
                warn!(failures = self.failures.get(), "CUSTOM_GUIDANCE_FAILED: {}", e);
                Vector3::ZERO
            }
        }
    }
}

/// 誘導則（種類ごとのパラメータを保持）
#[derive(Debug, Clone)]
pub enum GuidanceLaw {
    ProportionalNavigation { navigation_ratio: f64 },
    PurePursuit,
    AugmentedProportionalNavigation { navigation_ratio: f64 },
    OptimalGuidance { navigation_ratio: f64 },
    Custom(CustomLaw),
}

impl GuidanceLaw {
    pub fn law_type(&self) -> LawType {
        match self {
            GuidanceLaw::ProportionalNavigation { .. } => LawType::ProportionalNavigation,
            GuidanceLaw::PurePursuit => LawType::PurePursuit,
            GuidanceLaw::AugmentedProportionalNavigation { .. } => LawType::AugmentedProportionalNavigation,
            GuidanceLaw::OptimalGuidance { .. } => LawType::OptimalGuidance,
            GuidanceLaw::Custom(_) => LawType::Custom,
        }
    }
}

/// 誘導指令の計算器
///
/// 重力と大気モデルは `PhysicsConfig` から構築時に受け取ります。
/// ミサイル・ターゲットの状態は参照するだけで変更しません。
#[derive(Debug, Clone)]
pub struct GuidanceStrategy {
    law: GuidanceLaw,
    gravity: Vector3,
    atmosphere: AtmosphereModel,
}

impl GuidanceStrategy {
    pub fn new(law: GuidanceLaw, physics: &PhysicsConfig) -> Self {
        match &law {
            GuidanceLaw::Custom(custom) => debug!(
                law = law.law_type().name(),
                source_length = custom.source().len(),
                "GUIDANCE_LAW_REGISTERED"
            ),
            _ => debug!(law = law.law_type().name(), "GUIDANCE_LAW_REGISTERED"),
        }
        Self {
            law,
            gravity: physics.gravity,
            atmosphere: AtmosphereModel::new(physics),
        }
    }

    /// シナリオ設定から誘導則を構築
    ///
    /// 独自誘導則のソースがない、またはコンパイルできない場合はエラーを返します。
    pub fn from_settings(settings: &GuidanceSettings, physics: &PhysicsConfig) -> Result<Self, FormulaError> {
        let n = settings.navigation_ratio;
        let law = match settings.law {
            LawType::ProportionalNavigation => GuidanceLaw::ProportionalNavigation { navigation_ratio: n },
            LawType::PurePursuit => GuidanceLaw::PurePursuit,
            LawType::AugmentedProportionalNavigation => {
                GuidanceLaw::AugmentedProportionalNavigation { navigation_ratio: n }
            }
            LawType::OptimalGuidance => GuidanceLaw::OptimalGuidance { navigation_ratio: n },
            LawType::Custom => {
                let source = settings.custom_source.as_deref().unwrap_or_default();
                GuidanceLaw::Custom(CustomLaw::compile(source, n, settings.params.clone())?)
            }
        };
        Ok(Self::new(law, physics))
    }

    pub fn law(&self) -> &GuidanceLaw {
        &self.law
    }

    pub fn law_mut(&mut self) -> &mut GuidanceLaw {
        &mut self.law
    }

    /// 独自誘導則の評価失敗回数（他の誘導則では 0）
    pub fn custom_failures(&self) -> u64 {
        match &self.law {
            GuidanceLaw::Custom(custom) => custom.failures(),
            _ => 0,
        }
    }

    /// 誘導指令加速度の計算（飽和前、m/s²）
    ///
    /// # 引数
    ///
    /// * `missile` - ミサイル（状態と抗力諸元を参照）
    /// * `target` - ターゲットの状態
    /// * `relative` - 現在の相対運動
    pub fn compute(&self, missile: &Missile, target: &TargetState, relative: &RelativeMotion) -> Vector3 {
        match &self.law {
            GuidanceLaw::ProportionalNavigation { navigation_ratio } => {
                if relative.closing_velocity < EPSILON {
                    return Vector3::ZERO;
                }
                proportional_term(*navigation_ratio, relative) + self.compensation(missile, relative)
            }
            GuidanceLaw::PurePursuit => {
                let state = missile.state();
                let desired_velocity = relative.los_vector * state.speed;
                (desired_velocity - state.velocity) / PURSUIT_TIME_CONSTANT
            }
            GuidanceLaw::AugmentedProportionalNavigation { navigation_ratio } => {
                if relative.closing_velocity < EPSILON {
                    return Vector3::ZERO;
                }
                let target_term = target.acceleration.reject(&relative.los_vector) * (navigation_ratio / 2.0);
                proportional_term(*navigation_ratio, relative) + target_term + self.compensation(missile, relative)
            }
            GuidanceLaw::OptimalGuidance { navigation_ratio } => {
                let n = *navigation_ratio;
                let tgo = relative.time_to_go;
                let vc = relative.closing_velocity;
                if vc < EPSILON || tgo < EPSILON {
                    return Vector3::ZERO;
                }
                let weight = n / 2.0 * (1.0 - 2.0 / (n * tgo * vc));
                let target_term = target.acceleration.reject(&relative.los_vector) * weight;
                proportional_term(n, relative) + target_term + self.compensation(missile, relative)
            }
            GuidanceLaw::Custom(custom) => custom.evaluate(missile, target, relative),
        }
    }

    /// 重力と抗力の補償項
    ///
    /// LOSに直交する重力成分を打ち消し、ミサイル自身の諸元から求めた抗力を打ち消します。
    fn compensation(&self, missile: &Missile, relative: &RelativeMotion) -> Vector3 {
        let state = missile.state();
        let gravity_normal = self.gravity.reject(&relative.los_vector);
        let drag = missile
            .params
            .drag_acceleration(state.velocity, state.position.y, &self.atmosphere);
        -gravity_normal - drag
    }
}

/// 比例航法の基本項 `N·Vc·(Ω × LOS)`
fn proportional_term(navigation_ratio: f64, relative: &RelativeMotion) -> Vector3 {
    relative.los_rate.cross(&relative.los_vector) * (navigation_ratio * relative.closing_velocity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::missile::MissileParams;

    fn no_gravity() -> PhysicsConfig {
        PhysicsConfig { gravity: Vector3::ZERO, ..PhysicsConfig::default() }
    }

    fn missile(position: Vector3, velocity: Vector3, physics: &PhysicsConfig) -> Missile {
        Missile::new(MissileParams::with_defaults(position, velocity, 200.0, 50.0, physics), physics)
    }

    fn target(position: Vector3, velocity: Vector3, acceleration: Vector3) -> TargetState {
        TargetState { position, velocity, acceleration }
    }

    fn command(law: GuidanceLaw, physics: &PhysicsConfig, m: &Missile, t: &TargetState) -> Vector3 {
        let relative = RelativeMotion::between(m.state(), t, 30.0);
        GuidanceStrategy::new(law, physics).compute(m, t, &relative)
    }

    #[test]
    fn test_pn_zero_on_collision_course() {
        let physics = no_gravity();
        let m = missile(Vector3::ZERO, Vector3::new(300.0, 0.0, 0.0), &physics);
        let t = target(Vector3::new(5000.0, 0.0, 0.0), Vector3::new(-200.0, 0.0, 0.0), Vector3::ZERO);
        let cmd = command(GuidanceLaw::ProportionalNavigation { navigation_ratio: 4.0 }, &physics, &m, &t);
        assert!(cmd.norm() < 1e-12);
    }

    #[test]
    fn test_gravity_compensation() {
        let physics = PhysicsConfig::default();
        let m = missile(Vector3::ZERO, Vector3::new(300.0, 0.0, 0.0), &physics);
        let t = target(Vector3::new(5000.0, 0.0, 0.0), Vector3::new(-200.0, 0.0, 0.0), Vector3::ZERO);
        let cmd = command(GuidanceLaw::ProportionalNavigation { navigation_ratio: 3.0 }, &physics, &m, &t);
        // LOSが水平なので重力はすべて打ち消される（抗力係数の既定値は 0）
        assert!((cmd - Vector3::new(0.0, 9.81, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn test_drag_compensation_uses_missile_params() {
        let physics = no_gravity();
        let mut m = missile(Vector3::ZERO, Vector3::new(300.0, 0.0, 0.0), &physics);
        m.params.drag_coefficient = 0.3;
        let t = target(Vector3::new(5000.0, 0.0, 0.0), Vector3::new(-200.0, 0.0, 0.0), Vector3::ZERO);
        let cmd = command(GuidanceLaw::ProportionalNavigation { navigation_ratio: 3.0 }, &physics, &m, &t);
        let rho = AtmosphereModel::new(&physics).density(0.0);
        let expected = 0.5 * rho * 0.3 * 0.1 * 300.0 * 300.0 / 100.0;
        assert!(expected > 16.0);
        assert!((cmd.x - expected).abs() < 1e-9);
        assert!(cmd.y.abs() < 1e-12 && cmd.z.abs() < 1e-12);
    }

    #[test]
    fn test_not_closing_returns_zero() {
        let physics = PhysicsConfig::default();
        let m = missile(Vector3::ZERO, Vector3::new(100.0, 0.0, 0.0), &physics);
        let t = target(Vector3::new(1000.0, 500.0, 0.0), Vector3::new(400.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 30.0));
        for law in [
            GuidanceLaw::ProportionalNavigation { navigation_ratio: 3.0 },
            GuidanceLaw::AugmentedProportionalNavigation { navigation_ratio: 3.0 },
            GuidanceLaw::OptimalGuidance { navigation_ratio: 3.0 },
        ] {
            assert_eq!(command(law, &physics, &m, &t), Vector3::ZERO);
        }
    }

    #[test]
    fn test_pn_crossing_target() {
        let physics = no_gravity();
        let m = missile(Vector3::ZERO, Vector3::new(300.0, 0.0, 0.0), &physics);
        let t = target(Vector3::new(3000.0, 0.0, 1000.0), Vector3::new(0.0, 0.0, 100.0), Vector3::ZERO);
        let relative = RelativeMotion::between(m.state(), &t, 30.0);
        let cmd = command(GuidanceLaw::ProportionalNavigation { navigation_ratio: 3.0 }, &physics, &m, &t);
        // 指令はLOSに直交し、ターゲットの移動方向側を向く
        assert!(cmd.dot(&relative.los_vector).abs() < 1e-9);
        assert!(cmd.z > 0.0);
    }

    #[test]
    fn test_apn_adds_target_acceleration_term() {
        let physics = no_gravity();
        let m = missile(Vector3::ZERO, Vector3::new(300.0, 0.0, 0.0), &physics);
        let t = target(Vector3::new(5000.0, 0.0, 0.0), Vector3::new(-200.0, 0.0, 0.0), Vector3::new(5.0, 20.0, 0.0));
        let cmd = command(GuidanceLaw::AugmentedProportionalNavigation { navigation_ratio: 4.0 }, &physics, &m, &t);
        // LOS方向成分（x）は除かれ、直交成分の N/2 倍
        assert!((cmd - Vector3::new(0.0, 40.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn test_ogl_weighting() {
        let physics = no_gravity();
        let m = missile(Vector3::ZERO, Vector3::new(300.0, 0.0, 0.0), &physics);
        let t = target(Vector3::new(5000.0, 0.0, 0.0), Vector3::new(-200.0, 0.0, 0.0), Vector3::new(0.0, 20.0, 0.0));
        let relative = RelativeMotion::between(m.state(), &t, 30.0);
        let cmd = command(GuidanceLaw::OptimalGuidance { navigation_ratio: 4.0 }, &physics, &m, &t);
        let weight = 2.0 * (1.0 - 2.0 / (4.0 * relative.time_to_go * 500.0));
        assert!((cmd.y - 20.0 * weight).abs() < 1e-9);
        assert!(cmd.y < 40.0);
    }

    #[test]
    fn test_pure_pursuit() {
        let physics = PhysicsConfig::default();
        let m = missile(Vector3::ZERO, Vector3::new(300.0, 0.0, 0.0), &physics);
        let t = target(Vector3::new(0.0, 1000.0, 0.0), Vector3::ZERO, Vector3::ZERO);
        let cmd = command(GuidanceLaw::PurePursuit, &physics, &m, &t);
        assert!((cmd - Vector3::new(-3000.0, 3000.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn test_custom_law_matches_pn() {
        let physics = no_gravity();
        let m = missile(Vector3::ZERO, Vector3::new(300.0, 0.0, 0.0), &physics);
        let t = target(Vector3::new(3000.0, 500.0, 1000.0), Vector3::new(-50.0, 0.0, 100.0), Vector3::ZERO);
        let custom = CustomLaw::compile("multiply(cross(losRate, losVector), N * Vc)", 3.0, BTreeMap::new()).unwrap();
        let pn = command(GuidanceLaw::ProportionalNavigation { navigation_ratio: 3.0 }, &physics, &m, &t);
        let cmd = command(GuidanceLaw::Custom(custom), &physics, &m, &t);
        assert!((cmd - pn).norm() < 1e-9);
    }

    #[test]
    fn test_custom_runtime_failure_yields_zero() {
        let physics = PhysicsConfig::default();
        let m = missile(Vector3::ZERO, Vector3::new(300.0, 0.0, 0.0), &physics);
        let t = target(Vector3::new(5000.0, 0.0, 0.0), Vector3::ZERO, Vector3::ZERO);
        let relative = RelativeMotion::between(m.state(), &t, 30.0);
        let custom = CustomLaw::compile("[1, 2]", 3.0, BTreeMap::new()).unwrap();
        let strategy = GuidanceStrategy::new(GuidanceLaw::Custom(custom), &physics);

        assert_eq!(strategy.compute(&m, &t, &relative), Vector3::ZERO);
        assert_eq!(strategy.compute(&m, &t, &relative), Vector3::ZERO);
        assert_eq!(strategy.custom_failures(), 2);

        let mut strategy = strategy;
        if let GuidanceLaw::Custom(custom) = strategy.law_mut() {
            custom.set_source("[0, 0, 1]").unwrap();
        }
        assert_eq!(strategy.compute(&m, &t, &relative), Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(strategy.custom_failures(), 2);
    }

    #[test]
    fn test_custom_source_recompiles_only_on_change() {
        let mut custom = CustomLaw::compile("[0, 0, 1]", 3.0, BTreeMap::new()).unwrap();
        assert!(custom.set_source("[0, 0, 1]").is_ok());

        let err = custom.set_source("eval('x')").unwrap_err();
        assert!(matches!(err, FormulaError::Forbidden { .. }));
        assert!(!custom.is_compiled());

        custom.set_source("[0, 0, 2]").unwrap();
        assert!(custom.is_compiled());
        assert_eq!(custom.source(), "[0, 0, 2]");
    }

    #[test]
    fn test_oversized_formula_fails_at_registration() {
        let source = format!("[{}1, 0, 0]", "1+".repeat(20_000));
        let err = CustomLaw::compile(&source, 3.0, BTreeMap::new()).unwrap_err();
        assert!(matches!(err, FormulaError::Syntax { .. }));

        let settings = GuidanceSettings {
            law: LawType::Custom,
            custom_source: Some(source),
            ..GuidanceSettings::default()
        };
        assert!(GuidanceStrategy::from_settings(&settings, &PhysicsConfig::default()).is_err());
    }

    #[test]
    fn test_from_settings() {
        let yaml = "law: custom\nN: 4\nparams:\n  gain: 2.0\ncustom_source: \"[params.gain, N, 0]\"\n";
        let settings: GuidanceSettings = serde_yaml::from_str(yaml).unwrap();
        let strategy = GuidanceStrategy::from_settings(&settings, &PhysicsConfig::default()).unwrap();
        assert_eq!(strategy.law().law_type(), LawType::Custom);

        let settings: GuidanceSettings = serde_yaml::from_str("law: APN").unwrap();
        assert_eq!(settings.navigation_ratio, 3.0);

        let missing = GuidanceSettings { law: LawType::Custom, ..GuidanceSettings::default() };
        assert!(matches!(
            GuidanceStrategy::from_settings(&missing, &PhysicsConfig::default()),
            Err(FormulaError::EmptySource)
        ));
    }
}
