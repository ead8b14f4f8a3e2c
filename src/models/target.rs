use crate::models::{common::Vector3, traits::IMovable};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// ターゲットの運動状態
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetState {
    /// 位置（m）
    pub position: Vector3,
    /// 速度（m/s）
    pub velocity: Vector3,
    /// 機動加速度（m/s²）
    pub acceleration: Vector3,
}

impl IMovable for TargetState {
    fn get_position(&self) -> Vector3 {
        self.position
    }

    fn get_velocity(&self) -> Vector3 {
        self.velocity
    }

    fn get_acceleration(&self) -> Vector3 {
        self.acceleration
    }
}

/// 円運動のパラメータ
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircularParams {
    /// 角速度（rad/s）
    pub omega: f64,
    /// 旋回中心（m）
    pub center: Vector3,
}

impl Default for CircularParams {
    fn default() -> Self {
        Self { omega: 0.1, center: Vector3::ZERO }
    }
}

/// 正弦機動のパラメータ
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SineParams {
    /// 振幅（m）
    pub amplitude: f64,
    /// 角周波数（rad/s）
    pub frequency: f64,
    /// 初期位相（rad）
    pub phase: f64,
}

impl Default for SineParams {
    fn default() -> Self {
        Self { amplitude: 100.0, frequency: 0.5, phase: 0.0 }
    }
}

/// ランダム機動のパラメータ
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomParams {
    /// 各軸の最大加速度（m/s²）
    pub max_accel: f64,
    /// 平滑化係数（0〜1、大きいほど新しい乱数の比重が大きい）
    pub smooth_factor: f64,
}

impl Default for RandomParams {
    fn default() -> Self {
        Self { max_accel: 50.0, smooth_factor: 0.3 }
    }
}

/// 回避機動のパラメータ
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvasiveParams {
    /// 角周波数（rad/s）
    pub frequency: f64,
    /// 加速度振幅（m/s²）
    pub amplitude: f64,
}

impl Default for EvasiveParams {
    fn default() -> Self {
        Self { frequency: 1.0, amplitude: 100.0 }
    }
}

/// ジグザグ機動のパラメータ
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZigzagParams {
    /// 横加速度の大きさ（m/s²）
    pub amplitude: f64,
    /// 切り替え頻度（Hz）。`1/frequency` 秒ごとに向きが反転
    pub frequency: f64,
}

impl Default for ZigzagParams {
    fn default() -> Self {
        Self { amplitude: 100.0, frequency: 1.0 }
    }
}

/// 螺旋機動のパラメータ
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiralParams {
    /// 角周波数（rad/s）
    pub frequency: f64,
    /// 固定軸（z）方向の振動振幅（m/s²）
    pub amplitude: f64,
    /// 半径の増加率（m/s）
    pub growth: f64,
}

impl Default for SpiralParams {
    fn default() -> Self {
        Self { frequency: 0.5, amplitude: 50.0, growth: 0.1 }
    }
}

/// ターゲットの機動パターン
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MotionType {
    /// 等速直線運動
    #[default]
    Constant,
    /// 指定中心まわりの円運動
    Circular(CircularParams),
    /// 直交2軸の正弦機動（位相差90°）
    Sine(SineParams),
    /// 平滑化ランダム機動
    Random(RandomParams),
    /// 速度に垂直な平面内の回避機動
    Evasive(EvasiveParams),
    /// ジグザグ機動
    Zigzag(ZigzagParams),
    /// 外向き螺旋機動
    Spiral(SpiralParams),
}

impl MotionType {
    /// 表示用の名称
    pub fn name(&self) -> &'static str {
        match self {
            MotionType::Constant => "constant",
            MotionType::Circular(_) => "circular",
            MotionType::Sine(_) => "sine",
            MotionType::Random(_) => "random",
            MotionType::Evasive(_) => "evasive",
            MotionType::Zigzag(_) => "zigzag",
            MotionType::Spiral(_) => "spiral",
        }
    }
}

/// ターゲットの初期状態と機動設定
#[derive(Debug, Clone, PartialEq)]
pub struct TargetParams {
    pub position: Vector3,
    pub velocity: Vector3,
    pub motion: MotionType,
}

/// 機動ターゲット
///
/// 抗力・推力・質量を持たない自由機動の質点として扱います。
/// 選択された機動パターンから加速度を求め、陽的オイラー法で速度と位置を積分します。
/// ミサイルと異なり最小速度の制限はありません。
#[derive(Debug, Clone)]
pub struct Target {
    pub state: TargetState,
    pub params: TargetParams,
    /// 機動開始からの経過時間（秒）
    pub time: f64,
    /// 前ステップの加速度（ランダム機動の平滑化用）
    pub previous_accel: Vector3,
    /// ジグザグ機動の現在の向き（±1）
    pub zigzag_direction: f64,
    /// ジグザグ機動の次の切り替え時刻（秒）
    pub zigzag_switch_time: f64,
    seed: u64,
    rng: ChaCha8Rng,
}

impl Target {
    /// 新しいターゲットを作成します
    ///
    /// # 引数
    ///
    /// * `params` - 初期状態と機動設定
    /// * `seed` - ランダム機動用の乱数シード。同じシードなら同じ軌跡になる
    pub fn new(params: TargetParams, seed: u64) -> Self {
        Self {
            state: TargetState {
                position: params.position,
                velocity: params.velocity,
                acceleration: Vector3::ZERO,
            },
            params,
            time: 0.0,
            previous_accel: Vector3::ZERO,
            zigzag_direction: 1.0,
            zigzag_switch_time: 0.0,
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// 初期状態に戻す（乱数列も最初から）
    pub fn reset(&mut self) {
        *self = Self::new(self.params.clone(), self.seed);
    }

    /// 現在の状態
    pub fn state(&self) -> &TargetState {
        &self.state
    }

    /// 運動状態の更新
    ///
    /// # 引数
    ///
    /// * `dt` - 時間ステップ（秒）
    pub fn update(&mut self, dt: f64) -> &TargetState {
        self.time += dt;
        self.state.acceleration = self.maneuver_acceleration();

        self.state.velocity += self.state.acceleration * dt;
        self.state.position += self.state.velocity * dt;

        &self.state
    }

    /// 現在の機動パターンによる加速度
    fn maneuver_acceleration(&mut self) -> Vector3 {
        let t = self.time;
        match self.params.motion {
            MotionType::Constant => Vector3::ZERO,
            MotionType::Circular(p) => {
                let relative = self.state.position - p.center;
                relative * (-p.omega * p.omega)
            }
            MotionType::Sine(p) => {
                let gain = -p.amplitude * p.frequency * p.frequency;
                let angle = p.frequency * t + p.phase;
                Vector3::new(0.0, gain * angle.sin(), gain * (angle + FRAC_PI_2).sin())
            }
            MotionType::Random(p) => {
                let random = Vector3::new(
                    self.rng.gen_range(-1.0f64..=1.0) * p.max_accel,
                    self.rng.gen_range(-1.0f64..=1.0) * p.max_accel,
                    self.rng.gen_range(-1.0f64..=1.0) * p.max_accel,
                );
                let accel = self.previous_accel * (1.0 - p.smooth_factor) + random * p.smooth_factor;
                self.previous_accel = accel;
                accel
            }
            MotionType::Evasive(p) => {
                let (p1, p2) = perpendicular_basis(self.state.velocity);
                let phase = p.frequency * t;
                p1 * (p.amplitude * phase.sin()) + p2 * (p.amplitude * phase.cos())
            }
            MotionType::Zigzag(p) => {
                if t >= self.zigzag_switch_time {
                    self.zigzag_direction = -self.zigzag_direction;
                    self.zigzag_switch_time = t + 1.0 / p.frequency;
                }
                Vector3::new(0.0, self.zigzag_direction * p.amplitude, 0.0)
            }
            MotionType::Spiral(p) => {
                let radius = p.growth * t;
                let phase = p.frequency * t;
                let gain = -p.frequency * p.frequency * radius;
                Vector3::new(gain * phase.cos(), gain * phase.sin(), p.amplitude * phase.sin())
            }
        }
    }
}

/// 速度方向に垂直な直交単位ベクトルの組
///
/// 速度方向となるべく平行でない基準軸との外積から求めます。
fn perpendicular_basis(velocity: Vector3) -> (Vector3, Vector3) {
    let dir = velocity.normalize();
    let reference = if dir.y.abs() < 0.9 { Vector3::UNIT_Y } else { Vector3::UNIT_X };
    let p1 = dir.cross(&reference).normalize();
    let p2 = dir.cross(&p1);
    (p1, p2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_with(motion: MotionType) -> Target {
        Target::new(
            TargetParams {
                position: Vector3::new(5000.0, 3000.0, 1000.0),
                velocity: Vector3::new(-200.0, 0.0, 0.0),
                motion,
            },
            7,
        )
    }

    #[test]
    fn test_constant_motion() {
        let mut target = target_with(MotionType::Constant);
        for _ in 0..100 {
            target.update(0.01);
        }
        let state = target.state();
        assert_eq!(state.acceleration, Vector3::ZERO);
        assert!((state.position.x - 4800.0).abs() < 1e-6);
        assert_eq!(state.velocity, Vector3::new(-200.0, 0.0, 0.0));
    }

    #[test]
    fn test_circular_points_to_center() {
        let center = Vector3::new(5000.0, 3000.0, 0.0);
        let mut target = target_with(MotionType::Circular(CircularParams { omega: 0.2, center }));
        let state = *target.update(0.01);
        let expected = (Vector3::new(5000.0, 3000.0, 1000.0) - center) * -0.04;
        assert!((state.acceleration - expected).norm() < 1e-9);
    }

    #[test]
    fn test_sine_axes_are_phase_shifted() {
        let mut target = target_with(MotionType::Sine(SineParams::default()));
        let state = *target.update(0.1);
        assert_eq!(state.acceleration.x, 0.0);
        let gain = -100.0 * 0.25;
        assert!((state.acceleration.y - gain * (0.05f64).sin()).abs() < 1e-9);
        assert!((state.acceleration.z - gain * (0.05f64).cos()).abs() < 1e-9);
    }

    #[test]
    fn test_random_is_bounded_and_reproducible() {
        let params = RandomParams { max_accel: 40.0, smooth_factor: 0.5 };
        let mut a = target_with(MotionType::Random(params));
        let mut b = target_with(MotionType::Random(params));
        for _ in 0..200 {
            let sa = *a.update(0.01);
            let sb = *b.update(0.01);
            assert_eq!(sa, sb);
            for c in [sa.acceleration.x, sa.acceleration.y, sa.acceleration.z] {
                assert!(c.abs() <= 40.0);
            }
        }
        a.reset();
        let first_after_reset = *a.update(0.01);
        let mut c = target_with(MotionType::Random(params));
        assert_eq!(first_after_reset, *c.update(0.01));
    }

    #[test]
    fn test_evasive_is_perpendicular_to_velocity() {
        let mut target = target_with(MotionType::Evasive(EvasiveParams::default()));
        for _ in 0..50 {
            let velocity_before = target.state().velocity;
            let state = *target.update(0.01);
            let along = state.acceleration.dot(&velocity_before.normalize());
            assert!(along.abs() < 1e-9, "along-track component {}", along);
            assert!((state.acceleration.norm() - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_zigzag_flips_every_period() {
        let params = ZigzagParams { amplitude: 30.0, frequency: 2.0 };
        let mut target = target_with(MotionType::Zigzag(params));
        // 最初のステップで反転して -1 になる
        assert_eq!(target.update(0.1).acceleration.y, -30.0);
        for _ in 0..3 {
            assert_eq!(target.update(0.1).acceleration.y, -30.0);
        }
        // t = 0.5 で切り替え時刻（0.1 + 0.5 = 0.6）に到達する前後
        let mut signs = Vec::new();
        for _ in 0..10 {
            signs.push(target.update(0.1).acceleration.y.signum());
        }
        assert!(signs.contains(&1.0));
        assert!(signs.contains(&-1.0));
    }

    #[test]
    fn test_spiral_radius_grows() {
        let params = SpiralParams::default();
        let mut target = target_with(MotionType::Spiral(params));
        let early = target.update(1.0).acceleration;
        for _ in 0..20 {
            target.update(1.0);
        }
        let late = target.state().acceleration;
        let planar = |v: Vector3| (v.x * v.x + v.y * v.y).sqrt();
        assert!(planar(late) > planar(early));
    }

    #[test]
    fn test_motion_yaml() {
        let motion: MotionType = serde_yaml::from_str("type: circular\nomega: 0.3\n").unwrap();
        assert_eq!(
            motion,
            MotionType::Circular(CircularParams { omega: 0.3, center: Vector3::ZERO })
        );
        let motion: MotionType = serde_yaml::from_str("type: constant\n").unwrap();
        assert_eq!(motion, MotionType::Constant);
        assert_eq!(MotionType::Zigzag(ZigzagParams::default()).name(), "zigzag");
    }
}
