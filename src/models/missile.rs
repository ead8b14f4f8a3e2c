use crate::models::{
    atmosphere::AtmosphereModel,
    common::{PhysicsConfig, Vector3},
    traits::IMovable,
};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// ミサイルの運動状態
///
/// シミュレーション記録や終了結果に含まれるスナップショットです。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MissileState {
    /// 位置（m）
    pub position: Vector3,
    /// 速度（m/s）
    pub velocity: Vector3,
    /// 実現加速度（m/s²）。重力・抗力・推力を含む
    pub acceleration: Vector3,
    /// 姿勢（速度方向の単位ベクトル）
    pub attitude: Vector3,
    /// 速さ（m/s）
    pub speed: f64,
}

impl MissileState {
    pub fn new(position: Vector3, velocity: Vector3) -> Self {
        Self {
            position,
            velocity,
            acceleration: Vector3::ZERO,
            attitude: velocity.normalize(),
            speed: velocity.norm(),
        }
    }
}

impl IMovable for MissileState {
    fn get_position(&self) -> Vector3 {
        self.position
    }

    fn get_velocity(&self) -> Vector3 {
        self.velocity
    }

    fn get_acceleration(&self) -> Vector3 {
        self.acceleration
    }

    fn get_speed(&self) -> f64 {
        self.speed
    }
}

/// ミサイル諸元と初期状態
#[derive(Debug, Clone, PartialEq)]
pub struct MissileParams {
    /// 初期位置（m）
    pub position: Vector3,
    /// 初期速度（m/s）
    pub velocity: Vector3,
    /// 質量（kg）
    pub mass: f64,
    /// 推力（N）。速度方向に作用
    pub thrust: f64,
    /// 抗力係数
    pub drag_coefficient: f64,
    /// 参照面積（m²）
    pub reference_area: f64,
    /// 誘導指令の最大加速度（m/s²）
    pub max_acceleration: f64,
    /// 最小速度（m/s）
    pub min_velocity: f64,
}

impl MissileParams {
    /// 初期状態以外の諸元を `PhysicsConfig` の既定値で埋めて作成
    pub fn with_defaults(
        position: Vector3,
        velocity: Vector3,
        max_acceleration: f64,
        min_velocity: f64,
        physics: &PhysicsConfig,
    ) -> Self {
        Self {
            position,
            velocity,
            mass: physics.default_missile_mass,
            thrust: physics.default_missile_thrust,
            drag_coefficient: physics.default_drag_coefficient,
            reference_area: physics.default_reference_area,
            max_acceleration,
            min_velocity,
        }
    }

    /// 指定速度・高度での抗力加速度（速度と逆向き、m/s²）
    ///
    /// `-0.5·ρ·Cd·A·v²/m` を速度方向単位ベクトルに掛けたものです。
    /// 誘導則の抗力補償でも同じ式を使います。
    pub fn drag_acceleration(&self, velocity: Vector3, altitude: f64, atmosphere: &AtmosphereModel) -> Vector3 {
        let speed = velocity.norm();
        let density = atmosphere.density(altitude);
        let drag_force = 0.5 * density * self.drag_coefficient * self.reference_area * speed * speed;
        velocity.normalize() * (-drag_force / self.mass)
    }
}

/// ミサイル（迎撃体）の運動モデル
///
/// 誘導指令を受け取り、重力・抗力・推力を加えて状態を半陰的オイラー法で積分します。
/// 最大加速度の制限は誘導指令にのみ適用され、重力・抗力・推力には適用されません。
#[derive(Debug, Clone)]
pub struct Missile {
    pub state: MissileState,
    pub params: MissileParams,
    gravity: Vector3,
    atmosphere: AtmosphereModel,
}

impl Missile {
    /// 新しいミサイルを作成します
    ///
    /// # 引数
    ///
    /// * `params` - ミサイル諸元と初期状態
    /// * `physics` - 重力・大気の定数
    pub fn new(params: MissileParams, physics: &PhysicsConfig) -> Self {
        Self {
            state: MissileState::new(params.position, params.velocity),
            params,
            gravity: physics.gravity,
            atmosphere: AtmosphereModel::new(physics),
        }
    }

    /// 初期状態に戻す
    pub fn reset(&mut self) {
        self.state = MissileState::new(self.params.position, self.params.velocity);
    }

    /// 現在の状態
    pub fn state(&self) -> &MissileState {
        &self.state
    }

    /// 運動状態の更新
    ///
    /// 1. 誘導指令の飽和 → 2. 抗力 → 3. 推力 → 4. 合成加速度
    /// → 5. 速度積分と最小速度の保証 → 6. 位置・姿勢更新
    ///
    /// # 引数
    ///
    /// * `command` - 誘導指令加速度（飽和前、m/s²）
    /// * `dt` - 時間ステップ（秒）
    pub fn update(&mut self, command: Vector3, dt: f64) -> &MissileState {
        let velocity_dir = self.state.velocity.normalize();

        // 1. 誘導指令の飽和
        let limited_command = command.limit(self.params.max_acceleration);

        // 2. 大気抗力
        let drag = self
            .params
            .drag_acceleration(self.state.velocity, self.state.position.y, &self.atmosphere);

        // 3. 推力
        let thrust = velocity_dir * (self.params.thrust / self.params.mass);

        // 4. 合成加速度
        self.state.acceleration = limited_command + self.gravity + drag + thrust;

        // 5. 速度積分（方向を保ったまま最小速度を保証）
        self.state.velocity += self.state.acceleration * dt;
        if self.state.velocity.norm() < self.params.min_velocity {
            self.state.velocity = self.state.velocity.normalize() * self.params.min_velocity;
        }

        // 6. 位置・姿勢更新
        self.state.position += self.state.velocity * dt;
        self.state.attitude = self.state.velocity.normalize();
        self.state.speed = self.state.velocity.norm();

        trace!(
            position_x = self.state.position.x,
            position_y = self.state.position.y,
            position_z = self.state.position.z,
            speed = self.state.speed,
            command_magnitude = command.norm(),
            limited_magnitude = limited_command.norm(),
            "MISSILE_UPDATE"
        );

        &self.state
    }
}
