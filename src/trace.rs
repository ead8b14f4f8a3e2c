use crate::models::{
    common::Vector3, missile::MissileState, relative::RelativeMotion, target::TargetState,
};
use serde::Serialize;

/// 軸ごとに分けたベクトルの時系列
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Vector3Series {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl Vector3Series {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, v: Vector3) {
        self.x.push(v.x);
        self.y.push(v.y);
        self.z.push(v.z);
    }

    fn clear(&mut self) {
        self.x.clear();
        self.y.clear();
        self.z.clear();
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Vector3> {
        Some(Vector3::new(*self.x.get(index)?, *self.y.get(index)?, *self.z.get(index)?))
    }
}

/// 1回の交戦の時系列記録
///
/// 各ステップの積分前の状態を列指向で保持し、そのままグラフ描画に使えます。
/// 終了時の最後の記録には誘導指令がないため、`command` は他の列より1つ短くなります。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationTrace {
    pub time: Vec<f64>,

    pub missile_position: Vector3Series,
    pub missile_velocity: Vector3Series,
    pub missile_acceleration: Vector3Series,
    pub missile_attitude: Vector3Series,
    pub missile_speed: Vec<f64>,

    pub target_position: Vector3Series,
    pub target_velocity: Vector3Series,
    pub target_acceleration: Vector3Series,

    pub relative_position: Vector3Series,
    pub relative_velocity: Vector3Series,
    pub los_vector: Vector3Series,
    pub los_rate: Vector3Series,
    pub closing_velocity: Vec<f64>,
    pub time_to_go: Vec<f64>,
    pub relative_distance: Vec<f64>,

    /// 誘導指令加速度（飽和前）
    pub command: Vector3Series,
}

impl SimulationTrace {
    /// 記録数を見込んで領域を確保
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            time: Vec::with_capacity(capacity),
            missile_position: Vector3Series::with_capacity(capacity),
            missile_velocity: Vector3Series::with_capacity(capacity),
            missile_acceleration: Vector3Series::with_capacity(capacity),
            missile_attitude: Vector3Series::with_capacity(capacity),
            missile_speed: Vec::with_capacity(capacity),
            target_position: Vector3Series::with_capacity(capacity),
            target_velocity: Vector3Series::with_capacity(capacity),
            target_acceleration: Vector3Series::with_capacity(capacity),
            relative_position: Vector3Series::with_capacity(capacity),
            relative_velocity: Vector3Series::with_capacity(capacity),
            los_vector: Vector3Series::with_capacity(capacity),
            los_rate: Vector3Series::with_capacity(capacity),
            closing_velocity: Vec::with_capacity(capacity),
            time_to_go: Vec::with_capacity(capacity),
            relative_distance: Vec::with_capacity(capacity),
            command: Vector3Series::with_capacity(capacity),
        }
    }

    pub(crate) fn push(
        &mut self,
        time: f64,
        missile: &MissileState,
        target: &TargetState,
        relative: &RelativeMotion,
        command: Option<Vector3>,
    ) {
        self.time.push(time);

        self.missile_position.push(missile.position);
        self.missile_velocity.push(missile.velocity);
        self.missile_acceleration.push(missile.acceleration);
        self.missile_attitude.push(missile.attitude);
        self.missile_speed.push(missile.speed);

        self.target_position.push(target.position);
        self.target_velocity.push(target.velocity);
        self.target_acceleration.push(target.acceleration);

        self.relative_position.push(relative.relative_position);
        self.relative_velocity.push(relative.relative_velocity);
        self.los_vector.push(relative.los_vector);
        self.los_rate.push(relative.los_rate);
        self.closing_velocity.push(relative.closing_velocity);
        self.time_to_go.push(relative.time_to_go);
        self.relative_distance.push(relative.relative_distance);

        if let Some(command) = command {
            self.command.push(command);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.time.clear();
        self.missile_position.clear();
        self.missile_velocity.clear();
        self.missile_acceleration.clear();
        self.missile_attitude.clear();
        self.missile_speed.clear();
        self.target_position.clear();
        self.target_velocity.clear();
        self.target_acceleration.clear();
        self.relative_position.clear();
        self.relative_velocity.clear();
        self.los_vector.clear();
        self.los_rate.clear();
        self.closing_velocity.clear();
        self.time_to_go.clear();
        self.relative_distance.clear();
        self.command.clear();
    }

    /// 記録数
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// i 番目の記録の指令の大きさ（指令のない記録は 0）
    pub fn command_magnitude(&self, index: usize) -> f64 {
        self.command.get(index).map_or(0.0, |c| c.norm())
    }
}
