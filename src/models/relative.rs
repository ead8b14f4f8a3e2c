use crate::models::{
    common::{EPSILON, Vector3},
    traits::IMovable,
};
use serde::{Deserialize, Serialize};

/// ミサイルから見たターゲットの相対運動
///
/// 毎ステップ両者の状態から作り直され、前ステップの値は引き継ぎません。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeMotion {
    /// 相対位置（ターゲット − ミサイル、m）
    pub relative_position: Vector3,
    /// 相対速度（ターゲット − ミサイル、m/s）
    pub relative_velocity: Vector3,
    /// 視線（LOS）単位ベクトル
    pub los_vector: Vector3,
    /// 視線角速度ベクトル（rad/s）
    pub los_rate: Vector3,
    /// 接近速度（m/s、正で接近中）
    pub closing_velocity: f64,
    /// 残り時間の推定値（秒）
    pub time_to_go: f64,
    /// 相対距離（m）
    pub relative_distance: f64,
}

impl RelativeMotion {
    /// 相対運動の計算
    ///
    /// # 引数
    ///
    /// * `missile` - ミサイルの状態
    /// * `target` - ターゲットの状態
    /// * `max_time` - 接近していない場合に残り時間として使う値（秒）
    pub fn between(missile: &impl IMovable, target: &impl IMovable, max_time: f64) -> Self {
        let relative_position = target.get_position() - missile.get_position();
        let relative_velocity = target.get_velocity() - missile.get_velocity();
        let relative_distance = relative_position.norm();
        let los_vector = relative_position.normalize();

        let los_rate = if relative_distance < EPSILON {
            Vector3::ZERO
        } else {
            relative_position.cross(&relative_velocity) / (relative_distance * relative_distance)
        };

        let closing_velocity = -relative_velocity.dot(&los_vector);
        let time_to_go = estimate_time_to_go(
            relative_distance,
            closing_velocity,
            target.get_acceleration().norm(),
            max_time,
        );

        Self {
            relative_position,
            relative_velocity,
            los_vector,
            los_rate,
            closing_velocity,
            time_to_go,
            relative_distance,
        }
    }
}

/// 残り時間（time-to-go）の推定
///
/// ターゲットが加速している場合は機動による経路の曲がりを一次補正します。
fn estimate_time_to_go(distance: f64, closing_velocity: f64, target_accel: f64, max_time: f64) -> f64 {
    if closing_velocity <= EPSILON {
        return max_time;
    }
    let base = distance / closing_velocity;
    if target_accel < EPSILON {
        base
    } else {
        base * (1.0 + target_accel * distance / (2.0 * closing_velocity * closing_velocity))
    }
}
