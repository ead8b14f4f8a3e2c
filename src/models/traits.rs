use crate::models::common::Vector3;

/// 移動体（質点）の運動状態を参照するインターフェース
///
/// 相対運動の計算はこのインターフェースだけに依存するため、
/// ミサイルとターゲットのどちらの組み合わせでも同じ計算を使えます。
pub trait IMovable {
    /// 現在位置の取得（m）
    fn get_position(&self) -> Vector3;

    /// 現在速度の取得（m/s）
    fn get_velocity(&self) -> Vector3;

    /// 現在加速度の取得（m/s²）
    fn get_acceleration(&self) -> Vector3;

    /// 現在の速さ（m/s）
    fn get_speed(&self) -> f64 {
        self.get_velocity().norm()
    }
}
