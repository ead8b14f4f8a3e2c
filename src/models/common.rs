use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

/// 正規化時にゼロベクトルとみなす大きさの閾値
pub const EPSILON: f64 = 1e-6;

/// 3次元ベクトル
///
/// 位置（m）、速度（m/s）、加速度（m/s²）を共通に表します。
/// 座標系は右手系で、y軸が鉛直上向き（高度）です。
/// シリアライズ時は `[x, y, z]` の配列として表現されます。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const UNIT_X: Vector3 = Vector3 { x: 1.0, y: 0.0, z: 0.0 };
    pub const UNIT_Y: Vector3 = Vector3 { x: 0.0, y: 1.0, z: 0.0 };
    pub const UNIT_Z: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 1.0 };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// ベクトルの大きさ
    pub fn norm(&self) -> f64 {
        (self.x.powi(2) + self.y.powi(2) + self.z.powi(2)).sqrt()
    }

    /// 単位ベクトル化
    ///
    /// 大きさが `EPSILON` 未満の場合は `(1, 0, 0)` を返します。
    /// ゼロ除算によるNaNの伝播を防ぐための既定値で、エラーではありません。
    pub fn normalize(&self) -> Self {
        let mag = self.norm();
        if mag < EPSILON {
            Self::UNIT_X
        } else {
            *self / mag
        }
    }

    /// 内積
    pub fn dot(&self, other: &Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// 外積
    pub fn cross(&self, other: &Vector3) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// スカラー倍
    pub fn scale(&self, scalar: f64) -> Self {
        *self * scalar
    }

    /// 大きさ制限（最大値でクリップ）
    ///
    /// 大きさが `max` 以下ならそのまま、超える場合は方向を保って `max` に縮めます。
    pub fn limit(&self, max: f64) -> Self {
        let mag = self.norm();
        if mag <= max {
            *self
        } else {
            self.normalize() * max
        }
    }

    /// 2ベクトル間の角度（ラジアン）
    pub fn angle_between(&self, other: &Vector3) -> f64 {
        let mag_product = self.norm() * other.norm();
        if mag_product < EPSILON {
            return 0.0;
        }
        let cos_theta = (self.dot(other) / mag_product).clamp(-1.0, 1.0);
        cos_theta.acos()
    }

    /// `onto` 方向への射影
    pub fn project(&self, onto: &Vector3) -> Self {
        let dir = onto.normalize();
        dir * self.dot(&dir)
    }

    /// 単位ベクトル `axis` に垂直な成分（`axis` 方向成分を除去したもの）
    pub fn reject(&self, axis: &Vector3) -> Self {
        *self - *axis * self.dot(axis)
    }

    /// 任意軸まわりの回転（Rodriguesの回転公式）
    pub fn rotate_about(&self, axis: &Vector3, angle: f64) -> Self {
        let k = axis.normalize();
        let (sin, cos) = angle.sin_cos();
        *self * cos + k.cross(self) * sin + k * (k.dot(self) * (1.0 - cos))
    }

    /// 全成分が有限値かどうか
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f64; 3]> for Vector3 {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl From<Vector3> for [f64; 3] {
    fn from(v: Vector3) -> Self {
        [v.x, v.y, v.z]
    }
}

impl Add for Vector3 {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl AddAssign for Vector3 {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sub for Vector3 {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f64> for Vector3 {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self::Output {
        Self::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

impl Div<f64> for Vector3 {
    type Output = Self;

    fn div(self, scalar: f64) -> Self::Output {
        Self::new(self.x / scalar, self.y / scalar, self.z / scalar)
    }
}

impl Neg for Vector3 {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// 物理定数と機体デフォルト値
///
/// 重力・大気モデルの定数とミサイル諸元の既定値をまとめた設定値です。
/// 大気モデル、ミサイル運動、誘導則の各コンストラクタに参照で渡されます。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// 重力加速度ベクトル（m/s²）
    pub gravity: Vector3,
    /// 海面気圧（Pa）
    pub sea_level_pressure: f64,
    /// 海面気温（K）
    pub sea_level_temperature: f64,
    /// 対流圏の気温減率（K/m）
    pub lapse_rate: f64,
    /// 空気の気体定数（J/(kg·K)）
    pub gas_constant: f64,
    /// ミサイル質量の既定値（kg）
    pub default_missile_mass: f64,
    /// ミサイル推力の既定値（N）
    pub default_missile_thrust: f64,
    /// ミサイル抗力係数の既定値
    pub default_drag_coefficient: f64,
    /// ミサイル参照面積の既定値（m²）
    pub default_reference_area: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vector3::new(0.0, -9.81, 0.0),
            sea_level_pressure: 101_325.0,
            sea_level_temperature: 288.15,
            lapse_rate: -0.0065,
            gas_constant: 287.058,
            default_missile_mass: 100.0,
            default_missile_thrust: 0.0,
            default_drag_coefficient: 0.0,
            default_reference_area: 0.1,
        }
    }
}

impl PhysicsConfig {
    /// 重力加速度の大きさ（m/s²）
    pub fn gravity_magnitude(&self) -> f64 {
        self.gravity.norm()
    }
}
