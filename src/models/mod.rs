// 基本的なデータ型と数学ユーティリティ
pub mod common;

// 運動状態を参照するインターフェース（trait）定義
pub mod traits;

// 物理モデル
pub mod atmosphere;
pub mod missile;
pub mod target;
pub mod relative;

// 便利な re-export
pub use atmosphere::AtmosphereModel;
pub use common::*;
pub use missile::{Missile, MissileParams, MissileState};
pub use relative::RelativeMotion;
pub use target::{
    CircularParams, EvasiveParams, MotionType, RandomParams, SineParams, SpiralParams, Target,
    TargetParams, TargetState, ZigzagParams,
};
pub use traits::*;
