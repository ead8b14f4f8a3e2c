//! # guidsim
//!
//! 誘導ミサイルと機動ターゲットの3次元交戦シミュレータです。
//!
//! - [`models`]: ベクトル演算、大気モデル、ミサイル・ターゲットの運動、相対運動
//! - [`guidance`]: PN・PP・APN・OGL と利用者定義の誘導則
//! - [`simulation`]: 固定時間刻みの交戦ループと評価指標
//! - [`trace`]: 列指向の時系列記録
//! - [`scenario`]: YAMLシナリオとプリセット
//! - [`logging`]: tracing によるログ出力の設定

pub mod guidance;
pub mod logging;
pub mod models;
pub mod scenario;
pub mod simulation;
pub mod trace;
