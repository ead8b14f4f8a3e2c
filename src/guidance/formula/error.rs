use thiserror::Error;

/// 独自誘導則のコンパイルエラー
///
/// 登録時に呼び出し側へ返されます。修正されるまでその誘導則は使用できません。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("誘導則のソースが空です")]
    EmptySource,

    #[error("禁止された識別子 '{name}' が使われています (位置 {offset})")]
    Forbidden { name: String, offset: usize },

    #[error("未定義の識別子 '{name}' (位置 {offset})")]
    UnknownIdentifier { name: String, offset: usize },

    #[error("未定義のパラメータ 'params.{name}' (位置 {offset})")]
    UnknownParameter { name: String, offset: usize },

    #[error("関数 '{name}' の引数の数が不正です: {found} 個 (期待値 {expected})")]
    Arity { name: String, expected: String, found: usize },

    #[error("構文エラー (位置 {offset}): {message}")]
    Syntax { offset: usize, message: String },
}

/// 独自誘導則の実行時エラー
///
/// シミュレーションループには伝播せず、そのステップの指令をゼロベクトルに置き換えます。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("演算 '{op}' の型が不正です: {detail}")]
    TypeMismatch { op: &'static str, detail: String },

    #[error("ベクトルの長さが一致しません: {left} と {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("添字 {index} が範囲外です (長さ {len})")]
    IndexOutOfRange { index: f64, len: usize },

    #[error("戻り値は長さ3の数値配列である必要があります ({found})")]
    ResultShape { found: String },

    #[error("戻り値に有限でない値が含まれています: {values:?}")]
    NonFinite { values: Vec<f64> },
}
