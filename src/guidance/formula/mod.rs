// 独自誘導則の式言語
//
// ソース → トークン列 → 名前解決済みの構文木 → 評価、の順に処理します。
// 識別子はすべてコンパイル時に解決され、一覧にない名前はその時点で拒否されます。
pub mod ast;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;

pub use ast::Program;
pub use error::{EvalError, FormulaError};
pub use eval::{Inputs, evaluate};
pub use parser::compile;
