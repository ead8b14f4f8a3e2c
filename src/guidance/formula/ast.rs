/// 解決済みの式
///
/// 識別子はコンパイル時にすべて組み込み変数・局所変数・関数・定数のいずれかに
/// 解決されるため、評価時に名前を引くことはありません。
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(Variable),
    /// `let` で束縛された局所変数（束縛順の番号）
    Local(usize),
    Array(Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// 誘導則から参照できる組み込み変数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    NavigationRatio,
    RelativeDistance,
    ClosingVelocity,
    TimeToGo,
    MissileSpeed,
    TargetSpeed,
    LosRate,
    LosVector,
    RelativePosition,
    RelativeVelocity,
    MissilePosition,
    MissileVelocity,
    MissileAcceleration,
    MissileAttitude,
    TargetPosition,
    TargetVelocity,
    TargetAcceleration,
}

impl Variable {
    /// 名前空間なしで参照できる変数
    pub fn lookup(name: &str) -> Option<Self> {
        let variable = match name {
            "N" => Variable::NavigationRatio,
            "r" => Variable::RelativeDistance,
            "Vc" => Variable::ClosingVelocity,
            "timeToGo" => Variable::TimeToGo,
            "missileSpeed" => Variable::MissileSpeed,
            "targetSpeed" => Variable::TargetSpeed,
            "losRate" => Variable::LosRate,
            "losVector" => Variable::LosVector,
            "relativePos" => Variable::RelativePosition,
            "relativeVel" => Variable::RelativeVelocity,
            _ => return None,
        };
        Some(variable)
    }

    /// `missile.X` / `target.X` / `relativeMotion.X` 形式の参照
    pub fn lookup_member(namespace: &str, member: &str) -> Option<Self> {
        let variable = match (namespace, member) {
            ("missile", "position") => Variable::MissilePosition,
            ("missile", "velocity") => Variable::MissileVelocity,
            ("missile", "acceleration") => Variable::MissileAcceleration,
            ("missile", "attitude") => Variable::MissileAttitude,
            ("missile", "speed") => Variable::MissileSpeed,
            ("target", "position") => Variable::TargetPosition,
            ("target", "velocity") => Variable::TargetVelocity,
            ("target", "acceleration") => Variable::TargetAcceleration,
            ("target", "speed") => Variable::TargetSpeed,
            ("relativeMotion", "relativePosition") => Variable::RelativePosition,
            ("relativeMotion", "relativeVelocity") => Variable::RelativeVelocity,
            ("relativeMotion", "losVector") => Variable::LosVector,
            ("relativeMotion", "losRate") => Variable::LosRate,
            ("relativeMotion", "closingVelocity") => Variable::ClosingVelocity,
            ("relativeMotion", "timeToGo") => Variable::TimeToGo,
            ("relativeMotion", "relativeDistance") => Variable::RelativeDistance,
            _ => return None,
        };
        Some(variable)
    }
}

/// 名前空間として使える識別子
pub const NAMESPACES: &[&str] = &["missile", "target", "relativeMotion", "params", "Math"];

/// 組み込み定数
pub fn lookup_constant(name: &str) -> Option<f64> {
    match name {
        "PI" => Some(std::f64::consts::PI),
        "E" => Some(std::f64::consts::E),
        _ => None,
    }
}

/// 組み込み関数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Acos,
    Asin,
    Atan,
    Atan2,
    Ceil,
    Cos,
    Exp,
    Floor,
    Log,
    Log10,
    Max,
    Min,
    Pow,
    Round,
    Sin,
    Sqrt,
    Tan,
    Sign,
    Norm,
    Dot,
    Cross,
    Normalize,
    Multiply,
    Add,
    Subtract,
    Limit,
    Project,
    Angle,
}

pub struct FunctionSignature {
    pub name: &'static str,
    pub function: Function,
    pub min_args: usize,
    /// `None` は可変長
    pub max_args: Option<usize>,
}

const fn signature(name: &'static str, function: Function, min_args: usize, max_args: Option<usize>) -> FunctionSignature {
    FunctionSignature { name, function, min_args, max_args }
}

/// 誘導則から呼び出せる関数の一覧
///
/// 乱数・入出力を含む関数は登録しません。
pub const FUNCTIONS: &[FunctionSignature] = &[
    signature("abs", Function::Abs, 1, Some(1)),
    signature("acos", Function::Acos, 1, Some(1)),
    signature("asin", Function::Asin, 1, Some(1)),
    signature("atan", Function::Atan, 1, Some(1)),
    signature("atan2", Function::Atan2, 2, Some(2)),
    signature("ceil", Function::Ceil, 1, Some(1)),
    signature("cos", Function::Cos, 1, Some(1)),
    signature("exp", Function::Exp, 1, Some(1)),
    signature("floor", Function::Floor, 1, Some(1)),
    signature("log", Function::Log, 1, Some(1)),
    signature("log10", Function::Log10, 1, Some(1)),
    signature("max", Function::Max, 1, None),
    signature("min", Function::Min, 1, None),
    signature("pow", Function::Pow, 2, Some(2)),
    signature("round", Function::Round, 1, Some(1)),
    signature("sin", Function::Sin, 1, Some(1)),
    signature("sqrt", Function::Sqrt, 1, Some(1)),
    signature("tan", Function::Tan, 1, Some(1)),
    signature("sign", Function::Sign, 1, Some(1)),
    signature("norm", Function::Norm, 1, Some(1)),
    signature("dot", Function::Dot, 2, Some(2)),
    signature("cross", Function::Cross, 2, Some(2)),
    signature("normalize", Function::Normalize, 1, Some(1)),
    signature("multiply", Function::Multiply, 2, Some(2)),
    signature("add", Function::Add, 2, Some(2)),
    signature("subtract", Function::Subtract, 2, Some(2)),
    signature("limit", Function::Limit, 2, Some(2)),
    signature("project", Function::Project, 2, Some(2)),
    signature("angle", Function::Angle, 2, Some(2)),
];

pub fn lookup_function(name: &str) -> Option<&'static FunctionSignature> {
    FUNCTIONS.iter().find(|f| f.name == name)
}

/// コンパイル済みの誘導則プログラム
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// `let` 束縛の名前と式（宣言順）
    pub bindings: Vec<(String, Expr)>,
    /// 戻り値の式
    pub result: Expr,
}
