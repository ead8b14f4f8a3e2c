use super::ast::{BinaryOp, Expr, Function, Program, UnaryOp, Variable};
use super::error::EvalError;
use crate::models::{
    common::{EPSILON, Vector3},
    missile::MissileState,
    relative::RelativeMotion,
    target::TargetState,
    traits::IMovable,
};

/// 評価中の値（スカラーまたは数値配列）
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Value {
    fn vector3(v: Vector3) -> Self {
        Value::Vector(vec![v.x, v.y, v.z])
    }

    fn describe(&self) -> String {
        match self {
            Value::Scalar(_) => "スカラー".to_string(),
            Value::Vector(v) => format!("長さ{}の配列", v.len()),
        }
    }

    fn scalar(&self, op: &'static str) -> Result<f64, EvalError> {
        match self {
            Value::Scalar(s) => Ok(*s),
            other => Err(EvalError::TypeMismatch { op, detail: format!("スカラーが必要ですが{}です", other.describe()) }),
        }
    }

    fn vector(&self, op: &'static str) -> Result<&[f64], EvalError> {
        match self {
            Value::Vector(v) => Ok(v),
            other => Err(EvalError::TypeMismatch { op, detail: format!("配列が必要ですが{}です", other.describe()) }),
        }
    }

    fn vector3_arg(&self, op: &'static str) -> Result<Vector3, EvalError> {
        let v = self.vector(op)?;
        if v.len() != 3 {
            return Err(EvalError::TypeMismatch { op, detail: format!("長さ3の配列が必要ですが長さ{}です", v.len()) });
        }
        Ok(Vector3::new(v[0], v[1], v[2]))
    }

    fn truthy(&self, op: &'static str) -> Result<bool, EvalError> {
        let s = self.scalar(op)?;
        Ok(s != 0.0 && !s.is_nan())
    }
}

fn boolean(b: bool) -> Value {
    Value::Scalar(if b { 1.0 } else { 0.0 })
}

/// 誘導則の評価に渡す入力（1ステップ分のスナップショット）
pub struct Inputs<'a> {
    pub missile: &'a MissileState,
    pub target: &'a TargetState,
    pub relative: &'a RelativeMotion,
    pub navigation_ratio: f64,
}

impl Inputs<'_> {
    fn variable(&self, variable: Variable) -> Value {
        match variable {
            Variable::NavigationRatio => Value::Scalar(self.navigation_ratio),
            Variable::RelativeDistance => Value::Scalar(self.relative.relative_distance),
            Variable::ClosingVelocity => Value::Scalar(self.relative.closing_velocity),
            Variable::TimeToGo => Value::Scalar(self.relative.time_to_go),
            Variable::MissileSpeed => Value::Scalar(self.missile.speed),
            Variable::TargetSpeed => Value::Scalar(self.target.get_speed()),
            Variable::LosRate => Value::vector3(self.relative.los_rate),
            Variable::LosVector => Value::vector3(self.relative.los_vector),
            Variable::RelativePosition => Value::vector3(self.relative.relative_position),
            Variable::RelativeVelocity => Value::vector3(self.relative.relative_velocity),
            Variable::MissilePosition => Value::vector3(self.missile.position),
            Variable::MissileVelocity => Value::vector3(self.missile.velocity),
            Variable::MissileAcceleration => Value::vector3(self.missile.acceleration),
            Variable::MissileAttitude => Value::vector3(self.missile.attitude),
            Variable::TargetPosition => Value::vector3(self.target.position),
            Variable::TargetVelocity => Value::vector3(self.target.velocity),
            Variable::TargetAcceleration => Value::vector3(self.target.acceleration),
        }
    }
}

/// プログラムを評価して加速度指令を返します
///
/// 戻り値が長さ3の有限な数値配列でない場合はエラーになります。
pub fn evaluate(program: &Program, inputs: &Inputs) -> Result<Vector3, EvalError> {
    let mut evaluator = Evaluator { inputs, locals: Vec::with_capacity(program.bindings.len()) };
    for (_, expr) in &program.bindings {
        let value = evaluator.eval(expr)?;
        evaluator.locals.push(value);
    }
    let result = evaluator.eval(&program.result)?;

    let values = match result {
        Value::Vector(v) if v.len() == 3 => v,
        other => return Err(EvalError::ResultShape { found: other.describe() }),
    };
    if values.iter().any(|v| !v.is_finite()) {
        return Err(EvalError::NonFinite { values });
    }
    Ok(Vector3::new(values[0], values[1], values[2]))
}

struct Evaluator<'a, 'b> {
    inputs: &'a Inputs<'b>,
    locals: Vec<Value>,
}

impl Evaluator<'_, '_> {
    fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Number(n) => Ok(Value::Scalar(*n)),
            Expr::Variable(v) => Ok(self.inputs.variable(*v)),
            Expr::Local(index) => Ok(self.locals[*index].clone()),
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?.scalar("[]")?);
                }
                Ok(Value::Vector(values))
            }
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?.scalar("[]")?;
                let values = target.vector("[]")?;
                if index < 0.0 || index.fract() != 0.0 || index >= values.len() as f64 {
                    return Err(EvalError::IndexOutOfRange { index, len: values.len() });
                }
                Ok(Value::Scalar(values[index as usize]))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Plus => Ok(value),
                    UnaryOp::Neg => Ok(map(value, |x| -x)),
                    UnaryOp::Not => Ok(boolean(!value.truthy("!")?)),
                }
            }
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                Ok(boolean(self.eval(lhs)?.truthy("&&")? && self.eval(rhs)?.truthy("&&")?))
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                Ok(boolean(self.eval(lhs)?.truthy("||")? || self.eval(rhs)?.truthy("||")?))
            }
            Expr::Binary(op, lhs, rhs) => binary(*op, self.eval(lhs)?, self.eval(rhs)?),
            Expr::Conditional(condition, then, otherwise) => {
                if self.eval(condition)?.truthy("?:")? {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Call(function, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                call(*function, values)
            }
        }
    }
}

fn map(value: Value, f: impl Fn(f64) -> f64) -> Value {
    match value {
        Value::Scalar(s) => Value::Scalar(f(s)),
        Value::Vector(v) => Value::Vector(v.into_iter().map(f).collect()),
    }
}

/// 要素ごとの演算（配列と配列は同じ長さ、配列とスカラーはブロードキャスト）
fn elementwise(lhs: Value, rhs: Value, f: impl Fn(f64, f64) -> f64) -> Result<Value, EvalError> {
    match (lhs, rhs) {
        (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(f(a, b))),
        (Value::Vector(a), Value::Scalar(b)) => Ok(Value::Vector(a.into_iter().map(|x| f(x, b)).collect())),
        (Value::Scalar(a), Value::Vector(b)) => Ok(Value::Vector(b.into_iter().map(|x| f(a, x)).collect())),
        (Value::Vector(a), Value::Vector(b)) => {
            if a.len() != b.len() {
                return Err(EvalError::LengthMismatch { left: a.len(), right: b.len() });
            }
            Ok(Value::Vector(a.into_iter().zip(b).map(|(x, y)| f(x, y)).collect()))
        }
    }
}

fn compare(op: BinaryOp, lhs: Value, rhs: Value, f: impl Fn(f64, f64) -> bool) -> Result<Value, EvalError> {
    let a = lhs.scalar(op.symbol())?;
    let b = rhs.scalar(op.symbol())?;
    Ok(boolean(f(a, b)))
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Add => elementwise(lhs, rhs, |a, b| a + b),
        BinaryOp::Sub => elementwise(lhs, rhs, |a, b| a - b),
        BinaryOp::Mul => elementwise(lhs, rhs, |a, b| a * b),
        BinaryOp::Div => elementwise(lhs, rhs, |a, b| a / b),
        BinaryOp::Rem => elementwise(lhs, rhs, |a, b| a % b),
        BinaryOp::Lt => compare(op, lhs, rhs, |a, b| a < b),
        BinaryOp::Le => compare(op, lhs, rhs, |a, b| a <= b),
        BinaryOp::Gt => compare(op, lhs, rhs, |a, b| a > b),
        BinaryOp::Ge => compare(op, lhs, rhs, |a, b| a >= b),
        BinaryOp::Eq => compare(op, lhs, rhs, |a, b| a == b),
        BinaryOp::Ne => compare(op, lhs, rhs, |a, b| a != b),
        // 通常は Evaluator::eval で短絡評価される
        BinaryOp::And => Ok(boolean(lhs.truthy("&&")? && rhs.truthy("&&")?)),
        BinaryOp::Or => Ok(boolean(lhs.truthy("||")? || rhs.truthy("||")?)),
    }
}

fn call(function: Function, args: Vec<Value>) -> Result<Value, EvalError> {
    let mut args = args.into_iter();
    let mut next = || args.next().unwrap_or(Value::Scalar(f64::NAN));

    let value = match function {
        Function::Abs => map(next(), f64::abs),
        Function::Acos => map(next(), f64::acos),
        Function::Asin => map(next(), f64::asin),
        Function::Atan => map(next(), f64::atan),
        Function::Ceil => map(next(), f64::ceil),
        Function::Cos => map(next(), f64::cos),
        Function::Exp => map(next(), f64::exp),
        Function::Floor => map(next(), f64::floor),
        Function::Log => map(next(), f64::ln),
        Function::Log10 => map(next(), f64::log10),
        Function::Round => map(next(), |x| (x + 0.5).floor()),
        Function::Sin => map(next(), f64::sin),
        Function::Sqrt => map(next(), f64::sqrt),
        Function::Tan => map(next(), f64::tan),
        Function::Sign => map(next(), |x| if x > 0.0 { 1.0 } else if x < 0.0 { -1.0 } else { x }),
        Function::Atan2 => {
            let y = next().scalar("atan2")?;
            let x = next().scalar("atan2")?;
            Value::Scalar(y.atan2(x))
        }
        Function::Pow => elementwise(next(), next(), f64::powf)?,
        Function::Max | Function::Min => {
            let name = if function == Function::Max { "max" } else { "min" };
            let mut result = next().scalar(name)?;
            for arg in args {
                let x = arg.scalar(name)?;
                result = if function == Function::Max { result.max(x) } else { result.min(x) };
            }
            Value::Scalar(result)
        }
        Function::Norm => {
            let v = next();
            Value::Scalar(v.vector("norm")?.iter().map(|x| x * x).sum::<f64>().sqrt())
        }
        Function::Dot => {
            let (a, b) = (next(), next());
            let (a, b) = (a.vector("dot")?, b.vector("dot")?);
            if a.len() != b.len() {
                return Err(EvalError::LengthMismatch { left: a.len(), right: b.len() });
            }
            Value::Scalar(a.iter().zip(b).map(|(x, y)| x * y).sum())
        }
        Function::Cross => {
            let a = next().vector3_arg("cross")?;
            let b = next().vector3_arg("cross")?;
            Value::vector3(a.cross(&b))
        }
        Function::Normalize => {
            // 誘導則の中では退化したベクトルを方向なし（ゼロ）として扱う
            let v = next().vector3_arg("normalize")?;
            if v.norm() <= EPSILON {
                Value::vector3(Vector3::ZERO)
            } else {
                Value::vector3(v.normalize())
            }
        }
        Function::Multiply => elementwise(next(), next(), |a, b| a * b)?,
        Function::Add => elementwise(next(), next(), |a, b| a + b)?,
        Function::Subtract => elementwise(next(), next(), |a, b| a - b)?,
        Function::Limit => {
            let v = next().vector3_arg("limit")?;
            let max = next().scalar("limit")?;
            Value::vector3(v.limit(max))
        }
        Function::Project => {
            let a = next().vector3_arg("project")?;
            let b = next().vector3_arg("project")?;
            Value::vector3(a.project(&b))
        }
        Function::Angle => {
            let a = next().vector3_arg("angle")?;
            let b = next().vector3_arg("angle")?;
            if a.norm() < EPSILON || b.norm() < EPSILON {
                Value::Scalar(0.0)
            } else {
                Value::Scalar(a.angle_between(&b))
            }
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guidance::formula::compile;
    use std::collections::BTreeMap;

    fn fixture() -> (MissileState, TargetState, RelativeMotion) {
        let missile = MissileState::new(Vector3::ZERO, Vector3::new(300.0, 0.0, 0.0));
        let target = TargetState {
            position: Vector3::new(1000.0, 0.0, 0.0),
            velocity: Vector3::new(-200.0, 0.0, 0.0),
            acceleration: Vector3::ZERO,
        };
        let relative = RelativeMotion::between(&missile, &target, 30.0);
        (missile, target, relative)
    }

    fn run(source: &str) -> Result<Vector3, EvalError> {
        let (missile, target, relative) = fixture();
        let program = compile(source, &BTreeMap::new()).unwrap();
        let inputs = Inputs { missile: &missile, target: &target, relative: &relative, navigation_ratio: 3.0 };
        evaluate(&program, &inputs)
    }

    #[test]
    fn test_variables_and_arithmetic() {
        let v = run("[N * 2, r, Vc]").unwrap();
        assert_eq!(v, Vector3::new(6.0, 1000.0, 500.0));

        let v = run("multiply(losVector, missileSpeed) + [0, 1, 0]").unwrap();
        assert!((v.x - 300.0).abs() < 1e-9);
        assert!((v.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pn_formula_matches_closed_form() {
        let v = run("let k = N * Vc; return multiply(cross(losRate, losVector), k);").unwrap();
        // 衝突コースでは視線角速度がゼロ
        assert!(v.norm() < 1e-12);
    }

    #[test]
    fn test_conditional_and_indexing() {
        let v = run("r > 500 ? [relativePos[0], 0, 0] : [0, 0, 0]").unwrap();
        assert_eq!(v, Vector3::new(1000.0, 0.0, 0.0));
        let v = run("[!(r < 1) && Vc > 0, 1 || 0, 7 % 4]").unwrap();
        assert_eq!(v, Vector3::new(1.0, 1.0, 3.0));
    }

    #[test]
    fn test_wrong_shape_is_an_error() {
        assert!(matches!(run("[1, 2]"), Err(EvalError::ResultShape { .. })));
        assert!(matches!(run("N"), Err(EvalError::ResultShape { .. })));
        assert!(matches!(run("[1, 0, 0] / 0"), Err(EvalError::NonFinite { .. })));
        assert!(matches!(run("[1, 2] + [1, 2, 3]"), Err(EvalError::LengthMismatch { .. })));
        assert!(matches!(run("[losVector[3], 0, 0]"), Err(EvalError::IndexOutOfRange { .. })));
        assert!(matches!(run("[N < losVector, 0, 0]"), Err(EvalError::TypeMismatch { .. })));
    }

    #[test]
    fn test_normalize_of_degenerate_vector_is_zero() {
        assert_eq!(run("normalize([0, 0, 0])").unwrap(), Vector3::ZERO);
        assert_eq!(run("normalize([1e-9, 0, 0])").unwrap(), Vector3::ZERO);
        // 指令に使っても方向が生じない
        assert_eq!(run("multiply(normalize(subtract(losVector, losVector)), 100)").unwrap(), Vector3::ZERO);
    }

    #[test]
    fn test_math_functions() {
        let v = run("[Math.max(1, 5, 3), sign(-2), norm([3, 4, 0])]").unwrap();
        assert_eq!(v, Vector3::new(5.0, -1.0, 5.0));
        let v = run("limit([3, 4, 0], 3)").unwrap();
        assert!((v - Vector3::new(1.8, 2.4, 0.0)).norm() < 1e-12);
        let v = run("normalize([0, 3, 4])").unwrap();
        assert!((v - Vector3::new(0.0, 0.6, 0.8)).norm() < 1e-12);
        let v = run("[round(2.5), round(-2.5), atan2(1, 1) * 4 / PI]").unwrap();
        assert_eq!(v.x, 3.0);
        assert_eq!(v.y, -2.0);
        assert!((v.z - 1.0).abs() < 1e-12);
    }
}
