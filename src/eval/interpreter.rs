//! Tree-walking interpreter for compiled expressions.

use super::ast::{BinaryOp, Expr, ExprKind, Key};
use super::{CompiledScript, Environment, EvaluationError, Position};
use crate::library::{display, type_name, Namespace};
use serde_json::{Map, Number, Value};

/// A parsed expression ready for evaluation.
#[derive(Debug, Clone)]
pub struct ExprScript {
    root: Expr,
}

impl ExprScript {
    pub fn new(root: Expr) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }
}

impl CompiledScript for ExprScript {
    fn evaluate(&self, env: &Environment, namespace: &Namespace) -> Result<Value, EvaluationError> {
        let mut frame = Frame {
            env,
            namespace,
            stack: Vec::new(),
        };
        frame.eval(&self.root)
    }
}

/// Per-evaluation state. Never shared between calls.
struct Frame<'a> {
    env: &'a Environment,
    namespace: &'a Namespace,
    stack: Vec<String>,
}

fn fail(message: impl Into<String>, position: Position) -> EvaluationError {
    EvaluationError::new(message, Some(position))
}

impl Frame<'_> {
    fn eval(&mut self, expr: &Expr) -> Result<Value, EvaluationError> {
        let position = expr.position;
        match &expr.kind {
            ExprKind::Literal(value) => Ok(value.clone()),
            ExprKind::Array(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            ExprKind::Object(fields) => {
                let mut object = Map::new();
                for (key, value) in fields {
                    let key = match key {
                        Key::Static(name) => name.clone(),
                        Key::Computed(expr) => match self.eval(expr)? {
                            Value::String(name) => name,
                            other => {
                                return Err(fail(
                                    format!("field name must be a string, found {}", type_name(&other)),
                                    expr.position,
                                ))
                            }
                        },
                    };
                    let value = self.eval(value)?;
                    object.insert(key, value);
                }
                Ok(Value::Object(object))
            }
            ExprKind::Identifier(name) => self
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| fail(format!("unbound identifier '{}'", name), position)),
            ExprKind::Member(target, field) => {
                match self.eval(target)? {
                    Value::Object(mut object) => Ok(object.remove(field).unwrap_or(Value::Null)),
                    Value::Null => Ok(Value::Null),
                    other => Err(fail(
                        format!("cannot read field '{}' of {}", field, type_name(&other)),
                        position,
                    )),
                }
            }
            ExprKind::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                index_value(target, &index, position)
            }
            ExprKind::Call {
                namespace,
                function,
                args,
            } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(namespace, function, &args, position)
            }
            ExprKind::Negate(operand) => match self.eval(operand)? {
                Value::Number(number) => negate(&number, position),
                other => Err(fail(format!("cannot negate {}", type_name(&other)), position)),
            },
            ExprKind::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, left, right, position)
            }
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => match self.eval(condition)? {
                Value::Bool(true) => self.eval(then_branch),
                Value::Bool(false) => self.eval(else_branch),
                other => Err(fail(
                    format!("condition must be a boolean, found {}", type_name(&other)),
                    condition.position,
                )),
            },
        }
    }

    fn call(
        &mut self,
        namespace: &str,
        function: &str,
        args: &[Value],
        position: Position,
    ) -> Result<Value, EvaluationError> {
        let name = format!("{}.{}", namespace, function);
        self.stack.push(name);
        let result = self.namespace.call(namespace, function, args);
        let outcome = result.map_err(|source| EvaluationError {
            message: format!("{}.{}: {}", namespace, function, source),
            position: Some(position),
            stack: self.stack.clone(),
            source: Some(source),
        });
        self.stack.pop();
        outcome
    }
}

fn index_value(target: Value, index: &Value, position: Position) -> Result<Value, EvaluationError> {
    match (target, index) {
        (Value::Array(mut items), Value::Number(number)) => {
            let len = items.len();
            let slot = number
                .as_u64()
                .and_then(|slot| usize::try_from(slot).ok())
                .filter(|slot| *slot < len)
                .ok_or_else(|| {
                    fail(format!("index {} out of bounds for array of length {}", number, len), position)
                })?;
            Ok(items.swap_remove(slot))
        }
        (Value::Object(mut object), Value::String(key)) => {
            Ok(object.remove(key).unwrap_or(Value::Null))
        }
        (Value::String(text), Value::Number(number)) => number
            .as_u64()
            .and_then(|slot| text.chars().nth(slot as usize))
            .map(|c| Value::String(c.to_string()))
            .ok_or_else(|| fail(format!("index {} out of bounds for string", number), position)),
        (Value::Null, _) => Ok(Value::Null),
        (target, index) => Err(fail(
            format!("cannot index {} with {}", type_name(&target), type_name(index)),
            position,
        )),
    }
}

fn float(value: f64, position: Position) -> Result<Value, EvaluationError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| fail("arithmetic produced a non-finite number", position))
}

fn negate(number: &Number, position: Position) -> Result<Value, EvaluationError> {
    if let Some(integer) = number.as_i64().and_then(i64::checked_neg) {
        return Ok(Value::from(integer));
    }
    float(-number.as_f64().unwrap_or(f64::NAN), position)
}

fn arithmetic(
    op: BinaryOp,
    left: &Number,
    right: &Number,
    position: Position,
) -> Result<Value, EvaluationError> {
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        let exact = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Subtract => a.checked_sub(b),
            BinaryOp::Multiply => a.checked_mul(b),
            BinaryOp::Divide if b == 0 => return Err(fail("division by zero", position)),
            BinaryOp::Divide if a.checked_rem(b) == Some(0) => a.checked_div(b),
            _ => None,
        };
        if let Some(result) = exact {
            return Ok(Value::from(result));
        }
    }

    let a = left.as_f64().unwrap_or(f64::NAN);
    let b = right.as_f64().unwrap_or(f64::NAN);
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide if b == 0.0 => return Err(fail("division by zero", position)),
        BinaryOp::Divide => a / b,
        BinaryOp::Equal | BinaryOp::NotEqual => {
            return Err(fail(format!("{} is not arithmetic", op.symbol()), position))
        }
    };
    float(result, position)
}

/// Equality with numbers compared by value, so `1 == 1.0`.
fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equals(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter().all(|(key, x)| b.get(key).map_or(false, |y| equals(x, y)))
        }
        _ => left == right,
    }
}

fn binary(op: BinaryOp, left: Value, right: Value, position: Position) -> Result<Value, EvaluationError> {
    match op {
        BinaryOp::Equal => return Ok(Value::Bool(equals(&left, &right))),
        BinaryOp::NotEqual => return Ok(Value::Bool(!equals(&left, &right))),
        _ => {}
    }

    match (op, left, right) {
        (_, Value::Number(a), Value::Number(b)) => arithmetic(op, &a, &b, position),
        (BinaryOp::Add, Value::String(a), b) => Ok(Value::String(a + &display(&b))),
        (BinaryOp::Add, a, Value::String(b)) => Ok(Value::String(display(&a) + &b)),
        (BinaryOp::Add, Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (BinaryOp::Add, Value::Object(mut a), Value::Object(b)) => {
            for (key, value) in b {
                a.insert(key, value);
            }
            Ok(Value::Object(a))
        }
        (op, a, b) => Err(fail(
            format!(
                "operator {} is not defined for {} and {}",
                op.symbol(),
                type_name(&a),
                type_name(&b)
            ),
            position,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{Evaluator, ExprEvaluator};
    use crate::formats::FormatRegistry;
    use crate::header::Header;
    use crate::library::{resolve, FunctionTable, Importer, Library, LibraryError, NoImports};
    use serde_json::json;
    use std::error::Error as _;
    use std::sync::Arc;

    struct Failing;

    impl Library for Failing {
        fn namespace(&self) -> &str {
            "failing"
        }

        fn functions(
            &self,
            _: &FormatRegistry,
            _: &Header,
            _: &Arc<dyn Importer>,
        ) -> Result<FunctionTable, LibraryError> {
            FunctionTable::new().with("boom", |_args| {
                Err(crate::library::FunctionError::failed("exploded"))
            })
        }
    }

    fn namespace() -> Namespace {
        let importer: Arc<dyn Importer> = Arc::new(NoImports);
        let supplied: Vec<Arc<dyn Library>> = vec![Arc::new(Failing)];
        resolve(&supplied, &[], &FormatRegistry::default(), &Header::default(), &importer).unwrap()
    }

    fn run(source: &str, payload: Value) -> Result<Value, EvaluationError> {
        let namespace = namespace();
        let script = ExprEvaluator.compile(source, &namespace).unwrap();
        script.evaluate(&Environment::new().with("payload", payload), &namespace)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(run("1 + 2 * 3", Value::Null).unwrap(), json!(7));
        assert_eq!(run("7 / 2", Value::Null).unwrap(), json!(3.5));
        assert_eq!(run("8 / 2", Value::Null).unwrap(), json!(4));
        assert_eq!(run("-payload", json!(3)).unwrap(), json!(-3));
        assert_eq!(run("1.5 + 1", Value::Null).unwrap(), json!(2.5));
        assert!(run("1 / 0", Value::Null).is_err());
    }

    #[test]
    fn test_integer_overflow_falls_back_to_float() {
        assert_eq!(
            run("payload / -1", json!(i64::MIN)).unwrap(),
            json!(9223372036854775808.0_f64)
        );
        assert_eq!(run("payload / 2", json!(i64::MIN)).unwrap(), json!(i64::MIN / 2));
        assert_eq!(
            run("payload * 2", json!(i64::MAX)).unwrap(),
            json!(i64::MAX as f64 * 2.0)
        );
    }

    #[test]
    fn test_concatenation_and_merge() {
        assert_eq!(run("'a' + 1", Value::Null).unwrap(), json!("a1"));
        assert_eq!(run("[1] + [2]", Value::Null).unwrap(), json!([1, 2]));
        assert_eq!(
            run("payload + {b: 3}", json!({"a": 1, "b": 2})).unwrap(),
            json!({"a": 1, "b": 3})
        );
        assert!(run("true + 1", Value::Null).is_err());
    }

    #[test]
    fn test_access() {
        let payload = json!({"items": [{"name": "x"}, {"name": "y"}], "k": "name"});
        assert_eq!(run("payload.items[1].name", payload.clone()).unwrap(), json!("y"));
        assert_eq!(run("payload.items[0][payload.k]", payload.clone()).unwrap(), json!("x"));
        assert_eq!(run("payload.missing.deeper", payload.clone()).unwrap(), Value::Null);
        assert!(run("payload.items[5]", payload.clone()).is_err());
        assert!(run("payload.k.x", payload).is_err());
    }

    #[test]
    fn test_conditionals_and_equality() {
        assert_eq!(run("if payload == 1.0 then 'one' else 'other'", json!(1)).unwrap(), json!("one"));
        assert_eq!(run("if [1, {a: 2}] != [1, {a: 2}] then 1 else 2", Value::Null).unwrap(), json!(2));
        let err = run("if payload then 1 else 2", json!("yes")).unwrap_err();
        assert_eq!(err.position, Some(Position { line: 1, column: 4 }));
    }

    #[test]
    fn test_unbound_identifier() {
        let err = run("payload + other", json!(1)).unwrap_err();
        assert!(err.message.contains("other"));
        assert_eq!(err.position, Some(Position { line: 1, column: 11 }));
    }

    #[test]
    fn test_native_failure_keeps_cause_and_stack() {
        let err = run("{ a: failing.boom() }", Value::Null).unwrap_err();
        assert_eq!(err.stack, vec!["failing.boom".to_string()]);
        assert_eq!(err.position, Some(Position { line: 1, column: 6 }));
        assert_eq!(err.source().map(|s| s.to_string()), Some("exploded".to_string()));
    }
}
