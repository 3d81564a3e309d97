//! Static type checking and tree-walking evaluation.

use super::parser::{BinOp, Expr, UnaryOp};
use super::{CompileError, Env, EvalError, Kind, Value};

/// Infer the result kind of `expr` against the declared environment.
/// Every variable must be declared; operand kinds must line up.
pub(super) fn check(expr: &Expr, env: &Env) -> Result<Kind, CompileError> {
    match expr {
        Expr::Int(_) => Ok(Kind::Int),
        Expr::Str(_) => Ok(Kind::Str),
        Expr::Bool(_) => Ok(Kind::Bool),
        Expr::Var(name) => env
            .kind_of(name)
            .ok_or_else(|| CompileError::Type(format!("undeclared variable `{name}`"))),
        Expr::Unary(UnaryOp::Neg, operand) => match check(operand, env)? {
            Kind::Int => Ok(Kind::Int),
            k => Err(CompileError::Type(format!("unary `-` expects int, got {k}"))),
        },
        Expr::Unary(UnaryOp::Not, operand) => match check(operand, env)? {
            Kind::Bool => Ok(Kind::Bool),
            k => Err(CompileError::Type(format!("`!` expects bool, got {k}"))),
        },
        Expr::Binary(op, lhs, rhs) => {
            let l = check(lhs, env)?;
            let r = check(rhs, env)?;
            match op {
                BinOp::Add => match (l, r) {
                    (Kind::Int, Kind::Int) => Ok(Kind::Int),
                    (Kind::Str, Kind::Str) => Ok(Kind::Str),
                    _ => Err(binary_mismatch(*op, l, r)),
                },
                BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => match (l, r) {
                    (Kind::Int, Kind::Int) => Ok(Kind::Int),
                    _ => Err(binary_mismatch(*op, l, r)),
                },
                BinOp::Eq | BinOp::Ne => {
                    if l == r {
                        Ok(Kind::Bool)
                    } else {
                        Err(binary_mismatch(*op, l, r))
                    }
                }
                BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => match (l, r) {
                    (Kind::Int, Kind::Int) | (Kind::Str, Kind::Str) => Ok(Kind::Bool),
                    _ => Err(binary_mismatch(*op, l, r)),
                },
                BinOp::And | BinOp::Or => match (l, r) {
                    (Kind::Bool, Kind::Bool) => Ok(Kind::Bool),
                    _ => Err(binary_mismatch(*op, l, r)),
                },
            }
        }
        Expr::Method { recv, method, args } => {
            let recv_kind = check(recv, env)?;
            if recv_kind != Kind::Str {
                return Err(CompileError::Type(format!(
                    "method `{method}` expects a string receiver, got {recv_kind}"
                )));
            }
            match method.as_str() {
                "startsWith" | "endsWith" | "contains" => {
                    if args.len() != 1 {
                        return Err(CompileError::Type(format!(
                            "method `{method}` expects one argument, got {}",
                            args.len()
                        )));
                    }
                    let arg_kind = check(&args[0], env)?;
                    if arg_kind != Kind::Str {
                        return Err(CompileError::Type(format!(
                            "method `{method}` expects a string argument, got {arg_kind}"
                        )));
                    }
                    Ok(Kind::Bool)
                }
                _ => Err(CompileError::Type(format!("unknown string method `{method}`"))),
            }
        }
    }
}

fn binary_mismatch(op: BinOp, l: Kind, r: Kind) -> CompileError {
    CompileError::Type(format!(
        "operator `{}` cannot be applied to {l} and {r}",
        op.symbol()
    ))
}

/// Evaluate `expr`, binding free variables through `lookup`.
pub(super) fn eval<F>(expr: &Expr, lookup: &F) -> Result<Value, EvalError>
where
    F: Fn(&str) -> Option<Value>,
{
    match expr {
        Expr::Int(n) => Ok(Value::Int(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Var(name) => {
            lookup(name).ok_or_else(|| EvalError::UnknownVariable(name.clone()))
        }
        Expr::Unary(UnaryOp::Neg, operand) => match eval(operand, lookup)? {
            Value::Int(n) => n.checked_neg().map(Value::Int).ok_or(EvalError::Overflow),
            v => Err(kind_error("unary `-`", Kind::Int, &v)),
        },
        Expr::Unary(UnaryOp::Not, operand) => match eval(operand, lookup)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            v => Err(kind_error("`!`", Kind::Bool, &v)),
        },
        // && and || short-circuit: the right side only runs when needed.
        Expr::Binary(BinOp::And, lhs, rhs) => match eval(lhs, lookup)? {
            Value::Bool(false) => Ok(Value::Bool(false)),
            Value::Bool(true) => match eval(rhs, lookup)? {
                Value::Bool(b) => Ok(Value::Bool(b)),
                v => Err(kind_error("`&&`", Kind::Bool, &v)),
            },
            v => Err(kind_error("`&&`", Kind::Bool, &v)),
        },
        Expr::Binary(BinOp::Or, lhs, rhs) => match eval(lhs, lookup)? {
            Value::Bool(true) => Ok(Value::Bool(true)),
            Value::Bool(false) => match eval(rhs, lookup)? {
                Value::Bool(b) => Ok(Value::Bool(b)),
                v => Err(kind_error("`||`", Kind::Bool, &v)),
            },
            v => Err(kind_error("`||`", Kind::Bool, &v)),
        },
        Expr::Binary(op, lhs, rhs) => {
            let l = eval(lhs, lookup)?;
            let r = eval(rhs, lookup)?;
            apply_binary(*op, l, r)
        }
        Expr::Method { recv, method, args } => {
            let recv = match eval(recv, lookup)? {
                Value::Str(s) => s,
                v => return Err(kind_error(method, Kind::Str, &v)),
            };
            let arg = match eval(&args[0], lookup)? {
                Value::Str(s) => s,
                v => return Err(kind_error(method, Kind::Str, &v)),
            };
            let result = match method.as_str() {
                "startsWith" => recv.starts_with(&arg),
                "endsWith" => recv.ends_with(&arg),
                "contains" => recv.contains(&arg),
                _ => return Err(EvalError::Kind(format!("unknown method `{method}`"))),
            };
            Ok(Value::Bool(result))
        }
    }
}

fn apply_binary(op: BinOp, l: Value, r: Value) -> Result<Value, EvalError> {
    match (op, l, r) {
        (BinOp::Add, Value::Int(a), Value::Int(b)) => {
            a.checked_add(b).map(Value::Int).ok_or(EvalError::Overflow)
        }
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (BinOp::Sub, Value::Int(a), Value::Int(b)) => {
            a.checked_sub(b).map(Value::Int).ok_or(EvalError::Overflow)
        }
        (BinOp::Mul, Value::Int(a), Value::Int(b)) => {
            a.checked_mul(b).map(Value::Int).ok_or(EvalError::Overflow)
        }
        (BinOp::Div, Value::Int(a), Value::Int(b)) => {
            if b == 0 {
                Err(EvalError::DivisionByZero)
            } else {
                a.checked_div(b).map(Value::Int).ok_or(EvalError::Overflow)
            }
        }
        (BinOp::Rem, Value::Int(a), Value::Int(b)) => {
            if b == 0 {
                Err(EvalError::DivisionByZero)
            } else {
                a.checked_rem(b).map(Value::Int).ok_or(EvalError::Overflow)
            }
        }
        (BinOp::Eq, a, b) => compare_eq(a, b).map(Value::Bool),
        (BinOp::Ne, a, b) => compare_eq(a, b).map(|eq| Value::Bool(!eq)),
        (BinOp::Lt, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a < b)),
        (BinOp::Le, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a <= b)),
        (BinOp::Gt, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a > b)),
        (BinOp::Ge, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a >= b)),
        (BinOp::Lt, Value::Str(a), Value::Str(b)) => Ok(Value::Bool(a < b)),
        (BinOp::Le, Value::Str(a), Value::Str(b)) => Ok(Value::Bool(a <= b)),
        (BinOp::Gt, Value::Str(a), Value::Str(b)) => Ok(Value::Bool(a > b)),
        (BinOp::Ge, Value::Str(a), Value::Str(b)) => Ok(Value::Bool(a >= b)),
        (op, l, r) => Err(EvalError::Kind(format!(
            "operator `{}` cannot be applied to {} and {}",
            op.symbol(),
            l.kind(),
            r.kind()
        ))),
    }
}

fn compare_eq(l: Value, r: Value) -> Result<bool, EvalError> {
    match (&l, &r) {
        (Value::Int(a), Value::Int(b)) => Ok(a == b),
        (Value::Str(a), Value::Str(b)) => Ok(a == b),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        _ => Err(EvalError::Kind(format!(
            "cannot compare {} and {}",
            l.kind(),
            r.kind()
        ))),
    }
}

fn kind_error(context: &str, expected: Kind, got: &Value) -> EvalError {
    EvalError::Kind(format!("{context} expects {expected}, got {}", got.kind()))
}
