//! Methods every receiver class answers before user methods are consulted.
//!
//! `rt_builtin` in the generated C runtime implements the same table, so
//! any change here has to be mirrored there.

use crate::{
    lang::value::Value,
    runtime::runtime_error::{ExceptionClass, RuntimeError, divided_by_zero, wrong_arity},
};

/// Result of a side-effect-free Integer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Folded {
    Int(i64),
    Bool(bool),
}

/// Floored division; the caller guarantees `b != 0`.
pub fn floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        q.wrapping_sub(1)
    } else {
        q
    }
}

/// Modulo with the sign of the divisor; the caller guarantees `b != 0`.
pub fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) {
        r.wrapping_add(b)
    } else {
        r
    }
}

/// `a <message> b` for two Integers. `None` when `message` is not an
/// Integer operator or the operation would raise.
pub fn integer_binop(message: &str, a: i64, b: i64) -> Option<Folded> {
    Some(match message {
        "+" => Folded::Int(a.wrapping_add(b)),
        "-" => Folded::Int(a.wrapping_sub(b)),
        "*" => Folded::Int(a.wrapping_mul(b)),
        "/" if b != 0 => Folded::Int(floor_div(a, b)),
        "%" if b != 0 => Folded::Int(floor_mod(a, b)),
        "<" => Folded::Bool(a < b),
        "<=" => Folded::Bool(a <= b),
        ">" => Folded::Bool(a > b),
        ">=" => Folded::Bool(a >= b),
        "==" => Folded::Bool(a == b),
        "!=" => Folded::Bool(a != b),
        _ => return None,
    })
}

fn expect_arity(args: &[Value], expected: usize) -> Result<(), RuntimeError> {
    if args.len() != expected {
        return Err(wrong_arity(args.len(), expected));
    }
    Ok(())
}

fn integer_method(a: i64, message: &str, args: &[Value]) -> Option<Result<Value, RuntimeError>> {
    let arithmetic = matches!(message, "+" | "-" | "*" | "/" | "%");
    let comparison = matches!(message, "<" | "<=" | ">" | ">=");
    if !arithmetic && !comparison {
        return None;
    }

    Some((|| {
        expect_arity(args, 1)?;
        let b = match &args[0] {
            Value::Integer(b) => *b,
            other if arithmetic => {
                return Err(RuntimeError::new(
                    ExceptionClass::TypeError,
                    format!("{} can't be coerced into Integer", other.coercion_name()),
                ));
            }
            other => {
                return Err(RuntimeError::new(
                    ExceptionClass::ArgumentError,
                    format!("comparison of Integer with {} failed", other.coercion_name()),
                ));
            }
        };
        match integer_binop(message, a, b) {
            Some(Folded::Int(n)) => Ok(Value::Integer(n)),
            Some(Folded::Bool(v)) => Ok(Value::Bool(v)),
            None => Err(divided_by_zero()),
        }
    })())
}

fn string_method(s: &str, message: &str, args: &[Value]) -> Option<Result<Value, RuntimeError>> {
    match message {
        "+" => Some((|| {
            expect_arity(args, 1)?;
            match &args[0] {
                Value::String(other) => Ok(Value::string(&format!("{}{}", s, other))),
                other => Err(RuntimeError::new(
                    ExceptionClass::TypeError,
                    format!(
                        "no implicit conversion of {} into String",
                        other.coercion_name()
                    ),
                )),
            }
        })()),
        "length" | "size" => Some(
            expect_arity(args, 0).map(|_| Value::Integer(s.chars().count() as i64)),
        ),
        _ => None,
    }
}

/// Methods every object answers.
fn object_method(
    receiver: &Value,
    message: &str,
    args: &[Value],
) -> Option<Result<Value, RuntimeError>> {
    let result = match message {
        "==" => expect_arity(args, 1).map(|_| Value::Bool(*receiver == args[0])),
        "!=" => expect_arity(args, 1).map(|_| Value::Bool(*receiver != args[0])),
        "!" => expect_arity(args, 0).map(|_| Value::Bool(!receiver.is_truthy())),
        "nil?" => expect_arity(args, 0).map(|_| Value::Bool(matches!(receiver, Value::Nil))),
        "to_s" => expect_arity(args, 0).map(|_| match receiver {
            Value::String(_) => receiver.clone(),
            other => Value::string(&other.to_string()),
        }),
        _ => return None,
    };
    Some(result)
}

/// Dispatches `receiver.message(*args)` to a builtin, or `None` when the
/// receiver's class has no builtin of that name.
pub fn call_builtin(
    receiver: &Value,
    message: &str,
    args: &[Value],
) -> Option<Result<Value, RuntimeError>> {
    let by_class = match receiver {
        Value::Integer(a) => integer_method(*a, message, args),
        Value::String(s) => string_method(s, message, args),
        _ => None,
    };
    by_class.or_else(|| object_method(receiver, message, args))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(receiver: Value, message: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        call_builtin(&receiver, message, &args).expect("builtin should exist")
    }

    fn assert_error(receiver: Value, message: &str, args: Vec<Value>, expected: &str) {
        let err = call(receiver, message, args).unwrap_err();
        assert_eq!(err.to_string(), expected);
    }

    #[test]
    fn test_floor_division_and_modulo() {
        assert_eq!(floor_div(7, 2), 3);
        assert_eq!(floor_div(-7, 2), -4);
        assert_eq!(floor_div(7, -2), -4);
        assert_eq!(floor_mod(-7, 2), 1);
        assert_eq!(floor_mod(7, -2), -1);
        assert_eq!(floor_div(i64::MIN, -1), i64::MIN);
        assert_eq!(floor_mod(i64::MIN, -1), 0);
    }

    #[test]
    fn test_arithmetic_wraps() {
        assert_eq!(
            call(Value::Integer(i64::MAX), "+", vec![Value::Integer(1)]).unwrap(),
            Value::Integer(i64::MIN)
        );
    }

    #[test]
    fn test_integer_comparison() {
        assert_eq!(
            call(Value::Integer(1), "<", vec![Value::Integer(2)]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_integer_errors() {
        assert_error(
            Value::Integer(1),
            "/",
            vec![Value::Integer(0)],
            "divided by 0 (ZeroDivisionError)",
        );
        assert_error(
            Value::Integer(1),
            "+",
            vec![Value::Nil],
            "nil can't be coerced into Integer (TypeError)",
        );
        assert_error(
            Value::Integer(1),
            "<",
            vec![Value::string("a")],
            "comparison of Integer with String failed (ArgumentError)",
        );
        assert_error(
            Value::Integer(1),
            "+",
            vec![],
            "wrong number of arguments (given 0, expected 1) (ArgumentError)",
        );
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(
            call(Value::string("ab"), "+", vec![Value::string("c")]).unwrap(),
            Value::string("abc")
        );
        assert_error(
            Value::string("ab"),
            "+",
            vec![Value::Integer(1)],
            "no implicit conversion of Integer into String (TypeError)",
        );
    }

    #[test]
    fn test_string_length_counts_chars() {
        assert_eq!(
            call(Value::string("héllo"), "length", vec![]).unwrap(),
            Value::Integer(5)
        );
    }

    #[test]
    fn test_universal_equality() {
        assert_eq!(
            call(Value::Nil, "==", vec![Value::Nil]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call(Value::Integer(1), "!=", vec![Value::string("1")]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_to_s() {
        assert_eq!(
            call(Value::Integer(42), "to_s", vec![]).unwrap(),
            Value::string("42")
        );
    }

    #[test]
    fn test_unknown_message_is_not_builtin() {
        assert!(call_builtin(&Value::Integer(1), "foo", &[]).is_none());
        assert!(call_builtin(&Value::Nil, "+", &[Value::Nil]).is_none());
    }
}
