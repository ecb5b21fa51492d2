//! Binary and unary operator semantics.
//!
//! Null propagation lives here, in one place: a null operand makes the
//! arithmetic and ordered-comparison operators yield null without performing
//! the operation. Equality is strict and structural; the logical operators
//! work on truthiness and always yield a boolean.

use formula_vm_runtime::{ErrorKind, ScriptError, ScriptResult, Value};

use crate::ir::Op;

/// Apply a binary opcode to its two operands (`a` op `b`).
pub(crate) fn binary(op: &Op, a: Value, b: Value) -> ScriptResult<Value> {
    match op {
        Op::Add | Op::Sub | Op::Mul | Op::Div => arithmetic(op, a, b),
        Op::Gt | Op::Lt | Op::Gte | Op::Lte => ordered(op, a, b),
        Op::Eq => Ok(Value::Bool(a.strict_eq(&b))),
        Op::Neq => Ok(Value::Bool(!a.strict_eq(&b))),
        Op::And => Ok(Value::Bool(a.is_truthy() && b.is_truthy())),
        Op::Or => Ok(Value::Bool(a.is_truthy() || b.is_truthy())),
        other => Err(ScriptError::new(
            ErrorKind::RuntimeError,
            format!("internal: {} is not a binary operator", other.name()),
        )),
    }
}

fn arithmetic(op: &Op, a: Value, b: Value) -> ScriptResult<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let (a, b) = numeric_pair(op, &a, &b)?;
    let result = match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div => {
            if b == 0.0 {
                return Err(ScriptError::new(
                    ErrorKind::DivisionByZero,
                    "division by zero",
                ));
            }
            a / b
        }
        _ => unreachable!("arithmetic called with non-arithmetic opcode"),
    };
    Ok(Value::Num(result))
}

fn ordered(op: &Op, a: Value, b: Value) -> ScriptResult<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let (a, b) = numeric_pair(op, &a, &b)?;
    let result = match op {
        Op::Gt => a > b,
        Op::Lt => a < b,
        Op::Gte => a >= b,
        Op::Lte => a <= b,
        _ => unreachable!("ordered called with non-comparison opcode"),
    };
    Ok(Value::Bool(result))
}

fn numeric_pair(op: &Op, a: &Value, b: &Value) -> ScriptResult<(f64, f64)> {
    match (a.as_num(), b.as_num()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => {
            let offender = if a.as_num().is_none() { a } else { b };
            Err(
                ScriptError::expected(op.name(), "number", offender.type_name())
                    .with_context("value", offender.to_string()),
            )
        }
    }
}

/// Apply a unary opcode. Null passes through unchanged.
pub(crate) fn unary(op: &Op, v: Value) -> ScriptResult<Value> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let n = v.as_num().ok_or_else(|| {
        ScriptError::expected(op.name(), "number", v.type_name())
            .with_context("value", v.to_string())
    })?;
    match op {
        Op::UnaryPlus => Ok(Value::Num(n)),
        Op::UnaryMinus => Ok(Value::Num(-n)),
        other => Err(ScriptError::new(
            ErrorKind::RuntimeError,
            format!("internal: {} is not a unary operator", other.name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_propagates_through_arithmetic() {
        let out = binary(&Op::Add, Value::Null, Value::Num(1.0)).unwrap();
        assert_eq!(out, Value::Null);
        let out = binary(&Op::Mul, Value::Num(2.0), Value::Null).unwrap();
        assert_eq!(out, Value::Null);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let err = binary(&Op::Div, Value::Num(1.0), Value::Num(0.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
    }

    #[test]
    fn booleans_coerce_in_arithmetic() {
        let out = binary(&Op::Add, Value::Bool(true), Value::Num(1.0)).unwrap();
        assert_eq!(out, Value::Num(2.0));
    }

    #[test]
    fn strings_do_not_coerce() {
        let err = binary(&Op::Add, Value::Str("1".into()), Value::Num(1.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
    }

    #[test]
    fn ordered_comparison_yields_bool_or_null() {
        let out = binary(&Op::Gt, Value::Num(2.0), Value::Num(1.0)).unwrap();
        assert_eq!(out, Value::Bool(true));
        let out = binary(&Op::Lte, Value::Null, Value::Num(1.0)).unwrap();
        assert_eq!(out, Value::Null);
    }

    #[test]
    fn equality_is_strict() {
        assert_eq!(
            binary(&Op::Eq, Value::Num(1.0), Value::Bool(true)).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            binary(&Op::Eq, Value::Null, Value::Null).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            binary(&Op::Neq, Value::Null, Value::Num(0.0)).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn logical_operators_use_truthiness() {
        assert_eq!(
            binary(&Op::And, Value::Num(1.0), Value::Str("x".into())).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            binary(&Op::Or, Value::Null, Value::Num(0.0)).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn unary_minus_negates_and_passes_null() {
        assert_eq!(unary(&Op::UnaryMinus, Value::Num(2.0)).unwrap(), Value::Num(-2.0));
        assert_eq!(unary(&Op::UnaryMinus, Value::Null).unwrap(), Value::Null);
        assert_eq!(unary(&Op::UnaryPlus, Value::Bool(true)).unwrap(), Value::Num(1.0));
    }
}
