//! Arithmetic on plain values.
//!
//! These functions cover numbers, strings and `Null`. Lists and objects are
//! handled by the opcode handlers before they get here, since they need the
//! object model.
//!
//! Integer operands stay integers; any float operand promotes the result to a
//! float.

use crate::lang::value::Value;
use crate::runtime::runtime_error::{RuntimeError, division_by_zero, type_error};

fn invalid(op: &str, a: &Value, b: &Value) -> RuntimeError {
    type_error(format!(
        "invalid {} operation on {} and {}",
        op,
        a.type_name(),
        b.type_name()
    ))
}

/// Apply `int_op` when both sides are integers (falling back to floats when it
/// overflows), `float_op` when either side is a float.
fn numeric(
    op: &str,
    a: &Value,
    b: &Value,
    int_op: fn(i32, i32) -> Option<i32>,
    float_op: fn(f32, f32) -> f32,
) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(match int_op(*x, *y) {
            Some(n) => Value::Integer(n),
            None => Value::Float(float_op(*x as f32, *y as f32)),
        }),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(Value::Float(float_op(x, y))),
            _ => Err(invalid(op, a, b)),
        },
    }
}

/// `Null` on either side is neutral.
pub fn add(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (_, Value::Null) => Ok(a.clone()),
        (Value::Null, _) => Ok(b.clone()),
        (Value::String(x), Value::String(y)) => {
            let mut joined = String::with_capacity(x.len() + y.len());
            joined.push_str(x);
            joined.push_str(y);
            Ok(Value::string(joined))
        }
        _ => numeric("add", a, b, i32::checked_add, |x, y| x + y),
    }
}

/// `x - Null` is `x`; `Null - x` is `-x`.
pub fn subtract(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (_, Value::Null) => Ok(a.clone()),
        (Value::Null, _) => negate(b).map_err(|_| invalid("subtract", a, b)),
        _ => numeric("subtract", a, b, i32::checked_sub, |x, y| x - y),
    }
}

pub fn multiply(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Null, other) | (other, Value::Null) if other.as_number().is_some() || other.is_null() => {
            Ok(Value::Integer(0))
        }
        _ => numeric("multiply", a, b, i32::checked_mul, |x, y| x * y),
    }
}

/// Integer division stays an integer only when it is exact.
pub fn divide(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let divisor = match b {
        Value::Null => 0.0,
        other => other.as_number().ok_or_else(|| invalid("divide", a, b))?,
    };
    if divisor == 0.0 {
        return Err(division_by_zero());
    }
    match (a, b) {
        (Value::Null, _) => Ok(Value::Integer(0)),
        // `checked_rem` is None for `i32::MIN / -1`, which takes the float path.
        (Value::Integer(x), Value::Integer(y)) if x.checked_rem(*y) == Some(0) => {
            Ok(Value::Integer(x / y))
        }
        _ => {
            let dividend = a.as_number().ok_or_else(|| invalid("divide", a, b))?;
            Ok(Value::Float(dividend / divisor))
        }
    }
}

pub fn modulus(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let a = null_as_zero(a);
    let b = null_as_zero(b);
    if b.as_number() == Some(0.0) {
        return Err(division_by_zero());
    }
    numeric("modulus", &a, &b, i32::checked_rem, |x, y| x % y)
}

pub fn power(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let a = null_as_zero(a);
    let b = null_as_zero(b);
    numeric(
        "power",
        &a,
        &b,
        |x, y| u32::try_from(y).ok().and_then(|y| x.checked_pow(y)),
        f32::powf,
    )
}

pub fn negate(a: &Value) -> Result<Value, RuntimeError> {
    match a {
        Value::Null => Ok(Value::Integer(0)),
        Value::Integer(n) => Ok(match n.checked_neg() {
            Some(n) => Value::Integer(n),
            None => Value::Float(-(*n as f32)),
        }),
        Value::Float(n) => Ok(Value::Float(-n)),
        other => Err(type_error(format!("cannot negate {}", other.type_name()))),
    }
}

// ─────────────────────────── Bitwise ───────────────────────────

fn bits(op: &str, a: &Value, b: &Value) -> Result<(i32, i32), RuntimeError> {
    match (null_as_zero(a).as_integer(), null_as_zero(b).as_integer()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(invalid(op, a, b)),
    }
}

pub fn bit_and(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let (x, y) = bits("bitwise and", a, b)?;
    Ok(Value::Integer(x & y))
}

pub fn bit_or(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let (x, y) = bits("bitwise or", a, b)?;
    Ok(Value::Integer(x | y))
}

pub fn bit_xor(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let (x, y) = bits("bitwise xor", a, b)?;
    Ok(Value::Integer(x ^ y))
}

pub fn shift_left(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let (x, y) = bits("shift", a, b)?;
    Ok(Value::Integer(x.checked_shl(y as u32).unwrap_or(0)))
}

pub fn shift_right(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let (x, y) = bits("shift", a, b)?;
    Ok(Value::Integer(x.checked_shr(y as u32).unwrap_or(0)))
}

pub fn bit_not(a: &Value) -> Result<Value, RuntimeError> {
    match null_as_zero(a).as_integer() {
        Some(x) => Ok(Value::Integer(!x)),
        None => Err(type_error(format!("cannot bitwise-not {}", a.type_name()))),
    }
}

fn null_as_zero(v: &Value) -> Value {
    match v {
        Value::Null => Value::Integer(0),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::value::ObjectRef;
    use crate::runtime::runtime_error::ErrorKind;

    fn int(n: i32) -> Value {
        Value::Integer(n)
    }
    fn float(n: f32) -> Value {
        Value::Float(n)
    }
    fn string(s: &str) -> Value {
        Value::string(s)
    }

    #[test]
    fn test_add_int_int_stays_int() {
        assert_eq!(add(&int(2), &int(3)).unwrap(), int(5));
    }

    #[test]
    fn test_any_float_operand_promotes() {
        assert_eq!(add(&int(2), &float(0.5)).unwrap(), float(2.5));
        assert_eq!(add(&float(0.5), &int(2)).unwrap(), float(2.5));
        assert_eq!(multiply(&float(2.0), &int(3)).unwrap(), float(6.0));
        assert_eq!(subtract(&int(1), &float(0.25)).unwrap(), float(0.75));
    }

    #[test]
    fn test_null_is_neutral_for_add() {
        let samples = [
            int(4),
            float(1.5),
            string("x"),
            Value::Null,
            Value::Object(ObjectRef(3)),
            Value::path("/obj"),
        ];
        for x in samples {
            assert_eq!(add(&Value::Null, &x).unwrap(), x);
            assert_eq!(add(&x, &Value::Null).unwrap(), x);
        }
    }

    #[test]
    fn test_null_subtract() {
        assert_eq!(subtract(&int(4), &Value::Null).unwrap(), int(4));
        assert_eq!(subtract(&Value::Null, &int(4)).unwrap(), int(-4));
        assert_eq!(subtract(&Value::Null, &float(1.5)).unwrap(), float(-1.5));
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(add(&string("ab"), &string("cd")).unwrap(), string("abcd"));
        assert!(add(&string("ab"), &int(1)).is_err());
    }

    #[test]
    fn test_overflow_falls_back_to_float() {
        assert_eq!(
            add(&int(i32::MAX), &int(1)).unwrap(),
            float(i32::MAX as f32 + 1.0)
        );
    }

    #[test]
    fn test_divide() {
        assert_eq!(divide(&int(6), &int(3)).unwrap(), int(2));
        assert_eq!(divide(&int(7), &int(2)).unwrap(), float(3.5));
        assert_eq!(divide(&Value::Null, &int(2)).unwrap(), int(0));
        let err = divide(&int(1), &int(0)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::DivisionByZero));
        assert_eq!(
            divide(&int(i32::MIN), &int(-1)).unwrap(),
            float(-(i32::MIN as f32))
        );
    }

    #[test]
    fn test_modulus_and_power() {
        assert_eq!(modulus(&int(7), &int(3)).unwrap(), int(1));
        assert_eq!(modulus(&float(7.5), &int(2)).unwrap(), float(1.5));
        assert!(modulus(&int(1), &int(0)).is_err());
        assert_eq!(power(&int(2), &int(10)).unwrap(), int(1024));
        assert_eq!(power(&int(2), &int(-1)).unwrap(), float(0.5));
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(bit_and(&int(6), &int(3)).unwrap(), int(2));
        assert_eq!(bit_or(&int(6), &int(3)).unwrap(), int(7));
        assert_eq!(bit_xor(&int(6), &int(3)).unwrap(), int(5));
        assert_eq!(shift_left(&int(1), &int(4)).unwrap(), int(16));
        assert_eq!(shift_right(&int(16), &int(4)).unwrap(), int(1));
        assert_eq!(bit_not(&int(0)).unwrap(), int(-1));
        assert!(bit_and(&string("a"), &int(1)).is_err());
    }

    #[test]
    fn test_negate() {
        assert_eq!(negate(&int(3)).unwrap(), int(-3));
        assert_eq!(negate(&float(1.5)).unwrap(), float(-1.5));
        assert!(negate(&string("a")).is_err());
    }
}
