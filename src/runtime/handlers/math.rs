//! Arithmetic, bitwise and boolean operators, and compound assignment.
//!
//! Plain values go through [`crate::lang::arith`]. Lists and objects are
//! handled here since they need the object model.

use crate::lang::arith;
use crate::lang::value::{ListRef, Value};
use crate::runtime::handlers::{Step, call_operator};
use crate::runtime::interp::InterpState;
use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::vm::Runtime;

type BinaryFn = fn(&Value, &Value) -> Result<Value, RuntimeError>;

/// ( a b -- a op b ) for operators with no list or object meaning.
fn binary(state: &mut InterpState, rt: &mut Runtime, op: BinaryFn) -> Step {
    let b = state.pop_value(rt)?;
    let a = state.pop_value(rt)?;
    state.push_value(op(&a, &b)?)?;
    Ok(None)
}

/// Items `value` contributes to a list operation: a list's elements, or the
/// value itself.
fn operand_items(rt: &Runtime, value: &Value) -> Result<Vec<Value>, RuntimeError> {
    match value {
        Value::List(list) => rt.objects.list_snapshot(*list),
        other => Ok(vec![other.clone()]),
    }
}

/// `Null` on either side is neutral, before lists or overloads are considered.
pub fn add(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let b = state.pop_value(rt)?;
    let a = state.pop_value(rt)?;
    match a {
        a if b.is_null() => {
            state.push_value(a)?;
            Ok(None)
        }
        Value::Null => {
            state.push_value(b)?;
            Ok(None)
        }
        Value::Object(obj) => call_operator(state, rt, obj, "+", vec![b]),
        Value::List(list) => {
            let mut items = rt.objects.list_snapshot(list)?;
            items.extend(operand_items(rt, &b)?);
            let joined = rt.objects.create_list(items);
            state.push_value(Value::List(joined))?;
            Ok(None)
        }
        a => {
            state.push_value(arith::add(&a, &b)?)?;
            Ok(None)
        }
    }
}

/// `x - Null` is `x` for every `x`.
pub fn subtract(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let b = state.pop_value(rt)?;
    let a = state.pop_value(rt)?;
    match a {
        a if b.is_null() => {
            state.push_value(a)?;
            Ok(None)
        }
        Value::Object(obj) => call_operator(state, rt, obj, "-", vec![b]),
        Value::List(list) => {
            let items = rt.objects.list_snapshot(list)?;
            let copy = rt.objects.create_list(items);
            for item in operand_items(rt, &b)? {
                rt.objects.list_remove(copy, &item)?;
            }
            state.push_value(Value::List(copy))?;
            Ok(None)
        }
        a => {
            state.push_value(arith::subtract(&a, &b)?)?;
            Ok(None)
        }
    }
}

pub fn multiply(state: &mut InterpState, rt: &mut Runtime) -> Step {
    binary(state, rt, arith::multiply)
}

pub fn divide(state: &mut InterpState, rt: &mut Runtime) -> Step {
    binary(state, rt, arith::divide)
}

pub fn modulus(state: &mut InterpState, rt: &mut Runtime) -> Step {
    binary(state, rt, arith::modulus)
}

pub fn power(state: &mut InterpState, rt: &mut Runtime) -> Step {
    binary(state, rt, arith::power)
}

pub fn negate(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let a = state.pop_value(rt)?;
    state.push_value(arith::negate(&a)?)?;
    Ok(None)
}

pub fn bit_and(state: &mut InterpState, rt: &mut Runtime) -> Step {
    binary(state, rt, arith::bit_and)
}

pub fn bit_or(state: &mut InterpState, rt: &mut Runtime) -> Step {
    binary(state, rt, arith::bit_or)
}

pub fn bit_xor(state: &mut InterpState, rt: &mut Runtime) -> Step {
    binary(state, rt, arith::bit_xor)
}

pub fn bit_not(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let a = state.pop_value(rt)?;
    state.push_value(arith::bit_not(&a)?)?;
    Ok(None)
}

pub fn shift_left(state: &mut InterpState, rt: &mut Runtime) -> Step {
    binary(state, rt, arith::shift_left)
}

pub fn shift_right(state: &mut InterpState, rt: &mut Runtime) -> Step {
    binary(state, rt, arith::shift_right)
}

// ─── Boolean ───

pub fn boolean_not(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let a = state.pop_value(rt)?;
    state.push_value(Value::from_bool(!a.is_truthy()))?;
    Ok(None)
}

/// ( a -- a ) and jump when `a` is false, else ( a -- ).
pub fn boolean_and(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let target = state.read_jump()?;
    let a = state.pop_value(rt)?;
    if !a.is_truthy() {
        state.push_value(a)?;
        state.jump(target);
    }
    Ok(None)
}

/// ( a -- a ) and jump when `a` is true, else ( a -- ).
pub fn boolean_or(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let target = state.read_jump()?;
    let a = state.pop_value(rt)?;
    if a.is_truthy() {
        state.push_value(a)?;
        state.jump(target);
    }
    Ok(None)
}

// ─── Compound assignment ───

#[derive(Debug, Clone, Copy, PartialEq)]
enum Compound {
    Append,
    Remove,
    Combine,
    Mask,
}

impl Compound {
    fn symbol(self) -> &'static str {
        match self {
            Compound::Append => "+=",
            Compound::Remove => "-=",
            Compound::Combine => "|=",
            Compound::Mask => "&=",
        }
    }

    fn on_value(self, current: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
        match (self, current) {
            (Compound::Combine, Value::Null) => Ok(rhs.clone()),
            (Compound::Append, _) => arith::add(current, rhs),
            (Compound::Remove, _) => arith::subtract(current, rhs),
            (Compound::Combine, _) => arith::bit_or(current, rhs),
            (Compound::Mask, _) => arith::bit_and(current, rhs),
        }
    }

    /// Update a list in place.
    fn on_list(self, rt: &mut Runtime, list: ListRef, rhs: &Value) -> Result<(), RuntimeError> {
        let items = operand_items(rt, rhs)?;
        match self {
            Compound::Append => {
                for item in items {
                    rt.objects.list_append(list, item)?;
                }
            }
            Compound::Remove => {
                for item in &items {
                    rt.objects.list_remove(list, item)?;
                }
            }
            Compound::Combine => {
                for item in items {
                    if !rt.objects.list_contains(list, &item)? {
                        rt.objects.list_append(list, item)?;
                    }
                }
            }
            Compound::Mask => {
                for item in rt.objects.list_snapshot(list)? {
                    if !items.iter().any(|kept| kept.equals(&item)) {
                        rt.objects.list_remove(list, &item)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// ( &x v -- x' )
fn compound(state: &mut InterpState, rt: &mut Runtime, op: Compound) -> Step {
    let rhs = state.pop_value(rt)?;
    let target = state.pop_ref()?;
    let current = state.load(&target, rt)?;

    match current {
        Value::Object(obj) => call_operator(state, rt, obj, op.symbol(), vec![rhs]),
        Value::List(list) => {
            op.on_list(rt, list, &rhs)?;
            state.push_value(Value::List(list))?;
            Ok(None)
        }
        current => {
            let updated = op.on_value(&current, &rhs)?;
            state.store(&target, updated.clone(), rt)?;
            state.push_value(updated)?;
            Ok(None)
        }
    }
}

pub fn append(state: &mut InterpState, rt: &mut Runtime) -> Step {
    compound(state, rt, Compound::Append)
}

pub fn remove(state: &mut InterpState, rt: &mut Runtime) -> Step {
    compound(state, rt, Compound::Remove)
}

pub fn combine(state: &mut InterpState, rt: &mut Runtime) -> Step {
    compound(state, rt, Compound::Combine)
}

pub fn mask(state: &mut InterpState, rt: &mut Runtime) -> Step {
    compound(state, rt, Compound::Mask)
}
