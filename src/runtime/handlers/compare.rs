use std::cmp::Ordering;

use crate::lang::value::Value;
use crate::runtime::handlers::Step;
use crate::runtime::interp::InterpState;
use crate::runtime::runtime_error::type_error;
use crate::runtime::vm::Runtime;

pub fn equals(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let b = state.pop_value(rt)?;
    let a = state.pop_value(rt)?;
    state.push_value(Value::from_bool(a.equals(&b)))?;
    Ok(None)
}

pub fn not_equals(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let b = state.pop_value(rt)?;
    let a = state.pop_value(rt)?;
    state.push_value(Value::from_bool(!a.equals(&b)))?;
    Ok(None)
}

/// ( a b -- bool ). Unordered operands compare false.
fn ordered(state: &mut InterpState, rt: &mut Runtime, accept: fn(Ordering) -> bool) -> Step {
    let b = state.pop_value(rt)?;
    let a = state.pop_value(rt)?;
    let result = a.compare(&b)?.is_some_and(accept);
    state.push_value(Value::from_bool(result))?;
    Ok(None)
}

pub fn less_than(state: &mut InterpState, rt: &mut Runtime) -> Step {
    ordered(state, rt, Ordering::is_lt)
}

pub fn greater_than(state: &mut InterpState, rt: &mut Runtime) -> Step {
    ordered(state, rt, Ordering::is_gt)
}

pub fn less_than_or_equal(state: &mut InterpState, rt: &mut Runtime) -> Step {
    ordered(state, rt, Ordering::is_le)
}

pub fn greater_than_or_equal(state: &mut InterpState, rt: &mut Runtime) -> Step {
    ordered(state, rt, Ordering::is_ge)
}

/// ( v path -- bool )
pub fn is_type(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let path = state.pop_value(rt)?;
    let value = state.pop_value(rt)?;

    let ancestor = match &path {
        Value::Path(p) => p.clone(),
        other => {
            return Err(type_error(format!(
                "istype expects a type path, got {}",
                other.type_name()
            )));
        }
    };
    let result = match value {
        Value::Object(obj) => rt
            .objects
            .type_of(obj)
            .is_some_and(|t| rt.objects.is_subtype(&t, &ancestor)),
        Value::List(_) => ancestor.as_ref() == "/list",
        _ => false,
    };
    state.push_value(Value::from_bool(result))?;
    Ok(None)
}

pub fn is_null(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let value = state.pop_value(rt)?;
    state.push_value(Value::from_bool(value.is_null()))?;
    Ok(None)
}

/// ( v list -- bool ). A null container holds nothing.
pub fn is_in_list(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let container = state.pop_value(rt)?;
    let value = state.pop_value(rt)?;

    let found = match &container {
        Value::Null => false,
        Value::List(list) => rt.objects.list_contains(*list, &value)?,
        Value::Object(obj) => match rt.objects.get_field(*obj, "contents")? {
            Value::List(list) => rt.objects.list_contains(list, &value)?,
            _ => false,
        },
        other => {
            return Err(type_error(format!(
                "'in' expects a list, got {}",
                other.type_name()
            )));
        }
    };
    state.push_value(Value::from_bool(found))?;
    Ok(None)
}
