//! Pushing values and references, assignment and string building.

use crate::bytecode::op::{FORMAT_MARKER, FORMAT_REF, FORMAT_STRINGIFY};
use crate::lang::value::{ObjectRef, Value};
use crate::runtime::handlers::Step;
use crate::runtime::interp::{InterpState, Reference, StackEntry};
use crate::runtime::runtime_error::{RuntimeError, internal, type_error};
use crate::runtime::vm::Runtime;

pub fn push_null(state: &mut InterpState, _rt: &mut Runtime) -> Step {
    state.push_value(Value::Null)?;
    Ok(None)
}

pub fn push_int(state: &mut InterpState, _rt: &mut Runtime) -> Step {
    let n = state.read_i32()?;
    state.push_value(Value::Integer(n))?;
    Ok(None)
}

pub fn push_float(state: &mut InterpState, _rt: &mut Runtime) -> Step {
    let n = state.read_f32()?;
    state.push_value(Value::Float(n))?;
    Ok(None)
}

pub fn push_string(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let s = state.read_str(rt)?;
    state.push_value(Value::String(s))?;
    Ok(None)
}

pub fn push_path(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let s = state.read_str(rt)?;
    state.push_value(Value::Path(s))?;
    Ok(None)
}

pub fn push_resource(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let s = state.read_str(rt)?;
    state.push_value(Value::Resource(s))?;
    Ok(None)
}

pub fn push_src(state: &mut InterpState, _rt: &mut Runtime) -> Step {
    state.push_value(state.src_value())?;
    Ok(None)
}

pub fn push_usr(state: &mut InterpState, _rt: &mut Runtime) -> Step {
    state.push_value(state.usr_value())?;
    Ok(None)
}

pub fn push_result(state: &mut InterpState, _rt: &mut Runtime) -> Step {
    state.push_value(state.result.clone())?;
    Ok(None)
}

pub fn push_result_ref(state: &mut InterpState, _rt: &mut Runtime) -> Step {
    state.push(StackEntry::Ref(Reference::Result))?;
    Ok(None)
}

pub fn push_local(state: &mut InterpState, _rt: &mut Runtime) -> Step {
    let slot = state.read_slot()?;
    let value = state.local(slot)?.clone();
    state.push_value(value)?;
    Ok(None)
}

pub fn push_local_ref(state: &mut InterpState, _rt: &mut Runtime) -> Step {
    let slot = state.read_slot()?;
    state.push(StackEntry::Ref(Reference::Local(slot)))?;
    Ok(None)
}

/// ( v -- )
pub fn set_local(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let slot = state.read_slot()?;
    let value = state.pop_value(rt)?;
    state.set_local(slot, value)?;
    Ok(None)
}

fn read_global_id(state: &mut InterpState) -> Result<u32, RuntimeError> {
    let id = state.read_i32()?;
    u32::try_from(id).map_err(|_| internal(format!("negative global id {}", id)))
}

pub fn push_global(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let id = read_global_id(state)?;
    let value = rt.objects.get_global(id)?;
    state.push_value(value)?;
    Ok(None)
}

pub fn push_global_ref(state: &mut InterpState, _rt: &mut Runtime) -> Step {
    let id = read_global_id(state)?;
    state.push(StackEntry::Ref(Reference::Global(id)))?;
    Ok(None)
}

fn field_owner(value: &Value, field: &str) -> Result<ObjectRef, RuntimeError> {
    match value {
        Value::Object(obj) => Ok(*obj),
        other => Err(type_error(format!(
            "cannot access field '{}' of {}",
            field,
            other.type_name()
        ))),
    }
}

/// ( obj -- v )
pub fn get_field(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let name = state.read_str(rt)?;
    let owner = state.pop_value(rt)?;
    let obj = field_owner(&owner, &name)?;
    let value = rt.objects.get_field(obj, &name)?;
    state.push_value(value)?;
    Ok(None)
}

/// ( obj -- &obj.name )
pub fn field_ref(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let name = state.read_str(rt)?;
    let owner = state.pop_value(rt)?;
    let object = field_owner(&owner, &name)?;
    state.push(StackEntry::Ref(Reference::Field { object, name }))?;
    Ok(None)
}

pub fn src_field_ref(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let name = state.read_str(rt)?;
    let object = field_owner(&state.src_value(), &name)?;
    state.push(StackEntry::Ref(Reference::Field { object, name }))?;
    Ok(None)
}

/// ( &x v -- v )
pub fn assign(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let value = state.pop_value(rt)?;
    let target = state.pop_ref()?;
    state.store(&target, value.clone(), rt)?;
    state.push_value(value)?;
    Ok(None)
}

pub fn pop(state: &mut InterpState, _rt: &mut Runtime) -> Step {
    state.pop_entry()?;
    Ok(None)
}

/// ( v1 .. vn -- s )
///
/// Each marker in the format string takes the next value in push order.
pub fn format_string(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let format = state.read_str(rt)?;
    let count = state.read_i32()?;
    let count = usize::try_from(count)
        .map_err(|_| internal(format!("negative interpolation count {}", count)))?;
    let values = state.pop_values(count, rt)?;

    let text = interpolate(&format, &values, rt)?;
    state.push_value(Value::string(text))?;
    Ok(None)
}

fn interpolate(format: &str, values: &[Value], rt: &Runtime) -> Result<String, RuntimeError> {
    let mut out = String::with_capacity(format.len());
    let mut values = values.iter();
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != FORMAT_MARKER {
            out.push(c);
            continue;
        }
        let kind = chars
            .next()
            .ok_or_else(|| internal("format string ends inside a marker"))?;
        let value = values
            .next()
            .ok_or_else(|| internal("format string has more markers than values"))?;

        match kind {
            FORMAT_STRINGIFY => match value {
                Value::Object(obj) => out.push_str(&rt.objects.display_name(*obj)),
                other => out.push_str(&other.to_string()),
            },
            FORMAT_REF => out.push_str(&rt.objects.reference_id(value)),
            other => return Err(internal(format!("unknown format marker '{}'", other))),
        }
    }
    Ok(out)
}
