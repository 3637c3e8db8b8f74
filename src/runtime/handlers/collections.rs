use crate::lang::value::{ListRef, Value};
use crate::runtime::enumerator::Enumerator;
use crate::runtime::handlers::{Step, call_proc};
use crate::runtime::interp::{InterpState, Reference, ReturnAction, StackEntry};
use crate::runtime::runtime_error::{RuntimeError, internal, type_error};
use crate::runtime::vm::Runtime;

pub fn create_list(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let count = state.read_i32()?;
    let count =
        usize::try_from(count).map_err(|_| internal(format!("negative list size {}", count)))?;
    let items = state.pop_values(count, rt)?;
    let list = rt.objects.create_list(items);
    state.push_value(Value::List(list))?;
    Ok(None)
}

// ─── Enumerators ───

/// What `for (x in v)` walks: a list, an object's contents, or nothing.
fn enumerable_items(rt: &Runtime, value: &Value) -> Result<Vec<Value>, RuntimeError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::List(list) => rt.objects.list_snapshot(*list),
        Value::Object(obj) => match rt.objects.get_field(*obj, "contents")? {
            Value::List(list) => rt.objects.list_snapshot(list),
            _ => Ok(Vec::new()),
        },
        other => Err(type_error(format!("cannot iterate over {}", other.type_name()))),
    }
}

pub fn create_list_enumerator(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let source = state.pop_value(rt)?;
    let items = enumerable_items(rt, &source)?;
    state.enumerators.push(Enumerator::list(items));
    Ok(None)
}

pub fn create_range_enumerator(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let step = state.pop_value(rt)?;
    let end = state.pop_value(rt)?;
    let start = state.pop_value(rt)?;
    state.enumerators.push(Enumerator::range(&start, &end, &step)?);
    Ok(None)
}

pub fn create_type_enumerator(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let path = state.read_str(rt)?;
    let filter = (!path.is_empty()).then_some(&*path);
    state.enumerators.push(Enumerator::of_type(filter));
    Ok(None)
}

pub fn enumerate(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let slot = state.read_slot()?;
    let exhausted = state.read_jump()?;

    let next = match state.enumerators.last_mut() {
        Some(enumerator) => enumerator.try_advance(&*rt.objects),
        None => return Err(internal("ENUMERATE with no open enumerator")),
    };
    match next {
        Some(item) => state.set_local(slot, item)?,
        None => state.jump(exhausted),
    }
    Ok(None)
}

pub fn destroy_enumerator(state: &mut InterpState, _rt: &mut Runtime) -> Step {
    state
        .enumerators
        .pop()
        .ok_or_else(|| internal("ENUM_END with no open enumerator"))?;
    Ok(None)
}

// ─── Indexing ───

fn indexed_list(value: &Value) -> Result<ListRef, RuntimeError> {
    match value {
        Value::List(list) => Ok(*list),
        other => Err(type_error(format!("cannot index {}", other.type_name()))),
    }
}

/// ( list index -- list[index] )
pub fn index_list(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let index = state.pop_value(rt)?;
    let list = indexed_list(&state.pop_value(rt)?)?;
    let value = rt.objects.list_get(list, &index)?;
    state.push_value(value)?;
    Ok(None)
}

/// ( list index -- &list[index] )
pub fn index_list_ref(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let index = state.pop_value(rt)?;
    let list = indexed_list(&state.pop_value(rt)?)?;
    state.push(StackEntry::Ref(Reference::ListIndex { list, index }))?;
    Ok(None)
}

// ─── Objects ───

/// ( path args -- obj )
///
/// When the type defines `New` it runs with the arguments and the frame
/// receives the new object instead of `New`'s return value.
pub fn create_object(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let args = state.pop_args(rt)?;
    let type_path = match state.pop_value(rt)? {
        Value::Path(path) => path,
        other => {
            return Err(type_error(format!(
                "new expects a type path, got {}",
                other.type_name()
            )));
        }
    };

    let obj = rt.objects.create_object(&type_path)?;
    match rt.objects.resolve_proc(obj, "New") {
        Some(constructor) => {
            state.on_return = ReturnAction::Replace(Value::Object(obj));
            call_proc(state, rt, constructor, Some(obj), args)
        }
        None => {
            state.push_value(Value::Object(obj))?;
            Ok(None)
        }
    }
}

pub fn delete_object(state: &mut InterpState, rt: &mut Runtime) -> Step {
    match state.pop_value(rt)? {
        Value::Null => {}
        Value::Object(obj) => rt.objects.delete_object(obj),
        other => return Err(type_error(format!("cannot delete {}", other.type_name()))),
    }
    Ok(None)
}
