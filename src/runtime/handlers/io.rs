//! Opcodes that go through the host: client output, prompts and map lookups.

use crate::lang::value::{ObjectRef, Value};
use crate::runtime::handlers::Step;
use crate::runtime::host::PromptRequest;
use crate::runtime::interp::InterpState;
use crate::runtime::runtime_error::{RuntimeError, type_error};
use crate::runtime::state::{AsyncState, ProcState, ProcStatus};
use crate::runtime::vm::Runtime;

/// ( receiver body options -- )
pub fn browse(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let [receiver, body, options] = pop3(state, rt)?;
    rt.host.browse(&receiver, &body, &options.to_string())?;
    Ok(None)
}

/// ( receiver resource filename -- )
pub fn browse_resource(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let [receiver, resource, filename] = pop3(state, rt)?;
    rt.host
        .browse_resource(&receiver, &resource, &filename.to_string())?;
    Ok(None)
}

/// ( receiver message control -- )
pub fn output_control(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let [receiver, message, control] = pop3(state, rt)?;
    rt.host
        .output_control(&receiver, &message.to_string(), &control.to_string())?;
    Ok(None)
}

/// ( receiver message title default -- reply )
///
/// The thread defers until the host answers.
pub fn prompt(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let input_type = state.read_i32()?;
    let default = state.pop_value(rt)?;
    let title = state.pop_value(rt)?;
    let message = state.pop_value(rt)?;
    let receiver = state.pop_value(rt)?;

    let reply = rt.host.prompt(PromptRequest {
        receiver,
        message: message.to_string(),
        title: title.to_string(),
        default,
        input_type,
    })?;
    let wait = AsyncState::awaiting("input", reply);
    Ok(Some(ProcStatus::Called(Box::new(ProcState::Async(wait)))))
}

/// ( path container -- obj )
///
/// The first object of the type in the container, which is a list, an
/// object's contents, or the whole world when null.
pub fn locate(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let container = state.pop_value(rt)?;
    let path = match state.pop_value(rt)? {
        Value::Path(path) => path,
        other => {
            return Err(type_error(format!(
                "locate expects a type path, got {}",
                other.type_name()
            )));
        }
    };

    let wanted = |obj: ObjectRef| {
        rt.objects
            .type_of(obj)
            .is_some_and(|t| rt.objects.is_subtype(&t, &path))
    };

    let found = match &container {
        Value::Null => {
            let mut index = 0;
            let mut found = None;
            while let Some(slot) = rt.objects.instance_at(index) {
                if let Some(obj) = slot
                    && wanted(obj)
                {
                    found = Some(obj);
                    break;
                }
                index += 1;
            }
            found
        }
        other => candidates(rt, other)?
            .into_iter()
            .filter_map(|v| v.as_object())
            .find(|obj| wanted(*obj)),
    };

    state.push_value(found.map(Value::Object).unwrap_or(Value::Null))?;
    Ok(None)
}

fn candidates(rt: &Runtime, container: &Value) -> Result<Vec<Value>, RuntimeError> {
    match container {
        Value::List(list) => rt.objects.list_snapshot(*list),
        Value::Object(obj) => match rt.objects.get_field(*obj, "contents")? {
            Value::List(list) => rt.objects.list_snapshot(list),
            _ => Ok(Vec::new()),
        },
        other => Err(type_error(format!(
            "cannot locate inside {}",
            other.type_name()
        ))),
    }
}

/// ( x y z -- obj )
pub fn locate_coord(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let [x, y, z] = pop3(state, rt)?;
    let coord = |v: &Value| {
        v.as_integer()
            .ok_or_else(|| type_error(format!("coordinates must be numbers, got {}", v.type_name())))
    };
    let (x, y, z) = (coord(&x)?, coord(&y)?, coord(&z)?);

    let turf = rt.host.locate_coord(x, y, z)?;
    state.push_value(turf.map(Value::Object).unwrap_or(Value::Null))?;
    Ok(None)
}

/// Three values in push order.
fn pop3(state: &mut InterpState, rt: &Runtime) -> Result<[Value; 3], RuntimeError> {
    let third = state.pop_value(rt)?;
    let second = state.pop_value(rt)?;
    let first = state.pop_value(rt)?;
    Ok([first, second, third])
}
