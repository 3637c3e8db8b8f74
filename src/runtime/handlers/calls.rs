//! Argument bundles, proc lookup and calls.
//!
//! Every call leaves the caller suspended at the next instruction and hands
//! the new frame to the thread. The callee's return value lands on the
//! caller's operand stack.

use crate::bytecode::decode::ArgKind;
use crate::lang::arguments::ArgumentBundle;
use crate::lang::value::{ObjectRef, ProcId, Value};
use crate::runtime::handlers::{Step, call_proc};
use crate::runtime::interp::{CallTarget, InterpState, StackEntry};
use crate::runtime::runtime_error::{RuntimeError, type_error, undefined};
use crate::runtime::vm::Runtime;

/// ( v1 .. vn -- args )
pub fn push_arguments(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let kinds = state.read_args()?;
    let values = state.pop_values(kinds.len(), rt)?;

    let mut args = ArgumentBundle::new();
    for (kind, value) in kinds.into_iter().zip(values) {
        match kind {
            ArgKind::Positional => args.positional.push(value),
            ArgKind::Named(id) => {
                args.named.insert(rt.string(id)?.to_string(), value);
            }
        }
    }
    state.push(StackEntry::Args(args))?;
    Ok(None)
}

/// ( list -- args )
pub fn push_argument_list(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let args = match state.pop_value(rt)? {
        Value::Null => ArgumentBundle::new(),
        Value::List(list) => ArgumentBundle::positional(rt.objects.list_snapshot(list)?),
        other => {
            return Err(type_error(format!(
                "argument list must be a list, got {}",
                other.type_name()
            )));
        }
    };
    state.push(StackEntry::Args(args))?;
    Ok(None)
}

/// ( target args -- result ). Targets with no object of their own run on
/// the caller's `src`.
pub fn call(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let args = state.pop_args(rt)?;
    let target = state.pop_target(rt)?;
    let src = target.src.or(state.src);
    call_proc(state, rt, target.proc, src, args)
}

pub fn call_self(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let args = state.pop_args(rt)?;
    call_proc(state, rt, state.proc, state.src, args)
}

fn lookup_on(rt: &Runtime, obj: ObjectRef, name: &str) -> Result<ProcId, RuntimeError> {
    rt.objects
        .resolve_proc(obj, name)
        .ok_or_else(|| undefined("proc", name))
}

fn lookup_global(rt: &Runtime, name: &str) -> Result<ProcId, RuntimeError> {
    rt.find_proc("", name).ok_or_else(|| undefined("proc", name))
}

enum Callee {
    Named(String),
    Direct(ProcId),
}

/// ( obj name args -- result )
///
/// `name` is a string, a proc path whose last segment names the proc, or a
/// proc value. A null `obj` calls a global proc.
pub fn call_statement(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let args = state.pop_args(rt)?;
    let name = state.pop_value(rt)?;
    let owner = state.pop_value(rt)?;

    let callee = match &name {
        Value::Proc(proc) => Callee::Direct(*proc),
        Value::String(s) => Callee::Named(s.to_string()),
        Value::Path(p) => Callee::Named(p.rsplit('/').next().unwrap_or_default().to_string()),
        other => {
            return Err(type_error(format!(
                "call() expects a proc name, got {}",
                other.type_name()
            )));
        }
    };

    let (proc, src) = match (&owner, callee) {
        (Value::Object(obj), Callee::Named(name)) => (lookup_on(rt, *obj, &name)?, Some(*obj)),
        (Value::Object(obj), Callee::Direct(proc)) => (proc, Some(*obj)),
        (Value::Null, Callee::Named(name)) => (lookup_global(rt, &name)?, state.src),
        (Value::Null, Callee::Direct(proc)) => (proc, state.src),
        (other, _) => {
            return Err(type_error(format!("cannot call a proc on {}", other.type_name())));
        }
    };
    call_proc(state, rt, proc, src, args)
}

/// ( obj -- target )
pub fn dereference_proc(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let name = state.read_str(rt)?;
    let obj = match state.pop_value(rt)? {
        Value::Object(obj) => obj,
        other => {
            return Err(type_error(format!(
                "cannot call proc '{}' on {}",
                name,
                other.type_name()
            )));
        }
    };
    let proc = lookup_on(rt, obj, &name)?;
    state.push(StackEntry::Target(CallTarget {
        proc,
        src: Some(obj),
    }))?;
    Ok(None)
}

pub fn get_proc(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let name = state.read_str(rt)?;
    let proc = lookup_global(rt, &name)?;
    state.push(StackEntry::Target(CallTarget { proc, src: None }))?;
    Ok(None)
}

pub fn push_super_proc(state: &mut InterpState, _rt: &mut Runtime) -> Step {
    let proc = state
        .def
        .super_proc
        .ok_or_else(|| undefined("parent proc", state.def.qualified_name()))?;
    state.push(StackEntry::Target(CallTarget {
        proc,
        src: state.src,
    }))?;
    Ok(None)
}
