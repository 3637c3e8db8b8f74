//! Jumps, switches, returns, catch regions and thread-level control.

use std::rc::Rc;

use crate::lang::value::Value;
use crate::runtime::handlers::Step;
use crate::runtime::interp::{CatchRegion, InterpState, ReturnAction};
use crate::runtime::runtime_error::{ErrorKind, RuntimeError, internal, type_error};
use crate::runtime::state::{AsyncState, ProcState, ProcStatus, SleepTask};
use crate::runtime::vm::Runtime;

pub fn jump(state: &mut InterpState, _rt: &mut Runtime) -> Step {
    let target = state.read_jump()?;
    state.jump(target);
    Ok(None)
}

pub fn jump_if_false(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let target = state.read_jump()?;
    if !state.pop_value(rt)?.is_truthy() {
        state.jump(target);
    }
    Ok(None)
}

pub fn jump_if_true(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let target = state.read_jump()?;
    if state.pop_value(rt)?.is_truthy() {
        state.jump(target);
    }
    Ok(None)
}

pub fn switch_case(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let target = state.read_jump()?;
    let case = state.pop_value(rt)?;
    let value = state.pop_value(rt)?;
    if value.equals(&case) {
        state.jump(target);
    } else {
        state.push_value(value)?;
    }
    Ok(None)
}

/// Ranges only match values they can be ordered against; anything else
/// falls through to the next case.
pub fn switch_case_range(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let target = state.read_jump()?;
    let high = state.pop_value(rt)?;
    let low = state.pop_value(rt)?;
    let value = state.pop_value(rt)?;

    let above_low = value.compare(&low).ok().flatten().is_some_and(|o| o.is_ge());
    let below_high = value.compare(&high).ok().flatten().is_some_and(|o| o.is_le());
    if above_low && below_high {
        state.jump(target);
    } else {
        state.push_value(value)?;
    }
    Ok(None)
}

pub fn ret(state: &mut InterpState, rt: &mut Runtime) -> Step {
    state.result = state.pop_value(rt)?;
    Ok(Some(ProcStatus::Returned))
}

pub fn error(_state: &mut InterpState, _rt: &mut Runtime) -> Step {
    Err(RuntimeError::new(ErrorKind::Thrown(Value::Null)))
}

// ─── Catch regions ───

fn open_region(state: &mut InterpState, catch_pc: usize, slot: Option<u8>) {
    let region = CatchRegion {
        catch_pc,
        slot,
        stack_depth: state.stack.len(),
        enum_depth: state.enumerators.len(),
    };
    state.catches.push(region);
}

pub fn try_catch(state: &mut InterpState, _rt: &mut Runtime) -> Step {
    let catch_pc = state.read_jump()?;
    let slot = state.read_slot()?;
    open_region(state, catch_pc, Some(slot));
    Ok(None)
}

pub fn try_no_value(state: &mut InterpState, _rt: &mut Runtime) -> Step {
    let catch_pc = state.read_jump()?;
    open_region(state, catch_pc, None);
    Ok(None)
}

pub fn end_try(state: &mut InterpState, _rt: &mut Runtime) -> Step {
    state
        .catches
        .pop()
        .ok_or_else(|| internal("END_TRY with no open catch region"))?;
    Ok(None)
}

pub fn throw(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let value = state.pop_value(rt)?;
    Err(RuntimeError::new(ErrorKind::Thrown(value)))
}

// ─── Suspension ───

fn pop_delay(state: &mut InterpState, rt: &mut Runtime) -> Result<u64, RuntimeError> {
    let delay = state.pop_value(rt)?;
    let deciseconds = match &delay {
        Value::Null => 0.0,
        other => other.as_number().ok_or_else(|| {
            type_error(format!("delay must be a number, got {}", other.type_name()))
        })?,
    };
    Ok(rt.config.delay_ticks(deciseconds))
}

pub fn sleep(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let ticks = pop_delay(state, rt)?;
    let task = AsyncState::new(
        None,
        Rc::from("sleep"),
        Box::new(SleepTask::new(ticks)),
        state.src,
        state.usr,
        Vec::new(),
    );
    state.on_return = ReturnAction::Discard;
    Ok(Some(ProcStatus::Called(Box::new(ProcState::Async(task)))))
}

/// The copy carries on after this instruction once the delay passes; this
/// state skips the spawned block.
pub fn spawn(state: &mut InterpState, rt: &mut Runtime) -> Step {
    let target = state.read_jump()?;
    let ticks = pop_delay(state, rt)?;
    let copy = state.fork()?;
    rt.spawn(copy, ticks);
    state.jump(target);
    Ok(None)
}
