//! Opcode handlers, one function per opcode, grouped by category.
//!
//! A handler runs with the pc just past the opcode byte and reads its own
//! operands. `Ok(None)` continues with the next instruction; `Ok(Some(_))`
//! hands control back to the thread.

mod calls;
mod collections;
mod compare;
mod flow;
mod io;
mod math;
mod values;

use crate::bytecode::op::Opcode;
use crate::lang::arguments::ArgumentBundle;
use crate::lang::value::{ObjectRef, ProcId, Value};
use crate::runtime::interp::InterpState;
use crate::runtime::runtime_error::{RuntimeError, type_error};
use crate::runtime::state::ProcStatus;
use crate::runtime::vm::Runtime;

pub type Step = Result<Option<ProcStatus>, RuntimeError>;

pub type Handler = fn(&mut InterpState, &mut Runtime) -> Step;

/// Push a frame for `proc` on top of the caller. The callee inherits `usr`.
fn call_proc(
    state: &InterpState,
    rt: &mut Runtime,
    proc: ProcId,
    src: Option<ObjectRef>,
    args: ArgumentBundle,
) -> Step {
    let callee = rt.instantiate(proc, src, state.usr, &args)?;
    Ok(Some(ProcStatus::Called(Box::new(callee))))
}

/// Dispatch an operator on an object to its `operator<symbol>` proc.
fn call_operator(
    state: &InterpState,
    rt: &mut Runtime,
    obj: ObjectRef,
    symbol: &str,
    operands: Vec<Value>,
) -> Step {
    let name = format!("operator{}", symbol);
    match rt.objects.resolve_proc(obj, &name) {
        Some(proc) => call_proc(state, rt, proc, Some(obj), ArgumentBundle::positional(operands)),
        None => Err(type_error(format!(
            "{} does not define {}",
            rt.objects.type_of(obj).as_deref().unwrap_or("object"),
            name
        ))),
    }
}

pub fn handler_for(opcode: Opcode) -> Handler {
    use Opcode::*;
    match opcode {
        // Values
        PushNull => values::push_null,
        PushInt => values::push_int,
        PushFloat => values::push_float,
        PushString => values::push_string,
        PushPath => values::push_path,
        PushResource => values::push_resource,
        PushSrc => values::push_src,
        PushUsr => values::push_usr,
        PushResult => values::push_result,
        PushResultRef => values::push_result_ref,
        PushLocal => values::push_local,
        PushLocalRef => values::push_local_ref,
        SetLocal => values::set_local,
        PushGlobal => values::push_global,
        PushGlobalRef => values::push_global_ref,
        GetField => values::get_field,
        FieldRef => values::field_ref,
        SrcFieldRef => values::src_field_ref,
        Assign => values::assign,
        FormatString => values::format_string,
        Pop => values::pop,

        // Arithmetic
        Add => math::add,
        Subtract => math::subtract,
        Multiply => math::multiply,
        Divide => math::divide,
        Modulus => math::modulus,
        Power => math::power,
        Negate => math::negate,
        BitAnd => math::bit_and,
        BitOr => math::bit_or,
        BitXor => math::bit_xor,
        BitNot => math::bit_not,
        ShiftLeft => math::shift_left,
        ShiftRight => math::shift_right,
        BooleanNot => math::boolean_not,
        BooleanAnd => math::boolean_and,
        BooleanOr => math::boolean_or,
        Append => math::append,
        Remove => math::remove,
        Combine => math::combine,
        Mask => math::mask,

        // Comparison
        CompareEquals => compare::equals,
        CompareNotEquals => compare::not_equals,
        CompareLessThan => compare::less_than,
        CompareGreaterThan => compare::greater_than,
        CompareLessThanOrEqual => compare::less_than_or_equal,
        CompareGreaterThanOrEqual => compare::greater_than_or_equal,
        IsType => compare::is_type,
        IsNull => compare::is_null,
        IsInList => compare::is_in_list,

        // Control flow
        Jump => flow::jump,
        JumpIfFalse => flow::jump_if_false,
        JumpIfTrue => flow::jump_if_true,
        SwitchCase => flow::switch_case,
        SwitchCaseRange => flow::switch_case_range,
        Return => flow::ret,
        Error => flow::error,
        Try => flow::try_catch,
        TryNoValue => flow::try_no_value,
        EndTry => flow::end_try,
        Throw => flow::throw,
        Sleep => flow::sleep,
        Spawn => flow::spawn,

        // Collections and objects
        CreateList => collections::create_list,
        CreateListEnumerator => collections::create_list_enumerator,
        CreateRangeEnumerator => collections::create_range_enumerator,
        CreateTypeEnumerator => collections::create_type_enumerator,
        Enumerate => collections::enumerate,
        DestroyEnumerator => collections::destroy_enumerator,
        IndexList => collections::index_list,
        IndexListRef => collections::index_list_ref,
        CreateObject => collections::create_object,
        DeleteObject => collections::delete_object,

        // Calls
        PushArguments => calls::push_arguments,
        PushArgumentList => calls::push_argument_list,
        Call => calls::call,
        CallSelf => calls::call_self,
        CallStatement => calls::call_statement,
        DereferenceProc => calls::dereference_proc,
        GetProc => calls::get_proc,
        PushSuperProc => calls::push_super_proc,

        // Host I/O
        Browse => io::browse,
        BrowseResource => io::browse_resource,
        OutputControl => io::output_control,
        Prompt => io::prompt,
        Locate => io::locate,
        LocateCoord => io::locate_coord,
    }
}
