//! Interpreter state for one bytecode proc invocation.

use std::rc::Rc;

use crate::bytecode::decode::{ArgKind, DecodeError, Reader};
use crate::bytecode::ir::ProcDefinition;
use crate::lang::arguments::ArgumentBundle;
use crate::lang::value::{ListRef, ObjectRef, ProcId, Value};
use crate::runtime::enumerator::Enumerator;
use crate::runtime::handlers::handler_for;
use crate::runtime::pool::SlotLease;
use crate::runtime::runtime_error::{RuntimeError, internal, type_error};
use crate::runtime::state::ProcStatus;
use crate::runtime::thread::ThreadId;
use crate::runtime::vm::Runtime;

/// A storage location an assignment can write back to.
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    Local(u8),
    /// The frame's `.` result variable.
    Result,
    Global(u32),
    Field { object: ObjectRef, name: Rc<str> },
    /// Index already evaluated, so `x[f()] += 1` runs `f()` once.
    ListIndex { list: ListRef, index: Value },
}

/// A resolved callee plus the object it runs on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallTarget {
    pub proc: ProcId,
    pub src: Option<ObjectRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StackEntry {
    Value(Value),
    Ref(Reference),
    Args(ArgumentBundle),
    Target(CallTarget),
}

/// An open Try region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatchRegion {
    pub catch_pc: usize,
    /// Where the exception value goes, if anywhere.
    pub slot: Option<u8>,
    pub stack_depth: usize,
    pub enum_depth: usize,
}

/// What to do with the value of the next nested call that returns.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnAction {
    Push,
    Discard,
    /// Push this instead, as `new` does with the created object.
    Replace(Value),
}

#[derive(Debug)]
pub struct InterpState {
    pub proc: ProcId,
    pub def: Rc<ProcDefinition>,
    pub src: Option<ObjectRef>,
    pub usr: Option<ObjectRef>,
    pub pc: usize,
    pub stack: Vec<StackEntry>,
    pub locals: SlotLease,
    pub enumerators: Vec<Enumerator>,
    pub catches: Vec<CatchRegion>,
    /// The `.` variable, returned when the proc runs off its end.
    pub result: Value,
    pub on_return: ReturnAction,
    max_stack: usize,
    finished: bool,
}

impl InterpState {
    pub fn new(
        proc: ProcId,
        def: Rc<ProcDefinition>,
        src: Option<ObjectRef>,
        usr: Option<ObjectRef>,
        locals: SlotLease,
        max_stack: usize,
    ) -> Self {
        InterpState {
            proc,
            def,
            src,
            usr,
            pc: 0,
            stack: Vec::new(),
            locals,
            enumerators: Vec::new(),
            catches: Vec::new(),
            result: Value::Null,
            on_return: ReturnAction::Push,
            max_stack,
            finished: false,
        }
    }

    /// Run until the proc returns, calls, or defers.
    pub fn resume(&mut self, thread: ThreadId, rt: &mut Runtime) -> Result<ProcStatus, RuntimeError> {
        if self.finished {
            return Err(internal(format!(
                "{} resumed after returning",
                self.def.qualified_name()
            )));
        }

        if let Some(src) = self.src
            && !rt.objects.is_live(src)
        {
            self.result = Value::Null;
            self.finished = true;
            return Ok(ProcStatus::Returned);
        }

        loop {
            if self.pc >= self.def.bytecode.len() {
                self.finished = true;
                return Ok(ProcStatus::Returned);
            }
            if !rt.take_step() {
                rt.wake.push(thread);
                return Ok(ProcStatus::Deferred);
            }

            let opcode = self.read(|r| r.read_opcode())?;
            if let Some(status) = handler_for(opcode)(self, rt)? {
                if matches!(status, ProcStatus::Returned) {
                    self.finished = true;
                }
                return Ok(status);
            }
        }
    }

    pub fn returned_into(&mut self, value: Value) -> Result<(), RuntimeError> {
        match std::mem::replace(&mut self.on_return, ReturnAction::Push) {
            ReturnAction::Push => self.push_value(value),
            ReturnAction::Discard => Ok(()),
            ReturnAction::Replace(replacement) => self.push_value(replacement),
        }
    }

    pub fn has_catch(&self) -> bool {
        !self.catches.is_empty()
    }

    /// Unwind to the innermost catch region. Side effects made since the
    /// region opened stay in place.
    pub fn catch(&mut self, error: &RuntimeError) -> bool {
        let Some(region) = self.catches.pop() else {
            return false;
        };
        self.stack.truncate(region.stack_depth);
        self.enumerators.truncate(region.enum_depth);
        self.on_return = ReturnAction::Push;
        self.pc = region.catch_pc;
        if let Some(slot) = region.slot
            && let Some(local) = self.locals.get_mut(slot as usize)
        {
            *local = error.exception_value();
        }
        true
    }

    /// Copy this state for a spawned thread. The copy shares nothing
    /// mutable with the original and continues at the current pc.
    pub fn fork(&self) -> Result<InterpState, RuntimeError> {
        if !self.enumerators.is_empty() {
            return Err(internal(format!(
                "{}: cannot spawn with {} open enumerator(s)",
                self.def.qualified_name(),
                self.enumerators.len()
            )));
        }
        Ok(InterpState {
            proc: self.proc,
            def: self.def.clone(),
            src: self.src,
            usr: self.usr,
            pc: self.pc,
            stack: self.stack.clone(),
            locals: self.locals.duplicate(),
            enumerators: Vec::new(),
            catches: self.catches.clone(),
            result: self.result.clone(),
            on_return: ReturnAction::Push,
            max_stack: self.max_stack,
            finished: false,
        })
    }

    // ─── Operands ───

    fn read<T>(
        &mut self,
        f: impl FnOnce(&mut Reader<'_>) -> Result<T, DecodeError>,
    ) -> Result<T, RuntimeError> {
        let mut reader = Reader::new(&self.def.bytecode, self.pc);
        let value = f(&mut reader)?;
        self.pc = reader.pos();
        Ok(value)
    }

    pub fn read_i32(&mut self) -> Result<i32, RuntimeError> {
        self.read(|r| r.read_i32())
    }

    pub fn read_f32(&mut self) -> Result<f32, RuntimeError> {
        self.read(|r| r.read_f32())
    }

    pub fn read_str(&mut self, rt: &Runtime) -> Result<Rc<str>, RuntimeError> {
        let id = self.read(|r| r.read_str())?;
        rt.string(id)
    }

    pub fn read_slot(&mut self) -> Result<u8, RuntimeError> {
        self.read(|r| r.read_slot())
    }

    pub fn read_jump(&mut self) -> Result<usize, RuntimeError> {
        self.read(|r| r.read_jump())
    }

    pub fn read_args(&mut self) -> Result<Vec<ArgKind>, RuntimeError> {
        self.read(|r| r.read_args())
    }

    pub fn jump(&mut self, target: usize) {
        self.pc = target;
    }

    // ─── Operand stack ───

    pub fn push(&mut self, entry: StackEntry) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.max_stack {
            return Err(internal(format!(
                "{}: operand stack overflow ({} entries)",
                self.def.qualified_name(),
                self.max_stack
            )));
        }
        self.stack.push(entry);
        Ok(())
    }

    pub fn push_value(&mut self, value: Value) -> Result<(), RuntimeError> {
        self.push(StackEntry::Value(value))
    }

    pub fn pop_entry(&mut self) -> Result<StackEntry, RuntimeError> {
        self.stack.pop().ok_or_else(|| {
            internal(format!(
                "{}: operand stack underflow at {}",
                self.def.qualified_name(),
                self.pc
            ))
        })
    }

    /// Pop a value, reading through a reference if that is what is on top.
    pub fn pop_value(&mut self, rt: &Runtime) -> Result<Value, RuntimeError> {
        match self.pop_entry()? {
            StackEntry::Value(value) => Ok(value),
            StackEntry::Ref(reference) => self.load(&reference, rt),
            StackEntry::Target(target) => Ok(Value::Proc(target.proc)),
            StackEntry::Args(_) => Err(internal("argument bundle used as a value")),
        }
    }

    /// Pop `n` values, returned in the order they were pushed. `n` comes
    /// from an operand, so the allocation is capped at the stack depth.
    pub fn pop_values(&mut self, n: usize, rt: &Runtime) -> Result<Vec<Value>, RuntimeError> {
        let mut values = Vec::with_capacity(n.min(self.stack.len()));
        for _ in 0..n {
            values.push(self.pop_value(rt)?);
        }
        values.reverse();
        Ok(values)
    }

    pub fn pop_ref(&mut self) -> Result<Reference, RuntimeError> {
        match self.pop_entry()? {
            StackEntry::Ref(reference) => Ok(reference),
            other => Err(internal(format!("expected a reference, found {:?}", other))),
        }
    }

    pub fn pop_args(&mut self, rt: &Runtime) -> Result<ArgumentBundle, RuntimeError> {
        match self.pop_entry()? {
            StackEntry::Args(args) => Ok(args),
            StackEntry::Value(Value::List(list)) => {
                Ok(ArgumentBundle::positional(rt.objects.list_snapshot(list)?))
            }
            other => Err(internal(format!("expected arguments, found {:?}", other))),
        }
    }

    pub fn pop_target(&mut self, rt: &Runtime) -> Result<CallTarget, RuntimeError> {
        match self.pop_entry()? {
            StackEntry::Target(target) => Ok(target),
            StackEntry::Value(Value::Proc(proc)) => Ok(CallTarget { proc, src: None }),
            StackEntry::Ref(reference) => match self.load(&reference, rt)? {
                Value::Proc(proc) => Ok(CallTarget { proc, src: None }),
                other => Err(type_error(format!("cannot call {}", other.type_name()))),
            },
            other => Err(internal(format!("expected a call target, found {:?}", other))),
        }
    }

    // ─── Storage ───

    pub fn local(&self, slot: u8) -> Result<&Value, RuntimeError> {
        self.locals
            .get(slot as usize)
            .ok_or_else(|| internal(format!("local slot {} out of range", slot)))
    }

    pub fn set_local(&mut self, slot: u8, value: Value) -> Result<(), RuntimeError> {
        let local = self
            .locals
            .get_mut(slot as usize)
            .ok_or_else(|| internal(format!("local slot {} out of range", slot)))?;
        *local = value;
        Ok(())
    }

    pub fn load(&self, reference: &Reference, rt: &Runtime) -> Result<Value, RuntimeError> {
        match reference {
            Reference::Local(slot) => self.local(*slot).cloned(),
            Reference::Result => Ok(self.result.clone()),
            Reference::Global(id) => rt.objects.get_global(*id),
            Reference::Field { object, name } => rt.objects.get_field(*object, name),
            Reference::ListIndex { list, index } => rt.objects.list_get(*list, index),
        }
    }

    pub fn store(
        &mut self,
        reference: &Reference,
        value: Value,
        rt: &mut Runtime,
    ) -> Result<(), RuntimeError> {
        match reference {
            Reference::Local(slot) => self.set_local(*slot, value),
            Reference::Result => {
                self.result = value;
                Ok(())
            }
            Reference::Global(id) => rt.objects.set_global(*id, value),
            Reference::Field { object, name } => rt.objects.set_field(*object, name, value),
            Reference::ListIndex { list, index } => rt.objects.list_set(*list, index, value),
        }
    }

    pub fn src_value(&self) -> Value {
        self.src.map(Value::Object).unwrap_or(Value::Null)
    }

    pub fn usr_value(&self) -> Value {
        self.usr.map(Value::Object).unwrap_or(Value::Null)
    }
}
