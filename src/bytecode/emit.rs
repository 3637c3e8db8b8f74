//! Assembler for proc byte streams.
//!
//! This is the encoding half of the compiler contract: the code generator
//! (and the tests) build procs through [`ProgramBuilder`] and [`Emitter`]
//! instead of writing bytes by hand.

use std::collections::HashMap;

use thiserror::Error;

use crate::bytecode::ir::{CompiledProgram, Constant, Parameter, ProcDefinition};
use crate::bytecode::op::{ARG_NAMED, ARG_POSITIONAL, Opcode};
use crate::lang::value::ProcId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmitError {
    #[error("label {0} used but never placed")]
    UnboundLabel(usize),

    #[error("proc {0} was never declared")]
    UnknownProc(u32),
}

/// Interned string table shared by every proc of a program.
#[derive(Debug, Default)]
pub struct StringTable {
    strings: Vec<String>,
    index: HashMap<String, u32>,
}

impl StringTable {
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(id) = self.index.get(s) {
            return *id;
        }
        let id = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), id);
        id
    }

    pub fn into_vec(self) -> Vec<String> {
        self.strings
    }
}

/// Forward-referencable jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

pub struct Emitter<'a> {
    strings: &'a mut StringTable,
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
    slots_used: usize,
}

impl<'a> Emitter<'a> {
    pub fn new(strings: &'a mut StringTable) -> Self {
        Emitter {
            strings,
            code: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            slots_used: 0,
        }
    }

    /// Current byte offset.
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Place `label` at the current offset.
    pub fn mark(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.code.len());
        self
    }

    // ─── Raw encoding ───

    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.code.push(opcode as u8);
        self
    }

    pub fn int(&mut self, n: i32) -> &mut Self {
        self.code.extend_from_slice(&n.to_le_bytes());
        self
    }

    pub fn float(&mut self, n: f32) -> &mut Self {
        self.code.extend_from_slice(&n.to_le_bytes());
        self
    }

    pub fn str(&mut self, s: &str) -> &mut Self {
        let id = self.strings.intern(s);
        self.code.extend_from_slice(&id.to_le_bytes());
        self
    }

    pub fn slot(&mut self, slot: u8) -> &mut Self {
        self.slots_used = self.slots_used.max(slot as usize + 1);
        self.code.push(slot);
        self
    }

    pub fn jump(&mut self, target: Label) -> &mut Self {
        self.fixups.push((self.code.len(), target));
        self.code.extend_from_slice(&0i32.to_le_bytes());
        self
    }

    /// Argument descriptors: `None` for positional, `Some(name)` for named.
    pub fn args(&mut self, names: &[Option<&str>]) -> &mut Self {
        self.int(names.len() as i32);
        for name in names {
            match name {
                None => self.code.push(ARG_POSITIONAL),
                Some(name) => {
                    self.code.push(ARG_NAMED);
                    self.str(name);
                }
            }
        }
        self
    }

    // ─── Common instructions ───

    pub fn push_int(&mut self, n: i32) -> &mut Self {
        self.op(Opcode::PushInt).int(n)
    }

    pub fn push_float(&mut self, n: f32) -> &mut Self {
        self.op(Opcode::PushFloat).float(n)
    }

    pub fn push_string(&mut self, s: &str) -> &mut Self {
        self.op(Opcode::PushString).str(s)
    }

    pub fn push_path(&mut self, s: &str) -> &mut Self {
        self.op(Opcode::PushPath).str(s)
    }

    pub fn push_local(&mut self, slot: u8) -> &mut Self {
        self.op(Opcode::PushLocal).slot(slot)
    }

    pub fn set_local(&mut self, slot: u8) -> &mut Self {
        self.op(Opcode::SetLocal).slot(slot)
    }

    pub fn push_args(&mut self, names: &[Option<&str>]) -> &mut Self {
        self.op(Opcode::PushArguments).args(names)
    }

    /// `n` positional arguments.
    pub fn push_positional(&mut self, n: usize) -> &mut Self {
        let names = vec![None; n];
        self.push_args(&names)
    }

    pub fn jump_to(&mut self, opcode: Opcode, target: Label) -> &mut Self {
        self.op(opcode).jump(target)
    }

    /// Resolve labels and return the stream plus the number of slots it
    /// touches.
    pub fn finish(mut self) -> Result<(Vec<u8>, usize), EmitError> {
        for (at, label) in std::mem::take(&mut self.fixups) {
            let target = self.labels[label.0].ok_or(EmitError::UnboundLabel(label.0))?;
            self.code[at..at + 4].copy_from_slice(&(target as i32).to_le_bytes());
        }
        Ok((self.code, self.slots_used))
    }
}

/// Builds a whole [`CompiledProgram`].
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    strings: StringTable,
    procs: Vec<ProcDefinition>,
    globals: Vec<Constant>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a global with its initial value; returns its id.
    pub fn global(&mut self, initial: Constant) -> u32 {
        self.globals.push(initial);
        self.globals.len() as u32 - 1
    }

    /// Reserve a proc id so bodies can reference it before it is defined.
    pub fn declare(&mut self, owner: &str, name: &str, parameters: Vec<Parameter>) -> ProcId {
        self.procs.push(ProcDefinition {
            name: name.to_string(),
            owner: owner.to_string(),
            max_locals: parameters.len() as u8,
            parameters,
            super_proc: None,
            bytecode: Vec::new(),
        });
        ProcId(self.procs.len() as u32 - 1)
    }

    pub fn define(
        &mut self,
        id: ProcId,
        body: impl FnOnce(&mut Emitter),
    ) -> Result<(), EmitError> {
        let mut emitter = Emitter::new(&mut self.strings);
        body(&mut emitter);
        let (bytecode, slots) = emitter.finish()?;

        let def = self
            .procs
            .get_mut(id.0 as usize)
            .ok_or(EmitError::UnknownProc(id.0))?;
        def.max_locals = def.parameters.len().max(slots) as u8;
        def.bytecode = bytecode;
        Ok(())
    }

    /// Declare and define in one go.
    pub fn proc(
        &mut self,
        owner: &str,
        name: &str,
        parameters: Vec<Parameter>,
        body: impl FnOnce(&mut Emitter),
    ) -> Result<ProcId, EmitError> {
        let id = self.declare(owner, name, parameters);
        self.define(id, body)?;
        Ok(id)
    }

    pub fn set_super(&mut self, id: ProcId, parent: ProcId) -> Result<(), EmitError> {
        let def = self
            .procs
            .get_mut(id.0 as usize)
            .ok_or(EmitError::UnknownProc(id.0))?;
        def.super_proc = Some(parent);
        Ok(())
    }

    pub fn finish(self) -> CompiledProgram {
        CompiledProgram {
            strings: self.strings.into_vec(),
            procs: self.procs,
            globals: self.globals,
        }
    }
}
