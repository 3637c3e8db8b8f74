use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::bytecode::ir::{CompiledProgram, Parameter, ProcDefinition};
use crate::lang::value::{ProcId, Value};
use crate::runtime::runtime_error::{RuntimeError, internal};
use crate::runtime::state::{AsyncNative, NativeContext};

/// Host built-in that finishes in one call.
pub type NativeFn = fn(&mut NativeContext<'_>) -> Result<Value, RuntimeError>;

/// Builds a fresh task for each call of an async built-in, given the
/// resolved arguments.
pub type AsyncFactory = Rc<dyn Fn(&[Value]) -> Box<dyn AsyncNative>>;

#[derive(Clone)]
pub enum ProcKind {
    Bytecode(Rc<ProcDefinition>),
    Native(NativeFn),
    AsyncNative(AsyncFactory),
}

impl fmt::Debug for ProcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcKind::Bytecode(def) => write!(f, "Bytecode({} bytes)", def.bytecode.len()),
            ProcKind::Native(_) => write!(f, "Native"),
            ProcKind::AsyncNative(_) => write!(f, "AsyncNative"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcEntry {
    pub name: Rc<str>,
    /// Type path, empty for global procs.
    pub owner: Rc<str>,
    pub parameters: Vec<Parameter>,
    pub kind: ProcKind,
}

impl ProcEntry {
    pub fn qualified_name(&self) -> String {
        if self.owner.is_empty() {
            self.name.to_string()
        } else {
            format!("{}/{}", self.owner, self.name)
        }
    }
}

/// Every callable proc, addressed by `ProcId`.
///
/// Compiled procs keep the ids the compiler gave them; natives are appended
/// after them.
#[derive(Debug, Default)]
pub struct ProcRegistry {
    entries: Vec<ProcEntry>,
    by_name: HashMap<(Rc<str>, Rc<str>), ProcId>,
}

impl ProcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_program(program: &CompiledProgram) -> Self {
        let mut registry = ProcRegistry::new();
        for def in &program.procs {
            registry.register(ProcEntry {
                name: Rc::from(def.name.as_str()),
                owner: Rc::from(def.owner.as_str()),
                parameters: def.parameters.clone(),
                kind: ProcKind::Bytecode(Rc::new(def.clone())),
            });
        }
        registry
    }

    /// Add a proc. A later proc with the same owner and name shadows the
    /// earlier one for lookups by name.
    pub fn register(&mut self, entry: ProcEntry) -> ProcId {
        let id = ProcId(self.entries.len() as u32);
        self.by_name
            .insert((entry.owner.clone(), entry.name.clone()), id);
        self.entries.push(entry);
        id
    }

    pub fn get(&self, id: ProcId) -> Result<&ProcEntry, RuntimeError> {
        self.entries
            .get(id.0 as usize)
            .ok_or_else(|| internal(format!("no proc with id {}", id.0)))
    }

    pub fn find(&self, owner: &str, name: &str) -> Option<ProcId> {
        self.by_name
            .get(&(Rc::from(owner), Rc::from(name)))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProcId, &ProcEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (ProcId(i as u32), entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::emit::ProgramBuilder;

    fn answer(_: &mut NativeContext<'_>) -> Result<Value, RuntimeError> {
        Ok(Value::Integer(42))
    }

    #[test]
    fn test_program_ids_preserved_and_natives_appended() {
        let mut builder = ProgramBuilder::new();
        builder.proc("", "main", vec![], |_| {}).unwrap();
        builder.proc("/mob", "Login", vec![], |_| {}).unwrap();
        let mut registry = ProcRegistry::from_program(&builder.finish());

        assert_eq!(registry.find("", "main"), Some(ProcId(0)));
        assert_eq!(registry.find("/mob", "Login"), Some(ProcId(1)));

        let id = registry.register(ProcEntry {
            name: Rc::from("answer"),
            owner: Rc::from(""),
            parameters: vec![],
            kind: ProcKind::Native(answer),
        });
        assert_eq!(id, ProcId(2));
        assert_eq!(registry.get(id).unwrap().qualified_name(), "answer");
        assert!(registry.get(ProcId(9)).is_err());
    }

    #[test]
    fn test_later_definition_shadows_by_name() {
        let mut builder = ProgramBuilder::new();
        builder.proc("/mob", "act", vec![], |_| {}).unwrap();
        builder.proc("/mob", "act", vec![], |_| {}).unwrap();
        let registry = ProcRegistry::from_program(&builder.finish());
        assert_eq!(registry.find("/mob", "act"), Some(ProcId(1)));
        assert_eq!(registry.len(), 2);
    }
}
