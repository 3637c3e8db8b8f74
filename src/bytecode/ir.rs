use serde::{Deserialize, Serialize};

use crate::lang::value::{ProcId, Value};

/// A compiled program as handed over by the compiler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledProgram {
    /// Shared string table. `Str` operands index into it.
    pub strings: Vec<String>,

    /// Proc definitions. A proc's index is its `ProcId`.
    pub procs: Vec<ProcDefinition>,

    /// Initial values of the global variables, indexed by global id.
    pub globals: Vec<Constant>,
}

impl CompiledProgram {
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }

    pub fn proc(&self, id: ProcId) -> Option<&ProcDefinition> {
        self.procs.get(id.0 as usize)
    }

    /// Find a proc by `owner` and `name`.
    pub fn find_proc(&self, owner: &str, name: &str) -> Option<ProcId> {
        self.procs
            .iter()
            .position(|p| p.owner == owner && p.name == name)
            .map(|i| ProcId(i as u32))
    }
}

/// Static description of one compiled proc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcDefinition {
    pub name: String,

    /// Type path the proc is defined on; the empty string for global procs.
    pub owner: String,

    /// Declared parameters, in slot order. Parameter `i` lives in local slot `i`.
    pub parameters: Vec<Parameter>,

    /// Local slots the body needs, parameters included.
    pub max_locals: u8,

    /// The definition this one overrides, for `..()`.
    pub super_proc: Option<ProcId>,

    pub bytecode: Vec<u8>,
}

impl ProcDefinition {
    /// `owner/name`, or just `name` for global procs.
    pub fn qualified_name(&self) -> String {
        if self.owner.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.owner, self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,

    /// Constant default. Non-constant defaults are compiled into the proc's
    /// prologue instead, which tests the slot for null.
    pub default: Option<Constant>,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Parameter {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: Constant) -> Self {
        Parameter {
            name: name.into(),
            default: Some(default),
        }
    }
}

/// The serializable subset of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Null,
    Integer(i32),
    Float(f32),
    String(String),
    Path(String),
    Resource(String),
}

impl Constant {
    pub fn to_value(&self) -> Value {
        match self {
            Constant::Null => Value::Null,
            Constant::Integer(n) => Value::Integer(*n),
            Constant::Float(n) => Value::Float(*n),
            Constant::String(s) => Value::string(s),
            Constant::Path(p) => Value::path(p),
            Constant::Resource(r) => Value::resource(r),
        }
    }
}
