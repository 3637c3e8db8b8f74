use std::cmp::Ordering;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::runtime::runtime_error::{RuntimeError, type_error};

/// Handle to a live object owned by the object model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef(pub u32);

/// Handle to a list owned by the object model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListRef(pub u32);

/// Index of a proc in the runtime's proc registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcId(pub u32);

/// Runtime value of the scripting language.
///
/// Values are immutable; lists and objects are shared through handles and
/// mutated only through the object model.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,

    /// 32-bit signed integer, the width the bytecode encodes literals in.
    Integer(i32),

    /// 32-bit float.
    Float(f32),

    String(Rc<str>),

    /// Reference to a live object. There is no null object reference;
    /// absent objects are `Null`.
    Object(ObjectRef),

    /// Type path such as `/mob/player`.
    Path(Rc<str>),

    /// Resource file path such as `'icons/mob.dmi'`.
    Resource(Rc<str>),

    Proc(ProcId),

    List(ListRef),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::String(Rc::from(s.as_ref()))
    }

    pub fn path(s: impl AsRef<str>) -> Value {
        Value::Path(Rc::from(s.as_ref()))
    }

    pub fn resource(s: impl AsRef<str>) -> Value {
        Value::Resource(Rc::from(s.as_ref()))
    }

    pub fn from_bool(b: bool) -> Value {
        Value::Integer(if b { 1 } else { 0 })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Path(_) => "path",
            Value::Resource(_) => "resource",
            Value::Proc(_) => "proc",
            Value::List(_) => "list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numbers are truthy when non-zero, strings when non-empty, null never;
    /// every handle (object, list, path, resource, proc) is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Integer(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Object(_)
            | Value::Path(_)
            | Value::Resource(_)
            | Value::Proc(_)
            | Value::List(_) => true,
        }
    }

    pub fn as_number(&self) -> Option<f32> {
        match self {
            Value::Integer(n) => Some(*n as f32),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Float(n) if n.fract() == 0.0 => Some(*n as i32),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(obj) => Some(*obj),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<ListRef> {
        match self {
            Value::List(list) => Some(*list),
            _ => None,
        }
    }

    /// Language-level equality.
    ///
    /// Mismatched tags are unequal, except integers and floats which compare
    /// numerically. `Null` only equals `Null`.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) => (*a as f32) == *b,
            (Value::Float(a), Value::Integer(b)) => *a == (*b as f32),
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Path(a), Value::Path(b)) => a == b,
            (Value::Resource(a), Value::Resource(b)) => a == b,
            (Value::Proc(a), Value::Proc(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }

    /// Ordering used by `<`, `<=`, `>` and `>=` alike.
    ///
    /// Numbers order numerically and `Null` counts as zero against a number
    /// (or another `Null`); strings order lexicographically. Any other pairing
    /// is a type error. `Ok(None)` means the operands are unordered (NaN).
    pub fn compare(&self, other: &Value) -> Result<Option<Ordering>, RuntimeError> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Ok(Some(a.as_ref().cmp(b.as_ref()))),
            (Value::Integer(a), Value::Integer(b)) => Ok(Some(a.cmp(b))),
            _ => match (self.ordering_number(), other.ordering_number()) {
                (Some(a), Some(b)) => Ok(a.partial_cmp(&b)),
                _ => Err(type_error(format!(
                    "cannot compare {} and {}",
                    self.type_name(),
                    other.type_name()
                ))),
            },
        }
    }

    fn ordering_number(&self) -> Option<f32> {
        match self {
            Value::Null => Some(0.0),
            other => other.as_number(),
        }
    }
}

impl std::fmt::Display for Value {
    /// Stringify a value the way string interpolation renders it.
    ///
    /// Objects render as their handle; interpolation asks the object model
    /// for a display name instead.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(n) => {
                if n.fract() == 0.0 && n.abs() < 1e7 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "{}", s),
            Value::Object(obj) => write!(f, "[object {}]", obj.0),
            Value::Path(p) => write!(f, "{}", p),
            Value::Resource(r) => write!(f, "{}", r),
            Value::Proc(id) => write!(f, "[proc {}]", id.0),
            Value::List(_) => write!(f, "/list"),
        }
    }
}
