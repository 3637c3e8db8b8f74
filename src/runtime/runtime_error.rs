use thiserror::Error;

use crate::bytecode::decode::DecodeError;
use crate::lang::value::Value;

/// What went wrong, independent of where.
#[derive(Debug, Clone, Error)]
pub enum ErrorKind {
    /// An opcode's operand tags make the operation undefined.
    #[error("type error: {0}")]
    Type(String),

    /// A proc, field, global or identifier could not be resolved.
    #[error("undefined {what} '{name}'")]
    Resolution { what: &'static str, name: String },

    #[error("list index {index} out of bounds (length {len})")]
    Index { index: String, len: usize },

    #[error("division by zero")]
    DivisionByZero,

    /// Raised by a script `throw`; the payload is what a catch region receives.
    #[error("{}", thrown_message(.0))]
    Thrown(Value),

    #[error("call depth limit exceeded ({0})")]
    StackDepth(usize),

    /// An interpreter invariant was violated. Never catchable.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("thread cancelled")]
    Cancelled,
}

fn thrown_message(value: &Value) -> String {
    match value {
        Value::Null => "exception thrown".to_string(),
        other => other.to_string(),
    }
}

impl ErrorKind {
    /// Whether a Try/Catch region may intercept this error.
    pub fn is_catchable(&self) -> bool {
        !matches!(self, ErrorKind::Internal(_) | ErrorKind::Cancelled)
    }
}

/// A language-level runtime error plus the frames it unwound through.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub call_stack: Vec<String>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.kind)?;

        if !self.call_stack.is_empty() {
            write!(f, "\n  call stack:")?;

            for (i, frame) in self.call_stack.iter().enumerate() {
                write!(f, "\n    {}: {}", i, frame)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

impl RuntimeError {
    pub fn new(kind: ErrorKind) -> Self {
        RuntimeError {
            kind,
            call_stack: Vec::new(),
        }
    }

    /// Record one more frame, innermost first.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.call_stack.push(context.into());
        self
    }

    pub fn is_catchable(&self) -> bool {
        self.kind.is_catchable()
    }

    /// The value a catch region stores into its exception slot.
    pub fn exception_value(&self) -> Value {
        match &self.kind {
            ErrorKind::Thrown(value) => value.clone(),
            other => Value::string(other.to_string()),
        }
    }
}

impl From<ErrorKind> for RuntimeError {
    fn from(kind: ErrorKind) -> Self {
        RuntimeError::new(kind)
    }
}

impl From<DecodeError> for RuntimeError {
    fn from(err: DecodeError) -> Self {
        internal(err.to_string())
    }
}

// ─────────────────────────── Constructors ───────────────────────────

pub fn type_error(message: impl Into<String>) -> RuntimeError {
    RuntimeError::new(ErrorKind::Type(message.into()))
}

pub fn undefined(what: &'static str, name: impl Into<String>) -> RuntimeError {
    RuntimeError::new(ErrorKind::Resolution {
        what,
        name: name.into(),
    })
}

pub fn internal(message: impl Into<String>) -> RuntimeError {
    RuntimeError::new(ErrorKind::Internal(message.into()))
}

pub fn index_out_of_bounds(index: &Value, len: usize) -> RuntimeError {
    RuntimeError::new(ErrorKind::Index {
        index: index.to_string(),
        len,
    })
}

pub fn division_by_zero() -> RuntimeError {
    RuntimeError::new(ErrorKind::DivisionByZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_lists_frames_innermost_first() {
        let err = type_error("cannot add string and integer")
            .with_context("/mob/proc/inner")
            .with_context("/mob/proc/outer");
        let text = err.to_string();
        assert!(text.starts_with("runtime error: type error: cannot add"));
        let inner = text.find("0: /mob/proc/inner").unwrap();
        let outer = text.find("1: /mob/proc/outer").unwrap();
        assert!(inner < outer);
    }

    #[test]
    fn test_internal_errors_are_not_catchable() {
        assert!(!internal("bad").is_catchable());
        assert!(!RuntimeError::new(ErrorKind::Cancelled).is_catchable());
        assert!(undefined("proc", "foo").is_catchable());
        assert!(RuntimeError::new(ErrorKind::StackDepth(400)).is_catchable());
    }

    #[test]
    fn test_exception_value() {
        let thrown = RuntimeError::new(ErrorKind::Thrown(Value::Integer(7)));
        assert_eq!(thrown.exception_value(), Value::Integer(7));
        assert_eq!(
            division_by_zero().exception_value(),
            Value::string("division by zero")
        );
    }
}
