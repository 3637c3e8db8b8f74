use std::collections::HashMap;

use crate::bytecode::ir::Parameter;
use crate::lang::value::Value;
use crate::runtime::runtime_error::{RuntimeError, undefined};

/// Call arguments as the caller wrote them: positional values in order plus
/// named values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentBundle {
    pub positional: Vec<Value>,
    pub named: HashMap<String, Value>,
}

impl ArgumentBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        ArgumentBundle {
            positional: values.into_iter().collect(),
            named: HashMap::new(),
        }
    }

    pub fn with_named(mut self, name: impl Into<String>, value: Value) -> Self {
        self.named.insert(name.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    /// Merge against a parameter list into dense slot values.
    ///
    /// For each parameter the named value wins, then the positional value at
    /// its index, then its constant default, then `Null`. Positional values
    /// past the last parameter are appended so natives can take variadic
    /// arguments. A named argument matching no parameter is a resolution
    /// error.
    pub fn resolve(&self, parameters: &[Parameter]) -> Result<Vec<Value>, RuntimeError> {
        if let Some(unknown) = self
            .named
            .keys()
            .find(|name| !parameters.iter().any(|p| &p.name == *name))
        {
            return Err(undefined("argument", unknown.clone()));
        }

        let mut values = Vec::with_capacity(parameters.len().max(self.positional.len()));
        for (i, param) in parameters.iter().enumerate() {
            let value = match (self.named.get(&param.name), self.positional.get(i)) {
                (Some(named), _) => named.clone(),
                (None, Some(positional)) => positional.clone(),
                (None, None) => param
                    .default
                    .as_ref()
                    .map(|constant| constant.to_value())
                    .unwrap_or(Value::Null),
            };
            values.push(value);
        }

        if self.positional.len() > parameters.len() {
            values.extend_from_slice(&self.positional[parameters.len()..]);
        }
        Ok(values)
    }
}
