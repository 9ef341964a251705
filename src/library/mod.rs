//! Native function libraries.
//!
//! A [`Library`] contributes a table of native functions under one namespace.
//! Libraries are instantiated once per transformer build and merged into a
//! [`Namespace`] that scripts call into as `namespace.function(args...)`.

pub mod builtin;
pub mod importer;
pub mod namespace;

pub use builtin::{MorphLibrary, BUILTIN_NAMESPACE};
pub use importer::{Importer, InMemoryImporter, NoImports};
pub use namespace::{resolve, Namespace};

use crate::formats::{BoxError, FormatRegistry};
use crate::header::{is_identifier, Header};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error raised by a native function call.
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("expected {expected} argument(s), found {found}")]
    Arity { expected: usize, found: usize },

    #[error("argument {index}: {message}")]
    InvalidArgument { index: usize, message: String },

    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl FunctionError {
    pub fn failed(message: impl Into<String>) -> Self {
        FunctionError::Failed {
            message: message.into(),
            source: None,
        }
    }

    pub fn failed_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        FunctionError::Failed {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn invalid_argument(index: usize, message: impl Into<String>) -> Self {
        FunctionError::InvalidArgument {
            index,
            message: message.into(),
        }
    }
}

/// Fail unless exactly `expected` arguments were passed.
pub fn check_arity(args: &[Value], expected: usize) -> Result<(), FunctionError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(FunctionError::Arity {
            expected,
            found: args.len(),
        })
    }
}

/// The string argument at `index`.
pub fn string_arg(args: &[Value], index: usize) -> Result<&str, FunctionError> {
    match args.get(index) {
        Some(Value::String(text)) => Ok(text),
        Some(other) => Err(FunctionError::invalid_argument(
            index,
            format!("expected a string, found {}", type_name(other)),
        )),
        None => Err(FunctionError::invalid_argument(index, "missing argument")),
    }
}

/// Strings as-is, everything else as compact JSON.
pub(crate) fn display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Name of a value's type, for error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Trait for native functions callable from scripts.
///
/// Arguments arrive already evaluated. Implementations must be reentrant.
pub trait NativeFunction: Send + Sync {
    fn call(&self, args: &[Value]) -> Result<Value, FunctionError>;
}

impl<F> NativeFunction for F
where
    F: Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync,
{
    fn call(&self, args: &[Value]) -> Result<Value, FunctionError> {
        self(args)
    }
}

/// Error raised while a library builds its function table.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("function '{0}' is defined twice")]
    DuplicateFunction(String),

    #[error("'{0}' is not a valid function name")]
    InvalidName(String),

    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

/// Functions of one library, in definition order.
#[derive(Clone, Default)]
pub struct FunctionTable {
    functions: IndexMap<String, Arc<dyn NativeFunction>>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function.
    ///
    /// # Arguments
    ///
    /// * `name` - Function name, a plain identifier
    /// * `function` - The implementation, usually a closure
    ///
    /// # Returns
    ///
    /// * `Err(LibraryError::DuplicateFunction)` - `name` is already defined
    /// * `Err(LibraryError::InvalidName)` - `name` is not an identifier
    pub fn insert<F>(&mut self, name: impl Into<String>, function: F) -> Result<(), LibraryError>
    where
        F: Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        self.insert_shared(name, Arc::new(function))
    }

    /// Add a function implemented by a [`NativeFunction`] type.
    pub fn insert_shared(
        &mut self,
        name: impl Into<String>,
        function: Arc<dyn NativeFunction>,
    ) -> Result<(), LibraryError> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(LibraryError::InvalidName(name));
        }
        if self.functions.contains_key(&name) {
            return Err(LibraryError::DuplicateFunction(name));
        }
        self.functions.insert(name, function);
        Ok(())
    }

    /// Chaining form of [`FunctionTable::insert`].
    ///
    /// # Example
    ///
    /// ```
    /// use morphdoc::library::FunctionTable;
    /// use serde_json::Value;
    ///
    /// let table = FunctionTable::new()
    ///     .with("answer", |_args| Ok(Value::from(42)))
    ///     .unwrap();
    /// assert!(table.contains("answer"));
    /// ```
    pub fn with<F>(mut self, name: impl Into<String>, function: F) -> Result<Self, LibraryError>
    where
        F: Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        self.insert(name, function)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn NativeFunction>> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub(crate) fn into_entries(self) -> impl Iterator<Item = (String, Arc<dyn NativeFunction>)> {
        self.functions.into_iter()
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.functions.keys()).finish()
    }
}

/// Trait for namespaced function libraries.
pub trait Library: Send + Sync {
    /// Namespace scripts use to reach this library's functions.
    fn namespace(&self) -> &str;

    /// Build the function table. Called once per transformer build.
    ///
    /// # Arguments
    ///
    /// * `formats` - The registry snapshot the transformer will use
    /// * `header` - The parsed script header
    /// * `importer` - Source of auxiliary text resources
    fn functions(
        &self,
        formats: &FormatRegistry,
        header: &Header,
        importer: &Arc<dyn Importer>,
    ) -> Result<FunctionTable, LibraryError>;
}

/// Failure to assemble the namespace of a transformer.
#[derive(Debug, Error)]
pub enum LibraryResolutionError {
    #[error("namespace '{namespace}' is bound by more than one library")]
    Duplicate { namespace: String },

    #[error("namespace '{namespace}' is reserved for the built-in library")]
    Reserved { namespace: String },

    #[error("imported namespace '{namespace}' is not available")]
    Unresolved { namespace: String },

    #[error("'{namespace}' is not a valid namespace")]
    InvalidNamespace { namespace: String },

    #[error("library '{namespace}' failed to load")]
    Failed {
        namespace: String,
        #[source]
        source: LibraryError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shout(args: &[Value]) -> Result<Value, FunctionError> {
        check_arity(args, 1)?;
        Ok(Value::String(string_arg(args, 0)?.to_uppercase()))
    }

    #[test]
    fn test_register_and_call_function() {
        let table = FunctionTable::new().with("shout", shout).unwrap();

        let function = table.get("shout").unwrap();
        assert_eq!(function.call(&[json!("hi")]).unwrap(), json!("HI"));
        assert!(matches!(
            function.call(&[]),
            Err(FunctionError::Arity { expected: 1, found: 0 })
        ));
        assert!(matches!(
            function.call(&[json!(1)]),
            Err(FunctionError::InvalidArgument { index: 0, .. })
        ));
    }

    #[test]
    fn test_duplicate_function_rejected() {
        let err = FunctionTable::new()
            .with("shout", shout)
            .unwrap()
            .with("shout", shout)
            .unwrap_err();
        assert!(matches!(err, LibraryError::DuplicateFunction(name) if name == "shout"));
    }

    #[test]
    fn test_invalid_function_name() {
        let err = FunctionTable::new().with("not valid", shout).unwrap_err();
        assert!(matches!(err, LibraryError::InvalidName(_)));
    }
}
