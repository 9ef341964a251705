//! Script compilation and evaluation.
//!
//! The runtime talks to script engines through [`Evaluator`] and
//! [`CompiledScript`]. [`ExprEvaluator`] is the bundled engine: a small
//! expression language over JSON values with namespaced native calls.
//!
//! ```text
//! {
//!   name: morph.upper(payload.name),
//!   total: payload.price * payload.quantity,
//!   label: if payload.vip then 'gold' else 'standard',
//! }
//! ```

pub mod ast;
pub mod interpreter;
pub mod lexer;
pub mod parser;

use crate::library::{FunctionError, Namespace};
use indexmap::IndexMap;
use serde_json::Value;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// 1-based line and column in a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    /// Position of byte `offset` in `source`. Columns count characters.
    pub fn from_offset(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = &source[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |index| index + 1);
        let column = before[line_start..].chars().count() + 1;
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Error)]
pub enum ScriptCompileError {
    #[error("syntax error at {position}: {message}")]
    Syntax { position: Position, message: String },

    #[error("unknown function '{name}' at {position}")]
    UnknownFunction { name: String, position: Position },

    #[error("parameter '{0}' has no value and no default")]
    UnboundParameter(String),
}

/// Failure while running a compiled script.
///
/// `message`, `position` and `stack` are reported by the engine as-is.
/// `source` holds the native function error that caused the failure, if any.
#[derive(Debug)]
pub struct EvaluationError {
    pub message: String,
    pub position: Option<Position>,
    /// Native calls active at the failure, outermost first.
    pub stack: Vec<String>,
    pub source: Option<FunctionError>,
}

impl EvaluationError {
    pub fn new(message: impl Into<String>, position: Option<Position>) -> Self {
        Self {
            message: message.into(),
            position,
            stack: Vec::new(),
            source: None,
        }
    }
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(position) => write!(f, "evaluation failed at {}: {}", position, self.message)?,
            None => write!(f, "evaluation failed: {}", self.message)?,
        }
        if !self.stack.is_empty() {
            write!(f, " (in {})", self.stack.join(" > "))?;
        }
        Ok(())
    }
}

impl StdError for EvaluationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn StdError + 'static))
    }
}

/// Named values visible to a running script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    bindings: IndexMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, replacing any previous value.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bind(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// A script engine.
pub trait Evaluator: Send + Sync {
    /// Compile `script` against the functions bound in `namespace`.
    fn compile(
        &self,
        script: &str,
        namespace: &Namespace,
    ) -> Result<Box<dyn CompiledScript>, ScriptCompileError>;
}

/// A compiled script, evaluated any number of times, possibly concurrently.
pub trait CompiledScript: Send + Sync {
    fn evaluate(&self, env: &Environment, namespace: &Namespace) -> Result<Value, EvaluationError>;
}

/// The bundled expression engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprEvaluator;

impl Evaluator for ExprEvaluator {
    fn compile(
        &self,
        script: &str,
        namespace: &Namespace,
    ) -> Result<Box<dyn CompiledScript>, ScriptCompileError> {
        let mut parser = parser::Parser::new(script, namespace)?;
        let root = parser.parse_script()?;
        Ok(Box::new(interpreter::ExprScript::new(root)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::FormatRegistry;
    use crate::header::Header;
    use crate::library::{resolve, Importer, NoImports};
    use serde_json::json;
    use std::sync::Arc;

    fn builtin() -> Namespace {
        let importer: Arc<dyn Importer> = Arc::new(NoImports);
        resolve(&[], &[], &FormatRegistry::default(), &Header::default(), &importer).unwrap()
    }

    #[test]
    fn test_position_from_offset() {
        let source = "ab\ncdé\nf";
        assert_eq!(Position::from_offset(source, 0), Position { line: 1, column: 1 });
        assert_eq!(Position::from_offset(source, 4), Position { line: 2, column: 2 });
        assert_eq!(Position::from_offset(source, 7), Position { line: 2, column: 4 });
        assert_eq!(Position::from_offset(source, 8), Position { line: 3, column: 1 });
    }

    #[test]
    fn test_compile_and_evaluate() {
        let namespace = builtin();
        let script = ExprEvaluator
            .compile("{ name: morph.upper(payload.name), n: payload.n * 2 }", &namespace)
            .unwrap();

        let env = Environment::new().with("payload", json!({"name": "ada", "n": 21}));
        assert_eq!(
            script.evaluate(&env, &namespace).unwrap(),
            json!({"name": "ADA", "n": 42})
        );
    }

    #[test]
    fn test_evaluation_error_display() {
        let mut err = EvaluationError::new("boom", Some(Position { line: 2, column: 5 }));
        err.stack.push("morph.read".to_string());
        assert_eq!(err.to_string(), "evaluation failed at 2:5: boom (in morph.read)");
        assert!(err.source().is_none());
    }
}
