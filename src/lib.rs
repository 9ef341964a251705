//! # Morphdoc: Script-Driven Document Transformation
//!
//! Morphdoc decodes an input document by its media type, runs a script over
//! the decoded value, and encodes the result as a negotiated output type.
//!
//! ## Features
//!
//! - **Media types**: parsing, pattern inclusion and specificity ranking
//! - **Pluggable data formats**: JSON, YAML, CSV, plain text and native values,
//!   selected by content negotiation
//! - **Script headers**: input, output, parameter, import and data format
//!   directives declared at the top of the script
//! - **Namespaced native libraries**: the built-in `morph` library plus any
//!   number of host libraries
//!
//! ## Example
//!
//! ```text
//! /** morphdoc
//! input payload application/json
//! output text/csv
//! param currency = "EUR"
//! */
//! [ { sku: payload.sku, price: morph.toString(payload.price) + ' ' + currency } ]
//! ```

// Core types
pub mod document;
pub mod error;
pub mod header;

// Data formats and negotiation
pub mod formats;

// Native function libraries
pub mod library;

// Script engine
pub mod eval;

pub mod config;
pub mod transformer;

// Re-export key types
pub use config::{ConfigError, RuntimeConfig};
pub use document::{Content, Document, MediaType, MediaTypeError};
pub use error::{Error, ErrorKind, Result};
pub use header::{Header, HeaderParseError};
pub use transformer::{Transformer, TransformerBuilder};

pub use formats::{
    DataFormat, DecodeError, Direction, EncodeError, FormatRegistry, FormatRegistryBuilder,
};
pub use library::{
    FunctionError, FunctionTable, Importer, InMemoryImporter, Library, LibraryError,
    LibraryResolutionError, Namespace, NativeFunction,
};
pub use eval::{CompiledScript, Environment, EvaluationError, Evaluator, ExprEvaluator, ScriptCompileError};
