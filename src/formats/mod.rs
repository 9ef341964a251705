//! Data format registry.
//!
//! A [`DataFormat`] decodes raw document content of certain media types into
//! the evaluator's value model (`serde_json::Value`) and encodes values back.
//! Formats are held by an immutable [`FormatRegistry`] snapshot and selected
//! through [`negotiate`].
//!
//! Registration order is significant: when two formats claim equally good
//! patterns, the one registered first wins. The registry never re-sorts.

pub mod csv;
pub mod json;
pub mod negotiation;
pub mod text;
pub mod value;
pub mod xml;
pub mod yaml;

pub use self::csv::CsvFormat;
pub use self::json::JsonFormat;
pub use self::negotiation::{negotiate, Selection};
pub use self::text::PlainTextFormat;
pub use self::value::NativeValueFormat;
pub use self::xml::XmlFormat;
pub use self::yaml::YamlFormat;

use crate::document::{Content, Document, MediaType};
use crate::error::Error;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Whether a format is asked to read (decode) or write (encode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    /// The patterns a format declares for this direction.
    pub fn patterns(self, format: &dyn DataFormat) -> &[MediaType] {
        match self {
            Direction::Read => format.readable_types(),
            Direction::Write => format.writable_types(),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => write!(f, "read"),
            Direction::Write => write!(f, "write"),
        }
    }
}

/// Content was malformed for its declared media type.
#[derive(Debug, Error)]
#[error("cannot decode {media_type}: {message}")]
pub struct DecodeError {
    pub media_type: String,
    pub message: String,
    #[source]
    pub source: Option<BoxError>,
}

impl DecodeError {
    pub fn new(media_type: &MediaType, message: impl Into<String>) -> Self {
        Self {
            media_type: media_type.to_string(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        media_type: &MediaType,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            media_type: media_type.to_string(),
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// A value could not be represented in the negotiated output media type.
#[derive(Debug, Error)]
#[error("cannot encode as {media_type}: {message}")]
pub struct EncodeError {
    pub media_type: String,
    pub message: String,
    #[source]
    pub source: Option<BoxError>,
}

impl EncodeError {
    pub fn new(media_type: &MediaType, message: impl Into<String>) -> Self {
        Self {
            media_type: media_type.to_string(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        media_type: &MediaType,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            media_type: media_type.to_string(),
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Text view of textual content; binary content must be UTF-8.
pub(crate) fn text_of<'c>(
    content: &'c Content,
    media_type: &MediaType,
) -> Result<&'c str, DecodeError> {
    match content {
        Content::Text(text) => Ok(text),
        Content::Binary(bytes) => std::str::from_utf8(bytes)
            .map_err(|e| DecodeError::with_source(media_type, "content is not valid UTF-8", e)),
        Content::Empty => Ok(""),
        Content::Value(_) => Err(DecodeError::new(
            media_type,
            "expected textual content, found an in-process value",
        )),
    }
}

/// Trait for pluggable data formats (codecs).
///
/// Implementations must be reentrant: a registry, and every transformer built
/// from it, may call `decode`/`encode` from several threads at once.
pub trait DataFormat: Send + Sync {
    /// Short, human readable name (e.g. `json`).
    fn name(&self) -> &str;

    /// Patterns of media types this format can decode.
    fn readable_types(&self) -> &[MediaType];

    /// Patterns of media types this format can encode.
    fn writable_types(&self) -> &[MediaType];

    fn decode(&self, content: &Content, media_type: &MediaType) -> Result<Value, DecodeError>;

    fn encode(&self, value: &Value, media_type: &MediaType) -> Result<Content, EncodeError>;

    /// The media type to stamp on output when the request was a wildcard.
    fn canonical_type(&self) -> Option<&MediaType> {
        self.writable_types().iter().find(|media_type| !media_type.is_wildcard())
    }
}

/// Immutable, ordered snapshot of data formats.
///
/// Cloning is cheap and shares the snapshot.
#[derive(Clone)]
pub struct FormatRegistry {
    formats: Arc<[Arc<dyn DataFormat>]>,
}

impl FormatRegistry {
    pub fn builder() -> FormatRegistryBuilder {
        FormatRegistryBuilder::new()
    }

    /// A registry with no formats.
    pub fn empty() -> Self {
        FormatRegistryBuilder::new().build()
    }

    /// A builder pre-populated with this registry's formats, for extension.
    pub fn to_builder(&self) -> FormatRegistryBuilder {
        FormatRegistryBuilder {
            formats: self.formats.to_vec(),
        }
    }

    /// Formats in registration order.
    pub fn formats(&self) -> &[Arc<dyn DataFormat>] {
        &self.formats
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    /// Negotiate the format that reads `media_type`.
    pub fn reader_for<'a>(&'a self, media_type: &'a MediaType) -> Result<Selection<'a>, Error> {
        let requested = std::slice::from_ref(media_type);
        negotiate(Direction::Read, requested, &self.formats)
            .ok_or_else(|| Error::unsupported(requested, Direction::Read))
    }

    /// Negotiate the format that writes one of `requested`.
    pub fn writer_for<'a>(&'a self, requested: &'a [MediaType]) -> Result<Selection<'a>, Error> {
        negotiate(Direction::Write, requested, &self.formats)
            .ok_or_else(|| Error::unsupported(requested, Direction::Write))
    }

    /// Decode content typed `media_type`. Empty content is `null` without
    /// consulting any format.
    pub fn decode(&self, content: &Content, media_type: &MediaType) -> Result<Value, Error> {
        if content.is_empty() {
            return Ok(Value::Null);
        }

        let selection = self.reader_for(media_type)?;
        Ok(selection.format.decode(content, media_type)?)
    }

    /// Encode `value` as the best of `requested`, returning the new document.
    pub fn encode(&self, value: &Value, requested: &[MediaType]) -> Result<Document, Error> {
        let selection = self.writer_for(requested)?;
        let media_type = selection.output_type();
        let content = selection.format.encode(value, &media_type)?;
        Ok(Document::new(content, media_type))
    }
}

impl Default for FormatRegistry {
    /// JSON, native value, CSV, YAML, XML and plain text, in that order.
    fn default() -> Self {
        FormatRegistryBuilder::new()
            .register(JsonFormat::new())
            .register(NativeValueFormat::new())
            .register(CsvFormat::new())
            .register(YamlFormat::new())
            .register(XmlFormat::new())
            .register(PlainTextFormat::new())
            .build()
    }
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.formats.iter().map(|format| format.name()))
            .finish()
    }
}

/// Append-only accumulator producing a [`FormatRegistry`] snapshot.
#[derive(Default)]
pub struct FormatRegistryBuilder {
    formats: Vec<Arc<dyn DataFormat>>,
}

impl FormatRegistryBuilder {
    pub fn new() -> Self {
        Self {
            formats: Vec::new(),
        }
    }

    /// Append a format. Earlier registrations win negotiation ties.
    pub fn register(mut self, format: impl DataFormat + 'static) -> Self {
        self.formats.push(Arc::new(format));
        self
    }

    /// Append an already shared format.
    pub fn register_shared(mut self, format: Arc<dyn DataFormat>) -> Self {
        self.formats.push(format);
        self
    }

    /// Append several shared formats, keeping their order.
    pub fn extend<I>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn DataFormat>>,
    {
        self.formats.extend(formats);
        self
    }

    pub fn build(self) -> FormatRegistry {
        FormatRegistry {
            formats: self.formats.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_registry_order() {
        let registry = FormatRegistry::default();
        let names: Vec<&str> = registry.formats().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["json", "value", "csv", "yaml", "xml", "text"]);
    }

    #[test]
    fn test_decode_and_encode_json() {
        let registry = FormatRegistry::default();
        let json_type = MediaType::parse("application/json").unwrap();

        let value = registry
            .decode(&Content::from("{\"a\": [1, 2]}"), &json_type)
            .unwrap();
        assert_eq!(value, json!({"a": [1, 2]}));

        let doc = registry.encode(&value, &[json_type.clone()]).unwrap();
        assert_eq!(doc.as_str(), Some("{\"a\":[1,2]}"));
        assert_eq!(doc.media_type(), &json_type);
    }

    #[test]
    fn test_empty_content_is_null() {
        let registry = FormatRegistry::empty();
        let value = registry
            .decode(&Content::Empty, &MediaType::parse("application/x-unknown").unwrap())
            .unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_unknown_media_type_is_unsupported() {
        let registry = FormatRegistry::default();
        let unknown = MediaType::parse("application/x-nonexistent").unwrap();

        let err = registry.encode(&json!(1), &[unknown.clone()]).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedMediaType { direction: Direction::Write, .. }
        ));

        let err = registry.decode(&Content::from("1"), &unknown).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedMediaType { direction: Direction::Read, .. }
        ));
    }

    #[test]
    fn test_wildcard_request_stamps_canonical_type() {
        let registry = FormatRegistry::default();
        let doc = registry
            .encode(&json!({"a": 1}), &[MediaType::parse("*/*").unwrap()])
            .unwrap();
        assert_eq!(doc.media_type().essence(), "application/json");
    }

    #[test]
    fn test_wildcard_request_with_params() {
        let registry = FormatRegistry::default();

        let doc = registry
            .encode(&json!({"a": 1}), &[MediaType::parse("*/*;fmt=pretty").unwrap()])
            .unwrap();
        assert_eq!(doc.media_type().to_string(), "application/json;fmt=pretty");
        assert_eq!(doc.as_str(), Some("{\n  \"a\": 1\n}"));

        let doc = registry
            .encode(&json!("hi"), &[MediaType::parse("application/*;charset=utf-8").unwrap()])
            .unwrap();
        assert_eq!(doc.media_type().to_string(), "application/json;charset=utf-8");
        assert_eq!(doc.as_str(), Some("\"hi\""));
    }

    #[test]
    fn test_to_builder_extends_snapshot() {
        let base = FormatRegistry::builder().register(JsonFormat::new()).build();
        let extended = base.to_builder().register(PlainTextFormat::new()).build();

        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
    }
}
