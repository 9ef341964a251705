//! Documents: opaque content tagged with a media type.
//!
//! A [`Document`] never carries behavior. Data formats interpret its content by
//! convention, keyed off the media type.

pub mod media_type;

pub use media_type::{MediaType, MediaTypeError, Specificity};

use serde_json::Value;
use std::sync::Arc;

/// Raw document content.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// No content; always decodes to `null`.
    Empty,
    Text(String),
    Binary(Vec<u8>),
    /// An already structured, in-process value.
    Value(Value),
}

impl Content {
    /// Text view of textual content.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Byte view of textual or binary content.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Content::Text(text) => Some(text.as_bytes()),
            Content::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Content::Empty)
    }

    /// Short name of the content kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Content::Empty => "empty",
            Content::Text(_) => "text",
            Content::Binary(_) => "binary",
            Content::Value(_) => "value",
        }
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Content::Binary(bytes)
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Content::Value(value)
    }
}

/// Immutable `(content, media type)` pair.
///
/// Content is shared: cloning a document or changing its media type never
/// copies the content.
#[derive(Debug, Clone)]
pub struct Document {
    content: Arc<Content>,
    media_type: MediaType,
}

impl Document {
    pub fn new(content: impl Into<Content>, media_type: MediaType) -> Self {
        Self {
            content: Arc::new(content.into()),
            media_type,
        }
    }

    /// A document whose media type is left to header or configured defaults.
    pub fn untyped(content: impl Into<Content>) -> Self {
        Self::new(content, MediaType::any())
    }

    /// Empty content typed `*/*`.
    pub fn empty() -> Self {
        Self::new(Content::Empty, MediaType::any())
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    /// The shared content handle.
    pub fn shared_content(&self) -> &Arc<Content> {
        &self.content
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    pub fn as_str(&self) -> Option<&str> {
        self.content.as_str()
    }

    /// A new document sharing this document's content.
    pub fn with_media_type(&self, media_type: MediaType) -> Self {
        Self {
            content: Arc::clone(&self.content),
            media_type,
        }
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.media_type == other.media_type && self.content == other.content
    }
}
