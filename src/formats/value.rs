//! In-process structured values.

use super::{DataFormat, DecodeError, EncodeError};
use crate::document::{Content, MediaType};
use serde_json::Value;

/// Passes `Content::Value` through untouched, typed `application/x-value`.
pub struct NativeValueFormat {
    types: Vec<MediaType>,
}

impl NativeValueFormat {
    pub fn new() -> Self {
        Self {
            types: vec![MediaType::new("application", "x-value")],
        }
    }
}

impl Default for NativeValueFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl DataFormat for NativeValueFormat {
    fn name(&self) -> &str {
        "value"
    }

    fn readable_types(&self) -> &[MediaType] {
        &self.types
    }

    fn writable_types(&self) -> &[MediaType] {
        &self.types
    }

    fn decode(&self, content: &Content, media_type: &MediaType) -> Result<Value, DecodeError> {
        match content {
            Content::Value(value) => Ok(value.clone()),
            Content::Empty => Ok(Value::Null),
            other => Err(DecodeError::new(
                media_type,
                format!("expected an in-process value, found {} content", other.kind()),
            )),
        }
    }

    fn encode(&self, value: &Value, _media_type: &MediaType) -> Result<Content, EncodeError> {
        Ok(Content::Value(value.clone()))
    }
}
