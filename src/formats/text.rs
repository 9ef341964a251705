//! Plain text: strings in, scalars out.

use super::{text_of, DataFormat, DecodeError, EncodeError};
use crate::document::{Content, MediaType};
use serde_json::Value;

pub struct PlainTextFormat {
    types: Vec<MediaType>,
}

impl PlainTextFormat {
    pub fn new() -> Self {
        Self {
            types: vec![MediaType::new("text", "plain")],
        }
    }
}

impl Default for PlainTextFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl DataFormat for PlainTextFormat {
    fn name(&self) -> &str {
        "text"
    }

    fn readable_types(&self) -> &[MediaType] {
        &self.types
    }

    fn writable_types(&self) -> &[MediaType] {
        &self.types
    }

    fn decode(&self, content: &Content, media_type: &MediaType) -> Result<Value, DecodeError> {
        text_of(content, media_type).map(|text| Value::String(text.to_string()))
    }

    fn encode(&self, value: &Value, media_type: &MediaType) -> Result<Content, EncodeError> {
        let text = match value {
            Value::Null => String::new(),
            Value::String(text) => text.clone(),
            Value::Bool(flag) => flag.to_string(),
            Value::Number(number) => number.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(EncodeError::new(
                    media_type,
                    "plain text can only represent strings, numbers, booleans and null",
                ))
            }
        };
        Ok(Content::Text(text))
    }
}
