//! YAML data format backed by `serde_yaml`.

use super::{text_of, DataFormat, DecodeError, EncodeError};
use crate::document::{Content, MediaType};
use serde_json::Value;

pub struct YamlFormat {
    types: Vec<MediaType>,
}

impl YamlFormat {
    pub fn new() -> Self {
        Self {
            types: vec![
                MediaType::new("application", "x-yaml"),
                MediaType::new("application", "yaml"),
                MediaType::new("text", "yaml"),
            ],
        }
    }
}

impl Default for YamlFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl DataFormat for YamlFormat {
    fn name(&self) -> &str {
        "yaml"
    }

    fn readable_types(&self) -> &[MediaType] {
        &self.types
    }

    fn writable_types(&self) -> &[MediaType] {
        &self.types
    }

    fn decode(&self, content: &Content, media_type: &MediaType) -> Result<Value, DecodeError> {
        let text = text_of(content, media_type)?;
        serde_yaml::from_str(text)
            .map_err(|e| DecodeError::with_source(media_type, e.to_string(), e))
    }

    fn encode(&self, value: &Value, media_type: &MediaType) -> Result<Content, EncodeError> {
        serde_yaml::to_string(value)
            .map(Content::Text)
            .map_err(|e| EncodeError::with_source(media_type, e.to_string(), e))
    }
}
