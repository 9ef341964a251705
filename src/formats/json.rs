//! JSON data format.

use super::{text_of, DataFormat, DecodeError, EncodeError};
use crate::document::{Content, MediaType};
use serde_json::Value;

/// Pretty-print when present with any value other than `false`.
pub const PARAM_FORMAT: &str = "fmt";

/// Reads and writes `application/json` and `application/*+json`.
pub struct JsonFormat {
    types: Vec<MediaType>,
}

impl JsonFormat {
    pub fn new() -> Self {
        Self {
            types: vec![
                MediaType::new("application", "json"),
                MediaType::new("application", "*+json"),
            ],
        }
    }
}

impl Default for JsonFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl DataFormat for JsonFormat {
    fn name(&self) -> &str {
        "json"
    }

    fn readable_types(&self) -> &[MediaType] {
        &self.types
    }

    fn writable_types(&self) -> &[MediaType] {
        &self.types
    }

    fn decode(&self, content: &Content, media_type: &MediaType) -> Result<Value, DecodeError> {
        if let Content::Value(value) = content {
            return Ok(value.clone());
        }

        let text = text_of(content, media_type)?;
        serde_json::from_str(text)
            .map_err(|e| DecodeError::with_source(media_type, e.to_string(), e))
    }

    fn encode(&self, value: &Value, media_type: &MediaType) -> Result<Content, EncodeError> {
        let pretty = media_type
            .param(PARAM_FORMAT)
            .map_or(false, |flag| !flag.eq_ignore_ascii_case("false"));

        let text = if pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };

        text.map(Content::Text)
            .map_err(|e| EncodeError::with_source(media_type, e.to_string(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_preserves_key_order() {
        let format = JsonFormat::new();
        let json_type = MediaType::parse("application/json").unwrap();

        let value = format
            .decode(&Content::from("{\"z\": 1, \"a\": 2}"), &json_type)
            .unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn test_decode_malformed() {
        let format = JsonFormat::new();
        let err = format
            .decode(&Content::from("not-json"), &MediaType::parse("application/json").unwrap())
            .unwrap_err();
        assert_eq!(err.media_type, "application/json");
        assert!(err.source.is_some());
    }

    #[test]
    fn test_encode_pretty() {
        let format = JsonFormat::new();
        let compact = format
            .encode(&json!({"a": 1}), &MediaType::parse("application/json").unwrap())
            .unwrap();
        assert_eq!(compact.as_str(), Some("{\"a\":1}"));

        let pretty = format
            .encode(&json!({"a": 1}), &MediaType::parse("application/json;fmt=true").unwrap())
            .unwrap();
        assert_eq!(pretty.as_str(), Some("{\n  \"a\": 1\n}"));
    }

    #[test]
    fn test_decode_binary_utf8() {
        let format = JsonFormat::new();
        let value = format
            .decode(
                &Content::from(b"[1,2]".to_vec()),
                &MediaType::parse("application/ld+json").unwrap(),
            )
            .unwrap();
        assert_eq!(value, json!([1, 2]));
    }
}
