//! Process-level defaults.
//!
//! [`RuntimeConfig`] supplies the fallback input and output media types used
//! when neither the caller nor the script header names one, and the default
//! key-ordering policy.

use crate::document::MediaType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const ENV_DEFAULT_INPUT: &str = "MORPHDOC_DEFAULT_INPUT";
pub const ENV_DEFAULT_OUTPUT: &str = "MORPHDOC_DEFAULT_OUTPUT";
pub const ENV_PRESERVE_ORDER: &str = "MORPHDOC_PRESERVE_ORDER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Input type for documents typed `*/*` when the header declares none.
    pub default_input: Option<MediaType>,

    /// Output type when neither the caller nor the header names one.
    pub default_output: Option<MediaType>,

    /// Keep result object keys in insertion order unless the header says
    /// otherwise.
    pub preserve_order: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_input: None,
            default_output: None,
            preserve_order: true,
        }
    }
}

impl RuntimeConfig {
    /// Read the `MORPHDOC_*` environment variables.
    ///
    /// Unparsable values are skipped with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let media_type = |name: &str| {
            let value = lookup(name)?;
            match MediaType::parse(&value) {
                Ok(media_type) => Some(media_type),
                Err(e) => {
                    tracing::warn!(variable = name, value = %value, error = %e, "ignoring invalid media type");
                    None
                }
            }
        };
        config.default_input = media_type(ENV_DEFAULT_INPUT);
        config.default_output = media_type(ENV_DEFAULT_OUTPUT);

        if let Some(value) = lookup(ENV_PRESERVE_ORDER) {
            match value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => config.preserve_order = true,
                "false" | "0" | "no" => config.preserve_order = false,
                _ => tracing::warn!(
                    variable = ENV_PRESERVE_ORDER,
                    value = %value,
                    "ignoring invalid boolean"
                ),
            }
        }

        config
    }

    /// Load configuration from a YAML file.
    ///
    /// # Arguments
    /// * `path` - Path to a YAML document with any of the keys
    ///   `default_input`, `default_output`, `preserve_order`
    ///
    /// # Example
    /// ```ignore
    /// use morphdoc::RuntimeConfig;
    ///
    /// let config = RuntimeConfig::load_from_file("morphdoc.yaml")?;
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn with_default_input(mut self, media_type: MediaType) -> Self {
        self.default_input = Some(media_type);
        self
    }

    pub fn with_default_output(mut self, media_type: MediaType) -> Self {
        self.default_output = Some(media_type);
        self
    }

    pub fn with_preserve_order(mut self, preserve_order: bool) -> Self {
        self.preserve_order = preserve_order;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.default_input.is_none());
        assert!(config.default_output.is_none());
        assert!(config.preserve_order);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_DEFAULT_INPUT, "application/json"),
            (ENV_DEFAULT_OUTPUT, "not a media type"),
            (ENV_PRESERVE_ORDER, "false"),
        ]
        .into_iter()
        .collect();

        let config = RuntimeConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.default_input, Some(MediaType::parse("application/json").unwrap()));
        assert!(config.default_output.is_none());
        assert!(!config.preserve_order);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "default_input: text/csv;header=absent").unwrap();
        writeln!(file, "default_output: application/x-yaml").unwrap();

        let config = RuntimeConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.default_input.unwrap().param("header"), Some("absent"));
        assert_eq!(config.default_output.unwrap().essence(), "application/x-yaml");
        assert!(config.preserve_order);
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            RuntimeConfig::load_from_file("/nonexistent/morphdoc.yaml"),
            Err(ConfigError::Read { .. })
        ));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "default_input: [not, a, type]").unwrap();
        assert!(matches!(
            RuntimeConfig::load_from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
