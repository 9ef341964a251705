//! Transformer construction and execution.
//!
//! A [`Transformer`] binds one compiled script to its header, a format
//! registry snapshot and a resolved namespace. It is built once by
//! [`TransformerBuilder`] and may then serve any number of concurrent
//! [`Transformer::transform`] calls.

use crate::config::RuntimeConfig;
use crate::document::media_type::PARAM_QUALITY;
use crate::document::{Content, Document, MediaType};
use crate::error::{Error, Result};
use crate::eval::{CompiledScript, Environment, Evaluator, ExprEvaluator, ScriptCompileError};
use crate::formats::{DataFormat, Direction, FormatRegistry};
use crate::header::{is_identifier, Header, PAYLOAD};
use crate::library::{resolve, Importer, Library, Namespace, NoImports};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Collects everything a [`Transformer`] needs, then builds it atomically.
///
/// # Example
///
/// ```
/// use morphdoc::{Document, MediaType, TransformerBuilder};
///
/// let transformer = TransformerBuilder::new("{ greeting: morph.upper(payload.name) }")
///     .build()
///     .unwrap();
///
/// let input = Document::new("{\"name\": \"ada\"}", MediaType::parse("application/json").unwrap());
/// let output = transformer
///     .transform(&input, Some(&MediaType::parse("application/json").unwrap()))
///     .unwrap();
/// assert_eq!(output.as_str(), Some("{\"greeting\":\"ADA\"}"));
/// ```
pub struct TransformerBuilder {
    script: String,
    formats: FormatRegistry,
    libraries: Vec<Arc<dyn Library>>,
    importable: Vec<Arc<dyn Library>>,
    importer: Arc<dyn Importer>,
    evaluator: Arc<dyn Evaluator>,
    config: RuntimeConfig,
}

impl TransformerBuilder {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            formats: FormatRegistry::default(),
            libraries: Vec::new(),
            importable: Vec::new(),
            importer: Arc::new(NoImports),
            evaluator: Arc::new(ExprEvaluator),
            config: RuntimeConfig::default(),
        }
    }

    /// Replace the format registry.
    pub fn with_formats(mut self, formats: FormatRegistry) -> Self {
        self.formats = formats;
        self
    }

    /// Append a format after those already registered.
    pub fn with_format(mut self, format: impl DataFormat + 'static) -> Self {
        self.formats = self.formats.to_builder().register(format).build();
        self
    }

    /// Bind a library unconditionally. Libraries bind in the order supplied.
    pub fn with_library(self, library: impl Library + 'static) -> Self {
        self.with_shared_library(Arc::new(library))
    }

    pub fn with_shared_library(mut self, library: Arc<dyn Library>) -> Self {
        self.libraries.push(library);
        self
    }

    /// Make a library available to header `import` directives.
    pub fn with_importable_library(mut self, library: impl Library + 'static) -> Self {
        self.importable.push(Arc::new(library));
        self
    }

    pub fn with_importer(mut self, importer: impl Importer + 'static) -> Self {
        self.importer = Arc::new(importer);
        self
    }

    pub fn with_evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Parse the header, resolve libraries and compile the script.
    ///
    /// Fails with the first error; no partially built transformer escapes.
    pub fn build(self) -> Result<Transformer> {
        let (header, body) = Header::parse_script(&self.script)?;
        let formats = self.formats;

        let namespace = resolve(
            &self.libraries,
            &self.importable,
            &formats,
            &header,
            &self.importer,
        )?;

        let script = self.evaluator.compile(&body, &namespace)?;

        tracing::info!(
            formats = formats.len(),
            namespaces = ?namespace.namespaces(),
            params = header.params().len(),
            "built transformer"
        );

        Ok(Transformer {
            header,
            formats,
            namespace,
            script,
            config: self.config,
        })
    }
}

/// A compiled, ready-to-run transformation.
pub struct Transformer {
    header: Header,
    formats: FormatRegistry,
    namespace: Namespace,
    script: Box<dyn CompiledScript>,
    config: RuntimeConfig,
}

impl Transformer {
    /// Build with default formats, no extra libraries and default config.
    pub fn new(script: impl Into<String>) -> Result<Self> {
        TransformerBuilder::new(script).build()
    }

    pub fn builder(script: impl Into<String>) -> TransformerBuilder {
        TransformerBuilder::new(script)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn formats(&self) -> &FormatRegistry {
        &self.formats
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Transform `input`, encoding the result as `output`, or as the header
    /// or configured default when `output` is `None`.
    pub fn transform(&self, input: &Document, output: Option<&MediaType>) -> Result<Document> {
        self.transform_with(input, &HashMap::new(), output)
    }

    /// Like [`Transformer::transform`], binding `params` by name as well.
    ///
    /// Declared parameters missing from `params` take their header default.
    /// Undeclared parameters are bound when their name is an identifier.
    pub fn transform_with(
        &self,
        input: &Document,
        params: &HashMap<String, Document>,
        output: Option<&MediaType>,
    ) -> Result<Document> {
        let outputs = self.output_types(output)?;

        let mut env = Environment::new();
        env.bind(PAYLOAD, self.decode_input(PAYLOAD, input)?);
        self.bind_params(&mut env, params)?;

        let mut result = self.script.evaluate(&env, &self.namespace)?;

        let preserve_order = self
            .header
            .declared_preserve_order()
            .unwrap_or(self.config.preserve_order);
        if !preserve_order {
            result = sort_keys(result);
        }

        self.formats.encode(&result, &outputs)
    }

    /// Effective output types: override, then header, then configuration.
    fn output_types(&self, output: Option<&MediaType>) -> Result<Vec<MediaType>> {
        let with_options =
            |media_type: &MediaType| media_type.with_defaults(&self.header.data_format_options(media_type));

        if let Some(media_type) = output {
            return Ok(vec![with_options(media_type)]);
        }
        if !self.header.outputs().is_empty() {
            return Ok(self.header.outputs().to_vec());
        }
        if let Some(media_type) = &self.config.default_output {
            return Ok(vec![with_options(media_type)]);
        }
        Err(Error::unsupported(&[], Direction::Write))
    }

    /// Effective type of input `name` delivered as `document`.
    ///
    /// A concrete document type wins and picks up header options for its
    /// type. A wildcard defers to the header, then to configuration.
    fn input_type(&self, name: &str, document: &Document) -> Result<MediaType> {
        let declared = self.header.input(name);
        let given = document.media_type();

        let effective = if !given.is_wildcard() {
            let mut defaults = self.header.input_defaults(given);
            if let Some(declared) = declared.filter(|d| d.equals_type_and_subtype(given)) {
                for (param, value) in declared.params() {
                    if param != PARAM_QUALITY {
                        defaults.insert(param.clone(), value.clone());
                    }
                }
            }
            given.with_defaults(&defaults)
        } else if let Some(declared) = declared {
            declared.without_param(PARAM_QUALITY)
        } else if let Some(fallback) = &self.config.default_input {
            fallback.with_defaults(&self.header.input_defaults(fallback))
        } else if matches!(document.content(), Content::Value(_)) {
            MediaType::new("application", "x-value")
        } else {
            return Err(Error::unsupported(std::slice::from_ref(given), Direction::Read));
        };

        Ok(effective)
    }

    fn decode_input(&self, name: &str, document: &Document) -> Result<Value> {
        if document.content().is_empty() {
            return Ok(Value::Null);
        }
        let media_type = self.input_type(name, document)?;
        tracing::debug!(input = name, media_type = %media_type, "decoding input");
        self.formats.decode(document.content(), &media_type)
    }

    fn bind_params(&self, env: &mut Environment, params: &HashMap<String, Document>) -> Result<()> {
        for (name, default) in self.header.params() {
            let value = match (params.get(name), default) {
                (Some(document), _) => self.decode_input(name, document)?,
                (None, Some(default)) => default.clone(),
                (None, None) => {
                    return Err(ScriptCompileError::UnboundParameter(name.clone()).into())
                }
            };
            tracing::debug!(param = %name, "bound declared parameter");
            env.bind(name.clone(), value);
        }

        let mut extra: Vec<&String> = params
            .keys()
            .filter(|name| !self.header.params().contains_key(*name))
            .collect();
        extra.sort();

        for name in extra {
            if name == PAYLOAD || !is_identifier(name) {
                tracing::warn!(param = %name, "skipping parameter with unusable name");
                continue;
            }
            let value = self.decode_input(name, &params[name])?;
            tracing::debug!(param = %name, "bound undeclared parameter");
            env.bind(name.clone(), value);
        }

        Ok(())
    }
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer")
            .field("header", &self.header)
            .field("formats", &self.formats)
            .field("namespace", &self.namespace)
            .field("config", &self.config)
            .finish()
    }
}

/// Recursively sort object keys.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut entries: Vec<(String, Value)> = object.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect::<Map<_, _>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn json_type() -> MediaType {
        MediaType::parse("application/json").unwrap()
    }

    fn json_doc(text: &str) -> Document {
        Document::new(text, json_type())
    }

    #[test]
    fn test_identity() {
        let transformer = Transformer::new("payload").unwrap();
        let output = transformer
            .transform(&json_doc("{\"a\":1}"), Some(&json_type()))
            .unwrap();
        assert_eq!(output.as_str(), Some("{\"a\":1}"));
        assert_eq!(output.media_type(), &json_type());
    }

    #[test]
    fn test_header_supplies_types() {
        let script = "/** morphdoc\n\
                      input payload application/x-yaml\n\
                      output application/json\n\
                      */\n\
                      { n: payload.n + 1 }";
        let transformer = Transformer::new(script).unwrap();

        let output = transformer
            .transform(&Document::untyped("n: 1\n"), None)
            .unwrap();
        assert_eq!(output.as_str(), Some("{\"n\":2}"));
        assert_eq!(output.media_type().essence(), "application/json");
    }

    #[test]
    fn test_config_fallbacks() {
        let config = RuntimeConfig::default()
            .with_default_input(json_type())
            .with_default_output(MediaType::parse("text/plain").unwrap());
        let transformer = TransformerBuilder::new("payload.name")
            .with_config(config)
            .build()
            .unwrap();

        let output = transformer
            .transform(&Document::untyped("{\"name\":\"ada\"}"), None)
            .unwrap();
        assert_eq!(output.as_str(), Some("ada"));
    }

    #[test]
    fn test_header_output_beats_config() {
        let config = RuntimeConfig::default().with_default_output(MediaType::parse("text/plain").unwrap());
        let transformer = TransformerBuilder::new("/** morphdoc\noutput application/x-yaml\n*/ payload")
            .with_config(config)
            .build()
            .unwrap();

        let output = transformer.transform(&json_doc("{\"a\":1}"), None).unwrap();
        assert_eq!(output.media_type().essence(), "application/x-yaml");
    }

    #[test]
    fn test_no_output_type_is_unsupported() {
        let transformer = Transformer::new("payload").unwrap();
        let err = transformer.transform(&json_doc("1"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedMediaType);
    }

    #[test]
    fn test_untyped_input_without_defaults_is_unsupported() {
        let transformer = Transformer::new("payload").unwrap();
        let err = transformer
            .transform(&Document::untyped("1"), Some(&json_type()))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedMediaType { direction: Direction::Read, .. }));
    }

    #[test]
    fn test_empty_input_is_null() {
        let transformer = Transformer::new("payload == null").unwrap();
        let output = transformer
            .transform(&Document::empty(), Some(&json_type()))
            .unwrap();
        assert_eq!(output.as_str(), Some("true"));
    }

    #[test]
    fn test_params() {
        let script = "/** morphdoc\n\
                      input rate text/plain\n\
                      param rate\n\
                      param label = \"total\"\n\
                      */\n\
                      { [label]: payload * 2, rate: rate, extra: extra }";
        let transformer = Transformer::new(script).unwrap();

        let mut params = HashMap::new();
        params.insert("rate".to_string(), Document::untyped("0.5"));
        params.insert("extra".to_string(), json_doc("[1]"));
        params.insert("not valid".to_string(), json_doc("1"));

        let output = transformer
            .transform_with(&json_doc("21"), &params, Some(&json_type()))
            .unwrap();
        assert_eq!(output.as_str(), Some("{\"total\":42,\"rate\":\"0.5\",\"extra\":[1]}"));
    }

    #[test]
    fn test_missing_param() {
        let transformer = Transformer::new("/** morphdoc\nparam rate\n*/ rate").unwrap();
        let err = transformer.transform(&json_doc("1"), Some(&json_type())).unwrap_err();
        assert!(matches!(
            err,
            Error::ScriptCompile(ScriptCompileError::UnboundParameter(name)) if name == "rate"
        ));
    }

    #[test]
    fn test_preserve_order_false_sorts_keys() {
        let transformer = Transformer::new("/** morphdoc\npreserveOrder=false\n*/ { b: 1, a: { d: 1, c: 2 } }").unwrap();
        let output = transformer.transform(&Document::empty(), Some(&json_type())).unwrap();
        assert_eq!(output.as_str(), Some("{\"a\":{\"c\":2,\"d\":1},\"b\":1}"));

        let config = RuntimeConfig::default().with_preserve_order(false);
        let transformer = TransformerBuilder::new("{ b: 1, a: 2 }")
            .with_config(config)
            .build()
            .unwrap();
        let output = transformer.transform(&Document::empty(), Some(&json_type())).unwrap();
        assert_eq!(output.as_str(), Some("{\"a\":2,\"b\":1}"));
    }

    #[test]
    fn test_dataformat_options_reach_override() {
        let script = "/** morphdoc\ndataformat text/csv;separator=|\n*/ payload";
        let transformer = Transformer::new(script).unwrap();

        let output = transformer
            .transform(
                &json_doc("[{\"a\":1,\"b\":2}]"),
                Some(&MediaType::parse("text/csv").unwrap()),
            )
            .unwrap();
        assert_eq!(output.as_str(), Some("a|b\n1|2\n"));
        assert_eq!(output.media_type().param("separator"), Some("|"));
    }

    #[test]
    fn test_header_input_options_merge_into_concrete_type() {
        let script = "/** morphdoc\ninput payload text/csv;header=absent\n*/ payload[0][1]";
        let transformer = Transformer::new(script).unwrap();

        let output = transformer
            .transform(
                &Document::new("x,y\n", MediaType::parse("text/csv").unwrap()),
                Some(&json_type()),
            )
            .unwrap();
        assert_eq!(output.as_str(), Some("\"y\""));
    }

    #[test]
    fn test_build_errors() {
        assert_eq!(
            Transformer::new("/** morphdoc\nbogus\n*/ payload").unwrap_err().kind(),
            ErrorKind::HeaderParse
        );
        assert_eq!(Transformer::new("payload +").unwrap_err().kind(), ErrorKind::ScriptCompile);
        assert_eq!(
            Transformer::new("/** morphdoc\nimport nowhere\n*/ payload").unwrap_err().kind(),
            ErrorKind::LibraryResolution
        );
    }

    #[test]
    fn test_transformer_is_reusable_after_error() {
        let transformer = Transformer::new("payload.a").unwrap();
        assert!(transformer.transform(&json_doc("not-json"), Some(&json_type())).is_err());
        let output = transformer
            .transform(&json_doc("{\"a\":1}"), Some(&json_type()))
            .unwrap();
        assert_eq!(output.as_str(), Some("1"));
    }
}
