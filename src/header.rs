//! Script header directives.
//!
//! A script may start with a block comment introduced by `/** morphdoc` and
//! closed by `*/`. Each line inside declares one directive:
//!
//! ```text
//! /** morphdoc
//! input payload application/json
//! input orders text/csv;separator=|
//! output application/x-yaml
//! param limit = 10
//! import strings
//! dataformat text/csv;header=absent
//! preserveOrder=false
//! */
//! ```
//!
//! Blank lines and lines starting with `//` are ignored. Anything else is a
//! [`HeaderParseError`].

use crate::document::media_type::PARAM_QUALITY;
use crate::document::{MediaType, MediaTypeError};
use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

/// Opening marker of a header block.
pub const HEADER_MARKER: &str = "/** morphdoc";

const HEADER_TERMINATOR: &str = "*/";
const COMMENT_PREFIX: &str = "//";

/// Name of the default input.
pub const PAYLOAD: &str = "payload";

#[derive(Debug, Error)]
#[error("header line {line} ({directive}): {message}")]
pub struct HeaderParseError {
    /// 1-based line in the script.
    pub line: usize,
    pub directive: String,
    pub message: String,
    #[source]
    pub source: Option<MediaTypeError>,
}

impl HeaderParseError {
    fn new(line: usize, directive: &str, message: impl Into<String>) -> Self {
        Self {
            line,
            directive: directive.to_string(),
            message: message.into(),
            source: None,
        }
    }
}

/// Declarations parsed from a script header.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Header {
    inputs: IndexMap<String, MediaType>,
    outputs: Vec<MediaType>,
    params: IndexMap<String, Option<Value>>,
    imports: Vec<String>,
    data_formats: Vec<MediaType>,
    all_inputs: Vec<MediaType>,
    preserve_order: Option<bool>,
}

struct Directives {
    input: Regex,
    output: Regex,
    param: Regex,
    import: Regex,
    data_format: Regex,
    preserve_order: Regex,
}

fn directives() -> &'static Directives {
    static DIRECTIVES: OnceLock<Directives> = OnceLock::new();
    DIRECTIVES.get_or_init(|| {
        let compile = |pattern: &str| Regex::new(pattern).expect("valid directive pattern");
        Directives {
            input: compile(
                r"^input\s+(?:(?P<name>[A-Za-z_][A-Za-z0-9_]*|\*)\s+)?(?P<mediatype>\S.*)$",
            ),
            output: compile(r"^output\s+(?P<mediatype>\S.*)$"),
            param: compile(
                r"^param\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*(?:=\s*(?P<default>\S.*))?$",
            ),
            import: compile(r"^import\s+(?P<namespace>[A-Za-z_][A-Za-z0-9_]*)$"),
            data_format: compile(r"^dataformat\s+(?P<mediatype>\S.*)$"),
            preserve_order: compile(r"^preserveOrder\s*=\s*(?P<flag>true|false)$"),
        }
    })
}

/// Is `name` usable as an input or parameter name?
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

impl Header {
    /// Parse the header of `script`. Scripts without a header yield an empty
    /// header.
    pub fn parse(script: &str) -> Result<Self, HeaderParseError> {
        Self::parse_script(script).map(|(header, _)| header)
    }

    /// Parse the header and return it with the script body.
    ///
    /// The returned body has every header character replaced by a space,
    /// newlines excepted, so positions in the body match the full script.
    pub fn parse_script(script: &str) -> Result<(Self, String), HeaderParseError> {
        let leading = script.len() - script.trim_start().len();
        let rest = &script[leading..];
        let has_header = rest.strip_prefix(HEADER_MARKER).map_or(false, |after| {
            after.is_empty() || after.starts_with(char::is_whitespace)
        });
        if !has_header {
            return Ok((Self::default(), script.to_string()));
        }

        let first_line = script[..leading].matches('\n').count() + 1;
        let body_start = leading + HEADER_MARKER.len();
        let terminus = script[body_start..].find(HEADER_TERMINATOR).ok_or_else(|| {
            HeaderParseError::new(first_line, "header", "unterminated header, expected */")
        })?;
        let header_end = body_start + terminus + HEADER_TERMINATOR.len();

        let header = Self::parse_lines(&script[body_start..body_start + terminus], first_line)?;

        let masked: String = script[..header_end]
            .chars()
            .map(|c| if c == '\n' { '\n' } else { ' ' })
            .chain(script[header_end..].chars())
            .collect();

        tracing::debug!(
            inputs = header.inputs.len(),
            outputs = header.outputs.len(),
            params = header.params.len(),
            imports = header.imports.len(),
            "parsed script header"
        );

        Ok((header, masked))
    }

    fn parse_lines(section: &str, first_line: usize) -> Result<Self, HeaderParseError> {
        let directives = directives();
        let mut header = Header::default();

        for (offset, raw) in section.split('\n').enumerate() {
            let line_number = first_line + offset;
            let line = raw.trim();
            if line.is_empty() || line.starts_with(COMMENT_PREFIX) {
                continue;
            }

            let keyword = line
                .split(|c: char| c.is_whitespace() || c == '=')
                .next()
                .unwrap_or_default();
            let malformed = |format: &str| {
                HeaderParseError::new(
                    line_number,
                    keyword,
                    format!("'{}' does not follow the {} line format", line, format),
                )
            };
            let media_type = |text: &str| {
                MediaType::parse(text.trim()).map_err(|e| HeaderParseError {
                    line: line_number,
                    directive: keyword.to_string(),
                    message: format!("invalid media type '{}'", text.trim()),
                    source: Some(e),
                })
            };

            match keyword {
                "input" => {
                    let captures = directives
                        .input
                        .captures(line)
                        .ok_or_else(|| malformed("'input [name] <mediatype>'"))?;
                    let parsed = media_type(&captures["mediatype"])?;
                    match captures.name("name").map(|m| m.as_str()) {
                        Some("*") => header.all_inputs.push(parsed),
                        Some(name) => header.add_input(name, parsed),
                        None => header.add_input(PAYLOAD, parsed),
                    }
                }
                "output" => {
                    let captures = directives
                        .output
                        .captures(line)
                        .ok_or_else(|| malformed("'output <mediatype>'"))?;
                    header.outputs.push(media_type(&captures["mediatype"])?);
                }
                "param" => {
                    let captures = directives
                        .param
                        .captures(line)
                        .ok_or_else(|| malformed("'param <name> [= <json>]'"))?;
                    let name = captures["name"].to_string();
                    if header.params.contains_key(&name) {
                        return Err(HeaderParseError::new(
                            line_number,
                            keyword,
                            format!("parameter '{}' is declared twice", name),
                        ));
                    }
                    let default = match captures.name("default") {
                        Some(text) => Some(serde_json::from_str(text.as_str()).map_err(|e| {
                            HeaderParseError::new(
                                line_number,
                                keyword,
                                format!("default of '{}' is not valid JSON: {}", name, e),
                            )
                        })?),
                        None => None,
                    };
                    header.params.insert(name, default);
                }
                "import" => {
                    let captures = directives
                        .import
                        .captures(line)
                        .ok_or_else(|| malformed("'import <namespace>'"))?;
                    let namespace = captures["namespace"].to_string();
                    if header.imports.contains(&namespace) {
                        return Err(HeaderParseError::new(
                            line_number,
                            keyword,
                            format!("namespace '{}' is imported twice", namespace),
                        ));
                    }
                    header.imports.push(namespace);
                }
                "dataformat" => {
                    let captures = directives
                        .data_format
                        .captures(line)
                        .ok_or_else(|| malformed("'dataformat <mediatype>'"))?;
                    header.data_formats.push(media_type(&captures["mediatype"])?);
                }
                "preserveOrder" => {
                    let captures = directives
                        .preserve_order
                        .captures(line)
                        .ok_or_else(|| malformed("'preserveOrder=<true|false>'"))?;
                    header.preserve_order = Some(&captures["flag"] == "true");
                }
                _ => {
                    return Err(HeaderParseError::new(
                        line_number,
                        keyword,
                        format!("unknown directive in '{}'", line),
                    ))
                }
            }
        }

        header.apply_defaults();
        Ok(header)
    }

    /// Same type/subtype merges parameters, later lines winning. A different
    /// type/subtype replaces the earlier one only with a strictly higher `q`.
    fn add_input(&mut self, name: &str, media_type: MediaType) {
        match self.inputs.get_mut(name) {
            None => {
                self.inputs.insert(name.to_string(), media_type);
            }
            Some(previous) if previous.equals_type_and_subtype(&media_type) => {
                *previous = media_type.with_defaults(previous.params());
            }
            Some(previous) => {
                if media_type.quality() > previous.quality() {
                    *previous = media_type;
                }
            }
        }
    }

    fn apply_defaults(&mut self) {
        let mut inputs = std::mem::take(&mut self.inputs);
        for media_type in inputs.values_mut() {
            *media_type = media_type.with_defaults(&self.input_defaults(media_type));
        }
        self.inputs = inputs;

        let mut outputs = std::mem::take(&mut self.outputs);
        for media_type in outputs.iter_mut() {
            *media_type = media_type.with_defaults(&self.data_format_options(media_type));
        }
        outputs.sort_by(|a, b| b.quality().total_cmp(&a.quality()));
        self.outputs = outputs;
    }

    /// Parameters contributed by `dataformat` directives whose type includes
    /// `media_type`. Later directives win; `q` is never contributed.
    pub fn data_format_options(&self, media_type: &MediaType) -> IndexMap<String, String> {
        collect_options(&self.data_formats, media_type)
    }

    /// Parameters a document typed `media_type` picks up as an input: data
    /// format options, then `input *` parameters.
    pub fn input_defaults(&self, media_type: &MediaType) -> IndexMap<String, String> {
        let mut options = self.data_format_options(media_type);
        options.extend(collect_options(&self.all_inputs, media_type));
        options
    }

    pub fn is_empty(&self) -> bool {
        *self == Header::default()
    }

    pub fn input(&self, name: &str) -> Option<&MediaType> {
        self.inputs.get(name)
    }

    /// Declared type of the default input.
    pub fn payload_input(&self) -> Option<&MediaType> {
        self.input(PAYLOAD)
    }

    pub fn inputs(&self) -> &IndexMap<String, MediaType> {
        &self.inputs
    }

    /// Preferred output type.
    pub fn output(&self) -> Option<&MediaType> {
        self.outputs.first()
    }

    /// Output types, highest `q` first, declaration order among equals.
    pub fn outputs(&self) -> &[MediaType] {
        &self.outputs
    }

    /// Declared parameters with their optional defaults.
    pub fn params(&self) -> &IndexMap<String, Option<Value>> {
        &self.params
    }

    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    pub fn data_formats(&self) -> &[MediaType] {
        &self.data_formats
    }

    /// Whether result object keys keep their order. Defaults to true.
    pub fn preserve_order(&self) -> bool {
        self.preserve_order.unwrap_or(true)
    }

    /// The `preserveOrder` directive, if present.
    pub fn declared_preserve_order(&self) -> Option<bool> {
        self.preserve_order
    }
}

fn collect_options(patterns: &[MediaType], media_type: &MediaType) -> IndexMap<String, String> {
    let mut options = IndexMap::new();
    for pattern in patterns.iter().filter(|p| p.includes_essence(media_type)) {
        for (name, value) in pattern.params() {
            if name != PARAM_QUALITY {
                options.insert(name.clone(), value.clone());
            }
        }
    }
    options
}
