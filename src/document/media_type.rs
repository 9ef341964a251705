//! Structured media types (`type/subtype;param=value`).
//!
//! A [`MediaType`] is an immutable value. Type, subtype and parameter names are
//! lower-cased on construction, `*` is a wildcard for either the type or the
//! subtype, and `*+suffix` is a structured-syntax suffix wildcard such as
//! `application/*+json`.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Wildcard token for the type or subtype.
pub const WILDCARD: &str = "*";

/// Quality factor (weight) parameter.
pub const PARAM_QUALITY: &str = "q";

/// Character set parameter.
pub const PARAM_CHARSET: &str = "charset";

/// Parameters that may not be repeated with different values.
const RESERVED_PARAMS: [&str; 2] = [PARAM_QUALITY, PARAM_CHARSET];

pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_YAML: &str = "application/x-yaml";
pub const APPLICATION_VALUE: &str = "application/x-value";
pub const TEXT_CSV: &str = "text/csv";
pub const TEXT_PLAIN: &str = "text/plain";

/// Error type for media type parsing and construction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaTypeError {
    #[error("media type must not be empty")]
    Empty,

    #[error("media type \"{0}\" does not contain '/'")]
    MissingSlash(String),

    #[error("media type \"{0}\" has an empty type or subtype")]
    EmptyEssence(String),

    #[error("wildcard type is legal only in '*/*' (all media types), found \"{0}\"")]
    WildcardType(String),

    #[error("parameter \"{0}\" has no '=' separator")]
    MissingParamSeparator(String),

    #[error("'value' must not be empty for parameter \"{0}\"")]
    EmptyValue(String),

    #[error("Invalid token character '{character}' in token \"{token}\"")]
    InvalidToken { character: char, token: String },

    #[error("parameter \"{name}\" is repeated with conflicting values \"{first}\" and \"{second}\"")]
    ConflictingParameter {
        name: String,
        first: String,
        second: String,
    },

    #[error("quality factor must be a number between 0 and 1, found \"{0}\"")]
    InvalidQuality(String),
}

/// How precisely a media type (used as a pattern) describes content.
///
/// Variants are declared from least to most specific so the derived `Ord`
/// can be used directly as a negotiation rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Specificity {
    /// `*/*`
    FullWildcard,
    /// `type/*` or `type/*+suffix`
    SubtypeWildcard,
    /// `type/subtype`
    Concrete,
    /// `type/subtype;param=value`
    ConcreteWithParams,
}

/// A structured content type.
#[derive(Debug, Clone)]
pub struct MediaType {
    primary: String,
    subtype: String,
    params: IndexMap<String, String>,
}

impl MediaType {
    /// Create a media type without parameters.
    ///
    /// Type and subtype are lower-cased.
    pub fn new(primary: impl AsRef<str>, subtype: impl AsRef<str>) -> Self {
        Self {
            primary: primary.as_ref().trim().to_ascii_lowercase(),
            subtype: subtype.as_ref().trim().to_ascii_lowercase(),
            params: IndexMap::new(),
        }
    }

    /// `*/*`
    pub fn any() -> Self {
        Self::new(WILDCARD, WILDCARD)
    }

    /// Parse a `type/subtype;param=value;...` string.
    ///
    /// # Example
    /// ```
    /// use morphdoc::MediaType;
    ///
    /// let csv = MediaType::parse("text/csv; separator=\"|\"; header=absent").unwrap();
    /// assert_eq!(csv.param("separator"), Some("|"));
    /// assert_eq!(csv.to_string(), "text/csv;separator=|;header=absent");
    /// ```
    pub fn parse(text: &str) -> Result<Self, MediaTypeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MediaTypeError::Empty);
        }

        let mut segments = split_segments(text).into_iter();
        let essence = segments.next().unwrap_or_default().trim();

        let (primary, subtype) = essence
            .split_once('/')
            .ok_or_else(|| MediaTypeError::MissingSlash(text.to_string()))?;
        let (primary, subtype) = (primary.trim(), subtype.trim());

        if primary.is_empty() || subtype.is_empty() {
            return Err(MediaTypeError::EmptyEssence(text.to_string()));
        }
        check_token(primary)?;
        check_token(subtype)?;
        if primary == WILDCARD && subtype != WILDCARD {
            return Err(MediaTypeError::WildcardType(text.to_string()));
        }

        let mut media_type = Self::new(primary, subtype);
        for segment in segments {
            let segment = segment.trim();
            // tolerate a trailing ';'
            if segment.is_empty() {
                continue;
            }

            let (name, raw) = segment
                .split_once('=')
                .ok_or_else(|| MediaTypeError::MissingParamSeparator(segment.to_string()))?;
            let name = name.trim();
            check_token(name)?;
            let value = parse_param_value(name, raw.trim())?;
            media_type.insert_param(name, value)?;
        }

        Ok(media_type)
    }

    /// The top-level type, e.g. `application`.
    pub fn primary_type(&self) -> &str {
        &self.primary
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// Parameters in declaration order.
    pub fn params(&self) -> &IndexMap<String, String> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn charset(&self) -> Option<&str> {
        self.param(PARAM_CHARSET)
    }

    /// The `q` weight, 1.0 when absent.
    pub fn quality(&self) -> f32 {
        self.param(PARAM_QUALITY)
            .and_then(|q| q.parse::<f32>().ok())
            .unwrap_or(1.0)
    }

    /// `type/subtype` without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.primary, self.subtype)
    }

    pub fn is_wildcard_type(&self) -> bool {
        self.primary == WILDCARD
    }

    pub fn is_wildcard_subtype(&self) -> bool {
        self.subtype.contains('*')
    }

    /// True when either the type or the subtype is a wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.is_wildcard_type() || self.is_wildcard_subtype()
    }

    pub fn equals_type_and_subtype(&self, other: &MediaType) -> bool {
        self.primary == other.primary && self.subtype == other.subtype
    }

    /// Return a copy with `name` set to `value`.
    pub fn with_param(
        &self,
        name: impl AsRef<str>,
        value: impl Into<String>,
    ) -> Result<Self, MediaTypeError> {
        let name = name.as_ref().trim();
        check_token(name)?;
        let value = value.into();
        if value.is_empty() {
            return Err(MediaTypeError::EmptyValue(name.to_string()));
        }
        check_param(name, &value)?;

        let mut copy = self.clone();
        copy.params.insert(name.to_ascii_lowercase(), value);
        Ok(copy)
    }

    /// Return a copy whose parameters are exactly `params`.
    pub fn with_params<K, V, I>(&self, params: I) -> Result<Self, MediaTypeError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut copy = Self::new(&self.primary, &self.subtype);
        for (name, value) in params {
            copy = copy.with_param(name, value)?;
        }
        Ok(copy)
    }

    /// Return a copy without the named parameter.
    pub fn without_param(&self, name: &str) -> Self {
        let mut copy = self.clone();
        copy.params.shift_remove(&name.to_ascii_lowercase());
        copy
    }

    /// Return a copy with the type and subtype of `other` and this media
    /// type's parameters.
    pub fn with_essence_of(&self, other: &MediaType) -> Self {
        Self {
            primary: other.primary.clone(),
            subtype: other.subtype.clone(),
            params: self.params.clone(),
        }
    }

    /// Return a copy carrying `defaults` for every parameter it does not
    /// already declare. Existing parameters keep their values.
    pub fn with_defaults(&self, defaults: &IndexMap<String, String>) -> Self {
        let mut params = defaults.clone();
        for (name, value) in &self.params {
            params.insert(name.clone(), value.clone());
        }
        Self {
            primary: self.primary.clone(),
            subtype: self.subtype.clone(),
            params,
        }
    }

    /// Whether this media type, used as a pattern, includes `other`.
    ///
    /// - `*` in type or subtype matches anything, `*+suffix` matches any
    ///   subtype ending in `+suffix`;
    /// - a pattern without parameters matches any parameter set;
    /// - every pattern parameter other than `q` must be present on `other`
    ///   with an equal value, or with any value when the pattern value is `*`.
    pub fn includes(&self, other: &MediaType) -> bool {
        self.includes_essence(other) && self.params_satisfied_by(other)
    }

    /// Like [`MediaType::includes`], ignoring parameters on both sides.
    pub fn includes_essence(&self, other: &MediaType) -> bool {
        if self.primary != WILDCARD && self.primary != other.primary {
            return false;
        }

        if self.subtype == WILDCARD || self.subtype == other.subtype {
            return true;
        }

        match self.subtype.strip_prefix("*+") {
            Some(suffix) => other
                .subtype
                .rsplit_once('+')
                .map_or(false, |(_, other_suffix)| other_suffix == suffix),
            None => false,
        }
    }

    fn params_satisfied_by(&self, other: &MediaType) -> bool {
        self.params
            .iter()
            .filter(|(name, _)| name.as_str() != PARAM_QUALITY)
            .all(|(name, value)| match other.params.get(name) {
                Some(_) if value == WILDCARD => true,
                Some(found) if name == PARAM_CHARSET => found.eq_ignore_ascii_case(value),
                Some(found) => found == value,
                None => false,
            })
    }

    /// Rank of this media type when used as a negotiation pattern.
    pub fn specificity(&self) -> Specificity {
        if self.is_wildcard_type() {
            Specificity::FullWildcard
        } else if self.is_wildcard_subtype() {
            Specificity::SubtypeWildcard
        } else if self.params.keys().any(|name| name != PARAM_QUALITY) {
            Specificity::ConcreteWithParams
        } else {
            Specificity::Concrete
        }
    }

    fn insert_param(&mut self, name: &str, value: String) -> Result<(), MediaTypeError> {
        let name = name.to_ascii_lowercase();
        check_param(&name, &value)?;

        if RESERVED_PARAMS.contains(&name.as_str()) {
            if let Some(first) = self.params.get(&name) {
                if !first.eq_ignore_ascii_case(&value) {
                    return Err(MediaTypeError::ConflictingParameter {
                        name,
                        first: first.clone(),
                        second: value,
                    });
                }
            }
        }

        self.params.insert(name, value);
        Ok(())
    }
}

impl PartialEq for MediaType {
    /// Parameter order is ignored, parameter values are not.
    fn eq(&self, other: &Self) -> bool {
        self.primary == other.primary
            && self.subtype == other.subtype
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .all(|(name, value)| other.params.get(name) == Some(value))
    }
}

impl Eq for MediaType {}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.primary, self.subtype)?;
        for (name, value) in &self.params {
            if value.chars().all(is_token_char) {
                write!(f, ";{}={}", name, value)?;
            } else {
                write!(f, ";{}=\"", name)?;
                for c in value.chars() {
                    if c == '"' || c == '\\' {
                        write!(f, "\\")?;
                    }
                    write!(f, "{}", c)?;
                }
                write!(f, "\"")?;
            }
        }
        Ok(())
    }
}

impl FromStr for MediaType {
    type Err = MediaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MediaType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MediaType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// RFC 7230 `tchar`.
fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

fn check_token(token: &str) -> Result<(), MediaTypeError> {
    match token.chars().find(|c| !is_token_char(*c)) {
        Some(character) => Err(MediaTypeError::InvalidToken {
            character,
            token: token.to_string(),
        }),
        None => Ok(()),
    }
}

fn check_param(name: &str, value: &str) -> Result<(), MediaTypeError> {
    if name.eq_ignore_ascii_case(PARAM_QUALITY) {
        match value.parse::<f32>() {
            Ok(q) if (0.0..=1.0).contains(&q) => {}
            _ => return Err(MediaTypeError::InvalidQuality(value.to_string())),
        }
    }
    Ok(())
}

/// Split on `;` outside of quoted strings.
fn split_segments(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                segments.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&text[start..]);
    segments
}

/// Parse a token or a quoted string.
fn parse_param_value(name: &str, raw: &str) -> Result<String, MediaTypeError> {
    if raw.is_empty() {
        return Err(MediaTypeError::EmptyValue(name.to_string()));
    }

    let Some(inner) = raw.strip_prefix('"') else {
        check_token(raw)?;
        return Ok(raw.to_string());
    };

    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    let mut closed = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => value.push(escaped),
                None => break,
            },
            '"' => {
                closed = true;
                break;
            }
            other => value.push(other),
        }
    }

    if !closed || chars.next().is_some() {
        return Err(MediaTypeError::InvalidToken {
            character: '"',
            token: raw.to_string(),
        });
    }
    if value.is_empty() {
        return Err(MediaTypeError::EmptyValue(name.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mt(text: &str) -> MediaType {
        MediaType::parse(text).unwrap()
    }

    #[test]
    fn test_parse_simple() {
        let media_type = mt("Type/SubType;Attr=val");
        assert_eq!(media_type.primary_type(), "type");
        assert_eq!(media_type.subtype(), "subtype");
        assert_eq!(media_type.params().len(), 1);
        assert_eq!(media_type.param("attr"), Some("val"));
    }

    #[test]
    fn test_parse_quoted_values() {
        assert_eq!(mt("type/subtype;attr=\"val\"").param("attr"), Some("val"));
        assert_eq!(
            mt("type/subtype;attr=\"pre\\\"post\"").param("attr"),
            Some("pre\"post")
        );

        let media_type = mt("type/subtype;attr=\"pre\\\";post\";attr1=val1");
        assert_eq!(media_type.params().len(), 2);
        assert_eq!(media_type.param("attr"), Some("pre\";post"));
        assert_eq!(media_type.param("attr1"), Some("val1"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(MediaType::parse(""), Err(MediaTypeError::Empty));
        assert!(matches!(
            MediaType::parse("application"),
            Err(MediaTypeError::MissingSlash(_))
        ));
        assert!(matches!(
            MediaType::parse("type/subtype;attr="),
            Err(MediaTypeError::EmptyValue(_))
        ));
        assert!(matches!(
            MediaType::parse("*/json"),
            Err(MediaTypeError::WildcardType(_))
        ));

        let err = MediaType::parse("type/subtype;attr=pre=post").unwrap_err();
        assert!(err
            .to_string()
            .contains("Invalid token character '=' in token \"pre=post\""));

        let err = MediaType::parse("type/subtype;attr=\"pre=post").unwrap_err();
        assert!(matches!(err, MediaTypeError::InvalidToken { character: '"', .. }));

        let err = MediaType::parse("type/subtype;attr=pre\"=\"post").unwrap_err();
        assert!(matches!(err, MediaTypeError::InvalidToken { character: '"', .. }));
    }

    #[test]
    fn test_reserved_params_must_not_conflict() {
        assert!(matches!(
            MediaType::parse("text/plain;charset=utf-8;charset=latin1"),
            Err(MediaTypeError::ConflictingParameter { .. })
        ));
        assert!(MediaType::parse("text/plain;charset=utf-8;charset=UTF-8").is_ok());
        assert!(matches!(
            MediaType::parse("text/plain;q=2"),
            Err(MediaTypeError::InvalidQuality(_))
        ));

        // non-reserved duplicates keep the last value
        assert_eq!(mt("text/csv;header=present;header=absent").param("header"), Some("absent"));
    }

    #[test]
    fn test_display_round_trip() {
        for text in [
            "application/json",
            "*/*",
            "application/*+json;q=0.8",
            "text/csv;separator=|;header=absent",
            "type/subtype;attr=\"pre\\\"post\"",
            "text/plain;note=\"a b;c\"",
        ] {
            let parsed = mt(text);
            assert_eq!(mt(&parsed.to_string()), parsed, "round trip of {}", text);
        }

        let built = MediaType::new("type", "subtype")
            .with_param("attr", "pre\"post")
            .unwrap();
        assert_eq!(built.to_string(), "type/subtype;attr=\"pre\\\"post\"");
    }

    #[test]
    fn test_equality_ignores_param_order() {
        assert_eq!(mt("text/csv;a=1;b=2"), mt("text/csv;b=2;a=1"));
        assert_ne!(mt("text/csv;a=1;b=2"), mt("text/csv;a=1;b=3"));
        assert_ne!(mt("text/csv;a=1"), mt("text/csv"));
    }

    #[test]
    fn test_with_param_is_non_destructive() {
        let base = mt("application/json");
        let pretty = base.with_param("fmt", "pretty").unwrap();
        assert_eq!(base.params().len(), 0);
        assert_eq!(pretty.param("fmt"), Some("pretty"));
        assert!(base.with_param("fmt", "").is_err());
        assert_eq!(pretty.without_param("fmt"), base);
    }

    #[test]
    fn test_includes_wildcards() {
        assert!(MediaType::any().includes(&mt("application/json")));
        assert!(mt("application/*").includes(&mt("application/xml")));
        assert!(!mt("application/*").includes(&mt("text/plain")));
        assert!(mt("application/*+json").includes(&mt("application/vnd.api+json")));
        assert!(!mt("application/*+json").includes(&mt("application/json")));
        assert!(!mt("application/json").includes(&mt("application/xml")));
    }

    #[test]
    fn test_includes_params() {
        // no pattern params: any params match
        assert!(mt("text/plain").includes(&mt("text/plain;charset=utf-8")));
        // pattern param requires an equal value
        assert!(mt("text/plain;charset=UTF-8").includes(&mt("text/plain;charset=utf-8")));
        assert!(!mt("text/plain;charset=utf-8").includes(&mt("text/plain;charset=latin1")));
        assert!(!mt("text/plain;charset=utf-8").includes(&mt("text/plain")));
        // wildcard param value requires presence only
        assert!(mt("text/plain;charset=*").includes(&mt("text/plain;charset=latin1")));
        // weight never constrains
        assert!(mt("text/plain;q=0.1").includes(&mt("text/plain")));
    }

    #[test]
    fn test_specificity_ordering() {
        assert!(mt("text/plain;charset=utf-8").specificity() > mt("text/plain").specificity());
        assert!(mt("text/plain").specificity() > mt("text/*").specificity());
        assert!(mt("application/*+json").specificity() > MediaType::any().specificity());
        assert_eq!(mt("text/plain;q=0.5").specificity(), Specificity::Concrete);
    }

    #[test]
    fn test_quality_defaults_to_one() {
        assert_eq!(mt("application/json").quality(), 1.0);
        assert_eq!(mt("application/json;q=0.25").quality(), 0.25);
    }

    #[test]
    fn test_serde_as_string() {
        let media_type = mt("text/csv;separator=|");
        let json = serde_json::to_string(&media_type).unwrap();
        assert_eq!(json, "\"text/csv;separator=|\"");
        let back: MediaType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, media_type);
        assert!(serde_json::from_str::<MediaType>("\"nonsense\"").is_err());
    }
}
