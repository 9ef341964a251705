//! Codec selection for a set of requested media types.

use super::{DataFormat, Direction};
use crate::document::media_type::PARAM_QUALITY;
use crate::document::{MediaType, Specificity};
use std::cmp::Ordering;
use std::sync::Arc;

/// The outcome of a successful negotiation.
#[derive(Clone, Copy)]
pub struct Selection<'a> {
    pub format: &'a dyn DataFormat,
    /// Position of the format in the registry.
    pub index: usize,
    /// The requested media type that matched.
    pub requested: &'a MediaType,
    /// The format pattern that matched it.
    pub pattern: &'a MediaType,
    pub specificity: Specificity,
}

impl Selection<'_> {
    /// The media type to stamp on an encoded document.
    ///
    /// The weight is dropped. A wildcard request is replaced by the format's
    /// canonical type carrying the requested parameters.
    pub fn output_type(&self) -> MediaType {
        let requested = self.requested.without_param(PARAM_QUALITY);
        if !requested.is_wildcard() {
            return requested;
        }

        let concrete = self
            .format
            .canonical_type()
            .filter(|canonical| requested.includes_essence(canonical))
            .or_else(|| (!self.pattern.is_wildcard()).then_some(self.pattern));

        match concrete {
            Some(concrete) => requested
                .with_essence_of(concrete)
                .with_defaults(concrete.params()),
            None => requested,
        }
    }

    fn weight(&self) -> f32 {
        self.requested.quality()
    }

    fn is_better_than(&self, other: &Selection<'_>) -> bool {
        match self.specificity.cmp(&other.specificity) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.weight().total_cmp(&other.weight()) == Ordering::Greater,
        }
    }
}

impl std::fmt::Debug for Selection<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("format", &self.format.name())
            .field("index", &self.index)
            .field("requested", &self.requested.to_string())
            .field("pattern", &self.pattern.to_string())
            .field("specificity", &self.specificity)
            .finish()
    }
}

/// Pick the format that best serves `requested` in `direction`.
///
/// A format pattern is compatible with a requested type it includes. A
/// wildcard request is also compatible with every pattern whose type and
/// subtype it covers, so `*/*` resolves to a concrete format. Parameters of
/// a wildcard request are carried to the output type, not matched. Candidates are ranked by the
/// specificity of the matching pattern, then the `q` weight of the requested
/// type. Remaining ties go to the earliest registered format. A request
/// weighted `q=0` is never served.
pub fn negotiate<'a>(
    direction: Direction,
    requested: &'a [MediaType],
    formats: &'a [Arc<dyn DataFormat>],
) -> Option<Selection<'a>> {
    let mut best: Option<Selection<'a>> = None;

    for (index, format) in formats.iter().enumerate() {
        let format: &'a dyn DataFormat = format.as_ref();
        for pattern in direction.patterns(format) {
            for wanted in requested {
                if wanted.quality() <= 0.0 {
                    continue;
                }
                let compatible = pattern.includes(wanted)
                    || (wanted.is_wildcard() && wanted.includes_essence(pattern));
                if !compatible {
                    continue;
                }

                let candidate = Selection {
                    format,
                    index,
                    requested: wanted,
                    pattern,
                    specificity: pattern.specificity(),
                };

                let replace = match &best {
                    Some(current) => candidate.is_better_than(current),
                    None => true,
                };
                if replace {
                    best = Some(candidate);
                }
            }
        }
    }

    if let Some(selection) = &best {
        tracing::debug!(
            direction = %direction,
            format = selection.format.name(),
            requested = %selection.requested,
            pattern = %selection.pattern,
            "negotiated data format"
        );
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Content;
    use crate::formats::{DecodeError, EncodeError};
    use serde_json::Value;

    struct Fake {
        name: &'static str,
        types: Vec<MediaType>,
    }

    impl Fake {
        fn shared(name: &'static str, types: &[&str]) -> Arc<dyn DataFormat> {
            Arc::new(Fake {
                name,
                types: types.iter().map(|t| MediaType::parse(t).unwrap()).collect(),
            })
        }
    }

    impl DataFormat for Fake {
        fn name(&self) -> &str {
            self.name
        }

        fn readable_types(&self) -> &[MediaType] {
            &self.types
        }

        fn writable_types(&self) -> &[MediaType] {
            &self.types
        }

        fn decode(&self, _: &Content, _: &MediaType) -> Result<Value, DecodeError> {
            Ok(Value::Null)
        }

        fn encode(&self, _: &Value, _: &MediaType) -> Result<Content, EncodeError> {
            Ok(Content::Empty)
        }
    }

    fn request(types: &[&str]) -> Vec<MediaType> {
        types.iter().map(|t| MediaType::parse(t).unwrap()).collect()
    }

    #[test]
    fn test_first_registered_wins_tie() {
        let formats = vec![
            Fake::shared("a", &["application/json"]),
            Fake::shared("b", &["application/json"]),
        ];
        let wanted = request(&["application/json"]);

        for _ in 0..10 {
            let selection = negotiate(Direction::Write, &wanted, &formats).unwrap();
            assert_eq!(selection.format.name(), "a");
            assert_eq!(selection.index, 0);
        }
    }

    #[test]
    fn test_specific_pattern_beats_wildcard() {
        let formats = vec![
            Fake::shared("any", &["*/*"]),
            Fake::shared("json", &["application/json"]),
        ];
        let wanted = request(&["application/json"]);

        let selection = negotiate(Direction::Read, &wanted, &formats).unwrap();
        assert_eq!(selection.format.name(), "json");
    }

    #[test]
    fn test_pattern_with_params_beats_plain() {
        let formats = vec![
            Fake::shared("plain", &["text/csv"]),
            Fake::shared("tabbed", &["text/csv;separator=tab"]),
        ];

        let tabbed = request(&["text/csv;separator=tab"]);
        let selection = negotiate(Direction::Read, &tabbed, &formats).unwrap();
        assert_eq!(selection.format.name(), "tabbed");

        let plain = request(&["text/csv"]);
        let selection = negotiate(Direction::Read, &plain, &formats).unwrap();
        assert_eq!(selection.format.name(), "plain");
    }

    #[test]
    fn test_higher_quality_request_wins() {
        let formats = vec![
            Fake::shared("json", &["application/json"]),
            Fake::shared("yaml", &["application/x-yaml"]),
        ];
        let wanted = request(&["application/json;q=0.5", "application/x-yaml;q=0.9"]);

        let selection = negotiate(Direction::Write, &wanted, &formats).unwrap();
        assert_eq!(selection.format.name(), "yaml");
    }

    #[test]
    fn test_zero_quality_is_refused() {
        let formats = vec![Fake::shared("json", &["application/json"])];
        let wanted = request(&["application/json;q=0"]);
        assert!(negotiate(Direction::Write, &wanted, &formats).is_none());
    }

    #[test]
    fn test_suffix_wildcard_pattern() {
        let formats = vec![Fake::shared("json", &["application/json", "application/*+json"])];
        let wanted = request(&["application/ld+json"]);

        let selection = negotiate(Direction::Read, &wanted, &formats).unwrap();
        assert_eq!(selection.pattern.subtype(), "*+json");
        assert_eq!(selection.specificity, Specificity::SubtypeWildcard);
    }

    #[test]
    fn test_wildcard_request_resolves_to_canonical_type() {
        let formats = vec![
            Fake::shared("xml", &["application/xml"]),
            Fake::shared("json", &["application/json"]),
        ];
        let wanted = request(&["*/*;q=0.8;fmt=yes"]);

        let selection = negotiate(Direction::Write, &wanted, &formats).unwrap();
        assert_eq!(selection.format.name(), "xml");

        let output = selection.output_type();
        assert_eq!(output.essence(), "application/xml");
        assert_eq!(output.param("fmt"), Some("yes"));
        assert_eq!(output.param("q"), None);
    }

    #[test]
    fn test_wildcard_subtype_request_with_params() {
        let formats = vec![
            Fake::shared("json", &["application/json"]),
            Fake::shared("text", &["text/plain"]),
        ];
        let wanted = request(&["text/*;charset=utf-8"]);

        let selection = negotiate(Direction::Write, &wanted, &formats).unwrap();
        assert_eq!(selection.format.name(), "text");
        assert_eq!(selection.output_type().to_string(), "text/plain;charset=utf-8");
    }

    #[test]
    fn test_no_match() {
        let formats = vec![Fake::shared("json", &["application/json"])];
        let wanted = request(&["application/x-nonexistent"]);
        assert!(negotiate(Direction::Write, &wanted, &formats).is_none());
    }
}
