//! CSV data format backed by the `csv` crate.
//!
//! Media type parameters control the dialect:
//!
//! - `separator`: field delimiter, one character or `tab` (default `,`)
//! - `quote`: quote character (default `"`)
//! - `escape`: escape character; when it differs from `quote`, doubled quotes
//!   are no longer used on output
//! - `header`: `present` (default) or `absent`
//! - `columns`: comma separated column names, quoted in the media type
//!   (`columns="id,name"`)
//!
//! With a header (or explicit columns) rows decode to objects keyed by column
//! name; otherwise rows decode to arrays of strings.

use super::{text_of, DataFormat, DecodeError, EncodeError};
use crate::document::{Content, MediaType};
use indexmap::IndexSet;
use serde_json::{Map, Value};

pub const PARAM_SEPARATOR: &str = "separator";
pub const PARAM_QUOTE: &str = "quote";
pub const PARAM_ESCAPE: &str = "escape";
pub const PARAM_HEADER: &str = "header";
pub const PARAM_COLUMNS: &str = "columns";

pub struct CsvFormat {
    types: Vec<MediaType>,
}

impl CsvFormat {
    pub fn new() -> Self {
        Self {
            types: vec![
                MediaType::new("text", "csv"),
                MediaType::new("application", "csv"),
            ],
        }
    }
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self::new()
    }
}

/// Dialect settings read from media type parameters.
#[derive(Debug, Clone, PartialEq)]
struct Dialect {
    separator: u8,
    quote: u8,
    escape: Option<u8>,
    header: bool,
    columns: Option<Vec<String>>,
}

impl Dialect {
    fn from_media_type(media_type: &MediaType) -> Result<Self, String> {
        let separator = match media_type.param(PARAM_SEPARATOR) {
            Some(value) => single_byte(PARAM_SEPARATOR, value)?,
            None => b',',
        };
        let quote = match media_type.param(PARAM_QUOTE) {
            Some(value) => single_byte(PARAM_QUOTE, value)?,
            None => b'"',
        };
        let escape = media_type
            .param(PARAM_ESCAPE)
            .map(|value| single_byte(PARAM_ESCAPE, value))
            .transpose()?;
        let header = match media_type.param(PARAM_HEADER) {
            None | Some("present") => true,
            Some("absent") => false,
            Some(other) => {
                return Err(format!(
                    "header must be 'present' or 'absent', got '{}'",
                    other
                ))
            }
        };
        let columns = media_type.param(PARAM_COLUMNS).map(|value| {
            value
                .split(',')
                .map(|column| column.trim().to_string())
                .collect::<Vec<_>>()
        });

        Ok(Self {
            separator,
            quote,
            escape,
            header,
            columns,
        })
    }

    fn reader(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .delimiter(self.separator)
            .quote(self.quote)
            .escape(self.escape)
            .has_headers(false)
            .flexible(true);
        builder
    }

    fn writer(&self) -> csv::WriterBuilder {
        let mut builder = csv::WriterBuilder::new();
        builder
            .delimiter(self.separator)
            .quote(self.quote)
            .terminator(csv::Terminator::Any(b'\n'))
            .flexible(true);
        if let Some(escape) = self.escape.filter(|escape| *escape != self.quote) {
            builder.escape(escape).double_quote(false);
        }
        builder
    }
}

fn single_byte(name: &str, value: &str) -> Result<u8, String> {
    if value.eq_ignore_ascii_case("tab") {
        return Ok(b'\t');
    }
    match value.as_bytes() {
        [byte] if byte.is_ascii() => Ok(*byte),
        _ => Err(format!(
            "{} must be a single ASCII character, got '{}'",
            name, value
        )),
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        nested => nested.to_string(),
    }
}

impl DataFormat for CsvFormat {
    fn name(&self) -> &str {
        "csv"
    }

    fn readable_types(&self) -> &[MediaType] {
        &self.types
    }

    fn writable_types(&self) -> &[MediaType] {
        &self.types
    }

    fn decode(&self, content: &Content, media_type: &MediaType) -> Result<Value, DecodeError> {
        let dialect = Dialect::from_media_type(media_type)
            .map_err(|message| DecodeError::new(media_type, message))?;
        let text = text_of(content, media_type)?;

        let mut reader = dialect.reader().from_reader(text.as_bytes());
        let mut records = Vec::new();
        for record in reader.records() {
            let record = record
                .map_err(|e| DecodeError::with_source(media_type, e.to_string(), e))?;
            records.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        let mut rows = records.into_iter();
        let columns = match (dialect.header, dialect.columns) {
            (true, Some(columns)) => {
                rows.next();
                Some(columns)
            }
            (true, None) => rows.next(),
            (false, columns) => columns,
        };

        let decoded = match columns {
            Some(columns) => rows
                .map(|row| {
                    let mut object = Map::new();
                    for (index, column) in columns.iter().enumerate() {
                        let cell = row.get(index).cloned().unwrap_or_default();
                        object.insert(column.clone(), Value::String(cell));
                    }
                    Value::Object(object)
                })
                .collect(),
            None => rows
                .map(|row| Value::Array(row.into_iter().map(Value::String).collect()))
                .collect(),
        };

        Ok(Value::Array(decoded))
    }

    fn encode(&self, value: &Value, media_type: &MediaType) -> Result<Content, EncodeError> {
        let dialect = Dialect::from_media_type(media_type)
            .map_err(|message| EncodeError::new(media_type, message))?;
        let rows = value
            .as_array()
            .ok_or_else(|| EncodeError::new(media_type, "CSV output requires an array of rows"))?;

        let columns: Option<Vec<String>> = match &dialect.columns {
            Some(columns) => Some(columns.clone()),
            None if rows.iter().any(Value::is_object) => {
                let mut names = IndexSet::new();
                for row in rows.iter().filter_map(Value::as_object) {
                    names.extend(row.keys().cloned());
                }
                Some(names.into_iter().collect())
            }
            None => None,
        };

        if dialect.header && columns.is_none() && !rows.is_empty() {
            return Err(EncodeError::new(
                media_type,
                "rows are arrays; set header=absent or name the columns",
            ));
        }

        let mut writer = dialect.writer().from_writer(Vec::new());
        let write_failed = |e: csv::Error| EncodeError::with_source(media_type, e.to_string(), e);

        if dialect.header {
            if let Some(columns) = &columns {
                writer.write_record(columns).map_err(write_failed)?;
            }
        }

        for row in rows {
            let cells: Vec<String> = match row {
                Value::Object(object) => match &columns {
                    Some(columns) => columns
                        .iter()
                        .map(|column| object.get(column).map(cell_text).unwrap_or_default())
                        .collect(),
                    None => object.values().map(cell_text).collect(),
                },
                Value::Array(items) => items.iter().map(cell_text).collect(),
                other => {
                    return Err(EncodeError::new(
                        media_type,
                        format!("CSV rows must be objects or arrays, found {}", other),
                    ))
                }
            };
            writer.write_record(&cells).map_err(write_failed)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| EncodeError::with_source(media_type, "cannot flush CSV output", e.into_error()))?;
        String::from_utf8(bytes)
            .map(Content::Text)
            .map_err(|e| EncodeError::with_source(media_type, "CSV output is not UTF-8", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn csv_type(text: &str) -> MediaType {
        MediaType::parse(text).unwrap()
    }

    #[test]
    fn test_decode_with_header() {
        let format = CsvFormat::new();
        let value = format
            .decode(&Content::from("id,name\n1,widget\n2,gadget\n"), &csv_type("text/csv"))
            .unwrap();
        assert_eq!(
            value,
            json!([
                {"id": "1", "name": "widget"},
                {"id": "2", "name": "gadget"}
            ])
        );
    }

    #[test]
    fn test_decode_without_header() {
        let format = CsvFormat::new();
        let value = format
            .decode(
                &Content::from("1|\"a|b\"\n2|c\n"),
                &csv_type("text/csv;header=absent;separator=|"),
            )
            .unwrap();
        assert_eq!(value, json!([["1", "a|b"], ["2", "c"]]));
    }

    #[test]
    fn test_decode_with_named_columns() {
        let format = CsvFormat::new();
        let value = format
            .decode(
                &Content::from("1,widget\n"),
                &csv_type("text/csv;header=absent;columns=\"id,name\""),
            )
            .unwrap();
        assert_eq!(value, json!([{"id": "1", "name": "widget"}]));
    }

    #[test]
    fn test_encode_objects() {
        let format = CsvFormat::new();
        let content = format
            .encode(
                &json!([{"id": 1, "name": "widget, large"}, {"id": 2, "name": null}]),
                &csv_type("text/csv"),
            )
            .unwrap();
        assert_eq!(content.as_str(), Some("id,name\n1,\"widget, large\"\n2,\n"));
    }

    #[test]
    fn test_encode_arrays_needs_columns() {
        let format = CsvFormat::new();
        let rows = json!([[1, 2], [3, 4]]);

        assert!(format.encode(&rows, &csv_type("text/csv")).is_err());

        let content = format
            .encode(&rows, &csv_type("text/csv;header=absent"))
            .unwrap();
        assert_eq!(content.as_str(), Some("1,2\n3,4\n"));
    }

    #[test]
    fn test_invalid_dialect() {
        let format = CsvFormat::new();
        let err = format
            .decode(&Content::from("a"), &csv_type("text/csv;separator=ab"))
            .unwrap_err();
        assert!(err.message.contains("separator"));
    }
}
