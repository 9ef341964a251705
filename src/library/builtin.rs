//! The built-in `morph` library, bound into every namespace.

use super::{
    check_arity, display, string_arg, type_name, FunctionError, FunctionTable, Importer, Library,
    LibraryError,
};
use crate::document::{Content, MediaType};
use crate::formats::FormatRegistry;
use crate::header::Header;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::sync::Arc;

pub const BUILTIN_NAMESPACE: &str = "morph";

/// Characters left alone by `urlEncode`, as in HTML form encoding.
const FORM_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'*');

#[derive(Debug, Clone, Copy, Default)]
pub struct MorphLibrary;

impl Library for MorphLibrary {
    fn namespace(&self) -> &str {
        BUILTIN_NAMESPACE
    }

    fn functions(
        &self,
        formats: &FormatRegistry,
        _header: &Header,
        importer: &Arc<dyn Importer>,
    ) -> Result<FunctionTable, LibraryError> {
        let read_formats = formats.clone();
        let write_formats = formats.clone();
        let importer = Arc::clone(importer);

        FunctionTable::new()
            .with("upper", upper)?
            .with("lower", lower)?
            .with("trim", trim)?
            .with("length", length)?
            .with("keys", keys)?
            .with("values", values)?
            .with("join", join)?
            .with("split", split)?
            .with("contains", contains)?
            .with("toString", to_string)?
            .with("base64Encode", base64_encode)?
            .with("base64Decode", base64_decode)?
            .with("urlEncode", url_encode)?
            .with("urlDecode", url_decode)?
            .with("abs", abs)?
            .with("ceil", |args: &[Value]| rounded(args, f64::ceil))?
            .with("floor", |args: &[Value]| rounded(args, f64::floor))?
            .with("round", |args: &[Value]| rounded(args, f64::round))?
            .with("max", |args: &[Value]| extreme(args, Ordering::Greater))?
            .with("min", |args: &[Value]| extreme(args, Ordering::Less))?
            .with("flatten", flatten)?
            .with("distinct", distinct)?
            .with("read", move |args| read(&read_formats, args))?
            .with("write", move |args| write(&write_formats, args))?
            .with("resource", move |args| resource(importer.as_ref(), args))
    }
}

fn upper(args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 1)?;
    Ok(Value::String(string_arg(args, 0)?.to_uppercase()))
}

fn lower(args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 1)?;
    Ok(Value::String(string_arg(args, 0)?.to_lowercase()))
}

fn trim(args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 1)?;
    Ok(Value::String(string_arg(args, 0)?.trim().to_string()))
}

fn length(args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 1)?;
    let length = match &args[0] {
        Value::Null => 0,
        Value::String(text) => text.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(object) => object.len(),
        other => {
            return Err(FunctionError::invalid_argument(
                0,
                format!("{} has no length", type_name(other)),
            ))
        }
    };
    Ok(Value::from(length))
}

fn keys(args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 1)?;
    match &args[0] {
        Value::Object(object) => Ok(object.keys().cloned().map(Value::String).collect()),
        other => Err(FunctionError::invalid_argument(
            0,
            format!("expected an object, found {}", type_name(other)),
        )),
    }
}

fn values(args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 1)?;
    match &args[0] {
        Value::Object(object) => Ok(object.values().cloned().collect()),
        other => Err(FunctionError::invalid_argument(
            0,
            format!("expected an object, found {}", type_name(other)),
        )),
    }
}

fn join(args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 2)?;
    let separator = string_arg(args, 1)?;
    let items = args[0].as_array().ok_or_else(|| {
        FunctionError::invalid_argument(0, format!("expected an array, found {}", type_name(&args[0])))
    })?;

    let parts: Vec<String> = items.iter().map(display).collect();
    Ok(Value::String(parts.join(separator)))
}

fn split(args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 2)?;
    let text = string_arg(args, 0)?;
    let separator = string_arg(args, 1)?;
    if separator.is_empty() {
        return Err(FunctionError::invalid_argument(1, "separator must not be empty"));
    }
    Ok(text
        .split(separator)
        .map(|part| Value::String(part.to_string()))
        .collect())
}

fn contains(args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 2)?;
    let found = match (&args[0], &args[1]) {
        (Value::String(text), Value::String(needle)) => text.contains(needle.as_str()),
        (Value::Array(items), needle) => items.contains(needle),
        (Value::Object(object), Value::String(key)) => object.contains_key(key),
        (container, _) => {
            return Err(FunctionError::invalid_argument(
                0,
                format!("cannot search a {}", type_name(container)),
            ))
        }
    };
    Ok(Value::Bool(found))
}

fn to_string(args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 1)?;
    Ok(Value::String(display(&args[0])))
}

fn base64_encode(args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 1)?;
    Ok(Value::String(STANDARD.encode(string_arg(args, 0)?)))
}

fn base64_decode(args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 1)?;
    let bytes = STANDARD
        .decode(string_arg(args, 0)?)
        .map_err(|e| FunctionError::failed_with("invalid base64", e))?;
    String::from_utf8(bytes)
        .map(Value::String)
        .map_err(|e| FunctionError::failed_with("decoded base64 is not UTF-8 text", e))
}

/// Form encoding: spaces become `+`.
fn url_encode(args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 1)?;
    let encoded = utf8_percent_encode(string_arg(args, 0)?, FORM_SAFE).to_string();
    Ok(Value::String(encoded.replace("%20", "+")))
}

fn url_decode(args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 1)?;
    let spaced = string_arg(args, 0)?.replace('+', " ");
    let decoded = percent_decode_str(&spaced)
        .decode_utf8()
        .map_err(|e| FunctionError::failed_with("decoded URL text is not UTF-8", e))?;
    Ok(Value::String(decoded.into_owned()))
}

fn number_arg(args: &[Value], index: usize) -> Result<f64, FunctionError> {
    match args.get(index) {
        Some(Value::Number(number)) => number
            .as_f64()
            .ok_or_else(|| FunctionError::invalid_argument(index, "number out of range")),
        Some(other) => Err(FunctionError::invalid_argument(
            index,
            format!("expected a number, found {}", type_name(other)),
        )),
        None => Err(FunctionError::invalid_argument(index, "missing argument")),
    }
}

fn array_arg(args: &[Value], index: usize) -> Result<&Vec<Value>, FunctionError> {
    match args.get(index) {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(FunctionError::invalid_argument(
            index,
            format!("expected an array, found {}", type_name(other)),
        )),
        None => Err(FunctionError::invalid_argument(index, "missing argument")),
    }
}

fn float(value: f64) -> Result<Value, FunctionError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| FunctionError::failed("result is not a finite number"))
}

fn abs(args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 1)?;
    if let Some(integer) = args[0].as_i64().and_then(i64::checked_abs) {
        return Ok(Value::from(integer));
    }
    float(number_arg(args, 0)?.abs())
}

/// Apply `op` and return an integer when the result fits one.
fn rounded(args: &[Value], op: fn(f64) -> f64) -> Result<Value, FunctionError> {
    check_arity(args, 1)?;
    if let Some(integer) = args[0].as_i64() {
        return Ok(Value::from(integer));
    }
    let result = op(number_arg(args, 0)?);
    if result >= i64::MIN as f64 && result < i64::MAX as f64 {
        Ok(Value::from(result as i64))
    } else {
        float(result)
    }
}

/// The element of a number array that compares `wanted` against all others.
/// An empty array yields `null`.
fn extreme(args: &[Value], wanted: Ordering) -> Result<Value, FunctionError> {
    check_arity(args, 1)?;
    let mut best: Option<(&Value, f64)> = None;

    for (position, item) in array_arg(args, 0)?.iter().enumerate() {
        let number = item.as_f64().ok_or_else(|| {
            FunctionError::invalid_argument(
                0,
                format!("element {} is a {}, not a number", position, type_name(item)),
            )
        })?;
        if best.map_or(true, |(_, current)| number.total_cmp(&current) == wanted) {
            best = Some((item, number));
        }
    }

    Ok(best.map_or(Value::Null, |(item, _)| item.clone()))
}

/// Splice nested arrays one level deep.
fn flatten(args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 1)?;
    let mut flat = Vec::new();
    for item in array_arg(args, 0)? {
        match item {
            Value::Array(inner) => flat.extend(inner.iter().cloned()),
            other => flat.push(other.clone()),
        }
    }
    Ok(Value::Array(flat))
}

/// Drop repeated elements, keeping first occurrences in order.
fn distinct(args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 1)?;
    let mut unique: Vec<Value> = Vec::new();
    for item in array_arg(args, 0)? {
        if !unique.contains(item) {
            unique.push(item.clone());
        }
    }
    Ok(Value::Array(unique))
}

fn media_type_arg(args: &[Value], index: usize) -> Result<MediaType, FunctionError> {
    MediaType::parse(string_arg(args, index)?)
        .map_err(|e| FunctionError::invalid_argument(index, e.to_string()))
}

fn read(formats: &FormatRegistry, args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 2)?;
    let text = string_arg(args, 0)?;
    let media_type = media_type_arg(args, 1)?;

    formats
        .decode(&Content::from(text), &media_type)
        .map_err(|e| FunctionError::failed_with(format!("cannot read {}", media_type), e))
}

fn write(formats: &FormatRegistry, args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 2)?;
    let media_type = media_type_arg(args, 1)?;

    let document = formats
        .encode(&args[0], std::slice::from_ref(&media_type))
        .map_err(|e| FunctionError::failed_with(format!("cannot write {}", media_type), e))?;

    let text = match document.content() {
        Content::Empty => String::new(),
        Content::Text(text) => text.clone(),
        Content::Binary(bytes) => String::from_utf8(bytes.clone()).map_err(|e| {
            FunctionError::failed_with(format!("{} output is not text", media_type), e)
        })?,
        Content::Value(value) => value.to_string(),
    };
    Ok(Value::String(text))
}

fn resource(importer: &dyn Importer, args: &[Value]) -> Result<Value, FunctionError> {
    check_arity(args, 1)?;
    let path = string_arg(args, 0)?;
    importer
        .load(path)
        .map(Value::String)
        .ok_or_else(|| FunctionError::failed(format!("resource '{}' not found", path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::InMemoryImporter;
    use serde_json::json;

    fn table() -> FunctionTable {
        let importer: Arc<dyn Importer> =
            Arc::new(InMemoryImporter::new().with("greeting.txt", "hello"));
        MorphLibrary
            .functions(&FormatRegistry::default(), &Header::default(), &importer)
            .unwrap()
    }

    fn call(name: &str, args: &[Value]) -> Result<Value, FunctionError> {
        table().get(name).unwrap().call(args)
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(call("upper", &[json!("abc")]).unwrap(), json!("ABC"));
        assert_eq!(call("lower", &[json!("ABC")]).unwrap(), json!("abc"));
        assert_eq!(call("trim", &[json!("  x ")]).unwrap(), json!("x"));
        assert_eq!(call("split", &[json!("a,b"), json!(",")]).unwrap(), json!(["a", "b"]));
        assert_eq!(call("join", &[json!(["a", 1]), json!("-")]).unwrap(), json!("a-1"));
    }

    #[test]
    fn test_collection_functions() {
        let object = json!({"b": 1, "a": 2});
        assert_eq!(call("keys", &[object.clone()]).unwrap(), json!(["b", "a"]));
        assert_eq!(call("values", &[object.clone()]).unwrap(), json!([1, 2]));
        assert_eq!(call("length", &[object.clone()]).unwrap(), json!(2));
        assert_eq!(call("length", &[json!("héllo")]).unwrap(), json!(5));
        assert_eq!(call("contains", &[object, json!("a")]).unwrap(), json!(true));
        assert_eq!(call("contains", &[json!([1, 2]), json!(3)]).unwrap(), json!(false));
        assert_eq!(call("toString", &[json!({"a": 1})]).unwrap(), json!("{\"a\":1}"));
    }

    #[test]
    fn test_encoding_functions() {
        assert_eq!(call("base64Encode", &[json!("hello world")]).unwrap(), json!("aGVsbG8gd29ybGQ="));
        assert_eq!(call("base64Decode", &[json!("aGVsbG8gd29ybGQ=")]).unwrap(), json!("hello world"));
        assert!(call("base64Decode", &[json!("not base64!")]).is_err());
        assert!(call("base64Decode", &[json!("/w==")]).is_err());

        assert_eq!(call("urlEncode", &[json!("Hello World")]).unwrap(), json!("Hello+World"));
        assert_eq!(call("urlEncode", &[json!("a=b&c/d_e")]).unwrap(), json!("a%3Db%26c%2Fd_e"));
        assert_eq!(call("urlDecode", &[json!("Hello+World")]).unwrap(), json!("Hello World"));
        assert_eq!(call("urlDecode", &[json!("caf%C3%A9%21")]).unwrap(), json!("café!"));
        assert!(call("urlDecode", &[json!("%FF")]).is_err());
    }

    #[test]
    fn test_math_functions() {
        assert_eq!(call("abs", &[json!(-1)]).unwrap(), json!(1));
        assert_eq!(call("abs", &[json!(-1.5)]).unwrap(), json!(1.5));
        assert_eq!(call("ceil", &[json!(1.01)]).unwrap(), json!(2));
        assert_eq!(call("floor", &[json!(4.99)]).unwrap(), json!(4));
        assert_eq!(call("round", &[json!(2.5)]).unwrap(), json!(3));
        assert_eq!(call("round", &[json!(7)]).unwrap(), json!(7));
        assert!(call("abs", &[json!("1")]).is_err());

        assert_eq!(call("max", &[json!([3, 9.5, -1])]).unwrap(), json!(9.5));
        assert_eq!(call("min", &[json!([3, 9.5, -1])]).unwrap(), json!(-1));
        assert_eq!(call("max", &[json!([])]).unwrap(), Value::Null);
        assert!(call("min", &[json!([1, "2"])]).is_err());
    }

    #[test]
    fn test_array_functions() {
        assert_eq!(
            call("flatten", &[json!([[1, 2], 3, [[4]]])]).unwrap(),
            json!([1, 2, 3, [4]])
        );
        assert_eq!(
            call("distinct", &[json!([1, 2, 1, "a", "a", {"k": 1}, {"k": 1}])]).unwrap(),
            json!([1, 2, "a", {"k": 1}])
        );
        assert!(call("flatten", &[json!({"a": 1})]).is_err());
    }

    #[test]
    fn test_read_and_write() {
        assert_eq!(
            call("read", &[json!("a: 1"), json!("application/x-yaml")]).unwrap(),
            json!({"a": 1})
        );
        assert_eq!(
            call("write", &[json!({"a": 1}), json!("application/json")]).unwrap(),
            json!("{\"a\":1}")
        );

        let err = call("read", &[json!("{"), json!("application/json")]).unwrap_err();
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_resource() {
        assert_eq!(call("resource", &[json!("greeting.txt")]).unwrap(), json!("hello"));
        assert!(call("resource", &[json!("missing.txt")]).is_err());
    }

    #[test]
    fn test_bad_arguments() {
        assert!(matches!(
            call("upper", &[json!(1)]),
            Err(FunctionError::InvalidArgument { index: 0, .. })
        ));
        assert!(matches!(
            call("trim", &[]),
            Err(FunctionError::Arity { expected: 1, found: 0 })
        ));
    }
}
