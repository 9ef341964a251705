//! XML data format backed by `quick-xml`.
//!
//! A document maps to an object with a single key, the root element name.
//! Each element becomes an object holding its attributes under `_attr`, its
//! text under `_text` and its child elements by name; repeated children
//! collect into an array.
//!
//! ```text
//! <order id="7"><item>a</item><item>b</item></order>
//! {"order": {"_attr": {"id": "7"}, "item": [{"_text": "a"}, {"_text": "b"}]}}
//! ```
//!
//! With `mode=simplified`, elements without attributes or children decode to
//! their text (or `null` when empty). Encoding accepts both shapes; scalars
//! become element text and `null` an empty element. `fmt` indents the output.

use super::json::PARAM_FORMAT;
use super::{text_of, DataFormat, DecodeError, EncodeError};
use crate::document::{Content, MediaType};
use crate::library::display;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::{Map, Value};

pub const PARAM_MODE: &str = "mode";

/// Object key holding an element's attributes.
pub const ATTRIBUTES_KEY: &str = "_attr";
/// Object key holding an element's text.
pub const TEXT_KEY: &str = "_text";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Basic,
    Simplified,
}

impl Mode {
    fn from_media_type(media_type: &MediaType) -> Result<Self, String> {
        match media_type.param(PARAM_MODE) {
            None | Some("basic") => Ok(Mode::Basic),
            Some("simplified") => Ok(Mode::Simplified),
            Some(other) => Err(format!(
                "unknown mode '{}', expected basic or simplified",
                other
            )),
        }
    }
}

pub struct XmlFormat {
    types: Vec<MediaType>,
}

impl XmlFormat {
    pub fn new() -> Self {
        Self {
            types: vec![
                MediaType::new("application", "xml"),
                MediaType::new("text", "xml"),
                MediaType::new("application", "*+xml"),
            ],
        }
    }
}

impl Default for XmlFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl DataFormat for XmlFormat {
    fn name(&self) -> &str {
        "xml"
    }

    fn readable_types(&self) -> &[MediaType] {
        &self.types
    }

    fn writable_types(&self) -> &[MediaType] {
        &self.types
    }

    fn decode(&self, content: &Content, media_type: &MediaType) -> Result<Value, DecodeError> {
        let mode = Mode::from_media_type(media_type)
            .map_err(|message| DecodeError::new(media_type, message))?;
        let text = text_of(content, media_type)?;

        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut open: Vec<Element> = Vec::new();
        let mut root: Option<(String, Value)> = None;

        loop {
            let event = reader.read_event().map_err(|e| malformed(media_type, e))?;
            match event {
                Event::Start(start) => open.push(Element::open(&start, media_type)?),
                Event::Empty(start) => {
                    let element = Element::open(&start, media_type)?;
                    close(element, mode, &mut open, &mut root, media_type)?;
                }
                Event::End(_) => {
                    let element = open
                        .pop()
                        .ok_or_else(|| DecodeError::new(media_type, "unexpected closing tag"))?;
                    close(element, mode, &mut open, &mut root, media_type)?;
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| malformed(media_type, e))?;
                    append_text(&mut open, &text, media_type)?;
                }
                Event::CData(data) => {
                    let text = std::str::from_utf8(&data).map_err(|e| malformed(media_type, e))?;
                    append_text(&mut open, text, media_type)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(element) = open.last() {
            return Err(DecodeError::new(
                media_type,
                format!("element '{}' is never closed", element.name),
            ));
        }

        let (name, value) = root.ok_or_else(|| DecodeError::new(media_type, "no root element"))?;
        let mut document = Map::new();
        document.insert(name, value);
        Ok(Value::Object(document))
    }

    fn encode(&self, value: &Value, media_type: &MediaType) -> Result<Content, EncodeError> {
        let (name, body) = match value.as_object() {
            Some(object) if object.len() == 1 => object
                .iter()
                .next()
                .filter(|(_, body)| !body.is_array())
                .ok_or_else(|| EncodeError::new(media_type, "the root element cannot repeat"))?,
            _ => {
                return Err(EncodeError::new(
                    media_type,
                    "XML needs an object with exactly one key, the root element",
                ))
            }
        };

        let pretty = media_type
            .param(PARAM_FORMAT)
            .map_or(false, |flag| !flag.eq_ignore_ascii_case("false"));
        let writer = if pretty {
            Writer::new_with_indent(Vec::new(), b' ', 2)
        } else {
            Writer::new(Vec::new())
        };

        let mut out = XmlWriter { writer, media_type };
        out.element(name, body)?;

        String::from_utf8(out.writer.into_inner())
            .map(Content::Text)
            .map_err(|e| EncodeError::with_source(media_type, "output is not UTF-8", e))
    }
}

fn malformed<E>(media_type: &MediaType, error: E) -> DecodeError
where
    E: std::error::Error + Send + Sync + 'static,
{
    DecodeError::with_source(media_type, format!("malformed XML: {}", error), error)
}

/// An element being read.
struct Element {
    name: String,
    attributes: Map<String, Value>,
    children: Map<String, Value>,
    text: String,
}

impl Element {
    fn open(start: &BytesStart<'_>, media_type: &MediaType) -> Result<Self, DecodeError> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| malformed(media_type, e))?
            .to_string();

        let mut attributes = Map::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| malformed(media_type, e))?;
            let key = std::str::from_utf8(attribute.key.as_ref())
                .map_err(|e| malformed(media_type, e))?
                .to_string();
            let value = attribute
                .unescape_value()
                .map_err(|e| malformed(media_type, e))?;
            attributes.insert(key, Value::String(value.into_owned()));
        }

        Ok(Self {
            name,
            attributes,
            children: Map::new(),
            text: String::new(),
        })
    }

    fn add_child(&mut self, name: String, value: Value) {
        match self.children.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.children.insert(name, value);
            }
        }
    }

    fn into_value(self, mode: Mode) -> Value {
        if mode == Mode::Simplified && self.attributes.is_empty() && self.children.is_empty() {
            return if self.text.is_empty() {
                Value::Null
            } else {
                Value::String(self.text)
            };
        }

        let mut object = Map::new();
        if !self.attributes.is_empty() {
            object.insert(ATTRIBUTES_KEY.to_string(), Value::Object(self.attributes));
        }
        if !self.text.is_empty() {
            object.insert(TEXT_KEY.to_string(), Value::String(self.text));
        }
        object.extend(self.children);
        Value::Object(object)
    }
}

fn close(
    element: Element,
    mode: Mode,
    open: &mut [Element],
    root: &mut Option<(String, Value)>,
    media_type: &MediaType,
) -> Result<(), DecodeError> {
    let name = element.name.clone();
    let value = element.into_value(mode);

    match open.last_mut() {
        Some(parent) => parent.add_child(name, value),
        None if root.is_some() => {
            return Err(DecodeError::new(media_type, "more than one root element"))
        }
        None => *root = Some((name, value)),
    }
    Ok(())
}

fn append_text(open: &mut [Element], text: &str, media_type: &MediaType) -> Result<(), DecodeError> {
    match open.last_mut() {
        Some(element) => {
            if !element.text.is_empty() && !text.is_empty() {
                element.text.push(' ');
            }
            element.text.push_str(text);
            Ok(())
        }
        None if text.is_empty() => Ok(()),
        None => Err(DecodeError::new(media_type, "text outside the root element")),
    }
}

/// Element names: a letter or `_`, then letters, digits, `-`, `_`, `.`, `:`.
fn is_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

struct XmlWriter<'m> {
    writer: Writer<Vec<u8>>,
    media_type: &'m MediaType,
}

impl XmlWriter<'_> {
    fn event(&mut self, event: Event<'_>) -> Result<(), EncodeError> {
        self.writer
            .write_event(event)
            .map_err(|e| EncodeError::with_source(self.media_type, e.to_string(), e))
    }

    fn check_name(&self, name: &str) -> Result<(), EncodeError> {
        if is_element_name(name) {
            Ok(())
        } else {
            Err(EncodeError::new(
                self.media_type,
                format!("'{}' is not a valid XML name", name),
            ))
        }
    }

    fn element(&mut self, name: &str, value: &Value) -> Result<(), EncodeError> {
        self.check_name(name)?;

        match value {
            Value::Array(items) => {
                for item in items {
                    self.element(name, item)?;
                }
                Ok(())
            }
            Value::Null => self.event(Event::Empty(BytesStart::new(name))),
            Value::Object(object) => {
                let mut start = BytesStart::new(name);
                match object.get(ATTRIBUTES_KEY) {
                    None | Some(Value::Null) => {}
                    Some(Value::Object(attributes)) => {
                        for (key, value) in attributes {
                            self.check_name(key)?;
                            let value = display(value);
                            start.push_attribute((key.as_str(), value.as_str()));
                        }
                    }
                    Some(_) => {
                        return Err(EncodeError::new(
                            self.media_type,
                            format!("'{}' of element '{}' must be an object", ATTRIBUTES_KEY, name),
                        ))
                    }
                }

                let text = object.get(TEXT_KEY).filter(|text| !text.is_null());
                let mut children = object
                    .iter()
                    .filter(|(key, _)| key.as_str() != ATTRIBUTES_KEY && key.as_str() != TEXT_KEY)
                    .peekable();

                if text.is_none() && children.peek().is_none() {
                    return self.event(Event::Empty(start));
                }

                self.event(Event::Start(start))?;
                if let Some(text) = text {
                    self.event(Event::Text(BytesText::new(&display(text))))?;
                }
                for (key, child) in children {
                    self.element(key, child)?;
                }
                self.event(Event::End(BytesEnd::new(name)))
            }
            scalar => {
                self.event(Event::Start(BytesStart::new(name)))?;
                self.event(Event::Text(BytesText::new(&display(scalar))))?;
                self.event(Event::End(BytesEnd::new(name)))
            }
        }
    }
}
