use std::borrow::Cow;

use log::{debug, warn};
use serde_json::{Map, Value};

use crate::core::xml;
use crate::parser::split_index;
use crate::types::ResponseValue;

/// How a response body was understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    Json,
    Xml,
    /// Neither JSON nor XML; the body is kept verbatim as a scalar.
    Unparsed,
}

/// A decoded response body with null-safe access.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResponse {
    document: Value,
    format: BodyFormat,
}

/// Decodes `raw` as JSON, then as namespace-stripped XML, and finally falls
/// back to the raw text. Never fails.
pub fn normalize(raw: &str) -> NormalizedResponse {
    match serde_json::from_str::<Value>(raw) {
        Ok(document) => {
            debug!("Response decoded as JSON");
            return NormalizedResponse { document, format: BodyFormat::Json };
        }
        Err(e) => debug!("Response is not JSON: {}", e),
    }

    match xml::parse_document(raw) {
        Ok(mut root) => {
            xml::strip_namespaces(&mut root);
            debug!("Response decoded as XML with root '{}'", root.tag);
            NormalizedResponse { document: xml::to_object(&root), format: BodyFormat::Xml }
        }
        Err(e) => {
            warn!("Response could be parsed neither as JSON nor as XML: {}", e);
            NormalizedResponse { document: Value::String(raw.to_string()), format: BodyFormat::Unparsed }
        }
    }
}

impl NormalizedResponse {
    pub fn format(&self) -> BodyFormat {
        self.format
    }

    pub fn is_parsed(&self) -> bool {
        self.format != BodyFormat::Unparsed
    }

    pub fn root(&self) -> Field<'_> {
        Field::new(&self.document)
    }

    pub fn get(&self, key: &str) -> Field<'_> {
        self.root().get(key)
    }

    pub fn lookup(&self, path: &str) -> Field<'_> {
        self.root().lookup(path)
    }

    /// The decoded document as it was stored.
    pub fn document(&self) -> &Value {
        &self.document
    }
}

// --- Field Access ---

/// Shape of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind<'a> {
    Null,
    Scalar(Cow<'a, str>),
    List(usize),
    Map(usize),
}

/// A borrowed view into a response document.
///
/// Lookups never fail: a missing key, an out-of-range index, or any access
/// through a null field yields another null field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field<'a> {
    value: Option<&'a Value>,
}

impl<'a> Field<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self { value: Some(value).filter(|v| !v.is_null()) }
    }

    pub fn null() -> Self {
        Self { value: None }
    }

    pub fn get(&self, key: &str) -> Field<'a> {
        match self.value {
            Some(Value::Object(map)) => map.get(key).map_or_else(Field::null, Field::new),
            _ => Field::null(),
        }
    }

    pub fn at(&self, index: usize) -> Field<'a> {
        match self.value {
            Some(Value::Array(items)) => items.get(index).map_or_else(Field::null, Field::new),
            _ => Field::null(),
        }
    }

    /// Follows a dot-separated path; segments may carry an index (`items[2]`).
    pub fn lookup(&self, path: &str) -> Field<'a> {
        path.split('.').fold(*self, |field, segment| {
            let (name, index) = split_index(segment);
            let field = if name.is_empty() { field } else { field.get(name) };
            match index {
                Some(index) => field.at(index),
                None => field,
            }
        })
    }

    pub fn kind(&self) -> FieldKind<'a> {
        match self.value {
            None | Some(Value::Null) => FieldKind::Null,
            Some(Value::Array(items)) => FieldKind::List(items.len()),
            Some(Value::Object(map)) => FieldKind::Map(map.len()),
            Some(_) => self.as_str().map_or(FieldKind::Null, FieldKind::Scalar),
        }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Scalar text; numbers and booleans are rendered, containers give `None`.
    pub fn as_str(&self) -> Option<Cow<'a, str>> {
        match self.value? {
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Number(n) => Some(Cow::Owned(n.to_string())),
            Value::Bool(b) => Some(Cow::Owned(b.to_string())),
            _ => None,
        }
    }

    /// Number of elements or entries; scalars count as one, null as zero.
    pub fn len(&self) -> usize {
        match self.value {
            None => 0,
            Some(Value::Array(items)) => items.len(),
            Some(Value::Object(map)) => map.len(),
            Some(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements of a list. A single non-list value is yielded once, so an XML
    /// element that happens to appear only once reads like a one-item list.
    pub fn items(self) -> impl Iterator<Item = Field<'a>> + 'a {
        let values: Box<dyn Iterator<Item = &'a Value> + 'a> = match self.value {
            None => Box::new(std::iter::empty()),
            Some(Value::Array(items)) => Box::new(items.iter()),
            Some(value) => Box::new(std::iter::once(value)),
        };
        values.map(Field::new)
    }

    pub fn entries(self) -> impl Iterator<Item = (&'a str, Field<'a>)> + 'a {
        let map: Option<&'a Map<String, Value>> = self.value.and_then(Value::as_object);
        map.into_iter().flat_map(|m| m.iter().map(|(k, v)| (k.as_str(), Field::new(v))))
    }

    pub fn keys(self) -> impl Iterator<Item = &'a str> + 'a {
        self.entries().map(|(k, _)| k)
    }

    /// Owned copy of this field and everything below it.
    pub fn materialize(&self) -> ResponseValue {
        self.value.map_or(ResponseValue::Null, ResponseValue::from)
    }
}
