// src/parser.rs
use lazy_static::lazy_static;
use log::{trace, warn};
use regex::Regex;

use crate::errors::TemplateError;

lazy_static! {
    // `name(k=v, ...)`, searched anywhere in the segment
    static ref ATTRIBUTE_CLAUSE: Regex = Regex::new(r"(.*?)\((.*?)\)").unwrap();
    // `name[<digits>]`, anchored at the start of the segment
    static ref INDEX_CLAUSE: Regex = Regex::new(r"^(.*?)\[(\d+)\]").unwrap();
}

// --- Path Model ---

/// One delimiter-separated component of a flat key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub base_name: String,
    pub attributes: Vec<(String, String)>,
    pub index: Option<usize>,
}

/// A single leaf assignment: a parsed path plus the scalar placed at its end.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatEntry {
    /// The raw flat key, kept for error reporting.
    pub key: String,
    pub path: Vec<PathSegment>,
    pub value: String,
}

impl FlatEntry {
    pub fn parse(key: &str, value: &str, delimiter: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            key: key.to_string(),
            path: parse_path(key, delimiter)?,
            value: value.to_string(),
        })
    }
}

// --- Public Entry Points ---

/// Splits a flat key on `delimiter` and parses every segment.
pub fn parse_path(key: &str, delimiter: &str) -> Result<Vec<PathSegment>, TemplateError> {
    key.split(delimiter)
        .map(|raw| {
            let segment = parse_segment(raw)?;
            if segment.base_name.is_empty() {
                return Err(TemplateError::EmptySegment { key: key.to_string() });
            }
            Ok(segment)
        })
        .collect()
}

/// Parses a single segment of the flat key grammar.
///
/// The attribute clause is extracted first; the index clause is then looked
/// for on what remains, so `node(a=1)[2]` carries both while an index written
/// inside an attribute value (`node(label='x[1]')`) is never an index.
///
/// The clause ends at the first `)`, so values cannot contain parentheses:
/// `Item(expr='f(x)')` yields `expr=f(x` and leaves `')` on the base name.
///
/// # Errors
/// `MalformedAttributeClause` if any attribute pair is not `key=value`.
pub fn parse_segment(raw: &str) -> Result<PathSegment, TemplateError> {
    let mut attributes = Vec::new();

    let remaining = match ATTRIBUTE_CLAUSE.captures(raw) {
        Some(caps) => {
            let (Some(clause), Some(name), Some(interior)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                return Err(TemplateError::MalformedAttributeClause { segment: raw.to_string() });
            };
            attributes = parse_attribute_pairs(raw, interior.as_str())?;
            format!("{}{}", name.as_str(), &raw[clause.end()..])
        }
        None => raw.to_string(),
    };

    let (base_name, index) = split_index(&remaining);
    trace!("Parsed segment {:?} -> name='{}', attributes={:?}, index={:?}", raw, base_name, attributes, index);

    Ok(PathSegment { base_name: base_name.trim().to_string(), attributes, index })
}

/// Splits an index clause off the start of a segment: `items[3]` -> (`items`, Some(3)).
///
/// Segments that do not start with `name[<digits>]` come back untouched with no index.
pub fn split_index(segment: &str) -> (&str, Option<usize>) {
    let Some(caps) = INDEX_CLAUSE.captures(segment) else {
        return (segment, None);
    };
    let (Some(clause), Some(name), Some(digits)) = (caps.get(0), caps.get(1), caps.get(2)) else {
        return (segment, None);
    };
    match digits.as_str().parse::<usize>() {
        Ok(index) => {
            if clause.end() < segment.len() {
                warn!("Ignoring text after index clause in segment {:?}", segment);
            }
            (name.as_str(), Some(index))
        }
        // digits too large for usize
        Err(_) => (segment, None),
    }
}

fn parse_attribute_pairs(segment: &str, interior: &str) -> Result<Vec<(String, String)>, TemplateError> {
    interior
        .split(',')
        .map(|pair| {
            let (key, value) = pair
                .trim()
                .split_once('=')
                .ok_or_else(|| TemplateError::MalformedAttributeClause { segment: segment.to_string() })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(TemplateError::MalformedAttributeClause { segment: segment.to_string() });
            }
            let value = value.trim().trim_matches(|c: char| c == '"' || c == '\'');
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}
