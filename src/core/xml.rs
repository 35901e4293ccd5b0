use std::io::Cursor;

use log::trace;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::{Map, Value};

use crate::errors::XmlError;
use crate::types::Node;

/// Deepest element nesting `parse_document` accepts.
pub const MAX_DEPTH: usize = 128;

// --- Reading ---

/// Parses an XML document into a [`Node`] tree.
///
/// The document must hold exactly one root element; text outside of it (other
/// than whitespace) is rejected. Comments, processing instructions and the
/// declaration are skipped. Tag and attribute names are kept as written.
/// Nesting deeper than [`MAX_DEPTH`] is rejected.
pub fn parse_document(raw: &str) -> Result<Node, XmlError> {
    let mut reader = Reader::from_str(raw);
    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(XmlError::Structure(format!("elements nested deeper than {}", MAX_DEPTH)));
                }
                stack.push(element(&e)?);
            }
            Event::Empty(e) => {
                let node = element(&e)?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| XmlError::Structure("closing tag without an open element".to_string()))?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Text(t) => {
                let text = t.unescape()?;
                push_text(&mut stack, &text)?;
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c).into_owned();
                push_text(&mut stack, &text)?;
            }
            Event::Eof => break,
            _ => (),
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Structure(format!("element '{}' is never closed", open.tag)));
    }
    root.ok_or_else(|| XmlError::Structure("document has no root element".to_string()))
}

fn element(start: &BytesStart) -> Result<Node, XmlError> {
    let mut node = Node::new(&String::from_utf8_lossy(start.name().as_ref()));
    for attribute in start.attributes() {
        let attribute = attribute?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value()?;
        node.set_attribute(&key, &value);
    }
    Ok(node)
}

fn attach(stack: &mut [Node], root: &mut Option<Node>, node: Node) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_some() => {
            return Err(XmlError::Structure(format!("second root element '{}'", node.tag)));
        }
        None => *root = Some(node),
    }
    Ok(())
}

fn push_text(stack: &mut [Node], text: &str) -> Result<(), XmlError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(());
    }
    let Some(current) = stack.last_mut() else {
        return Err(XmlError::Structure(format!("text outside the root element: {:?}", text)));
    };
    match current.text.as_mut() {
        Some(existing) => existing.push_str(text),
        None => current.text = Some(text.to_string()),
    }
    Ok(())
}

// --- Namespaces ---

/// Drops namespace prefixes from every tag and attribute name and removes
/// `xmlns` / `xmlns:*` declarations, walking the whole tree.
pub fn strip_namespaces(node: &mut Node) {
    node.tag = local_name(&node.tag).to_string();
    node.attributes.retain(|(key, _)| key != "xmlns" && !key.starts_with("xmlns:"));
    for (key, _) in node.attributes.iter_mut() {
        *key = local_name(key).to_string();
    }
    for child in node.children.iter_mut() {
        strip_namespaces(child);
    }
}

fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

// --- Object Shape ---

/// Converts a tree into the conventional object shape, keyed by the root tag.
///
/// Elements with neither attributes nor children become their text (or null).
/// Others become maps holding `@attribute` keys, one key per child tag (a list
/// when the tag repeats) and `#text` for any text next to them.
pub fn to_object(root: &Node) -> Value {
    let mut document = Map::new();
    document.insert(root.tag.clone(), element_value(root));
    Value::Object(document)
}

fn element_value(node: &Node) -> Value {
    if node.attributes.is_empty() && node.children.is_empty() {
        return node.text.clone().map_or(Value::Null, Value::String);
    }

    let mut map = Map::new();
    for (key, value) in &node.attributes {
        map.insert(format!("@{}", key), Value::String(value.clone()));
    }
    for child in &node.children {
        let value = element_value(child);
        match map.get_mut(&child.tag) {
            // element values are never arrays, so an array here is a repeated tag
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(child.tag.clone(), value);
            }
        }
    }
    if let Some(text) = &node.text {
        map.insert("#text".to_string(), Value::String(text.clone()));
    }
    Value::Object(map)
}

// --- Writing ---

/// Serializes a tree to XML text (no declaration).
pub fn write_document(root: &Node) -> Result<String, XmlError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_node(&mut writer, root)?;
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| XmlError::Write(e.to_string()))
}

fn write_node(writer: &mut Writer<Cursor<Vec<u8>>>, node: &Node) -> Result<(), XmlError> {
    trace!("Writing element '{}'", node.tag);
    let mut start = BytesStart::new(node.tag.as_str());
    for (key, value) in &node.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if node.children.is_empty() && node.text.is_none() {
        return writer.write_event(Event::Empty(start)).map_err(|e| XmlError::Write(e.to_string()));
    }

    writer.write_event(Event::Start(start)).map_err(|e| XmlError::Write(e.to_string()))?;
    if let Some(text) = &node.text {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(|e| XmlError::Write(e.to_string()))?;
    }
    for child in &node.children {
        write_node(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(node.tag.as_str())))
        .map_err(|e| XmlError::Write(e.to_string()))
}
