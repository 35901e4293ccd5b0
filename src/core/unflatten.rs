use log::{debug, trace};
use serde_json::{Map, Value};

use crate::errors::TemplateError;
use crate::parser::split_index;

/// Rebuilds nested JSON from flat keys such as `order::items[0]::sku`.
#[derive(Debug, Clone)]
pub struct JsonUnflattener {
    delimiter: String,
}

/// Where the next path segment lands.
///
/// `Element` carries the index recorded by the previous `name[n]` segment.
enum Slot<'v> {
    Object(&'v mut Map<String, Value>),
    Element { list: &'v mut Vec<Value>, index: usize },
}

impl JsonUnflattener {
    pub fn new(delimiter: &str) -> Self {
        Self { delimiter: delimiter.to_string() }
    }

    pub fn unflatten<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>) -> Result<Value, TemplateError>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut root = Map::new();
        self.unflatten_into(&mut root, entries)?;
        Ok(Value::Object(root))
    }

    /// Merges flat entries into an existing object.
    pub fn unflatten_into<K, V>(
        &self,
        root: &mut Map<String, Value>,
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), TemplateError>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (key, value) in entries {
            self.insert(root, key.as_ref(), value.into())?;
        }
        Ok(())
    }

    fn insert(&self, root: &mut Map<String, Value>, key: &str, value: Value) -> Result<(), TemplateError> {
        let segments: Vec<&str> = key.split(self.delimiter.as_str()).collect();
        let Some((last, parents)) = segments.split_last() else {
            return Err(TemplateError::EmptySegment { key: key.to_string() });
        };

        let (field, trailing_index) = split_index(last);
        if trailing_index.is_some() {
            return Err(TemplateError::TrailingIndexNotAllowed { key: key.to_string() });
        }
        if field.is_empty() {
            return Err(TemplateError::EmptySegment { key: key.to_string() });
        }

        let mut slot = Slot::Object(root);
        for segment in parents {
            slot = descend(slot, segment, key)?;
        }

        trace!("Assigning '{}' for key '{}'", field, key);
        match slot {
            Slot::Object(map) => {
                map.insert(field.to_string(), value);
            }
            Slot::Element { list, index } => {
                element_map(list, index, key, field)?.insert(field.to_string(), value);
            }
        }
        Ok(())
    }
}

/// Rebuilds nested JSON from `entries`, splitting keys on `delimiter`.
pub fn unflatten<K, V>(entries: impl IntoIterator<Item = (K, V)>, delimiter: &str) -> Result<Value, TemplateError>
where
    K: AsRef<str>,
    V: Into<Value>,
{
    JsonUnflattener::new(delimiter).unflatten(entries)
}

/// One traversal step. Takes the current slot by value and hands back the next
/// one, so the pending index never outlives the step that produced it.
fn descend<'v>(slot: Slot<'v>, segment: &str, key: &str) -> Result<Slot<'v>, TemplateError> {
    let (name, index) = split_index(segment);
    if name.is_empty() {
        return Err(TemplateError::EmptySegment { key: key.to_string() });
    }

    let container = match slot {
        Slot::Object(map) => map,
        Slot::Element { list, index: pending } => element_map(list, pending, key, segment)?,
    };

    match index {
        Some(index) => {
            let list = container
                .entry(name.to_string())
                .or_insert_with(|| Value::Array(Vec::new()))
                .as_array_mut()
                .ok_or_else(|| conflict(key, segment))?;
            if index > list.len() {
                return Err(TemplateError::AmbiguousIndexTarget {
                    key: key.to_string(),
                    segment: name.to_string(),
                    index,
                    available: list.len(),
                });
            }
            Ok(Slot::Element { list, index })
        }
        None => {
            let map = container
                .entry(name.to_string())
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
                .ok_or_else(|| conflict(key, segment))?;
            Ok(Slot::Object(map))
        }
    }
}

/// The object stored at `index`, created when missing.
///
/// Entries that share an index merge into the same object; `index` is at most
/// `list.len()`, where a new element is appended.
fn element_map<'v>(
    list: &'v mut Vec<Value>,
    index: usize,
    key: &str,
    segment: &str,
) -> Result<&'v mut Map<String, Value>, TemplateError> {
    if index > list.len() {
        return Err(conflict(key, segment));
    }
    if index == list.len() {
        list.push(Value::Null);
    }
    if list[index].is_null() {
        list[index] = Value::Object(Map::new());
    } else if !list[index].is_object() {
        debug!("Inserting object before scalar at index {} for key '{}'", index, key);
        list.insert(index, Value::Object(Map::new()));
    }
    list[index].as_object_mut().ok_or_else(|| conflict(key, segment))
}

fn conflict(key: &str, segment: &str) -> TemplateError {
    TemplateError::PathConflict { key: key.to_string(), segment: segment.to_string() }
}
