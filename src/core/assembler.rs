use log::{debug, trace};

use crate::errors::TemplateError;
use crate::parser::{FlatEntry, PathSegment};
use crate::types::Node;

/// Builds element trees from flat keys split on a fixed delimiter.
#[derive(Debug, Clone)]
pub struct TreeAssembler {
    delimiter: String,
}

impl TreeAssembler {
    pub fn new(delimiter: &str) -> Self {
        Self { delimiter: delimiter.to_string() }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Parses raw `(key, value)` pairs and assembles them under a new root.
    pub fn assemble_flat<K, V>(
        &self,
        root_tag: &str,
        root_attrs: &[(String, String)],
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Node, TemplateError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let entries = pairs
            .into_iter()
            .map(|(k, v)| FlatEntry::parse(k.as_ref(), v.as_ref(), &self.delimiter))
            .collect::<Result<Vec<_>, _>>()?;
        assemble(root_tag, root_attrs, &entries)
    }
}

/// Materializes `entries` into one element tree rooted at `root_tag`.
///
/// Entries are applied in order against the same tree, so later entries reuse
/// nodes created by earlier ones.
///
/// Indexed segments (`Item[n]`) are counted across the whole subtree below the
/// cursor, in document order, not among direct children only. Two cousins that
/// share a tag anywhere under the cursor take part in the same index sequence:
/// `Order.Item[1]` can land inside a different parent than `Order.Item[0]`.
/// Existing templates depend on this numbering.
pub fn assemble(
    root_tag: &str,
    root_attrs: &[(String, String)],
    entries: &[FlatEntry],
) -> Result<Node, TemplateError> {
    let mut root = Node::with_attributes(root_tag, root_attrs);
    assemble_into(&mut root, entries)?;
    Ok(root)
}

/// Applies `entries` to an existing tree.
pub fn assemble_into(root: &mut Node, entries: &[FlatEntry]) -> Result<(), TemplateError> {
    for entry in entries {
        let leaf = walk(root, entry)?;
        leaf.text = Some(entry.value.clone());
    }
    Ok(())
}

fn walk<'a>(root: &'a mut Node, entry: &FlatEntry) -> Result<&'a mut Node, TemplateError> {
    let mut cursor = root;
    for segment in &entry.path {
        cursor = match segment.index {
            Some(index) => descend_indexed(cursor, segment, index, &entry.key)?,
            None => descend_child(cursor, segment),
        };
    }
    Ok(cursor)
}

fn descend_indexed<'a>(
    cursor: &'a mut Node,
    segment: &PathSegment,
    index: usize,
    key: &str,
) -> Result<&'a mut Node, TemplateError> {
    let available = cursor.count_descendants(&segment.base_name);
    trace!("'{}[{}]' under '{}': {} existing", segment.base_name, index, cursor.tag, available);

    if index == available {
        debug!("Creating '{}' #{} under '{}'", segment.base_name, index, cursor.tag);
        return Ok(cursor.push_child(Node::with_attributes(&segment.base_name, &segment.attributes)));
    }

    let ambiguous = || TemplateError::AmbiguousIndexTarget {
        key: key.to_string(),
        segment: segment.base_name.clone(),
        index,
        available,
    };
    if index > available {
        return Err(ambiguous());
    }
    cursor.nth_descendant_mut(&segment.base_name, index).ok_or_else(ambiguous)
}

fn descend_child<'a>(cursor: &'a mut Node, segment: &PathSegment) -> &'a mut Node {
    match cursor.children.iter().position(|c| c.tag == segment.base_name) {
        Some(position) => {
            trace!("Reusing '{}' under '{}'", segment.base_name, cursor.tag);
            &mut cursor.children[position]
        }
        None => {
            debug!("Creating '{}' under '{}'", segment.base_name, cursor.tag);
            cursor.push_child(Node::with_attributes(&segment.base_name, &segment.attributes))
        }
    }
}
