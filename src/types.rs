use std::collections::BTreeMap;

use serde_json::Value;

/// An element of an assembled (or parsed) XML tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    pub tag: String,
    /// Attribute pairs in insertion order; keys are unique.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
    pub text: Option<String>,
}

impl Node {
    pub fn new(tag: &str) -> Self {
        Self { tag: tag.to_string(), ..Default::default() }
    }

    pub fn with_attributes(tag: &str, attributes: &[(String, String)]) -> Self {
        let mut node = Node::new(tag);
        for (key, value) in attributes {
            node.set_attribute(key, value);
        }
        node
    }

    /// Sets an attribute, replacing the value in place if the key already exists.
    pub fn set_attribute(&mut self, key: &str, value: &str) {
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = value.to_string(),
            None => self.attributes.push((key.to_string(), value.to_string())),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Appends a child and returns a handle to it.
    pub fn push_child(&mut self, child: Node) -> &mut Node {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn child(&self, tag: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.tag == tag)
    }

    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Number of nodes below this one (at any depth) whose tag is `tag`.
    pub fn count_descendants(&self, tag: &str) -> usize {
        self.children
            .iter()
            .map(|c| usize::from(c.tag == tag) + c.count_descendants(tag))
            .sum()
    }

    /// The `index`-th descendant tagged `tag`, in document order.
    pub fn nth_descendant_mut(&mut self, tag: &str, index: usize) -> Option<&mut Node> {
        let mut remaining = index;
        find_nth(self, tag, &mut remaining)
    }
}

fn find_nth<'a>(node: &'a mut Node, tag: &str, remaining: &mut usize) -> Option<&'a mut Node> {
    for child in node.children.iter_mut() {
        if child.tag == tag {
            if *remaining == 0 {
                return Some(child);
            }
            *remaining -= 1;
        }
        if let Some(found) = find_nth(child, tag, remaining) {
            return Some(found);
        }
    }
    None
}

/// Owned form of a normalized response value.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseValue {
    Null,
    Scalar(String),
    List(Vec<ResponseValue>),
    Map(BTreeMap<String, ResponseValue>),
}

impl ResponseValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResponseValue::Scalar(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ResponseValue::Null)
    }
}

impl From<&Value> for ResponseValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => ResponseValue::Null,
            Value::Bool(b) => ResponseValue::Scalar(b.to_string()),
            Value::Number(n) => ResponseValue::Scalar(n.to_string()),
            Value::String(s) => ResponseValue::Scalar(s.clone()),
            Value::Array(values) => ResponseValue::List(values.iter().map(ResponseValue::from).collect()),
            Value::Object(map) => ResponseValue::Map(map.iter().map(|(k, v)| (k.clone(), v.into())).collect()),
        }
    }
}
