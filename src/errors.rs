use thiserror::Error;

/// Input-validation failures raised while turning a flat template into a payload.
///
/// Every variant carries the raw key, segment or variable name that caused it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("Malformed attribute clause in segment '{segment}'")]
    MalformedAttributeClause { segment: String },
    #[error("Empty path segment in key '{key}'")]
    EmptySegment { key: String },
    #[error("Index {index} of '{segment}' in key '{key}' does not exist ({available} found)")]
    AmbiguousIndexTarget {
        key: String,
        segment: String,
        index: usize,
        available: usize,
    },
    #[error("Variable '{name}' is not defined in any scope")]
    UnresolvedVariable { name: String },
    #[error("Last segment of key '{key}' must not carry an index")]
    TrailingIndexNotAllowed { key: String },
    #[error("Segment '{segment}' in key '{key}' conflicts with an existing value")]
    PathConflict { key: String, segment: String },
    #[error("Namespace prefix of '{name}' is not declared")]
    UnknownNamespacePrefix { name: String },
    #[error("Envelope template has no '%s' body slot")]
    MissingBodySlot,
    #[error("Template object '{0}' not found")]
    UnknownTemplateObject(String),
    #[error("Template '{0}' is not a flat key/value object")]
    NotAFlatObject(String),
}

/// Failures reading or writing XML documents.
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("XML syntax: {0}")]
    Syntax(#[from] quick_xml::Error),
    #[error("XML attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),
    #[error("XML structure: {0}")]
    Structure(String),
    #[error("XML write: {0}")]
    Write(String),
}

/// Top-level error of the request template layer.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
    #[error("XML error: {0}")]
    Xml(#[from] XmlError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
