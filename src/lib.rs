use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, trace};
use serde_json::{Map, Value};

pub mod config;
pub mod core;
pub mod errors;
pub mod parser;
pub mod registry;
pub mod types;

pub use config::TemplateConfig;
pub use crate::core::{normalize, BodyFormat, Field, FieldKind, NormalizedResponse};
pub use errors::{RequestError, TemplateError, XmlError};
pub use parser::{parse_segment, FlatEntry, PathSegment};
pub use registry::{SessionScope, VariableRecord, VariableResolver, VariableScope};
pub use types::{Node, ResponseValue};

use crate::core::{assemble, xml, JsonUnflattener};

/// SOAP 1.1 envelope with a single `%s` slot for the assembled body.
pub const SOAP_ENVELOPE: &str = concat!(
    r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">"#,
    "<soap:Body>%s</soap:Body></soap:Envelope>"
);

/// Builds a `Basic` authorization header value.
pub fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}

// --- Payload Shapes ---

/// Settings for an XML request body.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlPayload {
    root: String,
    attributes: Vec<(String, String)>,
    namespaces: Vec<(String, String)>,
    qualified_attributes: Vec<(String, String)>,
    envelope: Option<String>,
}

impl XmlPayload {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.to_string(),
            attributes: Vec::new(),
            namespaces: Vec::new(),
            qualified_attributes: Vec::new(),
            envelope: None,
        }
    }

    pub fn attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.push((key.to_string(), value.to_string()));
        self
    }

    /// Declares `xmlns:prefix="uri"` on the root (an empty prefix sets the default namespace).
    pub fn namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.namespaces.push((prefix.to_string(), uri.to_string()));
        self
    }

    /// Adds a `prefix:name` attribute to the root; the prefix must be declared.
    pub fn qualified_attribute(mut self, name: &str, value: &str) -> Self {
        self.qualified_attributes.push((name.to_string(), value.to_string()));
        self
    }

    /// Wraps the assembled body in `template`, which must contain one `%s`.
    pub fn envelope(mut self, template: &str) -> Self {
        self.envelope = Some(template.to_string());
        self
    }

    pub fn soap(self) -> Self {
        self.envelope(SOAP_ENVELOPE)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    fn root_attributes<R: VariableResolver + ?Sized>(&self, resolver: &R) -> Result<Vec<(String, String)>, TemplateError> {
        let mut attributes = Vec::new();
        for (prefix, uri) in &self.namespaces {
            let key = if prefix.is_empty() { "xmlns".to_string() } else { format!("xmlns:{}", prefix) };
            attributes.push((key, uri.clone()));
        }
        for (name, value) in &self.qualified_attributes {
            let declared = name
                .split_once(':')
                .is_some_and(|(prefix, _)| self.namespaces.iter().any(|(p, _)| p == prefix));
            if !declared {
                return Err(TemplateError::UnknownNamespacePrefix { name: name.clone() });
            }
            attributes.push((name.clone(), resolver.resolve(value)?));
        }
        for (key, value) in &self.attributes {
            attributes.push((key.clone(), resolver.resolve(value)?));
        }
        Ok(attributes)
    }

    fn wrap(&self, body: String) -> Result<String, TemplateError> {
        match &self.envelope {
            Some(template) if template.contains("%s") => Ok(template.replacen("%s", &body, 1)),
            Some(_) => Err(TemplateError::MissingBodySlot),
            None => Ok(body),
        }
    }
}

/// The request body shape a template produces.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadKind {
    Xml(XmlPayload),
    Json,
}

/// The structured payload behind a built body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Xml(Node),
    Json(Value),
}

/// A fully resolved request, ready for a transport.
#[derive(Debug, Clone)]
pub struct BuiltRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub payload: Payload,
}

impl BuiltRequest {
    /// The request body read back through the response normalizer.
    pub fn normalized(&self) -> NormalizedResponse {
        normalize(&self.body)
    }
}

// --- Request Template ---

pub struct RequestTemplate {
    endpoint: String,
    config: TemplateConfig,
    payload: PayloadKind,
    /// Flat key -> template value, in insertion order.
    entries: Map<String, Value>,
    headers: Vec<(String, String)>,
}

pub trait TemplateFactory {
    /// Creates an empty template for `endpoint`
    fn new(endpoint: &str, payload: PayloadKind) -> Self;
    /// Replaces the template settings
    fn set_config(&mut self, config: TemplateConfig) -> &mut Self;
    /// Inserts (or replaces) one flat entry
    fn insert_entry(&mut self, key: &str, value: Value) -> &mut Self;
    /// Adds header templates, replacing headers with the same name
    fn append_headers(&mut self, headers: &[(&str, &str)]) -> &mut Self;
    /// Merges the flat object `object_name` of a loaded template document
    fn unpack(&mut self, document: &Value, object_name: Option<&str>) -> Result<&mut Self, TemplateError>;

    /// Inserts every entry of a flat object
    fn insert_entries(&mut self, entries: &Map<String, Value>) -> &mut Self {
        for (key, value) in entries {
            self.insert_entry(key, value.clone());
        }
        self
    }
}

impl TemplateFactory for RequestTemplate {
    fn new(endpoint: &str, payload: PayloadKind) -> Self {
        RequestTemplate {
            endpoint: endpoint.to_string(),
            config: TemplateConfig::default(),
            payload,
            entries: Map::new(),
            headers: Vec::new(),
        }
    }

    fn set_config(&mut self, config: TemplateConfig) -> &mut Self {
        self.config = config;
        self
    }

    fn insert_entry(&mut self, key: &str, value: Value) -> &mut Self {
        self.entries.insert(key.to_string(), value);
        self
    }

    fn append_headers(&mut self, headers: &[(&str, &str)]) -> &mut Self {
        for (name, value) in headers {
            match self.headers.iter_mut().find(|(n, _)| n.as_str() == *name) {
                Some((_, slot)) => *slot = value.to_string(),
                None => self.headers.push((name.to_string(), value.to_string())),
            }
        }
        self
    }

    fn unpack(&mut self, document: &Value, object_name: Option<&str>) -> Result<&mut Self, TemplateError> {
        let label = object_name.unwrap_or("<document>");
        let object = match object_name {
            Some(name) => document
                .get(name)
                .ok_or_else(|| TemplateError::UnknownTemplateObject(name.to_string()))?,
            None => document,
        };
        let entries = object
            .as_object()
            .ok_or_else(|| TemplateError::NotAFlatObject(label.to_string()))?;
        debug!("Unpacking {} entries from '{}'", entries.len(), label);
        Ok(self.insert_entries(entries))
    }
}

impl RequestTemplate {
    pub fn config(&self) -> &TemplateConfig {
        &self.config
    }

    pub fn entries(&self) -> &Map<String, Value> {
        &self.entries
    }

    /// `BaseUrl/Context/endpoint`, each part taken from the resolver.
    pub fn url<R: VariableResolver + ?Sized>(&self, resolver: &R) -> Result<String, TemplateError> {
        let endpoint = resolver.resolve(&self.endpoint)?;
        let parts = [
            resolver.get_variable(&self.config.base_url_key)?,
            resolver.get_variable(&self.config.context_key)?,
            endpoint.as_str(),
        ];
        Ok(parts.join("/"))
    }

    pub fn headers<R: VariableResolver + ?Sized>(&self, resolver: &R) -> Result<Vec<(String, String)>, TemplateError> {
        self.headers
            .iter()
            .map(|(name, value)| Ok((name.clone(), resolver.resolve(value)?)))
            .collect()
    }

    /// Resolves every template value and assembles the body.
    pub fn build<R: VariableResolver + ?Sized>(&self, resolver: &R) -> Result<BuiltRequest, RequestError> {
        let resolved = self
            .entries
            .iter()
            .map(|(key, value)| Ok((key.clone(), resolver.resolve_value(value)?)))
            .collect::<Result<Vec<_>, TemplateError>>()?;
        trace!("Resolved {} entries for '{}'", resolved.len(), self.endpoint);

        let (body, payload) = match &self.payload {
            PayloadKind::Xml(xml_payload) => {
                let entries = resolved
                    .iter()
                    .map(|(key, value)| FlatEntry::parse(key, &scalar_text(value), &self.config.delimiter))
                    .collect::<Result<Vec<_>, _>>()?;
                let root = assemble(&xml_payload.root, &xml_payload.root_attributes(resolver)?, &entries)?;
                let body = xml_payload.wrap(xml::write_document(&root)?)?;
                (body, Payload::Xml(root))
            }
            PayloadKind::Json => {
                let document = JsonUnflattener::new(&self.config.delimiter).unflatten(resolved)?;
                (serde_json::to_string(&document)?, Payload::Json(document))
            }
        };
        debug!("Built request for '{}' ({} bytes)", self.endpoint, body.len());

        Ok(BuiltRequest { url: self.url(resolver)?, headers: self.headers(resolver)?, body, payload })
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
