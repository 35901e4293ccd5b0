use std::collections::HashMap;

use lazy_static::lazy_static;
use log::{debug, trace, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::TemplateError;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{\{(.*?)\}\}").unwrap();
}

// --- Variable Tables ---

/// A single `{key, value, enabled}` row of a global or environment table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRecord {
    pub key: String,
    pub value: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl VariableRecord {
    pub fn new(key: &str, value: &str) -> Self {
        Self { key: key.to_string(), value: value.to_string(), enabled: true }
    }

    pub fn disabled(key: &str, value: &str) -> Self {
        Self { enabled: false, ..Self::new(key, value) }
    }
}

/// Accepts a bare array of records or an exported environment (`{"values": [...]}`).
#[derive(Deserialize)]
#[serde(untagged)]
enum VariableTable {
    Records(Vec<VariableRecord>),
    Exported { values: Vec<VariableRecord> },
}

/// Loads a variable table from its JSON text.
pub fn load_table(json: &str) -> Result<Vec<VariableRecord>, serde_json::Error> {
    let table: VariableTable = serde_json::from_str(json)?;
    Ok(match table {
        VariableTable::Records(records) => records,
        VariableTable::Exported { values } => values,
    })
}

fn first_enabled<'a>(records: &'a [VariableRecord], name: &str) -> Option<&'a str> {
    records.iter().find(|r| r.enabled && r.key == name).map(|r| r.value.as_str())
}

/// Name of the first placeholder (closed or not) in `text`.
fn leftover_placeholder(text: &str) -> Option<String> {
    if let Some(name) = PLACEHOLDER.captures(text).and_then(|c| c.get(1)) {
        return Some(name.as_str().to_string());
    }
    text.find("{{").map(|start| text[start + 2..].to_string())
}

// --- Resolver Trait ---

/// Looks up variables and expands `{{name}}` placeholders.
pub trait VariableResolver {
    fn get_variable(&self, name: &str) -> Result<&str, TemplateError>;

    /// Replaces every `{{name}}` in `template`. Each placeholder is resolved on
    /// its own and substituted values are not expanded again.
    ///
    /// The result never contains `{{`: a substituted value holding a
    /// placeholder, or an unclosed `{{` anywhere, fails with `UnresolvedVariable`.
    fn resolve(&self, template: &str) -> Result<String, TemplateError> {
        let mut resolved = String::with_capacity(template.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(template) {
            let (Some(span), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let literal = &template[last..span.start()];
            let value = self.get_variable(name.as_str())?;
            if let Some(inner) = leftover_placeholder(literal).or_else(|| leftover_placeholder(value)) {
                warn!("Placeholder '{}' left unresolved around '{}'", inner, name.as_str());
                return Err(TemplateError::UnresolvedVariable { name: inner });
            }
            resolved.push_str(literal);
            resolved.push_str(value);
            last = span.end();
        }
        if let Some(inner) = leftover_placeholder(&template[last..]) {
            warn!("Unclosed placeholder '{}'", inner);
            return Err(TemplateError::UnresolvedVariable { name: inner });
        }
        resolved.push_str(&template[last..]);
        Ok(resolved)
    }

    /// Resolves every string inside a JSON value; other scalars pass through.
    fn resolve_value(&self, value: &Value) -> Result<Value, TemplateError> {
        Ok(match value {
            Value::String(s) => Value::String(self.resolve(s)?),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.resolve_value(v)).collect::<Result<_, _>>()?),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.resolve_value(v)?)))
                    .collect::<Result<_, TemplateError>>()?,
            ),
            other => other.clone(),
        })
    }

    /// Resolves the values of flat `(key, template)` pairs, keeping their order.
    fn resolve_entries(&self, entries: &[(String, String)]) -> Result<Vec<(String, String)>, TemplateError> {
        entries
            .iter()
            .map(|(key, template)| Ok((key.clone(), self.resolve(template)?)))
            .collect()
    }
}

// --- Scopes ---

/// The three resolution tiers: global, then environment, then session.
#[derive(Debug, Clone, Default)]
pub struct VariableScope {
    global: Vec<VariableRecord>,
    environment: Vec<VariableRecord>,
    session: HashMap<String, String>,
}

impl VariableScope {
    pub fn new(global: Vec<VariableRecord>, environment: Vec<VariableRecord>) -> Self {
        Self { global, environment, session: HashMap::new() }
    }

    /// Builds a scope from the JSON text of the global and environment tables.
    pub fn from_tables(global: &str, environment: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(load_table(global)?, load_table(environment)?))
    }

    /// Stores a session value (e.g. something captured from an earlier response).
    pub fn insert_session(&mut self, key: &str, value: &str) -> &mut Self {
        debug!("Setting session variable '{}'", key);
        self.session.insert(key.to_string(), value.to_string());
        self
    }

    /// Borrows the scope with a caller-supplied session tier in place of the stored one.
    pub fn with_session<'a>(&'a self, session: &'a HashMap<String, String>) -> SessionScope<'a> {
        SessionScope { inner: self, session }
    }

    fn lookup<'a>(&'a self, name: &str, session: &'a HashMap<String, String>) -> Result<&'a str, TemplateError> {
        if let Some(value) = first_enabled(&self.global, name) {
            trace!("Variable '{}' resolved from global tier", name);
            return Ok(value);
        }
        if let Some(value) = first_enabled(&self.environment, name) {
            trace!("Variable '{}' resolved from environment tier", name);
            return Ok(value);
        }
        if let Some(value) = session.get(name) {
            trace!("Variable '{}' resolved from session tier", name);
            return Ok(value.as_str());
        }
        warn!("Variable '{}' not found in any tier", name);
        Err(TemplateError::UnresolvedVariable { name: name.to_string() })
    }
}

impl VariableResolver for VariableScope {
    fn get_variable(&self, name: &str) -> Result<&str, TemplateError> {
        self.lookup(name, &self.session)
    }
}

/// A [`VariableScope`] paired with a per-call session map.
#[derive(Clone, Copy, Debug)]
pub struct SessionScope<'a> {
    inner: &'a VariableScope,
    session: &'a HashMap<String, String>,
}

impl<'a> VariableResolver for SessionScope<'a> {
    fn get_variable(&self, name: &str) -> Result<&str, TemplateError> {
        self.inner.lookup(name, self.session)
    }
}

/// Resolves `template` against `scope`.
pub fn resolve<R: VariableResolver + ?Sized>(template: &str, scope: &R) -> Result<String, TemplateError> {
    scope.resolve(template)
}
