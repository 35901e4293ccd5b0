use serde::{Deserialize, Serialize};

/// Settings shared by request templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Separator between segments of a flat key.
    pub delimiter: String,
    /// Variable holding the scheme and host of the service.
    pub base_url_key: String,
    /// Variable holding the context path placed before each endpoint.
    pub context_key: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            delimiter: "::".to_string(),
            base_url_key: "BaseUrl".to_string(),
            context_key: "Context".to_string(),
        }
    }
}

impl TemplateConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_delimiter(mut self, delimiter: &str) -> Self {
        self.delimiter = delimiter.to_string();
        self
    }
}
