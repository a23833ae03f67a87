//! Tool metadata types shared between the supervisor and its consumers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique tool identifier: `server.tool`.
///
/// Dots may occur inside either component; the pair is the authoritative key
/// and the dotted form exists for display and record ids only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedToolName {
    pub server: String,
    pub tool: String,
}

impl QualifiedToolName {
    pub fn new(server: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            tool: tool.into(),
        }
    }
}

impl fmt::Display for QualifiedToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.server, self.tool)
    }
}

/// One parameter of an upstream tool, derived from its JSON input schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub description: String,
    pub required: bool,
}

/// A tool as discovered from an upstream `tools/list` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameters: Vec<Parameter>,
    /// The raw JSON input schema as reported upstream.
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Build a descriptor from an rmcp tool definition.
    pub fn from_tool(tool: &rmcp::model::Tool) -> Self {
        let schema = Value::Object((*tool.input_schema).clone());
        let parameters = parameters_from_schema(&schema);
        Self {
            name: tool.name.to_string(),
            description: tool
                .description
                .as_ref()
                .map(|d| d.to_string())
                .unwrap_or_default(),
            parameters,
            input_schema: schema,
        }
    }

    /// Fallback descriptor for a tool declared in config before discovery
    /// has succeeded.
    pub fn from_declared(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            parameters: Vec::new(),
            input_schema: Value::Object(serde_json::Map::new()),
        }
    }
}

/// Derive the parameter list from a JSON schema's `properties` and `required`
/// sections. When a property's `type` is itself an array, the first element
/// is used.
pub fn parameters_from_schema(schema: &Value) -> Vec<Parameter> {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    properties
        .iter()
        .map(|(name, prop)| {
            let type_name = match prop.get("type") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Array(types)) => types
                    .first()
                    .and_then(Value::as_str)
                    .unwrap_or("string")
                    .to_string(),
                _ => "string".to_string(),
            };
            Parameter {
                name: name.clone(),
                type_name,
                description: prop
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                required: required.contains(&name.as_str()),
            }
        })
        .collect()
}
