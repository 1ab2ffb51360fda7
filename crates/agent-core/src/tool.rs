//! Tool System
//!
//! Types shared by the reasoning loop and the concrete toolbox. A toolbox is
//! a fixed, statically declared set of tools; implementations dispatch calls
//! through an explicit `match` over their own closed enum.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;

use crate::error::{AgentError, Result};

/// Tool call request from the LLM
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    #[serde(alias = "tool")]
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub arguments: HashMap<String, serde_json::Value>,

    /// Optional call ID for tracking
    #[serde(default)]
    pub id: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: HashMap::new(),
            id: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }

    /// String argument, if present and a string
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// Result from tool execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Call ID (if provided in request)
    pub id: Option<String>,

    /// Whether execution succeeded
    pub success: bool,

    /// Output (success message or error)
    pub output: String,

    /// Structured data (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: false,
            output: error.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, integer, boolean, object, array, any)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,
}

impl ParameterSchema {
    pub fn new(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required,
            enum_values: None,
        }
    }

    #[must_use]
    pub fn one_of(mut self, values: Vec<serde_json::Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    /// Whether `value` has the JSON type this parameter declares
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;

        let type_ok = match self.param_type.as_str() {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        };

        type_ok
            && self
                .enum_values
                .as_ref()
                .is_none_or(|allowed| allowed.iter().any(|v| v == value) || matches!(value, Value::Null))
    }
}

/// Tool definition schema (for the prompt-level tool catalogue)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

/// A fixed set of tools the reasoning loop may call
#[async_trait]
pub trait Toolbox: Send + Sync {
    /// Schemas of every tool in the box, in a stable order
    fn schemas(&self) -> Vec<ToolSchema>;

    /// Execute a validated tool call
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult>;

    /// Check a call against the declared schema before execution
    fn validate(&self, call: &ToolCall) -> Result<()> {
        let schema = self
            .schemas()
            .into_iter()
            .find(|s| s.name == call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        let missing: Vec<&str> = schema
            .parameters
            .iter()
            .filter(|p| p.required && !call.arguments.contains_key(&p.name))
            .map(|p| p.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(AgentError::ToolValidation(format!(
                "Missing required parameter(s): {}",
                missing.join(", ")
            )));
        }

        for param in &schema.parameters {
            if let Some(value) = call.arguments.get(&param.name) {
                if !param.accepts(value) {
                    return Err(AgentError::ToolValidation(format!(
                        "Parameter '{}' must be of type {}",
                        param.name, param.param_type
                    )));
                }
            }
        }

        Ok(())
    }

    /// Tool names, in schema order
    fn names(&self) -> Vec<String> {
        self.schemas().into_iter().map(|s| s.name).collect()
    }

    /// Generate system prompt section describing available tools
    fn prompt_section(&self) -> String {
        let mut prompt = String::from("## Available Tools\n\n");
        prompt.push_str("You can use the following tools by responding with a JSON block:\n\n");
        prompt.push_str("```tool\n{\"tool\": \"tool_name\", \"arguments\": {\"arg\": \"value\"}}\n```\n\n");
        prompt.push_str("Call one tool per reply. Answer without a tool block once you are done.\n\n");

        for schema in self.schemas() {
            let _ = writeln!(prompt, "### {}", schema.name);
            let _ = writeln!(prompt, "{}", schema.description);

            if !schema.parameters.is_empty() {
                prompt.push_str("**Parameters:**\n");
                for param in &schema.parameters {
                    let required = if param.required { " (required)" } else { "" };
                    let _ = writeln!(
                        prompt,
                        "- `{}` ({}){}: {}",
                        param.name, param.param_type, required, param.description
                    );
                }
            }
            prompt.push('\n');
        }

        prompt
    }
}
