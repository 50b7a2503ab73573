//! Shared tool types: invocations, outcomes, specifications and errors.

use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while executing a tool.
///
/// Handlers report ordinary input problems as error [`ToolOutcome`]s; a `ToolError`
/// means the execution itself failed and is turned into the uniform
/// "unexpected error" outcome (synchronous path) or a failure notification
/// (background path).
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A remote service the tool depends on failed
    #[error("{0}")]
    Backend(String),

    /// The client reported a problem with requested data
    #[error("{0}")]
    ExternalData(String),

    #[error("{0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

// =============================================================================
// Invocation
// =============================================================================

/// One tool-use request captured from the model stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Tool name as sent by the model (case preserved)
    pub tool_name: String,
    /// Identifier assigned by the model backend
    pub tool_use_id: Option<String>,
    /// Raw input payload, a JSON document encoded as a string
    pub content: String,
}

impl ToolInvocation {
    pub fn new(
        tool_name: impl Into<String>,
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_use_id: Some(tool_use_id.into()),
            content: content.into(),
        }
    }

    /// Capture an invocation from a `toolUse` event body.
    ///
    /// Returns `None` when the body carries no tool name.
    pub fn from_tool_use(tool_use: &Value) -> Option<Self> {
        let tool_name = tool_use.get("toolName")?.as_str()?.to_string();
        let tool_use_id = tool_use
            .get("toolUseId")
            .and_then(Value::as_str)
            .map(str::to_string);
        let content = match tool_use.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "{}".to_string(),
            Some(other) => other.to_string(),
        };

        Some(Self {
            tool_name,
            tool_use_id,
            content,
        })
    }

    /// Lower-cased tool name, the key used for registry lookup and result caching.
    pub fn normalized_name(&self) -> String {
        self.tool_name.to_lowercase()
    }

    /// Decode the input payload as a JSON object.
    pub fn parse_input(&self) -> Result<Map<String, Value>, serde_json::Error> {
        serde_json::from_str(&self.content)
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Normalized tool status reported back to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Success => "success",
            ToolStatus::Error => "error",
        }
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a tool returns to the model: a text result and a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutcome {
    pub result: String,
    pub status: ToolStatus,
}

impl ToolOutcome {
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            status: ToolStatus::Success,
        }
    }

    pub fn error(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            status: ToolStatus::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }

    /// The outcome as the JSON text carried in the upstream `toolResult` content.
    pub fn to_content_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.result.clone())
    }
}

// =============================================================================
// Specification
// =============================================================================

/// Static descriptor a tool exposes for upstream tool configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

impl ToolSpec {
    /// Render as `{"toolSpec": {...}}` with the schema encoded as a JSON string.
    pub fn to_json(&self) -> Value {
        json!({
            "toolSpec": {
                "name": self.name,
                "description": self.description,
                "inputSchema": {
                    "json": self.input_schema.to_string(),
                }
            }
        })
    }
}
