use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything that can go wrong resolving or running a tool.
/// Never crosses the registry boundary; see [`ToolResult::failure`].
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("missing required argument: {0}")]
    MissingArgument(String),
    #[error("{summary}: {details}")]
    Execution { summary: String, details: String },
}

impl ToolError {
    pub fn execution(summary: impl Into<String>, details: impl ToString) -> Self {
        Self::Execution {
            summary: summary.into(),
            details: details.to_string(),
        }
    }
}

/// `{error, details}` as fed back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolErrorPayload {
    pub error: String,
    pub details: String,
}

/// Outcome of one tool execution. Always a value, never a panic or `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResult {
    Error(ToolErrorPayload),
    Success(Value),
}

impl ToolResult {
    pub fn failure(tool_name: &str, err: ToolError) -> Self {
        let payload = match err {
            ToolError::Execution { summary, details } => ToolErrorPayload {
                error: summary,
                details,
            },
            other => ToolErrorPayload {
                error: format!("Failed to execute tool {tool_name}"),
                details: other.to_string(),
            },
        };
        Self::Error(payload)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn error(&self) -> Option<&ToolErrorPayload> {
        match self {
            Self::Error(payload) => Some(payload),
            Self::Success(_) => None,
        }
    }

    /// JSON text placed in the tool-role message.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
