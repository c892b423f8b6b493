use async_trait::async_trait;
use serde_json::{Map, Value};

use super::result::ToolError;
use crate::types::ToolDeclaration;

/// A tool's execution handler. Arguments have already been checked
/// against the declaration's required fields.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: &Map<String, Value>) -> Result<Value, ToolError>;
}

/// A tool definition: declaration for the model + handler for execution.
pub struct ToolDef {
    pub declaration: ToolDeclaration,
    pub(crate) handler: Box<dyn ToolHandler>,
}

/// Fetch a string argument that validation guarantees is present.
pub(crate) fn text_argument<'a>(
    arguments: &'a Map<String, Value>,
    field: &str,
) -> Result<&'a str, ToolError> {
    arguments
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::MissingArgument(field.to_string()))
}
