use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::builtin::{self, TopStories};
use super::handler::{ToolDef, ToolHandler};
use super::result::{ToolError, ToolResult};
use crate::types::ToolDeclaration;

/// Catalog of available tools. Built once, then shared read-only.
pub struct ToolRegistry {
    tools: Vec<ToolDef>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// The four built-in tools. Top stories are fetched from `news_api_url`.
    pub fn builtin(news_api_url: impl Into<String>) -> Self {
        Self::new()
            .add(builtin::sentiment::declaration(), builtin::Sentiment)
            .add(builtin::word_count::declaration(), builtin::WordCount)
            .add(builtin::datetime::declaration(), builtin::CurrentDateTime)
            .add(
                builtin::top_stories::declaration(),
                TopStories::new(news_api_url),
            )
    }

    /// Register a tool. A later registration under an existing name replaces it
    /// in place, keeping declaration order stable.
    pub fn add(
        mut self,
        declaration: ToolDeclaration,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        let def = ToolDef {
            declaration,
            handler: Box::new(handler),
        };
        match self
            .tools
            .iter()
            .position(|t| t.declaration.name == def.declaration.name)
        {
            Some(index) => self.tools[index] = def,
            None => self.tools.push(def),
        }
        self
    }

    /// Declarations in registration order.
    pub fn describe(&self) -> Vec<ToolDeclaration> {
        self.tools.iter().map(|t| t.declaration.clone()).collect()
    }

    pub fn declaration(&self, name: &str) -> Option<&ToolDeclaration> {
        self.find(name).map(|t| &t.declaration)
    }

    /// Run a tool by name. Every failure comes back as an error result.
    pub async fn execute(&self, name: &str, arguments: &Map<String, Value>) -> ToolResult {
        match self.try_execute(name, arguments).await {
            Ok(value) => {
                debug!(tool = name, "tool succeeded");
                ToolResult::Success(value)
            }
            Err(e) => {
                warn!(tool = name, error = %e, "tool failed");
                ToolResult::failure(name, e)
            }
        }
    }

    async fn try_execute(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let tool = self
            .find(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        if let Some(field) = tool
            .declaration
            .required_fields()
            .into_iter()
            .find(|field| is_missing(arguments.get(*field)))
        {
            return Err(ToolError::MissingArgument(field.to_string()));
        }

        tool.handler.call(arguments).await
    }

    fn find(&self, name: &str) -> Option<&ToolDef> {
        self.tools.iter().find(|t| t.declaration.name == name)
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools
            .iter()
            .map(|t| t.declaration.name.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Absent, null and empty-string values all count as missing.
fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}
