pub mod builtin;
pub mod handler;
pub mod registry;
pub mod result;

pub use handler::{ToolDef, ToolHandler};
pub use registry::ToolRegistry;
pub use result::{ToolError, ToolErrorPayload, ToolResult};
