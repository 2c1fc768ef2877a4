//! External capability seams: the chat model and the tool surface.

use std::time::Duration;

pub mod chat;
pub mod tools;

pub use chat::{ChatError, ChatModel, ChatRequest, ChatResponse, ToolSpec};
pub use tools::{Tool, ToolError, ToolNode, ToolRegistry};

/// Bound applied to every capability await (model completion, tool call)
/// unless the caller configures its own.
pub const DEFAULT_CAPABILITY_TIMEOUT: Duration = Duration::from_secs(60);
