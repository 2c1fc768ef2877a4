use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single entry in a workflow conversation.
///
/// Messages carry the dialogue between the caller, the chat model, and tool
/// executions. The `tool_calls` of the most recent message drive routing: a
/// non-empty list sends the graph into its tool loop.
///
/// # Examples
///
/// ```
/// use adloom::message::{Message, ToolCall};
///
/// let user = Message::user("Classify this brand.");
/// let call = ToolCall::new("c1", "industry_lookup", serde_json::json!({"q": "groceries"}));
/// let assistant = Message::assistant("").with_tool_calls(vec![call]);
/// assert!(assistant.has_tool_calls());
/// assert!(!user.has_tool_calls());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    /// Role of the sender. Use the constants on [`Message`].
    pub role: String,
    /// Text content. For assistant messages with tool calls this may be empty.
    pub content: String,
    /// Tool invocations requested by the model, in the order they must run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

/// A single tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id echoed back in the tool result message.
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// JSON arguments for the tool.
    pub arguments: Value,
}

impl ToolCall {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

impl Message {
    /// Caller input message role.
    pub const USER: &'static str = "user";
    /// Model response message role.
    pub const ASSISTANT: &'static str = "assistant";
    /// Instruction message role.
    pub const SYSTEM: &'static str = "system";
    /// Tool execution result message role.
    pub const TOOL: &'static str = "tool";

    #[must_use]
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            tool_calls: Vec::new(),
        }
    }

    #[must_use]
    pub fn user(content: &str) -> Self {
        Self::new(Self::USER, content)
    }

    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    #[must_use]
    pub fn system(content: &str) -> Self {
        Self::new(Self::SYSTEM, content)
    }

    /// A tool-role message carrying one tool execution result.
    #[must_use]
    pub fn tool(content: &str) -> Self {
        Self::new(Self::TOOL, content)
    }

    /// Attach tool calls requested by the model.
    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    /// True if the model requested any tool invocations in this message.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
