//! The chat-model capability boundary.
//!
//! Process nodes speak to whatever model backs the pipeline through this
//! trait; tests script it, production wires a provider adapter. The model may
//! answer with plain content or with tool-call requests.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::message::Message;

/// Description of a callable tool, surfaced to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool's arguments.
    pub parameters: Value,
}

/// A single completion request.
#[derive(Clone, Debug, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    /// Tools the model may call for this request; empty disables tool use.
    pub tools: Vec<ToolSpec>,
}

impl ChatRequest {
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }
}

/// The model's answer: exactly one assistant message.
#[derive(Clone, Debug)]
pub struct ChatResponse {
    pub message: Message,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ChatError {
    #[error("chat provider `{provider}` failed: {message}")]
    #[diagnostic(code(adloom::chat::provider))]
    Provider { provider: String, message: String },

    #[error("chat completion timed out after {seconds}s")]
    #[diagnostic(code(adloom::chat::timeout))]
    Timeout { seconds: u64 },
}

/// Model capability used by process nodes. Implementations must be safe to
/// call more than once with the same request; the runner may re-execute a
/// step after a crash.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ChatError>;
}
