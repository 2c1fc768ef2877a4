//! Tool execution: the trait, the registry, and the graph node that runs
//! requested calls.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::capability::DEFAULT_CAPABILITY_TIMEOUT;
use crate::capability::chat::ToolSpec;
use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError, NodeOutput, NodePartial, ServiceErrorKind};
use crate::state::StateSnapshot;

#[derive(Debug, Error, Diagnostic)]
pub enum ToolError {
    #[error("invalid arguments: {message}")]
    #[diagnostic(code(adloom::tool::invalid_arguments))]
    InvalidArguments { message: String },

    #[error("tool execution failed: {message}")]
    #[diagnostic(code(adloom::tool::failed))]
    Failed { message: String },
}

/// A callable capability the model can request.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn spec(&self) -> ToolSpec;

    /// Whether a failure of this tool can be reported back to the model as
    /// an error payload. Non-recoverable tools abort the step instead.
    fn recoverable(&self) -> bool {
        true
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// Named lookup of registered tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: FxHashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn register(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Specs for a named subset, in the order requested. Unknown names are
    /// skipped.
    #[must_use]
    pub fn specs_for(&self, names: &[String]) -> Vec<ToolSpec> {
        names
            .iter()
            .filter_map(|name| self.tools.get(name).map(|t| t.spec()))
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Graph node that executes the tool calls of the last assistant message.
///
/// One tool-role message is appended per call, in request order. Every call
/// is bounded by a timeout. A failing or timed-out recoverable tool produces
/// an error payload the model can react to on the next loop iteration; a
/// non-recoverable failure aborts the step.
pub struct ToolNode {
    tools: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolNode {
    #[must_use]
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            timeout: DEFAULT_CAPABILITY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Node for ToolNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let calls = snapshot
            .last_message()
            .filter(|m| m.has_tool_calls())
            .map(|m| m.tool_calls.clone())
            .ok_or(NodeError::MissingInput {
                what: "tool calls on the last message",
            })?;

        let mut messages = Vec::with_capacity(calls.len());
        for call in calls {
            let result = match self.tools.get(&call.name) {
                Some(tool) => {
                    let bounded =
                        tokio::time::timeout(self.timeout, tool.call(call.arguments.clone()));
                    match bounded.await {
                        Ok(Ok(value)) => json!({
                            "tool": call.name,
                            "id": call.id,
                            "result": value,
                        }),
                        Ok(Err(e)) if tool.recoverable() => {
                            ctx.emit(format!("tool `{}` failed: {e}", call.name))?;
                            json!({
                                "tool": call.name,
                                "id": call.id,
                                "error": e.to_string(),
                            })
                        }
                        Ok(Err(e)) => {
                            return Err(NodeError::ExternalService {
                                service: call.name.clone(),
                                kind: ServiceErrorKind::Other,
                                message: e.to_string(),
                            });
                        }
                        Err(_) if tool.recoverable() => {
                            ctx.emit(format!("tool `{}` timed out", call.name))?;
                            json!({
                                "tool": call.name,
                                "id": call.id,
                                "error": format!(
                                    "timed out after {}s",
                                    self.timeout.as_secs_f64()
                                ),
                            })
                        }
                        Err(_) => {
                            return Err(NodeError::ExternalService {
                                service: call.name.clone(),
                                kind: ServiceErrorKind::Timeout,
                                message: format!(
                                    "timed out after {}s",
                                    self.timeout.as_secs_f64()
                                ),
                            });
                        }
                    }
                }
                None => json!({
                    "tool": call.name,
                    "id": call.id,
                    "error": format!("unknown tool `{}`", call.name),
                }),
            };
            messages.push(Message::tool(&result.to_string()));
        }

        Ok(NodePartial::new().with_messages(messages).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;
    use crate::node::ThreadConfig;
    use crate::state::VersionedState;

    struct Doubler;

    #[async_trait]
    impl Tool for Doubler {
        fn name(&self) -> &str {
            "double"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "double".into(),
                description: "Doubles a number".into(),
                parameters: json!({"type": "object", "properties": {"n": {"type": "number"}}}),
            }
        }

        async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
            let n = arguments["n"].as_f64().ok_or(ToolError::InvalidArguments {
                message: "n must be a number".into(),
            })?;
            Ok(json!(n * 2.0))
        }
    }

    struct Stalled {
        recoverable: bool,
    }

    #[async_trait]
    impl Tool for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "stalled".into(),
                description: "Never answers".into(),
                parameters: json!({"type": "object"}),
            }
        }

        fn recoverable(&self) -> bool {
            self.recoverable
        }

        async fn call(&self, _arguments: Value) -> Result<Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(json!(null))
        }
    }

    struct Broken {
        recoverable: bool,
    }

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "broken".into(),
                description: "Always fails".into(),
                parameters: json!({"type": "object"}),
            }
        }

        fn recoverable(&self) -> bool {
            self.recoverable
        }

        async fn call(&self, _arguments: Value) -> Result<Value, ToolError> {
            Err(ToolError::Failed {
                message: "backend down".into(),
            })
        }
    }

    fn state_with_calls(calls: Vec<ToolCall>) -> VersionedState {
        let mut state = VersionedState::new_with_user_message("go");
        state
            .messages
            .push(Message::assistant("").with_tool_calls(calls));
        state
    }

    fn ctx() -> NodeContext {
        NodeContext::new("tool", 1, ThreadConfig::new("t1"), None)
    }

    #[tokio::test]
    async fn runs_calls_in_order_one_message_each() {
        let registry = Arc::new(ToolRegistry::new().register(Doubler));
        let node = ToolNode::new(registry);
        let state = state_with_calls(vec![
            ToolCall::new("a", "double", json!({"n": 2})),
            ToolCall::new("b", "double", json!({"n": 5})),
        ]);

        let output = node.run(state.snapshot(), ctx()).await.unwrap();
        let NodeOutput::Continue(partial) = output else {
            panic!("tool node must not suspend");
        };
        let messages = partial.messages.unwrap();
        assert_eq!(messages.len(), 2);
        let first: Value = serde_json::from_str(&messages[0].content).unwrap();
        let second: Value = serde_json::from_str(&messages[1].content).unwrap();
        assert_eq!(first["id"], "a");
        assert_eq!(first["result"], json!(4.0));
        assert_eq!(second["id"], "b");
        assert_eq!(second["result"], json!(10.0));
    }

    #[tokio::test]
    async fn recoverable_failure_becomes_error_payload() {
        let registry = Arc::new(ToolRegistry::new().register(Broken { recoverable: true }));
        let node = ToolNode::new(registry);
        let state = state_with_calls(vec![ToolCall::new("x", "broken", json!({}))]);

        let output = node.run(state.snapshot(), ctx()).await.unwrap();
        let NodeOutput::Continue(partial) = output else {
            panic!("expected continue");
        };
        let payload: Value =
            serde_json::from_str(&partial.messages.unwrap()[0].content).unwrap();
        assert!(payload["error"].as_str().unwrap().contains("backend down"));
    }

    #[tokio::test]
    async fn non_recoverable_failure_aborts_the_step() {
        let registry = Arc::new(ToolRegistry::new().register(Broken { recoverable: false }));
        let node = ToolNode::new(registry);
        let state = state_with_calls(vec![ToolCall::new("x", "broken", json!({}))]);

        let err = node.run(state.snapshot(), ctx()).await.unwrap_err();
        assert!(matches!(err, NodeError::ExternalService { .. }));
    }

    #[tokio::test]
    async fn hung_recoverable_tool_times_out_into_error_payload() {
        let registry = Arc::new(ToolRegistry::new().register(Stalled { recoverable: true }));
        let node = ToolNode::new(registry).with_timeout(Duration::from_millis(20));
        let state = state_with_calls(vec![ToolCall::new("x", "stalled", json!({}))]);

        let output = node.run(state.snapshot(), ctx()).await.unwrap();
        let NodeOutput::Continue(partial) = output else {
            panic!("expected continue");
        };
        let payload: Value =
            serde_json::from_str(&partial.messages.unwrap()[0].content).unwrap();
        assert!(payload["error"].as_str().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn hung_non_recoverable_tool_aborts_with_a_timeout() {
        let registry = Arc::new(ToolRegistry::new().register(Stalled { recoverable: false }));
        let node = ToolNode::new(registry).with_timeout(Duration::from_millis(20));
        let state = state_with_calls(vec![ToolCall::new("x", "stalled", json!({}))]);

        let err = node.run(state.snapshot(), ctx()).await.unwrap_err();
        assert!(matches!(
            err,
            NodeError::ExternalService {
                kind: ServiceErrorKind::Timeout,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_in_payload() {
        let registry = Arc::new(ToolRegistry::new());
        let node = ToolNode::new(registry);
        let state = state_with_calls(vec![ToolCall::new("x", "ghost", json!({}))]);

        let output = node.run(state.snapshot(), ctx()).await.unwrap();
        let NodeOutput::Continue(partial) = output else {
            panic!("expected continue");
        };
        let payload: Value =
            serde_json::from_str(&partial.messages.unwrap()[0].content).unwrap();
        assert!(payload["error"].as_str().unwrap().contains("unknown tool"));
    }
}
