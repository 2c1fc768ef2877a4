//! The node contract: execution context, state deltas, and suspension.
//!
//! A node receives an immutable [`StateSnapshot`] plus a [`NodeContext`] and
//! returns either a state delta to merge ([`NodeOutput::Continue`]) or an
//! interrupt request ([`NodeOutput::Suspend`]) asking the caller for input
//! before the node can finish. Suspension is an ordinary return value, never
//! control-flow by panic or error.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

use crate::channels::errors::ErrorEvent;
use crate::event_bus::Event;
use crate::message::Message;
use crate::schema::{FieldViolation, render_violations};
use crate::state::StateSnapshot;

/// Per-thread configuration carried through every node of a run.
///
/// Replaces ambient globals: anything a node needs to know about the thread
/// (its id, caller-scoped flags such as `enable_user_validation`) travels
/// here explicitly.
#[derive(Clone, Debug, Default)]
pub struct ThreadConfig {
    pub thread_id: String,
    pub params: FxHashMap<String, Value>,
}

/// Thread parameter gating human-validation interrupts.
pub const PARAM_USER_VALIDATION: &str = "enable_user_validation";

impl ThreadConfig {
    #[must_use]
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            params: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Boolean parameter, false when absent or not a boolean.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.params
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Execution context handed to a node for a single run.
#[derive(Clone, Debug, Default)]
pub struct NodeContext {
    /// Label of the node being executed.
    pub node_id: String,
    /// Step number within the session.
    pub step: u64,
    /// Configuration of the thread this run belongs to.
    pub thread: ThreadConfig,
    /// Payload supplied by the caller when resuming a suspended node.
    pub resume: Option<Value>,
    pub(crate) event_sender: Option<flume::Sender<Event>>,
}

impl NodeContext {
    #[must_use]
    pub fn new(
        node_id: impl Into<String>,
        step: u64,
        thread: ThreadConfig,
        event_sender: Option<flume::Sender<Event>>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            step,
            thread,
            resume: None,
            event_sender,
        }
    }

    /// Emit a diagnostic event scoped to this node execution.
    pub fn emit(&self, message: impl Into<String>) -> Result<(), NodeError> {
        if let Some(sender) = &self.event_sender {
            sender
                .send(Event::node(&self.node_id, self.step, message))
                .map_err(|e| NodeError::EventBus {
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Whether the thread asked for human validation pauses.
    #[must_use]
    pub fn user_validation_enabled(&self) -> bool {
        self.thread.flag(PARAM_USER_VALIDATION)
    }
}

/// State delta produced by a node; unset channels are left untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodePartial {
    pub messages: Option<Vec<Message>>,
    pub fields: Option<FxHashMap<String, Value>>,
    pub errors: Option<Vec<ErrorEvent>>,
}

impl NodePartial {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    #[must_use]
    pub fn with_message(self, message: Message) -> Self {
        self.with_messages(vec![message])
    }

    #[must_use]
    pub fn with_fields(mut self, fields: FxHashMap<String, Value>) -> Self {
        self.fields = Some(fields);
        self
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields
            .get_or_insert_with(FxHashMap::default)
            .insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_errors(mut self, errors: Vec<ErrorEvent>) -> Self {
        self.errors = Some(errors);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: ErrorEvent) -> Self {
        self.errors.get_or_insert_with(Vec::new).push(error);
        self
    }
}

/// Request to pause the thread and hand `payload` to the caller for review.
#[derive(Clone, Debug, PartialEq)]
pub struct InterruptRequest {
    /// Projection shown to the caller, shaped by `resume_schema`.
    pub payload: Value,
    /// Name of the schema a resume payload must satisfy.
    pub resume_schema: String,
}

/// Outcome of a node execution.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeOutput {
    /// Merge this delta and move on.
    Continue(NodePartial),
    /// Pause the thread until the caller resumes with a payload.
    Suspend(InterruptRequest),
}

impl From<NodePartial> for NodeOutput {
    fn from(partial: NodePartial) -> Self {
        NodeOutput::Continue(partial)
    }
}

/// Category of an external-service failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceErrorKind {
    Connect,
    Timeout,
    Status(u16),
    Decode,
    Other,
}

impl std::fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceErrorKind::Connect => f.write_str("connect"),
            ServiceErrorKind::Timeout => f.write_str("timeout"),
            ServiceErrorKind::Status(code) => write!(f, "status {code}"),
            ServiceErrorKind::Decode => f.write_str("decode"),
            ServiceErrorKind::Other => f.write_str("other"),
        }
    }
}

/// Errors surfaced by node implementations.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    #[error("input validation failed at {node}: {}", render_violations(.violations))]
    #[diagnostic(
        code(adloom::node::validation),
        help("Fix the named fields in the payload and submit again.")
    )]
    Validation {
        node: String,
        violations: Vec<FieldViolation>,
    },

    #[error("could not parse model output at {node}: {message}")]
    #[diagnostic(
        code(adloom::node::parse),
        help("The capability response did not satisfy the node's output schema.")
    )]
    Parse { node: String, message: String },

    #[error("external service `{service}` failed ({kind}): {message}")]
    #[diagnostic(
        code(adloom::node::external_service),
        help("Check connectivity and configuration for the named service.")
    )]
    ExternalService {
        service: String,
        kind: ServiceErrorKind,
        message: String,
    },

    #[error("missing required input: {what}")]
    #[diagnostic(code(adloom::node::missing_input))]
    MissingInput { what: &'static str },

    #[error("sub-graph `{label}` failed: {message}")]
    #[diagnostic(code(adloom::node::subgraph))]
    Subgraph { label: String, message: String },

    #[error("JSON (de)serialization error: {0}")]
    #[diagnostic(code(adloom::node::serde))]
    Serde(#[from] serde_json::Error),

    #[error("event bus unavailable: {message}")]
    #[diagnostic(code(adloom::node::event_bus))]
    EventBus { message: String },
}

impl NodeError {
    /// Short kind label used in failure status reports.
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            NodeError::Validation { .. } => "validation",
            NodeError::Parse { .. } => "parse",
            NodeError::ExternalService { .. } => "external_service",
            NodeError::MissingInput { .. } => "missing_input",
            NodeError::Subgraph { .. } => "subgraph",
            NodeError::Serde(_) => "serde",
            NodeError::EventBus { .. } => "event_bus",
        }
    }

    /// Node label the error originated at, when the variant carries one.
    #[must_use]
    pub fn node(&self) -> Option<&str> {
        match self {
            NodeError::Validation { node, .. } | NodeError::Parse { node, .. } => Some(node),
            NodeError::Subgraph { label, .. } => Some(label),
            _ => None,
        }
    }
}

/// A unit of work in a workflow graph.
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ViolationKind;
    use serde_json::json;

    #[test]
    fn thread_flag_defaults_to_false() {
        let thread = ThreadConfig::new("t1");
        assert!(!thread.flag(PARAM_USER_VALIDATION));
        let thread = thread.with_param(PARAM_USER_VALIDATION, json!(true));
        assert!(thread.flag(PARAM_USER_VALIDATION));
    }

    #[test]
    fn partial_builder_accumulates() {
        let partial = NodePartial::new()
            .with_message(Message::assistant("ok"))
            .with_field("industry", json!("Retail"))
            .with_field("campaign_name", json!("Spring Push"));
        assert_eq!(partial.messages.as_ref().map(Vec::len), Some(1));
        assert_eq!(partial.fields.as_ref().map(|f| f.len()), Some(2));
        assert!(partial.errors.is_none());
    }

    #[test]
    fn validation_error_names_fields() {
        let err = NodeError::Validation {
            node: "classifier.input".into(),
            violations: vec![FieldViolation {
                field: "brand_name".into(),
                problem: ViolationKind::Missing,
            }],
        };
        let rendered = err.to_string();
        assert!(rendered.contains("classifier.input"));
        assert!(rendered.contains("brand_name"));
        assert_eq!(err.kind_label(), "validation");
    }
}
