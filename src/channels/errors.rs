//! Structured error events recorded in workflow state.
//!
//! Errors that do not abort a run (degraded enrichment calls, recoverable
//! tool failures) are appended to the errors channel so they survive in
//! checkpoints and can be inspected after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Where in the runtime an error event originated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorScope {
    /// A specific node execution.
    Node { node: String, step: u64 },
    /// The step loop for a session.
    Runner { session: String },
    /// The submission/status facade.
    Service,
    /// Anything else.
    App,
}

/// Payload of an error event, kept serializable and backend agnostic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl ErrorDetail {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: Value::Null,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// A single recorded error occurrence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub when: DateTime<Utc>,
    pub scope: ErrorScope,
    pub error: ErrorDetail,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub context: Value,
}

/// Tag applied when a best-effort external call failed and the run continued
/// with reduced output.
pub const TAG_DEGRADED: &str = "degraded";

impl ErrorEvent {
    #[must_use]
    pub fn new(scope: ErrorScope, error: ErrorDetail) -> Self {
        Self {
            when: Utc::now(),
            scope,
            error,
            tags: Vec::new(),
            context: Value::Null,
        }
    }

    /// Event for a failure inside a node execution.
    #[must_use]
    pub fn node(node: impl Into<String>, step: u64, message: impl Into<String>) -> Self {
        Self::new(
            ErrorScope::Node {
                node: node.into(),
                step,
            },
            ErrorDetail::new(message),
        )
    }

    /// Event for a best-effort external service that failed; the run keeps
    /// going without its enrichment.
    #[must_use]
    pub fn degraded(
        node: impl Into<String>,
        step: u64,
        service: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::node(node, step, message)
            .with_tag(TAG_DEGRADED)
            .with_context(serde_json::json!({ "service": service }))
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// True if this event carries the given tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            ErrorScope::Node { node, step } => {
                write!(f, "[{node}@{step}] {}", self.error.message)
            }
            ErrorScope::Runner { session } => {
                write!(f, "[runner:{session}] {}", self.error.message)
            }
            ErrorScope::Service => write!(f, "[service] {}", self.error.message),
            ErrorScope::App => write!(f, "[app] {}", self.error.message),
        }
    }
}
