//! Workflow state: versioned channels plus the immutable snapshot nodes see.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::channels::errors::ErrorEvent;
use crate::channels::{ErrorsChannel, FieldsChannel, MessagesChannel};
use crate::message::Message;

/// Mutable workflow state owned by the runner.
///
/// Nodes never touch this directly; they receive a [`StateSnapshot`] and
/// return a delta which the runner merges through the reducer registry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VersionedState {
    pub messages: MessagesChannel,
    pub fields: FieldsChannel,
    pub errors: ErrorsChannel,
}

impl VersionedState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: MessagesChannel::new(Vec::new(), 1),
            fields: FieldsChannel::new(FxHashMap::default(), 1),
            errors: ErrorsChannel::new(Vec::new(), 1),
        }
    }

    /// Fresh state seeded with a single user message.
    #[must_use]
    pub fn new_with_user_message(content: &str) -> Self {
        let mut state = Self::new();
        state.messages.push(Message::user(content));
        state
    }

    /// Fresh state seeded with named fields, the shape a submission produces.
    #[must_use]
    pub fn new_with_fields(fields: FxHashMap<String, Value>) -> Self {
        let mut state = Self::new();
        for (k, v) in fields {
            state.fields.insert(k, v);
        }
        state
    }

    /// Builder-style field insertion for tests and seeding.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Immutable view handed to nodes and routers.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            messages: self.messages.snapshot(),
            messages_version: self.messages.version(),
            fields: self.fields.snapshot(),
            fields_version: self.fields.version(),
            errors: self.errors.snapshot(),
            errors_version: self.errors.version(),
        }
    }
}

/// Point-in-time, immutable view of a [`VersionedState`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateSnapshot {
    pub messages: Vec<Message>,
    pub messages_version: u32,
    pub fields: FxHashMap<String, Value>,
    pub fields_version: u32,
    pub errors: Vec<ErrorEvent>,
    pub errors_version: u32,
}

impl StateSnapshot {
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Field value as a string slice, when present and a JSON string.
    #[must_use]
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Field value as an f64, when present and numeric.
    #[must_use]
    pub fn field_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    /// Field value deserialized into a list of strings.
    #[must_use]
    pub fn field_strings(&self, key: &str) -> Option<Vec<String>> {
        self.fields
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}
