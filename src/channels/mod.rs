//! Versioned state channels.
//!
//! Workflow state is split into three channels with independent version
//! counters: the message log, the named campaign fields, and recorded error
//! events. A channel's version only moves when its content changes, which
//! lets checkpoints and observers tell cheap no-op steps apart from real
//! updates.

pub mod errors;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::message::Message;
use errors::ErrorEvent;

/// Append-only log of conversation messages.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessagesChannel {
    items: Vec<Message>,
    version: u32,
}

impl MessagesChannel {
    #[must_use]
    pub fn new(items: Vec<Message>, version: u32) -> Self {
        Self { items, version }
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    pub fn bump_version(&mut self) {
        self.version = self.version.saturating_add(1);
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.items.clone()
    }

    #[must_use]
    pub fn items(&self) -> &[Message] {
        &self.items
    }

    pub fn push(&mut self, message: Message) {
        self.items.push(message);
    }

    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.items.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Last-write-wins map of named campaign fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldsChannel {
    map: FxHashMap<String, Value>,
    version: u32,
}

impl FieldsChannel {
    #[must_use]
    pub fn new(map: FxHashMap<String, Value>, version: u32) -> Self {
        Self { map, version }
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    pub fn bump_version(&mut self) {
        self.version = self.version.saturating_add(1);
    }

    #[must_use]
    pub fn snapshot(&self) -> FxHashMap<String, Value> {
        self.map.clone()
    }

    #[must_use]
    pub fn map(&self) -> &FxHashMap<String, Value> {
        &self.map
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    /// Insert a field value, returning true when the stored value changed.
    pub fn insert(&mut self, key: String, value: Value) -> bool {
        match self.map.get(&key) {
            Some(existing) if *existing == value => false,
            _ => {
                self.map.insert(key, value);
                true
            }
        }
    }
}

/// Append-only log of recorded error events.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ErrorsChannel {
    items: Vec<ErrorEvent>,
    version: u32,
}

impl ErrorsChannel {
    #[must_use]
    pub fn new(items: Vec<ErrorEvent>, version: u32) -> Self {
        Self { items, version }
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    pub fn bump_version(&mut self) {
        self.version = self.version.saturating_add(1);
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<ErrorEvent> {
        self.items.clone()
    }

    #[must_use]
    pub fn items(&self) -> &[ErrorEvent] {
        &self.items
    }

    pub fn push(&mut self, event: ErrorEvent) {
        self.items.push(event);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
