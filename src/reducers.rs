//! Channel reducers: how node deltas fold into state.
//!
//! Each channel has exactly one merge discipline. Messages and errors append
//! in order; fields merge last-write-wins with keys applied in sorted order
//! so merges are deterministic regardless of map iteration order.

use crate::node::NodePartial;
use crate::state::VersionedState;

/// Folds one channel of a [`NodePartial`] into state.
///
/// Returns true when the channel content actually changed; the caller bumps
/// the channel version only then.
pub trait Reducer: Send + Sync {
    fn apply(&self, state: &mut VersionedState, partial: &NodePartial) -> bool;
}

/// Appends delta messages to the message log.
pub struct AddMessages;

impl Reducer for AddMessages {
    fn apply(&self, state: &mut VersionedState, partial: &NodePartial) -> bool {
        match &partial.messages {
            Some(messages) if !messages.is_empty() => {
                for message in messages {
                    state.messages.push(message.clone());
                }
                true
            }
            _ => false,
        }
    }
}

/// Last-write-wins merge of named fields, applied in sorted key order.
pub struct MergeFields;

impl Reducer for MergeFields {
    fn apply(&self, state: &mut VersionedState, partial: &NodePartial) -> bool {
        let Some(fields) = &partial.fields else {
            return false;
        };
        let mut keys: Vec<&String> = fields.keys().collect();
        keys.sort();
        let mut changed = false;
        for key in keys {
            if state.fields.insert(key.clone(), fields[key].clone()) {
                changed = true;
            }
        }
        changed
    }
}

/// Appends recorded error events.
pub struct AddErrors;

impl Reducer for AddErrors {
    fn apply(&self, state: &mut VersionedState, partial: &NodePartial) -> bool {
        match &partial.errors {
            Some(errors) if !errors.is_empty() => {
                for event in errors {
                    state.errors.push(event.clone());
                }
                true
            }
            _ => false,
        }
    }
}

/// Channel names reported in step summaries and checkpoints.
pub const CHANNEL_MESSAGES: &str = "messages";
pub const CHANNEL_FIELDS: &str = "fields";
pub const CHANNEL_ERRORS: &str = "errors";

/// Fixed set of reducers, one per channel.
pub struct ReducerRegistry {
    entries: Vec<(&'static str, Box<dyn Reducer>)>,
}

impl Default for ReducerRegistry {
    fn default() -> Self {
        Self {
            entries: vec![
                (CHANNEL_MESSAGES, Box::new(AddMessages)),
                (CHANNEL_FIELDS, Box::new(MergeFields)),
                (CHANNEL_ERRORS, Box::new(AddErrors)),
            ],
        }
    }
}

impl ReducerRegistry {
    /// Apply every reducer, bump versions of changed channels, and report
    /// which channels changed.
    pub fn apply(&self, state: &mut VersionedState, partial: &NodePartial) -> Vec<&'static str> {
        let mut updated = Vec::new();
        for (channel, reducer) in &self.entries {
            if reducer.apply(state, partial) {
                match *channel {
                    CHANNEL_MESSAGES => state.messages.bump_version(),
                    CHANNEL_FIELDS => state.fields.bump_version(),
                    CHANNEL_ERRORS => state.errors.bump_version(),
                    _ => {}
                }
                updated.push(*channel);
            }
        }
        updated
    }
}
