/*!
Serde-friendly shapes for persisted runtime state and checkpoints.

These structs are decoupled from the in-memory types so storage formats can
evolve independently; conversion lives here as From / TryFrom impls and the
checkpointer backends stay declarative. No I/O happens in this module.
*/

use chrono::Utc;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channels::errors::ErrorEvent;
use crate::channels::{ErrorsChannel, FieldsChannel, MessagesChannel};
use crate::message::Message;
use crate::runtimes::checkpointer::{Checkpoint, PendingInterrupt};
use crate::state::VersionedState;
use crate::types::NodeKind;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("JSON serialization/deserialization failed: {source}")]
    #[diagnostic(
        code(adloom::persistence::serde),
        help("Ensure the stored JSON matches the Persisted* shapes.")
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Vector channel (messages, errors) with its version counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedVecChannel<T> {
    pub version: u32,
    // Path form; a bare `default` would put a `T: Default` bound on the
    // derived impl.
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> Default for PersistedVecChannel<T> {
    fn default() -> Self {
        Self {
            version: 1,
            items: Vec::new(),
        }
    }
}

/// Map channel (fields) with its version counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedMapChannel {
    pub version: u32,
    #[serde(default)]
    pub map: FxHashMap<String, Value>,
}

impl Default for PersistedMapChannel {
    fn default() -> Self {
        Self {
            version: 1,
            map: FxHashMap::default(),
        }
    }
}

/// Complete persisted shape of the in-memory state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PersistedState {
    pub messages: PersistedVecChannel<Message>,
    pub fields: PersistedMapChannel,
    #[serde(default)]
    pub errors: PersistedVecChannel<ErrorEvent>,
}

/// Persisted pending interrupt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedInterrupt {
    /// Suspended node encoded via `NodeKind::encode`.
    pub node: String,
    pub payload: Value,
    pub resume_schema: String,
}

/// Full persisted checkpoint. Step-history tables store one of these per row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedCheckpoint {
    pub session_id: String,
    pub step: u64,
    pub state: PersistedState,
    /// Next node encoded via `NodeKind::encode`.
    pub pending: String,
    #[serde(default)]
    pub interrupt: Option<PersistedInterrupt>,
    /// RFC3339 creation time (keeps chrono out of the serialized shape).
    pub created_at: String,
}

impl PersistedCheckpoint {
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|source| PersistenceError::Serde { source })
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|source| PersistenceError::Serde { source })
    }
}

/* ---------- VersionedState <-> PersistedState ---------- */

impl From<&VersionedState> for PersistedState {
    fn from(s: &VersionedState) -> Self {
        PersistedState {
            messages: PersistedVecChannel {
                version: s.messages.version(),
                items: s.messages.snapshot(),
            },
            fields: PersistedMapChannel {
                version: s.fields.version(),
                map: s.fields.snapshot(),
            },
            errors: PersistedVecChannel {
                version: s.errors.version(),
                items: s.errors.snapshot(),
            },
        }
    }
}

impl From<PersistedState> for VersionedState {
    fn from(p: PersistedState) -> Self {
        VersionedState {
            messages: MessagesChannel::new(p.messages.items, p.messages.version),
            fields: FieldsChannel::new(p.fields.map, p.fields.version),
            errors: ErrorsChannel::new(p.errors.items, p.errors.version),
        }
    }
}

/* ---------- PendingInterrupt <-> PersistedInterrupt ---------- */

impl From<&PendingInterrupt> for PersistedInterrupt {
    fn from(i: &PendingInterrupt) -> Self {
        PersistedInterrupt {
            node: i.node.encode(),
            payload: i.payload.clone(),
            resume_schema: i.resume_schema.clone(),
        }
    }
}

impl From<PersistedInterrupt> for PendingInterrupt {
    fn from(p: PersistedInterrupt) -> Self {
        PendingInterrupt {
            node: NodeKind::decode(&p.node),
            payload: p.payload,
            resume_schema: p.resume_schema,
        }
    }
}

/* ---------- Checkpoint <-> PersistedCheckpoint ---------- */

impl From<&Checkpoint> for PersistedCheckpoint {
    fn from(cp: &Checkpoint) -> Self {
        PersistedCheckpoint {
            session_id: cp.session_id.clone(),
            step: cp.step,
            state: PersistedState::from(&cp.state),
            pending: cp.pending.encode(),
            interrupt: cp.interrupt.as_ref().map(PersistedInterrupt::from),
            created_at: cp.created_at.to_rfc3339(),
        }
    }
}

impl From<PersistedCheckpoint> for Checkpoint {
    fn from(p: PersistedCheckpoint) -> Self {
        let created_at = chrono::DateTime::parse_from_rfc3339(&p.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Checkpoint {
            session_id: p.session_id,
            step: p.step,
            state: VersionedState::from(p.state),
            pending: NodeKind::decode(&p.pending),
            interrupt: p.interrupt.map(PendingInterrupt::from),
            created_at,
        }
    }
}
