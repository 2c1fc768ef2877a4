//! Durable checkpoint storage.
//!
//! The runner saves a checkpoint after every node execution. Backends keep
//! superseded steps rather than overwriting them, so a thread's history stays
//! inspectable and a crash resumes from the latest durable step.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::state::VersionedState;
use crate::types::NodeKind;

/// An interrupt waiting for a caller-supplied resume payload.
///
/// At most one of these exists per thread at any time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingInterrupt {
    /// Node that suspended; re-run on resume.
    pub node: NodeKind,
    /// Projection handed to the caller for review.
    pub payload: Value,
    /// Name of the schema the resume payload must satisfy.
    pub resume_schema: String,
}

/// Snapshot of a session after one step.
#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub session_id: String,
    pub step: u64,
    pub state: VersionedState,
    /// Node to run next; `End` marks completion.
    pub pending: NodeKind,
    pub interrupt: Option<PendingInterrupt>,
    pub created_at: DateTime<Utc>,
}

/// Available persistence backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointerType {
    InMemory,
    #[cfg(feature = "sqlite")]
    Sqlite,
}

#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointerError {
    #[error("checkpoint backend failure: {message}")]
    #[diagnostic(code(adloom::checkpointer::backend))]
    Backend { message: String },

    #[error("checkpoint serialization failed: {source}")]
    #[diagnostic(code(adloom::checkpointer::serde))]
    Serde {
        #[source]
        source: serde_json::Error,
    },
}

/// Pluggable checkpoint store. One session maps to one thread of execution;
/// writes for a session are strictly ordered by step.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Persist a checkpoint. Saving the same step twice replaces that step.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointerError>;

    /// Latest checkpoint for a session, if any.
    async fn load_latest(&self, session_id: &str)
    -> Result<Option<Checkpoint>, CheckpointerError>;

    /// All persisted step numbers for a session, ascending.
    async fn list_steps(&self, session_id: &str) -> Result<Vec<u64>, CheckpointerError>;
}

/// Volatile checkpointer for tests and single-process runs.
#[derive(Default)]
pub struct InMemoryCheckpointer {
    sessions: RwLock<FxHashMap<String, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle, the shape the runner and composite nodes expect.
    #[must_use]
    pub fn shared() -> Arc<dyn Checkpointer> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointerError> {
        let mut sessions = self.sessions.write().await;
        let steps = sessions.entry(checkpoint.session_id.clone()).or_default();
        match steps.iter_mut().find(|c| c.step == checkpoint.step) {
            Some(existing) => *existing = checkpoint,
            None => {
                steps.push(checkpoint);
                steps.sort_by_key(|c| c.step);
            }
        }
        Ok(())
    }

    async fn load_latest(
        &self,
        session_id: &str,
    ) -> Result<Option<Checkpoint>, CheckpointerError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .and_then(|steps| steps.last().cloned()))
    }

    async fn list_steps(&self, session_id: &str) -> Result<Vec<u64>, CheckpointerError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .map(|steps| steps.iter().map(|c| c.step).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(step: u64) -> Checkpoint {
        Checkpoint {
            session_id: "t1".into(),
            step,
            state: VersionedState::new(),
            pending: NodeKind::custom("process"),
            interrupt: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn superseded_steps_are_kept() {
        let store = InMemoryCheckpointer::new();
        for step in [0, 1, 2] {
            store.save(checkpoint(step)).await.unwrap();
        }
        assert_eq!(store.list_steps("t1").await.unwrap(), vec![0, 1, 2]);
        let latest = store.load_latest("t1").await.unwrap().unwrap();
        assert_eq!(latest.step, 2);
    }

    #[tokio::test]
    async fn saving_a_step_twice_replaces_it() {
        let store = InMemoryCheckpointer::new();
        store.save(checkpoint(1)).await.unwrap();
        let mut repeat = checkpoint(1);
        repeat.pending = NodeKind::End;
        store.save(repeat).await.unwrap();
        assert_eq!(store.list_steps("t1").await.unwrap(), vec![1]);
        let latest = store.load_latest("t1").await.unwrap().unwrap();
        assert_eq!(latest.pending, NodeKind::End);
    }

    #[tokio::test]
    async fn unknown_session_is_empty() {
        let store = InMemoryCheckpointer::new();
        assert!(store.load_latest("missing").await.unwrap().is_none());
        assert!(store.list_steps("missing").await.unwrap().is_empty());
    }
}
