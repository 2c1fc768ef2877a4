//! Sequential per-thread execution.
//!
//! The runner owns live sessions and advances each one node at a time: run
//! the pending node, fold its delta into state, persist a checkpoint, then
//! resolve the next node. A thread has exactly one logical flow of control,
//! so there is no fan-out; composite graphs nest whole sub-runs inside a
//! single node instead.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

use crate::app::{App, RouteError};
use crate::event_bus::{EventBus, EventBusHandle};
use crate::node::{NodeContext, NodeError, NodeOutput, ThreadConfig};
use crate::runtimes::checkpointer::{
    Checkpoint, Checkpointer, CheckpointerError, CheckpointerType, InMemoryCheckpointer,
    PendingInterrupt,
};
use crate::state::VersionedState;
use crate::types::NodeKind;

pub type SessionId = String;

/// In-memory execution state of one thread.
#[derive(Clone, Debug)]
pub struct SessionState {
    pub state: VersionedState,
    pub step: u64,
    /// Node to run next; `End` means the run is complete.
    pub pending: NodeKind,
    pub interrupt: Option<PendingInterrupt>,
    /// Caller-supplied resume payload, consumed by the next step.
    pub resume: Option<Value>,
    pub thread: ThreadConfig,
}

/// How a session came to exist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionInit {
    Fresh,
    /// Restored from the latest durable checkpoint at this step.
    Restored { step: u64 },
}

/// Summary of one executed step.
#[derive(Clone, Debug)]
pub struct StepReport {
    pub session_id: SessionId,
    pub step: u64,
    pub ran: NodeKind,
    pub next: NodeKind,
    pub updated_channels: Vec<&'static str>,
}

/// Result of [`AppRunner::run_step`].
#[derive(Clone, Debug)]
pub enum StepOutcome {
    /// A node ran and the session moved forward.
    Ran(StepReport),
    /// The session is waiting on a resume payload.
    Paused(PendingInterrupt),
    /// The session had already reached `End`.
    Finished,
}

/// Result of [`AppRunner::run_until_complete`].
#[derive(Clone, Debug)]
pub enum RunOutcome {
    Complete(VersionedState),
    Paused(PendingInterrupt),
}

#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    #[error("no session with id `{session}`")]
    #[diagnostic(code(adloom::runner::session_not_found))]
    SessionNotFound { session: String },

    #[error("session `{session}` already exists")]
    #[diagnostic(code(adloom::runner::session_exists))]
    SessionExists { session: String },

    #[error("pending node `{node}` is not registered in the graph")]
    #[diagnostic(code(adloom::runner::missing_node))]
    MissingNode { node: String },

    #[error("session `{session}` exceeded the step limit of {limit}")]
    #[diagnostic(
        code(adloom::runner::step_limit),
        help("A cycle is not converging; raise the limit only if the graph is known to need it.")
    )]
    StepLimitExceeded { session: String, limit: u64 },

    #[error("node `{node}` failed: {source}")]
    #[diagnostic(code(adloom::runner::node_failed))]
    NodeFailed {
        node: String,
        #[source]
        source: NodeError,
    },

    #[error("session `{session}` has no pending interrupt to resume")]
    #[diagnostic(code(adloom::runner::no_pending_interrupt))]
    NoPendingInterrupt { session: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpointer(#[from] CheckpointerError),
}

/// Orchestrates sessions over one compiled [`App`].
pub struct AppRunner {
    app: Arc<App>,
    sessions: FxHashMap<SessionId, SessionState>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    event_bus: EventBus,
    listener: Option<EventBusHandle>,
}

impl AppRunner {
    /// Build a runner, constructing the checkpointer the app's runtime
    /// config asks for.
    pub async fn new(app: App) -> Result<Self, RunnerError> {
        let checkpointer: Option<Arc<dyn Checkpointer>> = match app.runtime_config().checkpointer
        {
            Some(CheckpointerType::InMemory) => Some(InMemoryCheckpointer::shared()),
            #[cfg(feature = "sqlite")]
            Some(CheckpointerType::Sqlite) => {
                let db_name = app.runtime_config().resolve_sqlite_db_name();
                Some(Arc::new(
                    crate::runtimes::checkpointer_sqlite::SqliteCheckpointer::connect(&db_name)
                        .await?,
                ))
            }
            None => None,
        };
        Ok(Self::with_checkpointer(Arc::new(app), checkpointer))
    }

    /// Build a runner around an already-constructed checkpointer. Composite
    /// nodes use this to share one store across nested runs.
    #[must_use]
    pub fn with_checkpointer(
        app: Arc<App>,
        checkpointer: Option<Arc<dyn Checkpointer>>,
    ) -> Self {
        let event_bus = app.runtime_config().event_bus.build();
        Self {
            app,
            sessions: FxHashMap::default(),
            checkpointer,
            event_bus,
            listener: None,
        }
    }

    /// Start draining emitted events into the configured sinks.
    pub fn start_event_listener(&mut self) {
        if self.listener.is_none() {
            self.listener = Some(self.event_bus.listen());
        }
    }

    /// Stop the event drain task, flushing what was already queued.
    pub async fn shutdown_events(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.stop().await;
        }
    }

    #[must_use]
    pub fn checkpointer(&self) -> Option<Arc<dyn Checkpointer>> {
        self.checkpointer.clone()
    }

    /// Register a session, restoring from the latest checkpoint when one
    /// exists (the supplied initial state is ignored in that case).
    pub async fn create_session(
        &mut self,
        session_id: SessionId,
        initial: VersionedState,
        thread: ThreadConfig,
    ) -> Result<SessionInit, RunnerError> {
        if self.sessions.contains_key(&session_id) {
            return Err(RunnerError::SessionExists {
                session: session_id,
            });
        }

        if let Some(checkpointer) = &self.checkpointer {
            if let Some(cp) = checkpointer.load_latest(&session_id).await? {
                let step = cp.step;
                tracing::info!(session_id, step, "restoring session from checkpoint");
                self.sessions.insert(
                    session_id,
                    SessionState {
                        state: cp.state,
                        step: cp.step,
                        pending: cp.pending,
                        interrupt: cp.interrupt,
                        resume: None,
                        thread,
                    },
                );
                return Ok(SessionInit::Restored { step });
            }
        }

        let session = SessionState {
            state: initial,
            step: 0,
            pending: self.app.entry().clone(),
            interrupt: None,
            resume: None,
            thread,
        };
        self.save_checkpoint(&session_id, &session).await?;
        self.sessions.insert(session_id, session);
        Ok(SessionInit::Fresh)
    }

    /// Execute the pending node of a session, if any.
    #[instrument(skip(self))]
    pub async fn run_step(&mut self, session_id: &str) -> Result<StepOutcome, RunnerError> {
        let app = Arc::clone(&self.app);
        let event_sender = self.event_bus.sender();
        let session =
            self.sessions
                .get_mut(session_id)
                .ok_or_else(|| RunnerError::SessionNotFound {
                    session: session_id.to_string(),
                })?;

        if session.pending == NodeKind::End {
            return Ok(StepOutcome::Finished);
        }
        if let Some(interrupt) = &session.interrupt {
            if session.resume.is_none() {
                return Ok(StepOutcome::Paused(interrupt.clone()));
            }
        }

        let step = session.step + 1;
        let limit = app.runtime_config().step_limit;
        if step > limit {
            return Err(RunnerError::StepLimitExceeded {
                session: session_id.to_string(),
                limit,
            });
        }

        let pending = session.pending.clone();
        let node = app
            .node(&pending)
            .cloned()
            .ok_or_else(|| RunnerError::MissingNode {
                node: pending.label().to_string(),
            })?;

        let mut ctx = NodeContext::new(
            pending.label(),
            step,
            session.thread.clone(),
            Some(event_sender),
        );
        ctx.resume = session.resume.take();

        tracing::debug!(node = %pending, step, "running node");
        let output = node.run(session.state.snapshot(), ctx).await.map_err(|e| {
            RunnerError::NodeFailed {
                node: pending.label().to_string(),
                source: e,
            }
        })?;

        match output {
            NodeOutput::Continue(partial) => {
                session.step = step;
                let updated_channels = app.apply_step(&mut session.state, &partial);
                let next = app.resolve_next(&pending, &session.state.snapshot())?;
                session.pending = next.clone();
                session.interrupt = None;
                let report = StepReport {
                    session_id: session_id.to_string(),
                    step,
                    ran: pending,
                    next,
                    updated_channels,
                };
                let session = session.clone();
                self.save_checkpoint(session_id, &session).await?;
                Ok(StepOutcome::Ran(report))
            }
            NodeOutput::Suspend(request) => {
                session.step = step;
                let interrupt = PendingInterrupt {
                    node: pending,
                    payload: request.payload,
                    resume_schema: request.resume_schema,
                };
                session.interrupt = Some(interrupt.clone());
                let session = session.clone();
                self.save_checkpoint(session_id, &session).await?;
                tracing::info!(session_id, node = %interrupt.node, "session paused for input");
                Ok(StepOutcome::Paused(interrupt))
            }
        }
    }

    /// Drive a session until it completes or pauses.
    #[instrument(skip(self))]
    pub async fn run_until_complete(
        &mut self,
        session_id: &str,
    ) -> Result<RunOutcome, RunnerError> {
        loop {
            match self.run_step(session_id).await? {
                StepOutcome::Ran(report) => {
                    tracing::debug!(
                        step = report.step,
                        ran = %report.ran,
                        next = %report.next,
                        "step complete"
                    );
                }
                StepOutcome::Paused(interrupt) => return Ok(RunOutcome::Paused(interrupt)),
                StepOutcome::Finished => {
                    let session = self.sessions.get(session_id).ok_or_else(|| {
                        RunnerError::SessionNotFound {
                            session: session_id.to_string(),
                        }
                    })?;
                    return Ok(RunOutcome::Complete(session.state.clone()));
                }
            }
        }
    }

    /// Supply the resume payload for a paused session. The suspended node is
    /// re-run with the payload on the next step.
    pub fn resume(&mut self, session_id: &str, payload: Value) -> Result<(), RunnerError> {
        let session =
            self.sessions
                .get_mut(session_id)
                .ok_or_else(|| RunnerError::SessionNotFound {
                    session: session_id.to_string(),
                })?;
        if session.interrupt.is_none() {
            return Err(RunnerError::NoPendingInterrupt {
                session: session_id.to_string(),
            });
        }
        session.resume = Some(payload);
        Ok(())
    }

    #[must_use]
    pub fn session(&self, session_id: &str) -> Option<&SessionState> {
        self.sessions.get(session_id)
    }

    #[must_use]
    pub fn pending_interrupt(&self, session_id: &str) -> Option<&PendingInterrupt> {
        self.sessions
            .get(session_id)
            .and_then(|s| s.interrupt.as_ref())
    }

    async fn save_checkpoint(
        &self,
        session_id: &str,
        session: &SessionState,
    ) -> Result<(), RunnerError> {
        if let Some(checkpointer) = &self.checkpointer {
            checkpointer
                .save(Checkpoint {
                    session_id: session_id.to_string(),
                    step: session.step,
                    state: session.state.clone(),
                    pending: session.pending.clone(),
                    interrupt: session.interrupt.clone(),
                    created_at: chrono::Utc::now(),
                })
                .await?;
        }
        Ok(())
    }
}
