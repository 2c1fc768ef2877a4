//! A compiled graph embedded as a single node of a larger graph.
//!
//! The nested run shares the outer checkpointer under a derived session id,
//! so a crash or an interrupt inside a stage resumes exactly where it left
//! off. Interrupts propagate outward unchanged; the outer caller cannot tell
//! whether a pause came from a top-level node or from deep inside a stage.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::app::App;
use crate::node::{InterruptRequest, Node, NodeContext, NodeError, NodeOutput, NodePartial};
use crate::runtimes::checkpointer::Checkpointer;
use crate::runtimes::runner::{AppRunner, RunOutcome, RunnerError};
use crate::state::{StateSnapshot, VersionedState};

pub struct SubgraphNode {
    label: String,
    app: Arc<App>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl SubgraphNode {
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        app: Arc<App>,
        checkpointer: Option<Arc<dyn Checkpointer>>,
    ) -> Self {
        Self {
            label: label.into(),
            app,
            checkpointer,
        }
    }

    fn map_error(&self, e: RunnerError) -> NodeError {
        match e {
            // Keep the inner node's identity; failure reports should name
            // the node that actually failed.
            RunnerError::NodeFailed { source, .. } => source,
            other => NodeError::Subgraph {
                label: self.label.clone(),
                message: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl Node for SubgraphNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let session_id = format!("{}/{}", ctx.thread.thread_id, self.label);
        let mut runner =
            AppRunner::with_checkpointer(Arc::clone(&self.app), self.checkpointer.clone());

        // The nested conversation starts fresh; fields carry over. If a
        // checkpoint exists for this session the initial state is ignored
        // and the stage picks up mid-flight.
        let initial = VersionedState::new_with_fields(snapshot.fields.clone());
        runner
            .create_session(session_id.clone(), initial, ctx.thread.clone())
            .await
            .map_err(|e| self.map_error(e))?;

        if let Some(payload) = ctx.resume.clone() {
            // A resume payload only makes sense against the restored pause.
            // With no pending interrupt the pause was lost (no checkpointer
            // backs this session); re-running the stage would re-invoke its
            // capabilities and drop the payload, so fail instead.
            if runner.pending_interrupt(&session_id).is_none() {
                return Err(NodeError::Subgraph {
                    label: self.label.clone(),
                    message: "resume payload received but the stage has no pending interrupt; \
                              a checkpointer is required to resume suspended stages"
                        .into(),
                });
            }
            runner
                .resume(&session_id, payload)
                .map_err(|e| self.map_error(e))?;
        }

        match runner
            .run_until_complete(&session_id)
            .await
            .map_err(|e| self.map_error(e))?
        {
            RunOutcome::Paused(interrupt) => Ok(NodeOutput::Suspend(InterruptRequest {
                payload: interrupt.payload,
                resume_schema: interrupt.resume_schema,
            })),
            RunOutcome::Complete(final_state) => {
                let mut partial = NodePartial::new();

                let mut changed: FxHashMap<String, serde_json::Value> = FxHashMap::default();
                for (key, value) in final_state.fields.snapshot() {
                    if snapshot.fields.get(&key) != Some(&value) {
                        changed.insert(key, value);
                    }
                }
                if !changed.is_empty() {
                    partial.fields = Some(changed);
                }

                let messages = final_state.messages.snapshot();
                if !messages.is_empty() {
                    partial.messages = Some(messages);
                }
                let errors = final_state.errors.snapshot();
                if !errors.is_empty() {
                    partial.errors = Some(errors);
                }

                Ok(NodeOutput::Continue(partial))
            }
        }
    }
}
