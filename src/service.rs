//! In-process submission facade.
//!
//! The four operations callers get: submit a plan request, poll its status,
//! fetch the current result projection, and resume a paused thread. Each
//! thread runs on its own driving task; threads are independent, while steps
//! within a thread stay strictly sequential.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::app::App;
use crate::node::{PARAM_USER_VALIDATION, ThreadConfig};
use crate::runtimes::checkpointer::Checkpointer;
use crate::runtimes::runner::{AppRunner, RunnerError, StepOutcome};
use crate::schema::{FieldViolation, ObjectSchema, render_violations, value_to_fields};
use crate::state::VersionedState;
use crate::types::NodeKind;

/// Accepted submission shape. Unknown fields are rejected outright.
pub const SUBMIT_SCHEMA: ObjectSchema = ObjectSchema {
    name: "campaign_submission",
    required: &["brand_name", "brand_description", "campaign_objective"],
    optional: &[
        "product_name",
        "product_description",
        "website",
        "total_budget",
        "integrated_ad_platforms",
        "account_ids",
        "enable_user_validation",
    ],
};

/// Lifecycle of a submitted thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreadStatus {
    Queued,
    Building {
        node: String,
    },
    /// Paused for human review; `payload` is the projection to inspect and
    /// `schema` names the shape a resume payload must satisfy.
    AwaitingReview {
        node: String,
        schema: String,
        payload: Value,
    },
    Complete,
    Failed {
        node: Option<String>,
        kind: String,
        message: String,
    },
}

/// Result projection over the campaign fields. Everything is optional so a
/// partial plan (paused or mid-build) still projects cleanly.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignPlan {
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub age_group: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub interests: Option<Value>,
    #[serde(default)]
    pub locations: Option<Value>,
    #[serde(default)]
    pub psychographic_traits: Option<Value>,
    #[serde(default)]
    pub recommended_ad_platforms: Option<Vec<String>>,
    #[serde(default)]
    pub campaign_start_date: Option<String>,
    #[serde(default)]
    pub campaign_end_date: Option<String>,
    #[serde(default)]
    pub total_budget: Option<f64>,
    #[serde(default)]
    pub channel_budget_allocation: Option<FxHashMap<String, f64>>,
    #[serde(default)]
    pub campaign_name: Option<String>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ServiceError {
    #[error("submission rejected: {}", render_violations(.violations))]
    #[diagnostic(
        code(adloom::service::validation),
        help("Fix the named fields and submit again.")
    )]
    Validation { violations: Vec<FieldViolation> },

    #[error("no thread with id `{thread_id}`")]
    #[diagnostic(code(adloom::service::unknown_thread))]
    UnknownThread { thread_id: String },

    #[error("thread `{thread_id}` is not paused")]
    #[diagnostic(code(adloom::service::not_paused))]
    NotPaused { thread_id: String },

    #[error("could not project the result: {message}")]
    #[diagnostic(code(adloom::service::projection))]
    Projection { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Runner(#[from] RunnerError),
}

#[derive(Clone)]
struct ThreadEntry {
    runner: Arc<Mutex<AppRunner>>,
    status: Arc<RwLock<ThreadStatus>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// Submission/status/result/resume facade over the planner graph.
pub struct PlannerService {
    app: Arc<App>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    resume_schemas: FxHashMap<String, ObjectSchema>,
    threads: Arc<RwLock<FxHashMap<String, ThreadEntry>>>,
}

impl PlannerService {
    #[must_use]
    pub fn new(
        app: Arc<App>,
        checkpointer: Option<Arc<dyn Checkpointer>>,
        resume_schemas: FxHashMap<String, ObjectSchema>,
    ) -> Self {
        Self {
            app,
            checkpointer,
            resume_schemas,
            threads: Arc::new(RwLock::new(FxHashMap::default())),
        }
    }

    /// Validate a submission, seed a thread, and start building.
    ///
    /// Returns the thread id immediately; progress is observed via
    /// [`PlannerService::status`].
    pub async fn submit(&self, payload: Value) -> Result<String, ServiceError> {
        let object = value_to_fields(&payload)
            .map_err(|violations| ServiceError::Validation { violations })?;
        let mut fields = SUBMIT_SCHEMA
            .validate(&object, crate::schema::ExtraFieldsPolicy::Reject)
            .map_err(|violations| ServiceError::Validation { violations })?;

        let user_validation = fields
            .remove(PARAM_USER_VALIDATION)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let thread_id = uuid::Uuid::new_v4().to_string();
        let thread = ThreadConfig::new(&thread_id)
            .with_param(PARAM_USER_VALIDATION, json!(user_validation));

        let mut runner =
            AppRunner::with_checkpointer(Arc::clone(&self.app), self.checkpointer.clone());
        runner
            .create_session(
                thread_id.clone(),
                VersionedState::new_with_fields(fields),
                thread,
            )
            .await?;

        let entry = ThreadEntry {
            runner: Arc::new(Mutex::new(runner)),
            status: Arc::new(RwLock::new(ThreadStatus::Queued)),
            task: Arc::new(Mutex::new(None)),
        };
        self.threads
            .write()
            .await
            .insert(thread_id.clone(), entry.clone());

        tracing::info!(thread_id, "campaign plan submitted");
        spawn_drive(thread_id.clone(), entry).await;
        Ok(thread_id)
    }

    pub async fn status(&self, thread_id: &str) -> Result<ThreadStatus, ServiceError> {
        let entry = self.entry(thread_id).await?;
        let status = entry.status.read().await.clone();
        Ok(status)
    }

    /// Current plan projection. Valid for complete and paused threads alike;
    /// for a failed thread it reflects the last good checkpointed state.
    pub async fn result(&self, thread_id: &str) -> Result<CampaignPlan, ServiceError> {
        let entry = self.entry(thread_id).await?;
        let runner = entry.runner.lock().await;
        let session = runner
            .session(thread_id)
            .ok_or_else(|| ServiceError::UnknownThread {
                thread_id: thread_id.to_string(),
            })?;
        let fields =
            serde_json::to_value(session.state.fields.snapshot()).map_err(|e| {
                ServiceError::Projection {
                    message: e.to_string(),
                }
            })?;
        serde_json::from_value(fields).map_err(|e| ServiceError::Projection {
            message: e.to_string(),
        })
    }

    /// Resume a paused thread with a (possibly edited) review payload.
    ///
    /// The payload is validated against the paused node's schema before the
    /// thread moves; an invalid payload leaves it paused.
    pub async fn resume(&self, thread_id: &str, payload: Value) -> Result<(), ServiceError> {
        let entry = self.entry(thread_id).await?;
        {
            let mut runner = entry.runner.lock().await;
            let interrupt = runner.pending_interrupt(thread_id).cloned().ok_or_else(|| {
                ServiceError::NotPaused {
                    thread_id: thread_id.to_string(),
                }
            })?;

            if let Some(schema) = self.resume_schemas.get(&interrupt.resume_schema) {
                let object = value_to_fields(&payload)
                    .map_err(|violations| ServiceError::Validation { violations })?;
                schema
                    .validate(&object, crate::schema::ExtraFieldsPolicy::Reject)
                    .map_err(|violations| ServiceError::Validation { violations })?;
            }

            runner.resume(thread_id, payload)?;
        }

        tracing::info!(thread_id, "thread resumed");
        spawn_drive(thread_id.to_string(), entry).await;
        Ok(())
    }

    /// Wait for the thread's current driving task to settle (complete,
    /// paused, or failed). Mainly useful in tests and batch callers.
    pub async fn join(&self, thread_id: &str) -> Result<(), ServiceError> {
        let entry = self.entry(thread_id).await?;
        let handle = entry.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        Ok(())
    }

    async fn entry(&self, thread_id: &str) -> Result<ThreadEntry, ServiceError> {
        self.threads
            .read()
            .await
            .get(thread_id)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownThread {
                thread_id: thread_id.to_string(),
            })
    }
}

async fn spawn_drive(thread_id: String, entry: ThreadEntry) {
    let runner = Arc::clone(&entry.runner);
    let status = Arc::clone(&entry.status);
    let handle = tokio::spawn(async move {
        drive(&thread_id, runner, status).await;
    });
    *entry.task.lock().await = Some(handle);
}

/// Step loop for one thread. Releases the runner lock between steps so
/// status and result queries interleave with the build.
async fn drive(
    thread_id: &str,
    runner: Arc<Mutex<AppRunner>>,
    status: Arc<RwLock<ThreadStatus>>,
) {
    loop {
        let mut guard = runner.lock().await;
        if let Some(session) = guard.session(thread_id) {
            if session.pending != NodeKind::End {
                *status.write().await = ThreadStatus::Building {
                    node: session.pending.label().to_string(),
                };
            }
        }
        match guard.run_step(thread_id).await {
            Ok(StepOutcome::Ran(_)) => continue,
            Ok(StepOutcome::Paused(interrupt)) => {
                *status.write().await = ThreadStatus::AwaitingReview {
                    node: interrupt.node.label().to_string(),
                    schema: interrupt.resume_schema,
                    payload: interrupt.payload,
                };
                return;
            }
            Ok(StepOutcome::Finished) => {
                *status.write().await = ThreadStatus::Complete;
                return;
            }
            Err(e) => {
                tracing::error!(thread_id, error = %e, "thread failed");
                *status.write().await = failure_status(&e);
                return;
            }
        }
    }
}

fn failure_status(e: &RunnerError) -> ThreadStatus {
    match e {
        RunnerError::NodeFailed { node, source } => ThreadStatus::Failed {
            node: source
                .node()
                .map(str::to_string)
                .or_else(|| Some(node.clone())),
            kind: source.kind_label().to_string(),
            message: source.to_string(),
        },
        RunnerError::StepLimitExceeded { .. } => ThreadStatus::Failed {
            node: None,
            kind: "step_limit".to_string(),
            message: e.to_string(),
        },
        other => ThreadStatus::Failed {
            node: None,
            kind: "runner".to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_schema_rejects_unknown_fields() {
        let object = value_to_fields(&json!({
            "brand_name": "Zepto",
            "brand_description": "10-minute grocery delivery",
            "campaign_objective": "conversions",
            "surprise": true,
        }))
        .unwrap();
        let err = SUBMIT_SCHEMA
            .validate(&object, crate::schema::ExtraFieldsPolicy::Reject)
            .unwrap_err();
        assert_eq!(err[0].field, "surprise");
    }

    #[test]
    fn plan_projection_tolerates_partial_fields() {
        let plan: CampaignPlan =
            serde_json::from_value(json!({"industry": "Groceries", "account_ids": ["a-1"]}))
                .unwrap();
        assert_eq!(plan.industry.as_deref(), Some("Groceries"));
        assert!(plan.campaign_name.is_none());
    }
}
