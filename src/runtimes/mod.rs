//! Session runtime: stepwise execution, checkpointing, and resume.
//!
//! The runtime layer drives a compiled [`crate::app::App`] one node at a
//! time per session. Every committed step lands in the configured
//! [`Checkpointer`], so a session can be restored mid-build and an interrupt
//! can outlive the process that raised it.
//!
//! # Components
//!
//! - [`AppRunner`] - per-session step loop with interrupt handling
//! - [`Checkpointer`] - pluggable persistence behind every step
//! - [`InMemoryCheckpointer`] - volatile store for tests and development
//! - [`SqliteCheckpointer`] - durable store (feature `sqlite`)
//! - [`RuntimeConfig`] - step limit, event sinks, persistence selection
//!
//! # Usage
//!
//! ```rust,no_run
//! use adloom::runtimes::AppRunner;
//! use adloom::node::ThreadConfig;
//! use adloom::state::VersionedState;
//! # use adloom::app::App;
//! # async fn example(app: App) -> Result<(), Box<dyn std::error::Error>> {
//! let mut runner = AppRunner::new(app).await?;
//! let initial = VersionedState::new_with_user_message("plan a campaign");
//! runner
//!     .create_session("session_1".into(), initial, ThreadConfig::new("session_1"))
//!     .await?;
//! let outcome = runner.run_until_complete("session_1").await?;
//! # Ok(())
//! # }
//! ```

pub mod checkpointer;
#[cfg(feature = "sqlite")]
pub mod checkpointer_sqlite;
pub mod persistence;
pub mod runner;
pub mod runtime_config;

pub use checkpointer::{
    Checkpoint, Checkpointer, CheckpointerError, CheckpointerType, InMemoryCheckpointer,
    PendingInterrupt,
};
#[cfg(feature = "sqlite")]
pub use checkpointer_sqlite::SqliteCheckpointer;
pub use persistence::{PersistedCheckpoint, PersistenceError};
pub use runner::{
    AppRunner, RunOutcome, RunnerError, SessionId, SessionInit, SessionState, StepOutcome,
    StepReport,
};
pub use runtime_config::{DEFAULT_STEP_LIMIT, EventBusConfig, RuntimeConfig, SinkConfig};
