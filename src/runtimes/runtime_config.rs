//! Explicit runtime configuration.
//!
//! Everything the runner needs to know is carried here; there is no ambient
//! global configuration. Database names may come from the environment via
//! `dotenvy`, but only when the config does not set them explicitly.

use crate::event_bus::{EventBus, EventSink, MemorySink, StdOutSink};
use crate::runtimes::checkpointer::CheckpointerType;

/// Default bound on steps per session before a run is declared runaway.
pub const DEFAULT_STEP_LIMIT: u64 = 64;

/// Which sinks an event bus should be built with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkConfig {
    StdOut,
    Memory,
}

/// Event bus construction options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventBusConfig {
    pub sinks: Vec<SinkConfig>,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            sinks: vec![SinkConfig::StdOut],
        }
    }
}

impl EventBusConfig {
    #[must_use]
    pub fn build(&self) -> EventBus {
        let sinks: Vec<Box<dyn EventSink>> = self
            .sinks
            .iter()
            .map(|sink| match sink {
                SinkConfig::StdOut => Box::new(StdOutSink) as Box<dyn EventSink>,
                SinkConfig::Memory => Box::new(MemorySink::new()) as Box<dyn EventSink>,
            })
            .collect();
        EventBus::new(sinks)
    }
}

/// Runtime options captured by a compiled graph.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Persistence backend; `None` keeps sessions purely in memory.
    pub checkpointer: Option<CheckpointerType>,
    /// SQLite database file, when the SQLite backend is selected.
    pub sqlite_db_name: Option<String>,
    /// Fatal bound on steps per session.
    pub step_limit: u64,
    pub event_bus: EventBusConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            checkpointer: None,
            sqlite_db_name: None,
            step_limit: DEFAULT_STEP_LIMIT,
            event_bus: EventBusConfig::default(),
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_checkpointer(mut self, checkpointer: CheckpointerType) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    #[must_use]
    pub fn with_sqlite_db_name(mut self, name: impl Into<String>) -> Self {
        self.sqlite_db_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_step_limit(mut self, step_limit: u64) -> Self {
        self.step_limit = step_limit;
        self
    }

    #[must_use]
    pub fn with_event_bus(mut self, event_bus: EventBusConfig) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Database file name: explicit config first, then `ADLOOM_DB` from the
    /// environment (a `.env` file is honored), then a local default.
    #[must_use]
    pub fn resolve_sqlite_db_name(&self) -> String {
        if let Some(name) = &self.sqlite_db_name {
            return name.clone();
        }
        let _ = dotenvy::dotenv();
        std::env::var("ADLOOM_DB").unwrap_or_else(|_| "adloom.db".to_string())
    }
}
