//! Process-level tracing setup.
//!
//! Library code only emits through the `tracing` macros; installing a
//! subscriber is the embedding process's call. This helper wires the usual
//! stack: an env-driven filter (`RUST_LOG`, default `info`) over a fmt layer.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the default subscriber for binaries and integration runs.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}
