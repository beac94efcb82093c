//! Tracing subscriber initialization.
//!
//! Authorization decisions are logged at `debug`, skipped policies at
//! `warn`; `RUST_LOG=idgov_authz=debug` shows every decision.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber. Later calls keep the first one.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // JSON lines with timestamps; targets are kept so per-crate filters read naturally.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(true)
        .try_init();
}
