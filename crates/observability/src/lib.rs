//! Process-wide logging setup shared by idgov binaries.

/// Initialize structured JSON logging, filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(tracing::DEFAULT_FILTER);
}

/// Like [`init`], with a fallback filter used when `RUST_LOG` is unset.
pub fn init_with_default(filter: &str) {
    tracing::init(filter);
}

/// Subscriber configuration (filters, formatting).
pub mod tracing;
