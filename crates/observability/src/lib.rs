//! Tracing and logging (shared setup).

/// Initialize process-wide observability from the environment.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::LogConfig::from_env());
}

/// Tracing configuration (filters, output format).
pub mod tracing;
