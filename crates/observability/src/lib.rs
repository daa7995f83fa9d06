//! Process-wide tracing setup for the membership client.

/// Initialize structured logging for the process.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber configuration (filter, JSON formatting).
pub mod tracing;
