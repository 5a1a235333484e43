//! Process-wide logging setup.

/// Initialize structured JSON logging for the service.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(&tracing::LogConfig::default());
}

/// Log sink for tests: human-readable, captured by the test harness.
pub fn init_for_tests() {
    tracing::init_test();
}

/// Tracing configuration (filters, layers).
pub mod tracing;
