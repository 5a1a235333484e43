//! Tracing subscriber installation.
//!
//! Job pipeline events carry `job_id`, `worker` and `status` fields; the JSON
//! formatter flattens them to top-level keys so log pipelines can index them.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Subscriber options.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directive used when `RUST_LOG` is absent
    pub default_filter: String,
    /// Include the current span's fields on every event
    pub with_current_span: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_filter: DEFAULT_FILTER.to_string(),
            with_current_span: true,
        }
    }
}

fn filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install the JSON subscriber. Later calls are no-ops.
pub fn init(config: &LogConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(&config.default_filter))
        .json()
        .flatten_event(true)
        .with_current_span(config.with_current_span)
        .with_span_list(false)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

/// Install a plain-text subscriber that writes through the test harness.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_test();
        init_test();
        init(&LogConfig::default());
        ::tracing::info!(job_id = "x", "still logging");
    }

    #[test]
    fn default_filter_is_info() {
        assert_eq!(LogConfig::default().default_filter, "info");
    }
}
