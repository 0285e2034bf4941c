//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber once
//! - Select pretty or JSON output
//! - Apply the log level from config, overridable through `RUST_LOG`

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

use crate::config::schema::{LogFormat, ObservabilityConfig};

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine readable.
///
/// Fails if a subscriber is already set.
pub fn init(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    }
}

/// Build a filter from a configured level, falling back to `info` if the
/// directive does not parse.
pub fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|e| {
        eprintln!("invalid log level {:?} ({}), using info", level, e);
        EnvFilter::new("info")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_configured_level() {
        assert_eq!(filter_for("warn").max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(filter_for("debug").max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn test_invalid_level_falls_back_to_info() {
        assert_eq!(filter_for("app=loud").max_level_hint(), Some(LevelFilter::INFO));
    }
}
