//! Logging and tracing initialization

use crate::config::LogSettings;
use crate::errors::ConfigError;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Install a global subscriber filtered by `RUST_LOG`, falling back to the
/// configured level for this crate
pub fn init_logging(settings: &LogSettings) -> Result<(), ConfigError> {
    let level = settings.level.to_tracing_level();
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("ripcord={level}")))
        .map_err(|e| ConfigError::Logging(format!("failed to create log filter: {e}")))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if settings.json {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .json(),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_span_events(FmtSpan::NONE)
                    .compact(),
            )
            .try_init()
    };

    installed.map_err(|e| ConfigError::Logging(e.to_string()))
}

/// Initialize test logging once per process; later calls are no-ops
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ripcord=debug"));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_second_init_reports_error() {
        init_test_logging();

        // A global subscriber is already installed
        let result = init_logging(&LogSettings {
            level: LogLevel::Warn,
            json: false,
        });
        assert!(matches!(result, Err(ConfigError::Logging(_))));
    }
}
