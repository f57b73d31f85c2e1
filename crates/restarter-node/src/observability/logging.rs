//! Structured logging initialization.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::middleware::ACCESS_LOG_TARGET;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format for development.
    #[default]
    Pretty,
    /// One JSON object per line, for log aggregation.
    Json,
}

impl LogFormat {
    fn as_str(self) -> &'static str {
        match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        }
    }
}

/// Default filter directives for `level`, used when `RUST_LOG` is unset.
pub fn default_directives(level: &str) -> String {
    format!(
        "restarter_node={level},restarter_storage={level},{ACCESS_LOG_TARGET}={level},tower_http=warn,axum::rejection=trace"
    )
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG`, when set, replaces the directives derived from `level`.
pub fn init_logging(level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
    }

    tracing::info!(level = %level, format = format.as_str(), "Logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names_match_cli_and_config() {
        use clap::ValueEnum;

        for format in [LogFormat::Pretty, LogFormat::Json] {
            assert_eq!(LogFormat::from_str(format.as_str(), false), Ok(format));
            let yaml: LogFormat = serde_yaml::from_str(format.as_str()).unwrap();
            assert_eq!(yaml, format);
        }
        assert_eq!(LogFormat::from_str("JSON", true), Ok(LogFormat::Json));
        assert!(LogFormat::from_str("anything", true).is_err());
    }

    #[test]
    fn test_default_directives_cover_access_log() {
        let directives = default_directives("debug");
        assert!(directives.contains("restarter_storage=debug"));
        assert!(directives.contains("access_log=debug"));
        assert!(EnvFilter::try_new(directives).is_ok());
    }
}
