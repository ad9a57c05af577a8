//! Process-wide log subscriber.
//!
//! Library code logs through both `log` and `tracing` macros; the
//! `tracing_log::LogTracer` bridge routes the former into the same
//! subscriber so span context (job id, item, attempt) is kept on every line.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    /// JSON lines, one object per event.
    Json,
}

const QUIET_TARGETS: &[(&str, &str)] = &[
    ("hyper", "warn"),
    ("hyper_util", "warn"),
    ("reqwest", "warn"),
    ("rustls", "warn"),
];

/// Builds the filter from `RUST_LOG` when set, otherwise from `level`.
pub fn build_env_filter(level: &str) -> Result<EnvFilter, ConfigError> {
    let base = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| level.to_string());

    let mut directives = vec![base];
    for (target, lvl) in QUIET_TARGETS {
        directives.push(format!("{}={}", target, lvl));
    }

    let filter = directives.join(",");
    EnvFilter::try_new(&filter).map_err(|e| ConfigError::Validation {
        message: format!("Invalid log filter '{}': {}", filter, e),
    })
}

/// Installs the global subscriber. Returns `false` if one was already
/// installed, which is not an error.
pub fn init(level: &str, format: LogFormat) -> Result<bool, ConfigError> {
    tracing_log::LogTracer::init().ok();

    let filter = build_env_filter(level)?;
    let layer = match format {
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::CLOSE)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    };

    Ok(tracing_subscriber::registry().with(layer).try_init().is_ok())
}
