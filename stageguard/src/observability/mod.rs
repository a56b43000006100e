//! Tracing subscriber setup.
//!
//! The engine only emits `tracing` events; installing a subscriber is left to
//! the embedding application. [`init_tracing`] is a convenience for binaries
//! and tests that want the usual setup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing_subscriber::{fmt as fmt_layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

static TRACING_INITIALIZED: OnceLock<bool> = OnceLock::new();

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, single-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs a global subscriber with an `EnvFilter` read from `RUST_LOG`.
///
/// Safe to call repeatedly: only the first call does anything. Returns
/// whether this process's global subscriber was installed by us; false if
/// another subscriber was already set.
pub fn init_tracing(format: LogFormat) -> bool {
    *TRACING_INITIALIZED.get_or_init(|| {
        let registry = tracing_subscriber::registry().with(env_filter());
        let installed = match format {
            LogFormat::Pretty => registry
                .with(fmt_layer::layer().with_target(true).with_level(true))
                .try_init()
                .is_ok(),
            LogFormat::Json => registry
                .with(
                    fmt_layer::layer()
                        .json()
                        .with_target(true)
                        .with_current_span(false),
                )
                .try_init()
                .is_ok(),
        };

        if installed {
            tracing::debug!(format = %format, "Tracing initialized");
        }
        installed
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(" Pretty ".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_format_serde() {
        let json = serde_json::to_string(&LogFormat::Json).unwrap();
        assert_eq!(json, "\"json\"");
        let parsed: LogFormat = serde_json::from_str("\"pretty\"").unwrap();
        assert_eq!(parsed, LogFormat::Pretty);
        assert_eq!(LogFormat::default().to_string(), "pretty");
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        let first = init_tracing(LogFormat::Pretty);
        let second = init_tracing(LogFormat::Json);
        assert_eq!(first, second);
    }
}
