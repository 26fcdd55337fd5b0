//! Diagnostic logging setup.
//!
//! Tenaz only emits `tracing` events. Runners that do not install their own
//! subscriber can call [`init_logging`].

use crate::result::{TenazError, TenazResult};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::{fmt as fmt_layer, prelude::*, EnvFilter};

/// Default filter directive when `RUST_LOG` is unset
pub const DEFAULT_DIRECTIVE: &str = "tenaz=info";

/// Output format for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-line
    #[default]
    Pretty,
    /// One line per event
    Compact,
    /// Newline-delimited JSON
    Json,
}

impl LogFormat {
    /// Config-file spelling
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        }
    }
}

impl FromStr for LogFormat {
    type Err = TenazError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(TenazError::config(
                "logging.format",
                format!("unknown format '{other}' (expected pretty, compact or json)"),
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the filter: `RUST_LOG` when set and valid, else `default_directive`
pub fn env_filter(default_directive: &str) -> TenazResult<EnvFilter> {
    EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(default_directive)
            .map_err(|e| TenazError::config("logging.directive", e.to_string()))
    })
}

/// Install a global `fmt` subscriber.
///
/// Returns `false` when a subscriber was already installed; that is not an
/// error, so test binaries can call this from every test.
pub fn init_logging(format: LogFormat, default_directive: &str) -> TenazResult<bool> {
    let filter = env_filter(default_directive)?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Pretty => registry.with(fmt_layer::layer().pretty()).try_init(),
        LogFormat::Compact => registry
            .with(fmt_layer::layer().compact().with_thread_names(true))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt_layer::layer().json().with_current_span(false))
            .try_init(),
    };
    Ok(installed.is_ok())
}
