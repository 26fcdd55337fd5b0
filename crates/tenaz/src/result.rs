//! Result and error types for Tenaz.
//!
//! Errors fall into two groups. Correctness failures (`Timeout`,
//! `InteractionFailure`, `AssertionFailed`) propagate to the test body
//! unmodified. Diagnostics failures (`CaptureFailure`) are absorbed by the
//! component that produced them and only ever show up in logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for Tenaz operations
pub type TenazResult<T> = Result<T, TenazError>;

/// Classification of a driver-side failure.
///
/// A [`WaitPolicy`](crate::WaitPolicy) matches against these kinds to decide
/// which failures mean "not ready yet" during polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// No element matched the locator
    NoSuchElement,
    /// The element handle no longer refers to a node in the document
    StaleElement,
    /// The element exists but cannot receive input
    NotInteractable,
    /// Another element would receive the click
    ClickIntercepted,
    /// Script execution raised an error
    Script,
    /// Navigation did not complete
    Navigation,
    /// Screenshot could not be produced
    Screenshot,
    /// The browser session is gone
    SessionClosed,
    /// Anything the driver could not classify
    Other,
}

impl FailureKind {
    /// Stable lowercase name used in logs and reports
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoSuchElement => "no-such-element",
            Self::StaleElement => "stale-element",
            Self::NotInteractable => "not-interactable",
            Self::ClickIntercepted => "click-intercepted",
            Self::Script => "script",
            Self::Navigation => "navigation",
            Self::Screenshot => "screenshot",
            Self::SessionClosed => "session-closed",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in Tenaz
#[derive(Debug, Error)]
pub enum TenazError {
    /// A wait condition never became ready within its policy
    #[error("Timed out after {ms}ms waiting for {waited_for}{}", last_error_suffix(.last_error))]
    Timeout {
        /// Description of what was awaited
        waited_for: String,
        /// Timeout in milliseconds
        ms: u64,
        /// Last transient failure swallowed while polling
        last_error: Option<String>,
    },

    /// Both the native and the script-level interaction failed
    #[error("Interaction with {target} failed (native attempt: {native_error})")]
    InteractionFailure {
        /// Description of the target element
        target: String,
        /// Error from the native attempt
        native_error: String,
        /// Error from the fallback attempt
        #[source]
        cause: Box<TenazError>,
    },

    /// Screenshot or report write failed
    #[error("Capture failed: {message}")]
    CaptureFailure {
        /// Error message
        message: String,
    },

    /// Missing or malformed setting
    #[error("Configuration error for '{key}': {message}")]
    Configuration {
        /// Offending key
        key: String,
        /// Error message
        message: String,
    },

    /// Failure reported by the UI driver
    #[error("Driver error ({kind}): {message}")]
    Driver {
        /// Failure classification
        kind: FailureKind,
        /// Error message
        message: String,
    },

    /// Assertion failed
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// Operation called in the wrong lifecycle state
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

/// Message of `error` followed by one `Caused by:` line per source
#[must_use]
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str("\nCaused by: ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_ref()
        .map(|e| format!(" (last error: {e})"))
        .unwrap_or_default()
}

impl TenazError {
    /// Create a driver error
    #[must_use]
    pub fn driver(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Driver {
            kind,
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create an assertion error
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a capture error
    #[must_use]
    pub fn capture(message: impl Into<String>) -> Self {
        Self::CaptureFailure {
            message: message.into(),
        }
    }

    /// Failure kind for driver errors, `None` otherwise
    #[must_use]
    pub const fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Driver { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether this is a wait timeout
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_without_last_error() {
        let err = TenazError::Timeout {
            waited_for: "visibility of css=#login".into(),
            ms: 2000,
            last_error: None,
        };
        assert_eq!(
            err.to_string(),
            "Timed out after 2000ms waiting for visibility of css=#login"
        );
    }

    #[test]
    fn test_timeout_message_with_last_error() {
        let err = TenazError::Timeout {
            waited_for: "x".into(),
            ms: 10,
            last_error: Some("stale".into()),
        };
        assert!(err.to_string().ends_with("(last error: stale)"));
    }

    #[test]
    fn test_kind_only_for_driver_errors() {
        let err = TenazError::driver(FailureKind::StaleElement, "detached");
        assert_eq!(err.kind(), Some(FailureKind::StaleElement));
        assert_eq!(TenazError::assertion("nope").kind(), None);
    }

    #[test]
    fn test_interaction_failure_keeps_cause() {
        let err = TenazError::InteractionFailure {
            target: "css=#submit".into(),
            native_error: "intercepted".into(),
            cause: Box::new(TenazError::driver(FailureKind::Script, "boom")),
        };
        let text = err.to_string();
        assert!(text.contains("css=#submit"));
        assert!(text.contains("intercepted"));
        assert!(!text.contains("boom"));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "Driver error (script): boom");
    }

    #[test]
    fn test_error_chain_lists_causes() {
        let err = TenazError::InteractionFailure {
            target: "css=#submit".into(),
            native_error: "intercepted".into(),
            cause: Box::new(TenazError::driver(FailureKind::Script, "boom")),
        };
        let chain = error_chain(&err);
        let lines: Vec<_> = chain.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "Interaction with css=#submit failed (native attempt: intercepted)"
        );
        assert_eq!(lines[1], "Caused by: Driver error (script): boom");
        assert_eq!(chain.matches("boom").count(), 1);
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::NoSuchElement.to_string(), "no-such-element");
        assert_eq!(FailureKind::ClickIntercepted.as_str(), "click-intercepted");
    }

    #[test]
    fn test_config_error_names_key() {
        let err = TenazError::config("wait.timeout_ms", "must be positive");
        assert!(err.to_string().contains("wait.timeout_ms"));
    }
}
