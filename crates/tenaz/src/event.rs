//! Report events and the artifacts they reference.
//!
//! Events are append-only once emitted. Artifacts are files on disk that an
//! event points at; the event never owns the file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Kind of a report event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    /// A step or test passed
    Pass,
    /// A step or test failed
    Fail,
    /// Informational step
    Info,
    /// Something worth a look, not a failure
    Warn,
    /// The test was not run
    Skip,
}

impl EventKind {
    /// Uppercase label shown in reports
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Skip => "SKIP",
        }
    }

    /// CSS class used by the HTML report
    #[must_use]
    pub const fn css_class(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of file an artifact is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// PNG screenshot
    Image,
    /// Plain text (stack traces, diagnostics)
    Text,
}

/// A diagnostic file referenced from a report event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// File kind
    pub kind: ArtifactKind,
    /// Where the file was written
    pub path: PathBuf,
    /// Event this artifact is attached to, once attached
    pub event_id: Option<Uuid>,
}

impl Artifact {
    /// Screenshot artifact
    #[must_use]
    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ArtifactKind::Image,
            path: path.into(),
            event_id: None,
        }
    }

    /// Text artifact
    #[must_use]
    pub fn text(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ArtifactKind::Text,
            path: path.into(),
            event_id: None,
        }
    }

    /// File name for link labels
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Path as stored
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// One entry in a test's event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEvent {
    /// Unique event id
    pub id: Uuid,
    /// Event kind
    pub kind: EventKind,
    /// Message body (may span lines for failures)
    pub message: String,
    /// Attached artifacts
    pub artifacts: Vec<Artifact>,
    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
}

impl ReportEvent {
    /// Create an event stamped now
    #[must_use]
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            artifacts: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach an artifact, binding it to this event
    #[must_use]
    pub fn with_artifact(mut self, mut artifact: Artifact) -> Self {
        artifact.event_id = Some(self.id);
        self.artifacts.push(artifact);
        self
    }

    /// Attach an artifact if one was produced
    #[must_use]
    pub fn with_optional_artifact(self, artifact: Option<Artifact>) -> Self {
        match artifact {
            Some(artifact) => self.with_artifact(artifact),
            None => self,
        }
    }
}

/// Outcome of one test, derived from its events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestStatus {
    /// No failure and not skipped
    Passed,
    /// At least one FAIL event
    Failed,
    /// Skipped without failure
    Skipped,
}

impl TestStatus {
    /// Any FAIL wins, then any SKIP, otherwise passed
    #[must_use]
    pub fn from_events(events: &[ReportEvent]) -> Self {
        if events.iter().any(|e| e.kind == EventKind::Fail) {
            Self::Failed
        } else if events.iter().any(|e| e.kind == EventKind::Skip) {
            Self::Skipped
        } else {
            Self::Passed
        }
    }

    /// Check if status is passing
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Check if status is failing
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Lowercase label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_artifact_binds_event_id() {
        let event = ReportEvent::new(EventKind::Fail, "boom")
            .with_artifact(Artifact::image("reports/screenshots/login_20240101120000000.png"));
        assert_eq!(event.artifacts.len(), 1);
        assert_eq!(event.artifacts[0].event_id, Some(event.id));
        assert_eq!(event.artifacts[0].file_name(), "login_20240101120000000.png");
    }

    #[test]
    fn test_optional_artifact_none_attaches_nothing() {
        let event = ReportEvent::new(EventKind::Fail, "boom").with_optional_artifact(None);
        assert!(event.artifacts.is_empty());
    }

    #[test]
    fn test_status_precedence() {
        let pass = ReportEvent::new(EventKind::Pass, "ok");
        let skip = ReportEvent::new(EventKind::Skip, "no data");
        let fail = ReportEvent::new(EventKind::Fail, "boom");

        assert_eq!(TestStatus::from_events(&[]), TestStatus::Passed);
        assert_eq!(TestStatus::from_events(&[pass.clone()]), TestStatus::Passed);
        assert_eq!(
            TestStatus::from_events(&[pass.clone(), skip.clone()]),
            TestStatus::Skipped
        );
        assert_eq!(TestStatus::from_events(&[skip, fail, pass]), TestStatus::Failed);
    }

    #[test]
    fn test_kind_serializes_uppercase() {
        let json = serde_json::to_string(&EventKind::Warn).unwrap();
        assert_eq!(json, "\"WARN\"");
    }
}
