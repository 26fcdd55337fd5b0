//! Reporting pipeline.
//!
//! Owns the run's single [`ReportSink`] and routes events to the report node
//! of the calling test.
//!
//! ```text
//!   Uninitialized ──(first start_test / ensure_active)──► Active
//!   Active ──(flush)──► Flushed            (flush again: no-op)
//! ```
//!
//! The sink lock is taken exclusively only to create nodes and to flush.
//! Appending an event holds it shared, so appends from different tests run
//! side by side while a flush waits for in-flight appends to land.
//!
//! Construct one pipeline per run and share it by reference (usually behind
//! an `Arc`); there is no process-global instance.

use crate::artifact::ArtifactCapture;
use crate::config::HarnessConfig;
use crate::driver::UiDriver;
use crate::event::{EventKind, ReportEvent};
use crate::registry::{ContextKey, TestContext, TestContextRegistry};
use crate::reporter::{ReportSettings, ReportSink};
use crate::result::{error_chain, TenazError, TenazResult};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// Lifecycle stage of the report sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkLifecycle {
    /// No sink constructed yet
    Uninitialized,
    /// Accepting nodes and events
    Active,
    /// Written; further events are dropped
    Flushed,
}

#[derive(Debug)]
enum SinkState {
    Uninitialized,
    Active(ReportSink),
    Flushed { path: PathBuf, tests: usize },
}

/// Report-node lifecycle and event routing for one run
#[derive(Debug)]
pub struct ReportingPipeline {
    settings: ReportSettings,
    capture: ArtifactCapture,
    registry: TestContextRegistry,
    sink: RwLock<SinkState>,
    flushed: AtomicBool,
}

impl ReportingPipeline {
    /// Create a pipeline; the sink itself is built on first use
    #[must_use]
    pub fn new(settings: ReportSettings, capture: ArtifactCapture) -> Self {
        Self {
            settings,
            capture,
            registry: TestContextRegistry::new(),
            sink: RwLock::new(SinkState::Uninitialized),
            flushed: AtomicBool::new(false),
        }
    }

    /// Pipeline writing where `config` says
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(config.report_settings(), config.artifact_capture())
    }

    /// Artifact writer used for attachments
    #[must_use]
    pub const fn capture(&self) -> &ArtifactCapture {
        &self.capture
    }

    /// Context registry
    #[must_use]
    pub const fn registry(&self) -> &TestContextRegistry {
        &self.registry
    }

    /// Current lifecycle stage
    #[must_use]
    pub fn lifecycle(&self) -> SinkLifecycle {
        match *self.sink.read() {
            SinkState::Uninitialized => SinkLifecycle::Uninitialized,
            SinkState::Active(_) => SinkLifecycle::Active,
            SinkState::Flushed { .. } => SinkLifecycle::Flushed,
        }
    }

    /// Whether the report has been written
    #[must_use]
    pub fn is_flushed(&self) -> bool {
        self.flushed.load(Ordering::Acquire)
    }

    /// Construct the sink if needed; fails once flushed
    pub fn ensure_active(&self) -> TenazResult<()> {
        let mut state = self.sink.write();
        self.activate(&mut state).map(|_| ())
    }

    fn activate<'s>(&self, state: &'s mut SinkState) -> TenazResult<&'s mut ReportSink> {
        if matches!(state, SinkState::Uninitialized) {
            info!(path = %self.settings.path.display(), "report sink created");
            *state = SinkState::Active(ReportSink::new(self.settings.clone()));
        }
        match state {
            SinkState::Active(sink) => Ok(sink),
            SinkState::Flushed { path, .. } => Err(TenazError::invalid_state(format!(
                "report already flushed to {}",
                path.display()
            ))),
            SinkState::Uninitialized => Err(TenazError::invalid_state("report sink missing")),
        }
    }

    /// Start a test on the calling thread, replacing its previous context
    pub fn start_test(&self, name: &str, description: Option<&str>) -> TenazResult<TestContext> {
        self.start_test_for(ContextKey::current(), name, description)
    }

    /// Start a test on an explicit context key
    pub fn start_test_for(
        &self,
        key: ContextKey,
        name: &str,
        description: Option<&str>,
    ) -> TenazResult<TestContext> {
        let node = {
            let mut state = self.sink.write();
            self.activate(&mut state)?
                .create_node(name, description.map(str::to_string))
        };
        info!(test = name, context = %key, "report node created");
        Ok(self.registry.start_for(key, node))
    }

    /// Context of the calling thread
    #[must_use]
    pub fn current(&self) -> Option<TestContext> {
        self.registry.current()
    }

    /// Append an event to the calling thread's node
    pub fn log_event(&self, event: ReportEvent) {
        self.log_event_for(&ContextKey::current(), event);
    }

    /// Append an event to the node bound to `key`.
    ///
    /// Without a bound node, or after flush, the event is dropped with a
    /// warning.
    pub fn log_event_for(&self, key: &ContextKey, event: ReportEvent) {
        let state = self.sink.read();
        if matches!(*state, SinkState::Flushed { .. }) {
            warn!(kind = %event.kind, message = %event.message, "report already flushed, event dropped");
            return;
        }
        match self.registry.current_for(key) {
            Some(context) => {
                debug!(test = context.name(), kind = %event.kind, "event recorded");
                context.node.append(event);
            }
            None => {
                warn!(context = %key, kind = %event.kind, message = %event.message, "no active test, event dropped");
            }
        }
        // Held until the event has landed so a flush cannot slip in between
        drop(state);
    }

    /// Record a PASS event
    pub fn log_pass(&self, message: impl Into<String>) {
        self.log_event(ReportEvent::new(EventKind::Pass, message));
    }

    /// Record an INFO event
    pub fn log_info(&self, message: impl Into<String>) {
        self.log_event(ReportEvent::new(EventKind::Info, message));
    }

    /// Record a WARN event
    pub fn log_warn(&self, message: impl Into<String>) {
        self.log_event(ReportEvent::new(EventKind::Warn, message));
    }

    /// Record a SKIP event
    pub fn log_skip(&self, message: impl Into<String>) {
        self.log_event(ReportEvent::new(EventKind::Skip, message));
    }

    fn screenshot_label(&self, suffix: &str) -> String {
        self.current()
            .map_or_else(|| suffix.to_string(), |c| format!("{}_{suffix}", c.name()))
    }

    /// Record a FAIL event, with a screenshot when a driver is supplied
    pub fn log_fail(&self, message: impl Into<String>, driver: Option<&dyn UiDriver>) {
        let mut event = ReportEvent::new(EventKind::Fail, message);
        if driver.is_some() && !self.is_flushed() {
            let label = self.screenshot_label("failure");
            event = event.with_optional_artifact(self.capture.capture_screenshot(driver, &label));
        }
        self.log_event(event);
    }

    /// Record a FAIL event for `error`.
    ///
    /// The body is the message plus its cause chain; the same text is also
    /// stored as a text attachment, next to an optional screenshot.
    pub fn log_failure(
        &self,
        error: &(dyn std::error::Error + 'static),
        driver: Option<&dyn UiDriver>,
    ) {
        let body = error_chain(error);
        let mut event = ReportEvent::new(EventKind::Fail, body.clone());
        if !self.is_flushed() {
            if driver.is_some() {
                let label = self.screenshot_label("failure");
                event =
                    event.with_optional_artifact(self.capture.capture_screenshot(driver, &label));
            }
            let label = self.screenshot_label("stacktrace");
            event = event.with_optional_artifact(self.capture.write_text(&label, &body));
        }
        self.log_event(event);
    }

    /// Record an INFO step with a screenshot.
    ///
    /// When capture is impossible the reason is appended to the message.
    pub fn log_info_with_screenshot(&self, message: &str, driver: Option<&dyn UiDriver>) {
        let label = self.screenshot_label("step");
        let event = match driver {
            None => ReportEvent::new(
                EventKind::Info,
                format!("{message} [screenshot unavailable: no driver]"),
            ),
            Some(driver) => match self.capture.try_capture_screenshot(driver, &label) {
                Ok(artifact) => ReportEvent::new(EventKind::Info, message).with_artifact(artifact),
                Err(err) => {
                    warn!(error = %err, "step screenshot failed");
                    ReportEvent::new(
                        EventKind::Info,
                        format!("{message} [screenshot failed: {err}]"),
                    )
                }
            },
        };
        self.log_event(event);
    }

    /// Attach a text file to the calling thread's node as an INFO event
    pub fn attach_text(&self, label: &str, text: &str) {
        let event = ReportEvent::new(EventKind::Info, label)
            .with_optional_artifact(self.capture.write_text(label, text));
        self.log_event(event);
    }

    /// Run `f` against the active sink, if there is one
    pub fn with_sink<R>(&self, f: impl FnOnce(&ReportSink) -> R) -> Option<R> {
        match &*self.sink.read() {
            SinkState::Active(sink) => Some(f(sink)),
            _ => None,
        }
    }

    /// Write the combined report.
    ///
    /// Idempotent: once written, later calls return the same path without
    /// touching the file. A write failure is logged, leaves the sink active
    /// so a later flush can retry, and yields `None`.
    pub fn flush(&self) -> Option<PathBuf> {
        let mut state = self.sink.write();
        if let SinkState::Flushed { path, .. } = &*state {
            debug!(path = %path.display(), "report already flushed");
            return Some(path.clone());
        }
        let sink = match self.activate(&mut state) {
            Ok(sink) => sink,
            Err(err) => {
                error!(error = %err, "report sink unavailable");
                return None;
            }
        };
        match sink.write() {
            Ok(path) => {
                let tests = sink.total_count();
                info!(
                    path = %path.display(),
                    tests,
                    passed = sink.passed_count(),
                    failed = sink.failed_count(),
                    "report flushed"
                );
                *state = SinkState::Flushed {
                    path: path.clone(),
                    tests,
                };
                self.flushed.store(true, Ordering::Release);
                Some(path)
            }
            Err(err) => {
                let err = TenazError::capture(format!("report write failed: {err}"));
                error!(error = %err, "report not written");
                None
            }
        }
    }

    /// Number of tests in the written report, once flushed
    #[must_use]
    pub fn flushed_test_count(&self) -> Option<usize> {
        match &*self.sink.read() {
            SinkState::Flushed { tests, .. } => Some(*tests),
            _ => None,
        }
    }
}
