//! Execution listener.
//!
//! Turns suite and test lifecycle callbacks into report operations. The
//! runner calls these hooks; test bodies never do. No callback lets an error
//! or panic escape: internal failures are logged and attached to the current
//! node as a "listener diagnostic" text artifact instead.

use crate::driver::{MockDriver, UiDriver};
use crate::pipeline::ReportingPipeline;
use crate::result::{error_chain, TenazResult};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Label of the text artifact recording listener-internal failures
pub const DIAGNOSTIC_LABEL: &str = "listener diagnostic";

/// Anything that may own a live driver session
///
/// Test fixtures implement this so failure screenshots can be taken.
pub trait HasDriverHandle {
    /// The driver, when a session is open
    fn driver_handle(&self) -> Option<&dyn UiDriver>;
}

impl HasDriverHandle for Arc<dyn UiDriver> {
    fn driver_handle(&self) -> Option<&dyn UiDriver> {
        Some(self.as_ref())
    }
}

impl HasDriverHandle for MockDriver {
    fn driver_handle(&self) -> Option<&dyn UiDriver> {
        Some(self)
    }
}

impl<T: HasDriverHandle> HasDriverHandle for Option<T> {
    fn driver_handle(&self) -> Option<&dyn UiDriver> {
        self.as_ref().and_then(HasDriverHandle::driver_handle)
    }
}

/// Lifecycle hooks driving a [`ReportingPipeline`]
#[derive(Debug, Clone)]
pub struct ExecutionListener {
    pipeline: Arc<ReportingPipeline>,
}

impl ExecutionListener {
    /// Listener reporting into `pipeline`
    #[must_use]
    pub const fn new(pipeline: Arc<ReportingPipeline>) -> Self {
        Self { pipeline }
    }

    /// Pipeline events are routed to
    #[must_use]
    pub fn pipeline(&self) -> &Arc<ReportingPipeline> {
        &self.pipeline
    }

    /// Suite started: make sure the report sink exists
    pub fn on_suite_start(&self, suite: &str) {
        info!(suite, "test suite started");
        self.guard("suite start", || self.pipeline.ensure_active());
    }

    /// Suite finished: write the report; returns its path
    pub fn on_suite_finish(&self, suite: &str) -> Option<PathBuf> {
        info!(suite, "test suite finished");
        let mut written = None;
        self.guard("suite finish", || {
            written = self.pipeline.flush();
            Ok(())
        });
        written
    }

    /// Test started on the calling thread
    pub fn on_test_start(&self, name: &str, description: Option<&str>) {
        info!(test = name, "test started");
        self.guard("test start", || {
            self.pipeline.start_test(name, description).map(|_| ())
        });
    }

    /// Test body returned normally
    pub fn on_test_success(&self, name: &str) {
        info!(test = name, "test passed");
        self.guard("test success", || {
            self.pipeline.log_pass("Test passed");
            Ok(())
        });
    }

    /// Test body failed.
    ///
    /// A screenshot is attached when `owner` has an open driver session.
    pub fn on_test_failure(
        &self,
        name: &str,
        failure: &(dyn std::error::Error + 'static),
        owner: Option<&dyn HasDriverHandle>,
    ) {
        info!(test = name, error = %failure, "test failed");
        self.guard("test failure", || {
            let driver = owner.and_then(HasDriverHandle::driver_handle);
            if owner.is_some() && driver.is_none() {
                info!(test = name, "no driver session, failure recorded without screenshot");
            }
            self.pipeline.log_failure(failure, driver);
            Ok(())
        });
    }

    /// Test skipped, with the reason
    pub fn on_test_skipped(&self, name: &str, reason: &str) {
        info!(test = name, reason, "test skipped");
        self.guard("test skipped", || {
            self.pipeline.log_skip(format!("Test skipped: {reason}"));
            Ok(())
        });
    }

    fn guard(&self, callback: &str, f: impl FnOnce() -> TenazResult<()>) {
        let text = match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => return,
            Ok(Err(err)) => format!("{callback} callback failed: {}", error_chain(&err)),
            Err(payload) => format!("{callback} callback panicked: {}", panic_message(&*payload)),
        };
        error!(callback, "{text}");
        let attached = catch_unwind(AssertUnwindSafe(|| {
            self.pipeline.attach_text(DIAGNOSTIC_LABEL, &text);
        }));
        if attached.is_err() {
            error!(callback, "listener diagnostic could not be attached");
        }
    }
}

/// Text carried by a panic payload
#[must_use]
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
