//! Tenaz: resilient UI-test interactions and failure-aware reporting
//!
//! Tenaz (Spanish: "tenacious") sits between test bodies and a browser
//! driver. It waits for the page instead of sleeping, retries a failed native
//! interaction once through a script, and records every outcome in one
//! combined report with screenshots and stack traces attached.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        TENAZ Architecture                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  test body ──► Interactor ──► Waiter ──► UiDriver                │
//! │                    │ failure                                     │
//! │                    ▼                                             │
//! │  TestHarness ──► ExecutionListener ──► ReportingPipeline         │
//! │                                         │           │            │
//! │                             TestContextRegistry  ArtifactCapture │
//! │                                         │                        │
//! │                                     ReportSink ──► HTML / JUnit  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use tenaz::{Interactor, Locator, MockDriver, MockElement, WaitPolicy};
//!
//! let driver = MockDriver::new();
//! let email = Locator::id("input-email");
//! driver.add_element(MockElement::new(email.clone()));
//!
//! let policy = WaitPolicy::from_millis(1_000, 50)?;
//! Interactor::new(&driver, policy).type_text(&email, "ada@example.com")?;
//! assert_eq!(driver.value_of(&email).as_deref(), Some("ada@example.com"));
//! # Ok::<(), tenaz::TenazError>(())
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::missing_const_for_fn
)]
mod artifact;
#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::doc_markdown
)]
mod config;
#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::missing_const_for_fn,
    clippy::doc_markdown,
    clippy::cast_possible_truncation
)]
mod driver;
mod event;
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
mod harness;
#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::missing_const_for_fn,
    clippy::doc_markdown
)]
mod interaction;
mod listener;
mod locator;
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
mod pipeline;
mod registry;
#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::format_push_string,
    clippy::needless_raw_string_hashes
)]
mod reporter;
mod result;
#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::missing_const_for_fn,
    clippy::doc_markdown
)]
mod wait;

/// Diagnostic logging setup
#[allow(clippy::missing_errors_doc)]
pub mod logging;

pub use artifact::{sanitize_label, ArtifactCapture, DEFAULT_ARTIFACT_DIR};
pub use config::{ConfigSource, HarnessConfig};
pub use driver::{
    ElementHandle, ElementState, MockDriver, MockElement, Screenshot, ScriptArg, UiDriver,
};
pub use event::{Artifact, ArtifactKind, EventKind, ReportEvent, TestStatus};
pub use harness::{
    CaseContext, SuiteResults, TestBody, TestCase, TestFailure, TestHarness, TestResult,
    TestSuite,
};
pub use interaction::{missing_options, Interactor};
pub use listener::{panic_message, ExecutionListener, HasDriverHandle, DIAGNOSTIC_LABEL};
pub use locator::{BoundingBox, InteractionTarget, Locator, Strategy};
pub use logging::{init_logging, LogFormat};
pub use pipeline::{ReportingPipeline, SinkLifecycle};
pub use registry::{ContextKey, TestContext, TestContextRegistry};
pub use reporter::{
    NodeHandle, ReportNode, ReportSettings, ReportSink, DEFAULT_REPORT_PATH, DEFAULT_REPORT_TITLE,
};
pub use result::{error_chain, FailureKind, TenazError, TenazResult};
pub use wait::{
    await_condition, FluentWait, Probe, WaitPolicy, Waiter, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_WAIT_TIMEOUT_MS, READY_STATE_SCRIPT,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::artifact::*;
    pub use super::config::*;
    pub use super::driver::*;
    pub use super::event::*;
    pub use super::harness::*;
    pub use super::interaction::*;
    pub use super::listener::*;
    pub use super::locator::*;
    pub use super::logging::{init_logging, LogFormat};
    pub use super::pipeline::*;
    pub use super::registry::*;
    pub use super::reporter::*;
    pub use super::result::*;
    pub use super::wait::*;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    mod prelude_tests {
        use super::*;

        #[test]
        fn test_prelude_exposes_core_types() {
            use crate::prelude::*;
            let _policy: WaitPolicy = WaitPolicy::default();
            let _locator: Locator = Locator::css("#content");
            let _status = TestStatus::Passed;
        }
    }

    mod flow_tests {
        use super::*;

        #[test]
        fn test_registration_flow_end_to_end() {
            let tmp = tempfile::TempDir::new().unwrap();
            let pipeline = Arc::new(ReportingPipeline::new(
                ReportSettings::new(tmp.path().join("TestReport.html")),
                ArtifactCapture::new(tmp.path().join("screenshots")),
            ));
            let listener = ExecutionListener::new(Arc::clone(&pipeline));

            let driver = Arc::new(MockDriver::new());
            driver.set_title("Register Account");
            driver.add_element(
                MockElement::new(Locator::id("input-firstname"))
                    .appear_after(Duration::from_millis(30)),
            );
            driver.add_element(MockElement::new(Locator::css("button[type=submit]")).fail_native_clicks(1));

            let mut suite = TestSuite::new("registration");
            suite.add_test(
                TestCase::new("register_new_account", |ctx| {
                    let ui = ctx.interactor(WaitPolicy::from_millis(500, 10)?)?;
                    ui.waiter().title_contains("Register")?;
                    ui.fill(Locator::id("input-firstname"), "Ada")?;
                    ui.submit(Locator::css("button[type=submit]"))?;
                    Ok(())
                })
                .with_description("new customer can register")
                .with_driver(driver.clone()),
            );

            let results = TestHarness::new().run(&suite, &listener);
            assert!(results.all_passed(), "{:?}", results.failures());
            assert_eq!(driver.script_clicks(&Locator::css("button[type=submit]")), 1);

            let html = std::fs::read_to_string(tmp.path().join("TestReport.html")).unwrap();
            assert!(html.contains("register_new_account"));
            assert!(html.contains("Submitted via css=button[type=submit]"));
        }
    }
}
