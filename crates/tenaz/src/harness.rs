//! Test harness for running test suites.
//!
//! A minimal runner that owns the lifecycle callbacks: it calls the
//! [`ExecutionListener`] around every case, so reporting happens whether the
//! body passes, fails, or panics.

use crate::driver::UiDriver;
use crate::event::TestStatus;
use crate::interaction::Interactor;
use crate::listener::{panic_message, ExecutionListener, HasDriverHandle};
use crate::pipeline::ReportingPipeline;
use crate::result::TenazError;
use crate::wait::WaitPolicy;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Body of a test case
pub type TestBody = Arc<dyn Fn(&CaseContext<'_>) -> Result<(), TestFailure> + Send + Sync>;

/// Why a test body failed
#[derive(Debug)]
pub struct TestFailure {
    message: String,
    cause: Option<TenazError>,
}

impl TestFailure {
    /// Failure with a plain message
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Failure recorded from a panic inside the body
    #[must_use]
    pub fn panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        Self::new(format!("test panicked: {}", panic_message(payload)))
    }

    /// Failure message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Underlying library error, if any
    #[must_use]
    pub const fn cause(&self) -> Option<&TenazError> {
        self.cause.as_ref()
    }
}

// A failure wrapping a library error is transparent: it shows the error's
// text and continues with the error's own sources.
impl fmt::Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => fmt::Display::fmt(cause, f),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for TestFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().and_then(std::error::Error::source)
    }
}

impl From<TenazError> for TestFailure {
    fn from(error: TenazError) -> Self {
        Self {
            message: error.to_string(),
            cause: Some(error),
        }
    }
}

/// What a running body can reach
pub struct CaseContext<'a> {
    name: &'a str,
    params: &'a [String],
    pipeline: &'a ReportingPipeline,
    driver: Option<&'a dyn UiDriver>,
}

impl fmt::Debug for CaseContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaseContext")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("has_driver", &self.driver.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> CaseContext<'a> {
    /// Case name
    #[must_use]
    pub const fn name(&self) -> &'a str {
        self.name
    }

    /// Parameter row for data-driven cases, empty otherwise
    #[must_use]
    pub const fn params(&self) -> &'a [String] {
        self.params
    }

    /// Parameter at `index`
    #[must_use]
    pub fn param(&self, index: usize) -> Option<&'a str> {
        self.params.get(index).map(String::as_str)
    }

    /// Pipeline for step-level events
    #[must_use]
    pub const fn pipeline(&self) -> &'a ReportingPipeline {
        self.pipeline
    }

    /// Driver attached to the case
    #[must_use]
    pub fn driver(&self) -> Option<&'a dyn UiDriver> {
        self.driver
    }

    /// Reporting interactor over the case's driver
    pub fn interactor(&self, policy: WaitPolicy) -> Result<Interactor<'a>, TestFailure> {
        let driver = self
            .driver
            .ok_or_else(|| TestFailure::new(format!("{} has no driver attached", self.name)))?;
        Ok(Interactor::new(driver, policy).with_pipeline(self.pipeline))
    }
}

/// A test suite containing multiple tests
#[derive(Debug, Clone)]
pub struct TestSuite {
    /// Suite name
    pub name: String,
    /// Tests in this suite
    pub tests: Vec<TestCase>,
}

impl TestSuite {
    /// Create a new test suite
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tests: Vec::new(),
        }
    }

    /// Add a test case
    pub fn add_test(&mut self, test: TestCase) {
        self.tests.push(test);
    }

    /// Add one case per parameter row, named `name[i]`.
    ///
    /// Every generated case shares `template`'s body, description, driver
    /// and skip reason.
    pub fn add_parameterized<I, R, S>(&mut self, template: &TestCase, rows: I)
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for (index, row) in rows.into_iter().enumerate() {
            let mut case = template.clone();
            case.name = format!("{}[{index}]", template.name);
            case.params = row.into_iter().map(Into::into).collect();
            self.tests.push(case);
        }
    }

    /// Get the number of tests
    #[must_use]
    pub fn test_count(&self) -> usize {
        self.tests.len()
    }
}

/// A single test case
#[derive(Clone)]
pub struct TestCase {
    /// Test name
    pub name: String,
    /// Optional human description shown in the report
    pub description: Option<String>,
    /// Parameter row
    pub params: Vec<String>,
    /// Driver screenshots are taken from on failure
    pub driver: Option<Arc<dyn UiDriver>>,
    /// Skip reason; the body never runs when set
    pub skip: Option<String>,
    body: TestBody,
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("params", &self.params)
            .field("has_driver", &self.driver.is_some())
            .field("skip", &self.skip)
            .finish_non_exhaustive()
    }
}

impl TestCase {
    /// Create a new test case
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(&CaseContext<'_>) -> Result<(), TestFailure> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            params: Vec::new(),
            driver: None,
            skip: None,
            body: Arc::new(body),
        }
    }

    /// Set description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a driver
    #[must_use]
    pub fn with_driver(mut self, driver: Arc<dyn UiDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Mark as skipped
    #[must_use]
    pub fn skipped(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }
}

/// Result of running a single test
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test name
    pub name: String,
    /// Outcome
    pub status: TestStatus,
    /// Error message if failed
    pub error: Option<String>,
    /// Test duration
    pub duration: Duration,
}

impl TestResult {
    /// Create a passing test result
    #[must_use]
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Passed,
            error: None,
            duration: Duration::ZERO,
        }
    }

    /// Create a failing test result
    #[must_use]
    pub fn fail(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Failed,
            error: Some(error.into()),
            duration: Duration::ZERO,
        }
    }

    /// Create a skipped test result
    #[must_use]
    pub fn skip(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Skipped,
            error: None,
            duration: Duration::ZERO,
        }
    }

    /// Set duration
    #[must_use]
    pub const fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Whether the test passed
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.status.is_passed()
    }
}

/// Results from running a test suite
#[derive(Debug, Clone)]
pub struct SuiteResults {
    /// Suite name
    pub suite_name: String,
    /// Individual test results, in suite order
    pub results: Vec<TestResult>,
    /// Total duration
    pub duration: Duration,
}

impl SuiteResults {
    /// Check if no test failed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| !r.status.is_failed())
    }

    /// Count passed tests
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.count(TestStatus::Passed)
    }

    /// Count failed tests
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(TestStatus::Failed)
    }

    /// Count skipped tests
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.count(TestStatus::Skipped)
    }

    fn count(&self, status: TestStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Get total test count
    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Get failed tests
    #[must_use]
    pub fn failures(&self) -> Vec<&TestResult> {
        self.results.iter().filter(|r| r.status.is_failed()).collect()
    }
}

/// Test harness for running suites
#[derive(Debug)]
pub struct TestHarness {
    /// Whether to stop on first failure
    pub fail_fast: bool,
    /// Worker threads; 1 runs sequentially on the calling thread
    pub workers: usize,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self {
            fail_fast: false,
            workers: 1,
        }
    }
}

impl TestHarness {
    /// Create a new test harness
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable fail-fast mode
    #[must_use]
    pub const fn with_fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }

    /// Run cases on `workers` threads
    #[must_use]
    pub fn with_parallel(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Run a test suite, reporting through `listener`.
    ///
    /// Cases not started because of fail-fast are absent from the results.
    pub fn run(&self, suite: &TestSuite, listener: &ExecutionListener) -> SuiteResults {
        let start = Instant::now();
        listener.on_suite_start(&suite.name);

        let results = if self.workers > 1 && suite.tests.len() > 1 {
            self.run_parallel(suite, listener)
        } else {
            self.run_sequential(suite, listener)
        };

        listener.on_suite_finish(&suite.name);
        SuiteResults {
            suite_name: suite.name.clone(),
            results,
            duration: start.elapsed(),
        }
    }

    fn run_sequential(&self, suite: &TestSuite, listener: &ExecutionListener) -> Vec<TestResult> {
        let mut results = Vec::with_capacity(suite.tests.len());
        for case in &suite.tests {
            let result = run_case(case, listener);
            let failed = result.status.is_failed();
            results.push(result);
            if failed && self.fail_fast {
                break;
            }
        }
        results
    }

    fn run_parallel(&self, suite: &TestSuite, listener: &ExecutionListener) -> Vec<TestResult> {
        let next = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let collected = Mutex::new(Vec::with_capacity(suite.tests.len()));
        let workers = self.workers.min(suite.tests.len());

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        if stop.load(Ordering::Acquire) {
                            break;
                        }
                        let index = next.fetch_add(1, Ordering::AcqRel);
                        let Some(case) = suite.tests.get(index) else {
                            break;
                        };
                        let result = run_case(case, listener);
                        if result.status.is_failed() && self.fail_fast {
                            stop.store(true, Ordering::Release);
                        }
                        collected.lock().push((index, result));
                    }
                    // The worker thread ends here; drop its registry entry
                    listener.pipeline().registry().end();
                });
            }
        });

        let mut collected = collected.into_inner();
        collected.sort_by_key(|(index, _)| *index);
        collected.into_iter().map(|(_, result)| result).collect()
    }
}

fn run_case(case: &TestCase, listener: &ExecutionListener) -> TestResult {
    let start = Instant::now();
    listener.on_test_start(&case.name, case.description.as_deref());

    if let Some(reason) = &case.skip {
        listener.on_test_skipped(&case.name, reason);
        return TestResult::skip(&case.name).with_duration(start.elapsed());
    }

    let context = CaseContext {
        name: &case.name,
        params: &case.params,
        pipeline: listener.pipeline(),
        driver: case.driver.as_deref(),
    };
    let outcome = catch_unwind(AssertUnwindSafe(|| (case.body)(&context)))
        .unwrap_or_else(|payload| Err(TestFailure::panicked(&*payload)));

    let result = match outcome {
        Ok(()) => {
            listener.on_test_success(&case.name);
            TestResult::pass(&case.name)
        }
        Err(failure) => {
            let owner = case.driver.as_ref().map(|d| d as &dyn HasDriverHandle);
            listener.on_test_failure(&case.name, &failure, owner);
            TestResult::fail(&case.name, failure.to_string())
        }
    };
    result.with_duration(start.elapsed())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactCapture;
    use crate::reporter::ReportSettings;
    use tempfile::TempDir;

    fn listener(tmp: &TempDir) -> ExecutionListener {
        ExecutionListener::new(Arc::new(ReportingPipeline::new(
            ReportSettings::new(tmp.path().join("TestReport.html")),
            ArtifactCapture::new(tmp.path().join("screenshots")),
        )))
    }

    fn passing(name: &str) -> TestCase {
        TestCase::new(name, |_| Ok(()))
    }

    fn failing(name: &str) -> TestCase {
        TestCase::new(name, |_| Err(TestFailure::new("expected failure")))
    }

    mod suite_tests {
        use super::*;

        #[test]
        fn test_parameterized_names_and_rows() {
            let mut suite = TestSuite::new("login");
            let template = TestCase::new("login", |ctx| {
                if ctx.param(0).is_some() {
                    Ok(())
                } else {
                    Err(TestFailure::new("missing email"))
                }
            });
            suite.add_parameterized(
                &template,
                vec![vec!["a@example.com", "pw1"], vec!["b@example.com", "pw2"]],
            );
            assert_eq!(suite.test_count(), 2);
            assert_eq!(suite.tests[1].name, "login[1]");
            assert_eq!(suite.tests[1].params, vec!["b@example.com", "pw2"]);
        }

        #[test]
        fn test_failure_from_library_error_is_transparent() {
            use std::error::Error;
            let failure = TestFailure::from(TenazError::assertion("title mismatch"));
            assert!(failure.source().is_none());
            assert!(failure.cause().is_some());
            assert_eq!(failure.message(), "Assertion failed: title mismatch");
            assert_eq!(
                crate::result::error_chain(&failure),
                "Assertion failed: title mismatch"
            );
        }

        #[test]
        fn test_failure_chain_lists_interaction_cause_once() {
            let failure = TestFailure::from(TenazError::InteractionFailure {
                target: "css=#button-continue".into(),
                native_error: "click intercepted".into(),
                cause: Box::new(TenazError::driver(
                    crate::result::FailureKind::Script,
                    "overlay",
                )),
            });
            let chain = crate::result::error_chain(&failure);
            assert_eq!(chain.lines().count(), 2, "{chain}");
            assert_eq!(chain.matches("overlay").count(), 1);
            assert_eq!(chain.matches("click intercepted").count(), 1);
        }
    }

    mod run_tests {
        use super::*;

        #[test]
        fn test_sequential_run_counts() {
            let tmp = TempDir::new().unwrap();
            let listener = listener(&tmp);
            let mut suite = TestSuite::new("account");
            suite.add_test(passing("a"));
            suite.add_test(failing("b"));
            suite.add_test(passing("c").skipped("not ready"));

            let results = TestHarness::new().run(&suite, &listener);
            assert_eq!(results.total(), 3);
            assert_eq!(results.passed_count(), 1);
            assert_eq!(results.failed_count(), 1);
            assert_eq!(results.skipped_count(), 1);
            assert!(!results.all_passed());
            assert_eq!(results.failures()[0].name, "b");
            assert!(listener.pipeline().is_flushed());
        }

        #[test]
        fn test_fail_fast_stops() {
            let tmp = TempDir::new().unwrap();
            let listener = listener(&tmp);
            let mut suite = TestSuite::new("account");
            suite.add_test(failing("first"));
            suite.add_test(passing("second"));

            let results = TestHarness::new().with_fail_fast().run(&suite, &listener);
            assert_eq!(results.total(), 1);
        }

        #[test]
        fn test_panic_is_a_failure() {
            let tmp = TempDir::new().unwrap();
            let listener = listener(&tmp);
            let mut suite = TestSuite::new("account");
            suite.add_test(TestCase::new("explodes", |_| panic!("kaboom")));

            let results = TestHarness::new().run(&suite, &listener);
            let error = results.results[0].error.as_deref().unwrap();
            assert!(error.contains("kaboom"));
        }

        #[test]
        fn test_parallel_keeps_suite_order() {
            let tmp = TempDir::new().unwrap();
            let listener = listener(&tmp);
            let mut suite = TestSuite::new("parallel");
            for i in 0..12 {
                suite.add_test(TestCase::new(format!("case-{i}"), |ctx| {
                    ctx.pipeline().log_info(format!("running {}", ctx.name()));
                    std::thread::sleep(Duration::from_millis(5));
                    Ok(())
                }));
            }

            let results = TestHarness::new().with_parallel(4).run(&suite, &listener);
            let names: Vec<_> = results.results.iter().map(|r| r.name.clone()).collect();
            let expected: Vec<_> = (0..12).map(|i| format!("case-{i}")).collect();
            assert_eq!(names, expected);
            assert_eq!(listener.pipeline().flushed_test_count(), Some(12));
        }

        #[test]
        fn test_parallel_workers_release_their_contexts() {
            let tmp = TempDir::new().unwrap();
            let listener = listener(&tmp);
            let mut suite = TestSuite::new("parallel");
            for i in 0..8 {
                suite.add_test(TestCase::new(format!("case-{i}"), |_| Ok(())));
            }

            let results = TestHarness::new().with_parallel(4).run(&suite, &listener);
            assert_eq!(results.passed_count(), 8);
            assert!(listener.pipeline().registry().is_empty());
            assert_eq!(listener.pipeline().flushed_test_count(), Some(8));
        }
    }
}
