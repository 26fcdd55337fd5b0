//! Wait Mechanisms
//!
//! Blocking, condition-based synchronization over a [`UiDriver`].
//!
//! ```text
//!   start                                              deadline
//!     │ probe │ sleep │ probe │ sleep │ probe │ ... │ probe │ Timeout
//!     0       └─poll──┘       └─poll──┘                  T
//! ```
//!
//! A probe answers with a [`Probe`]: ready with a value, not ready yet, or
//! failed. A failure whose [`FailureKind`] is in the policy's ignored set is
//! treated as "not ready yet" and remembered for the timeout message; any
//! other failure ends the wait immediately.
//!
//! Polls are scheduled on a fixed cadence measured from the start instant, so
//! a slow probe does not push later polls back, and the final sleep is clipped
//! to the deadline.

use crate::driver::{ElementHandle, ElementState, UiDriver};
use crate::locator::{InteractionTarget, Locator};
use crate::result::{FailureKind, TenazError, TenazResult};
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait operations (20 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 20_000;

/// Default polling interval (500ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Script used by [`Waiter::page_ready`]
pub const READY_STATE_SCRIPT: &str = "return document.readyState;";

// =============================================================================
// WAIT POLICY
// =============================================================================

/// Timeout, poll cadence and the failure kinds treated as transient.
///
/// Immutable once built; the `with_*` methods return a new policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPolicy {
    timeout: Duration,
    poll_interval: Duration,
    ignored: BTreeSet<FailureKind>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            ignored: Self::default_ignored(),
        }
    }
}

impl WaitPolicy {
    /// Create a policy ignoring missing and stale elements.
    ///
    /// Fails unless `0 < poll_interval <= timeout`.
    pub fn new(timeout: Duration, poll_interval: Duration) -> TenazResult<Self> {
        Self::validate(timeout, poll_interval)?;
        Ok(Self {
            timeout,
            poll_interval,
            ignored: Self::default_ignored(),
        })
    }

    /// Millisecond convenience for [`WaitPolicy::new`]
    pub fn from_millis(timeout_ms: u64, poll_interval_ms: u64) -> TenazResult<Self> {
        Self::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(poll_interval_ms),
        )
    }

    fn default_ignored() -> BTreeSet<FailureKind> {
        [FailureKind::NoSuchElement, FailureKind::StaleElement]
            .into_iter()
            .collect()
    }

    fn validate(timeout: Duration, poll_interval: Duration) -> TenazResult<()> {
        if timeout.is_zero() {
            return Err(TenazError::config("wait.timeout_ms", "must be greater than zero"));
        }
        if poll_interval.is_zero() {
            return Err(TenazError::config(
                "wait.poll_interval_ms",
                "must be greater than zero",
            ));
        }
        if poll_interval > timeout {
            return Err(TenazError::config(
                "wait.poll_interval_ms",
                format!(
                    "poll interval {}ms exceeds timeout {}ms",
                    poll_interval.as_millis(),
                    timeout.as_millis()
                ),
            ));
        }
        Ok(())
    }

    /// Same policy with a different timeout
    pub fn with_timeout(&self, timeout: Duration) -> TenazResult<Self> {
        Self::validate(timeout, self.poll_interval)?;
        Ok(Self {
            timeout,
            ..self.clone()
        })
    }

    /// Same policy with a different poll interval
    pub fn with_poll_interval(&self, poll_interval: Duration) -> TenazResult<Self> {
        Self::validate(self.timeout, poll_interval)?;
        Ok(Self {
            poll_interval,
            ..self.clone()
        })
    }

    /// Same policy, additionally ignoring `kind`
    #[must_use]
    pub fn ignoring(&self, kind: FailureKind) -> Self {
        let mut next = self.clone();
        next.ignored.insert(kind);
        next
    }

    /// Same policy, no longer ignoring `kind`
    #[must_use]
    pub fn not_ignoring(&self, kind: FailureKind) -> Self {
        let mut next = self.clone();
        next.ignored.remove(&kind);
        next
    }

    /// Same policy with exactly the given ignored kinds
    #[must_use]
    pub fn with_ignored(&self, kinds: impl IntoIterator<Item = FailureKind>) -> Self {
        Self {
            ignored: kinds.into_iter().collect(),
            ..self.clone()
        }
    }

    /// Overall timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Poll cadence
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Failure kinds treated as "not ready yet"
    #[must_use]
    pub const fn ignored(&self) -> &BTreeSet<FailureKind> {
        &self.ignored
    }

    /// Whether an error is transient under this policy
    #[must_use]
    pub fn is_transient(&self, error: &TenazError) -> bool {
        error.kind().is_some_and(|kind| self.ignored.contains(&kind))
    }
}

// =============================================================================
// PROBE
// =============================================================================

/// Outcome of one evaluation of a wait condition
#[derive(Debug)]
pub enum Probe<T> {
    /// Condition met
    Ready(T),
    /// Not yet; poll again
    NotReady,
    /// Evaluation failed; the policy decides whether that is transient
    Failed(TenazError),
}

impl<T> Probe<T> {
    /// `Ok(Some)` is ready, `Ok(None)` is not ready, `Err` is a failure
    pub fn from_result(result: TenazResult<Option<T>>) -> Self {
        match result {
            Ok(Some(value)) => Self::Ready(value),
            Ok(None) => Self::NotReady,
            Err(err) => Self::Failed(err),
        }
    }

    /// Ready when `ready` is true
    pub fn when(ready: bool, value: T) -> Self {
        if ready {
            Self::Ready(value)
        } else {
            Self::NotReady
        }
    }
}

/// Poll `probe` under `policy` until it is ready.
///
/// The probe is evaluated at least once, even if it alone outlasts the
/// timeout. A timeout is only reported once the deadline has passed.
pub fn await_condition<T>(
    waited_for: &str,
    policy: &WaitPolicy,
    mut probe: impl FnMut() -> Probe<T>,
) -> TenazResult<T> {
    let start = Instant::now();
    let deadline = start + policy.timeout;
    let mut last_error: Option<String> = None;
    let mut polls: u64 = 0;

    loop {
        polls += 1;
        match probe() {
            Probe::Ready(value) => {
                debug!(
                    waited_for,
                    polls,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "wait satisfied"
                );
                return Ok(value);
            }
            Probe::NotReady => {}
            Probe::Failed(err) if policy.is_transient(&err) => {
                last_error = Some(err.to_string());
            }
            Probe::Failed(err) => return Err(err),
        }

        let now = Instant::now();
        if now >= deadline {
            debug!(waited_for, polls, "wait timed out");
            return Err(TenazError::Timeout {
                waited_for: waited_for.to_string(),
                ms: policy.timeout.as_millis() as u64,
                last_error,
            });
        }
        std::thread::sleep(next_poll(start, now, policy.poll_interval, deadline) - now);
    }
}

/// Next slot on the fixed cadence strictly after `now`, clipped to `deadline`
fn next_poll(start: Instant, now: Instant, poll: Duration, deadline: Instant) -> Instant {
    let slots = (now - start).as_nanos() / poll.as_nanos() + 1;
    u32::try_from(slots)
        .ok()
        .and_then(|n| poll.checked_mul(n))
        .and_then(|offset| start.checked_add(offset))
        .map_or(deadline, |next| next.min(deadline))
}

// =============================================================================
// WAITER
// =============================================================================

/// Driver-bound wait variants under one policy
#[derive(Clone)]
pub struct Waiter<'a> {
    driver: &'a dyn UiDriver,
    policy: WaitPolicy,
}

impl fmt::Debug for Waiter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<'a> Waiter<'a> {
    /// Create a waiter over `driver`
    #[must_use]
    pub fn new(driver: &'a dyn UiDriver, policy: WaitPolicy) -> Self {
        Self { driver, policy }
    }

    /// Policy used by every wait on this waiter
    #[must_use]
    pub const fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    /// Start a per-call override of this waiter's policy
    #[must_use]
    pub fn fluent(&self) -> FluentWait<'a> {
        FluentWait::from_policy(self.driver, &self.policy)
    }

    /// Poll a custom probe
    pub fn until<T>(
        &self,
        waited_for: &str,
        mut probe: impl FnMut(&dyn UiDriver) -> Probe<T>,
    ) -> TenazResult<T> {
        let driver = self.driver;
        await_condition(waited_for, &self.policy, || probe(driver))
    }

    fn resolve(&self, target: &InteractionTarget) -> TenazResult<Option<ElementHandle>> {
        match target {
            InteractionTarget::Locator(locator) => {
                Ok(self.driver.find_elements(locator)?.into_iter().next())
            }
            InteractionTarget::Element(element) => Ok(Some(element.clone())),
        }
    }

    fn element_probe(
        &self,
        target: &InteractionTarget,
        accept: fn(&ElementState) -> bool,
    ) -> Probe<ElementHandle> {
        let element = match self.resolve(target) {
            Ok(Some(element)) => element,
            Ok(None) => return Probe::NotReady,
            Err(err) => return Probe::Failed(err),
        };
        match self.driver.element_state(&element) {
            Ok(state) => Probe::when(accept(&state), element),
            Err(err) => Probe::Failed(err),
        }
    }

    /// Element exists and is rendered with non-zero extent
    pub fn visible(&self, target: &InteractionTarget) -> TenazResult<ElementHandle> {
        await_condition(&format!("visibility of {target}"), &self.policy, || {
            self.element_probe(target, ElementState::is_visible)
        })
    }

    /// Element exists in the document, rendered or not
    pub fn present(&self, locator: &Locator) -> TenazResult<ElementHandle> {
        await_condition(&format!("presence of {locator}"), &self.policy, || {
            Probe::from_result(
                self.driver
                    .find_elements(locator)
                    .map(|found| found.into_iter().next()),
            )
        })
    }

    /// Immediate, non-waiting presence check; driver errors count as absent
    #[must_use]
    pub fn is_present(&self, locator: &Locator) -> bool {
        match self.driver.find_elements(locator) {
            Ok(found) => !found.is_empty(),
            Err(err) => {
                debug!(target = %locator, error = %err, "presence check failed");
                false
            }
        }
    }

    /// Element is visible, enabled and not covered
    pub fn interactable(&self, target: &InteractionTarget) -> TenazResult<ElementHandle> {
        await_condition(&format!("interactability of {target}"), &self.policy, || {
            self.element_probe(target, ElementState::is_interactable)
        })
    }

    /// No element matches, or the first match is not rendered
    pub fn invisible(&self, locator: &Locator) -> TenazResult<()> {
        await_condition(&format!("invisibility of {locator}"), &self.policy, || {
            let found = match self.driver.find_elements(locator) {
                Ok(found) => found,
                Err(err) => return Probe::Failed(err),
            };
            let Some(element) = found.into_iter().next() else {
                return Probe::Ready(());
            };
            match self.driver.element_state(&element) {
                Ok(state) => Probe::when(!state.is_visible(), ()),
                // Detached counts as gone
                Err(err) if err.kind() == Some(FailureKind::StaleElement) => Probe::Ready(()),
                Err(err) => Probe::Failed(err),
            }
        })
    }

    /// `document.readyState` reports `complete`
    pub fn page_ready(&self) -> TenazResult<()> {
        await_condition("document.readyState == complete", &self.policy, || {
            match self.driver.execute_script(READY_STATE_SCRIPT, &[]) {
                Ok(value) => Probe::when(value.as_str() == Some("complete"), ()),
                Err(err) => Probe::Failed(err),
            }
        })
    }

    /// A page script returns a truthy value
    pub fn page_ready_with(&self, script: &str) -> TenazResult<serde_json::Value> {
        await_condition(&format!("page readiness `{script}`"), &self.policy, || {
            match self.driver.execute_script(script, &[]) {
                Ok(value) => Probe::when(is_truthy(&value), value),
                Err(err) => Probe::Failed(err),
            }
        })
    }

    /// Title contains `fragment`; returns the full title
    pub fn title_contains(&self, fragment: &str) -> TenazResult<String> {
        await_condition(&format!("title containing '{fragment}'"), &self.policy, || {
            match self.driver.title() {
                Ok(title) => Probe::when(title.contains(fragment), title),
                Err(err) => Probe::Failed(err),
            }
        })
    }

    /// Title matches `pattern`; returns the full title
    pub fn title_matches(&self, pattern: &Regex) -> TenazResult<String> {
        await_condition(&format!("title matching /{pattern}/"), &self.policy, || {
            match self.driver.title() {
                Ok(title) => Probe::when(pattern.is_match(&title), title),
                Err(err) => Probe::Failed(err),
            }
        })
    }

    /// Page source contains `fragment`
    pub fn content_contains(&self, fragment: &str) -> TenazResult<()> {
        await_condition(
            &format!("page content containing '{fragment}'"),
            &self.policy,
            || match self.driver.page_source() {
                Ok(source) => Probe::when(source.contains(fragment), ()),
                Err(err) => Probe::Failed(err),
            },
        )
    }
}

/// JavaScript truthiness of a script result
fn is_truthy(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// =============================================================================
// FLUENT WAIT
// =============================================================================

/// Per-call policy override, validated when the wait runs
#[derive(Clone)]
pub struct FluentWait<'a> {
    driver: &'a dyn UiDriver,
    timeout: Duration,
    poll_interval: Duration,
    ignored: BTreeSet<FailureKind>,
}

impl fmt::Debug for FluentWait<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FluentWait")
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .field("ignored", &self.ignored)
            .finish_non_exhaustive()
    }
}

impl<'a> FluentWait<'a> {
    /// Start from the default policy
    #[must_use]
    pub fn new(driver: &'a dyn UiDriver) -> Self {
        Self::from_policy(driver, &WaitPolicy::default())
    }

    /// Start from an existing policy
    #[must_use]
    pub fn from_policy(driver: &'a dyn UiDriver, policy: &WaitPolicy) -> Self {
        Self {
            driver,
            timeout: policy.timeout,
            poll_interval: policy.poll_interval,
            ignored: policy.ignored.clone(),
        }
    }

    /// Set timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set poll cadence
    #[must_use]
    pub const fn poll_every(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Treat `kind` as transient
    #[must_use]
    pub fn ignoring(mut self, kind: FailureKind) -> Self {
        self.ignored.insert(kind);
        self
    }

    /// Propagate `kind` immediately
    #[must_use]
    pub fn not_ignoring(mut self, kind: FailureKind) -> Self {
        self.ignored.remove(&kind);
        self
    }

    /// Build the validated policy
    pub fn policy(&self) -> TenazResult<WaitPolicy> {
        Ok(WaitPolicy::new(self.timeout, self.poll_interval)?.with_ignored(self.ignored.clone()))
    }

    /// A [`Waiter`] with this policy, for the named variants
    pub fn waiter(&self) -> TenazResult<Waiter<'a>> {
        Ok(Waiter::new(self.driver, self.policy()?))
    }

    /// Poll a custom probe
    pub fn until<T>(
        &self,
        waited_for: &str,
        probe: impl FnMut(&dyn UiDriver) -> Probe<T>,
    ) -> TenazResult<T> {
        self.waiter()?.until(waited_for, probe)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::driver::{MockDriver, MockElement};
    use std::sync::Arc;

    fn quick() -> WaitPolicy {
        WaitPolicy::from_millis(300, 20).unwrap()
    }

    // =========================================================================
    // WaitPolicy Tests
    // =========================================================================

    mod policy_tests {
        use super::*;

        #[test]
        fn test_default_policy() {
            let policy = WaitPolicy::default();
            assert_eq!(policy.timeout(), Duration::from_secs(20));
            assert_eq!(policy.poll_interval(), Duration::from_millis(500));
            assert!(policy.ignored().contains(&FailureKind::NoSuchElement));
            assert!(policy.ignored().contains(&FailureKind::StaleElement));
        }

        #[test]
        fn test_rejects_zero_timeout() {
            let err = WaitPolicy::from_millis(0, 0).unwrap_err();
            assert!(matches!(err, TenazError::Configuration { ref key, .. } if key == "wait.timeout_ms"));
        }

        #[test]
        fn test_rejects_poll_longer_than_timeout() {
            assert!(WaitPolicy::from_millis(100, 200).is_err());
            assert!(WaitPolicy::from_millis(100, 100).is_ok());
        }

        #[test]
        fn test_overrides_leave_original_untouched() {
            let base = WaitPolicy::default();
            let strict = base.not_ignoring(FailureKind::StaleElement);
            assert!(base.ignored().contains(&FailureKind::StaleElement));
            assert!(!strict.ignored().contains(&FailureKind::StaleElement));
            assert!(base.with_timeout(Duration::from_millis(100)).is_err());
        }

        #[test]
        fn test_is_transient() {
            let policy = WaitPolicy::default();
            assert!(policy.is_transient(&TenazError::driver(FailureKind::StaleElement, "x")));
            assert!(!policy.is_transient(&TenazError::driver(FailureKind::Script, "x")));
            assert!(!policy.is_transient(&TenazError::assertion("x")));
        }
    }

    // =========================================================================
    // await_condition Tests
    // =========================================================================

    mod await_tests {
        use super::*;

        #[test]
        fn test_immediate_ready() {
            let value = await_condition("now", &quick(), || Probe::Ready(7)).unwrap();
            assert_eq!(value, 7);
        }

        #[test]
        fn test_never_ready_times_out_after_timeout() {
            let start = Instant::now();
            let err = await_condition::<()>("never", &quick(), || Probe::NotReady).unwrap_err();
            let elapsed = start.elapsed();
            assert!(err.is_timeout());
            assert!(elapsed >= Duration::from_millis(300));
            assert!(elapsed < Duration::from_millis(600));
        }

        #[test]
        fn test_ignored_failures_are_remembered() {
            let err = await_condition::<()>("flaky", &quick(), || {
                Probe::Failed(TenazError::driver(FailureKind::StaleElement, "detached"))
            })
            .unwrap_err();
            match err {
                TenazError::Timeout { last_error, waited_for, .. } => {
                    assert_eq!(waited_for, "flaky");
                    assert!(last_error.unwrap().contains("detached"));
                }
                other => panic!("expected timeout, got {other}"),
            }
        }

        #[test]
        fn test_other_failures_propagate_immediately() {
            let mut calls = 0;
            let err = await_condition::<()>("broken", &quick(), || {
                calls += 1;
                Probe::Failed(TenazError::driver(FailureKind::SessionClosed, "gone"))
            })
            .unwrap_err();
            assert_eq!(calls, 1);
            assert_eq!(err.kind(), Some(FailureKind::SessionClosed));
        }

        #[test]
        fn test_probe_runs_at_least_once() {
            let policy = WaitPolicy::from_millis(1, 1).unwrap();
            let mut calls = 0;
            let _ = await_condition::<()>("slow", &policy, || {
                calls += 1;
                std::thread::sleep(Duration::from_millis(5));
                Probe::NotReady
            });
            assert_eq!(calls, 1);
        }

        #[test]
        fn test_next_poll_clips_to_deadline() {
            let start = Instant::now();
            let deadline = start + Duration::from_millis(250);
            let late = start + Duration::from_millis(230);
            assert_eq!(next_poll(start, late, Duration::from_millis(100), deadline), deadline);
            let early = start + Duration::from_millis(30);
            assert_eq!(
                next_poll(start, early, Duration::from_millis(100), deadline),
                start + Duration::from_millis(100)
            );
        }

        #[test]
        fn test_probe_from_result() {
            assert!(matches!(Probe::from_result(Ok(Some(1))), Probe::Ready(1)));
            assert!(matches!(Probe::<i32>::from_result(Ok(None)), Probe::NotReady));
            assert!(matches!(
                Probe::<i32>::from_result(Err(TenazError::assertion("x"))),
                Probe::Failed(_)
            ));
        }
    }

    // =========================================================================
    // Waiter Variant Tests
    // =========================================================================

    mod waiter_tests {
        use super::*;

        #[test]
        fn test_visible_waits_for_delayed_element() {
            let driver = MockDriver::new();
            let locator = Locator::id("input-email");
            driver.add_element(
                MockElement::new(locator.clone()).appear_after(Duration::from_millis(60)),
            );
            let waiter = Waiter::new(&driver, quick());
            let element = waiter.visible(&locator.clone().into()).unwrap();
            assert_eq!(element.origin, Some(locator));
        }

        #[test]
        fn test_present_ignores_rendering() {
            let driver = MockDriver::new();
            let locator = Locator::css("input[type=hidden]");
            driver.add_element(MockElement::new(locator.clone()).hidden());
            let waiter = Waiter::new(&driver, quick());
            assert!(waiter.present(&locator).is_ok());
            assert!(waiter.visible(&locator.into()).unwrap_err().is_timeout());
        }

        #[test]
        fn test_is_present_does_not_wait() {
            let driver = MockDriver::new();
            let banner = Locator::css(".alert-success");
            let late = Locator::css(".alert-danger");
            driver.add_element(MockElement::new(banner.clone()).hidden());
            driver.add_element(
                MockElement::new(late.clone()).appear_after(Duration::from_secs(5)),
            );
            let waiter = Waiter::new(&driver, WaitPolicy::from_millis(5_000, 100).unwrap());

            let start = std::time::Instant::now();
            assert!(waiter.is_present(&banner));
            assert!(!waiter.is_present(&late));
            assert!(!waiter.is_present(&Locator::id("missing")));
            assert!(start.elapsed() < Duration::from_millis(100));
        }

        #[test]
        fn test_visible_rejects_zero_extent() {
            let driver = MockDriver::new();
            let locator = Locator::css(".collapsed");
            driver.add_element(MockElement::new(locator.clone()).zero_size());
            let waiter = Waiter::new(&driver, quick());
            assert!(waiter.visible(&locator.into()).is_err());
        }

        #[test]
        fn test_interactable_waits_for_overlay_to_clear() {
            let driver = Arc::new(MockDriver::new());
            let locator = Locator::css("button.primary");
            driver.add_element(MockElement::new(locator.clone()).obscured());

            let bg = Arc::clone(&driver);
            let bg_locator = locator.clone();
            let handle = std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(80));
                bg.set_obscured(&bg_locator, false);
            });

            let waiter = Waiter::new(driver.as_ref(), quick());
            assert!(waiter.interactable(&locator.into()).is_ok());
            handle.join().unwrap();
        }

        #[test]
        fn test_stale_handle_times_out_with_last_error() {
            let driver = MockDriver::new();
            let locator = Locator::css("#row-1");
            driver.add_element(MockElement::new(locator.clone()));
            let handle = driver.find_element(&locator).unwrap();
            driver.replace_element(&locator);

            let waiter = Waiter::new(&driver, quick());
            match waiter.visible(&handle.into()).unwrap_err() {
                TenazError::Timeout { last_error, .. } => {
                    assert!(last_error.unwrap().contains("no longer attached"));
                }
                other => panic!("expected timeout, got {other}"),
            }
        }

        #[test]
        fn test_invisible() {
            let driver = MockDriver::new();
            let spinner = Locator::css(".spinner");
            let waiter = Waiter::new(&driver, quick());
            assert!(waiter.invisible(&spinner).is_ok());

            driver.add_element(MockElement::new(spinner.clone()));
            assert!(waiter.invisible(&spinner).is_err());
            driver.set_displayed(&spinner, false);
            assert!(waiter.invisible(&spinner).is_ok());
        }

        #[test]
        fn test_page_ready() {
            let driver = Arc::new(MockDriver::new());
            driver.set_ready_state("loading");
            let bg = Arc::clone(&driver);
            let handle = std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                bg.set_ready_state("complete");
            });
            assert!(Waiter::new(driver.as_ref(), quick()).page_ready().is_ok());
            handle.join().unwrap();
        }

        #[test]
        fn test_page_ready_with_custom_flag() {
            let driver = MockDriver::new();
            let script = "return window.appReady === true;";
            let waiter = Waiter::new(&driver, quick());
            assert!(waiter.page_ready_with(script).is_err());
            driver.set_script_result(script, serde_json::json!(true));
            assert!(waiter.page_ready_with(script).is_ok());
        }

        #[test]
        fn test_title_and_content() {
            let driver = MockDriver::new();
            driver.set_title("Your Account Has Been Created!");
            driver.set_page_source("<h1>Congratulations!</h1>");
            let waiter = Waiter::new(&driver, quick());

            assert_eq!(
                waiter.title_contains("Account").unwrap(),
                "Your Account Has Been Created!"
            );
            let pattern = Regex::new(r"^Your .* Created!$").unwrap();
            assert!(waiter.title_matches(&pattern).is_ok());
            assert!(waiter.content_contains("Congratulations").is_ok());
            assert!(waiter.content_contains("Logout").is_err());
        }

        #[test]
        fn test_truthiness() {
            use serde_json::json;
            assert!(is_truthy(&json!(true)));
            assert!(is_truthy(&json!("yes")));
            assert!(is_truthy(&json!(1)));
            assert!(is_truthy(&json!({})));
            assert!(!is_truthy(&json!(null)));
            assert!(!is_truthy(&json!("")));
            assert!(!is_truthy(&json!(0)));
        }
    }

    // =========================================================================
    // FluentWait Tests
    // =========================================================================

    mod fluent_tests {
        use super::*;

        #[test]
        fn test_not_ignoring_propagates_stale() {
            let driver = MockDriver::new();
            let locator = Locator::css("#cart-total");
            driver.add_element(MockElement::new(locator.clone()));
            let handle = driver.find_element(&locator).unwrap();
            driver.replace_element(&locator);

            let waiter = FluentWait::new(&driver)
                .timeout(Duration::from_millis(300))
                .poll_every(Duration::from_millis(20))
                .not_ignoring(FailureKind::StaleElement)
                .waiter()
                .unwrap();
            let err = waiter.visible(&handle.into()).unwrap_err();
            assert_eq!(err.kind(), Some(FailureKind::StaleElement));
        }

        #[test]
        fn test_invalid_override_fails_at_use() {
            let driver = MockDriver::new();
            let fluent = FluentWait::new(&driver).poll_every(Duration::ZERO);
            let err = fluent.until("anything", |_| Probe::Ready(())).unwrap_err();
            assert!(matches!(err, TenazError::Configuration { .. }));
        }

        #[test]
        fn test_until_with_extra_ignored_kind() {
            let driver = MockDriver::new();
            let mut attempts = 0;
            let value = FluentWait::new(&driver)
                .timeout(Duration::from_millis(300))
                .poll_every(Duration::from_millis(10))
                .ignoring(FailureKind::Script)
                .until("script to settle", |_| {
                    attempts += 1;
                    if attempts < 3 {
                        Probe::Failed(TenazError::driver(FailureKind::Script, "not yet"))
                    } else {
                        Probe::Ready(attempts)
                    }
                })
                .unwrap();
            assert_eq!(value, 3);
        }

        #[test]
        fn test_waiter_fluent_inherits_policy() {
            let driver = MockDriver::new();
            let waiter = Waiter::new(&driver, quick());
            let policy = waiter.fluent().policy().unwrap();
            assert_eq!(&policy, waiter.policy());
        }
    }
}
