//! Resilient element interactions.
//!
//! Every action follows the same path:
//!
//! ```text
//!   wait visible ─► wait interactable ─► scroll into view ─► native action
//!        │                  │                   │                 │
//!        └──────────────────┴─── any failure ───┴─────────────────┘
//!                                    │
//!                    re-resolve target, script-level action (once)
//!                                    │
//!                          failure ─► InteractionFailure + FAIL event
//! ```
//!
//! The fallback runs at most once per call. Script-level actions bypass the
//! overlay and animation timing that trips native input, but retrying without
//! bound would hide real defects.

use crate::driver::{ElementHandle, ScriptArg, UiDriver};
use crate::locator::{InteractionTarget, Locator};
use crate::pipeline::ReportingPipeline;
use crate::result::{error_chain, FailureKind, TenazError, TenazResult};
use crate::wait::{Waiter, WaitPolicy};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, error, info, warn};

const SCROLL_SCRIPT: &str = "arguments[0].scrollIntoView({block: 'center', inline: 'nearest'});";
const CLICK_SCRIPT: &str = "arguments[0].click();";
const SET_VALUE_SCRIPT: &str = "arguments[0].value = arguments[1]; \
    arguments[0].dispatchEvent(new Event('input', { bubbles: true })); \
    arguments[0].dispatchEvent(new Event('change', { bubbles: true }));";
const TEXT_SCRIPT: &str = "return (arguments[0].textContent || '').trim();";
const VALIDITY_SCRIPT: &str = "return arguments[0].checkValidity();";
const VALIDATION_MESSAGE_SCRIPT: &str = "return arguments[0].validationMessage;";
const OPTIONS_SCRIPT: &str =
    "return Array.from(arguments[0].options).map(function (o) { return o.text.trim(); });";
const FIELD_GROUP_SCRIPT: &str =
    "var group = arguments[0].closest('.form-group'); return group ? group.innerHTML : '';";
const ZOOM_READ_SCRIPT: &str = "return parseFloat(document.body.style.zoom || '1');";
const ZOOM_SET_SCRIPT: &str = "document.body.style.zoom = arguments[0];";

const ZOOM_STEP: f64 = 0.1;
const MIN_ZOOM: f64 = 0.25;
const MAX_ZOOM: f64 = 5.0;

#[derive(Debug, Clone, Copy)]
enum Action {
    Click,
    Type,
    Read,
}

impl Action {
    const fn verb(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Type => "type into",
            Self::Read => "read text from",
        }
    }
}

/// Click, type and read with waits, a single script fallback, and reporting
#[derive(Clone)]
pub struct Interactor<'a> {
    driver: &'a dyn UiDriver,
    policy: WaitPolicy,
    pipeline: Option<&'a ReportingPipeline>,
}

impl fmt::Debug for Interactor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interactor")
            .field("policy", &self.policy)
            .field("reporting", &self.pipeline.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> Interactor<'a> {
    /// Interactor without reporting; failures only go to tracing
    #[must_use]
    pub fn new(driver: &'a dyn UiDriver, policy: WaitPolicy) -> Self {
        Self {
            driver,
            policy,
            pipeline: None,
        }
    }

    /// Report PASS/FAIL events through `pipeline`
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: &'a ReportingPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Driver this interactor acts on
    #[must_use]
    pub fn driver(&self) -> &'a dyn UiDriver {
        self.driver
    }

    /// Waiter sharing this interactor's policy
    #[must_use]
    pub fn waiter(&self) -> Waiter<'a> {
        Waiter::new(self.driver, self.policy.clone())
    }

    // ========================================================================
    // Core actions
    // ========================================================================

    /// Click the target
    pub fn click(&self, target: impl Into<InteractionTarget>) -> TenazResult<()> {
        let target = target.into();
        self.perform(
            Action::Click,
            &target,
            |el| self.driver.click(el),
            |el| {
                self.driver
                    .execute_script(CLICK_SCRIPT, &[ScriptArg::Element(el.clone())])
                    .map(|_| ())
            },
        )
    }

    /// Replace the target's content with `text`
    pub fn type_text(&self, target: impl Into<InteractionTarget>, text: &str) -> TenazResult<()> {
        let target = target.into();
        self.perform(
            Action::Type,
            &target,
            |el| {
                self.driver.clear(el)?;
                self.driver.send_keys(el, text)
            },
            |el| {
                self.driver
                    .execute_script(
                        SET_VALUE_SCRIPT,
                        &[
                            ScriptArg::Element(el.clone()),
                            ScriptArg::Value(Value::String(text.to_string())),
                        ],
                    )
                    .map(|_| ())
            },
        )
    }

    /// Rendered text of the target, trimmed
    pub fn read_text(&self, target: impl Into<InteractionTarget>) -> TenazResult<String> {
        let target = target.into();
        self.perform(
            Action::Read,
            &target,
            |el| self.driver.element_text(el).map(|t| t.trim().to_string()),
            |el| {
                let value = self
                    .driver
                    .execute_script(TEXT_SCRIPT, &[ScriptArg::Element(el.clone())])?;
                value.as_str().map(str::to_string).ok_or_else(|| {
                    TenazError::driver(
                        FailureKind::Script,
                        format!("text script returned {value}"),
                    )
                })
            },
        )
    }

    fn perform<T>(
        &self,
        action: Action,
        target: &InteractionTarget,
        native: impl Fn(&ElementHandle) -> TenazResult<T>,
        fallback: impl Fn(&ElementHandle) -> TenazResult<T>,
    ) -> TenazResult<T> {
        let native_error = match self.prepare(target).and_then(|el| native(&el)) {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        warn!(
            target = %target,
            error = %native_error,
            "native {} failed, retrying via script",
            action.verb()
        );

        match self.resolve(target).and_then(|el| fallback(&el)) {
            Ok(value) => {
                info!(target = %target, "script fallback succeeded for {}", action.verb());
                Ok(value)
            }
            Err(cause) => {
                let failure = TenazError::InteractionFailure {
                    target: target.description(),
                    native_error: native_error.to_string(),
                    cause: Box::new(cause),
                };
                self.report_failure(&format!("Unable to {} {target}", action.verb()), &failure);
                Err(failure)
            }
        }
    }

    /// Visible, interactable, scrolled into view
    fn prepare(&self, target: &InteractionTarget) -> TenazResult<ElementHandle> {
        let waiter = self.waiter();
        waiter.visible(target)?;
        let element = waiter.interactable(target)?;
        self.scroll(&element)?;
        Ok(element)
    }

    /// Fresh lookup for locators; handles are used as they are
    fn resolve(&self, target: &InteractionTarget) -> TenazResult<ElementHandle> {
        match target {
            InteractionTarget::Locator(locator) => self.driver.find_element(locator),
            InteractionTarget::Element(element) => Ok(element.clone()),
        }
    }

    fn scroll(&self, element: &ElementHandle) -> TenazResult<()> {
        self.driver
            .execute_script(SCROLL_SCRIPT, &[ScriptArg::Element(element.clone())])
            .map(|_| ())
    }

    fn report_failure(&self, headline: &str, failure: &TenazError) {
        match self.pipeline {
            Some(pipeline) => {
                pipeline.log_fail(
                    format!("{headline}: {}", error_chain(failure)),
                    Some(self.driver),
                );
            }
            None => error!(error = %failure, "{headline}"),
        }
    }

    fn pass(&self, message: String) {
        match self.pipeline {
            Some(pipeline) => pipeline.log_pass(message),
            None => info!("{message}"),
        }
    }

    // ========================================================================
    // Reported actions
    // ========================================================================

    /// Click a submitting control and record a PASS
    pub fn submit(&self, target: impl Into<InteractionTarget>) -> TenazResult<()> {
        let target = target.into();
        self.click(target.clone())?;
        self.pass(format!("Submitted via {target}"));
        Ok(())
    }

    /// Type into a field and record a PASS naming the field only
    pub fn fill(&self, target: impl Into<InteractionTarget>, text: &str) -> TenazResult<()> {
        let target = target.into();
        self.type_text(target.clone(), text)?;
        self.pass(format!("Entered value into {target}"));
        Ok(())
    }

    /// Click when enabled; returns whether a click happened
    pub fn click_if_enabled(&self, target: impl Into<InteractionTarget>) -> TenazResult<bool> {
        let target = target.into();
        let element = self.waiter().visible(&target)?;
        if self.driver.element_state(&element)?.enabled {
            self.click(target.clone())?;
            self.pass(format!("Clicked {target}"));
            Ok(true)
        } else {
            let message = format!("{target} is disabled, click skipped");
            match self.pipeline {
                Some(pipeline) => pipeline.log_info(message),
                None => info!("{message}"),
            }
            Ok(false)
        }
    }

    /// Wait for visibility and scroll the element to the viewport center
    pub fn scroll_into_view(
        &self,
        target: impl Into<InteractionTarget>,
    ) -> TenazResult<ElementHandle> {
        let element = self.waiter().visible(&target.into())?;
        self.scroll(&element)?;
        Ok(element)
    }

    /// Clear each field that can be found; returns how many were cleared
    pub fn clear_fields(&self, locators: &[Locator]) -> usize {
        let mut cleared = 0;
        for locator in locators {
            match self
                .driver
                .find_element(locator)
                .and_then(|el| self.driver.clear(&el))
            {
                Ok(()) => cleared += 1,
                Err(err) => {
                    warn!(target = %locator, error = %err, "could not clear field");
                    if let Some(pipeline) = self.pipeline {
                        pipeline.log_warn(format!("Could not clear field {locator}: {err}"));
                    }
                }
            }
        }
        cleared
    }

    // ========================================================================
    // Form queries
    // ========================================================================

    fn element_script(&self, locator: &Locator, script: &str) -> TenazResult<Value> {
        let element = self.driver.find_element(locator)?;
        self.driver
            .execute_script(script, &[ScriptArg::Element(element)])
    }

    /// Browser constraint-validation message, empty when unavailable
    pub fn validation_message(&self, locator: &Locator) -> String {
        match self.element_script(locator, VALIDATION_MESSAGE_SCRIPT) {
            Ok(Value::String(message)) => message,
            Ok(_) => String::new(),
            Err(err) => {
                debug!(target = %locator, error = %err, "validation message unavailable");
                String::new()
            }
        }
    }

    /// Whether the field is invalid and its message contains `expected`
    pub fn field_warning_contains(&self, locator: &Locator, expected: &str) -> TenazResult<bool> {
        let valid = self.element_script(locator, VALIDITY_SCRIPT)?;
        if valid.as_bool().unwrap_or(true) {
            return Ok(false);
        }
        let message = self.validation_message(locator);
        if let Some(pipeline) = self.pipeline {
            pipeline.log_pass(format!("Validation message: {message}"));
        }
        Ok(message.contains(expected))
    }

    /// `placeholder` attribute of a visible field, empty when unavailable
    pub fn placeholder_text(&self, locator: &Locator) -> String {
        let result = self
            .waiter()
            .visible(&locator.into())
            .and_then(|el| self.driver.element_attribute(&el, "placeholder"));
        match result {
            Ok(placeholder) => placeholder.unwrap_or_default(),
            Err(err) => {
                debug!(target = %locator, error = %err, "placeholder unavailable");
                String::new()
            }
        }
    }

    /// Whether the field carries the `required` attribute
    pub fn is_field_required(&self, locator: &Locator) -> bool {
        self.driver
            .find_element(locator)
            .and_then(|el| self.driver.element_attribute(&el, "required"))
            .ok()
            .flatten()
            .is_some_and(|value| value == "true" || value == "required")
    }

    /// Whether the field's form group shows a required marker
    pub fn has_required_marker(&self, locator: &Locator) -> bool {
        match self.element_script(locator, FIELD_GROUP_SCRIPT) {
            Ok(Value::String(html)) => html.contains('*') || html.contains("required"),
            _ => false,
        }
    }

    // ========================================================================
    // Page actions
    // ========================================================================

    /// Reload and wait for the document to finish loading
    pub fn reload_page(&self) -> TenazResult<()> {
        self.driver.refresh()?;
        self.waiter().page_ready()
    }

    /// Current page zoom factor (1.0 when unset)
    pub fn zoom_level(&self) -> TenazResult<f64> {
        Ok(self
            .driver
            .execute_script(ZOOM_READ_SCRIPT, &[])?
            .as_f64()
            .unwrap_or(1.0))
    }

    /// Zoom in by `steps` increments of 10%; returns the new factor
    pub fn zoom_in(&self, steps: u32) -> TenazResult<f64> {
        let level = self.zoom_level()? + f64::from(steps) * ZOOM_STEP;
        self.set_zoom(level)
    }

    /// Zoom out by `steps` increments of 10%; returns the new factor
    pub fn zoom_out(&self, steps: u32) -> TenazResult<f64> {
        let level = self.zoom_level()? - f64::from(steps) * ZOOM_STEP;
        self.set_zoom(level)
    }

    /// Back to 100%
    pub fn reset_zoom(&self) -> TenazResult<()> {
        self.set_zoom(1.0).map(|_| ())
    }

    fn set_zoom(&self, level: f64) -> TenazResult<f64> {
        let level = ((level * 100.0).round() / 100.0).clamp(MIN_ZOOM, MAX_ZOOM);
        self.driver
            .execute_script(ZOOM_SET_SCRIPT, &[ScriptArg::Value(Value::from(level))])?;
        debug!(level, "page zoom set");
        Ok(level)
    }

    /// Every expected label must be among the dropdown's options.
    ///
    /// A missing label is an assertion failure naming it.
    pub fn validate_dropdown_options<S: AsRef<str>>(
        &self,
        locator: &Locator,
        expected: &[S],
    ) -> TenazResult<()> {
        let element = self.waiter().present(locator)?;
        let value = self
            .driver
            .execute_script(OPTIONS_SCRIPT, &[ScriptArg::Element(element)])?;
        let actual: Vec<String> = match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            other => {
                return Err(TenazError::driver(
                    FailureKind::Script,
                    format!("option script returned {other}"),
                ))
            }
        };

        let missing = missing_options(&actual, expected);
        if missing.is_empty() {
            self.pass(format!("All expected options present in {locator}"));
            return Ok(());
        }
        let failure = TenazError::assertion(format!("Option not found: {}", missing.join(", ")));
        self.report_failure(&format!("Dropdown {locator} is incomplete"), &failure);
        Err(failure)
    }
}

/// Expected labels absent from `actual`, in expected order.
///
/// Labels compare after trimming; order and duplicates in `actual` do not
/// matter.
#[must_use]
pub fn missing_options<A: AsRef<str>, E: AsRef<str>>(actual: &[A], expected: &[E]) -> Vec<String> {
    let present: HashSet<&str> = actual.iter().map(|a| a.as_ref().trim()).collect();
    expected
        .iter()
        .map(|e| e.as_ref().trim())
        .filter(|e| !present.contains(e))
        .map(str::to_string)
        .collect()
}
