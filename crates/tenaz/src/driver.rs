//! UiDriver - Abstract Browser Driver Trait
//!
//! The core never constructs or tears down a browser. It talks to whatever
//! session the test owns through [`UiDriver`], which keeps backend choice out
//! of the wait and interaction layers.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  UiDriver (blocking, one session per test thread)            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  WebDriver backend │ CDP backend │ MockDriver (unit tests)   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Calls are synchronous: a test thread owns its browser session and has
//! nothing else to do while it waits.

use crate::locator::{BoundingBox, Locator};
use crate::result::{FailureKind, TenazError, TenazResult};
use base64::Engine as _;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime};

/// Opaque reference to a live element in the page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Backend-assigned element id
    pub id: String,
    /// Locator the element was resolved from, if known
    pub origin: Option<Locator>,
}

impl ElementHandle {
    /// Create a new element handle
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            origin: None,
        }
    }

    /// Record the locator this handle was resolved from
    #[must_use]
    pub fn with_origin(mut self, locator: Locator) -> Self {
        self.origin = Some(locator);
        self
    }
}

/// Rendering and input state of an element at one instant
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementState {
    /// Whether the element is rendered (not `display:none` etc.)
    pub displayed: bool,
    /// Whether the element accepts input
    pub enabled: bool,
    /// Whether another element covers its click point
    pub obscured: bool,
    /// Layout box, if the backend reports one
    pub bounding_box: Option<BoundingBox>,
}

impl ElementState {
    /// Rendered with non-zero extent
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.displayed && self.bounding_box.is_some_and(|b| b.has_extent())
    }

    /// Visible, enabled and not covered by another element
    #[must_use]
    pub fn is_interactable(&self) -> bool {
        self.is_visible() && self.enabled && !self.obscured
    }
}

/// Argument passed to a page script as `arguments[n]`
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptArg {
    /// An element reference
    Element(ElementHandle),
    /// A plain JSON value
    Value(serde_json::Value),
}

/// Screenshot data with metadata
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// Raw PNG data
    pub data: Vec<u8>,
    /// Width in pixels (0 when unknown)
    pub width: u32,
    /// Height in pixels (0 when unknown)
    pub height: u32,
    /// Timestamp when screenshot was taken
    pub timestamp: SystemTime,
}

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

impl Screenshot {
    /// Create a new screenshot
    #[must_use]
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp: SystemTime::now(),
        }
    }

    /// Decode the base64 PNG payload WebDriver backends return.
    ///
    /// Dimensions are read from the PNG header when present.
    pub fn from_base64(encoded: &str) -> TenazResult<Self> {
        let data = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| {
                TenazError::driver(
                    FailureKind::Screenshot,
                    format!("invalid base64 screenshot payload: {e}"),
                )
            })?;
        let (width, height) = png_dimensions(&data).unwrap_or((0, 0));
        Ok(Self::new(data, width, height))
    }

    /// Get the size in bytes
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Check if screenshot has any data
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty()
    }
}

/// Width and height from a PNG IHDR chunk
fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 24 || data[..8] != PNG_SIGNATURE || &data[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(data[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(data[20..24].try_into().ok()?);
    Some((width, height))
}

/// Abstract driver trait for browser automation
///
/// Implementations translate backend errors into [`TenazError::Driver`] with
/// the matching [`FailureKind`] so wait policies can classify them.
pub trait UiDriver: Send + Sync {
    /// All elements currently matching the locator (possibly none)
    fn find_elements(&self, locator: &Locator) -> TenazResult<Vec<ElementHandle>>;

    /// First element matching the locator
    fn find_element(&self, locator: &Locator) -> TenazResult<ElementHandle> {
        self.find_elements(locator)?.into_iter().next().ok_or_else(|| {
            TenazError::driver(
                FailureKind::NoSuchElement,
                format!("no element matches {locator}"),
            )
        })
    }

    /// Rendering state; fails with `StaleElement` if the node is gone
    fn element_state(&self, element: &ElementHandle) -> TenazResult<ElementState>;

    /// Rendered text of the element
    fn element_text(&self, element: &ElementHandle) -> TenazResult<String>;

    /// Attribute or property value
    fn element_attribute(&self, element: &ElementHandle, name: &str)
        -> TenazResult<Option<String>>;

    /// Native click
    fn click(&self, element: &ElementHandle) -> TenazResult<()>;

    /// Clear an input's content
    fn clear(&self, element: &ElementHandle) -> TenazResult<()>;

    /// Native key input
    fn send_keys(&self, element: &ElementHandle, text: &str) -> TenazResult<()>;

    /// Run a script in page context
    fn execute_script(&self, script: &str, args: &[ScriptArg]) -> TenazResult<serde_json::Value>;

    /// Capture the viewport
    fn screenshot(&self) -> TenazResult<Screenshot>;

    /// Navigate to URL
    fn navigate(&self, url: &str) -> TenazResult<()>;

    /// Reload the current page
    fn refresh(&self) -> TenazResult<()>;

    /// Document title
    fn title(&self) -> TenazResult<String>;

    /// Current URL
    fn current_url(&self) -> TenazResult<String>;

    /// Serialized document
    fn page_source(&self) -> TenazResult<String>;

    /// Remove every cookie for the session
    fn delete_all_cookies(&self) -> TenazResult<()>;

    /// Maximize the browser window
    fn maximize_window(&self) -> TenazResult<()>;
}

// ============================================================================
// MockDriver
// ============================================================================

/// Description of an element served by [`MockDriver`]
#[derive(Debug, Clone)]
pub struct MockElement {
    locator: Locator,
    text: String,
    attributes: HashMap<String, String>,
    displayed: bool,
    enabled: bool,
    obscured: bool,
    bounding_box: BoundingBox,
    appear_after: Duration,
    visible_after: Duration,
    native_click_failures: usize,
    native_type_failures: usize,
    script_failures: bool,
    options: Vec<String>,
    validation_message: String,
}

impl MockElement {
    /// A visible, enabled element matching `locator`
    #[must_use]
    pub fn new(locator: Locator) -> Self {
        Self {
            locator,
            text: String::new(),
            attributes: HashMap::new(),
            displayed: true,
            enabled: true,
            obscured: false,
            bounding_box: BoundingBox::new(0.0, 0.0, 120.0, 32.0),
            appear_after: Duration::ZERO,
            visible_after: Duration::ZERO,
            native_click_failures: 0,
            native_type_failures: 0,
            script_failures: false,
            options: Vec::new(),
            validation_message: String::new(),
        }
    }

    /// Set rendered text
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Not rendered
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    /// Rejects input
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Covered by another element
    #[must_use]
    pub const fn obscured(mut self) -> Self {
        self.obscured = true;
        self
    }

    /// Rendered with zero extent
    #[must_use]
    pub const fn zero_size(mut self) -> Self {
        self.bounding_box = BoundingBox::new(0.0, 0.0, 0.0, 0.0);
        self
    }

    /// Absent from the document until `delay` after registration
    #[must_use]
    pub const fn appear_after(mut self, delay: Duration) -> Self {
        self.appear_after = delay;
        self
    }

    /// Present but not rendered until `delay` after registration
    #[must_use]
    pub const fn visible_after(mut self, delay: Duration) -> Self {
        self.visible_after = delay;
        self
    }

    /// The next `count` native clicks fail as intercepted
    #[must_use]
    pub const fn fail_native_clicks(mut self, count: usize) -> Self {
        self.native_click_failures = count;
        self
    }

    /// The next `count` native key inputs fail
    #[must_use]
    pub const fn fail_native_typing(mut self, count: usize) -> Self {
        self.native_type_failures = count;
        self
    }

    /// Every script touching this element fails
    #[must_use]
    pub const fn fail_scripts(mut self) -> Self {
        self.script_failures = true;
        self
    }

    /// Option labels for a `<select>`
    #[must_use]
    pub fn options<S: Into<String>>(mut self, labels: impl IntoIterator<Item = S>) -> Self {
        self.options = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Constraint-validation message (empty means valid)
    #[must_use]
    pub fn validation_message(mut self, message: impl Into<String>) -> Self {
        self.validation_message = message.into();
        self
    }
}

#[derive(Debug)]
struct MockNode {
    id: String,
    model: MockElement,
    registered: Instant,
    stale: bool,
    value: String,
    native_clicks: usize,
    script_clicks: usize,
}

impl MockNode {
    fn present(&self, now: Instant) -> bool {
        !self.stale && now >= self.registered + self.model.appear_after
    }

    fn displayed(&self, now: Instant) -> bool {
        self.model.displayed && now >= self.registered + self.model.visible_after
    }
}

#[derive(Debug, Default)]
struct MockState {
    nodes: Vec<MockNode>,
    next_id: u64,
    title: String,
    url: String,
    page_source: String,
    ready_state: String,
    script_results: HashMap<String, serde_json::Value>,
    screenshot: Option<Screenshot>,
    history: Vec<String>,
}

impl MockState {
    fn live_node(&mut self, element: &ElementHandle) -> TenazResult<&mut MockNode> {
        let now = Instant::now();
        self.nodes
            .iter_mut()
            .find(|n| n.id == element.id && n.present(now))
            .ok_or_else(|| {
                TenazError::driver(
                    FailureKind::StaleElement,
                    format!("element {} is no longer attached to the document", element.id),
                )
            })
    }

    fn insert(&mut self, model: MockElement) -> String {
        self.next_id += 1;
        let id = format!("mock-{}", self.next_id);
        self.nodes.push(MockNode {
            id: id.clone(),
            model,
            registered: Instant::now(),
            stale: false,
            value: String::new(),
            native_clicks: 0,
            script_clicks: 0,
        });
        id
    }
}

/// Scriptable in-memory driver for unit testing
///
/// Understands the handful of page scripts the interaction layer issues
/// (scroll, click, value assignment, option listing, validation queries,
/// `document.readyState`); anything else returns `null` unless a result was
/// registered with [`MockDriver::set_script_result`].
#[derive(Debug)]
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Create new mock driver with a loaded, empty page
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                ready_state: "complete".to_string(),
                ..MockState::default()
            }),
        }
    }

    /// Register an element; returns its element id
    pub fn add_element(&self, element: MockElement) -> String {
        self.state.lock().insert(element)
    }

    /// Detach every node matching `locator` and attach a fresh copy.
    ///
    /// Handles resolved before the call become stale.
    pub fn replace_element(&self, locator: &Locator) -> Option<String> {
        let mut state = self.state.lock();
        let model = state
            .nodes
            .iter()
            .rev()
            .find(|n| &n.model.locator == locator && !n.stale)?
            .model
            .clone();
        for node in state.nodes.iter_mut().filter(|n| &n.model.locator == locator) {
            node.stale = true;
        }
        Some(state.insert(MockElement {
            appear_after: Duration::ZERO,
            visible_after: Duration::ZERO,
            ..model
        }))
    }

    /// Detach every node matching `locator`
    pub fn remove_element(&self, locator: &Locator) {
        let mut state = self.state.lock();
        for node in state.nodes.iter_mut().filter(|n| &n.model.locator == locator) {
            node.stale = true;
        }
    }

    /// Toggle rendering of matching nodes
    pub fn set_displayed(&self, locator: &Locator, displayed: bool) {
        self.update(locator, |model| model.displayed = displayed);
    }

    /// Toggle enabled state of matching nodes
    pub fn set_enabled(&self, locator: &Locator, enabled: bool) {
        self.update(locator, |model| model.enabled = enabled);
    }

    /// Toggle overlay covering matching nodes
    pub fn set_obscured(&self, locator: &Locator, obscured: bool) {
        self.update(locator, |model| model.obscured = obscured);
    }

    fn update(&self, locator: &Locator, f: impl Fn(&mut MockElement)) {
        let mut state = self.state.lock();
        for node in state.nodes.iter_mut().filter(|n| &n.model.locator == locator) {
            f(&mut node.model);
        }
    }

    /// Set document title
    pub fn set_title(&self, title: impl Into<String>) {
        self.state.lock().title = title.into();
    }

    /// Set serialized document
    pub fn set_page_source(&self, source: impl Into<String>) {
        self.state.lock().page_source = source.into();
    }

    /// Set `document.readyState`
    pub fn set_ready_state(&self, ready_state: impl Into<String>) {
        self.state.lock().ready_state = ready_state.into();
    }

    /// Register the result returned for an exact script text
    pub fn set_script_result(&self, script: impl Into<String>, result: serde_json::Value) {
        self.state.lock().script_results.insert(script.into(), result);
    }

    /// Set mock screenshot
    pub fn set_screenshot(&self, screenshot: Screenshot) {
        self.state.lock().screenshot = Some(screenshot);
    }

    /// Native clicks received by nodes matching `locator`
    #[must_use]
    pub fn native_clicks(&self, locator: &Locator) -> usize {
        self.sum(locator, |n| n.native_clicks)
    }

    /// Script-level clicks received by nodes matching `locator`
    #[must_use]
    pub fn script_clicks(&self, locator: &Locator) -> usize {
        self.sum(locator, |n| n.script_clicks)
    }

    fn sum(&self, locator: &Locator, f: impl Fn(&MockNode) -> usize) -> usize {
        self.state
            .lock()
            .nodes
            .iter()
            .filter(|n| &n.model.locator == locator)
            .map(f)
            .sum()
    }

    /// Current value of the live node matching `locator`
    #[must_use]
    pub fn value_of(&self, locator: &Locator) -> Option<String> {
        let now = Instant::now();
        self.state
            .lock()
            .nodes
            .iter()
            .find(|n| &n.model.locator == locator && n.present(now))
            .map(|n| n.value.clone())
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state.lock().history.clone()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.state
            .lock()
            .history
            .iter()
            .any(|c| c.starts_with(method))
    }

    fn record(&self, call: String) {
        self.state.lock().history.push(call);
    }
}

fn script_error(message: impl Into<String>) -> TenazError {
    TenazError::driver(FailureKind::Script, message)
}

impl UiDriver for MockDriver {
    fn find_elements(&self, locator: &Locator) -> TenazResult<Vec<ElementHandle>> {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.history.push(format!("find:{locator}"));
        Ok(state
            .nodes
            .iter()
            .filter(|n| &n.model.locator == locator && n.present(now))
            .map(|n| ElementHandle::new(n.id.clone()).with_origin(locator.clone()))
            .collect())
    }

    fn element_state(&self, element: &ElementHandle) -> TenazResult<ElementState> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let node = state.live_node(element)?;
        Ok(ElementState {
            displayed: node.displayed(now),
            enabled: node.model.enabled,
            obscured: node.model.obscured,
            bounding_box: Some(node.model.bounding_box),
        })
    }

    fn element_text(&self, element: &ElementHandle) -> TenazResult<String> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let node = state.live_node(element)?;
        // Hidden elements report no rendered text
        Ok(if node.displayed(now) {
            node.model.text.clone()
        } else {
            String::new()
        })
    }

    fn element_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> TenazResult<Option<String>> {
        let mut state = self.state.lock();
        let node = state.live_node(element)?;
        if name == "value" {
            return Ok(Some(node.value.clone()));
        }
        Ok(node.model.attributes.get(name).cloned())
    }

    fn click(&self, element: &ElementHandle) -> TenazResult<()> {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.history.push(format!("click:{}", element.id));
        let node = state.live_node(element)?;
        if !node.displayed(now) {
            return Err(TenazError::driver(
                FailureKind::NotInteractable,
                format!("element {} is not displayed", element.id),
            ));
        }
        if node.model.native_click_failures > 0 {
            node.model.native_click_failures -= 1;
            return Err(TenazError::driver(
                FailureKind::ClickIntercepted,
                format!("click on {} would be received by an overlay", element.id),
            ));
        }
        if node.model.obscured {
            return Err(TenazError::driver(
                FailureKind::ClickIntercepted,
                format!("element {} is covered", element.id),
            ));
        }
        node.native_clicks += 1;
        Ok(())
    }

    fn clear(&self, element: &ElementHandle) -> TenazResult<()> {
        let mut state = self.state.lock();
        state.history.push(format!("clear:{}", element.id));
        state.live_node(element)?.value.clear();
        Ok(())
    }

    fn send_keys(&self, element: &ElementHandle, text: &str) -> TenazResult<()> {
        let mut state = self.state.lock();
        state.history.push(format!("send_keys:{}", element.id));
        let node = state.live_node(element)?;
        if node.model.native_type_failures > 0 {
            node.model.native_type_failures -= 1;
            return Err(TenazError::driver(
                FailureKind::NotInteractable,
                format!("element {} rejected key input", element.id),
            ));
        }
        node.value.push_str(text);
        Ok(())
    }

    fn execute_script(&self, script: &str, args: &[ScriptArg]) -> TenazResult<serde_json::Value> {
        use serde_json::Value;

        let mut state = self.state.lock();
        state.history.push(format!("script:{script}"));

        if let Some(result) = state.script_results.get(script) {
            return Ok(result.clone());
        }
        if script.contains("document.readyState") {
            return Ok(Value::String(state.ready_state.clone()));
        }

        let Some(ScriptArg::Element(element)) = args.first() else {
            return Ok(Value::Null);
        };
        let second = args.get(1).cloned();
        let node = state.live_node(element)?;
        if node.model.script_failures {
            return Err(script_error(format!("script failed on {}", element.id)));
        }

        if script.contains("scrollIntoView") {
            Ok(Value::Null)
        } else if script.contains(".click()") {
            node.script_clicks += 1;
            Ok(Value::Null)
        } else if script.contains("validationMessage") {
            Ok(Value::String(node.model.validation_message.clone()))
        } else if script.contains("checkValidity") {
            Ok(Value::Bool(node.model.validation_message.is_empty()))
        } else if script.contains(".options") {
            Ok(Value::Array(
                node.model.options.iter().cloned().map(Value::String).collect(),
            ))
        } else if script.contains(".value =") {
            match second {
                Some(ScriptArg::Value(Value::String(text))) => {
                    node.value = text;
                    Ok(Value::Null)
                }
                _ => Err(script_error("value assignment needs a string argument")),
            }
        } else if script.contains("textContent") {
            Ok(Value::String(node.model.text.clone()))
        } else {
            Ok(Value::Null)
        }
    }

    fn screenshot(&self) -> TenazResult<Screenshot> {
        self.record("screenshot".to_string());
        self.state.lock().screenshot.clone().ok_or_else(|| {
            TenazError::driver(FailureKind::Screenshot, "no mock screenshot set")
        })
    }

    fn navigate(&self, url: &str) -> TenazResult<()> {
        let mut state = self.state.lock();
        state.history.push(format!("navigate:{url}"));
        state.url = url.to_string();
        Ok(())
    }

    fn refresh(&self) -> TenazResult<()> {
        self.record("refresh".to_string());
        Ok(())
    }

    fn title(&self) -> TenazResult<String> {
        Ok(self.state.lock().title.clone())
    }

    fn current_url(&self) -> TenazResult<String> {
        Ok(self.state.lock().url.clone())
    }

    fn page_source(&self) -> TenazResult<String> {
        Ok(self.state.lock().page_source.clone())
    }

    fn delete_all_cookies(&self) -> TenazResult<()> {
        self.record("delete_all_cookies".to_string());
        Ok(())
    }

    fn maximize_window(&self) -> TenazResult<()> {
        self.record("maximize_window".to_string());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    /// 1x1 PNG header bytes (signature + IHDR)
    fn tiny_png() -> Vec<u8> {
        let mut data = PNG_SIGNATURE.to_vec();
        data.extend_from_slice(&[0, 0, 0, 13]);
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&3u32.to_be_bytes());
        data.extend_from_slice(&2u32.to_be_bytes());
        data
    }

    mod element_state_tests {
        use super::*;

        #[test]
        fn test_visible_requires_extent() {
            let state = ElementState {
                displayed: true,
                enabled: true,
                obscured: false,
                bounding_box: Some(BoundingBox::new(0.0, 0.0, 0.0, 10.0)),
            };
            assert!(!state.is_visible());
        }

        #[test]
        fn test_interactable_requires_all_three() {
            let base = ElementState {
                displayed: true,
                enabled: true,
                obscured: false,
                bounding_box: Some(BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            };
            assert!(base.is_interactable());
            assert!(!ElementState { enabled: false, ..base }.is_interactable());
            assert!(!ElementState { obscured: true, ..base }.is_interactable());
            assert!(!ElementState { displayed: false, ..base }.is_interactable());
        }
    }

    mod screenshot_tests {
        use super::*;
        use base64::Engine as _;

        #[test]
        fn test_from_base64_reads_dimensions() {
            let encoded = base64::engine::general_purpose::STANDARD.encode(tiny_png());
            let shot = Screenshot::from_base64(&encoded).unwrap();
            assert_eq!((shot.width, shot.height), (3, 2));
            assert!(shot.is_valid());
        }

        #[test]
        fn test_from_base64_rejects_garbage() {
            let err = Screenshot::from_base64("not base64!!").unwrap_err();
            assert_eq!(err.kind(), Some(FailureKind::Screenshot));
        }

        #[test]
        fn test_unknown_format_has_zero_dimensions() {
            let encoded = base64::engine::general_purpose::STANDARD.encode(b"GIF89a....");
            let shot = Screenshot::from_base64(&encoded).unwrap();
            assert_eq!((shot.width, shot.height), (0, 0));
        }
    }

    mod mock_driver_tests {
        use super::*;

        #[test]
        fn test_find_element_missing() {
            let driver = MockDriver::new();
            let err = driver.find_element(&Locator::id("nope")).unwrap_err();
            assert_eq!(err.kind(), Some(FailureKind::NoSuchElement));
        }

        #[test]
        fn test_delayed_element_appears() {
            let driver = MockDriver::new();
            let locator = Locator::id("late");
            driver.add_element(MockElement::new(locator.clone()).appear_after(Duration::from_millis(30)));
            assert!(driver.find_elements(&locator).unwrap().is_empty());
            std::thread::sleep(Duration::from_millis(40));
            assert_eq!(driver.find_elements(&locator).unwrap().len(), 1);
        }

        #[test]
        fn test_replaced_element_handle_goes_stale() {
            let driver = MockDriver::new();
            let locator = Locator::css("#submit");
            driver.add_element(MockElement::new(locator.clone()));
            let old = driver.find_element(&locator).unwrap();
            driver.replace_element(&locator).unwrap();

            let err = driver.element_state(&old).unwrap_err();
            assert_eq!(err.kind(), Some(FailureKind::StaleElement));
            let fresh = driver.find_element(&locator).unwrap();
            assert_ne!(fresh.id, old.id);
        }

        #[test]
        fn test_native_click_failures_are_consumed() {
            let driver = MockDriver::new();
            let locator = Locator::css("button");
            driver.add_element(MockElement::new(locator.clone()).fail_native_clicks(1));
            let el = driver.find_element(&locator).unwrap();
            assert!(driver.click(&el).is_err());
            assert!(driver.click(&el).is_ok());
            assert_eq!(driver.native_clicks(&locator), 1);
        }

        #[test]
        fn test_script_click_and_value() {
            let driver = MockDriver::new();
            let locator = Locator::name("email");
            driver.add_element(MockElement::new(locator.clone()));
            let el = driver.find_element(&locator).unwrap();
            driver
                .execute_script("arguments[0].click();", &[ScriptArg::Element(el.clone())])
                .unwrap();
            driver
                .execute_script(
                    "arguments[0].value = arguments[1];",
                    &[
                        ScriptArg::Element(el),
                        ScriptArg::Value(serde_json::json!("a@b.c")),
                    ],
                )
                .unwrap();
            assert_eq!(driver.script_clicks(&locator), 1);
            assert_eq!(driver.value_of(&locator).unwrap(), "a@b.c");
        }

        #[test]
        fn test_registered_script_result_wins() {
            let driver = MockDriver::new();
            driver.set_script_result("return window.ready", serde_json::json!(true));
            let value = driver.execute_script("return window.ready", &[]).unwrap();
            assert_eq!(value, serde_json::json!(true));
        }

        #[test]
        fn test_screenshot_missing_is_error() {
            let driver = MockDriver::new();
            assert!(driver.screenshot().is_err());
            driver.set_screenshot(Screenshot::new(tiny_png(), 3, 2));
            assert!(driver.screenshot().is_ok());
        }

        #[test]
        fn test_history_tracking() {
            let driver = MockDriver::new();
            driver.navigate("https://shop.test/register").unwrap();
            driver.refresh().unwrap();
            driver.delete_all_cookies().unwrap();
            driver.maximize_window().unwrap();

            assert!(driver.was_called("navigate:https://shop.test/register"));
            assert!(driver.was_called("refresh"));
            assert!(driver.was_called("delete_all_cookies"));
            assert!(driver.was_called("maximize_window"));
            assert_eq!(driver.current_url().unwrap(), "https://shop.test/register");
        }
    }
}
