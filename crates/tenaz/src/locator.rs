//! Locators and interaction targets.
//!
//! A [`Locator`] is an immutable description of how to find an element. An
//! [`InteractionTarget`] is what the interaction layer operates on: either a
//! locator, re-resolved on every attempt, or an element handle that was
//! resolved once and must still be live when used.
//!
//! Locator-based retries survive the page replacing the DOM node; handle-based
//! retries do not. Prefer locators for anything that re-renders.

use crate::driver::ElementHandle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy used to resolve a locator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// CSS selector (e.g., "button.primary")
    Css,
    /// XPath expression
    XPath,
    /// Element id attribute
    Id,
    /// Element name attribute
    Name,
    /// Exact link text
    LinkText,
    /// Partial link text
    PartialLinkText,
    /// Tag name
    TagName,
    /// Single class name
    ClassName,
    /// `data-testid` attribute
    TestId,
}

impl Strategy {
    /// Short prefix used in descriptions
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::XPath => "xpath",
            Self::Id => "id",
            Self::Name => "name",
            Self::LinkText => "link",
            Self::PartialLinkText => "partial-link",
            Self::TagName => "tag",
            Self::ClassName => "class",
            Self::TestId => "test-id",
        }
    }
}

/// How to find an element: strategy plus selector string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    strategy: Strategy,
    selector: String,
}

impl Locator {
    /// Create a locator from parts
    #[must_use]
    pub fn new(strategy: Strategy, selector: impl Into<String>) -> Self {
        Self {
            strategy,
            selector: selector.into(),
        }
    }

    /// CSS selector locator
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(Strategy::Css, selector)
    }

    /// XPath locator
    #[must_use]
    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::new(Strategy::XPath, expression)
    }

    /// Id locator
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self::new(Strategy::Id, id)
    }

    /// Name attribute locator
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::new(Strategy::Name, name)
    }

    /// Link text locator
    #[must_use]
    pub fn link_text(text: impl Into<String>) -> Self {
        Self::new(Strategy::LinkText, text)
    }

    /// Partial link text locator
    #[must_use]
    pub fn partial_link_text(text: impl Into<String>) -> Self {
        Self::new(Strategy::PartialLinkText, text)
    }

    /// Tag name locator
    #[must_use]
    pub fn tag_name(tag: impl Into<String>) -> Self {
        Self::new(Strategy::TagName, tag)
    }

    /// Class name locator
    #[must_use]
    pub fn class_name(class: impl Into<String>) -> Self {
        Self::new(Strategy::ClassName, class)
    }

    /// `data-testid` locator
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::new(Strategy::TestId, id)
    }

    /// Get the strategy
    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Get the selector string
    #[must_use]
    pub fn selector(&self) -> &str {
        &self.selector
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy.prefix(), self.selector)
    }
}

/// What an interaction operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionTarget {
    /// Resolved lazily, re-resolved on every retry
    Locator(Locator),
    /// Resolved once; must pass liveness checks before use
    Element(ElementHandle),
}

impl InteractionTarget {
    /// Human-readable description for logs and failure messages
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Locator(locator) => locator.to_string(),
            Self::Element(element) => match &element.origin {
                Some(origin) => format!("element {} (from {origin})", element.id),
                None => format!("element {}", element.id),
            },
        }
    }

    /// The locator, when the target is locator-based
    #[must_use]
    pub const fn locator(&self) -> Option<&Locator> {
        match self {
            Self::Locator(locator) => Some(locator),
            Self::Element(_) => None,
        }
    }
}

impl fmt::Display for InteractionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

impl From<Locator> for InteractionTarget {
    fn from(locator: Locator) -> Self {
        Self::Locator(locator)
    }
}

impl From<&Locator> for InteractionTarget {
    fn from(locator: &Locator) -> Self {
        Self::Locator(locator.clone())
    }
}

impl From<ElementHandle> for InteractionTarget {
    fn from(element: ElementHandle) -> Self {
        Self::Element(element)
    }
}

/// Bounding box for an element
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// X position
    pub x: f32,
    /// Y position
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl BoundingBox {
    /// Create a new bounding box
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the box covers any area at all
    #[must_use]
    pub fn has_extent(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}
