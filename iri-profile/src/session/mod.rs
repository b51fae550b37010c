//! Interactive session capability
//!
//! The remote model is only reachable through an interactive, asynchronously
//! rendering form. The client drives it through [`InteractiveSession`], a small
//! capability set (navigate, set field, select option, click, bounded wait,
//! read rendered text, fetch resource). Any backend satisfying this set is
//! usable: the bundled [`webdriver::WebDriverSession`] speaks the W3C WebDriver
//! protocol, and tests use an in-memory scripted session.
//!
//! Sessions are scoped resources. [`SessionFactory::open`] acquires one per
//! submit attempt and the client always calls [`InteractiveSession::close`]
//! before returning, on every exit path.

pub mod webdriver;

use crate::error::SessionError;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::debug;

pub use webdriver::{WebDriverFactory, WebDriverSession};

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Element locator strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Form control by `name` attribute
    Name(String),
    /// Elements carrying a CSS class
    Class(String),
    /// CSS selector
    Css(String),
    /// XPath expression
    XPath(String),
}

impl Locator {
    pub fn name(name: impl Into<String>) -> Self {
        Locator::Name(name.into())
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    /// Equivalent CSS selector, if one exists
    pub fn to_css(&self) -> Option<String> {
        match self {
            Locator::Name(name) => Some(format!("[name='{}']", name)),
            Locator::Class(class) => Some(format!(".{}", class)),
            Locator::Css(selector) => Some(selector.clone()),
            Locator::XPath(_) => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::XPath(expr) => write!(f, "xpath:{}", expr),
            other => write!(f, "{}", other.to_css().unwrap_or_default()),
        }
    }
}

/// Capability set the client needs from an automation backend
#[async_trait]
pub trait InteractiveSession: Send {
    /// Load a page; returns once the document is ready
    async fn navigate(&mut self, url: &str) -> SessionResult<()>;

    /// Set a named input's value the way a user edit would (input + change events)
    async fn set_field(&mut self, name: &str, value: &str) -> SessionResult<()>;

    /// Choose the option with the given visible text in a select control
    async fn select_option(&mut self, target: &Locator, visible_text: &str) -> SessionResult<()>;

    /// Click the first element matching `target`; `Ok(false)` when nothing matched
    async fn click(&mut self, target: &Locator) -> SessionResult<bool>;

    /// Fire a submit event on the form matched by `target`, bypassing its submit control
    async fn dispatch_submit(&mut self, target: &Locator) -> SessionResult<()>;

    /// Number of elements currently matching `target`
    async fn count(&mut self, target: &Locator) -> SessionResult<usize>;

    /// Whether the first element matching `target` is enabled
    async fn is_enabled(&mut self, target: &Locator) -> SessionResult<bool>;

    /// Text content of the first element matching `target`
    async fn rendered_text(&mut self, target: &Locator) -> SessionResult<Option<String>>;

    /// `href` of the first link whose text contains one of `labels` (case-insensitive)
    async fn link_href(&mut self, labels: &[&str]) -> SessionResult<Option<String>>;

    /// Plain network fetch of a text resource
    async fn fetch(&mut self, url: &str, timeout: Duration) -> SessionResult<String>;

    /// Release the session and everything it holds
    async fn close(&mut self) -> SessionResult<()>;

    /// Wait until `target` is present, polling every `interval`, for at most `timeout`.
    ///
    /// Returns `Ok(false)` on expiry. Lookup errors count as "not present yet".
    async fn wait_for(
        &mut self,
        target: &Locator,
        timeout: Duration,
        interval: Duration,
    ) -> SessionResult<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.count(target).await {
                Ok(n) if n > 0 => return Ok(true),
                Ok(_) => {}
                Err(e) => debug!(locator = %target, error = %e, "Lookup failed while waiting"),
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(interval).await;
        }
    }
}

/// Acquires fresh sessions, one per submit attempt
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: InteractiveSession;

    /// Open a new session; `page_load_timeout` bounds page-ready waits
    async fn open(&self, page_load_timeout: Duration) -> SessionResult<Self::Session>;
}

/// Fixed-interval poll budget.
///
/// Each [`BoundedPoll::wait`] sleeps one interval and reports whether another
/// check is allowed, so a loop guarded by it never waits longer than
/// `max_polls × interval`. Callers choose their own forced-continuation branch
/// once the budget is spent.
#[derive(Debug, Clone)]
pub struct BoundedPoll {
    max_polls: u32,
    interval: Duration,
    used: u32,
}

impl BoundedPoll {
    pub fn new(max_polls: u32, interval: Duration) -> Self {
        Self {
            max_polls,
            interval,
            used: 0,
        }
    }

    /// Sleep one interval; `false` once the budget is exhausted
    pub async fn wait(&mut self) -> bool {
        tokio::time::sleep(self.interval).await;
        self.used += 1;
        self.used < self.max_polls
    }

    /// Polls consumed so far
    pub fn used(&self) -> u32 {
        self.used
    }
}
