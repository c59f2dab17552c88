//! Browser automation seam.
//!
//! The pipeline only needs a handful of operations from a browser: navigate,
//! query (optionally waiting), run a script, read the current URL and close.
//! [`chrome::ChromeSession`] implements them over headless Chrome; tests drive
//! the same trait with a scripted DOM.

pub mod chrome;

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::SessionError;

/// What a bounded wait waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitKind {
    /// Element exists in the DOM.
    Presence,
    /// Element exists and has a rendered box.
    Visibility,
}

/// Owned snapshot of a DOM element at query time.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Element {
    #[serde(default)]
    text: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
}

impl Element {
    pub fn new(text: impl Into<String>, attributes: HashMap<String, String>) -> Self {
        Self {
            text: text.into(),
            attributes,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// One exclusively-owned browser page.
///
/// Waits are synchronous poll-with-timeout: `find_one` blocks until the element
/// satisfies `wait` or `timeout` elapses, and a timeout is `Ok(None)`, never an error.
pub trait BrowserSession: Send + Sync {
    fn navigate(&self, url: &str) -> Result<(), SessionError>;

    fn find_one(
        &self,
        selector: &str,
        wait: WaitKind,
        timeout: Duration,
    ) -> Result<Option<Element>, SessionError>;

    fn find_all(&self, selector: &str) -> Result<Vec<Element>, SessionError>;

    /// Evaluate a JavaScript expression and return its value, if any.
    fn execute_script(&self, script: &str) -> Result<Option<serde_json::Value>, SessionError>;

    fn current_url(&self) -> Result<String, SessionError>;

    /// Leave the current page so the next navigation cannot match stale elements.
    fn reset_page(&self) -> Result<(), SessionError> {
        self.navigate("about:blank")
    }

    fn close(&self) -> Result<(), SessionError>;
}
