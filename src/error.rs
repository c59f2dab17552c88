//! Error types for the harvest pipeline.
//!
//! Only input problems and an unusable browser session end a harvest. Field
//! misses, image failures and per-item errors are tallied in the report instead.

use thiserror::Error;
use tracing::warn;

/// Failure reported by a [`crate::browser::BrowserSession`] call.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The browser or its connection is gone; nothing else can be done with this session.
    #[error("Browser session unusable: {0}")]
    Fatal(String),
    /// A single call failed (navigation error, script exception, ...).
    #[error("Browser operation failed: {0}")]
    Operation(String),
    #[error("Invalid selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },
}

impl SessionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Fatal(_))
    }
}

/// Turn a recoverable session error into `None` so the caller can skip the
/// step. Fatal errors are passed through.
pub fn recover<T>(result: Result<T, SessionError>, context: &str) -> Result<Option<T>, SessionError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!("⚠️ {} failed, skipping: {}", context, e);
            Ok(None)
        }
    }
}

/// Terminal harvest failures.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Invalid marketplace URL '{input}': {reason}")]
    InvalidUrl { input: String, reason: String },
    #[error("Expected a {expected} URL but '{url}' is a {actual} URL")]
    KindMismatch {
        url: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("Target not found or inaccessible: {0}")]
    NotFound(String),
    #[error("Could not find user profile information on {0}")]
    ProfileUnavailable(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}
