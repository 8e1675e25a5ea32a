//! Error taxonomy for render, fetch, and run-level failures.
//!
//! Renderer failures are classified at the adapter boundary so callers can
//! react to a typed condition (a lost browser session triggers
//! reinitialization, a timeout triggers backoff) instead of matching on
//! error text.

use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the browser session.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The underlying browser session is gone and must be recreated.
    #[error("browser session lost: {0}")]
    SessionLost(String),

    /// A bounded wait elapsed without the expected condition.
    #[error("timed out during {0}")]
    Timeout(String),

    /// Any other browser-side failure.
    #[error("browser error during {what}: {message}")]
    Browser { what: String, message: String },

    #[error("browser support not compiled; rebuild with: cargo build --features browser")]
    Unsupported,
}

impl RenderError {
    /// True when the session itself is dead and retrying requires a
    /// fresh browser instance.
    pub fn is_session_lost(&self) -> bool {
        matches!(self, RenderError::SessionLost(_))
    }
}

/// Failures surfaced by the HTTP client.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("expected {expected} but got {actual} for {url}")]
    ContentType {
        expected: &'static str,
        actual: String,
        url: String,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Run-level failures.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to persist {path}: {source}")]
    Persistence {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no identifiers found after all query refinements")]
    SearchExhausted,
}

impl AcquireError {
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AcquireError::Persistence {
            path: path.into(),
            source,
        }
    }
}
