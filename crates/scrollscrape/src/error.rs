//! Error taxonomy for the extraction pipeline.
//!
//! Only [`ScrapeError`] ever leaves `SessionController::run`. Everything else
//! is absorbed at a component boundary and surfaces as a counter in the
//! run summary.

use std::path::PathBuf;
use std::time::Duration;

use crate::retry::Transient;
use crate::types::Field;

/// Fatal errors that abort a run.
#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    #[error("navigation to {url} failed: {source}")]
    Navigation {
        url: String,
        #[source]
        source: BrowserError,
    },

    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Problems with the captured session artifact.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("session artifact not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("session artifact {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("browser rejected the session state: {0}")]
    Rejected(String),
}

/// Failures talking to the headless browser.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BrowserError {
    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("script error: {0}")]
    Script(String),

    #[error("browser context closed")]
    Closed,
}

impl Transient for BrowserError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            BrowserError::Timeout(_) | BrowserError::Network(_) | BrowserError::Protocol(_)
        )
    }
}

/// Failures from the external refinement service. Never fatal.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RefineError {
    #[error("refinement request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("quota exceeded: {0}")]
    Quota(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("service error ({reason}): {message}")]
    Service { reason: String, message: String },

    #[error("refinement disabled")]
    Disabled,
}

impl Transient for RefineError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            RefineError::Timeout | RefineError::Connection(_) | RefineError::RateLimited { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            RefineError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RefineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RefineError::Timeout
        } else if e.is_decode() {
            RefineError::Malformed(e.to_string())
        } else {
            RefineError::Connection(e.to_string())
        }
    }
}

/// Persistence failures.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Selector rule sets rejected at load time.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SelectorError {
    #[error("selector rule set is empty")]
    Empty,

    #[error("unknown field name: {0}")]
    UnknownField(String),

    #[error("no selector candidates for {0}")]
    NoCandidates(String),

    #[error("invalid selector {selector:?} for {field}: {reason}")]
    InvalidSelector {
        field: String,
        selector: String,
        reason: String,
    },

    #[error("invalid rule set document: {0}")]
    Parse(String),
}

impl SelectorError {
    pub(crate) fn invalid(field: Option<Field>, selector: &str, reason: impl Into<String>) -> Self {
        SelectorError::InvalidSelector {
            field: field.map_or_else(|| "container".to_string(), |f| f.to_string()),
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience result type.
pub type ScrapeResult<T> = Result<T, ScrapeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_error_classification() {
        assert!(BrowserError::Timeout(1000).is_transient());
        assert!(BrowserError::Network("reset".into()).is_transient());
        assert!(!BrowserError::Script("no such element".into()).is_transient());
        assert!(!BrowserError::Closed.is_transient());
    }

    #[test]
    fn test_refine_error_classification() {
        assert!(RefineError::Timeout.is_transient());
        assert!(RefineError::RateLimited { retry_after: None }.is_transient());
        assert!(!RefineError::Auth("bad key".into()).is_transient());
        assert!(!RefineError::Malformed("not json".into()).is_transient());
        assert!(!RefineError::Quota("monthly".into()).is_transient());
    }

    #[test]
    fn test_rate_limit_exposes_retry_after() {
        let err = RefineError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(RefineError::Timeout.retry_after(), None);
    }

    #[test]
    fn test_navigation_error_message() {
        let err = ScrapeError::Navigation {
            url: "https://example.com".into(),
            source: BrowserError::Timeout(30000),
        };
        assert_eq!(
            err.to_string(),
            "navigation to https://example.com failed: timed out after 30000ms"
        );
    }
}
