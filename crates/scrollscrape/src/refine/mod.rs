//! Optional normalization of free-text fields through an external service.
//!
//! The pipeline always holds a [`Refinement`]; when refinement is disabled it
//! wraps a [`NoopRefiner`], which passes every record through untouched. A
//! failing call never aborts anything: the record keeps its original text and
//! the failure is reported through [`RefineOutcome::Failed`].

pub mod http;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::RefineError;
use crate::retry::RetryPolicy;
use crate::types::Record;

pub use http::HttpRefiner;
pub use openai::{OpenAiRefiner, RefineMode};

/// Text sent to the refinement service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefineRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl RefineRequest {
    pub fn from_record(record: &Record) -> Self {
        Self {
            title: record.fields.title.clone(),
            content: record.fields.content.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.as_deref().map_or(true, str::is_empty)
            && self.content.as_deref().map_or(true, str::is_empty)
    }
}

/// Cleaned text returned by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinedText {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl RefinedText {
    /// Overwrite the record's free-text fields. Missing or blank values keep
    /// the original text.
    pub fn apply_to(self, record: &mut Record) {
        if let Some(title) = self.title.filter(|t| !t.trim().is_empty()) {
            record.fields.title = Some(title.trim().to_string());
        }
        if let Some(content) = self.content.filter(|c| !c.trim().is_empty()) {
            record.fields.content = Some(content.trim().to_string());
        }
    }
}

/// A normalization backend.
#[async_trait]
pub trait Refiner: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Refine one request. `Ok(None)` leaves the record as it is.
    async fn refine(&self, request: &RefineRequest) -> Result<Option<RefinedText>, RefineError>;
}

/// The disabled variant.
pub struct NoopRefiner;

#[async_trait]
impl Refiner for NoopRefiner {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn refine(&self, _request: &RefineRequest) -> Result<Option<RefinedText>, RefineError> {
        Ok(None)
    }
}

/// What happened to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefineOutcome {
    Refined,
    /// Nothing to send, or the backend passed the record through.
    Unchanged,
    Failed(RefineError),
}

/// A refiner plus its timeout and retry policy.
#[derive(Clone)]
pub struct Refinement {
    refiner: Arc<dyn Refiner>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Refinement {
    pub fn new(refiner: Arc<dyn Refiner>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            refiner,
            retry,
            timeout,
        }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopRefiner), RetryPolicy::no_retry(), Duration::ZERO)
    }

    pub fn backend(&self) -> &str {
        self.refiner.name()
    }

    /// Refine `record` in place. Its key and capture time never change.
    pub async fn refine_record(&self, record: &mut Record, clock: &dyn Clock) -> RefineOutcome {
        let request = RefineRequest::from_record(record);
        if request.is_empty() {
            return RefineOutcome::Unchanged;
        }

        let refiner = &self.refiner;
        let request = &request;
        let timeout = self.timeout;
        let result = self
            .retry
            .run(clock, "refine", move |_| async move {
                if timeout.is_zero() {
                    return refiner.refine(request).await;
                }
                tokio::time::timeout(timeout, refiner.refine(request))
                    .await
                    .map_err(|_| RefineError::Timeout)?
            })
            .await;

        match result {
            Ok(Some(text)) => {
                text.apply_to(record);
                debug!(key = record.container_key(), "record refined");
                RefineOutcome::Refined
            }
            Ok(None) => RefineOutcome::Unchanged,
            Err(e) => {
                let e = e.into_inner();
                warn!(
                    key = record.container_key(),
                    backend = self.refiner.name(),
                    error = %e,
                    "refinement failed, keeping original text"
                );
                RefineOutcome::Failed(e)
            }
        }
    }
}

/// Map an unsuccessful HTTP status to a refinement error.
pub(crate) fn classify_status(
    status: u16,
    retry_after: Option<Duration>,
    reason: Option<&str>,
    message: String,
) -> RefineError {
    match (status, reason) {
        (_, Some("insufficient_quota" | "quota_exceeded")) | (402, _) => {
            RefineError::Quota(message)
        }
        (_, Some("rate_limited")) | (429, _) => RefineError::RateLimited { retry_after },
        (401 | 403, _) | (_, Some("unauthorized" | "invalid_api_key")) => RefineError::Auth(message),
        (408, _) => RefineError::Timeout,
        (500..=599, _) => RefineError::Connection(format!("server error {status}: {message}")),
        (_, Some(reason)) => RefineError::Service {
            reason: reason.to_string(),
            message,
        },
        _ => RefineError::Service {
            reason: format!("http_{status}"),
            message,
        },
    }
}

/// Parse a `Retry-After` header given in seconds.
pub(crate) fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
