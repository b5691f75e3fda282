//! Refinement over a plain JSON-over-HTTP contract.
//!
//! Request: `POST {endpoint}` with `{"title": ..., "content": ...}`.
//! Success: `200` with the same shape. Failure: any non-2xx status, optionally
//! with `{"error": {"reason": ..., "message": ...}}` in the body.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{classify_status, retry_after, RefineRequest, RefinedText, Refiner};
use crate::error::RefineError;

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Client for a self-hosted refinement endpoint.
#[derive(Clone)]
pub struct HttpRefiner {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRefiner {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Refiner for HttpRefiner {
    fn name(&self) -> &str {
        "http"
    }

    async fn refine(&self, request: &RefineRequest) -> Result<Option<RefinedText>, RefineError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            let text: RefinedText = serde_json::from_str(&body)
                .map_err(|e| RefineError::Malformed(e.to_string()))?;
            debug!(endpoint = %self.endpoint, "refinement response received");
            return Ok(Some(text));
        }

        let wait = retry_after(resp.headers());
        let body = resp.text().await.unwrap_or_default();
        let (reason, message) = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => (
                parsed.error.reason,
                parsed.error.message.unwrap_or_default(),
            ),
            Err(_) => (None, body),
        };
        Err(classify_status(
            status.as_u16(),
            wait,
            reason.as_deref(),
            message,
        ))
    }
}
