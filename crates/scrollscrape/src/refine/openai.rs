//! OpenAI chat-completions backend.
//!
//! The model is asked for a JSON object with `title` and `content` keys, so
//! the reply maps straight onto [`RefinedText`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{classify_status, retry_after, RefineRequest, RefinedText, Refiner};
use crate::error::RefineError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f64 = 0.3;

const SYSTEM_PROMPT: &str = "You refine text scraped from web pages. \
    Reply with a single JSON object with the string keys \"title\" and \"content\". \
    Keep the original language.";

/// What the model is asked to do with each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefineMode {
    /// Strip stray characters and fix formatting.
    #[default]
    Clean,
    /// Shorten the content to a summary of at most `max_words` words.
    Summarize { max_words: u32 },
    /// Replace the content with its `count` main points joined by ` | `.
    KeyPoints { count: u32 },
}

impl RefineMode {
    fn instruction(&self) -> String {
        match self {
            RefineMode::Clean => "Clean this text: remove unnecessary special characters, \
                fix the formatting and keep only the relevant content."
                .to_string(),
            RefineMode::Summarize { max_words } => format!(
                "Summarize the content in at most {max_words} words and keep the title concise."
            ),
            RefineMode::KeyPoints { count } => format!(
                "Extract the {count} main points of the content. Return them in \"content\" \
                 as one line joined by \" | \", without numbering or introduction. \
                 Keep the title unchanged."
            ),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Chat-completions client.
#[derive(Clone)]
pub struct OpenAiRefiner {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    mode: RefineMode,
}

impl OpenAiRefiner {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            mode: RefineMode::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_mode(mut self, mode: RefineMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn body(&self, request: &RefineRequest) -> Result<serde_json::Value, RefineError> {
        let payload =
            serde_json::to_string(request).map_err(|e| RefineError::Malformed(e.to_string()))?;
        Ok(json!({
            "model": self.model,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": format!("{}\n\n{payload}", self.mode.instruction())},
            ],
        }))
    }
}

#[async_trait]
impl Refiner for OpenAiRefiner {
    fn name(&self) -> &str {
        "openai"
    }

    async fn refine(&self, request: &RefineRequest) -> Result<Option<RefinedText>, RefineError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.body(request)?)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let wait = retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            let (reason, message) = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(parsed) => (
                    parsed.error.code.or(parsed.error.kind),
                    parsed.error.message.unwrap_or_default(),
                ),
                Err(_) => (None, body),
            };
            return Err(classify_status(
                status.as_u16(),
                wait,
                reason.as_deref(),
                message,
            ));
        }

        let body = resp.text().await?;
        let chat: ChatResponse =
            serde_json::from_str(&body).map_err(|e| RefineError::Malformed(e.to_string()))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RefineError::Malformed("no choices in response".into()))?;

        let text: RefinedText = serde_json::from_str(content.trim())
            .map_err(|e| RefineError::Malformed(format!("model reply is not JSON: {e}")))?;
        debug!(model = %self.model, "openai refinement received");
        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> RefineRequest {
        RefineRequest {
            title: Some("raw title".into()),
            content: Some("raw   content!!!".into()),
        }
    }

    fn refiner(server: &MockServer) -> OpenAiRefiner {
        OpenAiRefiner::new("sk-test", Duration::from_secs(5)).with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_completion_parsed_into_refined_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": "{\"title\": \"Raw title\", \"content\": \"Raw content.\"}"
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let out = refiner(&server).refine(&request()).await.unwrap().unwrap();
        assert_eq!(out.title.as_deref(), Some("Raw title"));
        assert_eq!(out.content.as_deref(), Some("Raw content."));
    }

    #[tokio::test]
    async fn test_non_json_reply_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Sure! Here is the text."}}]
            })))
            .mount(&server)
            .await;

        assert!(matches!(
            refiner(&server).refine(&request()).await.unwrap_err(),
            RefineError::Malformed(_)
        ));
    }

    #[tokio::test]
    async fn test_insufficient_quota() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {
                    "message": "You exceeded your current quota",
                    "type": "insufficient_quota",
                    "code": "insufficient_quota"
                }
            })))
            .mount(&server)
            .await;

        assert_eq!(
            refiner(&server).refine(&request()).await.unwrap_err(),
            RefineError::Quota("You exceeded your current quota".into())
        );
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided", "code": "invalid_api_key"}
            })))
            .mount(&server)
            .await;

        assert!(matches!(
            refiner(&server).refine(&request()).await.unwrap_err(),
            RefineError::Auth(_)
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let r = OpenAiRefiner::new("k", Duration::from_secs(1))
            .with_model("gpt-4o")
            .with_mode(RefineMode::Summarize { max_words: 50 });
        let body = r.body(&request()).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["response_format"]["type"], "json_object");
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("at most 50 words"));
        assert!(user.contains("raw title"));
    }

    #[test]
    fn test_key_points_instruction() {
        let r = OpenAiRefiner::new("k", Duration::from_secs(1))
            .with_mode(RefineMode::KeyPoints { count: 3 });
        let body = r.body(&request()).unwrap();
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("3 main points"));
        assert!(user.contains(r#"joined by " | ""#));

        let mode: RefineMode = serde_json::from_str(r#"{"key_points": {"count": 5}}"#).unwrap();
        assert_eq!(mode, RefineMode::KeyPoints { count: 5 });
    }
}
