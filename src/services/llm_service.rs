// ============================================================================
// LLM SERVICE - OpenRouter chat completions
// ============================================================================
// Purpose: Language model seam used by the booking agent and the classifiers
// ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, error};

use crate::observability::record_llm_call;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("language model not configured")]
    NotConfigured,

    #[error("language model request timed out")]
    Timeout,

    #[error("language model connection error: {0}")]
    Connection(String),

    #[error("language model API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("invalid language model response: {0}")]
    Parse(String),

    #[error("language model returned an empty response")]
    EmptyResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// One completion call. `purpose` only labels metrics and logs.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub purpose: &'static str,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the plain-text content of the first choice.
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

// ============================================================================
// OPENROUTER API STRUCTS (Internal)
// ============================================================================

#[derive(Serialize)]
struct OpenRouterRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenRouterResponse {
    #[serde(default)]
    choices: Vec<OpenRouterChoice>,
    usage: Option<OpenRouterUsage>,
}

#[derive(Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterMessageContent,
}

#[derive(Deserialize)]
struct OpenRouterMessageContent {
    #[serde(default)]
    content: Value,
}

#[derive(Deserialize, Default)]
struct OpenRouterUsage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
}

/// Keep only text from a message content value.
///
/// Content is either a plain string or an array of typed parts; any part that is
/// not `{"type":"text"}` contributes nothing.
fn plain_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

#[derive(Clone)]
pub struct OpenRouterClient {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenRouterClient {
    pub fn new(http_client: reqwest::Client, api_key: String, model: String, base_url: String) -> Self {
        Self {
            http_client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(http_client: reqwest::Client, config: &shared::config::LlmConfig) -> Self {
        Self::new(
            http_client,
            config.api_key.clone(),
            config.model.clone(),
            config.base_url.clone(),
        )
    }

    async fn call(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::NotConfigured);
        }

        let body = OpenRouterRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(purpose = request.purpose, model = %self.model, "📤 Calling OpenRouter API");

        let res = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("X-Title", "CircleHood Booking")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Connection(e.to_string())
                }
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), body });
        }

        let parsed: OpenRouterResponse = res
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let usage = parsed.usage.unwrap_or_default();
        debug!(
            purpose = request.purpose,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "📥 OpenRouter response received"
        );

        let content = parsed
            .choices
            .first()
            .map(|c| plain_text(&c.message.content))
            .unwrap_or_default();

        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(content)
    }
}

#[async_trait]
impl LanguageModel for OpenRouterClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let started = Instant::now();
        let result = self.call(&request).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(_) => record_llm_call(request.purpose, "success", elapsed),
            Err(e) => {
                error!(purpose = request.purpose, error = %e, "❌ OpenRouter call failed");
                record_llm_call(request.purpose, "error", elapsed);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            purpose: "test",
            messages: vec![ChatMessage::system("be brief"), ChatMessage::user("hello")],
            temperature: 0.0,
            max_tokens: 16,
        }
    }

    fn client(base_url: String, api_key: &str) -> OpenRouterClient {
        OpenRouterClient::new(reqwest::Client::new(), api_key.to_string(), "test-model".to_string(), base_url)
    }

    #[test]
    fn test_plain_text_ignores_non_text_parts() {
        assert_eq!(plain_text(&json!("hi")), "hi");
        assert_eq!(
            plain_text(&json!([
                {"type": "text", "text": "Hello "},
                {"type": "image_url", "image_url": {"url": "x"}},
                {"type": "text", "text": "there"}
            ])),
            "Hello there"
        );
        assert_eq!(plain_text(&Value::Null), "");
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer key-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "  Olá!  "}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 2}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client(server.uri(), "key-123").complete(request()).await.unwrap();
        assert_eq!(reply, "Olá!");
    }

    #[tokio::test]
    async fn test_complete_maps_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client(server.uri(), "key").complete(request()).await.unwrap_err();
        match err {
            LlmError::Api { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_content_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": [{"type": "image_url"}]}}]
            })))
            .mount(&server)
            .await;

        let err = client(server.uri(), "key").complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_missing_api_key_short_circuits() {
        let err = client("http://127.0.0.1:9".to_string(), "").complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured));
    }
}
