//! Client for OpenAI-compatible chat completion APIs.
//!
//! Works against LiteLLM proxies, hosted providers and local servers
//! (vLLM, llama.cpp, Ollama) that expose `/chat/completions`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

use crate::error::LlmError;

/// One chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// "system", "user" or "assistant".
    #[serde(default)]
    pub role: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
}

impl Message {
    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }
}

/// Chat completion request, serialized as the `/chat/completions` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model identifier; empty means the client's default model.
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Chat completion response.
///
/// Local servers often omit `id`, `usage` or `finish_reason` and may send
/// `null` content, so every field except `choices` is optional on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub usage: Usage,
}

impl GenerationResponse {
    /// Content of the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: Message,
    /// Why generation stopped ("stop", "length"), empty when not reported.
    #[serde(default, deserialize_with = "null_as_default")]
    pub finish_reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Anything that can answer a chat completion request.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;
}

/// Client for an OpenAI-compatible endpoint.
pub struct LiteLlmClient {
    api_base: String,
    api_key: Option<String>,
    default_model: String,
    http_client: Client,
}

impl LiteLlmClient {
    /// Creates a client for `api_base` (for example `http://localhost:4000/v1`).
    ///
    /// `default_model` fills requests whose model is empty. `timeout`
    /// bounds each request end to end.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::RequestFailed` if the HTTP client cannot be built.
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            default_model: default_model.into(),
            http_client,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Maps a non-success status and body to an `LlmError`, preferring the
/// OpenAI-style `{"error": {"message": ...}}` text when present.
fn status_error(status: u16, body: String) -> LlmError {
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.error.message)
        .unwrap_or(body);

    if status == 429 {
        LlmError::RateLimited(message)
    } else {
        LlmError::ApiError {
            code: status,
            message,
        }
    }
}

#[async_trait]
impl LlmProvider for LiteLlmClient {
    async fn generate(&self, mut request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        if request.model.is_empty() {
            request.model = self.default_model.clone();
        }

        let mut http_request = self.http_client.post(self.completions_url()).json(&request);
        if let Some(api_key) = &self.api_key {
            http_request = http_request.bearer_auth(api_key);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), body));
        }

        response
            .json::<GenerationResponse>()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::system("s").role, "system");
        assert_eq!(Message::user("u").role, "user");
        assert_eq!(Message::assistant("a").content, "a");
    }

    #[test]
    fn test_generation_request_builder() {
        let request = GenerationRequest::new("deepseek-coder", vec![Message::user("test")])
            .with_temperature(0.7)
            .with_max_tokens(1000);

        assert_eq!(request.model, "deepseek-coder");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(1000));
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = LiteLlmClient::new(
            "http://localhost:4000/v1/",
            Some("test-key".to_string()),
            "deepseek-coder",
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(client.api_base(), "http://localhost:4000/v1");
        assert_eq!(client.default_model(), "deepseek-coder");
        assert!(client.has_api_key());
    }

    #[tokio::test]
    async fn test_generate_connection_error() {
        let client = LiteLlmClient::new(
            "http://localhost:65535",
            None,
            "deepseek-coder",
            Duration::from_secs(2),
        )
        .unwrap();

        let request = GenerationRequest::new("", vec![Message::user("test")]);
        let err = client.generate(request).await.unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed(_)));
    }

    #[test]
    fn test_request_skips_unset_fields() {
        let request = GenerationRequest::new("deepseek-coder", vec![Message::user("test")])
            .with_temperature(0.7);

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"temperature\":0.7"));
        assert!(!json.contains("max_tokens"));
    }

    #[test]
    fn test_lenient_response_parsing() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"def f():\n    return 1"},"finish_reason":null}],"usage":null}"#;
        let response: GenerationResponse = serde_json::from_str(body).unwrap();

        assert_eq!(response.first_content(), Some("def f():\n    return 1"));
        assert_eq!(response.usage.total_tokens, 0);
        assert_eq!(response.choices[0].finish_reason, "");
        assert_eq!(response.id, "");
    }

    #[test]
    fn test_null_content_is_empty() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let response: GenerationResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.first_content(), Some(""));
    }

    #[test]
    fn test_status_error_mapping() {
        let err = status_error(429, r#"{"error":{"message":"slow down"}}"#.to_string());
        assert!(matches!(err, LlmError::RateLimited(ref m) if m == "slow down"));

        let err = status_error(500, "upstream exploded".to_string());
        assert!(
            matches!(err, LlmError::ApiError { code: 500, ref message } if message == "upstream exploded")
        );
    }
}
