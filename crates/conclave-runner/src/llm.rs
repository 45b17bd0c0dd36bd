//! HTTP language-model backends.
//!
//! Two request dialects cover every supported provider: the `OpenAI` chat
//! completions API (also spoken by `OpenRouter`) and the Anthropic
//! Messages API. [`LlmBackend`] dispatches between them and implements
//! [`ModelClient`], so the engine's retry policy sees every transport or
//! status failure as a [`CallError::Backend`].
//!
//! Replies are handed back as raw text; repairing near-JSON output is the
//! sanitizer's job, not the backend's.

use serde::Serialize;
use serde_json::Value;

use conclave_core::{CallError, ModelClient, ModelReply, Prompt, Provider};

use crate::config::BackendConfig;

/// Generated-token budget for the Anthropic API, which requires one.
/// Chat completions requests carry no cap.
const ANTHROPIC_MAX_TOKENS: u32 = 4096;

/// `OpenRouter` attribution headers.
const OPENROUTER_REFERER: &str = "https://github.com/conclave-games/conclave";
const OPENROUTER_TITLE: &str = "Social Deduction Game";

// ---------------------------------------------------------------------------
// Unified backend enum
// ---------------------------------------------------------------------------

/// A model backend reachable over HTTP.
#[derive(Debug)]
pub enum LlmBackend {
    /// `OpenAI`-compatible chat completions API.
    OpenAi(OpenAiBackend),
    /// Anthropic Messages API.
    Anthropic(AnthropicBackend),
}

impl LlmBackend {
    /// Build the backend matching `config.provider`.
    pub fn new(config: &BackendConfig, client: reqwest::Client) -> Self {
        match config.provider {
            Provider::OpenAi | Provider::OpenRouter => {
                Self::OpenAi(OpenAiBackend::new(config, client))
            }
            Provider::Anthropic => Self::Anthropic(AnthropicBackend::new(config, client)),
        }
    }

    /// Human-readable name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OpenAi(backend) if backend.attribution => "openrouter",
            Self::OpenAi(_) => "openai-compatible",
            Self::Anthropic(_) => "anthropic",
        }
    }

    /// Model identifier sent with every request.
    pub fn model(&self) -> &str {
        match self {
            Self::OpenAi(backend) => &backend.model,
            Self::Anthropic(backend) => &backend.model,
        }
    }
}

impl ModelClient for LlmBackend {
    async fn complete(&self, prompt: &Prompt) -> Result<ModelReply, CallError> {
        let text = match self {
            Self::OpenAi(backend) => backend.complete(prompt).await?,
            Self::Anthropic(backend) => backend.complete(prompt).await?,
        };
        Ok(ModelReply::Text(text))
    }
}

/// Reasoning models reject a sampling temperature.
fn supports_temperature(model: &str) -> bool {
    !(model.starts_with("o1") || model.starts_with("o3"))
}

// ---------------------------------------------------------------------------
// OpenAI-compatible backend
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

/// Backend for `OpenAI`-compatible chat completions APIs.
///
/// Sends requests to `{api_url}/chat/completions`. When `attribution` is
/// set the `OpenRouter` referer and title headers are attached.
#[derive(Debug)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    attribution: bool,
}

impl OpenAiBackend {
    fn new(config: &BackendConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            attribution: config.provider == Provider::OpenRouter,
        }
    }

    fn request<'a>(&'a self, prompt: &'a Prompt) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: supports_temperature(&self.model).then_some(self.temperature),
        }
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, CallError> {
        let url = format!("{}/chat/completions", self.api_url);

        let mut request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request(prompt));
        if self.attribution {
            request = request
                .header("HTTP-Referer", OPENROUTER_REFERER)
                .header("X-Title", OPENROUTER_TITLE);
        }

        let json = send(request, "OpenAI").await?;
        extract_openai_content(&json)
    }
}

/// Extract the text content from a chat completions response.
fn extract_openai_content(json: &Value) -> Result<String, CallError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            CallError::Backend("OpenAI response missing choices[0].message.content".to_owned())
        })
}

// ---------------------------------------------------------------------------
// Anthropic Messages API backend
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    max_tokens: u32,
}

/// Backend for the Anthropic Messages API.
///
/// The system prompt is a top-level field, authentication uses the
/// `x-api-key` header and text comes back in `content[0].text`.
#[derive(Debug)]
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f64,
}

impl AnthropicBackend {
    fn new(config: &BackendConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }

    fn request<'a>(&'a self, prompt: &'a Prompt) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            system: &prompt.system,
            messages: [ChatMessage {
                role: "user",
                content: &prompt.user,
            }],
            temperature: Some(self.temperature),
            max_tokens: ANTHROPIC_MAX_TOKENS,
        }
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, CallError> {
        let url = format!("{}/messages", self.api_url);

        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&self.request(prompt));

        let json = send(request, "Anthropic").await?;
        extract_anthropic_content(&json)
    }
}

/// Extract the text content from a Messages API response.
fn extract_anthropic_content(json: &Value) -> Result<String, CallError> {
    json.get("content")
        .and_then(|c| c.get(0))
        .and_then(|b| b.get("text"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| CallError::Backend("Anthropic response missing content[0].text".to_owned()))
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Send a request and decode a successful JSON body.
async fn send(request: reqwest::RequestBuilder, provider: &str) -> Result<Value, CallError> {
    let response = request
        .send()
        .await
        .map_err(|e| CallError::Backend(format!("{provider} request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_owned());
        return Err(CallError::Backend(format!(
            "{provider} returned {status}: {error_body}"
        )));
    }

    response
        .json()
        .await
        .map_err(|e| CallError::Backend(format!("{provider} response parse failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: Provider, model: &str) -> BackendConfig {
        BackendConfig {
            provider,
            api_url: "http://localhost:8080/v1".to_owned(),
            api_key: "test".to_owned(),
            model: model.to_owned(),
            temperature: 0.1,
        }
    }

    fn prompt() -> Prompt {
        Prompt {
            system: "You are P1.".to_owned(),
            user: "Turn 1 of 10.".to_owned(),
        }
    }

    #[test]
    fn extract_openai_content_valid() {
        let json = serde_json::json!({
            "choices": [{"message": {"content": "{\"bid\": 0.4, \"msg\": \"hello\"}"}}]
        });
        let result = extract_openai_content(&json);
        assert!(result.is_ok());
        assert!(result.unwrap_or_default().contains("hello"));
    }

    #[test]
    fn extract_openai_content_missing_choices() {
        let json = serde_json::json!({"error": "rate_limit"});
        assert!(matches!(extract_openai_content(&json), Err(CallError::Backend(_))));
    }

    #[test]
    fn extract_anthropic_content_valid() {
        let json = serde_json::json!({
            "content": [{"type": "text", "text": "{\"selected_messages\": []}"}]
        });
        let result = extract_anthropic_content(&json);
        assert!(result.unwrap_or_default().contains("selected_messages"));
    }

    #[test]
    fn extract_anthropic_content_missing() {
        let json = serde_json::json!({"content": []});
        assert!(extract_anthropic_content(&json).is_err());
    }

    #[test]
    fn backend_follows_provider() {
        let client = reqwest::Client::new();
        let cases = [
            (Provider::OpenAi, "openai-compatible"),
            (Provider::OpenRouter, "openrouter"),
            (Provider::Anthropic, "anthropic"),
        ];
        for (provider, name) in cases {
            let backend = LlmBackend::new(&config(provider, "some-model"), client.clone());
            assert_eq!(backend.name(), name);
            assert_eq!(backend.model(), "some-model");
        }
    }

    #[test]
    fn reasoning_models_omit_temperature() {
        let client = reqwest::Client::new();
        let prompt = prompt();

        let reasoning = OpenAiBackend::new(&config(Provider::OpenAi, "o3-mini"), client.clone());
        let body = serde_json::to_value(reasoning.request(&prompt)).unwrap_or_default();
        assert!(body.get("temperature").is_none());
        assert_eq!(body.get("model"), Some(&serde_json::json!("o3-mini")));

        let chat = OpenAiBackend::new(&config(Provider::OpenAi, "gpt-4o-mini"), client);
        let body = serde_json::to_value(chat.request(&prompt)).unwrap_or_default();
        assert_eq!(body.get("temperature"), Some(&serde_json::json!(0.1)));
        assert_eq!(
            body.pointer("/messages/1/content"),
            Some(&serde_json::json!("Turn 1 of 10."))
        );
    }

    #[test]
    fn chat_requests_carry_no_token_cap() {
        let client = reqwest::Client::new();
        let prompt = prompt();
        for model in ["o1", "o3", "o3-mini", "gpt-4o-mini"] {
            let backend = OpenAiBackend::new(&config(Provider::OpenAi, model), client.clone());
            let body = serde_json::to_value(backend.request(&prompt)).unwrap_or_default();
            assert!(body.get("max_tokens").is_none(), "{model}");
            assert!(body.get("max_completion_tokens").is_none(), "{model}");
        }
    }

    #[test]
    fn anthropic_request_lifts_system_prompt() {
        let backend =
            AnthropicBackend::new(&config(Provider::Anthropic, "claude-haiku-4-5"), reqwest::Client::new());
        let body = serde_json::to_value(backend.request(&prompt())).unwrap_or_default();
        assert_eq!(body.get("system"), Some(&serde_json::json!("You are P1.")));
        assert_eq!(
            body.pointer("/messages/0/role"),
            Some(&serde_json::json!("user"))
        );
        assert_eq!(
            body.get("max_tokens"),
            Some(&serde_json::json!(ANTHROPIC_MAX_TOKENS))
        );
    }
}
