//! Language-model HTTP client.
//!
//! Talks to an Ollama-compatible inference server in two modes: stateless
//! single-turn generation (`/api/generate`) and multi-turn chat
//! (`/api/chat`). Each method is one round-trip; retry policy belongs to
//! the caller, which loops over the typed [`LlmError`] result instead of
//! swallowing exceptions.

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::LlmConfig;
use crate::models::ChatMessage;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("server returned HTTP {0}")]
    Status(u16),
    #[error("empty response from model")]
    EmptyResponse,
    #[error("malformed response payload: {0}")]
    Payload(String),
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// Thin client over the inference server. Cheap to share; `reqwest::Client`
/// is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: Client,
    base_url: String,
    default_model: String,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_model: config.model.clone(),
        })
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Single-turn stateless generation. The system prompt, when present,
    /// is prepended to the user prompt.
    pub async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        model: Option<&str>,
    ) -> Result<String, LlmError> {
        let full_prompt = match system {
            Some(sys) => format!("{}\n\n{}", sys.trim(), prompt.trim()),
            None => prompt.trim().to_string(),
        };
        let model = model.unwrap_or(&self.default_model);

        debug!(model, prompt_len = full_prompt.len(), "generate request");

        let body = self
            .post_json(
                "/api/generate",
                &GenerateRequest {
                    model,
                    prompt: full_prompt,
                    stream: false,
                },
            )
            .await?;

        let text = body
            .get("response")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LlmError::Payload("missing 'response' field".to_string()))?
            .trim()
            .to_string();

        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }

    /// One chat round-trip over the given message list. History management
    /// is the caller's responsibility.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
    ) -> Result<String, LlmError> {
        let model = model.unwrap_or(&self.default_model);

        debug!(model, turns = messages.len(), "chat request");

        let body = self
            .post_json(
                "/api/chat",
                &ChatRequest {
                    model,
                    messages,
                    stream: false,
                },
            )
            .await?;

        let text = body
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| LlmError::Payload("missing 'message.content' field".to_string()))?
            .trim()
            .to_string();

        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }

    async fn post_json<T: Serialize>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<serde_json::Value, LlmError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Status(status.as_u16()));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| LlmError::Payload(e.to_string()))
    }
}

/// Linear backoff delay before retrying: attempt N sleeps N * backoff_ms.
pub async fn backoff_sleep(attempt: u32, backoff_ms: u64) {
    tokio::time::sleep(Duration::from_millis(u64::from(attempt) * backoff_ms)).await;
}
