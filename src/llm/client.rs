//! The provider-agnostic LLM client boundary (spec §4.6 Open Question:
//! provider identity is not fixed by the spec, so callers supply any
//! `LlmClient` impl — a real HTTP-backed one, or the mock used in tests).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Per-request timeout for the default HTTP client (spec §5: "LLM calls have
/// a per-request timeout").
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One request to an LLM provider, already rendered to its final prompt
/// text. `params` participates in the cache key (spec §4.6 step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// A provider boundary thin enough to mock in tests and implement against
/// any HTTP-based chat completion API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}

/// `reqwest`-backed client for an OpenAI-compatible chat completions
/// endpoint. A per-request timeout is configured on the underlying
/// `reqwest::Client`; a timed-out request is retried exactly once before
/// surfacing `LlmError::Timeout` (spec §5). Repair-loop retries on
/// validation failure remain the caller's responsibility (spec §4.6:
/// compile and mutate each own that retry policy).
pub struct HttpLlmClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpLlmClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_timeout(endpoint, api_key, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder with only a timeout set never fails");
        Self { http, endpoint: endpoint.into(), api_key: api_key.into() }
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<reqwest::Response, reqwest::Error> {
        self.http.post(&self.endpoint).bearer_auth(&self.api_key).json(body).send().await
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    #[tracing::instrument(skip(self, request), fields(provider = %request.provider, model = %request.model))]
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = serde_json::json!({
            "model": request.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "params": request.params,
        });

        let resp = match self.send_once(&body).await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                tracing::warn!("provider request timed out, retrying once");
                match self.send_once(&body).await {
                    Ok(resp) => resp,
                    Err(e) if e.is_timeout() => return Err(LlmError::Timeout(1)),
                    Err(e) => return Err(LlmError::Transport(e.to_string())),
                }
            }
            Err(e) => return Err(LlmError::Transport(e.to_string())),
        };

        if !resp.status().is_success() {
            return Err(LlmError::Transport(format!("status {}", resp.status())));
        }

        let parsed: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        let text = parsed
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|s| s.as_str())
            .ok_or_else(|| LlmError::MalformedResponse("missing choices[0].message.content".to_string()))?
            .to_string();

        let prompt_tokens = parsed
            .get("usage")
            .and_then(|u| u.get("prompt_tokens"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let completion_tokens = parsed
            .get("usage")
            .and_then(|u| u.get("completion_tokens"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        Ok(LlmResponse { text, prompt_tokens, completion_tokens })
    }
}
