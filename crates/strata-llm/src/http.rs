//! HTTP compressor for OpenAI-compatible chat-completions endpoints.
//!
//! Non-streaming, Bearer auth, one request per block. Works against any
//! endpoint speaking the `/chat/completions` dialect (OpenRouter is the
//! default deployment target).

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::compressor::{COMPRESSION_INSTRUCTION, Compressor, CompressorError, CompressorResult};

/// Cap on completion length; compressed blocks should land well under this.
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2_048;

/// Maximum bytes of an unparseable error body quoted in an error message.
///
/// Gateways answer some failures with whole HTML pages; those end up in
/// warn-level logs, so the quoted portion is capped.
const ERROR_BODY_MAX_LENGTH: usize = 512;

/// Environment variables searched for an API key, in order.
const API_KEY_VARS: [&str; 2] = ["STRATA_API_KEY", "OPENROUTER_API_KEY"];

/// Configuration for [`HttpCompressor`].
#[derive(Clone, Debug)]
pub struct HttpCompressorConfig {
    /// Base URL up to but excluding `/chat/completions`.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Bearer token.
    pub api_key: String,
    /// Maximum completion tokens per call.
    pub max_output_tokens: u32,
}

impl HttpCompressorConfig {
    /// Create a config with the default output-token cap.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

/// Compression client for OpenAI-compatible endpoints.
pub struct HttpCompressor {
    config: HttpCompressorConfig,
    client: reqwest::Client,
}

impl HttpCompressor {
    /// Create a new compressor.
    #[must_use]
    pub fn new(config: HttpCompressorConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Create a new compressor with a shared HTTP client.
    #[must_use]
    pub fn with_client(config: HttpCompressorConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Build a compressor from environment credentials.
    ///
    /// Searches `STRATA_API_KEY` then `OPENROUTER_API_KEY`. Returns `None`
    /// when neither is set, which is how a keyless environment surfaces as
    /// "compression capability unavailable" instead of failing mid-round.
    #[must_use]
    pub fn from_env(base_url: &str, model: &str) -> Option<Self> {
        let api_key = API_KEY_VARS
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))?;
        Some(Self::new(HttpCompressorConfig::new(base_url, model, api_key)))
    }

    /// Build HTTP headers for the request.
    fn build_headers(&self) -> CompressorResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = format!("Bearer {}", self.config.api_key);
        let _ = headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|e| CompressorError::Auth {
                message: format!("Invalid API key header: {e}"),
            })?,
        );
        Ok(headers)
    }
}

#[async_trait]
impl Compressor for HttpCompressor {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn compress(&self, text: &str) -> CompressorResult<String> {
        let base_url = self.config.base_url.trim_end_matches('/');
        let url = format!("{base_url}/chat/completions");
        let headers = self.build_headers()?;

        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": COMPRESSION_INSTRUCTION},
                {"role": "user", "content": text},
            ],
            "max_tokens": self.config.max_output_tokens,
            "temperature": 0.2,
        });

        debug!(
            model = %self.config.model,
            input_chars = text.len(),
            "sending compression request"
        );

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(CompressorError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let (message, retryable) = parse_api_error(&body_text, status.as_u16());
            error!(status = status.as_u16(), retryable, "compression API error");
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(CompressorError::Auth { message });
            }
            return Err(CompressorError::Api {
                status: status.as_u16(),
                message,
                retryable,
            });
        }

        let completion: ChatCompletionResponse =
            response.json().await.map_err(CompressorError::Http)?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| CompressorError::EmptyCompletion {
                model: self.config.model.clone(),
            })
    }
}

/// Parse an API error response body.
///
/// Tries the standard `{"error": {"message": ...}}` envelope first, falling
/// back to the raw body truncated to [`ERROR_BODY_MAX_LENGTH`]. 429 and 5xx
/// are retryable.
fn parse_api_error(body: &str, status: u16) -> (String, bool) {
    let retryable = status == 429 || status >= 500;
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value.pointer("/error/message").and_then(Value::as_str) {
            return (message.to_owned(), retryable);
        }
    }
    let quoted = strata_core::text::truncate_str(body, ERROR_BODY_MAX_LENGTH);
    (format!("HTTP {status}: {quoted}"), retryable)
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
