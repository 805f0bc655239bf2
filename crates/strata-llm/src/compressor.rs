//! # Compressor Trait
//!
//! Core abstraction for the compression capability. The engine never talks to
//! a provider directly; it hands raw block text to a [`Compressor`] and gets
//! back compressed text or an error. Tests substitute scripted
//! implementations, and a missing implementation is how "capability
//! unavailable" is represented.

use async_trait::async_trait;

/// Result type alias for compressor operations.
pub type CompressorResult<T> = Result<T, CompressorError>;

/// Fixed instruction sent with every compression request.
///
/// The rewrite must stay abstractive but information-preserving; the
/// constraints below are what downstream consumers of the compacted history
/// rely on.
pub const COMPRESSION_INSTRUCTION: &str = "\
Rewrite the following conversation excerpt as a dense factual digest.

Requirements:
- Preserve every fact, decision, constraint, and open question.
- Preserve code snippets, shell commands, file paths, identifiers, and URLs \
exactly as written.
- Redact anything that looks like a credential, API key, or token; write \
[redacted] in its place.
- Any span between <verbatim> and </verbatim> markers must be copied \
unchanged.
- Do not add commentary, headers, or meta-descriptions of the conversation.
- Output plain text only.";

/// Errors that can occur during compression calls.
#[derive(Debug, thiserror::Error)]
pub enum CompressorError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Authentication failed (missing or invalid key).
    #[error("Auth error: {message}")]
    Auth {
        /// Error description.
        message: String,
    },

    /// Provider returned an API error.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
        /// Whether this error can be retried.
        retryable: bool,
    },

    /// Provider returned a well-formed response with no usable text.
    #[error("empty completion from model {model}")]
    EmptyCompletion {
        /// Model that produced the empty response.
        model: String,
    },
}

impl CompressorError {
    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s == reqwest::StatusCode::TOO_MANY_REQUESTS || s.is_server_error()
                    })
            }
            Self::Api { retryable, .. } => *retryable,
            Self::Auth { .. } | Self::Json(_) | Self::EmptyCompletion { .. } => false,
        }
    }

    /// Error category string for log fields.
    pub fn category(&self) -> &str {
        match self {
            Self::Http(_) => "network",
            Self::Json(_) => "parse",
            Self::Auth { .. } => "auth",
            Self::Api { .. } => "api",
            Self::EmptyCompletion { .. } => "empty",
        }
    }
}

/// The compression capability.
///
/// Implementors must be `Send + Sync`; the engine invokes them from both a
/// background worker and bounded-parallel on-demand batches.
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Model identifier used for compression calls.
    fn model(&self) -> &str;

    /// Rewrite `text` into a substantially shorter form.
    ///
    /// The implementation sends [`COMPRESSION_INSTRUCTION`] together with the
    /// text. Length policy (whether the result shrank enough to be worth
    /// keeping) is the caller's concern, not the compressor's.
    async fn compress(&self, text: &str) -> CompressorResult<String>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
