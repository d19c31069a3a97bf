//! Upstream client abstraction.
//!
//! The retry orchestrator only sees this module: a [`GenerativeClient`] that
//! either yields a [`ResponseHandle`] or an already-classified
//! [`UpstreamError`]. Everything vendor-specific (wire format, HTTP status
//! mapping) lives in the adapter behind the trait.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use thiserror::Error;

use crate::core::key_pool::ApiKey;
use crate::transformer::Content;

/// One upstream generate call, already translated.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Conversation so far, in order
    pub history: Vec<Content>,
    /// The new input turn
    pub current: Content,
}

/// Upstream failure, classified into the retry policy's classes.
///
/// The adapter produces these; the orchestrator decides
/// retry-vs-rotate-vs-abort purely on the variant.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// The key is malformed, expired, or revoked
    #[error("API key rejected: {0}")]
    InvalidCredential(String),

    /// Upstream quota/rate limiting for this key
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    /// Timeouts, aborted operations, internal errors, temporary unavailability
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// The key may have been suspended by the vendor
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The safety filter rejected the prompt; `reason` is the parsed block
    /// reason if one could be extracted
    #[error("prompt blocked by upstream")]
    PromptBlocked { reason: Option<String> },

    /// The safety filter rejected the generated output
    #[error("output blocked by upstream: {0}")]
    OutputBlocked(String),

    /// Anything the adapter could not recognize
    #[error("unrecognized upstream error: {0}")]
    Unknown(String),
}

/// Why no answer text could be extracted from a completed response.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    #[error("prompt blocked by upstream")]
    PromptBlocked { reason: Option<String> },

    #[error("output blocked by upstream: {0}")]
    OutputBlocked(String),

    #[error("no usable candidate in upstream response: {0}")]
    NoContent(String),
}

/// Ordered token fragments from a streaming response.
pub type FragmentStream = BoxStream<'static, Result<String, UpstreamError>>;

/// A successful upstream result.
///
/// Both client-facing response modes derive from this one handle:
/// [`ResponseHandle::full_text`] materializes the whole answer,
/// [`ResponseHandle::into_fragments`] iterates it token by token.
pub enum ResponseHandle {
    /// A fully materialized (non-streaming) upstream response
    Complete(GenerateResponse),
    /// A live token stream
    Streaming(FragmentStream),
}

impl std::fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseHandle::Complete(response) => {
                f.debug_tuple("Complete").field(response).finish()
            }
            ResponseHandle::Streaming(_) => f.debug_tuple("Streaming").finish(),
        }
    }
}

impl ResponseHandle {
    /// Materialize the full answer text.
    pub async fn full_text(self) -> Result<String, ExtractError> {
        match self {
            ResponseHandle::Complete(response) => response.extract_text(),
            ResponseHandle::Streaming(mut fragments) => {
                let mut text = String::new();
                while let Some(fragment) = fragments.next().await {
                    match fragment {
                        Ok(piece) => text.push_str(&piece),
                        Err(err) => return Err(ExtractError::NoContent(err.to_string())),
                    }
                }
                Ok(text)
            }
        }
    }

    /// Iterate token fragments. A completed response yields its full text as
    /// a single fragment.
    pub fn into_fragments(self) -> FragmentStream {
        match self {
            ResponseHandle::Streaming(fragments) => fragments,
            ResponseHandle::Complete(response) => {
                let item = response.extract_text().map_err(|err| match err {
                    ExtractError::PromptBlocked { reason } => {
                        UpstreamError::PromptBlocked { reason }
                    }
                    ExtractError::OutputBlocked(detail) => UpstreamError::OutputBlocked(detail),
                    ExtractError::NoContent(detail) => UpstreamError::Unknown(detail),
                });
                stream::iter(std::iter::once(item)).boxed()
            }
        }
    }
}

/// The upstream RPC seam. One implementation talks to the real API; tests
/// substitute scripted fakes.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(
        &self,
        key: &ApiKey,
        request: &GenerateRequest,
        stream: bool,
    ) -> Result<ResponseHandle, UpstreamError>;
}

// ============================================================================
// Upstream response payload
// ============================================================================

/// Parsed body of a completed generate call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
}

/// Finish reasons that mean the output itself was rejected.
const BLOCKED_FINISH_REASONS: &[&str] = &["SAFETY", "RECITATION", "PROHIBITED_CONTENT", "BLOCKLIST"];

pub(crate) fn is_blocked_finish(reason: Option<&str>) -> bool {
    reason.is_some_and(|r| BLOCKED_FINISH_REASONS.contains(&r))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

impl GenerateResponse {
    /// Concatenated candidate text, or the classified reason there is none.
    ///
    /// No candidates at all means the prompt was filtered before generation;
    /// a candidate that finished on a safety reason without text means the
    /// output was filtered.
    pub fn extract_text(&self) -> Result<String, ExtractError> {
        let Some(candidate) = self.candidates.first() else {
            let reason = self
                .prompt_feedback
                .as_ref()
                .and_then(|f| f.block_reason.clone());
            return Err(ExtractError::PromptBlocked { reason });
        };

        let text: String = candidate
            .content
            .iter()
            .flat_map(|c| &c.parts)
            .filter_map(|p| p.text.as_deref())
            .collect();

        if text.is_empty() {
            let finish = candidate.finish_reason.as_deref();
            if is_blocked_finish(finish) {
                return Err(ExtractError::OutputBlocked(
                    finish.unwrap_or("unknown").to_string(),
                ));
            }
            return Err(ExtractError::NoContent(format!(
                "candidate finished with {} and no text",
                finish.unwrap_or("no finish reason")
            )));
        }
        Ok(text)
    }
}
