//! Error types and handling for the gateway.
//!
//! This module provides a unified error type [`AppError`] that covers every
//! client-visible failure and implements proper HTTP response conversion.
//! Upstream credential and transient failures are internal to the retry
//! orchestrator and never appear here directly; only their terminal outcomes
//! (retries exhausted, no keys available, blocked content) do.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for the application.
///
/// All client-facing errors should be converted to this type for consistent
/// handling. Every response body has the shape
/// `{"error": {"message", "type", "code"}}`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Authentication/authorization failures
    #[error("Unauthorized")]
    Unauthorized,

    /// Client provided invalid data (malformed messages, bad data URIs, ...)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The upstream safety filter rejected the prompt
    #[error("Prompt was blocked by the upstream safety filter")]
    PromptBlocked { reason: Option<String> },

    /// The upstream safety filter rejected the generated output.
    /// Retrying with a different key will not help.
    #[error("Model output was blocked by the upstream safety filter; retrying will not help")]
    OutputBlocked,

    /// The upstream answered but no usable text could be extracted
    #[error("Failed to process the upstream response")]
    ResponseProcessing(String),

    /// Every configured attempt failed
    #[error("All {attempts} attempts failed; adjust the request or try again later")]
    RetriesExhausted { attempts: u32 },

    /// Every API key is currently blacklisted
    #[error("All API keys are exhausted or temporarily disabled")]
    AllKeysUnavailable,

    /// Unrecognized upstream failure; the model may not be available yet
    #[error("{model} is likely unavailable right now; switch models or try again later")]
    ModelUnavailable { model: String },

    /// Generic internal server errors with custom message
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable error type string for response bodies.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "auth_error",
            AppError::BadRequest(_) => "invalid_request_error",
            AppError::PromptBlocked { .. } => "prompt_blocked_error",
            AppError::OutputBlocked => "output_blocked_error",
            AppError::ResponseProcessing(_) => "response_processing_error",
            AppError::RetriesExhausted { .. } => "max_retries_exceeded",
            AppError::AllKeysUnavailable => "no_available_keys",
            AppError::ModelUnavailable { .. } => "internal_server_error",
            AppError::Internal(_) => "internal_server_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) | AppError::PromptBlocked { .. } => StatusCode::BAD_REQUEST,
            AppError::OutputBlocked
            | AppError::ResponseProcessing(_)
            | AppError::RetriesExhausted { .. }
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::AllKeysUnavailable | AppError::ModelUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        let message = match &self {
            AppError::PromptBlocked {
                reason: Some(reason),
            } => format!("Prompt was blocked by the upstream safety filter: {reason}"),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
