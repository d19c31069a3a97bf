//! HTTP layer: request/response models, authentication, handlers, and the
//! streaming relay.

pub mod auth;
pub mod handlers;
pub mod models;
pub mod streaming;

use crate::core::config::AppConfig;
use crate::services::retry::RetryOrchestrator;

pub use handlers::{chat_completions, health, index, list_models, metrics_handler};
pub use models::{ChatCompletionRequest, ChatCompletionResponse, Message, MessageContent};

/// Shared state for all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: RetryOrchestrator,
}
