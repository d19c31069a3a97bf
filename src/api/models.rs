//! API request and response models.
//!
//! OpenAI-compatible data structures: chat completion requests/responses,
//! streaming chunks, and the model catalog.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Models served by the gateway, newest last.
pub const SUPPORTED_MODELS: &[&str] = &[
    "gemini-1.5-flash-8b-latest",
    "gemini-1.5-flash-8b-exp-0924",
    "gemini-1.5-flash-latest",
    "gemini-1.5-flash-exp-0827",
    "gemini-1.5-pro-latest",
    "gemini-1.5-pro-exp-0827",
    "learnlm-1.5-pro-experimental",
    "gemini-exp-1114",
    "gemini-exp-1121",
    "gemini-exp-1206",
    "gemini-2.0-flash-exp",
    "gemini-2.0-flash-thinking-exp-1219",
    "gemini-2.0-pro-exp",
    "gemini-2.0-pro-exp-02-05",
];

/// Chat completion request following the OpenAI API format.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    /// Conversation messages
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Additional parameters, accepted and ignored
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

fn default_temperature() -> f32 {
    1.0
}

fn default_max_tokens() -> u32 {
    8192
}

/// A single message in a conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    /// Message content: plain text or a list of typed parts
    pub content: MessageContent,
}

/// Message content is either a plain string or a part list
/// (`{"type": "text" | "image_url" | "file_url", ...}` items).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<serde_json::Value>),
}

/// Chat completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl ChatCompletionResponse {
    /// Build the single-choice assistant response for a materialized answer.
    pub fn from_text(model: &str, content: String) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: "assistant".to_string(),
                    content,
                },
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::zero(),
        }
    }
}

/// A single choice in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: String,
}

/// Assistant message inside a response choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: String,
}

/// Token usage statistics. Token accounting is not performed by this
/// gateway; the fields are present for client compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn zero() -> Self {
        Self {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
        }
    }
}

/// Streaming response chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub choices: Vec<StreamChoice>,
    pub object: String,
}

impl StreamChunk {
    /// A content delta chunk.
    pub fn delta(content: &str) -> Self {
        Self {
            choices: vec![StreamChoice {
                delta: Delta {
                    content: Some(content.to_string()),
                },
                finish_reason: None,
                index: 0,
            }],
            object: "chat.completion.chunk".to_string(),
        }
    }

    /// The terminal chunk closing every stream.
    pub fn stop() -> Self {
        Self {
            choices: vec![StreamChoice {
                delta: Delta { content: None },
                finish_reason: Some("stop".to_string()),
                index: 0,
            }],
            object: "chat.completion.chunk".to_string(),
        }
    }
}

/// A single choice in a streaming chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    pub delta: Delta,
    pub finish_reason: Option<String>,
    pub index: u32,
}

/// Delta content in streaming chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Model information entry in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
}

/// List of available models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

impl ModelList {
    /// The static catalog served by `GET /models`.
    pub fn catalog() -> Self {
        Self {
            object: "list".to_string(),
            data: SUPPORTED_MODELS
                .iter()
                .map(|id| ModelInfo { id: id.to_string() })
                .collect(),
        }
    }
}
