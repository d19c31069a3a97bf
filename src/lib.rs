//! Gemini Proxy - an OpenAI-compatible gateway for Google Gemini models
//!
//! This library serves OpenAI-style chat completions on top of the Gemini
//! `generateContent` API, with:
//!
//! - **API key rotation**: round-robin over a configured key pool, with
//!   temporary blacklisting of failing or quota-exhausted keys
//! - **Retry/failover orchestration**: upstream failures are classified and
//!   drive rotate, backoff, or abort decisions per attempt
//! - **Message translation**: OpenAI message lists (text, image and file
//!   data URIs) become Gemini history plus a current turn
//! - **Streaming relay**: SSE chat-completion chunks that always end with a
//!   terminal stop chunk, even when the upstream stream fails mid-flight
//! - **Metrics & Monitoring**: Prometheus metrics for observability
//!
//! # Architecture
//!
//! The codebase is organized into four layers:
//!
//! - [`core`]: configuration, errors, the key pool, rate limiting, metrics
//! - [`transformer`]: pure message translation to the upstream format
//! - [`services`]: the upstream client seam and the retry orchestrator
//! - [`api`]: HTTP handlers, authentication, and the response relay
//!
//! # Configuration
//!
//! Settings load from `env.json` and/or environment variables:
//! - `KeyArray`: newline-separated upstream API keys (required)
//! - `password`: shared secret for inbound authentication (required)
//! - `MaxRetries`, `MaxRequests`, `LimitWindow`: retry and rate-limit knobs
//! - `HOST`, `PORT`: listen address (default: 0.0.0.0:7860)

pub mod api;
pub mod core;
pub mod services;
pub mod transformer;

// Re-export commonly used types for convenience
pub use api::{AppState, ChatCompletionRequest, ChatCompletionResponse};
pub use core::{AppConfig, AppError, KeyPool, RateLimiter, Result};
pub use services::{GeminiClient, RetryOrchestrator, RetryPolicy};
