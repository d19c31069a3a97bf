//! Core functionality for the gateway.
//!
//! This module contains fundamental components used throughout the
//! application:
//! - Configuration management
//! - Error handling
//! - API key pool and rate limiting
//! - Metrics collection and HTTP middleware

pub mod config;
pub mod error;
pub mod key_pool;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod rate_limiter;

// Re-export commonly used types
pub use config::{AppConfig, ServerConfig, UpstreamConfig};
pub use error::{AppError, Result};
pub use key_pool::{ApiKey, KeyPool};
pub use logging::init_logging;
pub use metrics::{get_metrics, init_metrics, Metrics};
pub use middleware::MetricsMiddleware;
pub use rate_limiter::{RateDecision, RateLimiter};
