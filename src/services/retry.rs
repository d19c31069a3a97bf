//! Retry/failover orchestration.
//!
//! Drives one logical client request through a bounded number of upstream
//! attempts, deciding per classified failure whether to rotate keys, back
//! off, or abort. Backoff sleeps suspend only the current request's task.

use std::sync::Arc;
use std::time::Duration;

use crate::core::config::AppConfig;
use crate::core::error::{AppError, Result};
use crate::core::key_pool::{ApiKey, KeyPool};
use crate::core::metrics::get_metrics;
use crate::core::rate_limiter::{RateDecision, RateLimiter};
use crate::services::upstream::{GenerateRequest, GenerativeClient, ResponseHandle, UpstreamError};

/// Attempt budget and delay policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum upstream attempts per logical request
    pub max_attempts: u32,
    /// How long a quota-exhausted key is quarantined
    pub blacklist: Duration,
    /// Base backoff delay
    pub base_delay: Duration,
    /// Backoff delay cap
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            blacklist: Duration::from_secs(config.blacklist_secs),
            base_delay: Duration::from_secs(config.retry_delay_secs),
            max_delay: Duration::from_secs(config.max_retry_delay_secs),
        }
    }

    /// `base * 2^attempt`, capped. Non-decreasing in `attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        exp.min(self.max_delay)
    }
}

/// What one attempt decided, consumed immediately by the attempt loop.
enum AttemptOutcome {
    Success(ResponseHandle),
    /// Try again; `delay` is `None` for immediate continuation
    RetryableFailure { delay: Option<Duration> },
    /// Terminal; retrying cannot help
    Fatal(AppError),
}

/// Per-request retry driver over the shared key pool, rate limiter, and
/// upstream client.
pub struct RetryOrchestrator {
    pool: Arc<KeyPool>,
    limiter: Arc<RateLimiter>,
    upstream: Arc<dyn GenerativeClient>,
    policy: RetryPolicy,
}

impl RetryOrchestrator {
    pub fn new(
        pool: Arc<KeyPool>,
        limiter: Arc<RateLimiter>,
        upstream: Arc<dyn GenerativeClient>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            pool,
            limiter,
            upstream,
            policy,
        }
    }

    pub fn pool(&self) -> &Arc<KeyPool> {
        &self.pool
    }

    /// Run one logical request to completion or terminal failure.
    pub async fn execute(
        &self,
        request: &GenerateRequest,
        stream: bool,
    ) -> Result<ResponseHandle> {
        for attempt in 1..=self.policy.max_attempts {
            tracing::info!("Attempt {attempt}/{} ...", self.policy.max_attempts);

            let key = self.select_key()?;
            let outcome = match self.upstream.generate(&key, request, stream).await {
                Ok(handle) => {
                    get_metrics()
                        .upstream_attempts
                        .with_label_values(&["success"])
                        .inc();
                    AttemptOutcome::Success(handle)
                }
                Err(err) => self.classify_failure(&key, err, attempt, &request.model),
            };

            match outcome {
                AttemptOutcome::Success(handle) => return Ok(handle),
                AttemptOutcome::Fatal(err) => return Err(err),
                AttemptOutcome::RetryableFailure { delay: Some(delay) } => {
                    tokio::time::sleep(delay).await;
                }
                AttemptOutcome::RetryableFailure { delay: None } => {}
            }
        }

        tracing::error!(
            "All {} attempts failed; adjust the request or try again later",
            self.policy.max_attempts
        );
        Err(AppError::RetriesExhausted {
            attempts: self.policy.max_attempts,
        })
    }

    /// The active key, skipping past rate-limited keys by rotating. Bounded
    /// by pool size so simultaneous limits on every key cannot spin forever.
    fn select_key(&self) -> Result<ApiKey> {
        for _ in 0..self.pool.len() {
            let Some(key) = self.pool.current() else {
                return Err(AppError::AllKeysUnavailable);
            };
            match self.limiter.check_and_record(key.secret()) {
                RateDecision::Allowed => return Ok(key),
                RateDecision::Limited { retry_after } => {
                    tracing::warn!(
                        "{} → over the request limit, usable again in {:.1}s",
                        key.masked(),
                        retry_after.as_secs_f64()
                    );
                    if self.pool.rotate().is_none() {
                        return Err(AppError::AllKeysUnavailable);
                    }
                }
            }
        }
        tracing::error!("Every key is rate-limited right now");
        Err(AppError::RetriesExhausted {
            attempts: self.policy.max_attempts,
        })
    }

    /// Apply the per-class policy to a failed attempt.
    fn classify_failure(
        &self,
        key: &ApiKey,
        err: UpstreamError,
        attempt: u32,
        model: &str,
    ) -> AttemptOutcome {
        let metrics = get_metrics();
        match err {
            UpstreamError::InvalidCredential(detail) => {
                tracing::error!("{} → invalid, possibly expired or revoked: {detail}", key.masked());
                metrics
                    .upstream_attempts
                    .with_label_values(&["invalid_key"])
                    .inc();
                metrics
                    .key_blacklists
                    .with_label_values(&["invalid_key"])
                    .inc();
                self.pool.blacklist(key.secret(), None);
                self.pool.rotate();
                AttemptOutcome::RetryableFailure { delay: None }
            }
            UpstreamError::PermissionDenied(detail) => {
                tracing::error!(
                    "{} → 403 permission denied, the key may have been suspended upstream: {detail}",
                    key.masked()
                );
                metrics
                    .upstream_attempts
                    .with_label_values(&["permission_denied"])
                    .inc();
                metrics
                    .key_blacklists
                    .with_label_values(&["permission_denied"])
                    .inc();
                self.pool.blacklist(key.secret(), None);
                self.pool.rotate();
                AttemptOutcome::RetryableFailure { delay: None }
            }
            UpstreamError::QuotaExhausted(detail) => {
                let delay = self.policy.backoff_delay(attempt);
                tracing::warn!(
                    "{} → 429 quota exhausted, retrying in {}s: {detail}",
                    key.masked(),
                    delay.as_secs()
                );
                metrics
                    .upstream_attempts
                    .with_label_values(&["quota_exhausted"])
                    .inc();
                metrics
                    .key_blacklists
                    .with_label_values(&["quota_exhausted"])
                    .inc();
                self.pool.blacklist(key.secret(), Some(self.policy.blacklist));
                self.pool.rotate();
                AttemptOutcome::RetryableFailure { delay: Some(delay) }
            }
            UpstreamError::Transient(detail) => {
                let delay = self.policy.backoff_delay(attempt);
                tracing::warn!(
                    "{} → transient upstream failure, retrying in {}s: {detail}",
                    key.masked(),
                    delay.as_secs()
                );
                metrics
                    .upstream_attempts
                    .with_label_values(&["transient"])
                    .inc();
                AttemptOutcome::RetryableFailure { delay: Some(delay) }
            }
            UpstreamError::PromptBlocked { reason } => {
                metrics
                    .upstream_attempts
                    .with_label_values(&["blocked"])
                    .inc();
                match reason {
                    Some(reason) => {
                        tracing::warn!("User input was blocked upstream: {reason}");
                        AttemptOutcome::Fatal(AppError::PromptBlocked {
                            reason: Some(reason),
                        })
                    }
                    None => {
                        tracing::error!("Prompt was blocked but no block reason could be parsed");
                        AttemptOutcome::Fatal(AppError::Internal(
                            "Prompt was blocked for an undetermined reason".to_string(),
                        ))
                    }
                }
            }
            UpstreamError::OutputBlocked(detail) => {
                tracing::warn!("Model output was blocked upstream ({detail}); not retrying");
                metrics
                    .upstream_attempts
                    .with_label_values(&["blocked"])
                    .inc();
                AttemptOutcome::Fatal(AppError::OutputBlocked)
            }
            UpstreamError::Unknown(detail) => {
                tracing::error!("Unrecognized upstream error, giving up: {detail}");
                metrics
                    .upstream_attempts
                    .with_label_values(&["unknown"])
                    .inc();
                AttemptOutcome::Fatal(AppError::ModelUnavailable {
                    model: model.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            blacklist: Duration::from_secs(60),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
        }
    }

    #[test]
    fn test_backoff_is_monotonic_and_capped() {
        let policy = policy();
        let mut previous = Duration::ZERO;
        for attempt in 1..=10 {
            let delay = policy.backoff_delay(attempt);
            assert!(delay >= previous);
            assert!(delay <= policy.max_delay);
            previous = delay;
        }
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(10), Duration::from_secs(16));
    }
}
