//! Prometheus metrics for the gateway.
//!
//! A single registry behind [`init_metrics`]/[`get_metrics`]; handlers and
//! the retry orchestrator record into it, and `GET /metrics` exposes it.

use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};
use std::sync::OnceLock;

/// Container for all application metrics.
pub struct Metrics {
    /// Total requests by method, endpoint, and status code
    pub request_count: IntCounterVec,

    /// Request duration histogram in seconds
    pub request_duration: HistogramVec,

    /// Upstream attempts by outcome (success / the error classes)
    pub upstream_attempts: IntCounterVec,

    /// Key blacklist events by reason
    pub key_blacklists: IntCounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// Call once at startup; subsequent calls return the same instance.
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let request_count = register_int_counter_vec!(
            "gemini_proxy_requests_total",
            "Total number of requests",
            &["method", "endpoint", "status_code"]
        )
        .expect("Failed to register request_count metric");

        let request_duration = register_histogram_vec!(
            "gemini_proxy_request_duration_seconds",
            "Request duration in seconds",
            &["method", "endpoint"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
        )
        .expect("Failed to register request_duration metric");

        let upstream_attempts = register_int_counter_vec!(
            "gemini_proxy_upstream_attempts_total",
            "Upstream generate attempts by outcome",
            &["outcome"]
        )
        .expect("Failed to register upstream_attempts metric");

        let key_blacklists = register_int_counter_vec!(
            "gemini_proxy_key_blacklists_total",
            "API key blacklist events by reason",
            &["reason"]
        )
        .expect("Failed to register key_blacklists metric");

        Metrics {
            request_count,
            request_duration,
            upstream_attempts,
            key_blacklists,
        }
    })
}

/// Get the global metrics instance.
///
/// # Panics
///
/// Panics if metrics have not been initialized via [`init_metrics`].
pub fn get_metrics() -> &'static Metrics {
    METRICS.get().expect("Metrics not initialized")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization_is_idempotent() {
        let metrics = init_metrics();
        metrics
            .request_count
            .with_label_values(&["GET", "/health", "200"])
            .inc();

        let metrics2 = init_metrics();
        assert!(std::ptr::eq(metrics, metrics2));
    }

    #[test]
    fn test_attempt_outcome_labels() {
        let metrics = init_metrics();
        let before = metrics
            .upstream_attempts
            .with_label_values(&["success"])
            .get();
        metrics
            .upstream_attempts
            .with_label_values(&["success"])
            .inc();
        assert_eq!(
            metrics
                .upstream_attempts
                .with_label_values(&["success"])
                .get(),
            before + 1
        );
    }
}
