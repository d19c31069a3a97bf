//! HTTP middleware for request metrics.

use crate::core::metrics::get_metrics;
use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Records a request counter and duration histogram for every request.
pub struct MetricsMiddleware;

impl MetricsMiddleware {
    pub async fn track_metrics(req: Request, next: Next) -> Response {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let start = Instant::now();

        let response = next.run(req).await;

        let metrics = get_metrics();
        metrics
            .request_count
            .with_label_values(&[&method, &path, response.status().as_str()])
            .inc();
        metrics
            .request_duration
            .with_label_values(&[&method, &path])
            .observe(start.elapsed().as_secs_f64());

        response
    }
}
