//! HTTP handlers for the gateway endpoints.

use axum::{
    extract::State,
    http::HeaderMap,
    response::{Html, IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::api::auth::verify_auth;
use crate::api::models::{ChatCompletionRequest, ModelList, SUPPORTED_MODELS};
use crate::api::{streaming, AppState};
use crate::core::error::{AppError, Result};
use crate::services::upstream::GenerateRequest;
use crate::transformer;

/// `POST /chat/completions`: the main proxy endpoint.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response> {
    verify_auth(&headers, &state.config.auth_password)?;

    let hint = if request.stream { "streaming" } else { "non-streaming" };
    let active = state
        .orchestrator
        .pool()
        .current()
        .map(|key| key.masked())
        .unwrap_or_else(|| "no available key".to_string());
    tracing::info!("{} [{hint}] → {active}", request.model);

    let translation = transformer::translate(&request.messages);
    if !translation.errors.is_empty() {
        tracing::error!(
            "Rejecting request with invalid messages: {}",
            translation.errors.join("; ")
        );
        return Err(AppError::BadRequest(translation.errors.join("; ")));
    }

    let generate = GenerateRequest {
        model: request.model.clone(),
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        history: translation.history,
        current: translation.current,
    };

    let handle = state.orchestrator.execute(&generate, request.stream).await?;
    streaming::respond(handle, &request.model, request.stream).await
}

/// `GET /models`: the static model catalog.
pub async fn list_models() -> Json<ModelList> {
    Json(ModelList::catalog())
}

/// `GET /`: a small landing page naming the service and its models.
pub async fn index() -> Html<String> {
    let models: String = SUPPORTED_MODELS
        .iter()
        .map(|id| format!("<li>{id}</li>"))
        .collect();

    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Gemini Proxy</title>\n</head>\n<body>\n\
         <h1>Gemini Proxy</h1>\n\
         <p>An OpenAI-compatible proxy for Google Gemini models.</p>\n\
         <h2>Supported models</h2>\n<ul>{models}</ul>\n</body>\n</html>"
    ))
}

/// `GET /health`: liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

/// `GET /metrics`: Prometheus exposition.
pub async fn metrics_handler() -> Response {
    let metric_families = prometheus::gather();
    match prometheus::TextEncoder::new().encode_to_string(&metric_families) {
        Ok(body) => body.into_response(),
        Err(err) => {
            tracing::error!("Failed to encode metrics: {err}");
            AppError::Internal("Failed to encode metrics".to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_models_shape() {
        let Json(catalog) = list_models().await;
        assert_eq!(catalog.object, "list");
        assert!(!catalog.data.is_empty());
    }

    #[tokio::test]
    async fn test_index_lists_models() {
        let Html(page) = index().await;
        assert!(page.contains("Gemini Proxy"));
        for id in SUPPORTED_MODELS {
            assert!(page.contains(id));
        }
    }
}
