//! Client-facing response relay.
//!
//! Turns an upstream [`ResponseHandle`] into either a materialized JSON
//! response or an SSE stream of chat-completion chunks. The stream contract:
//! one delta chunk per non-empty fragment, then exactly one terminal stop
//! chunk on every exit path (normal exhaustion and mid-flight failure
//! alike), so clients never see a silently truncated stream. Dropping the
//! stream (client disconnect) stops the upstream pull with it.

use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;

use crate::api::models::{ChatCompletionResponse, StreamChunk};
use crate::core::error::{AppError, Result};
use crate::services::upstream::{ExtractError, FragmentStream, ResponseHandle};

/// Fixed message for a stream cut off mid-flight.
const STREAM_INTERRUPTED: &str =
    "The stream was interrupted; disable streaming or adjust your input";

/// Produce the client response for a finished orchestration, in the mode the
/// client asked for.
pub async fn respond(handle: ResponseHandle, model: &str, stream: bool) -> Result<Response> {
    if stream {
        Ok(relay_sse(handle))
    } else {
        let text = handle.full_text().await.map_err(map_extract_error)?;
        tracing::info!("200!");
        Ok(Json(ChatCompletionResponse::from_text(model, text)).into_response())
    }
}

fn map_extract_error(err: ExtractError) -> AppError {
    match err {
        ExtractError::PromptBlocked { reason } => {
            tracing::error!("User input was blocked by the upstream safety filter");
            AppError::PromptBlocked { reason }
        }
        ExtractError::OutputBlocked(detail) => {
            tracing::error!("Model output was blocked by the upstream safety filter: {detail}");
            AppError::OutputBlocked
        }
        ExtractError::NoContent(detail) => {
            tracing::error!("Failed to process the upstream response: {detail}");
            AppError::ResponseProcessing(detail)
        }
    }
}

/// Wrap the fragment stream as an SSE response body.
fn relay_sse(handle: ResponseHandle) -> Response {
    let frames =
        chunk_frames(handle.into_fragments()).map(|frame| Ok::<_, Infallible>(Bytes::from(frame)));

    Response::builder()
        .status(200)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(frames))
        .expect("static headers are valid")
}

/// The chunk protocol itself, one SSE frame per item.
///
/// Lazy and forward-only: nothing is pulled from upstream until the client
/// reads, and the generator ends after the terminal frame.
pub fn chunk_frames(mut fragments: FragmentStream) -> impl Stream<Item = String> + Send {
    async_stream::stream! {
        tracing::info!("Streaming started...");
        let mut delivered = 0usize;

        while let Some(item) = fragments.next().await {
            match item {
                Ok(text) if !text.is_empty() => {
                    delivered += 1;
                    yield sse_frame(&StreamChunk::delta(&text));
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::error!("Stream was cut off mid-flight: {err}");
                    yield sse_frame(&json!({
                        "error": {
                            "message": STREAM_INTERRUPTED,
                            "type": "internal_server_error"
                        }
                    }));
                    break;
                }
            }
        }

        tracing::info!(chunks = delivered, "Streaming finished");
        yield sse_frame(&StreamChunk::stop());
        yield "data: [DONE]\n\n".to_string();
    }
}

fn sse_frame<T: Serialize>(payload: &T) -> String {
    let json = serde_json::to_string(payload).expect("chunk serializes");
    format!("data: {json}\n\n")
}
