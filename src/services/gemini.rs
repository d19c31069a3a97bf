//! Gemini REST adapter.
//!
//! Implements [`GenerativeClient`] against the `generateContent` /
//! `streamGenerateContent` endpoints and maps vendor failures onto the
//! classified [`UpstreamError`] variants so the orchestrator never has to
//! know about HTTP status codes or Google RPC status strings.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;

use crate::core::config::UpstreamConfig;
use crate::core::key_pool::ApiKey;
use crate::services::upstream::{
    is_blocked_finish, FragmentStream, GenerateRequest, GenerateResponse, GenerativeClient,
    ResponseHandle, UpstreamError,
};

/// HTTP client for the Gemini generative API.
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, config: &UpstreamConfig) -> Self {
        Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, model: &str, stream: bool, key: &ApiKey) -> String {
        if stream {
            format!(
                "{}/models/{}:streamGenerateContent?alt=sse&key={}",
                self.api_base,
                model,
                key.secret()
            )
        } else {
            format!(
                "{}/models/{}:generateContent?key={}",
                self.api_base,
                model,
                key.secret()
            )
        }
    }

    fn body(request: &GenerateRequest) -> serde_json::Value {
        let mut contents: Vec<serde_json::Value> = request
            .history
            .iter()
            .map(|turn| serde_json::to_value(turn).expect("content serializes"))
            .collect();
        contents.push(serde_json::to_value(&request.current).expect("content serializes"));

        json!({
            "contents": contents,
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens,
            },
            "safetySettings": safety_settings(),
        })
    }
}

/// All harm categories run unblocked; the gateway surfaces upstream block
/// decisions instead of adding its own.
fn safety_settings() -> serde_json::Value {
    json!([
        {"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_NONE"},
        {"category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_NONE"},
        {"category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "BLOCK_NONE"},
        {"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "BLOCK_NONE"},
    ])
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(
        &self,
        key: &ApiKey,
        request: &GenerateRequest,
        stream: bool,
    ) -> Result<ResponseHandle, UpstreamError> {
        let response = self
            .http
            .post(self.url(&request.model, stream, key))
            .json(&Self::body(request))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status.as_u16(), &body));
        }

        if stream {
            Ok(ResponseHandle::Streaming(sse_fragments(response)))
        } else {
            let parsed: GenerateResponse = response
                .json()
                .await
                .map_err(|e| UpstreamError::Transient(format!("invalid response body: {e}")))?;
            Ok(ResponseHandle::Complete(parsed))
        }
    }
}

fn transport_error(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() || err.is_connect() {
        UpstreamError::Transient(err.to_string())
    } else {
        UpstreamError::Unknown(err.to_string())
    }
}

/// Google RPC error envelope: `{"error": {"code", "message", "status"}}`.
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Map an upstream HTTP failure to its retry class.
///
/// The RPC status string is authoritative when present; the HTTP status code
/// is the fallback for proxies and malformed bodies.
fn classify_http_error(status_code: u16, body: &str) -> UpstreamError {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let detail = if envelope.error.message.is_empty() {
        format!("HTTP {status_code}")
    } else {
        envelope.error.message.clone()
    };

    match envelope.error.status.as_str() {
        "INVALID_ARGUMENT" => return UpstreamError::InvalidCredential(detail),
        "PERMISSION_DENIED" => return UpstreamError::PermissionDenied(detail),
        "RESOURCE_EXHAUSTED" => return UpstreamError::QuotaExhausted(detail),
        "ABORTED" | "INTERNAL" | "UNAVAILABLE" | "DEADLINE_EXCEEDED" => {
            return UpstreamError::Transient(detail)
        }
        _ => {}
    }

    match status_code {
        400 => UpstreamError::InvalidCredential(detail),
        403 => UpstreamError::PermissionDenied(detail),
        429 => UpstreamError::QuotaExhausted(detail),
        500 | 502 | 503 | 504 => UpstreamError::Transient(detail),
        _ => UpstreamError::Unknown(detail),
    }
}

/// Turn an SSE byte stream into ordered text fragments.
///
/// Stops at the first stream-level failure; the relay is responsible for
/// what the client sees after that.
fn sse_fragments(response: reqwest::Response) -> FragmentStream {
    let stream = async_stream::stream! {
        let mut bytes = response.bytes_stream();
        let mut buf = String::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Err(transport_error(err));
                    return;
                }
            };
            buf.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buf.find('\n') {
                let line = buf[..pos].trim_end_matches('\r').to_string();
                buf.drain(..=pos);

                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data.is_empty() || data == "[DONE]" {
                    continue;
                }

                let event: GenerateResponse = match serde_json::from_str(data) {
                    Ok(event) => event,
                    Err(err) => {
                        yield Err(UpstreamError::Unknown(format!(
                            "unparseable stream event: {err}"
                        )));
                        return;
                    }
                };

                match stream_event_text(&event) {
                    Ok(Some(text)) => yield Ok(text),
                    Ok(None) => {}
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                }
            }
        }
    };
    Box::pin(stream)
}

/// Extract the text delta from one stream event, or the error the event
/// carries (in-band prompt/output blocking).
fn stream_event_text(event: &GenerateResponse) -> Result<Option<String>, UpstreamError> {
    let Some(candidate) = event.candidates.first() else {
        if let Some(feedback) = &event.prompt_feedback {
            return Err(UpstreamError::PromptBlocked {
                reason: feedback.block_reason.clone(),
            });
        }
        return Ok(None);
    };

    let text: String = candidate
        .content
        .iter()
        .flat_map(|c| &c.parts)
        .filter_map(|p| p.text.as_deref())
        .collect();

    let finish = candidate.finish_reason.as_deref();
    if text.is_empty() && is_blocked_finish(finish) {
        return Err(UpstreamError::OutputBlocked(
            finish.unwrap_or("unknown").to_string(),
        ));
    }

    Ok((!text.is_empty()).then_some(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_classify_by_rpc_status() {
        let body = json!({"error": {"code": 429, "message": "quota", "status": "RESOURCE_EXHAUSTED"}});
        assert_matches!(
            classify_http_error(429, &body.to_string()),
            UpstreamError::QuotaExhausted(_)
        );

        let body = json!({"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}});
        assert_matches!(
            classify_http_error(400, &body.to_string()),
            UpstreamError::InvalidCredential(_)
        );

        let body = json!({"error": {"code": 403, "message": "denied", "status": "PERMISSION_DENIED"}});
        assert_matches!(
            classify_http_error(403, &body.to_string()),
            UpstreamError::PermissionDenied(_)
        );

        for status in ["ABORTED", "INTERNAL", "UNAVAILABLE", "DEADLINE_EXCEEDED"] {
            let body = json!({"error": {"message": "boom", "status": status}});
            assert_matches!(
                classify_http_error(500, &body.to_string()),
                UpstreamError::Transient(_)
            );
        }
    }

    #[test]
    fn test_classify_falls_back_to_http_status() {
        assert_matches!(
            classify_http_error(503, "not json"),
            UpstreamError::Transient(detail) if detail == "HTTP 503"
        );
        assert_matches!(classify_http_error(429, ""), UpstreamError::QuotaExhausted(_));
        assert_matches!(classify_http_error(418, ""), UpstreamError::Unknown(_));
    }

    #[test]
    fn test_stream_event_text_extracts_delta() {
        let event = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "He"}]}}]
        }))
        .unwrap();
        assert_eq!(stream_event_text(&event).unwrap(), Some("He".to_string()));
    }

    #[test]
    fn test_stream_event_blocked_prompt_is_an_error() {
        let event = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "PROHIBITED_CONTENT"}
        }))
        .unwrap();
        assert_matches!(
            stream_event_text(&event),
            Err(UpstreamError::PromptBlocked { reason: Some(r) }) if r == "PROHIBITED_CONTENT"
        );
    }

    #[test]
    fn test_stream_event_safety_finish_is_output_blocked() {
        let event = serde_json::from_value(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap();
        assert_matches!(stream_event_text(&event), Err(UpstreamError::OutputBlocked(_)));
    }

    #[test]
    fn test_stream_event_empty_keepalive_is_skipped() {
        let event = serde_json::from_value(json!({"candidates": [{}]})).unwrap();
        assert_eq!(stream_event_text(&event).unwrap(), None);
    }

    #[test]
    fn test_request_body_shape() {
        use crate::transformer::{Content, GeminiRole, Part};

        let request = GenerateRequest {
            model: "gemini-2.0-flash-exp".to_string(),
            temperature: 0.5,
            max_tokens: 256,
            history: vec![Content {
                role: GeminiRole::User,
                parts: vec![Part::Text {
                    text: "hi".to_string(),
                }],
            }],
            current: Content {
                role: GeminiRole::User,
                parts: vec![Part::Text {
                    text: "again".to_string(),
                }],
            },
        };

        let body = GeminiClient::body(&request);
        assert_eq!(body["contents"].as_array().unwrap().len(), 2);
        assert_eq!(body["contents"][1]["parts"][0]["text"], "again");
        assert_eq!(body["generationConfig"]["temperature"], 0.5);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), 4);
    }
}
