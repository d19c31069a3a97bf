//! Gemini request translator.
//!
//! Maps an OpenAI-style message list into Gemini `contents`. The last usable
//! message becomes the current turn; everything before it is history, in
//! original order, because the upstream chat session replays it as the
//! conversation so far.

use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::api::models::{Message, MessageContent};

/// `data:<mime>;base64,<payload>`
static DATA_URI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:([\w.+-]+/[\w.+-]+);base64,(.+)$").unwrap());

/// Upstream conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeminiRole {
    User,
    Model,
}

/// One part of a Gemini content turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

/// Inline binary payload extracted from a data URI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// One turn of upstream conversation content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    pub role: GeminiRole,
    pub parts: Vec<Part>,
}

impl Content {
    /// The default current turn when the input has no usable messages.
    pub fn empty_user_turn() -> Self {
        Self {
            role: GeminiRole::User,
            parts: vec![Part::Text {
                text: String::new(),
            }],
        }
    }
}

/// Result of translating a message list.
///
/// `history` never includes `current`. A non-empty `errors` list means the
/// caller must reject the request instead of calling the model.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationResult {
    pub history: Vec<Content>,
    pub current: Content,
    pub errors: Vec<String>,
}

/// Translate an OpenAI-style message list into upstream contents.
///
/// Pure and synchronous. `system` and `user` both map to the upstream `user`
/// role, `assistant` maps to `model`; any other role is a validation error
/// and the message is dropped. Malformed items inside list content are also
/// dropped with an error while the rest of the message survives.
pub fn translate(messages: &[Message]) -> TranslationResult {
    let mut turns: Vec<Content> = Vec::new();
    let mut errors: Vec<String> = Vec::new();

    for message in messages {
        let Some(role) = map_role(&message.role) else {
            errors.push(format!("Invalid role: {}", message.role));
            continue;
        };

        let parts = match &message.content {
            MessageContent::Text(text) => vec![Part::Text { text: text.clone() }],
            MessageContent::Parts(items) => {
                let mut parts = Vec::new();
                for item in items {
                    match translate_part(item) {
                        Ok(Some(part)) => parts.push(part),
                        Ok(None) => {}
                        Err(err) => errors.push(err),
                    }
                }
                parts
            }
        };

        if !parts.is_empty() {
            turns.push(Content { role, parts });
        }
    }

    let current = turns.pop().unwrap_or_else(Content::empty_user_turn);

    TranslationResult {
        history: turns,
        current,
        errors,
    }
}

fn map_role(role: &str) -> Option<GeminiRole> {
    match role {
        "system" | "user" => Some(GeminiRole::User),
        "assistant" => Some(GeminiRole::Model),
        _ => None,
    }
}

/// Translate one content-list item. `Ok(None)` means the item type is
/// unknown and silently skipped.
fn translate_part(item: &serde_json::Value) -> Result<Option<Part>, String> {
    match item.get("type").and_then(|t| t.as_str()) {
        Some("text") => match item.get("text").and_then(|t| t.as_str()) {
            Some(text) => Ok(Some(Part::Text {
                text: text.to_string(),
            })),
            None => Err("text item is missing its text field".to_string()),
        },
        Some("image_url") => {
            let url = nested_url(item, "image_url");
            if !url.starts_with("data:image/") {
                return Err(format!(
                    "Invalid image URL format (expected an image data URI): {}",
                    truncate(url)
                ));
            }
            parse_data_uri(url)
                .map(Some)
                .map_err(|_| format!("Invalid data URI for image: {}", truncate(url)))
        }
        Some("file_url") => {
            let url = nested_url(item, "file_url");
            if !url.starts_with("data:") {
                return Err(format!(
                    "Invalid file URL format (expected a data URI): {}",
                    truncate(url)
                ));
            }
            parse_data_uri(url)
                .map(Some)
                .map_err(|_| format!("Invalid data URI for file: {}", truncate(url)))
        }
        _ => Ok(None),
    }
}

fn nested_url<'a>(item: &'a serde_json::Value, field: &str) -> &'a str {
    item.get(field)
        .and_then(|v| v.get("url"))
        .and_then(|u| u.as_str())
        .unwrap_or("")
}

fn parse_data_uri(url: &str) -> Result<Part, ()> {
    let caps = DATA_URI_RE.captures(url).ok_or(())?;
    let mime_type = caps[1].to_string();
    let data = caps[2].to_string();

    // The payload is forwarded as-is; reject it early if it is not base64.
    base64::engine::general_purpose::STANDARD
        .decode(&data)
        .map_err(|_| ())?;

    Ok(Part::InlineData {
        inline_data: InlineData { mime_type, data },
    })
}

fn truncate(url: &str) -> &str {
    match url.char_indices().nth(64) {
        Some((idx, _)) => &url[..idx],
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn text_message(role: &str, content: &str) -> Message {
        Message {
            role: role.to_string(),
            content: MessageContent::Text(content.to_string()),
        }
    }

    fn parts_message(role: &str, items: Vec<serde_json::Value>) -> Message {
        Message {
            role: role.to_string(),
            content: MessageContent::Parts(items),
        }
    }

    // A 1x1 PNG would do; any valid base64 payload is accepted.
    const PAYLOAD: &str = "aGVsbG8=";

    #[test]
    fn test_roles_map_and_order_is_preserved() {
        let messages = vec![
            text_message("system", "be brief"),
            text_message("user", "hi"),
            text_message("assistant", "hello"),
            text_message("user", "how are you?"),
        ];

        let result = translate(&messages);
        assert!(result.errors.is_empty());
        assert_eq!(result.history.len(), 3);
        assert_eq!(result.history[0].role, GeminiRole::User);
        assert_eq!(result.history[1].role, GeminiRole::User);
        assert_eq!(result.history[2].role, GeminiRole::Model);
        assert_eq!(
            result.current,
            Content {
                role: GeminiRole::User,
                parts: vec![Part::Text {
                    text: "how are you?".to_string()
                }],
            }
        );
    }

    #[test]
    fn test_single_message_has_empty_history() {
        let result = translate(&[text_message("user", "hi")]);
        assert!(result.history.is_empty());
        assert_eq!(
            result.current.parts,
            vec![Part::Text {
                text: "hi".to_string()
            }]
        );
    }

    #[test]
    fn test_empty_input_defaults_to_empty_user_turn() {
        let result = translate(&[]);
        assert!(result.errors.is_empty());
        assert!(result.history.is_empty());
        assert_eq!(result.current, Content::empty_user_turn());
    }

    #[test]
    fn test_translation_is_idempotent() {
        let messages = vec![
            text_message("user", "hi"),
            parts_message(
                "user",
                vec![json!({"type": "text", "text": "look"}), json!({
                    "type": "image_url",
                    "image_url": {"url": format!("data:image/png;base64,{PAYLOAD}")}
                })],
            ),
        ];
        assert_eq!(translate(&messages), translate(&messages));
    }

    #[test]
    fn test_image_data_uri_becomes_inline_data() {
        let result = translate(&[parts_message(
            "user",
            vec![json!({
                "type": "image_url",
                "image_url": {"url": format!("data:image/png;base64,{PAYLOAD}")}
            })],
        )]);

        assert!(result.errors.is_empty());
        assert_eq!(
            result.current.parts,
            vec![Part::InlineData {
                inline_data: InlineData {
                    mime_type: "image/png".to_string(),
                    data: PAYLOAD.to_string(),
                }
            }]
        );
    }

    #[test]
    fn test_file_url_accepts_any_mime_type() {
        let result = translate(&[parts_message(
            "user",
            vec![json!({
                "type": "file_url",
                "file_url": {"url": format!("data:application/pdf;base64,{PAYLOAD}")}
            })],
        )]);
        assert!(result.errors.is_empty());
        assert_eq!(result.current.parts.len(), 1);
    }

    #[test]
    fn test_image_url_rejects_non_image_mime() {
        let result = translate(&[parts_message(
            "user",
            vec![json!({
                "type": "image_url",
                "image_url": {"url": format!("data:application/pdf;base64,{PAYLOAD}")}
            })],
        )]);
        assert_eq!(result.errors.len(), 1);
        // nothing usable remained, so the default turn is used
        assert_eq!(result.current, Content::empty_user_turn());
    }

    #[test]
    fn test_malformed_data_uri_drops_item_not_message() {
        let result = translate(&[parts_message(
            "user",
            vec![
                json!({"type": "text", "text": "caption"}),
                json!({
                    "type": "image_url",
                    "image_url": {"url": "data:image/png;base64,%%%not-base64%%%"}
                }),
            ],
        )]);

        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("Invalid data URI for image"));
        assert_eq!(
            result.current.parts,
            vec![Part::Text {
                text: "caption".to_string()
            }]
        );
    }

    #[test]
    fn test_invalid_role_drops_message_with_error() {
        let result = translate(&[
            text_message("user", "hi"),
            text_message("tool", "ignored"),
        ]);
        assert_eq!(result.errors, vec!["Invalid role: tool".to_string()]);
        assert!(result.history.is_empty());
        assert_eq!(
            result.current.parts,
            vec![Part::Text {
                text: "hi".to_string()
            }]
        );
    }

    #[test]
    fn test_unknown_part_type_is_skipped_silently() {
        let result = translate(&[parts_message(
            "user",
            vec![
                json!({"type": "video_url", "video_url": {"url": "https://example.com"}}),
                json!({"type": "text", "text": "hi"}),
            ],
        )]);
        assert!(result.errors.is_empty());
        assert_eq!(result.current.parts.len(), 1);
    }

    #[test]
    fn test_text_item_without_text_field_is_an_error() {
        let result = translate(&[parts_message("user", vec![json!({"type": "text"})])]);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_serialized_shape_matches_upstream_wire_format() {
        let content = Content {
            role: GeminiRole::Model,
            parts: vec![
                Part::Text {
                    text: "hi".to_string(),
                },
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: "image/png".to_string(),
                        data: PAYLOAD.to_string(),
                    },
                },
            ],
        };

        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "model",
                "parts": [
                    {"text": "hi"},
                    {"inlineData": {"mimeType": "image/png", "data": PAYLOAD}}
                ]
            })
        );
    }
}
