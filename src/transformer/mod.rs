//! Transformer module for protocol conversion.
//!
//! Inbound requests arrive in the OpenAI chat-completions shape; the
//! upstream speaks the Gemini `generateContent` shape. The conversion is a
//! pure function from a message list to (history, current turn, validation
//! errors):
//!
//! ```text
//! Client messages (system/user/assistant, text or data-URI parts)
//!     ↓
//! [translate]  ← role mapping + part extraction
//!     ↓
//! Gemini contents: history + held-out current turn
//! ```
//!
//! Validation problems are collected, not thrown: the caller decides whether
//! a non-empty error list aborts the request.

pub mod gemini;

pub use gemini::{translate, Content, GeminiRole, InlineData, Part, TranslationResult};
