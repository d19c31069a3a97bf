//! Business logic: the upstream client seam, the Gemini adapter, and the
//! retry/failover orchestrator.

pub mod gemini;
pub mod retry;
pub mod upstream;

pub use gemini::GeminiClient;
pub use retry::{RetryOrchestrator, RetryPolicy};
pub use upstream::{
    ExtractError, FragmentStream, GenerateRequest, GenerativeClient, ResponseHandle, UpstreamError,
};
