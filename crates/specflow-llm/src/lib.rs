//! Completion API client for specflow.
//!
//! [`CompletionClient`] talks to an OpenAI-compatible `/chat/completions`
//! endpoint through the [`HttpTransport`] seam, retrying 429/5xx/network
//! failures with exponential backoff and `Retry-After` support, and
//! classifying every failure into an [`LlmError`].
//!
//! The workflow engine depends only on the [`LlmBackend`] trait.

mod client;
mod models;
mod rate_limit;
mod retry;
mod stream;
mod transport;
mod types;

pub use client::{ClientSettings, CompletionClient, budget_policy, context_limits};
pub use models::{Model, ModelList, ModelPricing};
pub use rate_limit::RateLimiter;
pub use retry::{MAX_RETRY_AFTER, RetryPolicy, parse_retry_after};
pub use stream::{ChunkSource, CompletionStream, StreamHandle};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, ResponseBody};
pub use types::{
    Completion, CompletionOptions, LlmBackend, LlmInvocation, Message, Role, Usage,
};

pub use specflow_utils::error::{ErrorCode, LlmError};
