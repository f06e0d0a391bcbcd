//! Core types for the completion API and the backend abstraction

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use specflow_packet::ContextFile;
use specflow_utils::error::LlmError;

use crate::models::Model;

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Sampling options for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: Option<f32>,
    /// Context window to validate against. Falls back to the client default.
    pub context_limit: Option<usize>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
            top_p: None,
            context_limit: None,
        }
    }
}

/// Token usage reported by the completion API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// A successful completion: the first choice's text plus telemetry.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    /// Model id reported by the API, or the requested one if absent.
    pub model: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
}

/// Input to an [`LlmBackend`] invocation.
#[derive(Debug, Clone)]
pub struct LlmInvocation {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    /// Files embedded into the user prompt by the client. Callers that
    /// assemble context themselves leave this empty.
    pub context_files: Vec<ContextFile>,
    pub options: CompletionOptions,
}

impl LlmInvocation {
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        options: CompletionOptions,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            context_files: Vec::new(),
            options,
        }
    }

    #[must_use]
    pub fn with_context_files(mut self, files: Vec<ContextFile>) -> Self {
        self.context_files = files;
        self
    }
}

/// Trait for completion backends.
///
/// The workflow engine is written against this trait so it can be driven by
/// the HTTP client in production and by scripted backends in tests.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Run one completion.
    ///
    /// # Errors
    ///
    /// Returns `LlmError` for validation failures, exhausted retries,
    /// non-retryable upstream statuses and malformed responses.
    async fn invoke(&self, invocation: LlmInvocation) -> Result<Completion, LlmError>;

    /// Catalogue entry for `model_id`, if the backend knows it.
    async fn describe_model(&self, _model_id: &str) -> Option<Model> {
        None
    }
}

// Wire format

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// `{ "error": { "message": ..., "code": ... } }`
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

impl ErrorBody {
    /// The upstream code as text; providers send both strings and numbers.
    pub fn code_text(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}
