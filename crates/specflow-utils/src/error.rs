use std::borrow::Cow;
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::exit_codes::ExitCode;
use crate::types::PhaseId;

/// Library-level error type with rich context and user-friendly reporting.
///
/// `SpecflowError` is what the root crate and the CLI deal in. Each crate
/// returns its own narrower error and converts into this one with `?`.
///
/// # Error Categories
///
/// | Variant | Description |
/// |---------|-------------|
/// | `Config` | Configuration file or CLI argument errors |
/// | `Phase` | Workflow preconditions, approval gates, failed generations |
/// | `Llm` | Completion API failures |
/// | `Store` | Durable state read/write failures |
///
/// # Exit Code Mapping
///
/// Use [`to_exit_code()`](Self::to_exit_code) to map errors to CLI exit codes.
/// Library code never calls `std::process::exit()`.
#[derive(Error, Debug)]
pub enum SpecflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Workflow error: {0}")]
    Phase(#[from] PhaseError),

    #[error("Completion API error: {0}")]
    Llm(#[from] LlmError),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SpecflowError {
    /// Map this error to the process exit code the CLI reports.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::CLI_ARGS,
            Self::Phase(PhaseError::Generation { source, .. }) | Self::Llm(source) => {
                llm_exit_code(source)
            }
            Self::Phase(_) => ExitCode::WORKFLOW,
            Self::Store(_) | Self::Io(_) => ExitCode::STORAGE,
        }
    }

    /// Format the error for a human: message, context and suggestions.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut out = format!("Error: {}", self.user_message());
        if let Some(context) = self.context() {
            out.push_str(&format!("\n\n{context}"));
        }
        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            out.push_str("\n\nSuggestions:");
            for suggestion in suggestions {
                out.push_str(&format!("\n  - {suggestion}"));
            }
        }
        out
    }
}

fn llm_exit_code(err: &LlmError) -> ExitCode {
    match err {
        LlmError::Timeout { .. } => ExitCode::PHASE_TIMEOUT,
        LlmError::Validation {
            code: ErrorCode::ContextTooLong,
            ..
        } => ExitCode::CONTEXT_TOO_LONG,
        LlmError::Validation { .. } | LlmError::Misconfiguration(_) => ExitCode::CLI_ARGS,
        _ => ExitCode::PROVIDER_FAILURE,
    }
}

impl UserFriendlyError for SpecflowError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Phase(e) => e.user_message(),
            Self::Llm(e) => e.user_message(),
            Self::Store(e) => e.user_message(),
            Self::Io(e) => format!("File system operation failed: {e}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Phase(e) => e.context(),
            Self::Llm(e) => e.context(),
            Self::Store(e) => e.context(),
            Self::Io(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::Phase(e) => e.suggestions(),
            Self::Llm(e) => e.suggestions(),
            Self::Store(e) => e.suggestions(),
            Self::Io(_) => vec!["Check file permissions and available disk space".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(e) => e.category(),
            Self::Phase(e) => e.category(),
            Self::Llm(e) => e.category(),
            Self::Store(e) => e.category(),
            Self::Io(_) => ErrorCategory::Storage,
        }
    }
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Workflow,
    Provider,
    Validation,
    ResourceLimits,
    Storage,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Workflow => write!(f, "Workflow"),
            Self::Provider => write!(f, "Completion Provider"),
            Self::Validation => write!(f, "Validation"),
            Self::ResourceLimits => write!(f, "Resource Limits"),
            Self::Storage => write!(f, "Storage"),
        }
    }
}

/// Machine-readable error codes surfaced to callers.
///
/// Every code maps deterministically to an HTTP status via
/// [`http_status()`](Self::http_status) so a server boundary can relay it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    MissingApiKey,
    MissingModel,
    MissingPrompts,
    InvalidRequest,
    RateLimited,
    ModelNotFound,
    InsufficientCredits,
    ContextTooLong,
    NetworkError,
    InternalError,
    RequestTimeout,
    /// Passthrough for statuses without a dedicated code, rendered `HTTP_{status}`.
    Http(u16),
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(&self) -> Cow<'static, str> {
        match self {
            Self::MissingApiKey => Cow::Borrowed("MISSING_API_KEY"),
            Self::MissingModel => Cow::Borrowed("MISSING_MODEL"),
            Self::MissingPrompts => Cow::Borrowed("MISSING_PROMPTS"),
            Self::InvalidRequest => Cow::Borrowed("INVALID_REQUEST"),
            Self::RateLimited => Cow::Borrowed("RATE_LIMITED"),
            Self::ModelNotFound => Cow::Borrowed("MODEL_NOT_FOUND"),
            Self::InsufficientCredits => Cow::Borrowed("INSUFFICIENT_CREDITS"),
            Self::ContextTooLong => Cow::Borrowed("CONTEXT_TOO_LONG"),
            Self::NetworkError => Cow::Borrowed("NETWORK_ERROR"),
            Self::InternalError => Cow::Borrowed("INTERNAL_ERROR"),
            Self::RequestTimeout => Cow::Borrowed("REQUEST_TIMEOUT"),
            Self::Http(status) => Cow::Owned(format!("HTTP_{status}")),
        }
    }

    /// HTTP status a server boundary should answer with for this code.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::MissingApiKey => 401,
            Self::MissingModel | Self::MissingPrompts | Self::InvalidRequest => 400,
            Self::RateLimited => 429,
            Self::ModelNotFound => 404,
            Self::InsufficientCredits => 402,
            Self::ContextTooLong => 413,
            Self::NetworkError => 503,
            Self::InternalError => 500,
            Self::RequestTimeout => 504,
            Self::Http(status) => *status,
        }
    }

    /// Classify a non-2xx upstream status.
    ///
    /// A 400 whose message talks about the context length is reported as
    /// `CONTEXT_TOO_LONG` since providers do not agree on a status for it.
    #[must_use]
    pub fn from_status(status: u16, message: &str) -> Self {
        match status {
            400 if mentions_context_length(message) => Self::ContextTooLong,
            400 => Self::InvalidRequest,
            402 => Self::InsufficientCredits,
            404 => Self::ModelNotFound,
            413 => Self::ContextTooLong,
            429 => Self::RateLimited,
            500 => Self::InternalError,
            other => Self::Http(other),
        }
    }
}

fn mentions_context_length(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("context length")
        || lower.contains("context_length")
        || lower.contains("maximum context")
        || lower.contains("too many tokens")
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

/// Whether an upstream status is worth retrying (5xx, 429 and 408).
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 429 || status == 408
}

/// Errors raised by the completion client.
///
/// Every variant answers three questions for the caller: which
/// [`ErrorCode`] applies, which HTTP status was observed (0 when the request
/// never got a response), and whether trying again could help.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Request rejected locally before any network call.
    #[error("{message}")]
    Validation { code: ErrorCode, message: String },

    /// Non-2xx response from the completion API after retries were exhausted
    /// or short-circuited.
    #[error("{message}")]
    Upstream {
        status: u16,
        code: ErrorCode,
        upstream_code: Option<String>,
        message: String,
    },

    /// Connection-level failure with no HTTP response.
    #[error("Network error: {0}")]
    Network(String),

    /// Response body was not valid JSON. The parser message is preserved.
    #[error(transparent)]
    Parse(#[from] serde_json::Error),

    /// The generation deadline elapsed.
    #[error("request timed out after {}s", .duration.as_secs())]
    Timeout { duration: Duration },

    /// The local rate limiter refused the request.
    #[error("Rate limit exceeded, retry in {}s", .retry_after.as_secs().max(1))]
    RateLimited { retry_after: Duration },

    /// Reading a streamed response failed part way.
    #[error("Stream error: {0}")]
    Stream(String),

    /// A 2xx response that parsed but carried no usable completion.
    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),

    /// The client itself is misconfigured (bad base URL, TLS setup).
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),
}

impl LlmError {
    pub fn validation(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. } | Self::Upstream { code, .. } => *code,
            Self::Network(_) | Self::Stream(_) => ErrorCode::NetworkError,
            Self::Parse(_) | Self::MalformedResponse(_) | Self::Misconfiguration(_) => {
                ErrorCode::InternalError
            }
            Self::Timeout { .. } => ErrorCode::RequestTimeout,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
        }
    }

    /// HTTP status observed from upstream, or 0 when no response was received.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Upstream { status, .. } => *status,
            Self::RateLimited { .. } => 429,
            Self::Validation { code, .. } => code.http_status(),
            _ => 0,
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { status, .. } => is_retryable_status(*status),
            Self::Network(_) | Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Validation { .. }
            | Self::Parse(_)
            | Self::Stream(_)
            | Self::MalformedResponse(_)
            | Self::Misconfiguration(_) => false,
        }
    }
}

impl UserFriendlyError for LlmError {
    fn user_message(&self) -> String {
        match self {
            Self::Validation { message, .. } => message.clone(),
            Self::Upstream {
                status, message, ..
            } => format!("Completion API returned {status}: {message}"),
            Self::Network(msg) => format!("Could not reach the completion API: {msg}"),
            Self::Parse(e) => format!("Completion API returned malformed JSON: {e}"),
            Self::Timeout { .. } => "request timed out".to_string(),
            Self::RateLimited { retry_after } => format!(
                "Too many requests; wait {}s before trying again",
                retry_after.as_secs().max(1)
            ),
            Self::Stream(msg) => format!("Streaming response failed: {msg}"),
            Self::MalformedResponse(msg) => {
                format!("Completion API returned an unusable response: {msg}")
            }
            Self::Misconfiguration(msg) => format!("Completion client configuration error: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self.code() {
            ErrorCode::ContextTooLong => Some(
                "Prompts are clamped to the model's context window, but the request still did not fit."
                    .to_string(),
            ),
            ErrorCode::InsufficientCredits => {
                Some("The provider account has run out of credits.".to_string())
            }
            ErrorCode::RateLimited => {
                Some("Requests are throttled by the provider or the local limiter.".to_string())
            }
            _ if self.is_retryable() => {
                Some("This looks like a transient failure; retrying may succeed.".to_string())
            }
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self.code() {
            ErrorCode::MissingApiKey => vec![
                "Export the API key in the variable named by api.api_key_env (default OPENROUTER_API_KEY)"
                    .to_string(),
            ],
            ErrorCode::MissingModel | ErrorCode::ModelNotFound => vec![
                "Set defaults.model in .specflow/config.toml or pass --model".to_string(),
                "Run 'specflow models' to list available model ids".to_string(),
            ],
            ErrorCode::ContextTooLong => vec![
                "Shorten the description or remove context files".to_string(),
                "Lower defaults.max_output_tokens or choose a model with a larger context window"
                    .to_string(),
            ],
            ErrorCode::InsufficientCredits => {
                vec!["Add credits to the provider account".to_string()]
            }
            _ if self.is_retryable() => vec!["Run the command again".to_string()],
            _ => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation {
                code: ErrorCode::ContextTooLong,
                ..
            } => ErrorCategory::ResourceLimits,
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Misconfiguration(_) => ErrorCategory::Configuration,
            _ => ErrorCategory::Provider,
        }
    }
}

/// Workflow-level errors: preconditions, approval gates and failed generations.
#[derive(Error, Debug)]
pub enum PhaseError {
    #[error("Phase {phase} cannot run: {reason}")]
    Precondition { phase: PhaseId, reason: String },

    #[error("Phase {phase} dependency not satisfied: {dependency} is not approved")]
    DependencyNotSatisfied { phase: PhaseId, dependency: PhaseId },

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition { from: PhaseId, to: PhaseId },

    #[error("Phase {phase} must be approved before proceeding")]
    ApprovalRequired { phase: PhaseId },

    #[error("Phase {phase} is not the active phase (active: {active})")]
    NotActive { phase: PhaseId, active: PhaseId },

    #[error("Phase {phase} has no content to approve")]
    NoContent { phase: PhaseId },

    #[error("A generation for {phase} is already in progress")]
    GenerationInProgress { phase: PhaseId },

    #[error("Cannot view {requested}: the workflow has only reached {active}")]
    ViewBeyondActive { requested: PhaseId, active: PhaseId },

    #[error("Context file {id} not found")]
    UnknownContextFile { id: String },

    #[error("Generation for {phase} failed: {source}")]
    Generation {
        phase: PhaseId,
        #[source]
        source: LlmError,
    },

    #[error("Generation for {phase} was superseded by a reset")]
    Superseded { phase: PhaseId },
}

impl UserFriendlyError for PhaseError {
    fn user_message(&self) -> String {
        match self {
            Self::Generation { phase, source } => {
                format!("Generating {phase} failed: {}", source.user_message())
            }
            other => other.to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Precondition { .. } | Self::DependencyNotSatisfied { .. } => Some(
                "Design is built only from approved requirements, and tasks only from approved requirements and design."
                    .to_string(),
            ),
            Self::ApprovalRequired { .. } | Self::InvalidTransition { .. } => Some(
                "Phases run in order: requirements, design, tasks. Each must be approved before the next."
                    .to_string(),
            ),
            Self::Generation { source, .. } => source.context(),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Precondition { phase, .. } if *phase == PhaseId::Requirements => vec![
                "Seed the workflow first: specflow seed --feature <name> --description <text>"
                    .to_string(),
            ],
            Self::Precondition { .. } | Self::DependencyNotSatisfied { .. } => {
                vec!["Approve the previous phase with 'specflow approve'".to_string()]
            }
            Self::ApprovalRequired { phase } => {
                vec![format!("Review and approve {phase} with 'specflow approve {phase}'")]
            }
            Self::NoContent { phase } => {
                vec![format!("Generate {phase} first with 'specflow generate'")]
            }
            Self::GenerationInProgress { .. } => {
                vec!["Wait for the current generation to finish".to_string()]
            }
            Self::Generation { source, .. } => source.suggestions(),
            _ => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Generation { source, .. } => source.category(),
            _ => ErrorCategory::Workflow,
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => format!("Configuration file has invalid format: {reason}"),
            Self::MissingRequired(key) => format!("Required configuration '{key}' is missing"),
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::DiscoveryFailed { reason } => {
                format!("Failed to discover configuration: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::NotFound { .. } | Self::DiscoveryFailed { .. } => Some(
                "specflow searches for .specflow/config.toml starting from the current directory upward, or uses SPECFLOW_HOME."
                    .to_string(),
            ),
            Self::InvalidFile(_) => Some("Configuration files must be valid TOML.".to_string()),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec!["Check the TOML syntax of .specflow/config.toml".to_string()],
            Self::MissingRequired(key) => {
                vec![format!("Add '{key}' to .specflow/config.toml or pass it on the command line")]
            }
            Self::InvalidValue { key, .. } => match key.as_str() {
                "budget.system_share" | "budget.head_ratio" | "budget.tail_ratio"
                | "budget.safety_buffer_ratio" => {
                    vec!["Use a fraction between 0 and 1".to_string()]
                }
                "defaults.temperature" => vec!["Use a value between 0.0 and 2.0".to_string()],
                _ => vec!["Use a positive value".to_string()],
            },
            Self::NotFound { .. } | Self::DiscoveryFailed { .. } => {
                vec!["Run without --config to use built-in defaults".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Errors from the durable key-value store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read record '{key}': {source}")]
    Read {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write record '{key}': {reason}")]
    Write { key: String, reason: String },

    #[error("Failed to serialize record '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid record key '{key}'")]
    InvalidKey { key: String },
}

impl UserFriendlyError for StoreError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn context(&self) -> Option<String> {
        Some("Workflow state is kept under the state_dir configured in [storage].".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Read { .. } | Self::Write { .. } => vec![
                "Check that the state directory exists and is writable".to_string(),
            ],
            Self::Serialize { .. } | Self::InvalidKey { .. } => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_map_to_http_status() {
        let cases = [
            (ErrorCode::MissingApiKey, "MISSING_API_KEY", 401),
            (ErrorCode::MissingModel, "MISSING_MODEL", 400),
            (ErrorCode::MissingPrompts, "MISSING_PROMPTS", 400),
            (ErrorCode::InvalidRequest, "INVALID_REQUEST", 400),
            (ErrorCode::RateLimited, "RATE_LIMITED", 429),
            (ErrorCode::ModelNotFound, "MODEL_NOT_FOUND", 404),
            (ErrorCode::InsufficientCredits, "INSUFFICIENT_CREDITS", 402),
            (ErrorCode::ContextTooLong, "CONTEXT_TOO_LONG", 413),
            (ErrorCode::NetworkError, "NETWORK_ERROR", 503),
            (ErrorCode::InternalError, "INTERNAL_ERROR", 500),
            (ErrorCode::RequestTimeout, "REQUEST_TIMEOUT", 504),
            (ErrorCode::Http(502), "HTTP_502", 502),
        ];
        for (code, name, status) in cases {
            assert_eq!(code.as_str(), name);
            assert_eq!(code.http_status(), status, "{name}");
        }
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(ErrorCode::from_status(400, "bad"), ErrorCode::InvalidRequest);
        assert_eq!(
            ErrorCode::from_status(400, "This model's maximum context length is 8192 tokens"),
            ErrorCode::ContextTooLong
        );
        assert_eq!(ErrorCode::from_status(401, ""), ErrorCode::Http(401));
        assert_eq!(ErrorCode::from_status(402, ""), ErrorCode::InsufficientCredits);
        assert_eq!(ErrorCode::from_status(404, ""), ErrorCode::ModelNotFound);
        assert_eq!(ErrorCode::from_status(429, ""), ErrorCode::RateLimited);
        assert_eq!(ErrorCode::from_status(503, ""), ErrorCode::Http(503));
    }

    #[test]
    fn test_retryable_flag() {
        let upstream = |status| LlmError::Upstream {
            status,
            code: ErrorCode::from_status(status, ""),
            upstream_code: None,
            message: "x".to_string(),
        };
        for status in [500, 502, 503, 429, 408] {
            assert!(upstream(status).is_retryable(), "{status}");
        }
        for status in [400, 401, 402, 403, 404, 413] {
            assert!(!upstream(status).is_retryable(), "{status}");
        }
        assert!(LlmError::Network("reset".into()).is_retryable());
        assert_eq!(LlmError::Network("reset".into()).status(), 0);
        assert!(!LlmError::validation(ErrorCode::MissingModel, "no model").is_retryable());
    }

    #[test]
    fn test_timeout_is_reported_distinctly() {
        let err = LlmError::Timeout {
            duration: Duration::from_secs(180),
        };
        assert_eq!(err.code(), ErrorCode::RequestTimeout);
        assert_eq!(err.user_message(), "request timed out");
        assert!(err.to_string().starts_with("request timed out"));
    }

    #[test]
    fn test_parse_error_message_is_preserved() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let expected = parse_err.to_string();
        let err = LlmError::from(parse_err);
        assert_eq!(err.to_string(), expected);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_exit_code_mapping() {
        let err = SpecflowError::from(PhaseError::ApprovalRequired {
            phase: PhaseId::Requirements,
        });
        assert_eq!(err.to_exit_code(), ExitCode::WORKFLOW);

        let err = SpecflowError::from(PhaseError::Generation {
            phase: PhaseId::Design,
            source: LlmError::Timeout {
                duration: Duration::from_secs(1),
            },
        });
        assert_eq!(err.to_exit_code(), ExitCode::PHASE_TIMEOUT);

        let err = SpecflowError::from(ConfigError::InvalidFile("x".into()));
        assert_eq!(err.to_exit_code(), ExitCode::CLI_ARGS);
    }

    #[test]
    fn test_display_for_user_includes_suggestions() {
        let err = SpecflowError::from(LlmError::validation(
            ErrorCode::MissingApiKey,
            "API key is not configured",
        ));
        let text = err.display_for_user();
        assert!(text.contains("API key is not configured"));
        assert!(text.contains("OPENROUTER_API_KEY"));
    }
}
