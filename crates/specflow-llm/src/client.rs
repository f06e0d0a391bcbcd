//! Completion API client
//!
//! Every outbound request goes through [`CompletionClient::send_with_retry`],
//! which implements the retry state machine:
//!
//! - 2xx: success
//! - 429: retry after `Retry-After` seconds (capped), or exponential backoff
//! - 5xx and network failures: retry after exponential backoff
//! - any other status: fail immediately without consuming retries
//!
//! After `max_retries` retries the last error is returned. Its
//! [`LlmError::is_retryable`] flag tells callers whether trying again later
//! could help.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use specflow_config::{BudgetConfig, Config, ContextConfig};
use specflow_packet::{
    BudgetPolicy, ContextFile, ContextFileFilter, ContextLimits, SplitRatios, TokenBudgetEnforcer,
};
use specflow_utils::error::{ErrorCode, LlmError};
use specflow_utils::redaction::{redact_error_message, redact_known_secret};

use crate::models::{Model, ModelList};
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::stream::CompletionStream;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, ResponseBody};
use crate::types::{
    ChatRequest, ChatResponse, Completion, CompletionOptions, ErrorEnvelope, LlmBackend,
    LlmInvocation, Message,
};

/// Longest raw error body quoted in an error message when the body is not
/// the usual JSON envelope.
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Connection and policy settings for [`CompletionClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub referer: Option<String>,
    pub title: Option<String>,
    pub retry: RetryPolicy,
    pub budget: BudgetPolicy,
    pub context_limits: ContextLimits,
    /// Context window used when a request does not name one.
    pub default_context_limit: usize,
    pub connect_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: specflow_config::DEFAULT_BASE_URL.to_string(),
            api_key: None,
            referer: None,
            title: Some(specflow_config::DEFAULT_TITLE.to_string()),
            retry: RetryPolicy::default(),
            budget: BudgetPolicy::default(),
            context_limits: ContextLimits::default(),
            default_context_limit: 128_000,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientSettings {
    /// Settings from resolved configuration. The API key is read from the
    /// environment here.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.api.base_url.clone(),
            api_key: config.api_key(),
            referer: config.api.referer.clone(),
            title: config.api.title.clone(),
            retry: RetryPolicy::new(
                config.api.max_retries,
                Duration::from_millis(config.api.retry_base_delay_ms),
            ),
            budget: budget_policy(&config.budget),
            context_limits: context_limits(&config.context),
            default_context_limit: config.budget.context_limit as usize,
            connect_timeout: Duration::from_secs(config.api.connect_timeout_secs),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Budget policy from the `[budget]` section
#[must_use]
pub fn budget_policy(config: &BudgetConfig) -> BudgetPolicy {
    BudgetPolicy {
        chars_per_token: config.chars_per_token,
        safety_buffer_tokens: config.safety_buffer_tokens as usize,
        safety_buffer_ratio: config.safety_buffer_ratio,
        system_share: config.system_share,
        split: SplitRatios {
            head: config.head_ratio,
            tail: config.tail_ratio,
        },
    }
}

/// Context file ceilings from the `[context]` section
#[must_use]
pub fn context_limits(config: &ContextConfig) -> ContextLimits {
    ContextLimits {
        max_file_bytes: config.max_file_bytes,
        max_total_bytes: config.max_total_bytes,
    }
}

/// Client for an OpenAI-compatible completion API.
pub struct CompletionClient {
    transport: Arc<dyn HttpTransport>,
    settings: ClientSettings,
    enforcer: TokenBudgetEnforcer,
    filter: ContextFileFilter,
    rate_limiter: Option<(Arc<RateLimiter>, String)>,
    models: OnceCell<Vec<Model>>,
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("base_url", &self.settings.base_url)
            .field("has_api_key", &self.settings.api_key.is_some())
            .field("retry", &self.settings.retry)
            .finish_non_exhaustive()
    }
}

impl CompletionClient {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, settings: ClientSettings) -> Self {
        let enforcer = TokenBudgetEnforcer::new(settings.budget);
        let filter = ContextFileFilter::new(settings.context_limits);
        Self {
            transport,
            settings,
            enforcer,
            filter,
            rate_limiter: None,
            models: OnceCell::new(),
        }
    }

    /// Production client: reqwest transport, settings and rate limit from
    /// `config`.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let settings = ClientSettings::from_config(config);
        let transport = ReqwestTransport::with_connect_timeout(settings.connect_timeout)?;
        let mut client = Self::new(Arc::new(transport), settings);

        if config.rate_limit.max_requests > 0 {
            let limiter = RateLimiter::new(
                config.rate_limit.max_requests as usize,
                Duration::from_secs(config.rate_limit.window_secs),
            );
            client = client.with_rate_limiter(Arc::new(limiter), "default");
        }
        Ok(client)
    }

    /// Throttle completion requests through `limiter` under `key`.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>, key: impl Into<String>) -> Self {
        self.rate_limiter = Some((limiter, key.into()));
        self
    }

    #[must_use]
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Probe the models endpoint once. Never fails; any error yields `false`.
    pub async fn test_connection(&self) -> bool {
        let request = self.authorized(HttpRequest::get(self.url("models")));
        match self.transport.execute(request).await {
            Ok(response) if response.is_success() => true,
            Ok(response) => {
                debug!(status = response.status, "Connection test rejected");
                false
            }
            Err(e) => {
                debug!(error = %e, "Connection test failed");
                false
            }
        }
    }

    /// Fetch the model catalogue.
    ///
    /// # Errors
    ///
    /// Returns `LlmError` for exhausted retries, non-retryable statuses and
    /// unparseable bodies.
    pub async fn list_models(&self) -> Result<Vec<Model>, LlmError> {
        let response = self
            .send_with_retry("models", || self.authorized(HttpRequest::get(self.url("models"))))
            .await?;
        let body = response.into_text().await?;
        let list: ModelList = serde_json::from_str(&body)?;
        debug!(count = list.data.len(), "Fetched model catalogue");
        Ok(list.data)
    }

    /// Catalogue entry for `model_id`, fetching the catalogue on first use.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::list_models`] failures. A failed fetch is not
    /// cached.
    pub async fn model(&self, model_id: &str) -> Result<Option<Model>, LlmError> {
        let models = self
            .models
            .get_or_try_init(|| self.list_models())
            .await?;
        Ok(models.iter().find(|m| m.id == model_id).cloned())
    }

    /// Generate a completion and return the first choice's text.
    ///
    /// # Errors
    ///
    /// See [`Self::complete`].
    pub async fn generate_completion(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        context_files: &[ContextFile],
        options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        let invocation = LlmInvocation::new(model, system_prompt, user_prompt, options.clone())
            .with_context_files(context_files.to_vec());
        self.complete(&invocation).await.map(|c| c.content)
    }

    /// Generate a completion.
    ///
    /// Requests are validated before any network call: the API key, model
    /// and both prompts must be present, and the estimated size must fit
    /// the context window.
    ///
    /// # Errors
    ///
    /// - `Validation` with `MISSING_API_KEY`, `MISSING_MODEL`,
    ///   `MISSING_PROMPTS` or `CONTEXT_TOO_LONG`
    /// - `RateLimited` when the local limiter refuses the request
    /// - `Upstream`/`Network` after retries are exhausted or short-circuited
    /// - `Parse` when a 2xx body is not valid JSON
    /// - `MalformedResponse` when a 2xx body has no usable choice
    pub async fn complete(&self, invocation: &LlmInvocation) -> Result<Completion, LlmError> {
        let body = self.prepare(invocation, false)?;
        let started = Instant::now();

        let response = self
            .send_with_retry("chat/completions", || self.completion_request(&body))
            .await?;
        let text = response.into_text().await?;
        let completion = self.parse_completion(&text, &invocation.model)?;

        info!(
            model = %completion.model,
            duration_ms = started.elapsed().as_millis() as u64,
            prompt_tokens = completion.usage.map(|u| u.prompt_tokens),
            completion_tokens = completion.usage.map(|u| u.completion_tokens),
            finish_reason = completion.finish_reason.as_deref(),
            "Completion received"
        );
        Ok(completion)
    }

    /// Request a streamed completion.
    ///
    /// A `text/event-stream` response is returned unread as a
    /// [`CompletionStream`]. A server that answers with plain JSON is parsed
    /// eagerly and replayed as a single delta.
    ///
    /// # Errors
    ///
    /// Same as [`Self::complete`] for everything up to the response headers.
    pub async fn stream_completion(
        &self,
        invocation: &LlmInvocation,
    ) -> Result<CompletionStream, LlmError> {
        let body = self.prepare(invocation, true)?;
        let response = self
            .send_with_retry("chat/completions", || self.completion_request(&body))
            .await?;

        match response.body {
            ResponseBody::Stream(handle) => Ok(CompletionStream::new(handle)),
            ResponseBody::Text(text) => {
                let completion = self.parse_completion(&text, &invocation.model)?;
                Ok(CompletionStream::from_content(completion.content))
            }
        }
    }

    /// Validate the invocation and serialize the request body.
    fn prepare(&self, invocation: &LlmInvocation, stream: bool) -> Result<String, LlmError> {
        if self.settings.api_key.is_none() {
            return Err(LlmError::validation(
                ErrorCode::MissingApiKey,
                "API key is not configured",
            ));
        }
        if invocation.model.trim().is_empty() {
            return Err(LlmError::validation(
                ErrorCode::MissingModel,
                "No model selected",
            ));
        }
        if invocation.system_prompt.trim().is_empty() || invocation.user_prompt.trim().is_empty() {
            return Err(LlmError::validation(
                ErrorCode::MissingPrompts,
                "Both a system prompt and a user prompt are required",
            ));
        }

        let user_content = self.embed_context(&invocation.user_prompt, &invocation.context_files);
        let options = &invocation.options;
        let context_limit = options
            .context_limit
            .unwrap_or(self.settings.default_context_limit);

        let validation = self.enforcer.validate(
            &invocation.system_prompt,
            &user_content,
            options.max_tokens as usize,
            context_limit,
        );
        if let Some(message) = validation.error {
            warn!(
                model = %invocation.model,
                estimated_total = validation.estimated_total,
                context_limit,
                "Request exceeds context window"
            );
            return Err(LlmError::validation(ErrorCode::ContextTooLong, message));
        }

        if let Some((limiter, key)) = &self.rate_limiter {
            limiter
                .check(key)
                .map_err(|retry_after| LlmError::RateLimited { retry_after })?;
        }

        let request = ChatRequest {
            model: &invocation.model,
            messages: vec![
                Message::system(invocation.system_prompt.clone()),
                Message::user(user_content),
            ],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            stream,
        };
        Ok(serde_json::to_string(&request)?)
    }

    fn embed_context(&self, user_prompt: &str, files: &[ContextFile]) -> String {
        if files.is_empty() {
            return user_prompt.to_string();
        }
        let filtered = self.filter.filter(files);
        if filtered.is_empty() {
            return user_prompt.to_string();
        }
        format!("{user_prompt}\n\n{}", filtered.render())
    }

    fn completion_request(&self, body: &str) -> HttpRequest {
        self.authorized(HttpRequest::post(
            self.url("chat/completions"),
            body.to_string(),
        ))
    }

    fn authorized(&self, mut request: HttpRequest) -> HttpRequest {
        if let Some(key) = &self.settings.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        if let Some(referer) = &self.settings.referer {
            request = request.header("HTTP-Referer", referer.as_str());
        }
        if let Some(title) = &self.settings.title {
            request = request.header("X-Title", title.as_str());
        }
        request
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.settings.base_url.trim_end_matches('/'))
    }

    /// Execute a request under the retry policy. `build` is called once per
    /// attempt.
    async fn send_with_retry<F>(&self, endpoint: &str, build: F) -> Result<HttpResponse, LlmError>
    where
        F: Fn() -> HttpRequest + Send + Sync,
    {
        let policy = self.settings.retry;
        let mut attempt: u32 = 0;

        loop {
            debug!(endpoint, attempt, "Executing HTTP request");

            match self.transport.execute(build()).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status;
                    let retry_after = response.header("retry-after").map(str::to_string);
                    let error = self.upstream_error(response).await;

                    let transient = status >= 500 || status == 429;
                    if !transient || !policy.can_retry(attempt) {
                        if transient {
                            warn!(endpoint, attempt, status, "Retries exhausted");
                        }
                        return Err(error);
                    }

                    let delay = if status == 429 {
                        policy.rate_limit_delay(attempt, retry_after.as_deref())
                    } else {
                        policy.backoff(attempt)
                    };
                    warn!(
                        endpoint,
                        attempt,
                        status,
                        delay_ms = delay.as_millis() as u64,
                        "Upstream error, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error @ LlmError::Network(_)) => {
                    if !policy.can_retry(attempt) {
                        warn!(endpoint, attempt, error = %error, "Retries exhausted");
                        return Err(self.redact(error));
                    }
                    let delay = policy.backoff(attempt);
                    warn!(
                        endpoint,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Network error, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(self.redact(error)),
            }

            attempt += 1;
        }
    }

    /// Classify a non-2xx response, reading the `{error: {message, code}}`
    /// envelope when present.
    async fn upstream_error(&self, response: HttpResponse) -> LlmError {
        let status = response.status;
        let body = response.into_text().await.unwrap_or_default();

        let (message, upstream_code) = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => (envelope.error.message.clone(), envelope.error.code_text()),
            Err(_) => (None, None),
        };
        let message = message
            .filter(|m| !m.trim().is_empty())
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect())
            })
            .unwrap_or_else(|| format!("HTTP {status}"));
        let message = self.scrub(&message);

        LlmError::Upstream {
            status,
            code: ErrorCode::from_status(status, &message),
            upstream_code,
            message,
        }
    }

    fn parse_completion(&self, body: &str, requested_model: &str) -> Result<Completion, LlmError> {
        let value: serde_json::Value = serde_json::from_str(body)?;

        if value.get("error").is_some_and(|e| !e.is_null()) {
            let envelope: ErrorEnvelope = serde_json::from_value(value)?;
            let message = self.scrub(
                envelope
                    .error
                    .message
                    .as_deref()
                    .unwrap_or("completion API reported an error"),
            );
            let status = envelope
                .error
                .code
                .as_ref()
                .and_then(serde_json::Value::as_u64)
                .and_then(|c| u16::try_from(c).ok())
                .filter(|c| (400..600).contains(c))
                .unwrap_or(500);
            return Err(LlmError::Upstream {
                status,
                code: ErrorCode::from_status(status, &message),
                upstream_code: envelope.error.code_text(),
                message,
            });
        }

        let response: ChatResponse = serde_json::from_value(value)?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::MalformedResponse("response contained no choices".into()))?;
        let content = choice
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::MalformedResponse("first choice has no content".into()))?;

        Ok(Completion {
            content,
            model: response
                .model
                .unwrap_or_else(|| requested_model.to_string()),
            usage: response.usage,
            finish_reason: choice.finish_reason,
        })
    }

    fn scrub(&self, message: &str) -> String {
        let message = match &self.settings.api_key {
            Some(key) => redact_known_secret(message, key),
            None => message.to_string(),
        };
        redact_error_message(&message)
    }

    fn redact(&self, error: LlmError) -> LlmError {
        match error {
            LlmError::Network(msg) => LlmError::Network(self.scrub(&msg)),
            LlmError::Stream(msg) => LlmError::Stream(self.scrub(&msg)),
            other => other,
        }
    }
}

#[async_trait]
impl LlmBackend for CompletionClient {
    async fn invoke(&self, invocation: LlmInvocation) -> Result<Completion, LlmError> {
        self.complete(&invocation).await
    }

    async fn describe_model(&self, model_id: &str) -> Option<Model> {
        match self.model(model_id).await {
            Ok(model) => model,
            Err(e) => {
                debug!(model = model_id, error = %e, "Model catalogue unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CompletionClient {
        let transport = Arc::new(ReqwestTransport::new().unwrap());
        CompletionClient::new(
            transport,
            ClientSettings::default()
                .with_api_key("sk-test-abcdefghijklmnopqrstuvwxyz")
                .with_base_url("http://localhost:9/api/v1/"),
        )
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        assert_eq!(
            client().url("chat/completions"),
            "http://localhost:9/api/v1/chat/completions"
        );
    }

    #[test]
    fn test_parse_completion_reads_first_choice() {
        let body = r#"{"model":"m/served","choices":[
            {"message":{"role":"assistant","content":"first"},"finish_reason":"stop"},
            {"message":{"role":"assistant","content":"second"}}],
            "usage":{"prompt_tokens":5,"completion_tokens":2,"total_tokens":7}}"#;
        let completion = client().parse_completion(body, "m/requested").unwrap();
        assert_eq!(completion.content, "first");
        assert_eq!(completion.model, "m/served");
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
        assert_eq!(completion.usage.unwrap().total_tokens, 7);
    }

    #[test]
    fn test_parse_completion_error_body_with_ok_status() {
        let body = r#"{"error":{"message":"No endpoints found","code":404}}"#;
        let err = client().parse_completion(body, "m").unwrap_err();
        assert_eq!(err.status(), 404);
        assert_eq!(err.code(), ErrorCode::ModelNotFound);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_completion_without_choices_is_malformed() {
        let err = client()
            .parse_completion(r#"{"choices":[]}"#, "m")
            .unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
    }

    #[test]
    fn test_budget_policy_from_config() {
        let config = Config::minimal_for_testing();
        let policy = budget_policy(&config.budget);
        assert_eq!(policy, BudgetPolicy::default());
        assert_eq!(context_limits(&config.context), ContextLimits::default());
    }

    #[test]
    fn test_debug_does_not_print_key() {
        let rendered = format!("{:?}", client());
        assert!(!rendered.contains("sk-test"));
        assert!(rendered.contains("has_api_key: true"));
    }

    #[test]
    fn test_prepare_rejects_missing_model_before_prompts() {
        let invocation = LlmInvocation::new("  ", "", "", CompletionOptions::default());
        let err = client().prepare(&invocation, false).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingModel);
    }
}
