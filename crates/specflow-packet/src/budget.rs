//! Token estimation, budget validation and prompt clamping.
//!
//! Token counts are a heuristic: characters divided by a calibrated
//! chars-per-token ratio, rounded up. This is deliberately conservative for
//! English prose and is not the model's tokenizer.

use tracing::debug;

use crate::sanitize::strip_binary;
use crate::truncate::{SplitRatios, middle_out_truncate};

/// Characters per token for English text.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.7;

/// Estimate the token count of `text` with the default ratio.
///
/// ```rust
/// use specflow_packet::estimate_tokens;
///
/// assert_eq!(estimate_tokens(""), 0);
/// assert_eq!(estimate_tokens("abcd"), 2);
/// ```
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    BudgetPolicy::default().estimate_tokens(text)
}

/// Tunable constants of the budgeting algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetPolicy {
    pub chars_per_token: f64,
    /// Minimum tokens held back from the input budget.
    pub safety_buffer_tokens: usize,
    /// Fraction of the context limit held back, if larger than the minimum.
    pub safety_buffer_ratio: f64,
    /// Largest fraction of the input budget the system prompt may keep when
    /// the pair does not fit.
    pub system_share: f64,
    pub split: SplitRatios,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            safety_buffer_tokens: 500,
            safety_buffer_ratio: 0.10,
            system_share: 0.20,
            split: SplitRatios::default(),
        }
    }
}

impl BudgetPolicy {
    #[must_use]
    pub fn estimate_tokens(&self, text: &str) -> usize {
        let chars = text.chars().count();
        if chars == 0 {
            return 0;
        }
        (chars as f64 / self.chars_per_token).ceil() as usize
    }

    /// Largest character count whose estimate stays within `tokens`.
    #[must_use]
    pub fn chars_for_tokens(&self, tokens: usize) -> usize {
        (tokens as f64 * self.chars_per_token).floor() as usize
    }

    #[must_use]
    pub fn safety_buffer(&self, context_limit: usize) -> usize {
        let proportional = (context_limit as f64 * self.safety_buffer_ratio).ceil() as usize;
        self.safety_buffer_tokens.max(proportional)
    }

    /// Tokens available to system + user prompts.
    #[must_use]
    pub fn input_budget(&self, context_limit: usize, max_output_tokens: usize) -> usize {
        context_limit
            .saturating_sub(max_output_tokens)
            .saturating_sub(self.safety_buffer(context_limit))
    }
}

/// Per-component token estimates of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBreakdown {
    pub system: usize,
    pub user: usize,
    pub max_output: usize,
}

/// Outcome of [`TokenBudgetEnforcer::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetValidation {
    pub valid: bool,
    pub estimated_total: usize,
    pub breakdown: TokenBreakdown,
    pub error: Option<String>,
}

/// System and user prompts after clamping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClampedPrompt {
    pub system: String,
    pub user: String,
}

/// Keeps a system + user prompt pair inside a model's context window.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenBudgetEnforcer {
    policy: BudgetPolicy,
}

impl TokenBudgetEnforcer {
    #[must_use]
    pub const fn new(policy: BudgetPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &BudgetPolicy {
        &self.policy
    }

    #[must_use]
    pub fn estimate_tokens(&self, text: &str) -> usize {
        self.policy.estimate_tokens(text)
    }

    /// Check that `system + user + max_output_tokens` fits `context_limit`.
    ///
    /// No safety buffer is applied here; this is the hard ceiling checked
    /// right before a request is sent.
    #[must_use]
    pub fn validate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_output_tokens: usize,
        context_limit: usize,
    ) -> BudgetValidation {
        let breakdown = TokenBreakdown {
            system: self.estimate_tokens(system_prompt),
            user: self.estimate_tokens(user_prompt),
            max_output: max_output_tokens,
        };
        let estimated_total = breakdown.system + breakdown.user + breakdown.max_output;
        let valid = estimated_total <= context_limit;

        let error = (!valid).then(|| {
            format!(
                "Estimated request size of {estimated_total} tokens exceeds the model context limit of {context_limit} tokens (system: {}, user: {}, max output: {})",
                breakdown.system, breakdown.user, breakdown.max_output
            )
        });

        BudgetValidation {
            valid,
            estimated_total,
            breakdown,
            error,
        }
    }

    /// Fit the prompt pair into `context_limit - max_output_tokens - safety buffer`.
    ///
    /// Embedded binaries are replaced with placeholders first. If the pair
    /// still does not fit, the system prompt is cut to its share of the
    /// budget and the user prompt gets the rest, both by middle-out
    /// truncation. Clamping a clamped pair with the same limits returns it
    /// unchanged.
    #[must_use]
    pub fn clamp(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        context_limit: usize,
        max_output_tokens: usize,
    ) -> ClampedPrompt {
        let system = strip_binary(system_prompt).into_owned();
        let user = strip_binary(user_prompt).into_owned();

        let budget = self.policy.input_budget(context_limit, max_output_tokens);
        let system_tokens = self.estimate_tokens(&system);
        let user_tokens = self.estimate_tokens(&user);

        if system_tokens + user_tokens <= budget {
            return ClampedPrompt { system, user };
        }

        let system_budget = (budget as f64 * self.policy.system_share).floor() as usize;
        let system = if system_tokens > system_budget {
            middle_out_truncate(
                &system,
                self.policy.chars_for_tokens(system_budget),
                self.policy.split,
            )
        } else {
            system
        };

        let user_budget = budget.saturating_sub(self.estimate_tokens(&system));
        let user = if user_tokens > user_budget {
            middle_out_truncate(
                &user,
                self.policy.chars_for_tokens(user_budget),
                self.policy.split,
            )
        } else {
            user
        };

        debug!(
            budget,
            system_tokens_before = system_tokens,
            user_tokens_before = user_tokens,
            system_tokens_after = self.estimate_tokens(&system),
            user_tokens_after = self.estimate_tokens(&user),
            "Clamped prompt to token budget"
        );

        ClampedPrompt { system, user }
    }
}
