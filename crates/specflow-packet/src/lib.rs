//! Prompt packet preparation for specflow.
//!
//! Everything here is synchronous and pure: token estimation, budget
//! validation, middle-out truncation, binary stripping and context file
//! filtering. The engine runs these before any network call so that a
//! request never exceeds the model's context window.

mod budget;
mod context;
mod sanitize;
mod truncate;

pub use budget::{
    BudgetPolicy, BudgetValidation, ClampedPrompt, DEFAULT_CHARS_PER_TOKEN, TokenBreakdown,
    TokenBudgetEnforcer, estimate_tokens,
};
pub use context::{
    ContextFile, ContextFileFilter, ContextLimits, EmbeddedContextFile, ExcludedContextFile,
    ExclusionReason, FilteredContext, TRUNCATION_MARKER, is_image,
};
pub use sanitize::{BASE64_PLACEHOLDER, DATA_URL_PLACEHOLDER, strip_binary};
pub use truncate::{OMISSION_MARKER, SplitRatios, middle_out_truncate};
