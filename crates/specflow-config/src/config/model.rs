use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use specflow_utils::types::ConfigSource;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_API_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const DEFAULT_TITLE: &str = "specflow";

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub defaults: Defaults,
    pub api: ApiConfig,
    pub budget: BudgetConfig,
    pub context: ContextConfig,
    pub rate_limit: RateLimitConfig,
    pub storage: StorageConfig,
    /// The `.specflow` directory this configuration is anchored to.
    pub home_dir: PathBuf,
    pub source_attribution: HashMap<String, ConfigSource>,
}

/// `[defaults]`: generation behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defaults {
    /// Model id sent to the completion API. No built-in default.
    pub model: Option<String>,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub generation_timeout_secs: u64,
    /// Generate the next phase automatically after approve-and-proceed.
    pub auto_generate: bool,
    /// Cap on the seed description, in characters, before it enters a prompt.
    pub description_max_chars: usize,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            model: None,
            max_output_tokens: 4096,
            temperature: 0.7,
            generation_timeout_secs: 180,
            auto_generate: true,
            description_max_chars: 5000,
        }
    }
}

/// `[api]`: the completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Sent as `HTTP-Referer` for provider attribution.
    pub referer: Option<String>,
    /// Sent as `X-Title` for provider attribution.
    pub title: Option<String>,
    pub max_retries: u32,
    pub connect_timeout_secs: u64,
    pub retry_base_delay_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            referer: None,
            title: Some(DEFAULT_TITLE.to_string()),
            max_retries: 3,
            connect_timeout_secs: 30,
            retry_base_delay_ms: 1000,
        }
    }
}

/// `[budget]`: token estimation and truncation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub chars_per_token: f64,
    /// Context window assumed when the model's own limit is unknown.
    pub context_limit: u32,
    pub safety_buffer_tokens: u32,
    pub safety_buffer_ratio: f64,
    pub system_share: f64,
    pub head_ratio: f64,
    pub tail_ratio: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            chars_per_token: 3.7,
            context_limit: 128_000,
            safety_buffer_tokens: 500,
            safety_buffer_ratio: 0.10,
            system_share: 0.20,
            head_ratio: 0.60,
            tail_ratio: 0.35,
        }
    }
}

/// `[context]`: context file ceilings, in bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    pub max_file_bytes: usize,
    pub max_total_bytes: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 2 * 1024,
            max_total_bytes: 5 * 1024,
        }
    }
}

/// `[rate_limit]`: local request throttling. `max_requests = 0` disables it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 20,
            window_secs: 60,
        }
    }
}

/// `[storage]`: where and how often workflow state is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub state_dir: Option<PathBuf>,
    pub debounce_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            debounce_ms: 500,
        }
    }
}
