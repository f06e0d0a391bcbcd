//! Configuration for specflow.
//!
//! Values resolve with precedence CLI > `.specflow/config.toml` > built-in
//! defaults, and every resolved key remembers where it came from.

pub mod config;

pub use config::{
    ApiConfig, BudgetConfig, CliArgs, Config, ConfigBuilder, ConfigSource, ContextConfig,
    DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_TITLE, Defaults, RateLimitConfig,
    StorageConfig,
};
