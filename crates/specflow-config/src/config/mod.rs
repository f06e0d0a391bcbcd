//! Configuration management for specflow
//!
//! This module provides hierarchical configuration with discovery and precedence:
//! CLI > file > defaults. Supports TOML configuration files with `[defaults]`,
//! `[api]`, `[budget]`, `[context]`, `[rate_limit]` and `[storage]` sections.

mod builder;
mod cli_args;
mod discovery;
mod model;
mod sources;
mod validation;

pub use builder::ConfigBuilder;
pub use cli_args::CliArgs;
pub use model::*;
pub use specflow_utils::types::ConfigSource;

use std::path::PathBuf;
use std::time::Duration;

/// Name of the per-project directory holding config and state.
pub const SPECFLOW_DIR: &str = ".specflow";

/// Environment variable overriding the `.specflow` directory location.
pub const SPECFLOW_HOME_ENV: &str = "SPECFLOW_HOME";

impl Config {
    /// Read the API key from the environment variable named by `api.api_key_env`.
    ///
    /// Empty values count as unset. The key is never stored on `Config`.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api.api_key_env)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Directory holding persisted workflow state.
    ///
    /// A relative `storage.state_dir` is resolved against the directory that
    /// contains `.specflow`.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        match &self.storage.state_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self
                .home_dir
                .parent()
                .map_or_else(|| dir.clone(), |root| root.join(dir)),
            None => self.home_dir.join("state"),
        }
    }

    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.defaults.generation_timeout_secs)
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.storage.debounce_ms)
    }

    /// Configuration with built-in defaults only, rooted at a temp-like home.
    #[must_use]
    pub fn minimal_for_testing() -> Self {
        Self {
            defaults: Defaults {
                model: Some("test/model".to_string()),
                ..Defaults::default()
            },
            api: ApiConfig::default(),
            budget: BudgetConfig::default(),
            context: ContextConfig::default(),
            rate_limit: RateLimitConfig::default(),
            storage: StorageConfig::default(),
            home_dir: PathBuf::from(SPECFLOW_DIR),
            source_attribution: std::collections::HashMap::new(),
        }
    }
}
