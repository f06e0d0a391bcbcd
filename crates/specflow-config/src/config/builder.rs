use std::path::PathBuf;
use std::time::Duration;

use specflow_utils::error::ConfigError;

use super::discovery::{Layer, default_attribution};
use super::{
    ApiConfig, BudgetConfig, Config, ConfigSource, ContextConfig, Defaults, RateLimitConfig,
    SPECFLOW_DIR, StorageConfig,
};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// # Example
    ///
    /// ```rust
    /// use specflow_config::Config;
    /// use std::time::Duration;
    ///
    /// let config = Config::builder()
    ///     .model("anthropic/claude-3.5-sonnet")
    ///     .generation_timeout(Duration::from_secs(120))
    ///     .build()
    ///     .expect("valid config");
    /// assert_eq!(config.defaults.generation_timeout_secs, 120);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for programmatic configuration of specflow.
///
/// Nothing is read from the environment or the filesystem. All values set via
/// the builder are attributed to `ConfigSource::Programmatic`.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    home_dir: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    model: Option<String>,
    max_output_tokens: Option<u32>,
    temperature: Option<f32>,
    generation_timeout: Option<Duration>,
    auto_generate: Option<bool>,
    base_url: Option<String>,
    api_key_env: Option<String>,
    max_retries: Option<u32>,
    context_limit: Option<u32>,
    max_file_bytes: Option<usize>,
    max_total_bytes: Option<usize>,
    rate_limit: Option<(u32, u64)>,
    debounce_ms: Option<u64>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `.specflow` directory the configuration is anchored to.
    #[must_use]
    pub fn home_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(path.into());
        self
    }

    #[must_use]
    pub fn state_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(path.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn auto_generate(mut self, enabled: bool) -> Self {
        self.auto_generate = Some(enabled);
        self
    }

    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn api_key_env(mut self, name: impl Into<String>) -> Self {
        self.api_key_env = Some(name.into());
        self
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    #[must_use]
    pub fn context_limit(mut self, tokens: u32) -> Self {
        self.context_limit = Some(tokens);
        self
    }

    #[must_use]
    pub fn context_ceilings(mut self, max_file_bytes: usize, max_total_bytes: usize) -> Self {
        self.max_file_bytes = Some(max_file_bytes);
        self.max_total_bytes = Some(max_total_bytes);
        self
    }

    /// Allow at most `max_requests` per `window_secs`. Zero requests disables the limiter.
    #[must_use]
    pub fn rate_limit(mut self, max_requests: u32, window_secs: u64) -> Self {
        self.rate_limit = Some((max_requests, window_secs));
        self
    }

    #[must_use]
    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = Some(ms);
        self
    }

    /// Build and validate the `Config`.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut source_attribution = default_attribution();

        let mut defaults = Defaults::default();
        let mut api = ApiConfig::default();
        let mut budget = BudgetConfig::default();
        let mut context = ContextConfig::default();
        let mut rate_limit = RateLimitConfig::default();
        let mut storage = StorageConfig::default();

        let mut layer = Layer::new(&mut source_attribution, ConfigSource::Programmatic);
        layer.set("model", &mut defaults.model, self.model.map(Some));
        layer.set(
            "max_output_tokens",
            &mut defaults.max_output_tokens,
            self.max_output_tokens,
        );
        layer.set("temperature", &mut defaults.temperature, self.temperature);
        layer.set(
            "generation_timeout_secs",
            &mut defaults.generation_timeout_secs,
            self.generation_timeout.map(|t| t.as_secs()),
        );
        layer.set("auto_generate", &mut defaults.auto_generate, self.auto_generate);
        layer.set("base_url", &mut api.base_url, self.base_url);
        layer.set("api_key_env", &mut api.api_key_env, self.api_key_env);
        layer.set("max_retries", &mut api.max_retries, self.max_retries);
        layer.set("context_limit", &mut budget.context_limit, self.context_limit);
        layer.set("max_file_bytes", &mut context.max_file_bytes, self.max_file_bytes);
        layer.set("max_total_bytes", &mut context.max_total_bytes, self.max_total_bytes);
        layer.set(
            "max_requests",
            &mut rate_limit.max_requests,
            self.rate_limit.map(|(n, _)| n),
        );
        layer.set(
            "window_secs",
            &mut rate_limit.window_secs,
            self.rate_limit.map(|(_, w)| w),
        );
        layer.set("state_dir", &mut storage.state_dir, self.state_dir.map(Some));
        layer.set("debounce_ms", &mut storage.debounce_ms, self.debounce_ms);

        let config = Config {
            defaults,
            api,
            budget,
            context,
            rate_limit,
            storage,
            home_dir: self.home_dir.unwrap_or_else(|| PathBuf::from(SPECFLOW_DIR)),
            source_attribution,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_values_are_programmatic() {
        let config = Config::builder()
            .model("m")
            .max_retries(5)
            .build()
            .unwrap();

        assert_eq!(config.defaults.model.as_deref(), Some("m"));
        assert_eq!(config.api.max_retries, 5);
        assert_eq!(
            config.source_attribution.get("max_retries"),
            Some(&ConfigSource::Programmatic)
        );
        assert_eq!(
            config.source_attribution.get("temperature"),
            Some(&ConfigSource::Default)
        );
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        let err = Config::builder().max_output_tokens(0).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "defaults.max_output_tokens"));
    }

    #[test]
    fn test_state_dir_resolution() {
        let config = Config::builder().home_dir("/work/.specflow").build().unwrap();
        assert_eq!(config.state_dir(), PathBuf::from("/work/.specflow/state"));

        let config = Config::builder()
            .home_dir("/work/.specflow")
            .state_dir("var/specflow")
            .build()
            .unwrap();
        assert_eq!(config.state_dir(), PathBuf::from("/work/var/specflow"));
    }
}
