use std::collections::BTreeMap;

use super::{Config, ConfigSource};

fn stable_source_label(source: &ConfigSource) -> &'static str {
    match source {
        ConfigSource::Cli => "cli",
        ConfigSource::Config => "config",
        ConfigSource::Programmatic => "programmatic",
        ConfigSource::Default => "default",
    }
}

impl Config {
    /// Source label for a key, `default` when untracked.
    #[must_use]
    pub fn source_of(&self, key: &str) -> &'static str {
        self.source_attribution
            .get(key)
            .map_or("default", stable_source_label)
    }

    /// Effective configuration as key -> (value, source), sorted by key.
    ///
    /// The API key itself is never included; `api_key` reports only whether
    /// the configured variable is set.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut config = BTreeMap::new();

        let mut add = |key: &str, value: String| {
            config.insert(key.to_string(), (value, self.source_of(key).to_string()));
        };

        add(
            "model",
            self.defaults.model.clone().unwrap_or_else(|| "<unset>".to_string()),
        );
        add("max_output_tokens", self.defaults.max_output_tokens.to_string());
        add("temperature", self.defaults.temperature.to_string());
        add(
            "generation_timeout_secs",
            self.defaults.generation_timeout_secs.to_string(),
        );
        add("auto_generate", self.defaults.auto_generate.to_string());
        add(
            "description_max_chars",
            self.defaults.description_max_chars.to_string(),
        );
        add("base_url", self.api.base_url.clone());
        add("api_key_env", self.api.api_key_env.clone());
        add("max_retries", self.api.max_retries.to_string());
        add("context_limit", self.budget.context_limit.to_string());
        add("chars_per_token", self.budget.chars_per_token.to_string());
        add("max_file_bytes", self.context.max_file_bytes.to_string());
        add("max_total_bytes", self.context.max_total_bytes.to_string());
        add("max_requests", self.rate_limit.max_requests.to_string());
        add("window_secs", self.rate_limit.window_secs.to_string());
        add("state_dir", self.state_dir().display().to_string());
        add("debounce_ms", self.storage.debounce_ms.to_string());

        let key_state = if self.api_key().is_some() { "set" } else { "missing" };
        config.insert(
            "api_key".to_string(),
            (
                format!("{} ({key_state})", self.api.api_key_env),
                "env".to_string(),
            ),
        );

        config
    }
}
