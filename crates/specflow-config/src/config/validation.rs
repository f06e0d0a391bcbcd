use specflow_utils::error::ConfigError;

use super::Config;

fn invalid(key: &str, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
    }
}

fn check_fraction(key: &str, value: f64) -> Result<(), ConfigError> {
    if !(value > 0.0 && value < 1.0) {
        return Err(invalid(key, format!("{value} must be between 0 and 1 (exclusive)")));
    }
    Ok(())
}

impl Config {
    /// Validate configuration values
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if let Some(model) = &self.defaults.model
            && model.trim().is_empty()
        {
            return Err(invalid("defaults.model", "must not be empty"));
        }

        if self.defaults.max_output_tokens == 0 {
            return Err(invalid("defaults.max_output_tokens", "must be greater than 0"));
        }

        if !(0.0..=2.0).contains(&self.defaults.temperature) {
            return Err(invalid(
                "defaults.temperature",
                format!("{} is outside 0.0..=2.0", self.defaults.temperature),
            ));
        }

        if self.defaults.generation_timeout_secs < 5 {
            return Err(invalid(
                "defaults.generation_timeout_secs",
                "must be at least 5 seconds",
            ));
        }
        if self.defaults.generation_timeout_secs > 3600 {
            return Err(invalid(
                "defaults.generation_timeout_secs",
                "exceeds maximum limit of 3600 seconds",
            ));
        }

        if self.defaults.description_max_chars == 0 {
            return Err(invalid("defaults.description_max_chars", "must be greater than 0"));
        }

        if !(self.api.base_url.starts_with("https://") || self.api.base_url.starts_with("http://"))
        {
            return Err(invalid("api.base_url", "must start with http:// or https://"));
        }

        if self.api.api_key_env.trim().is_empty() {
            return Err(invalid("api.api_key_env", "must name an environment variable"));
        }

        if self.api.max_retries > 10 {
            return Err(invalid("api.max_retries", "exceeds maximum limit of 10"));
        }

        if self.budget.chars_per_token <= 0.0 || !self.budget.chars_per_token.is_finite() {
            return Err(invalid("budget.chars_per_token", "must be a positive number"));
        }

        if u64::from(self.budget.context_limit) <= u64::from(self.defaults.max_output_tokens) {
            return Err(invalid(
                "budget.context_limit",
                format!(
                    "{} must exceed defaults.max_output_tokens ({})",
                    self.budget.context_limit, self.defaults.max_output_tokens
                ),
            ));
        }

        check_fraction("budget.safety_buffer_ratio", self.budget.safety_buffer_ratio)?;
        check_fraction("budget.system_share", self.budget.system_share)?;
        check_fraction("budget.head_ratio", self.budget.head_ratio)?;
        check_fraction("budget.tail_ratio", self.budget.tail_ratio)?;
        if self.budget.head_ratio + self.budget.tail_ratio >= 1.0 {
            return Err(invalid(
                "budget.head_ratio",
                "head_ratio + tail_ratio must leave room for the omission marker",
            ));
        }

        if self.context.max_file_bytes == 0 {
            return Err(invalid("context.max_file_bytes", "must be greater than 0"));
        }
        if self.context.max_total_bytes < self.context.max_file_bytes {
            return Err(invalid(
                "context.max_total_bytes",
                "must be at least context.max_file_bytes",
            ));
        }

        if self.rate_limit.max_requests > 0 && self.rate_limit.window_secs == 0 {
            return Err(invalid("rate_limit.window_secs", "must be greater than 0"));
        }

        Ok(())
    }
}
