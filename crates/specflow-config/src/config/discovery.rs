use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use super::{
    ApiConfig, BudgetConfig, CliArgs, Config, ConfigSource, ContextConfig, Defaults,
    RateLimitConfig, SPECFLOW_DIR, SPECFLOW_HOME_ENV, StorageConfig,
};

/// TOML configuration file structure. Every key is optional so that
/// attribution can tell file values apart from defaults.
#[derive(Debug, Default, Deserialize, Serialize)]
pub(crate) struct TomlConfig {
    defaults: Option<FileDefaults>,
    api: Option<FileApi>,
    budget: Option<FileBudget>,
    context: Option<FileContext>,
    rate_limit: Option<FileRateLimit>,
    storage: Option<FileStorage>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct FileDefaults {
    model: Option<String>,
    max_output_tokens: Option<u32>,
    temperature: Option<f32>,
    generation_timeout_secs: Option<u64>,
    auto_generate: Option<bool>,
    description_max_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct FileApi {
    base_url: Option<String>,
    api_key_env: Option<String>,
    referer: Option<String>,
    title: Option<String>,
    max_retries: Option<u32>,
    connect_timeout_secs: Option<u64>,
    retry_base_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct FileBudget {
    chars_per_token: Option<f64>,
    context_limit: Option<u32>,
    safety_buffer_tokens: Option<u32>,
    safety_buffer_ratio: Option<f64>,
    system_share: Option<f64>,
    head_ratio: Option<f64>,
    tail_ratio: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct FileContext {
    max_file_bytes: Option<usize>,
    max_total_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct FileRateLimit {
    max_requests: Option<u32>,
    window_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct FileStorage {
    state_dir: Option<PathBuf>,
    debounce_ms: Option<u64>,
}

/// Keys tracked in `source_attribution`, all of which start out as defaults.
pub(crate) const ATTRIBUTED_KEYS: &[&str] = &[
    "model",
    "max_output_tokens",
    "temperature",
    "generation_timeout_secs",
    "auto_generate",
    "description_max_chars",
    "base_url",
    "api_key_env",
    "referer",
    "title",
    "max_retries",
    "connect_timeout_secs",
    "retry_base_delay_ms",
    "chars_per_token",
    "context_limit",
    "safety_buffer_tokens",
    "safety_buffer_ratio",
    "system_share",
    "head_ratio",
    "tail_ratio",
    "max_file_bytes",
    "max_total_bytes",
    "max_requests",
    "window_secs",
    "state_dir",
    "debounce_ms",
];

pub(crate) fn default_attribution() -> HashMap<String, ConfigSource> {
    ATTRIBUTED_KEYS
        .iter()
        .map(|key| ((*key).to_string(), ConfigSource::Default))
        .collect()
}

/// Writes a value into a config slot and records where it came from.
pub(crate) struct Layer<'a> {
    attribution: &'a mut HashMap<String, ConfigSource>,
    source: ConfigSource,
}

impl<'a> Layer<'a> {
    pub(crate) fn new(
        attribution: &'a mut HashMap<String, ConfigSource>,
        source: ConfigSource,
    ) -> Self {
        Self {
            attribution,
            source,
        }
    }

    pub(crate) fn set<T>(&mut self, key: &str, slot: &mut T, value: Option<T>) {
        if let Some(value) = value {
            *slot = value;
            self.attribution.insert(key.to_string(), self.source.clone());
        }
    }
}

impl TomlConfig {
    #[allow(clippy::too_many_arguments)]
    fn apply(
        self,
        layer: &mut Layer<'_>,
        defaults: &mut Defaults,
        api: &mut ApiConfig,
        budget: &mut BudgetConfig,
        context: &mut ContextConfig,
        rate_limit: &mut RateLimitConfig,
        storage: &mut StorageConfig,
    ) {
        if let Some(file) = self.defaults {
            layer.set("model", &mut defaults.model, file.model.map(Some));
            layer.set(
                "max_output_tokens",
                &mut defaults.max_output_tokens,
                file.max_output_tokens,
            );
            layer.set("temperature", &mut defaults.temperature, file.temperature);
            layer.set(
                "generation_timeout_secs",
                &mut defaults.generation_timeout_secs,
                file.generation_timeout_secs,
            );
            layer.set("auto_generate", &mut defaults.auto_generate, file.auto_generate);
            layer.set(
                "description_max_chars",
                &mut defaults.description_max_chars,
                file.description_max_chars,
            );
        }

        if let Some(file) = self.api {
            layer.set("base_url", &mut api.base_url, file.base_url);
            layer.set("api_key_env", &mut api.api_key_env, file.api_key_env);
            layer.set("referer", &mut api.referer, file.referer.map(Some));
            layer.set("title", &mut api.title, file.title.map(Some));
            layer.set("max_retries", &mut api.max_retries, file.max_retries);
            layer.set(
                "connect_timeout_secs",
                &mut api.connect_timeout_secs,
                file.connect_timeout_secs,
            );
            layer.set(
                "retry_base_delay_ms",
                &mut api.retry_base_delay_ms,
                file.retry_base_delay_ms,
            );
        }

        if let Some(file) = self.budget {
            layer.set("chars_per_token", &mut budget.chars_per_token, file.chars_per_token);
            layer.set("context_limit", &mut budget.context_limit, file.context_limit);
            layer.set(
                "safety_buffer_tokens",
                &mut budget.safety_buffer_tokens,
                file.safety_buffer_tokens,
            );
            layer.set(
                "safety_buffer_ratio",
                &mut budget.safety_buffer_ratio,
                file.safety_buffer_ratio,
            );
            layer.set("system_share", &mut budget.system_share, file.system_share);
            layer.set("head_ratio", &mut budget.head_ratio, file.head_ratio);
            layer.set("tail_ratio", &mut budget.tail_ratio, file.tail_ratio);
        }

        if let Some(file) = self.context {
            layer.set("max_file_bytes", &mut context.max_file_bytes, file.max_file_bytes);
            layer.set("max_total_bytes", &mut context.max_total_bytes, file.max_total_bytes);
        }

        if let Some(file) = self.rate_limit {
            layer.set("max_requests", &mut rate_limit.max_requests, file.max_requests);
            layer.set("window_secs", &mut rate_limit.window_secs, file.window_secs);
        }

        if let Some(file) = self.storage {
            layer.set("state_dir", &mut storage.state_dir, file.state_dir.map(Some));
            layer.set("debounce_ms", &mut storage.debounce_ms, file.debounce_ms);
        }
    }
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// Uses current working directory for config file discovery when no explicit
    /// path is provided in cli_args.
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from a specific directory
    ///
    /// This is the path-driven variant used by tests to avoid process-global state.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self> {
        let mut source_attribution = default_attribution();

        let mut defaults = Defaults::default();
        let mut api = ApiConfig::default();
        let mut budget = BudgetConfig::default();
        let mut context = ContextConfig::default();
        let mut rate_limit = RateLimitConfig::default();
        let mut storage = StorageConfig::default();

        let home_dir = Self::resolve_home_dir(start_dir);

        let config_path = match &cli_args.config_path {
            Some(explicit_path) => Some(explicit_path.clone()),
            None => Self::discover_config_file_from(start_dir)?,
        };

        if let Some(path) = &config_path {
            let file_config = Self::load_config_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?;
            let mut layer = Layer::new(&mut source_attribution, ConfigSource::Config);
            file_config.apply(
                &mut layer,
                &mut defaults,
                &mut api,
                &mut budget,
                &mut context,
                &mut rate_limit,
                &mut storage,
            );
        }

        // CLI overrides (highest priority)
        let mut layer = Layer::new(&mut source_attribution, ConfigSource::Cli);
        layer.set("model", &mut defaults.model, cli_args.model.clone().map(Some));
        layer.set(
            "max_output_tokens",
            &mut defaults.max_output_tokens,
            cli_args.max_output_tokens,
        );
        layer.set("temperature", &mut defaults.temperature, cli_args.temperature);
        layer.set(
            "generation_timeout_secs",
            &mut defaults.generation_timeout_secs,
            cli_args.generation_timeout_secs,
        );
        layer.set(
            "auto_generate",
            &mut defaults.auto_generate,
            cli_args.no_auto_generate.then_some(false),
        );
        layer.set("base_url", &mut api.base_url, cli_args.base_url.clone());
        layer.set("max_retries", &mut api.max_retries, cli_args.max_retries);
        layer.set(
            "state_dir",
            &mut storage.state_dir,
            cli_args.state_dir.clone().map(Some),
        );

        let config = Self {
            defaults,
            api,
            budget,
            context,
            rate_limit,
            storage,
            home_dir,
            source_attribution,
        };

        config.validate()?;

        Ok(config)
    }

    /// The `.specflow` directory for a working directory.
    ///
    /// `SPECFLOW_HOME` wins; otherwise the nearest existing `.specflow` found
    /// searching upward; otherwise `.specflow` under `start_dir`.
    pub fn resolve_home_dir(start_dir: &Path) -> PathBuf {
        if let Some(home) = env::var_os(SPECFLOW_HOME_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(home);
        }
        Self::search_upward(start_dir, |dir| {
            let candidate = dir.join(SPECFLOW_DIR);
            candidate.is_dir().then_some(candidate)
        })
        .unwrap_or_else(|| start_dir.join(SPECFLOW_DIR))
    }

    /// Discover config file by searching upward from a given directory
    ///
    /// `SPECFLOW_HOME/config.toml` is used when the variable is set. Otherwise
    /// walks up the directory tree looking for `.specflow/config.toml`,
    /// stopping at repository root markers (.git, .hg, .svn) or filesystem root.
    pub fn discover_config_file_from(start_dir: &Path) -> Result<Option<PathBuf>> {
        if let Some(home) = env::var_os(SPECFLOW_HOME_ENV).filter(|v| !v.is_empty()) {
            let path = PathBuf::from(home).join("config.toml");
            return Ok(path.exists().then_some(path));
        }

        Ok(Self::search_upward(start_dir, |dir| {
            let candidate = dir.join(SPECFLOW_DIR).join("config.toml");
            candidate.exists().then_some(candidate)
        }))
    }

    fn search_upward(
        start_dir: &Path,
        mut probe: impl FnMut(&Path) -> Option<PathBuf>,
    ) -> Option<PathBuf> {
        let mut current_dir = Some(start_dir);

        while let Some(dir) = current_dir {
            if let Some(found) = probe(dir) {
                return Some(found);
            }

            if dir.join(".git").exists() || dir.join(".hg").exists() || dir.join(".svn").exists()
            {
                break;
            }

            current_dir = dir.parent();
        }

        None
    }

    /// Load configuration from TOML file
    fn load_config_file(path: &Path) -> Result<TomlConfig> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: TomlConfig = toml::from_str(&content).with_context(|| {
                    format!("Failed to parse TOML config file: {}", path.display())
                })?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TomlConfig::default()),
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            )),
        }
    }
}
