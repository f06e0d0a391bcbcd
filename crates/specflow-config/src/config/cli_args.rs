use std::path::PathBuf;

/// Overrides collected from the command line. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub model: Option<String>,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub generation_timeout_secs: Option<u64>,
    pub base_url: Option<String>,
    pub max_retries: Option<u32>,
    pub state_dir: Option<PathBuf>,
    pub no_auto_generate: bool,
}
