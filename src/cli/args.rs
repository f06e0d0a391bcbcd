//! CLI argument definitions and parsing structures

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use specflow_config::CliArgs;
use specflow_utils::types::PhaseId;

/// specflow - requirements, design and tasks from a feature idea
#[derive(Parser, Debug)]
#[command(name = "specflow")]
#[command(about = "Generate requirements, design and task documents one approved phase at a time")]
#[command(long_about = r#"
specflow turns a rough feature idea into three markdown documents using an
LLM completion API. Each document must be approved before the next one is
generated, and each phase only sees the approved documents before it.

EXAMPLES:
  # Seed the workflow and generate requirements
  specflow generate --name "Login" --description "Users can log in with email/password"

  # Attach a context file for the requirements phase
  specflow context add docs/api.md

  # Approve the active phase, move on and generate the next document
  specflow advance

  # Print a document
  specflow show design

  # Start over
  specflow reset

CONFIGURATION:
  Precedence: CLI flags > .specflow/config.toml > defaults
  The config file is found by searching upward from the current directory.
  The API key is read from the environment variable named by api.api_key_env
  (OPENROUTER_API_KEY by default).

PHASES:
  Requirements → Design → Tasks → Complete
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Model id sent to the completion API
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Completion token ceiling per request
    #[arg(long, global = true)]
    pub max_output_tokens: Option<u32>,

    /// Sampling temperature
    #[arg(long, global = true)]
    pub temperature: Option<f32>,

    /// Generation timeout in seconds (default: 180)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Completion API base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Retries after a failed completion request
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Directory holding the persisted workflow state
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Do not generate the next phase after `advance`
    #[arg(long, global = true)]
    pub no_auto_generate: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Overrides handed to configuration discovery.
    #[must_use]
    pub fn to_cli_args(&self) -> CliArgs {
        CliArgs {
            config_path: self.config.clone(),
            model: self.model.clone(),
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
            generation_timeout_secs: self.timeout,
            base_url: self.base_url.clone(),
            max_retries: self.max_retries,
            state_dir: self.state_dir.clone(),
            no_auto_generate: self.no_auto_generate,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the workflow position, approvals and timings
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Set the feature name and description
    Seed {
        #[command(flatten)]
        seed: SeedArgs,
    },

    /// Manage context files for the requirements phase
    #[command(subcommand)]
    Context(ContextCommands),

    /// Generate the active phase's document
    Generate {
        /// Seed the workflow first (requirements phase only)
        #[command(flatten)]
        seed: OptionalSeedArgs,
    },

    /// Approve a phase's document (defaults to the active phase)
    Approve {
        #[arg(value_parser = parse_phase)]
        phase: Option<PhaseId>,
    },

    /// Reject a phase's document and discard it (defaults to the active phase)
    Reject {
        #[arg(value_parser = parse_phase)]
        phase: Option<PhaseId>,
    },

    /// Move to the next phase once the active one is approved
    Proceed,

    /// Approve the active phase, move on, and generate the next document
    Advance,

    /// Switch the viewed phase
    View {
        #[arg(value_parser = parse_phase)]
        phase: PhaseId,
    },

    /// Print a phase's document (defaults to the viewed phase)
    Show {
        #[arg(value_parser = parse_phase)]
        phase: Option<PhaseId>,
    },

    /// Discard all workflow state
    Reset,

    /// List models offered by the completion API
    Models {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check configuration and API connectivity
    Check,
}

#[derive(clap::Args, Debug)]
pub struct SeedArgs {
    /// Feature name
    #[arg(long)]
    pub name: String,

    /// Feature description
    #[arg(long, required_unless_present = "description_file")]
    pub description: Option<String>,

    /// Read the description from a file
    #[arg(long, conflicts_with = "description")]
    pub description_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct OptionalSeedArgs {
    /// Feature name
    #[arg(long, requires = "description_source")]
    pub name: Option<String>,

    /// Feature description
    #[arg(long, group = "description_source", requires = "name")]
    pub description: Option<String>,

    /// Read the description from a file
    #[arg(long, group = "description_source", requires = "name")]
    pub description_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum ContextCommands {
    /// Attach a file
    Add {
        path: PathBuf,

        /// MIME type (guessed from the extension when omitted)
        #[arg(long)]
        mime: Option<String>,
    },

    /// Detach a file by id
    Remove { id: String },

    /// List attached files
    List,
}

fn parse_phase(value: &str) -> Result<PhaseId, String> {
    value.parse()
}
