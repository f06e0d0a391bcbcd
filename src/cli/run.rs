//! CLI entry point and dispatch logic
//!
//! `run()` parses arguments, discovers configuration, builds the runtime,
//! dispatches, and prints every error itself.

use std::sync::Arc;

use clap::Parser;

use specflow_config::Config;
use specflow_llm::CompletionClient;
use specflow_utils::error::{ConfigError, SpecflowError};
use specflow_utils::exit_codes::ExitCode;
use specflow_utils::logging::init_tracing;

use super::args::{Cli, Commands};
use super::commands;
use crate::Session;

/// Main CLI execution function.
///
/// Returns `Err(ExitCode)` after printing the error; main.rs only maps it to
/// the process exit status.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    let config = match Config::discover(&cli.to_cli_args()) {
        Ok(config) => config,
        Err(e) => {
            let err = SpecflowError::from(config_error(e));
            eprintln!("{}", err.display_for_user());
            return Err(err.to_exit_code());
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let result = rt.block_on(dispatch(cli.command, &config));
    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::debug!(error = ?err, "Command failed");
            eprintln!("{}", err.display_for_user());
            Err(err.to_exit_code())
        }
    }
}

async fn dispatch(command: Commands, config: &Config) -> Result<(), SpecflowError> {
    let client = Arc::new(CompletionClient::from_config(config)?);

    // Catalogue and connectivity commands never touch workflow state.
    match command {
        Commands::Models { json } => commands::execute_models_command(&client, json).await,
        Commands::Check => commands::execute_check_command(config, &client).await,
        command => {
            let session = Session::open(config, client)?;
            let result = execute(command, &session).await;
            // Failures are recorded in the state, so it is written either way.
            let closed = session.close().await;
            result.and(closed)
        }
    }
}

async fn execute(command: Commands, session: &Session) -> Result<(), SpecflowError> {
    match command {
        Commands::Status { json } => commands::execute_status_command(session, json),
        Commands::Seed { seed } => commands::execute_seed_command(session, seed),
        Commands::Context(command) => commands::execute_context_command(session, command),
        Commands::Generate { seed } => commands::execute_generate_command(session, seed).await,
        Commands::Approve { phase } => commands::execute_approve_command(session, phase),
        Commands::Reject { phase } => commands::execute_reject_command(session, phase),
        Commands::Proceed => commands::execute_proceed_command(session),
        Commands::Advance => commands::execute_advance_command(session).await,
        Commands::View { phase } => commands::execute_view_command(session, phase),
        Commands::Show { phase } => commands::execute_show_command(session, phase),
        Commands::Reset => commands::execute_reset_command(session),
        // Answered by dispatch without a session.
        Commands::Models { .. } | Commands::Check => Ok(()),
    }
}

/// Recover the typed error from discovery, or wrap its message.
fn config_error(err: anyhow::Error) -> ConfigError {
    match err.downcast::<ConfigError>() {
        Ok(err) => err,
        Err(err) => ConfigError::DiscoveryFailed {
            reason: format!("{err:#}"),
        },
    }
}
