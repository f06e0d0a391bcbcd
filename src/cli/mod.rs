//! Command-line interface for specflow
//!
//! - `args`: clap definitions
//! - `run`: entry point, config discovery and dispatch
//! - `commands`: one function per subcommand

pub mod args;
mod commands;
mod run;


pub use args::{Cli, Commands, ContextCommands};
pub use run::run;
