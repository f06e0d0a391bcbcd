//! specflow - a feature idea in, three approved documents out
//!
//! specflow walks a feature through three generative phases, each producing
//! a markdown document from an LLM completion API:
//!
//! ```text
//! Requirements → Design → Tasks → Complete
//! ```
//!
//! A phase's document must be approved before the workflow moves on, and
//! each phase only sees the approved output of the phases before it. State is
//! persisted after every change, so a workflow survives restarts.
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! export OPENROUTER_API_KEY=...
//! specflow --model anthropic/claude-3.5-sonnet generate \
//!     --name "Login" --description "Users can log in with email/password"
//! specflow advance      # approve requirements, generate the design
//! specflow advance      # approve the design, generate the task list
//! specflow show tasks
//! ```
//!
//! # Library
//!
//! The engine is backend-agnostic; anything implementing [`LlmBackend`] can
//! drive it. [`Session`] wires a backend to the on-disk state store the same
//! way the CLI does.
//!
//! # Crates
//!
//! | Crate | Role |
//! |-------|------|
//! | `specflow-utils` | Shared types, error taxonomy, logging, atomic writes |
//! | `specflow-config` | Layered configuration with source attribution |
//! | `specflow-packet` | Token budgeting, truncation, context file filtering |
//! | `specflow-llm` | Completion API client with retry and rate limiting |
//! | `specflow-phases` | Per-phase prompt construction |
//! | `specflow-engine` | Workflow state machine and persistence |

pub mod cli;
mod session;

pub use session::Session;

pub use specflow_config::{CliArgs, Config, ConfigBuilder};
pub use specflow_engine::{
    ApprovalStatus, EngineSettings, FileStore, GenerationTask, KeyValueStore, MemoryStore,
    PhaseWorkflowEngine, Transition, WorkflowState,
};
pub use specflow_llm::{
    Completion, CompletionClient, CompletionOptions, LlmBackend, LlmInvocation, Model, Usage,
};
pub use specflow_packet::{ContextFile, ContextFileFilter, TokenBudgetEnforcer};
pub use specflow_phases::{Phase, PhaseInput, PhasePrompt, PromptSettings, phase_for};
pub use specflow_utils::error::{
    ConfigError, LlmError, PhaseError, SpecflowError, StoreError, UserFriendlyError,
};
pub use specflow_utils::exit_codes::ExitCode;
pub use specflow_utils::types::PhaseId;
