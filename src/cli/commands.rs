//! Command implementations

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use serde_json::json;

use specflow_config::Config;
use specflow_engine::{ApprovalStatus, WorkflowState};
use specflow_llm::{CompletionClient, LlmError, Model};
use specflow_utils::error::SpecflowError;
use specflow_utils::types::PhaseId;

use crate::Session;

use super::args::{ContextCommands, OptionalSeedArgs, SeedArgs};

pub(super) fn execute_status_command(session: &Session, json: bool) -> Result<(), SpecflowError> {
    let state = session.engine().state();
    if json {
        print_json(&status_json(&state))?;
    } else {
        print!("{}", render_status(&state));
    }
    Ok(())
}

pub(super) fn execute_seed_command(session: &Session, seed: SeedArgs) -> Result<(), SpecflowError> {
    let description = read_description(seed.description, seed.description_file.as_deref())?;
    let reset = session.engine().seed(&seed.name, description)?;
    if reset {
        println!("✓ Seed changed substantively; all phases were cleared");
    }
    println!("✓ Seeded '{}'", seed.name.trim());
    Ok(())
}

pub(super) fn execute_context_command(
    session: &Session,
    command: ContextCommands,
) -> Result<(), SpecflowError> {
    let engine = session.engine();
    match command {
        ContextCommands::Add { path, mime } => {
            let bytes = fs::read(&path)?;
            let name = path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
            let mime = mime.unwrap_or_else(|| guess_mime(&name, &bytes).to_string());
            let content = String::from_utf8_lossy(&bytes).into_owned();
            let file = engine.add_context_file(name, mime, content)?;
            println!("✓ Added {} ({}, {} bytes) as {}", file.name, file.mime_type, file.size, file.id);
        }
        ContextCommands::Remove { id } => {
            let file = engine.remove_context_file(&id)?;
            println!("✓ Removed {} ({})", file.name, file.id);
        }
        ContextCommands::List => {
            let state = engine.state();
            if state.context.is_empty() {
                println!("No context files");
            }
            for file in &state.context {
                println!("{}  {:<32} {:<24} {:>8} bytes", file.id, file.name, file.mime_type, file.size);
            }
        }
    }
    Ok(())
}

pub(super) async fn execute_generate_command(
    session: &Session,
    seed: OptionalSeedArgs,
) -> Result<(), SpecflowError> {
    let engine = session.engine();
    let content = match seed.name {
        Some(name) => {
            let description = read_description(seed.description, seed.description_file.as_deref())?;
            eprintln!("Generating requirements for '{}'...", name.trim());
            engine.generate_with_data(name, description).await?
        }
        None => {
            eprintln!("Generating {}...", engine.state().phase);
            engine.generate().await?
        }
    };
    println!("{content}");
    Ok(())
}

pub(super) fn execute_approve_command(
    session: &Session,
    phase: Option<PhaseId>,
) -> Result<(), SpecflowError> {
    let engine = session.engine();
    let phase = phase.unwrap_or_else(|| engine.state().phase);
    engine.approve(phase)?;
    println!("✓ Approved {phase}");
    Ok(())
}

pub(super) fn execute_reject_command(
    session: &Session,
    phase: Option<PhaseId>,
) -> Result<(), SpecflowError> {
    let engine = session.engine();
    let phase = phase.unwrap_or_else(|| engine.state().phase);
    engine.reject(phase)?;
    println!("✓ Rejected {phase}; its document was discarded");
    Ok(())
}

pub(super) fn execute_proceed_command(session: &Session) -> Result<(), SpecflowError> {
    let next = session.engine().proceed()?;
    println!("✓ Now at {next}");
    Ok(())
}

pub(super) async fn execute_advance_command(session: &Session) -> Result<(), SpecflowError> {
    let transition = session.engine().approve_and_proceed()?;
    println!("✓ Approved {}; now at {}", transition.from, transition.to);
    if let Some(task) = transition.generation {
        eprintln!("Generating {}...", task.phase());
        let content = task.wait().await?;
        println!("{content}");
    }
    Ok(())
}

pub(super) fn execute_view_command(session: &Session, phase: PhaseId) -> Result<(), SpecflowError> {
    session.engine().view(phase)?;
    println!("✓ Viewing {phase}");
    Ok(())
}

pub(super) fn execute_show_command(
    session: &Session,
    phase: Option<PhaseId>,
) -> Result<(), SpecflowError> {
    let state = session.engine().state();
    let phase = phase.unwrap_or(state.view_phase);
    let content = state.content(phase);
    if content.is_empty() {
        eprintln!("No {phase} document yet");
    } else {
        println!("{content}");
    }
    Ok(())
}

pub(super) fn execute_reset_command(session: &Session) -> Result<(), SpecflowError> {
    session.engine().reset();
    println!("✓ Workflow reset");
    Ok(())
}

pub(super) async fn execute_models_command(
    client: &CompletionClient,
    json: bool,
) -> Result<(), SpecflowError> {
    let mut models = client.list_models().await?;
    models.sort_by(|a, b| a.id.cmp(&b.id));
    if json {
        let value = serde_json::to_value(&models).map_err(io::Error::other)?;
        print_json(&value)?;
    } else {
        for model in &models {
            println!("{}", render_model(model));
        }
    }
    Ok(())
}

pub(super) async fn execute_check_command(
    config: &Config,
    client: &CompletionClient,
) -> Result<(), SpecflowError> {
    println!("Effective configuration:");
    for (key, (value, source)) in config.effective_config() {
        println!("  {key:<24} {value}  [{source}]");
    }
    if config.api_key().is_none() {
        println!("✗ {} is not set", config.api.api_key_env);
    }

    if client.test_connection().await {
        println!("✓ Completion API reachable at {}", config.api.base_url);
        Ok(())
    } else {
        Err(LlmError::Network(format!("could not reach {}", config.api.base_url)).into())
    }
}

fn read_description(text: Option<String>, file: Option<&Path>) -> Result<String, SpecflowError> {
    match (text, file) {
        (_, Some(path)) => Ok(fs::read_to_string(path)?),
        (Some(text), None) => Ok(text),
        (None, None) => Ok(String::new()),
    }
}

fn print_json(value: &serde_json::Value) -> Result<(), SpecflowError> {
    let text = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    println!("{text}");
    Ok(())
}

/// MIME type from the file extension, falling back on whether the bytes are
/// text.
pub(super) fn guess_mime(name: &str, bytes: &[u8]) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "md" | "markdown" => "text/markdown",
        "txt" | "log" => "text/plain",
        "json" => "application/json",
        "toml" => "application/toml",
        "yaml" | "yml" => "application/yaml",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        _ if std::str::from_utf8(bytes).is_ok() => "text/plain",
        _ => "application/octet-stream",
    }
}

const fn approval_label(status: ApprovalStatus) -> &'static str {
    match status {
        ApprovalStatus::Pending => "pending",
        ApprovalStatus::Approved => "approved",
        ApprovalStatus::Rejected => "rejected",
    }
}

pub(super) fn render_status(state: &WorkflowState) -> String {
    let mut out = String::new();
    let feature = if state.feature_name.is_empty() {
        "(not seeded)"
    } else {
        state.feature_name.as_str()
    };
    let _ = writeln!(out, "Feature: {feature}");
    let _ = writeln!(out, "Phase:   {} (viewing {})", state.phase, state.view_phase);

    for phase in PhaseId::GENERATIVE {
        let marker = if state.generating_phase == Some(phase) && state.is_generating {
            "…"
        } else if state.is_approved(phase) {
            "✓"
        } else if state.has_content(phase) {
            "•"
        } else {
            "·"
        };
        let mut line = format!("  {marker} {:<13} {:<9}", phase.as_str(), approval_label(state.approvals.get(phase)));
        if let Some(ms) = state.timing.get(phase).and_then(|t| t.elapsed_ms) {
            let _ = write!(line, " {:>7.1}s", ms as f64 / 1000.0);
        }
        if let Some(cost) = state.api_responses.get(phase).and_then(|r| r.cost) {
            let _ = write!(line, "  ${cost:.4}");
        }
        let _ = writeln!(out, "{}", line.trim_end());
    }

    let _ = writeln!(out, "Context files: {}", state.context.len());
    if let Some(error) = &state.error {
        let _ = writeln!(out, "Last error: {error}");
    }
    out
}

pub(super) fn status_json(state: &WorkflowState) -> serde_json::Value {
    let phases: Vec<_> = PhaseId::GENERATIVE
        .iter()
        .map(|&phase| {
            let timing = state.timing.get(phase);
            let record = state.api_responses.get(phase);
            json!({
                "phase": phase,
                "approval": approval_label(state.approvals.get(phase)),
                "has_content": state.has_content(phase),
                "elapsed_ms": timing.and_then(|t| t.elapsed_ms),
                "model": record.map(|r| r.model.as_str()),
                "total_tokens": record.and_then(|r| r.usage).map(|u| u.total_tokens),
                "cost": record.and_then(|r| r.cost),
            })
        })
        .collect();
    let context: Vec<_> = state
        .context
        .iter()
        .map(|f| json!({ "id": f.id, "name": f.name, "type": f.mime_type, "size": f.size }))
        .collect();

    json!({
        "feature_name": state.feature_name,
        "phase": state.phase,
        "view_phase": state.view_phase,
        "is_generating": state.is_generating,
        "generating_phase": state.generating_phase,
        "error": state.error,
        "phases": phases,
        "context": context,
    })
}

fn render_model(model: &Model) -> String {
    let mut line = model.id.clone();
    if let Some(context) = model.context_length {
        let _ = write!(line, "  ctx={context}");
    }
    if let Some(pricing) = model.pricing {
        let _ = write!(
            line,
            "  ${:.2}/${:.2} per 1M tokens",
            pricing.prompt * 1_000_000.0,
            pricing.completion * 1_000_000.0
        );
    }
    line
}
