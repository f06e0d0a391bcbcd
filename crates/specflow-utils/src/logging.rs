//! Structured logging setup and phase lifecycle helpers.

use tracing::{Level, error, info, span};
use tracing_subscriber::{EnvFilter, fmt, fmt::format::FmtSpan, prelude::*};

use crate::redaction::redact_error_message;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `specflow` crates log at `info`
/// (or `debug` when `verbose`) and everything else at `warn`. Verbose mode
/// also emits span-close events, which carry span durations.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("specflow=debug,info")
            } else {
                EnvFilter::try_new("specflow=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_span_events(if verbose {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()?;

    Ok(())
}

/// Span wrapping one generation of one phase.
pub fn phase_span(feature: &str, phase: &str, model: &str) -> tracing::Span {
    span!(
        Level::INFO,
        "phase_generation",
        feature = %feature,
        phase = %phase,
        model = %model,
    )
}

pub fn log_phase_start(phase: &str, model: &str, prompt_tokens: usize) {
    info!(
        phase = %phase,
        model = %model,
        estimated_prompt_tokens = prompt_tokens,
        "Starting phase generation"
    );
}

pub fn log_phase_complete(phase: &str, duration_ms: u128, total_tokens: Option<u64>) {
    info!(
        phase = %phase,
        duration_ms = %duration_ms,
        total_tokens = ?total_tokens,
        "Phase generation completed"
    );
}

/// Log a failed generation. The error text is redacted first.
pub fn log_phase_error(phase: &str, error: &str, duration_ms: u128) {
    let sanitized_error = redact_error_message(error);
    error!(
        phase = %phase,
        duration_ms = %duration_ms,
        error = %sanitized_error,
        "Phase generation failed"
    );
}
