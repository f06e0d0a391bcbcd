//! End-to-end workflow behaviour against a scripted backend.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use camino::Utf8PathBuf;
use tokio::sync::Notify;

use specflow_engine::{
    ApprovalStatus, EngineSettings, FileStore, KeyValueStore, PersistenceHandle,
    PhaseWorkflowEngine, WORKFLOW_STATE_KEY, WorkflowState, load_state,
};
use specflow_llm::{Completion, LlmBackend, LlmError, LlmInvocation, Model, ModelPricing, Usage};
use specflow_packet::{OMISSION_MARKER, TokenBudgetEnforcer};
use specflow_utils::error::{ErrorCode, PhaseError};
use specflow_utils::types::PhaseId;

const DESCRIPTION: &str = "Users can log in with email/password";

type Responder = Box<dyn Fn(&LlmInvocation, usize) -> Result<Completion, LlmError> + Send + Sync>;

struct ScriptedBackend {
    calls: Mutex<Vec<LlmInvocation>>,
    delay: Duration,
    gate: Option<Arc<Notify>>,
    model: Option<Model>,
    respond: Responder,
}

impl ScriptedBackend {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            delay: Duration::from_millis(25),
            gate: None,
            model: None,
            respond: Box::new(|inv, n| Ok(document_for(inv, n))),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn with_model(mut self, model: Model) -> Self {
        self.model = Some(model);
        self
    }

    fn with_responder(mut self, respond: Responder) -> Self {
        self.respond = respond;
        self
    }

    fn calls(&self) -> Vec<LlmInvocation> {
        self.calls.lock().unwrap().clone()
    }
}

/// A plausible document for whichever phase the system prompt asks for.
fn document_for(invocation: &LlmInvocation, n: usize) -> Completion {
    let content = if invocation.system_prompt.contains("requirements analyst") {
        format!("# Requirements Document\n\nREQ-{n}: users sign in with email and password.")
    } else if invocation.system_prompt.contains("software architect") {
        format!("# Design Document\n\nDESIGN-{n}: session service backed by a user store.")
    } else {
        format!("# Implementation Plan\n\n- [ ] 1. TASKS-{n}: build the session service")
    };
    Completion {
        content,
        model: invocation.model.clone(),
        usage: Some(Usage {
            prompt_tokens: 100,
            completion_tokens: 50,
            total_tokens: 150,
        }),
        finish_reason: Some("stop".to_string()),
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn invoke(&self, invocation: LlmInvocation) -> Result<Completion, LlmError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(invocation.clone());
            calls.len()
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        (self.respond)(&invocation, n)
    }

    async fn describe_model(&self, model_id: &str) -> Option<Model> {
        self.model.clone().filter(|m| m.id == model_id)
    }
}

fn settings() -> EngineSettings {
    EngineSettings {
        model: "test/model".to_string(),
        ..EngineSettings::default()
    }
}

fn engine_with(backend: Arc<ScriptedBackend>, settings: EngineSettings) -> PhaseWorkflowEngine {
    PhaseWorkflowEngine::new(backend, settings)
}

#[tokio::test(start_paused = true)]
async fn test_login_happy_path_auto_generates_design_from_requirements() -> Result<()> {
    let backend = Arc::new(ScriptedBackend::new().with_model(Model {
        id: "test/model".to_string(),
        name: "Test".to_string(),
        context_length: Some(32_000),
        pricing: Some(ModelPricing {
            prompt: 0.000_001,
            completion: 0.000_002,
        }),
        architecture: None,
    }));
    let engine = engine_with(backend.clone(), settings());

    let requirements = engine.generate_with_data("Login", DESCRIPTION).await?;

    let state = engine.state();
    assert!(!state.requirements.is_empty());
    assert_eq!(state.requirements, requirements);
    assert!(!state.is_generating);
    let timing = state.timing.requirements.as_ref().expect("timing recorded");
    assert!(timing.elapsed_ms.unwrap() > 0);
    assert!(timing.end_time.is_some());
    let record = state.api_responses.requirements.as_ref().expect("telemetry");
    assert_eq!(record.model, "test/model");
    assert_eq!(record.context_limit, 32_000);
    assert_eq!(record.prompt_hash.len(), 64);
    assert!((record.cost.unwrap() - 0.0002).abs() < 1e-12);

    let transition = engine.approve_and_proceed()?;
    assert_eq!(transition.from, PhaseId::Requirements);
    assert_eq!(transition.to, PhaseId::Design);

    let state = engine.state();
    assert_eq!(state.phase, PhaseId::Design);
    assert!(state.is_generating);
    assert_eq!(state.generating_phase, Some(PhaseId::Design));
    assert_eq!(state.approvals.requirements, ApprovalStatus::Approved);

    let task = transition.generation.expect("design generation started");
    assert_eq!(task.phase(), PhaseId::Design);
    let design = task.wait().await?;

    let state = engine.state();
    assert_eq!(state.design, design);
    assert!(!state.is_generating);

    let calls = backend.calls();
    assert_eq!(calls.len(), 2);
    let design_call = &calls[1];
    assert!(design_call.user_prompt.contains(&requirements));
    assert!(!design_call.user_prompt.contains(DESCRIPTION));
    assert!(!design_call.user_prompt.contains("Login"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_full_walk_is_monotonic_and_ends_at_complete() -> Result<()> {
    let backend = Arc::new(ScriptedBackend::new());
    let engine = engine_with(backend.clone(), settings());
    let mut seen = vec![engine.state().phase.index()];

    assert!(matches!(
        engine.approve_and_proceed(),
        Err(PhaseError::NoContent { .. })
    ));
    assert!(matches!(
        engine.proceed(),
        Err(PhaseError::ApprovalRequired { .. })
    ));
    seen.push(engine.state().phase.index());

    engine.generate_with_data("Login", DESCRIPTION).await?;
    for _ in 0..2 {
        let transition = engine.approve_and_proceed()?;
        seen.push(engine.state().phase.index());
        transition.generation.expect("auto generation").wait().await?;
    }
    let last = engine.approve_and_proceed()?;
    assert_eq!(last.to, PhaseId::Complete);
    assert!(last.generation.is_none());
    seen.push(engine.state().phase.index());

    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");

    assert!(matches!(
        engine.proceed(),
        Err(PhaseError::InvalidTransition { .. })
    ));
    assert!(matches!(
        engine.generate().await,
        Err(PhaseError::Precondition {
            phase: PhaseId::Complete,
            ..
        })
    ));

    let state = engine.state();
    assert!(PhaseId::GENERATIVE.iter().all(|p| state.is_approved(*p)));
    let tasks_call = &backend.calls()[2];
    assert!(tasks_call.user_prompt.contains("REQ-1"));
    assert!(tasks_call.user_prompt.contains("DESIGN-2"));
    assert!(!tasks_call.user_prompt.contains(DESCRIPTION));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_design_is_unreachable_without_approval() -> Result<()> {
    let backend = Arc::new(ScriptedBackend::new());
    let engine = engine_with(backend, settings());

    engine.generate_with_data("Login", DESCRIPTION).await?;
    engine.reject(PhaseId::Requirements)?;
    assert!(engine.proceed().is_err());
    assert!(engine.approve_and_proceed().is_err());
    assert_eq!(engine.state().phase, PhaseId::Requirements);

    // A persisted state claiming design without approved requirements is
    // refused on load.
    let forged = WorkflowState {
        phase: PhaseId::Design,
        requirements: "R".to_string(),
        ..WorkflowState::default()
    };
    assert!(forged.validate_shape().is_err());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_huge_description_is_clamped_not_rejected() -> Result<()> {
    let backend = Arc::new(ScriptedBackend::new());
    let mut settings = settings();
    settings.prompt.description_max_chars = 1_000_000;
    settings.context_limit = 16_000;
    let enforcer = TokenBudgetEnforcer::new(settings.budget);
    let engine = engine_with(backend.clone(), settings.clone());

    let description = format!("OPENING {} CLOSING", "lorem ipsum ".repeat(25_000));
    assert!(description.len() >= 300_000);

    engine.generate_with_data("Login", description).await?;

    let call = &backend.calls()[0];
    let estimated = enforcer.estimate_tokens(&call.system_prompt)
        + enforcer.estimate_tokens(&call.user_prompt);
    assert!(estimated <= settings.context_limit - settings.max_output_tokens as usize);
    let validation = enforcer.validate(
        &call.system_prompt,
        &call.user_prompt,
        settings.max_output_tokens as usize,
        settings.context_limit,
    );
    assert!(validation.valid, "{:?}", validation.error);
    assert!(call.user_prompt.contains("OPENING"));
    assert!(call.user_prompt.contains(OMISSION_MARKER));
    assert_eq!(call.options.context_limit, Some(16_000));
    assert!(!engine.state().requirements.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_default_description_cap_applies_before_clamping() -> Result<()> {
    let backend = Arc::new(ScriptedBackend::new());
    let engine = engine_with(backend.clone(), settings());

    let description = format!("OPENING {} CLOSING", "x".repeat(300_000));
    engine.generate_with_data("Login", description).await?;

    // The 5000-char description cap truncates middle-out well inside the
    // context budget, so the clamp has nothing left to do.
    let call = &backend.calls()[0];
    assert!(call.user_prompt.chars().count() < 6_000);
    assert_eq!(call.user_prompt.matches(OMISSION_MARKER).count(), 1);
    assert!(call.user_prompt.contains("OPENING xxx"));
    assert!(call.user_prompt.contains("xxx CLOSING"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_image_context_is_never_embedded() -> Result<()> {
    let backend = Arc::new(ScriptedBackend::new());
    let engine = engine_with(backend.clone(), settings());

    engine.add_context_file("api.md", "text/markdown", "POST /sessions returns a token")?;
    engine.add_context_file(
        "screen.png",
        "image/png",
        "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==",
    )?;
    engine.generate_with_data("Login", DESCRIPTION).await?;

    let call = &backend.calls()[0];
    assert!(call.user_prompt.contains("POST /sessions returns a token"));
    assert!(!call.user_prompt.contains("screen.png"));
    assert!(!call.user_prompt.contains("iVBORw0KGgo"));
    assert!(call.context_files.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reset_discards_late_result() -> Result<()> {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(ScriptedBackend::new().with_gate(gate.clone()));
    let engine = engine_with(backend, settings());
    engine.seed("Login", DESCRIPTION)?;

    let running = tokio::spawn({
        let engine = engine.clone();
        async move { engine.generate().await }
    });
    let mut rx = engine.subscribe();
    rx.wait_for(|s| s.is_generating).await?;

    assert!(matches!(
        engine.generate().await,
        Err(PhaseError::GenerationInProgress { .. })
    ));

    engine.reset();
    gate.notify_one();

    let result = running.await?;
    assert!(matches!(result, Err(PhaseError::Superseded { .. })));

    let state = engine.state();
    assert_eq!(state.requirements, "");
    assert_eq!(state.feature_name, "");
    assert!(!state.is_generating);
    assert!(state.timing.requirements.is_none());
    assert!(state.api_responses.requirements.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_timeout_releases_generation_and_records_timing() -> Result<()> {
    let backend = Arc::new(ScriptedBackend::new().with_delay(Duration::from_secs(600)));
    let engine = engine_with(backend, settings());

    let err = engine
        .generate_with_data("Login", DESCRIPTION)
        .await
        .unwrap_err();

    match &err {
        PhaseError::Generation { source, .. } => {
            assert!(matches!(source, LlmError::Timeout { .. }));
            assert_eq!(source.code(), ErrorCode::RequestTimeout);
        }
        other => panic!("expected generation error, got {other:?}"),
    }

    let state = engine.state();
    assert!(!state.is_generating);
    assert_eq!(state.error.as_deref(), Some("request timed out"));
    assert_eq!(state.requirements, "");
    let timing = state.timing.requirements.as_ref().expect("timing recorded");
    let elapsed = timing.elapsed_ms.expect("elapsed recorded");
    assert!((180_000..181_000).contains(&elapsed), "{elapsed}");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_wait_does_not_leave_phase_generating() -> Result<()> {
    let backend = Arc::new(ScriptedBackend::new().with_delay(Duration::from_secs(5)));
    let engine = engine_with(backend.clone(), settings());
    engine.seed("Login", DESCRIPTION)?;

    let waited = tokio::time::timeout(Duration::from_secs(1), engine.generate()).await;
    assert!(waited.is_err());
    assert!(engine.state().is_generating);

    tokio::time::sleep(Duration::from_secs(600)).await;
    let state = engine.state();
    assert!(!state.is_generating);
    assert_eq!(state.generating_phase, None);
    assert!(state.requirements.contains("REQ-1"));

    let second = engine.generate().await?;
    assert!(second.contains("REQ-2"));
    assert_eq!(backend.calls().len(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_panicking_backend_releases_generation() -> Result<()> {
    let backend = Arc::new(
        ScriptedBackend::new().with_responder(Box::new(
            |_: &LlmInvocation, _: usize| -> Result<Completion, LlmError> {
                panic!("backend exploded")
            },
        )),
    );
    let engine = engine_with(backend, settings());
    engine.seed("Login", DESCRIPTION)?;

    let caller = engine.clone();
    let joined = tokio::spawn(async move { caller.generate().await }).await;
    assert!(joined.unwrap_err().is_panic());

    let state = engine.state();
    assert!(!state.is_generating);
    assert!(state.error.is_some());
    assert!(matches!(
        engine.approve(PhaseId::Requirements),
        Err(PhaseError::NoContent { .. })
    ));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_regeneration_clears_stale_content() -> Result<()> {
    let backend = Arc::new(ScriptedBackend::new().with_responder(Box::new(|inv, n| {
        if n == 1 {
            Ok(document_for(inv, n))
        } else {
            Err(LlmError::Upstream {
                status: 503,
                code: ErrorCode::Http(503),
                upstream_code: None,
                message: "overloaded".to_string(),
            })
        }
    })));
    let engine = engine_with(backend, settings());

    engine.generate_with_data("Login", DESCRIPTION).await?;
    assert!(!engine.state().requirements.is_empty());

    let err = engine.generate().await.unwrap_err();
    assert!(matches!(err, PhaseError::Generation { .. }));

    let state = engine.state();
    assert_eq!(state.requirements, "");
    assert!(state.api_responses.requirements.is_none());
    assert!(state.error.as_deref().unwrap().contains("overloaded"));
    assert!(!state.is_generating);
    assert!(state.timing.requirements.as_ref().unwrap().elapsed_ms.is_some());

    // The error stays until the next attempt begins.
    engine.seed("Login", DESCRIPTION)?;
    assert!(engine.state().error.is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_drifted_seed_resets_later_phases() -> Result<()> {
    let backend = Arc::new(ScriptedBackend::new());
    let mut settings = settings();
    settings.auto_generate = false;
    let engine = engine_with(backend, settings);

    engine.generate_with_data("Login", DESCRIPTION).await?;
    engine.approve(PhaseId::Requirements)?;
    engine.proceed()?;
    engine.generate().await?;
    assert!(!engine.state().design.is_empty());

    assert!(matches!(
        engine.seed("Login", "Users can log in with email/password and a remember-me box"),
        Err(PhaseError::NotActive { .. })
    ));
    assert_eq!(engine.state().phase, PhaseId::Design);

    let reset = engine.seed("Invoices", "Generate monthly PDF invoices for customers")?;
    assert!(reset);
    let state = engine.state();
    assert_eq!(state.phase, PhaseId::Requirements);
    assert_eq!(state.requirements, "");
    assert_eq!(state.design, "");
    assert_eq!(state.approvals.requirements, ApprovalStatus::Pending);
    assert_eq!(state.feature_name, "Invoices");
    assert!(state.timing.design.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_state_survives_restart_through_file_store() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf())
        .map_err(|p| anyhow::anyhow!("non UTF-8 temp dir: {}", p.display()))?;
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(dir));

    let backend = Arc::new(ScriptedBackend::new());
    let engine = PhaseWorkflowEngine::with_state(backend.clone(), settings(), load_state(store.as_ref()));
    let persistence =
        PersistenceHandle::spawn(store.clone(), engine.subscribe(), Duration::from_millis(500));

    engine.add_context_file("notes.md", "text/plain", "keep me")?;
    engine.generate_with_data("Login", DESCRIPTION).await?;
    engine.approve(PhaseId::Requirements)?;
    persistence.shutdown().await?;

    let restored = load_state(store.as_ref());
    assert_eq!(restored, engine.state());

    let resumed = PhaseWorkflowEngine::with_state(backend, settings(), restored);
    assert_eq!(resumed.proceed()?, PhaseId::Design);
    Ok(())
}

#[test]
fn test_malformed_stored_state_falls_back_to_default() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf())
        .map_err(|p| anyhow::anyhow!("non UTF-8 temp dir: {}", p.display()))?;
    let store = FileStore::new(dir);

    store.put(WORKFLOW_STATE_KEY, "{\"phase\":\"design\",\"approvals\":[]}")?;
    assert_eq!(load_state(&store), WorkflowState::default());

    store.put(WORKFLOW_STATE_KEY, "not json at all")?;
    assert_eq!(load_state(&store), WorkflowState::default());
    Ok(())
}
