//! The phase workflow engine
//!
//! All mutations are whole-state transformations applied under the watch
//! channel's write lock: clone the current state, compute the next one, and
//! publish it only if the transformation succeeded. Network calls happen
//! outside the lock, between a `begin` transformation that marks the phase
//! as generating and a `commit` transformation that writes the result back.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, warn};

use specflow_config::Config;
use specflow_llm::{
    Completion, CompletionOptions, LlmBackend, LlmInvocation, Model, budget_policy,
    context_limits,
};
use specflow_packet::{BudgetPolicy, ContextFile, SplitRatios, TokenBudgetEnforcer};
use specflow_phases::{PhaseInput, PhasePrompt, PromptSettings, phase_for};
use specflow_utils::error::{LlmError, PhaseError, UserFriendlyError};
use specflow_utils::logging::{log_phase_complete, log_phase_error, log_phase_start, phase_span};
use specflow_utils::types::PhaseId;

use crate::drift::assess_drift;
use crate::state::{ApiResponseRecord, ApprovalStatus, PhaseTiming, WorkflowState};

/// Generation parameters used by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Model id. Empty means unset; the backend reports `MISSING_MODEL`.
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// Bound on one generation, catalogue lookup and retries included
    pub generation_timeout: Duration,
    /// Start generating the next phase after approve-and-proceed
    pub auto_generate: bool,
    pub prompt: PromptSettings,
    pub budget: BudgetPolicy,
    /// Context window used when the model's own limit is unknown
    pub context_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_output_tokens: 4096,
            temperature: 0.7,
            generation_timeout: Duration::from_secs(180),
            auto_generate: true,
            prompt: PromptSettings::default(),
            budget: BudgetPolicy::default(),
            context_limit: 128_000,
        }
    }
}

impl EngineSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.defaults.model.clone().unwrap_or_default(),
            max_output_tokens: config.defaults.max_output_tokens,
            temperature: config.defaults.temperature,
            generation_timeout: config.generation_timeout(),
            auto_generate: config.defaults.auto_generate,
            prompt: PromptSettings {
                description_max_chars: config.defaults.description_max_chars,
                split: SplitRatios {
                    head: config.budget.head_ratio,
                    tail: config.budget.tail_ratio,
                },
                context_limits: context_limits(&config.context),
            },
            budget: budget_policy(&config.budget),
            context_limit: config.budget.context_limit as usize,
        }
    }
}

/// Outcome of [`PhaseWorkflowEngine::approve_and_proceed`]: the committed
/// transition and, when auto-generation is on, the follow-up generation.
#[derive(Debug)]
pub struct Transition {
    pub from: PhaseId,
    pub to: PhaseId,
    pub generation: Option<GenerationTask>,
}

/// A generation running in the background. The engine already shows the
/// phase as generating; awaiting the task is optional.
#[derive(Debug)]
pub struct GenerationTask {
    phase: PhaseId,
    handle: JoinHandle<Result<String, PhaseError>>,
}

impl GenerationTask {
    #[must_use]
    pub const fn phase(&self) -> PhaseId {
        self.phase
    }

    /// Wait for the generation to finish.
    ///
    /// # Errors
    ///
    /// Returns the generation's error, or `PhaseError::Superseded` if the
    /// task was cancelled.
    pub async fn wait(self) -> Result<String, PhaseError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(PhaseError::Superseded { phase: self.phase }),
        }
    }
}

/// Releases the generating flag if a run is torn down (a panicking backend,
/// an aborted task) before it reaches `commit`.
struct InFlight<'a> {
    engine: &'a PhaseWorkflowEngine,
    phase: PhaseId,
    generation: u64,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let generation = self.generation;
        let released = self.engine.inner.state.send_if_modified(|s| {
            if s.generation != generation || !s.is_generating {
                return false;
            }
            s.is_generating = false;
            s.generating_phase = None;
            s.error = Some(INTERRUPTED.to_string());
            true
        });
        if released {
            warn!(
                phase = %self.phase,
                generation,
                "Generation ended before its result was committed"
            );
        }
    }
}

const INTERRUPTED: &str = "Generation was interrupted before it finished. Try again.";

/// A generation that has been admitted but not yet sent.
struct Ticket {
    phase: PhaseId,
    generation: u64,
    prompt: PhasePrompt,
    feature: String,
    started_at: DateTime<Utc>,
}

/// What a finished call produced, kept for the commit step.
struct Delivery {
    completion: Completion,
    model: Option<Model>,
    context_limit: usize,
    prompt_hash: String,
}

struct Inner {
    backend: Arc<dyn LlmBackend>,
    settings: EngineSettings,
    enforcer: TokenBudgetEnforcer,
    state: watch::Sender<WorkflowState>,
}

/// Drives requirements → design → tasks → complete with approval gates.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct PhaseWorkflowEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PhaseWorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseWorkflowEngine")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl PhaseWorkflowEngine {
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>, settings: EngineSettings) -> Self {
        Self::with_state(backend, settings, WorkflowState::default())
    }

    /// Engine resuming from a previously persisted state.
    #[must_use]
    pub fn with_state(
        backend: Arc<dyn LlmBackend>,
        settings: EngineSettings,
        state: WorkflowState,
    ) -> Self {
        let enforcer = TokenBudgetEnforcer::new(settings.budget);
        Self {
            inner: Arc::new(Inner {
                backend,
                settings,
                enforcer,
                state: watch::Sender::new(state),
            }),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    /// Snapshot of the current state
    #[must_use]
    pub fn state(&self) -> WorkflowState {
        self.inner.state.borrow().clone()
    }

    /// Change notifications; used by persistence.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.inner.state.subscribe()
    }

    /// Set the feature name and description.
    ///
    /// If requirements were already generated and the new seed differs
    /// substantively from the previous one, every phase is cleared first and
    /// the workflow returns to requirements. Returns whether that happened.
    ///
    /// # Errors
    ///
    /// - `GenerationInProgress` while a generation runs
    /// - `NotActive` when the workflow is past requirements and the seed did
    ///   not drift; later phases would otherwise rest on a changed seed
    pub fn seed(
        &self,
        feature_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<bool, PhaseError> {
        let feature_name = feature_name.into();
        let description = description.into();

        self.update(|s| {
            ensure_idle(s)?;
            let mut reset = false;
            if s.has_content(PhaseId::Requirements) {
                let verdict =
                    assess_drift(&s.feature_name, &s.description, &feature_name, &description);
                debug!(
                    overlap = verdict.overlap,
                    name_changed = verdict.name_changed,
                    "Compared new seed with previous seed"
                );
                if verdict.drifted {
                    info!(
                        overlap = verdict.overlap,
                        name_changed = verdict.name_changed,
                        "Seed changed substantively, clearing all phases"
                    );
                    s.clear_phases();
                    reset = true;
                }
            }
            if s.phase != PhaseId::Requirements {
                return Err(PhaseError::NotActive {
                    phase: PhaseId::Requirements,
                    active: s.phase,
                });
            }
            s.feature_name = feature_name;
            s.description = description;
            Ok(reset)
        })
    }

    /// Attach a context file. Ids are unique for the life of the workflow.
    ///
    /// # Errors
    ///
    /// Returns `GenerationInProgress` while a generation runs.
    pub fn add_context_file(
        &self,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<ContextFile, PhaseError> {
        let (name, mime_type, content) = (name.into(), mime_type.into(), content.into());
        self.update(|s| {
            ensure_idle(s)?;
            let file = ContextFile::new(name, mime_type, content, s.context_sequence);
            s.context_sequence += 1;
            s.context.push(file.clone());
            Ok(file)
        })
    }

    /// # Errors
    ///
    /// Returns `UnknownContextFile` if no file has this id, or
    /// `GenerationInProgress` while a generation runs.
    pub fn remove_context_file(&self, id: &str) -> Result<ContextFile, PhaseError> {
        self.update(|s| {
            ensure_idle(s)?;
            let index = s
                .context
                .iter()
                .position(|f| f.id == id)
                .ok_or_else(|| PhaseError::UnknownContextFile { id: id.to_string() })?;
            Ok(s.context.remove(index))
        })
    }

    /// Generate content for the active phase and wait for it.
    ///
    /// # Errors
    ///
    /// - `Precondition` when the phase's inputs are empty or the workflow is
    ///   complete
    /// - `DependencyNotSatisfied` when a prior phase is not approved
    /// - `GenerationInProgress` when another generation is running
    /// - `Generation` when the backend failed or timed out; the state then
    ///   carries the error and the phase has no content
    /// - `Superseded` when a reset or newer generation overtook this one;
    ///   the result was discarded
    ///
    /// The call runs on its own task: dropping this future stops the wait,
    /// not the generation, which still commits when it finishes.
    pub async fn generate(&self) -> Result<String, PhaseError> {
        let ticket = self.begin()?;
        let phase = ticket.phase;
        let engine = self.clone();
        let handle = tokio::spawn(async move { engine.run(ticket).await });
        GenerationTask { phase, handle }.wait().await
    }

    /// Seed the requirements phase and generate it.
    ///
    /// # Errors
    ///
    /// See [`Self::seed`] and [`Self::generate`].
    pub async fn generate_with_data(
        &self,
        feature_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<String, PhaseError> {
        self.seed(feature_name, description)?;
        self.generate().await
    }

    /// Mark the active phase's content as approved.
    ///
    /// # Errors
    ///
    /// `NotActive`, `GenerationInProgress`, or `NoContent` when there is
    /// nothing to approve.
    pub fn approve(&self, phase: PhaseId) -> Result<(), PhaseError> {
        self.update(|s| {
            ensure_active(s, phase)?;
            ensure_idle(s)?;
            if !s.has_content(phase) {
                return Err(PhaseError::NoContent { phase });
            }
            s.approvals.set(phase, ApprovalStatus::Approved);
            Ok(())
        })?;
        info!(phase = %phase, "Phase approved");
        Ok(())
    }

    /// Mark the active phase as rejected and discard its content.
    ///
    /// # Errors
    ///
    /// `NotActive` or `GenerationInProgress`.
    pub fn reject(&self, phase: PhaseId) -> Result<(), PhaseError> {
        self.update(|s| {
            ensure_active(s, phase)?;
            ensure_idle(s)?;
            s.approvals.set(phase, ApprovalStatus::Rejected);
            s.set_content(phase, String::new());
            Ok(())
        })?;
        info!(phase = %phase, "Phase rejected");
        Ok(())
    }

    /// Move to the next phase. Does not generate.
    ///
    /// # Errors
    ///
    /// `ApprovalRequired` when the active phase is not approved,
    /// `InvalidTransition` from `complete`, `GenerationInProgress`.
    pub fn proceed(&self) -> Result<PhaseId, PhaseError> {
        let (from, to) = self.update(|s| {
            ensure_idle(s)?;
            let from = s.phase;
            let to = from
                .next()
                .ok_or(PhaseError::InvalidTransition { from, to: from })?;
            if !s.is_approved(from) {
                return Err(PhaseError::ApprovalRequired { phase: from });
            }
            s.phase = to;
            s.view_phase = to;
            Ok((from, to))
        })?;
        info!(from = %from, to = %to, "Advanced to next phase");
        Ok(to)
    }

    /// Approve the active phase, advance, and start generating the new
    /// phase when auto-generation is on.
    ///
    /// The approval and the transition are one atomic update. The follow-up
    /// generation is admitted before this returns, so the state already
    /// shows it as generating; await [`Transition::generation`] to observe
    /// its result. Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// `NoContent`, `InvalidTransition` or `GenerationInProgress` leave the
    /// state untouched. If the follow-up generation cannot be admitted the
    /// transition stays committed and its error is returned.
    pub fn approve_and_proceed(&self) -> Result<Transition, PhaseError> {
        let (from, to) = self.update(|s| {
            ensure_idle(s)?;
            let from = s.phase;
            let to = from
                .next()
                .ok_or(PhaseError::InvalidTransition { from, to: from })?;
            if !s.has_content(from) {
                return Err(PhaseError::NoContent { phase: from });
            }
            s.approvals.set(from, ApprovalStatus::Approved);
            s.phase = to;
            s.view_phase = to;
            Ok((from, to))
        })?;
        info!(from = %from, to = %to, "Approved and advanced");

        let generation = if self.inner.settings.auto_generate && to.is_generative() {
            let ticket = self.begin()?;
            let engine = self.clone();
            let handle = tokio::spawn(async move { engine.run(ticket).await });
            Some(GenerationTask { phase: to, handle })
        } else {
            None
        };

        Ok(Transition {
            from,
            to,
            generation,
        })
    }

    /// Look at an earlier phase. Approvals and the active phase are unchanged.
    ///
    /// # Errors
    ///
    /// Returns `ViewBeyondActive` for a phase not yet entered.
    pub fn view(&self, phase: PhaseId) -> Result<(), PhaseError> {
        self.update(|s| {
            if phase > s.phase {
                return Err(PhaseError::ViewBeyondActive {
                    requested: phase,
                    active: s.phase,
                });
            }
            s.view_phase = phase;
            Ok(())
        })
    }

    /// Return to a fresh workflow. Seed, context, content, approvals and
    /// telemetry are cleared; any in-flight generation will be discarded
    /// when it returns.
    pub fn reset(&self) {
        self.inner.state.send_modify(|s| {
            *s = WorkflowState {
                generation: s.generation + 1,
                context_sequence: s.context_sequence,
                ..WorkflowState::default()
            };
        });
        info!("Workflow reset");
    }

    pub fn clear_error(&self) {
        self.inner.state.send_if_modified(|s| s.error.take().is_some());
    }

    /// Admit a generation for the active phase: check the gates, build the
    /// prompt, and mark the phase as generating.
    fn begin(&self) -> Result<Ticket, PhaseError> {
        let settings = &self.inner.settings;
        self.update(|s| {
            let phase = s.phase;
            let builder = phase_for(phase).ok_or_else(|| PhaseError::Precondition {
                phase,
                reason: "the workflow is complete".to_string(),
            })?;
            ensure_idle(s)?;
            for dependency in builder.deps() {
                if !s.is_approved(*dependency) {
                    return Err(PhaseError::DependencyNotSatisfied {
                        phase,
                        dependency: *dependency,
                    });
                }
            }

            let input = PhaseInput {
                feature_name: &s.feature_name,
                description: &s.description,
                context_files: &s.context,
                requirements: &s.requirements,
                design: &s.design,
            };
            let prompt = builder.build_prompt(&input, &settings.prompt)?;

            let started_at = Utc::now();
            s.generation += 1;
            s.is_generating = true;
            s.generating_phase = Some(phase);
            s.error = None;
            s.approvals.set(phase, ApprovalStatus::Pending);
            s.timing.set(
                phase,
                Some(PhaseTiming {
                    start_time: started_at,
                    end_time: None,
                    elapsed_ms: None,
                }),
            );

            Ok(Ticket {
                phase,
                generation: s.generation,
                prompt,
                feature: s.feature_name.clone(),
                started_at,
            })
        })
    }

    /// Perform the admitted generation and commit its outcome.
    async fn run(&self, ticket: Ticket) -> Result<String, PhaseError> {
        let settings = &self.inner.settings;
        let span = phase_span(&ticket.feature, ticket.phase.as_str(), &settings.model);
        let phase = ticket.phase;

        async move {
            let mut in_flight = InFlight {
                engine: self,
                phase,
                generation: ticket.generation,
                settled: false,
            };
            let started = Instant::now();
            let outcome = match tokio::time::timeout(
                settings.generation_timeout,
                self.call_backend(&ticket.prompt),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(LlmError::Timeout {
                    duration: settings.generation_timeout,
                }),
            };
            let elapsed = started.elapsed();

            let committed = self.commit(&ticket, &outcome, elapsed);
            in_flight.settled = true;
            committed.inspect_err(|e| {
                if matches!(e, PhaseError::Superseded { .. }) {
                    warn!(
                        phase = %phase,
                        generation = ticket.generation,
                        "Discarding result of superseded generation"
                    );
                }
            })?;

            match outcome {
                Ok(delivery) => {
                    log_phase_complete(
                        phase.as_str(),
                        elapsed.as_millis(),
                        delivery.completion.usage.map(|u| u.total_tokens),
                    );
                    Ok(delivery.completion.content)
                }
                Err(source) => {
                    log_phase_error(phase.as_str(), &source.to_string(), elapsed.as_millis());
                    Err(PhaseError::Generation { phase, source })
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Clamp the prompt to the model's window and invoke the backend.
    async fn call_backend(&self, prompt: &PhasePrompt) -> Result<Delivery, LlmError> {
        let inner = &self.inner;
        let settings = &inner.settings;

        let model = inner.backend.describe_model(&settings.model).await;
        let context_limit = model
            .as_ref()
            .and_then(|m| m.context_length)
            .and_then(|limit| usize::try_from(limit).ok())
            .filter(|limit| *limit > 0)
            .unwrap_or(settings.context_limit);

        let clamped = inner.enforcer.clamp(
            &prompt.system,
            &prompt.user,
            context_limit,
            settings.max_output_tokens as usize,
        );
        let sent = PhasePrompt {
            system: clamped.system,
            user: clamped.user,
            ..prompt.clone()
        };
        log_phase_start(
            sent.phase.as_str(),
            &settings.model,
            inner.enforcer.estimate_tokens(&sent.system) + inner.enforcer.estimate_tokens(&sent.user),
        );

        let prompt_hash = sent.hash();
        let invocation = LlmInvocation::new(
            settings.model.clone(),
            sent.system,
            sent.user,
            CompletionOptions {
                max_tokens: settings.max_output_tokens,
                temperature: settings.temperature,
                top_p: None,
                context_limit: Some(context_limit),
            },
        );
        let completion = inner.backend.invoke(invocation).await?;

        Ok(Delivery {
            completion,
            model,
            context_limit,
            prompt_hash,
        })
    }

    /// Write a finished generation back, unless it was superseded.
    fn commit(
        &self,
        ticket: &Ticket,
        outcome: &Result<Delivery, LlmError>,
        elapsed: Duration,
    ) -> Result<(), PhaseError> {
        let phase = ticket.phase;
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        self.update(|s| {
            if s.generation != ticket.generation {
                return Err(PhaseError::Superseded { phase });
            }

            let finished_at = Utc::now();
            s.is_generating = false;
            s.generating_phase = None;
            s.timing.set(
                phase,
                Some(PhaseTiming {
                    start_time: ticket.started_at,
                    end_time: Some(finished_at),
                    elapsed_ms: Some(elapsed_ms),
                }),
            );

            match outcome {
                Ok(delivery) => {
                    let completion = &delivery.completion;
                    let cost = delivery
                        .model
                        .as_ref()
                        .and_then(|m| m.pricing)
                        .zip(completion.usage)
                        .map(|(pricing, usage)| pricing.cost(&usage));
                    s.set_content(phase, completion.content.clone());
                    s.error = None;
                    s.api_responses.set(
                        phase,
                        Some(ApiResponseRecord {
                            model: completion.model.clone(),
                            usage: completion.usage,
                            cost,
                            duration_ms: elapsed_ms,
                            prompt_hash: delivery.prompt_hash.clone(),
                            finish_reason: completion.finish_reason.clone(),
                            context_limit: delivery.context_limit,
                            recorded_at: finished_at,
                        }),
                    );
                }
                Err(error) => {
                    s.set_content(phase, String::new());
                    s.api_responses.set(phase, None);
                    s.error = Some(error.user_message());
                }
            }
            Ok(())
        })
    }

    /// Apply `f` to a copy of the state and publish the copy only on success.
    fn update<R>(
        &self,
        f: impl FnOnce(&mut WorkflowState) -> Result<R, PhaseError>,
    ) -> Result<R, PhaseError> {
        let mut outcome = None;
        self.inner.state.send_if_modified(|current| {
            let mut next = current.clone();
            match f(&mut next) {
                Ok(value) => {
                    let changed = next != *current;
                    *current = next;
                    outcome = Some(Ok(value));
                    changed
                }
                Err(e) => {
                    outcome = Some(Err(e));
                    false
                }
            }
        });
        match outcome {
            Some(result) => result,
            None => unreachable!("send_if_modified always runs its closure"),
        }
    }
}

fn ensure_idle(state: &WorkflowState) -> Result<(), PhaseError> {
    if state.is_generating {
        return Err(PhaseError::GenerationInProgress {
            phase: state.generating_phase.unwrap_or(state.phase),
        });
    }
    Ok(())
}

fn ensure_active(state: &WorkflowState, phase: PhaseId) -> Result<(), PhaseError> {
    if phase != state.phase {
        return Err(PhaseError::NotActive {
            phase,
            active: state.phase,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl LlmBackend for Echo {
        async fn invoke(&self, invocation: LlmInvocation) -> Result<Completion, LlmError> {
            Ok(Completion {
                content: format!("generated from {} chars", invocation.user_prompt.len()),
                model: invocation.model,
                usage: None,
                finish_reason: Some("stop".into()),
            })
        }
    }

    fn engine() -> PhaseWorkflowEngine {
        let settings = EngineSettings {
            model: "test/model".into(),
            auto_generate: false,
            ..EngineSettings::default()
        };
        PhaseWorkflowEngine::new(Arc::new(Echo), settings)
    }

    #[test]
    fn test_failed_update_publishes_nothing() {
        let engine = engine();
        let rx = engine.subscribe();

        let err = engine.approve(PhaseId::Requirements).unwrap_err();
        assert!(matches!(err, PhaseError::NoContent { .. }));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config::minimal_for_testing();
        let settings = EngineSettings::from_config(&config);
        assert_eq!(settings.model, "test/model");
        assert_eq!(settings.generation_timeout, Duration::from_secs(180));
        assert_eq!(settings.prompt.description_max_chars, 5000);
        assert_eq!(settings.context_limit, 128_000);
    }

    #[tokio::test]
    async fn test_proceed_requires_approval() {
        let engine = engine();
        engine.generate_with_data("Login", "Email login").await.unwrap();

        assert!(matches!(
            engine.proceed(),
            Err(PhaseError::ApprovalRequired {
                phase: PhaseId::Requirements
            })
        ));
        engine.approve(PhaseId::Requirements).unwrap();
        assert_eq!(engine.proceed().unwrap(), PhaseId::Design);
        assert_eq!(engine.state().view_phase, PhaseId::Design);
    }

    #[tokio::test]
    async fn test_reject_clears_content() {
        let engine = engine();
        engine.generate_with_data("Login", "Email login").await.unwrap();
        engine.reject(PhaseId::Requirements).unwrap();

        let state = engine.state();
        assert_eq!(state.requirements, "");
        assert_eq!(state.approvals.requirements, ApprovalStatus::Rejected);
        assert!(engine.approve(PhaseId::Requirements).is_err());
    }

    #[tokio::test]
    async fn test_view_cannot_pass_active_phase() {
        let engine = engine();
        assert!(matches!(
            engine.view(PhaseId::Design),
            Err(PhaseError::ViewBeyondActive { .. })
        ));
        engine.generate_with_data("Login", "Email login").await.unwrap();
        engine.approve(PhaseId::Requirements).unwrap();
        engine.proceed().unwrap();

        engine.view(PhaseId::Requirements).unwrap();
        let state = engine.state();
        assert_eq!(state.view_phase, PhaseId::Requirements);
        assert_eq!(state.phase, PhaseId::Design);
        assert!(state.is_approved(PhaseId::Requirements));
    }

    #[test]
    fn test_context_files_get_distinct_ids() {
        let engine = engine();
        let a = engine.add_context_file("a.md", "text/plain", "same").unwrap();
        let b = engine.add_context_file("a.md", "text/plain", "same").unwrap();
        assert_ne!(a.id, b.id);

        engine.remove_context_file(&a.id).unwrap();
        assert!(matches!(
            engine.remove_context_file(&a.id),
            Err(PhaseError::UnknownContextFile { .. })
        ));
        assert_eq!(engine.state().context, vec![b]);
    }

    #[test]
    fn test_clear_error() {
        let engine = engine();
        engine.inner.state.send_modify(|s| s.error = Some("boom".into()));
        engine.clear_error();
        assert!(engine.state().error.is_none());
    }
}
