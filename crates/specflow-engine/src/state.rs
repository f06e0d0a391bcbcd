//! Workflow state: the single mutable resource the engine owns

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use specflow_llm::Usage;
use specflow_packet::ContextFile;
use specflow_utils::types::PhaseId;

/// Review outcome of a phase's content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    #[must_use]
    pub const fn is_approved(self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// Approval status per generative phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approvals {
    pub requirements: ApprovalStatus,
    pub design: ApprovalStatus,
    pub tasks: ApprovalStatus,
}

impl Approvals {
    /// `Pending` for [`PhaseId::Complete`].
    #[must_use]
    pub const fn get(&self, phase: PhaseId) -> ApprovalStatus {
        match phase {
            PhaseId::Requirements => self.requirements,
            PhaseId::Design => self.design,
            PhaseId::Tasks => self.tasks,
            PhaseId::Complete => ApprovalStatus::Pending,
        }
    }

    pub fn set(&mut self, phase: PhaseId, status: ApprovalStatus) {
        match phase {
            PhaseId::Requirements => self.requirements = status,
            PhaseId::Design => self.design = status,
            PhaseId::Tasks => self.tasks = status,
            PhaseId::Complete => {}
        }
    }
}

/// An optional value per generative phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseMap<T> {
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub requirements: Option<T>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub design: Option<T>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub tasks: Option<T>,
}

impl<T> Default for PhaseMap<T> {
    fn default() -> Self {
        Self {
            requirements: None,
            design: None,
            tasks: None,
        }
    }
}

impl<T> PhaseMap<T> {
    #[must_use]
    pub const fn get(&self, phase: PhaseId) -> Option<&T> {
        match phase {
            PhaseId::Requirements => self.requirements.as_ref(),
            PhaseId::Design => self.design.as_ref(),
            PhaseId::Tasks => self.tasks.as_ref(),
            PhaseId::Complete => None,
        }
    }

    pub fn set(&mut self, phase: PhaseId, value: Option<T>) {
        match phase {
            PhaseId::Requirements => self.requirements = value,
            PhaseId::Design => self.design = value,
            PhaseId::Tasks => self.tasks = value,
            PhaseId::Complete => {}
        }
    }
}

/// Wall-clock timing of the latest generation attempt for a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTiming {
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds from start to end; `None` while in flight.
    #[serde(default)]
    pub elapsed_ms: Option<u64>,
}

/// Telemetry of the latest successful generation for a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponseRecord {
    /// Model id reported by the API
    pub model: String,
    #[serde(default)]
    pub usage: Option<Usage>,
    /// USD, when the model's pricing is known
    #[serde(default)]
    pub cost: Option<f64>,
    pub duration_ms: u64,
    /// BLAKE3 of the exact prompt pair sent
    pub prompt_hash: String,
    #[serde(default)]
    pub finish_reason: Option<String>,
    /// Context window the prompt was clamped to
    pub context_limit: usize,
    pub recorded_at: DateTime<Utc>,
}

/// Everything the workflow knows. Persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    /// Active phase: the furthest phase entered
    pub phase: PhaseId,
    /// Phase being looked at; never beyond `phase`
    #[serde(default)]
    pub view_phase: PhaseId,
    pub feature_name: String,
    pub description: String,
    pub requirements: String,
    pub design: String,
    pub tasks: String,
    pub context: Vec<ContextFile>,
    pub approvals: Approvals,
    pub is_generating: bool,
    #[serde(default)]
    pub generating_phase: Option<PhaseId>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub timing: PhaseMap<PhaseTiming>,
    #[serde(default)]
    pub api_responses: PhaseMap<ApiResponseRecord>,
    /// Bumped by every generation start and every reset. A generation may
    /// only commit while this still equals the value it started with.
    #[serde(default)]
    pub generation: u64,
    /// Next context file sequence number
    #[serde(default)]
    pub context_sequence: u64,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            phase: PhaseId::Requirements,
            view_phase: PhaseId::Requirements,
            feature_name: String::new(),
            description: String::new(),
            requirements: String::new(),
            design: String::new(),
            tasks: String::new(),
            context: Vec::new(),
            approvals: Approvals::default(),
            is_generating: false,
            generating_phase: None,
            error: None,
            timing: PhaseMap::default(),
            api_responses: PhaseMap::default(),
            generation: 0,
            context_sequence: 0,
        }
    }
}

impl WorkflowState {
    /// Generated content of `phase`; empty for [`PhaseId::Complete`].
    #[must_use]
    pub fn content(&self, phase: PhaseId) -> &str {
        match phase {
            PhaseId::Requirements => &self.requirements,
            PhaseId::Design => &self.design,
            PhaseId::Tasks => &self.tasks,
            PhaseId::Complete => "",
        }
    }

    pub fn set_content(&mut self, phase: PhaseId, content: String) {
        match phase {
            PhaseId::Requirements => self.requirements = content,
            PhaseId::Design => self.design = content,
            PhaseId::Tasks => self.tasks = content,
            PhaseId::Complete => {}
        }
    }

    #[must_use]
    pub fn has_content(&self, phase: PhaseId) -> bool {
        !self.content(phase).trim().is_empty()
    }

    #[must_use]
    pub fn is_approved(&self, phase: PhaseId) -> bool {
        self.approvals.get(phase).is_approved()
    }

    /// Clear all phase content, approvals and telemetry, and return to
    /// requirements. Seed, context and counters are kept.
    pub fn clear_phases(&mut self) {
        self.phase = PhaseId::Requirements;
        self.view_phase = PhaseId::Requirements;
        for phase in PhaseId::GENERATIVE {
            self.set_content(phase, String::new());
        }
        self.approvals = Approvals::default();
        self.timing = PhaseMap::default();
        self.api_responses = PhaseMap::default();
        self.error = None;
    }

    /// Structural checks applied to state read back from storage.
    ///
    /// # Errors
    ///
    /// Describes the first violated rule.
    pub fn validate_shape(&self) -> Result<(), String> {
        for phase in PhaseId::GENERATIVE {
            if phase < self.phase && !self.is_approved(phase) {
                return Err(format!(
                    "active phase {} but {} is not approved",
                    self.phase, phase
                ));
            }
        }
        if self.view_phase > self.phase {
            return Err(format!(
                "viewed phase {} is beyond active phase {}",
                self.view_phase, self.phase
            ));
        }
        let mut ids = HashSet::new();
        if let Some(dup) = self.context.iter().find(|f| !ids.insert(f.id.as_str())) {
            return Err(format!("duplicate context file id {}", dup.id));
        }
        Ok(())
    }
}
