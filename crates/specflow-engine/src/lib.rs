//! Phase workflow engine for specflow
//!
//! [`PhaseWorkflowEngine`] owns the [`WorkflowState`] and drives the linear
//! requirements → design → tasks → complete sequence. Forward movement is
//! gated on approval of the active phase. Generation calls go through an
//! [`specflow_llm::LlmBackend`], are bounded by a timeout, and only commit
//! their result if no reset or newer generation happened in the meantime.
//!
//! State is persisted through a [`KeyValueStore`] by a debounced
//! [`PersistenceHandle`].

mod drift;
mod engine;
mod persistence;
mod state;
mod store;

pub use drift::{DRIFT_THRESHOLD, DriftAssessment, assess_drift, keywords};
pub use engine::{EngineSettings, GenerationTask, PhaseWorkflowEngine, Transition};
pub use persistence::{PersistenceHandle, load_state, save_state};
pub use state::{
    ApiResponseRecord, ApprovalStatus, Approvals, PhaseMap, PhaseTiming, WorkflowState,
};
pub use store::{FileStore, KeyValueStore, MemoryStore, WORKFLOW_STATE_KEY};
