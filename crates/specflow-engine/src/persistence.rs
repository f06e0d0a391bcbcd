//! Loading and debounced saving of workflow state

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use specflow_utils::error::StoreError;

use crate::state::WorkflowState;
use crate::store::{KeyValueStore, WORKFLOW_STATE_KEY};

/// Read the persisted state, falling back to the default state when the
/// record is missing, unreadable, or fails the shape check.
///
/// A persisted in-flight generation cannot be resumed, so `is_generating`
/// is always cleared.
#[must_use]
pub fn load_state(store: &dyn KeyValueStore) -> WorkflowState {
    let raw = match store.get(WORKFLOW_STATE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!("No persisted workflow state, starting fresh");
            return WorkflowState::default();
        }
        Err(e) => {
            warn!(error = %e, "Failed to read workflow state, starting fresh");
            return WorkflowState::default();
        }
    };

    let mut state = match serde_json::from_str::<WorkflowState>(&raw) {
        Ok(state) => state,
        Err(e) => {
            warn!(error = %e, "Persisted workflow state is malformed, using default state");
            return WorkflowState::default();
        }
    };
    if let Err(reason) = state.validate_shape() {
        warn!(%reason, "Persisted workflow state is inconsistent, using default state");
        return WorkflowState::default();
    }

    if state.is_generating {
        info!(phase = ?state.generating_phase, "Dropping interrupted generation from persisted state");
        state.is_generating = false;
        state.generating_phase = None;
    }
    state
}

/// Serialize and write `state` under [`WORKFLOW_STATE_KEY`].
///
/// # Errors
///
/// Returns `StoreError` if serialization or the write fails.
pub fn save_state(store: &dyn KeyValueStore, state: &WorkflowState) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(state).map_err(|source| StoreError::Serialize {
        key: WORKFLOW_STATE_KEY.to_string(),
        source,
    })?;
    store.put(WORKFLOW_STATE_KEY, &json)
}

/// Writes state changes to a store, batching bursts of changes.
///
/// After a change notification the writer waits for the debounce interval
/// and then saves the latest state, so a burst of updates costs one write.
/// [`flush`](Self::flush) and [`shutdown`](Self::shutdown) write
/// synchronously.
pub struct PersistenceHandle {
    store: Arc<dyn KeyValueStore>,
    state: watch::Receiver<WorkflowState>,
    task: JoinHandle<()>,
}

impl PersistenceHandle {
    /// Start the background writer. Must be called within a tokio runtime.
    #[must_use]
    pub fn spawn(
        store: Arc<dyn KeyValueStore>,
        state: watch::Receiver<WorkflowState>,
        debounce: Duration,
    ) -> Self {
        let task = tokio::spawn(write_loop(Arc::clone(&store), state.clone(), debounce));
        Self { store, state, task }
    }

    /// Write the current state now.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the write fails.
    pub fn flush(&self) -> Result<(), StoreError> {
        let snapshot = self.state.borrow().clone();
        save_state(self.store.as_ref(), &snapshot)
    }

    /// Stop the background writer and write the final state.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the final write fails.
    pub async fn shutdown(self) -> Result<(), StoreError> {
        self.task.abort();
        // Wait for the abort so no background write can land after the final one.
        let _ = self.task.await;
        let snapshot = self.state.borrow().clone();
        save_state(self.store.as_ref(), &snapshot)
    }
}

async fn write_loop(
    store: Arc<dyn KeyValueStore>,
    mut state: watch::Receiver<WorkflowState>,
    debounce: Duration,
) {
    while state.changed().await.is_ok() {
        if !debounce.is_zero() {
            tokio::time::sleep(debounce).await;
        }
        let snapshot = state.borrow_and_update().clone();
        match save_state(store.as_ref(), &snapshot) {
            Ok(()) => debug!(phase = %snapshot.phase, "Workflow state persisted"),
            Err(e) => warn!(error = %e, "Failed to persist workflow state"),
        }
    }
    debug!("State channel closed, persistence writer exiting");
}
