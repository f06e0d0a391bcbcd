//! Wiring between configuration, durable state and the workflow engine.

use std::sync::Arc;

use camino::Utf8PathBuf;
use tracing::debug;

use specflow_config::Config;
use specflow_engine::{
    EngineSettings, FileStore, KeyValueStore, PersistenceHandle, PhaseWorkflowEngine, load_state,
};
use specflow_llm::LlmBackend;
use specflow_utils::error::{ConfigError, SpecflowError};

/// An engine restored from the state directory, with a persistence task
/// writing every change back.
///
/// Must be opened inside a tokio runtime. Call [`Session::close`] before the
/// runtime goes away so the final state reaches disk.
pub struct Session {
    engine: PhaseWorkflowEngine,
    persistence: PersistenceHandle,
}

impl Session {
    /// Restore the engine from `config`'s state directory, driving `backend`.
    ///
    /// # Errors
    ///
    /// Fails when the state directory path is not UTF-8.
    pub fn open(
        config: &Config,
        backend: Arc<dyn LlmBackend>,
    ) -> Result<Self, SpecflowError> {
        let dir = Utf8PathBuf::from_path_buf(config.state_dir()).map_err(|path| {
            ConfigError::InvalidValue {
                key: "storage.state_dir".to_string(),
                value: format!("{} is not valid UTF-8", path.display()),
            }
        })?;
        debug!(state_dir = %dir, "Opening workflow state");

        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(dir));
        let state = load_state(store.as_ref());
        let engine =
            PhaseWorkflowEngine::with_state(backend, EngineSettings::from_config(config), state);
        let persistence = PersistenceHandle::spawn(store, engine.subscribe(), config.debounce());

        Ok(Self {
            engine,
            persistence,
        })
    }

    #[must_use]
    pub fn engine(&self) -> &PhaseWorkflowEngine {
        &self.engine
    }

    /// Stop the persistence task and write the final state.
    ///
    /// # Errors
    ///
    /// Returns the store error if the final write fails.
    pub async fn close(self) -> Result<(), SpecflowError> {
        self.persistence.shutdown().await?;
        Ok(())
    }
}
