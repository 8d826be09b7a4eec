//! Shared runtime state for CLI commands

use anyhow::{Context, Result};
use std::sync::Arc;
use steward_config::Config;
use steward_engine::{
    Callbacks, Executor, Factory, FileExecutionLock, RedbPersistentState, RunnerFactory,
    ScriptRunnerFactory, StateStore, UnitCallbacks,
};

/// Database file inside the state directory
pub const DATABASE_FILE: &str = "steward.db";

/// Store type used by the CLI
pub type UnitStore = StateStore<RedbPersistentState>;

/// Runtime context for CLI commands
///
/// Holds the loaded config and the opened state store, so each command gets
/// a single handle to both.
pub struct RuntimeContext {
    /// Shared configuration
    pub config: Arc<Config>,
    /// Opened unit state store
    pub store: Arc<UnitStore>,
    lock: FileExecutionLock,
}

impl RuntimeContext {
    /// Open the state store described by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be determined or the
    /// database cannot be opened
    pub fn new(config: Config) -> Result<Self> {
        let state_dir = config
            .state_dir()
            .context("Failed to determine state directory")?;
        let lock_file = config
            .lock_file()
            .context("Failed to determine lock file")?;

        let db_path = state_dir.join(DATABASE_FILE);
        let db = RedbPersistentState::new(&db_path)
            .with_context(|| format!("Failed to open state database {}", db_path.display()))?;

        tracing::debug!(state_dir = %state_dir.display(), "Runtime context ready");

        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(StateStore::new(db)),
            lock: FileExecutionLock::new(lock_file),
        })
    }

    /// Host-wide execution lock
    pub fn lock(&self) -> &FileExecutionLock {
        &self.lock
    }

    /// Operation factory wired to script hooks and this unit's store
    ///
    /// # Errors
    ///
    /// Returns an error if the runner cannot be configured
    pub fn factory(&self) -> Result<Factory> {
        let runners = ScriptRunnerFactory::from_config(&self.config)
            .context("Failed to configure hook runner")?;
        let callbacks = UnitCallbacks::new(
            Arc::clone(&self.store),
            self.lock.clone(),
            self.config.relation_names(),
        );

        Ok(Factory::new(
            Arc::new(runners) as Arc<dyn RunnerFactory>,
            Arc::new(callbacks) as Arc<dyn Callbacks>,
        ))
    }

    /// Executor resuming from the persisted state
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted state cannot be read
    pub fn executor(&self) -> Result<Executor<RedbPersistentState>> {
        Executor::new(Arc::clone(&self.store)).context("Failed to load operation state")
    }
}
