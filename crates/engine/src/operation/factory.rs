//! Operation factory

use super::Operation;
use super::callbacks::Callbacks;
use super::runhook::{HookVariant, RunHook};
use crate::error::OperationError;
use crate::runner::RunnerFactory;
use std::sync::Arc;
use steward_core::{Error, HookInfo};

/// Builds hook operations wired to a shared set of collaborators
#[derive(Clone)]
pub struct Factory {
    runner_factory: Arc<dyn RunnerFactory>,
    callbacks: Arc<dyn Callbacks>,
}

impl Factory {
    /// Create a factory
    pub fn new(runner_factory: Arc<dyn RunnerFactory>, callbacks: Arc<dyn Callbacks>) -> Self {
        Self {
            runner_factory,
            callbacks,
        }
    }

    /// Operation that runs `hook`
    pub fn new_run_hook(&self, hook: HookInfo) -> Result<Box<dyn Operation>, OperationError> {
        self.new_hook(hook, HookVariant::Run)
    }

    /// Operation that clears the resolved marker, then runs `hook`
    pub fn new_retry_hook(&self, hook: HookInfo) -> Result<Box<dyn Operation>, OperationError> {
        self.new_hook(hook, HookVariant::Retry)
    }

    /// Operation that clears the resolved marker and commits `hook` without running it
    pub fn new_skip_hook(&self, hook: HookInfo) -> Result<Box<dyn Operation>, OperationError> {
        self.new_hook(hook, HookVariant::Skip)
    }

    fn new_hook(
        &self,
        hook: HookInfo,
        variant: HookVariant,
    ) -> Result<Box<dyn Operation>, OperationError> {
        hook.validate().map_err(|e| OperationError::InvalidHook {
            reason: match e {
                Error::InvalidHook(reason) => reason,
                other => other.to_string(),
            },
        })?;

        Ok(Box::new(RunHook::new(
            hook,
            variant,
            Arc::clone(&self.runner_factory),
            Arc::clone(&self.callbacks),
        )))
    }
}
