//! Hook operation
//!
//! `RunHook` implements the three-phase protocol for one hook. The run, retry
//! and skip flavours differ only in how Prepare starts; Execute and Commit are
//! shared.

use super::Operation;
use super::callbacks::Callbacks;
use crate::error::OperationError;
use crate::runner::{Runner, RunnerError, RunnerFactory};
use crate::state::{Kind, State, Step};
use std::fmt;
use std::sync::Arc;
use steward_core::{HookInfo, HookKind};
use tracing::{debug, error, info, warn};

/// How Prepare begins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookVariant {
    /// Run the hook
    Run,
    /// Clear the resolved marker, then run the hook
    Retry,
    /// Clear the resolved marker and commit without running
    Skip,
}

impl HookVariant {
    fn clears_resolved_flag(self) -> bool {
        matches!(self, HookVariant::Retry | HookVariant::Skip)
    }

    fn verb(self) -> &'static str {
        match self {
            HookVariant::Run => "run",
            HookVariant::Retry => "retry",
            HookVariant::Skip => "skip",
        }
    }
}

/// Hook queued by committing a hook of kind `committed`
///
/// | committed | queued |
/// |---|---|
/// | install, upgrade-charm | config-changed |
/// | config-changed before the unit started | start |
/// | anything else | nothing |
pub fn next_hook(committed: HookKind, started: bool) -> Option<HookKind> {
    match committed {
        HookKind::Install | HookKind::UpgradeCharm => Some(HookKind::ConfigChanged),
        HookKind::ConfigChanged if !started => Some(HookKind::Start),
        _ => None,
    }
}

/// Results of Prepare consumed by Execute
struct Prepared {
    name: String,
    runner: Box<dyn Runner>,
}

/// A single hook moving through prepare, execute and commit
pub struct RunHook {
    info: HookInfo,
    variant: HookVariant,
    runner_factory: Arc<dyn RunnerFactory>,
    callbacks: Arc<dyn Callbacks>,
    prepared: Option<Prepared>,
}

impl RunHook {
    /// Create an operation for `info`
    pub fn new(
        info: HookInfo,
        variant: HookVariant,
        runner_factory: Arc<dyn RunnerFactory>,
        callbacks: Arc<dyn Callbacks>,
    ) -> Self {
        Self {
            info,
            variant,
            runner_factory,
            callbacks,
            prepared: None,
        }
    }

    /// Hook this operation processes
    pub fn hook(&self) -> &HookInfo {
        &self.info
    }

    /// Prepare flavour
    pub fn variant(&self) -> HookVariant {
        self.variant
    }

    fn change(&self, state: &State, step: Step) -> State {
        state.with_change(Kind::RunHook, step, self.info.clone())
    }
}

impl Operation for RunHook {
    #[tracing::instrument(skip(self, state), fields(hook = %self.info, variant = self.variant.verb()))]
    fn prepare(&mut self, state: &State) -> Result<State, OperationError> {
        if self.variant.clears_resolved_flag() {
            self.callbacks.clear_resolved_flag()?;
        }

        if self.variant == HookVariant::Skip {
            info!("Skipping hook execution");
            return Err(OperationError::SkipExecute);
        }

        let name = self.callbacks.prepare_hook(&self.info)?;
        let runner = self.runner_factory.new_hook_runner(&self.info)?;
        debug!(hook_name = %name, context = %runner.context(), "Hook prepared");

        self.prepared = Some(Prepared { name, runner });
        Ok(self.change(state, Step::Pending))
    }

    #[tracing::instrument(skip(self, state), fields(hook = %self.info, variant = self.variant.verb()))]
    fn execute(&mut self, state: &State) -> Result<State, OperationError> {
        let Some(prepared) = self.prepared.as_mut() else {
            return Err(OperationError::NotPrepared {
                hook: self.info.clone(),
            });
        };

        let message = format!("running hook {}", prepared.name);
        let unlocker = self.callbacks.acquire_execution_lock(&message)?;

        let start = std::time::Instant::now();
        let result = prepared.runner.run_hook(&prepared.name);
        unlocker.release();
        let elapsed_ms = start.elapsed().as_millis();

        let name = &prepared.name;
        let context = prepared.runner.context();
        let step = match result {
            Ok(()) => {
                info!(hook_name = %name, elapsed_ms, "Hook completed successfully");
                self.callbacks.notify_hook_completed(name, context);
                Step::Done
            }
            Err(RunnerError::Missing { .. }) => {
                info!(hook_name = %name, "Hook not implemented, treating as done");
                Step::Done
            }
            Err(RunnerError::RequeueAndReboot) => {
                warn!(hook_name = %name, "Hook requested reboot, requeueing");
                self.callbacks.notify_hook_completed(name, context);
                return Err(OperationError::NeedsReboot {
                    hook: name.clone(),
                    state: Box::new(self.change(state, Step::Queued)),
                });
            }
            Err(RunnerError::Reboot) => {
                warn!(hook_name = %name, "Hook requested reboot after completion");
                self.callbacks.notify_hook_completed(name, context);
                return Err(OperationError::NeedsReboot {
                    hook: name.clone(),
                    state: Box::new(self.change(state, Step::Done)),
                });
            }
            Err(RunnerError::Failed(source)) => {
                error!(hook_name = %name, elapsed_ms, error = %source, "Hook failed");
                self.callbacks.notify_hook_failed(name, context);
                return Err(OperationError::HookFailed {
                    hook: name.clone(),
                    source,
                });
            }
        };

        Ok(self.change(state, step))
    }

    #[tracing::instrument(skip(self, state), fields(hook = %self.info, variant = self.variant.verb()))]
    fn commit(&mut self, state: &State) -> Result<State, OperationError> {
        self.callbacks.commit_hook(&self.info)?;

        let mut next = match next_hook(self.info.kind, state.started) {
            Some(kind) => {
                debug!(queued = %kind, "Queueing follow-up hook");
                state.with_change(Kind::RunHook, Step::Queued, HookInfo::new(kind))
            }
            None => state.with_change(Kind::Continue, Step::Pending, self.info.clone()),
        };

        match self.info.kind {
            HookKind::Start => next.started = true,
            HookKind::CollectMetrics => next.collect_metrics_time = chrono::Utc::now().timestamp(),
            _ => {}
        }

        Ok(next)
    }
}

impl fmt::Display for RunHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} hook", self.variant.verb(), self.info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_hook_table() {
        for started in [false, true] {
            assert_eq!(
                next_hook(HookKind::Install, started),
                Some(HookKind::ConfigChanged)
            );
            assert_eq!(
                next_hook(HookKind::UpgradeCharm, started),
                Some(HookKind::ConfigChanged)
            );
            assert_eq!(next_hook(HookKind::Start, started), None);
            assert_eq!(next_hook(HookKind::Stop, started), None);
            assert_eq!(next_hook(HookKind::CollectMetrics, started), None);
            assert_eq!(next_hook(HookKind::UpdateStatus, started), None);
            assert_eq!(next_hook(HookKind::RelationJoined, started), None);
            assert_eq!(next_hook(HookKind::RelationBroken, started), None);
        }
        assert_eq!(
            next_hook(HookKind::ConfigChanged, false),
            Some(HookKind::Start)
        );
        assert_eq!(next_hook(HookKind::ConfigChanged, true), None);
    }

    #[test]
    fn test_variant_flags() {
        assert!(!HookVariant::Run.clears_resolved_flag());
        assert!(HookVariant::Retry.clears_resolved_flag());
        assert!(HookVariant::Skip.clears_resolved_flag());
    }
}
