//! Operation executor
//!
//! The executor is the only writer of the operation state. It feeds each
//! phase the last persisted [`State`] and persists whatever the phase returns
//! before moving on, so a crash at any point resumes from a consistent state.

use crate::error::{ExecutorError, OperationError};
use crate::operation::{Factory, Operation};
use crate::state::{Kind, State, Step};
use crate::store::{PersistentState, ResolvedMode, StateStore};
use std::fmt;
use std::sync::Arc;
use steward_core::HookInfo;
use tracing::{debug, error, info};

/// What to do next given the persisted state
pub enum NextStep {
    /// Nothing pending
    Idle,
    /// Run an operation through all phases
    Run(Box<dyn Operation>),
    /// The hook already ran; only commit remains
    Commit(Box<dyn Operation>),
    /// A hook failed and the operator has not resolved it
    AwaitingResolution(HookInfo),
}

impl fmt::Debug for NextStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextStep::Idle => f.write_str("Idle"),
            NextStep::Run(op) => write!(f, "Run({op})"),
            NextStep::Commit(op) => write!(f, "Commit({op})"),
            NextStep::AwaitingResolution(hook) => write!(f, "AwaitingResolution({hook})"),
        }
    }
}

/// Decide how to resume from `state`
///
/// | state | next |
/// |---|---|
/// | `continue/*` | idle |
/// | `run-hook/queued` | run the hook |
/// | `run-hook/done` | commit the hook |
/// | `run-hook/pending` | retry or skip per `resolved`, otherwise wait |
pub fn next_step(
    state: &State,
    factory: &Factory,
    resolved: ResolvedMode,
) -> Result<NextStep, OperationError> {
    if state.kind == Kind::Continue {
        return Ok(NextStep::Idle);
    }

    let Some(hook) = state.hook.clone() else {
        return Err(OperationError::InvalidState {
            reason: format!("{state} has no hook"),
        });
    };

    Ok(match (state.step, resolved) {
        (Step::Queued, _) => NextStep::Run(factory.new_run_hook(hook)?),
        (Step::Done, _) => NextStep::Commit(factory.new_run_hook(hook)?),
        (Step::Pending, ResolvedMode::RetryHooks) => NextStep::Run(factory.new_retry_hook(hook)?),
        (Step::Pending, ResolvedMode::NoHooks) => NextStep::Run(factory.new_skip_hook(hook)?),
        (Step::Pending, ResolvedMode::None) => NextStep::AwaitingResolution(hook),
    })
}

/// Drives operations and persists their state
pub struct Executor<P: PersistentState> {
    store: Arc<StateStore<P>>,
    state: State,
}

impl<P: PersistentState> Executor<P> {
    /// Executor resuming from the state persisted in `store`
    pub fn new(store: Arc<StateStore<P>>) -> Result<Self, ExecutorError> {
        let state = store.load_state().map_err(ExecutorError::Load)?;
        debug!(%state, "Loaded operation state");
        Ok(Self { store, state })
    }

    /// Last persisted state
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Store the executor writes to
    pub fn store(&self) -> &Arc<StateStore<P>> {
        &self.store
    }

    /// Run `op` through prepare, execute and commit
    ///
    /// A skip operation goes straight from prepare to commit. The first
    /// failing phase stops the run.
    #[tracing::instrument(skip_all, fields(operation = %op))]
    pub fn run(&mut self, op: &mut dyn Operation) -> Result<(), ExecutorError> {
        info!("Running operation");
        match op.prepare(&self.state) {
            Ok(prepared) => {
                self.persist(prepared)?;
                let executed = op.execute(&self.state);
                self.apply(executed)?;
            }
            Err(OperationError::SkipExecute) => debug!("Execution skipped"),
            Err(e) => return Err(e.into()),
        }

        let committed = op.commit(&self.state);
        self.apply(committed)
    }

    /// Commit `op` without running it
    #[tracing::instrument(skip_all, fields(operation = %op))]
    pub fn commit(&mut self, op: &mut dyn Operation) -> Result<(), ExecutorError> {
        info!("Committing operation");
        let committed = op.commit(&self.state);
        self.apply(committed)
    }

    /// Resume pending work until the unit is idle
    ///
    /// Returns the number of operations processed.
    pub fn drain(&mut self, factory: &Factory) -> Result<usize, ExecutorError> {
        let mut processed = 0;
        loop {
            let resolved = self.store.resolved_mode().map_err(ExecutorError::Load)?;
            match next_step(&self.state, factory, resolved)? {
                NextStep::Idle => return Ok(processed),
                NextStep::Run(mut op) => self.run(op.as_mut())?,
                NextStep::Commit(mut op) => self.commit(op.as_mut())?,
                NextStep::AwaitingResolution(hook) => {
                    return Err(ExecutorError::AwaitingResolution { hook });
                }
            }
            processed += 1;
        }
    }

    fn apply(&mut self, result: Result<State, OperationError>) -> Result<(), ExecutorError> {
        match result {
            Ok(next) => self.persist(next),
            Err(err) => {
                if let Some(state) = err.pending_state() {
                    if let Err(persist) = self.persist(state.clone()) {
                        error!(error = %persist, "Failed to persist state before reboot");
                    }
                }
                Err(err.into())
            }
        }
    }

    fn persist(&mut self, state: State) -> Result<(), ExecutorError> {
        self.store
            .save_state(&state)
            .map_err(ExecutorError::Persist)?;
        self.state = state;
        Ok(())
    }
}
