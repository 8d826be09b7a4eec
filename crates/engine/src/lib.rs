//! # Steward Engine
//!
//! Hook operation engine for the steward unit agent.
//!
//! - **Operations**: the prepare/execute/commit protocol for a single hook,
//!   with run, retry and skip flavours
//! - **State**: the persisted record of hook progress and the queuing rules
//!   that chain lifecycle hooks
//! - **Executor**: persists every phase result and resumes after a crash or
//!   reboot
//! - **Store**: redb-backed unit state, resolution marker, relation
//!   membership and hook history
//! - **Runners**: executing hook scripts under the host-wide execution lock

pub mod error;
pub mod executor;
pub mod lock;
pub mod operation;
pub mod runner;
pub mod script;
pub mod state;
pub mod store;
pub mod unit;

pub use steward_core::{Error, HookInfo, HookKind, Result};

pub use error::{ExecutorError, OperationError};
pub use executor::{Executor, NextStep, next_step};
pub use lock::{FileExecutionLock, Unlocker};
pub use operation::{Callbacks, Factory, HookVariant, Operation, RunHook};
pub use runner::{HookContext, Runner, RunnerError, RunnerFactory};
pub use script::{ScriptRunner, ScriptRunnerFactory};
pub use state::{Kind, State, Step};
pub use store::{
    HookOutcome, HookRecord, MockPersistentState, PersistentState, RedbPersistentState,
    ResolvedMode, StateStore,
};
pub use unit::UnitCallbacks;
