//! Callbacks for a single unit
//!
//! `UnitCallbacks` wires the operation engine to the unit's persistent store
//! and the host execution lock.

use crate::lock::{FileExecutionLock, Unlocker};
use crate::operation::{CommitCallbacks, ExecuteCallbacks, PrepareCallbacks};
use crate::runner::HookContext;
use crate::store::{HookOutcome, HookRecord, PersistentState, ResolvedMode, StateStore};
use indexmap::IndexMap;
use std::sync::Arc;
use steward_core::{Error, HookInfo, HookKind, Result};
use tracing::{debug, info, warn};

/// Store- and lock-backed callbacks
pub struct UnitCallbacks<P: PersistentState> {
    store: Arc<StateStore<P>>,
    lock: FileExecutionLock,
    relation_names: IndexMap<i64, String>,
}

impl<P: PersistentState> UnitCallbacks<P> {
    /// Create callbacks over `store` and `lock`
    pub fn new(
        store: Arc<StateStore<P>>,
        lock: FileExecutionLock,
        relation_names: IndexMap<i64, String>,
    ) -> Self {
        Self {
            store,
            lock,
            relation_names,
        }
    }

    fn relation_name(&self, hook: &HookInfo) -> Result<Option<&str>> {
        let Some(id) = hook.relation_id else {
            return Ok(None);
        };
        self.relation_names
            .get(&id)
            .map(|name| Some(name.as_str()))
            .ok_or_else(|| Error::InvalidHook(format!("unknown relation id {id}")))
    }

    fn record(&self, hook_name: &str, context: &HookContext, outcome: HookOutcome) {
        let record = HookRecord {
            hook_name: hook_name.to_string(),
            context_id: context.id.clone(),
            outcome,
            at: chrono::Utc::now().timestamp(),
        };
        if let Err(e) = self.store.record_hook(&record) {
            warn!(hook_name, error = %e, "Failed to record hook history");
        }
    }
}

impl<P: PersistentState> PrepareCallbacks for UnitCallbacks<P> {
    fn clear_resolved_flag(&self) -> Result<()> {
        self.store.set_resolved_mode(ResolvedMode::None)
    }

    fn prepare_hook(&self, hook: &HookInfo) -> Result<String> {
        Ok(match self.relation_name(hook)? {
            Some(relation) => format!("{relation}-{}", hook.kind),
            None => hook.kind.to_string(),
        })
    }
}

impl<P: PersistentState> ExecuteCallbacks for UnitCallbacks<P> {
    fn acquire_execution_lock(&self, message: &str) -> Result<Unlocker> {
        self.lock.acquire(message)
    }

    fn notify_hook_completed(&self, hook_name: &str, context: &HookContext) {
        info!(hook_name, context = %context, "Hook completed");
        self.record(hook_name, context, HookOutcome::Completed);
    }

    fn notify_hook_failed(&self, hook_name: &str, context: &HookContext) {
        warn!(hook_name, context = %context, "Hook failed");
        self.record(hook_name, context, HookOutcome::Failed);
    }
}

impl<P: PersistentState> CommitCallbacks for UnitCallbacks<P> {
    fn commit_hook(&self, hook: &HookInfo) -> Result<()> {
        let (Some(id), remote) = (hook.relation_id, hook.remote_unit.as_deref()) else {
            return Ok(());
        };

        match (hook.kind, remote) {
            (HookKind::RelationJoined, Some(unit)) => {
                debug!(relation_id = id, unit, "Remote unit joined");
                self.store.add_relation_member(id, unit)
            }
            (HookKind::RelationDeparted, Some(unit)) => {
                debug!(relation_id = id, unit, "Remote unit departed");
                self.store.remove_relation_member(id, unit)
            }
            (HookKind::RelationBroken, _) => {
                debug!(relation_id = id, "Relation broken");
                self.store.forget_relation(id)
            }
            _ => Ok(()),
        }
    }
}
