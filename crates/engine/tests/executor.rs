//! Tests for the executor: persistence, resumption and resolution

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{HOOK_NAME, Harness, MockOutcome, hook};
use std::sync::Arc;
use steward_engine::{
    Error, Executor, ExecutorError, HookKind, Kind, MockPersistentState, NextStep,
    OperationError, PersistentState, ResolvedMode, Result, State, StateStore, Step, next_step,
};

fn store() -> Arc<StateStore<MockPersistentState>> {
    Arc::new(StateStore::new(MockPersistentState::new()))
}

fn ran(harness: &Harness) -> usize {
    harness
        .events()
        .iter()
        .filter(|e| e.starts_with("run "))
        .count()
}

/// Backend that reads fine but refuses every write
struct ReadOnlyState;

impl PersistentState for ReadOnlyState {
    fn get(&self, _bucket: &str, _key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn set(&self, _bucket: &str, _key: &[u8], _value: &[u8]) -> Result<()> {
        Err(Error::State("disk full".to_string()))
    }

    fn delete(&self, _bucket: &str, _key: &[u8]) -> Result<()> {
        Err(Error::State("disk full".to_string()))
    }

    fn for_each<F>(&self, _bucket: &str, _f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        Ok(())
    }
}

#[test]
fn test_next_step_table() {
    let harness = Harness::new(MockOutcome::Success);
    let install = hook(HookKind::Install);
    let at = |kind, step| State::default().with_change(kind, step, install.clone());

    let step = next_step(&State::default(), &harness.factory, ResolvedMode::None).unwrap();
    assert!(matches!(step, NextStep::Idle));

    let step = next_step(
        &at(Kind::Continue, Step::Pending),
        &harness.factory,
        ResolvedMode::RetryHooks,
    )
    .unwrap();
    assert!(matches!(step, NextStep::Idle));

    let step = next_step(&at(Kind::RunHook, Step::Queued), &harness.factory, ResolvedMode::None);
    assert!(matches!(step, Ok(NextStep::Run(ref op)) if op.to_string() == "run install hook"));

    let step = next_step(&at(Kind::RunHook, Step::Done), &harness.factory, ResolvedMode::None);
    assert!(matches!(step, Ok(NextStep::Commit(ref op)) if op.to_string() == "run install hook"));

    let pending = at(Kind::RunHook, Step::Pending);
    let step = next_step(&pending, &harness.factory, ResolvedMode::RetryHooks);
    assert!(matches!(step, Ok(NextStep::Run(ref op)) if op.to_string() == "retry install hook"));

    let step = next_step(&pending, &harness.factory, ResolvedMode::NoHooks);
    assert!(matches!(step, Ok(NextStep::Run(ref op)) if op.to_string() == "skip install hook"));

    let step = next_step(&pending, &harness.factory, ResolvedMode::None).unwrap();
    assert!(matches!(step, NextStep::AwaitingResolution(h) if h == install));
}

#[test]
fn test_next_step_rejects_state_without_hook() {
    let harness = Harness::new(MockOutcome::Success);
    let state = State {
        kind: Kind::RunHook,
        step: Step::Queued,
        ..State::default()
    };
    let err = next_step(&state, &harness.factory, ResolvedMode::None).unwrap_err();
    assert!(matches!(err, OperationError::InvalidState { .. }));
}

#[test]
fn test_run_persists_each_phase() {
    let harness = Harness::new(MockOutcome::Success);
    let store = store();
    let mut executor = Executor::new(Arc::clone(&store)).unwrap();

    let mut op = harness.factory.new_run_hook(hook(HookKind::Install)).unwrap();
    executor.run(op.as_mut()).unwrap();

    let expected = State::default().with_change(
        Kind::RunHook,
        Step::Queued,
        hook(HookKind::ConfigChanged),
    );
    assert_eq!(executor.state(), &expected);
    assert_eq!(store.load_state().unwrap(), expected);
}

#[test]
fn test_drain_runs_install_chain() {
    let harness = Harness::new(MockOutcome::Success);
    let store = store();
    let mut executor = Executor::new(Arc::clone(&store)).unwrap();

    let mut op = harness.factory.new_run_hook(hook(HookKind::Install)).unwrap();
    executor.run(op.as_mut()).unwrap();
    let processed = executor.drain(&harness.factory).unwrap();

    assert_eq!(processed, 2);
    assert_eq!(
        harness.callbacks.prepared(),
        vec![
            hook(HookKind::Install),
            hook(HookKind::ConfigChanged),
            hook(HookKind::Start),
        ]
    );
    let state = store.load_state().unwrap();
    assert!(state.is_idle());
    assert!(state.started);
    assert_eq!(state.hook, Some(hook(HookKind::Start)));
}

#[test]
fn test_failure_leaves_pending_state() {
    let harness = Harness::new(MockOutcome::Fail("exit status 1".to_string()));
    let store = store();
    let mut executor = Executor::new(Arc::clone(&store)).unwrap();

    let mut op = harness.factory.new_run_hook(hook(HookKind::Start)).unwrap();
    let err = executor.run(op.as_mut()).unwrap_err();
    assert!(matches!(
        err,
        ExecutorError::Operation(OperationError::HookFailed { .. })
    ));
    assert!(harness.callbacks.committed().is_empty());

    let state = store.load_state().unwrap();
    assert_eq!(state.kind, Kind::RunHook);
    assert_eq!(state.step, Step::Pending);

    let err = executor.drain(&harness.factory).unwrap_err();
    assert!(matches!(err, ExecutorError::AwaitingResolution { hook: h } if h == hook(HookKind::Start)));
}

#[test]
fn test_resolved_retry_reruns_hook() {
    let harness = Harness::new(MockOutcome::Fail("exit status 1".to_string()));
    let store = store();
    let mut executor = Executor::new(Arc::clone(&store)).unwrap();

    let mut op = harness.factory.new_run_hook(hook(HookKind::Start)).unwrap();
    executor.run(op.as_mut()).unwrap_err();

    harness.runners.set_outcome(MockOutcome::Success);
    store.set_resolved_mode(ResolvedMode::RetryHooks).unwrap();
    executor.drain(&harness.factory).unwrap();

    assert_eq!(ran(&harness), 2);
    assert_eq!(
        harness
            .callbacks
            .cleared
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
    let state = store.load_state().unwrap();
    assert!(state.is_idle());
    assert!(state.started);
}

#[test]
fn test_resolved_skip_commits_without_running() {
    let harness = Harness::new(MockOutcome::Fail("exit status 1".to_string()));
    let store = store();
    let mut executor = Executor::new(Arc::clone(&store)).unwrap();

    let mut op = harness.factory.new_run_hook(hook(HookKind::Install)).unwrap();
    executor.run(op.as_mut()).unwrap_err();
    assert_eq!(ran(&harness), 1);

    store.set_resolved_mode(ResolvedMode::NoHooks).unwrap();
    harness.runners.set_outcome(MockOutcome::Success);

    // Skipping install still queues config-changed
    let mut executor = Executor::new(Arc::clone(&store)).unwrap();
    let step = next_step(
        executor.state(),
        &harness.factory,
        store.resolved_mode().unwrap(),
    )
    .unwrap();
    let mut skip = match step {
        NextStep::Run(op) => op,
        other => panic!("expected skip operation, got {other:?}"),
    };
    executor.run(skip.as_mut()).unwrap();

    assert_eq!(ran(&harness), 1);
    assert_eq!(harness.callbacks.committed(), vec![hook(HookKind::Install)]);
    assert_eq!(
        store.load_state().unwrap(),
        State::default().with_change(
            Kind::RunHook,
            Step::Queued,
            hook(HookKind::ConfigChanged)
        )
    );
}

#[test]
fn test_requeue_reboot_persists_queued_state() {
    let harness = Harness::new(MockOutcome::RequeueAndReboot);
    let store = store();
    let mut executor = Executor::new(Arc::clone(&store)).unwrap();

    let mut op = harness.factory.new_run_hook(hook(HookKind::Install)).unwrap();
    let err = executor.run(op.as_mut()).unwrap_err();
    assert!(err.needs_reboot());
    assert!(harness.callbacks.committed().is_empty());

    let queued = State::default().with_change(Kind::RunHook, Step::Queued, hook(HookKind::Install));
    assert_eq!(store.load_state().unwrap(), queued);

    // After the reboot the same hook runs again from scratch
    harness.runners.set_outcome(MockOutcome::Success);
    let mut executor = Executor::new(Arc::clone(&store)).unwrap();
    assert_eq!(executor.state(), &queued);
    executor.drain(&harness.factory).unwrap();

    assert_eq!(ran(&harness), 4);
    assert!(store.load_state().unwrap().started);
}

#[test]
fn test_reboot_after_completion_resumes_at_commit() {
    let harness = Harness::new(MockOutcome::Reboot);
    let store = store();
    let mut executor = Executor::new(Arc::clone(&store)).unwrap();

    let mut op = harness.factory.new_run_hook(hook(HookKind::Install)).unwrap();
    let err = executor.run(op.as_mut()).unwrap_err();
    assert!(err.needs_reboot());
    assert_eq!(
        store.load_state().unwrap(),
        State::default().with_change(Kind::RunHook, Step::Done, hook(HookKind::Install))
    );

    harness.runners.set_outcome(MockOutcome::Success);
    let mut executor = Executor::new(Arc::clone(&store)).unwrap();
    executor.drain(&harness.factory).unwrap();

    // install is committed without running again
    assert_eq!(ran(&harness), 3);
    assert_eq!(
        harness.callbacks.committed(),
        vec![
            hook(HookKind::Install),
            hook(HookKind::ConfigChanged),
            hook(HookKind::Start),
        ]
    );
}

#[test]
fn test_commit_only_resumes_done_state() {
    let harness = Harness::new(MockOutcome::Success);
    let store = store();
    store
        .save_state(&State::default().with_change(
            Kind::RunHook,
            Step::Done,
            hook(HookKind::UpdateStatus),
        ))
        .unwrap();

    let mut executor = Executor::new(Arc::clone(&store)).unwrap();
    let mut op = harness
        .factory
        .new_run_hook(hook(HookKind::UpdateStatus))
        .unwrap();
    executor.commit(op.as_mut()).unwrap();

    assert_eq!(ran(&harness), 0);
    assert!(store.load_state().unwrap().is_idle());
}

#[test]
fn test_aborted_phase_persists_nothing() {
    let harness = Harness::with(
        |cb| cb.commit_error = Some("quack".to_string()),
        MockOutcome::Success,
    );
    let store = store();
    let mut executor = Executor::new(Arc::clone(&store)).unwrap();

    let mut op = harness.factory.new_run_hook(hook(HookKind::Install)).unwrap();
    let err = executor.run(op.as_mut()).unwrap_err();
    assert_eq!(err.to_string(), "quack");

    let done = State::default().with_change(Kind::RunHook, Step::Done, hook(HookKind::Install));
    assert_eq!(store.load_state().unwrap(), done);
    assert_eq!(executor.state(), &done);
    assert_eq!(
        harness.events().last().map(String::as_str),
        Some(format!("completed {HOOK_NAME}").as_str())
    );
}

#[test]
fn test_persist_failure_after_successful_phase() {
    let harness = Harness::new(MockOutcome::Success);
    let store = Arc::new(StateStore::new(ReadOnlyState));
    let mut executor = Executor::new(store).unwrap();

    let mut op = harness.factory.new_run_hook(hook(HookKind::Install)).unwrap();
    let err = executor.run(op.as_mut()).unwrap_err();
    assert!(matches!(err, ExecutorError::Persist(_)));
    assert_eq!(ran(&harness), 0);
    assert_eq!(executor.state(), &State::default());
}

#[test]
fn test_failed_phase_writes_nothing() {
    let harness = Harness::with(
        |cb| cb.prepare_error = Some("pow".to_string()),
        MockOutcome::Success,
    );
    let mut executor = Executor::new(Arc::new(StateStore::new(ReadOnlyState))).unwrap();

    let mut op = harness.factory.new_run_hook(hook(HookKind::Install)).unwrap();
    let err = executor.run(op.as_mut()).unwrap_err();
    assert_eq!(err.to_string(), "pow");
}

#[cfg(unix)]
mod end_to_end {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use steward_engine::{
        Callbacks, Executor, Factory, FileExecutionLock, HookInfo, HookKind, HookOutcome,
        RedbPersistentState, RunnerFactory, ScriptRunnerFactory, StateStore, UnitCallbacks,
    };
    use indexmap::IndexMap;
    use tempfile::TempDir;

    #[test]
    fn test_script_hooks_with_persistent_store() {
        let temp = TempDir::new().unwrap();
        let charm_dir = temp.path().join("charm");
        let state_dir = temp.path().join("state");
        fs::create_dir_all(charm_dir.join("hooks")).unwrap();

        let marker = temp.path().join("installed");
        let install = charm_dir.join("hooks/install");
        fs::write(
            &install,
            format!("#!/bin/sh\necho \"$STEWARD_UNIT_NAME\" > {}\n", marker.display()),
        )
        .unwrap();
        fs::set_permissions(&install, fs::Permissions::from_mode(0o755)).unwrap();

        let store = Arc::new(StateStore::new(
            RedbPersistentState::new(state_dir.join("steward.db")).unwrap(),
        ));
        let relations = IndexMap::from([(1, "db".to_string())]);
        let callbacks = Arc::new(UnitCallbacks::new(
            Arc::clone(&store),
            FileExecutionLock::new(state_dir.join("execution.lock")),
            relations.clone(),
        ));
        let runners = Arc::new(
            ScriptRunnerFactory::new("wordpress/0", &charm_dir, &state_dir)
                .with_relation_names(relations),
        );
        let factory = Factory::new(
            runners as Arc<dyn RunnerFactory>,
            callbacks as Arc<dyn Callbacks>,
        );

        let mut executor = Executor::new(Arc::clone(&store)).unwrap();
        let mut op = factory.new_run_hook(HookInfo::new(HookKind::Install)).unwrap();
        executor.run(op.as_mut()).unwrap();
        executor.drain(&factory).unwrap();

        let joined = HookInfo::relation(HookKind::RelationJoined, 1, Some("mysql/0".into()));
        let mut op = factory.new_run_hook(joined).unwrap();
        executor.run(op.as_mut()).unwrap();

        assert_eq!(fs::read_to_string(&marker).unwrap().trim(), "wordpress/0");
        assert!(store.load_state().unwrap().started);
        assert_eq!(store.relation_members(1).unwrap(), vec!["mysql/0"]);

        // config-changed, start and the relation hook are not implemented
        let history = store.hook_history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].hook_name, "install");
        assert_eq!(history[0].outcome, HookOutcome::Completed);
        assert!(history[0].context_id.starts_with("wordpress/0-install-"));
    }
}
