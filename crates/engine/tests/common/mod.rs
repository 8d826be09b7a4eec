//! Test doubles shared by the engine integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use steward_engine::{
    Callbacks, Error, Factory, HookContext, HookInfo, HookKind, Kind, Result, Runner,
    RunnerError, RunnerFactory, State, Step, Unlocker,
};
use steward_engine::operation::{CommitCallbacks, ExecuteCallbacks, PrepareCallbacks};

pub const HOOK_NAME: &str = "some-hook-name";
pub const CONTEXT_ID: &str = "some-context-id";

/// Ordered log of side effects across callbacks and runners
pub type Events = Arc<Mutex<Vec<String>>>;

fn push(events: &Events, event: impl Into<String>) {
    events.lock().unwrap().push(event.into());
}

/// Recording callbacks with injectable failures
#[derive(Default)]
pub struct MockCallbacks {
    pub events: Events,
    pub clear_resolved_error: Option<String>,
    pub prepare_error: Option<String>,
    pub lock_error: Option<String>,
    pub commit_error: Option<String>,
    pub cleared: AtomicUsize,
    pub unlocked: Arc<AtomicUsize>,
    pub prepared: Mutex<Vec<HookInfo>>,
    pub committed: Mutex<Vec<HookInfo>>,
    pub completed: Mutex<Vec<(String, String)>>,
    pub failed: Mutex<Vec<(String, String)>>,
}

impl MockCallbacks {
    pub fn with_events(events: &Events) -> Self {
        Self {
            events: Arc::clone(events),
            ..Self::default()
        }
    }

    pub fn prepared(&self) -> Vec<HookInfo> {
        self.prepared.lock().unwrap().clone()
    }

    pub fn committed(&self) -> Vec<HookInfo> {
        self.committed.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<(String, String)> {
        self.completed.lock().unwrap().clone()
    }

    pub fn failed(&self) -> Vec<(String, String)> {
        self.failed.lock().unwrap().clone()
    }
}

impl PrepareCallbacks for MockCallbacks {
    fn clear_resolved_flag(&self) -> Result<()> {
        self.cleared.fetch_add(1, Ordering::SeqCst);
        match &self.clear_resolved_error {
            Some(msg) => Err(Error::Message(msg.clone())),
            None => Ok(()),
        }
    }

    fn prepare_hook(&self, hook: &HookInfo) -> Result<String> {
        self.prepared.lock().unwrap().push(hook.clone());
        match &self.prepare_error {
            Some(msg) => Err(Error::Message(msg.clone())),
            None => Ok(HOOK_NAME.to_string()),
        }
    }
}

impl ExecuteCallbacks for MockCallbacks {
    fn acquire_execution_lock(&self, message: &str) -> Result<Unlocker> {
        if let Some(msg) = &self.lock_error {
            return Err(Error::Message(msg.clone()));
        }
        push(&self.events, format!("lock {message}"));

        let events = Arc::clone(&self.events);
        let unlocked = Arc::clone(&self.unlocked);
        Ok(Unlocker::new(move || {
            unlocked.fetch_add(1, Ordering::SeqCst);
            push(&events, "unlock");
        }))
    }

    fn notify_hook_completed(&self, hook_name: &str, context: &HookContext) {
        push(&self.events, format!("completed {hook_name}"));
        self.completed
            .lock()
            .unwrap()
            .push((hook_name.to_string(), context.id.clone()));
    }

    fn notify_hook_failed(&self, hook_name: &str, context: &HookContext) {
        push(&self.events, format!("failed {hook_name}"));
        self.failed
            .lock()
            .unwrap()
            .push((hook_name.to_string(), context.id.clone()));
    }
}

impl CommitCallbacks for MockCallbacks {
    fn commit_hook(&self, hook: &HookInfo) -> Result<()> {
        self.committed.lock().unwrap().push(hook.clone());
        match &self.commit_error {
            Some(msg) => Err(Error::Message(msg.clone())),
            None => Ok(()),
        }
    }
}

/// What a mock runner does when asked to run a hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    Success,
    Missing,
    RequeueAndReboot,
    Reboot,
    Fail(String),
}

/// Runner factory handing out [`MockRunner`]s
pub struct MockRunnerFactory {
    pub events: Events,
    pub outcome: Mutex<MockOutcome>,
    pub new_runner_error: Option<String>,
    pub created: AtomicUsize,
}

impl MockRunnerFactory {
    pub fn new(events: &Events, outcome: MockOutcome) -> Self {
        Self {
            events: Arc::clone(events),
            outcome: Mutex::new(outcome),
            new_runner_error: None,
            created: AtomicUsize::new(0),
        }
    }

    pub fn set_outcome(&self, outcome: MockOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }
}

impl RunnerFactory for MockRunnerFactory {
    fn new_hook_runner(&self, _hook: &HookInfo) -> Result<Box<dyn Runner>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = &self.new_runner_error {
            return Err(Error::Message(msg.clone()));
        }
        Ok(Box::new(MockRunner {
            context: HookContext::new(CONTEXT_ID, "u/0"),
            outcome: self.outcome.lock().unwrap().clone(),
            events: Arc::clone(&self.events),
        }))
    }
}

pub struct MockRunner {
    context: HookContext,
    outcome: MockOutcome,
    events: Events,
}

impl Runner for MockRunner {
    fn context(&self) -> &HookContext {
        &self.context
    }

    fn run_hook(&mut self, hook_name: &str) -> std::result::Result<(), RunnerError> {
        push(&self.events, format!("run {hook_name}"));
        match &self.outcome {
            MockOutcome::Success => Ok(()),
            MockOutcome::Missing => Err(RunnerError::Missing {
                hook: hook_name.to_string(),
            }),
            MockOutcome::RequeueAndReboot => Err(RunnerError::RequeueAndReboot),
            MockOutcome::Reboot => Err(RunnerError::Reboot),
            MockOutcome::Fail(msg) => Err(RunnerError::Failed(Error::HookExecution(msg.clone()))),
        }
    }
}

/// Factory over the given doubles, keeping handles for inspection
pub struct Harness {
    pub events: Events,
    pub callbacks: Arc<MockCallbacks>,
    pub runners: Arc<MockRunnerFactory>,
    pub factory: Factory,
}

impl Harness {
    pub fn new(outcome: MockOutcome) -> Self {
        Self::with(|_| {}, outcome)
    }

    /// Build a harness after adjusting the callbacks
    pub fn with(configure: impl FnOnce(&mut MockCallbacks), outcome: MockOutcome) -> Self {
        let events = Events::default();
        let mut callbacks = MockCallbacks::with_events(&events);
        configure(&mut callbacks);
        Self::from_parts(events.clone(), callbacks, MockRunnerFactory::new(&events, outcome))
    }

    pub fn from_parts(
        events: Events,
        callbacks: MockCallbacks,
        runners: MockRunnerFactory,
    ) -> Self {
        let callbacks = Arc::new(callbacks);
        let runners = Arc::new(runners);
        let factory = Factory::new(
            Arc::clone(&runners) as Arc<dyn RunnerFactory>,
            Arc::clone(&callbacks) as Arc<dyn Callbacks>,
        );
        Self {
            events,
            callbacks,
            runners,
            factory,
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

pub fn hook(kind: HookKind) -> HookInfo {
    HookInfo::new(kind)
}

/// A state whose carried-forward fields are all non-default
pub fn overwrite_state() -> State {
    State {
        kind: Kind::Continue,
        step: Step::Pending,
        hook: Some(hook(HookKind::Install)),
        started: true,
        collect_metrics_time: 1_234_567,
    }
}
