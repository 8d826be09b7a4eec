//! Script hook runner
//!
//! Hooks are executables at `<charm_dir>/hooks/<name>`. A hook may ask for a
//! reboot by writing `now` or `after` into the file named by
//! `STEWARD_REBOOT_FILE`:
//!
//! - `now` - stop immediately and run the hook again after the reboot
//! - `after` - the hook is finished, reboot before doing anything else

use crate::runner::{HookContext, Runner, RunnerError, RunnerFactory};
use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use steward_config::Config;
use steward_core::{Error, HookInfo, Result};
use tracing::{debug, warn};

const REBOOT_FILE: &str = "reboot-request";

/// Reboot request left behind by a hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RebootRequest {
    Now,
    After,
}

/// Builds [`ScriptRunner`]s for one unit
#[derive(Debug, Clone)]
pub struct ScriptRunnerFactory {
    unit_name: String,
    charm_dir: PathBuf,
    state_dir: PathBuf,
    timeout: u64,
    env: IndexMap<String, String>,
    relation_names: IndexMap<i64, String>,
}

impl ScriptRunnerFactory {
    /// Factory without timeout, extra environment or relation names
    pub fn new(
        unit_name: impl Into<String>,
        charm_dir: impl Into<PathBuf>,
        state_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            unit_name: unit_name.into(),
            charm_dir: charm_dir.into(),
            state_dir: state_dir.into(),
            timeout: 0,
            env: IndexMap::new(),
            relation_names: IndexMap::new(),
        }
    }

    /// Factory configured from the agent config
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.unit.name.clone(),
            config.unit.charm_dir.clone(),
            config.state_dir()?,
        )
        .with_timeout(config.hooks.timeout)
        .with_env(config.hooks.env.clone())
        .with_relation_names(config.relation_names()))
    }

    /// Kill hooks running longer than `secs` seconds; 0 disables the limit
    #[must_use]
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }

    /// Extra environment passed to every hook
    #[must_use]
    pub fn with_env(mut self, env: IndexMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Relation endpoint names by relation id
    #[must_use]
    pub fn with_relation_names(mut self, names: IndexMap<i64, String>) -> Self {
        self.relation_names = names;
        self
    }
}

impl RunnerFactory for ScriptRunnerFactory {
    fn new_hook_runner(&self, hook: &HookInfo) -> Result<Box<dyn Runner>> {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let mut context = HookContext::new(
            format!("{}-{}-{nanos}", self.unit_name, hook.kind),
            self.unit_name.clone(),
        );
        context.relation_id = hook.relation_id;
        context.relation_name = hook
            .relation_id
            .and_then(|id| self.relation_names.get(&id).cloned());
        context.remote_unit.clone_from(&hook.remote_unit);

        Ok(Box::new(ScriptRunner {
            context,
            charm_dir: self.charm_dir.clone(),
            reboot_file: self.state_dir.join(REBOOT_FILE),
            timeout: self.timeout,
            env: self.env.clone(),
        }))
    }
}

/// Runs one hook script
#[derive(Debug)]
pub struct ScriptRunner {
    context: HookContext,
    charm_dir: PathBuf,
    reboot_file: PathBuf,
    timeout: u64,
    env: IndexMap<String, String>,
}

impl ScriptRunner {
    fn hook_env(&self, hook_name: &str) -> IndexMap<String, String> {
        let mut env = self.env.clone();
        let ctx = &self.context;
        env.insert("STEWARD_UNIT_NAME".into(), ctx.unit_name.clone());
        env.insert("STEWARD_HOOK_NAME".into(), hook_name.to_string());
        env.insert("STEWARD_CONTEXT_ID".into(), ctx.id.clone());
        env.insert(
            "STEWARD_CHARM_DIR".into(),
            self.charm_dir.to_string_lossy().into_owned(),
        );
        env.insert(
            "STEWARD_REBOOT_FILE".into(),
            self.reboot_file.to_string_lossy().into_owned(),
        );
        if let Some(id) = ctx.relation_id {
            env.insert("STEWARD_RELATION_ID".into(), id.to_string());
        }
        if let Some(name) = &ctx.relation_name {
            env.insert("STEWARD_RELATION".into(), name.clone());
        }
        if let Some(unit) = &ctx.remote_unit {
            env.insert("STEWARD_REMOTE_UNIT".into(), unit.clone());
        }
        env
    }

    fn execute(&self, script: &Path, env: &IndexMap<String, String>) -> Result<()> {
        let (program, args) = interpreter(script)?;

        debug!(%program, ?args, timeout = self.timeout, "Executing hook script");

        let mut cmd = duct::cmd(&program, &args)
            .dir(&self.charm_dir)
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked();
        for (key, value) in env {
            cmd = cmd.env(key, value);
        }

        let output = if self.timeout == 0 {
            cmd.run()
                .map_err(|e| Error::HookExecution(format!("{}: {e}", script.display())))?
        } else {
            let handle = cmd.start().map_err(|e| {
                Error::HookExecution(format!("failed to start {}: {e}", script.display()))
            })?;
            match handle.wait_timeout(Duration::from_secs(self.timeout)) {
                Ok(Some(output)) => output.clone(),
                Ok(None) => {
                    if let Err(e) = handle.kill() {
                        warn!(error = %e, "Failed to kill timed out hook");
                    }
                    return Err(Error::HookExecution(format!(
                        "{} timed out after {} seconds",
                        script.display(),
                        self.timeout
                    )));
                }
                Err(e) => {
                    return Err(Error::HookExecution(format!("{}: {e}", script.display())));
                }
            }
        };

        let text = String::from_utf8_lossy(&output.stdout);
        let text = text.trim_end();
        if output.status.success() {
            if !text.is_empty() {
                debug!(output = %text, "Hook output");
            }
            return Ok(());
        }

        let mut message = format!("{} exited with {}", script.display(), output.status);
        if !text.is_empty() {
            message.push_str(":\n");
            message.push_str(text);
        }
        Err(Error::HookExecution(message))
    }

    fn clear_reboot_request(&self) -> Result<()> {
        match fs::remove_file(&self.reboot_file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn take_reboot_request(&self) -> Result<Option<RebootRequest>> {
        let content = match fs::read_to_string(&self.reboot_file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.clear_reboot_request()?;

        match content.trim() {
            "now" => Ok(Some(RebootRequest::Now)),
            "after" => Ok(Some(RebootRequest::After)),
            other => {
                warn!(request = other, "Ignoring unrecognised reboot request");
                Ok(None)
            }
        }
    }
}

impl Runner for ScriptRunner {
    fn context(&self) -> &HookContext {
        &self.context
    }

    fn run_hook(&mut self, hook_name: &str) -> std::result::Result<(), RunnerError> {
        let script = self.charm_dir.join("hooks").join(hook_name);
        if !script.is_file() {
            return Err(RunnerError::Missing {
                hook: hook_name.to_string(),
            });
        }

        if let Some(parent) = self.reboot_file.parent() {
            fs::create_dir_all(parent).map_err(Error::from)?;
        }
        self.clear_reboot_request()?;

        let env = self.hook_env(hook_name);
        let result = self.execute(&script, &env);

        match (self.take_reboot_request()?, result) {
            (Some(RebootRequest::Now), _) => Err(RunnerError::RequeueAndReboot),
            (_, Err(e)) => Err(RunnerError::Failed(e)),
            (Some(RebootRequest::After), Ok(())) => Err(RunnerError::Reboot),
            (None, Ok(())) => Ok(()),
        }
    }
}

/// Program and arguments used to run `script`
///
/// Executable files run directly; anything else goes through the interpreter
/// named by its shebang, falling back to `sh`. The script path is appended
/// only when an interpreter is used.
fn interpreter(script: &Path) -> Result<(String, Vec<String>)> {
    let path = script.to_string_lossy().into_owned();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if fs::metadata(script)?.permissions().mode() & 0o111 != 0 {
            return Ok((path, Vec::new()));
        }
    }

    let content = fs::read_to_string(script)?;
    let Some(shebang) = content.lines().next().and_then(|l| l.strip_prefix("#!")) else {
        return Ok(("sh".to_string(), vec![path]));
    };

    let mut parts = shebang.split_whitespace();
    let Some(program) = parts.next() else {
        return Err(Error::HookExecution(format!(
            "empty shebang in {}",
            script.display()
        )));
    };
    let mut args: Vec<String> = parts.map(str::to_string).collect();

    let program = if program.ends_with("/env") {
        if args.is_empty() {
            return Err(Error::HookExecution(format!(
                "invalid env shebang in {}",
                script.display()
            )));
        }
        args.remove(0)
    } else {
        program.to_string()
    };
    args.push(path);
    Ok((program, args))
}
