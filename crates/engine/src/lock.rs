//! Host-wide execution lock
//!
//! Hook scripts on one machine must never run concurrently, even when they
//! belong to different units (a principal and its subordinates). The lock is
//! a capability handed to the engine: acquiring it yields an [`Unlocker`]
//! that releases exactly once, either explicitly or when dropped.
//!
//! # Storage
//!
//! - `<state_dir>/execution.lock` - Lock file with OS-level exclusive lock;
//!   its content names the current holder

use fs2::FileExt;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use steward_core::{Error, Result};
use tracing::{debug, warn};

/// Release handle for an acquired lock
///
/// Runs its release action exactly once: on [`Unlocker::release`] or on drop,
/// whichever comes first.
pub struct Unlocker {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Unlocker {
    /// Wrap a release action
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Release now instead of at drop
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Unlocker {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl fmt::Debug for Unlocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unlocker")
            .field("held", &self.release.is_some())
            .finish()
    }
}

/// Execution lock backed by an OS file lock
///
/// Acquisition blocks until the lock is free. The holder's message is written
/// into the lock file so operators can see who is running.
#[derive(Debug, Clone)]
pub struct FileExecutionLock {
    path: PathBuf,
}

impl FileExecutionLock {
    /// Lock using the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Block until the lock is held
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lock`] if the lock file cannot be created or locked
    pub fn acquire(&self, message: &str) -> Result<Unlocker> {
        let file = self.open()?;

        debug!(lock = %self.path.display(), %message, "Waiting for execution lock");
        file.lock_exclusive().map_err(|e| {
            Error::Lock(format!("cannot lock {}: {e}", self.path.display()))
        })?;

        self.hold(file, message)
    }

    /// Message written by the last holder, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file exists but cannot be read
    pub fn holder(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.is_empty() => Ok(None),
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn open(&self) -> Result<fs::File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Lock(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| Error::Lock(format!("cannot open {}: {e}", self.path.display())))
    }

    fn hold(&self, mut file: fs::File, message: &str) -> Result<Unlocker> {
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(message.as_bytes())?;
        file.flush()?;

        debug!(lock = %self.path.display(), "Execution lock acquired");

        let path = self.path.clone();
        Ok(Unlocker::new(move || {
            if let Err(e) = file.set_len(0) {
                warn!(lock = %path.display(), error = %e, "Failed to clear lock holder");
            }
            if let Err(e) = FileExt::unlock(&file) {
                warn!(lock = %path.display(), error = %e, "Failed to release execution lock");
            } else {
                debug!(lock = %path.display(), "Execution lock released");
            }
        }))
    }
}
