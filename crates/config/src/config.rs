//! Configuration management
//!
//! This module handles loading and validating the steward agent configuration.
//!
//! ```toml
//! [unit]
//! name = "wordpress/0"
//! charmDir = "/var/lib/steward/charm"
//!
//! [paths]
//! stateDir = "/var/lib/steward/state"
//!
//! [hooks]
//! timeout = 300
//!
//! [[relations]]
//! id = 0
//! name = "db"
//! ```

use crate::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use steward_core::Error;

/// File name of the execution lock inside the state directory
const DEFAULT_LOCK_FILE: &str = "execution.lock";

/// Unit identity section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConfig {
    /// Unit name in `<application>/<number>` form
    pub name: String,

    /// Directory holding the deployed charm (hooks live in `<charmDir>/hooks`)
    #[serde(rename = "charmDir")]
    pub charm_dir: PathBuf,
}

/// Filesystem locations used by the agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory for the state database (defaults to the XDG state directory)
    #[serde(default, rename = "stateDir")]
    pub state_dir: Option<PathBuf>,

    /// Host-wide execution lock file (defaults to `<stateDir>/execution.lock`)
    #[serde(default, rename = "lockFile")]
    pub lock_file: Option<PathBuf>,
}

/// Hook execution settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksConfig {
    /// Timeout in seconds (default: 0 = no timeout)
    #[serde(default)]
    pub timeout: u64,

    /// Extra environment variables passed to every hook
    #[serde(default)]
    pub env: IndexMap<String, String>,
}

/// A relation the unit participates in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationConfig {
    /// Relation id as assigned by the controller
    pub id: i64,

    /// Relation endpoint name (used to name relation hooks, e.g. `db-relation-joined`)
    pub name: String,
}

/// Steward configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Unit identity
    pub unit: UnitConfig,

    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Hook execution settings
    #[serde(default)]
    pub hooks: HooksConfig,

    /// Relations the unit participates in
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
}

impl Config {
    /// Load configuration from a file
    ///
    /// Relative paths are resolved against the directory containing the file.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, TOML parsing fails, or validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&content, base_dir).map_err(|e| {
            Error::Config(format!("Invalid config file {}: {e}", path.display()))
        })
    }

    /// Load configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns error if TOML parsing or validation fails
    pub fn from_toml_str(toml_content: &str, base_dir: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(toml_content)
            .map_err(|e| Error::Config(format!("Failed to parse config TOML: {e}")))?;

        config.resolve_relative_paths(base_dir);
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the unit name is malformed or relations are duplicated
    pub fn validate(&self) -> Result<()> {
        validate_unit_name(&self.unit.name)?;

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for relation in &self.relations {
            if relation.name.is_empty() {
                return Err(Error::Config(format!(
                    "relation {} has an empty name",
                    relation.id
                )));
            }
            if !ids.insert(relation.id) {
                return Err(Error::Config(format!(
                    "duplicate relation id {}",
                    relation.id
                )));
            }
            if !names.insert(relation.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate relation name '{}'",
                    relation.name
                )));
            }
        }

        Ok(())
    }

    /// Relation names keyed by relation id
    #[must_use]
    pub fn relation_names(&self) -> IndexMap<i64, String> {
        self.relations
            .iter()
            .map(|r| (r.id, r.name.clone()))
            .collect()
    }

    /// Resolve the state directory, falling back to the XDG state directory
    ///
    /// # Errors
    ///
    /// Returns an error if no state directory is configured and XDG lookup fails
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.paths.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => crate::dirs::state_dir()
                .ok_or_else(|| Error::Config("Failed to determine state directory".to_string())),
        }
    }

    /// Resolve the execution lock file path
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be determined
    pub fn lock_file(&self) -> Result<PathBuf> {
        match &self.paths.lock_file {
            Some(path) => Ok(path.clone()),
            None => Ok(self.state_dir()?.join(DEFAULT_LOCK_FILE)),
        }
    }

    fn resolve_relative_paths(&mut self, base_dir: &Path) {
        self.unit.charm_dir = Self::resolve_path(&self.unit.charm_dir, base_dir);
        if let Some(ref state_dir) = self.paths.state_dir {
            self.paths.state_dir = Some(Self::resolve_path(state_dir, base_dir));
        }
        if let Some(ref lock_file) = self.paths.lock_file {
            self.paths.lock_file = Some(Self::resolve_path(lock_file, base_dir));
        }
    }

    /// Resolve a single path: expand ~/ and resolve relative paths
    fn resolve_path(path: &Path, base_dir: &Path) -> PathBuf {
        let path_str = path.to_string_lossy();

        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = ::dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~"
            && let Some(home) = ::dirs::home_dir()
        {
            return home;
        }

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }
}

/// Unit names look like `<application>/<number>`
fn validate_unit_name(name: &str) -> Result<()> {
    let valid = name.split_once('/').is_some_and(|(app, number)| {
        !app.is_empty()
            && app
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !number.is_empty()
            && number.chars().all(|c| c.is_ascii_digit())
    });

    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "invalid unit name '{name}' (expected <application>/<number>)"
        )))
    }
}
