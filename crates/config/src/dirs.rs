//! XDG directory utilities
//!
//! This module provides XDG-compliant directory paths for steward.
//! It follows the XDG Base Directory specification using the `xdg` crate:
//! - `XDG_CONFIG_HOME` defaults to ~/.config
//! - `XDG_STATE_HOME` defaults to ~/.local/state

use std::path::PathBuf;
use xdg::BaseDirectories;

/// Get the steward config directory
///
/// Returns `$XDG_CONFIG_HOME/steward` or `~/.config/steward`
#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    BaseDirectories::with_prefix("steward").get_config_home()
}

/// Get the steward state directory
///
/// Returns `$XDG_STATE_HOME/steward` or `~/.local/state/steward`
#[must_use]
pub fn state_dir() -> Option<PathBuf> {
    BaseDirectories::with_prefix("steward").get_state_home()
}

/// Get the default config file path
///
/// Returns `$XDG_CONFIG_HOME/steward/steward.toml`
#[must_use]
pub fn default_config_file() -> Option<PathBuf> {
    config_dir().map(|d| d.join("steward.toml"))
}
