//! Hook identity
//!
//! A hook is a named lifecycle event the unit reacts to. `HookInfo` is the
//! identity the operation engine carries through prepare, execute and commit,
//! and the value persisted as part of the operation state.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookKind {
    Install,
    ConfigChanged,
    Start,
    UpgradeCharm,
    Stop,
    CollectMetrics,
    UpdateStatus,
    LeaderElected,
    LeaderSettingsChanged,
    RelationJoined,
    RelationChanged,
    RelationDeparted,
    RelationBroken,
}

impl HookKind {
    /// Every known hook kind, in declaration order
    pub const ALL: [HookKind; 13] = [
        HookKind::Install,
        HookKind::ConfigChanged,
        HookKind::Start,
        HookKind::UpgradeCharm,
        HookKind::Stop,
        HookKind::CollectMetrics,
        HookKind::UpdateStatus,
        HookKind::LeaderElected,
        HookKind::LeaderSettingsChanged,
        HookKind::RelationJoined,
        HookKind::RelationChanged,
        HookKind::RelationDeparted,
        HookKind::RelationBroken,
    ];

    /// Canonical hook name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::Install => "install",
            HookKind::ConfigChanged => "config-changed",
            HookKind::Start => "start",
            HookKind::UpgradeCharm => "upgrade-charm",
            HookKind::Stop => "stop",
            HookKind::CollectMetrics => "collect-metrics",
            HookKind::UpdateStatus => "update-status",
            HookKind::LeaderElected => "leader-elected",
            HookKind::LeaderSettingsChanged => "leader-settings-changed",
            HookKind::RelationJoined => "relation-joined",
            HookKind::RelationChanged => "relation-changed",
            HookKind::RelationDeparted => "relation-departed",
            HookKind::RelationBroken => "relation-broken",
        }
    }

    /// Whether this kind fires in the context of a relation
    #[must_use]
    pub fn is_relation(&self) -> bool {
        matches!(
            self,
            HookKind::RelationJoined
                | HookKind::RelationChanged
                | HookKind::RelationDeparted
                | HookKind::RelationBroken
        )
    }

    /// Whether this kind fires for a specific remote unit
    #[must_use]
    pub fn needs_remote_unit(&self) -> bool {
        matches!(
            self,
            HookKind::RelationJoined | HookKind::RelationChanged | HookKind::RelationDeparted
        )
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        HookKind::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| Error::InvalidHook(format!("unknown hook kind '{s}'")))
    }
}

/// Identity of a single hook invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookInfo {
    /// Lifecycle event kind
    pub kind: HookKind,

    /// Relation the hook fires for (relation hooks only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_id: Option<i64>,

    /// Remote unit that triggered the hook (joined/changed/departed only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_unit: Option<String>,
}

impl HookInfo {
    /// Identity for a hook that carries no relation context
    #[must_use]
    pub fn new(kind: HookKind) -> Self {
        Self {
            kind,
            relation_id: None,
            remote_unit: None,
        }
    }

    /// Identity for a relation hook
    #[must_use]
    pub fn relation(kind: HookKind, relation_id: i64, remote_unit: Option<String>) -> Self {
        Self {
            kind,
            relation_id: Some(relation_id),
            remote_unit,
        }
    }

    /// Check the identity is structurally valid for its kind
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHook`] when relation context is missing from a
    /// relation hook, or present on a hook that does not use it.
    pub fn validate(&self) -> Result<()> {
        if self.kind.is_relation() {
            if self.relation_id.is_none() {
                return Err(Error::InvalidHook(format!(
                    "{} hook requires a relation id",
                    self.kind
                )));
            }
            match (&self.remote_unit, self.kind.needs_remote_unit()) {
                (None, true) => Err(Error::InvalidHook(format!(
                    "{} hook requires a remote unit",
                    self.kind
                ))),
                (Some(unit), false) => Err(Error::InvalidHook(format!(
                    "{} hook must not specify a remote unit (got '{unit}')",
                    self.kind
                ))),
                (Some(unit), true) if unit.is_empty() => Err(Error::InvalidHook(format!(
                    "{} hook has an empty remote unit",
                    self.kind
                ))),
                _ => Ok(()),
            }
        } else if self.relation_id.is_some() || self.remote_unit.is_some() {
            Err(Error::InvalidHook(format!(
                "{} hook must not carry relation context",
                self.kind
            )))
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for HookInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(id) = self.relation_id {
            write!(f, " (relation {id}")?;
            if let Some(unit) = &self.remote_unit {
                write!(f, ", unit {unit}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}
