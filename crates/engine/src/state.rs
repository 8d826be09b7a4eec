//! Operation state
//!
//! `State` is the minimal persisted record of hook progress. The executor
//! loads it before every phase and persists whatever the phase returns; a
//! phase that aborts returns no state, so the last persisted value stays
//! authoritative after a crash.

use serde::{Deserialize, Serialize};
use std::fmt;
use steward_core::HookInfo;

/// What the unit is doing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Kind {
    /// No hook pending
    #[default]
    Continue,
    /// A hook is pending or in flight
    RunHook,
}

/// Resumption marker within the current kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    /// About to execute (or execution failed and awaits resolution)
    #[default]
    Pending,
    /// Recorded for a future execution pass
    Queued,
    /// Ran to completion, only commit remains
    Done,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::Continue => "continue",
            Kind::RunHook => "run-hook",
        })
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Pending => "pending",
            Step::Queued => "queued",
            Step::Done => "done",
        })
    }
}

/// Persisted operation state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Operation in progress
    pub kind: Kind,
    /// Phase reached by that operation
    pub step: Step,

    /// Hook pending or in flight, or the most recently committed one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<HookInfo>,

    /// Set once the start hook has committed; never reset
    #[serde(default)]
    pub started: bool,

    /// Unix seconds of the last committed collect-metrics hook
    #[serde(default, rename = "collectMetricsTime")]
    pub collect_metrics_time: i64,
}

impl State {
    /// Copy of this state with kind, step and hook replaced
    ///
    /// Every other field is carried forward unchanged.
    #[must_use]
    pub fn with_change(&self, kind: Kind, step: Step, hook: HookInfo) -> Self {
        Self {
            kind,
            step,
            hook: Some(hook),
            ..self.clone()
        }
    }

    /// True when no hook is pending
    pub fn is_idle(&self) -> bool {
        self.kind == Kind::Continue
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.step)?;
        if let Some(hook) = &self.hook {
            write!(f, " {hook}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use steward_core::HookKind;

    #[test]
    fn test_blank_state_is_idle() {
        let state = State::default();
        assert_eq!(state.kind, Kind::Continue);
        assert_eq!(state.step, Step::Pending);
        assert!(state.hook.is_none());
        assert!(state.is_idle());
    }

    #[test]
    fn test_with_change_carries_other_fields() {
        let before = State {
            kind: Kind::Continue,
            step: Step::Pending,
            hook: Some(HookInfo::new(HookKind::Install)),
            started: true,
            collect_metrics_time: 1_234_567,
        };

        let after = before.with_change(
            Kind::RunHook,
            Step::Queued,
            HookInfo::new(HookKind::ConfigChanged),
        );

        assert_eq!(after.kind, Kind::RunHook);
        assert_eq!(after.step, Step::Queued);
        assert_eq!(after.hook, Some(HookInfo::new(HookKind::ConfigChanged)));
        assert!(after.started);
        assert_eq!(after.collect_metrics_time, 1_234_567);
    }

    #[test]
    fn test_json_shape() {
        let state = State {
            kind: Kind::RunHook,
            step: Step::Done,
            hook: Some(HookInfo::new(HookKind::Start)),
            started: false,
            collect_metrics_time: 0,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["kind"], "run-hook");
        assert_eq!(json["step"], "done");
        assert_eq!(json["hook"]["kind"], "start");

        let back: State = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_display() {
        let state = State::default().with_change(
            Kind::RunHook,
            Step::Pending,
            HookInfo::new(HookKind::Install),
        );
        assert_eq!(state.to_string(), "run-hook/pending install");
    }
}
