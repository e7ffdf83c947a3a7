//! Per-iteration results handed from the scheduler to strategies.

use crate::error::StrategyError;
use crate::trace::ScheduleTrace;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a bug found during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BugKind {
    /// A program assertion failed.
    Assertion,
    /// Operations wait to receive while nothing is enabled.
    Livelock,
    /// Concurrency bypassed a scheduling point.
    UncontrolledSynchronization,
    /// The step bound was hit and is configured as a bug.
    StepBound,
    /// A monitor stayed hot for too long, or at termination.
    Liveness { monitor: String },
}

impl BugKind {
    pub fn is_liveness(&self) -> bool {
        matches!(self, BugKind::Liveness { .. })
    }
}

/// A bug report: what went wrong and the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugReport {
    pub kind: BugKind,
    pub message: String,
}

impl BugReport {
    pub fn new(kind: BugKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for BugReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// How one iteration ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationOutcome {
    /// First bug found, if any.
    pub bug: Option<BugReport>,
    /// The strategy ran out of choices without a bug.
    pub fully_explored: bool,
    /// The run was cut off by the step bound.
    pub step_bound_reached: bool,
    /// Steps the strategy scheduled.
    pub scheduled_steps: usize,
    /// Decisions taken, in order.
    pub schedule: ScheduleTrace,
    /// Session-fatal strategy error, if the run stopped because of one.
    pub strategy_error: Option<StrategyError>,
}

impl IterationOutcome {
    #[inline]
    pub fn bug_found(&self) -> bool {
        self.bug.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_kind() {
        assert!(BugKind::Liveness { monitor: "M".into() }.is_liveness());
        assert!(!BugKind::Livelock.is_liveness());
    }

    #[test]
    fn bug_kind_json_is_tagged() {
        let json = serde_json::to_string(&BugKind::Liveness { monitor: "Progress".into() }).unwrap();
        assert_eq!(json, r#"{"type":"Liveness","monitor":"Progress"}"#);
    }

    #[test]
    fn default_outcome_has_no_bug() {
        let outcome = IterationOutcome::default();
        assert!(!outcome.bug_found());
        assert!(outcome.schedule.is_empty());
    }
}
