//! Coarse matching between guide steps and live operations.
//!
//! When the editor replays a guide tree, it first finds the enabled
//! operation that performed the next guide step. A [`MatchPolicy`] then
//! decides whether that operation's declared next action is close enough
//! to the guide step to count as "the same" step. A mismatch is tolerated:
//! the operation still runs, but the guide does not advance.

use lockstep_core::{OperationType, SchedulableOperation};
use lockstep_model::{ProgramStep, StepKind};

/// Decides whether a live operation is about to perform a guide step.
pub trait MatchPolicy: Send {
    fn matches(&self, guide: &ProgramStep, candidate: &SchedulableOperation) -> bool;

    fn name(&self) -> &'static str;
}

/// Accepts every candidate whose id matches the guide step's source.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysMatch;

impl MatchPolicy for AlwaysMatch {
    fn matches(&self, _guide: &ProgramStep, _candidate: &SchedulableOperation) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "always"
    }
}

/// Compares the guide step's kind and target with the candidate's declared
/// next action.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredActionMatch;

impl MatchPolicy for DeclaredActionMatch {
    fn matches(&self, guide: &ProgramStep, candidate: &SchedulableOperation) -> bool {
        let next = &candidate.next;
        match guide.kind {
            StepKind::Start => next.operation_type == OperationType::Start,
            StepKind::Create => next.operation_type == OperationType::Create && next.target_id == guide.target,
            StepKind::Send => next.operation_type == OperationType::Send && next.target_id == guide.target,
            StepKind::Receive => next.operation_type == OperationType::Receive,
            // Choices never take a scheduling decision.
            StepKind::NondetBool(_) | StepKind::NondetInt(_) => true,
        }
    }

    fn name(&self) -> &'static str {
        "declared-action"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::{EventInfo, NextAction, OperationId, TargetType};
    use lockstep_model::ProgramModel;

    fn guide_send() -> ProgramStep {
        let mut model = ProgramModel::new();
        let send = model.record_send(OperationId(0), OperationId(2), &EventInfo::new("Ping"));
        model.tree().get(send).unwrap().clone()
    }

    fn declaring(operation_type: OperationType, target: u64) -> SchedulableOperation {
        let mut op = SchedulableOperation::new(OperationId(0), "harness");
        op.next = NextAction::new(operation_type, TargetType::Inbox, OperationId(target));
        op
    }

    #[test]
    fn always_match_accepts_anything() {
        let guide = guide_send();
        assert!(AlwaysMatch.matches(&guide, &declaring(OperationType::Receive, 9)));
        assert_eq!(AlwaysMatch.name(), "always");
    }

    #[test]
    fn declared_action_checks_kind_and_target() {
        let guide = guide_send();
        assert!(DeclaredActionMatch.matches(&guide, &declaring(OperationType::Send, 2)));
        assert!(!DeclaredActionMatch.matches(&guide, &declaring(OperationType::Send, 3)));
        assert!(!DeclaredActionMatch.matches(&guide, &declaring(OperationType::Receive, 2)));
    }

    #[test]
    fn declared_action_matches_fresh_operation_start() {
        let mut model = ProgramModel::new();
        model.record_create(OperationId(0), OperationId(1));
        let start = model.record_start(OperationId(1), None);
        let guide = model.tree().get(start).unwrap().clone();
        let fresh = SchedulableOperation::new(OperationId(1), "worker");
        assert!(DeclaredActionMatch.matches(&guide, &fresh));
    }
}
