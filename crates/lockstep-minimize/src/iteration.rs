//! A cursor over a guide tree for one replay iteration.

use crate::matching::MatchPolicy;
use lockstep_core::{OperationId, SchedulableOperation};
use lockstep_model::{EventTree, ProgramStep, StepKind};
use log::{debug, warn};
use std::collections::BTreeSet;

/// Walks a guide [`EventTree`] in ordering order while a live run follows it.
///
/// The cursor tracks the next guide step to match, the guide step the
/// running operation is performing (the *active* node), and the set of
/// guide steps known to be deleted. Deleting a step deletes its direct and
/// created children as the cursor reaches them.
#[derive(Debug, Clone)]
pub struct TraceIteration {
    guide: EventTree,
    position: usize,
    active: Option<usize>,
    deleted: BTreeSet<usize>,
    critical_transition: Option<usize>,
}

impl TraceIteration {
    /// Start after the harness root. With a `critical_transition`, the
    /// guide counts as exhausted past that step.
    pub fn new(guide: EventTree, critical_transition: Option<usize>) -> Self {
        Self {
            guide,
            position: 1,
            active: Some(0),
            deleted: BTreeSet::new(),
            critical_transition,
        }
    }

    pub fn guide(&self) -> &EventTree {
        &self.guide
    }

    /// Next guide step to match.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Guide step the running operation is performing, if it matched one.
    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn active_step(&self) -> Option<&ProgramStep> {
        self.active.and_then(|i| self.guide.get(i))
    }

    pub fn critical_transition(&self) -> Option<usize> {
        self.critical_transition
    }

    pub fn is_deleted(&self, index: usize) -> bool {
        self.deleted.contains(&index)
    }

    pub fn delete(&mut self, index: usize) {
        self.deleted.insert(index);
    }

    pub fn reached_end(&self) -> bool {
        self.critical_transition.is_some_and(|ct| self.position > ct) || self.position >= self.guide.len()
    }

    /// Pick the enabled operation that performs the next guide step.
    ///
    /// Deleted steps and choice steps are passed over. A step whose source
    /// is not enabled is passed over too, without deleting its continuation,
    /// since the source may only be waiting for a message. If the policy rejects
    /// the match, the operation is still returned but the guide stays put.
    /// `None` means the guide is exhausted; nothing is active after that.
    pub fn next_operation(&mut self, choices: &[SchedulableOperation], policy: &dyn MatchPolicy) -> Option<OperationId> {
        while !self.reached_end() {
            let index = self.position;
            let step = &self.guide.steps()[index];

            if self.deleted.contains(&index) {
                self.inherit_deletion(index);
                self.position += 1;
                continue;
            }
            if step.kind.is_choice() {
                self.position += 1;
                continue;
            }

            let Some(candidate) = choices.iter().find(|op| op.is_enabled && op.id == step.source) else {
                debug!("guide step {} has no enabled operation; skipping", step);
                self.position += 1;
                continue;
            };

            if policy.matches(step, candidate) {
                self.active = Some(index);
                self.position += 1;
            } else {
                warn!(
                    "operation {} does not match guide step {} under the {} policy",
                    candidate.id,
                    step,
                    policy.name()
                );
                self.active = None;
            }
            return Some(candidate.id);
        }
        self.active = None;
        None
    }

    /// The guide's value for the running operation's next choice.
    ///
    /// Read from the active node's same-operation continuation, which
    /// becomes the new active node.
    pub fn next_choice(&mut self, boolean: bool) -> Option<StepKind> {
        let next = self.active_step()?.direct_child?;
        let kind = self.guide.get(next)?.kind;
        let fits = match kind {
            StepKind::NondetBool(_) => boolean,
            StepKind::NondetInt(_) => !boolean,
            _ => false,
        };
        if !fits || self.deleted.contains(&next) {
            return None;
        }
        self.active = Some(next);
        Some(kind)
    }

    fn inherit_deletion(&mut self, index: usize) {
        let step = &self.guide.steps()[index];
        let children: Vec<usize> = step.direct_child.into_iter().chain(step.created_child).collect();
        self.deleted.extend(children);
    }
}
