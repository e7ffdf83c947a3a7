//! The trace editor: delta-debugging over withheld sends, then a binary
//! search for the critical transition.
//!
//! # Phases
//!
//! ```text
//! Initial ─┬─► ScheduleTraceReplay ──► MinimizedTraceReplay{then: TraceEdit}
//!          └───────────────────────────────────────┘ (mintrace input)
//!                                                   │
//!                        ┌──────────────────────────┘
//!                        ▼
//!                  TraceEdit{range} ⇄ (one trial per range)
//!                        │ stack empty
//!                        ├──► MinimizedTraceReplay{then: CriticalTransitionSearch}
//!                        │          │
//!                        │          ▼
//!                        │    CriticalTransitionSearch{left, right} ⇄
//!                        ▼          │ left == right
//!                  EpochCompleted ◄─┘
//! ```
//!
//! Every iteration ends with one oracle answer, "did the run reproduce the
//! bug", and [`TraceEditor::on_iteration_end`] moves the machine forward.
//! Outside the critical-transition search, a reproducing run becomes the
//! new best guide tree.

use crate::iteration::TraceIteration;
use crate::matching::{AlwaysMatch, MatchPolicy};
use lockstep_core::{BugKind, Delivery, EventInfo, OperationId, SchedulableOperation, StrategyError};
use lockstep_model::{EventTree, StepKind};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// How the first withhold ranges are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithholdSearch {
    /// One trial per droppable send, in order.
    #[default]
    Linear,
    /// Start with every droppable send at once and split on failure.
    Bisect,
}

/// Settings for a minimization session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimizationConfig {
    /// Event names whose sends may be withheld.
    pub droppable_events: BTreeSet<String>,
    /// Initial withhold-range layout.
    pub withhold_search: WithholdSearch,
    /// Search for the critical transition after editing.
    pub find_critical_transition: bool,
    /// Consecutive reproductions required to accept a candidate.
    pub replays_per_candidate: usize,
}

impl Default for MinimizationConfig {
    fn default() -> Self {
        Self {
            droppable_events: BTreeSet::new(),
            withhold_search: WithholdSearch::Linear,
            find_critical_transition: true,
            replays_per_candidate: 1,
        }
    }
}

impl MinimizationConfig {
    pub fn with_droppable<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.droppable_events.extend(events.into_iter().map(Into::into));
        self
    }

    pub fn with_withhold_search(mut self, search: WithholdSearch) -> Self {
        self.withhold_search = search;
        self
    }

    pub fn is_droppable(&self, name: &str) -> bool {
        self.droppable_events.contains(name)
    }
}

/// What a minimized-trace replay leads into once it reproduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextSearch {
    TraceEdit,
    CriticalTransitionSearch,
}

/// Editor state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Initial,
    /// Replaying the raw schedule to build the first event tree.
    ScheduleTraceReplay,
    /// Replaying the best tree exactly.
    MinimizedTraceReplay { then: NextSearch },
    /// Trying to withhold the droppable sends with ordinals in `range`
    /// (1-based, inclusive).
    TraceEdit { range: (usize, usize) },
    /// Binary search over guide step indices.
    CriticalTransitionSearch { left: usize, right: usize },
    EpochCompleted { critical_transition: Option<usize> },
}

impl Phase {
    /// Whether runs in this phase follow a guide tree.
    pub fn is_guided(&self) -> bool {
        matches!(
            self,
            Phase::MinimizedTraceReplay { .. } | Phase::TraceEdit { .. } | Phase::CriticalTransitionSearch { .. }
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Initial => f.write_str("initial"),
            Phase::ScheduleTraceReplay => f.write_str("schedule-trace replay"),
            Phase::MinimizedTraceReplay { .. } => f.write_str("minimized-trace replay"),
            Phase::TraceEdit { range: (start, end) } => write!(f, "trace edit [{}, {}]", start, end),
            Phase::CriticalTransitionSearch { left, right } => {
                write!(f, "critical-transition search [{}, {}]", left, right)
            }
            Phase::EpochCompleted { .. } => f.write_str("epoch completed"),
        }
    }
}

/// One finished withhold trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditTrial {
    pub range: (usize, usize),
    pub reproduced: bool,
}

/// Plans replay iterations and folds their results.
pub struct TraceEditor {
    config: MinimizationConfig,
    policy: Box<dyn MatchPolicy>,
    phase: Phase,
    best: Option<EventTree>,
    /// Bug the first reproducing run found; later runs must find the same kind.
    target: Option<BugKind>,
    stack: Vec<(usize, usize)>,
    candidates: usize,
    cursor: Option<TraceIteration>,
    droppable_seen: usize,
    confirmations: usize,
    iterations: usize,
    edit_trials: Vec<EditTrial>,
    search_trials: usize,
}

impl TraceEditor {
    pub fn new(config: MinimizationConfig) -> Self {
        Self {
            config,
            policy: Box::new(AlwaysMatch),
            phase: Phase::Initial,
            best: None,
            target: None,
            stack: Vec::new(),
            candidates: 0,
            cursor: None,
            droppable_seen: 0,
            confirmations: 0,
            iterations: 0,
            edit_trials: Vec::new(),
            search_trials: 0,
        }
    }

    pub fn with_match_policy(mut self, policy: Box<dyn MatchPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Begin from a flat schedule, which must be replayed first.
    pub fn start_from_schedule(&mut self) {
        self.transition(Phase::ScheduleTraceReplay);
    }

    /// Begin from a known event tree.
    pub fn start_from_tree(&mut self, tree: EventTree) {
        self.best = Some(tree);
        self.transition(Phase::MinimizedTraceReplay {
            then: NextSearch::TraceEdit,
        });
    }

    pub fn config(&self) -> &MinimizationConfig {
        &self.config
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn best(&self) -> Option<&EventTree> {
        self.best.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.phase, Phase::EpochCompleted { .. })
    }

    pub fn critical_transition(&self) -> Option<usize> {
        match self.phase {
            Phase::EpochCompleted { critical_transition } => critical_transition,
            _ => None,
        }
    }

    /// Cutoff of the current critical-transition trial.
    pub fn cutoff(&self) -> Option<usize> {
        match self.phase {
            Phase::CriticalTransitionSearch { left, right } => Some(left + (right - left) / 2),
            _ => None,
        }
    }

    /// Number of droppable sends in the tree being edited.
    pub fn withhold_candidates(&self) -> usize {
        self.candidates
    }

    /// Iterations whose results have been folded in.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn edit_trials(&self) -> &[EditTrial] {
        &self.edit_trials
    }

    /// Critical-transition trials run so far.
    pub fn search_trials(&self) -> usize {
        self.search_trials
    }

    pub fn cursor(&self) -> Option<&TraceIteration> {
        self.cursor.as_ref()
    }

    // ── Per-iteration decisions ─────────────────────────────────────────

    /// Set up the guide cursor for the next run.
    pub fn begin_iteration(&mut self) {
        self.droppable_seen = 0;
        self.cursor = match (&self.phase, &self.best) {
            (phase, Some(best)) if phase.is_guided() => Some(TraceIteration::new(best.clone(), self.cutoff())),
            _ => None,
        };
    }

    /// Next operation along the guide. `None` once the guide is exhausted.
    pub fn next_operation(&mut self, choices: &[SchedulableOperation]) -> Option<OperationId> {
        let cursor = self.cursor.as_mut()?;
        cursor.next_operation(choices, self.policy.as_ref())
    }

    pub fn next_boolean_choice(&mut self) -> Option<bool> {
        match self.cursor.as_mut()?.next_choice(true)? {
            StepKind::NondetBool(value) => Some(value),
            _ => None,
        }
    }

    /// The guide's integer for the running operation. A guide value that
    /// does not fit `max_value` means the guide is unusable.
    pub fn next_integer_choice(&mut self, max_value: u32) -> Result<Option<u32>, StrategyError> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        match cursor.next_choice(false) {
            Some(StepKind::NondetInt(value)) if value >= max_value.max(1) => {
                Err(StrategyError::ChoiceOutOfRange { value, max_value })
            }
            Some(StepKind::NondetInt(value)) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    /// Decide delivery of a send the running operation is performing.
    ///
    /// Once the guide is exhausted every send is delivered and no longer
    /// counts toward the droppable ordinals.
    pub fn on_send(&mut self, event: &EventInfo) -> Delivery {
        let Some(cursor) = self.cursor.as_mut() else {
            return Delivery::Deliver;
        };
        let guide_send = cursor
            .active_step()
            .filter(|step| step.kind == StepKind::Send)
            .map(|step| (step.index, step.created_child));
        let guide_withheld = guide_send.is_some_and(|(index, _)| cursor.guide().is_withheld(index));

        if cursor.reached_end() && guide_send.is_none() {
            return Delivery::Deliver;
        }

        let mut in_range = false;
        if self.config.is_droppable(&event.name) {
            self.droppable_seen += 1;
            if let Phase::TraceEdit { range: (start, end) } = self.phase {
                in_range = (start..=end).contains(&self.droppable_seen);
            }
        }

        if !(guide_withheld || in_range) {
            return Delivery::Deliver;
        }
        if let Some((_, Some(receive))) = guide_send {
            cursor.delete(receive);
        }
        debug!("withholding {} (droppable send #{})", event, self.droppable_seen);
        Delivery::Withhold
    }

    // ── Iteration results ───────────────────────────────────────────────

    /// Fold one run's result into the search.
    ///
    /// `tree` is the run's program model; `bug` the bug it found.
    pub fn on_iteration_end(&mut self, bug: Option<&BugKind>, tree: EventTree) -> Result<(), StrategyError> {
        self.iterations += 1;
        self.cursor = None;
        let reproduced = match (&self.target, bug) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(target), Some(kind)) => target == kind,
        };

        match self.phase.clone() {
            Phase::Initial => Err(StrategyError::Other("trace editor was never started".into())),
            Phase::ScheduleTraceReplay => {
                if !reproduced {
                    return Err(StrategyError::NotReproducible(
                        "replaying the schedule trace did not find the bug".into(),
                    ));
                }
                self.accept(bug, tree);
                self.transition(Phase::MinimizedTraceReplay {
                    then: NextSearch::TraceEdit,
                });
                Ok(())
            }
            Phase::MinimizedTraceReplay { then } => {
                if !reproduced {
                    return Err(StrategyError::NotReproducible(
                        "replaying the event tree did not find the bug".into(),
                    ));
                }
                self.accept(bug, tree);
                match then {
                    NextSearch::TraceEdit => self.start_edit(),
                    NextSearch::CriticalTransitionSearch => self.start_search(),
                }
                Ok(())
            }
            Phase::TraceEdit { range } => {
                self.finish_edit_trial(range, reproduced, bug, tree);
                Ok(())
            }
            Phase::CriticalTransitionSearch { left, right } => {
                self.search_trials += 1;
                let mid = left + (right - left) / 2;
                // Indices refer to the best tree, which stays fixed here.
                let (left, right) = if reproduced { (left, mid) } else { (mid + 1, right) };
                debug!("critical transition cutoff {} reproduced: {}", mid, reproduced);
                self.continue_search(left, right);
                Ok(())
            }
            Phase::EpochCompleted { .. } => Ok(()),
        }
    }

    fn accept(&mut self, bug: Option<&BugKind>, tree: EventTree) {
        if self.target.is_none() {
            self.target = bug.cloned();
        }
        self.best = Some(tree);
    }

    fn start_edit(&mut self) {
        let candidates = self.best.as_ref().map_or(0, |best| {
            best.iter()
                .filter(|step| step.kind == StepKind::Send)
                .filter(|step| step.event_name().is_some_and(|name| self.config.is_droppable(name)))
                .count()
        });
        self.candidates = candidates;
        self.stack.clear();
        if candidates > 0 {
            match self.config.withhold_search {
                WithholdSearch::Linear => self.stack.extend((1..=candidates).rev().map(|i| (i, i))),
                WithholdSearch::Bisect => self.stack.push((1, candidates)),
            }
        }
        info!("trace edit over {} droppable send(s)", candidates);
        self.next_edit_trial();
    }

    fn finish_edit_trial(&mut self, range: (usize, usize), reproduced: bool, bug: Option<&BugKind>, tree: EventTree) {
        if reproduced {
            self.confirmations += 1;
            if self.confirmations < self.config.replays_per_candidate.max(1) {
                debug!("range {:?} reproduced {} time(s), confirming", range, self.confirmations);
                return;
            }
            self.confirmations = 0;
            self.edit_trials.push(EditTrial { range, reproduced });
            info!("withholding sends {:?} still reproduces the bug", range);
            self.accept(bug, tree);
        } else {
            self.confirmations = 0;
            self.edit_trials.push(EditTrial { range, reproduced });
            let (start, end) = range;
            if start < end {
                let mid = start + (end - start) / 2;
                self.stack.push((mid + 1, end));
                self.stack.push((start, mid));
            }
        }
        self.next_edit_trial();
    }

    fn next_edit_trial(&mut self) {
        match self.stack.pop() {
            Some(range) => self.transition(Phase::TraceEdit { range }),
            None if self.config.find_critical_transition => self.transition(Phase::MinimizedTraceReplay {
                then: NextSearch::CriticalTransitionSearch,
            }),
            None => self.transition(Phase::EpochCompleted {
                critical_transition: None,
            }),
        }
    }

    fn start_search(&mut self) {
        let last = self.best.as_ref().map_or(0, EventTree::last_index);
        self.continue_search(0, last);
    }

    fn continue_search(&mut self, left: usize, right: usize) {
        if left >= right {
            info!("critical transition at step {}", left);
            self.transition(Phase::EpochCompleted {
                critical_transition: Some(left),
            });
        } else {
            self.transition(Phase::CriticalTransitionSearch { left, right });
        }
    }

    fn transition(&mut self, next: Phase) {
        if std::mem::discriminant(&self.phase) != std::mem::discriminant(&next) {
            info!("trace editor: {} → {}", self.phase, next);
        }
        self.phase = next;
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
