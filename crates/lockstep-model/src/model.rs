//! Program-model accumulation.
//!
//! A [`ProgramModel`] turns the runtime's linear notification stream into
//! an [`EventTree`]. Each notification appends one step and links it:
//!
//! - to the previous step of the same operation (`direct_child`);
//! - for a created operation's start, from the create step (`created_child`);
//! - for a receive, from the send of the same message (`created_child`).
//!
//! Monitor notifications do not add steps; they only track which monitors
//! are hot and since when.

use crate::step::{ProgramStep, StepKind, StepSignature};
use crate::tree::EventTree;
use lockstep_core::{BugKind, BugReport, Choice, EventInfo, MessageId, OperationId};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Condensed result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramModelSummary {
    #[serde(skip)]
    pub tree: EventTree,
    pub withheld_sends: Vec<usize>,
    pub bug_triggering_step: Option<usize>,
    pub liveness_monitor: Option<String>,
    pub num_steps: usize,
    pub is_liveness_bug: bool,
}

/// Live accumulator for one run's program model.
#[derive(Debug, Clone)]
pub struct ProgramModel {
    tree: EventTree,
    /// Latest step of every operation seen so far.
    latest: HashMap<OperationId, usize>,
    /// Create steps whose operation has not started yet, by created id.
    pending_creates: HashMap<OperationId, usize>,
    /// Delivered sends not yet received, by message id.
    pending_sends: HashMap<MessageId, usize>,
    occurrences: HashMap<(&'static str, Option<String>), usize>,
    /// Hot monitors and the step at which each became hot.
    hot_monitors: BTreeMap<String, usize>,
}

impl Default for ProgramModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramModel {
    pub fn new() -> Self {
        let mut latest = HashMap::new();
        latest.insert(OperationId::HARNESS, 0);
        Self {
            tree: EventTree::new(),
            latest,
            pending_creates: HashMap::new(),
            pending_sends: HashMap::new(),
            occurrences: HashMap::new(),
            hot_monitors: BTreeMap::new(),
        }
    }

    pub fn tree(&self) -> &EventTree {
        &self.tree
    }

    pub fn into_tree(self) -> EventTree {
        self.tree
    }

    pub fn num_steps(&self) -> usize {
        self.tree.len()
    }

    pub fn last_step(&self) -> usize {
        self.tree.last_index()
    }

    pub fn latest_step_of(&self, operation: OperationId) -> Option<usize> {
        self.latest.get(&operation).copied()
    }

    pub fn record_create(&mut self, creator: OperationId, created: OperationId) -> usize {
        let index = self.append(StepKind::Create, creator, created, None);
        self.pending_creates.insert(created, index);
        index
    }

    /// First step of `operation`. The harness start is the root and is
    /// never recorded twice.
    pub fn record_start(&mut self, operation: OperationId, initial: Option<&EventInfo>) -> usize {
        if operation == OperationId::HARNESS {
            return 0;
        }
        let index = self.append(StepKind::Start, operation, operation, initial.cloned());
        match self.pending_creates.remove(&operation) {
            Some(create) => self.tree.steps[create].created_child = Some(index),
            None => debug!("operation {} started without a recorded create", operation),
        }
        index
    }

    pub fn record_send(&mut self, sender: OperationId, target: OperationId, event: &EventInfo) -> usize {
        let index = self.append(StepKind::Send, sender, target, Some(event.clone()));
        if let Some(id) = event.message_id {
            self.pending_sends.insert(id, index);
        }
        index
    }

    pub fn record_receive(&mut self, receiver: OperationId, event: &EventInfo) -> usize {
        let index = self.append(StepKind::Receive, receiver, receiver, Some(event.clone()));
        if let Some(send) = event.message_id.and_then(|id| self.pending_sends.remove(&id)) {
            self.tree.steps[send].created_child = Some(index);
        }
        index
    }

    pub fn record_choice(&mut self, operation: OperationId, choice: Choice) -> usize {
        self.append(StepKind::from_choice(choice), operation, operation, None)
    }

    pub fn record_monitor_state(&mut self, monitor: &str, sender: OperationId, hot: bool) {
        if hot {
            let since = self.latest_step_of(sender).unwrap_or_else(|| self.last_step());
            self.hot_monitors.entry(monitor.to_string()).or_insert(since);
        } else {
            self.hot_monitors.remove(monitor);
        }
    }

    /// Mark a recorded send as withheld. Its message will never be received.
    pub fn mark_withheld(&mut self, send: usize) {
        match self.tree.steps.get(send) {
            Some(step) if step.kind == StepKind::Send => {
                if let Some(id) = step.event.as_ref().and_then(|e| e.message_id) {
                    self.pending_sends.remove(&id);
                }
                self.tree.withheld.insert(send);
            }
            _ => warn!("cannot withhold step {}: not a send", send),
        }
    }

    /// Record the run's result.
    ///
    /// An assertion-style bug is attributed to the last step. A liveness
    /// bug is attributed to the step at which its monitor became hot.
    pub fn record_scheduling_ended(&mut self, bug: Option<&BugReport>) {
        let Some(bug) = bug else {
            return;
        };
        let step = match &bug.kind {
            BugKind::Liveness { monitor } => {
                self.tree.liveness_monitor = Some(monitor.clone());
                self.hot_monitors.get(monitor).copied().unwrap_or_else(|| self.last_step())
            }
            _ => self.last_step(),
        };
        self.tree.set_bug(Some(step));
    }

    pub fn summary(&self) -> ProgramModelSummary {
        let tree = self.tree.clone();
        ProgramModelSummary {
            withheld_sends: tree.withheld().iter().copied().collect(),
            bug_triggering_step: tree.bug_step(),
            liveness_monitor: tree.liveness_monitor().map(str::to_string),
            num_steps: tree.len(),
            is_liveness_bug: tree.liveness_monitor().is_some(),
            tree,
        }
    }

    fn append(
        &mut self,
        kind: StepKind,
        source: OperationId,
        target: OperationId,
        event: Option<EventInfo>,
    ) -> usize {
        let index = self.tree.steps.len();
        let event_name = event.as_ref().map(|e| e.name.clone());
        let occurrence = self.occurrences.entry((kind.label(), event_name.clone())).or_insert(0);
        let event_index = *occurrence;
        *occurrence += 1;

        if let Some(previous) = self.latest.insert(source, index) {
            self.tree.steps[previous].direct_child = Some(index);
        }
        self.tree.steps.push(ProgramStep {
            index,
            kind,
            source,
            target,
            event,
            direct_child: None,
            created_child: None,
            signature: StepSignature {
                event_name,
                event_index,
                index,
                source,
                kind,
            },
        });
        index
    }
}
