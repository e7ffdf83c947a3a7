//! A strategy wrapper that records the program model of every run.

use crate::error::ModelError;
use crate::model::{ProgramModel, ProgramModelSummary};
use lockstep_core::{
    Choice, Configuration, Delivery, EventInfo, IterationOutcome, OperationId, SchedulableOperation,
    SchedulingStrategy, StrategyError, TraceDump, TraceMetadata,
};

/// Wraps `S`, leaving every decision to it, and builds a [`ProgramModel`]
/// from the notification hooks.
///
/// After each run the model is condensed into a [`ProgramModelSummary`],
/// available from [`last_summary`](Self::last_summary) until the next run
/// ends.
pub struct ProgramModelStrategy<S> {
    inner: S,
    model: ProgramModel,
    last_summary: Option<ProgramModelSummary>,
}

impl<S: SchedulingStrategy> ProgramModelStrategy<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            model: ProgramModel::new(),
            last_summary: None,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Model of the run in progress.
    pub fn model(&self) -> &ProgramModel {
        &self.model
    }

    pub fn last_summary(&self) -> Option<&ProgramModelSummary> {
        self.last_summary.as_ref()
    }

    /// The last completed run as a mintrace.
    pub fn mintrace(&self, config: &Configuration) -> Result<Option<TraceDump>, ModelError> {
        let metadata = TraceMetadata::from_config(config, self.inner.is_fair());
        self.last_summary
            .as_ref()
            .map(|summary| summary.tree.to_mintrace(metadata))
            .transpose()
    }
}

impl<S: SchedulingStrategy> SchedulingStrategy for ProgramModelStrategy<S> {
    fn next_operation(
        &mut self,
        choices: &[SchedulableOperation],
        current: OperationId,
    ) -> Result<Option<OperationId>, StrategyError> {
        self.inner.next_operation(choices, current)
    }

    fn next_boolean_choice(&mut self, max_value: u32) -> Result<Option<bool>, StrategyError> {
        self.inner.next_boolean_choice(max_value)
    }

    fn next_integer_choice(&mut self, max_value: u32) -> Result<Option<u32>, StrategyError> {
        self.inner.next_integer_choice(max_value)
    }

    fn force_next(
        &mut self,
        next: OperationId,
        choices: &[SchedulableOperation],
        current: OperationId,
    ) -> Result<(), StrategyError> {
        self.inner.force_next(next, choices, current)
    }

    fn force_next_boolean_choice(&mut self, max_value: u32, value: bool) -> Result<(), StrategyError> {
        self.inner.force_next_boolean_choice(max_value, value)
    }

    fn force_next_integer_choice(&mut self, max_value: u32, value: u32) -> Result<(), StrategyError> {
        self.inner.force_next_integer_choice(max_value, value)
    }

    fn prepare_for_next_iteration(&mut self) -> Result<bool, StrategyError> {
        self.model = ProgramModel::new();
        self.inner.prepare_for_next_iteration()
    }

    fn reset(&mut self) {
        self.model = ProgramModel::new();
        self.inner.reset();
    }

    fn scheduled_steps(&self) -> usize {
        self.inner.scheduled_steps()
    }

    fn has_reached_max_scheduling_steps(&self) -> bool {
        self.inner.has_reached_max_scheduling_steps()
    }

    fn is_fair(&self) -> bool {
        self.inner.is_fair()
    }

    fn description(&self) -> String {
        format!("ProgramModel({})", self.inner.description())
    }

    fn on_create(&mut self, creator: OperationId, created: OperationId) {
        self.model.record_create(creator, created);
        self.inner.on_create(creator, created);
    }

    fn on_start(&mut self, operation: OperationId, initial: Option<&EventInfo>) {
        self.model.record_start(operation, initial);
        self.inner.on_start(operation, initial);
    }

    fn on_send(&mut self, sender: OperationId, target: OperationId, event: &EventInfo) -> Delivery {
        let step = self.model.record_send(sender, target, event);
        let delivery = self.inner.on_send(sender, target, event);
        if !delivery.is_delivered() {
            self.model.mark_withheld(step);
        }
        delivery
    }

    fn on_receive(&mut self, receiver: OperationId, event: &EventInfo) {
        self.model.record_receive(receiver, event);
        self.inner.on_receive(receiver, event);
    }

    fn on_choice(&mut self, operation: OperationId, choice: Choice) {
        self.model.record_choice(operation, choice);
        self.inner.on_choice(operation, choice);
    }

    fn on_monitor_state(&mut self, monitor: &str, sender: OperationId, hot: bool) {
        self.model.record_monitor_state(monitor, sender, hot);
        self.inner.on_monitor_state(monitor, sender, hot);
    }

    fn on_scheduling_ended(&mut self, outcome: &IterationOutcome) -> Result<(), StrategyError> {
        self.model.record_scheduling_ended(outcome.bug.as_ref());
        self.last_summary = Some(self.model.summary());
        self.inner.on_scheduling_ended(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepKind;
    use crate::tree::EventTree;
    use lockstep_core::{BugKind, BugReport, MessageId, RandomStrategy};

    /// Withholds every send, to observe the model's marking.
    struct DropAll(RandomStrategy);

    impl SchedulingStrategy for DropAll {
        fn next_operation(
            &mut self,
            choices: &[SchedulableOperation],
            current: OperationId,
        ) -> Result<Option<OperationId>, StrategyError> {
            self.0.next_operation(choices, current)
        }
        fn next_boolean_choice(&mut self, max_value: u32) -> Result<Option<bool>, StrategyError> {
            self.0.next_boolean_choice(max_value)
        }
        fn next_integer_choice(&mut self, max_value: u32) -> Result<Option<u32>, StrategyError> {
            self.0.next_integer_choice(max_value)
        }
        fn force_next(&mut self, _: OperationId, _: &[SchedulableOperation], _: OperationId) -> Result<(), StrategyError> {
            Err(StrategyError::Unsupported("force_next"))
        }
        fn force_next_boolean_choice(&mut self, _: u32, _: bool) -> Result<(), StrategyError> {
            Err(StrategyError::Unsupported("force_next_boolean_choice"))
        }
        fn force_next_integer_choice(&mut self, _: u32, _: u32) -> Result<(), StrategyError> {
            Err(StrategyError::Unsupported("force_next_integer_choice"))
        }
        fn prepare_for_next_iteration(&mut self) -> Result<bool, StrategyError> {
            self.0.prepare_for_next_iteration()
        }
        fn reset(&mut self) {
            self.0.reset()
        }
        fn scheduled_steps(&self) -> usize {
            self.0.scheduled_steps()
        }
        fn has_reached_max_scheduling_steps(&self) -> bool {
            false
        }
        fn is_fair(&self) -> bool {
            false
        }
        fn description(&self) -> String {
            "DropAll".into()
        }
        fn on_send(&mut self, _: OperationId, _: OperationId, _: &EventInfo) -> Delivery {
            Delivery::Withhold
        }
    }

    fn drive<S: SchedulingStrategy>(strategy: &mut ProgramModelStrategy<S>) {
        strategy.on_start(OperationId::HARNESS, None);
        strategy.on_create(OperationId(0), OperationId(1));
        strategy.on_start(OperationId(1), None);
        let ping = EventInfo::new("Ping").with_message_id(MessageId(1));
        strategy.on_send(OperationId(1), OperationId(0), &ping);
        strategy.on_choice(OperationId(0), Choice::Boolean(true));
    }

    #[test]
    fn records_hooks_into_model() {
        let mut strategy = ProgramModelStrategy::new(RandomStrategy::new(3, 0));
        drive(&mut strategy);
        let kinds: Vec<StepKind> = strategy.model().tree().iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StepKind::Start,
                StepKind::Create,
                StepKind::Start,
                StepKind::Send,
                StepKind::NondetBool(true)
            ]
        );
        assert!(strategy.model().tree().withheld().is_empty());
        assert_eq!(strategy.description(), "ProgramModel(Random[seed '3'])");
    }

    #[test]
    fn inner_withhold_marks_send() {
        let mut strategy = ProgramModelStrategy::new(DropAll(RandomStrategy::new(0, 0)));
        drive(&mut strategy);
        assert!(strategy.model().tree().is_withheld(3));
    }

    #[test]
    fn summary_survives_until_next_run() {
        let mut strategy = ProgramModelStrategy::new(RandomStrategy::new(0, 0));
        drive(&mut strategy);
        let outcome = IterationOutcome {
            bug: Some(BugReport::new(BugKind::Assertion, "boom")),
            ..Default::default()
        };
        strategy.on_scheduling_ended(&outcome).unwrap();
        assert!(strategy.prepare_for_next_iteration().unwrap());

        assert_eq!(strategy.model().num_steps(), 1);
        let summary = strategy.last_summary().unwrap();
        assert_eq!(summary.num_steps, 5);
        assert_eq!(summary.bug_triggering_step, Some(4));
    }

    #[test]
    fn mintrace_of_last_run() {
        let mut strategy = ProgramModelStrategy::new(RandomStrategy::new(0, 0));
        let config = Configuration::default();
        assert!(strategy.mintrace(&config).unwrap().is_none());

        drive(&mut strategy);
        strategy.on_scheduling_ended(&IterationOutcome::default()).unwrap();
        let dump = strategy.mintrace(&config).unwrap().unwrap();
        assert!(dump.metadata.fair_scheduling);
        let tree = EventTree::from_mintrace(&dump).unwrap();
        assert_eq!(tree.len(), 5);
    }
}
