//! The scheduling-strategy contract.
//!
//! A strategy is the decision function the scheduler consults at every
//! scheduling point and every nondeterministic choice. Strategies are
//! driven from exactly one thread at a time (the active operation), so
//! implementations hold plain mutable state.
//!
//! The `on_*` hooks receive the runtime's notification stream. Plain
//! exploration strategies ignore them; program-aware strategies use them to
//! reconstruct the run as an event tree, and the minimizer uses
//! [`on_send`](SchedulingStrategy::on_send) to withhold deliveries.

use crate::error::StrategyError;
use crate::event::{Choice, Delivery, EventInfo};
use crate::operation::{OperationId, SchedulableOperation};
use crate::outcome::IterationOutcome;

/// Decision policy consulted by the scheduler.
pub trait SchedulingStrategy: Send {
    /// Choose the next operation among the enabled entries of `choices`.
    ///
    /// `Ok(None)` means this iteration's choices are exhausted.
    fn next_operation(
        &mut self,
        choices: &[SchedulableOperation],
        current: OperationId,
    ) -> Result<Option<OperationId>, StrategyError>;

    /// Next nondeterministic boolean. `Ok(None)` ends the iteration.
    fn next_boolean_choice(&mut self, max_value: u32) -> Result<Option<bool>, StrategyError>;

    /// Next nondeterministic integer in `0..max_value`. `Ok(None)` ends the iteration.
    fn next_integer_choice(&mut self, max_value: u32) -> Result<Option<u32>, StrategyError>;

    /// Make `next` the decision for the current step, as if this strategy had chosen it.
    fn force_next(
        &mut self,
        next: OperationId,
        choices: &[SchedulableOperation],
        current: OperationId,
    ) -> Result<(), StrategyError>;

    fn force_next_boolean_choice(&mut self, max_value: u32, value: bool) -> Result<(), StrategyError>;

    fn force_next_integer_choice(&mut self, max_value: u32, value: u32) -> Result<(), StrategyError>;

    /// Called between iterations. Returns `false` once the search space is exhausted.
    fn prepare_for_next_iteration(&mut self) -> Result<bool, StrategyError>;

    /// Clear per-iteration state, keeping cross-iteration state.
    fn reset(&mut self);

    /// Steps scheduled in the current iteration.
    fn scheduled_steps(&self) -> usize;

    fn has_reached_max_scheduling_steps(&self) -> bool;

    /// Whether every enabled operation is eventually scheduled.
    fn is_fair(&self) -> bool;

    fn description(&self) -> String;

    // ── Program notifications ───────────────────────────────────────────

    fn on_create(&mut self, _creator: OperationId, _created: OperationId) {}

    fn on_start(&mut self, _operation: OperationId, _initial: Option<&EventInfo>) {}

    /// A send is about to be enqueued. The return value decides delivery.
    fn on_send(&mut self, _sender: OperationId, _target: OperationId, _event: &EventInfo) -> Delivery {
        Delivery::Deliver
    }

    fn on_receive(&mut self, _receiver: OperationId, _event: &EventInfo) {}

    /// A nondeterministic value was handed to `operation`.
    fn on_choice(&mut self, _operation: OperationId, _choice: Choice) {}

    fn on_monitor_state(&mut self, _monitor: &str, _sender: OperationId, _hot: bool) {}

    /// The run is over; called once before [`prepare_for_next_iteration`](Self::prepare_for_next_iteration).
    fn on_scheduling_ended(&mut self, _outcome: &IterationOutcome) -> Result<(), StrategyError> {
        Ok(())
    }
}

impl<S: SchedulingStrategy + ?Sized> SchedulingStrategy for Box<S> {
    fn next_operation(
        &mut self,
        choices: &[SchedulableOperation],
        current: OperationId,
    ) -> Result<Option<OperationId>, StrategyError> {
        (**self).next_operation(choices, current)
    }

    fn next_boolean_choice(&mut self, max_value: u32) -> Result<Option<bool>, StrategyError> {
        (**self).next_boolean_choice(max_value)
    }

    fn next_integer_choice(&mut self, max_value: u32) -> Result<Option<u32>, StrategyError> {
        (**self).next_integer_choice(max_value)
    }

    fn force_next(
        &mut self,
        next: OperationId,
        choices: &[SchedulableOperation],
        current: OperationId,
    ) -> Result<(), StrategyError> {
        (**self).force_next(next, choices, current)
    }

    fn force_next_boolean_choice(&mut self, max_value: u32, value: bool) -> Result<(), StrategyError> {
        (**self).force_next_boolean_choice(max_value, value)
    }

    fn force_next_integer_choice(&mut self, max_value: u32, value: u32) -> Result<(), StrategyError> {
        (**self).force_next_integer_choice(max_value, value)
    }

    fn prepare_for_next_iteration(&mut self) -> Result<bool, StrategyError> {
        (**self).prepare_for_next_iteration()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn scheduled_steps(&self) -> usize {
        (**self).scheduled_steps()
    }

    fn has_reached_max_scheduling_steps(&self) -> bool {
        (**self).has_reached_max_scheduling_steps()
    }

    fn is_fair(&self) -> bool {
        (**self).is_fair()
    }

    fn description(&self) -> String {
        (**self).description()
    }

    fn on_create(&mut self, creator: OperationId, created: OperationId) {
        (**self).on_create(creator, created)
    }

    fn on_start(&mut self, operation: OperationId, initial: Option<&EventInfo>) {
        (**self).on_start(operation, initial)
    }

    fn on_send(&mut self, sender: OperationId, target: OperationId, event: &EventInfo) -> Delivery {
        (**self).on_send(sender, target, event)
    }

    fn on_receive(&mut self, receiver: OperationId, event: &EventInfo) {
        (**self).on_receive(receiver, event)
    }

    fn on_choice(&mut self, operation: OperationId, choice: Choice) {
        (**self).on_choice(operation, choice)
    }

    fn on_monitor_state(&mut self, monitor: &str, sender: OperationId, hot: bool) {
        (**self).on_monitor_state(monitor, sender, hot)
    }

    fn on_scheduling_ended(&mut self, outcome: &IterationOutcome) -> Result<(), StrategyError> {
        (**self).on_scheduling_ended(outcome)
    }
}
