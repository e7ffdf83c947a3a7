//! Exact replay of a recorded schedule.
//!
//! [`ReplayStrategy`] walks a [`ScheduleTrace`] entry by entry. Any
//! divergence between the trace and the live run (the expected operation is
//! not enabled, or a choice arrives where the trace recorded a scheduling
//! decision) is a [`StrategyError::ReplayMismatch`], which ends the session.
//!
//! Once the trace is exhausted, an optional suffix strategy takes over so
//! exploration can continue past the recorded prefix.

use crate::error::StrategyError;
use crate::operation::{OperationId, SchedulableOperation};
use crate::strategy::SchedulingStrategy;
use crate::trace::{ScheduleStep, ScheduleTrace};
use log::debug;

/// Strategy that reproduces a recorded schedule.
pub struct ReplayStrategy {
    trace: ScheduleTrace,
    /// Index of the next trace entry.
    steps: usize,
    /// Whether the recorded run was fair.
    fair: bool,
    suffix: Option<Box<dyn SchedulingStrategy>>,
    /// Set once control has passed to the suffix strategy.
    replay_completed: bool,
}

impl ReplayStrategy {
    pub fn new(trace: ScheduleTrace, fair: bool) -> Self {
        Self {
            trace,
            steps: 0,
            fair,
            suffix: None,
            replay_completed: false,
        }
    }

    /// Continue with `suffix` after the trace is exhausted.
    pub fn with_suffix(mut self, suffix: Box<dyn SchedulingStrategy>) -> Self {
        self.suffix = Some(suffix);
        self
    }

    pub fn trace(&self) -> &ScheduleTrace {
        &self.trace
    }

    /// Whether the recorded prefix has been fully consumed.
    pub fn is_replay_completed(&self) -> bool {
        self.replay_completed || self.steps >= self.trace.len()
    }

    /// Next trace entry, or `None` if control passed to the suffix.
    fn next_entry(
        &mut self,
        wants_scheduling: bool,
        anything_enabled: bool,
    ) -> Result<Option<ScheduleStep>, StrategyError> {
        if self.replay_completed {
            return Ok(None);
        }
        if self.steps >= self.trace.len() {
            if self.suffix.is_some() {
                debug!("replay exhausted after {} steps, switching to suffix", self.steps);
                self.replay_completed = true;
                return Ok(None);
            }
            if wants_scheduling && !anything_enabled {
                // The recorded run terminated here too.
                return Ok(None);
            }
            return Err(StrategyError::TraceExhausted {
                length: self.trace.len(),
            });
        }
        let step = self.steps;
        self.steps += 1;
        Ok(self.trace.get(step).cloned())
    }

    fn mismatch(&self, reason: String) -> StrategyError {
        StrategyError::ReplayMismatch {
            step: self.steps.saturating_sub(1),
            reason,
        }
    }

    fn suffix_mut(&mut self) -> Result<&mut Box<dyn SchedulingStrategy>, StrategyError> {
        self.suffix
            .as_mut()
            .ok_or(StrategyError::TraceExhausted { length: self.trace.len() })
    }
}

impl SchedulingStrategy for ReplayStrategy {
    fn next_operation(
        &mut self,
        choices: &[SchedulableOperation],
        current: OperationId,
    ) -> Result<Option<OperationId>, StrategyError> {
        let anything_enabled = choices.iter().any(|op| op.is_enabled);
        let expected = match self.next_entry(true, anything_enabled)? {
            Some(ScheduleStep::SchedulingChoice(id)) => id,
            Some(other) => {
                let reason = format!("expected a scheduling choice, trace has '{}'", other);
                return Err(self.mismatch(reason));
            }
            None if self.replay_completed => return self.suffix_mut()?.next_operation(choices, current),
            None => return Ok(None),
        };

        match choices.iter().find(|op| op.id == expected) {
            Some(op) if op.is_enabled => Ok(Some(expected)),
            Some(_) => Err(self.mismatch(format!("expected operation {} is not enabled", expected))),
            None => Err(self.mismatch(format!("expected operation {} does not exist", expected))),
        }
    }

    fn next_boolean_choice(&mut self, max_value: u32) -> Result<Option<bool>, StrategyError> {
        match self.next_entry(false, true)? {
            Some(ScheduleStep::BooleanChoice(value)) | Some(ScheduleStep::FairBooleanChoice(_, value)) => {
                Ok(Some(value))
            }
            Some(other) => {
                let reason = format!("expected a boolean choice, trace has '{}'", other);
                Err(self.mismatch(reason))
            }
            None => self.suffix_mut()?.next_boolean_choice(max_value),
        }
    }

    fn next_integer_choice(&mut self, max_value: u32) -> Result<Option<u32>, StrategyError> {
        match self.next_entry(false, true)? {
            Some(ScheduleStep::IntegerChoice(value)) => Ok(Some(value)),
            Some(other) => {
                let reason = format!("expected an integer choice, trace has '{}'", other);
                Err(self.mismatch(reason))
            }
            None => self.suffix_mut()?.next_integer_choice(max_value),
        }
    }

    fn force_next(
        &mut self,
        next: OperationId,
        choices: &[SchedulableOperation],
        current: OperationId,
    ) -> Result<(), StrategyError> {
        match self.next_entry(true, true)? {
            Some(ScheduleStep::SchedulingChoice(id)) if id == next => Ok(()),
            Some(other) => {
                let reason = format!("forced operation {} but trace has '{}'", next, other);
                Err(self.mismatch(reason))
            }
            None => self.suffix_mut()?.force_next(next, choices, current),
        }
    }

    fn force_next_boolean_choice(&mut self, max_value: u32, value: bool) -> Result<(), StrategyError> {
        match self.next_entry(false, true)? {
            Some(ScheduleStep::BooleanChoice(v)) | Some(ScheduleStep::FairBooleanChoice(_, v)) if v == value => {
                Ok(())
            }
            Some(other) => {
                let reason = format!("forced boolean {} but trace has '{}'", value, other);
                Err(self.mismatch(reason))
            }
            None => self.suffix_mut()?.force_next_boolean_choice(max_value, value),
        }
    }

    fn force_next_integer_choice(&mut self, max_value: u32, value: u32) -> Result<(), StrategyError> {
        match self.next_entry(false, true)? {
            Some(ScheduleStep::IntegerChoice(v)) if v == value => Ok(()),
            Some(other) => {
                let reason = format!("forced integer {} but trace has '{}'", value, other);
                Err(self.mismatch(reason))
            }
            None => self.suffix_mut()?.force_next_integer_choice(max_value, value),
        }
    }

    fn prepare_for_next_iteration(&mut self) -> Result<bool, StrategyError> {
        self.steps = 0;
        self.replay_completed = false;
        match self.suffix.as_mut() {
            Some(suffix) => suffix.prepare_for_next_iteration(),
            // A bare replay has exactly one schedule to explore.
            None => Ok(false),
        }
    }

    fn reset(&mut self) {
        self.steps = 0;
        self.replay_completed = false;
        if let Some(suffix) = self.suffix.as_mut() {
            suffix.reset();
        }
    }

    fn scheduled_steps(&self) -> usize {
        let suffix_steps = if self.replay_completed {
            self.suffix.as_ref().map_or(0, |s| s.scheduled_steps())
        } else {
            0
        };
        self.steps + suffix_steps
    }

    fn has_reached_max_scheduling_steps(&self) -> bool {
        self.replay_completed
            && self
                .suffix
                .as_ref()
                .is_some_and(|s| s.has_reached_max_scheduling_steps())
    }

    fn is_fair(&self) -> bool {
        self.fair
    }

    fn description(&self) -> String {
        match &self.suffix {
            Some(suffix) => format!("Replay({})", suffix.description()),
            None => "Replay".to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
