//! Seeded random exploration.
//!
//! [`RandomStrategy`] picks uniformly among the enabled operations using a
//! ChaCha8 stream. The stream keeps advancing across iterations, so each
//! iteration explores a different interleaving while the whole session
//! stays reproducible from the seed.

use crate::config::Configuration;
use crate::error::StrategyError;
use crate::operation::{OperationId, SchedulableOperation};
use crate::strategy::SchedulingStrategy;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Uniform random strategy.
#[derive(Debug, Clone)]
pub struct RandomStrategy {
    seed: u64,
    rng: ChaCha8Rng,
    /// Step bound (0 = unbounded).
    max_steps: usize,
    steps: usize,
}

impl RandomStrategy {
    pub fn new(seed: u64, max_steps: usize) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            max_steps,
            steps: 0,
        }
    }

    /// Random strategy using the configured seed and fair step bound.
    pub fn from_config(config: &Configuration) -> Self {
        Self::new(config.random_seed, config.step_bound(true))
    }
}

impl SchedulingStrategy for RandomStrategy {
    fn next_operation(
        &mut self,
        choices: &[SchedulableOperation],
        _current: OperationId,
    ) -> Result<Option<OperationId>, StrategyError> {
        let enabled: Vec<&SchedulableOperation> = choices.iter().filter(|op| op.is_enabled).collect();
        if enabled.is_empty() {
            return Ok(None);
        }
        let pick = self.rng.gen_range(0..enabled.len());
        self.steps += 1;
        Ok(Some(enabled[pick].id))
    }

    fn next_boolean_choice(&mut self, max_value: u32) -> Result<Option<bool>, StrategyError> {
        // `max_value` is the inverse probability of `true`.
        let value = self.rng.gen_range(0..max_value.max(2)) == 0;
        self.steps += 1;
        Ok(Some(value))
    }

    fn next_integer_choice(&mut self, max_value: u32) -> Result<Option<u32>, StrategyError> {
        let value = if max_value == 0 {
            0
        } else {
            self.rng.gen_range(0..max_value)
        };
        self.steps += 1;
        Ok(Some(value))
    }

    fn force_next(
        &mut self,
        _next: OperationId,
        _choices: &[SchedulableOperation],
        _current: OperationId,
    ) -> Result<(), StrategyError> {
        self.steps += 1;
        Ok(())
    }

    fn force_next_boolean_choice(&mut self, _max_value: u32, _value: bool) -> Result<(), StrategyError> {
        self.steps += 1;
        Ok(())
    }

    fn force_next_integer_choice(&mut self, _max_value: u32, _value: u32) -> Result<(), StrategyError> {
        self.steps += 1;
        Ok(())
    }

    fn prepare_for_next_iteration(&mut self) -> Result<bool, StrategyError> {
        self.steps = 0;
        Ok(true)
    }

    fn reset(&mut self) {
        self.steps = 0;
    }

    fn scheduled_steps(&self) -> usize {
        self.steps
    }

    fn has_reached_max_scheduling_steps(&self) -> bool {
        self.max_steps > 0 && self.steps >= self.max_steps
    }

    fn is_fair(&self) -> bool {
        true
    }

    fn description(&self) -> String {
        format!("Random[seed '{}']", self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(enabled: &[bool]) -> Vec<SchedulableOperation> {
        enabled
            .iter()
            .enumerate()
            .map(|(i, &e)| {
                let mut op = SchedulableOperation::new(OperationId(i as u64), format!("op{i}"));
                op.is_enabled = e;
                op
            })
            .collect()
    }

    #[test]
    fn same_seed_same_choices() {
        let choices = ops(&[true, true, true, true]);
        let mut a = RandomStrategy::new(7, 0);
        let mut b = RandomStrategy::new(7, 0);
        for _ in 0..50 {
            assert_eq!(
                a.next_operation(&choices, OperationId(0)).unwrap(),
                b.next_operation(&choices, OperationId(0)).unwrap()
            );
        }
    }

    #[test]
    fn only_enabled_operations_are_chosen() {
        let choices = ops(&[false, true, false, true]);
        let mut strategy = RandomStrategy::new(1, 0);
        for _ in 0..100 {
            let next = strategy.next_operation(&choices, OperationId(0)).unwrap().unwrap();
            assert!(next == OperationId(1) || next == OperationId(3));
        }
    }

    #[test]
    fn no_enabled_operations_returns_none() {
        let mut strategy = RandomStrategy::new(1, 0);
        assert_eq!(strategy.next_operation(&ops(&[false, false]), OperationId(0)).unwrap(), None);
        assert_eq!(strategy.scheduled_steps(), 0);
    }

    #[test]
    fn integer_choice_stays_in_range() {
        let mut strategy = RandomStrategy::new(3, 0);
        for _ in 0..100 {
            assert!(strategy.next_integer_choice(5).unwrap().unwrap() < 5);
        }
        assert_eq!(strategy.next_integer_choice(0).unwrap(), Some(0));
    }

    #[test]
    fn step_bound_and_prepare() {
        let choices = ops(&[true]);
        let mut strategy = RandomStrategy::new(0, 3);
        for _ in 0..3 {
            strategy.next_operation(&choices, OperationId(0)).unwrap();
        }
        assert!(strategy.has_reached_max_scheduling_steps());
        assert!(strategy.prepare_for_next_iteration().unwrap());
        assert_eq!(strategy.scheduled_steps(), 0);
        assert!(!strategy.has_reached_max_scheduling_steps());
    }

    #[test]
    fn describes_seed() {
        let strategy = RandomStrategy::from_config(&Configuration::default().with_seed(12));
        assert_eq!(strategy.description(), "Random[seed '12']");
        assert!(strategy.is_fair());
    }
}
