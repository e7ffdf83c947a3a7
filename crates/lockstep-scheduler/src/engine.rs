//! Iteration engine: runs a program under a strategy many times.
//!
//! Each iteration gets a fresh [`BugFindingScheduler`] sharing the engine's
//! strategy. The [`TestHarness`] starts the program's operations on that
//! scheduler; the engine waits for the run to complete, folds the run into
//! the [`TestReport`], and lets the strategy plan the next iteration.

use crate::report::TestReport;
use crate::scheduler::{BugFindingScheduler, SharedStrategy};
use lockstep_core::{Configuration, IterationOutcome, SchedulingStrategy, StrategyError};
use log::{debug, info};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use thiserror::Error;

/// Errors that end a testing session.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("iteration {iteration}: {source}")]
    Strategy {
        iteration: usize,
        #[source]
        source: StrategyError,
    },
}

impl EngineError {
    /// The strategy error behind this failure.
    pub fn strategy_error(&self) -> &StrategyError {
        match self {
            EngineError::Strategy { source, .. } => source,
        }
    }
}

/// Starts one run of the program under test.
///
/// Implementations register the harness operation (id 0) and spawn the
/// program's operations on `scheduler`. They should return only after the
/// threads they spawned have exited.
pub trait TestHarness {
    fn run_iteration(&mut self, scheduler: Arc<BugFindingScheduler>);
}

impl<F> TestHarness for F
where
    F: FnMut(Arc<BugFindingScheduler>),
{
    fn run_iteration(&mut self, scheduler: Arc<BugFindingScheduler>) {
        self(scheduler)
    }
}

/// Drives iterations of a program under one strategy.
pub struct TestingEngine<S: SchedulingStrategy + 'static> {
    config: Configuration,
    strategy: Arc<Mutex<S>>,
    report: TestReport,
    iterations: usize,
    last_outcome: Option<IterationOutcome>,
}

impl<S: SchedulingStrategy + 'static> TestingEngine<S> {
    pub fn new(config: Configuration, strategy: S) -> Self {
        Self {
            config,
            strategy: Arc::new(Mutex::new(strategy)),
            report: TestReport::default(),
            iterations: 0,
            last_outcome: None,
        }
    }

    /// Run until the strategy is exhausted, the iteration budget is spent,
    /// or (when configured) the first bug is found.
    pub fn run<H: TestHarness>(&mut self, harness: &mut H) -> Result<&TestReport, EngineError> {
        let description = self.strategy.lock().description();
        info!(
            "testing {} for up to {} iteration(s) with {}",
            self.config.test_method_name.as_deref().unwrap_or("<unnamed>"),
            self.config.scheduling_iterations,
            description
        );

        for iteration in 0..self.config.scheduling_iterations {
            let outcome = self.run_once(harness);
            debug!(
                "iteration {} finished after {} steps (bug: {})",
                iteration,
                outcome.scheduled_steps,
                outcome.bug_found()
            );

            if let Some(source) = outcome.strategy_error.clone() {
                self.last_outcome = Some(outcome);
                return Err(EngineError::Strategy { iteration, source });
            }

            let mut strategy = self.strategy.lock();
            strategy
                .on_scheduling_ended(&outcome)
                .map_err(|source| EngineError::Strategy { iteration, source })?;
            let bug_found = outcome.bug_found();
            if let Some(bug) = &outcome.bug {
                info!("iteration {} found a bug: {}", iteration, bug);
            }
            self.last_outcome = Some(outcome);

            if bug_found && self.config.stop_after_first_bug {
                break;
            }
            let more = strategy
                .prepare_for_next_iteration()
                .map_err(|source| EngineError::Strategy { iteration, source })?;
            if !more {
                info!("search space exhausted after {} iteration(s)", iteration + 1);
                break;
            }
        }
        Ok(&self.report)
    }

    fn run_once<H: TestHarness>(&mut self, harness: &mut H) -> IterationOutcome {
        let shared: SharedStrategy = self.strategy.clone();
        let scheduler = Arc::new(BugFindingScheduler::new(self.config.clone(), shared));
        harness.run_iteration(Arc::clone(&scheduler));
        if !scheduler.has_operations() {
            // Nothing registered, so nothing will ever stop the run.
            let _ = scheduler.stop();
        }
        scheduler.wait();
        self.iterations += 1;
        self.report.merge(&scheduler.report());
        scheduler.outcome()
    }

    /// Lock the strategy, e.g. to extract results after [`run`](Self::run).
    pub fn strategy(&self) -> MutexGuard<'_, S> {
        self.strategy.lock()
    }

    pub fn report(&self) -> &TestReport {
        &self.report
    }

    /// Iterations executed so far.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn last_outcome(&self) -> Option<&IterationOutcome> {
        self.last_outcome.as_ref()
    }
}
