//! Running a minimization session to completion.

use crate::editor::MinimizationConfig;
use crate::error::MinimizeError;
use crate::report::MinimizationReport;
use crate::strategy::MinimizationStrategy;
use lockstep_core::trace::load_dump;
use lockstep_core::{Configuration, StrategyError, TraceDump};
use lockstep_scheduler::{TestHarness, TestingEngine};
use log::info;
use std::path::Path;

/// What a finished session produced.
#[derive(Debug, Clone)]
pub struct Minimized {
    pub report: MinimizationReport,
    /// The best event tree, ready to save.
    pub mintrace: TraceDump,
}

/// Build a strategy for the trace stored at `path`.
pub fn load_strategy(
    path: &Path,
    config: &Configuration,
    min_config: MinimizationConfig,
) -> Result<MinimizationStrategy, MinimizeError> {
    let dump = load_dump(path)?;
    info!("loaded {} trace entries from {}", dump.len(), path.display());
    Ok(MinimizationStrategy::from_dump(&dump, config, min_config)?)
}

/// Run `harness` under `strategy` until the editor completes its epoch.
///
/// The engine runs without an iteration budget and does not stop at the
/// first bug; the strategy ends the session.
pub fn minimize<H: TestHarness>(
    config: &Configuration,
    strategy: MinimizationStrategy,
    harness: &mut H,
) -> Result<Minimized, MinimizeError> {
    let mut config = config.clone();
    config.stop_after_first_bug = false;
    config.scheduling_iterations = usize::MAX;

    let mut engine = TestingEngine::new(config, strategy);
    if let Err(err) = engine.run(harness) {
        return Err(match err.strategy_error() {
            StrategyError::NotReproducible(reason) => MinimizeError::NotReproducible(reason.clone()),
            _ => err.into(),
        });
    }

    let strategy = engine.strategy();
    if !strategy.is_completed() {
        return Err(MinimizeError::Incomplete);
    }
    let report = strategy.report();
    let mintrace = strategy.best_mintrace()?.ok_or(MinimizeError::Incomplete)?;
    info!(
        "minimized {} entries to {} steps in {} iteration(s)",
        report.original_length, report.minimized_length, report.iterations
    );
    Ok(Minimized { report, mintrace })
}
