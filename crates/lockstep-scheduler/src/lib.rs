//! Lock-step scheduling for lockstep.
//!
//! The [`BugFindingScheduler`] serializes the threads of a message-passing
//! program: each controlled operation parks on its own condition variable
//! and runs only when the strategy picks it. Along the way the scheduler
//! detects the bugs that only a controlled scheduler can see:
//!
//! - **Livelock**: nothing is enabled while some operation waits to receive.
//! - **Uncontrolled synchronization**: an operation reached a scheduling
//!   point without holding control (see [`OperationToken`]).
//! - **Step bound**: optionally reported as a bug instead of truncating.
//! - **Liveness**: a monitor stayed hot for too many fair steps.
//!
//! The [`TestingEngine`] runs many iterations, one fresh scheduler each,
//! and aggregates a [`TestReport`].
//!
//! # Example
//!
//! ```no_run
//! use lockstep_core::{Configuration, OperationId, OperationType, RandomStrategy, TargetType};
//! use lockstep_scheduler::{BugFindingScheduler, TestingEngine};
//! use std::sync::Arc;
//!
//! let config = Configuration::default().with_iterations(100);
//! let mut engine = TestingEngine::new(config.clone(), RandomStrategy::from_config(&config));
//! let mut harness = |scheduler: Arc<BugFindingScheduler>| {
//!     let token = scheduler.notify_event_handler_created(OperationId(0), "harness");
//!     let _ = scheduler.notify_event_handler_started(&token);
//!     // ... spawn operations, yield at every send/receive ...
//!     scheduler.notify_operation_completed(&token);
//!     let _ = scheduler.schedule_next_operation(&token, OperationType::Stop, TargetType::Operation, OperationId(0));
//! };
//! let report = engine.run(&mut harness).unwrap();
//! println!("{}", lockstep_scheduler::report::format_report(report));
//! ```

pub mod engine;
pub mod report;
pub mod scheduler;

pub use engine::{EngineError, TestHarness, TestingEngine};
pub use report::{format_report, TestReport};
pub use scheduler::{BugFindingScheduler, ExecutionCanceled, OperationToken, SharedStrategy};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _report = TestReport::default();
        let _canceled = ExecutionCanceled;
        assert!(format_report(&TestReport::new("Random")).contains("Random"));
    }
}
