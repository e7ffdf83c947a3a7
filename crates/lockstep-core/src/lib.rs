//! Shared vocabulary for the lockstep concurrency-testing engine.
//!
//! lockstep replaces the nondeterministic thread scheduler of a
//! message-passing program with a cooperative one: exactly one controlled
//! operation runs at a time, and a pluggable [`SchedulingStrategy`] decides
//! who runs next. Every decision is logged, so any run can be replayed
//! exactly and, when it hits a bug, minimized.
//!
//! This crate holds the pieces every other lockstep crate shares:
//!
//! - **[`operation`]**: operation ids and the per-decision snapshot
//!   ([`SchedulableOperation`]) strategies choose from.
//! - **[`event`]**: event metadata reported by the runtime, including a
//!   structural payload hash.
//! - **[`strategy`]**: the [`SchedulingStrategy`] contract.
//! - **[`random`]**: seeded uniform exploration.
//! - **[`replay`]**: exact replay of a recorded schedule.
//! - **[`trace`]**: the decision log and the persisted dump format.
//! - **[`config`]**: testing configuration.
//! - **[`outcome`]**: bug reports and per-iteration outcomes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  lockstep-scheduler   BugFindingScheduler, TestingEngine │
//! │          │ asks                                          │
//! │          ▼                                               │
//! │  SchedulingStrategy ◄── RandomStrategy                   │
//! │          ▲          ◄── ReplayStrategy (ScheduleTrace)   │
//! │          │          ◄── ProgramModelStrategy  (model)    │
//! │          │          ◄── MinimizationStrategy  (minimize) │
//! │  runtime notifications → on_create / on_send / ...       │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod operation;
pub mod outcome;
pub mod random;
pub mod replay;
pub mod strategy;
pub mod trace;

pub use config::Configuration;
pub use error::{ConfigError, StrategyError, TraceParseError};
pub use event::{Choice, Delivery, EventInfo, MessageId};
pub use operation::{NextAction, OperationId, OperationType, SchedulableOperation, TargetType};
pub use outcome::{BugKind, BugReport, IterationOutcome};
pub use random::RandomStrategy;
pub use replay::ReplayStrategy;
pub use strategy::SchedulingStrategy;
pub use trace::{ScheduleStep, ScheduleTrace, TraceBody, TraceDump, TraceMetadata};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _config = Configuration::default();
        let _trace = ScheduleTrace::new();
        let _op = SchedulableOperation::new(OperationId::HARNESS, "harness");
        let strategy: Box<dyn SchedulingStrategy> = Box::new(RandomStrategy::new(0, 0));
        assert!(strategy.is_fair());
    }
}
