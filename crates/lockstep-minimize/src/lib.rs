//! Minimization of buggy lockstep executions.
//!
//! Given a trace that reaches a bug, this crate searches for a smaller
//! execution that still reaches it:
//!
//! 1. **Schedule replay.** A flat schedule is replayed once while a program
//!    model records it as an event tree.
//! 2. **Trace edit.** Sends of the configured droppable event types are
//!    withheld, one range at a time ([`WithholdSearch`]). A range whose
//!    withholding still reproduces the bug is kept.
//! 3. **Critical-transition search.** A binary search finds the shortest
//!    guided prefix after which the bug becomes inevitable.
//!
//! Each phase is one or more runs of the program under a
//! [`MinimizationStrategy`], driven by the ordinary
//! [`TestingEngine`](lockstep_scheduler::TestingEngine); [`minimize`] runs a
//! whole session.
//!
//! # Example
//!
//! ```no_run
//! use lockstep_core::{Configuration, RandomStrategy};
//! use lockstep_minimize::{load_strategy, minimize, MinimizationConfig};
//! use lockstep_scheduler::BugFindingScheduler;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # fn harness(_: Arc<BugFindingScheduler>) {}
//! let config = Configuration::default();
//! let min_config = MinimizationConfig::default().with_droppable(["Heartbeat"]);
//! let strategy = load_strategy(Path::new("bug.trace"), &config, min_config)?
//!     .with_suffix(Box::new(RandomStrategy::from_config(&config)));
//! let minimized = minimize(&config, strategy, &mut harness)?;
//! println!("{}", lockstep_minimize::format_report(&minimized.report));
//! # Ok::<(), lockstep_minimize::MinimizeError>(())
//! ```

pub mod editor;
pub mod error;
pub mod iteration;
pub mod matching;
pub mod report;
pub mod runner;
pub mod serialize;
pub mod strategy;

pub use editor::{EditTrial, MinimizationConfig, NextSearch, Phase, TraceEditor, WithholdSearch};
pub use error::MinimizeError;
pub use iteration::TraceIteration;
pub use matching::{AlwaysMatch, DeclaredActionMatch, MatchPolicy};
pub use report::{format_report, MinimizationReport};
pub use runner::{load_strategy, minimize, Minimized};
pub use serialize::{format_report_markdown, load_report_json, save_report_json, save_report_markdown, SerializeError};
pub use strategy::MinimizationStrategy;
