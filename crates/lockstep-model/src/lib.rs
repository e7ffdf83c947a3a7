//! Program-model reconstruction for lockstep.
//!
//! The scheduler sees a run as a flat sequence of decisions. This crate
//! rebuilds the causal structure behind it: which operation created which,
//! which send fed which receive, and which nondeterministic values each
//! operation consumed. The result is an [`EventTree`], an arena of
//! [`ProgramStep`]s addressed by their total-ordering index.
//!
//! - **[`step`]**: steps, step kinds and cross-run [`StepSignature`]s.
//! - **[`tree`]**: the event tree, its invariants and the mintrace format.
//! - **[`model`]**: the per-run accumulator and its summary.
//! - **[`strategy`]**: [`ProgramModelStrategy`], which records the model
//!   while another strategy makes the decisions.

pub mod error;
pub mod model;
pub mod step;
pub mod strategy;
pub mod tree;

pub use error::ModelError;
pub use model::{ProgramModel, ProgramModelSummary};
pub use step::{ProgramStep, StepKind, StepSignature};
pub use strategy::ProgramModelStrategy;
pub use tree::EventTree;
