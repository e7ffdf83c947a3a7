//! Error types shared across the lockstep crates.

use crate::operation::OperationId;
use thiserror::Error;

/// Errors raised by a scheduling strategy.
///
/// Any of these is fatal to the current session: the scheduler records the
/// error, stops the run, and the iteration engine surfaces it to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error("Trace is not reproducible at step {step}: {reason}")]
    ReplayMismatch { step: usize, reason: String },

    #[error("Trace is not reproducible: execution is longer than the {length}-step trace")]
    TraceExhausted { length: usize },

    #[error("Choice {value} is out of range for max value {max_value}")]
    ChoiceOutOfRange { value: u32, max_value: u32 },

    #[error("Strategy chose operation {0}, which is not enabled")]
    InvalidChoice(OperationId),

    #[error("{0} is not supported by this strategy")]
    Unsupported(&'static str),

    #[error("Cannot reproduce bug: {0}")]
    NotReproducible(String),

    #[error("{0}")]
    Other(String),
}

/// Errors parsing a persisted trace dump.
#[derive(Debug, Error)]
pub enum TraceParseError {
    #[error("line {line}: invalid decision entry '{text}'")]
    InvalidEntry { line: usize, text: String },

    #[error("line {line}: invalid value for header '{key}': '{value}'")]
    InvalidHeader {
        line: usize,
        key: String,
        value: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors loading or saving a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
