//! Error types for event trees and mintraces.

use lockstep_core::TraceParseError;
use thiserror::Error;

/// Errors decoding or validating an event tree.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("mintrace line {line}: {source}")]
    InvalidStep {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed event tree: {0}")]
    Malformed(String),

    #[error("trace is a flat schedule, not a mintrace")]
    NotMintrace,

    #[error("trace error: {0}")]
    Trace(#[from] TraceParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
