//! Errors of a minimization session.

use crate::serialize::SerializeError;
use lockstep_core::TraceParseError;
use lockstep_model::ModelError;
use lockstep_scheduler::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MinimizeError {
    #[error("cannot reproduce bug: {0}")]
    NotReproducible(String),

    #[error("minimization stopped before the search completed")]
    Incomplete,

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("trace error: {0}")]
    Trace(#[from] TraceParseError),

    #[error("serialization error: {0}")]
    Serialize(#[from] SerializeError),
}
