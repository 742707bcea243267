use thiserror::Error;

use crate::models::direction::Direction;

/// Errors raised by the arbitration engine and its collaborators.
///
/// Validation errors are recovered locally by the component that sees
/// them. `StateCorruption` is the only variant that forces a state reset.
#[derive(Debug, Error)]
pub enum ArbiterError {
    /// A direction name outside of N, S, E, W.
    #[error("invalid direction `{0}`")]
    InvalidDirection(String),

    /// A request is missing a required field or carries inconsistent values.
    #[error("malformed request {id}: {reason}")]
    MalformedRequest { id: String, reason: String },

    /// The preemption handler is gone (engine not running or shut down).
    #[error("preemption channel unavailable for direction {0}")]
    ChannelUnavailable(Direction),

    /// An intersection invariant was violated.
    #[error("intersection state corrupted: {0}")]
    StateCorruption(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// The engine was asked to do work after `shutdown`.
    #[error("engine is shut down")]
    EngineStopped,

    #[error("no async runtime available: {0}")]
    Runtime(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, ArbiterError>;
