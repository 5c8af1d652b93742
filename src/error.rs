//! Error types for query execution.

use thiserror::Error;

use crate::value::RecordId;

/// Errors that can occur while building or driving an execution plan.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Structural misuse of the engine: a transform step started without a
    /// predecessor, `next()` without a prior `has_next()`, a second `start()`
    /// on the same step instance, and the like. Never retried.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A command-level failure: invalid operand shapes, failed schema
    /// checks, malformed persisted step payloads. Lower-level causes are
    /// folded into the message exactly once.
    #[error("command execution error: {0}")]
    Command(String),

    /// A concurrent-modification conflict detected by the transaction
    /// layer at commit time. Recoverable only through `COMMIT RETRY`.
    #[error("concurrent modification: {0}")]
    Conflict(String),

    /// A record identifier that no longer resolves to a stored record.
    #[error("record not found: {0}")]
    RecordNotFound(RecordId),
}

impl From<serde_json::Error> for ExecutionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Command(format!("malformed serialized payload: {err}"))
    }
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecutionError>;
