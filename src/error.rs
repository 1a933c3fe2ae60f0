//! Queue errors.

use thiserror::Error;
use uuid::Uuid;

use crate::job::JobStatus;

/// Queue error types.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Job not found.
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// No handler registered for the job type at submission.
    #[error("No handler registered for job type: {0}")]
    InvalidJobType(String),

    /// Job type had no handler at execution time. Terminal, never retried.
    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    /// Illegal status transition. Indicates a race or programming bug;
    /// detected and surfaced, never silently ignored.
    #[error("Illegal status transition for job {id}: {from:?} -> {to:?}")]
    Conflict {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    /// Persistence layer cannot be read or written.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Payload could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
}
