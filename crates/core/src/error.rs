use crate::regeneration::RegenerableKind;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("No {0} to regenerate")]
    NoDataToRegenerate(RegenerableKind),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure reported by an external generation collaborator.
///
/// `Generation` always carries the backend's raw message so that it can be
/// surfaced to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("{0}")]
    Generation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Job {job_id} timed out after {waited_secs}s")]
    Timeout { job_id: String, waited_secs: u64 },

    #[error("Job {job_id} stalled with no progress for {stalled_secs}s")]
    Stalled { job_id: String, stalled_secs: u64 },

    #[error("Job was cancelled")]
    Cancelled,
}

impl BackendError {
    /// Whether this failure is the result of a user-initiated stop rather
    /// than a genuine generation problem.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
