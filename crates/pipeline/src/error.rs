use storyreel_core::error::{BackendError, CoreError};
use storyreel_core::types::SlotKey;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Cancel requested for a slot with no registered job id.
    #[error("No active job for {0}")]
    NoActiveJob(SlotKey),

    /// Dialogue synthesis or muxing failed; the video itself is kept.
    #[error("Audio merge failed: {0}")]
    Merge(String),
}

impl PipelineError {
    /// Informational results that should not be shown as errors.
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::NoActiveJob(_))
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Backend(e) if e.is_cancellation())
    }
}
