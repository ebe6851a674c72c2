//! Message type constants for shot job lifecycle events.
//!
//! Attached to every event published on the orchestrator bus so that
//! subscribers (log sinks, UI bridges) can route on a stable string.

/// Job accepted by a backend and assigned an id.
pub const MSG_TYPE_JOB_SUBMITTED: &str = "job_submitted";

/// Smoothed video/image progress for a shot slot.
pub const MSG_TYPE_JOB_PROGRESS: &str = "job_progress";

/// Audio phase progress for a shot slot.
pub const MSG_TYPE_AUDIO_PROGRESS: &str = "audio_progress";

/// Job completed successfully.
pub const MSG_TYPE_JOB_COMPLETED: &str = "job_completed";

/// Job failed with an error.
pub const MSG_TYPE_JOB_FAILED: &str = "job_failed";

/// Job was cancelled by the user.
pub const MSG_TYPE_JOB_CANCELLED: &str = "job_cancelled";

/// Batch position update ("shot i of n").
pub const MSG_TYPE_BATCH_PROGRESS: &str = "batch_progress";

/// Batch reached a terminal state.
pub const MSG_TYPE_BATCH_FINISHED: &str = "batch_finished";

/// User-facing notification.
pub const MSG_TYPE_NOTIFICATION: &str = "notification";
