//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans out [`OrchestratorEvent`]s to any number of
//! subscribers. It is shared via `Arc<EventBus>` between the orchestrator,
//! its progress smoothers and whatever renders progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storyreel_core::job_events::{
    MSG_TYPE_AUDIO_PROGRESS, MSG_TYPE_BATCH_FINISHED, MSG_TYPE_BATCH_PROGRESS,
    MSG_TYPE_JOB_CANCELLED, MSG_TYPE_JOB_COMPLETED, MSG_TYPE_JOB_FAILED, MSG_TYPE_JOB_PROGRESS,
    MSG_TYPE_JOB_SUBMITTED, MSG_TYPE_NOTIFICATION,
};
use storyreel_core::types::{ArtifactRef, BatchOutcome, SlotKey};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A user-facing message. Failures reach the user this way, never as raw
/// error values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_level(NotificationLevel::Info, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_level(NotificationLevel::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_level(NotificationLevel::Error, title, message)
    }

    fn with_level(level: NotificationLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// OrchestratorEvent
// ---------------------------------------------------------------------------

/// Everything the orchestrator reports while it works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// Smoothed image/video progress, 0..=100.
    ShotProgress { slot: SlotKey, percent: f64 },
    /// Audio phase progress, 0..=100, on its own axis.
    AudioProgress { slot: SlotKey, percent: f64 },
    /// 1-based position of the shot being generated within a batch.
    BatchProgress { current: usize, total: usize },
    JobSubmitted { slot: SlotKey, job_id: String },
    ShotCompleted { slot: SlotKey, artifact: ArtifactRef },
    ShotFailed { slot: SlotKey, error: String },
    JobCancelled { slot: SlotKey },
    BatchFinished {
        outcome: BatchOutcome,
        succeeded: usize,
        failed: usize,
    },
    Notification(Notification),
}

impl OrchestratorEvent {
    /// Stable routing string for this event.
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::ShotProgress { .. } => MSG_TYPE_JOB_PROGRESS,
            Self::AudioProgress { .. } => MSG_TYPE_AUDIO_PROGRESS,
            Self::BatchProgress { .. } => MSG_TYPE_BATCH_PROGRESS,
            Self::JobSubmitted { .. } => MSG_TYPE_JOB_SUBMITTED,
            Self::ShotCompleted { .. } => MSG_TYPE_JOB_COMPLETED,
            Self::ShotFailed { .. } => MSG_TYPE_JOB_FAILED,
            Self::JobCancelled { .. } => MSG_TYPE_JOB_CANCELLED,
            Self::BatchFinished { .. } => MSG_TYPE_BATCH_FINISHED,
            Self::Notification(_) => MSG_TYPE_NOTIFICATION,
        }
    }

    /// The shot slot this event belongs to, if any.
    pub fn slot(&self) -> Option<&SlotKey> {
        match self {
            Self::ShotProgress { slot, .. }
            | Self::AudioProgress { slot, .. }
            | Self::JobSubmitted { slot, .. }
            | Self::ShotCompleted { slot, .. }
            | Self::ShotFailed { slot, .. }
            | Self::JobCancelled { slot } => Some(slot),
            Self::BatchProgress { .. } | Self::BatchFinished { .. } | Self::Notification(_) => {
                None
            }
        }
    }
}

/// An event as delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampedEvent {
    pub event: OrchestratorEvent,
    pub emitted_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use storyreel_events::bus::{EventBus, Notification, OrchestratorEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(OrchestratorEvent::Notification(Notification::info("Batch", "started")));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<StampedEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// Slow receivers observe `RecvError::Lagged` once the buffer is full.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: OrchestratorEvent) {
        tracing::trace!(message_type = event.message_type(), "Publishing event");
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(StampedEvent {
            event,
            emitted_at: Utc::now(),
        });
    }

    /// Shorthand for publishing a [`Notification`].
    pub fn notify(&self, notification: Notification) {
        self.publish(OrchestratorEvent::Notification(notification));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StampedEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
