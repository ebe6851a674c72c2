//! Orchestrator event bus and notification types.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`OrchestratorEvent`]: progress, job lifecycle and batch events for
//!   shot slots.
//! - [`Notification`]: user-facing `{level, title, message}` messages.

pub mod bus;

pub use bus::{EventBus, Notification, NotificationLevel, OrchestratorEvent, StampedEvent};
