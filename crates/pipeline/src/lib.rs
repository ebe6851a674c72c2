//! Shot generation orchestrator.
//!
//! Drives image and video generation for the shots of a scene: continuity
//! between shots, smoothed progress, per-slot job cancellation, sequential
//! "regenerate all" batches, dialogue audio for videos and text
//! regeneration of screenplay entities. External services are reached
//! through the collaborator traits in [`storyreel_core::backend`].

pub mod audio;
pub mod config;
pub mod entities;
pub mod error;
pub mod jobs;
pub mod progress;
pub mod sequencer;
pub mod shot;

pub use audio::AudioOutcome;
pub use config::PipelineConfig;
pub use entities::{EntityBatchReport, EntityRegenerationRunner, EntityTarget};
pub use error::PipelineError;
pub use sequencer::BatchReport;
pub use shot::{CancelOutcome, Collaborators, ShotOptions, ShotOrchestrator, ShotOutcome};
