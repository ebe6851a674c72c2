//! Collaborator seams consumed by the orchestrator.
//!
//! Generation, audio and persistence services are external; the pipeline
//! only talks to them through these traits so that HTTP clients, JSON file
//! stores and in-memory test doubles are interchangeable.

use serde::{Deserialize, Serialize};

use crate::audio_timeline::{AudioTimeline, MergeOptions, PlannedLine, TimelineOptions};
use crate::error::BackendError;
use crate::generation::GenerationRequest;
use crate::regeneration::RegenerationRequest;
use crate::screenplay::{DialogueLine, Scene};
use crate::types::ArtifactRef;

/// Callbacks a backend invokes while a job runs.
pub trait GenerationObserver: Send + Sync {
    /// The backend accepted the job and assigned it an id.
    fn on_job_submitted(&self, job_id: &str);

    /// Raw progress, 0..=100.
    fn on_progress(&self, percent: f64);
}

/// Observer that ignores every callback.
pub struct NoopObserver;

impl GenerationObserver for NoopObserver {
    fn on_job_submitted(&self, _job_id: &str) {}
    fn on_progress(&self, _percent: f64) {}
}

/// Backend answer to a cancel request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAck {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// Refusal phrases meaning the job ended before the cancel arrived.
const ALREADY_FINISHED_PHRASES: &[&str] = &[
    "already finished",
    "already completed",
    "already complete",
    "already done",
    "already failed",
    "already cancelled",
    "already canceled",
    "not running",
    "no longer running",
];

impl CancelAck {
    /// Whether the backend refused because the job already ended.
    pub fn already_finished(&self) -> bool {
        if self.success {
            return false;
        }
        let msg = self.message.to_ascii_lowercase();
        ALREADY_FINISHED_PHRASES
            .iter()
            .any(|phrase| msg.contains(phrase))
    }
}

/// Image and video generation service.
#[async_trait::async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate a still image and wait for the artifact.
    async fn submit_image(
        &self,
        request: &GenerationRequest,
        observer: &dyn GenerationObserver,
    ) -> Result<ArtifactRef, BackendError>;

    /// Generate a video clip and wait for the artifact.
    async fn submit_video(
        &self,
        request: &GenerationRequest,
        observer: &dyn GenerationObserver,
    ) -> Result<ArtifactRef, BackendError>;

    /// Best-effort cancellation of a running job.
    async fn cancel_job(&self, job_id: &str) -> Result<CancelAck, BackendError>;
}

/// Options for dialogue synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOptions {
    pub timeline: TimelineOptions,
    /// Whether speech-pattern voices may be used for lines without a clone.
    pub use_fallback: bool,
}

/// Synthesized dialogue track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedDialogue {
    pub audio: ArtifactRef,
    /// Placement of every line that made it into `audio`. Lines the voice
    /// service could not render are absent.
    pub timeline: AudioTimeline,
}

/// Voice synthesis and audio/video muxing service.
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Render `lines` into one track laid out per `options.timeline`.
    async fn synthesize_dialogue_audio(
        &self,
        lines: &[PlannedLine],
        options: SynthesisOptions,
        observer: &dyn GenerationObserver,
    ) -> Result<SynthesizedDialogue, BackendError>;

    /// Lay `audio` onto `video`. The fade-out is placed against
    /// `audio_duration_secs`, the length of the dialogue timeline.
    async fn merge_video_audio(
        &self,
        video: &str,
        audio: &str,
        audio_duration_secs: f64,
        options: MergeOptions,
    ) -> Result<ArtifactRef, BackendError>;
}

/// Persists scene updates made by the orchestrator.
#[async_trait::async_trait]
pub trait SceneStore: Send + Sync {
    async fn save_scene(&self, scene: &Scene) -> Result<(), BackendError>;
}

/// Asks the user whether to continue when some lines have no voice data.
#[async_trait::async_trait]
pub trait DialogueConfirmation: Send + Sync {
    /// `true` continues with those lines silent; `false` skips audio.
    async fn confirm_missing_voices(&self, speakers: &[String], lines: &[DialogueLine]) -> bool;
}

/// Text regeneration service for screenplay entities.
#[async_trait::async_trait]
pub trait EntityRegenerator: Send + Sync {
    async fn regenerate(&self, request: &RegenerationRequest) -> Result<String, BackendError>;
}
