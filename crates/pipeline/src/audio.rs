//! Dialogue audio for generated videos.
//!
//! Runs after a video artifact exists. Progress is reported on the slot's
//! audio axis in fixed phases:
//!
//! | Phase                     | Audio progress |
//! |---------------------------|----------------|
//! | voices planned            | 5              |
//! | lines synthesized         | 10 .. 70       |
//! | timeline mixed            | 85             |
//! | merged onto the video     | 100            |
//!
//! Nothing here fails the shot. A failed synthesis or merge keeps the
//! video and reports the audio error as a warning.

use storyreel_core::audio_timeline::{
    plan_dialogue, synthesis_progress, PlannedLine, AUDIO_PHASE_MERGED, AUDIO_PHASE_MIXED,
    AUDIO_PHASE_PLANNED,
};
use storyreel_core::backend::{GenerationObserver, SynthesisOptions};
use storyreel_core::screenplay::Scene;
use storyreel_core::types::{ArtifactRef, SlotKey};
use storyreel_events::Notification;

use crate::error::PipelineError;
use crate::progress::ProgressSmoother;
use crate::shot::ShotOrchestrator;

/// What happened to a video's dialogue track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioOutcome {
    /// No dialogue, or not a video.
    Skipped,
    /// Some lines had no voice data and the user chose not to continue.
    Declined,
    /// No line had usable voice data.
    NoVoices,
    /// The merged video.
    Merged(ArtifactRef),
    /// Synthesis or merge failed; the video is kept without audio.
    Failed(String),
}

fn merge_error(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Merge(e.to_string())
}

/// Maps synthesis progress onto the audio axis.
struct SynthesisObserver<'a> {
    progress: &'a ProgressSmoother,
}

impl GenerationObserver for SynthesisObserver<'_> {
    fn on_job_submitted(&self, _job_id: &str) {}

    fn on_progress(&self, percent: f64) {
        self.progress.on_raw_progress(synthesis_progress(percent));
    }
}

impl ShotOrchestrator {
    pub(crate) async fn attach_dialogue_audio(
        &self,
        slot: &SlotKey,
        scene: &Scene,
        video: &str,
        progress: &ProgressSmoother,
    ) -> AudioOutcome {
        if scene.dialogue.is_empty() {
            return AudioOutcome::Skipped;
        }

        let plan = plan_dialogue(&scene.dialogue, &self.characters);
        progress.on_raw_progress(AUDIO_PHASE_PLANNED);
        tracing::info!(
            %slot,
            voice_clone = plan.voice_clone_count(),
            fallback = plan.fallback_count(),
            missing = plan.missing.len(),
            "Dialogue voices planned",
        );

        if plan.needs_confirmation() {
            let speakers = plan.missing_speakers();
            let proceed = self
                .collaborators
                .confirmation
                .confirm_missing_voices(&speakers, &plan.missing)
                .await;
            if !proceed {
                tracing::info!(%slot, ?speakers, "Audio skipped by user");
                return AudioOutcome::Declined;
            }
        }
        if plan.eligible.is_empty() {
            self.bus.notify(Notification::warning(
                "No dialogue audio",
                "None of the speaking characters has voice data",
            ));
            return AudioOutcome::NoVoices;
        }

        match self.synthesize_and_merge(&plan.eligible, video, progress).await {
            Ok(merged) => AudioOutcome::Merged(merged),
            Err(e) => {
                tracing::warn!(%slot, error = %e, "Keeping video without audio");
                self.bus.notify(Notification::warning(
                    "Video saved without audio",
                    e.to_string(),
                ));
                AudioOutcome::Failed(e.to_string())
            }
        }
    }

    async fn synthesize_and_merge(
        &self,
        lines: &[PlannedLine],
        video: &str,
        progress: &ProgressSmoother,
    ) -> Result<ArtifactRef, PipelineError> {
        let audio = &self.collaborators.audio;

        let observer = SynthesisObserver { progress };
        let options = SynthesisOptions {
            timeline: self.config.timeline,
            use_fallback: true,
        };
        let dialogue = audio
            .synthesize_dialogue_audio(lines, options, &observer)
            .await
            .map_err(merge_error)?;
        let timeline = &dialogue.timeline;
        if timeline.is_empty() {
            return Err(merge_error("no dialogue line could be synthesized"));
        }
        let skipped = lines.len().saturating_sub(timeline.segments().len());
        if skipped > 0 {
            tracing::warn!(skipped, total = lines.len(), "Some dialogue lines were not voiced");
        }
        progress.on_raw_progress(AUDIO_PHASE_MIXED);

        let audio_secs = timeline.total_duration_secs();
        let merged = audio
            .merge_video_audio(video, &dialogue.audio, audio_secs, self.config.merge)
            .await
            .map_err(merge_error)?;
        progress.on_raw_progress(AUDIO_PHASE_MERGED);

        tracing::info!(
            lines = timeline.segments().len(),
            total_secs = audio_secs,
            fade_out_start = self.config.merge.fade_out_start(audio_secs),
            "Dialogue merged onto video",
        );
        Ok(merged)
    }
}
