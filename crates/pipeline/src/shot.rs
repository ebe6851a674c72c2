//! Single-shot generation and cancellation.
//!
//! [`ShotOrchestrator`] owns everything that is per shot-slot: the job
//! controller, the two progress axes (video and audio) and the fresh-seed
//! source. A generation run goes
//!
//! 1. resolve continuity and build the request (validation happens here,
//!    before any backend call),
//! 2. claim the slot, asking the backend to stop any job it replaces,
//! 3. submit and wait, racing the wait against a user cancel,
//! 4. write the artifact into the scene's storyboard,
//! 5. lay dialogue audio onto a video (see [`crate::audio`]),
//! 6. persist the scene unless an edit session is open.
//!
//! Transient slot state is cleared on every exit path by a drop guard.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use storyreel_core::backend::{
    AudioBackend, DialogueConfirmation, GenerationBackend, GenerationObserver, SceneStore,
};
use storyreel_core::continuity::resolve_continuity;
use storyreel_core::error::{BackendError, CoreError};
use storyreel_core::generation::build_generation_request;
use storyreel_core::regeneration::RegenerationMode;
use storyreel_core::screenplay::{Character, Scene, StoryboardEntry};
use storyreel_core::seed::FreshSeeds;
use storyreel_core::types::{ArtifactRef, GenerationKind, ShotNumber, SlotKey};
use storyreel_events::{EventBus, Notification, OrchestratorEvent};

use crate::audio::AudioOutcome;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::jobs::{JobController, JobTerminal, JobTicket};
use crate::progress::ProgressSmoother;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// External services the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub generation: Arc<dyn GenerationBackend>,
    pub audio: Arc<dyn AudioBackend>,
    pub store: Arc<dyn SceneStore>,
    pub confirmation: Arc<dyn DialogueConfirmation>,
}

/// How a shot should be generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShotOptions {
    pub kind: GenerationKind,
    /// Condition video on the previous shot's clip.
    pub continuity: bool,
    pub mode: RegenerationMode,
    /// Save the scene after the artifact is written. Off while the user
    /// has an edit session open.
    pub persist: bool,
}

impl Default for ShotOptions {
    fn default() -> Self {
        Self {
            kind: GenerationKind::Image,
            continuity: true,
            mode: RegenerationMode::Fresh,
            persist: true,
        }
    }
}

/// A successfully generated shot.
#[derive(Debug, Clone)]
pub struct ShotOutcome {
    pub slot: SlotKey,
    /// Storyboard entry as written, including the merged video when audio
    /// was attached.
    pub entry: StoryboardEntry,
    /// The scene with the new entry applied.
    pub scene: Scene,
    pub audio: AudioOutcome,
    pub persisted: bool,
}

/// Result of a cancel request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The job ended before the cancel reached it.
    AlreadyFinished,
}

/// Current displayed values for a slot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressSnapshot {
    pub video: f64,
    pub audio: f64,
}

// ---------------------------------------------------------------------------
// Per-slot progress
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub(crate) struct SlotProgress {
    pub(crate) video: Arc<ProgressSmoother>,
    pub(crate) audio: Arc<ProgressSmoother>,
}

impl SlotProgress {
    fn new(slot: &SlotKey, bus: &Arc<EventBus>, config: &PipelineConfig) -> Self {
        let video = {
            let (bus, slot) = (Arc::clone(bus), slot.clone());
            ProgressSmoother::with_hook(config.ramp_window, move |percent| {
                bus.publish(OrchestratorEvent::ShotProgress {
                    slot: slot.clone(),
                    percent,
                });
            })
        };
        let audio = {
            let (bus, slot) = (Arc::clone(bus), slot.clone());
            ProgressSmoother::with_hook(config.ramp_window, move |percent| {
                bus.publish(OrchestratorEvent::AudioProgress {
                    slot: slot.clone(),
                    percent,
                });
            })
        };
        Self {
            video: Arc::new(video),
            audio: Arc::new(audio),
        }
    }

    fn reset(&self) {
        self.video.reset();
        self.audio.reset();
    }
}

/// Forwards backend callbacks for one job into the slot's state.
struct SlotObserver<'a> {
    jobs: &'a JobController,
    bus: &'a EventBus,
    slot: &'a SlotKey,
    ticket: JobTicket,
    progress: &'a ProgressSmoother,
}

impl GenerationObserver for SlotObserver<'_> {
    fn on_job_submitted(&self, job_id: &str) {
        if self.jobs.register_job_id(self.slot, self.ticket, job_id) {
            self.bus.publish(OrchestratorEvent::JobSubmitted {
                slot: self.slot.clone(),
                job_id: job_id.to_string(),
            });
        }
    }

    fn on_progress(&self, percent: f64) {
        if self.jobs.is_pending(self.slot, self.ticket) {
            self.progress.on_raw_progress(percent);
        }
    }
}

type ProgressMap = Mutex<HashMap<SlotKey, SlotProgress>>;

fn lock_progress(map: &ProgressMap) -> MutexGuard<'_, HashMap<SlotKey, SlotProgress>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the slot's job and discards its progress when a run ends,
/// however it ends.
struct TransientState<'a> {
    jobs: &'a JobController,
    slot: &'a SlotKey,
    ticket: JobTicket,
    progress: SlotProgress,
    progress_map: &'a ProgressMap,
}

impl Drop for TransientState<'_> {
    fn drop(&mut self) {
        self.jobs.finish(self.slot, self.ticket, JobTerminal::Failed);
        // Checked under the map lock: a newer run claims its job before it
        // looks up progress, so it either keeps this entry or gets a new one.
        let mut map = lock_progress(self.progress_map);
        if !self.jobs.has_pending(self.slot) {
            self.progress.reset();
            map.remove(self.slot);
        }
    }
}

// ---------------------------------------------------------------------------
// ShotOrchestrator
// ---------------------------------------------------------------------------

pub struct ShotOrchestrator {
    pub(crate) collaborators: Collaborators,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) config: PipelineConfig,
    pub(crate) characters: Vec<Character>,
    jobs: JobController,
    progress: ProgressMap,
    seeds: Mutex<FreshSeeds>,
}

impl ShotOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        bus: Arc<EventBus>,
        config: PipelineConfig,
        characters: Vec<Character>,
    ) -> Self {
        Self {
            collaborators,
            bus,
            config,
            characters,
            jobs: JobController::new(),
            progress: Mutex::new(HashMap::new()),
            seeds: Mutex::new(FreshSeeds::new()),
        }
    }

    /// Replace the fresh-seed source, e.g. with a seeded RNG.
    pub fn with_seeds(mut self, seeds: FreshSeeds) -> Self {
        self.seeds = Mutex::new(seeds);
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Whether a job is in flight for `slot`.
    pub fn is_generating(&self, slot: &SlotKey) -> bool {
        self.jobs.has_pending(slot)
    }

    /// Slots with a job in flight.
    pub fn active_slots(&self) -> Vec<SlotKey> {
        self.jobs.pending_slots()
    }

    /// Displayed progress of `slot`; zero on both axes when idle.
    pub fn progress(&self, slot: &SlotKey) -> ProgressSnapshot {
        lock_progress(&self.progress)
            .get(slot)
            .map(|progress| ProgressSnapshot {
                video: progress.video.displayed(),
                audio: progress.audio.displayed(),
            })
            .unwrap_or_default()
    }

    /// Whether transient progress state is held for `slot`.
    pub fn tracks_progress(&self, slot: &SlotKey) -> bool {
        lock_progress(&self.progress).contains_key(slot)
    }

    fn slot_progress(&self, slot: &SlotKey) -> SlotProgress {
        lock_progress(&self.progress)
            .entry(slot.clone())
            .or_insert_with(|| SlotProgress::new(slot, &self.bus, &self.config))
            .clone()
    }

    fn seeds(&self) -> MutexGuard<'_, FreshSeeds> {
        self.seeds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Generate `scene.shots[index]`.
    ///
    /// Failures are published as `ShotFailed` plus an error notification
    /// carrying the backend's message, then returned. A run stopped by
    /// [`cancel`](Self::cancel) returns `BackendError::Cancelled` without
    /// a failure notification.
    pub async fn generate_shot(
        &self,
        scene: &Scene,
        index: usize,
        options: ShotOptions,
    ) -> Result<ShotOutcome, PipelineError> {
        let shot = scene.shots.get(index).ok_or_else(|| CoreError::NotFound {
            entity: "shot",
            id: format!("scene {} index {index}", scene.scene_number),
        })?;
        let slot = SlotKey::new(scene.scene_number, &shot.shot_number, options.kind);

        let result = self.run_shot(scene, index, &slot, options).await;
        match &result {
            Ok(outcome) => {
                if let Some(artifact) = outcome.entry_artifact(options.kind) {
                    self.bus.publish(OrchestratorEvent::ShotCompleted {
                        slot: slot.clone(),
                        artifact,
                    });
                }
            }
            Err(e) if e.is_cancellation() => {
                tracing::info!(%slot, "Shot generation stopped");
            }
            Err(e) => {
                tracing::error!(%slot, error = %e, "Shot generation failed");
                self.bus.publish(OrchestratorEvent::ShotFailed {
                    slot: slot.clone(),
                    error: e.to_string(),
                });
                self.bus.notify(Notification::error(
                    format!("Failed to generate {} for shot {}", options.kind, slot.shot),
                    e.to_string(),
                ));
            }
        }
        result
    }

    async fn run_shot(
        &self,
        scene: &Scene,
        index: usize,
        slot: &SlotKey,
        options: ShotOptions,
    ) -> Result<ShotOutcome, PipelineError> {
        let continuity = resolve_continuity(
            scene.scene_number,
            &scene.shots,
            index,
            &scene.storyboard,
            options.kind,
            options.continuity,
            &mut self.seeds(),
        )?;
        let request = build_generation_request(
            scene,
            index,
            options.kind,
            continuity,
            options.mode,
            &self.characters,
            &self.config.format,
        )?;

        let started = self.jobs.start_job(slot);
        if let Some(old_job) = started.superseded {
            self.cancel_superseded(slot, &old_job).await;
        }

        let progress = self.slot_progress(slot);
        progress.reset();
        let _transient = TransientState {
            jobs: &self.jobs,
            slot,
            ticket: started.ticket,
            progress: progress.clone(),
            progress_map: &self.progress,
        };

        tracing::info!(
            %slot,
            ticket = started.ticket,
            seed = ?request.seed,
            continuity = request.prior_artifact.is_some(),
            mode = %options.mode,
            "Generating shot",
        );

        let observer = SlotObserver {
            jobs: &self.jobs,
            bus: &self.bus,
            slot,
            ticket: started.ticket,
            progress: &progress.video,
        };
        let generation = &self.collaborators.generation;
        let submit = async {
            match options.kind {
                GenerationKind::Image => generation.submit_image(&request, &observer).await,
                GenerationKind::Video => generation.submit_video(&request, &observer).await,
            }
        };
        let result = tokio::select! {
            biased;
            _ = started.cancelled.cancelled() => Err(BackendError::Cancelled),
            result = submit => result,
        };

        let artifact = match result {
            Ok(artifact) => {
                if !self.jobs.finish(slot, started.ticket, JobTerminal::Completed) {
                    tracing::debug!(%slot, "Completion arrived after cancel, discarding");
                    return Err(BackendError::Cancelled.into());
                }
                artifact
            }
            Err(e) => {
                let terminal = if e.is_cancellation() {
                    JobTerminal::Cancelled
                } else {
                    JobTerminal::Failed
                };
                self.jobs.finish(slot, started.ticket, terminal);
                return Err(e.into());
            }
        };
        progress.video.on_raw_progress(100.0);

        let mut updated = scene.clone();
        updated
            .storyboard
            .upsert(new_entry(options.kind, &request.shot_number, artifact.clone()));

        let audio = match options.kind {
            GenerationKind::Video => {
                self.attach_dialogue_audio(slot, &updated, &artifact, &progress.audio)
                    .await
            }
            GenerationKind::Image => AudioOutcome::Skipped,
        };
        if let AudioOutcome::Merged(merged) = &audio {
            updated
                .storyboard
                .upsert(StoryboardEntry::video(request.shot_number.clone(), merged.clone()));
        }

        let persisted = options.persist && self.persist(slot, &updated).await;
        let entry = updated
            .storyboard
            .get(&request.shot_number)
            .cloned()
            .ok_or_else(|| CoreError::Internal(format!("storyboard entry for {slot} vanished")))?;

        tracing::info!(%slot, artifact = %artifact, audio = ?audio, persisted, "Shot generated");
        Ok(ShotOutcome {
            slot: slot.clone(),
            entry,
            scene: updated,
            audio,
            persisted,
        })
    }

    async fn cancel_superseded(&self, slot: &SlotKey, job_id: &str) {
        match self.collaborators.generation.cancel_job(job_id).await {
            Ok(ack) => {
                tracing::info!(%slot, job_id, success = ack.success, "Superseded job cancel requested");
            }
            Err(e) => {
                tracing::warn!(%slot, job_id, error = %e, "Failed to cancel superseded job");
            }
        }
    }

    async fn persist(&self, slot: &SlotKey, scene: &Scene) -> bool {
        match self.collaborators.store.save_scene(scene).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%slot, error = %e, "Failed to save scene");
                self.bus.notify(Notification::warning("Scene not saved", e.to_string()));
                false
            }
        }
    }

    /// Ask the backend to stop the slot's in-flight job.
    ///
    /// With no registered job id this publishes a warning and returns
    /// [`PipelineError::NoActiveJob`]. A backend answer that the job has
    /// already ended yields [`CancelOutcome::AlreadyFinished`].
    pub async fn cancel(&self, slot: &SlotKey) -> Result<CancelOutcome, PipelineError> {
        let active = match self.jobs.active_job(slot) {
            Ok(active) => active,
            Err(e) => {
                tracing::warn!(%slot, "Cancel requested with no active job");
                self.bus
                    .notify(Notification::warning("Nothing to cancel", e.to_string()));
                return Err(e);
            }
        };

        let ack = match self.collaborators.generation.cancel_job(&active.job_id).await {
            Ok(ack) => ack,
            Err(e) => {
                tracing::error!(%slot, job_id = %active.job_id, error = %e, "Cancel request failed");
                self.bus
                    .notify(Notification::error("Failed to cancel", e.to_string()));
                return Err(e.into());
            }
        };

        if ack.success {
            if self.jobs.finish(slot, active.ticket, JobTerminal::Cancelled) {
                if let Some(progress) = lock_progress(&self.progress).get(slot) {
                    progress.reset();
                }
                self.bus
                    .publish(OrchestratorEvent::JobCancelled { slot: slot.clone() });
                self.bus.notify(Notification::info(
                    "Generation cancelled",
                    format!("Stopped job {}", active.job_id),
                ));
                tracing::info!(%slot, job_id = %active.job_id, "Job cancelled");
                return Ok(CancelOutcome::Cancelled);
            }
            tracing::debug!(%slot, job_id = %active.job_id, "Cancel acknowledged after completion");
            return Ok(self.already_finished(slot, &active.job_id));
        }
        if ack.already_finished() {
            return Ok(self.already_finished(slot, &active.job_id));
        }

        self.bus
            .notify(Notification::error("Failed to cancel", ack.message.clone()));
        Err(BackendError::Generation(ack.message).into())
    }

    /// Cancel every in-flight job, one slot at a time.
    pub async fn cancel_all(&self) -> Vec<(SlotKey, Result<CancelOutcome, PipelineError>)> {
        let mut results = Vec::new();
        for slot in self.active_slots() {
            let result = self.cancel(&slot).await;
            results.push((slot, result));
        }
        results
    }

    fn already_finished(&self, slot: &SlotKey, job_id: &str) -> CancelOutcome {
        tracing::info!(%slot, job_id, "Job already finished");
        self.bus.notify(Notification::info(
            "Nothing to cancel",
            format!("Job {job_id} had already finished"),
        ));
        CancelOutcome::AlreadyFinished
    }
}

impl ShotOutcome {
    fn entry_artifact(&self, kind: GenerationKind) -> Option<ArtifactRef> {
        match kind {
            GenerationKind::Image => self.entry.image.clone(),
            GenerationKind::Video => self.entry.video.clone(),
        }
    }
}

fn new_entry(
    kind: GenerationKind,
    shot_number: &ShotNumber,
    artifact: ArtifactRef,
) -> StoryboardEntry {
    match kind {
        GenerationKind::Image => StoryboardEntry::image(shot_number.clone(), artifact),
        GenerationKind::Video => StoryboardEntry::video(shot_number.clone(), artifact),
    }
}
