//! Scripted in-memory collaborators for orchestrator integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use storyreel_core::audio_timeline::{AudioTimeline, MergeOptions, PlannedLine};
use storyreel_core::backend::{
    AudioBackend, CancelAck, DialogueConfirmation, EntityRegenerator, GenerationBackend,
    GenerationObserver, SceneStore, SynthesisOptions, SynthesizedDialogue,
};
use storyreel_core::error::BackendError;
use storyreel_core::generation::GenerationRequest;
use storyreel_core::regeneration::RegenerationRequest;
use storyreel_core::screenplay::{Character, DialogueLine, Scene, Shot, VoiceClone};
use storyreel_core::types::{ArtifactRef, GenerationKind};
use storyreel_events::{EventBus, OrchestratorEvent, StampedEvent};
use storyreel_pipeline::{Collaborators, PipelineConfig, ShotOrchestrator};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Generation backend
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockGenerationBackend {
    pub requests: Mutex<Vec<GenerationRequest>>,
    pub cancelled_jobs: Mutex<Vec<String>>,
    /// Canonical shot numbers whose generation fails, with the message.
    failures: Mutex<Vec<(String, String)>>,
    /// Never finish after reporting the job id.
    hang: Mutex<bool>,
    cancel_ack: Mutex<Option<CancelAck>>,
    /// Cancel the token once this many jobs have been submitted.
    trip: Mutex<Option<(usize, CancellationToken)>>,
}

impl MockGenerationBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_shot(self, shot: &str, message: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .push((shot.to_string(), message.to_string()));
        self
    }

    pub fn hanging(self) -> Self {
        *self.hang.lock().unwrap() = true;
        self
    }

    pub fn with_cancel_ack(self, success: bool, message: &str) -> Self {
        *self.cancel_ack.lock().unwrap() = Some(CancelAck {
            success,
            message: message.to_string(),
        });
        self
    }

    pub fn trip_after(self, submissions: usize, token: CancellationToken) -> Self {
        *self.trip.lock().unwrap() = Some((submissions, token));
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, i: usize) -> GenerationRequest {
        self.requests.lock().unwrap()[i].clone()
    }

    async fn run(
        &self,
        request: &GenerationRequest,
        observer: &dyn GenerationObserver,
    ) -> Result<ArtifactRef, BackendError> {
        let count = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        if let Some((after, token)) = self.trip.lock().unwrap().as_ref() {
            if count >= *after {
                token.cancel();
            }
        }

        let shot = request.shot_number.canonical();
        observer.on_job_submitted(&format!("job-{shot}-{count}"));
        observer.on_progress(40.0);

        if *self.hang.lock().unwrap() {
            std::future::pending::<()>().await;
        }
        if let Some((_, message)) = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(s, _)| *s == shot)
        {
            return Err(BackendError::Generation(message.clone()));
        }

        observer.on_progress(100.0);
        Ok(match request.kind {
            GenerationKind::Image => format!("image-{shot}.png"),
            GenerationKind::Video => format!("video-{shot}.mp4"),
        })
    }
}

#[async_trait::async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn submit_image(
        &self,
        request: &GenerationRequest,
        observer: &dyn GenerationObserver,
    ) -> Result<ArtifactRef, BackendError> {
        self.run(request, observer).await
    }

    async fn submit_video(
        &self,
        request: &GenerationRequest,
        observer: &dyn GenerationObserver,
    ) -> Result<ArtifactRef, BackendError> {
        self.run(request, observer).await
    }

    async fn cancel_job(&self, job_id: &str) -> Result<CancelAck, BackendError> {
        self.cancelled_jobs.lock().unwrap().push(job_id.to_string());
        Ok(self.cancel_ack.lock().unwrap().clone().unwrap_or(CancelAck {
            success: true,
            message: "Job cancelled".to_string(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Audio backend
// ---------------------------------------------------------------------------

/// Every synthesized line lasts this long.
pub const LINE_SECS: f64 = 1.5;

#[derive(Default)]
pub struct MockAudioBackend {
    pub synthesized: Mutex<Vec<Vec<String>>>,
    /// `(video, audio, audio_duration_secs, options)` per merge call.
    pub merges: Mutex<Vec<(String, String, f64, MergeOptions)>>,
    fail_merge: Mutex<Option<String>>,
    /// Speakers the voice service cannot render.
    unvoiced: Mutex<Vec<String>>,
}

impl MockAudioBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_merge(self, message: &str) -> Self {
        *self.fail_merge.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn unvoiced(self, character: &str) -> Self {
        self.unvoiced.lock().unwrap().push(character.to_string());
        self
    }

    pub fn synthesis_count(&self) -> usize {
        self.synthesized.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl AudioBackend for MockAudioBackend {
    async fn synthesize_dialogue_audio(
        &self,
        lines: &[PlannedLine],
        options: SynthesisOptions,
        observer: &dyn GenerationObserver,
    ) -> Result<SynthesizedDialogue, BackendError> {
        self.synthesized
            .lock()
            .unwrap()
            .push(lines.iter().map(|l| l.line.character.clone()).collect());

        let unvoiced = self.unvoiced.lock().unwrap().clone();
        let voiced: Vec<PlannedLine> = lines
            .iter()
            .filter(|l| !unvoiced.contains(&l.line.character))
            .cloned()
            .collect();
        let timeline =
            AudioTimeline::build(&voiced, &vec![LINE_SECS; voiced.len()], options.timeline)
                .map_err(|e| BackendError::Generation(e.to_string()))?;
        observer.on_progress(100.0);
        Ok(SynthesizedDialogue {
            audio: "dialogue.wav".to_string(),
            timeline,
        })
    }

    async fn merge_video_audio(
        &self,
        video: &str,
        audio: &str,
        audio_duration_secs: f64,
        options: MergeOptions,
    ) -> Result<ArtifactRef, BackendError> {
        self.merges.lock().unwrap().push((
            video.to_string(),
            audio.to_string(),
            audio_duration_secs,
            options,
        ));
        if let Some(message) = self.fail_merge.lock().unwrap().clone() {
            return Err(BackendError::Generation(message));
        }
        Ok(video.replace(".mp4", "-voiced.mp4"))
    }
}

// ---------------------------------------------------------------------------
// Store and confirmation
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingStore {
    pub saved: Mutex<Vec<Scene>>,
}

impl RecordingStore {
    pub fn save_count(&self) -> usize {
        self.saved.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl SceneStore for RecordingStore {
    async fn save_scene(&self, scene: &Scene) -> Result<(), BackendError> {
        self.saved.lock().unwrap().push(scene.clone());
        Ok(())
    }
}

pub struct ScriptedConfirmation {
    answer: bool,
    pub asked: Mutex<Vec<Vec<String>>>,
}

impl ScriptedConfirmation {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl DialogueConfirmation for ScriptedConfirmation {
    async fn confirm_missing_voices(&self, speakers: &[String], _lines: &[DialogueLine]) -> bool {
        self.asked.lock().unwrap().push(speakers.to_vec());
        self.answer
    }
}

/// Regenerator that echoes the prompt's first line, or fails on request.
#[derive(Default)]
pub struct EchoRegenerator {
    pub prompts: Mutex<Vec<String>>,
    fail_containing: Option<String>,
}

impl EchoRegenerator {
    pub fn failing_on(needle: &str) -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            fail_containing: Some(needle.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl EntityRegenerator for EchoRegenerator {
    async fn regenerate(&self, request: &RegenerationRequest) -> Result<String, BackendError> {
        let prompt = request.to_prompt();
        self.prompts.lock().unwrap().push(prompt.clone());
        if let Some(needle) = &self.fail_containing {
            if prompt.contains(needle.as_str()) {
                return Err(BackendError::Generation(format!("refused: {needle}")));
            }
        }
        Ok(format!("new {}", request.kind))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub orchestrator: Arc<ShotOrchestrator>,
    pub generation: Arc<MockGenerationBackend>,
    pub audio: Arc<MockAudioBackend>,
    pub store: Arc<RecordingStore>,
    pub confirmation: Arc<ScriptedConfirmation>,
    pub events: broadcast::Receiver<StampedEvent>,
}

impl Harness {
    pub fn new(generation: MockGenerationBackend) -> Self {
        Self::build(
            generation,
            MockAudioBackend::new(),
            ScriptedConfirmation::answering(true),
            Vec::new(),
        )
    }

    pub fn build(
        generation: MockGenerationBackend,
        audio: MockAudioBackend,
        confirmation: ScriptedConfirmation,
        characters: Vec<Character>,
    ) -> Self {
        let generation = Arc::new(generation);
        let audio = Arc::new(audio);
        let store = Arc::new(RecordingStore::default());
        let confirmation = Arc::new(confirmation);
        let bus = Arc::new(EventBus::default());
        let events = bus.subscribe();

        let collaborators = Collaborators {
            generation: generation.clone(),
            audio: audio.clone(),
            store: store.clone(),
            confirmation: confirmation.clone(),
        };
        let orchestrator = Arc::new(ShotOrchestrator::new(
            collaborators,
            bus,
            PipelineConfig::default(),
            characters,
        ));

        Self {
            orchestrator,
            generation,
            audio,
            store,
            confirmation,
            events,
        }
    }

    /// Every event published so far.
    pub fn drain_events(&mut self) -> Vec<OrchestratorEvent> {
        let mut events = Vec::new();
        while let Ok(stamped) = self.events.try_recv() {
            events.push(stamped.event);
        }
        events
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn scene_with_shots(count: u32) -> Scene {
    let mut scene = Scene::new(1);
    scene.location = "Night market".to_string();
    scene.characters = vec!["Mali".to_string()];
    scene.shots = (1..=count)
        .map(|n| Shot::new(n, format!("Shot {n}: Mali walks between stalls")))
        .collect();
    scene
}

pub fn voiced_character(name: &str) -> Character {
    let mut character = Character::new(name);
    character.voice_clone = Some(VoiceClone {
        sample_id: format!("sample-{name}"),
        language: Some("th".to_string()),
    });
    character
}
