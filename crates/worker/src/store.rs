//! File-backed collaborators for the worker binary.

use std::path::{Path, PathBuf};

use storyreel_core::backend::{DialogueConfirmation, SceneStore};
use storyreel_core::error::BackendError;
use storyreel_core::screenplay::{DialogueLine, Scene, ScreenplayDocument};
use tokio::sync::Mutex;

/// Keeps the screenplay document in memory and rewrites the JSON file on
/// every scene save.
pub struct JsonSceneStore {
    path: PathBuf,
    document: Mutex<ScreenplayDocument>,
}

impl JsonSceneStore {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let document: ScreenplayDocument = serde_json::from_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            scenes = document.scenes.len(),
            characters = document.characters.len(),
            "Screenplay loaded",
        );
        Ok(Self {
            path: path.to_path_buf(),
            document: Mutex::new(document),
        })
    }

    pub async fn snapshot(&self) -> ScreenplayDocument {
        self.document.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl SceneStore for JsonSceneStore {
    async fn save_scene(&self, scene: &Scene) -> Result<(), BackendError> {
        let mut document = self.document.lock().await;
        document.replace_scene(scene.clone());
        let json = serde_json::to_string_pretty(&*document)
            .map_err(|e| BackendError::Transport(format!("cannot encode screenplay: {e}")))?;

        // Write beside the target and rename so readers never see a partial file.
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, json)
            .await
            .map_err(|e| BackendError::Transport(format!("cannot write {}: {e}", staging.display())))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| BackendError::Transport(format!("cannot replace {}: {e}", self.path.display())))?;

        tracing::debug!(scene = scene.scene_number, path = %self.path.display(), "Scene saved");
        Ok(())
    }
}

/// Answers the missing-voice prompt from configuration.
pub struct ConfiguredConfirmation {
    allow_silent_lines: bool,
}

impl ConfiguredConfirmation {
    pub fn new(allow_silent_lines: bool) -> Self {
        Self { allow_silent_lines }
    }
}

#[async_trait::async_trait]
impl DialogueConfirmation for ConfiguredConfirmation {
    async fn confirm_missing_voices(&self, speakers: &[String], lines: &[DialogueLine]) -> bool {
        tracing::warn!(
            ?speakers,
            lines = lines.len(),
            continue_silent = self.allow_silent_lines,
            "Dialogue lines without voice data",
        );
        self.allow_silent_lines
    }
}
