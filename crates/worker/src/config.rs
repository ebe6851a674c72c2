use std::path::PathBuf;

use storyreel_core::env::{bool_or, process_env, string_or};
use storyreel_core::error::CoreError;
use storyreel_core::regeneration::RegenerationMode;
use storyreel_core::types::GenerationKind;
use storyreel_pipeline::ShotOptions;

/// What the worker run should generate.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Screenplay document to read and write back.
    pub scene_file: PathBuf,
    pub kind: GenerationKind,
    pub continuity: bool,
    pub mode: RegenerationMode,
    /// Continue with silent lines when some speakers have no voice data.
    pub allow_silent_lines: bool,
}

impl WorkerConfig {
    /// | Env Var              | Default    |
    /// |----------------------|------------|
    /// | `SCENE_FILE`         | (required) |
    /// | `GENERATION_KIND`    | `image`    |
    /// | `CONTINUITY`         | `true`     |
    /// | `REGENERATION_MODE`  | `fresh`    |
    /// | `ALLOW_SILENT_LINES` | `false`    |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let scene_file = lookup("SCENE_FILE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| CoreError::Validation("SCENE_FILE must be set".to_string()))?;

        let kind_name = string_or(&lookup, "GENERATION_KIND", "image");
        let kind = GenerationKind::parse(&kind_name).ok_or_else(|| {
            CoreError::Validation(format!(
                "GENERATION_KIND must be image or video, got {kind_name:?}"
            ))
        })?;

        let mode_name = string_or(&lookup, "REGENERATION_MODE", "fresh");
        let mode = RegenerationMode::parse(&mode_name).ok_or_else(|| {
            CoreError::Validation(format!(
                "REGENERATION_MODE must be fresh, refine or use-edited, got {mode_name:?}"
            ))
        })?;

        Ok(Self {
            scene_file,
            kind,
            continuity: bool_or(&lookup, "CONTINUITY", true)?,
            mode,
            allow_silent_lines: bool_or(&lookup, "ALLOW_SILENT_LINES", false)?,
        })
    }

    pub fn shot_options(&self) -> ShotOptions {
        ShotOptions {
            kind: self.kind,
            continuity: self.continuity,
            mode: self.mode,
            persist: true,
        }
    }
}
