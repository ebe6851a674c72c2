//! Generation request construction and validation.
//!
//! A [`GenerationRequest`] is rebuilt for every invocation from the shot
//! record, the resolved [`ContinuityContext`] and the chosen
//! [`RegenerationMode`]. It is never persisted.

use serde::{Deserialize, Serialize};

use crate::continuity::ContinuityContext;
use crate::error::CoreError;
use crate::regeneration::RegenerationMode;
use crate::screenplay::{find_character, Character, Scene, Shot};
use crate::types::{ArtifactRef, GenerationKind, ShotNumber};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default aspect ratio sent to generation backends.
pub const DEFAULT_ASPECT_RATIO: &str = "16:9";

/// Default output resolution sent to generation backends.
pub const DEFAULT_RESOLUTION: &str = "1024x576";

/// Output geometry shared by every request of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFormat {
    pub aspect_ratio: String,
    pub resolution: String,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            resolution: DEFAULT_RESOLUTION.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// GenerationRequest
// ---------------------------------------------------------------------------

/// Everything a backend needs to generate one shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub kind: GenerationKind,
    pub shot_number: ShotNumber,
    pub prompt: String,
    /// `None` lets the backend pick a random seed.
    pub seed: Option<u64>,
    /// Previous shot's artifact for continuity.
    pub prior_artifact: Option<ArtifactRef>,
    /// Previous shot's record, sent with a prior video.
    pub prior_metadata: Option<Shot>,
    pub aspect_ratio: String,
    pub resolution: String,
    /// Identity reference images of the shot's cast.
    pub character_references: Vec<ArtifactRef>,
    pub mode: RegenerationMode,
    /// This shot's own existing artifact, sent only when refining.
    pub reference_artifact: Option<ArtifactRef>,
    /// Still image a video is animated from.
    pub init_image: Option<ArtifactRef>,
}

/// Reject shots that cannot be generated before any backend call.
pub fn validate_shot(shot: &Shot) -> Result<(), CoreError> {
    if shot.shot_number.is_blank() {
        return Err(CoreError::Validation(
            "shot_number must not be empty".to_string(),
        ));
    }
    if shot.description.trim().is_empty() {
        return Err(CoreError::Validation(format!(
            "Shot {} has no description",
            shot.shot_number
        )));
    }
    Ok(())
}

/// Compose the visual prompt for a shot. Blank fields are skipped.
pub fn compose_shot_prompt(scene: &Scene, shot: &Shot) -> String {
    let mut parts = vec![shot.description.trim().to_string()];

    let labelled = [
        ("Shot size", &shot.shot_size),
        ("Angle", &shot.angle),
        ("Camera movement", &shot.movement),
        ("Lighting", &shot.lighting),
        ("Technical", &shot.technical),
    ];
    for (label, value) in labelled {
        if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            parts.push(format!("{label}: {v}"));
        }
    }

    if !scene.location.trim().is_empty() {
        parts.push(format!("Location: {}", scene.location.trim()));
    }
    let cast = shot.cast_names();
    if !cast.is_empty() {
        parts.push(format!("Characters: {}", cast.join(", ")));
    }
    parts.join(". ")
}

/// Identity reference images for the shot's cast, in cast order.
pub fn character_references(shot: &Shot, characters: &[Character]) -> Vec<ArtifactRef> {
    shot.cast_names()
        .iter()
        .filter_map(|name| find_character(characters, name))
        .filter_map(|c| c.reference_image.clone())
        .filter(|r| !r.trim().is_empty())
        .collect()
}

/// Build the request for `scene.shots[index]`.
///
/// Validates the shot first. `Refine` needs the shot's own existing
/// artifact of the requested kind and fails with
/// [`CoreError::Validation`] when there is none.
pub fn build_generation_request(
    scene: &Scene,
    index: usize,
    kind: GenerationKind,
    continuity: ContinuityContext,
    mode: RegenerationMode,
    characters: &[Character],
    format: &OutputFormat,
) -> Result<GenerationRequest, CoreError> {
    let shot = scene.shots.get(index).ok_or_else(|| CoreError::NotFound {
        entity: "shot index",
        id: index.to_string(),
    })?;
    validate_shot(shot)?;

    let existing = match kind {
        GenerationKind::Image => scene.storyboard.image_for(&shot.shot_number),
        GenerationKind::Video => scene.storyboard.video_for(&shot.shot_number),
    };
    let reference_artifact = match mode {
        RegenerationMode::Fresh | RegenerationMode::UseEdited => None,
        RegenerationMode::Refine => Some(
            existing
                .ok_or_else(|| {
                    CoreError::Validation(format!(
                        "Shot {} has no existing {kind} to refine",
                        shot.shot_number
                    ))
                })?
                .to_string(),
        ),
    };

    let mut prompt = compose_shot_prompt(scene, shot);
    if mode.uses_current_value() {
        prompt = format!("{prompt}\n\n{}", mode.instruction());
    }

    let init_image = match kind {
        GenerationKind::Image => None,
        GenerationKind::Video => scene
            .storyboard
            .image_for(&shot.shot_number)
            .map(str::to_string),
    };

    Ok(GenerationRequest {
        kind,
        shot_number: shot.shot_number.clone(),
        prompt,
        seed: continuity.seed,
        prior_artifact: continuity.prior_artifact,
        prior_metadata: continuity.prior_metadata,
        aspect_ratio: format.aspect_ratio.clone(),
        resolution: format.resolution.clone(),
        character_references: character_references(shot, characters),
        mode,
        reference_artifact,
        init_image,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::regeneration::REFINE_INSTRUCTION;
    use crate::screenplay::{Cast, StoryboardEntry};

    fn scene() -> Scene {
        let mut scene = Scene::new(2);
        scene.location = "Harbour".to_string();
        let mut shot = Shot::new(1, "Boat drifts in fog");
        shot.shot_size = Some("Wide".to_string());
        shot.lighting = Some("  ".to_string());
        shot.cast = Some(Cast::Joined("Mali, Nok".to_string()));
        scene.shots.push(shot);
        scene
    }

    fn characters() -> Vec<Character> {
        let mut mali = Character::new("Mali");
        mali.reference_image = Some("mali.png".to_string());
        vec![mali, Character::new("Nok")]
    }

    // -- validation --

    #[test]
    fn blank_description_is_rejected() {
        assert_matches!(
            validate_shot(&Shot::new(1, "  ")),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn blank_shot_number_is_rejected() {
        assert_matches!(
            validate_shot(&Shot::new("", "desc")),
            Err(CoreError::Validation(_))
        );
    }

    // -- prompt --

    #[test]
    fn prompt_skips_blank_fields() {
        let scene = scene();
        let prompt = compose_shot_prompt(&scene, &scene.shots[0]);
        assert_eq!(
            prompt,
            "Boat drifts in fog. Shot size: Wide. Location: Harbour. Characters: Mali, Nok"
        );
    }

    #[test]
    fn character_references_only_include_cast_with_images() {
        let scene = scene();
        assert_eq!(
            character_references(&scene.shots[0], &characters()),
            vec!["mali.png".to_string()]
        );
    }

    // -- request building --

    #[test]
    fn request_carries_continuity_context() {
        let continuity = ContinuityContext {
            prior_artifact: Some("prev.png".to_string()),
            prior_metadata: None,
            seed: Some(99),
        };
        let req = build_generation_request(
            &scene(),
            0,
            GenerationKind::Image,
            continuity,
            RegenerationMode::Fresh,
            &characters(),
            &OutputFormat::default(),
        )
        .unwrap();
        assert_eq!(req.seed, Some(99));
        assert_eq!(req.prior_artifact.as_deref(), Some("prev.png"));
        assert_eq!(req.aspect_ratio, DEFAULT_ASPECT_RATIO);
        assert!(req.reference_artifact.is_none());
    }

    #[test]
    fn fresh_mode_excludes_existing_artifact() {
        let mut scene = scene();
        scene
            .storyboard
            .upsert(StoryboardEntry::image(ShotNumber::Number(1.0), "old.png"));
        let req = build_generation_request(
            &scene,
            0,
            GenerationKind::Image,
            ContinuityContext::default(),
            RegenerationMode::Fresh,
            &[],
            &OutputFormat::default(),
        )
        .unwrap();
        assert!(req.reference_artifact.is_none());
    }

    #[test]
    fn refine_mode_sends_existing_artifact_and_instruction() {
        let mut scene = scene();
        scene
            .storyboard
            .upsert(StoryboardEntry::image(ShotNumber::Number(1.0), "old.png"));
        let req = build_generation_request(
            &scene,
            0,
            GenerationKind::Image,
            ContinuityContext::default(),
            RegenerationMode::Refine,
            &[],
            &OutputFormat::default(),
        )
        .unwrap();
        assert_eq!(req.reference_artifact.as_deref(), Some("old.png"));
        assert!(req.prompt.ends_with(REFINE_INSTRUCTION));
    }

    #[test]
    fn refine_without_existing_artifact_fails() {
        let result = build_generation_request(
            &scene(),
            0,
            GenerationKind::Video,
            ContinuityContext::default(),
            RegenerationMode::Refine,
            &[],
            &OutputFormat::default(),
        );
        assert_matches!(result, Err(CoreError::Validation(_)));
    }

    #[test]
    fn video_request_uses_shot_still_as_init_image() {
        let mut scene = scene();
        scene
            .storyboard
            .upsert(StoryboardEntry::image(ShotNumber::Number(1.0), "still.png"));
        let req = build_generation_request(
            &scene,
            0,
            GenerationKind::Video,
            ContinuityContext::default(),
            RegenerationMode::UseEdited,
            &[],
            &OutputFormat::default(),
        )
        .unwrap();
        assert_eq!(req.init_image.as_deref(), Some("still.png"));
        assert!(req.reference_artifact.is_none());
    }
}
