//! Continuity resolution between consecutive shots.
//!
//! Decides, per shot and per [`GenerationKind`], which prior-shot artifact
//! and metadata may be sent to the backend and which seed to use.
//!
//! | Kind  | Continuity | Previous artifact | Prior artifact / metadata | Seed |
//! |-------|------------|-------------------|---------------------------|------|
//! | image | (ignored)  | image present     | image / none              | deterministic |
//! | image | (ignored)  | none              | none / none               | deterministic |
//! | video | off        | (ignored)         | none / none               | fresh random |
//! | video | on         | video present     | video / previous shot     | none |
//! | video | on         | none              | none / none               | fresh random |
//!
//! Image continuity is a visual-consistency aid that is always attempted;
//! the continuity toggle governs video only. Video never falls back to the
//! deterministic seed because video backends react strongly to seed reuse.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::screenplay::{Shot, Storyboard};
use crate::seed::{derive_seed, FreshSeeds};
use crate::types::{ArtifactRef, GenerationKind, SceneNumber, SlotKey};

/// Continuity inputs resolved for one shot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContinuityContext {
    /// Artifact of the previous shot to condition on.
    pub prior_artifact: Option<ArtifactRef>,
    /// The previous shot's own record, sent alongside a prior video.
    pub prior_metadata: Option<Shot>,
    /// `None` lets the backend pick a seed.
    pub seed: Option<u64>,
}

/// Resolve continuity context for `shots[index]`.
///
/// Fails with [`CoreError::NotFound`] if `index` is out of range.
pub fn resolve_continuity(
    scene_number: SceneNumber,
    shots: &[Shot],
    index: usize,
    storyboard: &Storyboard,
    kind: GenerationKind,
    continuity_requested: bool,
    seeds: &mut FreshSeeds,
) -> Result<ContinuityContext, CoreError> {
    let shot = shots.get(index).ok_or_else(|| CoreError::NotFound {
        entity: "shot index",
        id: index.to_string(),
    })?;
    let previous = index.checked_sub(1).and_then(|i| shots.get(i));

    let context = match kind {
        GenerationKind::Image => ContinuityContext {
            prior_artifact: previous
                .and_then(|prev| storyboard.image_for(&prev.shot_number))
                .map(str::to_string),
            prior_metadata: None,
            seed: Some(derive_seed(scene_number, &shot.shot_number)),
        },
        GenerationKind::Video => {
            let prior = previous
                .filter(|_| continuity_requested)
                .and_then(|prev| {
                    storyboard
                        .video_for(&prev.shot_number)
                        .map(|video| (video.to_string(), prev.clone()))
                });
            match prior {
                Some((video, prev)) => ContinuityContext {
                    prior_artifact: Some(video),
                    prior_metadata: Some(prev),
                    seed: None,
                },
                None => {
                    let key = SlotKey::new(scene_number, &shot.shot_number, kind).to_string();
                    ContinuityContext {
                        prior_artifact: None,
                        prior_metadata: None,
                        seed: Some(seeds.next_seed(&key)),
                    }
                }
            }
        }
    };
    Ok(context)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
