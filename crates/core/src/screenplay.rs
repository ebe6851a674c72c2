//! Screenplay data consumed by the shot generation pipeline.
//!
//! Scenes, shots and the per-scene storyboard are owned by the enclosing
//! screenplay document. The pipeline never mutates a document in place; it
//! works on a copy and hands updated scenes to a [`SceneStore`].
//!
//! [`SceneStore`]: crate::backend::SceneStore

use serde::{Deserialize, Serialize};

use crate::types::{same_shot_number, ArtifactRef, SceneNumber, ShotNumber};

// ---------------------------------------------------------------------------
// Characters
// ---------------------------------------------------------------------------

/// Cloned-voice configuration for a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceClone {
    /// Identifier of the uploaded voice sample.
    pub sample_id: String,
    /// Synthesis language code, e.g. `"th"` or `"en"`.
    #[serde(default)]
    pub language: Option<String>,
}

/// Speech characteristics used when no cloned voice is available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechPattern {
    pub dialect: String,
    #[serde(default)]
    pub accent: Option<String>,
    #[serde(default)]
    pub formality: Option<String>,
    #[serde(default)]
    pub personality: Option<String>,
}

/// A character from the screenplay's cast list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    /// Identity reference image passed to backends for face consistency.
    #[serde(default)]
    pub reference_image: Option<ArtifactRef>,
    #[serde(default)]
    pub voice_clone: Option<VoiceClone>,
    #[serde(default)]
    pub speech_pattern: Option<SpeechPattern>,
}

impl Character {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference_image: None,
            voice_clone: None,
            speech_pattern: None,
        }
    }

    /// Whether the character has a usable cloned voice sample.
    pub fn has_voice_sample(&self) -> bool {
        self.voice_clone
            .as_ref()
            .is_some_and(|v| !v.sample_id.trim().is_empty())
    }
}

/// Look up a character by name (trimmed, exact).
pub fn find_character<'a>(characters: &'a [Character], name: &str) -> Option<&'a Character> {
    let name = name.trim();
    characters.iter().find(|c| c.name.trim() == name)
}

// ---------------------------------------------------------------------------
// Shots
// ---------------------------------------------------------------------------

/// Cast reference on a shot: either a list of names or a single
/// comma-joined string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cast {
    Names(Vec<String>),
    Joined(String),
}

impl Cast {
    /// Trimmed, non-empty character names.
    pub fn names(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Self::Names(names) => names.iter().flat_map(|n| n.split(',')).collect(),
            Self::Joined(joined) => joined.split(',').collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// One shot of a scene's shot list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    pub shot_number: ShotNumber,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub shot_size: Option<String>,
    #[serde(default)]
    pub angle: Option<String>,
    #[serde(default)]
    pub movement: Option<String>,
    #[serde(default)]
    pub lighting: Option<String>,
    /// Lens, equipment and other technical notes.
    #[serde(default)]
    pub technical: Option<String>,
    #[serde(default)]
    pub cast: Option<Cast>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

impl Shot {
    pub fn new(shot_number: impl Into<ShotNumber>, description: impl Into<String>) -> Self {
        Self {
            shot_number: shot_number.into(),
            description: description.into(),
            shot_size: None,
            angle: None,
            movement: None,
            lighting: None,
            technical: None,
            cast: None,
            duration_secs: None,
        }
    }

    /// Character names appearing in this shot.
    pub fn cast_names(&self) -> Vec<String> {
        self.cast.as_ref().map(Cast::names).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Dialogue
// ---------------------------------------------------------------------------

/// A spoken line of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub character: String,
    pub text: String,
}

impl DialogueLine {
    pub fn new(character: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            character: character.into(),
            text: text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Storyboard
// ---------------------------------------------------------------------------

/// Generated artifacts for one shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryboardEntry {
    pub shot_number: ShotNumber,
    #[serde(default)]
    pub image: Option<ArtifactRef>,
    #[serde(default)]
    pub video: Option<ArtifactRef>,
}

impl StoryboardEntry {
    pub fn image(shot_number: ShotNumber, image: impl Into<ArtifactRef>) -> Self {
        Self {
            shot_number,
            image: Some(image.into()),
            video: None,
        }
    }

    pub fn video(shot_number: ShotNumber, video: impl Into<ArtifactRef>) -> Self {
        Self {
            shot_number,
            image: None,
            video: Some(video.into()),
        }
    }
}

/// Artifacts keyed by shot number. Holds at most one entry per shot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Storyboard {
    entries: Vec<StoryboardEntry>,
}

impl Storyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[StoryboardEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, shot_number: &ShotNumber) -> Option<&StoryboardEntry> {
        self.entries
            .iter()
            .find(|e| same_shot_number(&e.shot_number, shot_number))
    }

    /// Non-empty still-image reference for a shot.
    pub fn image_for(&self, shot_number: &ShotNumber) -> Option<&str> {
        self.get(shot_number)
            .and_then(|e| e.image.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    /// Non-empty video reference for a shot.
    pub fn video_for(&self, shot_number: &ShotNumber) -> Option<&str> {
        self.get(shot_number)
            .and_then(|e| e.video.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    /// Write an entry using filter-then-append.
    ///
    /// Any existing entry for the same shot is removed and a single merged
    /// entry appended; references absent from `entry` are carried over from
    /// the removed one so writing a video keeps the still image.
    pub fn upsert(&mut self, entry: StoryboardEntry) {
        let previous = self
            .entries
            .iter()
            .find(|e| same_shot_number(&e.shot_number, &entry.shot_number))
            .cloned();
        self.entries
            .retain(|e| !same_shot_number(&e.shot_number, &entry.shot_number));

        let merged = match previous {
            Some(prev) => StoryboardEntry {
                shot_number: entry.shot_number,
                image: entry.image.or(prev.image),
                video: entry.video.or(prev.video),
            },
            None => entry,
        };
        self.entries.push(merged);
    }
}

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

/// A scene and its shot list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub scene_number: SceneNumber,
    #[serde(default)]
    pub location: String,
    /// Names of characters present in the scene.
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default)]
    pub situations: Vec<String>,
    #[serde(default)]
    pub shots: Vec<Shot>,
    #[serde(default)]
    pub dialogue: Vec<DialogueLine>,
    #[serde(default)]
    pub storyboard: Storyboard,
}

impl Scene {
    pub fn new(scene_number: SceneNumber) -> Self {
        Self {
            scene_number,
            location: String::new(),
            characters: Vec::new(),
            situations: Vec::new(),
            shots: Vec::new(),
            dialogue: Vec::new(),
            storyboard: Storyboard::new(),
        }
    }

    pub fn shot(&self, shot_number: &ShotNumber) -> Option<&Shot> {
        self.shots
            .iter()
            .find(|s| same_shot_number(&s.shot_number, shot_number))
    }

    pub fn shot_index(&self, shot_number: &ShotNumber) -> Option<usize> {
        self.shots
            .iter()
            .position(|s| same_shot_number(&s.shot_number, shot_number))
    }

    /// Durable scene-level facts used as regeneration context.
    pub fn facts(&self) -> SceneFacts {
        SceneFacts {
            location: self.location.clone(),
            characters: self.characters.clone(),
            situations: self.situations.clone(),
        }
    }
}

/// Scene-level facts that survive any regeneration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneFacts {
    pub location: String,
    pub characters: Vec<String>,
    pub situations: Vec<String>,
}

/// A screenplay document: cast list plus scenes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenplayDocument {
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

impl ScreenplayDocument {
    pub fn scene(&self, scene_number: SceneNumber) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.scene_number == scene_number)
    }

    /// Replace the scene with the same number, or append it.
    pub fn replace_scene(&mut self, scene: Scene) {
        match self
            .scenes
            .iter_mut()
            .find(|s| s.scene_number == scene.scene_number)
        {
            Some(slot) => *slot = scene,
            None => self.scenes.push(scene),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- Cast --

    #[test]
    fn joined_cast_is_split_and_trimmed() {
        let cast = Cast::Joined(" Mali , Somchai,, ".to_string());
        assert_eq!(cast.names(), vec!["Mali", "Somchai"]);
    }

    #[test]
    fn cast_list_entries_may_be_joined() {
        let cast = Cast::Names(vec!["Mali, Somchai".to_string(), "Nok".to_string()]);
        assert_eq!(cast.names(), vec!["Mali", "Somchai", "Nok"]);
    }

    #[test]
    fn missing_cast_yields_no_names() {
        assert!(Shot::new(1, "wide").cast_names().is_empty());
    }

    #[test]
    fn cast_deserializes_from_string_or_list() {
        let joined: Cast = serde_json::from_str("\"A, B\"").unwrap();
        let list: Cast = serde_json::from_str("[\"A\", \"B\"]").unwrap();
        assert_eq!(joined.names(), list.names());
    }

    // -- Storyboard --

    #[test]
    fn upsert_keeps_one_entry_per_shot() {
        let mut board = Storyboard::new();
        board.upsert(StoryboardEntry::image(ShotNumber::Number(1.0), "a.png"));
        board.upsert(StoryboardEntry::image("1".into(), "b.png"));
        assert_eq!(board.len(), 1);
        assert_eq!(board.image_for(&ShotNumber::Number(1.0)), Some("b.png"));
    }

    #[test]
    fn upsert_merges_image_and_video() {
        let mut board = Storyboard::new();
        board.upsert(StoryboardEntry::image(ShotNumber::Number(2.0), "still.png"));
        board.upsert(StoryboardEntry::video(ShotNumber::Number(2.0), "clip.mp4"));
        let entry = board.get(&"2".into()).unwrap();
        assert_eq!(entry.image.as_deref(), Some("still.png"));
        assert_eq!(entry.video.as_deref(), Some("clip.mp4"));
    }

    #[test]
    fn upsert_appends_rewritten_entry_last() {
        let mut board = Storyboard::new();
        board.upsert(StoryboardEntry::image(ShotNumber::Number(1.0), "1.png"));
        board.upsert(StoryboardEntry::image(ShotNumber::Number(2.0), "2.png"));
        board.upsert(StoryboardEntry::image(ShotNumber::Number(1.0), "1b.png"));
        let order: Vec<String> = board
            .entries()
            .iter()
            .map(|e| e.shot_number.to_string())
            .collect();
        assert_eq!(order, vec!["2", "1"]);
    }

    #[test]
    fn blank_references_are_not_artifacts() {
        let mut board = Storyboard::new();
        board.upsert(StoryboardEntry::image(ShotNumber::Number(1.0), "  "));
        assert!(board.image_for(&ShotNumber::Number(1.0)).is_none());
    }

    // -- Scene / document --

    #[test]
    fn scene_finds_shots_by_numeric_string() {
        let mut scene = Scene::new(4);
        scene.shots.push(Shot::new(1, "wide"));
        scene.shots.push(Shot::new("2", "close"));
        assert_eq!(scene.shot_index(&ShotNumber::Number(2.0)), Some(1));
        assert_eq!(scene.shot(&"1".into()).unwrap().description, "wide");
    }

    #[test]
    fn replace_scene_overwrites_matching_number() {
        let mut doc = ScreenplayDocument::default();
        doc.replace_scene(Scene::new(1));
        let mut updated = Scene::new(1);
        updated.location = "Market".to_string();
        doc.replace_scene(updated);
        assert_eq!(doc.scenes.len(), 1);
        assert_eq!(doc.scene(1).unwrap().location, "Market");
    }

    #[test]
    fn character_lookup_is_trimmed() {
        let characters = vec![Character::new("Mali")];
        assert!(find_character(&characters, " Mali ").is_some());
        assert!(find_character(&characters, "Nok").is_none());
    }
}
