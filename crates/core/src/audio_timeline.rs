//! Dialogue voice planning and audio timeline construction.
//!
//! Each dialogue line is classified by the voice data its speaker has:
//!
//! | Speaker has            | Source                    |
//! |------------------------|---------------------------|
//! | voice sample id        | `VoiceClone`              |
//! | speech pattern only    | `SpeechPatternFallback`   |
//! | neither / unknown name | no data (needs confirm)   |
//!
//! The [`AudioTimeline`] places eligible lines back to back: the first line
//! starts after `start_delay_secs`, every later line starts at the previous
//! start plus the previous duration plus `gap_secs`.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::screenplay::{find_character, Character, DialogueLine, SpeechPattern, VoiceClone};

// ---------------------------------------------------------------------------
// Audio progress phases
// ---------------------------------------------------------------------------

/// Audio progress once the voice plan is ready.
pub const AUDIO_PHASE_PLANNED: f64 = 5.0;

/// Audio progress when synthesis starts.
pub const AUDIO_PHASE_SYNTHESIS_START: f64 = 10.0;

/// Audio progress when synthesis finishes.
pub const AUDIO_PHASE_SYNTHESIS_END: f64 = 70.0;

/// Audio progress once the timeline is mixed.
pub const AUDIO_PHASE_MIXED: f64 = 85.0;

/// Audio progress once the merged video is available.
pub const AUDIO_PHASE_MERGED: f64 = 100.0;

/// Map a 0..=100 synthesis percentage onto the synthesis phase band.
pub fn synthesis_progress(percent: f64) -> f64 {
    let fraction = percent.clamp(0.0, 100.0) / 100.0;
    AUDIO_PHASE_SYNTHESIS_START + fraction * (AUDIO_PHASE_SYNTHESIS_END - AUDIO_PHASE_SYNTHESIS_START)
}

// ---------------------------------------------------------------------------
// Voice planning
// ---------------------------------------------------------------------------

/// Voice data used to synthesize a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceSource {
    VoiceClone,
    SpeechPatternFallback,
}

/// A dialogue line with the voice data it will be synthesized from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedLine {
    pub line: DialogueLine,
    pub source: VoiceSource,
    pub voice_clone: Option<VoiceClone>,
    pub speech_pattern: Option<SpeechPattern>,
}

/// Dialogue lines partitioned by voice eligibility, in script order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoicePlan {
    pub eligible: Vec<PlannedLine>,
    pub missing: Vec<DialogueLine>,
}

impl VoicePlan {
    pub fn voice_clone_count(&self) -> usize {
        self.eligible
            .iter()
            .filter(|l| l.source == VoiceSource::VoiceClone)
            .count()
    }

    pub fn fallback_count(&self) -> usize {
        self.eligible.len() - self.voice_clone_count()
    }

    /// Whether some lines would be silent and the user must confirm.
    pub fn needs_confirmation(&self) -> bool {
        !self.missing.is_empty()
    }

    /// Distinct speaker names of the lines without voice data.
    pub fn missing_speakers(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for line in &self.missing {
            if !names.iter().any(|n| n == &line.character) {
                names.push(line.character.clone());
            }
        }
        names
    }
}

/// Classify every line of `dialogue` against the character roster.
///
/// Blank lines are dropped.
pub fn plan_dialogue(dialogue: &[DialogueLine], characters: &[Character]) -> VoicePlan {
    let mut plan = VoicePlan::default();
    for line in dialogue.iter().filter(|l| !l.text.trim().is_empty()) {
        let character = find_character(characters, &line.character);
        let clone = character
            .filter(|c| c.has_voice_sample())
            .and_then(|c| c.voice_clone.clone());
        let pattern = character.and_then(|c| c.speech_pattern.clone());

        let source = match (&clone, &pattern) {
            (Some(_), _) => VoiceSource::VoiceClone,
            (None, Some(_)) => VoiceSource::SpeechPatternFallback,
            (None, None) => {
                plan.missing.push(line.clone());
                continue;
            }
        };
        plan.eligible.push(PlannedLine {
            line: line.clone(),
            source,
            voice_clone: clone,
            speech_pattern: pattern,
        });
    }
    plan
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

/// Spacing applied when lines are laid out on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelineOptions {
    pub gap_secs: f64,
    pub start_delay_secs: f64,
}

/// One line's placement on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSegment {
    pub character: String,
    pub start_offset_secs: f64,
    pub duration_secs: f64,
    pub source: VoiceSource,
}

/// Immutable, ordered placement of synthesized lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTimeline {
    segments: Vec<TimelineSegment>,
}

impl AudioTimeline {
    /// Lay out `lines` using the measured `durations_secs` (same order).
    pub fn build(
        lines: &[PlannedLine],
        durations_secs: &[f64],
        options: TimelineOptions,
    ) -> Result<Self, CoreError> {
        if lines.len() != durations_secs.len() {
            return Err(CoreError::Validation(format!(
                "expected {} line durations, got {}",
                lines.len(),
                durations_secs.len()
            )));
        }
        if let Some(bad) = durations_secs.iter().find(|d| !d.is_finite() || **d < 0.0) {
            return Err(CoreError::Validation(format!(
                "invalid line duration: {bad}"
            )));
        }

        let mut cursor = options.start_delay_secs.max(0.0);
        let gap = options.gap_secs.max(0.0);
        let segments = lines
            .iter()
            .zip(durations_secs)
            .map(|(line, &duration)| {
                let segment = TimelineSegment {
                    character: line.line.character.clone(),
                    start_offset_secs: cursor,
                    duration_secs: duration,
                    source: line.source,
                };
                cursor += duration + gap;
                segment
            })
            .collect();
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[TimelineSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// End of the last segment; trailing gap is not counted.
    pub fn total_duration_secs(&self) -> f64 {
        self.segments
            .last()
            .map(|s| s.start_offset_secs + s.duration_secs)
            .unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Fades applied when the dialogue track is laid onto the video.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergeOptions {
    pub fade_in_secs: f64,
    pub fade_out_secs: f64,
}

impl MergeOptions {
    /// Start of the fade-out for an audio track of `audio_duration_secs`.
    pub fn fade_out_start(&self, audio_duration_secs: f64) -> f64 {
        (audio_duration_secs - self.fade_out_secs).max(0.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
