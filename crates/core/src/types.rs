//! Shared identifier types.
//!
//! Shot numbers arrive from upstream screenplay data either as JSON numbers
//! or as numeric strings, so every comparison goes through
//! [`same_shot_number`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scene numbers are positive and stable once assigned.
pub type SceneNumber = u32;

/// Opaque reference to a generated artifact (URL, storage path or data URI).
pub type ArtifactRef = String;

// ---------------------------------------------------------------------------
// ShotNumber
// ---------------------------------------------------------------------------

/// A shot number as it appears in screenplay data.
///
/// Equality is numeric-aware: see [`same_shot_number`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShotNumber {
    Number(f64),
    Text(String),
}

impl ShotNumber {
    /// Numeric value of the shot number, if it parses to a finite number.
    pub fn as_number(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }

    /// Whether the shot number carries no usable value.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Number(n) => !n.is_finite(),
            Self::Text(s) => s.trim().is_empty(),
        }
    }

    /// Normalized form used for map keys: the numeric rendering when the
    /// value is numeric, otherwise the trimmed text.
    pub fn canonical(&self) -> String {
        match self.as_number() {
            Some(n) => format_number(n),
            None => match self {
                Self::Number(n) => format_number(*n),
                Self::Text(s) => s.trim().to_string(),
            },
        }
    }
}

impl From<u32> for ShotNumber {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i32> for ShotNumber {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for ShotNumber {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl PartialEq for ShotNumber {
    fn eq(&self, other: &Self) -> bool {
        same_shot_number(self, other)
    }
}

impl fmt::Display for ShotNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Render a number the way screenplay data writes it: integers without a
/// fractional part, everything else in shortest form.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Compare two shot numbers.
///
/// When both sides parse to finite numbers they are compared numerically
/// (`3`, `"3"` and `" 3.0 "` are the same shot). Otherwise the trimmed
/// string forms are compared.
pub fn same_shot_number(a: &ShotNumber, b: &ShotNumber) -> bool {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x == y,
        _ => a.to_string().trim() == b.to_string().trim(),
    }
}

// ---------------------------------------------------------------------------
// GenerationKind
// ---------------------------------------------------------------------------

/// What a shot generation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    Image,
    Video,
}

impl GenerationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Parse the lowercase name used in configuration.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SlotKey
// ---------------------------------------------------------------------------

/// Identity of a shot-slot: one scene, one shot, one generation kind.
///
/// Progress state and job handles are owned per slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub scene: SceneNumber,
    pub shot: String,
    pub kind: GenerationKind,
}

impl SlotKey {
    pub fn new(scene: SceneNumber, shot: &ShotNumber, kind: GenerationKind) -> Self {
        Self {
            scene,
            shot: shot.canonical(),
            kind,
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene-{}/shot-{}/{}", self.scene, self.shot, self.kind)
    }
}

// ---------------------------------------------------------------------------
// BatchOutcome
// ---------------------------------------------------------------------------

/// Terminal state of a "regenerate all" run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "failed", rename_all = "snake_case")]
pub enum BatchOutcome {
    Completed,
    Stopped,
    CompletedWithFailures(usize),
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Stopped => f.write_str("stopped by user"),
            Self::CompletedWithFailures(1) => f.write_str("completed with 1 failure"),
            Self::CompletedWithFailures(n) => write!(f, "completed with {n} failures"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
