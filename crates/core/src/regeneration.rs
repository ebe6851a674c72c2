//! Regeneration strategy selection.
//!
//! Every regenerable entity (scene, shot-list item, shot, prop, location
//! details) supports the same three modes. The mode decides how much of the
//! entity's existing value is sent upstream alongside the durable
//! scene-level facts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::screenplay::SceneFacts;

// ---------------------------------------------------------------------------
// Instructions sent with each mode
// ---------------------------------------------------------------------------

/// Instruction for a from-scratch regeneration.
pub const FRESH_INSTRUCTION: &str =
    "Create this from scratch using only the scene facts. Do not reuse any previous version.";

/// Instruction for refining an existing value.
pub const REFINE_INSTRUCTION: &str = "Improve the current version below. Preserve its structure \
     and intent while improving detail and completeness.";

/// Instruction for regenerating around user edits.
pub const USE_EDITED_INSTRUCTION: &str = "Treat the edited version below as the source of truth. \
     Keep it as written and reconcile everything else around it.";

// ---------------------------------------------------------------------------
// RegenerationMode
// ---------------------------------------------------------------------------

/// How a regeneration request is built from current vs. original data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegenerationMode {
    /// Only durable scene-level facts; the existing value is excluded.
    Fresh,
    /// Existing value as reference; preserve structure, improve detail.
    Refine,
    /// Current (possibly user-edited) value is the primary source of truth.
    UseEdited,
}

impl RegenerationMode {
    pub const ALL: [Self; 3] = [Self::Fresh, Self::Refine, Self::UseEdited];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Refine => "refine",
            Self::UseEdited => "use-edited",
        }
    }

    /// Parse the configuration name of a mode. `edited` is accepted as an
    /// alias of `use-edited`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fresh" => Some(Self::Fresh),
            "refine" => Some(Self::Refine),
            "use-edited" | "use_edited" | "edited" => Some(Self::UseEdited),
            _ => None,
        }
    }

    /// Instruction text sent upstream with this mode.
    pub fn instruction(self) -> &'static str {
        match self {
            Self::Fresh => FRESH_INSTRUCTION,
            Self::Refine => REFINE_INSTRUCTION,
            Self::UseEdited => USE_EDITED_INSTRUCTION,
        }
    }

    /// Whether the mode sends the entity's current value upstream.
    pub fn uses_current_value(self) -> bool {
        !matches!(self, Self::Fresh)
    }
}

impl fmt::Display for RegenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Modes offered for an entity. `UseEdited` is only offered once the
/// entity has edits.
pub fn available_modes(has_edits: bool) -> Vec<RegenerationMode> {
    RegenerationMode::ALL
        .into_iter()
        .filter(|m| has_edits || *m != RegenerationMode::UseEdited)
        .collect()
}

/// Mode pre-selected for an entity.
pub fn recommended_mode(has_edits: bool) -> RegenerationMode {
    if has_edits {
        RegenerationMode::UseEdited
    } else {
        RegenerationMode::Fresh
    }
}

// ---------------------------------------------------------------------------
// RegenerableKind
// ---------------------------------------------------------------------------

/// Entity kinds sharing the three-mode regeneration contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegenerableKind {
    Scene,
    ShotListItem,
    Shot,
    Prop,
    LocationDetails,
}

impl RegenerableKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::ShotListItem => "shot list item",
            Self::Shot => "shot",
            Self::Prop => "prop",
            Self::LocationDetails => "location details",
        }
    }
}

impl fmt::Display for RegenerableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// RegenerationRequest
// ---------------------------------------------------------------------------

/// Request handed to an entity regeneration backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegenerationRequest {
    pub kind: RegenerableKind,
    pub mode: RegenerationMode,
    pub facts: SceneFacts,
    /// The entity's current value. Always `None` for [`RegenerationMode::Fresh`].
    pub current_value: Option<String>,
    pub instruction: String,
}

impl RegenerationRequest {
    /// Render the request as a single prompt: facts first, then the
    /// current value (if sent), then the instruction.
    pub fn to_prompt(&self) -> String {
        let mut sections = vec![format!("Regenerate {}.", self.kind.label())];
        if !self.facts.location.trim().is_empty() {
            sections.push(format!("Location: {}", self.facts.location.trim()));
        }
        if !self.facts.characters.is_empty() {
            sections.push(format!("Characters: {}", self.facts.characters.join(", ")));
        }
        if !self.facts.situations.is_empty() {
            sections.push(format!("Situations: {}", self.facts.situations.join("; ")));
        }
        if let Some(current) = &self.current_value {
            let label = match self.mode {
                RegenerationMode::UseEdited => "Edited version",
                _ => "Current version",
            };
            sections.push(format!("{label}:\n{current}"));
        }
        sections.push(self.instruction.clone());
        sections.join("\n\n")
    }
}

/// Build a regeneration request for one entity.
///
/// `Refine` and `UseEdited` need an existing non-blank value and fail with
/// [`CoreError::Validation`] otherwise. `Fresh` drops `current_value`
/// entirely.
pub fn build_regeneration_request(
    kind: RegenerableKind,
    mode: RegenerationMode,
    facts: &SceneFacts,
    current_value: Option<&str>,
) -> Result<RegenerationRequest, CoreError> {
    let current_value = match mode {
        RegenerationMode::Fresh => None,
        RegenerationMode::Refine | RegenerationMode::UseEdited => {
            let value = current_value
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    CoreError::Validation(format!(
                        "No existing {kind} to {} from",
                        match mode {
                            RegenerationMode::Refine => "refine",
                            _ => "regenerate",
                        }
                    ))
                })?;
            Some(value.to_string())
        }
    };

    Ok(RegenerationRequest {
        kind,
        mode,
        facts: facts.clone(),
        current_value,
        instruction: mode.instruction().to_string(),
    })
}

/// Fail fast with [`CoreError::NoDataToRegenerate`] when a "regenerate all"
/// target list is empty.
pub fn ensure_targets<T>(kind: RegenerableKind, targets: &[T]) -> Result<(), CoreError> {
    if targets.is_empty() {
        return Err(CoreError::NoDataToRegenerate(kind));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn facts() -> SceneFacts {
        SceneFacts {
            location: "Night market".to_string(),
            characters: vec!["Mali".to_string(), "Nok".to_string()],
            situations: vec!["Mali searches for her brother".to_string()],
        }
    }

    // -- mode parsing --

    #[test]
    fn modes_parse_from_config_names() {
        assert_eq!(RegenerationMode::parse("fresh"), Some(RegenerationMode::Fresh));
        assert_eq!(RegenerationMode::parse("Refine"), Some(RegenerationMode::Refine));
        assert_eq!(
            RegenerationMode::parse("use-edited"),
            Some(RegenerationMode::UseEdited)
        );
        assert_eq!(RegenerationMode::parse("edited"), Some(RegenerationMode::UseEdited));
        assert_eq!(RegenerationMode::parse("remix"), None);
    }

    #[test]
    fn mode_serializes_kebab_case() {
        let json = serde_json::to_string(&RegenerationMode::UseEdited).unwrap();
        assert_eq!(json, "\"use-edited\"");
    }

    // -- availability --

    #[test]
    fn use_edited_requires_edits() {
        assert_eq!(available_modes(false).len(), 2);
        assert!(available_modes(true).contains(&RegenerationMode::UseEdited));
    }

    #[test]
    fn recommendation_follows_edits() {
        assert_eq!(recommended_mode(false), RegenerationMode::Fresh);
        assert_eq!(recommended_mode(true), RegenerationMode::UseEdited);
    }

    // -- request building --

    #[test]
    fn fresh_excludes_current_value() {
        let req = build_regeneration_request(
            RegenerableKind::Prop,
            RegenerationMode::Fresh,
            &facts(),
            Some("A red lantern"),
        )
        .unwrap();
        assert!(req.current_value.is_none());
        assert!(!req.to_prompt().contains("red lantern"));
        assert!(req.to_prompt().contains("Night market"));
    }

    #[test]
    fn refine_includes_current_value_as_reference() {
        let req = build_regeneration_request(
            RegenerableKind::Shot,
            RegenerationMode::Refine,
            &facts(),
            Some("Wide shot of stalls"),
        )
        .unwrap();
        let prompt = req.to_prompt();
        assert!(prompt.contains("Current version:\nWide shot of stalls"));
        assert!(prompt.ends_with(REFINE_INSTRUCTION));
    }

    #[test]
    fn use_edited_labels_value_as_source_of_truth() {
        let req = build_regeneration_request(
            RegenerableKind::Scene,
            RegenerationMode::UseEdited,
            &facts(),
            Some("Mali finds Nok"),
        )
        .unwrap();
        assert!(req.to_prompt().contains("Edited version:\nMali finds Nok"));
        assert_eq!(req.instruction, USE_EDITED_INSTRUCTION);
    }

    #[test]
    fn refine_without_existing_value_fails_validation() {
        let result = build_regeneration_request(
            RegenerableKind::LocationDetails,
            RegenerationMode::Refine,
            &facts(),
            Some("   "),
        );
        assert_matches!(result, Err(CoreError::Validation(_)));
    }

    // -- ensure_targets --

    #[test]
    fn empty_target_list_is_no_data() {
        let empty: Vec<String> = Vec::new();
        assert_matches!(
            ensure_targets(RegenerableKind::ShotListItem, &empty),
            Err(CoreError::NoDataToRegenerate(RegenerableKind::ShotListItem))
        );
    }

    #[test]
    fn non_empty_target_list_passes() {
        assert!(ensure_targets(RegenerableKind::Shot, &[1]).is_ok());
    }
}
