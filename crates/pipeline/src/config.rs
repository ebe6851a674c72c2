use std::time::Duration;

use storyreel_core::audio_timeline::{MergeOptions, TimelineOptions};
use storyreel_core::env::{parse_or, process_env, string_or};
use storyreel_core::error::CoreError;
use storyreel_core::generation::{OutputFormat, DEFAULT_ASPECT_RATIO, DEFAULT_RESOLUTION};

/// Generic progress ramp window.
pub const DEFAULT_RAMP_WINDOW: Duration = Duration::from_millis(520);

/// Orchestrator tuning loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub timeline: TimelineOptions,
    pub merge: MergeOptions,
    pub format: OutputFormat,
    /// Window over which a generic progress ramp is spread.
    pub ramp_window: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeline: TimelineOptions {
                gap_secs: 0.5,
                start_delay_secs: 0.5,
            },
            merge: MergeOptions {
                fade_in_secs: 0.3,
                fade_out_secs: 0.5,
            },
            format: OutputFormat::default(),
            ramp_window: DEFAULT_RAMP_WINDOW,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default    |
    /// |---------------------------|------------|
    /// | `AUDIO_GAP_SECS`          | `0.5`      |
    /// | `AUDIO_START_DELAY_SECS`  | `0.5`      |
    /// | `AUDIO_FADE_IN_SECS`      | `0.3`      |
    /// | `AUDIO_FADE_OUT_SECS`     | `0.5`      |
    /// | `VIDEO_ASPECT_RATIO`      | `16:9`     |
    /// | `VIDEO_RESOLUTION`        | `1024x576` |
    /// | `PROGRESS_RAMP_WINDOW_MS` | `520`      |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let seconds = |key: &str, default: f64| -> Result<f64, CoreError> {
            let value: f64 = parse_or(&lookup, key, default)?;
            if !value.is_finite() || value < 0.0 {
                return Err(CoreError::Validation(format!(
                    "{key} must be a non-negative number of seconds"
                )));
            }
            Ok(value)
        };

        let timeline = TimelineOptions {
            gap_secs: seconds("AUDIO_GAP_SECS", defaults.timeline.gap_secs)?,
            start_delay_secs: seconds("AUDIO_START_DELAY_SECS", defaults.timeline.start_delay_secs)?,
        };
        let merge = MergeOptions {
            fade_in_secs: seconds("AUDIO_FADE_IN_SECS", defaults.merge.fade_in_secs)?,
            fade_out_secs: seconds("AUDIO_FADE_OUT_SECS", defaults.merge.fade_out_secs)?,
        };

        let aspect_ratio = string_or(&lookup, "VIDEO_ASPECT_RATIO", DEFAULT_ASPECT_RATIO);
        if !is_pair(&aspect_ratio, ':') {
            return Err(CoreError::Validation(format!(
                "VIDEO_ASPECT_RATIO must look like 16:9, got {aspect_ratio:?}"
            )));
        }
        let resolution = string_or(&lookup, "VIDEO_RESOLUTION", DEFAULT_RESOLUTION);
        if !is_pair(&resolution, 'x') {
            return Err(CoreError::Validation(format!(
                "VIDEO_RESOLUTION must look like 1024x576, got {resolution:?}"
            )));
        }

        let ramp_ms: u64 = parse_or(&lookup, "PROGRESS_RAMP_WINDOW_MS", 520)?;

        Ok(Self {
            timeline,
            merge,
            format: OutputFormat {
                aspect_ratio,
                resolution,
            },
            ramp_window: Duration::from_millis(ramp_ms),
        })
    }
}

/// `A<sep>B` with both sides positive integers.
fn is_pair(value: &str, sep: char) -> bool {
    value
        .split_once(sep)
        .and_then(|(a, b)| Some((a.trim().parse::<u32>().ok()?, b.trim().parse::<u32>().ok()?)))
        .is_some_and(|(a, b)| a > 0 && b > 0)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn from(pairs: &[(&str, &str)]) -> Result<PipelineConfig, CoreError> {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(move |key| {
            pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
        })
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = from(&[]).unwrap();
        assert_eq!(config.timeline.gap_secs, 0.5);
        assert_eq!(config.timeline.start_delay_secs, 0.5);
        assert_eq!(config.merge.fade_in_secs, 0.3);
        assert_eq!(config.merge.fade_out_secs, 0.5);
        assert_eq!(config.format.aspect_ratio, "16:9");
        assert_eq!(config.format.resolution, "1024x576");
        assert_eq!(config.ramp_window, Duration::from_millis(520));
    }

    #[test]
    fn overrides_are_applied() {
        let config = from(&[("AUDIO_GAP_SECS", "1.25"), ("VIDEO_RESOLUTION", "768x768")]).unwrap();
        assert_eq!(config.timeline.gap_secs, 1.25);
        assert_eq!(config.format.resolution, "768x768");
    }

    #[test]
    fn negative_durations_are_rejected() {
        assert_matches!(
            from(&[("AUDIO_FADE_OUT_SECS", "-1")]),
            Err(CoreError::Validation(msg)) if msg.contains("AUDIO_FADE_OUT_SECS")
        );
    }

    #[test]
    fn malformed_geometry_is_rejected() {
        assert_matches!(
            from(&[("VIDEO_ASPECT_RATIO", "wide")]),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            from(&[("VIDEO_RESOLUTION", "1024*576")]),
            Err(CoreError::Validation(_))
        );
    }
}
