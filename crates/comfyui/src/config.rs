use std::path::PathBuf;
use std::time::Duration;

use storyreel_core::env::{parse_or, process_env, string_or};
use storyreel_core::error::CoreError;

use crate::messages::VideoModel;

/// Connection and polling settings for the generation and voice services.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL of the image/video generation service.
    pub generation_url: String,
    /// Base URL of the voice synthesis service.
    pub voice_url: String,
    /// Bearer token sent with every request, if set.
    pub api_token: Option<String>,
    pub poll_interval: Duration,
    pub image_max_wait: Duration,
    pub video_max_wait: Duration,
    /// Unchanged non-zero progress for this long fails the job.
    pub stall_after: Duration,
    pub video_model: VideoModel,
    /// Scratch directory for synthesized and merged media.
    pub media_work_dir: PathBuf,
}

impl ServiceConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                  |
    /// |--------------------------|--------------------------|
    /// | `GENERATION_SERVICE_URL` | `http://localhost:8000`  |
    /// | `VOICE_SERVICE_URL`      | `http://localhost:8001`  |
    /// | `SERVICE_API_TOKEN`      | (none)                   |
    /// | `POLL_INTERVAL_MS`       | `2000`                   |
    /// | `IMAGE_MAX_WAIT_SECS`    | `600`                    |
    /// | `VIDEO_MAX_WAIT_SECS`    | `1800`                   |
    /// | `STALL_AFTER_SECS`       | `180`                    |
    /// | `VIDEO_MODEL`            | `wan`                    |
    /// | `MEDIA_WORK_DIR`         | `$TMPDIR/storyreel`      |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let generation_url = string_or(&lookup, "GENERATION_SERVICE_URL", "http://localhost:8000")
            .trim_end_matches('/')
            .to_string();
        let voice_url = string_or(&lookup, "VOICE_SERVICE_URL", "http://localhost:8001")
            .trim_end_matches('/')
            .to_string();
        let api_token = lookup("SERVICE_API_TOKEN").filter(|t| !t.trim().is_empty());

        let poll_interval_ms: u64 = parse_or(&lookup, "POLL_INTERVAL_MS", 2000)?;
        if poll_interval_ms == 0 {
            return Err(CoreError::Validation(
                "POLL_INTERVAL_MS must be greater than 0".to_string(),
            ));
        }
        let image_max_wait_secs: u64 = parse_or(&lookup, "IMAGE_MAX_WAIT_SECS", 600)?;
        let video_max_wait_secs: u64 = parse_or(&lookup, "VIDEO_MAX_WAIT_SECS", 1800)?;
        let stall_after_secs: u64 = parse_or(&lookup, "STALL_AFTER_SECS", 180)?;

        let model_name = string_or(&lookup, "VIDEO_MODEL", VideoModel::Wan.as_str());
        let video_model = VideoModel::parse(&model_name).ok_or_else(|| {
            CoreError::Validation(format!(
                "VIDEO_MODEL must be one of wan, svd, animatediff; got {model_name:?}"
            ))
        })?;

        let media_work_dir = lookup("MEDIA_WORK_DIR")
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("storyreel"));

        Ok(Self {
            generation_url,
            voice_url,
            api_token,
            poll_interval: Duration::from_millis(poll_interval_ms),
            image_max_wait: Duration::from_secs(image_max_wait_secs),
            video_max_wait: Duration::from_secs(video_max_wait_secs),
            stall_after: Duration::from_secs(stall_after_secs),
            video_model,
            media_work_dir,
        })
    }
}
