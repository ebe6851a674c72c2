//! Wire types for the generation service's REST API.
//!
//! Responses are either bare objects or wrapped in a `{success, data}`
//! envelope; [`unwrap_envelope`] normalizes both. Job status payloads use
//! `status` or `state` interchangeably depending on service version.

use serde::{Deserialize, Serialize};
use storyreel_core::backend::CancelAck;
use storyreel_core::generation::GenerationRequest;
use storyreel_core::screenplay::Shot;
use storyreel_core::types::ArtifactRef;

// ---------------------------------------------------------------------------
// Video model
// ---------------------------------------------------------------------------

/// Video generation family, selecting the submit endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoModel {
    Wan,
    Svd,
    AnimateDiff,
}

impl VideoModel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wan => "wan",
            Self::Svd => "svd",
            Self::AnimateDiff => "animatediff",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "wan" => Some(Self::Wan),
            "svd" => Some(Self::Svd),
            "animatediff" | "animate-diff" => Some(Self::AnimateDiff),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Parse a `WIDTHxHEIGHT` resolution string.
pub fn parse_resolution(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.trim().split_once(['x', 'X'])?;
    let width = w.trim().parse().ok()?;
    let height = h.trim().parse().ok()?;
    (width > 0 && height > 0).then_some((width, height))
}

/// Body of `POST /api/comfyui/generate`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageJobBody {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Previous shot's still, for visual continuity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<ArtifactRef>,
    /// This shot's own still, when refining it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_image: Option<ArtifactRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub character_images: Vec<ArtifactRef>,
    pub aspect_ratio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl ImageJobBody {
    pub fn from_request(request: &GenerationRequest) -> Self {
        let dims = parse_resolution(&request.resolution);
        Self {
            prompt: request.prompt.clone(),
            seed: request.seed,
            reference_image: request.prior_artifact.clone(),
            source_image: request.reference_artifact.clone(),
            character_images: request.character_references.clone(),
            aspect_ratio: request.aspect_ratio.clone(),
            width: dims.map(|d| d.0),
            height: dims.map(|d| d.1),
        }
    }
}

/// Body of `POST /api/video/generate/{model}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoJobBody {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Still image the clip is animated from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<ArtifactRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub character_images: Vec<ArtifactRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_video: Option<ArtifactRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_shot: Option<Shot>,
    /// This shot's own clip, when refining it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_video: Option<ArtifactRef>,
    pub aspect_ratio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub video_model: String,
}

impl VideoJobBody {
    pub fn from_request(request: &GenerationRequest, model: VideoModel) -> Self {
        let dims = parse_resolution(&request.resolution);
        Self {
            prompt: request.prompt.clone(),
            seed: request.seed,
            reference_image: request.init_image.clone(),
            character_images: request.character_references.clone(),
            previous_video: request.prior_artifact.clone(),
            previous_shot: request.prior_metadata.clone(),
            source_video: request.reference_artifact.clone(),
            aspect_ratio: request.aspect_ratio.clone(),
            width: dims.map(|d| d.0),
            height: dims.map(|d| d.1),
            video_model: model.as_str().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Strip a `{success, data}` envelope if present.
pub fn unwrap_envelope(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(mut map) if map.get("data").is_some_and(|d| d.is_object()) => {
            map.remove("data").unwrap_or_default()
        }
        other => other,
    }
}

/// Job id from a submit response: `jobId`, falling back to `id`.
pub fn extract_job_id(value: &serde_json::Value) -> Option<String> {
    ["jobId", "id"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find_map(|v| match v {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Interpret a cancel response. `success` and `message` may sit on the
/// envelope or inside `data`.
pub fn cancel_ack_from(value: &serde_json::Value) -> CancelAck {
    let data = value.get("data").filter(|d| d.is_object());
    let field = |key: &str| {
        data.and_then(|d| d.get(key))
            .or_else(|| value.get(key))
            .cloned()
    };
    CancelAck {
        success: field("success")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        message: field("message")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default(),
    }
}

/// Lifecycle state reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Unknown(String),
}

impl JobState {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "queued" | "pending" | "waiting" => Self::Queued,
            "processing" | "running" | "active" => Self::Processing,
            "completed" | "success" => Self::Completed,
            "failed" | "error" => Self::Failed,
            "cancelled" | "canceled" => Self::Cancelled,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobOutput {
    #[serde(default)]
    pub video: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_data: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub output: Option<JobOutput>,
    #[serde(default, rename = "_debug_error")]
    pub debug_error: Option<String>,
    #[serde(default)]
    pub storage_error: Option<String>,
}

/// Payload of `GET /api/{comfyui|video}/job/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub result: Option<JobResult>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobStatus {
    pub fn job_state(&self) -> JobState {
        self.state
            .as_deref()
            .or(self.status.as_deref())
            .map(JobState::parse)
            .unwrap_or(JobState::Queued)
    }

    /// Progress rounded to one decimal and clamped to 0..=100.
    pub fn progress_percent(&self) -> f64 {
        let raw = self.progress.filter(|p| p.is_finite()).unwrap_or(0.0);
        ((raw * 10.0).round() / 10.0).clamp(0.0, 100.0)
    }

    /// Raw failure message for a failed job.
    pub fn failure_message(&self, fallback: &str) -> String {
        if let Some(debug) = self.result.as_ref().and_then(|r| r.debug_error.as_deref()) {
            return format!("Backend Error: {debug}");
        }
        self.error
            .clone()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Image reference of a completed job: storage URL first, inline data
    /// second.
    pub fn image_artifact(&self) -> Option<ArtifactRef> {
        let result = self.result.as_ref()?;
        [&result.image_url, &result.image_data, &result.image]
            .into_iter()
            .flatten()
            .find(|v| !v.trim().is_empty())
            .cloned()
    }

    /// Video reference of a completed job.
    pub fn video_artifact(&self) -> Option<ArtifactRef> {
        let result = self.result.as_ref();
        result
            .and_then(|r| r.video_url.clone())
            .or_else(|| self.video_url.clone())
            .or_else(|| result.and_then(|r| r.output.as_ref()).and_then(|o| o.video.clone()))
            .filter(|v| !v.trim().is_empty())
    }

    pub fn storage_error(&self) -> Option<&str> {
        self.result.as_ref().and_then(|r| r.storage_error.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn status(value: serde_json::Value) -> JobStatus {
        serde_json::from_value(unwrap_envelope(value)).unwrap()
    }

    // -- envelope & job id --

    #[test]
    fn envelope_is_unwrapped() {
        let value = unwrap_envelope(json!({"success": true, "data": {"jobId": "j-1"}}));
        assert_eq!(extract_job_id(&value).as_deref(), Some("j-1"));
    }

    #[test]
    fn bare_response_with_id_field() {
        let value = unwrap_envelope(json!({"id": 77}));
        assert_eq!(extract_job_id(&value).as_deref(), Some("77"));
    }

    #[test]
    fn missing_job_id_is_none() {
        assert!(extract_job_id(&json!({"jobId": ""})).is_none());
    }

    #[test]
    fn cancel_ack_reads_envelope_and_data() {
        let ack = cancel_ack_from(&json!({"success": true, "data": {"message": "Job cancelled"}}));
        assert!(ack.success);
        assert_eq!(ack.message, "Job cancelled");

        let refused = cancel_ack_from(&json!({"success": false, "message": "Job already completed"}));
        assert!(refused.already_finished());
    }

    // -- job status --

    #[test]
    fn state_takes_precedence_over_status() {
        let s = status(json!({"state": "success", "status": "processing"}));
        assert_eq!(s.job_state(), JobState::Completed);
    }

    #[test]
    fn progress_is_rounded_to_one_decimal() {
        let s = status(json!({"status": "processing", "progress": 42.36}));
        assert_eq!(s.progress_percent(), 42.4);
    }

    #[test]
    fn image_url_preferred_over_inline_data() {
        let s = status(json!({
            "status": "completed",
            "result": {"imageUrl": "https://cdn/1.png", "imageData": "data:image/png;base64,AA"}
        }));
        assert_eq!(s.image_artifact().as_deref(), Some("https://cdn/1.png"));
    }

    #[test]
    fn video_url_found_in_nested_output() {
        let s = status(json!({"status": "completed", "result": {"output": {"video": "v.mp4"}}}));
        assert_eq!(s.video_artifact().as_deref(), Some("v.mp4"));
    }

    #[test]
    fn debug_error_wins_failure_message() {
        let s = status(json!({
            "status": "failed",
            "error": "generic",
            "result": {"_debug_error": "CUDA out of memory"}
        }));
        assert_eq!(s.failure_message("x"), "Backend Error: CUDA out of memory");
    }

    // -- bodies --

    #[test]
    fn resolution_parses_width_and_height() {
        assert_eq!(parse_resolution("1024x576"), Some((1024, 576)));
        assert_eq!(parse_resolution("wide"), None);
        assert_eq!(parse_resolution("0x10"), None);
    }

    #[test]
    fn video_model_names() {
        assert_eq!(VideoModel::parse("AnimateDiff"), Some(VideoModel::AnimateDiff));
        assert_eq!(VideoModel::parse("svd"), Some(VideoModel::Svd));
        assert_eq!(VideoModel::parse("gif"), None);
    }
}
