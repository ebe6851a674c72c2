//! REST client for the generation service.
//!
//! Wraps job submission, status polling and cancellation for image and
//! video jobs using [`reqwest`].

use storyreel_core::backend::CancelAck;
use storyreel_core::error::BackendError;

use crate::messages::{
    cancel_ack_from, extract_job_id, unwrap_envelope, ImageJobBody, JobStatus, VideoJobBody,
    VideoModel,
};

/// Errors from the generation service layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyServiceError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Generation service error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("No job ID in response: {0}")]
    MissingJobId(String),

    /// The job reached a failed state. Carries the service's message.
    #[error("{0}")]
    JobFailed(String),

    #[error("Job {job_id} completed without a result artifact")]
    MissingArtifact { job_id: String },

    #[error("Job {job_id} stuck with no progress for {stalled_secs}s")]
    Stalled { job_id: String, stalled_secs: u64 },

    #[error("Job {job_id} did not finish within {waited_secs}s")]
    TimedOut { job_id: String, waited_secs: u64 },

    #[error("Polling was cancelled")]
    Cancelled,
}

impl From<ComfyServiceError> for BackendError {
    fn from(err: ComfyServiceError) -> Self {
        match err {
            ComfyServiceError::Request(e) => BackendError::Transport(e.to_string()),
            ComfyServiceError::JobFailed(msg) => BackendError::Generation(msg),
            ComfyServiceError::Stalled {
                job_id,
                stalled_secs,
            } => BackendError::Stalled {
                job_id,
                stalled_secs,
            },
            ComfyServiceError::TimedOut {
                job_id,
                waited_secs,
            } => BackendError::Timeout {
                job_id,
                waited_secs,
            },
            ComfyServiceError::Cancelled => BackendError::Cancelled,
            other => BackendError::Generation(other.to_string()),
        }
    }
}

/// HTTP client for one generation service instance.
pub struct GenerationServiceApi {
    client: reqwest::Client,
    api_url: String,
    api_token: Option<String>,
}

impl GenerationServiceApi {
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8000`.
    pub fn new(api_url: String, api_token: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, api_token)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client, api_url: String, api_token: Option<String>) -> Self {
        Self {
            client,
            api_url,
            api_token,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// `POST /api/comfyui/generate`. Returns the job id.
    pub async fn submit_image(&self, body: &ImageJobBody) -> Result<String, ComfyServiceError> {
        let response = self
            .authorized(self.client.post(format!("{}/api/comfyui/generate", self.api_url)))
            .json(body)
            .send()
            .await?;
        Self::parse_job_id(response).await
    }

    /// `GET /api/comfyui/job/{id}`.
    pub async fn image_job_status(&self, job_id: &str) -> Result<JobStatus, ComfyServiceError> {
        let response = self
            .authorized(self.client.get(format!("{}/api/comfyui/job/{job_id}", self.api_url)))
            .send()
            .await?;
        Self::parse_enveloped(response).await
    }

    /// `POST /api/video/generate/{model}`. Returns the job id.
    pub async fn submit_video(
        &self,
        model: VideoModel,
        body: &VideoJobBody,
    ) -> Result<String, ComfyServiceError> {
        let response = self
            .authorized(self.client.post(format!(
                "{}/api/video/generate/{}",
                self.api_url,
                model.as_str()
            )))
            .json(body)
            .send()
            .await?;
        Self::parse_job_id(response).await
    }

    /// `GET /api/video/job/{id}`.
    pub async fn video_job_status(&self, job_id: &str) -> Result<JobStatus, ComfyServiceError> {
        let response = self
            .authorized(self.client.get(format!("{}/api/video/job/{job_id}", self.api_url)))
            .send()
            .await?;
        Self::parse_enveloped(response).await
    }

    /// `POST /api/video/cancel/{id}`.
    pub async fn cancel_job(&self, job_id: &str) -> Result<CancelAck, ComfyServiceError> {
        let response = self
            .authorized(self.client.post(format!("{}/api/video/cancel/{job_id}", self.api_url)))
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let value = response.json::<serde_json::Value>().await?;
        Ok(cancel_ack_from(&value))
    }

    // ---- private helpers ----

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Ensure the response has a success status code, otherwise return
    /// [`ComfyServiceError::ApiError`] with the `message` field of the
    /// body when present.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyServiceError> {
        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            let body = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or(text);
            return Err(ComfyServiceError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_enveloped<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyServiceError> {
        let response = Self::ensure_success(response).await?;
        let value = response.json::<serde_json::Value>().await?;
        Ok(serde_json::from_value(unwrap_envelope(value))?)
    }

    async fn parse_job_id(response: reqwest::Response) -> Result<String, ComfyServiceError> {
        let response = Self::ensure_success(response).await?;
        let raw = response.json::<serde_json::Value>().await?;
        let job = unwrap_envelope(raw.clone());
        extract_job_id(&job).ok_or_else(|| ComfyServiceError::MissingJobId(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_failure_keeps_raw_message() {
        let err: BackendError = ComfyServiceError::JobFailed("GPU out of memory".into()).into();
        assert_eq!(err, BackendError::Generation("GPU out of memory".into()));
        assert_eq!(err.to_string(), "GPU out of memory");
    }

    #[test]
    fn stall_maps_to_backend_stall() {
        let err: BackendError = ComfyServiceError::Stalled {
            job_id: "j".into(),
            stalled_secs: 180,
        }
        .into();
        assert!(matches!(err, BackendError::Stalled { stalled_secs: 180, .. }));
    }

    #[test]
    fn cancellation_is_preserved() {
        let err: BackendError = ComfyServiceError::Cancelled.into();
        assert!(err.is_cancellation());
    }

    #[test]
    fn api_error_becomes_generation_failure_with_status() {
        let err: BackendError = ComfyServiceError::ApiError {
            status: 503,
            body: "busy".into(),
        }
        .into();
        assert_eq!(
            err,
            BackendError::Generation("Generation service error (503): busy".into())
        );
    }
}
