//! [`GenerationBackend`] implementation over the generation service.

use storyreel_core::backend::{CancelAck, GenerationBackend, GenerationObserver};
use storyreel_core::error::BackendError;
use storyreel_core::generation::GenerationRequest;
use storyreel_core::types::ArtifactRef;
use tokio_util::sync::CancellationToken;

use crate::api::{ComfyServiceError, GenerationServiceApi};
use crate::config::ServiceConfig;
use crate::messages::{ImageJobBody, VideoJobBody, VideoModel};
use crate::poller::{poll_job, PollConfig};

/// Submits jobs to the generation service and polls them to completion.
pub struct ServiceBackend {
    api: GenerationServiceApi,
    image_poll: PollConfig,
    video_poll: PollConfig,
    video_model: VideoModel,
    cancel: CancellationToken,
}

impl ServiceBackend {
    /// `cancel` stops every in-progress poll when the process shuts down.
    pub fn new(config: &ServiceConfig, cancel: CancellationToken) -> Self {
        Self {
            api: GenerationServiceApi::new(config.generation_url.clone(), config.api_token.clone()),
            image_poll: PollConfig {
                interval: config.poll_interval,
                max_wait: config.image_max_wait,
                stall_after: config.stall_after,
            },
            video_poll: PollConfig {
                interval: config.poll_interval,
                max_wait: config.video_max_wait,
                stall_after: config.stall_after,
            },
            video_model: config.video_model,
            cancel,
        }
    }
}

#[async_trait::async_trait]
impl GenerationBackend for ServiceBackend {
    async fn submit_image(
        &self,
        request: &GenerationRequest,
        observer: &dyn GenerationObserver,
    ) -> Result<ArtifactRef, BackendError> {
        let body = ImageJobBody::from_request(request);
        let job_id = self.api.submit_image(&body).await?;
        tracing::info!(job_id, shot = %request.shot_number, seed = ?request.seed, "Image job submitted");
        observer.on_job_submitted(&job_id);

        let status = poll_job(&job_id, &self.image_poll, &self.cancel, observer, || {
            self.api.image_job_status(&job_id)
        })
        .await?;

        status
            .image_artifact()
            .ok_or_else(|| ComfyServiceError::MissingArtifact { job_id }.into())
    }

    async fn submit_video(
        &self,
        request: &GenerationRequest,
        observer: &dyn GenerationObserver,
    ) -> Result<ArtifactRef, BackendError> {
        let body = VideoJobBody::from_request(request, self.video_model);
        let job_id = self.api.submit_video(self.video_model, &body).await?;
        tracing::info!(
            job_id,
            shot = %request.shot_number,
            model = self.video_model.as_str(),
            continuity = request.prior_artifact.is_some(),
            "Video job submitted",
        );
        observer.on_job_submitted(&job_id);

        let status = poll_job(&job_id, &self.video_poll, &self.cancel, observer, || {
            self.api.video_job_status(&job_id)
        })
        .await?;

        if let Some(storage_error) = status.storage_error() {
            return Err(BackendError::Generation(format!(
                "Storage upload failed: {storage_error}"
            )));
        }
        status
            .video_artifact()
            .ok_or_else(|| ComfyServiceError::MissingArtifact { job_id }.into())
    }

    async fn cancel_job(&self, job_id: &str) -> Result<CancelAck, BackendError> {
        let ack = self.api.cancel_job(job_id).await?;
        tracing::info!(job_id, success = ack.success, message = %ack.message, "Cancel acknowledged");
        Ok(ack)
    }
}
