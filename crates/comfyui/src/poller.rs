//! Job status polling with stall detection.
//!
//! After a job is submitted, [`poll_job`] fetches its status on a fixed
//! interval until the service reports a terminal state, the overall wait
//! ceiling is hit, progress stalls, or the [`CancellationToken`] fires.

use std::future::Future;
use std::time::Duration;

use storyreel_core::backend::GenerationObserver;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::ComfyServiceError;
use crate::messages::{JobState, JobStatus};

/// Polling parameters for one job kind.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_wait: Duration,
    /// Unchanged non-zero progress for this long fails the job.
    pub stall_after: Duration,
}

/// Poll `fetch` until the job completes and return its final status.
///
/// Every observed progress value is forwarded to `observer`; completion
/// reports a final 100.
pub async fn poll_job<F, Fut>(
    job_id: &str,
    config: &PollConfig,
    cancel: &CancellationToken,
    observer: &dyn GenerationObserver,
    mut fetch: F,
) -> Result<JobStatus, ComfyServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<JobStatus, ComfyServiceError>>,
{
    let started = Instant::now();
    let mut last_progress: Option<f64> = None;
    let mut last_change = started;

    loop {
        if started.elapsed() >= config.max_wait {
            tracing::warn!(job_id, waited_secs = config.max_wait.as_secs(), "Job timed out");
            return Err(ComfyServiceError::TimedOut {
                job_id: job_id.to_string(),
                waited_secs: config.max_wait.as_secs(),
            });
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(job_id, "Polling cancelled");
                return Err(ComfyServiceError::Cancelled);
            }
            result = fetch() => result?,
        };

        match status.job_state() {
            JobState::Completed => {
                tracing::info!(job_id, "Job completed");
                observer.on_progress(100.0);
                return Ok(status);
            }
            JobState::Failed => {
                let message = status.failure_message("Generation failed");
                tracing::warn!(job_id, error = %message, "Job failed");
                return Err(ComfyServiceError::JobFailed(message));
            }
            JobState::Cancelled => {
                tracing::info!(job_id, "Job cancelled by service");
                return Err(ComfyServiceError::Cancelled);
            }
            state => {
                let progress = status.progress_percent();
                tracing::debug!(job_id, ?state, progress, "Job status");
                observer.on_progress(progress);

                let now = Instant::now();
                if last_progress != Some(progress) {
                    last_progress = Some(progress);
                    last_change = now;
                } else if state == JobState::Processing
                    && progress > 0.0
                    && now.duration_since(last_change) >= config.stall_after
                {
                    tracing::warn!(job_id, progress, "Job stalled");
                    return Err(ComfyServiceError::Stalled {
                        job_id: job_id.to_string(),
                        stalled_secs: config.stall_after.as_secs(),
                    });
                }
            }
        }

        // Wait before the next poll, respecting cancellation.
        tokio::select! {
            _ = cancel.cancelled() => return Err(ComfyServiceError::Cancelled),
            _ = tokio::time::sleep(config.interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use assert_matches::assert_matches;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<f64>>,
    }

    impl GenerationObserver for Recorder {
        fn on_job_submitted(&self, _job_id: &str) {}
        fn on_progress(&self, percent: f64) {
            self.progress.lock().unwrap().push(percent);
        }
    }

    fn config() -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(600),
            stall_after: Duration::from_secs(180),
        }
    }

    fn status(state: &str, progress: f64) -> JobStatus {
        JobStatus {
            status: Some(state.to_string()),
            progress: Some(progress),
            ..Default::default()
        }
    }

    fn scripted(
        statuses: Vec<JobStatus>,
    ) -> impl FnMut() -> std::future::Ready<Result<JobStatus, ComfyServiceError>> {
        let mut queue: VecDeque<JobStatus> = statuses.into();
        move || {
            let next = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            std::future::ready(Ok(next.unwrap_or_default()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completion_reports_progress_then_100() {
        let recorder = Recorder::default();
        let fetch = scripted(vec![
            status("queued", 0.0),
            status("processing", 40.0),
            status("completed", 100.0),
        ]);
        let result = poll_job("j-1", &config(), &CancellationToken::new(), &recorder, fetch).await;
        assert!(result.is_ok());
        assert_eq!(*recorder.progress.lock().unwrap(), vec![0.0, 40.0, 100.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_carries_raw_message() {
        let mut failed = status("failed", 10.0);
        failed.error = Some("Model not loaded".to_string());
        let fetch = scripted(vec![status("processing", 10.0), failed]);
        let result =
            poll_job("j-2", &config(), &CancellationToken::new(), &Recorder::default(), fetch).await;
        assert_matches!(result, Err(ComfyServiceError::JobFailed(msg)) if msg == "Model not loaded");
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_progress_is_reported_as_stall() {
        let fetch = scripted(vec![status("processing", 37.0)]);
        let result =
            poll_job("j-3", &config(), &CancellationToken::new(), &Recorder::default(), fetch).await;
        assert_matches!(result, Err(ComfyServiceError::Stalled { stalled_secs: 180, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn queued_at_zero_never_stalls_but_times_out() {
        let fetch = scripted(vec![status("queued", 0.0)]);
        let result =
            poll_job("j-4", &config(), &CancellationToken::new(), &Recorder::default(), fetch).await;
        assert_matches!(result, Err(ComfyServiceError::TimedOut { waited_secs: 600, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_token_stops_polling() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let fetch = scripted(vec![status("processing", 5.0)]);
        let result = poll_job("j-5", &config(), &cancel, &Recorder::default(), fetch).await;
        assert_matches!(result, Err(ComfyServiceError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn service_side_cancel_is_reported() {
        let fetch = scripted(vec![status("cancelled", 12.0)]);
        let result =
            poll_job("j-6", &config(), &CancellationToken::new(), &Recorder::default(), fetch).await;
        assert_matches!(result, Err(ComfyServiceError::Cancelled));
    }
}
