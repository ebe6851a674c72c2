//! "Regenerate all" over a scene's shots.
//!
//! Shots run strictly one after another: shot *i* is built from the scene
//! as it stands after shot *i - 1*, so continuity sees the newest
//! artifact. A failed shot is recorded and the batch moves on. The stop
//! token is checked before each shot; a shot already in flight runs to its
//! end unless its job is cancelled, which ends the batch as stopped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use storyreel_core::regeneration::{ensure_targets, RegenerableKind};
use storyreel_core::screenplay::Scene;
use storyreel_core::types::{BatchOutcome, ShotNumber};
use storyreel_events::{Notification, OrchestratorEvent};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::shot::{ShotOptions, ShotOrchestrator};

/// One shot that did not produce an artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ShotFailure {
    pub shot_number: ShotNumber,
    pub error: String,
}

/// Summary of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub outcome: BatchOutcome,
    pub succeeded: usize,
    pub failed: usize,
    /// Shots skipped because the batch was stopped first.
    pub not_started: usize,
    pub failures: Vec<ShotFailure>,
    /// The scene with every successful artifact applied.
    pub scene: Scene,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    /// Short human summary, e.g. `"2 succeeded, 1 failed"`.
    pub fn summary(&self) -> String {
        let mut summary = format!("{} succeeded, {} failed", self.succeeded, self.failed);
        if self.not_started > 0 {
            summary.push_str(&format!(", {} not started", self.not_started));
        }
        summary
    }
}

impl ShotOrchestrator {
    /// Generate every shot of `scene` in order.
    ///
    /// Fails fast with `NoDataToRegenerate` when the scene has no shots.
    /// Per-shot failures never escape; they are counted in the report.
    pub async fn regenerate_all(
        &self,
        scene: &Scene,
        options: ShotOptions,
        stop: &CancellationToken,
    ) -> Result<BatchReport, PipelineError> {
        ensure_targets(RegenerableKind::Shot, &scene.shots)?;

        let started_at = Utc::now();
        let total = scene.shots.len();
        let mut working = scene.clone();
        let mut succeeded = 0;
        let mut failures = Vec::new();
        let mut stopped = false;
        let mut reached = 0;

        tracing::info!(
            scene = scene.scene_number,
            total,
            kind = %options.kind,
            continuity = options.continuity,
            "Batch started",
        );

        for index in 0..total {
            if stop.is_cancelled() {
                stopped = true;
                break;
            }
            self.bus.publish(OrchestratorEvent::BatchProgress {
                current: index + 1,
                total,
            });

            reached += 1;
            let shot_number = working.shots[index].shot_number.clone();
            match self.generate_shot(&working, index, options).await {
                Ok(outcome) => {
                    working = outcome.scene;
                    succeeded += 1;
                }
                Err(e) if e.is_cancellation() => {
                    tracing::info!(
                        scene = scene.scene_number,
                        shot = %shot_number,
                        "Shot cancelled, stopping batch",
                    );
                    stopped = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        scene = scene.scene_number,
                        shot = %shot_number,
                        error = %e,
                        "Shot failed, continuing batch",
                    );
                    failures.push(ShotFailure {
                        shot_number,
                        error: e.to_string(),
                    });
                }
            }
        }

        let failed = failures.len();
        let outcome = if stopped || stop.is_cancelled() {
            BatchOutcome::Stopped
        } else if failed > 0 {
            BatchOutcome::CompletedWithFailures(failed)
        } else {
            BatchOutcome::Completed
        };

        let report = BatchReport {
            outcome,
            succeeded,
            failed,
            not_started: total - reached,
            failures,
            scene: working,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            scene = scene.scene_number,
            outcome = %report.outcome,
            succeeded,
            failed,
            not_started = report.not_started,
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "Batch finished",
        );
        self.bus.publish(OrchestratorEvent::BatchFinished {
            outcome,
            succeeded,
            failed,
        });
        let title = format!("Batch {outcome}");
        let notification = match outcome {
            BatchOutcome::Completed => Notification::info(title, report.summary()),
            BatchOutcome::Stopped | BatchOutcome::CompletedWithFailures(_) => {
                Notification::warning(title, report.summary())
            }
        };
        self.bus.notify(notification);

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(succeeded: usize, failed: usize, not_started: usize) -> BatchReport {
        BatchReport {
            outcome: BatchOutcome::Completed,
            succeeded,
            failed,
            not_started,
            failures: Vec::new(),
            scene: Scene::new(1),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn summary_counts_successes_and_failures() {
        assert_eq!(report(2, 1, 0).summary(), "2 succeeded, 1 failed");
    }

    #[test]
    fn summary_mentions_skipped_shots() {
        assert_eq!(report(1, 0, 2).summary(), "1 succeeded, 0 failed, 2 not started");
    }
}
