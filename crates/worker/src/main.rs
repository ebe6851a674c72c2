//! Batch worker: regenerates every shot of a screenplay document against
//! the configured generation service and writes results back to the file.
//!
//! The first Ctrl-C stops the batch after the shot in flight; a second one
//! asks the backend to cancel the in-flight job and stops waiting on it.

use std::sync::Arc;

use storyreel_comfyui::{MediaAudioBackend, ServiceBackend, ServiceConfig};
use storyreel_events::{EventBus, OrchestratorEvent};
use storyreel_pipeline::{
    CancelOutcome, Collaborators, PipelineConfig, PipelineError, ShotOrchestrator,
};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod store;

use config::WorkerConfig;
use store::{ConfiguredConfirmation, JsonSceneStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let worker = WorkerConfig::from_env()?;
    let service = ServiceConfig::from_env()?;
    let pipeline = PipelineConfig::from_env()?;
    tracing::info!(
        scene_file = %worker.scene_file.display(),
        kind = %worker.kind,
        continuity = worker.continuity,
        mode = %worker.mode,
        generation_url = %service.generation_url,
        "Worker starting",
    );

    let store = Arc::new(JsonSceneStore::load(&worker.scene_file).await?);
    let document = store.snapshot().await;

    let stop = CancellationToken::new();
    let shutdown = CancellationToken::new();

    let bus = Arc::new(EventBus::default());
    tokio::spawn(log_events(Arc::clone(&bus), shutdown.clone()));

    let collaborators = Collaborators {
        generation: Arc::new(ServiceBackend::new(&service, shutdown.clone())),
        audio: Arc::new(MediaAudioBackend::new(&service)),
        store,
        confirmation: Arc::new(ConfiguredConfirmation::new(worker.allow_silent_lines)),
    };
    let orchestrator = Arc::new(ShotOrchestrator::new(
        collaborators,
        bus,
        pipeline,
        document.characters,
    ));
    tokio::spawn(watch_ctrl_c(
        Arc::clone(&orchestrator),
        stop.clone(),
        shutdown.clone(),
    ));

    let options = worker.shot_options();
    for scene in &document.scenes {
        if stop.is_cancelled() {
            break;
        }
        match orchestrator.regenerate_all(scene, options, &stop).await {
            Ok(report) => tracing::info!(
                scene = scene.scene_number,
                outcome = %report.outcome,
                summary = %report.summary(),
                "Scene done",
            ),
            Err(PipelineError::Core(e)) => {
                tracing::warn!(scene = scene.scene_number, error = %e, "Scene skipped");
            }
            Err(e) => return Err(e.into()),
        }
    }

    shutdown.cancel();
    tracing::info!("Worker finished");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storyreel_worker=debug,storyreel_pipeline=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn watch_ctrl_c(
    orchestrator: Arc<ShotOrchestrator>,
    stop: CancellationToken,
    shutdown: CancellationToken,
) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    tracing::warn!("Stopping after the current shot; press Ctrl-C again to abort it");
    stop.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        abort_in_flight(&orchestrator, &shutdown).await;
    }
}

/// Ask the backend to cancel every in-flight job, then stop polling.
async fn abort_in_flight(orchestrator: &ShotOrchestrator, shutdown: &CancellationToken) {
    tracing::warn!("Cancelling in-flight jobs");
    for (slot, result) in orchestrator.cancel_all().await {
        match result {
            Ok(CancelOutcome::Cancelled) => tracing::info!(%slot, "In-flight job cancelled"),
            Ok(CancelOutcome::AlreadyFinished) => tracing::info!(%slot, "Job had already finished"),
            Err(e) => tracing::warn!(%slot, error = %e, "Cancel failed, abandoning job"),
        }
    }
    shutdown.cancel();
}

/// Mirror bus traffic into the log until shutdown.
async fn log_events(bus: Arc<EventBus>, shutdown: CancellationToken) {
    let mut rx = bus.subscribe();
    loop {
        let stamped = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = rx.recv() => match received {
                Ok(stamped) => stamped,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event log lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        };

        match &stamped.event {
            OrchestratorEvent::ShotProgress { .. } | OrchestratorEvent::AudioProgress { .. } => {
                tracing::trace!(event = ?stamped.event, "Progress");
            }
            OrchestratorEvent::Notification(n) => {
                tracing::info!(level = ?n.level, title = %n.title, message = %n.message, "Notification");
            }
            event => {
                let payload = serde_json::to_string(event).unwrap_or_default();
                tracing::debug!(message_type = event.message_type(), %payload, "Event");
            }
        }
    }
}
