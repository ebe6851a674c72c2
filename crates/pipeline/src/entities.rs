//! Text regeneration for screenplay entities (scenes, shot-list items,
//! shots, props, location details) using the fresh / refine / use-edited
//! strategies.

use std::sync::Arc;

use serde::Serialize;
use storyreel_core::backend::EntityRegenerator;
use storyreel_core::regeneration::{
    build_regeneration_request, ensure_targets, RegenerableKind, RegenerationMode,
};
use storyreel_core::screenplay::SceneFacts;
use storyreel_events::{EventBus, Notification};

use crate::error::PipelineError;

/// One entity to regenerate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTarget {
    /// Display name used in logs and reports.
    pub label: String,
    /// The entity's current text, possibly edited by the user.
    pub current_value: Option<String>,
}

impl EntityTarget {
    pub fn new(label: impl Into<String>, current_value: Option<String>) -> Self {
        Self {
            label: label.into(),
            current_value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityResult {
    pub label: String,
    pub regenerated: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityBatchReport {
    pub kind: RegenerableKind,
    pub mode: RegenerationMode,
    pub results: Vec<EntityResult>,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct EntityRegenerationRunner {
    regenerator: Arc<dyn EntityRegenerator>,
    bus: Arc<EventBus>,
}

impl EntityRegenerationRunner {
    pub fn new(regenerator: Arc<dyn EntityRegenerator>, bus: Arc<EventBus>) -> Self {
        Self { regenerator, bus }
    }

    /// Regenerate `targets` one at a time.
    ///
    /// An empty list fails with `NoDataToRegenerate` before any backend
    /// call. Individual failures are recorded in the report.
    pub async fn regenerate_entities(
        &self,
        kind: RegenerableKind,
        targets: &[EntityTarget],
        mode: RegenerationMode,
        facts: &SceneFacts,
    ) -> Result<EntityBatchReport, PipelineError> {
        if let Err(e) = ensure_targets(kind, targets) {
            self.bus
                .notify(Notification::warning("Nothing to regenerate", e.to_string()));
            return Err(e.into());
        }

        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            let outcome = match build_regeneration_request(
                kind,
                mode,
                facts,
                target.current_value.as_deref(),
            ) {
                Ok(request) => self
                    .regenerator
                    .regenerate(&request)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok(text) => {
                    tracing::debug!(%kind, %mode, label = %target.label, "Entity regenerated");
                    results.push(EntityResult {
                        label: target.label.clone(),
                        regenerated: Some(text),
                        error: None,
                    });
                }
                Err(error) => {
                    tracing::warn!(%kind, %mode, label = %target.label, %error, "Entity regeneration failed");
                    results.push(EntityResult {
                        label: target.label.clone(),
                        regenerated: None,
                        error: Some(error),
                    });
                }
            }
        }

        let failed = results.iter().filter(|r| r.error.is_some()).count();
        let succeeded = results.len() - failed;
        tracing::info!(%kind, %mode, succeeded, failed, "Entity regeneration finished");
        if failed > 0 {
            self.bus.notify(Notification::warning(
                format!("Regenerated {succeeded} of {} {kind} items", results.len()),
                format!("{failed} failed"),
            ));
        }

        Ok(EntityBatchReport {
            kind,
            mode,
            results,
            succeeded,
            failed,
        })
    }
}
