//! Ordered execution of stages over each event.

use futures::future::{BoxFuture, FutureExt};
use pulse_core::{DeliveryResult, Event};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{RwLock, oneshot};
use tracing::{debug, warn};

use super::stage::{Stage, StageCategory, StageContext, StageError, StageResult};
use crate::{PulseConfig, PulseError, PulseResult};

/// How an event left the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraversalStatus {
    /// Every stage ran; destinations may still be delivering.
    Delivered,
    /// A stage declined to forward the event.
    Dropped { stage: String },
    /// A stage failed on the event.
    Failed { stage: String, error: StageError },
}

/// One event's pass through the timeline.
#[derive(Debug)]
pub struct Traversal {
    /// The event as the last stage that saw it left it.
    pub event: Event,
    pub status: TraversalStatus,
    completions: Vec<oneshot::Receiver<DeliveryResult>>,
}

impl Traversal {
    fn finish(ctx: StageContext, status: TraversalStatus) -> Self {
        let (event, completions) = ctx.into_parts();
        Self {
            event,
            status,
            completions,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.status == TraversalStatus::Delivered
    }

    /// Wait for the first destination's outcome.
    ///
    /// Events that never reached a destination resolve with code 0.
    pub async fn result(self) -> DeliveryResult {
        let Traversal {
            event,
            status,
            completions,
        } = self;

        match status {
            TraversalStatus::Dropped { stage } => {
                DeliveryResult::skipped(event, format!("Event dropped by stage {}", stage))
            }
            TraversalStatus::Failed { stage, error } => {
                DeliveryResult::skipped(event, format!("Stage {} failed: {}", stage, error))
            }
            TraversalStatus::Delivered => match completions.into_iter().next() {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| DeliveryResult::skipped(event, "Delivery abandoned")),
                None => DeliveryResult::skipped(event, "No destination accepted the event"),
            },
        }
    }
}

/// Ordered set of stages.
///
/// Stages run by category (`Before`, `Enrichment`, `Destination`) and by
/// registration order within a category. Each stage is awaited before the
/// next one starts.
#[derive(Default)]
pub struct Timeline {
    stages: RwLock<BTreeMap<StageCategory, Vec<Arc<dyn Stage>>>>,
}

impl Timeline {
    /// Create a new empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set up and add a stage.
    pub async fn register(&self, stage: Arc<dyn Stage>, config: &PulseConfig) -> PulseResult<()> {
        let name = stage.name().to_string();

        if self.contains(&name).await {
            return Err(PulseError::invalid_operation(format!(
                "Stage already registered: {}",
                name
            )));
        }

        stage
            .setup(config)
            .await
            .map_err(|e| PulseError::stage(&name, format!("setup failed: {}", e)))?;

        let mut stages = self.stages.write().await;
        debug!("Registered {} stage {}", stage.category(), name);
        stages.entry(stage.category()).or_default().push(stage);
        Ok(())
    }

    /// Remove a stage by name and tear it down.
    pub async fn deregister(&self, name: &str) -> PulseResult<()> {
        let removed = {
            let mut stages = self.stages.write().await;
            let mut removed = None;
            for category_stages in stages.values_mut() {
                if let Some(index) = category_stages.iter().position(|s| s.name() == name) {
                    removed = Some(category_stages.remove(index));
                    break;
                }
            }
            removed
        };

        let stage = removed.ok_or_else(|| PulseError::not_found("Stage", name))?;
        stage.teardown().await;
        debug!("Deregistered stage {}", name);
        Ok(())
    }

    /// Check whether a stage with this name is registered.
    pub async fn contains(&self, name: &str) -> bool {
        let stages = self.stages.read().await;
        stages.values().flatten().any(|s| s.name() == name)
    }

    /// Stage names in execution order.
    pub async fn stage_names(&self) -> Vec<String> {
        let stages = self.stages.read().await;
        stages.values().flatten().map(|s| s.name().to_string()).collect()
    }

    /// Run `event` through every stage.
    ///
    /// Returns one traversal per event that entered the pipeline: events
    /// synthesized along the way come first, the pushed event is last.
    pub async fn push(&self, event: Event) -> Vec<Traversal> {
        let stages = self.snapshot().await;
        let mut traversals = Vec::new();
        traverse(&stages, 0, event, &mut traversals).await;
        traversals
    }

    /// Flush every stage.
    pub async fn flush(&self) {
        for stage in self.snapshot().await {
            stage.flush().await;
        }
    }

    /// Tear down and remove every stage.
    pub async fn teardown_all(&self) {
        let stages: Vec<Arc<dyn Stage>> = {
            let mut stages = self.stages.write().await;
            std::mem::take(&mut *stages).into_values().flatten().collect()
        };
        for stage in stages {
            stage.teardown().await;
        }
    }

    async fn snapshot(&self) -> Vec<Arc<dyn Stage>> {
        let stages = self.stages.read().await;
        stages.values().flatten().cloned().collect()
    }
}

/// Run `event` through `stages[start..]`, appending finished traversals to `out`.
fn traverse<'a>(
    stages: &'a [Arc<dyn Stage>],
    start: usize,
    event: Event,
    out: &'a mut Vec<Traversal>,
) -> BoxFuture<'a, ()> {
    async move {
        let mut ctx = StageContext::new(event);

        for (index, stage) in stages.iter().enumerate().skip(start) {
            let result = stage.execute(&mut ctx).await;

            for synthesized in std::mem::take(&mut ctx.preceding) {
                traverse(stages, index + 1, synthesized, out).await;
            }

            match result {
                StageResult::Continue => {}
                StageResult::Drop => {
                    debug!("Event {} dropped by {}", ctx.event.event_type, stage.name());
                    let status = TraversalStatus::Dropped {
                        stage: stage.name().to_string(),
                    };
                    out.push(Traversal::finish(ctx, status));
                    return;
                }
                StageResult::Abort(error) => {
                    stage.on_error(&error);
                    warn!(
                        "Event {} failed at stage {}: {}",
                        ctx.event.event_type,
                        stage.name(),
                        error
                    );
                    let status = TraversalStatus::Failed {
                        stage: stage.name().to_string(),
                        error,
                    };
                    out.push(Traversal::finish(ctx, status));
                    return;
                }
            }
        }

        out.push(Traversal::finish(ctx, TraversalStatus::Delivered));
    }
    .boxed()
}
