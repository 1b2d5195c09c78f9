//! Destination stage and delivery collaborators.

use async_trait::async_trait;
use pulse_core::Event;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::timeline::{Completion, Stage, StageCategory, StageContext, StageResult};

/// The delivery layer behind a destination stage.
///
/// Batching and retries are up to the implementation; it must eventually
/// call `Completion::complete` for each event it accepts.
#[async_trait]
pub trait DeliveryCollaborator: Send + Sync {
    /// Accept one fully annotated event.
    async fn deliver(&self, event: Event, completion: Completion);

    /// Push out anything buffered.
    async fn flush(&self) {}
}

/// Terminal stage wrapping a delivery collaborator.
pub struct DestinationStage {
    name: String,
    collaborator: Arc<dyn DeliveryCollaborator>,
}

impl DestinationStage {
    pub fn new(name: impl Into<String>, collaborator: Arc<dyn DeliveryCollaborator>) -> Self {
        Self {
            name: name.into(),
            collaborator,
        }
    }
}

#[async_trait]
impl Stage for DestinationStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> StageCategory {
        StageCategory::Destination
    }

    async fn execute(&self, ctx: &mut StageContext) -> StageResult {
        let completion = ctx.completion();
        self.collaborator
            .deliver(ctx.event.clone(), completion)
            .await;
        StageResult::Continue
    }

    async fn flush(&self) {
        self.collaborator.flush().await;
    }
}

/// Collaborator keeping delivered events in memory.
#[derive(Debug, Default)]
pub struct MemoryDestination {
    events: RwLock<Vec<Event>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events delivered so far, in delivery order.
    pub async fn events(&self) -> Vec<Event> {
        self.events.read().await.clone()
    }

    /// Remove and return the delivered events.
    pub async fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.write().await)
    }
}

#[async_trait]
impl DeliveryCollaborator for MemoryDestination {
    async fn deliver(&self, event: Event, completion: Completion) {
        self.events.write().await.push(event.clone());
        completion.complete(event, 200, "Event tracked successfully");
    }
}
