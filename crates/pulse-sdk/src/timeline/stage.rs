//! Pipeline stages.
//!
//! A stage is one step an event passes through on its way to delivery.
//! Stages belong to exactly one `StageCategory`; categories always run in
//! the order `Before` → `Enrichment` → `Destination`.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use pulse_sdk::timeline::{Stage, StageCategory, StageContext, StageResult};
//!
//! struct PlatformStage;
//!
//! #[async_trait]
//! impl Stage for PlatformStage {
//!     fn name(&self) -> &str {
//!         "platform"
//!     }
//!
//!     fn category(&self) -> StageCategory {
//!         StageCategory::Enrichment
//!     }
//!
//!     async fn execute(&self, ctx: &mut StageContext) -> StageResult {
//!         ctx.event.extra.insert("platform".into(), "linux".into());
//!         StageResult::Continue
//!     }
//! }
//! ```

use async_trait::async_trait;
use pulse_core::{DeliveryResult, Event};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;
use tracing::warn;

use crate::{PulseConfig, PulseResult};

// ─────────────────────────────────────────────────────────────────────────────
// Stage Category
// ─────────────────────────────────────────────────────────────────────────────

/// Category of a stage. The derived ordering is the execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageCategory {
    /// Identity stamping (session, event ids). May drop an event.
    Before,

    /// Payload additions. Must not touch session state.
    Enrichment,

    /// Hands the event to a delivery collaborator. Terminal.
    Destination,
}

impl fmt::Display for StageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageCategory::Before => write!(f, "before"),
            StageCategory::Enrichment => write!(f, "enrichment"),
            StageCategory::Destination => write!(f, "destination"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stage Context
// ─────────────────────────────────────────────────────────────────────────────

/// Signals the end of delivery for one event.
///
/// Dropping it without calling `complete` resolves the event as abandoned.
#[derive(Debug)]
pub struct Completion {
    tx: oneshot::Sender<DeliveryResult>,
}

impl Completion {
    /// Create a completion and the receiver awaiting it.
    pub fn channel() -> (Self, oneshot::Receiver<DeliveryResult>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Report the delivery outcome.
    pub fn complete(self, event: Event, code: u16, message: impl Into<String>) {
        // The receiver is gone when nobody waits for the result.
        let _ = self.tx.send(DeliveryResult::new(event, code, message));
    }
}

/// Context handed to each stage for one event.
#[derive(Debug, Default)]
pub struct StageContext {
    /// The event being processed.
    pub event: Event,
    /// Events synthesized by the current stage. They run through the
    /// remaining stages, in order, before `event` continues.
    pub preceding: Vec<Event>,
    completions: Vec<oneshot::Receiver<DeliveryResult>>,
}

impl StageContext {
    pub fn new(event: Event) -> Self {
        Self {
            event,
            ..Default::default()
        }
    }

    /// Queue a synthesized event ahead of the current one.
    pub fn emit_before(&mut self, event: Event) {
        self.preceding.push(event);
    }

    /// Register a pending delivery for the current event.
    pub fn completion(&mut self) -> Completion {
        let (completion, rx) = Completion::channel();
        self.completions.push(rx);
        completion
    }

    pub(crate) fn into_parts(self) -> (Event, Vec<oneshot::Receiver<DeliveryResult>>) {
        (self.event, self.completions)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stage Result
// ─────────────────────────────────────────────────────────────────────────────

/// Error information for stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

impl StageError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for StageError {}

/// Result of stage execution.
#[derive(Debug)]
pub enum StageResult {
    /// Forward the (possibly modified) event to the next stage.
    Continue,
    /// Stop this event here. Not an error.
    Drop,
    /// Fail this event. It is dropped and the stage's `on_error` runs.
    Abort(StageError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Stage Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for implementing pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Name of the stage, unique within a timeline.
    fn name(&self) -> &str;

    /// Category at which this stage executes.
    fn category(&self) -> StageCategory;

    /// Called once when the stage is registered, before it sees any event.
    async fn setup(&self, _config: &PulseConfig) -> PulseResult<()> {
        Ok(())
    }

    /// Process one event.
    async fn execute(&self, ctx: &mut StageContext) -> StageResult;

    /// Push out any buffered work.
    async fn flush(&self) {}

    /// Called when the stage is removed from the timeline.
    async fn teardown(&self) {}

    /// Error channel for failures of this stage.
    fn on_error(&self, error: &StageError) {
        warn!("Stage {} failed: {}", self.name(), error);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stage Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating stages from closures.
pub struct StageBuilder {
    name: String,
    category: StageCategory,
}

impl StageBuilder {
    /// Create a new stage builder.
    pub fn new(name: impl Into<String>, category: StageCategory) -> Self {
        Self {
            name: name.into(),
            category,
        }
    }

    /// Build with a synchronous closure over the event.
    pub fn build<F>(self, handler: F) -> ClosureStage<F>
    where
        F: Fn(&mut Event) -> StageResult + Send + Sync + 'static,
    {
        ClosureStage {
            name: self.name,
            category: self.category,
            handler,
        }
    }
}

/// Stage implementation using a closure.
pub struct ClosureStage<F> {
    name: String,
    category: StageCategory,
    handler: F,
}

#[async_trait]
impl<F> Stage for ClosureStage<F>
where
    F: Fn(&mut Event) -> StageResult + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> StageCategory {
        self.category
    }

    async fn execute(&self, ctx: &mut StageContext) -> StageResult {
        (self.handler)(&mut ctx.event)
    }
}
