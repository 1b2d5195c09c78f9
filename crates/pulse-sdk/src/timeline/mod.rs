//! Event Pipeline
//!
//! Every tracked event passes through the timeline:
//!
//! ```text
//! track(event)
//!   │
//!   ├─► Before        session stage: time, session_id, event_id, boundary events
//!   │
//!   ├─► Enrichment    identity stage and caller stages: payload additions
//!   │
//!   └─► Destination   delivery collaborators: terminal
//! ```
//!
//! One event clears the whole timeline before the next one enters it.

mod pipeline;
mod stage;

pub use pipeline::{Timeline, Traversal, TraversalStatus};
pub use stage::{
    ClosureStage, Completion, Stage, StageBuilder, StageCategory, StageContext, StageError,
    StageResult,
};
