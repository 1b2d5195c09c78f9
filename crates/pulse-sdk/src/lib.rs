//! Pulse SDK - Client Library for Event Tracking
//!
//! This crate wires the session engine from `pulse-core` into an
//! asynchronous client:
//!
//! - **client** - `Client` entry point, init, pre-init queueing, shutdown
//! - **timeline** - ordered stage pipeline every event traverses
//! - **plugins** - built-in session, identity and destination stages
//! - **storage** - session state stores and the background persister
//! - **session** - shared handle over the event sequencer
//!
//! # Example
//!
//! ```rust,no_run
//! use pulse_sdk::{Client, PulseConfig};
//! use pulse_sdk::plugins::MemoryDestination;
//! use pulse_core::Event;
//! use std::sync::Arc;
//!
//! async fn example() -> pulse_sdk::PulseResult<()> {
//!     let destination = Arc::new(MemoryDestination::new());
//!     let client = Client::builder(PulseConfig::new("api-key").with_session_events(true))
//!         .destination(destination.clone())
//!         .build()?;
//!
//!     // Calls made before init are replayed once it completes
//!     let pending = client.track(Event::new("app_opened")).await;
//!     client.init().await?;
//!
//!     let result = pending.result().await;
//!     assert_eq!(result.event.session_id, client.session_id());
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

// ─────────────────────────────────────────────────────────────────────────────
// Re-export core types from pulse-core
// ─────────────────────────────────────────────────────────────────────────────

/// Event, delivery result and activity types
pub use pulse_core::types;

/// Error types from core
pub use pulse_core::error as core_error;

pub use pulse_core::{ActivityState, DeliveryResult, Event, SESSION_END, SESSION_START, SessionState};

// ─────────────────────────────────────────────────────────────────────────────
// SDK modules
// ─────────────────────────────────────────────────────────────────────────────

pub mod plugins;
pub mod session;
pub mod storage;
pub mod timeline;
pub mod utils;

mod client;
mod config;
mod error;
mod queue;

pub use client::{CLOSED_MESSAGE, Client, ClientBuilder, OPT_OUT_MESSAGE, TrackHandle};
pub use config::{ConfigValidationError, DEFAULT_INSTANCE_NAME, PulseConfig};
pub use error::{PulseError, PulseResult};
pub use storage::{MemorySessionStore, SessionStore};
pub use timeline::{Stage, StageCategory, StageContext, StageResult, Timeline};
