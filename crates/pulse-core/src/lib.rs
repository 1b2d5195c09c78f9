//! pulse-core - Core library for Pulse
//!
//! Pure session logic shared by the SDK and the CLI. Nothing in this crate
//! performs I/O or reads a clock; every operation takes the current time
//! as an argument.
//!
//! - **session**: session state, the session engine and the event sequencer
//! - **types**: events, activity signals and delivery results

pub mod error;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use session::{EventSequencer, SessionEngine, SessionState};
pub use types::{ActivityState, DeliveryResult, Event, SESSION_END, SESSION_START};
