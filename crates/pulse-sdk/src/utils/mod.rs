//! SDK Utilities
//!
//! Common utilities for the SDK.

mod time;

pub use time::{Clock, ManualClock, SystemClock, now_millis};
