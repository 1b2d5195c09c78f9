//! Shared types for pulse-core.
//!
//! These types flow between the session engine, the SDK pipeline and the
//! delivery layer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Event type of the synthetic event opening a session.
pub const SESSION_START: &str = "session_start";

/// Event type of the synthetic event closing a session.
pub const SESSION_END: &str = "session_end";

// ─────────────────────────────────────────────────────────────────────────────
// Event
// ─────────────────────────────────────────────────────────────────────────────

/// A tracked event.
///
/// Callers usually only fill in `event_type` and properties; the pipeline
/// assigns `time`, `session_id`, `event_id` and identity fields when they
/// are absent. Unknown fields survive a serde round trip through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub event_properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub user_properties: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    /// Create an event of the given type with every other field unset.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Default::default()
        }
    }

    /// Synthetic `session_start` for `session_id` at `time`.
    pub fn session_start(session_id: i64, time: i64) -> Self {
        Self::new(SESSION_START)
            .with_session_id(session_id)
            .with_time(time)
    }

    /// Synthetic `session_end` for `session_id` at `time`.
    pub fn session_end(session_id: i64, time: i64) -> Self {
        Self::new(SESSION_END)
            .with_session_id(session_id)
            .with_time(time)
    }

    pub fn with_time(mut self, time: i64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_session_id(mut self, session_id: i64) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_event_id(mut self, event_id: i64) -> Self {
        self.event_id = Some(event_id);
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Add an entry to `event_properties`.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.event_properties.insert(key.into(), value.into());
        self
    }

    /// Add an entry to `user_properties`.
    pub fn with_user_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.user_properties.insert(key.into(), value.into());
        self
    }

    /// Whether this is a synthetic `session_start` / `session_end` event.
    pub fn is_boundary(&self) -> bool {
        self.event_type == SESSION_START || self.event_type == SESSION_END
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Activity
// ─────────────────────────────────────────────────────────────────────────────

/// Foreground/background signal reported by the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    Active,
    Background,
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityState::Active => write!(f, "active"),
            ActivityState::Background => write!(f, "background"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Delivery
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome reported for a single event by the delivery layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// The event as it was handed to delivery.
    pub event: Event,
    /// Status code. 200 is success, 0 means the SDK never sent it.
    pub code: u16,
    pub message: String,
}

impl DeliveryResult {
    pub fn new(event: Event, code: u16, message: impl Into<String>) -> Self {
        Self {
            event,
            code,
            message: message.into(),
        }
    }

    /// Result for an event the SDK skipped before delivery.
    pub fn skipped(event: Event, message: impl Into<String>) -> Self {
        Self::new(event, 0, message)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}
