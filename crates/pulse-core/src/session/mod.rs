//! Session boundaries and event sequencing.
//!
//! ```text
//! caller event ──► EventSequencer::process
//!                    │
//!                    ├─► SessionEngine::start_if_needed   (background only)
//!                    │     └─► [session_end, session_start]
//!                    │
//!                    ├─► session_id / event_id / time stamped
//!                    │
//!                    └─► [boundary events..., event]
//! ```
//!
//! `SessionState` is the only mutable state. It belongs to one
//! `SessionEngine` and is handed to an on-change hook after every mutation
//! so a store can persist it.

mod engine;
mod sequencer;

pub use engine::{ChangeHook, SessionEngine};
pub use sequencer::EventSequencer;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default inactivity threshold (5 minutes).
pub const DEFAULT_SESSION_TIMEOUT_MS: i64 = 5 * 60 * 1000;

/// Session identity, recency and identity fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Currently open session, `None` before the first session starts.
    #[serde(default)]
    pub session_id: Option<i64>,
    /// Time of the latest activity allowed to open or extend a session.
    #[serde(default)]
    pub last_event_time: Option<i64>,
    /// Last event id handed out.
    #[serde(default)]
    pub last_event_id: i64,
    /// Session id pinned by the caller. Never persisted.
    #[serde(skip)]
    pub explicit_session_id: Option<i64>,
    #[serde(default = "default_timeout")]
    pub session_timeout_ms: i64,
    #[serde(default)]
    pub tracking_session_events: bool,
    /// Foreground signal. Never persisted.
    #[serde(skip)]
    pub app_active: bool,
    #[serde(default)]
    pub opt_out: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

fn default_timeout() -> i64 {
    DEFAULT_SESSION_TIMEOUT_MS
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            session_id: None,
            last_event_time: None,
            last_event_id: 0,
            explicit_session_id: None,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            tracking_session_events: false,
            app_active: false,
            opt_out: false,
            user_id: None,
            device_id: None,
        }
    }
}

impl SessionState {
    /// Fresh state with the given session settings.
    pub fn new(session_timeout_ms: i64, tracking_session_events: bool) -> Self {
        Self {
            session_timeout_ms,
            tracking_session_events,
            ..Default::default()
        }
    }

    /// Merge a stored snapshot with the current settings.
    ///
    /// Settings always come from the caller, never from storage. A negative
    /// stored counter is clamped to zero.
    pub fn hydrate(
        stored: Option<SessionState>,
        session_timeout_ms: i64,
        tracking_session_events: bool,
    ) -> Self {
        let mut state = stored.unwrap_or_default();
        state.session_timeout_ms = session_timeout_ms;
        state.tracking_session_events = tracking_session_events;
        state.explicit_session_id = None;
        state.app_active = false;
        if state.last_event_id < 0 {
            tracing::warn!(
                "Stored last_event_id {} is negative, resetting to 0",
                state.last_event_id
            );
            state.last_event_id = 0;
        }
        state
    }

    /// Decode a stored JSON snapshot.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let state: SessionState = serde_json::from_slice(bytes)?;
        if state.session_timeout_ms <= 0 {
            return Err(Error::invalid_state(format!(
                "session_timeout_ms must be positive, got {}",
                state.session_timeout_ms
            )));
        }
        Ok(state)
    }

    /// Encode as a JSON snapshot.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = SessionState::default();
        assert_eq!(state.session_id, None);
        assert_eq!(state.last_event_id, 0);
        assert_eq!(state.session_timeout_ms, DEFAULT_SESSION_TIMEOUT_MS);
        assert!(!state.tracking_session_events);
    }

    #[test]
    fn test_transient_fields_not_persisted() {
        let state = SessionState {
            session_id: Some(10),
            explicit_session_id: Some(10),
            app_active: true,
            last_event_id: 4,
            ..Default::default()
        };

        let decoded = SessionState::decode(&state.encode().unwrap()).unwrap();
        assert_eq!(decoded.session_id, Some(10));
        assert_eq!(decoded.last_event_id, 4);
        assert_eq!(decoded.explicit_session_id, None);
        assert!(!decoded.app_active);
    }

    #[test]
    fn test_hydrate_uses_current_settings() {
        let stored = SessionState {
            session_id: Some(7),
            last_event_id: -3,
            session_timeout_ms: 1,
            tracking_session_events: false,
            ..Default::default()
        };

        let state = SessionState::hydrate(Some(stored), 100, true);
        assert_eq!(state.session_id, Some(7));
        assert_eq!(state.last_event_id, 0);
        assert_eq!(state.session_timeout_ms, 100);
        assert!(state.tracking_session_events);
    }

    #[test]
    fn test_decode_rejects_bad_timeout() {
        let err = SessionState::decode(br#"{"session_timeout_ms": 0}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert!(SessionState::decode(b"not json").is_err());
    }
}
