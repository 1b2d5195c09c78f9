//! Session identity and recency state machine.

use std::fmt;

use tracing::debug;

use super::SessionState;
use crate::types::Event;

/// Callback invoked with the new state after every mutation that changed it.
pub type ChangeHook = Box<dyn Fn(&SessionState) + Send + Sync>;

/// Owns `SessionState` and performs every transition on it.
///
/// Timeouts are evaluated lazily: nothing happens until the next qualifying
/// activity asks whether the open session is still fresh.
pub struct SessionEngine {
    state: SessionState,
    on_change: Option<ChangeHook>,
}

impl fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEngine")
            .field("state", &self.state)
            .field("on_change", &self.on_change.is_some())
            .finish()
    }
}

impl SessionEngine {
    /// Create an engine over an initial state.
    pub fn new(state: SessionState) -> Self {
        Self {
            state,
            on_change: None,
        }
    }

    /// Install the persistence hook.
    pub fn on_change(&mut self, hook: ChangeHook) {
        self.on_change = Some(hook);
    }

    /// Remove the persistence hook, returning it.
    pub fn take_change_hook(&mut self) -> Option<ChangeHook> {
        self.on_change.take()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Read accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn session_id(&self) -> Option<i64> {
        self.state.session_id
    }

    pub fn last_event_time(&self) -> Option<i64> {
        self.state.last_event_time
    }

    pub fn last_event_id(&self) -> i64 {
        self.state.last_event_id
    }

    pub fn explicit_session_id(&self) -> Option<i64> {
        self.state.explicit_session_id
    }

    pub fn is_app_active(&self) -> bool {
        self.state.app_active
    }

    pub fn is_opted_out(&self) -> bool {
        self.state.opt_out
    }

    pub fn user_id(&self) -> Option<&str> {
        self.state.user_id.as_deref()
    }

    pub fn device_id(&self) -> Option<&str> {
        self.state.device_id.as_deref()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session transitions
    // ─────────────────────────────────────────────────────────────────────

    /// Pin the session to `id` and switch to it immediately.
    ///
    /// Returns the boundary events of the switch; empty when `id` is
    /// already the open session.
    pub fn note_explicit_session(&mut self, id: i64, now: i64) -> Vec<Event> {
        let before = self.state.clone();
        self.state.explicit_session_id = Some(id);
        let boundary = self.transition_to(id, now);
        self.commit(&before);
        boundary
    }

    /// Open a new session if the current one is missing, overridden or stale.
    ///
    /// Returns `Some(boundary events)` when a transition was due, `None`
    /// when the open session was extended to `now` instead.
    pub fn start_if_needed(&mut self, now: i64) -> Option<Vec<Event>> {
        let before = self.state.clone();
        let result = self.evaluate(now);
        self.commit(&before);
        result
    }

    /// The host moved to the foreground.
    pub fn note_foreground(&mut self, now: i64) -> Option<Vec<Event>> {
        let before = self.state.clone();
        self.state.app_active = true;
        let result = self.evaluate(now);
        self.commit(&before);
        result
    }

    /// The host moved to the background. Only anchors recency.
    pub fn note_background(&mut self, now: i64) {
        let before = self.state.clone();
        self.state.app_active = false;
        self.state.last_event_time = Some(now);
        self.commit(&before);
    }

    /// Record activity at `now` without evaluating the session.
    pub fn extend(&mut self, now: i64) {
        let before = self.state.clone();
        self.state.last_event_time = Some(now);
        self.commit(&before);
    }

    /// Consume the next local event id.
    pub fn next_event_id(&mut self) -> i64 {
        let before = self.state.clone();
        self.state.last_event_id = self.state.last_event_id.saturating_add(1);
        self.commit(&before);
        self.state.last_event_id
    }

    // ─────────────────────────────────────────────────────────────────────
    // Identity and opt-out
    // ─────────────────────────────────────────────────────────────────────

    pub fn set_opt_out(&mut self, opt_out: bool) {
        let before = self.state.clone();
        self.state.opt_out = opt_out;
        self.commit(&before);
    }

    pub fn set_user_id(&mut self, user_id: Option<String>) {
        let before = self.state.clone();
        self.state.user_id = user_id;
        self.commit(&before);
    }

    pub fn set_device_id(&mut self, device_id: Option<String>) {
        let before = self.state.clone();
        self.state.device_id = device_id;
        self.commit(&before);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn evaluate(&mut self, now: i64) -> Option<Vec<Event>> {
        let candidate = self.state.explicit_session_id.unwrap_or(now);

        let override_pending = self
            .state
            .explicit_session_id
            .is_some_and(|explicit| Some(explicit) != self.state.session_id);
        let timed_out = now.saturating_sub(self.state.last_event_time.unwrap_or(0))
            >= self.state.session_timeout_ms;

        if self.state.session_id.is_none() || override_pending || timed_out {
            Some(self.transition_to(candidate, now))
        } else {
            self.state.last_event_time = Some(now);
            None
        }
    }

    /// The only writer of `session_id`.
    fn transition_to(&mut self, new_id: i64, event_time: i64) -> Vec<Event> {
        if self.state.session_id == Some(new_id) {
            return Vec::new();
        }

        let previous = self.state.session_id;
        let mut boundary = Vec::with_capacity(2);

        if self.state.tracking_session_events {
            if let Some(previous) = previous {
                // Without a recorded activity the close is stamped with the new id.
                let end_time = match self.state.last_event_time {
                    Some(last) => last.saturating_add(1),
                    None => new_id,
                };
                boundary.push(Event::session_end(previous, end_time));
            }
            boundary.push(Event::session_start(new_id, event_time));
        }

        self.state.session_id = Some(new_id);
        self.state.last_event_time = Some(event_time);

        debug!(
            "Session transition {:?} -> {} at {} ({} boundary events)",
            previous,
            new_id,
            event_time,
            boundary.len()
        );

        boundary
    }

    fn commit(&self, before: &SessionState) {
        if self.state == *before {
            return;
        }
        if let Some(hook) = &self.on_change {
            hook(&self.state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SESSION_END, SESSION_START};
    use std::sync::{Arc, Mutex};

    fn engine(timeout: i64, tracking: bool) -> SessionEngine {
        SessionEngine::new(SessionState::new(timeout, tracking))
    }

    #[test]
    fn test_first_activity_opens_session() {
        let mut engine = engine(100, true);

        let boundary = engine.start_if_needed(950).unwrap();
        assert_eq!(boundary, vec![Event::session_start(950, 950)]);
        assert_eq!(engine.session_id(), Some(950));
        assert_eq!(engine.last_event_time(), Some(950));
    }

    #[test]
    fn test_activity_within_timeout_extends() {
        let mut engine = engine(100, true);
        engine.start_if_needed(950);

        assert!(engine.start_if_needed(1049).is_none());
        assert_eq!(engine.session_id(), Some(950));
        assert_eq!(engine.last_event_time(), Some(1049));
    }

    #[test]
    fn test_gap_equal_to_timeout_starts_new_session() {
        let mut engine = engine(100, true);
        engine.start_if_needed(1000);

        let boundary = engine.start_if_needed(1100).unwrap();
        assert_eq!(boundary.len(), 2);
        assert_eq!(boundary[0], Event::session_end(1000, 1001));
        assert_eq!(boundary[1], Event::session_start(1100, 1100));
        assert_eq!(engine.session_id(), Some(1100));
    }

    #[test]
    fn test_tracking_disabled_emits_nothing_but_transitions() {
        let mut engine = engine(100, false);
        engine.start_if_needed(1000);

        let boundary = engine.start_if_needed(5000).unwrap();
        assert!(boundary.is_empty());
        assert_eq!(engine.session_id(), Some(5000));
        assert_eq!(engine.last_event_time(), Some(5000));
    }

    #[test]
    fn test_explicit_session_is_idempotent() {
        let mut engine = engine(100, true);
        engine.start_if_needed(1000);

        let first = engine.note_explicit_session(5000, 1010);
        assert_eq!(
            first.iter().map(|e| e.event_type.as_str()).collect::<Vec<_>>(),
            vec![SESSION_END, SESSION_START]
        );
        assert_eq!(first[0].session_id, Some(1000));
        assert_eq!(first[1].session_id, Some(5000));
        assert_eq!(first[1].time, Some(1010));

        assert!(engine.note_explicit_session(5000, 1020).is_empty());
        assert_eq!(engine.explicit_session_id(), Some(5000));
    }

    #[test]
    fn test_explicit_session_pins_stale_checks() {
        let mut engine = engine(100, true);
        engine.note_explicit_session(5000, 1000);

        // Stale by timestamp, but the candidate is the pinned id.
        let boundary = engine.start_if_needed(9000).unwrap();
        assert!(boundary.is_empty());
        assert_eq!(engine.session_id(), Some(5000));
    }

    #[test]
    fn test_session_end_falls_back_to_new_id() {
        let mut state = SessionState::new(100, true);
        state.session_id = Some(10);
        state.last_event_time = None;
        let mut engine = SessionEngine::new(state);

        let boundary = engine.start_if_needed(500).unwrap();
        assert_eq!(boundary[0], Event::session_end(10, 500));
        assert_eq!(boundary[1], Event::session_start(500, 500));
    }

    #[test]
    fn test_background_only_anchors_recency() {
        let mut engine = engine(100, true);
        engine.start_if_needed(1000);
        engine.note_foreground(1010);
        assert!(engine.is_app_active());

        engine.note_background(1050);
        assert!(!engine.is_app_active());
        assert_eq!(engine.session_id(), Some(1000));
        assert_eq!(engine.last_event_time(), Some(1050));

        // Gap is measured from the moment the host went to the background.
        assert!(engine.note_foreground(1140).is_none());
        assert!(engine.note_foreground(1240).is_some());
    }

    #[test]
    fn test_extreme_times_saturate() {
        let mut engine = engine(100, true);
        engine.start_if_needed(1000);

        // Far in the past: the gap saturates to a huge negative, not stale.
        assert!(engine.start_if_needed(i64::MIN).is_none());
        assert_eq!(engine.last_event_time(), Some(i64::MIN));

        // From i64::MIN to anything positive saturates to i64::MAX.
        let boundary = engine.start_if_needed(i64::MAX).unwrap();
        assert_eq!(boundary[0], Event::session_end(1000, i64::MIN + 1));
        assert_eq!(engine.session_id(), Some(i64::MAX));

        // Closing a session last active at i64::MAX.
        let boundary = engine.note_explicit_session(7, 0);
        assert_eq!(boundary[0], Event::session_end(i64::MAX, i64::MAX));
        assert_eq!(boundary[1], Event::session_start(7, 0));
    }

    #[test]
    fn test_event_ids_are_monotonic() {
        let mut engine = engine(100, false);
        assert_eq!(engine.next_event_id(), 1);
        assert_eq!(engine.next_event_id(), 2);
        assert_eq!(engine.last_event_id(), 2);
    }

    #[test]
    fn test_change_hook_fires_only_on_change() {
        let seen: Arc<Mutex<Vec<SessionState>>> = Arc::default();
        let mut engine = engine(100, true);
        let sink = seen.clone();
        engine.on_change(Box::new(move |state| {
            sink.lock().unwrap().push(state.clone());
        }));

        engine.start_if_needed(1000);
        engine.extend(1000);
        engine.note_explicit_session(1000, 1000);
        engine.set_user_id(Some("user-1".into()));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].session_id, Some(1000));
        assert_eq!(seen[1].explicit_session_id, Some(1000));
        assert_eq!(seen[2].user_id.as_deref(), Some("user-1"));
    }
}
