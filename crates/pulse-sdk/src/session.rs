//! Shared access to the event sequencer.

use pulse_core::{Event, EventSequencer, SessionEngine, SessionState};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cloneable handle to the one `EventSequencer` of a client.
///
/// The lock is never held across an await point; every method is a short
/// synchronous critical section.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<EventSequencer>>,
}

impl SessionHandle {
    pub fn new(sequencer: EventSequencer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sequencer)),
        }
    }

    /// Handle over a fresh engine with the given state.
    pub fn from_state(state: SessionState) -> Self {
        Self::new(EventSequencer::from_state(state))
    }

    fn lock(&self) -> MutexGuard<'_, EventSequencer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sequence one event. See `EventSequencer::process`.
    pub fn process(&self, event: Event, now: i64) -> Vec<Event> {
        self.lock().process(event, now)
    }

    /// Run `f` against the engine.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut SessionEngine) -> R) -> R {
        f(self.lock().engine_mut())
    }

    /// Swap in a new engine, e.g. after hydrating from storage.
    pub fn restore(&self, engine: SessionEngine) {
        *self.lock() = EventSequencer::new(engine);
    }

    pub fn session_id(&self) -> Option<i64> {
        self.lock().engine().session_id()
    }

    pub fn user_id(&self) -> Option<String> {
        self.lock().engine().user_id().map(str::to_string)
    }

    pub fn device_id(&self) -> Option<String> {
        self.lock().engine().device_id().map(str::to_string)
    }

    pub fn is_opted_out(&self) -> bool {
        self.lock().engine().is_opted_out()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.lock().engine().state().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let handle = SessionHandle::from_state(SessionState::new(100, false));
        let other = handle.clone();

        handle.process(Event::new("e"), 1000);
        assert_eq!(other.session_id(), Some(1000));
        assert_eq!(other.snapshot().last_event_id, 1);
    }

    #[test]
    fn test_restore_replaces_engine() {
        let handle = SessionHandle::from_state(SessionState::new(100, false));
        handle.process(Event::new("e"), 1000);

        let mut state = SessionState::new(100, false);
        state.session_id = Some(42);
        state.device_id = Some("device-1".into());
        handle.restore(SessionEngine::new(state));

        assert_eq!(handle.session_id(), Some(42));
        assert_eq!(handle.device_id().as_deref(), Some("device-1"));
        assert_eq!(handle.snapshot().last_event_id, 0);
    }
}
