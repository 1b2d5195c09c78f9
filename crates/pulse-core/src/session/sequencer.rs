//! Annotates caller events with session context and event ids.

use tracing::debug;

use super::{SessionEngine, SessionState};
use crate::types::Event;

/// Turns one caller event into the ordered list of events to deliver.
#[derive(Debug)]
pub struct EventSequencer {
    engine: SessionEngine,
}

impl EventSequencer {
    pub fn new(engine: SessionEngine) -> Self {
        Self { engine }
    }

    /// Build a sequencer over a fresh engine.
    pub fn from_state(state: SessionState) -> Self {
        Self::new(SessionEngine::new(state))
    }

    pub fn engine(&self) -> &SessionEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SessionEngine {
        &mut self.engine
    }

    /// Sequence `event` observed at `now`.
    ///
    /// Returns any boundary events that must be delivered first, followed
    /// by the event itself. Opted-out state passes the event through
    /// untouched.
    pub fn process(&mut self, mut event: Event, now: i64) -> Vec<Event> {
        if self.engine.is_opted_out() {
            return vec![event];
        }

        let event_time = *event.time.get_or_insert(now);

        let is_boundary = event.is_boundary();
        let has_foreign_session = !is_boundary
            && event
                .session_id
                .is_some_and(|id| Some(id) != self.engine.session_id());

        let mut ordered = Vec::new();

        if has_foreign_session {
            debug!(
                "Event {} routed to caller session {:?}",
                event.event_type, event.session_id
            );
        } else {
            if !is_boundary && !self.engine.is_app_active() {
                if let Some(boundary) = self.engine.start_if_needed(event_time) {
                    ordered.extend(boundary);
                }
            }
            self.engine.extend(event_time);
        }

        if event.session_id.is_none() {
            event.session_id = self.engine.session_id();
        }

        ordered.push(event);
        for event in &mut ordered {
            if event.event_id.is_none() {
                event.event_id = Some(self.engine.next_event_id());
            }
        }

        ordered
    }
}
