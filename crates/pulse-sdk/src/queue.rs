//! Calls made before the client finished initializing.

use pulse_core::{ActivityState, DeliveryResult, Event};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::timeline::Stage;

/// A deferred client call.
pub(crate) enum Command {
    Track {
        event: Event,
        reply: oneshot::Sender<DeliveryResult>,
    },
    SetSessionId(i64),
    SetOptOut(bool),
    SetUserId(Option<String>),
    SetDeviceId(String),
    Reset,
    ExtendSession,
    Activity(ActivityState),
    AddStage(Arc<dyn Stage>),
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Track { event, .. } => write!(f, "Track({})", event.event_type),
            Command::SetSessionId(id) => write!(f, "SetSessionId({})", id),
            Command::SetOptOut(opt_out) => write!(f, "SetOptOut({})", opt_out),
            Command::SetUserId(user_id) => write!(f, "SetUserId({:?})", user_id),
            Command::SetDeviceId(device_id) => write!(f, "SetDeviceId({})", device_id),
            Command::Reset => write!(f, "Reset"),
            Command::ExtendSession => write!(f, "ExtendSession"),
            Command::Activity(state) => write!(f, "Activity({})", state),
            Command::AddStage(stage) => write!(f, "AddStage({})", stage.name()),
        }
    }
}

/// FIFO of deferred calls, drained exactly once.
#[derive(Debug, Default)]
pub(crate) struct CommandQueue {
    pending: VecDeque<Command>,
    drained: bool,
}

impl CommandQueue {
    pub(crate) fn push(&mut self, command: Command) {
        self.pending.push_back(command);
    }

    /// Take every queued call in submission order.
    ///
    /// Returns nothing on every call after the first.
    pub(crate) fn drain(&mut self) -> Vec<Command> {
        if self.drained {
            return Vec::new();
        }
        self.drained = true;
        self.pending.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
