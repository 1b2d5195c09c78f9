//! Session state persistence.
//!
//! The engine reports every state change through its on-change hook. The
//! hook built here forwards snapshots over a channel to a single writer
//! task, so writes land in the order the changes happened and never block
//! event processing.

use async_trait::async_trait;
use pulse_core::SessionState;
use pulse_core::session::ChangeHook;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::PulseResult;

/// Async key-value store for session state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the state stored under `key`.
    async fn get(&self, key: &str) -> PulseResult<Option<SessionState>>;

    /// Store `state` under `key`, replacing any previous value.
    async fn set(&self, key: &str, state: &SessionState) -> PulseResult<()>;

    /// Delete the state stored under `key`.
    async fn remove(&self, key: &str) -> PulseResult<()>;
}

/// Store keeping state in process memory.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, SessionState>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> PulseResult<Option<SessionState>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, state: &SessionState) -> PulseResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), state.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PulseResult<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}

/// Background writer draining state snapshots into a store.
pub(crate) struct Persister {
    task: JoinHandle<()>,
}

impl Persister {
    /// Spawn the writer and return it with the hook feeding it.
    ///
    /// The writer stops once the hook (the only sender) is dropped.
    pub(crate) fn spawn(store: Arc<dyn SessionStore>, key: String) -> (Self, ChangeHook) {
        let (tx, mut rx) = mpsc::unbounded_channel::<SessionState>();

        let task = tokio::spawn(async move {
            while let Some(state) = rx.recv().await {
                if let Err(e) = store.set(&key, &state).await {
                    warn!("Failed to persist session state: {}", e);
                }
            }
            debug!("Session persister for {} stopped", key);
        });

        let hook: ChangeHook = Box::new(move |state: &SessionState| {
            // Send only fails once the writer is gone, during shutdown.
            let _ = tx.send(state.clone());
        });

        (Self { task }, hook)
    }

    /// Wait for queued writes to finish. The hook must be dropped first.
    pub(crate) async fn close(self) {
        if let Err(e) = self.task.await {
            warn!("Session persister task failed: {}", e);
        }
    }
}
