//! Main SDK Entry Point
//!
//! Provides the `Client` struct that ties together the session engine, the
//! timeline and persistence.

use pulse_core::{ActivityState, DeliveryResult, Event, SessionEngine, SessionState};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::plugins::{DeliveryCollaborator, DestinationStage, IdentityStage, SessionStage};
use crate::queue::{Command, CommandQueue};
use crate::session::SessionHandle;
use crate::storage::{MemorySessionStore, Persister, SessionStore};
use crate::timeline::{Stage, Timeline, Traversal};
use crate::utils::{Clock, SystemClock};
use crate::{PulseConfig, PulseResult};

/// Message of results for events skipped while opted out.
pub const OPT_OUT_MESSAGE: &str = "Event skipped due to opt-out";

/// Message of results for events submitted after shutdown.
pub const CLOSED_MESSAGE: &str = "Client is shut down";

// ─────────────────────────────────────────────────────────────────────────────
// Track Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Pending outcome of a `track` call.
#[derive(Debug)]
pub struct TrackHandle {
    inner: TrackInner,
}

#[derive(Debug)]
enum TrackInner {
    Ready(DeliveryResult),
    Pending(Traversal),
    Queued {
        event: Event,
        rx: oneshot::Receiver<DeliveryResult>,
    },
}

impl TrackHandle {
    fn ready(result: DeliveryResult) -> Self {
        Self {
            inner: TrackInner::Ready(result),
        }
    }

    fn pending(traversal: Traversal) -> Self {
        Self {
            inner: TrackInner::Pending(traversal),
        }
    }

    fn queued(event: Event, rx: oneshot::Receiver<DeliveryResult>) -> Self {
        Self {
            inner: TrackInner::Queued { event, rx },
        }
    }

    /// Wait for the delivery result.
    pub async fn result(self) -> DeliveryResult {
        match self.inner {
            TrackInner::Ready(result) => result,
            TrackInner::Pending(traversal) => traversal.result().await,
            TrackInner::Queued { event, rx } => rx
                .await
                .unwrap_or_else(|_| DeliveryResult::skipped(event, CLOSED_MESSAGE)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for `Client`.
pub struct ClientBuilder {
    config: PulseConfig,
    store: Option<Arc<dyn SessionStore>>,
    clock: Option<Arc<dyn Clock>>,
    stages: Vec<Arc<dyn Stage>>,
    destinations: usize,
}

impl ClientBuilder {
    /// Session store (default: in-memory)
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Clock (default: system time)
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Add a destination stage around a delivery collaborator
    pub fn destination(mut self, collaborator: Arc<dyn DeliveryCollaborator>) -> Self {
        self.destinations += 1;
        let name = if self.destinations == 1 {
            "destination".to_string()
        } else {
            format!("destination-{}", self.destinations)
        };
        self.stages
            .push(Arc::new(DestinationStage::new(name, collaborator)));
        self
    }

    /// Add a stage, registered during `init` after the built-in stages
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Validate the configuration and create the client
    pub fn build(self) -> PulseResult<Client> {
        self.config.validate()?;

        let state = SessionState::new(
            self.config.session_timeout_ms,
            self.config.tracking_session_events,
        );

        let lifecycle = Lifecycle {
            pending_stages: self.stages,
            ..Default::default()
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                session: SessionHandle::from_state(state),
                timeline: Timeline::new(),
                store: self
                    .store
                    .unwrap_or_else(|| Arc::new(MemorySessionStore::new())),
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                initialized: AtomicBool::new(false),
                lifecycle: Mutex::new(lifecycle),
                config: self.config,
            }),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Created,
    Ready,
    Closed,
}

#[derive(Default)]
struct Lifecycle {
    phase: Phase,
    queue: CommandQueue,
    pending_stages: Vec<Arc<dyn Stage>>,
    persister: Option<Persister>,
}

struct ClientInner {
    config: PulseConfig,
    session: SessionHandle,
    timeline: Timeline,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    initialized: AtomicBool,
    /// Held for the whole processing of a call; one call at a time.
    lifecycle: Mutex<Lifecycle>,
}

/// Pulse client - Main entry point
///
/// # Example
///
/// ```rust,no_run
/// use pulse_sdk::{Client, PulseConfig};
/// use pulse_sdk::plugins::MemoryDestination;
/// use pulse_core::Event;
/// use std::sync::Arc;
///
/// async fn example() -> pulse_sdk::PulseResult<()> {
///     let client = Client::builder(PulseConfig::new("api-key"))
///         .destination(Arc::new(MemoryDestination::new()))
///         .build()?;
///     client.init().await?;
///
///     let result = client.track(Event::new("app_opened")).await.result().await;
///     assert_eq!(result.code, 200);
///
///     client.shutdown().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Start building a client
    pub fn builder(config: PulseConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            store: None,
            clock: None,
            stages: Vec::new(),
            destinations: 0,
        }
    }

    /// Create a client with default store and clock and no destination
    pub fn new(config: PulseConfig) -> PulseResult<Self> {
        Self::builder(config).build()
    }

    /// Get the client configuration
    pub fn config(&self) -> &PulseConfig {
        &self.inner.config
    }

    /// Check if `init` has completed
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// Read access to session state
    pub fn session(&self) -> &SessionHandle {
        &self.inner.session
    }

    /// Initialize the client
    ///
    /// Registers the built-in stages, hydrates session state from the store,
    /// evaluates the session once and replays calls made before this point.
    pub async fn init(&self) -> PulseResult<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle.phase != Phase::Created {
            return Ok(());
        }

        let config = &self.inner.config;
        let timeline = &self.inner.timeline;

        if !timeline.contains(SessionStage::NAME).await {
            let stage = SessionStage::new(self.inner.session.clone(), self.inner.clock.clone());
            timeline.register(Arc::new(stage), config).await?;
        }
        if !timeline.contains(IdentityStage::NAME).await {
            let stage = IdentityStage::new(self.inner.session.clone());
            timeline.register(Arc::new(stage), config).await?;
        }
        for stage in std::mem::take(&mut lifecycle.pending_stages) {
            self.register_logged(stage).await;
        }

        let key = config.storage_key();
        let stored = match self.inner.store.get(&key).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Failed to load session state, starting fresh: {}", e);
                None
            }
        };
        let restored = stored.is_some();

        let mut state = SessionState::hydrate(
            stored,
            config.session_timeout_ms,
            config.tracking_session_events,
        );
        state.opt_out |= config.opt_out;
        if config.user_id.is_some() {
            state.user_id = config.user_id.clone();
        }
        state.device_id = config
            .device_id
            .clone()
            .or(state.device_id)
            .or_else(|| Some(Uuid::new_v4().to_string()));

        let (persister, hook) = Persister::spawn(self.inner.store.clone(), key);
        hook(&state);
        let mut engine = SessionEngine::new(state);
        engine.on_change(hook);
        self.inner.session.restore(engine);
        lifecycle.persister = Some(persister);

        lifecycle.phase = Phase::Ready;
        self.inner.initialized.store(true, Ordering::SeqCst);
        info!(
            "Pulse client {} initialized (restored: {}, session: {:?})",
            config.instance_name,
            restored,
            self.inner.session.session_id()
        );

        if config.start_session_on_init {
            let now = self.inner.clock.now_millis();
            let boundary = self
                .inner
                .session
                .with_engine(|engine| engine.start_if_needed(now))
                .unwrap_or_default();
            self.dispatch_all(boundary).await;
        }

        let queued = lifecycle.queue.drain();
        if !queued.is_empty() {
            debug!("Replaying {} calls made before init", queued.len());
        }
        for command in queued {
            self.execute(command).await;
        }

        Ok(())
    }

    /// Track an event
    ///
    /// Resolves once the event has cleared the pipeline; the returned handle
    /// resolves once a destination reports on it.
    pub async fn track(&self, event: Event) -> TrackHandle {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        match lifecycle.phase {
            Phase::Ready => self.dispatch(event).await,
            Phase::Created => {
                let (reply, rx) = oneshot::channel();
                lifecycle.queue.push(Command::Track {
                    event: event.clone(),
                    reply,
                });
                TrackHandle::queued(event, rx)
            }
            Phase::Closed => TrackHandle::ready(DeliveryResult::skipped(event, CLOSED_MESSAGE)),
        }
    }

    /// Pin the session id; emits boundary events when it changes the session
    pub async fn set_session_id(&self, session_id: i64) {
        self.submit(Command::SetSessionId(session_id)).await;
    }

    /// Current session id
    pub fn session_id(&self) -> Option<i64> {
        self.inner.session.session_id()
    }

    /// Opt in or out of tracking
    pub async fn set_opt_out(&self, opt_out: bool) {
        self.submit(Command::SetOptOut(opt_out)).await;
    }

    pub fn is_opted_out(&self) -> bool {
        self.inner.session.is_opted_out()
    }

    /// Set or clear the user id
    pub async fn set_user_id(&self, user_id: Option<String>) {
        self.submit(Command::SetUserId(user_id)).await;
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner.session.user_id()
    }

    /// Replace the device id
    pub async fn set_device_id(&self, device_id: impl Into<String>) {
        self.submit(Command::SetDeviceId(device_id.into())).await;
    }

    pub fn device_id(&self) -> Option<String> {
        self.inner.session.device_id()
    }

    /// Clear the user id and generate a new device id
    pub async fn reset(&self) {
        self.submit(Command::Reset).await;
    }

    /// Mark the user as still active without tracking an event
    pub async fn extend_session(&self) {
        self.submit(Command::ExtendSession).await;
    }

    /// Report a foreground/background transition
    pub async fn set_activity(&self, state: ActivityState) {
        self.submit(Command::Activity(state)).await;
    }

    /// Forward every activity change from `rx` until its sender is dropped
    pub fn attach_activity(&self, mut rx: watch::Receiver<ActivityState>) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            let initial = *rx.borrow_and_update();
            client.set_activity(initial).await;

            while rx.changed().await.is_ok() {
                let state = *rx.borrow_and_update();
                client.set_activity(state).await;
            }
            debug!("Activity signal closed");
        })
    }

    /// Register a stage
    ///
    /// Before `init` the stage is queued and registered during replay.
    pub async fn add(&self, stage: Arc<dyn Stage>) -> PulseResult<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        match lifecycle.phase {
            Phase::Created => {
                lifecycle.queue.push(Command::AddStage(stage));
                Ok(())
            }
            Phase::Ready => self.inner.timeline.register(stage, &self.inner.config).await,
            Phase::Closed => Err(crate::PulseError::invalid_operation(CLOSED_MESSAGE)),
        }
    }

    /// Deregister a stage by name, running its teardown
    pub async fn remove(&self, name: &str) -> PulseResult<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.inner.timeline.deregister(name).await
    }

    /// Names of registered stages in execution order
    pub async fn stage_names(&self) -> Vec<String> {
        self.inner.timeline.stage_names().await
    }

    /// Flush every destination
    pub async fn flush(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.inner.timeline.flush().await;
    }

    /// Shutdown the client
    ///
    /// Flushes and tears down all stages and waits for pending state writes.
    /// Calls still queued from before `init` are discarded.
    pub async fn shutdown(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle.phase == Phase::Closed {
            return;
        }
        lifecycle.phase = Phase::Closed;
        self.inner.initialized.store(false, Ordering::SeqCst);

        let discarded = lifecycle.queue.drain();
        if !discarded.is_empty() {
            warn!("Discarding {} calls made before init", discarded.len());
        }
        drop(discarded);

        self.inner.timeline.flush().await;
        self.inner.timeline.teardown_all().await;

        drop(self.inner.session.with_engine(|engine| engine.take_change_hook()));
        if let Some(persister) = lifecycle.persister.take() {
            persister.close().await;
        }

        info!("Pulse client {} shut down", self.inner.config.instance_name);
    }

    // Private helpers

    async fn submit(&self, command: Command) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        match lifecycle.phase {
            Phase::Ready => self.execute(command).await,
            Phase::Created => {
                debug!(
                    "Queued {:?} until init ({} pending)",
                    command,
                    lifecycle.queue.len() + 1
                );
                lifecycle.queue.push(command);
            }
            Phase::Closed => warn!("Ignoring {:?} after shutdown", command),
        }
    }

    /// Run one call. The caller holds the lifecycle lock.
    async fn execute(&self, command: Command) {
        let now = self.inner.clock.now_millis();
        let session = &self.inner.session;

        match command {
            Command::Track { event, reply } => {
                let handle = self.dispatch(event).await;
                tokio::spawn(async move {
                    let _ = reply.send(handle.result().await);
                });
            }
            Command::SetSessionId(session_id) => {
                let boundary =
                    session.with_engine(|engine| engine.note_explicit_session(session_id, now));
                self.dispatch_all(boundary).await;
            }
            Command::SetOptOut(opt_out) => {
                session.with_engine(|engine| engine.set_opt_out(opt_out));
            }
            Command::SetUserId(user_id) => {
                session.with_engine(|engine| engine.set_user_id(user_id));
            }
            Command::SetDeviceId(device_id) => {
                session.with_engine(|engine| engine.set_device_id(Some(device_id)));
            }
            Command::Reset => {
                let device_id = Uuid::new_v4().to_string();
                session.with_engine(|engine| {
                    engine.set_user_id(None);
                    engine.set_device_id(Some(device_id));
                });
            }
            Command::ExtendSession => {
                session.with_engine(|engine| engine.extend(now));
            }
            Command::Activity(ActivityState::Active) => {
                let boundary = session
                    .with_engine(|engine| engine.note_foreground(now))
                    .unwrap_or_default();
                self.dispatch_all(boundary).await;
            }
            Command::Activity(ActivityState::Background) => {
                session.with_engine(|engine| engine.note_background(now));
            }
            Command::AddStage(stage) => {
                self.register_logged(stage).await;
            }
        }
    }

    /// Push one event through the timeline.
    async fn dispatch(&self, event: Event) -> TrackHandle {
        if self.inner.session.is_opted_out() {
            return TrackHandle::ready(DeliveryResult::skipped(event, OPT_OUT_MESSAGE));
        }

        let mut traversals = self.inner.timeline.push(event.clone()).await;
        let own = traversals.pop();

        for synthesized in &traversals {
            if !synthesized.is_delivered() {
                debug!(
                    "Synthesized {} not delivered: {:?}",
                    synthesized.event.event_type, synthesized.status
                );
            }
        }

        match own {
            Some(traversal) => TrackHandle::pending(traversal),
            None => TrackHandle::ready(DeliveryResult::skipped(
                event,
                "Event never entered the pipeline",
            )),
        }
    }

    /// Push boundary events; their results are not awaited.
    async fn dispatch_all(&self, events: Vec<Event>) {
        for event in events {
            drop(self.dispatch(event).await);
        }
    }

    async fn register_logged(&self, stage: Arc<dyn Stage>) {
        let name = stage.name().to_string();
        if let Err(e) = self.inner.timeline.register(stage, &self.inner.config).await {
            warn!("Failed to register stage {}: {}", name, e);
        }
    }
}
