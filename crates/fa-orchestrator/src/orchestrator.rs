//! Analysis orchestrator
//!
//! Owns the single active analysis session of one UI surface and drives it
//! through `Idle → Submitting → Awaiting → InProgress → Done | Failed`.
//!
//! # Locking model
//!
//! All mutable state sits behind one mutex in [`Shared`], and every change
//! publishes a fresh [`AnalysisSnapshot`] while the lock is still held, so
//! observers see changes in the order they were made. The lock is never held
//! across an await: network calls happen between two short critical
//! sections, and each section re-checks the generation before committing.
//!
//! # Generations
//!
//! Every submit and retake bumps the generation. The channel handler for a
//! session captures the generation it was created under; deliveries, errors
//! and watchdog expiries that carry an older generation are dropped. The
//! channel is always torn down before the next session id is requested.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;

use fa_core::config::ClientConfig;
use fa_core::traits::{JobBackend, JobContext};
use fa_core::{CapturedImage, ConnectionError, EventAccess, Generation, SubmissionError};
use fa_protocol::{ErrorPayload, InboundMessage, ResultPayload, SessionId, StageName, StatusPayload};

use crate::channel::{ChannelClient, ChannelHandler, Connection, ConnectionStatus};
use crate::session::{Applied, CompositeResult, StageTracker, Watchdog};
use crate::state::{AnalysisSnapshot, FlowError, FlowState};

/// Default bound on how long a session may stay unsettled
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Drives one analysis attempt at a time
pub struct Orchestrator {
    backend: Arc<dyn JobBackend>,
    channel: ChannelClient,
    context: JobContext,
    stage_timeout: Duration,
    shared: Arc<Shared>,
}

struct Shared {
    inner: Mutex<Inner>,
    state_tx: watch::Sender<AnalysisSnapshot>,
}

struct Inner {
    generation: Generation,
    flow: FlowState,
    session: Option<ActiveSession>,
    image: Option<CapturedImage>,
    error: Option<FlowError>,
    composite: Option<CompositeResult>,
}

/// The tracker/connection pair of the current generation
struct ActiveSession {
    tracker: StageTracker,
    connection: Option<Connection>,
    watchdog: Option<Watchdog>,
}

impl ActiveSession {
    fn new(session_id: SessionId) -> Self {
        Self {
            tracker: StageTracker::new(session_id),
            connection: None,
            watchdog: None,
        }
    }

    async fn shutdown(mut self) {
        stop_watchdog(&mut self.watchdog);
        if let Some(connection) = self.connection.take() {
            connection.disconnect().await;
        }
        tracing::debug!("Discarded session {}", self.tracker.session_id());
    }
}

fn stop_watchdog(slot: &mut Option<Watchdog>) {
    if let Some(watchdog) = slot.take() {
        tracing::trace!(generation = %watchdog.generation(), "Stopping session watchdog");
        watchdog.stop();
    }
}

impl Orchestrator {
    /// Create an orchestrator over a backend and a channel client
    pub fn new(backend: Arc<dyn JobBackend>, channel: ChannelClient, context: JobContext) -> Self {
        let (state_tx, _) = watch::channel(AnalysisSnapshot::idle(Generation::ZERO));
        Self {
            backend,
            channel,
            context,
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    generation: Generation::ZERO,
                    flow: FlowState::Idle,
                    session: None,
                    image: None,
                    error: None,
                    composite: None,
                }),
                state_tx,
            }),
        }
    }

    /// Create an orchestrator from client configuration
    pub fn from_config(config: &ClientConfig, backend: Arc<dyn JobBackend>, channel: ChannelClient) -> Self {
        let context = JobContext {
            event_id: config.event_id.clone(),
            language: config.language.clone(),
        };
        Self::new(backend, channel, context).with_stage_timeout(config.stage_timeout)
    }

    /// Set the stuck-session bound
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Submit a captured image and start a new session.
    ///
    /// Allowed from `Idle`, `Done` and `Failed`; anything earlier is torn
    /// down first. Backend failures move the flow to `Failed` and are also
    /// returned. A retake while the backend call is in flight abandons the
    /// attempt, and `Ok` is returned.
    pub async fn submit(&self, image: CapturedImage) -> Result<(), SubmissionError> {
        let (generation, previous) = {
            let mut inner = self.shared.inner.lock();
            if !inner.flow.accepts_submit() {
                tracing::warn!("Rejecting submit while {}", inner.flow);
                return Err(SubmissionError::Busy);
            }

            inner.generation = inner.generation.next();
            inner.flow = FlowState::Submitting;
            inner.error = None;
            inner.composite = None;
            inner.image = Some(image.clone());
            let previous = inner.session.take();
            self.shared.publish(&inner);
            (inner.generation, previous)
        };

        // The old channel must be gone before a new session id exists
        if let Some(previous) = previous {
            previous.shutdown().await;
        }

        tracing::info!("Submitting image ({} bytes) as {}", image.len(), generation);
        let result = self.backend.start_job(&image, &self.context).await;

        let session_id = {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                tracing::info!("Submission {} abandoned by a newer request", generation);
                return Ok(());
            }

            match result {
                Ok(session_id) => {
                    inner.flow = FlowState::Awaiting;
                    inner.session = Some(ActiveSession::new(session_id.clone()));
                    self.shared.publish(&inner);
                    session_id
                }
                Err(e) => {
                    tracing::warn!("Submission {} failed: {}", generation, e);
                    inner.flow = FlowState::Failed;
                    inner.error = Some(FlowError::Submission(e.clone()));
                    self.shared.publish(&inner);
                    return Err(e);
                }
            }
        };

        let handler = Arc::new(SessionHandler {
            generation,
            shared: Arc::downgrade(&self.shared),
        });
        let connection = self.channel.connect(&session_id, generation, handler).await;

        let stale = {
            let mut guard = self.shared.inner.lock();
            let inner = &mut *guard;
            match inner.session.as_mut() {
                Some(active) if inner.generation == generation => {
                    active.connection = Some(connection);
                    if inner.flow == FlowState::Awaiting {
                        inner.flow = FlowState::InProgress;
                        active.watchdog = Some(self.arm_watchdog(generation));
                        self.shared.publish(inner);
                    }
                    None
                }
                _ => Some(connection),
            }
        };

        if let Some(connection) = stale {
            tracing::info!("Session {} superseded during connect", session_id);
            connection.disconnect().await;
        }

        Ok(())
    }

    /// Abandon the current attempt and return to `Idle`.
    ///
    /// Safe from any state, including with no prior session. Any delivery
    /// still in flight for the old session is dropped.
    pub async fn retake(&self) {
        tracing::info!("Retake requested");
        self.release().await;
    }

    /// Release everything on unmount; same cleanup as [`Orchestrator::retake`].
    ///
    /// Concurrent calls with `retake` disconnect the channel exactly once.
    pub async fn teardown(&self) {
        tracing::info!("Tearing down orchestrator");
        self.release().await;
    }

    async fn release(&self) {
        if let Some(session) = self.shared.reset() {
            session.shutdown().await;
        }
    }

    /// Current snapshot
    pub fn state(&self) -> AnalysisSnapshot {
        self.shared.state_tx.borrow().clone()
    }

    /// Receive a notification on every state change
    pub fn subscribe_state(&self) -> watch::Receiver<AnalysisSnapshot> {
        self.shared.state_tx.subscribe()
    }

    /// Wait until the flow reaches `Done` or `Failed`
    pub async fn wait_until_settled(&self) -> AnalysisSnapshot {
        let mut rx = self.subscribe_state();
        let settled = rx.wait_for(|s| s.flow.is_settled()).await.map(|s| s.clone());
        match settled {
            Ok(snapshot) => snapshot,
            Err(_) => self.state(),
        }
    }

    /// Status of the current session's connection, if one was opened
    pub fn connection_status(&self) -> Option<ConnectionStatus> {
        let inner = self.shared.inner.lock();
        inner
            .session
            .as_ref()
            .and_then(|s| s.connection.as_ref())
            .map(Connection::status)
    }

    /// Ask the backend whether the configured event accepts submissions.
    /// Does not touch flow state.
    pub async fn check_event(&self) -> Result<EventAccess, SubmissionError> {
        self.backend.check_event(&self.context.event_id).await
    }

    fn arm_watchdog(&self, generation: Generation) -> Watchdog {
        let shared = Arc::downgrade(&self.shared);
        let timeout = self.stage_timeout;
        Watchdog::spawn(generation, timeout, move |generation| {
            if let Some(shared) = shared.upgrade() {
                shared.timed_out(generation, timeout);
            }
        })
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        let Some(session) = self.shared.inner.lock().session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(session.shutdown());
            }
            Err(_) => tracing::warn!("Orchestrator dropped outside a runtime; channel left open"),
        }
    }
}

impl Shared {
    fn snapshot(inner: &Inner) -> AnalysisSnapshot {
        let tracker = inner.session.as_ref().map(|s| &s.tracker);
        AnalysisSnapshot {
            generation: inner.generation,
            flow: inner.flow,
            session_id: tracker.map(|t| t.session_id().clone()),
            stages: AnalysisSnapshot::stages_of(tracker),
            composite: inner.composite.clone(),
            error: inner.error.clone(),
            has_image: inner.image.is_some(),
        }
    }

    /// Publish the current state; called with the lock held
    fn publish(&self, inner: &Inner) {
        self.state_tx.send_replace(Self::snapshot(inner));
    }

    /// Move to a fresh generation at `Idle`, handing back the old session
    fn reset(&self) -> Option<ActiveSession> {
        let mut inner = self.inner.lock();
        inner.generation = inner.generation.next();
        inner.flow = FlowState::Idle;
        inner.image = None;
        inner.error = None;
        inner.composite = None;
        let session = inner.session.take();
        self.publish(&inner);
        session
    }

    fn apply(&self, generation: Generation, message: InboundMessage) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.generation != generation || !inner.flow.is_live() {
            tracing::debug!(
                "Dropping {} delivery for {} (current {}, {})",
                message.label(),
                generation,
                inner.generation,
                inner.flow
            );
            return;
        }
        let Some(active) = inner.session.as_mut() else {
            return;
        };

        let applied = active.tracker.apply(message);
        let settled = Self::evaluate(inner);

        if applied == Applied::Changed || settled {
            self.publish(inner);
        }
    }

    /// Derive flow state from the tracker. Returns true if anything changed.
    fn evaluate(inner: &mut Inner) -> bool {
        let Some(active) = inner.session.as_mut() else {
            return false;
        };
        let tracker = &active.tracker;

        if tracker.is_complete() {
            inner.composite = tracker.composite();
            inner.flow = FlowState::Done;
            inner.error = None;
            stop_watchdog(&mut active.watchdog);
            tracing::info!("Session {} complete", tracker.session_id());
            return true;
        }

        if let Some(message) = tracker.session_error() {
            inner.error = Some(FlowError::Job(message.to_string()));
            inner.flow = FlowState::Failed;
            stop_watchdog(&mut active.watchdog);
            return true;
        }

        let failures = tracker.failures();
        if failures.is_empty() {
            return false;
        }

        let error = FlowError::Stage { failures };
        let changed = inner.error.as_ref() != Some(&error);
        inner.error = Some(error);

        // Nothing further can arrive once every stage is terminal
        if tracker.is_settled() {
            tracing::warn!("Session {} settled with failed stages", tracker.session_id());
            inner.flow = FlowState::Failed;
            stop_watchdog(&mut active.watchdog);
            return true;
        }
        changed
    }

    fn connection_failed(&self, generation: Generation, error: ConnectionError) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.generation != generation || !inner.flow.is_live() {
            tracing::debug!("Ignoring connection error for {}: {}", generation, error);
            return;
        }

        tracing::error!("Session connection failed: {} ({})", error, error.hint());
        if let Some(active) = inner.session.as_mut() {
            stop_watchdog(&mut active.watchdog);
        }
        inner.flow = FlowState::Failed;
        inner.error = Some(FlowError::Connection(error));
        self.publish(inner);
    }

    fn timed_out(&self, generation: Generation, timeout: Duration) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.generation != generation || !inner.flow.is_live() {
            return;
        }

        tracing::warn!("Session timed out after {:?}", timeout);
        if let Some(active) = inner.session.as_mut() {
            active.watchdog = None;
        }
        inner.flow = FlowState::Failed;
        inner.error = Some(FlowError::Timeout(timeout));
        self.publish(inner);
    }
}

/// Routes one generation's deliveries into the shared state
struct SessionHandler {
    generation: Generation,
    shared: Weak<Shared>,
}

impl SessionHandler {
    fn forward(&self, message: InboundMessage) {
        if let Some(shared) = self.shared.upgrade() {
            shared.apply(self.generation, message);
        }
    }
}

impl ChannelHandler for SessionHandler {
    fn on_status(&self, payload: StatusPayload) {
        self.forward(InboundMessage::Status(payload));
    }

    fn on_stage_result(&self, stage: StageName, payload: ResultPayload) {
        self.forward(InboundMessage::StageResult { stage, payload });
    }

    fn on_error(&self, payload: ErrorPayload) {
        self.forward(InboundMessage::Error(payload));
    }

    fn on_completed(&self, payload: Value) {
        self.forward(InboundMessage::Completed(payload));
    }

    fn on_connection_error(&self, error: ConnectionError) {
        if let Some(shared) = self.shared.upgrade() {
            shared.connection_failed(self.generation, error);
        }
    }
}
