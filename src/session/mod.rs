// src/session/mod.rs
//! Session engine.
//!
//! This module contains the core [`Session`] type, which keeps one logical
//! connection to a remote JSON-RPC server, multiplexes concurrent requests
//! over it, routes server notifications to listeners and reconnects after
//! unexpected closes.
//!
//! # Architecture
//!
//! Each opened link gets an *event pump* task that drains the link's
//! [`TransportEvent`] stream and feeds the session: responses settle entries
//! in the correlation table, notifications go to the router, lifecycle
//! events drive the reconnect state machine.
//!
//! Links are numbered with an epoch. `disconnect()` bumps the epoch, which
//! retires the current link: its late events are still drained but can no
//! longer change session state or schedule reconnects.
//!
//! # Concurrency
//!
//! All mutable session state (current link, epoch, connecting flag,
//! reconnect counter, correlation table) lives behind a single mutex. The
//! lock is never held across an await point or while listeners run.

mod events;
mod lock;
mod pending;
mod router;

pub use events::SessionEvent;

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::correlation::RequestIdGenerator;
use crate::protocol::{classify, Inbound, RequestEnvelope};
use crate::reconnect::{ReconnectPolicy, ReconnectState, ReconnectStep};
use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_warn,
    Connection,
    EventStream,
    LinkPtr,
    ReadyState,
    RequestId,
    Result,
    RpcError,
    SessionConfig,
    TransportEvent,
    TransportPtr,
    ABNORMAL_CLOSURE,
};

use events::LifecycleEvents;
use lock::lock_ignore_poison;
use pending::CorrelationTable;
use router::NotificationRouter;

/// Connection state as seen by callers, derived from the current link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl From<ReadyState> for ConnectionState {
    fn from(state: ReadyState) -> Self {
        match state {
            ReadyState::Connecting => ConnectionState::Connecting,
            ReadyState::Open => ConnectionState::Open,
            ReadyState::Closing => ConnectionState::Closing,
            ReadyState::Closed => ConnectionState::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Open => "OPEN",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::Closed => "CLOSED",
        })
    }
}

/// Persistent JSON-RPC session.
///
/// Cheap to clone (internally `Arc`-backed). Dropping the last clone closes
/// the link and stops any scheduled reconnect.
///
/// # Example
///
/// ```no_run
/// use smp_rpc::{SessionBuilder, SessionEvent};
/// use serde_json::json;
/// use std::time::Duration;
///
/// # async fn example() -> smp_rpc::Result<()> {
/// let session = SessionBuilder::new()
///     .address("ws://localhost:25585")
///     .auto_reconnect(true)
///     .request_timeout(Duration::from_secs(10))
///     .build()?;
///
/// session.on_event(|event| {
///     if let SessionEvent::Disconnected { code, reason } = event {
///         println!("disconnected: {code} {reason}");
///     }
/// });
/// session.on_notification("notification:players/joined", |args| {
///     println!("joined: {args:?}");
/// });
///
/// session.connect().await?;
/// let players = session.request("minecraft:players", None).await?;
/// let _ = session.request("minecraft:allowlist/set", Some(json!([players]))).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    config: SessionConfig,
    policy: ReconnectPolicy,
    transport: TransportPtr,
    ids: RequestIdGenerator,
    state: Mutex<SessionState>,
    router: NotificationRouter,
    events: LifecycleEvents,
}

#[derive(Default)]
struct SessionState {
    // ---
    link: Option<LinkPtr>,

    /// Epoch of the current link. Bumped when a link is installed and when
    /// `disconnect()` retires one.
    epoch: u64,

    connecting: bool,
    reconnect: ReconnectState,

    /// Scheduled reconnect attempt, aborted by `disconnect()`.
    reconnect_task: Option<JoinHandle<()>>,

    pending: CorrelationTable,
}

impl SessionState {
    fn open_link(&self) -> Option<&LinkPtr> {
        self.link
            .as_ref()
            .filter(|link| link.ready_state() == ReadyState::Open)
    }
}

impl Session {
    // ---
    /// Create a session with an explicitly provided transport.
    ///
    /// Nothing is opened until [`connect`](Self::connect) is called.
    pub fn new(config: SessionConfig, transport: TransportPtr) -> Self {
        // ---
        let policy = config.reconnect_policy();

        Self {
            inner: Arc::new(Inner {
                config,
                policy,
                transport,
                ids: RequestIdGenerator::new(),
                state: Mutex::new(SessionState::default()),
                router: NotificationRouter::new(),
                events: LifecycleEvents::new(),
            }),
        }
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Open a link to the configured address.
    ///
    /// Idempotent: if the session is already OPEN, or a connection attempt
    /// is in flight, this returns `Ok(())` immediately without opening a
    /// second link.
    ///
    /// On success the reconnect counter is reset and a
    /// [`SessionEvent::Connected`] is emitted before this returns.
    ///
    /// # Errors
    ///
    /// - `RpcError::Transport` if the binding could not start the attempt or
    ///   reported an error before the link opened
    /// - `RpcError::ConnectionClosed` if the link closed before opening, or
    ///   `disconnect()` ran while the attempt was being started
    pub async fn connect(&self) -> Result<()> {
        self.open(false).await
    }

    /// Open a link; `reconnect` marks a scheduled retry, whose failure is
    /// reported as [`SessionEvent::ReconnectFailed`] before the close that
    /// follows it is handled.
    async fn open(&self, reconnect: bool) -> Result<()> {
        // ---
        let epoch = {
            let mut state = lock_ignore_poison(&self.inner.state);
            if state.open_link().is_some() || state.connecting {
                log_debug!("connect: already open or connecting");
                return Ok(());
            }
            state.connecting = true;
            state.epoch
        };

        let config = &self.inner.config;
        log_info!(
            "{}: connecting to {}",
            self.inner.transport.transport_id(),
            config.address
        );

        let Connection { link, events } =
            match self.inner.transport.open(&config.address, &config.protocols).await {
                Ok(connection) => connection,
                Err(err) => {
                    log_error!("connect to {} failed: {err}", config.address);
                    {
                        let mut state = lock_ignore_poison(&self.inner.state);
                        if state.epoch == epoch {
                            state.connecting = false;
                        }
                    }
                    if reconnect {
                        let message = err.to_string();
                        self.inner.on_reconnect_failed(epoch, err);
                        return Err(RpcError::Transport(message));
                    }
                    return Err(err);
                }
            };

        let (opened_tx, opened_rx) = oneshot::channel();

        {
            let mut state = lock_ignore_poison(&self.inner.state);

            if state.epoch != epoch {
                drop(state);
                log_debug!("connect: disconnected while opening, dropping new link");
                link.close(config.close_code, &config.close_reason);
                return Err(RpcError::ConnectionClosed);
            }

            state.epoch += 1;
            state.link = Some(link);

            tokio::spawn(pump(
                Arc::downgrade(&self.inner),
                state.epoch,
                reconnect,
                events,
                opened_tx,
            ));
        }

        opened_rx.await.unwrap_or(Err(RpcError::ConnectionClosed))
    }

    /// Close the link and fail every pending request.
    ///
    /// Synchronous and infallible. Before this returns, every outstanding
    /// request has been completed with `RpcError::ConnectionClosed` and the
    /// correlation table is empty. A scheduled reconnect attempt is
    /// cancelled; closing this way never schedules a new one.
    pub fn disconnect(&self) {
        // ---
        let (link, drained, reconnect_task) = {
            let mut state = lock_ignore_poison(&self.inner.state);
            state.epoch += 1;
            state.connecting = false;
            let drained = state.pending.drain(|| RpcError::ConnectionClosed);
            (state.link.take(), drained, state.reconnect_task.take())
        };

        if let Some(task) = reconnect_task {
            task.abort();
        }

        if let Some(link) = link {
            log_info!("disconnecting from {}", self.inner.config.address);
            link.close(self.inner.config.close_code, &self.inner.config.close_reason);
        }

        if drained > 0 {
            log_debug!("disconnect: failed {drained} pending request(s)");
        }
    }

    /// Send a request and wait for its response.
    ///
    /// `params` must be an array, an object, or `None`. Uses the configured
    /// request timeout.
    ///
    /// # Errors
    ///
    /// - `RpcError::NotConnected` - the session is not OPEN; nothing is sent
    /// - `RpcError::InvalidParams` - scalar params
    /// - `RpcError::Transport` - the link refused the message
    /// - `RpcError::Remote` - the server answered with an error object
    /// - `RpcError::Timeout` - no response within the request timeout
    /// - `RpcError::ConnectionClosed` - `disconnect()` ran while waiting
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.request_with_timeout(method, params, self.inner.config.request_timeout)
            .await
    }

    /// Send a request with a per-call timeout.
    ///
    /// Overrides the configured request timeout for this single request.
    ///
    /// # Errors
    ///
    /// Same as [`request`](Self::request).
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        // ---
        let (id, mut rx, envelope, deadline) = {
            let mut state = lock_ignore_poison(&self.inner.state);

            let Some(link) = state.open_link().cloned() else {
                return Err(RpcError::NotConnected);
            };

            let id = self.inner.ids.next_id();
            let envelope = serde_json::to_value(RequestEnvelope::new(id, method, params)?)?;
            let deadline = Instant::now() + timeout;
            let rx = state.pending.register(id, method);

            if let Err(err) = link.send(envelope.to_string()) {
                state.pending.remove(id);
                return Err(err);
            }

            (id, rx, envelope, deadline)
        };

        let _guard = PendingGuard {
            inner: &self.inner,
            id,
        };

        self.inner.events.emit(SessionEvent::MessageSent(envelope));

        match time::timeout_at(deadline, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RpcError::ConnectionClosed),
            Err(_elapsed) => {
                let expired = lock_ignore_poison(&self.inner.state).pending.expire(id);
                match expired {
                    Some(err) => {
                        log_warn!("request {id} timed out: {err}");
                        Err(err)
                    }
                    // Settled between the deadline and the lock.
                    None => rx.try_recv().unwrap_or(Err(RpcError::ConnectionClosed)),
                }
            }
        }
    }

    /// Typed convenience around [`request`](Self::request).
    ///
    /// Serializes `params` with serde (unit / `None` serialize to an absent
    /// params member) and decodes the result into `T`.
    ///
    /// # Errors
    ///
    /// Same as [`request`](Self::request), plus `RpcError::Serialization`
    /// if the params cannot be encoded or the result cannot be decoded.
    pub async fn request_as<P, T>(&self, method: &str, params: &P) -> Result<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        // ---
        let params = serde_json::to_value(params)?;
        let result = self.request(method, Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Register a listener for one notification method.
    ///
    /// The listener receives the positional arguments: the elements of an
    /// array `params`, a non-array `params` as the single argument, or no
    /// arguments when `params` is absent. Listeners for the same method run
    /// in registration order.
    pub fn on_notification<F>(&self, method: impl Into<String>, listener: F) -> &Self
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.inner.router.add(method, listener);
        self
    }

    /// Register a typed listener for one notification method.
    ///
    /// The payload is decoded from no argument as `null`, from one argument
    /// as that argument and from several as an array. Decode failures are
    /// reported as [`SessionEvent::Error`].
    pub fn on_notification_as<T, F>(&self, method: impl Into<String>, listener: F) -> &Self
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.inner.router.add_typed(method, listener);
        self
    }

    /// Number of listeners registered for a notification method.
    pub fn notification_listener_count(&self, method: &str) -> usize {
        self.inner.router.listener_count(method)
    }

    /// Register a lifecycle listener, invoked for every [`SessionEvent`].
    pub fn on_event<F>(&self, listener: F) -> &Self
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.events.add(Arc::new(listener));
        self
    }

    /// Subscribe to the lifecycle event stream.
    ///
    /// Only events emitted after this call are received.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Connection state derived from the current link.
    pub fn state(&self) -> ConnectionState {
        lock_ignore_poison(&self.inner.state)
            .link
            .as_ref()
            .map_or(ConnectionState::Closed, |link| link.ready_state().into())
    }

    /// True when [`state`](Self::state) is OPEN.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Number of requests waiting for a response.
    pub fn pending_len(&self) -> usize {
        lock_ignore_poison(&self.inner.state).pending.len()
    }

    /// Reconnect attempts scheduled since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        lock_ignore_poison(&self.inner.state).reconnect.attempts()
    }
}

/// Removes an abandoned request from the table when the waiting future is
/// dropped early.
struct PendingGuard<'a> {
    inner: &'a Inner,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock_ignore_poison(&self.inner.state).pending.remove(self.id);
    }
}

impl Inner {
    // ---
    fn is_current(&self, epoch: u64) -> bool {
        lock_ignore_poison(&self.state).epoch == epoch
    }

    fn on_opened(&self, epoch: u64) {
        // ---
        {
            let mut state = lock_ignore_poison(&self.state);
            if state.epoch != epoch {
                return;
            }
            state.connecting = false;
            state.reconnect.on_opened();
        }

        log_info!("connected to {}", self.config.address);
        self.events.emit(SessionEvent::Connected);
    }

    fn on_errored(&self, epoch: u64, err: RpcError) {
        // ---
        {
            let mut state = lock_ignore_poison(&self.state);
            if state.epoch == epoch {
                state.connecting = false;
            }
        }

        log_error!("{}: {err}", self.config.address);
        self.events.emit(SessionEvent::Error(Arc::new(err)));
    }

    fn on_reconnect_failed(&self, epoch: u64, err: RpcError) {
        // ---
        if !self.is_current(epoch) {
            return;
        }

        log_warn!("reconnect failed: {err}");
        self.events.emit(SessionEvent::ReconnectFailed(Arc::new(err)));
    }

    fn on_message(&self, epoch: u64, text: &str) {
        // ---
        let inbound = match classify(text) {
            Ok(inbound) => inbound,
            Err(err) => {
                log_warn!("dropping inbound message: {err}");
                self.events.emit(SessionEvent::Error(Arc::new(err)));
                return;
            }
        };

        match inbound {
            Inbound::Response { id: Some(id), outcome } => {
                let mut state = lock_ignore_poison(&self.state);
                if state.epoch != epoch {
                    return;
                }
                if !state.pending.settle(id, outcome.map_err(RpcError::from)) {
                    log_debug!("no pending request for id {id}, response dropped");
                }
            }
            Inbound::Response { id: None, .. } => {
                log_debug!("response without a usable id dropped");
            }
            Inbound::Notification { method, params } => {
                if !self.is_current(epoch) {
                    return;
                }

                self.events.emit(SessionEvent::Notification {
                    method: method.clone(),
                    params: params.clone(),
                });

                for err in self.router.dispatch(&method, params.as_ref()) {
                    log_warn!("notification listener failed: {err}");
                    self.events.emit(SessionEvent::Error(Arc::new(err)));
                }
            }
            Inbound::Ignored => {
                log_debug!("ignoring message that is neither response nor notification");
            }
        }
    }

    fn on_closed(self: &Arc<Self>, epoch: u64, code: u16, reason: String) {
        // ---
        let step = {
            let mut state = lock_ignore_poison(&self.state);
            if state.epoch == epoch {
                state.link = None;
                state.connecting = false;
                Some(state.reconnect.on_unexpected_close(&self.policy))
            } else {
                None
            }
        };

        log_info!("disconnected from {} ({code}): {reason}", self.config.address);
        self.events.emit(SessionEvent::Disconnected { code, reason });

        match step {
            None | Some(ReconnectStep::Disabled) => {}
            Some(ReconnectStep::Exhausted) => {
                log_warn!(
                    "giving up on {} after {} reconnect attempts",
                    self.config.address,
                    self.policy.max_attempts
                );
                self.events.emit(SessionEvent::MaxReconnectAttemptsReached);
            }
            Some(ReconnectStep::Schedule { attempt, delay }) => {
                log_info!("reconnect attempt {attempt} in {delay:?}");
                self.events.emit(SessionEvent::Reconnecting { attempt });
                self.schedule_reconnect(epoch, delay);
            }
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, epoch: u64, delay: Duration) {
        // ---
        let mut state = lock_ignore_poison(&self.state);

        // A listener may have called disconnect() or connect() meanwhile.
        if state.epoch != epoch || state.link.is_some() {
            return;
        }

        let weak = Arc::downgrade(self);
        state.reconnect_task = Some(tokio::spawn(async move {
            time::sleep(delay).await;

            let Some(inner) = weak.upgrade() else {
                return;
            };

            // Failures are reported by `open` and the link's pump.
            let _ = Session { inner }.open(true).await;
        }));
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // ---
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(task) = state.reconnect_task.take() {
            task.abort();
        }
        state.pending.drain(|| RpcError::ConnectionClosed);
        if let Some(link) = state.link.take() {
            link.close(self.config.close_code, &self.config.close_reason);
        }
    }
}

/// Drain one link's events into the session.
///
/// Holds only a weak reference so a forgotten session can be dropped while
/// its link is still open.
async fn pump(
    weak: Weak<Inner>,
    epoch: u64,
    reconnect: bool,
    mut events: EventStream,
    opened: oneshot::Sender<Result<()>>,
) {
    // ---
    let mut opened = Some(opened);

    // True while a reconnect attempt has neither opened nor been reported.
    let mut attempt = reconnect;

    while let Some(event) = events.recv().await {
        let Some(inner) = weak.upgrade() else {
            return;
        };

        match event {
            TransportEvent::Opened => {
                attempt = false;
                inner.on_opened(epoch);
                if let Some(tx) = opened.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            TransportEvent::Message(text) => inner.on_message(epoch, &text),
            TransportEvent::Errored(reason) => {
                if let Some(tx) = opened.take() {
                    let _ = tx.send(Err(RpcError::Transport(reason.clone())));
                }
                inner.on_errored(epoch, RpcError::Transport(reason.clone()));
                if std::mem::take(&mut attempt) {
                    inner.on_reconnect_failed(epoch, RpcError::Transport(reason));
                }
            }
            TransportEvent::Closed { code, reason } => {
                if let Some(tx) = opened.take() {
                    let _ = tx.send(Err(RpcError::ConnectionClosed));
                }
                if attempt {
                    inner.on_reconnect_failed(epoch, RpcError::ConnectionClosed);
                }
                inner.on_closed(epoch, code, reason);
                return;
            }
        }
    }

    // Stream ended without a close event.
    if let Some(tx) = opened.take() {
        let _ = tx.send(Err(RpcError::ConnectionClosed));
    }
    if let Some(inner) = weak.upgrade() {
        if attempt {
            inner.on_reconnect_failed(epoch, RpcError::ConnectionClosed);
        }
        inner.on_closed(epoch, ABNORMAL_CLOSURE, String::new());
    }
}
