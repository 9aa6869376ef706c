//! Long-lived `GET /event` subscription with automatic reconnect.
//!
//! [`EventStreamManager`] owns at most one connection. Each `connect` spawns a
//! single supervisor task that opens the stream, dispatches decoded events to
//! the handler and, when the stream ends or fails, waits out an exponential
//! backoff before trying again. `disconnect` (or dropping the manager) flips a
//! per-connection cancel gate and aborts the task, so a pending backoff sleep
//! ends immediately. Callbacks run under the read side of the gate and state
//! writes re-check it under the watch lock, so once `disconnect` returns no
//! callback is running or starts, and the state stays `Disconnected`.

use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::buffer_utils::parse_sse_stream;
use crate::config::ReconnectPolicy;
use crate::error::{ClientError, Result};
use crate::streaming::{OpenCodeEventParser, StreamEvent, StreamUpdate};
use crate::transport::validate_base_url;

/// Lifecycle of the event stream
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Waiting `next_delay_ms` before reconnect attempt `attempt`
    Reconnecting { attempt: u32, next_delay_ms: u64 },
    /// The last connection attempt failed
    Error(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting {
                attempt,
                next_delay_ms,
            } => write!(f, "reconnecting (attempt {} in {} ms)", attempt, next_delay_ms),
            Self::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Receiver of stream notifications; every callback defaults to a no-op
///
/// Callbacks run on the supervisor task and should return quickly. They must
/// not call `connect` or `disconnect` on the manager that invokes them.
pub trait EventHandler: Send + Sync + 'static {
    fn on_delta(&self, _session_id: &str, _message_id: &str, _delta: &str) {}

    fn on_idle(&self, _session_id: &str) {}

    fn on_error(&self, _session_id: &str, _message: &str) {}

    fn on_connected(&self) {}

    fn on_disconnected(&self) {}
}

type DeltaFn = Box<dyn Fn(&str, &str, &str) + Send + Sync>;
type SessionFn = Box<dyn Fn(&str) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&str, &str) + Send + Sync>;
type NotifyFn = Box<dyn Fn() + Send + Sync>;

/// Closure-based [`EventHandler`]
///
/// ```rust,ignore
/// let callbacks = EventCallbacks::new()
///     .with_delta(|_, _, delta| print!("{}", delta))
///     .with_idle(|session| println!("\n[{} idle]", session));
/// client.connect_event_source(callbacks)?;
/// ```
#[derive(Default)]
pub struct EventCallbacks {
    delta: Option<DeltaFn>,
    idle: Option<SessionFn>,
    error: Option<ErrorFn>,
    connected: Option<NotifyFn>,
    disconnected: Option<NotifyFn>,
}

impl EventCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delta(mut self, f: impl Fn(&str, &str, &str) + Send + Sync + 'static) -> Self {
        self.delta = Some(Box::new(f));
        self
    }

    pub fn with_idle(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.idle = Some(Box::new(f));
        self
    }

    pub fn with_error(mut self, f: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    pub fn with_connected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.connected = Some(Box::new(f));
        self
    }

    pub fn with_disconnected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.disconnected = Some(Box::new(f));
        self
    }
}

impl EventHandler for EventCallbacks {
    fn on_delta(&self, session_id: &str, message_id: &str, delta: &str) {
        if let Some(f) = &self.delta {
            f(session_id, message_id, delta);
        }
    }

    fn on_idle(&self, session_id: &str) {
        if let Some(f) = &self.idle {
            f(session_id);
        }
    }

    fn on_error(&self, session_id: &str, message: &str) {
        if let Some(f) = &self.error {
            f(session_id, message);
        }
    }

    fn on_connected(&self) {
        if let Some(f) = &self.connected {
            f();
        }
    }

    fn on_disconnected(&self) {
        if let Some(f) = &self.disconnected {
            f();
        }
    }
}

/// Forwards every notification into a channel as a [`StreamUpdate`]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<StreamUpdate>,
}

impl ChannelHandler {
    pub fn new(tx: mpsc::UnboundedSender<StreamUpdate>) -> Self {
        Self { tx }
    }

    fn forward(&self, update: StreamUpdate) {
        // Receiver gone: nobody is listening any more
        let _ = self.tx.send(update);
    }
}

impl EventHandler for ChannelHandler {
    fn on_delta(&self, session_id: &str, message_id: &str, delta: &str) {
        self.forward(StreamUpdate::Event(StreamEvent::Delta {
            session_id: session_id.to_string(),
            message_id: message_id.to_string(),
            delta: delta.to_string(),
        }));
    }

    fn on_idle(&self, session_id: &str) {
        self.forward(StreamUpdate::Event(StreamEvent::Idle {
            session_id: session_id.to_string(),
        }));
    }

    fn on_error(&self, session_id: &str, message: &str) {
        self.forward(StreamUpdate::Event(StreamEvent::Error {
            session_id: session_id.to_string(),
            message: message.to_string(),
        }));
    }

    fn on_connected(&self) {
        self.forward(StreamUpdate::Connected);
    }

    fn on_disconnected(&self) {
        self.forward(StreamUpdate::Disconnected);
    }
}

/// Cancellation flag shared by a connection and its supervisor
///
/// Deliveries hold the read side; cancelling takes the write side, so it
/// waits for an in-flight callback and blocks any later one.
#[derive(Clone, Default)]
struct CancelGate(Arc<RwLock<bool>>);

impl CancelGate {
    fn cancel(&self) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = true;
    }

    fn is_cancelled(&self) -> bool {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` unless cancelled, keeping cancellation out until it returns
    fn run_unless_cancelled(&self, f: impl FnOnce()) {
        let cancelled = self.0.read().unwrap_or_else(PoisonError::into_inner);
        if !*cancelled {
            f();
        }
    }
}

struct ActiveConnection {
    gate: CancelGate,
    task: JoinHandle<()>,
}

impl ActiveConnection {
    fn cancel(self) {
        self.gate.cancel();
        self.task.abort();
    }
}

/// Owner of the single `/event` connection
pub struct EventStreamManager {
    http_client: reqwest::Client,
    base_url: String,
    policy: ReconnectPolicy,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    active: Mutex<Option<ActiveConnection>>,
}

impl EventStreamManager {
    /// The URL is only checked by [`connect`](Self::connect)
    pub fn new(
        http_client: reqwest::Client,
        base_url: impl Into<String>,
        policy: ReconnectPolicy,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            http_client,
            base_url: base_url.into(),
            policy,
            state_tx: Arc::new(state_tx),
            active: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Open the stream, replacing any existing connection
    ///
    /// Fails on a malformed base URL or when called outside a tokio runtime;
    /// connection problems are reported through the handler.
    pub fn connect<H: EventHandler>(&self, handler: H) -> Result<()> {
        self.connect_shared(Arc::new(handler))
    }

    /// Open the stream and receive notifications over a channel
    pub fn connect_channel(&self) -> Result<mpsc::UnboundedReceiver<StreamUpdate>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connect(ChannelHandler::new(tx))?;
        Ok(rx)
    }

    pub fn connect_shared(&self, handler: Arc<dyn EventHandler>) -> Result<()> {
        let event_url = format!("{}/event", validate_base_url(&self.base_url)?);
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ClientError::InvalidConfiguration(
                "event stream must be connected from within a tokio runtime".to_string(),
            )
        })?;

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            tracing::debug!("Replacing existing event stream connection");
            previous.cancel();
        }

        let gate = CancelGate::default();
        let supervisor = Supervisor {
            http_client: self.http_client.clone(),
            event_url,
            policy: self.policy,
            handler,
            state_tx: Arc::clone(&self.state_tx),
            gate: gate.clone(),
        };

        self.state_tx.send_replace(ConnectionState::Connecting);
        let task = runtime.spawn(supervisor.run());
        *active = Some(ActiveConnection { gate, task });
        Ok(())
    }

    /// Close the stream and cancel any pending reconnect; a no-op when idle
    pub fn disconnect(&self) {
        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(previous) = previous {
            previous.cancel();
            tracing::info!("Event stream disconnected");
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }
}

impl Drop for EventStreamManager {
    fn drop(&mut self) {
        let active = self
            .active
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(active) = active {
            active.cancel();
        }
    }
}

/// State owned by one connection's retry loop
struct Supervisor {
    http_client: reqwest::Client,
    event_url: String,
    policy: ReconnectPolicy,
    handler: Arc<dyn EventHandler>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    gate: CancelGate,
}

impl Supervisor {
    fn is_cancelled(&self) -> bool {
        self.gate.is_cancelled()
    }

    /// Checked under the watch lock: `disconnect` cancels before it stores
    /// `Disconnected`, so a stale write can never land after it
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if self.gate.is_cancelled() {
                return false;
            }
            *current = state;
            true
        });
    }

    fn deliver(&self, f: impl FnOnce(&dyn EventHandler)) {
        self.gate.run_unless_cancelled(|| f(self.handler.as_ref()));
    }

    async fn run(self) {
        let mut attempt: u32 = 0;
        // Whether on_disconnected already fired for the current outage
        let mut outage_reported = false;

        loop {
            if self.is_cancelled() {
                return;
            }
            self.set_state(ConnectionState::Connecting);

            match self.open().await {
                Ok(response) => {
                    attempt = 0;
                    outage_reported = false;
                    self.set_state(ConnectionState::Connected);
                    tracing::info!(url = %self.event_url, "Event stream connected");
                    self.deliver(|h| h.on_connected());

                    let reason = self.pump(response).await;
                    if self.is_cancelled() {
                        return;
                    }
                    tracing::warn!(reason = %reason, "Event stream lost");
                    outage_reported = true;
                    self.deliver(|h| h.on_disconnected());
                }
                Err(e) => {
                    if self.is_cancelled() {
                        return;
                    }
                    tracing::warn!(url = %self.event_url, error = %e, "Event stream connection failed");
                    self.set_state(ConnectionState::Error(e.to_string()));
                    if !outage_reported {
                        outage_reported = true;
                        self.deliver(|h| h.on_disconnected());
                    }
                }
            }

            attempt = attempt.saturating_add(1);
            let delay = self.policy.delay_for_attempt(attempt);
            self.set_state(ConnectionState::Reconnecting {
                attempt,
                next_delay_ms: delay.as_millis() as u64,
            });
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
            tokio::time::sleep(delay).await;
        }
    }

    async fn open(&self) -> Result<reqwest::Response> {
        let response = self
            .http_client
            .get(&self.event_url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Dispatch events until the stream ends; returns why it ended
    async fn pump(&self, response: reqwest::Response) -> String {
        let mut events = parse_sse_stream(response.bytes_stream(), OpenCodeEventParser);

        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    if self.is_cancelled() {
                        return "cancelled".to_string();
                    }
                    self.dispatch(&event);
                }
                Err(e) => return e.to_string(),
            }
        }
        ClientError::StreamDisconnected("closed by server".to_string()).to_string()
    }

    fn dispatch(&self, event: &StreamEvent) {
        tracing::trace!(?event, "Event received");
        self.deliver(|h| match event {
            StreamEvent::Delta {
                session_id,
                message_id,
                delta,
            } => h.on_delta(session_id, message_id, delta),
            StreamEvent::Idle { session_id } => h.on_idle(session_id),
            StreamEvent::Error {
                session_id,
                message,
            } => h.on_error(session_id, message),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_state_display() {
        let state = ConnectionState::Reconnecting {
            attempt: 2,
            next_delay_ms: 4000,
        };
        assert_eq!(state.to_string(), "reconnecting (attempt 2 in 4000 ms)");
        assert!(!state.is_connected());
        assert!(ConnectionState::Connected.is_connected());
    }

    #[test]
    fn test_callbacks_route_to_closures() {
        let deltas = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&deltas);
        let callbacks = EventCallbacks::new().with_delta(move |_, _, delta| {
            counter.fetch_add(delta.len(), Ordering::SeqCst);
        });

        callbacks.on_delta("s", "m", "abc");
        callbacks.on_idle("s");
        callbacks.on_connected();
        assert_eq!(deltas.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_channel_handler_tags_updates() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = ChannelHandler::new(tx);
        handler.on_connected();
        handler.on_error("s1", "boom");

        assert_eq!(rx.try_recv().unwrap(), StreamUpdate::Connected);
        assert_eq!(
            rx.try_recv().unwrap(),
            StreamUpdate::Event(StreamEvent::Error {
                session_id: "s1".into(),
                message: "boom".into(),
            })
        );
    }

    #[test]
    fn test_disconnect_when_idle_is_noop() {
        let manager = EventStreamManager::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            ReconnectPolicy::default(),
        );
        manager.disconnect();
        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_invalid_url_fails_synchronously() {
        let manager = EventStreamManager::new(
            reqwest::Client::new(),
            "not a url",
            ReconnectPolicy::default(),
        );
        let err = manager.connect(EventCallbacks::new()).unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfiguration(_)));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connect_outside_runtime_is_an_error() {
        let manager = EventStreamManager::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            ReconnectPolicy::default(),
        );
        let err = manager.connect(EventCallbacks::new()).unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfiguration(_)));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_cancel_waits_for_running_callback() {
        let gate = CancelGate::default();
        let finished = Arc::new(AtomicUsize::new(0));

        let worker = {
            let gate = gate.clone();
            let finished = Arc::clone(&finished);
            std::thread::spawn(move || {
                gate.run_unless_cancelled(|| {
                    std::thread::sleep(Duration::from_millis(100));
                    finished.fetch_add(1, Ordering::SeqCst);
                });
            })
        };

        // Let the worker enter the callback first
        while gate.0.try_write().is_ok() && finished.load(Ordering::SeqCst) == 0 {
            std::thread::yield_now();
        }
        gate.cancel();
        assert_eq!(finished.load(Ordering::SeqCst), 1);

        gate.run_unless_cancelled(|| {
            finished.fetch_add(1, Ordering::SeqCst);
        });
        worker.join().unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(gate.is_cancelled());
    }

    #[test]
    fn test_cancelled_supervisor_cannot_overwrite_state() {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let supervisor = Supervisor {
            http_client: reqwest::Client::new(),
            event_url: "http://127.0.0.1:9/event".to_string(),
            policy: ReconnectPolicy::default(),
            handler: Arc::new(EventCallbacks::new()),
            state_tx: Arc::new(state_tx),
            gate: CancelGate::default(),
        };

        supervisor.set_state(ConnectionState::Connected);
        assert_eq!(*supervisor.state_tx.borrow(), ConnectionState::Connected);

        supervisor.gate.cancel();
        supervisor.state_tx.send_replace(ConnectionState::Disconnected);
        supervisor.set_state(ConnectionState::Connected);
        assert_eq!(*supervisor.state_tx.borrow(), ConnectionState::Disconnected);
    }
}
