// ABOUTME: WebSocket transport with an explicit connection state machine (component D)
// ABOUTME: Frame-level send/receive plus reconnect backoff, built on tokio-tungstenite

use crate::error::Error;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Transport connection state (§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Handshaking,
    Connected,
    Reconnecting,
    Disconnecting,
}

/// Events the transport emits to its owner.
#[derive(Debug)]
pub enum TransportEvent {
    TextReceived(String),
    BinaryReceived(Vec<u8>),
    StateChanged(ConnectionState),
}

/// Reconnect backoff policy: initial delay d0, geometric factor g, cap
/// d_max, maximum attempts M (`None` = unbounded).
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_attempts: Option<u32>,
    pub enabled: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_attempts: None,
            enabled: true,
        }
    }
}

/// Frame-level WebSocket transport. Owns the connection state machine and a
/// single mutex serializing outgoing frames; text and binary are distinct
/// frame kinds per the send discipline in §4.D.
pub struct Transport {
    state: std::sync::Mutex<ConnectionState>,
    writer: Arc<Mutex<Option<WsWriter>>>,
    events: mpsc::UnboundedSender<TransportEvent>,
    cancel_flag: Arc<AtomicBool>,
    cancel_notify: Arc<Notify>,
    policy: ReconnectPolicy,
    uri: std::sync::Mutex<Option<String>>,
    /// Ping interval; 0 disables the keepalive loop entirely.
    keepalive_interval: Duration,
    /// Handle of the currently running keepalive task, aborted and replaced
    /// on each reconnect so pings don't accumulate across reconnects.
    keepalive_handle: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Transport {
    pub fn new(policy: ReconnectPolicy) -> (Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>) {
        Self::with_keepalive(policy, Duration::ZERO)
    }

    pub fn with_keepalive(
        policy: ReconnectPolicy,
        keepalive_interval: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            state: std::sync::Mutex::new(ConnectionState::Disconnected),
            writer: Arc::new(Mutex::new(None)),
            events,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            cancel_notify: Arc::new(Notify::new()),
            policy,
            uri: std::sync::Mutex::new(None),
            keepalive_interval,
            keepalive_handle: std::sync::Mutex::new(None),
        });
        (transport, event_rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().expect("transport state mutex poisoned")
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().expect("transport state mutex poisoned") = state;
        let _ = self.events.send(TransportEvent::StateChanged(state));
    }

    /// Connect to `uri`, wait for the underlying socket to open, transition
    /// Disconnected -> Connecting -> Handshaking, and spawn the receive
    /// loop. The caller (the orchestrator) drives the protocol-level
    /// handshake on top; this layer only establishes the socket.
    pub async fn connect(self: &Arc<Self>, uri: &str) -> Result<(), Error> {
        self.cancel_flag.store(false, Ordering::SeqCst);
        *self.uri.lock().expect("transport uri mutex poisoned") = Some(uri.to_string());
        self.set_state(ConnectionState::Connecting);

        let (stream, _response) =
            connect_async(uri).await.map_err(|e| Error::Connection(e.to_string()))?;
        let (write, read) = stream.split();
        *self.writer.lock().await = Some(write);

        self.set_state(ConnectionState::Handshaking);
        self.spawn_receive_loop(read);
        self.spawn_keepalive_loop();
        Ok(())
    }

    /// Sends a WebSocket ping on `keepalive_interval_ms`'s cadence while
    /// connected; a no-op if the interval is zero (disabled, the default).
    fn spawn_keepalive_loop(self: &Arc<Self>) {
        if let Some(previous) = self
            .keepalive_handle
            .lock()
            .expect("keepalive handle mutex poisoned")
            .take()
        {
            previous.abort();
        }
        if self.keepalive_interval.is_zero() {
            return;
        }
        let this = Arc::clone(self);
        let interval = self.keepalive_interval;
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = this.cancel_notify.notified() => return,
                }
                if this.cancel_flag.load(Ordering::SeqCst) {
                    return;
                }
                let mut writer = this.writer.lock().await;
                match writer.as_mut() {
                    Some(w) => {
                        if w.send(WsMessage::Ping(Vec::new())).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                }
            }
        });
        *self.keepalive_handle.lock().expect("keepalive handle mutex poisoned") = Some(handle);
    }

    /// Called by the orchestrator once `server/hello` has been received.
    pub fn mark_connected(&self) {
        self.set_state(ConnectionState::Connected);
    }

    fn spawn_receive_loop(self: &Arc<Self>, mut read: WsReader) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if this.cancel_flag.load(Ordering::SeqCst) {
                    break;
                }
                let next = tokio::select! {
                    msg = read.next() => msg,
                    _ = this.cancel_notify.notified() => break,
                };
                match next {
                    Some(Ok(WsMessage::Text(text))) => {
                        let _ = this.events.send(TransportEvent::TextReceived(text));
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        let _ = this.events.send(TransportEvent::BinaryReceived(data));
                    }
                    Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => continue,
                    Some(Ok(WsMessage::Close(_))) | None => {
                        this.on_receive_closed();
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        log::warn!("transport receive error: {e}");
                        this.on_receive_closed();
                        break;
                    }
                }
            }
        });
    }

    /// Receive errors or a clean close both end the socket; if auto-reconnect
    /// is enabled this transitions to Reconnecting and spawns the backoff
    /// loop, otherwise to Disconnected.
    fn on_receive_closed(self: &Arc<Self>) {
        if self.state() == ConnectionState::Disconnecting {
            self.set_state(ConnectionState::Disconnected);
            return;
        }
        if self.policy.enabled {
            self.set_state(ConnectionState::Reconnecting);
            self.spawn_reconnect_loop();
        } else {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn spawn_reconnect_loop(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut delay = this.policy.initial_delay;
            let mut attempt = 0u32;
            loop {
                if this.cancel_flag.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(max) = this.policy.max_attempts {
                    if attempt >= max {
                        this.set_state(ConnectionState::Disconnected);
                        return;
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = this.cancel_notify.notified() => return,
                }
                attempt += 1;
                let Some(uri) = this.uri.lock().expect("transport uri mutex poisoned").clone()
                else {
                    return;
                };
                match this.connect(&uri).await {
                    Ok(()) => return,
                    Err(e) => {
                        log::warn!("reconnect attempt {attempt} failed: {e}");
                        delay = delay
                            .mul_f64(this.policy.backoff_multiplier)
                            .min(this.policy.max_delay);
                    }
                }
            }
        });
    }

    pub async fn send_text(&self, message: &str) -> Result<(), Error> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(w) => {
                w.send(WsMessage::Text(message.to_string())).await.map_err(|e| Error::WebSocket(e.to_string()))
            }
            None => Err(Error::Transport("not connected".to_string())),
        }
    }

    pub async fn send_binary(&self, bytes: Vec<u8>) -> Result<(), Error> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(w) => w.send(WsMessage::Binary(bytes)).await.map_err(|e| Error::WebSocket(e.to_string())),
            None => Err(Error::Transport("not connected".to_string())),
        }
    }

    /// Graceful disconnect: best-effort `client/goodbye` is the caller's
    /// responsibility (sent via `send_text` before calling this); cancels
    /// the receive loop and any pending reconnect/handshake wait.
    pub async fn disconnect(self: &Arc<Self>, reason: &str) {
        if self.state() == ConnectionState::Disconnecting {
            return;
        }
        log::info!("disconnecting: {reason}");
        self.set_state(ConnectionState::Disconnecting);
        self.cancel_flag.store(true, Ordering::SeqCst);
        self.cancel_notify.notify_waiters();
        if let Some(handle) = self.keepalive_handle.lock().expect("keepalive handle mutex poisoned").take() {
            handle.abort();
        }
        if let Some(mut w) = self.writer.lock().await.take() {
            let _ = w.close().await;
        }
        self.set_state(ConnectionState::Disconnected);
    }
}
