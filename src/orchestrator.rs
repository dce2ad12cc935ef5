// ABOUTME: Client orchestrator (component I): drives connect/handshake, paces the adaptive
// ABOUTME: time-sync loop, dispatches messages, and owns group state and the audio pipeline

use crate::audio::output::{AudioOutput, CpalOutput};
use crate::audio::{AudioFormat, AudioPipeline, Codec};
use crate::clock;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::events::{ClientEvent, EventBus};
use crate::group::GroupState;
use crate::protocol::client::BinaryFrame;
use crate::protocol::messages::{
    ArtworkFormatRequest, ArtworkV1Support, AudioFormatSpec, ClientCommand, ClientGoodbye,
    ClientHello, ClientState, ClientTime, ControllerCommand, DeviceInfo, GoodbyeReason, Message,
    PlayerState, PlayerSyncState, PlayerV1Support, StreamRequestFormat, VisualizerV1Support,
};
use crate::transport::{ConnectionState, Transport, TransportEvent};
use base64::Engine;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};

/// Handshake must complete within this window or `connect` fails.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Adaptive time-sync interval table (§4.I).
fn next_sync_interval(measurement_count: u32, offset_uncertainty_us: f64) -> Duration {
    if measurement_count < 3 {
        return Duration::from_millis(200);
    }
    if offset_uncertainty_us >= 5000.0 {
        Duration::from_millis(200)
    } else if offset_uncertainty_us >= 2000.0 {
        Duration::from_millis(500)
    } else if offset_uncertainty_us >= 1000.0 {
        Duration::from_millis(1000)
    } else {
        Duration::from_millis(3000)
    }
}

/// Drives one server connection: handshake, time-sync pacing, message
/// dispatch, group-state ownership, and the optional audio pipeline.
///
/// Owns a single transport, a single clock synchronizer, one optional audio
/// pipeline, and the current group state (§3 "Ownership & lifecycle").
pub struct Client {
    config: ClientConfig,
    client_id: String,
    name: String,
    transport: Arc<Transport>,
    clock_sync: Arc<crate::sync::ClockSync>,
    pipeline: Arc<AudioPipeline>,
    group: StdMutex<GroupState>,
    events: Arc<EventBus>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    handshake_waiter: StdMutex<Option<oneshot::Sender<Result<(), Error>>>>,
    sync_generation: AtomicU64,
    artwork: StdMutex<[Option<Arc<[u8]>>; 4]>,
    output: Mutex<Option<Box<dyn AudioOutput>>>,
}

impl Client {
    pub fn new(config: ClientConfig, client_id: String, name: String, device_sample_rate: u32) -> Arc<Self> {
        let (transport, event_rx) = Transport::with_keepalive(
            config.reconnect_policy(),
            Duration::from_millis(config.keepalive_interval_ms),
        );
        let clock_sync = Arc::new(crate::sync::ClockSync::with_tuning(config.clock_tuning()));
        let pipeline = Arc::new(AudioPipeline::with_convergence_wait(
            Arc::clone(&clock_sync),
            config.buffer_preroll_ms * 1000,
            device_sample_rate,
            config.convergence_wait(),
        ));
        Arc::new(Self {
            config,
            client_id,
            name,
            transport,
            clock_sync,
            pipeline,
            group: StdMutex::new(GroupState::new()),
            events: Arc::new(EventBus::default()),
            event_rx: Mutex::new(Some(event_rx)),
            handshake_waiter: StdMutex::new(None),
            sync_generation: AtomicU64::new(0),
            artwork: StdMutex::new(Default::default()),
            output: Mutex::new(None),
        })
    }

    /// Subscribe to the client's event stream (§9 notification pattern).
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn clock_sync(&self) -> &Arc<crate::sync::ClockSync> {
        &self.clock_sync
    }

    pub fn pipeline(&self) -> &Arc<AudioPipeline> {
        &self.pipeline
    }

    /// `connect(uri)`: open the socket, send `client/hello`, and wait for
    /// `server/hello` within the handshake timeout (§4.I steps 1-4).
    /// Returns once the connection is `Connected` and the time-sync loop has
    /// started; further handshakes after an automatic reconnect are driven
    /// silently by the dispatch loop.
    pub async fn connect(self: &Arc<Self>, uri: &str) -> Result<(), Error> {
        let mut rx_slot = self.event_rx.lock().await;
        let rx = rx_slot.take().ok_or_else(|| {
            Error::Connection("connect() already called on this client".to_string())
        })?;
        drop(rx_slot);

        let (tx, ready) = oneshot::channel();
        *self.handshake_waiter.lock().expect("handshake waiter mutex poisoned") = Some(tx);

        self.transport.connect(uri).await?;

        let this = Arc::clone(self);
        tokio::spawn(async move { this.dispatch_loop(rx).await });

        match tokio::time::timeout(HANDSHAKE_TIMEOUT, ready).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_canceled)) => Err(Error::HandshakeFailed("dispatch loop exited".to_string())),
            Err(_elapsed) => {
                self.handshake_waiter.lock().expect("handshake waiter mutex poisoned").take();
                self.transport.disconnect("handshake_timeout").await;
                Err(Error::HandshakeFailed(format!(
                    "no server/hello within {:?}",
                    HANDSHAKE_TIMEOUT
                )))
            }
        }
    }

    /// Graceful disconnect (§4.I cancellation, §5). Cancels the time-sync
    /// loop, any pending handshake wait, and the transport's receive loop.
    pub async fn disconnect(&self, reason: GoodbyeReason) {
        let goodbye = Message::ClientGoodbye(ClientGoodbye { reason });
        if let Ok(text) = serde_json::to_string(&goodbye) {
            let _ = self.transport.send_text(&text).await;
        }
        self.sync_generation.fetch_add(1, Ordering::SeqCst);
        self.transport.disconnect("client_request").await;
        self.pipeline.stop();
    }

    /// Send a controller command to the server (§4.I), clamping volume to
    /// the 0-100 range the wire protocol requires.
    pub async fn send_command(&self, command: &str, volume: Option<u8>, mute: Option<bool>) -> Result<(), Error> {
        let msg = Message::ClientCommand(ClientCommand {
            controller: Some(ControllerCommand {
                command: command.to_string(),
                volume: volume.map(|v| v.min(100)),
                mute,
            }),
        });
        self.send_message(&msg).await
    }

    /// Ask the server to restart the stream in a different format
    /// (`stream/request-format`).
    pub async fn request_format(&self, codec: Option<&str>, channels: Option<u8>, sample_rate: Option<u32>, bit_depth: Option<u8>) -> Result<(), Error> {
        let msg = Message::StreamRequestFormat(StreamRequestFormat {
            player: Some(crate::protocol::messages::PlayerFormatRequest {
                codec: codec.map(str::to_string),
                channels,
                sample_rate,
                bit_depth,
            }),
            artwork: None,
        });
        self.send_message(&msg).await
    }

    pub async fn request_artwork(&self, req: ArtworkFormatRequest) -> Result<(), Error> {
        let msg = Message::StreamRequestFormat(StreamRequestFormat { player: None, artwork: Some(req) });
        self.send_message(&msg).await
    }

    /// Apply an externally supplied static offset (e.g. acoustic/processing
    /// latency compensation for this player) and notify the server. Applied
    /// immediately to local playback scheduling; does not wait for the
    /// server's `client/sync_offset_ack`.
    pub async fn set_sync_offset(&self, offset_ms: f64, source: Option<&str>) -> Result<(), Error> {
        self.clock_sync.set_static_offset_us((offset_ms * 1000.0).round() as i64);
        let msg = Message::ClientSyncOffset(crate::protocol::messages::ClientSyncOffset {
            player_id: self.client_id.clone(),
            offset_ms,
            source: source.map(str::to_string),
            timestamp: Some(clock::now_us()),
        });
        self.send_message(&msg).await
    }

    async fn send_message(&self, msg: &Message) -> Result<(), Error> {
        let text = serde_json::to_string(msg).map_err(|e| Error::Protocol(e.to_string()))?;
        self.transport.send_text(&text).await
    }

    fn build_hello(&self) -> ClientHello {
        let mut supported_formats = vec![];
        let pcm = AudioFormatSpec { codec: "pcm".to_string(), channels: 2, sample_rate: 48_000, bit_depth: 16 };
        let opus = AudioFormatSpec { codec: "opus".to_string(), channels: 2, sample_rate: 48_000, bit_depth: 16 };
        let flac = AudioFormatSpec { codec: "flac".to_string(), channels: 2, sample_rate: 48_000, bit_depth: 16 };
        match self.config.preferred_codec {
            crate::config::PreferredCodec::Opus => {
                supported_formats.push(opus);
                supported_formats.push(flac);
            }
            crate::config::PreferredCodec::Flac => {
                supported_formats.push(flac);
                supported_formats.push(opus);
            }
        }
        supported_formats.push(pcm);

        ClientHello {
            client_id: self.client_id.clone(),
            name: self.name.clone(),
            version: 1,
            supported_roles: vec![
                "player@v1".to_string(),
                "controller@v1".to_string(),
                "artwork@v1".to_string(),
                "visualizer@v1".to_string(),
            ],
            device_info: Some(DeviceInfo {
                product_name: Some(self.name.clone()),
                manufacturer: Some("sendspin".to_string()),
                software_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            player_v1_support: Some(PlayerV1Support {
                supported_formats,
                buffer_capacity: 256,
                supported_commands: vec!["play".to_string(), "pause".to_string(), "stop".to_string()],
            }),
            artwork_v1_support: Some(ArtworkV1Support { channels: vec![0, 1, 2, 3] }),
            visualizer_v1_support: Some(VisualizerV1Support { buffer_capacity: 64 }),
        }
    }

    async fn send_hello(&self) -> Result<(), Error> {
        let hello = Message::ClientHello(self.build_hello());
        self.send_message(&hello).await
    }

    /// The single consumer of transport events for this connection's whole
    /// lifetime, including every reconnect. A `StateChanged(Handshaking)`
    /// fires both on the initial connect and on every automatic reconnect,
    /// so handshake re-send lives here rather than being duplicated in
    /// `connect`.
    async fn dispatch_loop(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                TransportEvent::StateChanged(ConnectionState::Handshaking) => {
                    if let Err(e) = self.send_hello().await {
                        log::warn!("failed to send client/hello: {e}");
                    }
                }
                TransportEvent::StateChanged(state) => {
                    if state == ConnectionState::Disconnected {
                        self.fail_pending_handshake(Error::Connection("disconnected before handshake completed".to_string()));
                    }
                    self.events.emit(ClientEvent::ConnectionStateChanged(state));
                }
                TransportEvent::TextReceived(text) => self.handle_text(&text).await,
                TransportEvent::BinaryReceived(data) => self.handle_binary(&data),
            }
        }
        self.fail_pending_handshake(Error::Connection("transport closed".to_string()));
    }

    fn fail_pending_handshake(&self, err: Error) {
        if let Some(tx) = self.handshake_waiter.lock().expect("handshake waiter mutex poisoned").take() {
            let _ = tx.send(Err(err));
        }
    }

    async fn handle_text(&self, text: &str) {
        let Some(type_name) = crate::protocol::messages::prescan_type(text) else {
            log::warn!("dropping unparseable text frame");
            return;
        };
        let type_name = type_name.to_string();

        let msg = match serde_json::from_str::<Message>(text) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("malformed message (type={type_name}): {e}");
                self.events.emit(ClientEvent::SteadyStateError(format!("malformed message: {e}")));
                return;
            }
        };

        match msg {
            Message::ServerHello(hello) => self.handle_server_hello(hello).await,
            Message::ServerTime(server_time) => self.handle_server_time(server_time),
            Message::GroupUpdate(update) => {
                self.group.lock().expect("group mutex poisoned").merge_group_update(&update);
                self.emit_group_snapshot();
            }
            Message::ServerState(state) => {
                self.group.lock().expect("group mutex poisoned").merge_server_state(&state);
                self.emit_group_snapshot();
            }
            Message::StreamStart(start) => self.handle_stream_start(start).await,
            Message::StreamEnd(_) => {
                self.pipeline.stop();
                self.events.emit(ClientEvent::PipelineStateChanged(self.pipeline.state()));
            }
            Message::StreamClear(_) => {
                self.pipeline.clear();
                self.events.emit(ClientEvent::PipelineStateChanged(self.pipeline.state()));
            }
            Message::ServerCommand(_) => {
                // Commands targeting the player role (volume/mute/transport
                // control) are handled by the external audio-output adapter
                // the host application owns; surfaced via events only.
            }
            Message::ClientSyncOffsetAck(ack) => {
                if !ack.success {
                    log::warn!(
                        "server rejected sync offset for {}: {}",
                        ack.player_id,
                        ack.error.as_deref().unwrap_or("no reason given")
                    );
                    self.events.emit(ClientEvent::SteadyStateError(format!(
                        "sync offset rejected: {}",
                        ack.error.as_deref().unwrap_or("no reason given")
                    )));
                }
            }
            Message::ClientHello(_)
            | Message::ClientTime(_)
            | Message::ClientState(_)
            | Message::ClientCommand(_)
            | Message::StreamRequestFormat(_)
            | Message::ClientSyncOffset(_)
            | Message::ClientGoodbye(_) => {
                log::warn!("received a client-direction message type from the server: {type_name}");
            }
        }
    }

    async fn handle_server_hello(self: &Arc<Self>, hello: crate::protocol::messages::ServerHello) {
        log::info!(
            "handshake complete: server_id={} active_roles={:?}",
            hello.server_id, hello.active_roles
        );
        self.transport.mark_connected();
        self.clock_sync.reset();

        let initial_state = Message::ClientState(ClientState {
            player: Some(PlayerState { state: PlayerSyncState::Synchronized, volume: Some(100), muted: Some(false) }),
        });
        if let Err(e) = self.send_message(&initial_state).await {
            log::warn!("failed to send initial client/state: {e}");
        }

        let generation = self.sync_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let this = Arc::clone(self);
        tokio::spawn(async move { this.time_sync_loop(generation).await });

        if let Some(tx) = self.handshake_waiter.lock().expect("handshake waiter mutex poisoned").take() {
            let _ = tx.send(Ok(()));
        }
    }

    fn handle_server_time(&self, server_time: crate::protocol::messages::ServerTime) {
        let t4 = clock::now_us();
        self.clock_sync.update(
            server_time.client_transmitted,
            server_time.server_received,
            server_time.server_transmitted,
            t4,
        );
        if self.clock_sync.take_convergence_event() {
            self.events.emit(ClientEvent::ClockSyncConverged);
        }
    }

    /// Adaptive time-sync loop: sends `client/time` on the cadence derived
    /// from `next_sync_interval`. `generation` lets a reconnect's freshly
    /// spawned loop supersede a stale one without an explicit cancel token.
    async fn time_sync_loop(self: Arc<Self>, generation: u64) {
        loop {
            if self.sync_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            if self.transport.state() != ConnectionState::Connected {
                return;
            }
            let msg = Message::ClientTime(ClientTime { client_transmitted: clock::now_us() });
            if let Err(e) = self.send_message(&msg).await {
                log::warn!("client/time send failed: {e}");
                return;
            }
            let interval = next_sync_interval(self.clock_sync.measurement_count(), self.clock_sync.offset_std_dev_micros());
            tokio::time::sleep(interval).await;
        }
    }

    async fn handle_stream_start(&self, start: crate::protocol::messages::StreamStart) {
        let Some(player) = start.player else {
            log::warn!("stream/start with no player config");
            return;
        };
        let Some(codec) = Codec::parse(&player.codec) else {
            self.events.emit(ClientEvent::SteadyStateError(format!("unsupported codec: {}", player.codec)));
            return;
        };
        let format = AudioFormat {
            codec,
            sample_rate: player.sample_rate,
            channels: player.channels,
            bit_depth: player.bit_depth,
            bitrate: player.bitrate,
            codec_header: player
                .codec_header
                .as_deref()
                .and_then(|h| base64::engine::general_purpose::STANDARD.decode(h).ok()),
        };
        if let Err(e) = self.pipeline.start(format) {
            self.events.emit(ClientEvent::SteadyStateError(format!("{e}")));
            return;
        }

        let mut output_guard = self.output.lock().await;
        if output_guard.is_none() {
            match CpalOutput::new() {
                Ok(out) => *output_guard = Some(Box::new(out)),
                Err(e) => {
                    self.events.emit(ClientEvent::SteadyStateError(format!("audio output unavailable: {e}")));
                    return;
                }
            }
        }
        if let (Some(output), Some(negotiated)) = (output_guard.as_mut(), self.pipeline.format()) {
            if let Some(source) = self.pipeline.sample_source() {
                // The resampler always targets the device's rate (built in
                // `sample_source`), so the stream must be opened at that same
                // rate rather than the stream's negotiated source rate.
                let stream_format =
                    AudioFormat { sample_rate: self.pipeline.device_sample_rate(), ..negotiated };
                if let Err(e) = output.initialize(&stream_format) {
                    log::warn!("output initialize failed: {e}");
                }
                output.set_sample_source(source);
                if let Err(e) = output.play() {
                    log::warn!("output play failed: {e}");
                }
            }
        }
        self.events.emit(ClientEvent::PipelineStateChanged(self.pipeline.state()));
    }

    fn handle_binary(&self, data: &[u8]) {
        let frame = match BinaryFrame::from_bytes(data) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("malformed binary frame: {e}");
                self.events.emit(ClientEvent::SteadyStateError(format!("malformed binary frame: {e}")));
                return;
            }
        };
        match frame {
            BinaryFrame::Audio(chunk) => {
                self.pipeline.push_chunk(&chunk.data, chunk.timestamp);
            }
            BinaryFrame::Artwork(chunk) => {
                let mut artwork = self.artwork.lock().expect("artwork mutex poisoned");
                let slot = chunk.channel as usize;
                if slot < artwork.len() {
                    artwork[slot] = if chunk.is_clear() { None } else { Some(Arc::clone(&chunk.data)) };
                }
                self.events.emit(ClientEvent::ArtworkUpdated {
                    channel: chunk.channel,
                    data: if chunk.is_clear() { None } else { Some(chunk.data) },
                });
            }
            BinaryFrame::Visualizer(chunk) => {
                self.events.emit(ClientEvent::VisualizerFrame { timestamp: chunk.timestamp, data: chunk.data });
            }
            BinaryFrame::Unknown { type_id, .. } => {
                log::debug!("dropping binary frame with unrecognized type byte {type_id}");
            }
        }
    }

    fn emit_group_snapshot(&self) {
        let snapshot = self.group.lock().expect("group mutex poisoned").snapshot();
        self.events.emit(ClientEvent::GroupUpdated(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_interval_below_three_measurements_is_fast() {
        assert_eq!(next_sync_interval(0, 50_000.0), Duration::from_millis(200));
        assert_eq!(next_sync_interval(2, 10.0), Duration::from_millis(200));
    }

    #[test]
    fn sync_interval_table_matches_spec() {
        assert_eq!(next_sync_interval(5, 6_000.0), Duration::from_millis(200));
        assert_eq!(next_sync_interval(5, 3_000.0), Duration::from_millis(500));
        assert_eq!(next_sync_interval(5, 1_500.0), Duration::from_millis(1000));
        assert_eq!(next_sync_interval(5, 500.0), Duration::from_millis(3000));
    }
}
