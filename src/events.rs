// ABOUTME: Typed event notification (§9): a single-producer broadcast channel
// ABOUTME: with weakly-ordered subscribers, one per instance of the orchestrator

use crate::audio::PipelineState;
use crate::group::GroupSnapshot;
use crate::transport::ConnectionState;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Notifications the orchestrator emits. Subscribers never see a callback
/// re-entered concurrently with itself: `broadcast` hands each subscriber
/// its own receiver and events are emitted from a single writer (the
/// orchestrator's dispatch task), so per-subscriber ordering is preserved.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    ConnectionStateChanged(ConnectionState),
    PipelineStateChanged(PipelineState),
    GroupUpdated(GroupSnapshot),
    ArtworkUpdated { channel: u8, data: Option<Arc<[u8]>> },
    VisualizerFrame { timestamp: i64, data: Arc<[u8]> },
    ClockSyncConverged,
    /// A steady-state error (§7): malformed frame, decode failure, buffer
    /// underrun, or sync divergence. Never torn down the connection.
    SteadyStateError(String),
}

const DEFAULT_CAPACITY: usize = 256;

/// Broadcast hub for [`ClientEvent`]. Slow or absent subscribers don't
/// block the emitter; a lagging receiver simply skips ahead on its next
/// `recv` (broadcast's standard lag semantics).
pub struct EventBus {
    sender: broadcast::Sender<ClientEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _rx) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        // No receivers is a routine state (nobody subscribed yet); ignore.
        let _ = self.sender.send(event);
    }
}
