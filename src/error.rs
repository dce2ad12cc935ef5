// ABOUTME: Error types for the sendspin client core
// ABOUTME: One variant per §7 error kind, each carrying its cause

use thiserror::Error;

/// Errors produced by the sendspin client core.
///
/// Transport/connection failures propagate to the caller of `connect`, while
/// steady-state errors (malformed frames, decode failures, buffer underruns,
/// sync divergence) are surfaced as events and never tear down the
/// connection or the process.
#[derive(Debug, Error)]
pub enum Error {
    /// Connect failed, unexpected close, or send failed at the transport layer.
    #[error("transport error: {0}")]
    Transport(String),

    /// Underlying WebSocket library error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Connection establishment failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Unparseable text or binary frame. Non-fatal: dispatch skips the frame.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// No `server/hello` within the handshake timeout, or a required field was missing.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// `stream/start` named a format for which no decoder exists.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Non-fatal, per-frame decode failure. Counted by the caller.
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Audio read produced silence because the timed buffer was empty.
    #[error("buffer underrun")]
    BufferUnderrun,

    /// Sync error exceeded the hard re-anchor threshold.
    #[error("sync divergent: {0}ms error")]
    SyncDivergent(f64),

    /// Audio output device error.
    #[error("audio output error: {0}")]
    Output(String),

    /// Generic protocol-level error (serialization, unexpected message shape).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors that are surfaced as events rather than propagated to
    /// the caller of `connect` — steady-state errors per §7's propagation
    /// policy.
    pub fn is_steady_state(&self) -> bool {
        matches!(
            self,
            Error::MalformedMessage(_)
                | Error::UnsupportedFormat(_)
                | Error::DecodeError(_)
                | Error::BufferUnderrun
                | Error::SyncDivergent(_)
        )
    }
}
