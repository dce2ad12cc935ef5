// ABOUTME: Binary frame codec for audio, artwork, and visualizer payloads
// ABOUTME: type:u8 || timestamp:i64 big-endian || payload, dispatched by type byte

use crate::error::Error;
use std::sync::Arc;

/// Binary message type IDs per the wire protocol's type byte ranges.
pub mod binary_types {
    /// Player audio chunk, slot 0 (slots 0-3 occupy 4-7; this crate only
    /// advertises and decodes a single player stream, so only slot 0 is used).
    pub const PLAYER_AUDIO: u8 = 0x04;
    /// Artwork channels 0-3 occupy type bytes 8-11.
    pub const ARTWORK_CHANNEL_0: u8 = 0x08;
    pub const ARTWORK_CHANNEL_1: u8 = 0x09;
    pub const ARTWORK_CHANNEL_2: u8 = 0x0A;
    pub const ARTWORK_CHANNEL_3: u8 = 0x0B;
    /// Visualizer slots 0-7 occupy type bytes 16-23; only slot 0 is named.
    pub const VISUALIZER: u8 = 0x10;

    /// True if `type_id` falls in the artwork channel range (8-11).
    pub fn is_artwork(type_id: u8) -> bool {
        (ARTWORK_CHANNEL_0..=ARTWORK_CHANNEL_3).contains(&type_id)
    }

    /// Artwork channel number (0-3) for an artwork type byte, else `None`.
    pub fn artwork_channel(type_id: u8) -> Option<u8> {
        if is_artwork(type_id) {
            Some(type_id - ARTWORK_CHANNEL_0)
        } else {
            None
        }
    }
}

/// Minimum binary frame length: 1 type byte + 8 timestamp bytes.
const MIN_FRAME_LEN: usize = 9;

fn read_timestamp(frame: &[u8]) -> i64 {
    i64::from_be_bytes([
        frame[1], frame[2], frame[3], frame[4], frame[5], frame[6], frame[7], frame[8],
    ])
}

/// Audio chunk from server (binary frame, type 4: player audio).
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Server timestamp of the first sample in microseconds.
    pub timestamp: i64,
    /// Encoded audio bytes for this chunk.
    pub data: Arc<[u8]>,
}

impl AudioChunk {
    /// Parse a player-audio binary frame (type byte must be `PLAYER_AUDIO`).
    pub fn from_bytes(frame: &[u8]) -> Result<Self, Error> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(Error::MalformedMessage("audio chunk too short".to_string()));
        }
        if frame[0] != binary_types::PLAYER_AUDIO {
            return Err(Error::MalformedMessage(format!(
                "expected audio type {}, got {}",
                binary_types::PLAYER_AUDIO,
                frame[0]
            )));
        }
        Ok(Self {
            timestamp: read_timestamp(frame),
            data: Arc::from(&frame[MIN_FRAME_LEN..]),
        })
    }
}

/// Artwork chunk from server (binary frame, types 8-11: artwork channels 0-3).
#[derive(Debug, Clone)]
pub struct ArtworkChunk {
    /// Artwork channel, 0-3.
    pub channel: u8,
    /// Server timestamp in microseconds.
    pub timestamp: i64,
    /// Raw image bytes (JPEG/PNG/BMP); empty means "clear".
    pub data: Arc<[u8]>,
}

impl ArtworkChunk {
    /// Parse an artwork binary frame. An empty payload is a clear command.
    pub fn from_bytes(frame: &[u8]) -> Result<Self, Error> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(Error::MalformedMessage("artwork chunk too short".to_string()));
        }
        let channel = binary_types::artwork_channel(frame[0]).ok_or_else(|| {
            Error::MalformedMessage(format!("not an artwork type byte: {}", frame[0]))
        })?;
        Ok(Self {
            channel,
            timestamp: read_timestamp(frame),
            data: Arc::from(&frame[MIN_FRAME_LEN..]),
        })
    }

    /// True if this chunk clears the channel's artwork (empty payload).
    pub fn is_clear(&self) -> bool {
        self.data.is_empty()
    }
}

/// Visualizer chunk from server (binary frame, type 16: visualizer slot 0).
#[derive(Debug, Clone)]
pub struct VisualizerChunk {
    /// Server timestamp in microseconds.
    pub timestamp: i64,
    /// Application-defined visualization payload (e.g. FFT bins).
    pub data: Arc<[u8]>,
}

impl VisualizerChunk {
    /// Parse a visualizer binary frame (type byte must be `VISUALIZER`).
    pub fn from_bytes(frame: &[u8]) -> Result<Self, Error> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(Error::MalformedMessage("visualizer chunk too short".to_string()));
        }
        if frame[0] != binary_types::VISUALIZER {
            return Err(Error::MalformedMessage(format!(
                "expected visualizer type {}, got {}",
                binary_types::VISUALIZER,
                frame[0]
            )));
        }
        Ok(Self {
            timestamp: read_timestamp(frame),
            data: Arc::from(&frame[MIN_FRAME_LEN..]),
        })
    }
}

/// A parsed binary frame, dispatched by type byte.
#[derive(Debug, Clone)]
pub enum BinaryFrame {
    Audio(AudioChunk),
    Artwork(ArtworkChunk),
    Visualizer(VisualizerChunk),
    /// Application-specific or otherwise unrecognized type byte (notably the
    /// `>= 192` application-specific range). The timestamp is parsed per the
    /// universal frame layout; `data` is the uninterpreted payload after it.
    Unknown { type_id: u8, timestamp: i64, data: Vec<u8> },
}

impl BinaryFrame {
    /// Parse any binary frame, dispatching on its leading type byte. Every
    /// frame, known type or not, is subject to the wire format's 9-byte
    /// minimum (1 type byte + 8 timestamp bytes).
    pub fn from_bytes(frame: &[u8]) -> Result<Self, Error> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(Error::MalformedMessage("binary frame too short".to_string()));
        }
        let type_id = frame[0];
        match type_id {
            binary_types::PLAYER_AUDIO => Ok(BinaryFrame::Audio(AudioChunk::from_bytes(frame)?)),
            t if binary_types::is_artwork(t) => {
                Ok(BinaryFrame::Artwork(ArtworkChunk::from_bytes(frame)?))
            }
            binary_types::VISUALIZER => {
                Ok(BinaryFrame::Visualizer(VisualizerChunk::from_bytes(frame)?))
            }
            other => Ok(BinaryFrame::Unknown {
                type_id: other,
                timestamp: read_timestamp(frame),
                data: frame[MIN_FRAME_LEN..].to_vec(),
            }),
        }
    }
}
