// ABOUTME: Opus decoder wrapping libopus via the `opus` crate
// ABOUTME: Self-contained frame-by-frame decode at the stream's negotiated channel count

use super::Decoder;
use crate::error::Error;

/// Opus operates internally at a fixed 48 kHz; the negotiated `sample_rate`
/// in the stream format is informational only as far as this decoder is
/// concerned (libopus resamples on encode, not decode).
const OPUS_SAMPLE_RATE: u32 = 48_000;
/// 120ms at 48kHz is libopus's largest defined frame; buffer to fit it.
const MAX_FRAME_SAMPLES: usize = 5760;

pub struct OpusDecoder {
    inner: opus::Decoder,
    channels: u8,
    scratch: Vec<f32>,
}

impl OpusDecoder {
    pub fn new(channels: u8) -> Result<Self, Error> {
        let opus_channels = match channels {
            1 => opus::Channels::Mono,
            2 => opus::Channels::Stereo,
            other => {
                return Err(Error::UnsupportedFormat(format!(
                    "opus only supports 1 or 2 channels, got {other}"
                )))
            }
        };
        let inner = opus::Decoder::new(OPUS_SAMPLE_RATE, opus_channels)
            .map_err(|e| Error::DecodeError(e.to_string()))?;
        Ok(Self {
            inner,
            channels,
            scratch: vec![0f32; MAX_FRAME_SAMPLES * channels as usize],
        })
    }
}

impl Decoder for OpusDecoder {
    fn decode(&mut self, encoded: &[u8], out: &mut Vec<f32>) -> Result<usize, Error> {
        match self.inner.decode_float(encoded, &mut self.scratch, false) {
            Ok(frames) => {
                let n = frames * self.channels as usize;
                out.extend_from_slice(&self.scratch[..n]);
                Ok(n)
            }
            Err(_) => Ok(0),
        }
    }

    fn reset(&mut self) {
        let _ = self.inner.reset_state();
    }

    fn max_samples_per_frame(&self) -> usize {
        MAX_FRAME_SAMPLES * self.channels as usize
    }
}
