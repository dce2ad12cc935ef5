// ABOUTME: Uncompressed PCM decoder: fixed-width integer samples to interleaved f32
// ABOUTME: Self-contained frame-by-frame, no persistent codec state beyond format

use super::Decoder;
use crate::error::Error;

/// Byte order of incoming PCM samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmEndian {
    Little,
    Big,
}

/// Decodes uncompressed PCM chunks at a fixed bit depth and channel count.
///
/// The wire protocol negotiates bit depth and channel count once per stream;
/// endianness isn't signaled explicitly; callers default to `Little` (the
/// common case for modern hosts) and only pass `Big` when told to by other
/// means.
pub struct PcmDecoder {
    bit_depth: u8,
    channels: u8,
    endian: PcmEndian,
}

impl PcmDecoder {
    pub fn new(bit_depth: u8, channels: u8, endian: PcmEndian) -> Result<Self, Error> {
        match bit_depth {
            16 | 24 | 32 => {}
            other => {
                return Err(Error::UnsupportedFormat(format!(
                    "unsupported PCM bit depth: {other}"
                )))
            }
        }
        Ok(Self { bit_depth, channels, endian })
    }

    fn bytes_per_sample(&self) -> usize {
        (self.bit_depth as usize) / 8
    }

    fn read_sample(&self, bytes: &[u8]) -> f32 {
        match (self.bit_depth, self.endian) {
            (16, PcmEndian::Little) => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
            (16, PcmEndian::Big) => i16::from_be_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
            (24, PcmEndian::Little) => {
                let v = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]) << 8 >> 8;
                v as f32 / 8_388_608.0
            }
            (24, PcmEndian::Big) => {
                let v = i32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]) << 8 >> 8;
                v as f32 / 8_388_608.0
            }
            (32, PcmEndian::Little) => {
                i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32
                    / 2_147_483_648.0
            }
            (32, PcmEndian::Big) => {
                i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32
                    / 2_147_483_648.0
            }
            _ => unreachable!("bit depth validated at construction"),
        }
    }
}

impl Decoder for PcmDecoder {
    fn decode(&mut self, encoded: &[u8], out: &mut Vec<f32>) -> Result<usize, Error> {
        let bytes_per_sample = self.bytes_per_sample();
        let frame_size = bytes_per_sample * self.channels as usize;
        if frame_size == 0 || encoded.len() % frame_size != 0 {
            // Malformed chunk: non-fatal, skip it.
            return Ok(0);
        }
        let start = out.len();
        out.reserve(encoded.len() / bytes_per_sample);
        for sample_bytes in encoded.chunks_exact(bytes_per_sample) {
            out.push(self.read_sample(sample_bytes));
        }
        Ok(out.len() - start)
    }

    fn reset(&mut self) {}

    fn max_samples_per_frame(&self) -> usize {
        // PCM has no inherent frame size cap; callers size buffers off chunk
        // length instead. A generous upper bound covers one second at a high
        // sample rate so shared scratch buffers don't need resizing often.
        192_000 * self.channels as usize
    }
}
