// ABOUTME: Decoder trait contract shared by PCM, Opus and FLAC (component E)
// ABOUTME: One decoder instance per stream, constructed from the negotiated format

mod flac;
mod opus_decoder;
mod pcm;

pub use flac::FlacDecoder;
pub use opus_decoder::OpusDecoder;
pub use pcm::{PcmDecoder, PcmEndian};

use crate::audio::AudioFormat;
use crate::error::Error;

/// Decodes one stream's compressed chunks into interleaved float32 samples.
///
/// A decode failure on a single chunk is non-fatal: implementations return
/// `Ok(0)` rather than propagating an error, and the pipeline simply skips
/// that chunk's output.
pub trait Decoder: Send {
    /// Decode one chunk, appending interleaved float32 samples to `out`.
    /// Returns the number of samples (not frames) written.
    fn decode(&mut self, encoded: &[u8], out: &mut Vec<f32>) -> Result<usize, Error>;

    /// Discard any internal state (e.g. after a seek or stream restart).
    fn reset(&mut self);

    /// Upper bound on samples a single `decode` call can produce, for
    /// caller-side buffer sizing.
    fn max_samples_per_frame(&self) -> usize;
}

/// Construct the decoder named by `format.codec`, or `UnsupportedFormat` if
/// the codec name didn't parse in the first place (caller is expected to
/// have already rejected that at negotiation time; this is the last line of
/// defense for a format slipping through).
pub fn build_decoder(format: &AudioFormat) -> Result<Box<dyn Decoder>, Error> {
    match format.codec {
        crate::audio::Codec::Opus => Ok(Box::new(OpusDecoder::new(format.channels)?)),
        crate::audio::Codec::Flac => Ok(Box::new(FlacDecoder::new(format)?)),
        crate::audio::Codec::Pcm => {
            let bit_depth = format.bit_depth.unwrap_or(16);
            Ok(Box::new(PcmDecoder::new(bit_depth, format.channels, PcmEndian::Little)?))
        }
    }
}
