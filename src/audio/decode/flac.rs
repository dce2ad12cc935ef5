// ABOUTME: FLAC decoder: synthesizes a stream header once, then decodes each
// ABOUTME: frame against a fresh in-memory probe since the wire protocol sends bare frames

use super::Decoder;
use crate::error::Error;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// The stream sends compressed FLAC frames without a container; this decoder
/// was built from a negotiated format that carries the STREAMINFO metadata
/// block out of band (`AudioFormat::codec_header`). Each incoming frame is
/// decoded by prepending that header to form a minimal, one-track FLAC
/// stream and re-probing it from scratch — there's no persistent decoder
/// state carried between calls, which keeps dropped or reordered frames
/// harmless at the cost of per-frame probe overhead.
///
/// Frames are assumed to fit within a single FLAC block (server-negotiated
/// block size); behavior for a frame spanning multiple blocks is undefined.
pub struct FlacDecoder {
    header: Vec<u8>,
    channels: u8,
}

const FLAC_MARKER: &[u8; 4] = b"fLaC";

impl FlacDecoder {
    pub fn new(format: &crate::audio::AudioFormat) -> Result<Self, Error> {
        let header = match &format.codec_header {
            Some(h) if !h.is_empty() => synthesize_container(h)?,
            _ => {
                return Err(Error::UnsupportedFormat(
                    "flac stream requires a codec_header (STREAMINFO block)".to_string(),
                ))
            }
        };
        Ok(Self { header, channels: format.channels })
    }

    fn decode_frame(&self, frame: &[u8]) -> Result<Vec<f32>, String> {
        let mut buf = Vec::with_capacity(self.header.len() + frame.len());
        buf.extend_from_slice(&self.header);
        buf.extend_from_slice(frame);

        let source = ReadOnlySource::new(Cursor::new(buf));
        let mss = MediaSourceStream::new(Box::new(source), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        hint.with_extension("flac");

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| format!("flac probe failed: {e}"))?;
        let mut format_reader = probed.format;

        let track =
            format_reader.default_track().ok_or_else(|| "no default track".to_string())?;
        let codec_params = track.codec_params.clone();
        let track_id = track.id;

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| format!("flac decoder init failed: {e}"))?;

        let mut out = Vec::new();
        while let Ok(packet) = format_reader.next_packet() {
            if packet.track_id() != track_id {
                continue;
            }
            let audio_buf =
                decoder.decode(&packet).map_err(|e| format!("flac decode failed: {e}"))?;
            let spec = *audio_buf.spec();
            let duration = audio_buf.capacity() as u64;
            let mut sample_buf = SampleBuffer::<f32>::new(duration, spec);
            sample_buf.copy_interleaved_ref(audio_buf);
            out.extend_from_slice(sample_buf.samples());
        }
        Ok(out)
    }
}

impl Decoder for FlacDecoder {
    fn decode(&mut self, encoded: &[u8], out: &mut Vec<f32>) -> Result<usize, Error> {
        match self.decode_frame(encoded) {
            Ok(samples) => {
                let n = samples.len();
                out.extend(samples);
                Ok(n)
            }
            Err(_) => Ok(0),
        }
    }

    fn reset(&mut self) {}

    fn max_samples_per_frame(&self) -> usize {
        // One FLAC block per frame; 65535 is the format's max block size.
        65_535 * self.channels as usize
    }
}

/// Build a minimal one-block FLAC stream: the `fLaC` marker, a single
/// STREAMINFO metadata block (last-metadata-block flag set), and nothing
/// else. `streaminfo` is the raw 34-byte STREAMINFO payload as advertised
/// out of band in the negotiated format.
fn synthesize_container(streaminfo: &[u8]) -> Result<Vec<u8>, Error> {
    if streaminfo.len() != 34 {
        return Err(Error::UnsupportedFormat(format!(
            "expected a 34-byte STREAMINFO block, got {} bytes",
            streaminfo.len()
        )));
    }
    let mut header = Vec::with_capacity(4 + 4 + streaminfo.len());
    header.extend_from_slice(FLAC_MARKER);
    // Metadata block header: last-block flag (bit 7) | block type 0 (STREAMINFO),
    // followed by a 24-bit big-endian length.
    header.push(0x80);
    let len = streaminfo.len() as u32;
    header.extend_from_slice(&len.to_be_bytes()[1..]);
    header.extend_from_slice(streaminfo);
    Ok(header)
}
