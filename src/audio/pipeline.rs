// ABOUTME: Audio pipeline state machine (component H): wires decode, timed buffer,
// ABOUTME: resampler and output together; also the real-time SampleSource the output pulls from

use crate::audio::decode::build_decoder;
use crate::audio::output::SampleSource;
use crate::audio::{AudioFormat, DynamicResampler, Sample, TimedAudioBuffer};
use crate::error::Error;
use crate::sync::ClockSync;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Pipeline lifecycle state (§4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Starting,
    Buffering,
    Playing,
    Stopping,
    Error,
}

/// Soft deadline fallback: if the clock synchronizer hasn't converged by the
/// time the buffer is ready, start playback anyway and log elevated
/// uncertainty. `AudioPipeline::new` is usually given the configured value
/// (`ClientConfig::convergence_wait`); this is only the default for call
/// sites that don't care.
const DEFAULT_CONVERGENCE_WAIT: Duration = Duration::from_secs(3);

/// Proportional gain mapping smoothed sync error (ms) to a playback-rate
/// nudge. Chosen so the hard re-anchor threshold (200ms, §4.F) lines up with
/// the resampler's own clamp (§4.G, ±4%): `200 * RATE_NUDGE_GAIN == 0.04`.
/// Positive error (playing late) speeds playback up to catch up; negative
/// error (playing early) slows it down.
const RATE_NUDGE_GAIN: f64 = 0.0002;

/// Volume/mute applied in the real-time sample-source path, shared with the
/// pipeline's control side via atomics so the audio callback never blocks.
struct VolumeControl {
    /// Volume scalar stored as a fixed-point percentage (0..=100) to stay
    /// lock-free on the hot path.
    volume_percent: AtomicU32,
    muted: AtomicBool,
}

impl Default for VolumeControl {
    fn default() -> Self {
        Self { volume_percent: AtomicU32::new(100), muted: AtomicBool::new(false) }
    }
}

/// Owns the decode/buffer/resample chain for one stream and exposes it to
/// the output adapter as a [`SampleSource`].
pub struct AudioPipeline {
    state: Mutex<PipelineState>,
    format: Mutex<Option<AudioFormat>>,
    buffer: Arc<TimedAudioBuffer>,
    decoder: Mutex<Option<Box<dyn crate::audio::decode::Decoder>>>,
    clock_sync: Arc<ClockSync>,
    volume: Arc<VolumeControl>,
    buffering_since: Mutex<Option<Instant>>,
    preroll_micros: u64,
    device_sample_rate: u32,
    convergence_wait: Duration,
}

impl AudioPipeline {
    pub fn new(clock_sync: Arc<ClockSync>, preroll_micros: u64, device_sample_rate: u32) -> Self {
        Self::with_convergence_wait(clock_sync, preroll_micros, device_sample_rate, DEFAULT_CONVERGENCE_WAIT)
    }

    pub fn with_convergence_wait(
        clock_sync: Arc<ClockSync>,
        preroll_micros: u64,
        device_sample_rate: u32,
        convergence_wait: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(PipelineState::Idle),
            format: Mutex::new(None),
            buffer: Arc::new(TimedAudioBuffer::new(preroll_micros)),
            decoder: Mutex::new(None),
            clock_sync,
            volume: Arc::new(VolumeControl::default()),
            buffering_since: Mutex::new(None),
            preroll_micros,
            device_sample_rate,
            convergence_wait,
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().expect("pipeline state mutex poisoned")
    }

    /// `start(format, target_timestamp)`: build the decoder and go to
    /// Buffering. `target_timestamp` seeds the buffer's expected first
    /// sample time so pre-roll accounting starts from the right place.
    pub fn start(&self, format: AudioFormat) -> Result<(), Error> {
        let decoder = match build_decoder(&format) {
            Ok(d) => d,
            Err(e) => {
                *self.state.lock().expect("pipeline state mutex poisoned") = PipelineState::Error;
                return Err(e);
            }
        };
        *self.decoder.lock().expect("decoder mutex poisoned") = Some(decoder);
        *self.format.lock().expect("format mutex poisoned") = Some(format);
        self.buffer.clear();
        *self.buffering_since.lock().expect("buffering_since mutex poisoned") = Some(Instant::now());
        *self.state.lock().expect("pipeline state mutex poisoned") = PipelineState::Buffering;
        Ok(())
    }

    /// Decode and append one incoming chunk; transitions Buffering->Playing
    /// once the buffer is ready and either the clock synchronizer has
    /// converged or the soft convergence-wait deadline has passed.
    pub fn push_chunk(&self, encoded: &[u8], server_timestamp_us: i64) {
        let format = self.format.lock().expect("format mutex poisoned").clone();
        let Some(format) = format else { return };

        let mut decoder_guard = self.decoder.lock().expect("decoder mutex poisoned");
        let Some(decoder) = decoder_guard.as_mut() else { return };
        let mut samples = Vec::new();
        if decoder.decode(encoded, &mut samples).is_err() || samples.is_empty() {
            return;
        }
        drop(decoder_guard);

        if !self.buffer.write(&samples, format.sample_rate, format.channels, server_timestamp_us) {
            log::warn!(
                "dropping out-of-order audio chunk at server timestamp {}",
                server_timestamp_us
            );
            return;
        }

        let mut needs_reanchor = false;
        {
            let mut state = self.state.lock().expect("pipeline state mutex poisoned");
            if *state == PipelineState::Buffering && self.buffer.is_ready_for_playback() {
                let converged = self.clock_sync.is_converged();
                let waited_long_enough = self
                    .buffering_since
                    .lock()
                    .expect("buffering_since mutex poisoned")
                    .map(|since| since.elapsed() >= self.convergence_wait)
                    .unwrap_or(false);
                if converged {
                    *state = PipelineState::Playing;
                } else if waited_long_enough {
                    log::warn!("starting playback without clock-sync convergence");
                    *state = PipelineState::Playing;
                }
            } else if *state == PipelineState::Playing && self.buffer.reanchor_required() {
                needs_reanchor = true;
            }
        }

        if needs_reanchor {
            log::warn!("sync error exceeded re-anchor threshold, clearing and re-buffering");
            self.clear();
        }
    }

    /// `clear(new_target_timestamp?)`: drop buffered audio and reset the
    /// decoder, returning to Buffering if currently Playing.
    pub fn clear(&self) {
        self.buffer.clear();
        if let Some(decoder) = self.decoder.lock().expect("decoder mutex poisoned").as_mut() {
            decoder.reset();
        }
        *self.buffering_since.lock().expect("buffering_since mutex poisoned") = Some(Instant::now());
        let mut state = self.state.lock().expect("pipeline state mutex poisoned");
        if *state == PipelineState::Playing {
            *state = PipelineState::Buffering;
        }
    }

    /// `stop()`: drain and tear down, returning to Idle.
    pub fn stop(&self) {
        *self.state.lock().expect("pipeline state mutex poisoned") = PipelineState::Stopping;
        self.buffer.clear();
        *self.decoder.lock().expect("decoder mutex poisoned") = None;
        *self.format.lock().expect("format mutex poisoned") = None;
        *self.state.lock().expect("pipeline state mutex poisoned") = PipelineState::Idle;
    }

    pub fn set_volume(&self, percent: u8) {
        self.volume.volume_percent.store(percent.min(100) as u32, Ordering::Relaxed);
    }

    pub fn set_muted(&self, muted: bool) {
        self.volume.muted.store(muted, Ordering::Relaxed);
    }

    /// Build the [`SampleSource`] the output adapter should install. Must be
    /// called after `start` so the resampler can be sized for the
    /// negotiated format; returns `None` before a format is known.
    pub fn sample_source(&self) -> Option<Box<dyn SampleSource>> {
        let format = self.format.lock().expect("format mutex poisoned").clone()?;
        let resampler =
            DynamicResampler::new(format.sample_rate, self.device_sample_rate, format.channels)
                .ok()?;
        Some(Box::new(PipelineSampleSource {
            buffer: Arc::clone(&self.buffer),
            clock_sync: Arc::clone(&self.clock_sync),
            resampler,
            volume: Arc::clone(&self.volume),
        }))
    }

    pub fn buffer(&self) -> &TimedAudioBuffer {
        &self.buffer
    }

    /// The output device's rate, which the resampler always targets
    /// regardless of the stream's negotiated source format.
    pub fn device_sample_rate(&self) -> u32 {
        self.device_sample_rate
    }

    /// The negotiated format for the current stream, if `start` has been called.
    pub fn format(&self) -> Option<AudioFormat> {
        self.format.lock().expect("format mutex poisoned").clone()
    }
}

/// The real-time side of the pipeline: pulled by the output adapter's
/// audio callback. Volume and mute are applied here as a scalar
/// multiplication and a zero-fill.
struct PipelineSampleSource {
    buffer: Arc<TimedAudioBuffer>,
    clock_sync: Arc<ClockSync>,
    resampler: DynamicResampler,
    volume: Arc<VolumeControl>,
}

impl SampleSource for PipelineSampleSource {
    fn read(&mut self, out: &mut [Sample]) -> usize {
        if self.volume.muted.load(Ordering::Relaxed) {
            out.fill(0.0);
            return out.len();
        }
        let nudge = 1.0 + self.buffer.sync_error_ms() * RATE_NUDGE_GAIN;
        self.resampler.set_playback_rate(nudge);

        let now_client_us = crate::clock::now_us();
        self.resampler.render(out, now_client_us, &self.buffer, &self.clock_sync);

        let volume_scalar = self.volume.volume_percent.load(Ordering::Relaxed) as f32 / 100.0;
        if volume_scalar != 1.0 {
            for sample in out.iter_mut() {
                *sample *= volume_scalar;
            }
        }
        out.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Codec;

    fn format(codec: Codec) -> AudioFormat {
        AudioFormat { codec, sample_rate: 48_000, channels: 2, bit_depth: Some(16), bitrate: None, codec_header: None }
    }

    #[test]
    fn start_with_valid_format_transitions_to_buffering() {
        let pipeline = AudioPipeline::new(Arc::new(ClockSync::new()), 100_000, 48_000);
        assert_eq!(pipeline.state(), PipelineState::Idle);
        pipeline.start(format(Codec::Pcm)).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Buffering);
    }

    #[test]
    fn start_with_unbuildable_decoder_goes_to_error_state() {
        // FLAC with no codec_header fails decoder construction (§4.E/§7 UnsupportedFormat).
        let pipeline = AudioPipeline::new(Arc::new(ClockSync::new()), 100_000, 48_000);
        let err = pipeline.start(format(Codec::Flac)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        assert_eq!(pipeline.state(), PipelineState::Error);
    }

    #[test]
    fn stop_returns_to_idle_from_any_state() {
        let pipeline = AudioPipeline::new(Arc::new(ClockSync::new()), 100_000, 48_000);
        pipeline.start(format(Codec::Pcm)).unwrap();
        pipeline.stop();
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[test]
    fn clear_while_buffering_stays_in_buffering() {
        let pipeline = AudioPipeline::new(Arc::new(ClockSync::new()), 100_000, 48_000);
        pipeline.start(format(Codec::Pcm)).unwrap();
        pipeline.clear();
        assert_eq!(pipeline.state(), PipelineState::Buffering);
    }
}
