// ABOUTME: Dynamic resampler: source-rate to device-rate conversion plus continuous
// ABOUTME: playback-rate nudging in a single filter stage, fed pull-style from the timed buffer

use crate::audio::{Sample, TimedAudioBuffer};
use crate::error::Error;
use crate::sync::ClockSync;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::collections::VecDeque;

/// Rate nudging is clamped to this range; beyond it, the correction would be
/// audibly distorting.
pub const MIN_PLAYBACK_RATE: f64 = 0.96;
pub const MAX_PLAYBACK_RATE: f64 = 1.04;
/// Rate changes smaller than this are coalesced to avoid filter-state churn.
const RATE_CHANGE_COALESCE_THRESHOLD: f64 = 0.0001;
/// Upper bound on pull iterations per `render` call; guards against a
/// pathological ratio producing near-zero output per chunk.
const MAX_PULL_ITERATIONS: u32 = 64;

/// Sits between the timed buffer and the platform output callback. Pulled by
/// the output side for an arbitrary (platform-chosen) `count` samples per
/// call. `FastFixedIn` only accepts exactly `chunk_frames` input frames per
/// `process()` call, so source samples are pulled from the timed buffer in
/// fixed `chunk_frames` chunks and the resampled output is queued; `render`
/// drains that queue to fill whatever size the caller asked for.
pub struct DynamicResampler {
    inner: FastFixedIn<f32>,
    chunk_frames: usize,
    source_rate: u32,
    target_rate: u32,
    channels: usize,
    playback_rate: f64,
    underrun_count: u64,
    pull_buf: Vec<Sample>,
    planar_in: Vec<Vec<f32>>,
    output_queue: VecDeque<Sample>,
}

impl DynamicResampler {
    pub fn new(source_rate: u32, target_rate: u32, channels: u8) -> Result<Self, Error> {
        let channels = channels as usize;
        let ratio = f64::from(target_rate) / f64::from(source_rate);
        let chunk_frames = ((source_rate as usize) / 50).max(1); // ~20ms of source audio
        let inner = FastFixedIn::<f32>::new(
            ratio,
            MAX_PLAYBACK_RATE / MIN_PLAYBACK_RATE,
            PolynomialDegree::Linear,
            chunk_frames,
            channels,
        )
        .map_err(|e| Error::Output(format!("failed to build resampler: {e}")))?;
        Ok(Self {
            inner,
            chunk_frames,
            source_rate,
            target_rate,
            channels,
            playback_rate: 1.0,
            underrun_count: 0,
            pull_buf: Vec::new(),
            planar_in: vec![Vec::with_capacity(chunk_frames); channels],
            output_queue: VecDeque::new(),
        })
    }

    /// Set the continuous playback-rate nudge, clamped to `[0.96, 1.04]`.
    /// Changes smaller than the coalescing threshold are ignored. This only
    /// changes how many output frames each fixed-size input chunk produces;
    /// the input chunk size itself (`chunk_frames`) never changes.
    pub fn set_playback_rate(&mut self, rate: f64) {
        let clamped = rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
        if (clamped - self.playback_rate).abs() < RATE_CHANGE_COALESCE_THRESHOLD {
            return;
        }
        self.playback_rate = clamped;
        let ratio = f64::from(self.target_rate) / f64::from(self.source_rate) / clamped;
        // `set_resample_ratio` ramps smoothly rather than snapping, avoiding
        // an audible step in the output when the nudge changes.
        let _ = self.inner.set_resample_ratio(ratio, true);
    }

    pub fn underrun_count(&self) -> u64 {
        self.underrun_count
    }

    /// Pulls exactly one `chunk_frames`-sized slice of source samples from
    /// `buffer`, resamples it, and appends the result to `output_queue`.
    fn pull_and_resample(
        &mut self,
        now_client_us: i64,
        buffer: &TimedAudioBuffer,
        clock_sync: &ClockSync,
    ) {
        let needed_source_samples = self.chunk_frames * self.channels;
        self.pull_buf.clear();
        self.pull_buf.resize(needed_source_samples, 0.0);
        let written =
            buffer.read(&mut self.pull_buf, self.channels as u8, now_client_us, clock_sync);
        if written < needed_source_samples {
            self.underrun_count += 1;
        }

        for ch_buf in &mut self.planar_in {
            ch_buf.clear();
        }
        for frame_idx in 0..self.chunk_frames {
            for ch in 0..self.channels {
                self.planar_in[ch].push(self.pull_buf[frame_idx * self.channels + ch]);
            }
        }

        // Input is always exactly `chunk_frames`, so this cannot hit
        // `WrongNumberOfInputFrames`.
        let Ok(planar_out) = self.inner.process(&self.planar_in, None) else {
            return;
        };
        let produced_frames = planar_out.first().map_or(0, Vec::len);
        for frame_idx in 0..produced_frames {
            for ch in 0..self.channels {
                self.output_queue.push_back(planar_out[ch][frame_idx]);
            }
        }
    }

    /// Render exactly `out.len()` samples into `out`, pulling source samples
    /// from `buffer` via `clock_sync` in fixed-size chunks as needed. On
    /// underrun (the timed buffer produced fewer source samples than a chunk
    /// needs), the shortfall is silence and the underrun counter increments.
    pub fn render(
        &mut self,
        out: &mut [Sample],
        now_client_us: i64,
        buffer: &TimedAudioBuffer,
        clock_sync: &ClockSync,
    ) {
        let mut iterations = 0;
        while self.output_queue.len() < out.len() && iterations < MAX_PULL_ITERATIONS {
            self.pull_and_resample(now_client_us, buffer, clock_sync);
            iterations += 1;
        }

        for slot in out.iter_mut() {
            *slot = self.output_queue.pop_front().unwrap_or(0.0);
        }
    }
}
