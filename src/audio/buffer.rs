// ABOUTME: Timed audio buffer: single-producer/single-consumer run queue keyed by
// ABOUTME: server playback timestamp, read against the clock synchronizer's mapping

use crate::audio::Sample;
use crate::sync::ClockSync;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Tolerance around the run's intended play time within which samples are
/// copied directly rather than silence-filled or dropped.
const TIMING_TOLERANCE_MICROS: i64 = 5_000;
/// Hard re-anchor threshold: |sync_error| beyond this requests a clear.
const REANCHOR_THRESHOLD_MICROS: f64 = 200_000.0;
/// EMA smoothing factor for `sync_error_ms`.
const SYNC_ERROR_EMA_ALPHA: f64 = 0.1;

struct Run {
    /// Server timestamp of `samples[0]`, in microseconds.
    timestamp: i64,
    sample_rate: u32,
    channels: u8,
    samples: VecDeque<Sample>,
}

/// Accumulated state behind the single mutex. Runs are coarse-grained
/// (the protocol's minimum audio chunk is tens of milliseconds), so a short
/// critical section per `read`/`write` call is cheap relative to chunk size.
struct Inner {
    runs: VecDeque<Run>,
    buffered_frames: u64,
    sync_error_ms: f64,
    coarse_corrections: u64,
    reanchor_required: bool,
    /// Timestamp of the most recently accepted write, for ordering checks.
    last_write_timestamp: Option<i64>,
    /// Running totals for the conservation invariant (§8 property 7):
    /// samples_written == samples_read + buffered + dropped_for_sync.
    total_samples_written: u64,
    total_samples_read: u64,
    total_samples_dropped: u64,
}

/// Buffered duration, sync error and correction counters (§4.F `stats()`).
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferStats {
    pub buffered_duration_micros: u64,
    pub sync_error_ms: f64,
    pub coarse_corrections: u64,
    pub total_samples_written: u64,
    pub total_samples_read: u64,
    pub total_samples_dropped: u64,
}

pub struct TimedAudioBuffer {
    inner: Mutex<Inner>,
    pre_roll_micros: u64,
}

impl TimedAudioBuffer {
    pub fn new(pre_roll_micros: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                runs: VecDeque::new(),
                buffered_frames: 0,
                sync_error_ms: 0.0,
                coarse_corrections: 0,
                reanchor_required: false,
                last_write_timestamp: None,
                total_samples_written: 0,
                total_samples_read: 0,
                total_samples_dropped: 0,
            }),
            pre_roll_micros,
        }
    }

    /// Append a run of interleaved samples starting at `first_sample_server_timestamp_us`.
    ///
    /// Runs must arrive in strictly non-decreasing timestamp order (§3
    /// buffer invariant a, §8 property 6): a run whose timestamp is earlier
    /// than the last accepted write is rejected without mutating the
    /// buffer, and this returns `false`.
    pub fn write(
        &self,
        samples: &[Sample],
        sample_rate: u32,
        channels: u8,
        first_sample_server_timestamp_us: i64,
    ) -> bool {
        if samples.is_empty() || channels == 0 {
            return true;
        }
        let mut inner = self.inner.lock().expect("buffer mutex poisoned");
        if let Some(last) = inner.last_write_timestamp {
            if first_sample_server_timestamp_us < last {
                return false;
            }
        }
        inner.last_write_timestamp = Some(first_sample_server_timestamp_us);
        let frames = (samples.len() / channels as usize) as u64;
        inner.buffered_frames += frames;
        inner.total_samples_written += frames * channels as u64;
        inner.runs.push_back(Run {
            timestamp: first_sample_server_timestamp_us,
            sample_rate,
            channels,
            samples: samples.iter().copied().collect(),
        });
        true
    }

    /// True once buffered duration reaches the configured pre-roll threshold.
    pub fn is_ready_for_playback(&self) -> bool {
        let inner = self.inner.lock().expect("buffer mutex poisoned");
        buffered_duration_micros(&inner) >= self.pre_roll_micros
    }

    /// True if the buffer has drifted far enough that the pipeline should
    /// clear and re-buffer rather than keep nudging playback rate.
    pub fn reanchor_required(&self) -> bool {
        self.inner.lock().expect("buffer mutex poisoned").reanchor_required
    }

    /// Read `n` interleaved samples (across `channels` channels) intended for
    /// rendering starting at client time `now_client_us`. `clock_sync` maps
    /// the run's server timestamp to client time. Returns the number of
    /// samples written; any shortfall in `out` is left as whatever it held
    /// (caller pre-fills with silence).
    pub fn read(
        &self,
        out: &mut [Sample],
        channels: u8,
        now_client_us: i64,
        clock_sync: &ClockSync,
    ) -> usize {
        let mut inner = self.inner.lock().expect("buffer mutex poisoned");
        let mut written = 0usize;

        while written < out.len() {
            let Some(run) = inner.runs.front_mut() else {
                break;
            };
            if run.samples.is_empty() {
                inner.runs.pop_front();
                continue;
            }

            let run_client_us = clock_sync.server_to_client(run.timestamp);
            let error_us = (now_client_us - run_client_us) as f64;
            update_sync_error(&mut inner, error_us);

            if error_us.abs() <= TIMING_TOLERANCE_MICROS as f64 {
                let frames_remaining = (out.len() - written) / channels as usize;
                let available_frames = run.samples.len() / run.channels as usize;
                let take_frames = frames_remaining.min(available_frames).max(1);
                let take_samples = take_frames * run.channels as usize;
                for _ in 0..take_samples {
                    if let Some(s) = run.samples.pop_front() {
                        if written < out.len() {
                            out[written] = s;
                            written += 1;
                        }
                    }
                }
                let consumed_us =
                    (take_frames as i64 * 1_000_000) / run.sample_rate.max(1) as i64;
                run.timestamp += consumed_us;
                inner.total_samples_read += take_samples as u64;
                if run.samples.is_empty() {
                    inner.runs.pop_front();
                }
            } else if error_us < 0.0 {
                // Run is in the future: output silence for the gap and stop,
                // the caller's buffer was pre-filled with silence.
                break;
            } else {
                // Run is in the past: drop samples until caught up.
                inner.coarse_corrections += 1;
                let frame_len = run.channels as usize;
                let mut dropped = 0u64;
                for _ in 0..frame_len {
                    if run.samples.pop_front().is_some() {
                        dropped += 1;
                    }
                }
                inner.total_samples_dropped += dropped;
                let dropped_us = 1_000_000 / run.sample_rate.max(1) as i64;
                run.timestamp += dropped_us;
                if run.samples.is_empty() {
                    inner.runs.pop_front();
                }
            }
        }

        inner.buffered_frames = inner
            .buffered_frames
            .saturating_sub((written / channels.max(1) as usize) as u64);
        inner.reanchor_required = inner.sync_error_ms.abs() >= REANCHOR_THRESHOLD_MICROS / 1000.0;

        written
    }

    /// Current smoothed sync error in milliseconds (positive = playing late).
    pub fn sync_error_ms(&self) -> f64 {
        self.inner.lock().expect("buffer mutex poisoned").sync_error_ms
    }

    /// Drop all buffered runs and reset anchoring/error state. Also resets
    /// the write-ordering anchor (`last_write_timestamp`) since a clear is
    /// expected to precede a fresh buffering phase against a new server
    /// timestamp range (e.g. after a `stream/clear` or a re-anchor). The
    /// cumulative `total_samples_*` counters are left untouched: they track
    /// the conservation invariant (§8 property 7) across the buffer's whole
    /// lifetime, not just the current buffering run.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("buffer mutex poisoned");
        inner.runs.clear();
        inner.buffered_frames = 0;
        inner.sync_error_ms = 0.0;
        inner.reanchor_required = false;
        inner.last_write_timestamp = None;
    }

    pub fn stats(&self) -> BufferStats {
        let inner = self.inner.lock().expect("buffer mutex poisoned");
        BufferStats {
            buffered_duration_micros: buffered_duration_micros(&inner),
            sync_error_ms: inner.sync_error_ms,
            coarse_corrections: inner.coarse_corrections,
            total_samples_written: inner.total_samples_written,
            total_samples_read: inner.total_samples_read,
            total_samples_dropped: inner.total_samples_dropped,
        }
    }
}

fn buffered_duration_micros(inner: &Inner) -> u64 {
    inner
        .runs
        .iter()
        .map(|run| {
            let frames = (run.samples.len() / run.channels.max(1) as usize) as u64;
            frames * 1_000_000 / run.sample_rate.max(1) as u64
        })
        .sum()
}

fn update_sync_error(inner: &mut Inner, error_us: f64) {
    let error_ms = error_us / 1000.0;
    inner.sync_error_ms =
        SYNC_ERROR_EMA_ALPHA * error_ms + (1.0 - SYNC_ERROR_EMA_ALPHA) * inner.sync_error_ms;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_is_not_ready() {
        let buf = TimedAudioBuffer::new(100_000);
        assert!(!buf.is_ready_for_playback());
    }

    #[test]
    fn write_then_stats_reports_buffered_duration() {
        let buf = TimedAudioBuffer::new(10_000);
        let samples = vec![0.0f32; 480 * 2]; // 10ms at 48kHz stereo
        buf.write(&samples, 48_000, 2, 0);
        let stats = buf.stats();
        assert!(stats.buffered_duration_micros >= 9_000);
        assert!(buf.is_ready_for_playback());
    }

    #[test]
    fn clear_resets_state() {
        let buf = TimedAudioBuffer::new(10_000);
        buf.write(&[0.0f32; 100], 48_000, 2, 0);
        buf.clear();
        assert_eq!(buf.stats().buffered_duration_micros, 0);
        assert!(!buf.is_ready_for_playback());
    }

    #[test]
    fn read_in_tolerance_copies_samples_directly() {
        let buf = TimedAudioBuffer::new(0);
        let sync = ClockSync::new();
        // offset/drift both zero: server_to_client is identity-ish via now_us anchor,
        // so write a run timestamped "now" and read immediately.
        let now = crate::clock::now_us();
        buf.write(&[1.0, 2.0, 3.0, 4.0], 48_000, 2, now);
        let mut out = vec![0.0f32; 4];
        let written = buf.read(&mut out, 2, now, &sync);
        assert_eq!(written, 4);
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn write_rejects_out_of_order_timestamp() {
        let buf = TimedAudioBuffer::new(0);
        assert!(buf.write(&[0.0f32; 4], 48_000, 2, 10_000));
        let stats_before = buf.stats();
        assert!(!buf.write(&[1.0f32; 4], 48_000, 2, 5_000));
        let stats_after = buf.stats();
        assert_eq!(
            stats_before.total_samples_written,
            stats_after.total_samples_written
        );
        // A later-or-equal timestamp is still accepted.
        assert!(buf.write(&[0.0f32; 4], 48_000, 2, 10_000));
    }

    #[test]
    fn conservation_invariant_holds_across_read_and_drop() {
        let buf = TimedAudioBuffer::new(0);
        let sync = ClockSync::new();
        let now = crate::clock::now_us();

        // Write a run at `now`, then read far enough past it that it falls
        // outside the tolerance window and is dropped rather than copied.
        buf.write(&[1.0, 2.0, 3.0, 4.0], 48_000, 2, now);

        let mut out = vec![0.0f32; 8];
        buf.read(&mut out, 2, now + 1_000_000, &sync);

        let stats = buf.stats();
        assert!(stats.total_samples_dropped > 0);
        let still_buffered = buf
            .inner
            .lock()
            .expect("buffer mutex poisoned")
            .runs
            .iter()
            .map(|r| r.samples.len() as u64)
            .sum::<u64>();
        assert_eq!(
            stats.total_samples_written,
            stats.total_samples_read + stats.total_samples_dropped + still_buffered
        );
    }
}
