// ABOUTME: Clock synchronization implementation
// ABOUTME: Fuses NTP-style four-timestamp exchanges with a 2-D Kalman filter over (offset, drift)

use crate::clock;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default process noise on the offset state, µs² per second.
const DEFAULT_Q_OFFSET: f64 = 100.0;
/// Default process noise on the drift state, (µs/s)² per second.
const DEFAULT_Q_DRIFT: f64 = 1.0;
/// Default base measurement noise, µs².
const DEFAULT_R0: f64 = 10_000.0;

/// Minimum number of measurements before convergence can be declared.
const MIN_MEASUREMENTS_FOR_CONVERGENCE: u32 = 5;
/// Offset standard deviation below which the filter is considered converged, µs.
const CONVERGENCE_STD_DEV_US: f64 = 1000.0;

/// RTT above which a measurement is discarded outright (network congestion).
const MAX_ACCEPTABLE_RTT_US: i64 = 100_000;

/// Lower bound variances are clamped to, to avoid numerical degeneracy.
const MIN_VARIANCE: f64 = 1e-6;

/// Clock synchronization quality, derived from the most recent RTT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncQuality {
    /// Good synchronization (RTT < 50ms)
    Good,
    /// Degraded synchronization (RTT 50-100ms)
    Degraded,
    /// Lost synchronization (RTT > 100ms or no sync)
    Lost,
}

/// Tunable parameters for the Kalman filter.
#[derive(Debug, Clone, Copy)]
pub struct KalmanTuning {
    pub q_offset: f64,
    pub q_drift: f64,
    pub r0: f64,
}

impl Default for KalmanTuning {
    fn default() -> Self {
        Self {
            q_offset: DEFAULT_Q_OFFSET,
            q_drift: DEFAULT_Q_DRIFT,
            r0: DEFAULT_R0,
        }
    }
}

/// Mutable filter state, held behind the single lock per §4.C's thread-safety note.
struct State {
    /// Estimated offset, server_time - client_time, in microseconds.
    offset: f64,
    /// Estimated drift, microseconds per second.
    drift: f64,
    /// Variance of the offset estimate.
    p_oo: f64,
    /// Covariance of offset and drift.
    p_od: f64,
    /// Variance of the drift estimate.
    p_dd: f64,

    /// Client-clock timestamp (µs) of the last applied measurement.
    last_update: Option<i64>,
    /// Number of measurements applied.
    measurement_count: u32,

    /// Last known RTT in microseconds (diagnostic, independent of the filter).
    rtt_micros: Option<i64>,
    /// Wall-clock `Instant` of the last measurement, for staleness detection.
    last_update_instant: Option<Instant>,

    /// Previous convergence state, to detect the false->true transition.
    was_converged: bool,
    /// Set once on the false->true convergence transition; cleared by `take_convergence_event`.
    convergence_event_pending: bool,

    /// Externally supplied static offset (microseconds), applied on top of
    /// the Kalman-estimated clock offset when mapping to a local instant.
    /// Covers per-player acoustic/processing-latency compensation (§1
    /// Non-goals: calibration beyond an externally supplied static offset is
    /// out of scope, but applying one is not); it is not part of the filter
    /// state and does not affect convergence.
    static_offset_us: i64,
}

impl State {
    fn new() -> Self {
        Self {
            offset: 0.0,
            drift: 0.0,
            p_oo: 1e12,
            p_od: 0.0,
            p_dd: 1e6,
            last_update: None,
            measurement_count: 0,
            rtt_micros: None,
            last_update_instant: None,
            was_converged: false,
            convergence_event_pending: false,
            static_offset_us: 0,
        }
    }

    fn is_converged(&self) -> bool {
        self.measurement_count >= MIN_MEASUREMENTS_FOR_CONVERGENCE
            && self.p_oo.max(0.0).sqrt() < CONVERGENCE_STD_DEV_US
    }
}

/// Clock synchronization state: a 2-D Kalman filter over `[offset, drift]`
/// fed by NTP-style four-timestamp exchanges.
///
/// All mutable state lives behind a single internal lock (§4.C): every
/// accessor and mutator takes `&self` and locks briefly. Reads are cheap
/// enough that finer-grained locking isn't warranted, so an `Arc<ClockSync>`
/// can be shared between the orchestrator (the sole writer, via `process`)
/// and the audio pipeline/buffer/resampler (readers, via the mapping and
/// quality accessors) without any outer synchronization.
pub struct ClockSync {
    tuning: KalmanTuning,
    state: Mutex<State>,
}

impl ClockSync {
    /// Create a new clock synchronization instance, reset to the initial state.
    pub fn new() -> Self {
        Self::with_tuning(KalmanTuning::default())
    }

    /// Create a new instance with explicit Kalman tuning parameters.
    pub fn with_tuning(tuning: KalmanTuning) -> Self {
        Self { tuning, state: Mutex::new(State::new()) }
    }

    /// Reset all filter state as though newly constructed, preserving tuning
    /// and the externally supplied static offset (a reconnect shouldn't
    /// silently drop calibration the host application already applied).
    pub fn reset(&self) {
        let mut s = self.state.lock().expect("clock sync mutex poisoned");
        let static_offset_us = s.static_offset_us;
        *s = State::new();
        s.static_offset_us = static_offset_us;
    }

    /// Set the externally supplied static offset (microseconds) applied on
    /// top of the estimated clock offset when computing local playback
    /// instants. Does not affect the filter or convergence.
    pub fn set_static_offset_us(&self, offset_us: i64) {
        self.state.lock().expect("clock sync mutex poisoned").static_offset_us = offset_us;
    }

    /// The currently applied externally supplied static offset, microseconds.
    pub fn static_offset_us(&self) -> i64 {
        self.state.lock().expect("clock sync mutex poisoned").static_offset_us
    }

    /// Update clock sync with a new NTP-style four-timestamp measurement.
    ///
    /// `t1` = client_transmitted, `t2` = server_received, `t3` =
    /// server_transmitted, `t4` = client_received, all in microseconds.
    ///
    /// Equivalent to `process()`; kept under the name the rest of the crate
    /// and its tests call it by.
    pub fn update(&self, t1: i64, t2: i64, t3: i64, t4: i64) {
        self.process(t1, t2, t3, t4)
    }

    /// Apply one NTP-style measurement to the filter: predict the state
    /// forward to `t4` via the random-walk process model, then correct it
    /// with the direct offset measurement, using an RTT-adaptive measurement
    /// noise.
    pub fn process(&self, t1: i64, t2: i64, t3: i64, t4: i64) {
        let measured_offset = ((t2 - t1) + (t3 - t4)) as f64 / 2.0;
        let rtt = (t4 - t1) - (t3 - t2);

        let mut s = self.state.lock().expect("clock sync mutex poisoned");
        s.rtt_micros = Some(rtt);

        if rtt > MAX_ACCEPTABLE_RTT_US {
            log::warn!("Discarding sync sample: high RTT {}µs", rtt);
            return;
        }

        if s.measurement_count == 0 {
            s.offset = measured_offset;
            s.last_update = Some(t4);
            s.measurement_count = 1;
            s.last_update_instant = Some(Instant::now());
            log::info!(
                "Clock sync established: t1={}, t2={}, t3={}, t4={}, rtt={}µs, offset={}µs",
                t1, t2, t3, t4, rtt, s.offset
            );
            return;
        }

        let last_update = s.last_update.expect("count > 0 implies last_update is set");
        let dt = (t4 - last_update) as f64 / 1_000_000.0;
        if dt <= 0.0 {
            log::warn!("Discarding out-of-order sync sample: dt={}", dt);
            return;
        }

        // Predict: offset integrates drift over dt, F = [[1, dt], [0, 1]].
        let offset_pred = s.offset + s.drift * dt;
        let drift_pred = s.drift;
        let p_oo_pred = s.p_oo + 2.0 * dt * s.p_od + dt * dt * s.p_dd + self.tuning.q_offset * dt;
        let p_od_pred = s.p_od + dt * s.p_dd;
        let p_dd_pred = s.p_dd + self.tuning.q_drift * dt;

        // Update: adaptive measurement noise, larger RTT means less trust.
        let r = self.tuning.r0 + (rtt as f64 * rtt as f64) / 4.0;
        let innovation = measured_offset - offset_pred;
        let s_cov = p_oo_pred + r;
        let k_offset = p_oo_pred / s_cov;
        let k_drift = p_od_pred / s_cov;

        s.offset = offset_pred + k_offset * innovation;
        s.drift = drift_pred + k_drift * innovation;
        s.p_oo = (p_oo_pred - k_offset * p_oo_pred).max(MIN_VARIANCE);
        s.p_od = p_od_pred - k_offset * p_od_pred;
        s.p_dd = (p_dd_pred - k_drift * p_od_pred).max(MIN_VARIANCE);

        s.last_update = Some(t4);
        s.measurement_count += 1;
        s.last_update_instant = Some(Instant::now());

        let now_converged = s.is_converged();
        if now_converged && !s.was_converged {
            s.convergence_event_pending = true;
        }
        s.was_converged = now_converged;
    }

    /// Estimated offset in microseconds: `server_time ≈ client_time + offset`.
    pub fn offset_micros(&self) -> f64 {
        self.state.lock().expect("clock sync mutex poisoned").offset
    }

    /// Estimated drift in microseconds per second.
    pub fn drift_micros_per_sec(&self) -> f64 {
        self.state.lock().expect("clock sync mutex poisoned").drift
    }

    /// Standard deviation of the offset estimate, in microseconds.
    pub fn offset_std_dev_micros(&self) -> f64 {
        self.state.lock().expect("clock sync mutex poisoned").p_oo.max(0.0).sqrt()
    }

    /// Number of measurements applied so far.
    pub fn measurement_count(&self) -> u32 {
        self.state.lock().expect("clock sync mutex poisoned").measurement_count
    }

    /// True once `measurement_count >= 5` and the offset std-dev is below 1ms.
    pub fn is_converged(&self) -> bool {
        self.state.lock().expect("clock sync mutex poisoned").is_converged()
    }

    /// Returns `true` exactly once, on the measurement that first brought the
    /// filter from not-converged to converged; `false` on every other call.
    pub fn take_convergence_event(&self) -> bool {
        std::mem::take(&mut self.state.lock().expect("clock sync mutex poisoned").convergence_event_pending)
    }

    /// Map a client-clock timestamp (µs) to the corresponding server-clock timestamp.
    pub fn client_to_server(&self, client_us: i64) -> i64 {
        let s = self.state.lock().expect("clock sync mutex poisoned");
        let last_update = s.last_update.unwrap_or(client_us);
        let extrapolated_offset = s.offset + s.drift * (client_us - last_update) as f64 / 1_000_000.0;
        client_us + extrapolated_offset.round() as i64
    }

    /// Map a server-clock timestamp (µs) to the corresponding client-clock
    /// timestamp. Documented as approximate: unlike `client_to_server` this
    /// does not extrapolate drift, since doing so would require already
    /// knowing the client time being solved for.
    pub fn server_to_client(&self, server_us: i64) -> i64 {
        let offset = self.state.lock().expect("clock sync mutex poisoned").offset;
        server_us - offset.round() as i64
    }

    /// Map a server-clock timestamp to the local `Instant` at which that
    /// sample should be rendered, via the process-wide monotonic clock.
    pub fn server_to_local_instant(&self, server_micros: i64) -> Option<Instant> {
        let static_offset_us = {
            let s = self.state.lock().expect("clock sync mutex poisoned");
            if s.measurement_count == 0 {
                return None;
            }
            s.static_offset_us
        };
        let client_us = self.server_to_client(server_micros) + static_offset_us;
        let now_us = clock::now_us();
        let now_instant = Instant::now();
        let delta_us = client_us - now_us;
        if delta_us >= 0 {
            Some(now_instant + Duration::from_micros(delta_us as u64))
        } else {
            now_instant.checked_sub(Duration::from_micros((-delta_us) as u64))
        }
    }

    /// Get current RTT in microseconds, from the most recent measurement
    /// (including ones discarded by the filter for being out of order).
    pub fn rtt_micros(&self) -> Option<i64> {
        self.state.lock().expect("clock sync mutex poisoned").rtt_micros
    }

    /// Get sync quality based on the most recent RTT.
    pub fn quality(&self) -> SyncQuality {
        match self.rtt_micros() {
            Some(rtt) if rtt < 50_000 => SyncQuality::Good,
            Some(rtt) if rtt < 100_000 => SyncQuality::Degraded,
            _ => SyncQuality::Lost,
        }
    }

    /// Check if sync is stale (no measurement applied in the last 5 seconds).
    pub fn is_stale(&self) -> bool {
        match self.state.lock().expect("clock sync mutex poisoned").last_update_instant {
            Some(last) => last.elapsed() > Duration::from_secs(5),
            None => true,
        }
    }
}

impl Default for ClockSync {
    fn default() -> Self {
        Self::new()
    }
}
