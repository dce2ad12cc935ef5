// ABOUTME: Client configuration options (§6) with spec-documented defaults
// ABOUTME: Plain struct, no external config-file parsing — callers build it in code

use std::time::Duration;

/// Codec preference order advertised in `client/hello`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredCodec {
    Opus,
    Flac,
}

/// Recognized client configuration options (§6 table).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// -1 = unlimited; else upper bound on reconnect attempts.
    pub max_reconnect_attempts: i32,
    pub reconnect_initial_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub reconnect_backoff_multiplier: f64,
    pub connect_timeout_ms: u64,
    /// Transport ping interval; 0 disables.
    pub keepalive_interval_ms: u64,
    pub receive_buffer_size: usize,
    pub auto_reconnect: bool,
    pub preferred_codec: PreferredCodec,
    /// F's `is_ready_for_playback` threshold.
    pub buffer_preroll_ms: u64,
    /// Max wait before starting playback unconverged.
    pub convergence_wait_ms: u64,
    pub kalman_q_offset: f64,
    pub kalman_q_drift: f64,
    pub kalman_r0: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: -1,
            reconnect_initial_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
            reconnect_backoff_multiplier: 2.0,
            connect_timeout_ms: 10_000,
            keepalive_interval_ms: 0,
            receive_buffer_size: 64 * 1024,
            auto_reconnect: true,
            preferred_codec: PreferredCodec::Opus,
            buffer_preroll_ms: 100,
            convergence_wait_ms: 3_000,
            kalman_q_offset: 100.0,
            kalman_q_drift: 1.0,
            kalman_r0: 10_000.0,
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn convergence_wait(&self) -> Duration {
        Duration::from_millis(self.convergence_wait_ms)
    }

    pub fn reconnect_policy(&self) -> crate::transport::ReconnectPolicy {
        crate::transport::ReconnectPolicy {
            initial_delay: Duration::from_millis(self.reconnect_initial_delay_ms),
            max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
            backoff_multiplier: self.reconnect_backoff_multiplier,
            max_attempts: if self.max_reconnect_attempts < 0 {
                None
            } else {
                Some(self.max_reconnect_attempts as u32)
            },
            enabled: self.auto_reconnect,
        }
    }

    pub fn clock_tuning(&self) -> crate::sync::KalmanTuning {
        crate::sync::KalmanTuning {
            q_offset: self.kalman_q_offset,
            q_drift: self.kalman_q_drift,
            r0: self.kalman_r0,
        }
    }
}
