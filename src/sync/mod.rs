// ABOUTME: Clock synchronization module
// ABOUTME: Re-exports the Kalman-filter based clock sync state

mod clock;

pub use clock::{ClockSync, KalmanTuning, SyncQuality};
