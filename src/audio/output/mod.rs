// ABOUTME: Audio output adapter contract and its cpal-backed implementation
// ABOUTME: The adapter pulls samples from a caller-supplied SampleSource on its own thread

mod cpal_output;

pub use cpal_output::CpalOutput;

use crate::audio::{AudioFormat, Sample};
use crate::error::Error;

/// Supplies samples to an audio output adapter, pulled from the adapter's
/// own playback thread. `read` must never block for long: it backs a
/// real-time callback. Implementations fill `out` completely, padding with
/// silence if fewer samples are available.
pub trait SampleSource: Send {
    fn read(&mut self, out: &mut [Sample]) -> usize;
}

/// Platform audio output adapter. The core supplies a [`SampleSource`]; the
/// adapter owns the device stream and its real-time thread.
pub trait AudioOutput: Send {
    fn initialize(&mut self, format: &AudioFormat) -> Result<(), Error>;
    fn set_sample_source(&mut self, source: Box<dyn SampleSource>);
    fn play(&mut self) -> Result<(), Error>;
    fn pause(&mut self) -> Result<(), Error>;
    fn stop(&mut self) -> Result<(), Error>;
    fn dispose(&mut self);
    fn latency_micros(&self) -> u64;
    fn format(&self) -> &AudioFormat;
}
