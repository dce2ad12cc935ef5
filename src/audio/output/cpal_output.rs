// ABOUTME: cpal-based audio output implementation
// ABOUTME: Cross-platform audio output using the cpal library

use crate::audio::output::{AudioOutput, SampleSource};
use crate::audio::{AudioFormat, Sample};
use crate::error::Error;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use std::sync::{Arc, Mutex};

/// cpal-based audio output. Holds the negotiated format and the live
/// stream; the stream's real-time callback pulls from whatever
/// `SampleSource` is currently installed.
pub struct CpalOutput {
    format: Option<AudioFormat>,
    device: Device,
    stream: Option<Stream>,
    source: Arc<Mutex<Option<Box<dyn SampleSource>>>>,
    latency_micros: Arc<Mutex<u64>>,
}

impl CpalOutput {
    pub fn new() -> Result<Self, Error> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Output("No output device available".to_string()))?;
        Ok(Self {
            format: None,
            device,
            stream: None,
            source: Arc::new(Mutex::new(None)),
            latency_micros: Arc::new(Mutex::new(0)),
        })
    }

    fn build_stream(&self, format: &AudioFormat) -> Result<Stream, Error> {
        if let Ok(def) = self.device.default_output_config() {
            log::info!(
                "Device default: {:?} {}Hz {}ch",
                def.sample_format(),
                def.sample_rate().0,
                def.channels()
            );
            if def.sample_rate().0 != format.sample_rate
                || def.channels() != format.channels as u16
            {
                log::warn!(
                    "requested {}Hz/{}ch; device default is {}Hz/{}ch (OS may resample)",
                    format.sample_rate, format.channels, def.sample_rate().0, def.channels()
                );
            }
        }

        let config = StreamConfig {
            channels: format.channels as u16,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let source = Arc::clone(&self.source);
        let stream = self
            .device
            .build_output_stream(
                &config,
                move |data: &mut [Sample], _: &cpal::OutputCallbackInfo| {
                    let mut guard = match source.lock() {
                        Ok(g) => g,
                        Err(_) => {
                            data.fill(0.0);
                            return;
                        }
                    };
                    match guard.as_mut() {
                        Some(src) => {
                            let written = src.read(data);
                            for sample in data.iter_mut().skip(written) {
                                *sample = 0.0;
                            }
                        }
                        None => data.fill(0.0),
                    }
                },
                |err| log::error!("audio stream error: {err}"),
                None,
            )
            .map_err(|e| Error::Output(e.to_string()))?;

        Ok(stream)
    }
}

impl AudioOutput for CpalOutput {
    fn initialize(&mut self, format: &AudioFormat) -> Result<(), Error> {
        let stream = self.build_stream(format)?;
        self.stream = Some(stream);
        self.format = Some(format.clone());
        Ok(())
    }

    fn set_sample_source(&mut self, new_source: Box<dyn SampleSource>) {
        *self.source.lock().expect("sample source mutex poisoned") = Some(new_source);
    }

    fn play(&mut self) -> Result<(), Error> {
        match &self.stream {
            Some(stream) => stream.play().map_err(|e| Error::Output(e.to_string())),
            None => Err(Error::Output("output not initialized".to_string())),
        }
    }

    fn pause(&mut self) -> Result<(), Error> {
        match &self.stream {
            Some(stream) => stream.pause().map_err(|e| Error::Output(e.to_string())),
            None => Err(Error::Output("output not initialized".to_string())),
        }
    }

    fn stop(&mut self) -> Result<(), Error> {
        self.pause()?;
        *self.source.lock().expect("sample source mutex poisoned") = None;
        Ok(())
    }

    fn dispose(&mut self) {
        self.stream = None;
        *self.source.lock().expect("sample source mutex poisoned") = None;
    }

    fn latency_micros(&self) -> u64 {
        *self.latency_micros.lock().expect("latency mutex poisoned")
    }

    fn format(&self) -> &AudioFormat {
        self.format.as_ref().expect("output not initialized")
    }
}
