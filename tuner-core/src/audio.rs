//! # Audio Capture Module
//!
//! The capture boundary of the engine, plus its CPAL (Cross-Platform Audio
//! Library) implementation.
//!
//! ## Model
//! - [`AudioStream`]: a handle to a live input (device or synthetic source).
//!   Opening it builds a [`CaptureContext`].
//! - [`CaptureContext`]: one open processing context at the stream's native
//!   sample rate, with an analysis tap the engine reads once per tick.
//!
//! ## CPAL backend
//! - Default (or named) input device, native sample rate, f32 preferred
//! - Downmix to mono inside the callback
//! - Chunks cross to the tick thread over a bounded channel; when the reader
//!   falls behind, chunks are dropped rather than blocking the audio thread

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};
use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::config::TunerConfig;
use crate::error::{Result, TunerError};
use crate::filters::FilterChain;
use crate::tap::AnalysisTap;

/// Number of callback chunks buffered between the audio thread and the tap.
const CHUNK_QUEUE_DEPTH: usize = 64;

/// How the context should feed its analysis tap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureOptions {
    /// Samples per analysis window.
    pub window_size: usize,
    /// `(highpass_hz, lowpass_hz)` when the input filter pair is enabled.
    pub filters: Option<(f32, f32)>,
}

impl From<&TunerConfig> for CaptureOptions {
    fn from(config: &TunerConfig) -> Self {
        Self {
            window_size: config.window_size,
            filters: config
                .enable_filters
                .then_some((config.highpass_hz, config.lowpass_hz)),
        }
    }
}

impl CaptureOptions {
    /// A tap configured for these options at `sample_rate`.
    pub fn build_tap(&self, sample_rate: u32) -> AnalysisTap {
        let filters = self
            .filters
            .map(|(hp, lp)| FilterChain::band(hp, lp, sample_rate));
        AnalysisTap::new(self.window_size, filters)
    }
}

/// A live audio input that can be opened for analysis.
///
/// `Send` so a handle can be given to the worker thread, which opens it there.
pub trait AudioStream: Send {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Builds a processing context. Failures leave nothing running.
    fn open(&self, options: &CaptureOptions) -> Result<Box<dyn CaptureContext>>;
}

/// An open audio-processing context with its analysis tap.
pub trait CaptureContext {
    fn sample_rate(&self) -> u32;

    /// Fills `buffer` with the most recent time-domain samples.
    fn read_time_domain(&mut self, buffer: &mut [f32]);

    /// Detaches the analysis tap from the source. Safe to call repeatedly.
    fn disconnect(&mut self) -> Result<()>;

    /// Releases the context. Safe to call repeatedly.
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// An input device reached through CPAL.
#[derive(Debug, Clone, Default)]
pub struct CpalInput {
    /// Exact device name; `None` selects the host's default input.
    pub device_name: Option<String>,
}

impl CpalInput {
    pub fn default_device() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }

    fn find_device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host
                .default_input_device()
                .ok_or(TunerError::NoInputDevice(None)),
            Some(wanted) => host
                .input_devices()?
                .find(|d| d.name().map(|n| &n == wanted).unwrap_or(false))
                .ok_or_else(|| TunerError::NoInputDevice(Some(wanted.clone()))),
        }
    }
}

impl AudioStream for CpalInput {
    fn describe(&self) -> String {
        match &self.device_name {
            Some(name) => format!("input device `{name}`"),
            None => "default input device".to_string(),
        }
    }

    fn open(&self, options: &CaptureOptions) -> Result<Box<dyn CaptureContext>> {
        let device = self.find_device()?;
        let device_name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        log::info!("Using audio input device: {device_name}");

        let supported = select_input_config(&device)?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported.into();
        log::info!("Capturing at {sample_rate} Hz, {channels} channel(s)");

        let (chunk_tx, chunk_rx) = crossbeam_channel::bounded(CHUNK_QUEUE_DEPTH);
        let err_fn = |err| log::error!("An error occurred on the audio stream: {err}");
        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                send_mono_chunk(&chunk_tx, data, channels);
            },
            err_fn,
            None,
        )?;
        stream.play()?;

        Ok(Box::new(CpalContext {
            stream: Some(stream),
            chunks: chunk_rx,
            tap: options.build_tap(sample_rate),
            sample_rate,
            closed: false,
        }))
    }
}

/// Downmixes interleaved frames and queues them without blocking.
fn send_mono_chunk(sender: &Sender<Vec<f32>>, data: &[f32], channels: usize) {
    let chunk: Vec<f32> = if channels <= 1 {
        data.to_vec()
    } else {
        data.chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };
    // Dropping a chunk when the reader is behind beats stalling the device.
    let _ = sender.try_send(chunk);
}

/// Picks the device's default input config when it is f32, otherwise the f32
/// range closest to the default rate.
fn select_input_config(device: &cpal::Device) -> Result<SupportedStreamConfig> {
    let default = device.default_input_config()?;
    if default.sample_format() == SampleFormat::F32 {
        return Ok(default);
    }
    let native_rate = default.sample_rate().0;
    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    find_supported_config(configs, native_rate)
        .map(|range| {
            let rate = native_rate.clamp(range.min_sample_rate().0, range.max_sample_rate().0);
            range.with_sample_rate(cpal::SampleRate(rate))
        })
        .ok_or_else(|| {
            TunerError::UnsupportedFormat(format!(
                "device offers {:?} by default and no f32 alternative",
                default.sample_format()
            ))
        })
}

/// Finds the f32 configuration with the fewest channels whose rate range is
/// closest to `target_rate`.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .min_by_key(|c| {
            let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
            let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
            let in_range = c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0;
            let rate_diff = if in_range { 0 } else { min_diff.min(max_diff) };
            (rate_diff, c.channels())
        })
}

/// An open CPAL input stream feeding an analysis tap.
struct CpalContext {
    stream: Option<cpal::Stream>,
    chunks: Receiver<Vec<f32>>,
    tap: AnalysisTap,
    sample_rate: u32,
    closed: bool,
}

impl CaptureContext for CpalContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_time_domain(&mut self, buffer: &mut [f32]) {
        loop {
            match self.chunks.try_recv() {
                Ok(chunk) => self.tap.push(&chunk),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        self.tap.copy_window(buffer);
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.as_ref() {
            stream.pause()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // Dropping the stream releases the device.
        self.stream.take();
        self.tap.clear();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
