//! Synthetic sine input.
//!
//! A deterministic stand-in for a microphone: the engine, the worker and the
//! CLI can all run against it without audio hardware.

use std::f64::consts::TAU;

use crate::audio::{AudioStream, CaptureContext, CaptureOptions};
use crate::error::Result;
use crate::tap::AnalysisTap;

/// Sample rate used by [`SineStream`] unless overridden.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// `len` samples of `amplitude · sin(2π·freq·t)`, starting at phase 0.
pub fn sine_wave(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
    let mut oscillator = SineOscillator::new(freq, sample_rate, amplitude);
    let mut out = vec![0.0; len];
    oscillator.fill(&mut out);
    out
}

/// Phase-continuous sine generator.
#[derive(Debug, Clone)]
pub struct SineOscillator {
    /// Phase increment per sample, in radians.
    step: f64,
    phase: f64,
    amplitude: f32,
}

impl SineOscillator {
    pub fn new(freq: f32, sample_rate: u32, amplitude: f32) -> Self {
        Self::with_phase(freq, sample_rate, amplitude, 0.0)
    }

    /// Starts at `phase` radians.
    pub fn with_phase(freq: f32, sample_rate: u32, amplitude: f32, phase: f64) -> Self {
        Self {
            step: TAU * freq as f64 / sample_rate.max(1) as f64,
            phase: phase.rem_euclid(TAU),
            amplitude,
        }
    }

    /// Writes the next `out.len()` samples.
    pub fn fill(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = self.amplitude * self.phase.sin() as f32;
            self.phase = (self.phase + self.step).rem_euclid(TAU);
        }
    }
}

/// A steady tone presented as a live stream.
///
/// Every read advances the source by one analysis window, so successive
/// frames are contiguous audio.
#[derive(Debug, Clone, PartialEq)]
pub struct SineStream {
    pub frequency: f32,
    pub amplitude: f32,
    pub sample_rate: u32,
}

impl SineStream {
    pub fn new(frequency: f32, amplitude: f32) -> Self {
        Self {
            frequency,
            amplitude,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }
}

impl AudioStream for SineStream {
    fn describe(&self) -> String {
        format!(
            "synthetic sine {:.2} Hz (amplitude {:.3}, {} Hz)",
            self.frequency, self.amplitude, self.sample_rate
        )
    }

    fn open(&self, options: &CaptureOptions) -> Result<Box<dyn CaptureContext>> {
        Ok(Box::new(SineContext {
            oscillator: SineOscillator::new(self.frequency, self.sample_rate, self.amplitude),
            tap: options.build_tap(self.sample_rate),
            chunk: vec![0.0; options.window_size],
            sample_rate: self.sample_rate,
            connected: true,
            closed: false,
        }))
    }
}

struct SineContext {
    oscillator: SineOscillator,
    tap: AnalysisTap,
    chunk: Vec<f32>,
    sample_rate: u32,
    connected: bool,
    closed: bool,
}

impl CaptureContext for SineContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_time_domain(&mut self, buffer: &mut [f32]) {
        if self.connected {
            self.oscillator.fill(&mut self.chunk);
            self.tap.push(&self.chunk);
        }
        self.tap.copy_window(buffer);
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.closed = true;
        self.tap.clear();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
