//! # Input Filter Module
//!
//! Second-order IIR sections (RBJ audio-EQ cookbook) used to strip rumble and
//! hiss from the capture path before analysis.

use std::f32::consts::PI;

/// Butterworth quality factor, maximally flat passband.
pub const BUTTERWORTH_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    HighPass,
    LowPass,
}

/// A single biquad section in direct form I, with its own state.
#[derive(Debug, Clone)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    /// Designs a section. The cutoff is kept below Nyquist.
    pub fn new(kind: FilterKind, cutoff_hz: f32, sample_rate: u32, q: f32) -> Self {
        let fs = sample_rate.max(1) as f32;
        let cutoff = cutoff_hz.min(0.49 * fs).max(f32::MIN_POSITIVE);
        let w0 = 2.0 * PI * cutoff / fs;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let (b0, b1, b2) = match kind {
            FilterKind::LowPass => ((1.0 - cos_w0) / 2.0, 1.0 - cos_w0, (1.0 - cos_w0) / 2.0),
            FilterKind::HighPass => ((1.0 + cos_w0) / 2.0, -(1.0 + cos_w0), (1.0 + cos_w0) / 2.0),
        };
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    pub fn process_sample(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2 - self.a1 * self.y1 - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// High-pass followed by low-pass: keeps the band where fundamentals live.
#[derive(Debug, Clone)]
pub struct FilterChain {
    highpass: Biquad,
    lowpass: Biquad,
}

impl FilterChain {
    pub fn band(highpass_hz: f32, lowpass_hz: f32, sample_rate: u32) -> Self {
        Self {
            highpass: Biquad::new(FilterKind::HighPass, highpass_hz, sample_rate, BUTTERWORTH_Q),
            lowpass: Biquad::new(FilterKind::LowPass, lowpass_hz, sample_rate, BUTTERWORTH_Q),
        }
    }

    /// Filters `buffer` in place, carrying state across calls.
    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.lowpass.process_sample(self.highpass.process_sample(*sample));
        }
    }

    pub fn reset(&mut self) {
        self.highpass.reset();
        self.lowpass.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::frame_rms;
    use crate::synth::sine_wave;

    fn steady_state_gain(chain: &mut FilterChain, freq: f32, sr: u32) -> f32 {
        let mut signal = sine_wave(freq, sr, sr as usize, 1.0);
        chain.process(&mut signal);
        // Skip the transient.
        let tail = &signal[signal.len() / 2..];
        frame_rms(tail) / std::f32::consts::FRAC_1_SQRT_2
    }

    #[test]
    fn passband_is_nearly_unity() {
        let mut chain = FilterChain::band(65.0, 1800.0, 44100);
        let gain = steady_state_gain(&mut chain, 440.0, 44100);
        assert!((gain - 1.0).abs() < 0.05, "gain at 440 Hz: {gain}");
    }

    #[test]
    fn rumble_and_hiss_are_attenuated() {
        let mut chain = FilterChain::band(65.0, 1800.0, 44100);
        assert!(steady_state_gain(&mut chain, 15.0, 44100) < 0.1);
        chain.reset();
        assert!(steady_state_gain(&mut chain, 10000.0, 44100) < 0.05);
    }

    #[test]
    fn cutoff_is_attenuated_by_3db() {
        let mut chain = FilterChain::band(20.0, 1800.0, 48000);
        let gain = steady_state_gain(&mut chain, 1800.0, 48000);
        assert!((gain - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.03, "gain {gain}");
    }

    #[test]
    fn degenerate_sample_rates_stay_finite() {
        for sr in [0, 1, 2, 3] {
            let mut chain = FilterChain::band(65.0, 1800.0, sr);
            let mut signal = vec![0.5, -0.25, 1.0, 0.0, -1.0, 0.75];
            chain.process(&mut signal);
            assert!(signal.iter().all(|s| s.is_finite()), "sample rate {sr}: {signal:?}");
        }
    }

    #[test]
    fn dc_is_removed() {
        let mut hp = Biquad::new(FilterKind::HighPass, 65.0, 44100, BUTTERWORTH_Q);
        let mut last = 1.0;
        for _ in 0..44100 {
            last = hp.process_sample(1.0);
        }
        assert!(last.abs() < 1e-3);
    }

    #[test]
    fn cutoff_above_nyquist_stays_stable() {
        let mut lp = Biquad::new(FilterKind::LowPass, 1800.0, 2000, BUTTERWORTH_Q);
        let out: Vec<f32> = (0..1000).map(|i| lp.process_sample((i % 7) as f32 - 3.0)).collect();
        assert!(out.iter().all(|v| v.is_finite() && v.abs() < 100.0));
    }
}
