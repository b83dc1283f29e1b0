//! # Autocorrelation Module
//!
//! Computes the zero-normalized autocorrelation of a Hann-windowed audio frame
//! over the lag range of the supported fundamentals.
//!
//! ## Pipeline
//! 1. DC offset removal
//! 2. Hann windowing
//! 3. Linear autocorrelation via a zero-padded forward/inverse FFT
//! 4. Per-lag normalization by the energies of the two overlapping segments
//!
//! For lag `L` over a frame of `N` samples the value is
//! `Σ a_i·b_i / sqrt(Σ a_i² · Σ b_i²)` with `a_i = w[i]`, `b_i = w[i + L]`,
//! `i < N - L`, and 0 when either energy vanishes.
//!
//! The Hann window correlates with a shifted copy of itself less and less as the
//! lag grows, so even a perfectly periodic input scores below 1 at long lags.
//! The analyzer keeps that decay (the window envelope) so callers can compare
//! peaks at different lags on equal footing via [`CorrelationCurve::compensated`].

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [f64]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f64>() / len as f64;
    for sample in signal.iter_mut() {
        *sample -= avg;
    }
}

/// Builds the Hann window coefficients for `n` samples.
fn hann_window(n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![1.0; n];
    }
    let n_minus_1 = (n - 1) as f64;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / n_minus_1).cos()))
        .collect()
}

/// Lag search range for a frame.
///
/// # Arguments
/// * `frame_len` - Samples in the analysis frame
/// * `sample_rate` - Capture rate in Hz
/// * `min_freq`, `max_freq` - Detectable pitch range in Hz
///
/// # Returns
/// `Some((min_lag, max_lag))` with `min_lag = ceil(sr / max_freq)` (at least 2)
/// and `max_lag = floor(sr / min_freq)` clipped to the frame, or `None` when
/// the frame is too short or the sample rate too low to hold any lag in range.
pub fn lag_bounds(
    frame_len: usize,
    sample_rate: u32,
    min_freq: f32,
    max_freq: f32,
) -> Option<(usize, usize)> {
    if frame_len < 4 || sample_rate == 0 || min_freq <= 0.0 || max_freq <= 0.0 {
        return None;
    }
    let sr = sample_rate as f64;
    let min_lag = ((sr / max_freq as f64).ceil() as usize).max(2);
    let max_lag = ((sr / min_freq as f64).floor() as usize).min(frame_len - 1);
    (min_lag <= max_lag).then_some((min_lag, max_lag))
}

/// Normalized autocorrelation values indexed directly by lag.
///
/// Entries below `min_lag` are zero and never inspected.
#[derive(Debug, Clone, Default)]
pub struct CorrelationCurve {
    values: Vec<f32>,
    envelope: Vec<f32>,
    min_lag: usize,
    max_lag: usize,
}

impl CorrelationCurve {
    /// Builds a curve from precomputed values (index = lag) and window envelope.
    pub fn from_parts(values: Vec<f32>, envelope: Vec<f32>, min_lag: usize, max_lag: usize) -> Self {
        debug_assert_eq!(values.len(), envelope.len());
        Self {
            values,
            envelope,
            min_lag,
            max_lag,
        }
    }

    pub fn min_lag(&self) -> usize {
        self.min_lag
    }

    pub fn max_lag(&self) -> usize {
        self.max_lag
    }

    /// True when no lag was evaluated.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() || self.min_lag > self.max_lag
    }

    /// The raw values, index = lag, length `max_lag + 1`.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn value(&self, lag: usize) -> f32 {
        self.values.get(lag).copied().unwrap_or(0.0)
    }

    /// Value at `lag` divided by the window's own correlation at that lag,
    /// clamped to `[-1, 1]`. A perfectly periodic input scores ~1 at any
    /// multiple of its period.
    pub fn compensated(&self, lag: usize) -> f32 {
        self.compensated_unclamped(lag).clamp(-1.0, 1.0)
    }

    /// Like [`compensated`](Self::compensated) without the clamp, so the
    /// shape around a peak survives for interpolation.
    pub(crate) fn compensated_unclamped(&self, lag: usize) -> f32 {
        match (self.values.get(lag), self.envelope.get(lag)) {
            (Some(&value), Some(&env)) if env > 0.0 => value / env,
            (Some(&value), _) => value,
            _ => 0.0,
        }
    }

    fn clear(&mut self) {
        self.values.clear();
        self.envelope.clear();
        self.min_lag = 0;
        self.max_lag = 0;
    }
}

/// Reusable autocorrelation engine for frames of one length.
///
/// Owns its FFT plans and scratch space so repeated calls on same-sized frames
/// do not allocate.
pub struct Autocorrelator {
    frame_len: usize,
    fft_len: usize,
    window: Vec<f64>,
    /// Normalized self-correlation of the window, index = lag.
    window_envelope: Vec<f64>,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    spectrum: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    windowed: Vec<f64>,
    energy_prefix: Vec<f64>,
    curve: CorrelationCurve,
}

impl std::fmt::Debug for Autocorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Autocorrelator")
            .field("frame_len", &self.frame_len)
            .field("fft_len", &self.fft_len)
            .finish_non_exhaustive()
    }
}

impl Autocorrelator {
    pub fn new(frame_len: usize) -> Self {
        let fft_len = (2 * frame_len.max(1)).next_power_of_two();
        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(fft_len);
        let inverse = planner.plan_fft_inverse(fft_len);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        let mut analyzer = Self {
            frame_len,
            fft_len,
            window: hann_window(frame_len),
            window_envelope: Vec::new(),
            forward,
            inverse,
            spectrum: vec![Complex::new(0.0, 0.0); fft_len],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            windowed: vec![0.0; frame_len],
            energy_prefix: vec![0.0; frame_len + 1],
            curve: CorrelationCurve::default(),
        };
        analyzer.window_envelope = analyzer.compute_window_envelope();
        analyzer
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Correlates `frame` over the lags covering `[min_freq, max_freq]`.
    ///
    /// Frames of a different length than the current plan rebuild the plan.
    /// Returns an empty curve when no lag fits the frame.
    pub fn analyze(
        &mut self,
        frame: &[f32],
        sample_rate: u32,
        min_freq: f32,
        max_freq: f32,
    ) -> &CorrelationCurve {
        if frame.len() != self.frame_len {
            *self = Self::new(frame.len());
        }
        let Some((min_lag, max_lag)) = lag_bounds(frame.len(), sample_rate, min_freq, max_freq)
        else {
            self.curve.clear();
            return &self.curve;
        };

        for (dst, &src) in self.windowed.iter_mut().zip(frame) {
            *dst = src as f64;
        }
        remove_dc_offset(&mut self.windowed);
        for (sample, w) in self.windowed.iter_mut().zip(&self.window) {
            *sample *= w;
        }

        self.linear_autocorrelation();
        fill_energy_prefix(&self.windowed, &mut self.energy_prefix);

        let n = self.frame_len;
        let total = self.energy_prefix[n];
        let scale = 1.0 / self.fft_len as f64;
        let curve = &mut self.curve;
        curve.values.clear();
        curve.values.resize(max_lag + 1, 0.0);
        curve.envelope.clear();
        curve.envelope.resize(max_lag + 1, 0.0);
        for lag in min_lag..=max_lag {
            let sum = self.spectrum[lag].re * scale;
            let e1 = self.energy_prefix[n - lag];
            let e2 = total - self.energy_prefix[lag];
            let denom = (e1 * e2).sqrt();
            let value = if denom > 0.0 { sum / denom } else { 0.0 };
            curve.values[lag] = value.clamp(-1.0, 1.0) as f32;
            curve.envelope[lag] = self.window_envelope[lag] as f32;
        }
        curve.min_lag = min_lag;
        curve.max_lag = max_lag;
        &self.curve
    }

    /// Leaves the unnormalized linear autocorrelation of `windowed` in the
    /// real parts of `spectrum` (scaled by `fft_len`).
    fn linear_autocorrelation(&mut self) {
        for (i, bin) in self.spectrum.iter_mut().enumerate() {
            let re = self.windowed.get(i).copied().unwrap_or(0.0);
            *bin = Complex::new(re, 0.0);
        }
        self.forward
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);
        for bin in self.spectrum.iter_mut() {
            *bin = Complex::new(bin.norm_sqr(), 0.0);
        }
        self.inverse
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);
    }

    fn compute_window_envelope(&mut self) -> Vec<f64> {
        let n = self.frame_len;
        self.windowed.copy_from_slice(&self.window);
        self.linear_autocorrelation();
        fill_energy_prefix(&self.windowed, &mut self.energy_prefix);
        let total = self.energy_prefix[n];
        let scale = 1.0 / self.fft_len as f64;
        (0..n)
            .map(|lag| {
                let e1 = self.energy_prefix[n - lag];
                let e2 = total - self.energy_prefix[lag];
                let denom = (e1 * e2).sqrt();
                if denom > 0.0 {
                    (self.spectrum[lag].re * scale / denom).clamp(0.0, 1.0)
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// `prefix[k]` = sum of squares of the first `k` samples.
fn fill_energy_prefix(signal: &[f64], prefix: &mut [f64]) {
    let mut acc = 0.0;
    prefix[0] = 0.0;
    for (i, &s) in signal.iter().enumerate() {
        acc += s * s;
        prefix[i + 1] = acc;
    }
}
