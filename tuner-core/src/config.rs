//! # Configuration Module
//!
//! Every tunable of the detection pipeline, exposed both as `pub const` defaults
//! and as fields of [`TunerConfig`], which can be saved to and loaded from JSON.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{Result, TunerError};

/// Lowest supported fundamental in Hz.
pub const MIN_FREQ: f32 = 70.0;
/// Highest supported fundamental in Hz.
pub const MAX_FREQ: f32 = 1000.0;
/// Frame RMS below which the input counts as silence.
pub const MIN_RMS: f32 = 0.01;
/// Minimum correlation confidence for a candidate to count as signal.
pub const MIN_CONFIDENCE: f32 = 0.7;
/// Confidence above which a large jump is trusted instead of rejected.
pub const HIGH_CONFIDENCE: f32 = 0.85;
/// How long the last stable note survives a signal dropout, in ms.
pub const HOLD_MS: f64 = 220.0;
/// Detection attempts per second, independent of the tick rate.
pub const DETECT_HZ: f64 = 25.0;
/// Relative change treated as an outlier at normal confidence.
pub const OUTLIER_RATIO: f32 = 0.05;
/// Length of the median filter history.
pub const MEDIAN_WINDOW: usize = 7;
/// Exponential smoothing factor.
pub const EMA_ALPHA: f32 = 0.25;
/// Consecutive detections needed before a new note is confirmed.
pub const NOTE_STABLE_FRAMES: u32 = 6;
/// Cents deviation beyond which a new note is confirmed immediately.
pub const NOTE_CENTS_HYSTERESIS: f32 = 40.0;
/// Absolute cents deviation under which a note is in tune.
pub const IN_TUNE_CENTS_THRESHOLD: f32 = 8.0;
/// High-pass cutoff of the optional input filter pair.
pub const HIGHPASS_HZ: f32 = 65.0;
/// Low-pass cutoff of the optional input filter pair.
pub const LOWPASS_HZ: f32 = 1800.0;
/// Samples per analysis frame.
pub const WINDOW_SIZE: usize = 4096;
/// Maximum lag distance from twice the best lag for the harmonic tie-break.
pub const HARMONIC_LAG_TOLERANCE: usize = 3;
/// Fraction of the best peak a doubled-lag peak must reach to be considered.
pub const HARMONIC_RATIO: f32 = 0.9;
/// How much more periodic (window-compensated) the doubled-lag peak must be.
pub const HARMONIC_MARGIN: f32 = 0.01;
/// Frequency change that forces a new emission, in Hz.
pub const EMIT_FREQUENCY_DELTA: f32 = 0.2;
/// Cents change that forces a new emission.
pub const EMIT_CENTS_DELTA: f32 = 0.5;

/// Upper bound for `median_window`; the history ring is allocated at this size.
pub const MAX_MEDIAN_WINDOW: usize = 32;

/// Runtime configuration of the pitch engine.
///
/// `Default` yields the tuned constants above. Missing fields in a JSON file
/// fall back to those defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub min_freq: f32,
    pub max_freq: f32,
    pub min_rms: f32,
    pub min_confidence: f32,
    pub high_confidence: f32,
    pub hold_ms: f64,
    pub detect_hz: f64,
    pub outlier_ratio: f32,
    pub median_window: usize,
    pub ema_alpha: f32,
    pub note_stable_frames: u32,
    pub note_cents_hysteresis: f32,
    pub in_tune_cents: f32,
    /// Route capture through the high-pass/low-pass pair.
    pub enable_filters: bool,
    pub highpass_hz: f32,
    pub lowpass_hz: f32,
    pub window_size: usize,
    pub harmonic_lag_tolerance: usize,
    pub harmonic_ratio: f32,
    pub harmonic_margin: f32,
    pub emit_frequency_delta: f32,
    pub emit_cents_delta: f32,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            min_freq: MIN_FREQ,
            max_freq: MAX_FREQ,
            min_rms: MIN_RMS,
            min_confidence: MIN_CONFIDENCE,
            high_confidence: HIGH_CONFIDENCE,
            hold_ms: HOLD_MS,
            detect_hz: DETECT_HZ,
            outlier_ratio: OUTLIER_RATIO,
            median_window: MEDIAN_WINDOW,
            ema_alpha: EMA_ALPHA,
            note_stable_frames: NOTE_STABLE_FRAMES,
            note_cents_hysteresis: NOTE_CENTS_HYSTERESIS,
            in_tune_cents: IN_TUNE_CENTS_THRESHOLD,
            enable_filters: true,
            highpass_hz: HIGHPASS_HZ,
            lowpass_hz: LOWPASS_HZ,
            window_size: WINDOW_SIZE,
            harmonic_lag_tolerance: HARMONIC_LAG_TOLERANCE,
            harmonic_ratio: HARMONIC_RATIO,
            harmonic_margin: HARMONIC_MARGIN,
            emit_frequency_delta: EMIT_FREQUENCY_DELTA,
            emit_cents_delta: EMIT_CENTS_DELTA,
        }
    }
}

impl TunerConfig {
    /// Minimum spacing between two detection attempts, in ms.
    pub fn detect_interval_ms(&self) -> f64 {
        1000.0 / self.detect_hz
    }

    /// Checks that every parameter is usable by the pipeline.
    pub fn validate(&self) -> Result<()> {
        fn invalid(name: &'static str, value: impl ToString, reason: &'static str) -> TunerError {
            TunerError::InvalidConfig {
                name,
                value: value.to_string(),
                reason,
            }
        }

        if !(self.min_freq.is_finite() && self.min_freq > 0.0) {
            return Err(invalid("min_freq", self.min_freq, "must be a positive frequency"));
        }
        if !(self.max_freq.is_finite() && self.max_freq > self.min_freq) {
            return Err(invalid("max_freq", self.max_freq, "must be above min_freq"));
        }
        for (name, value) in [
            ("min_confidence", self.min_confidence),
            ("high_confidence", self.high_confidence),
            ("harmonic_ratio", self.harmonic_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(name, value, "must be in [0, 1]"));
            }
        }
        if self.median_window == 0 || self.median_window > MAX_MEDIAN_WINDOW {
            return Err(invalid("median_window", self.median_window, "must be in 1..=32"));
        }
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return Err(invalid("ema_alpha", self.ema_alpha, "must be in (0, 1]"));
        }
        if !(self.detect_hz.is_finite() && self.detect_hz > 0.0) {
            return Err(invalid("detect_hz", self.detect_hz, "must be positive"));
        }
        if self.window_size < 64 {
            return Err(invalid("window_size", self.window_size, "must be at least 64 samples"));
        }
        if self.note_stable_frames == 0 {
            return Err(invalid("note_stable_frames", self.note_stable_frames, "must be at least 1"));
        }
        if self.enable_filters && self.highpass_hz >= self.lowpass_hz {
            return Err(invalid("highpass_hz", self.highpass_hz, "must be below lowpass_hz"));
        }
        Ok(())
    }

    /// Loads and validates a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let mut data = String::new();
        file.read_to_string(&mut data)?;
        let config: TunerConfig = serde_json::from_str(&data)?;
        config.validate()?;
        log::info!("Loaded tuner configuration from {}", path.display());
        Ok(config)
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json_string = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }
}
