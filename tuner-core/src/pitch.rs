//! # Pitch Detection Module
//!
//! Turns a correlation curve into a single pitch candidate.
//!
//! ## Steps
//! - Collect the strict local maxima of the curve and rank them by value
//! - Harmonic tie-break: prefer the peak near twice the best lag when it is
//!   nearly as strong and more periodic once the window decay is removed
//! - Parabolic interpolation for sub-sample lag accuracy

use crate::config::TunerConfig;
use crate::correlation::{Autocorrelator, CorrelationCurve};

/// The raw, unfiltered estimate for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchCandidate {
    /// Estimated fundamental in Hz, `None` when no peak was found.
    pub frequency: Option<f32>,
    /// Periodicity of the chosen peak, 0 when there is none.
    pub confidence: f32,
}

impl PitchCandidate {
    pub const NONE: PitchCandidate = PitchCandidate {
        frequency: None,
        confidence: 0.0,
    };
}

/// A local maximum of the correlation curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub lag: usize,
    pub value: f32,
}

/// Parameters of the doubled-lag tie-break.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicRule {
    /// Maximum distance (exclusive) from twice the best lag.
    pub lag_tolerance: usize,
    /// Fraction of the best value the doubled-lag peak must reach.
    pub ratio: f32,
    /// Required gain in window-compensated periodicity.
    pub margin: f32,
}

impl From<&TunerConfig> for HarmonicRule {
    fn from(config: &TunerConfig) -> Self {
        Self {
            lag_tolerance: config.harmonic_lag_tolerance,
            ratio: config.harmonic_ratio,
            margin: config.harmonic_margin,
        }
    }
}

impl Default for HarmonicRule {
    fn default() -> Self {
        Self::from(&TunerConfig::default())
    }
}

/// Root-mean-square level of a frame. Empty frames are silent.
pub fn frame_rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sumsq: f64 = frame.iter().map(|&x| (x as f64) * (x as f64)).sum();
    (sumsq / frame.len() as f64).sqrt() as f32
}

/// Collects the strict local maxima inside `(min_lag, max_lag - 1)` into
/// `peaks`, sorted by value descending (ties keep the shorter lag first).
///
/// A peak is greater than its left neighbour and not less than its right one.
pub fn collect_peaks(curve: &CorrelationCurve, peaks: &mut Vec<Peak>) {
    peaks.clear();
    if curve.is_empty() {
        return;
    }
    let values = curve.values();
    let end = curve.max_lag().saturating_sub(1);
    for lag in (curve.min_lag() + 1)..end {
        let v = values[lag];
        if v > values[lag - 1] && v >= values[lag + 1] {
            peaks.push(Peak { lag, value: v });
        }
    }
    peaks.sort_by(|a, b| b.value.total_cmp(&a.value));
}

/// Chooses the peak to report from `peaks` (as produced by [`collect_peaks`]).
///
/// The top-ranked peak wins unless a peak sits within `lag_tolerance` of twice
/// its lag, reaches `ratio` of its value and is at least `margin` more periodic
/// after window compensation. That pattern means the best peak is a strong
/// harmonic and the true fundamental lives at the doubled lag. A pure tone is
/// equally periodic at both lags and keeps the shorter one.
pub fn pick_peak(curve: &CorrelationCurve, peaks: &[Peak], rule: HarmonicRule) -> Option<Peak> {
    let best = *peaks.first()?;
    let best_periodicity = curve.compensated(best.lag);
    let harmonic = peaks.iter().find(|p| {
        p.lag.abs_diff(best.lag * 2) < rule.lag_tolerance
            && p.value >= best.value * rule.ratio
            && curve.compensated(p.lag) >= best_periodicity + rule.margin
    });
    Some(harmonic.copied().unwrap_or(best))
}

/// Refines `lag` to sub-sample precision.
///
/// The lag first climbs to the nearest local maximum of the window-compensated
/// curve (the raw maximum is biased toward shorter lags by the window), then a
/// parabola through the three surrounding values gives the offset
/// `0.5·(y[-1] - y[+1]) / (y[-1] - 2y[0] + y[+1])`. The offset is 0 at the
/// curve boundaries or when the denominator vanishes.
///
/// Returns the refined lag and the compensated value at the integer lag.
pub fn refine_lag(curve: &CorrelationCurve, lag: usize) -> (f32, f32) {
    let (min_lag, max_lag) = (curve.min_lag(), curve.max_lag());
    let periodicity = |l: usize| curve.compensated_unclamped(l);

    let mut lag = lag.clamp(min_lag, max_lag);
    while lag < max_lag && periodicity(lag + 1) > periodicity(lag) {
        lag += 1;
    }
    while lag > min_lag && periodicity(lag - 1) > periodicity(lag) {
        lag -= 1;
    }
    let confidence = curve.compensated(lag);

    if lag <= min_lag || lag >= max_lag {
        return (lag as f32, confidence);
    }
    let y1 = periodicity(lag - 1);
    let y2 = periodicity(lag);
    let y3 = periodicity(lag + 1);
    let denom = y1 - 2.0 * y2 + y3;
    if denom == 0.0 {
        return (lag as f32, confidence);
    }
    let delta = 0.5 * (y1 - y3) / denom;
    (lag as f32 + delta, confidence)
}

/// Per-frame detector: correlation, peak choice and refinement.
///
/// Keeps its analyzer and peak buffer between frames.
#[derive(Debug)]
pub struct PitchDetector {
    analyzer: Autocorrelator,
    peaks: Vec<Peak>,
    rule: HarmonicRule,
    min_freq: f32,
    max_freq: f32,
}

impl PitchDetector {
    pub fn new(config: &TunerConfig) -> Self {
        Self {
            analyzer: Autocorrelator::new(config.window_size),
            peaks: Vec::new(),
            rule: HarmonicRule::from(config),
            min_freq: config.min_freq,
            max_freq: config.max_freq,
        }
    }

    /// Estimates the fundamental of `frame`.
    ///
    /// Returns [`PitchCandidate::NONE`] when the curve has no peak.
    pub fn detect(&mut self, frame: &[f32], sample_rate: u32) -> PitchCandidate {
        let curve = self
            .analyzer
            .analyze(frame, sample_rate, self.min_freq, self.max_freq);
        collect_peaks(curve, &mut self.peaks);
        let Some(peak) = pick_peak(curve, &self.peaks, self.rule) else {
            return PitchCandidate::NONE;
        };
        let (refined_lag, confidence) = refine_lag(curve, peak.lag);
        if refined_lag <= 0.0 {
            return PitchCandidate::NONE;
        }
        let frequency = sample_rate as f32 / refined_lag;
        if frequency.is_finite() {
            PitchCandidate {
                frequency: Some(frequency),
                confidence,
            }
        } else {
            PitchCandidate::NONE
        }
    }
}
