//! # Temporal Stabilization Module
//!
//! Turns the noisy per-frame candidates into the note a player sees.
//!
//! ## Per detection tick
//! 1. Gate on signal presence (RMS, frequency range, confidence)
//! 2. Without signal: hold the last stable note briefly, then reset
//! 3. With signal: median over the recent history, reject sudden jumps unless
//!    confidence is high, exponential smoothing
//! 4. Note-change hysteresis: a new note must persist, or be decisively off
//!    the old one, before it is confirmed
//! 5. Emit only when the visible state changes materially
//!
//! All cross-frame state lives in [`StabilizationState`], passed explicitly
//! into [`admit_tick`] and [`stabilize`].

use crate::PitchState;
use crate::config::TunerConfig;
use crate::history::FrequencyHistory;
use crate::pitch::PitchCandidate;
use crate::tuning::{self, PLACEHOLDER_NAME};

/// Cross-frame state of the filter. Lives for one capture session.
#[derive(Debug, Clone)]
pub struct StabilizationState {
    /// Current exponential moving average.
    pub smoothed_frequency: Option<f32>,
    /// Sliding window for the median filter.
    pub history: FrequencyHistory,
    pub last_stable_frequency: Option<f32>,
    pub last_stable_timestamp: f64,
    /// `None` until the first detection attempt.
    pub last_detect_timestamp: Option<f64>,
    /// Candidate note (name, octave) waiting for confirmation.
    pub pending_note: Option<(&'static str, i32)>,
    pub pending_streak: u32,
    pub confirmed_note: &'static str,
    pub confirmed_octave: i32,
    pub last_emitted: PitchState,
}

impl StabilizationState {
    pub fn new(config: &TunerConfig) -> Self {
        Self {
            smoothed_frequency: None,
            history: FrequencyHistory::new(config.median_window),
            last_stable_frequency: None,
            last_stable_timestamp: 0.0,
            last_detect_timestamp: None,
            pending_note: None,
            pending_streak: 0,
            confirmed_note: PLACEHOLDER_NAME,
            confirmed_octave: 4,
            last_emitted: PitchState::initial(),
        }
    }

    /// Clears smoothing, history, pending counters and the confirmed note.
    /// The hold-over bookkeeping and throttle timestamp survive.
    pub fn reset_smoothing(&mut self) {
        self.smoothed_frequency = None;
        self.history.clear();
        self.pending_note = None;
        self.pending_streak = 0;
        self.confirmed_note = PLACEHOLDER_NAME;
        self.confirmed_octave = 4;
    }
}

/// What a tick did, for tests and debug logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Too soon after the previous detection; nothing ran.
    Throttled,
    /// No signal, but inside the hold window: state untouched.
    Held,
    /// No signal past the hold window: state reset.
    Silent,
    /// Jump too large for the confidence: tick discarded.
    OutlierRejected,
    /// Candidate accepted and smoothed.
    Tracked,
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub outcome: TickOutcome,
    /// The new state when it differs materially from the last emission.
    pub emitted: Option<PitchState>,
}

impl TickReport {
    fn quiet(outcome: TickOutcome) -> Self {
        Self {
            outcome,
            emitted: None,
        }
    }
}

/// Detection-rate gate. Returns true (and records `now_ms`) when at least
/// `1000 / detect_hz` ms have passed since the previous admitted tick.
/// The very first tick is always admitted.
pub fn admit_tick(state: &mut StabilizationState, config: &TunerConfig, now_ms: f64) -> bool {
    if let Some(last) = state.last_detect_timestamp {
        if now_ms - last < config.detect_interval_ms() {
            return false;
        }
    }
    state.last_detect_timestamp = Some(now_ms);
    true
}

/// Runs the filter for one admitted tick.
pub fn stabilize(
    state: &mut StabilizationState,
    config: &TunerConfig,
    now_ms: f64,
    candidate: PitchCandidate,
    rms: f32,
) -> TickReport {
    let in_range = candidate
        .frequency
        .filter(|f| f.is_finite() && *f >= config.min_freq && *f <= config.max_freq);
    let frequency = match in_range {
        Some(f) if rms >= config.min_rms && candidate.confidence >= config.min_confidence => f,
        _ => return on_silence(state, config, now_ms),
    };

    // Evaluate on a copy so a rejected tick leaves no trace.
    let mut history = state.history.clone();
    history.push(frequency);
    let Some(median) = history.median() else {
        return TickReport::quiet(TickOutcome::OutlierRejected);
    };
    let previous = state.smoothed_frequency.unwrap_or(median);
    let ratio = if previous > 0.0 {
        (median - previous).abs() / previous
    } else {
        0.0
    };
    if ratio > config.outlier_ratio && candidate.confidence < config.high_confidence {
        log::trace!(
            "outlier rejected: median {median:.2} Hz vs {previous:.2} Hz (confidence {:.2})",
            candidate.confidence
        );
        return TickReport::quiet(TickOutcome::OutlierRejected);
    }

    let smoothed = previous + (median - previous) * config.ema_alpha;
    state.history = history;
    state.smoothed_frequency = Some(smoothed);
    state.last_stable_frequency = Some(smoothed);
    state.last_stable_timestamp = now_ms;

    let note = tuning::frequency_to_note(smoothed);
    let cents = tuning::cents_deviation(smoothed, note.reference_hz);
    apply_hysteresis(state, config, note.name, note.octave, cents);

    let next = PitchState {
        frequency: Some(smoothed),
        note_name: state.confirmed_note.to_string(),
        note_with_octave: tuning::note_with_octave(state.confirmed_note, state.confirmed_octave),
        cents,
        in_tune: cents.abs() < config.in_tune_cents,
    };
    TickReport {
        outcome: TickOutcome::Tracked,
        emitted: emit_if_changed(state, config, next),
    }
}

fn on_silence(state: &mut StabilizationState, config: &TunerConfig, now_ms: f64) -> TickReport {
    if state.last_stable_frequency.is_some()
        && now_ms - state.last_stable_timestamp <= config.hold_ms
    {
        return TickReport::quiet(TickOutcome::Held);
    }
    state.reset_smoothing();
    let initial = PitchState::initial();
    let emitted = if state.last_emitted != initial {
        state.last_emitted = initial.clone();
        Some(initial)
    } else {
        None
    };
    TickReport {
        outcome: TickOutcome::Silent,
        emitted,
    }
}

/// Confirms a new note after `note_stable_frames` consecutive sightings, or at
/// once when it is more than `note_cents_hysteresis` cents from its reference.
fn apply_hysteresis(
    state: &mut StabilizationState,
    config: &TunerConfig,
    name: &'static str,
    octave: i32,
    cents: f32,
) {
    if name == state.confirmed_note && octave == state.confirmed_octave {
        // A streak must be consecutive.
        state.pending_note = None;
        state.pending_streak = 0;
        return;
    }
    if state.pending_note == Some((name, octave)) {
        state.pending_streak += 1;
    } else {
        state.pending_note = Some((name, octave));
        state.pending_streak = 1;
    }
    if state.pending_streak >= config.note_stable_frames
        || cents.abs() > config.note_cents_hysteresis
    {
        log::debug!("note confirmed: {name}{octave} after {} ticks", state.pending_streak);
        state.confirmed_note = name;
        state.confirmed_octave = octave;
        state.pending_note = None;
        state.pending_streak = 0;
    }
}

fn emit_if_changed(
    state: &mut StabilizationState,
    config: &TunerConfig,
    next: PitchState,
) -> Option<PitchState> {
    if !state.last_emitted.differs_materially(
        &next,
        config.emit_frequency_delta,
        config.emit_cents_delta,
    ) {
        return None;
    }
    state.last_emitted = next.clone();
    Some(next)
}

/// Owns a configuration and its filter state.
#[derive(Debug, Clone)]
pub struct Stabilizer {
    config: TunerConfig,
    state: StabilizationState,
}

impl Stabilizer {
    pub fn new(config: TunerConfig) -> Self {
        let state = StabilizationState::new(&config);
        Self { config, state }
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn state(&self) -> &StabilizationState {
        &self.state
    }

    /// See [`admit_tick`].
    pub fn admit(&mut self, now_ms: f64) -> bool {
        admit_tick(&mut self.state, &self.config, now_ms)
    }

    /// See [`stabilize`]; call only for admitted ticks.
    pub fn update(&mut self, now_ms: f64, candidate: PitchCandidate, rms: f32) -> TickReport {
        stabilize(&mut self.state, &self.config, now_ms, candidate, rms)
    }

    /// Gate and update in one call.
    pub fn step(&mut self, now_ms: f64, candidate: PitchCandidate, rms: f32) -> TickReport {
        if !self.admit(now_ms) {
            return TickReport::quiet(TickOutcome::Throttled);
        }
        self.update(now_ms, candidate, rms)
    }

    /// Returns to the quiescent state of a fresh session.
    pub fn reset(&mut self) {
        self.state = StabilizationState::new(&self.config);
    }
}
