// tuner-core/src/lib.rs

//! The core logic for the real-time pitch tuner.
//! This crate is responsible for audio capture, autocorrelation pitch
//! detection, note mapping and temporal stabilization. It is completely
//! headless and contains no UI code.
//!
//! The usual entry points are [`PitchEngine`] for callers that drive ticks
//! themselves, and [`TunerWorker`] for a background thread that does it.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod audio;
pub mod config;
pub mod correlation;
pub mod engine;
pub mod error;
pub mod filters;
pub mod history;
pub mod pitch;
pub mod scheduler;
pub mod stabilizer;
pub mod synth;
pub mod tap;
pub mod tuning;
pub mod worker;

pub use audio::{AudioStream, CaptureContext, CaptureOptions, CpalInput};
pub use config::TunerConfig;
pub use engine::PitchEngine;
pub use error::{Result, TunerError};
pub use pitch::PitchCandidate;
pub use synth::SineStream;
pub use worker::{TunerWorker, WorkerEvent};

/// What the engine publishes after each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchState {
    /// Smoothed fundamental in Hz, `None` while idle.
    pub frequency: Option<f32>,
    /// Confirmed pitch class, or the placeholder.
    pub note_name: String,
    /// Confirmed note with its octave, e.g. `"A4"`. Until a note has been
    /// confirmed this is the bare placeholder `"—"`, with no octave appended.
    pub note_with_octave: String,
    /// Deviation of the smoothed frequency from its nearest note.
    pub cents: f32,
    pub in_tune: bool,
}

impl PitchState {
    /// The quiescent state: no frequency, placeholder note.
    pub fn initial() -> Self {
        Self {
            frequency: None,
            note_name: tuning::PLACEHOLDER_NAME.to_string(),
            note_with_octave: tuning::PLACEHOLDER_NAME.to_string(),
            cents: 0.0,
            in_tune: false,
        }
    }

    pub fn is_idle(&self) -> bool {
        *self == Self::initial()
    }

    /// True when `other` would look different to a viewer: another note, a
    /// frequency or cents change beyond the given deltas, or an in-tune flip.
    /// An absent frequency compares as 0 Hz.
    pub fn differs_materially(&self, other: &PitchState, frequency_delta: f32, cents_delta: f32) -> bool {
        let frequency_change = (self.frequency.unwrap_or(0.0) - other.frequency.unwrap_or(0.0)).abs();
        self.note_name != other.note_name
            || self.note_with_octave != other.note_with_octave
            || frequency_change > frequency_delta
            || (self.cents - other.cents).abs() > cents_delta
            || self.in_tune != other.in_tune
    }
}

impl Default for PitchState {
    fn default() -> Self {
        Self::initial()
    }
}

impl fmt::Display for PitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(frequency) = self.frequency else {
            return f.write_str(&self.note_with_octave);
        };
        let verdict = if self.in_tune {
            "in tune"
        } else if self.cents > 0.0 {
            "sharp"
        } else {
            "flat"
        };
        write!(
            f,
            "{:<4} {:+6.1}c  {:7.1} Hz  {verdict}",
            self.note_with_octave, self.cents, frequency
        )
    }
}
