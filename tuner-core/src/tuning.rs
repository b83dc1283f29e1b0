//! # Musical Tuning Module
//!
//! Maps frequencies onto the twelve-tone equal-tempered scale (A4 = 440 Hz)
//! and measures deviations in cents. Everything here is pure and fails soft:
//! invalid input yields the placeholder note or zero cents, never an error.

pub use crate::config::IN_TUNE_CENTS_THRESHOLD;

/// Reference pitch of A4 in Hz.
pub const A4_HZ: f32 = 440.0;

/// Pitch-class labels in chromatic order starting at C, using sharps.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Label shown when no note is sounding.
pub const PLACEHOLDER_NAME: &str = "—";

/// Position of A within [`NOTE_NAMES`].
const A4_INDEX: i32 = 9;

/// A musical note derived from a frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    /// Pitch-class label (e.g. "A#"), or [`PLACEHOLDER_NAME`].
    pub name: &'static str,
    /// Scientific octave number; C4 is middle C.
    pub octave: i32,
    /// Equal-tempered frequency of the note in Hz.
    pub reference_hz: f32,
    /// Signed distance from A4 in semitones.
    pub semitones_from_a4: i32,
}

impl Note {
    /// The "no note" value returned for unusable frequencies.
    pub const PLACEHOLDER: Note = Note {
        name: PLACEHOLDER_NAME,
        octave: 4,
        reference_hz: A4_HZ,
        semitones_from_a4: 0,
    };

    pub fn is_placeholder(&self) -> bool {
        self.name == PLACEHOLDER_NAME
    }

    /// Name and octave, e.g. "A#4". The placeholder renders without an octave.
    pub fn with_octave(&self) -> String {
        note_with_octave(self.name, self.octave)
    }
}

/// Formats a note label with its octave, leaving the placeholder bare.
pub fn note_with_octave(name: &str, octave: i32) -> String {
    if name == PLACEHOLDER_NAME {
        PLACEHOLDER_NAME.to_string()
    } else {
        format!("{name}{octave}")
    }
}

/// True for frequencies that cannot be mapped to a note.
pub fn is_invalid_frequency(freq: f32) -> bool {
    !freq.is_finite() || freq <= 0.0
}

/// Finds the equal-tempered note nearest to `freq`.
///
/// # Arguments
/// * `freq` - Frequency in Hz
///
/// # Returns
/// The nearest [`Note`] with its reference frequency, or
/// [`Note::PLACEHOLDER`] for non-finite or non-positive input.
///
/// # Examples
/// ```
/// use tuner_core::tuning::frequency_to_note;
/// let note = frequency_to_note(82.41);
/// assert_eq!((note.name, note.octave), ("E", 2));
/// ```
pub fn frequency_to_note(freq: f32) -> Note {
    if is_invalid_frequency(freq) {
        return Note::PLACEHOLDER;
    }
    let semitones = 12.0 * (freq / A4_HZ).log2();
    let rounded = semitones.round() as i32;
    let note_index = (A4_INDEX + rounded).rem_euclid(12) as usize;
    let octave = 4 + (A4_INDEX + rounded).div_euclid(12);
    let reference_hz = A4_HZ * 2.0_f32.powf(rounded as f32 / 12.0);
    Note {
        name: NOTE_NAMES[note_index],
        octave,
        reference_hz,
        semitones_from_a4: rounded,
    }
}

/// True when a cents deviation cannot be computed for this pair.
pub fn cannot_compute_cents(freq: f32, reference_hz: f32) -> bool {
    !freq.is_finite() || !reference_hz.is_finite() || reference_hz <= 0.0 || freq <= 0.0
}

/// Calculates the deviation of `freq` from `reference_hz` in cents.
///
/// # Arguments
/// * `freq` - Measured frequency in Hz
/// * `reference_hz` - Target note frequency in Hz
///
/// # Returns
/// `1200 * log2(freq / reference_hz)`: positive when sharp, negative when
/// flat, 100 per semitone. 0 when either input is non-finite or non-positive.
pub fn cents_deviation(freq: f32, reference_hz: f32) -> f32 {
    if cannot_compute_cents(freq, reference_hz) {
        return 0.0;
    }
    1200.0 * (freq / reference_hz).log2()
}

/// Classifies a deviation against the default in-tune threshold.
pub fn is_in_tune(cents: f32) -> bool {
    cents.abs() < IN_TUNE_CENTS_THRESHOLD
}
