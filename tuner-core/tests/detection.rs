//! Pitch recovery on synthetic signals through the full detector.

use proptest::prelude::*;
use tuner_core::TunerConfig;
use tuner_core::pitch::PitchDetector;
use tuner_core::synth::{SineOscillator, sine_wave};

const SR: u32 = 44100;
const FRAME: usize = 4096;

fn phased_sine(freq: f32, amplitude: f32, phase: f64) -> Vec<f32> {
    let mut oscillator = SineOscillator::with_phase(freq, SR, amplitude, phase);
    let mut frame = vec![0.0; FRAME];
    oscillator.fill(&mut frame);
    frame
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn pure_sines_are_recovered(
        freq in 80.0f32..=900.0,
        amplitude in 0.05f32..1.0,
        phase in 0.0f64..std::f64::consts::TAU,
    ) {
        let mut detector = PitchDetector::new(&TunerConfig::default());
        let candidate = detector.detect(&phased_sine(freq, amplitude, phase), SR);
        let detected = candidate.frequency.unwrap();
        prop_assert!((detected - freq).abs() / freq < 0.01, "{} Hz detected as {}", freq, detected);
        prop_assert!(candidate.confidence >= 0.9, "{} Hz confidence {}", freq, candidate.confidence);
    }
}

#[test]
fn guitar_strings_with_overtones() {
    let mut detector = PitchDetector::new(&TunerConfig::default());
    for f0 in [82.41f32, 110.0, 146.83, 196.0, 246.94, 329.63] {
        let frame: Vec<f32> = (0..FRAME)
            .map(|i| {
                (1..8)
                    .map(|k| {
                        let t = i as f32 / SR as f32;
                        (2.0 * std::f32::consts::PI * k as f32 * f0 * t + k as f32).sin() / k as f32
                    })
                    .sum::<f32>()
                    * 0.2
            })
            .collect();
        let detected = detector.detect(&frame, SR).frequency.unwrap();
        assert!((detected - f0).abs() / f0 < 0.01, "{f0} Hz detected as {detected}");
    }
}

#[test]
fn weak_fundamental_under_strong_octave() {
    let mut detector = PitchDetector::new(&TunerConfig::default());
    for f0 in [90.0f32, 150.0] {
        let fundamental = sine_wave(f0, SR, FRAME, 0.1);
        let octave = sine_wave(2.0 * f0, SR, FRAME, 1.0);
        let frame: Vec<f32> = fundamental.iter().zip(&octave).map(|(a, b)| a + b).collect();
        let detected = detector.detect(&frame, SR).frequency.unwrap();
        assert!((detected - f0).abs() / f0 < 0.01, "{f0} Hz detected as {detected}");
    }
}

#[test]
fn other_sample_rates() {
    let mut detector = PitchDetector::new(&TunerConfig::default());
    for sr in [22050u32, 48000, 96000] {
        let frame = sine_wave(440.0, sr, FRAME, 0.3);
        let detected = detector.detect(&frame, sr).frequency.unwrap();
        assert!((detected - 440.0).abs() < 2.0, "{sr} Hz: {detected}");
    }
}
