//! Properties of the temporal stabilization filter.

use proptest::prelude::*;
use tuner_core::history::FrequencyHistory;
use tuner_core::stabilizer::{StabilizationState, Stabilizer, TickOutcome, stabilize};
use tuner_core::{PitchCandidate, PitchState, TunerConfig};

const LOUD: f32 = 0.2;
const TICK: f64 = 40.0;

fn heard(freq: f32, confidence: f32) -> PitchCandidate {
    PitchCandidate {
        frequency: Some(freq),
        confidence,
    }
}

fn settled_on(freq: f32) -> Stabilizer {
    let mut stabilizer = Stabilizer::new(TunerConfig::default());
    for i in 0..10 {
        stabilizer.step(i as f64 * TICK, heard(freq, 0.95), LOUD);
    }
    stabilizer
}

proptest! {
    #[test]
    fn unconfident_jump_leaves_smoothing_alone(
        p in 80.0f32..900.0,
        jump in prop_oneof![0.06f32..1.0, -0.5f32..-0.06],
        confidence in 0.7f32..0.85,
    ) {
        let config = TunerConfig::default();
        let target = p * (1.0 + jump);
        prop_assume!((70.0..=1000.0).contains(&target));
        let candidate = heard(target, confidence);

        // Settled filter: the median absorbs the jump.
        let mut stabilizer = settled_on(p);
        let before = stabilizer.state().smoothed_frequency.unwrap();
        stabilizer.step(10.0 * TICK, candidate, LOUD);
        prop_assert!((stabilizer.state().smoothed_frequency.unwrap() - before).abs() < 1e-3);

        // Fresh history: the jump is rejected outright.
        let mut state = StabilizationState::new(&config);
        state.smoothed_frequency = Some(p);
        let report = stabilize(&mut state, &config, 0.0, candidate, LOUD);
        prop_assert_eq!(report.outcome, TickOutcome::OutlierRejected);
        prop_assert_eq!(state.smoothed_frequency, Some(p));
        prop_assert!(state.history.is_empty());
    }

    #[test]
    fn history_never_exceeds_capacity(
        capacity in 1usize..=32,
        values in proptest::collection::vec(70.0f32..1000.0, 0..100),
    ) {
        let mut history = FrequencyHistory::new(capacity);
        for v in &values {
            history.push(*v);
            prop_assert!(history.len() <= capacity);
        }
        if let Some(median) = history.median() {
            let min = history.iter().fold(f32::INFINITY, f32::min);
            let max = history.iter().fold(f32::NEG_INFINITY, f32::max);
            prop_assert!(median >= min && median <= max);
        }
    }

    #[test]
    fn silence_holds_for_exactly_the_hold_window(gap_ms in 1u32..1000) {
        let gap = gap_ms as f64;
        let mut stabilizer = settled_on(146.83);
        let last_stable = 9.0 * TICK;
        let report = stabilizer.update(last_stable + gap, PitchCandidate::NONE, 0.0);
        if gap <= 220.0 {
            prop_assert_eq!(report.outcome, TickOutcome::Held);
            prop_assert_eq!(stabilizer.state().confirmed_note, "D");
        } else {
            prop_assert_eq!(report.outcome, TickOutcome::Silent);
            prop_assert_eq!(report.emitted, Some(PitchState::initial()));
        }
    }

    #[test]
    fn alternating_neighbours_keep_confirmed_note(ticks in 6usize..40) {
        let config = TunerConfig::default();
        let mut state = StabilizationState::new(&config);
        state.confirmed_note = "E";
        state.confirmed_octave = 2;
        // 84 Hz maps to E2 (+33 cents), 85.5 Hz to F2 (-36 cents).
        for i in 0..ticks {
            let freq = if i % 2 == 0 { 84.0 } else { 85.5 };
            state.history.clear();
            state.smoothed_frequency = Some(freq);
            stabilize(&mut state, &config, i as f64 * TICK, heard(freq, 0.95), LOUD);
            prop_assert_eq!(state.confirmed_note, "E");
        }
    }
}

#[test]
fn streak_of_six_confirms_the_neighbour() {
    let config = TunerConfig::default();
    let mut state = StabilizationState::new(&config);
    state.confirmed_note = "E";
    state.confirmed_octave = 2;
    for i in 0..6 {
        state.history.clear();
        state.smoothed_frequency = Some(85.5);
        stabilize(&mut state, &config, i as f64 * TICK, heard(85.5, 0.95), LOUD);
        if i < 5 {
            assert_eq!(state.confirmed_note, "E", "tick {i}");
        }
    }
    assert_eq!(state.confirmed_note, "F");
    assert_eq!(state.confirmed_octave, 2);
}
