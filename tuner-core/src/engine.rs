//! # Pitch Engine Module
//!
//! Owns at most one capture session and runs the full pipeline once per tick:
//! read the latest window, detect a candidate, stabilize it, publish the
//! resulting [`PitchState`].
//!
//! ## Lifecycle
//! - `start_session` tears down whatever was running, then opens the new
//!   stream. A failure is returned to the caller with the engine quiescent.
//! - `end_session` is idempotent and never fails; teardown errors are logged.
//! - Dropping the engine ends its session.

use crate::PitchState;
use crate::audio::{AudioStream, CaptureContext, CaptureOptions};
use crate::config::TunerConfig;
use crate::error::Result;
use crate::pitch::{PitchDetector, frame_rms};
use crate::stabilizer::{Stabilizer, TickOutcome, TickReport};

struct Session {
    context: Box<dyn CaptureContext>,
    description: String,
}

pub struct PitchEngine {
    config: TunerConfig,
    detector: PitchDetector,
    stabilizer: Stabilizer,
    session: Option<Session>,
    frame: Vec<f32>,
    state: PitchState,
}

impl std::fmt::Debug for PitchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PitchEngine")
            .field("session", &self.session.as_ref().map(|s| &s.description))
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl PitchEngine {
    /// Builds an engine from a configuration the caller has already checked
    /// with [`TunerConfig::validate`]. Out-of-range values are clamped, not
    /// reported; use [`try_new`](Self::try_new) for unchecked input.
    pub fn new(config: TunerConfig) -> Self {
        Self {
            detector: PitchDetector::new(&config),
            stabilizer: Stabilizer::new(config.clone()),
            session: None,
            frame: vec![0.0; config.window_size],
            state: PitchState::initial(),
            config,
        }
    }

    /// Validates `config`, then builds the engine.
    pub fn try_new(config: TunerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    /// The most recently published state.
    pub fn state(&self) -> &PitchState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Follows the host's stream handle: a present stream (re)starts the
    /// session, an absent one ends it.
    pub fn set_stream(&mut self, stream: Option<&dyn AudioStream>) -> Result<()> {
        match stream {
            Some(stream) => self.start_session(stream),
            None => {
                self.end_session();
                Ok(())
            }
        }
    }

    /// Opens `stream`, replacing any running session.
    ///
    /// # Arguments
    /// * `stream` - Input to capture from; opened with this engine's window size and filters
    ///
    /// # Returns
    /// `Ok(())` once the capture context is live. On error the previous
    /// session is already gone and the state is back to [`PitchState::initial`].
    pub fn start_session(&mut self, stream: &dyn AudioStream) -> Result<()> {
        self.end_session();
        let description = stream.describe();
        let options = CaptureOptions::from(&self.config);
        match stream.open(&options) {
            Ok(context) => {
                log::info!(
                    "Capture session started on {description} at {} Hz",
                    context.sample_rate()
                );
                self.session = Some(Session {
                    context,
                    description,
                });
                Ok(())
            }
            Err(e) => {
                log::warn!("Could not start capture on {description}: {e}");
                Err(e)
            }
        }
    }

    /// Releases the session, if any, and returns to the initial state.
    pub fn end_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.context.disconnect() {
                log::warn!("Ignoring error while disconnecting {}: {e}", session.description);
            }
            if !session.context.is_closed() {
                if let Err(e) = session.context.close() {
                    log::warn!("Ignoring error while closing {}: {e}", session.description);
                }
            }
            log::info!("Capture session on {} ended", session.description);
        }
        self.stabilizer.reset();
        self.state = PitchState::initial();
    }

    /// Runs one tick at `now_ms`.
    ///
    /// Returns the new state when it changed materially. Without a session, or
    /// when the tick is throttled, nothing is read and `None` is returned.
    pub fn tick(&mut self, now_ms: f64) -> Option<PitchState> {
        let session = self.session.as_mut()?;
        if !self.stabilizer.admit(now_ms) {
            return None;
        }
        let sample_rate = session.context.sample_rate();
        session.context.read_time_domain(&mut self.frame);
        let report = run_pipeline(
            &mut self.detector,
            &mut self.stabilizer,
            now_ms,
            &self.frame,
            sample_rate,
        );
        self.publish(report)
    }

    /// Runs the pipeline on a caller-supplied frame, subject to the same
    /// detection-rate throttle as [`tick`](Self::tick).
    pub fn process_frame(&mut self, now_ms: f64, frame: &[f32], sample_rate: u32) -> TickReport {
        if !self.stabilizer.admit(now_ms) {
            return TickReport {
                outcome: TickOutcome::Throttled,
                emitted: None,
            };
        }
        let report = run_pipeline(&mut self.detector, &mut self.stabilizer, now_ms, frame, sample_rate);
        self.publish(report.clone());
        report
    }

    fn publish(&mut self, report: TickReport) -> Option<PitchState> {
        let emitted = report.emitted?;
        self.state = emitted.clone();
        Some(emitted)
    }
}

impl Drop for PitchEngine {
    fn drop(&mut self) {
        self.end_session();
    }
}

fn run_pipeline(
    detector: &mut PitchDetector,
    stabilizer: &mut Stabilizer,
    now_ms: f64,
    frame: &[f32],
    sample_rate: u32,
) -> TickReport {
    let rms = frame_rms(frame);
    let candidate = detector.detect(frame, sample_rate);
    let report = stabilizer.update(now_ms, candidate, rms);
    log::trace!(
        "tick {now_ms:.1} ms: rms {rms:.4}, candidate {candidate:?} -> {:?}",
        report.outcome
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TunerError;
    use crate::synth::{SineStream, sine_wave};

    struct Unplugged;

    impl AudioStream for Unplugged {
        fn describe(&self) -> String {
            "unplugged".to_string()
        }

        fn open(&self, _: &CaptureOptions) -> Result<Box<dyn CaptureContext>> {
            Err(TunerError::NoInputDevice(None))
        }
    }

    #[test]
    fn tick_without_session_does_nothing() {
        let mut engine = PitchEngine::new(TunerConfig::default());
        assert!(!engine.is_active());
        assert_eq!(engine.tick(0.0), None);
        assert_eq!(engine.state(), &PitchState::initial());
    }

    #[test]
    fn failed_start_leaves_engine_quiescent() {
        let mut engine = PitchEngine::new(TunerConfig::default());
        engine.start_session(&SineStream::new(440.0, 0.3)).unwrap();
        let err = engine.start_session(&Unplugged).unwrap_err();
        assert!(matches!(err, TunerError::NoInputDevice(None)));
        assert!(!engine.is_active());
        assert_eq!(engine.state(), &PitchState::initial());
    }

    #[test]
    fn try_new_rejects_unchecked_config() {
        let config = TunerConfig {
            median_window: 64,
            ..TunerConfig::default()
        };
        let err = PitchEngine::try_new(config).unwrap_err();
        assert!(matches!(err, TunerError::InvalidConfig { name: "median_window", .. }));
        assert!(PitchEngine::try_new(TunerConfig::default()).is_ok());
    }

    #[test]
    fn set_stream_none_ends_session() {
        let mut engine = PitchEngine::new(TunerConfig::default());
        let stream = SineStream::new(440.0, 0.3);
        engine.set_stream(Some(&stream)).unwrap();
        assert!(engine.is_active());
        engine.set_stream(None).unwrap();
        assert!(!engine.is_active());
    }

    #[test]
    fn throttled_ticks_emit_nothing() {
        let mut engine = PitchEngine::new(TunerConfig::default());
        engine.start_session(&SineStream::new(440.0, 0.3)).unwrap();
        assert!(engine.tick(0.0).is_some());
        assert_eq!(engine.tick(16.0), None);
        assert_eq!(engine.tick(32.0), None);
    }

    #[test]
    fn process_frame_tracks_offline_audio() {
        let mut engine = PitchEngine::new(TunerConfig::default());
        let frame = sine_wave(196.0, 44100, 4096, 0.3);
        let mut last = None;
        for i in 0..8 {
            let report = engine.process_frame(i as f64 * 40.0, &frame, 44100);
            assert_eq!(report.outcome, TickOutcome::Tracked);
            if report.emitted.is_some() {
                last = report.emitted;
            }
        }
        let state = last.unwrap();
        assert_eq!(state.note_with_octave, "G3");
        assert_eq!(engine.state(), &state);

        let report = engine.process_frame(8.0 * 40.0 + 1.0, &frame, 44100);
        assert_eq!(report.outcome, TickOutcome::Throttled);
    }
}
