//! # Worker Thread Module
//!
//! Runs a [`PitchEngine`] on a dedicated thread driven by a [`FrameTicker`].
//!
//! ## Communication
//! - Commands in: stream changes, over an unbounded channel
//! - Events out: every emitted [`PitchState`] and session failures
//! - Shutdown: the cancel token stops the ticker, the thread ends its session
//!   and is joined before [`TunerWorker::shutdown`] returns
//!
//! Capture contexts are built on the worker thread itself, since backend
//! streams are not always `Send`.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::PitchState;
use crate::audio::AudioStream;
use crate::config::TunerConfig;
use crate::engine::PitchEngine;
use crate::error::Result;
use crate::scheduler::{CancelToken, FRAME_INTERVAL, FrameTicker, TickSource};

/// What the worker reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    State(PitchState),
    /// The stream could not be opened; the engine is idle until a new one is set.
    SessionFailed(String),
}

enum Command {
    SetStream(Option<Box<dyn AudioStream>>),
}

/// Handle to the engine thread.
pub struct TunerWorker {
    commands: Sender<Command>,
    token: CancelToken,
    thread_handle: Option<JoinHandle<()>>,
}

impl TunerWorker {
    /// Starts the worker, opening `stream` right away when given.
    ///
    /// # Arguments
    /// * `config` - Engine settings, validated before the thread starts
    /// * `stream` - Initial input, or `None` to wait for [`set_stream`](Self::set_stream)
    ///
    /// # Returns
    /// The worker handle and the receiving end of its event channel, or
    /// [`TunerError::InvalidConfig`](crate::TunerError::InvalidConfig).
    pub fn spawn(
        config: TunerConfig,
        stream: Option<Box<dyn AudioStream>>,
    ) -> Result<(Self, Receiver<WorkerEvent>)> {
        Self::spawn_with_interval(config, stream, FRAME_INTERVAL)
    }

    /// Like [`spawn`](Self::spawn) with a custom tick interval.
    pub fn spawn_with_interval(
        config: TunerConfig,
        stream: Option<Box<dyn AudioStream>>,
        interval: Duration,
    ) -> Result<(Self, Receiver<WorkerEvent>)> {
        config.validate()?;
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let token = CancelToken::new();
        let ticker = FrameTicker::with_interval(token.clone(), interval);
        let thread_token = token.clone();

        let thread_handle = thread::spawn(move || {
            log::debug!("Tuner worker started");
            run(config, stream, ticker, command_rx, event_tx, thread_token);
            log::debug!("Tuner worker finished");
        });

        let worker = Self {
            commands: command_tx,
            token,
            thread_handle: Some(thread_handle),
        };
        Ok((worker, event_rx))
    }

    /// Replaces the input stream; `None` ends the current session.
    pub fn set_stream(&self, stream: Option<Box<dyn AudioStream>>) {
        if self.commands.send(Command::SetStream(stream)).is_err() {
            log::warn!("Tuner worker is gone; stream change ignored");
        }
    }

    /// Stops ticking, ends the session and waits for the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("Tuner worker panicked");
            }
        }
    }
}

impl Drop for TunerWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    config: TunerConfig,
    stream: Option<Box<dyn AudioStream>>,
    mut ticker: impl TickSource,
    commands: Receiver<Command>,
    events: Sender<WorkerEvent>,
    token: CancelToken,
) {
    let ticket = token.ticket();
    let mut engine = PitchEngine::new(config);
    // Keeps the handle alive as long as its session.
    let mut current = stream;
    open_current(&mut engine, current.as_deref(), &events);

    while let Some(now_ms) = ticker.next_tick() {
        while let Ok(Command::SetStream(stream)) = commands.try_recv() {
            current = stream;
            open_current(&mut engine, current.as_deref(), &events);
        }
        if let Some(state) = engine.tick(now_ms) {
            if !token.is_current(ticket) || events.send(WorkerEvent::State(state)).is_err() {
                break;
            }
        }
    }
    engine.end_session();
}

fn open_current(
    engine: &mut PitchEngine,
    stream: Option<&dyn AudioStream>,
    events: &Sender<WorkerEvent>,
) {
    let was_idle = engine.state().is_idle();
    let opened = engine.set_stream(stream);
    // Teardown resets the engine silently; consumers still show the old note.
    if !was_idle && engine.state().is_idle() {
        let _ = events.send(WorkerEvent::State(PitchState::initial()));
    }
    if let Err(e) = opened {
        let _ = events.send(WorkerEvent::SessionFailed(e.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::SineStream;

    fn wait_for_note(events: &Receiver<WorkerEvent>, note: &str) -> Option<PitchState> {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while let Ok(event) = events.recv_deadline(deadline) {
            if let WorkerEvent::State(state) = event {
                if state.note_with_octave == note {
                    return Some(state);
                }
            }
        }
        None
    }

    fn wait_for_idle(events: &Receiver<WorkerEvent>) -> bool {
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while let Ok(event) = events.recv_deadline(deadline) {
            if event == WorkerEvent::State(PitchState::initial()) {
                return true;
            }
        }
        false
    }

    #[test]
    fn worker_reports_synthetic_tone() {
        let stream = Box::new(SineStream::new(440.0, 0.3));
        let (worker, events) =
            TunerWorker::spawn_with_interval(TunerConfig::default(), Some(stream), Duration::from_millis(5))
                .unwrap();
        let state = wait_for_note(&events, "A4").expect("A4 within deadline");
        assert!(state.cents.abs() < 1.0);
        worker.shutdown();
    }

    #[test]
    fn stream_can_be_replaced() {
        let (worker, events) =
            TunerWorker::spawn_with_interval(TunerConfig::default(), None, Duration::from_millis(5))
                .unwrap();
        worker.set_stream(Some(Box::new(SineStream::new(196.0, 0.3))));
        assert!(wait_for_note(&events, "G3").is_some());
        worker.set_stream(Some(Box::new(SineStream::new(329.63, 0.3))));
        assert!(wait_for_note(&events, "E4").is_some());
        worker.shutdown();
    }

    #[test]
    fn no_events_after_shutdown() {
        let stream = Box::new(SineStream::new(110.0, 0.3));
        let (worker, events) =
            TunerWorker::spawn_with_interval(TunerConfig::default(), Some(stream), Duration::from_millis(5))
                .unwrap();
        assert!(wait_for_note(&events, "A2").is_some());
        worker.shutdown();
        while events.try_recv().is_ok() {}
        std::thread::sleep(Duration::from_millis(50));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn removing_the_stream_publishes_idle() {
        let stream = Box::new(SineStream::new(440.0, 0.3));
        let (worker, events) =
            TunerWorker::spawn_with_interval(TunerConfig::default(), Some(stream), Duration::from_millis(5))
                .unwrap();
        assert!(wait_for_note(&events, "A4").is_some());
        worker.set_stream(None);
        assert!(wait_for_idle(&events), "idle state after the stream was removed");
        worker.shutdown();
    }

    #[test]
    fn replacing_with_a_silent_stream_publishes_idle() {
        let stream = Box::new(SineStream::new(440.0, 0.3));
        let (worker, events) =
            TunerWorker::spawn_with_interval(TunerConfig::default(), Some(stream), Duration::from_millis(5))
                .unwrap();
        assert!(wait_for_note(&events, "A4").is_some());
        worker.set_stream(Some(Box::new(SineStream::new(440.0, 0.0))));
        assert!(wait_for_idle(&events), "idle state after switching to silence");
        worker.shutdown();
    }

    #[test]
    fn failed_reopen_clears_the_note_before_failing() {
        struct Unplugged;

        impl AudioStream for Unplugged {
            fn describe(&self) -> String {
                "unplugged".into()
            }

            fn open(&self, _: &crate::audio::CaptureOptions) -> Result<Box<dyn crate::audio::CaptureContext>> {
                Err(crate::error::TunerError::NoInputDevice(None))
            }
        }

        let stream = Box::new(SineStream::new(440.0, 0.3));
        let (worker, events) =
            TunerWorker::spawn_with_interval(TunerConfig::default(), Some(stream), Duration::from_millis(5))
                .unwrap();
        assert!(wait_for_note(&events, "A4").is_some());
        worker.set_stream(Some(Box::new(Unplugged)));
        assert!(wait_for_idle(&events));
        let next = events.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(next, WorkerEvent::SessionFailed(_)), "{next:?}");
        worker.shutdown();
    }

    #[test]
    fn invalid_config_is_rejected_before_spawning() {
        let config = TunerConfig {
            median_window: 64,
            ..TunerConfig::default()
        };
        assert!(TunerWorker::spawn(config, None).is_err());
    }
}
