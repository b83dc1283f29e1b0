//! # Tick Scheduling Module
//!
//! A cancellable repeating tick source. The engine is driven by whatever
//! yields timestamps here: a display-like ticker on a live worker, or a fixed
//! script in tests.
//!
//! Cancellation is generation based. A source remembers the generation it was
//! created under and stops yielding as soon as its [`CancelToken`] moves on, so
//! a tick that was already scheduled when a session ended never runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

/// Interval of [`FrameTicker`] when none is given, close to a 60 Hz display.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Something that produces tick timestamps in milliseconds.
pub trait TickSource {
    /// Blocks until the next tick. `None` once the source is cancelled or
    /// exhausted.
    fn next_tick(&mut self) -> Option<f64>;
}

/// Generation counter shared between a controller and its tick sources.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    generation: Arc<AtomicU64>,
}

/// The generation a tick source was started under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A ticket valid until the next [`cancel`](Self::cancel).
    pub fn ticket(&self) -> Ticket {
        Ticket(self.generation.load(Ordering::Acquire))
    }

    /// Invalidates every ticket handed out so far.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.generation.load(Ordering::Acquire) == ticket.0
    }
}

/// Fixed-interval ticker reporting milliseconds since it was created.
#[derive(Debug)]
pub struct FrameTicker {
    ticks: Receiver<Instant>,
    start: Instant,
    token: CancelToken,
    ticket: Ticket,
}

impl FrameTicker {
    pub fn new(token: CancelToken) -> Self {
        Self::with_interval(token, FRAME_INTERVAL)
    }

    pub fn with_interval(token: CancelToken, interval: Duration) -> Self {
        let ticket = token.ticket();
        Self {
            ticks: crossbeam_channel::tick(interval),
            start: Instant::now(),
            token,
            ticket,
        }
    }
}

impl TickSource for FrameTicker {
    fn next_tick(&mut self) -> Option<f64> {
        if !self.token.is_current(self.ticket) {
            return None;
        }
        let fired = self.ticks.recv().ok()?;
        // Cancellation may have happened while waiting.
        if !self.token.is_current(self.ticket) {
            return None;
        }
        Some(fired.saturating_duration_since(self.start).as_secs_f64() * 1000.0)
    }
}

/// Replays a fixed list of timestamps.
#[derive(Debug)]
pub struct ScriptedTicks {
    times: std::vec::IntoIter<f64>,
    token: CancelToken,
    ticket: Ticket,
}

impl ScriptedTicks {
    pub fn new(token: CancelToken, times: impl IntoIterator<Item = f64>) -> Self {
        let ticket = token.ticket();
        Self {
            times: times.into_iter().collect::<Vec<_>>().into_iter(),
            token,
            ticket,
        }
    }

    /// `count` ticks spaced `interval_ms` apart, starting at 0.
    pub fn evenly_spaced(token: CancelToken, count: usize, interval_ms: f64) -> Self {
        Self::new(token, (0..count).map(move |i| i as f64 * interval_ms))
    }
}

impl TickSource for ScriptedTicks {
    fn next_tick(&mut self) -> Option<f64> {
        if !self.token.is_current(self.ticket) {
            return None;
        }
        self.times.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_ticks_replay_in_order() {
        let mut ticks = ScriptedTicks::new(CancelToken::new(), [0.0, 16.0, 40.5]);
        assert_eq!(ticks.next_tick(), Some(0.0));
        assert_eq!(ticks.next_tick(), Some(16.0));
        assert_eq!(ticks.next_tick(), Some(40.5));
        assert_eq!(ticks.next_tick(), None);
    }

    #[test]
    fn cancel_stops_pending_ticks() {
        let token = CancelToken::new();
        let mut ticks = ScriptedTicks::evenly_spaced(token.clone(), 10, 40.0);
        assert_eq!(ticks.next_tick(), Some(0.0));
        token.cancel();
        assert_eq!(ticks.next_tick(), None);
        assert_eq!(ticks.next_tick(), None);
    }

    #[test]
    fn new_generation_gets_fresh_tickets() {
        let token = CancelToken::new();
        let old = token.ticket();
        token.cancel();
        let new = token.ticket();
        assert!(!token.is_current(old));
        assert!(token.is_current(new));
        let mut ticks = ScriptedTicks::new(token.clone(), [1.0]);
        assert_eq!(ticks.next_tick(), Some(1.0));
    }

    #[test]
    fn frame_ticker_is_monotonic_and_cancellable() {
        let token = CancelToken::new();
        let mut ticker = FrameTicker::with_interval(token.clone(), Duration::from_millis(2));
        let first = ticker.next_tick().unwrap();
        let second = ticker.next_tick().unwrap();
        assert!(second > first);
        token.cancel();
        assert_eq!(ticker.next_tick(), None);
    }
}
