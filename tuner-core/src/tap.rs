//! Analysis tap: the latest window of (optionally filtered) input samples.
//!
//! Capture callbacks deliver audio in arbitrary chunk sizes; the tap keeps a
//! ring of the most recent `window_size` samples and hands out a time-ordered
//! copy once per tick, zero-filled until enough audio has arrived.

use crate::filters::FilterChain;

#[derive(Debug, Clone)]
pub struct AnalysisTap {
    ring: Vec<f32>,
    /// Next write position (also the oldest sample once full).
    write_pos: usize,
    filled: usize,
    filters: Option<FilterChain>,
    scratch: Vec<f32>,
}

impl AnalysisTap {
    pub fn new(window_size: usize, filters: Option<FilterChain>) -> Self {
        Self {
            ring: vec![0.0; window_size.max(1)],
            write_pos: 0,
            filled: 0,
            filters,
            scratch: Vec::new(),
        }
    }

    pub fn window_size(&self) -> usize {
        self.ring.len()
    }

    /// Number of real samples currently held (saturates at the window size).
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Appends samples, filtering them first when a chain is configured.
    pub fn push(&mut self, samples: &[f32]) {
        let input: &[f32] = match self.filters.as_mut() {
            Some(chain) => {
                self.scratch.clear();
                self.scratch.extend_from_slice(samples);
                chain.process(&mut self.scratch);
                &self.scratch
            }
            None => samples,
        };
        let len = self.ring.len();
        // Only the last `len` samples can survive.
        let input = &input[input.len().saturating_sub(len)..];
        for &sample in input {
            self.ring[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % len;
        }
        self.filled = (self.filled + input.len()).min(len);
    }

    /// Copies the window, oldest sample first, into `out`.
    ///
    /// `out` shorter than the window receives the newest samples; longer
    /// output is zero-padded at the front.
    pub fn copy_window(&self, out: &mut [f32]) {
        let len = self.ring.len();
        let n = out.len().min(len);
        let pad = out.len() - n;
        out[..pad].fill(0.0);
        // Newest sample sits just before write_pos.
        let start = (self.write_pos + len - n) % len;
        for (i, dst) in out[pad..].iter_mut().enumerate() {
            *dst = self.ring[(start + i) % len];
        }
    }

    pub fn clear(&mut self) {
        self.ring.fill(0.0);
        self.write_pos = 0;
        self.filled = 0;
        if let Some(chain) = self.filters.as_mut() {
            chain.reset();
        }
    }
}
