//! Fixed-capacity frequency history for the median filter.
//!
//! Backed by an inline array used as a ring, so pushes never allocate.

use crate::config::MAX_MEDIAN_WINDOW;

/// The most recent frequencies, oldest evicted first once full.
#[derive(Debug, Clone)]
pub struct FrequencyHistory {
    slots: [f32; MAX_MEDIAN_WINDOW],
    capacity: usize,
    /// Index of the oldest entry.
    head: usize,
    len: usize,
}

impl FrequencyHistory {
    /// Creates an empty history holding at most `capacity` values
    /// (clamped to `1..=MAX_MEDIAN_WINDOW`).
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: [0.0; MAX_MEDIAN_WINDOW],
            capacity: capacity.clamp(1, MAX_MEDIAN_WINDOW),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Appends a value, evicting the oldest one when full.
    pub fn push(&mut self, value: f32) {
        if self.len < self.capacity {
            let tail = (self.head + self.len) % self.capacity;
            self.slots[tail] = value;
            self.len += 1;
        } else {
            self.slots[self.head] = value;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Values from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.len).map(move |i| self.slots[(self.head + i) % self.capacity])
    }

    /// Median of the stored values; the mean of the two middle values for an
    /// even count. `None` when empty.
    pub fn median(&self) -> Option<f32> {
        if self.len == 0 {
            return None;
        }
        let mut sorted = [0.0f32; MAX_MEDIAN_WINDOW];
        for (dst, value) in sorted.iter_mut().zip(self.iter()) {
            *dst = value;
        }
        let sorted = &mut sorted[..self.len];
        sorted.sort_unstable_by(f32::total_cmp);
        let mid = self.len / 2;
        Some(if self.len % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_when_full() {
        let mut history = FrequencyHistory::new(3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            history.push(v);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.iter().collect::<Vec<_>>(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn length_never_exceeds_capacity() {
        let mut history = FrequencyHistory::new(7);
        for i in 0..100 {
            history.push(i as f32);
            assert!(history.len() <= 7);
        }
        assert_eq!(history.iter().next(), Some(93.0));
    }

    #[test]
    fn median_odd_and_even() {
        let mut history = FrequencyHistory::new(7);
        assert_eq!(history.median(), None);
        history.push(440.0);
        assert_eq!(history.median(), Some(440.0));
        history.push(220.0);
        assert_eq!(history.median(), Some(330.0));
        history.push(880.0);
        assert_eq!(history.median(), Some(440.0));
        history.push(441.0);
        assert_eq!(history.median(), Some(440.5));
    }

    #[test]
    fn median_ignores_single_outlier() {
        let mut history = FrequencyHistory::new(7);
        for v in [110.0, 110.2, 109.9, 220.0, 110.1] {
            history.push(v);
        }
        assert_eq!(history.median(), Some(110.1));
    }

    #[test]
    fn clear_resets() {
        let mut history = FrequencyHistory::new(4);
        history.push(1.0);
        history.push(2.0);
        history.clear();
        assert!(history.is_empty());
        history.push(9.0);
        assert_eq!(history.iter().collect::<Vec<_>>(), vec![9.0]);
    }

    #[test]
    fn capacity_is_clamped() {
        assert_eq!(FrequencyHistory::new(0).capacity(), 1);
        assert_eq!(FrequencyHistory::new(1000).capacity(), MAX_MEDIAN_WINDOW);
    }
}
