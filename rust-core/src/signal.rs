//! Rolling magnitude windows for the raw sensor streams.
//!
//! Both the accelerometer and the gyroscope stream are reduced to a scalar
//! magnitude per event and kept in a fixed-capacity window. The oldest sample
//! is evicted once the window is full, so memory stays constant no matter how
//! long detection runs.
//!
//! Statistics are computed in f64 over the f32 samples. The windows are tiny
//! (30 samples by default) and the classifier compares against inclusive
//! bounds, so the extra precision keeps exact boundary inputs exact.

use std::collections::VecDeque;

use crate::types::{magnitude, Vec3};

/// Default number of samples kept per stream.
pub const DEFAULT_HISTORY_CAPACITY: usize = 30;

/// Fixed-capacity FIFO window of scalar sensor magnitudes.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SampleBuffer {
    /// Create an empty buffer holding at most `capacity` samples.
    ///
    /// Panics if `capacity` is zero; capacities come from validated
    /// configuration, so a zero here is a programming error.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "sample buffer capacity must be at least 1");
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a raw magnitude, evicting the oldest one when full.
    pub fn push(&mut self, value: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Reduce a three-axis vector to its magnitude and push it.
    ///
    /// Returns the pushed magnitude, or `None` when the vector was not finite
    /// and therefore dropped.
    pub fn push_vector(&mut self, v: Vec3) -> Option<f32> {
        let mag = magnitude(v);
        if !mag.is_finite() {
            return None;
        }
        self.push(mag);
        Some(mag)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<f32> {
        self.samples.back().copied()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Arithmetic mean, `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|&x| x as f64).sum();
        Some(sum / self.samples.len() as f64)
    }

    /// Population variance (mean of squared deviations), `None` when empty.
    pub fn variance(&self) -> Option<f64> {
        let mean = self.mean()?;
        let n = self.samples.len() as f64;
        let sum_sq: f64 = self
            .samples
            .iter()
            .map(|&x| {
                let d = x as f64 - mean;
                d * d
            })
            .sum();
        Some(sum_sq / n)
    }

    /// Population standard deviation, `None` when empty.
    pub fn std_dev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl Extend<f32> for SampleBuffer {
    fn extend<I: IntoIterator<Item = f32>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_evicts_oldest() {
        let mut buffer = SampleBuffer::new(3);
        buffer.extend([1.0, 2.0, 3.0]);
        assert!(buffer.is_full());

        buffer.push(4.0);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.iter().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
        assert_eq!(buffer.latest(), Some(4.0));
    }

    #[test]
    fn test_default_capacity() {
        let mut buffer = SampleBuffer::default();
        assert_eq!(buffer.capacity(), DEFAULT_HISTORY_CAPACITY);

        buffer.extend((0..100).map(|i| i as f32));
        assert_eq!(buffer.len(), DEFAULT_HISTORY_CAPACITY);
        assert_eq!(buffer.iter().next(), Some(70.0));
    }

    #[test]
    fn test_push_vector_uses_magnitude() {
        let mut buffer = SampleBuffer::new(4);
        assert_eq!(buffer.push_vector([3.0, 4.0, 0.0]), Some(5.0));
        assert_eq!(buffer.latest(), Some(5.0));
    }

    #[test]
    fn test_push_vector_drops_non_finite() {
        let mut buffer = SampleBuffer::new(4);
        assert_eq!(buffer.push_vector([f32::NAN, 0.0, 9.8]), None);
        assert_eq!(buffer.push_vector([f32::INFINITY, 0.0, 0.0]), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_statistics() {
        let mut buffer = SampleBuffer::new(8);
        assert_eq!(buffer.mean(), None);
        assert_eq!(buffer.std_dev(), None);

        buffer.extend([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(buffer.mean(), Some(5.0));
        assert_eq!(buffer.variance(), Some(4.0));
        assert_eq!(buffer.std_dev(), Some(2.0));
    }

    #[test]
    fn test_constant_signal_has_zero_spread() {
        let mut buffer = SampleBuffer::new(10);
        buffer.extend(std::iter::repeat(9.81).take(10));
        assert!(buffer.std_dev().unwrap() < 1e-9);
    }

    #[test]
    fn test_clear() {
        let mut buffer = SampleBuffer::new(2);
        buffer.extend([1.0, 2.0]);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 2);
    }

    #[test]
    #[should_panic(expected = "capacity")]
    fn test_zero_capacity_is_a_contract_violation() {
        let _ = SampleBuffer::new(0);
    }
}
