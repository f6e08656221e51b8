//! Bounded reading history and on-demand analytics.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::sensing::SensorReading;

pub const DEFAULT_HISTORY_CAPACITY: usize = 600;

/// FIFO ring buffer; the oldest sample is evicted once full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingHistory {
    capacity: usize,
    samples: VecDeque<SensorReading>,
}

impl Default for ReadingHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ReadingHistory {
    /// Capacity is at least 1.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, reading: SensorReading) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(reading);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&SensorReading> {
        self.samples.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &SensorReading> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Recomputed from the buffer on every call.
    pub fn analytics(&self) -> Analytics {
        Analytics::from_values(self.samples.iter().map(|r| r.value))
    }
}

/// Summary statistics over a history window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub count: usize,
    pub mean: f32,
    pub min: f32,
    pub max: f32,
    /// Population standard deviation.
    pub std_dev: f32,
}

impl Analytics {
    /// All zero for an empty input.
    pub fn from_values(values: impl Iterator<Item = f32> + Clone) -> Self {
        let mut count = 0usize;
        let mut sum = 0.0f64;
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for v in values.clone() {
            count += 1;
            sum += v as f64;
            min = min.min(v);
            max = max.max(v);
        }
        if count == 0 {
            return Self::default();
        }
        let mean = sum / count as f64;
        let variance = values
            .map(|v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / count as f64;
        Self {
            count,
            mean: mean as f32,
            min,
            max,
            std_dev: variance.sqrt() as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(value: f32, t: f64) -> SensorReading {
        SensorReading {
            raw: value,
            value,
            timestamp: t,
        }
    }

    #[test]
    fn test_evicts_oldest() {
        let mut h = ReadingHistory::with_capacity(3);
        for i in 0..5 {
            h.push(reading(i as f32, i as f64));
        }
        assert_eq!(h.len(), 3);
        let values: Vec<f32> = h.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert_eq!(h.latest().map(|r| r.value), Some(4.0));
    }

    #[test]
    fn test_default_capacity_bound() {
        let mut h = ReadingHistory::default();
        for i in 0..1000 {
            h.push(reading(1.0, i as f64));
        }
        assert_eq!(h.len(), DEFAULT_HISTORY_CAPACITY);
    }

    #[test]
    fn test_analytics() {
        let mut h = ReadingHistory::default();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            h.push(reading(v, 0.0));
        }
        let a = h.analytics();
        assert_eq!(a.count, 8);
        assert!((a.mean - 5.0).abs() < 1e-5);
        assert!((a.std_dev - 2.0).abs() < 1e-5);
        assert_eq!(a.min, 2.0);
        assert_eq!(a.max, 9.0);
    }

    #[test]
    fn test_empty_analytics() {
        let a = ReadingHistory::default().analytics();
        assert_eq!(a, Analytics::default());
    }

    #[test]
    fn test_zero_capacity_becomes_one() {
        let mut h = ReadingHistory::with_capacity(0);
        h.push(reading(1.0, 0.0));
        h.push(reading(2.0, 1.0));
        assert_eq!(h.len(), 1);
    }
}
