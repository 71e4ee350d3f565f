use core::ops::Index;
#[cfg(feature = "serde_support")]
use serde::{Deserialize, Serialize};
use std::iter::zip;

/// Largest number of buckets a histogram allocates, whatever the requested range.
pub const MAX_BUCKETS: usize = 1 << 16;

/**
 * Histogram of cycle counts.
 *
 * Bucket `i` contains the values in range `[width * i, width * (i + 1) - 1]`, fractional cycle
 * counts are truncated. Values past the last bucket are not recorded.
 */
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct Histogram {
    width: u64,
    data: Vec<u32>,
}

impl Histogram {
    pub fn empty(width: u64, buckets: usize) -> Self {
        assert_ne!(width, 0, "Histogram buckets must have a non zero width");
        Self {
            width,
            data: vec![0; buckets.min(MAX_BUCKETS)],
        }
    }

    /// Histogram covering `[0, max)` with buckets of `width` cycles, truncated to `MAX_BUCKETS`.
    pub fn covering(width: u64, max: f64) -> Self {
        let buckets = if max.is_finite() && max > 0.0 {
            // Saturating cast.
            (max as u64).div_ceil(width).min(MAX_BUCKETS as u64) as usize
        } else {
            0
        };
        Self::empty(width, buckets)
    }

    pub fn from_values(values: impl IntoIterator<Item = f64>, width: u64, max: f64) -> Self {
        let mut histogram = Self::covering(width, max);
        for value in values {
            histogram.record(value);
        }
        histogram
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn bucket(&self, time: u64) -> Option<usize> {
        let r = (time / self.width) as usize;
        if r >= self.data.len() { None } else { Some(r) }
    }

    pub fn get(&self, time: u64) -> Option<&u32> {
        self.bucket(time).map(|index| &self.data[index])
    }

    /// Returns whether the value landed in a bucket.
    pub fn record(&mut self, value: f64) -> bool {
        if value.is_nan() || value < 0.0 {
            return false;
        }
        match self.bucket(value as u64) {
            Some(index) => {
                self.data[index] += 1;
                true
            }
            None => false,
        }
    }

    /// (first time of the bucket, count)
    pub fn iter(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        let buckets = (0..self.data.len() as u64).map(|i| i * self.width);
        zip(buckets, self.data.iter().copied())
    }

    pub fn max_count(&self) -> u32 {
        self.data.iter().copied().max().unwrap_or(0)
    }

    /// Number of recorded values.
    pub fn total(&self) -> u64 {
        self.data.iter().map(|&c| c as u64).sum()
    }
}

impl Index<u64> for Histogram {
    type Output = u32;

    fn index(&self, index: u64) -> &Self::Output {
        self.get(index).expect("Invalid time")
    }
}
