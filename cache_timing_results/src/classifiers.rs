/**
 * Classification of a latency against a pair of bounds.
 *
 * Bounds are inclusive : a value equal to either bound is inside the band.
 * `Below` and `Above` are the two outer bands, e.g. for the L3 checker, `Below` means the
 * access was served by a closer cache and `Above` means it went to memory.
 */
use crate::errors::ConfigurationError;
use crate::statistics::LatencyBounds;
use core::fmt::{Display, Formatter};
#[cfg(feature = "serde_support")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub enum Band {
    Below,
    Within,
    Above,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct BoundaryClassifier {
    lower_bound: f64,
    upper_bound: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct BandCounts {
    pub below: usize,
    pub within: usize,
    pub above: usize,
}

impl BoundaryClassifier {
    pub fn new(lower_bound: f64, upper_bound: f64) -> Result<Self, ConfigurationError> {
        if lower_bound.is_nan() || upper_bound.is_nan() {
            return Err(ConfigurationError::NanBound {
                lower: lower_bound,
                upper: upper_bound,
            });
        }
        if lower_bound > upper_bound {
            return Err(ConfigurationError::InvertedBounds {
                lower: lower_bound,
                upper: upper_bound,
            });
        }
        Ok(Self {
            lower_bound,
            upper_bound,
        })
    }

    /// The L3 hit checker : between the L3 lower and upper bounds.
    pub fn from_l3_bounds(bounds: &LatencyBounds) -> Result<Self, ConfigurationError> {
        Self::new(bounds.l3_lower, bounds.l3_upper)
    }

    pub fn classify(&self, value: f64) -> Band {
        if value < self.lower_bound {
            Band::Below
        } else if value <= self.upper_bound {
            Band::Within
        } else {
            Band::Above
        }
    }

    pub fn count(&self, values: impl IntoIterator<Item = f64>) -> BandCounts {
        let mut counts = BandCounts::default();
        for value in values {
            counts.add(self.classify(value));
        }
        counts
    }
}

impl BandCounts {
    pub fn add(&mut self, band: Band) {
        match band {
            Band::Below => self.below += 1,
            Band::Within => self.within += 1,
            Band::Above => self.above += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.below + self.within + self.above
    }
}

impl Display for Band {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Band::Below => write!(f, "below"),
            Band::Within => write!(f, "within"),
            Band::Above => write!(f, "above"),
        }
    }
}

impl Display for BoundaryClassifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{:.2}, {:.2}]", self.lower_bound, self.upper_bound)
    }
}

impl Display for BandCounts {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "below: {}, within: {}, above: {}",
            self.below, self.within, self.above
        )
    }
}
