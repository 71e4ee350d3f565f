use crate::errors::InsufficientDataError;
use core::fmt::{Display, Formatter};
#[cfg(feature = "serde_support")]
use serde::{Deserialize, Serialize};

/// Arithmetic mean, `None` on an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (one delta degree of freedom), `None` under two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct Summary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl Summary {
    pub fn of(what: &str, values: &[f64]) -> Result<Self, InsufficientDataError> {
        let insufficient = || InsufficientDataError::new(what, values.len(), 2);
        let mean = mean(values).ok_or_else(insufficient)?;
        let std_dev = sample_std_dev(values).ok_or_else(insufficient)?;
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &v| {
                (min.min(v), max.max(v))
            });
        Ok(Self {
            count: values.len(),
            min,
            max,
            mean,
            std_dev,
        })
    }

    /// `mean + sigmas * std_dev`
    pub fn upper(&self, sigmas: f64) -> f64 {
        self.mean + sigmas * self.std_dev
    }

    /// `mean - sigmas * std_dev`
    pub fn lower(&self, sigmas: f64) -> f64 {
        self.mean - sigmas * self.std_dev
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Min: {:6}, Max: {:6}, Mean: {:8.2}, Std: {:8.2}",
            self.min, self.max, self.mean, self.std_dev
        )
    }
}

/// Latency cut-offs derived from the timing dataset.
///
/// `ram_ceiling` is computed on the unfiltered samples, every other bound on the samples
/// that survived the ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde_support", derive(Serialize, Deserialize))]
pub struct LatencyBounds {
    pub l2_upper: f64,
    pub l3_lower: f64,
    pub l3_upper: f64,
    pub ram_ceiling: f64,
    /// Number of standard deviations used for `l3_upper`.
    pub l3_upper_sigmas: f64,
}

impl Display for LatencyBounds {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "L2 upper: {:.2}, L3: [{:.2}, {:.2}] ({} sigma), RAM ceiling: {:.2}",
            self.l2_upper, self.l3_lower, self.l3_upper, self.l3_upper_sigmas, self.ram_ceiling
        )
    }
}
