use thiserror::Error;

/// A mean or a standard deviation was requested over too few values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("insufficient data for {what}: got {got} value(s), need at least {needed}")]
pub struct InsufficientDataError {
    pub what: String,
    pub got: usize,
    pub needed: usize,
}

impl InsufficientDataError {
    pub fn new(what: impl Into<String>, got: usize, needed: usize) -> Self {
        Self {
            what: what.into(),
            got,
            needed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("inverted bounds: lower bound {lower} is above upper bound {upper}")]
    InvertedBounds { lower: f64, upper: f64 },
    #[error("bounds must be numbers, got ({lower}, {upper})")]
    NanBound { lower: f64, upper: f64 },
    #[error("invalid value for {option}: {reason}")]
    InvalidOption {
        option: &'static str,
        reason: String,
    },
}
