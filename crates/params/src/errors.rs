//! Errors for the protocol parameters.

use thiserror::Error;

/// Error while validating a set of [`Params`](crate::Params).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamsError {
    /// An interval or size parameter must be strictly positive.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// A percentage parameter exceeds 100.
    #[error("{name} must be at most 100 percent, got {value}")]
    PercentTooLarge {
        /// The name of the parameter.
        name: &'static str,
        /// The configured value.
        value: u64,
    },

    /// The redemption rate thresholds are not nested around `1.0`.
    #[error("redemption rate thresholds must satisfy min <= inner min < 100 <= inner max <= max")]
    InvalidThresholds,
}
