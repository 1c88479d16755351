//! Errors raised while parsing or validating primitive types.

use thiserror::Error;

/// Errors that can occur while parsing or operating on a [`Dec`](crate::decimal::Dec).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecError {
    /// The string is not a valid decimal.
    #[error("invalid decimal string: {0}")]
    InvalidString(String),

    /// The string has more fractional digits than the supported precision.
    #[error("too many fractional digits in {0}")]
    TooPrecise(String),

    /// The result does not fit in the decimal representation.
    #[error("decimal overflow")]
    Overflow,

    /// The result would be negative.
    #[error("decimal underflow")]
    Negative,

    /// Division by zero was attempted.
    #[error("division by zero")]
    DivisionByZero,
}

/// Errors that can occur while validating a bech32 address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// The address could not be decoded as bech32.
    #[error("invalid bech32 address {address}: {reason}")]
    Invalid {
        /// The offending address.
        address: String,
        /// Why decoding failed.
        reason: String,
    },

    /// The human readable part does not match the expected prefix.
    #[error("address {address} has prefix {found}, expected {expected}")]
    WrongPrefix {
        /// The offending address.
        address: String,
        /// The prefix that was expected.
        expected: String,
        /// The prefix that was found.
        found: String,
    },

    /// The prefix itself is not a valid human readable part.
    #[error("invalid bech32 prefix: {0}")]
    InvalidPrefix(String),
}

/// Errors that can occur while parsing denominations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DenomError {
    /// The denom is not an IBC hash denom.
    #[error("denom {0} is not an ibc denom")]
    NotIbcDenom(String),

    /// The denom trace path is not a single hop over the transfer port.
    #[error("denom path {0} is not a single transfer hop")]
    InvalidPath(String),

    /// The denom is not formatted as `{validator}/{record_id}`.
    #[error("lsm denom {0} is not of the format {{validator}}/{{record-id}}")]
    InvalidLsmDenom(String),
}
