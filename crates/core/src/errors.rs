//! Errors raised by the liquid staking core.

use std::fmt::Display;

use liquid_stake_db::DbError;
use liquid_stake_ica::IcaError;
use liquid_stake_icq::QueryError;
use liquid_stake_primitives::{
    decimal::Dec,
    errors::{AddressError, DecError, DenomError},
    types::Amount,
};
use liquid_stake_records::RecordError;
use thiserror::Error;

/// Errors that can occur while handling a message, a callback or a scheduler step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StakeError {
    /// The inputs are invalid. State is unchanged.
    #[error("validation: {0}")]
    Validation(String),

    /// The zone is halted and refuses user operations.
    #[error("host zone {0} is halted")]
    ZoneHalted(String),

    /// A zone, validator, record or epoch does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// What was looked up.
        kind: &'static str,
        /// The key it was looked up by.
        id: String,
    },

    /// The sender may not run admin operations.
    #[error("{0} is not an admin")]
    Unauthorized(String),

    /// An account does not hold enough of a denom.
    #[error("{address} holds {available}{denom}, needs {needed}{denom}")]
    InsufficientFunds {
        /// The account.
        address: String,
        /// The denom.
        denom: String,
        /// Amount needed.
        needed: Amount,
        /// Amount held.
        available: Amount,
    },

    /// A detected slash is larger than the configured cap.
    #[error("slash of {slash} on {validator} exceeds the cap")]
    SlashExceedsCap {
        /// Operator address of the slashed validator.
        validator: String,
        /// The slash as a fraction of the validator's delegation.
        slash: Dec,
    },

    /// A callback argument or remote result could not be decoded.
    #[error("encoding: {0}")]
    Encoding(String),

    /// Decimal arithmetic failed.
    #[error(transparent)]
    Decimal(#[from] DecError),

    /// An address is malformed.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// A denom is malformed.
    #[error(transparent)]
    Denom(#[from] DenomError),

    /// The store failed.
    #[error("storage: {0}")]
    Db(#[from] DbError),

    /// The record store failed.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// The query layer failed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The dispatch layer failed.
    #[error(transparent)]
    Ica(#[from] IcaError),
}

impl StakeError {
    /// Shorthand for [`StakeError::Validation`].
    pub fn validation(reason: impl Display) -> Self {
        Self::Validation(reason.to_string())
    }

    /// Shorthand for [`StakeError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Result alias for the core.
pub type StakeResult<T> = Result<T, StakeError>;
