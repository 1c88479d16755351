//! Errors raised by the record store.

use liquid_stake_db::DbError;
use thiserror::Error;

/// Errors that can occur while reading or writing records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The underlying store failed.
    #[error("storage: {0}")]
    Db(#[from] DbError),

    /// A user redemption record id is not of the form `{zone}.{epoch}.{receiver}`.
    #[error("invalid user redemption record id: {0}")]
    InvalidRedemptionId(String),
}

/// Result alias for record operations.
pub type RecordResult<T> = Result<T, RecordError>;
