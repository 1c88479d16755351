//! Errors related to the key-value store.

use std::fmt::{self, Debug};

use thiserror::Error;

/// Distinction between key and value failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureTarget {
    /// Key-related failure.
    Key,
    /// Value-related failure.
    Value,
}

impl fmt::Display for FailureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureTarget::Key => write!(f, "key"),
            FailureTarget::Value => write!(f, "value"),
        }
    }
}

/// Standard error type for the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    /// Something failed to decode. This cannot be programmatically
    /// introspected and should be logged.
    #[error("failed to deserialize {0}: {1}")]
    FailedToDeserialize(FailureTarget, String),

    /// Something failed to encode. This cannot be programmatically
    /// introspected and should be logged.
    #[error("failed to serialize {0}: {1}")]
    FailedToSerialize(FailureTarget, String),

    /// A string key component does not fit the 16-bit length prefix.
    #[error("key component of {0} bytes is too long")]
    KeyTooLong(usize),

    /// A commit or rollback was requested with no transaction open.
    #[error("no open transaction")]
    NoOpenTransaction,
}

impl DbError {
    /// Creates a new `DbError` for a failed key unpacking.
    pub fn failed_to_unpack_key(error: impl Debug) -> Self {
        DbError::FailedToDeserialize(FailureTarget::Key, format!("{error:?}"))
    }

    /// Creates a new `DbError` for a failed value deserialization.
    pub fn failed_to_deserialize_value(error: impl Debug) -> Self {
        DbError::FailedToDeserialize(FailureTarget::Value, format!("{error:?}"))
    }

    /// Creates a new `DbError` for a failed value serialization.
    pub fn failed_to_serialize_value(error: impl Debug) -> Self {
        DbError::FailedToSerialize(FailureTarget::Value, format!("{error:?}"))
    }
}

/// Result alias for storage operations.
pub type DbResult<T> = Result<T, DbError>;
