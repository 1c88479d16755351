//! Errors raised by the remote query layer.

use liquid_stake_db::DbError;
use thiserror::Error;

/// Errors that can occur while submitting or resolving a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// A query field failed validation.
    #[error("invalid query: {0}")]
    Validation(String),

    /// No callback is registered under the given module and id.
    #[error("no query callback {callback_id} registered for module {module}")]
    UnknownCallback {
        /// The module that was asked for.
        module: String,
        /// The callback id that was asked for.
        callback_id: String,
    },

    /// The underlying store failed.
    #[error("storage: {0}")]
    Db(#[from] DbError),
}

/// Result alias for query operations that do not involve a host error.
pub type QueryResult<T> = Result<T, QueryError>;
