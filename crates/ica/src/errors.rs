//! Errors raised by the dispatch layer.

use liquid_stake_db::DbError;
use thiserror::Error;

use crate::channel::ChannelError;

/// Errors that can occur while sending packets or handling their outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IcaError {
    /// A single submission carried more messages than one packet may hold.
    #[error("{count} messages exceed the per-tx limit of {max}")]
    ChunkOverflow {
        /// Number of messages submitted.
        count: usize,
        /// The limit.
        max: usize,
    },

    /// A submission carried no messages.
    #[error("cannot submit an empty ica tx for {0}")]
    EmptyTx(String),

    /// The account's channel is not open.
    #[error("channel for {0} is not open")]
    ChannelNotOpen(String),

    /// No channel has ever been registered for the owner.
    #[error("no channel registered for {0}")]
    UnknownChannel(String),

    /// The owner or port string is malformed.
    #[error("invalid ica owner: {0}")]
    InvalidOwner(String),

    /// No ack callback is registered under the id.
    #[error("no ack callback registered under {0}")]
    UnknownCallback(String),

    /// A packet or acknowledgement could not be encoded or decoded.
    #[error("encoding: {0}")]
    Encoding(String),

    /// The channel state machine rejected an event.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The underlying store failed.
    #[error("storage: {0}")]
    Db(#[from] DbError),
}

/// Result alias for dispatch operations that do not involve a host error.
pub type IcaResult<T> = Result<T, IcaError>;
