//! Why a channel refused an event.

use thiserror::Error;

use crate::channel::state::ChannelState;

/// A refused channel event. The channel keeps its state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The event does not apply to the channel's state, e.g. an ack with no handshake open.
    #[error("{event} does not apply to a {state} channel: {}", reason.as_deref().unwrap_or("unexpected"))]
    InvalidEvent {
        /// Channel state, rendered.
        state: String,
        /// The event, rendered.
        event: String,
        /// Detail, when there is more to say.
        reason: Option<String>,
    },

    /// The event was already applied. Relayers redeliver, so callers usually ignore this.
    #[error("{event} already applied to {state} channel")]
    Duplicate {
        /// Channel state, rendered.
        state: String,
        /// The event, rendered.
        event: String,
    },

    /// The event names another channel or would reopen a live one.
    #[error("channel {state} refused event: {reason}")]
    Rejected {
        /// Channel state.
        state: ChannelState,
        /// What was wrong with the event.
        reason: String,
    },
}

/// Result of a channel transition.
pub type ChannelResult<T> = Result<T, ChannelError>;
