//! The states of the Channel State Machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The state of an interchain account's channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    /// No usable channel.
    Closed {
        /// The channel that was last open, if any.
        last_channel_id: Option<String>,
    },

    /// A handshake is in progress.
    Opening,

    /// Packets can be sent.
    Open {
        /// The open channel.
        channel_id: String,
        /// The account address on the host.
        address: String,
    },

    /// The host is closing the channel.
    Closing {
        /// The channel being closed.
        channel_id: String,
    },
}

impl ChannelState {
    /// The initial state of a newly registered account.
    pub const fn new() -> Self {
        ChannelState::Closed {
            last_channel_id: None,
        }
    }

    /// The channel id while the channel is open.
    pub fn open_channel(&self) -> Option<&str> {
        match self {
            ChannelState::Open { channel_id, .. } => Some(channel_id),
            _ => None,
        }
    }
}

impl Default for ChannelState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Closed { .. } => write!(f, "Closed"),
            ChannelState::Opening => write!(f, "Opening"),
            ChannelState::Open { channel_id, .. } => write!(f, "Open({channel_id})"),
            ChannelState::Closing { channel_id } => write!(f, "Closing({channel_id})"),
        }
    }
}
