//! The events that are relevant to the Channel State Machine.

use std::fmt;

/// The external events that affect the Channel State Machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The account was registered, or an admin asked to restore it.
    OpenInit,

    /// The handshake completed and the host reported the account address.
    OpenAck {
        /// The channel that was opened.
        channel_id: String,
        /// The account address on the host.
        address: String,
    },

    /// A packet on the channel timed out. Ordered channels close on timeout.
    PacketTimeout {
        /// The channel the packet was sent on.
        channel_id: String,
    },

    /// The host started closing the channel.
    CloseInit {
        /// The channel being closed.
        channel_id: String,
    },

    /// The channel finished closing.
    CloseConfirm {
        /// The channel that closed.
        channel_id: String,
    },
}

impl fmt::Display for ChannelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelEvent::OpenInit => write!(f, "OpenInit"),
            ChannelEvent::OpenAck { channel_id, .. } => write!(f, "OpenAck({channel_id})"),
            ChannelEvent::PacketTimeout { channel_id } => {
                write!(f, "PacketTimeout({channel_id})")
            }
            ChannelEvent::CloseInit { channel_id } => write!(f, "CloseInit({channel_id})"),
            ChannelEvent::CloseConfirm { channel_id } => write!(f, "CloseConfirm({channel_id})"),
        }
    }
}
