//! The duties that need to be performed in response to channel state transitions.

/// The duties that drive the Channel State Machine forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelDuty {
    /// Start a channel handshake for the account. The relayer completes it and reports the
    /// open-ack.
    OpenChannel {
        /// Owner of the account.
        owner: String,
        /// Controller port of the account.
        port_id: String,
        /// Connection to open the channel on.
        connection_id: String,
        /// Proposed version.
        version: String,
    },
}
