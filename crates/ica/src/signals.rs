//! Messages that state machines in the dispatch layer send to the rest of the application.

use std::fmt;

use crate::account::IcaAccountType;

/// The signals emitted by the dispatch layer's state machines.
///
/// Each variant is the contract between one state machine and its consumers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Messages from a channel state machine.
    FromChannel(ChannelSignal),
}

/// Signals that the [Channel State Machine](crate::channel::ChannelSM) can emit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelSignal {
    /// Signal to the owner of the account, i.e. the host zone registry.
    ToRegistry(ChannelToRegistry),
}

impl From<ChannelSignal> for Signal {
    fn from(sig: ChannelSignal) -> Self {
        Signal::FromChannel(sig)
    }
}

/// What the registry needs to know about an account's channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelToRegistry {
    /// The host opened the account and reported its address.
    AccountBound {
        /// The owner string of the account.
        owner: String,
        /// The account slot parsed from the owner.
        account_type: IcaAccountType,
        /// The channel the account is reachable on.
        channel_id: String,
        /// The account address on the host.
        address: String,
    },

    /// The account's channel closed. In-flight work on the account will never be acknowledged.
    AccountClosed {
        /// The owner string of the account.
        owner: String,
        /// The account slot parsed from the owner.
        account_type: IcaAccountType,
    },
}

impl fmt::Display for ChannelToRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelToRegistry::AccountBound {
                owner,
                channel_id,
                address,
                ..
            } => write!(f, "AccountBound for {owner} on {channel_id}: {address}"),
            ChannelToRegistry::AccountClosed { owner, .. } => {
                write!(f, "AccountClosed for {owner}")
            }
        }
    }
}
