//! The environment the dispatch layer runs in.

use std::fmt;

use liquid_stake_db::KvStore;
use liquid_stake_primitives::types::BlockInfo;

use crate::{
    callbacks::AckCallback,
    channel::{ChannelDuty, ChannelSMCfg},
    errors::IcaError,
    packet::OutboundPacket,
    signals::Signal,
};

/// Access to the state and collaborators the dispatch layer needs.
pub trait IcaHost: Sized {
    /// The error returned by callbacks and signal routing. Dispatch failures convert into it.
    type Error: From<IcaError> + fmt::Display;

    /// The state store.
    fn store(&self) -> &KvStore;

    /// The state store, mutably.
    fn store_mut(&mut self) -> &mut KvStore;

    /// The block currently being executed.
    fn block(&self) -> BlockInfo;

    /// Configuration of the channel state machines.
    fn channel_config(&self) -> &ChannelSMCfg;

    /// Looks up the ack callback registered under `callback_id`.
    fn ack_callback(&self, callback_id: &str) -> Option<AckCallback<Self>>;

    /// Hands a packet to the relayer.
    fn emit_packet(&mut self, packet: OutboundPacket);

    /// Hands a channel handshake request to the relayer.
    fn emit_channel_duty(&mut self, duty: ChannelDuty);

    /// Delivers a signal from a channel state machine to its consumer.
    fn route_signal(&mut self, signal: Signal) -> Result<(), Self::Error>;
}
