//! Interchain account (ICA) dispatch.
//!
//! Host-chain messages are batched into packets sent over the channel owned by a typed account,
//! and the acknowledgement of every packet is routed to the callback registered when it was
//! sent. Each account's channel is tracked by a [`ChannelSM`](channel::ChannelSM) whose signals
//! tell the owner of the account when an address is bound or a channel is lost.

pub mod account;
pub mod callbacks;
pub mod channel;
pub mod dispatch;
pub mod errors;
pub mod host;
pub mod msgs;
pub mod packet;
pub mod row_spec;
pub mod signals;

pub use account::{host_zone_owner, port_id, trade_route_owner, IcaAccountType};
pub use callbacks::{AckCallback, AckCallbacks, CallbackData};
pub use errors::{IcaError, IcaResult};
pub use host::IcaHost;
pub use msgs::{HostMsg, MsgResponse};
pub use packet::{AckResponse, AckStatus, Acknowledgement, IcaTx, OutboundPacket, PacketId};
