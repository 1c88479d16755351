//! The liquid staking core.
//!
//! Native tokens deposited on the controller are moved to host zones over IBC, delegated through
//! interchain accounts and represented on the controller by a derivative token whose redemption
//! rate tracks the stake behind it. The [`Engine`] owns all state and is driven block by block;
//! the relayer carries its packets, handshakes and queries to the hosts and brings back the
//! acknowledgements and query responses.

pub mod admin;
pub mod bank;
pub mod callbacks;
pub mod codec;
pub mod engine;
pub mod epochs;
pub mod errors;
pub mod events;
pub mod host_zone;
pub mod lsm;
pub mod msg_server;
pub mod msgs;
pub mod rate;
pub mod rebalance;
pub mod remote;
pub mod row_spec;
pub mod scheduler;
pub mod slash;
pub mod trade_route;
pub mod user;
pub mod validators;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
#[cfg(test)]
pub(crate) mod testing;

pub use admin::HostZoneConfig;
pub use engine::{Engine, Outbox, MODULE};
pub use errors::{StakeError, StakeResult};
pub use events::StakeEvent;
pub use msgs::Msg;
