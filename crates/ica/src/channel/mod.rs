//! The Channel State Machine (CSM).
//!
//! Tracks the channel that carries an interchain account's packets through
//! `Closed -> Opening -> Open -> Closing -> Closed`.

pub mod config;
pub mod duties;
pub mod errors;
pub mod events;
pub mod machine;
pub mod state;

#[cfg(test)]
mod tests;

pub use config::ChannelSMCfg;
pub use duties::ChannelDuty;
pub use errors::{ChannelError, ChannelResult};
pub use events::ChannelEvent;
pub use machine::{ChannelSM, ChannelSMCtx, ChannelOutput};
pub use state::ChannelState;
