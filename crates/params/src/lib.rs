//! This crate contains the protocol parameters that dictate how the liquid staking core
//! schedules work, bounds the redemption rate and talks to host chains.
//!
//! Every parameter has a default in [`default`] so that a partial TOML file is enough to
//! configure a deployment.

pub mod default;
pub mod errors;
pub mod types;

pub use errors::ParamsError;
pub use types::Params;
