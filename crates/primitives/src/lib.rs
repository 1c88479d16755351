//! This crate contains general types and pure functions that need to be shared across multiple
//! crates in the liquid staking workspace.
//!
//! It lies at the bottom of the crate-hierarchy in this workspace i.e., it does not depend on any
//! other crate in this workspace.

pub mod address;
pub mod coin;
pub mod decimal;
pub mod denom;
pub mod errors;
pub mod types;
