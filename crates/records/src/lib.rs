//! The record store: journals of deposits, user redemptions, per-epoch unbondings and LSM
//! deposits that track every unit of the native asset while it moves between chains.

pub mod errors;
pub mod row_spec;
pub mod store;
pub mod types;

pub use errors::{RecordError, RecordResult};
pub use store::RecordStore;
pub use types::*;
