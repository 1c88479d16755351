//! Ordered key-value storage for the liquid staking core.
//!
//! Every logical table lives under a one-byte [`TablePrefix`]. Keys within a table are
//! length-prefixed composites built with [`KeyBuf`], so lexicographic order over the raw bytes
//! matches the order of the indexed fields. The [`KvStore`] supports nested transactions: a block
//! opens one layer, and each scheduler step may open another on top of it.

pub mod errors;
pub mod keys;
pub mod prefix;
pub mod row_spec;
pub mod store;

pub use errors::{DbError, DbResult};
pub use keys::{KeyBuf, KeyReader};
pub use prefix::TablePrefix;
pub use row_spec::{KVRowSpec, PackableKey, SerializableValue};
pub use store::KvStore;
