//! The remote query (RQ) layer.
//!
//! Queries against a host chain's state are registered here, picked up by a relayer from the
//! request events emitted at the end of each block, and answered with a proved response. A
//! verified response is dispatched to a typed callback registered by the module that submitted
//! the query.
//!
//! The layer is generic over a [`QueryHost`], which gives it access to the store, the current
//! block, the light client of each connection and the callback registry.

pub mod callbacks;
pub mod errors;
pub mod host;
pub mod keeper;
pub mod light_client;
pub mod row_spec;
pub mod types;

pub use callbacks::{QueryCallback, QueryCallbacks};
pub use errors::{QueryError, QueryResult};
pub use host::QueryHost;
pub use light_client::{commitment_proof, ClientStore, LightClient};
pub use types::{DataPoint, ProofOp, ProofOps, Query, QueryRequest, ResponseOutcome, TimeoutPolicy};
