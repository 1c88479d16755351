//! Encoding of ack callback arguments and remote query results.

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::{StakeError, StakeResult};

/// Encodes the arguments stored alongside a packet or query.
pub fn encode_args<T: Serialize>(args: &T) -> StakeResult<Vec<u8>> {
    bincode::serialize(args).map_err(|e| StakeError::Encoding(e.to_string()))
}

/// Decodes arguments stored by [`encode_args`].
pub fn decode_args<T: DeserializeOwned>(bytes: &[u8]) -> StakeResult<T> {
    bincode::deserialize(bytes).map_err(|e| StakeError::Encoding(e.to_string()))
}
