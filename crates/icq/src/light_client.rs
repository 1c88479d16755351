//! The view of a host chain's consensus that the controller keeps per connection.

use std::collections::BTreeMap;

use liquid_stake_primitives::types::{BlockHeight, Timestamp};
use sha2::{Digest, Sha256};

use crate::types::{ProofOp, ProofOps, Query};

/// A light client tracking the host chain behind each connection.
pub trait LightClient {
    /// Latest host height the client has a consensus state for.
    fn latest_height(&self, connection_id: &str) -> Option<BlockHeight>;

    /// Host block time of the latest consensus state, in unix nanos.
    fn latest_time(&self, connection_id: &str) -> Option<Timestamp>;

    /// Verifies that `result` is the value stored under the query's key at `height`.
    fn verify_membership(
        &self,
        connection_id: &str,
        height: BlockHeight,
        query: &Query,
        result: &[u8],
        proof: &ProofOps,
    ) -> Result<(), String>;
}

/// The latest trusted view of one host chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusState {
    /// Chain id of the host.
    pub chain_id: String,

    /// Host height of the latest update.
    pub height: BlockHeight,

    /// Host block time of the latest update, in unix nanos.
    pub time: Timestamp,
}

/// Light clients of every connection, updated by the relayer.
///
/// Membership proofs are checked against a hash commitment of the query key and the result
/// rather than a Merkle path to an app hash; path verification belongs to the transport.
#[derive(Debug, Clone, Default)]
pub struct ClientStore {
    states: BTreeMap<String, ConsensusState>,
}

impl ClientStore {
    /// Creates an empty store.
    pub const fn new() -> Self {
        Self {
            states: BTreeMap::new(),
        }
    }

    /// Creates the client of a connection.
    pub fn create_client(
        &mut self,
        connection_id: &str,
        chain_id: &str,
        height: BlockHeight,
        time: Timestamp,
    ) -> Result<(), String> {
        if self.states.contains_key(connection_id) {
            return Err(format!("client for {connection_id} already exists"));
        }

        self.states.insert(
            connection_id.to_string(),
            ConsensusState {
                chain_id: chain_id.to_string(),
                height,
                time,
            },
        );
        Ok(())
    }

    /// Moves the client of a connection forward.
    pub fn update_client(
        &mut self,
        connection_id: &str,
        height: BlockHeight,
        time: Timestamp,
    ) -> Result<(), String> {
        let state = self
            .states
            .get_mut(connection_id)
            .ok_or_else(|| format!("no client for {connection_id}"))?;

        if height <= state.height || time < state.time {
            return Err(format!(
                "update to height {height} does not advance client at {}",
                state.height
            ));
        }

        state.height = height;
        state.time = time;
        Ok(())
    }

    /// Chain id behind a connection.
    pub fn chain_id(&self, connection_id: &str) -> Option<&str> {
        self.states
            .get(connection_id)
            .map(|state| state.chain_id.as_str())
    }
}

impl LightClient for ClientStore {
    fn latest_height(&self, connection_id: &str) -> Option<BlockHeight> {
        self.states.get(connection_id).map(|state| state.height)
    }

    fn latest_time(&self, connection_id: &str) -> Option<Timestamp> {
        self.states.get(connection_id).map(|state| state.time)
    }

    fn verify_membership(
        &self,
        connection_id: &str,
        height: BlockHeight,
        query: &Query,
        result: &[u8],
        proof: &ProofOps,
    ) -> Result<(), String> {
        let state = self
            .states
            .get(connection_id)
            .ok_or_else(|| format!("no client for {connection_id}"))?;
        if height > state.height {
            return Err(format!("height {height} is ahead of client at {}", state.height));
        }

        let op = proof.ops.first().ok_or("empty proof")?;
        if op.key != query.request_data {
            return Err("proof is for a different key".to_string());
        }
        if op.data != commitment(&query.request_data, result) {
            return Err("commitment mismatch".to_string());
        }

        Ok(())
    }
}

fn commitment(key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update(value);
    hasher.finalize().to_vec()
}

/// Builds the proof [`ClientStore`] accepts for `result` stored under `key`.
pub fn commitment_proof(key: &[u8], result: &[u8]) -> ProofOps {
    ProofOps {
        ops: vec![ProofOp {
            op_type: COMMITMENT_PROOF_TYPE.to_string(),
            key: key.to_vec(),
            data: commitment(key, result),
        }],
    }
}

/// Proof type produced by [`commitment_proof`].
pub const COMMITMENT_PROOF_TYPE: &str = "sha256:commitment";
