//! Query types.

use liquid_stake_primitives::types::{BlockHeight, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{QueryError, QueryResult};

/// Query type for a proved lookup in the host's staking store.
pub const STAKING_STORE_QUERY_WITH_PROOF: &str = "store/staking/key";

/// Query type for a proved lookup in the host's bank store.
pub const BANK_STORE_QUERY_WITH_PROOF: &str = "store/bank/key";

/// Query type for a proved lookup in the host's twap store.
pub const TWAP_STORE_QUERY_WITH_PROOF: &str = "store/twap/key";

/// Prefix shared by every query type whose response carries a proof.
pub const STORE_QUERY_PREFIX: &str = "store/";

/// Prefix of every connection identifier.
pub const CONNECTION_PREFIX: &str = "connection-";

/// Number of hash bytes kept in a query id.
pub const QUERY_ID_BYTES: usize = 16;

/// What happens when a query is not answered before its TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeoutPolicy {
    /// Drop the query.
    RejectQueryResponse,
    /// Drop the query and submit it again under a fresh id.
    RetryQueryRequest,
    /// Run the callback with an empty result, then drop the query.
    ExecuteQueryCallback,
}

/// A registered query against a host chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Hex-encoded truncated sha256 over the identifying fields. Filled in on submission.
    pub id: String,

    /// Connection to the host.
    pub connection_id: String,

    /// Chain id of the host.
    pub chain_id: String,

    /// A store query type such as [`STAKING_STORE_QUERY_WITH_PROOF`], or a method URL.
    pub query_type: String,

    /// Store key or encoded request.
    pub request_data: Vec<u8>,

    /// Module that owns the callback.
    pub callback_module: String,

    /// Callback to run with the response.
    pub callback_id: String,

    /// Opaque data handed back to the callback.
    pub callback_data: Vec<u8>,

    /// Behaviour on timeout.
    pub timeout_policy: TimeoutPolicy,

    /// How long the query may stay unanswered, in nanos.
    pub timeout_duration: u64,

    /// Block time after which the query is timed out, in unix nanos.
    pub timeout_timestamp: Timestamp,

    /// Latest light client height when the query was submitted.
    pub submission_height: BlockHeight,

    /// Whether a request event has been emitted for the current submission.
    pub request_sent: bool,

    /// Re-request period in blocks. Negative for one-shot queries.
    pub period: i64,

    /// Controller height of the last request or response.
    pub last_height: BlockHeight,
}

impl Query {
    /// Creates a one-shot query that is rejected on timeout.
    pub fn new(
        connection_id: impl Into<String>,
        chain_id: impl Into<String>,
        query_type: impl Into<String>,
        request_data: Vec<u8>,
        callback_module: impl Into<String>,
        callback_id: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            connection_id: connection_id.into(),
            chain_id: chain_id.into(),
            query_type: query_type.into(),
            request_data,
            callback_module: callback_module.into(),
            callback_id: callback_id.into(),
            callback_data: Vec::new(),
            timeout_policy: TimeoutPolicy::RejectQueryResponse,
            timeout_duration: 0,
            timeout_timestamp: 0,
            submission_height: 0,
            request_sent: false,
            period: -1,
            last_height: 0,
        }
    }

    /// Sets the callback data.
    pub fn with_callback_data(mut self, callback_data: Vec<u8>) -> Self {
        self.callback_data = callback_data;
        self
    }

    /// Sets the timeout duration and policy.
    pub fn with_timeout(mut self, duration: u64, policy: TimeoutPolicy) -> Self {
        self.timeout_duration = duration;
        self.timeout_policy = policy;
        self
    }

    /// Makes the query periodic.
    pub fn with_period(mut self, period: i64) -> Self {
        self.period = period;
        self
    }

    /// Returns `true` for queries that are dropped after their first response.
    pub const fn is_one_shot(&self) -> bool {
        self.period < 0
    }

    /// Returns `true` if the response to this query must carry a proof.
    pub fn requires_proof(&self) -> bool {
        self.query_type.starts_with(STORE_QUERY_PREFIX)
    }

    /// Derives the id from the identifying fields, mixing in `salt` if given.
    pub fn derive_id(&self, salt: Option<&[u8]>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.callback_module.as_bytes());
        hasher.update(self.connection_id.as_bytes());
        hasher.update(self.chain_id.as_bytes());
        hasher.update(self.query_type.as_bytes());
        hasher.update(self.callback_id.as_bytes());
        hasher.update(&self.request_data);
        if let Some(salt) = salt {
            hasher.update(salt);
        }

        hex::encode(&hasher.finalize()[..QUERY_ID_BYTES])
    }

    /// Whether `other` asks the same thing of the same chain for the same callback. Salts and
    /// timeouts are ignored.
    pub fn same_identity(&self, other: &Query) -> bool {
        self.callback_module == other.callback_module
            && self.connection_id == other.connection_id
            && self.chain_id == other.chain_id
            && self.query_type == other.query_type
            && self.callback_id == other.callback_id
            && self.request_data == other.request_data
    }

    /// Checks the fields that a submission relies on.
    pub fn validate(&self) -> QueryResult<()> {
        let invalid = |reason: &str| Err(QueryError::Validation(reason.to_string()));

        if self.chain_id.is_empty() {
            return invalid("chain id cannot be empty");
        }
        if !self.connection_id.starts_with(CONNECTION_PREFIX) {
            return invalid("invalid connection id");
        }
        if self.query_type.is_empty() {
            return invalid("query type cannot be empty");
        }
        if self.callback_module.is_empty() {
            return invalid("callback module must be specified");
        }
        if self.callback_id.is_empty() {
            return invalid("callback id cannot be empty");
        }
        if self.timeout_duration == 0 {
            return invalid("timeout duration must be set");
        }

        Ok(())
    }
}

/// A proof step returned with a store query response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProofOp {
    /// Proof type, e.g. `ics23:iavl`.
    pub op_type: String,

    /// Key the step proves.
    pub key: Vec<u8>,

    /// Encoded proof.
    pub data: Vec<u8>,
}

/// The proof attached to a query response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProofOps {
    /// Proof steps from the leaf up to the app hash.
    pub ops: Vec<ProofOp>,
}

/// The latest verified response for a query id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Query id.
    pub id: String,

    /// Host height the response was proved at.
    pub remote_height: BlockHeight,

    /// Controller height the response was processed at.
    pub local_height: BlockHeight,

    /// Raw response.
    pub value: Vec<u8>,
}

/// A request for the relayer to run a query, emitted at the end of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Query id to answer under.
    pub id: String,

    /// Connection to the host.
    pub connection_id: String,

    /// Chain id of the host.
    pub chain_id: String,

    /// Query type.
    pub query_type: String,

    /// Store key or encoded request.
    pub request_data: Vec<u8>,

    /// Controller height the request was emitted at.
    pub height: BlockHeight,
}

impl From<&Query> for QueryRequest {
    fn from(query: &Query) -> Self {
        Self {
            id: query.id.clone(),
            connection_id: query.connection_id.clone(),
            chain_id: query.chain_id.clone(),
            query_type: query.query_type.clone(),
            request_data: query.request_data.clone(),
            height: query.last_height,
        }
    }
}

/// How a submitted response was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// The callback ran.
    Applied,
    /// No query is registered under the id.
    Missing,
    /// The response was proved below the submission height.
    Stale,
    /// The proof did not verify against the light client.
    ProofRejected,
    /// The query had already expired; its timeout policy ran instead of the callback.
    Expired,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> Query {
        Query::new(
            "connection-0",
            "cosmoshub-4",
            BANK_STORE_QUERY_WITH_PROOF,
            b"balance-key".to_vec(),
            "stakeibc",
            "withdrawalbalance",
        )
        .with_timeout(60, TimeoutPolicy::RetryQueryRequest)
    }

    #[test]
    fn test_id_is_deterministic() {
        let id = query().derive_id(None);
        assert_eq!(id.len(), QUERY_ID_BYTES * 2);
        assert_eq!(id, query().derive_id(None));

        // callback data and timeouts are not part of the identity
        let other = query()
            .with_callback_data(vec![1, 2, 3])
            .with_timeout(5, TimeoutPolicy::RejectQueryResponse);
        assert_eq!(id, other.derive_id(None));

        let mut different = query();
        different.request_data = b"other-key".to_vec();
        assert_ne!(id, different.derive_id(None));

        assert_ne!(id, query().derive_id(Some(b"salt")));
    }

    #[test]
    fn test_validate() {
        assert!(query().validate().is_ok());

        let mut bad = query();
        bad.connection_id = "channel-0".to_string();
        assert!(matches!(bad.validate(), Err(QueryError::Validation(_))));

        let mut bad = query();
        bad.chain_id.clear();
        assert!(bad.validate().is_err());

        let mut bad = query();
        bad.callback_id.clear();
        assert!(bad.validate().is_err());

        let bad = query().with_timeout(0, TimeoutPolicy::RetryQueryRequest);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_proof_requirement_follows_query_type() {
        assert!(query().requires_proof());

        let mut method = query();
        method.query_type = "cosmos.staking.v1beta1.Query/Validator".to_string();
        assert!(!method.requires_proof());
    }
}
