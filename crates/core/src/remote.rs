//! Host-chain state read through remote queries: the store keys that are queried and the values
//! stored under them.
//!
//! Keys are the paths of the values in the host's staking and bank stores. Values are bincode
//! encoded, like every other value in the workspace.

use liquid_stake_primitives::{decimal::Dec, types::Amount};
use serde::{Deserialize, Serialize};

use crate::{
    codec::{decode_args, encode_args},
    errors::StakeResult,
};

/// A validator as stored in the host's staking module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteValidator {
    /// Operator address.
    pub operator_address: String,

    /// Tokens bonded to the validator.
    pub tokens: Amount,

    /// Shares issued to its delegators.
    pub delegator_shares: Dec,
}

impl RemoteValidator {
    /// Tokens backing one share.
    pub fn shares_to_tokens_rate(&self) -> StakeResult<Dec> {
        if self.delegator_shares.is_zero() {
            return Ok(Dec::ZERO);
        }

        Ok(Dec::from_int(self.tokens).checked_quo(self.delegator_shares)?)
    }
}

/// A delegation as stored in the host's staking module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDelegation {
    /// The delegating account.
    pub delegator_address: String,

    /// Operator address of the validator.
    pub validator_address: String,

    /// Shares held.
    pub shares: Dec,
}

/// A bank balance as stored in the host's bank module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteBalance {
    /// The account.
    pub address: String,

    /// The denom.
    pub denom: String,

    /// The amount held.
    pub amount: Amount,
}

/// Staking store key of a validator.
pub fn validator_key(validator_address: &str) -> Vec<u8> {
    format!("validators/{validator_address}").into_bytes()
}

/// Staking store key of a delegation.
pub fn delegation_key(delegator_address: &str, validator_address: &str) -> Vec<u8> {
    format!("delegations/{delegator_address}/{validator_address}").into_bytes()
}

/// Bank store key of a balance.
pub fn balance_key(address: &str, denom: &str) -> Vec<u8> {
    format!("balances/{address}/{denom}").into_bytes()
}

/// Encodes a value the way the host stores it.
pub fn encode_value<T: Serialize>(value: &T) -> StakeResult<Vec<u8>> {
    encode_args(value)
}

/// Decodes a query result. An empty result means the key is absent on the host.
pub fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> StakeResult<Option<T>> {
    if bytes.is_empty() {
        return Ok(None);
    }

    decode_args(bytes).map(Some)
}
