//! Helpers for derivative denoms, IBC denom traces and LSM share denoms.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::DenomError;

/// Port used by fungible token transfers.
pub const TRANSFER_PORT: &str = "transfer";

/// Prefix carried by every IBC hash denom.
pub const IBC_DENOM_PREFIX: &str = "ibc/";

/// Prefix of every channel identifier.
pub const CHANNEL_PREFIX: &str = "channel-";

/// Returns the derivative denom that corresponds to a host denom.
pub fn st_denom(host_denom: &str) -> String {
    format!("st{host_denom}")
}

/// The path and base denom of a token that arrived over one or more transfer hops.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DenomTrace {
    /// The `port/channel` hops the token travelled through, most recent first.
    pub path: String,

    /// The denom on the chain where the token originates.
    pub base_denom: String,
}

impl DenomTrace {
    /// Creates a trace for a token received over a single hop.
    pub fn single_hop(channel_id: &str, base_denom: impl Into<String>) -> Self {
        Self {
            path: format!("{TRANSFER_PORT}/{channel_id}"),
            base_denom: base_denom.into(),
        }
    }

    /// Returns the full `path/base` string that is hashed into the IBC denom.
    pub fn full_path(&self) -> String {
        if self.path.is_empty() {
            self.base_denom.clone()
        } else {
            format!("{}/{}", self.path, self.base_denom)
        }
    }

    /// Returns the `ibc/{HASH}` denom of this trace.
    pub fn ibc_denom(&self) -> String {
        if self.path.is_empty() {
            return self.base_denom.clone();
        }

        let hash = Sha256::digest(self.full_path().as_bytes());
        format!("{IBC_DENOM_PREFIX}{}", hex::encode_upper(hash))
    }

    /// Returns the channel id of the trace if the path is exactly one transfer hop.
    pub fn single_hop_channel(&self) -> Result<&str, DenomError> {
        let channel = self
            .path
            .strip_prefix(TRANSFER_PORT)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| DenomError::InvalidPath(self.path.clone()))?;

        let is_channel = channel
            .strip_prefix(CHANNEL_PREFIX)
            .is_some_and(|n| !n.is_empty() && n.len() <= 20 && n.chars().all(|c| c.is_ascii_digit()));
        if !is_channel {
            return Err(DenomError::InvalidPath(self.path.clone()));
        }

        Ok(channel)
    }
}

/// Returns the `ibc/{HASH}` denom of `base_denom` received over `channel_id`.
pub fn ibc_denom(channel_id: &str, base_denom: &str) -> String {
    DenomTrace::single_hop(channel_id, base_denom).ibc_denom()
}

/// Extracts the hex hash from an `ibc/{HASH}` denom.
pub fn parse_ibc_hash(denom: &str) -> Result<&str, DenomError> {
    denom
        .strip_prefix(IBC_DENOM_PREFIX)
        .filter(|hash| hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit()))
        .ok_or_else(|| DenomError::NotIbcDenom(denom.to_string()))
}

/// A tokenized delegation share denom: `{validator_address}/{record_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LsmDenom {
    /// The operator address of the validator the shares are delegated to.
    pub validator_address: String,

    /// The tokenize-share record id on the host.
    pub record_id: u64,
}

impl LsmDenom {
    /// Parses an LSM base denom.
    pub fn parse(denom: &str) -> Result<Self, DenomError> {
        let invalid = || DenomError::InvalidLsmDenom(denom.to_string());

        let (validator_address, record_id) = denom.split_once('/').ok_or_else(invalid)?;
        if validator_address.is_empty() || record_id.contains('/') {
            return Err(invalid());
        }

        let record_id = record_id.parse().map_err(|_| invalid())?;

        Ok(Self {
            validator_address: validator_address.to_string(),
            record_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_st_denom() {
        assert_eq!(st_denom("uatom"), "stuatom");
    }

    #[test]
    fn test_ibc_denom_is_stable_and_uppercase() {
        let denom = ibc_denom("channel-0", "uatom");
        assert!(denom.starts_with(IBC_DENOM_PREFIX));
        assert_eq!(denom, ibc_denom("channel-0", "uatom"));
        assert_ne!(denom, ibc_denom("channel-1", "uatom"));

        let hash = parse_ibc_hash(&denom).unwrap();
        assert_eq!(hash, hash.to_uppercase());
    }

    #[test]
    fn test_parse_ibc_hash_rejects_native_denoms() {
        assert!(parse_ibc_hash("uatom").is_err());
        assert!(parse_ibc_hash("ibc/XYZ").is_err());
    }

    #[test]
    fn test_single_hop_channel() {
        let trace = DenomTrace::single_hop("channel-12", "cosmosvaloper1abc/42");
        assert_eq!(trace.single_hop_channel().unwrap(), "channel-12");

        let multi_hop = DenomTrace {
            path: "transfer/channel-1/transfer/channel-2".to_string(),
            base_denom: "uatom".to_string(),
        };
        assert!(multi_hop.single_hop_channel().is_err());

        let wrong_port = DenomTrace {
            path: "icahost/channel-1".to_string(),
            base_denom: "uatom".to_string(),
        };
        assert!(wrong_port.single_hop_channel().is_err());
    }

    #[test]
    fn test_parse_lsm_denom() {
        let parsed = LsmDenom::parse("cosmosvaloper1abc/42").unwrap();
        assert_eq!(parsed.validator_address, "cosmosvaloper1abc");
        assert_eq!(parsed.record_id, 42);

        assert!(LsmDenom::parse("cosmosvaloper1abc").is_err());
        assert!(LsmDenom::parse("cosmosvaloper1abc/x").is_err());
        assert!(LsmDenom::parse("/42").is_err());
        assert!(LsmDenom::parse("a/1/2").is_err());
    }
}
