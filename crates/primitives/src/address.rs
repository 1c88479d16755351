//! Bech32 account addresses on the controller and host chains.

use bitcoin::bech32::{self, Bech32, Hrp};
use sha2::{Digest, Sha256};

use crate::errors::AddressError;

/// Suffix appended to a chain's account prefix to form its validator operator prefix.
pub const VALOPER_SUFFIX: &str = "valoper";

/// Checks that `address` is a well-formed bech32 string whose human readable part is `prefix`.
pub fn validate_address(address: &str, prefix: &str) -> Result<(), AddressError> {
    let (hrp, data) = bech32::decode(address).map_err(|e| AddressError::Invalid {
        address: address.to_string(),
        reason: e.to_string(),
    })?;

    if data.is_empty() {
        return Err(AddressError::Invalid {
            address: address.to_string(),
            reason: "empty payload".to_string(),
        });
    }

    let found = hrp.to_lowercase();
    if found != prefix {
        return Err(AddressError::WrongPrefix {
            address: address.to_string(),
            expected: prefix.to_string(),
            found,
        });
    }

    Ok(())
}

/// Checks that `address` is a validator operator address for a chain with the given account
/// prefix.
pub fn validate_valoper_address(address: &str, account_prefix: &str) -> Result<(), AddressError> {
    validate_address(address, &format!("{account_prefix}{VALOPER_SUFFIX}"))
}

/// Encodes raw address bytes with the given prefix.
pub fn encode_address(prefix: &str, bytes: &[u8]) -> Result<String, AddressError> {
    let hrp = Hrp::parse(prefix).map_err(|_| AddressError::InvalidPrefix(prefix.to_string()))?;

    bech32::encode::<Bech32>(hrp, bytes).map_err(|e| AddressError::Invalid {
        address: hex::encode(bytes),
        reason: e.to_string(),
    })
}

/// Derives the deterministic address of a module-owned account.
///
/// The address bytes are `sha256(module || 0x00 || seed)`, so distinct `(module, seed)` pairs
/// never collide.
pub fn module_address(prefix: &str, module: &str, seed: &str) -> Result<String, AddressError> {
    let mut hasher = Sha256::new();
    hasher.update(module.as_bytes());
    hasher.update([0u8]);
    hasher.update(seed.as_bytes());

    encode_address(prefix, &hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_address_is_valid_and_deterministic() {
        let addr = module_address("stride", "stakeibc", "cosmoshub-4").unwrap();
        assert!(addr.starts_with("stride1"));
        validate_address(&addr, "stride").unwrap();

        assert_eq!(addr, module_address("stride", "stakeibc", "cosmoshub-4").unwrap());
        assert_ne!(addr, module_address("stride", "stakeibc", "osmosis-1").unwrap());
        assert_ne!(addr, module_address("stride", "records", "cosmoshub-4").unwrap());
    }

    #[test]
    fn test_wrong_prefix_is_rejected() {
        let addr = encode_address("cosmos", &[7u8; 20]).unwrap();
        validate_address(&addr, "cosmos").unwrap();

        let err = validate_address(&addr, "stride").unwrap_err();
        assert!(matches!(err, AddressError::WrongPrefix { .. }));
    }

    #[test]
    fn test_valoper_address() {
        let addr = encode_address("cosmosvaloper", &[1u8; 20]).unwrap();
        validate_valoper_address(&addr, "cosmos").unwrap();
        assert!(validate_valoper_address(&addr, "osmo").is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            validate_address("not-an-address", "cosmos"),
            Err(AddressError::Invalid { .. })
        ));
        assert!(matches!(
            encode_address("", &[1u8; 20]),
            Err(AddressError::InvalidPrefix(_))
        ));
    }
}
