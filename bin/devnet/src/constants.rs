use liquid_stake_primitives::types::Amount;

/// Height both chains start at.
pub(crate) const GENESIS_HEIGHT: u64 = 1;

/// Tokens self-bonded by a validator that does not set its own.
pub(crate) const DEFAULT_VALIDATOR_TOKENS: Amount = 1_000_000_000;

/// Relay rounds per block before the relayer gives up on draining the outbox.
pub(crate) const MAX_RELAY_ROUNDS: usize = 32;

/// First channel number handed to interchain accounts, clear of the configured transfer channels.
pub(crate) const FIRST_ICA_CHANNEL: u64 = 100;
