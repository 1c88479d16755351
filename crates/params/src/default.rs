//! Default values for the protocol parameters.
//!
//! Intervals are expressed in stride epochs, not blocks.

use liquid_stake_primitives::types::{NANOS_PER_DAY, NANOS_PER_MINUTE, NANOS_PER_SEC};

/// Default number of stride epochs between deposit transfers.
pub(crate) const DEPOSIT_INTERVAL: u64 = 1;

/// Default number of stride epochs between delegations.
pub(crate) const DELEGATE_INTERVAL: u64 = 1;

/// Default number of stride epochs between reward reinvestments.
pub(crate) const REINVEST_INTERVAL: u64 = 1;

/// Default number of stride epochs between reward withdrawals.
pub(crate) const REWARDS_INTERVAL: u64 = 1;

/// Default number of stride epochs between redemption rate updates.
pub(crate) const REDEMPTION_RATE_INTERVAL: u64 = 1;

/// Default number of stride epochs between validator rebalances.
pub(crate) const REBALANCE_INTERVAL: u64 = 4;

/// Default protocol commission on rewards, in percent.
pub(crate) const STRIDE_COMMISSION: u64 = 10;

/// Default timeout for ICA packets that are not aligned to an epoch.
pub(crate) const ICA_TIMEOUT_NANOS: u64 = 600 * NANOS_PER_SEC;

/// Default fraction (`1 / BUFFER_SIZE`) of a stride epoch reserved at its end for packets to land.
pub(crate) const BUFFER_SIZE: u64 = 5;

/// Default timeout for IBC token transfers.
pub(crate) const IBC_TRANSFER_TIMEOUT_NANOS: u64 = 30 * NANOS_PER_MINUTE;

/// Default lower halt bound of the redemption rate, in percent.
pub(crate) const SAFETY_MIN_REDEMPTION_RATE_THRESHOLD: u64 = 90;

/// Default upper halt bound of the redemption rate, in percent.
pub(crate) const SAFETY_MAX_REDEMPTION_RATE_THRESHOLD: u64 = 150;

/// Default lower alert bound of the redemption rate, in percent.
pub(crate) const INNER_MIN_REDEMPTION_RATE_THRESHOLD: u64 = 95;

/// Default upper alert bound of the redemption rate, in percent.
pub(crate) const INNER_MAX_REDEMPTION_RATE_THRESHOLD: u64 = 105;

/// Default cap on delegation ICA calls per zone per epoch.
pub(crate) const MAX_STAKE_ICA_CALLS_PER_EPOCH: u64 = 100;

/// Default largest slash, in percent of a validator's delegation, that is applied without halting.
pub(crate) const SAFETY_MAX_SLASH_PERCENT: u64 = 10;

/// Default number of redelegations sent per rebalance ICA transaction.
pub(crate) const REBALANCE_BATCH_SIZE: usize = 5;

/// Default number of redelegation pairs emitted per rebalance.
pub(crate) const REBALANCE_MAX_SWAPS: usize = 10;

/// Default per-zone cap on messages in a single ICA transaction.
pub(crate) const MAX_MESSAGES_PER_ICA_TX: u64 = 32;

/// Default number of stride epochs per day epoch.
pub(crate) const STRIDE_EPOCHS_PER_DAY_EPOCH: u64 = 4;

/// Default tolerated drift of a validator's share rate during an LSM liquid stake, in percent.
pub(crate) const LSM_RATE_TOLERANCE_PERCENT: u64 = 1;

/// Default timeout of the validator share-rate query issued for an LSM liquid stake.
pub(crate) const LSM_QUERY_TIMEOUT_NANOS: u64 = 5 * NANOS_PER_MINUTE;

/// Default timeout of the ICA that redeems LSM shares on the host.
pub(crate) const DETOKENIZATION_TIMEOUT_NANOS: u64 = NANOS_PER_DAY;

/// Default bech32 account prefix on the controller chain.
pub(crate) const CONTROLLER_PREFIX: &str = "stride";
