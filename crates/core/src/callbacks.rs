//! Callback ids and the registries the engine is built with.

use liquid_stake_ica::AckCallbacks;
use liquid_stake_icq::QueryCallbacks;

use crate::{
    engine::{Engine, MODULE},
    lsm, rebalance,
    scheduler::{community_pool, deposits, rewards, unbonding},
    slash, user,
};

// ===== Query Callbacks =====

/// Share rate of a validator, checked for slashes.
pub const VALIDATOR_SHARES_RATE: &str = "validator_shares_rate";

/// Delegator shares held with a validator whose rate moved.
pub const DELEGATOR_SHARES: &str = "delegator_shares";

/// Balance of a zone's withdrawal account.
pub const WITHDRAWAL_BALANCE: &str = "withdrawal_balance";

/// Share rate of a validator, checked before an LSM liquid stake completes.
pub const LSM_SHARES_RATE: &str = "lsm_shares_rate";

/// Balance of a zone's fee account.
pub const FEE_BALANCE: &str = "fee_balance";

/// Balance of one of a zone's community pool accounts in one denom.
pub const COMMUNITY_POOL_BALANCE: &str = "community_pool_balance";

// ===== Ack Callbacks =====

/// Deposit transfer to the delegation account.
pub const TRANSFER: &str = "transfer";

/// Delegation of a deposit record.
pub const DELEGATE: &str = "delegate";

/// Reward address of the delegation account.
pub const SET_WITHDRAWAL_ADDRESS: &str = "set_withdrawal_address";

/// Reward withdrawal.
pub const WITHDRAW_REWARDS: &str = "withdraw_rewards";

/// Sends out of the withdrawal account.
pub const REINVEST: &str = "reinvest";

/// Undelegation of a batch of unbondings.
pub const UNDELEGATE: &str = "undelegate";

/// Sweep of unbonded tokens to the redemption account.
pub const SWEEP: &str = "sweep";

/// Payout of a user redemption.
pub const CLAIM: &str = "claim";

/// Redelegations.
pub const REBALANCE: &str = "rebalance";

/// Transfer of LSM shares to the delegation account.
pub const LSM_TRANSFER: &str = "lsm_transfer";

/// Redemption of LSM shares into a delegation.
pub const DETOKENIZE: &str = "detokenize";

/// Transfer of the fee account's balance to the reward collector.
pub const FEE_SWEEP: &str = "fee_sweep";

/// Transfer of community pool deposits to the holding account.
pub const COMMUNITY_POOL_DEPOSIT: &str = "community_pool_deposit";

/// Transfer of liquid staked community pool tokens to the return account.
pub const COMMUNITY_POOL_RETURN: &str = "community_pool_return";

/// Donation from the return account to the community pool.
pub const FUND_COMMUNITY_POOL: &str = "fund_community_pool";

/// The query callbacks of the core.
pub fn query_callbacks() -> QueryCallbacks<Engine> {
    QueryCallbacks::new(MODULE)
        .with(VALIDATOR_SHARES_RATE, slash::validator_shares_rate_callback)
        .with(DELEGATOR_SHARES, slash::delegator_shares_callback)
        .with(WITHDRAWAL_BALANCE, rewards::withdrawal_balance_callback)
        .with(LSM_SHARES_RATE, lsm::shares_rate_callback)
        .with(FEE_BALANCE, rewards::fee_balance_callback)
        .with(COMMUNITY_POOL_BALANCE, community_pool::pool_balance_callback)
}

/// The ack callbacks of the core.
pub fn ack_callbacks() -> AckCallbacks<Engine> {
    AckCallbacks::new()
        .with(TRANSFER, deposits::transfer_callback)
        .with(DELEGATE, deposits::delegate_callback)
        .with(SET_WITHDRAWAL_ADDRESS, rewards::withdrawal_address_callback)
        .with(WITHDRAW_REWARDS, rewards::withdraw_rewards_callback)
        .with(REINVEST, rewards::reinvest_callback)
        .with(UNDELEGATE, unbonding::undelegate_callback)
        .with(SWEEP, unbonding::sweep_callback)
        .with(CLAIM, user::claim_callback)
        .with(REBALANCE, rebalance::rebalance_callback)
        .with(LSM_TRANSFER, lsm::transfer_callback)
        .with(DETOKENIZE, lsm::detokenize_callback)
        .with(FEE_SWEEP, rewards::fee_sweep_callback)
        .with(COMMUNITY_POOL_DEPOSIT, community_pool::deposit_transfer_callback)
        .with(COMMUNITY_POOL_RETURN, community_pool::return_transfer_callback)
        .with(FUND_COMMUNITY_POOL, community_pool::fund_community_pool_callback)
}
