//! Typed events emitted while the engine executes.

use liquid_stake_primitives::{decimal::Dec, types::{Amount, EpochNumber}};

/// Something observable happened.
///
/// Events emitted inside a transaction that rolls back are discarded with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StakeEvent {
    /// A zone was registered.
    HostZoneRegistered {
        /// Chain id.
        zone: String,
    },

    /// Derivative was minted for a deposit.
    LiquidStake {
        /// Chain id.
        zone: String,
        /// The depositor.
        staker: String,
        /// Native value of the deposit.
        native_amount: Amount,
        /// Derivative minted.
        st_amount: Amount,
        /// Whether the deposit was made with LSM shares.
        lsm: bool,
    },

    /// An LSM liquid stake was rejected after its share-rate query.
    LsmLiquidStakeFailed {
        /// Chain id.
        zone: String,
        /// The deposit.
        deposit_id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A redemption was queued.
    RedeemStake {
        /// Chain id.
        zone: String,
        /// The controller-side sender.
        sender: String,
        /// The host-side receiver.
        receiver: String,
        /// Derivative escrowed.
        st_amount: Amount,
        /// Native owed.
        native_amount: Amount,
    },

    /// A claim transfer was sent.
    ClaimUndelegated {
        /// Chain id.
        zone: String,
        /// Day epoch of the redemption.
        epoch: EpochNumber,
        /// The receiver.
        receiver: String,
        /// Native sent.
        amount: Amount,
    },

    /// The redemption rate was recomputed.
    RedemptionRateUpdated {
        /// Chain id.
        zone: String,
        /// The new rate.
        rate: Dec,
    },

    /// The redemption rate left its outer bounds and the zone halted.
    RedemptionRateHalt {
        /// Chain id.
        zone: String,
        /// The offending rate.
        rate: Dec,
    },

    /// The redemption rate left its inner bounds.
    RedemptionRateAlert {
        /// Chain id.
        zone: String,
        /// The offending rate.
        rate: Dec,
    },

    /// An admin resumed a halted zone.
    HostZoneResumed {
        /// Chain id.
        zone: String,
    },

    /// A slash was applied to a validator.
    ValidatorSlashed {
        /// Chain id.
        zone: String,
        /// Operator address.
        validator: String,
        /// Tokens lost.
        amount: Amount,
    },

    /// A slash above the cap halted the zone.
    SlashHalt {
        /// Chain id.
        zone: String,
        /// Operator address.
        validator: String,
        /// The slash as a fraction of the delegation.
        slash: Dec,
    },

    /// Withdrawn rewards were split and sent back into the pipeline.
    RewardsReinvested {
        /// Chain id.
        zone: String,
        /// Native reinvested.
        reinvested: Amount,
        /// Commission sent to the fee account.
        fee: Amount,
        /// Rebate sent to the community pool.
        rebate: Amount,
    },

    /// The fee account's balance reached the reward collector.
    FeesSwept {
        /// Chain id.
        zone: String,
        /// Native swept.
        amount: Amount,
    },

    /// Tokens deposited by the community pool were liquid staked and sent back to the host.
    CommunityPoolStaked {
        /// Chain id.
        zone: String,
        /// Native staked.
        native_amount: Amount,
        /// Derivative returned.
        st_amount: Amount,
    },

    /// The return account donated its balance of one denom to the community pool.
    CommunityPoolFunded {
        /// Chain id.
        zone: String,
        /// Denom on the host.
        denom: String,
        /// Amount donated.
        amount: Amount,
    },

    /// Redelegations were sent.
    Rebalanced {
        /// Chain id.
        zone: String,
        /// Number of redelegations.
        swaps: usize,
    },

    /// Unbonded tokens were swept to the redemption account.
    RedemptionSwept {
        /// Chain id.
        zone: String,
        /// Native swept.
        amount: Amount,
    },

    /// An interchain account reported its address.
    IcaAccountBound {
        /// Owner string.
        owner: String,
        /// Host address.
        address: String,
    },

    /// An interchain account channel closed.
    IcaChannelClosed {
        /// Owner string.
        owner: String,
    },
}
