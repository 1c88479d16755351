//! Messages accepted by the core from users and admins.

use liquid_stake_ica::IcaAccountType;
use liquid_stake_primitives::{
    decimal::Dec,
    types::{Amount, EpochNumber},
};
use serde::{Deserialize, Serialize};

use crate::{admin::HostZoneConfig, trade_route::PermissionChange, validators::ValidatorConfig};

/// A message delivered to the core.
///
/// Every message names its sender. Admin messages are only accepted from the addresses listed in
/// the protocol parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Msg {
    // ===== Admin =====
    /// Registers a host zone and opens its interchain accounts.
    RegisterHostZone {
        /// Sender.
        creator: String,
        /// The zone.
        config: HostZoneConfig,
    },

    /// Adds validators to a zone.
    AddValidators {
        /// Sender.
        creator: String,
        /// The zone.
        host_zone: String,
        /// The validators.
        validators: Vec<ValidatorConfig>,
    },

    /// Changes the target weights of validators.
    ChangeValidatorWeights {
        /// Sender.
        creator: String,
        /// The zone.
        host_zone: String,
        /// Operator address and new weight.
        weights: Vec<(String, u64)>,
    },

    /// Removes a validator that holds no stake.
    DeleteValidator {
        /// Sender.
        creator: String,
        /// The zone.
        host_zone: String,
        /// Operator address.
        validator_address: String,
    },

    /// Reopens a closed interchain account channel.
    RestoreInterchainAccount {
        /// Sender.
        creator: String,
        /// The zone.
        chain_id: String,
        /// The account.
        account_type: IcaAccountType,
    },

    /// Lifts the halt of a zone whose rate is back within its outer bounds.
    ResumeHostZone {
        /// Sender.
        creator: String,
        /// The zone.
        chain_id: String,
    },

    /// Narrows the rate band that raises alerts.
    UpdateInnerRedemptionRateBounds {
        /// Sender.
        creator: String,
        /// The zone.
        chain_id: String,
        /// New inner minimum.
        min_inner_redemption_rate: Dec,
        /// New inner maximum.
        max_inner_redemption_rate: Dec,
    },

    /// Sets or clears the community pool rebate of a zone.
    SetCommunityPoolRebate {
        /// Sender.
        creator: String,
        /// The zone.
        chain_id: String,
        /// Share of the fee returned. Zero clears the rebate.
        rebate_rate: Dec,
        /// Derivative liquid staked by the community pool.
        liquid_staked_st_token_amount: Amount,
    },

    /// Registers a route converting a reward denom into the host denom.
    CreateTradeRoute {
        /// Sender.
        creator: String,
        /// The zone.
        host_zone_id: String,
        /// The reward denom.
        reward_denom: String,
        /// Connection to the chain the trade happens on.
        trade_connection_id: String,
    },

    /// Grants or revokes a trade controller.
    ToggleTradeController {
        /// Sender.
        creator: String,
        /// Reward denom of the route.
        reward_denom: String,
        /// Host denom of the route.
        host_denom: String,
        /// Grant or revoke.
        change: PermissionChange,
        /// The controller.
        address: String,
    },

    /// Moves stake towards the target weights.
    RebalanceValidators {
        /// Sender.
        creator: String,
        /// The zone.
        host_zone: String,
        /// Largest number of redelegations to send.
        max_swaps: usize,
    },

    /// Queries the share rate of a validator.
    UpdateValidatorSharesExchRate {
        /// Sender.
        creator: String,
        /// The zone.
        chain_id: String,
        /// Operator address.
        valoper: String,
    },

    // ===== User =====
    /// Deposits native vouchers for derivative.
    LiquidStake {
        /// Sender.
        creator: String,
        /// Amount deposited.
        amount: Amount,
        /// Host denom of the zone.
        host_denom: String,
    },

    /// Deposits LSM share vouchers for derivative.
    LsmLiquidStake {
        /// Sender.
        creator: String,
        /// Amount deposited.
        amount: Amount,
        /// Voucher denom of the shares.
        lsm_token_ibc_denom: String,
    },

    /// Burns derivative for native paid out on the host after unbonding.
    RedeemStake {
        /// Sender.
        creator: String,
        /// Derivative redeemed.
        amount: Amount,
        /// The zone.
        host_zone: String,
        /// Host address paid out.
        receiver: String,
    },

    /// Pays out a claimable redemption.
    ClaimUndelegatedTokens {
        /// Sender.
        creator: String,
        /// The zone.
        host_zone_id: String,
        /// Day epoch of the redemption.
        epoch: EpochNumber,
        /// Host address paid out.
        receiver: String,
    },
}

impl Msg {
    /// The sender.
    pub fn creator(&self) -> &str {
        match self {
            Self::RegisterHostZone { creator, .. }
            | Self::AddValidators { creator, .. }
            | Self::ChangeValidatorWeights { creator, .. }
            | Self::DeleteValidator { creator, .. }
            | Self::RestoreInterchainAccount { creator, .. }
            | Self::ResumeHostZone { creator, .. }
            | Self::UpdateInnerRedemptionRateBounds { creator, .. }
            | Self::SetCommunityPoolRebate { creator, .. }
            | Self::CreateTradeRoute { creator, .. }
            | Self::ToggleTradeController { creator, .. }
            | Self::RebalanceValidators { creator, .. }
            | Self::UpdateValidatorSharesExchRate { creator, .. }
            | Self::LiquidStake { creator, .. }
            | Self::LsmLiquidStake { creator, .. }
            | Self::RedeemStake { creator, .. }
            | Self::ClaimUndelegatedTokens { creator, .. } => creator,
        }
    }

    /// Returns `true` if only admins may send the message.
    pub const fn is_admin(&self) -> bool {
        !matches!(
            self,
            Self::LiquidStake { .. }
                | Self::LsmLiquidStake { .. }
                | Self::RedeemStake { .. }
                | Self::ClaimUndelegatedTokens { .. }
        )
    }

    /// Short name used in logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RegisterHostZone { .. } => "register_host_zone",
            Self::AddValidators { .. } => "add_validators",
            Self::ChangeValidatorWeights { .. } => "change_validator_weights",
            Self::DeleteValidator { .. } => "delete_validator",
            Self::RestoreInterchainAccount { .. } => "restore_interchain_account",
            Self::ResumeHostZone { .. } => "resume_host_zone",
            Self::UpdateInnerRedemptionRateBounds { .. } => "update_inner_redemption_rate_bounds",
            Self::SetCommunityPoolRebate { .. } => "set_community_pool_rebate",
            Self::CreateTradeRoute { .. } => "create_trade_route",
            Self::ToggleTradeController { .. } => "toggle_trade_controller",
            Self::RebalanceValidators { .. } => "rebalance_validators",
            Self::UpdateValidatorSharesExchRate { .. } => "update_validator_shares_exch_rate",
            Self::LiquidStake { .. } => "liquid_stake",
            Self::LsmLiquidStake { .. } => "lsm_liquid_stake",
            Self::RedeemStake { .. } => "redeem_stake",
            Self::ClaimUndelegatedTokens { .. } => "claim_undelegated_tokens",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_are_not_admin() {
        let stake = Msg::LiquidStake {
            creator: "stride1user".to_string(),
            amount: 10,
            host_denom: "uatom".to_string(),
        };
        assert!(!stake.is_admin());
        assert_eq!(stake.creator(), "stride1user");

        let resume = Msg::ResumeHostZone {
            creator: "stride1admin".to_string(),
            chain_id: "cosmoshub-4".to_string(),
        };
        assert!(resume.is_admin());
        assert_eq!(resume.name(), "resume_host_zone");
    }

    #[test]
    fn test_messages_read_from_json() {
        let msg: Msg = serde_json::from_str(
            r#"{"redeem_stake":{"creator":"stride1user","amount":5,"host_zone":"cosmoshub-4","receiver":"cosmos1user"}}"#,
        )
        .expect("must parse");

        assert_eq!(
            msg,
            Msg::RedeemStake {
                creator: "stride1user".to_string(),
                amount: 5,
                host_zone: "cosmoshub-4".to_string(),
                receiver: "cosmos1user".to_string(),
            }
        );
    }
}
