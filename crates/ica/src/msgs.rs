//! Messages executed by interchain accounts on a host.

use liquid_stake_primitives::{
    coin::Coin,
    types::{Amount, Timestamp},
};
use serde::{Deserialize, Serialize};

/// A message executed on the host by an interchain account.
///
/// This is a closed set; the wire encoding is a serde adapter over the variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostMsg {
    /// Delegates `amount` to a validator.
    Delegate {
        /// The delegating account.
        delegator_address: String,
        /// Operator address of the validator.
        validator_address: String,
        /// Amount to delegate.
        amount: Coin,
    },

    /// Starts unbonding `amount` from a validator.
    Undelegate {
        /// The delegating account.
        delegator_address: String,
        /// Operator address of the validator.
        validator_address: String,
        /// Amount to unbond.
        amount: Coin,
    },

    /// Moves `amount` of stake between validators without unbonding.
    BeginRedelegate {
        /// The delegating account.
        delegator_address: String,
        /// Operator address of the source validator.
        validator_src_address: String,
        /// Operator address of the destination validator.
        validator_dst_address: String,
        /// Amount to move.
        amount: Coin,
    },

    /// Withdraws the pending rewards of one delegation.
    WithdrawRewards {
        /// The delegating account.
        delegator_address: String,
        /// Operator address of the validator.
        validator_address: String,
    },

    /// A bank send on the host.
    SendCoins {
        /// Sender on the host.
        from_address: String,
        /// Receiver on the host.
        to_address: String,
        /// Coins to send.
        amount: Vec<Coin>,
    },

    /// An outbound token transfer from the host.
    Transfer {
        /// Port the transfer is sent on.
        source_port: String,
        /// Channel the transfer is sent on.
        source_channel: String,
        /// Token to transfer.
        token: Coin,
        /// Sender on the host.
        sender: String,
        /// Receiver on the counterparty chain.
        receiver: String,
        /// Absolute timeout in unix nanos.
        timeout_timestamp: Timestamp,
        /// Free-form memo.
        memo: String,
    },

    /// Grants a generic authorization to another account.
    Grant {
        /// The account granting the authorization.
        granter: String,
        /// The account receiving the authorization.
        grantee: String,
        /// Type URL of the authorized message.
        msg_type_url: String,
    },

    /// Revokes an authorization granted earlier.
    Revoke {
        /// The account that granted the authorization.
        granter: String,
        /// The account that received the authorization.
        grantee: String,
        /// Type URL of the authorized message.
        msg_type_url: String,
    },

    /// Converts tokenized shares back into a delegation.
    RedeemTokensForShares {
        /// The account holding the tokenized shares.
        delegator_address: String,
        /// The tokenized shares.
        amount: Coin,
    },

    /// Routes staking rewards of a delegator to another account.
    SetWithdrawAddress {
        /// The delegating account.
        delegator_address: String,
        /// Where rewards are sent.
        withdraw_address: String,
    },

    /// Donates coins to the host's community pool.
    FundCommunityPool {
        /// Coins to donate.
        amount: Vec<Coin>,
        /// The donating account.
        depositor: String,
    },
}

impl HostMsg {
    /// The protobuf type URL of the message.
    pub const fn type_url(&self) -> &'static str {
        match self {
            HostMsg::Delegate { .. } => "/cosmos.staking.v1beta1.MsgDelegate",
            HostMsg::Undelegate { .. } => "/cosmos.staking.v1beta1.MsgUndelegate",
            HostMsg::BeginRedelegate { .. } => "/cosmos.staking.v1beta1.MsgBeginRedelegate",
            HostMsg::WithdrawRewards { .. } => {
                "/cosmos.distribution.v1beta1.MsgWithdrawDelegatorReward"
            }
            HostMsg::SendCoins { .. } => "/cosmos.bank.v1beta1.MsgSend",
            HostMsg::Transfer { .. } => "/ibc.applications.transfer.v1.MsgTransfer",
            HostMsg::Grant { .. } => "/cosmos.authz.v1beta1.MsgGrant",
            HostMsg::Revoke { .. } => "/cosmos.authz.v1beta1.MsgRevoke",
            HostMsg::RedeemTokensForShares { .. } => {
                "/cosmos.staking.v1beta1.MsgRedeemTokensForShares"
            }
            HostMsg::SetWithdrawAddress { .. } => {
                "/cosmos.distribution.v1beta1.MsgSetWithdrawAddress"
            }
            HostMsg::FundCommunityPool { .. } => "/cosmos.distribution.v1beta1.MsgFundCommunityPool",
        }
    }
}

/// The host's response to a single executed [`HostMsg`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgResponse {
    /// The message produced no data the controller needs.
    Empty,

    /// An undelegation was accepted.
    Undelegate {
        /// When the unbonding completes, in unix nanos.
        completion_time: Timestamp,
    },

    /// A redelegation was accepted.
    BeginRedelegate {
        /// When the redelegation completes, in unix nanos.
        completion_time: Timestamp,
    },

    /// Tokenized shares were converted back into a delegation.
    RedeemTokensForShares {
        /// The delegation that was created.
        amount: Coin,
    },

    /// A transfer left the host.
    Transfer {
        /// The packet sequence on the host.
        sequence: u64,
    },

    /// Rewards were withdrawn.
    WithdrawRewards {
        /// Rewards paid out.
        amount: Amount,
    },
}

impl MsgResponse {
    /// The completion time of an undelegation response.
    pub const fn undelegation_completion_time(&self) -> Option<Timestamp> {
        match self {
            MsgResponse::Undelegate { completion_time } => Some(*completion_time),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msgs_carry_type_tags() {
        let msg = HostMsg::Delegate {
            delegator_address: "cosmos1d".to_string(),
            validator_address: "cosmosvaloper1v".to_string(),
            amount: Coin::new("uatom", 10),
        };
        assert_eq!(msg.type_url(), "/cosmos.staking.v1beta1.MsgDelegate");

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.starts_with("{\"delegate\":"));
        assert_eq!(serde_json::from_str::<HostMsg>(&json).unwrap(), msg);
    }

    #[test]
    fn test_completion_time_lookup() {
        let responses = [
            MsgResponse::Empty,
            MsgResponse::Undelegate {
                completion_time: 42,
            },
        ];
        let latest = responses
            .iter()
            .filter_map(MsgResponse::undelegation_completion_time)
            .max();
        assert_eq!(latest, Some(42));
    }
}
