//! A simulated host chain for tests and local networks.
//!
//! [`SimulatedHost`] keeps the bank, staking and distribution state a host zone exposes to the
//! core: it executes the messages of interchain account packets, answers queries by key and pays
//! out unbondings once they mature.

use std::collections::{BTreeMap, BTreeSet};

use liquid_stake_ica::{HostMsg, MsgResponse};
use liquid_stake_primitives::{
    coin::Coin,
    decimal::Dec,
    denom::LsmDenom,
    types::{Amount, Timestamp, NANOS_PER_DAY},
};

use crate::remote::{encode_value, RemoteBalance, RemoteDelegation, RemoteValidator};

/// A transfer the host sent towards the controller, waiting to be relayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundTransfer {
    /// Host-side channel it was sent on.
    pub channel_id: String,
    /// Sender on the host.
    pub sender: String,
    /// Receiver on the controller.
    pub receiver: String,
    /// Denom on the host.
    pub denom: String,
    pub amount: Amount,
}

/// Staking, bank and distribution state of a host chain.
#[derive(Debug, Clone, Default)]
pub struct SimulatedHost {
    /// Staking denom.
    pub denom: String,

    /// Days an undelegation takes to mature.
    pub unbonding_days: u64,

    /// Validators by operator address.
    pub validators: BTreeMap<String, RemoteValidator>,

    /// Shares held per delegator and validator.
    pub delegations: BTreeMap<(String, String), Dec>,

    /// Balances per address and denom.
    pub balances: BTreeMap<(String, String), Amount>,

    /// Rewards accrued per delegator and validator.
    pub rewards: BTreeMap<(String, String), Amount>,

    /// Type urls of messages the host refuses to execute.
    pub failing: BTreeSet<&'static str>,

    /// Donations to the community pool per denom.
    pub community_pool: BTreeMap<String, Amount>,

    /// Transfers sent off the host and not relayed yet.
    pub outbound: Vec<OutboundTransfer>,

    withdraw_addresses: BTreeMap<String, String>,
    unbondings: Vec<(String, Amount, Timestamp)>,
    time: Timestamp,
}

impl SimulatedHost {
    /// An empty chain staking `denom` at `time`.
    pub fn new(denom: impl Into<String>, unbonding_days: u64, time: Timestamp) -> Self {
        Self {
            denom: denom.into(),
            unbonding_days,
            time,
            ..Self::default()
        }
    }

    /// The chain's current time.
    pub const fn time(&self) -> Timestamp {
        self.time
    }

    /// Moves the clock to `time` and pays out the unbondings that matured by then.
    pub fn advance_to(&mut self, time: Timestamp) {
        self.time = self.time.max(time);

        let now = self.time;
        let (done, pending): (Vec<_>, Vec<_>) = self
            .unbondings
            .drain(..)
            .partition(|(_, _, completion)| *completion <= now);
        self.unbondings = pending;

        for (delegator, amount, _) in done {
            let denom = self.denom.clone();
            self.credit(&delegator, &denom, amount);
        }
    }

    /// Balance of `address` in `denom`.
    pub fn balance(&self, address: &str, denom: &str) -> Amount {
        self.balances
            .get(&(address.to_string(), denom.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Adds `amount` of `denom` to `address`.
    pub fn credit(&mut self, address: &str, denom: &str, amount: Amount) {
        *self
            .balances
            .entry((address.to_string(), denom.to_string()))
            .or_default() += amount;
    }

    fn debit(&mut self, address: &str, denom: &str, amount: Amount) -> Result<(), String> {
        let balance = self
            .balances
            .entry((address.to_string(), denom.to_string()))
            .or_default();
        if *balance < amount {
            return Err(format!("{address} holds {balance}{denom}, needs {amount}"));
        }

        *balance -= amount;
        Ok(())
    }

    /// Adds a validator holding `tokens` at a share rate of one.
    pub fn add_validator(&mut self, address: &str, tokens: Amount) {
        self.validators.insert(
            address.to_string(),
            RemoteValidator {
                operator_address: address.to_string(),
                tokens,
                delegator_shares: Dec::from_int(tokens),
            },
        );
    }

    /// Burns `percent` of a validator's tokens, lowering the value of each of its shares.
    pub fn slash(&mut self, address: &str, percent: u128) {
        if let Some(validator) = self.validators.get_mut(address) {
            validator.tokens -= validator.tokens * percent.min(100) / 100;
        }
    }

    /// Accrues `amount` of rewards to every delegation.
    pub fn accrue_rewards(&mut self, amount: Amount) {
        let keys: Vec<_> = self
            .delegations
            .iter()
            .filter(|(_, shares)| !shares.is_zero())
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            *self.rewards.entry(key).or_default() += amount;
        }
    }

    /// Native value of a delegation.
    pub fn delegation_tokens(&self, delegator: &str, validator: &str) -> Amount {
        let Some(shares) = self
            .delegations
            .get(&(delegator.to_string(), validator.to_string()))
        else {
            return 0;
        };

        self.rate(validator)
            .and_then(|rate| rate.checked_mul(*shares).map_err(|e| e.to_string()))
            .and_then(|tokens| tokens.truncate_int().map_err(|e| e.to_string()))
            .unwrap_or_default()
    }

    fn rate(&self, validator: &str) -> Result<Dec, String> {
        self.validators
            .get(validator)
            .ok_or_else(|| format!("unknown validator {validator}"))?
            .shares_to_tokens_rate()
            .map_err(|e| e.to_string())
    }

    fn add_shares(&mut self, delegator: &str, validator: &str, shares: Dec) -> Result<(), String> {
        let entry = self
            .delegations
            .entry((delegator.to_string(), validator.to_string()))
            .or_insert(Dec::ZERO);
        *entry = entry.checked_add(shares).map_err(|e| e.to_string())?;
        Ok(())
    }

    fn bond(&mut self, delegator: &str, validator: &str, amount: Amount) -> Result<(), String> {
        let shares = Dec::from_int(amount)
            .checked_quo(self.rate(validator)?)
            .map_err(|e| e.to_string())?;

        let remote = self
            .validators
            .get_mut(validator)
            .ok_or_else(|| format!("unknown validator {validator}"))?;
        remote.tokens += amount;
        remote.delegator_shares = remote
            .delegator_shares
            .checked_add(shares)
            .map_err(|e| e.to_string())?;

        self.add_shares(delegator, validator, shares)
    }

    fn unbond(&mut self, delegator: &str, validator: &str, amount: Amount) -> Result<(), String> {
        let shares = Dec::from_int(amount)
            .checked_quo(self.rate(validator)?)
            .map_err(|e| e.to_string())?;

        let key = (delegator.to_string(), validator.to_string());
        let held = self.delegations.get(&key).copied().unwrap_or(Dec::ZERO);
        let left = held
            .checked_sub(shares)
            .map_err(|_| format!("{delegator} cannot unbond {amount} from {validator}"))?;
        self.delegations.insert(key, left);

        let remote = self
            .validators
            .get_mut(validator)
            .ok_or_else(|| format!("unknown validator {validator}"))?;
        remote.tokens = remote.tokens.saturating_sub(amount);
        remote.delegator_shares = remote
            .delegator_shares
            .checked_sub(shares)
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Executes one message of an interchain account transaction.
    ///
    /// A failed message may leave partial writes behind; callers executing a whole transaction
    /// restore a snapshot taken before it.
    pub fn execute(&mut self, msg: &HostMsg) -> Result<MsgResponse, String> {
        if self.failing.contains(msg.type_url()) {
            return Err(format!("{} is disabled", msg.type_url()));
        }

        let completion_time = self.time + self.unbonding_days * NANOS_PER_DAY;
        match msg {
            HostMsg::Delegate {
                delegator_address,
                validator_address,
                amount,
            } => {
                self.debit(delegator_address, &amount.denom, amount.amount)?;
                self.bond(delegator_address, validator_address, amount.amount)?;
                Ok(MsgResponse::Empty)
            }
            HostMsg::Undelegate {
                delegator_address,
                validator_address,
                amount,
            } => {
                self.unbond(delegator_address, validator_address, amount.amount)?;
                self.unbondings
                    .push((delegator_address.clone(), amount.amount, completion_time));
                Ok(MsgResponse::Undelegate { completion_time })
            }
            HostMsg::BeginRedelegate {
                delegator_address,
                validator_src_address,
                validator_dst_address,
                amount,
            } => {
                self.unbond(delegator_address, validator_src_address, amount.amount)?;
                self.bond(delegator_address, validator_dst_address, amount.amount)?;
                Ok(MsgResponse::BeginRedelegate { completion_time })
            }
            HostMsg::WithdrawRewards {
                delegator_address,
                validator_address,
            } => {
                let amount = self
                    .rewards
                    .remove(&(delegator_address.clone(), validator_address.clone()))
                    .unwrap_or_default();
                let to = self
                    .withdraw_addresses
                    .get(delegator_address)
                    .cloned()
                    .unwrap_or_else(|| delegator_address.clone());
                let denom = self.denom.clone();
                self.credit(&to, &denom, amount);
                Ok(MsgResponse::WithdrawRewards { amount })
            }
            HostMsg::SendCoins {
                from_address,
                to_address,
                amount,
            } => {
                for coin in amount {
                    self.debit(from_address, &coin.denom, coin.amount)?;
                    self.credit(to_address, &coin.denom, coin.amount);
                }
                Ok(MsgResponse::Empty)
            }
            HostMsg::SetWithdrawAddress {
                delegator_address,
                withdraw_address,
            } => {
                self.withdraw_addresses
                    .insert(delegator_address.clone(), withdraw_address.clone());
                Ok(MsgResponse::Empty)
            }
            HostMsg::RedeemTokensForShares {
                delegator_address,
                amount,
            } => {
                self.debit(delegator_address, &amount.denom, amount.amount)?;
                let validator = LsmDenom::parse(&amount.denom)
                    .map_err(|e| e.to_string())?
                    .validator_address;
                let shares = Dec::from_int(amount.amount);
                let tokens = self
                    .rate(&validator)?
                    .checked_mul(shares)
                    .and_then(Dec::truncate_int)
                    .map_err(|e| e.to_string())?;
                self.add_shares(delegator_address, &validator, shares)?;
                Ok(MsgResponse::RedeemTokensForShares {
                    amount: Coin::new(&self.denom, tokens),
                })
            }
            HostMsg::Transfer {
                source_channel,
                token,
                sender,
                receiver,
                ..
            } => {
                self.debit(sender, &token.denom, token.amount)?;
                self.outbound.push(OutboundTransfer {
                    channel_id: source_channel.clone(),
                    sender: sender.clone(),
                    receiver: receiver.clone(),
                    denom: token.denom.clone(),
                    amount: token.amount,
                });
                Ok(MsgResponse::Transfer {
                    sequence: self.outbound.len() as u64,
                })
            }
            HostMsg::FundCommunityPool { amount, depositor } => {
                for coin in amount {
                    self.debit(depositor, &coin.denom, coin.amount)?;
                    *self.community_pool.entry(coin.denom.clone()).or_default() += coin.amount;
                }
                Ok(MsgResponse::Empty)
            }
            HostMsg::Grant { .. } | HostMsg::Revoke { .. } => Ok(MsgResponse::Empty),
        }
    }

    /// Hands the transfers sent since the last call to the relayer.
    pub fn take_outbound(&mut self) -> Vec<OutboundTransfer> {
        std::mem::take(&mut self.outbound)
    }

    /// Executes a whole transaction. Nothing is written unless every message succeeds.
    pub fn execute_tx(&mut self, msgs: &[HostMsg]) -> Result<Vec<MsgResponse>, String> {
        let snapshot = self.clone();

        let mut responses = Vec::with_capacity(msgs.len());
        for msg in msgs {
            match self.execute(msg) {
                Ok(response) => responses.push(response),
                Err(err) => {
                    *self = snapshot;
                    return Err(err);
                }
            }
        }
        Ok(responses)
    }

    /// The stored value under a query key, empty if absent.
    pub fn query(&self, key: &[u8]) -> Vec<u8> {
        let key = String::from_utf8_lossy(key);
        let parts: Vec<&str> = key.splitn(3, '/').collect();

        let value = match parts.as_slice() {
            ["validators", address] => self.validators.get(*address).map(encode_value),
            ["delegations", delegator, validator] => self
                .delegations
                .get(&(delegator.to_string(), validator.to_string()))
                .map(|shares| {
                    encode_value(&RemoteDelegation {
                        delegator_address: delegator.to_string(),
                        validator_address: validator.to_string(),
                        shares: *shares,
                    })
                }),
            ["balances", address, denom] => Some(encode_value(&RemoteBalance {
                address: address.to_string(),
                denom: denom.to_string(),
                amount: self.balance(address, denom),
            })),
            _ => None,
        };

        value.and_then(Result::ok).unwrap_or_default()
    }
}
