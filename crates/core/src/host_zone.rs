//! The host zone record and its registry table.

use std::collections::BTreeMap;

use liquid_stake_db::KvStore;
use liquid_stake_ica::{host_zone_owner, HostMsg, IcaAccountType, IcaTx};
use liquid_stake_params::Params;
use liquid_stake_primitives::{
    decimal::Dec,
    denom::DenomTrace,
    types::{Amount, Timestamp},
};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{StakeError, StakeResult},
    row_spec::HostZoneRowSpec,
};

/// Halt and alert thresholds of a zone's redemption rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RedemptionRateBounds {
    /// Below this the zone halts.
    pub outer_min: Dec,
    /// Below this an alert is raised.
    pub inner_min: Dec,
    /// Above this an alert is raised.
    pub inner_max: Dec,
    /// Above this the zone halts.
    pub outer_max: Dec,
}

impl RedemptionRateBounds {
    /// The default bounds from the params.
    pub fn from_params(params: &Params) -> Self {
        let (outer_min, outer_max) = params.outer_bounds();
        let (inner_min, inner_max) = params.inner_bounds();
        Self {
            outer_min,
            inner_min,
            inner_max,
            outer_max,
        }
    }

    /// Bounds are unset while all four are zero.
    pub fn is_initialized(&self) -> bool {
        *self != Self::default()
    }

    /// Checks `outer_min <= inner_min < 1 <= inner_max <= outer_max`.
    pub fn validate(&self) -> StakeResult<()> {
        let nested = self.outer_min <= self.inner_min
            && self.inner_min < Dec::ONE
            && Dec::ONE <= self.inner_max
            && self.inner_max <= self.outer_max;

        if !nested {
            return Err(StakeError::validation(format!(
                "redemption rate bounds are not nested: {} <= {} < 1 <= {} <= {}",
                self.outer_min, self.inner_min, self.inner_max, self.outer_max
            )));
        }

        Ok(())
    }

    /// Returns `true` if `rate` is inside the halt bounds.
    pub fn within_outer(&self, rate: Dec) -> bool {
        !self.is_initialized() || (self.outer_min <= rate && rate <= self.outer_max)
    }

    /// Returns `true` if `rate` is inside the alert bounds.
    pub fn within_inner(&self, rate: Dec) -> bool {
        !self.is_initialized() || (self.inner_min <= rate && rate <= self.inner_max)
    }
}

/// Share of reinvestment fees returned to a community pool that liquid staked with the zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityPoolRebate {
    /// Fraction of the fee returned, in `[0, 1]`.
    pub rebate_rate: Dec,

    /// Derivative the community pool holds.
    pub liquid_staked_st_token_amount: Amount,
}

/// A scheduler phase that sends packets and waits for their acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WorkflowPhase {
    /// Deposit transfers to the delegation account.
    Transfer,
    /// Delegations of queued deposits.
    Delegate,
    /// Reward withdrawals.
    WithdrawRewards,
    /// Reinvestment sends out of the withdrawal account.
    Reinvest,
    /// Undelegations.
    Unbond,
    /// Sweeps of unbonded tokens to the redemption account.
    Sweep,
    /// Redelegations.
    Rebalance,
    /// Redemptions of LSM shares into delegations.
    Detokenize,
    /// Transfers of the fee account's balance to the reward collector.
    FeeSweep,
    /// Transfers of community pool deposits to the controller.
    CommunityPoolDeposit,
    /// Donations from the return account back to the community pool.
    CommunityPoolReturn,
}

impl WorkflowPhase {
    /// The account whose channel carries the phase's packets. Transfers use the transfer channel.
    pub const fn account_type(&self) -> Option<IcaAccountType> {
        match self {
            WorkflowPhase::Transfer => None,
            WorkflowPhase::Reinvest => Some(IcaAccountType::Withdrawal),
            WorkflowPhase::Delegate
            | WorkflowPhase::WithdrawRewards
            | WorkflowPhase::Unbond
            | WorkflowPhase::Sweep
            | WorkflowPhase::Rebalance
            | WorkflowPhase::Detokenize => Some(IcaAccountType::Delegation),
            WorkflowPhase::FeeSweep => Some(IcaAccountType::Fee),
            WorkflowPhase::CommunityPoolDeposit => Some(IcaAccountType::CommunityPoolDeposit),
            WorkflowPhase::CommunityPoolReturn => Some(IcaAccountType::CommunityPoolReturn),
        }
    }
}

/// A remote chain onto which native assets are delegated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostZone {
    /// Chain id of the host.
    pub chain_id: String,

    /// Bech32 account prefix on the host.
    pub bech32_prefix: String,

    /// Native denom on the host.
    pub host_denom: String,

    /// Derivative denom on the controller.
    pub st_denom: String,

    /// Hash denom of the native asset on the controller.
    pub ibc_denom: String,

    /// Transfer channel to the host, controller side.
    pub transfer_channel_id: String,

    /// The same transfer channel, host side.
    pub counterparty_channel_id: String,

    /// Connection to the host.
    pub connection_id: String,

    /// Controller account that collects deposits and escrows redemptions.
    pub deposit_address: String,

    /// Controller account that liquid stakes what the community pool deposits.
    pub community_pool_holding_address: String,

    /// Host addresses of the zone's interchain accounts. Missing while unbound.
    pub ica_addresses: BTreeMap<IcaAccountType, String>,

    /// Redemption rate before the latest update.
    pub last_redemption_rate: Dec,

    /// Current redemption rate.
    pub redemption_rate: Dec,

    /// Halt and alert thresholds.
    pub bounds: RedemptionRateBounds,

    /// Sum of all validator delegations.
    pub total_delegations: Amount,

    /// Unbonding period of the host, in days.
    pub unbonding_period: u64,

    /// Set when the redemption rate leaves its outer bounds or a slash exceeds the cap.
    pub halted: bool,

    /// Whether LSM shares are accepted.
    pub lsm_enabled: bool,

    /// Deprecated zones are skipped by the scheduler.
    pub deprecated: bool,

    /// Optional community pool rebate.
    pub community_pool_rebate: Option<CommunityPoolRebate>,

    /// Cap on messages in one ICA transaction.
    pub max_messages_per_ica_tx: usize,

    /// Reinvestable balance observed in the withdrawal account.
    pub withdrawal_balance: Amount,

    /// Whether the delegation account's reward address points at the withdrawal account.
    pub withdrawal_address_set: bool,

    /// Packets in flight per phase.
    pub in_flight: BTreeMap<WorkflowPhase, u64>,
}

impl HostZone {
    /// Number of day epochs between unbondings: `ceil((period + 1) / 7)`.
    pub fn unbonding_frequency(&self) -> u64 {
        (self.unbonding_period + 1).div_ceil(7)
    }

    /// Denom of the zone's derivative once it is transferred to the host.
    pub fn st_denom_on_host(&self) -> String {
        DenomTrace::single_hop(&self.counterparty_channel_id, &self.st_denom).ibc_denom()
    }

    /// Host address of an account, if bound.
    pub fn ica_address(&self, account_type: IcaAccountType) -> Option<&str> {
        self.ica_addresses
            .get(&account_type)
            .map(String::as_str)
            .filter(|address| !address.is_empty())
    }

    /// Host address of an account, failing if it is not bound yet.
    pub fn require_ica_address(&self, account_type: IcaAccountType) -> StakeResult<String> {
        self.ica_address(account_type)
            .map(str::to_string)
            .ok_or_else(|| {
                StakeError::not_found("ica address", format!("{}.{account_type}", self.chain_id))
            })
    }

    /// A tx of `msgs` sent from one of the zone's accounts.
    pub fn ica_tx(
        &self,
        account_type: IcaAccountType,
        msgs: Vec<HostMsg>,
        timeout_timestamp: Timestamp,
        callback_id: &str,
        callback_args: Vec<u8>,
    ) -> IcaTx {
        IcaTx {
            owner: host_zone_owner(&self.chain_id, account_type),
            connection_id: self.connection_id.clone(),
            msgs,
            timeout_timestamp,
            callback_id: callback_id.to_string(),
            callback_args,
            max_messages: self.max_messages_per_ica_tx,
        }
    }

    /// Fails with [`StakeError::ZoneHalted`] if the zone is halted.
    pub fn ensure_not_halted(&self) -> StakeResult<()> {
        if self.halted {
            return Err(StakeError::ZoneHalted(self.chain_id.clone()));
        }

        Ok(())
    }

    /// Whether the scheduler should advance this zone.
    pub const fn is_active(&self) -> bool {
        !self.halted && !self.deprecated
    }

    /// Records `packets` more packets in flight for `phase`.
    pub fn begin_phase(&mut self, phase: WorkflowPhase, packets: u64) {
        if packets > 0 {
            *self.in_flight.entry(phase).or_default() += packets;
        }
    }

    /// Records one packet of `phase` as settled.
    pub fn end_phase(&mut self, phase: WorkflowPhase) {
        if let Some(count) = self.in_flight.get_mut(&phase) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.in_flight.remove(&phase);
            }
        }
    }

    /// Whether any packet of `phase` is in flight.
    pub fn phase_in_flight(&self, phase: WorkflowPhase) -> bool {
        self.in_flight.contains_key(&phase)
    }

    /// Forgets the in-flight packets of every phase that runs over `account_type`.
    pub fn clear_phases_for(&mut self, account_type: IcaAccountType) {
        self.in_flight
            .retain(|phase, _| phase.account_type() != Some(account_type));
    }
}

/// Reads a zone.
pub fn get_host_zone(store: &KvStore, chain_id: &str) -> StakeResult<Option<HostZone>> {
    Ok(store.get_row::<HostZoneRowSpec>(&chain_id.to_string())?)
}

/// Reads a zone, failing if it does not exist.
pub fn require_host_zone(store: &KvStore, chain_id: &str) -> StakeResult<HostZone> {
    get_host_zone(store, chain_id)?.ok_or_else(|| StakeError::not_found("host zone", chain_id))
}

/// Writes a zone.
pub fn set_host_zone(store: &mut KvStore, zone: &HostZone) -> StakeResult<()> {
    Ok(store.put_row::<HostZoneRowSpec>(&zone.chain_id, zone)?)
}

/// Returns every zone in chain id order.
pub fn all_host_zones(store: &KvStore) -> StakeResult<Vec<HostZone>> {
    Ok(store
        .collect_rows::<HostZoneRowSpec>(&[])?
        .into_iter()
        .map(|(_, zone)| zone)
        .collect())
}

/// Finds the zone whose native denom is `host_denom`.
pub fn host_zone_by_denom(store: &KvStore, host_denom: &str) -> StakeResult<HostZone> {
    all_host_zones(store)?
        .into_iter()
        .find(|zone| zone.host_denom == host_denom)
        .ok_or_else(|| StakeError::not_found("host zone for denom", host_denom))
}

/// Finds the zone reachable over the transfer channel `channel_id`.
pub fn host_zone_by_transfer_channel(store: &KvStore, channel_id: &str) -> StakeResult<HostZone> {
    all_host_zones(store)?
        .into_iter()
        .find(|zone| zone.transfer_channel_id == channel_id)
        .ok_or_else(|| StakeError::not_found("host zone for channel", channel_id))
}
