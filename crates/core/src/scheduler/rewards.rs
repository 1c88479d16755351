//! Reward pipeline: rewards are withdrawn into the withdrawal account, the commission and any
//! community pool rebate are split off, and the rest is queued for delegation. The commission
//! collected in the fee account is swept to the controller's reward collector.

use liquid_stake_ica::{dispatch, AckResponse, HostMsg, IcaAccountType, PacketId};
use liquid_stake_icq::{keeper::submit_query, types::BANK_STORE_QUERY_WITH_PROOF, Query, TimeoutPolicy};
use liquid_stake_params::Params;
use liquid_stake_primitives::{
    address::module_address, coin::Coin, decimal::Dec, denom::TRANSFER_PORT, types::Amount,
};
use liquid_stake_records::{DepositRecordStatus, DepositSource, RecordStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    callbacks::{
        FEE_BALANCE, FEE_SWEEP, REINVEST, SET_WITHDRAWAL_ADDRESS, WITHDRAWAL_BALANCE,
        WITHDRAW_REWARDS,
    },
    codec::{decode_args, encode_args},
    engine::{Engine, MODULE},
    epochs::{current_epoch, stride_epoch_query_timeout, stride_epoch_timeout, EpochIdentifier},
    errors::StakeResult,
    events::StakeEvent,
    host_zone::{require_host_zone, set_host_zone, HostZone, WorkflowPhase},
    remote::{balance_key, decode_value, RemoteBalance},
    validators::validators_for_zone,
};

/// Arguments of packets that only need to name their zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneArgs {
    /// The zone.
    pub host_zone_id: String,
}

/// Arguments of a reinvestment packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReinvestArgs {
    /// The zone.
    pub host_zone_id: String,

    /// Sent to the delegation account.
    pub reinvest_amount: Amount,

    /// Commission kept by the protocol, rebate included.
    pub fee_amount: Amount,

    /// Share of the commission returned to the community pool.
    pub rebate_amount: Amount,
}

/// Points the delegation account's rewards at the withdrawal account, once per binding.
pub fn set_withdrawal_address(engine: &mut Engine, chain_id: &str) -> StakeResult<()> {
    let mut zone = require_host_zone(engine.store(), chain_id)?;
    if zone.withdrawal_address_set {
        return Ok(());
    }

    let (Some(delegation_address), Some(withdrawal_address)) = (
        zone.ica_address(IcaAccountType::Delegation),
        zone.ica_address(IcaAccountType::Withdrawal),
    ) else {
        return Ok(());
    };

    let msg = HostMsg::SetWithdrawAddress {
        delegator_address: delegation_address.to_string(),
        withdraw_address: withdrawal_address.to_string(),
    };
    let args = encode_args(&ZoneArgs {
        host_zone_id: chain_id.to_string(),
    })?;
    let timeout = engine.ica_timeout();
    dispatch::submit_txs(
        engine,
        zone.ica_tx(IcaAccountType::Delegation, vec![msg], timeout, SET_WITHDRAWAL_ADDRESS, args),
    )?;

    // set optimistically so the next epoch does not send it again while it is in flight
    zone.withdrawal_address_set = true;
    set_host_zone(engine.store_mut(), &zone)?;

    info!(zone = %chain_id, "setting withdrawal address");
    Ok(())
}

/// Resets the withdrawal address flag if setting it failed.
pub fn withdrawal_address_callback(
    engine: &mut Engine,
    packet: &PacketId,
    ack: &AckResponse,
    args: &[u8],
) -> StakeResult<()> {
    let ZoneArgs { host_zone_id } = decode_args(args)?;
    if ack.is_success() {
        debug!(%packet, zone = %host_zone_id, "withdrawal address set");
        return Ok(());
    }

    let mut zone = require_host_zone(engine.store(), &host_zone_id)?;
    zone.withdrawal_address_set = false;
    set_host_zone(engine.store_mut(), &zone)?;

    warn!(%packet, zone = %host_zone_id, status = ?ack.status, "setting withdrawal address failed");
    Ok(())
}

/// Withdraws the rewards of every delegation. Returns the number of packets sent.
pub fn withdraw_rewards(engine: &mut Engine, chain_id: &str) -> StakeResult<u64> {
    let mut zone = require_host_zone(engine.store(), chain_id)?;
    if !zone.withdrawal_address_set || zone.phase_in_flight(WorkflowPhase::WithdrawRewards) {
        return Ok(0);
    }
    let delegation_address = zone.require_ica_address(IcaAccountType::Delegation)?;

    let msgs: Vec<HostMsg> = validators_for_zone(engine.store(), chain_id)?
        .into_iter()
        .filter(|validator| validator.delegation > 0)
        .map(|validator| HostMsg::WithdrawRewards {
            delegator_address: delegation_address.clone(),
            validator_address: validator.address,
        })
        .collect();
    if msgs.is_empty() {
        return Ok(0);
    }

    let args = encode_args(&ZoneArgs {
        host_zone_id: chain_id.to_string(),
    })?;
    let timeout = stride_epoch_timeout(engine.store(), engine.params())?;
    let sequences = dispatch::submit_chunked(
        engine,
        zone.ica_tx(IcaAccountType::Delegation, msgs, timeout, WITHDRAW_REWARDS, args),
    )?;

    let packets = sequences.len() as u64;
    zone.begin_phase(WorkflowPhase::WithdrawRewards, packets);
    set_host_zone(engine.store_mut(), &zone)?;

    info!(zone = %chain_id, %packets, "withdrawing rewards");
    Ok(packets)
}

/// Settles one reward withdrawal packet.
pub fn withdraw_rewards_callback(
    engine: &mut Engine,
    packet: &PacketId,
    ack: &AckResponse,
    args: &[u8],
) -> StakeResult<()> {
    let ZoneArgs { host_zone_id } = decode_args(args)?;

    let mut zone = require_host_zone(engine.store(), &host_zone_id)?;
    zone.end_phase(WorkflowPhase::WithdrawRewards);
    set_host_zone(engine.store_mut(), &zone)?;

    if !ack.is_success() {
        warn!(%packet, zone = %host_zone_id, status = ?ack.status, "reward withdrawal failed");
    }
    Ok(())
}

/// Queries the balance of the withdrawal account. Returns the query id, if one was submitted.
pub fn query_withdrawal_balance(engine: &mut Engine, chain_id: &str) -> StakeResult<Option<String>> {
    let zone = require_host_zone(engine.store(), chain_id)?;
    if zone.phase_in_flight(WorkflowPhase::Reinvest) {
        debug!(zone = %chain_id, "reinvestment still in flight");
        return Ok(None);
    }
    let Some(withdrawal_address) = zone.ica_address(IcaAccountType::Withdrawal) else {
        return Ok(None);
    };

    let timeout = stride_epoch_query_timeout(engine.store(), engine.params(), engine.block().time)?;
    let query = Query::new(
        &zone.connection_id,
        chain_id,
        BANK_STORE_QUERY_WITH_PROOF,
        balance_key(withdrawal_address, &zone.host_denom),
        MODULE,
        WITHDRAWAL_BALANCE,
    )
    .with_timeout(timeout, TimeoutPolicy::RejectQueryResponse);

    let id = submit_query(engine, query, false)?;
    debug!(zone = %chain_id, %id, "queried withdrawal balance");
    Ok(Some(id))
}

/// How a withdrawal balance is split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardSplit {
    /// Kept by the protocol.
    pub fee: Amount,

    /// Returned to the community pool, out of the fee.
    pub rebate: Amount,

    /// Sent back into delegation.
    pub reinvest: Amount,
}

/// Splits `amount` of rewards into commission, rebate and reinvestment.
///
/// The rebate is the community pool's share of the zone's stake applied to the fee, times the
/// rebate rate.
pub fn split_rewards(zone: &HostZone, commission: Dec, amount: Amount) -> StakeResult<RewardSplit> {
    let fee = commission.mul_int_truncate(amount)?;

    let rebate = match zone.community_pool_rebate {
        Some(rebate) if zone.total_delegations > 0 => {
            let share = Dec::from_ratio(rebate.liquid_staked_st_token_amount, zone.total_delegations)?
                .min(Dec::ONE);
            share.checked_mul(rebate.rebate_rate)?.mul_int_truncate(fee)?
        }
        _ => 0,
    };

    Ok(RewardSplit {
        fee,
        rebate,
        reinvest: amount - fee,
    })
}

/// Splits the observed withdrawal balance and sends it out of the withdrawal account.
pub fn withdrawal_balance_callback(engine: &mut Engine, result: &[u8], query: &Query) -> StakeResult<()> {
    let chain_id = query.chain_id.as_str();
    let mut zone = require_host_zone(engine.store(), chain_id)?;
    if zone.phase_in_flight(WorkflowPhase::Reinvest) {
        return Ok(());
    }

    let amount = decode_value::<RemoteBalance>(result)?
        .map(|balance| balance.amount)
        .unwrap_or_default();
    if amount == 0 {
        debug!(zone = %chain_id, "withdrawal account is empty");
        return Ok(());
    }

    let split = split_rewards(&zone, engine.params().commission_rate(), amount)?;
    let withdrawal_address = zone.require_ica_address(IcaAccountType::Withdrawal)?;
    let coin = |amount| vec![Coin::new(&zone.host_denom, amount)];

    let mut msgs = Vec::new();
    if split.fee > split.rebate {
        msgs.push(HostMsg::SendCoins {
            from_address: withdrawal_address.clone(),
            to_address: zone.require_ica_address(IcaAccountType::Fee)?,
            amount: coin(split.fee - split.rebate),
        });
    }
    if split.rebate > 0 {
        msgs.push(HostMsg::SendCoins {
            from_address: withdrawal_address.clone(),
            to_address: zone.require_ica_address(IcaAccountType::CommunityPoolReturn)?,
            amount: coin(split.rebate),
        });
    }
    if split.reinvest > 0 {
        msgs.push(HostMsg::SendCoins {
            from_address: withdrawal_address.clone(),
            to_address: zone.require_ica_address(IcaAccountType::Delegation)?,
            amount: coin(split.reinvest),
        });
    }

    let args = encode_args(&ReinvestArgs {
        host_zone_id: chain_id.to_string(),
        reinvest_amount: split.reinvest,
        fee_amount: split.fee,
        rebate_amount: split.rebate,
    })?;
    let timeout = stride_epoch_timeout(engine.store(), engine.params())?;
    dispatch::submit_txs(
        engine,
        zone.ica_tx(IcaAccountType::Withdrawal, msgs, timeout, REINVEST, args),
    )?;

    zone.withdrawal_balance = split.reinvest;
    zone.begin_phase(WorkflowPhase::Reinvest, 1);
    set_host_zone(engine.store_mut(), &zone)?;

    info!(
        zone = %chain_id,
        %amount,
        fee = %split.fee,
        rebate = %split.rebate,
        reinvest = %split.reinvest,
        "reinvesting rewards"
    );
    Ok(())
}

/// Settles a reinvestment and queues the reinvested amount for delegation.
pub fn reinvest_callback(
    engine: &mut Engine,
    packet: &PacketId,
    ack: &AckResponse,
    args: &[u8],
) -> StakeResult<()> {
    let args: ReinvestArgs = decode_args(args)?;
    let chain_id = args.host_zone_id.as_str();

    let mut zone = require_host_zone(engine.store(), chain_id)?;
    zone.end_phase(WorkflowPhase::Reinvest);
    zone.withdrawal_balance = 0;
    set_host_zone(engine.store_mut(), &zone)?;

    if !ack.is_success() {
        warn!(%packet, zone = %chain_id, status = ?ack.status, "reinvestment failed");
        return Ok(());
    }

    if args.reinvest_amount > 0 {
        let epoch = current_epoch(engine.store(), EpochIdentifier::StrideEpoch)?;
        let record = engine.store_mut().append_deposit_record(
            chain_id,
            &zone.host_denom,
            args.reinvest_amount,
            DepositRecordStatus::DelegationQueue,
            DepositSource::WithdrawalIca,
            epoch,
        )?;
        debug!(zone = %chain_id, id = %record.id, "queued reinvested rewards");
    }

    info!(%packet, zone = %chain_id, reinvested = %args.reinvest_amount, "reinvestment settled");
    engine.emit(StakeEvent::RewardsReinvested {
        zone: chain_id.to_string(),
        reinvested: args.reinvest_amount,
        fee: args.fee_amount,
        rebate: args.rebate_amount,
    });
    Ok(())
}

// ===== Fee Sweep =====

/// Arguments of a fee sweep packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSweepArgs {
    /// The zone.
    pub host_zone_id: String,

    /// Native sent to the reward collector.
    pub amount: Amount,
}

/// Controller account that collects the commission of every zone.
pub fn reward_collector_address(params: &Params) -> StakeResult<String> {
    Ok(module_address(&params.controller_prefix, MODULE, "reward_collector")?)
}

/// Queries the balance of the fee account. Returns the query id, if one was submitted.
pub fn query_fee_balance(engine: &mut Engine, chain_id: &str) -> StakeResult<Option<String>> {
    let zone = require_host_zone(engine.store(), chain_id)?;
    if zone.phase_in_flight(WorkflowPhase::FeeSweep) {
        return Ok(None);
    }
    let Some(fee_address) = zone.ica_address(IcaAccountType::Fee) else {
        return Ok(None);
    };

    let timeout = stride_epoch_query_timeout(engine.store(), engine.params(), engine.block().time)?;
    let query = Query::new(
        &zone.connection_id,
        chain_id,
        BANK_STORE_QUERY_WITH_PROOF,
        balance_key(fee_address, &zone.host_denom),
        MODULE,
        FEE_BALANCE,
    )
    .with_timeout(timeout, TimeoutPolicy::RejectQueryResponse);

    let id = submit_query(engine, query, false)?;
    debug!(zone = %chain_id, %id, "queried fee balance");
    Ok(Some(id))
}

/// Transfers the observed fee balance to the reward collector.
pub fn fee_balance_callback(engine: &mut Engine, result: &[u8], query: &Query) -> StakeResult<()> {
    let chain_id = query.chain_id.as_str();
    let mut zone = require_host_zone(engine.store(), chain_id)?;
    if zone.phase_in_flight(WorkflowPhase::FeeSweep) {
        return Ok(());
    }

    let amount = decode_value::<RemoteBalance>(result)?
        .map(|balance| balance.amount)
        .unwrap_or_default();
    if amount == 0 {
        debug!(zone = %chain_id, "fee account is empty");
        return Ok(());
    }

    let timeout = stride_epoch_timeout(engine.store(), engine.params())?;
    let msg = HostMsg::Transfer {
        source_port: TRANSFER_PORT.to_string(),
        source_channel: zone.counterparty_channel_id.clone(),
        token: Coin::new(&zone.host_denom, amount),
        sender: zone.require_ica_address(IcaAccountType::Fee)?,
        receiver: reward_collector_address(engine.params())?,
        timeout_timestamp: timeout,
        memo: String::new(),
    };
    let args = encode_args(&FeeSweepArgs {
        host_zone_id: chain_id.to_string(),
        amount,
    })?;
    dispatch::submit_txs(
        engine,
        zone.ica_tx(IcaAccountType::Fee, vec![msg], timeout, FEE_SWEEP, args),
    )?;

    zone.begin_phase(WorkflowPhase::FeeSweep, 1);
    set_host_zone(engine.store_mut(), &zone)?;

    info!(zone = %chain_id, %amount, "sweeping fees to the reward collector");
    Ok(())
}

/// Settles a fee sweep.
pub fn fee_sweep_callback(
    engine: &mut Engine,
    packet: &PacketId,
    ack: &AckResponse,
    args: &[u8],
) -> StakeResult<()> {
    let FeeSweepArgs {
        host_zone_id,
        amount,
    } = decode_args(args)?;

    let mut zone = require_host_zone(engine.store(), &host_zone_id)?;
    zone.end_phase(WorkflowPhase::FeeSweep);
    set_host_zone(engine.store_mut(), &zone)?;

    if !ack.is_success() {
        warn!(%packet, zone = %host_zone_id, status = ?ack.status, "fee sweep failed");
        return Ok(());
    }

    info!(%packet, zone = %host_zone_id, %amount, "fees swept");
    engine.emit(StakeEvent::FeesSwept {
        zone: host_zone_id,
        amount,
    });
    Ok(())
}
