//! LSM ingest: liquid staking tokenized delegation shares.
//!
//! A deposit is held as `DepositPending` until a fresh share rate of its validator confirms the
//! value it was priced at. It is then minted against, moved to the delegation account and later
//! redeemed on the host into a regular delegation.

use liquid_stake_ica::{
    dispatch::{self, TransferRequest},
    AckResponse, HostMsg, IcaAccountType, MsgResponse, PacketId,
};
use liquid_stake_icq::{
    keeper::{is_in_flight, submit_query},
    types::STAKING_STORE_QUERY_WITH_PROOF,
    Query, TimeoutPolicy,
};
use liquid_stake_primitives::{
    coin::Coin,
    denom::{parse_ibc_hash, LsmDenom},
    types::Amount,
};
use liquid_stake_records::{LsmDepositStatus, LsmTokenDeposit, RecordStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    bank,
    callbacks::{DETOKENIZE, LSM_SHARES_RATE, LSM_TRANSFER},
    codec::{decode_args, encode_args},
    engine::{Engine, MODULE},
    errors::{StakeError, StakeResult},
    events::StakeEvent,
    host_zone::{host_zone_by_transfer_channel, require_host_zone, set_host_zone, WorkflowPhase},
    rate::mint_amount,
    remote::{decode_value, validator_key, RemoteValidator},
    slash,
    validators::{add_delegation, get_validator, mark_delegation_changes, require_validator},
};

/// Identifies an LSM deposit in callback arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LsmDepositKey {
    /// The zone.
    pub host_zone_id: String,

    /// LSM base denom on the host.
    pub denom: String,
}

impl LsmDepositKey {
    fn of(deposit: &LsmTokenDeposit) -> Self {
        Self {
            host_zone_id: deposit.host_zone_id.clone(),
            denom: deposit.denom.clone(),
        }
    }
}

/// Deposits LSM shares held as the voucher `ibc_denom` and queries the validator's share rate.
///
/// Nothing is minted until the query answers.
pub fn lsm_liquid_stake(
    engine: &mut Engine,
    creator: &str,
    amount: Amount,
    ibc_denom: &str,
) -> StakeResult<LsmTokenDeposit> {
    if amount == 0 {
        return Err(StakeError::validation("lsm liquid stake amount must be positive"));
    }

    parse_ibc_hash(ibc_denom)?;
    let trace = bank::get_denom_trace(engine.store(), ibc_denom)?
        .ok_or_else(|| StakeError::not_found("denom trace", ibc_denom))?;
    let zone = host_zone_by_transfer_channel(engine.store(), trace.single_hop_channel()?)?;

    if !zone.lsm_enabled {
        return Err(StakeError::validation(format!(
            "host zone {} does not accept lsm shares",
            zone.chain_id
        )));
    }
    zone.ensure_not_halted()?;

    let lsm_denom = LsmDenom::parse(&trace.base_denom)?;
    let validator = require_validator(engine.store(), &zone.chain_id, &lsm_denom.validator_address)?;
    if validator.shares_to_tokens_rate.is_zero() {
        return Err(StakeError::validation(format!(
            "share rate of {} is not known yet",
            validator.address
        )));
    }
    if validator.slash_query_in_progress {
        return Err(StakeError::validation(format!(
            "validator {} is being checked for a slash",
            validator.address
        )));
    }

    if engine
        .store()
        .get_lsm_deposit(&zone.chain_id, &trace.base_denom)?
        .is_some()
    {
        return Err(StakeError::validation(format!(
            "a deposit of {} is already in progress",
            trace.base_denom
        )));
    }

    let native_amount = validator.shares_to_tokens_rate.mul_int_truncate(amount)?;
    let st_amount = mint_amount(zone.redemption_rate, native_amount)?;

    let key = LsmDepositKey {
        host_zone_id: zone.chain_id.clone(),
        denom: trace.base_denom.clone(),
    };
    let query = Query::new(
        &zone.connection_id,
        &zone.chain_id,
        STAKING_STORE_QUERY_WITH_PROOF,
        validator_key(&validator.address),
        MODULE,
        LSM_SHARES_RATE,
    )
    .with_callback_data(encode_args(&key)?)
    .with_timeout(
        engine.params().lsm_query_timeout_nanos,
        TimeoutPolicy::ExecuteQueryCallback,
    );

    // a second deposit would refresh the first one's query instead of getting its own answer
    if is_in_flight(engine.store(), &query)? {
        return Err(StakeError::validation(format!(
            "a share rate query for {} is already in flight",
            validator.address
        )));
    }

    bank::send(
        engine.store_mut(),
        creator,
        &zone.deposit_address,
        &Coin::new(ibc_denom, amount),
    )?;

    let deposit = LsmTokenDeposit {
        deposit_id: LsmTokenDeposit::derive_id(
            engine.block().height,
            &zone.chain_id,
            creator,
            &trace.base_denom,
        ),
        host_zone_id: zone.chain_id.clone(),
        denom: trace.base_denom.clone(),
        ibc_denom: ibc_denom.to_string(),
        staker_address: creator.to_string(),
        validator_address: validator.address.clone(),
        amount,
        st_token_amount: st_amount,
        status: LsmDepositStatus::DepositPending,
    };
    engine.store_mut().set_lsm_deposit(&deposit)?;

    submit_query(engine, query, false)?;

    info!(
        zone = %zone.chain_id,
        staker = %creator,
        denom = %trace.base_denom,
        shares = %amount,
        "lsm deposit pending share rate check"
    );
    Ok(deposit)
}

fn refund(engine: &mut Engine, deposit: &LsmTokenDeposit, reason: String) -> StakeResult<()> {
    let zone = require_host_zone(engine.store(), &deposit.host_zone_id)?;

    bank::send(
        engine.store_mut(),
        &zone.deposit_address,
        &deposit.staker_address,
        &Coin::new(&deposit.ibc_denom, deposit.amount),
    )?;
    engine
        .store_mut()
        .delete_lsm_deposit(&deposit.host_zone_id, &deposit.denom)?;

    warn!(zone = %deposit.host_zone_id, id = %deposit.deposit_id, %reason, "lsm liquid stake refunded");
    engine.emit(StakeEvent::LsmLiquidStakeFailed {
        zone: deposit.host_zone_id.clone(),
        deposit_id: deposit.deposit_id.clone(),
        reason,
    });
    Ok(())
}

/// Finishes or refunds a pending LSM deposit once its validator's share rate is known.
///
/// Runs with an empty result when the query times out, which refunds the deposit.
pub fn shares_rate_callback(engine: &mut Engine, result: &[u8], query: &Query) -> StakeResult<()> {
    let key: LsmDepositKey = decode_args(&query.callback_data)?;
    let Some(deposit) = engine.store().get_lsm_deposit(&key.host_zone_id, &key.denom)? else {
        return Ok(());
    };
    if deposit.status != LsmDepositStatus::DepositPending {
        return Ok(());
    }

    let Some(remote) = decode_value::<RemoteValidator>(result)? else {
        return refund(engine, &deposit, "share rate query timed out".to_string());
    };
    let Some(validator) =
        get_validator(engine.store(), &deposit.host_zone_id, &deposit.validator_address)?
    else {
        return refund(engine, &deposit, "validator was removed".to_string());
    };

    let stored = validator.shares_to_tokens_rate;
    let observed = remote.shares_to_tokens_rate()?;
    if stored.is_zero() {
        return refund(engine, &deposit, "share rate of the validator is unknown".to_string());
    }

    let drift = stored.abs_diff(observed).checked_quo(stored)?;
    // the observed rate is fresh whatever becomes of the deposit
    slash::record_shares_rate(
        engine,
        &deposit.host_zone_id,
        &deposit.validator_address,
        observed,
    )?;
    if drift > engine.params().lsm_rate_tolerance() {
        return refund(
            engine,
            &deposit,
            format!("share rate moved from {stored} to {observed}"),
        );
    }

    let zone = require_host_zone(engine.store(), &deposit.host_zone_id)?;
    if zone.halted {
        return refund(engine, &deposit, format!("host zone {} is halted", zone.chain_id));
    }
    let Some(delegation_address) = zone.ica_address(IcaAccountType::Delegation).map(str::to_string)
    else {
        return refund(engine, &deposit, "delegation account is not bound".to_string());
    };

    let native_amount = stored.mul_int_truncate(deposit.amount)?;
    let st_amount = match mint_amount(zone.redemption_rate, native_amount) {
        Ok(st_amount) => st_amount,
        Err(err) => return refund(engine, &deposit, err.to_string()),
    };

    bank::mint(
        engine.store_mut(),
        &deposit.staker_address,
        &Coin::new(&zone.st_denom, st_amount),
    )?;

    let token = Coin::new(&deposit.ibc_denom, deposit.amount);
    bank::burn(engine.store_mut(), &zone.deposit_address, &token)?;
    let timeout_timestamp = engine.transfer_timeout();
    dispatch::send_transfer(
        engine,
        TransferRequest {
            channel_id: zone.transfer_channel_id.clone(),
            connection_id: zone.connection_id.clone(),
            token,
            sender: zone.deposit_address.clone(),
            receiver: delegation_address,
            timeout_timestamp,
            callback_id: LSM_TRANSFER.to_string(),
            callback_args: encode_args(&key)?,
        },
    )?;

    let deposit = LsmTokenDeposit {
        st_token_amount: st_amount,
        status: LsmDepositStatus::TransferInProgress,
        ..deposit
    };
    engine.store_mut().set_lsm_deposit(&deposit)?;

    info!(
        zone = %zone.chain_id,
        staker = %deposit.staker_address,
        native = %native_amount,
        st = %st_amount,
        "lsm liquid stake finished"
    );
    engine.emit(StakeEvent::LiquidStake {
        zone: zone.chain_id,
        staker: deposit.staker_address.clone(),
        native_amount,
        st_amount,
        lsm: true,
    });
    Ok(())
}

/// Settles the transfer of LSM shares to the delegation account.
pub fn transfer_callback(
    engine: &mut Engine,
    packet: &PacketId,
    ack: &AckResponse,
    args: &[u8],
) -> StakeResult<()> {
    let key: LsmDepositKey = decode_args(args)?;
    let Some(mut deposit) = engine.store().get_lsm_deposit(&key.host_zone_id, &key.denom)? else {
        return Ok(());
    };

    if ack.is_success() {
        deposit.status = LsmDepositStatus::DetokenizationQueue;
        debug!(%packet, denom = %key.denom, "lsm shares arrived on host");
    } else {
        // the voucher was burned when the transfer was sent
        let zone = require_host_zone(engine.store(), &key.host_zone_id)?;
        bank::mint(
            engine.store_mut(),
            &zone.deposit_address,
            &Coin::new(&deposit.ibc_denom, deposit.amount),
        )?;
        deposit.status = LsmDepositStatus::TransferFailed;
        warn!(%packet, denom = %key.denom, status = ?ack.status, "lsm share transfer failed");
    }

    engine.store_mut().set_lsm_deposit(&deposit)?;
    Ok(())
}

/// Redeems every queued or failed LSM deposit of a zone into a delegation. Returns the number of
/// packets sent.
pub fn detokenize_deposits(engine: &mut Engine, chain_id: &str) -> StakeResult<u64> {
    let mut zone = require_host_zone(engine.store(), chain_id)?;
    let Some(delegation_address) = zone.ica_address(IcaAccountType::Delegation).map(str::to_string)
    else {
        return Ok(0);
    };

    let mut deposits = engine
        .store()
        .lsm_deposits_by_status(chain_id, LsmDepositStatus::DetokenizationQueue)?;
    deposits.extend(
        engine
            .store()
            .lsm_deposits_by_status(chain_id, LsmDepositStatus::DetokenizationFailed)?,
    );

    let timeout = engine
        .block()
        .time
        .saturating_add(engine.params().detokenization_timeout_nanos);

    let mut packets = 0;
    for mut deposit in deposits {
        let msg = HostMsg::RedeemTokensForShares {
            delegator_address: delegation_address.clone(),
            amount: Coin::new(&deposit.denom, deposit.amount),
        };
        let args = encode_args(&LsmDepositKey::of(&deposit))?;
        dispatch::submit_txs(
            engine,
            zone.ica_tx(IcaAccountType::Delegation, vec![msg], timeout, DETOKENIZE, args),
        )?;

        deposit.status = LsmDepositStatus::DetokenizationInProgress;
        engine.store_mut().set_lsm_deposit(&deposit)?;
        mark_delegation_changes(
            engine.store_mut(),
            chain_id,
            &[deposit.validator_address.as_str()],
            true,
        )?;
        packets += 1;
    }

    if packets > 0 {
        zone.begin_phase(WorkflowPhase::Detokenize, packets);
        set_host_zone(engine.store_mut(), &zone)?;
        info!(zone = %chain_id, %packets, "detokenizing lsm deposits");
    }
    Ok(packets)
}

/// Settles the redemption of LSM shares into a delegation.
pub fn detokenize_callback(
    engine: &mut Engine,
    packet: &PacketId,
    ack: &AckResponse,
    args: &[u8],
) -> StakeResult<()> {
    let key: LsmDepositKey = decode_args(args)?;

    let mut zone = require_host_zone(engine.store(), &key.host_zone_id)?;
    zone.end_phase(WorkflowPhase::Detokenize);
    set_host_zone(engine.store_mut(), &zone)?;

    let Some(mut deposit) = engine.store().get_lsm_deposit(&key.host_zone_id, &key.denom)? else {
        return Ok(());
    };
    mark_delegation_changes(
        engine.store_mut(),
        &key.host_zone_id,
        &[deposit.validator_address.as_str()],
        false,
    )?;

    if !ack.is_success() {
        deposit.status = LsmDepositStatus::DetokenizationFailed;
        engine.store_mut().set_lsm_deposit(&deposit)?;
        warn!(%packet, denom = %key.denom, status = ?ack.status, "detokenization failed");
        return Ok(());
    }

    let redeemed = ack.msg_responses.iter().find_map(|response| match response {
        MsgResponse::RedeemTokensForShares { amount } => Some(amount.amount),
        _ => None,
    });
    let amount = match redeemed {
        Some(amount) => amount,
        None => require_validator(engine.store(), &key.host_zone_id, &deposit.validator_address)?
            .shares_to_tokens_rate
            .mul_int_truncate(deposit.amount)?,
    };

    add_delegation(
        engine.store_mut(),
        &key.host_zone_id,
        &deposit.validator_address,
        amount,
    )?;
    engine
        .store_mut()
        .delete_lsm_deposit(&key.host_zone_id, &key.denom)?;

    info!(%packet, zone = %key.host_zone_id, validator = %deposit.validator_address, %amount, "lsm shares redeemed into delegation");
    Ok(())
}
