//! Deposit pipeline: controller deposits are transferred to the delegation account and delegated
//! across the validator set.

use liquid_stake_ica::{
    dispatch::{self, TransferRequest},
    AckResponse, HostMsg, IcaAccountType, PacketId,
};
use liquid_stake_primitives::{
    coin::Coin,
    types::{Amount, EpochNumber},
};
use liquid_stake_records::{DepositRecordStatus, DepositSource, RecordStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    bank,
    callbacks::{DELEGATE, TRANSFER},
    codec::{decode_args, encode_args},
    engine::Engine,
    epochs::stride_epoch_timeout,
    errors::StakeResult,
    host_zone::{require_host_zone, set_host_zone, WorkflowPhase},
    validators::{add_delegation, delegation_splits, mark_delegation_changes, validators_for_zone},
};

/// Arguments of a deposit transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferArgs {
    /// The transferred record.
    pub record_id: u64,
}

/// Arguments of a delegation packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateArgs {
    /// The zone.
    pub host_zone_id: String,

    /// The delegated record.
    pub record_id: u64,

    /// Amount delegated to each validator by this packet.
    pub splits: Vec<(String, Amount)>,
}

/// Opens the record that collects the liquid stakes of `epoch` and drops empty records of earlier
/// epochs.
pub fn open_deposit_record(engine: &mut Engine, chain_id: &str, epoch: EpochNumber) -> StakeResult<()> {
    let zone = require_host_zone(engine.store(), chain_id)?;

    let stale: Vec<u64> = engine
        .store()
        .deposit_records_by_status(chain_id, DepositRecordStatus::TransferQueue)?
        .into_iter()
        .filter(|record| {
            record.source == DepositSource::StrideDeposit
                && record.deposit_epoch_number < epoch
                && record.amount == 0
        })
        .map(|record| record.id)
        .collect();
    for id in stale {
        engine.store_mut().delete_deposit_record(id)?;
    }

    if engine
        .store()
        .get_transfer_deposit_record(chain_id, epoch)?
        .is_none()
    {
        let record = engine.store_mut().append_deposit_record(
            chain_id,
            &zone.host_denom,
            0,
            DepositRecordStatus::TransferQueue,
            DepositSource::StrideDeposit,
            epoch,
        )?;
        debug!(zone = %chain_id, %epoch, id = %record.id, "opened deposit record");
    }

    Ok(())
}

/// Transfers the funded records of earlier epochs to the delegation account. Returns the number
/// of transfers sent.
pub fn transfer_deposits(engine: &mut Engine, chain_id: &str, epoch: EpochNumber) -> StakeResult<u64> {
    let mut zone = require_host_zone(engine.store(), chain_id)?;
    let Some(delegation_address) = zone.ica_address(IcaAccountType::Delegation).map(str::to_string)
    else {
        debug!(zone = %chain_id, "delegation account not bound, skipping transfers");
        return Ok(0);
    };

    let records: Vec<_> = engine
        .store()
        .deposit_records_by_status(chain_id, DepositRecordStatus::TransferQueue)?
        .into_iter()
        .filter(|record| record.deposit_epoch_number < epoch && record.amount > 0)
        .collect();

    let timeout_timestamp = engine.transfer_timeout();
    let mut sent = 0;
    for mut record in records {
        let token = Coin::new(&zone.ibc_denom, record.amount);
        bank::burn(engine.store_mut(), &zone.deposit_address, &token)?;

        dispatch::send_transfer(
            engine,
            TransferRequest {
                channel_id: zone.transfer_channel_id.clone(),
                connection_id: zone.connection_id.clone(),
                token,
                sender: zone.deposit_address.clone(),
                receiver: delegation_address.clone(),
                timeout_timestamp,
                callback_id: TRANSFER.to_string(),
                callback_args: encode_args(&TransferArgs {
                    record_id: record.id,
                })?,
            },
        )?;

        record.status = DepositRecordStatus::TransferInProgress;
        engine.store_mut().set_deposit_record(&record)?;
        sent += 1;
    }

    if sent > 0 {
        zone.begin_phase(WorkflowPhase::Transfer, sent);
        set_host_zone(engine.store_mut(), &zone)?;
        info!(zone = %chain_id, transfers = %sent, "transferring deposits");
    }
    Ok(sent)
}

/// Settles a deposit transfer. A failed transfer goes back to the queue.
pub fn transfer_callback(
    engine: &mut Engine,
    packet: &PacketId,
    ack: &AckResponse,
    args: &[u8],
) -> StakeResult<()> {
    let TransferArgs { record_id } = decode_args(args)?;
    let Some(mut record) = engine.store().get_deposit_record(record_id)? else {
        warn!(%packet, %record_id, "transferred deposit record no longer exists");
        return Ok(());
    };

    let mut zone = require_host_zone(engine.store(), &record.host_zone_id)?;
    zone.end_phase(WorkflowPhase::Transfer);
    set_host_zone(engine.store_mut(), &zone)?;

    if ack.is_success() {
        record.status = DepositRecordStatus::DelegationQueue;
        info!(%packet, %record_id, amount = %record.amount, "deposit arrived on host");
    } else {
        // the voucher was burned when the transfer was sent
        bank::mint(
            engine.store_mut(),
            &zone.deposit_address,
            &Coin::new(&zone.ibc_denom, record.amount),
        )?;
        record.status = DepositRecordStatus::TransferQueue;
        warn!(%packet, %record_id, status = ?ack.status, "deposit transfer failed");
    }

    engine.store_mut().set_deposit_record(&record)?;
    Ok(())
}

/// Delegates queued records across the validators by weight. Returns the number of packets sent.
///
/// Each record's splits are sent in packets of at most the zone's message cap, and each packet
/// carries only its own splits.
pub fn delegate_deposits(engine: &mut Engine, chain_id: &str) -> StakeResult<u64> {
    let mut zone = require_host_zone(engine.store(), chain_id)?;
    if zone.phase_in_flight(WorkflowPhase::Delegate) {
        debug!(zone = %chain_id, "delegations still in flight");
        return Ok(0);
    }
    let Some(delegation_address) = zone.ica_address(IcaAccountType::Delegation).map(str::to_string)
    else {
        return Ok(0);
    };

    let limit = usize::try_from(engine.params().max_stake_ica_calls_per_epoch).unwrap_or(usize::MAX);
    let records: Vec<_> = engine
        .store()
        .deposit_records_by_status(chain_id, DepositRecordStatus::DelegationQueue)?
        .into_iter()
        .take(limit)
        .collect();
    if records.is_empty() {
        return Ok(0);
    }

    let validators = validators_for_zone(engine.store(), chain_id)?;
    let timeout = stride_epoch_timeout(engine.store(), engine.params())?;
    let chunk_size = zone.max_messages_per_ica_tx.max(1);

    let mut packets = 0;
    for mut record in records {
        if record.amount == 0 {
            engine.store_mut().delete_deposit_record(record.id)?;
            continue;
        }

        let splits = delegation_splits(&validators, record.amount)?;
        for chunk in splits.chunks(chunk_size) {
            let msgs = chunk
                .iter()
                .map(|(validator, amount)| HostMsg::Delegate {
                    delegator_address: delegation_address.clone(),
                    validator_address: validator.clone(),
                    amount: Coin::new(&zone.host_denom, *amount),
                })
                .collect();
            let args = encode_args(&DelegateArgs {
                host_zone_id: chain_id.to_string(),
                record_id: record.id,
                splits: chunk.to_vec(),
            })?;

            dispatch::submit_txs(
                engine,
                zone.ica_tx(IcaAccountType::Delegation, msgs, timeout, DELEGATE, args),
            )?;

            let addresses: Vec<&str> = chunk.iter().map(|(address, _)| address.as_str()).collect();
            mark_delegation_changes(engine.store_mut(), chain_id, &addresses, true)?;
            packets += 1;
        }

        record.status = DepositRecordStatus::DelegationInProgress;
        engine.store_mut().set_deposit_record(&record)?;
        info!(zone = %chain_id, id = %record.id, amount = %record.amount, validators = %splits.len(), "delegating deposit");
    }

    zone.begin_phase(WorkflowPhase::Delegate, packets);
    set_host_zone(engine.store_mut(), &zone)?;
    Ok(packets)
}

/// Settles one delegation packet of a record.
pub fn delegate_callback(
    engine: &mut Engine,
    packet: &PacketId,
    ack: &AckResponse,
    args: &[u8],
) -> StakeResult<()> {
    let args: DelegateArgs = decode_args(args)?;
    let chain_id = args.host_zone_id.as_str();

    let addresses: Vec<&str> = args.splits.iter().map(|(address, _)| address.as_str()).collect();
    mark_delegation_changes(engine.store_mut(), chain_id, &addresses, false)?;

    let mut zone = require_host_zone(engine.store(), chain_id)?;
    zone.end_phase(WorkflowPhase::Delegate);
    set_host_zone(engine.store_mut(), &zone)?;

    let record = engine.store().get_deposit_record(args.record_id)?;

    if !ack.is_success() {
        warn!(%packet, record_id = %args.record_id, status = ?ack.status, "delegation failed");
        if let Some(mut record) = record {
            record.status = DepositRecordStatus::DelegationQueue;
            engine.store_mut().set_deposit_record(&record)?;
        }
        return Ok(());
    }

    let mut delegated: Amount = 0;
    for (validator, amount) in &args.splits {
        add_delegation(engine.store_mut(), chain_id, validator, *amount)?;
        delegated += amount;
    }

    if let Some(mut record) = record {
        record.amount = record.amount.saturating_sub(delegated);
        if record.amount == 0 {
            engine.store_mut().delete_deposit_record(record.id)?;
        } else {
            engine.store_mut().set_deposit_record(&record)?;
        }
    }

    info!(%packet, zone = %chain_id, record_id = %args.record_id, %delegated, "delegation settled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use liquid_stake_ica::packet::PacketPayload;

    use super::*;
    use crate::{
        epochs::EpochIdentifier,
        testing::{valoper, TestEnv, HOST_DENOM, USER, ZONE},
    };

    fn records(env: &TestEnv, status: DepositRecordStatus) -> Vec<liquid_stake_records::DepositRecord> {
        env.engine
            .store()
            .deposit_records_by_status(ZONE, status)
            .unwrap()
    }

    #[test]
    fn test_deposit_is_transferred_then_delegated_by_weight() {
        let mut env = TestEnv::new();
        env.add_validators(&[(1, 1), (2, 3)]);
        env.fund(USER, 400);
        env.liquid_stake(USER, 400).unwrap();

        env.next_stride_epoch();
        let delegation = env.ica(IcaAccountType::Delegation);
        assert_eq!(env.host.balance(&delegation, HOST_DENOM), 400);
        assert_eq!(records(&env, DepositRecordStatus::DelegationQueue).len(), 1);

        env.next_stride_epoch();
        assert_eq!(env.host.delegation_tokens(&delegation, &valoper(1)), 100);
        assert_eq!(env.host.delegation_tokens(&delegation, &valoper(2)), 300);
        assert_eq!(env.zone().total_delegations, 400);
        env.assert_delegations_match();
        assert!(records(&env, DepositRecordStatus::DelegationQueue).is_empty());
        assert!(records(&env, DepositRecordStatus::DelegationInProgress).is_empty());
        assert!(!env.zone().phase_in_flight(WorkflowPhase::Delegate));
    }

    #[test]
    fn test_timed_out_transfer_returns_to_queue() {
        let mut env = TestEnv::new();
        env.add_validators(&[(1, 1)]);
        env.fund(USER, 250);
        env.liquid_stake(USER, 250).unwrap();
        let zone = env.zone();

        env.hold_packets = true;
        env.next_stride_epoch();
        let index = env
            .held
            .iter()
            .position(|packet| matches!(packet.payload, PacketPayload::Transfer(_)))
            .expect("transfer must be sent");
        let packet = env.held.remove(index);
        assert_eq!(records(&env, DepositRecordStatus::TransferInProgress).len(), 1);
        assert_eq!(
            bank::balance(env.engine.store(), &zone.deposit_address, &zone.ibc_denom).unwrap(),
            0
        );

        env.engine.timeout_packet(&packet.id).unwrap();
        let queued: Vec<_> = records(&env, DepositRecordStatus::TransferQueue)
            .into_iter()
            .filter(|record| record.amount > 0)
            .collect();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].amount, 250);
        assert_eq!(
            bank::balance(env.engine.store(), &zone.deposit_address, &zone.ibc_denom).unwrap(),
            250
        );
        assert!(!env.zone().phase_in_flight(WorkflowPhase::Transfer));

        env.hold_packets = false;
        env.next_stride_epoch();
        assert_eq!(records(&env, DepositRecordStatus::DelegationQueue).len(), 1);
    }

    #[test]
    fn test_empty_records_of_past_epochs_are_dropped() {
        let mut env = TestEnv::new();
        env.next_stride_epoch();
        env.next_stride_epoch();

        let epoch = env.epoch(EpochIdentifier::StrideEpoch);
        let queued = records(&env, DepositRecordStatus::TransferQueue);
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].deposit_epoch_number, epoch);
        assert_eq!(queued[0].amount, 0);
    }

    #[test]
    fn test_delegations_wait_for_a_bound_account() {
        let mut env = TestEnv::new();
        let mut zone = env.zone();
        zone.ica_addresses.remove(&IcaAccountType::Delegation);
        set_host_zone(env.engine.store_mut(), &zone).unwrap();

        assert_eq!(transfer_deposits(&mut env.engine, ZONE, 10).unwrap(), 0);
        assert_eq!(delegate_deposits(&mut env.engine, ZONE).unwrap(), 0);
    }
}
