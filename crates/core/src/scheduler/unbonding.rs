//! Unbonding pipeline: queued redemptions are undelegated in one batch per zone, swept into the
//! redemption account once the host finishes unbonding them, and then become claimable.

use liquid_stake_ica::{dispatch, AckResponse, HostMsg, IcaAccountType, PacketId};
use liquid_stake_primitives::{
    coin::Coin,
    types::{Amount, EpochNumber},
};
use liquid_stake_records::{HostZoneUnbondingStatus, RecordStore, UserRedemptionId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    bank,
    callbacks::{SWEEP, UNDELEGATE},
    codec::{decode_args, encode_args},
    engine::Engine,
    epochs::day_epoch_timeout,
    errors::StakeResult,
    events::StakeEvent,
    host_zone::{require_host_zone, set_host_zone, WorkflowPhase},
    rate::redeem_amount,
    validators::{mark_delegation_changes, remove_delegation, unbonding_splits, validators_for_zone},
};

/// Arguments of an undelegation packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndelegateArgs {
    /// The zone.
    pub host_zone_id: String,

    /// Day epochs of the unbondings carried by the packet.
    pub epochs: Vec<EpochNumber>,

    /// Amount undelegated from each validator.
    pub splits: Vec<(String, Amount)>,
}

/// Arguments of a sweep packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepArgs {
    /// The zone.
    pub host_zone_id: String,

    /// Day epochs of the swept unbondings.
    pub epochs: Vec<EpochNumber>,
}

/// Undelegates every queued unbonding of a zone in a single packet, on the days the zone's
/// unbonding frequency allows. Returns the native amount undelegated.
pub fn initiate_unbonding(engine: &mut Engine, chain_id: &str, day: EpochNumber) -> StakeResult<Amount> {
    let mut zone = require_host_zone(engine.store(), chain_id)?;
    if day % zone.unbonding_frequency() != 0 || zone.phase_in_flight(WorkflowPhase::Unbond) {
        return Ok(0);
    }

    let mut unbondings: Vec<_> = engine
        .store()
        .host_zone_unbondings_by_status(chain_id, HostZoneUnbondingStatus::UnbondingQueue)?
        .into_iter()
        .filter(|unbonding| unbonding.st_token_amount > 0)
        .collect();
    if unbondings.is_empty() {
        return Ok(0);
    }

    // redemptions are paid at the rate of the day they unbond
    let mut total: Amount = 0;
    for unbonding in &mut unbondings {
        let mut native: Amount = 0;
        for id in &unbonding.user_redemption_records {
            let id = UserRedemptionId::parse(id)?;
            let Some(mut record) = engine.store().get_user_redemption_record(&id)? else {
                continue;
            };
            record.native_token_amount = redeem_amount(zone.redemption_rate, record.st_token_amount)?;
            native += record.native_token_amount;
            engine.store_mut().set_user_redemption_record(&record)?;
        }

        unbonding.native_token_amount = native;
        unbonding.native_tokens_to_unbond = native;
        unbonding.st_tokens_to_burn = unbonding.st_token_amount;
        total += native;
    }
    if total == 0 {
        return Ok(0);
    }

    let delegation_address = zone.require_ica_address(IcaAccountType::Delegation)?;
    let validators = validators_for_zone(engine.store(), chain_id)?;
    let splits = unbonding_splits(&validators, zone.total_delegations, total)?;

    let msgs = splits
        .iter()
        .map(|(validator, amount)| HostMsg::Undelegate {
            delegator_address: delegation_address.clone(),
            validator_address: validator.clone(),
            amount: Coin::new(&zone.host_denom, *amount),
        })
        .collect();
    let epochs: Vec<EpochNumber> = unbondings.iter().map(|u| u.epoch_number).collect();
    let args = encode_args(&UndelegateArgs {
        host_zone_id: chain_id.to_string(),
        epochs: epochs.clone(),
        splits: splits.clone(),
    })?;
    let timeout = day_epoch_timeout(engine.store())?;

    dispatch::submit_txs(
        engine,
        zone.ica_tx(IcaAccountType::Delegation, msgs, timeout, UNDELEGATE, args),
    )?;

    for unbonding in &mut unbondings {
        unbonding.status = HostZoneUnbondingStatus::UnbondingInProgress;
        engine.store_mut().set_host_zone_unbonding(unbonding)?;
    }
    let addresses: Vec<&str> = splits.iter().map(|(address, _)| address.as_str()).collect();
    mark_delegation_changes(engine.store_mut(), chain_id, &addresses, true)?;

    zone.begin_phase(WorkflowPhase::Unbond, 1);
    set_host_zone(engine.store_mut(), &zone)?;

    info!(zone = %chain_id, %day, ?epochs, %total, validators = %splits.len(), "unbonding");
    Ok(total)
}

/// Settles an undelegation: the escrowed derivative is burned and the unbondings wait for the
/// host to release the tokens.
pub fn undelegate_callback(
    engine: &mut Engine,
    packet: &PacketId,
    ack: &AckResponse,
    args: &[u8],
) -> StakeResult<()> {
    let args: UndelegateArgs = decode_args(args)?;
    let chain_id = args.host_zone_id.as_str();

    let addresses: Vec<&str> = args.splits.iter().map(|(address, _)| address.as_str()).collect();
    mark_delegation_changes(engine.store_mut(), chain_id, &addresses, false)?;

    let mut zone = require_host_zone(engine.store(), chain_id)?;
    zone.end_phase(WorkflowPhase::Unbond);
    set_host_zone(engine.store_mut(), &zone)?;

    let mut unbondings = Vec::with_capacity(args.epochs.len());
    for epoch in &args.epochs {
        if let Some(unbonding) = engine.store().get_host_zone_unbonding(*epoch, chain_id)? {
            unbondings.push(unbonding);
        }
    }

    if !ack.is_success() {
        for mut unbonding in unbondings {
            unbonding.status = HostZoneUnbondingStatus::UnbondingQueue;
            engine.store_mut().set_host_zone_unbonding(&unbonding)?;
        }
        warn!(%packet, zone = %chain_id, status = ?ack.status, "undelegation failed");
        return Ok(());
    }

    let completion_time = ack
        .msg_responses
        .iter()
        .filter_map(|response| response.undelegation_completion_time())
        .max()
        .unwrap_or(engine.block().time);

    for (validator, amount) in &args.splits {
        remove_delegation(engine.store_mut(), chain_id, validator, *amount)?;
    }

    let to_burn: Amount = unbondings.iter().map(|u| u.st_tokens_to_burn).sum();
    if to_burn > 0 {
        bank::burn(
            engine.store_mut(),
            &zone.deposit_address,
            &Coin::new(&zone.st_denom, to_burn),
        )?;
    }

    for mut unbonding in unbondings {
        unbonding.status = HostZoneUnbondingStatus::ExitTransferQueue;
        unbonding.unbonding_time = completion_time;
        engine.store_mut().set_host_zone_unbonding(&unbonding)?;
    }

    info!(%packet, zone = %chain_id, epochs = ?args.epochs, burned = %to_burn, %completion_time, "undelegation settled");
    Ok(())
}

/// Sweeps unbondings the host has released into the redemption account. Returns the amount swept.
pub fn sweep_unbonded_tokens(engine: &mut Engine, chain_id: &str) -> StakeResult<Amount> {
    let mut zone = require_host_zone(engine.store(), chain_id)?;
    if zone.phase_in_flight(WorkflowPhase::Sweep) {
        return Ok(0);
    }

    let host_time = engine.host_time(&zone.connection_id)?;
    let mut unbondings: Vec<_> = engine
        .store()
        .host_zone_unbondings_by_status(chain_id, HostZoneUnbondingStatus::ExitTransferQueue)?
        .into_iter()
        .filter(|unbonding| unbonding.unbonding_time <= host_time)
        .collect();
    if unbondings.is_empty() {
        return Ok(0);
    }

    let total: Amount = unbondings.iter().map(|u| u.native_token_amount).sum();
    let epochs: Vec<EpochNumber> = unbondings.iter().map(|u| u.epoch_number).collect();

    if total > 0 {
        let msg = HostMsg::SendCoins {
            from_address: zone.require_ica_address(IcaAccountType::Delegation)?,
            to_address: zone.require_ica_address(IcaAccountType::Redemption)?,
            amount: vec![Coin::new(&zone.host_denom, total)],
        };
        let args = encode_args(&SweepArgs {
            host_zone_id: chain_id.to_string(),
            epochs: epochs.clone(),
        })?;
        let timeout = day_epoch_timeout(engine.store())?;
        dispatch::submit_txs(
            engine,
            zone.ica_tx(IcaAccountType::Delegation, vec![msg], timeout, SWEEP, args),
        )?;
        zone.begin_phase(WorkflowPhase::Sweep, 1);
        set_host_zone(engine.store_mut(), &zone)?;
    }

    for unbonding in &mut unbondings {
        // nothing to move, the unbonding is claimable right away
        unbonding.status = if total > 0 {
            HostZoneUnbondingStatus::ExitTransferInProgress
        } else {
            HostZoneUnbondingStatus::Claimable
        };
        engine.store_mut().set_host_zone_unbonding(unbonding)?;
    }

    info!(zone = %chain_id, ?epochs, %total, "sweeping unbonded tokens");
    Ok(total)
}

/// Settles a sweep. Swept unbondings become claimable.
pub fn sweep_callback(
    engine: &mut Engine,
    packet: &PacketId,
    ack: &AckResponse,
    args: &[u8],
) -> StakeResult<()> {
    let SweepArgs {
        host_zone_id,
        epochs,
    } = decode_args(args)?;

    let mut zone = require_host_zone(engine.store(), &host_zone_id)?;
    zone.end_phase(WorkflowPhase::Sweep);
    set_host_zone(engine.store_mut(), &zone)?;

    let mut swept: Amount = 0;
    for epoch in &epochs {
        let Some(mut unbonding) = engine.store().get_host_zone_unbonding(*epoch, &host_zone_id)? else {
            continue;
        };

        if ack.is_success() {
            unbonding.status = HostZoneUnbondingStatus::Claimable;
            unbonding.claimable_native_tokens = unbonding.native_token_amount;
            swept += unbonding.native_token_amount;
        } else {
            unbonding.status = HostZoneUnbondingStatus::ExitTransferQueue;
        }
        engine.store_mut().set_host_zone_unbonding(&unbonding)?;
    }

    if !ack.is_success() {
        warn!(%packet, zone = %host_zone_id, status = ?ack.status, "sweep failed");
        return Ok(());
    }

    debug!(%packet, zone = %host_zone_id, ?epochs, %swept, "sweep settled");
    engine.emit(StakeEvent::RedemptionSwept {
        zone: host_zone_id,
        amount: swept,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        epochs::EpochIdentifier,
        errors::StakeError,
        msgs::Msg,
        testing::{host_address, TestEnv, HOST_DENOM, USER, ZONE},
    };

    fn redeem(env: &mut TestEnv, amount: Amount, receiver: &str) {
        env.deliver(Msg::RedeemStake {
            creator: USER.to_string(),
            amount,
            host_zone: ZONE.to_string(),
            receiver: receiver.to_string(),
        })
        .unwrap();
    }

    fn claim(env: &mut TestEnv, epoch: EpochNumber, receiver: &str) -> Result<(), StakeError> {
        env.deliver(Msg::ClaimUndelegatedTokens {
            creator: USER.to_string(),
            host_zone_id: ZONE.to_string(),
            epoch,
            receiver: receiver.to_string(),
        })
    }

    fn unbonding(env: &TestEnv, day: EpochNumber) -> liquid_stake_records::HostZoneUnbonding {
        env.engine
            .store()
            .get_host_zone_unbonding(day, ZONE)
            .unwrap()
            .expect("unbonding must exist")
    }

    #[test]
    fn test_redemptions_unbond_and_become_claimable() {
        let mut env = TestEnv::new();
        env.add_validators(&[(1, 1)]);
        env.stake_and_delegate(USER, 100);

        let (first, second) = (host_address(1), host_address(2));
        redeem(&mut env, 30, &first);
        redeem(&mut env, 70, &second);

        let day = env.epoch(EpochIdentifier::Day);
        let queued = unbonding(&env, day);
        assert_eq!(queued.status, HostZoneUnbondingStatus::UnbondingQueue);
        assert_eq!(queued.st_token_amount, 100);
        assert_eq!(queued.native_token_amount, 100);
        assert_eq!(queued.user_redemption_records.len(), 2);
        assert_eq!(env.st_balance(USER), 0);

        // claims wait for the host to release the tokens
        assert!(matches!(claim(&mut env, day, &first), Err(StakeError::Validation(_))));

        env.next_day();
        let unbonding_now = unbonding(&env, day);
        assert_eq!(unbonding_now.status, HostZoneUnbondingStatus::ExitTransferQueue);
        assert!(unbonding_now.unbonding_time > env.engine.block().time);
        assert_eq!(env.zone().total_delegations, 0);
        env.assert_delegations_match();
        assert_eq!(bank::supply(env.engine.store(), &env.zone().st_denom).unwrap(), 0);

        for _ in 0..40 {
            if unbonding(&env, day).status == HostZoneUnbondingStatus::Claimable {
                break;
            }
            env.next_stride_epoch();
        }
        assert_eq!(unbonding(&env, day).status, HostZoneUnbondingStatus::Claimable);
        assert!(env
            .events
            .iter()
            .any(|event| matches!(event, StakeEvent::RedemptionSwept { amount: 100, .. })));

        claim(&mut env, day, &first).unwrap();
        claim(&mut env, day, &second).unwrap();
        env.relay();
        assert_eq!(env.host.balance(&first, HOST_DENOM), 30);
        assert_eq!(env.host.balance(&second, HOST_DENOM), 70);

        assert!(matches!(
            claim(&mut env, day, &first),
            Err(StakeError::NotFound { .. })
        ));
    }

    #[test]
    fn test_failed_undelegation_requeues_unbonding() {
        let mut env = TestEnv::new();
        env.add_validators(&[(1, 1)]);
        env.stake_and_delegate(USER, 100);
        redeem(&mut env, 40, &host_address(1));
        let day = env.epoch(EpochIdentifier::Day);

        env.host.failing.insert("/cosmos.staking.v1beta1.MsgUndelegate");
        env.next_day();

        assert_eq!(unbonding(&env, day).status, HostZoneUnbondingStatus::UnbondingQueue);
        assert_eq!(env.zone().total_delegations, 100);
        env.assert_delegations_match();
        assert!(!env.zone().phase_in_flight(WorkflowPhase::Unbond));

        env.host.failing.clear();
        env.next_day();
        assert_eq!(unbonding(&env, day).status, HostZoneUnbondingStatus::ExitTransferQueue);
        assert_eq!(env.zone().total_delegations, 60);
        env.assert_delegations_match();
    }
}
