//! User operations: liquid stake, redeem and claim.

use liquid_stake_ica::{dispatch, AckResponse, HostMsg, IcaAccountType, PacketId};
use liquid_stake_primitives::{address::validate_address, coin::Coin, types::{Amount, EpochNumber}};
use liquid_stake_records::{
    HostZoneUnbondingStatus, RecordStore, UserRedemptionId, UserRedemptionRecord,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    bank,
    callbacks::CLAIM,
    codec::{decode_args, encode_args},
    engine::Engine,
    epochs::{current_epoch, EpochIdentifier},
    errors::{StakeError, StakeResult},
    events::StakeEvent,
    host_zone::{host_zone_by_denom, require_host_zone},
    rate::{mint_amount, redeem_amount},
};

/// Deposits `amount` of a zone's native voucher and mints derivative at the current rate.
///
/// Returns the derivative minted.
pub fn liquid_stake(
    engine: &mut Engine,
    creator: &str,
    amount: Amount,
    host_denom: &str,
) -> StakeResult<Amount> {
    if amount == 0 {
        return Err(StakeError::validation("liquid stake amount must be positive"));
    }

    let zone = host_zone_by_denom(engine.store(), host_denom)?;
    zone.ensure_not_halted()?;

    let epoch = current_epoch(engine.store(), EpochIdentifier::StrideEpoch)?;
    let mut record = engine
        .store()
        .get_transfer_deposit_record(&zone.chain_id, epoch)?
        .ok_or_else(|| StakeError::not_found("deposit record for epoch", epoch))?;

    let st_amount = mint_amount(zone.redemption_rate, amount)?;

    bank::send(
        engine.store_mut(),
        creator,
        &zone.deposit_address,
        &Coin::new(&zone.ibc_denom, amount),
    )?;
    bank::mint(engine.store_mut(), creator, &Coin::new(&zone.st_denom, st_amount))?;

    record.amount += amount;
    engine.store_mut().set_deposit_record(&record)?;

    info!(zone = %zone.chain_id, staker = %creator, %amount, st = %st_amount, "liquid staked");
    engine.emit(StakeEvent::LiquidStake {
        zone: zone.chain_id,
        staker: creator.to_string(),
        native_amount: amount,
        st_amount,
        lsm: false,
    });
    Ok(st_amount)
}

/// Escrows `st_amount` derivative and queues its redemption into the current day's unbonding.
///
/// Returns the native owed to `receiver` on the host.
pub fn redeem_stake(
    engine: &mut Engine,
    creator: &str,
    chain_id: &str,
    st_amount: Amount,
    receiver: &str,
) -> StakeResult<Amount> {
    if st_amount == 0 {
        return Err(StakeError::validation("redeem amount must be positive"));
    }

    let zone = require_host_zone(engine.store(), chain_id)?;
    zone.ensure_not_halted()?;
    validate_address(receiver, &zone.bech32_prefix)?;

    let native_amount = redeem_amount(zone.redemption_rate, st_amount)?;
    if native_amount == 0 {
        return Err(StakeError::validation(format!(
            "redeeming {st_amount} at a rate of {} yields nothing",
            zone.redemption_rate
        )));
    }

    let epoch = current_epoch(engine.store(), EpochIdentifier::Day)?;
    let mut unbonding = engine
        .store()
        .get_host_zone_unbonding(epoch, chain_id)?
        .ok_or_else(|| StakeError::not_found("unbonding for day", epoch))?;
    if unbonding.status != HostZoneUnbondingStatus::UnbondingQueue {
        return Err(StakeError::validation(format!(
            "unbonding of {chain_id} for day {epoch} is {}",
            unbonding.status
        )));
    }

    // everything queued must still be covered by what is delegated
    if unbonding.native_token_amount + native_amount > zone.total_delegations {
        return Err(StakeError::validation(format!(
            "cannot unbond {} with {} delegated",
            unbonding.native_token_amount + native_amount,
            zone.total_delegations
        )));
    }

    bank::send(
        engine.store_mut(),
        creator,
        &zone.deposit_address,
        &Coin::new(&zone.st_denom, st_amount),
    )?;

    let id = UserRedemptionId::new(chain_id, epoch, receiver);
    let record = match engine.store().get_user_redemption_record(&id)? {
        Some(mut record) => {
            record.native_token_amount += native_amount;
            record.st_token_amount += st_amount;
            record
        }
        None => UserRedemptionRecord {
            id: id.clone(),
            sender: creator.to_string(),
            native_token_amount: native_amount,
            st_token_amount: st_amount,
            denom: zone.host_denom.clone(),
            claim_is_pending: false,
        },
    };
    engine.store_mut().set_user_redemption_record(&record)?;

    unbonding.native_token_amount += native_amount;
    unbonding.st_token_amount += st_amount;
    let id_string = id.to_string();
    if !unbonding.user_redemption_records.contains(&id_string) {
        unbonding.user_redemption_records.push(id_string);
    }
    engine.store_mut().set_host_zone_unbonding(&unbonding)?;

    info!(zone = %chain_id, sender = %creator, %receiver, st = %st_amount, native = %native_amount, "redeemed stake");
    engine.emit(StakeEvent::RedeemStake {
        zone: chain_id.to_string(),
        sender: creator.to_string(),
        receiver: receiver.to_string(),
        st_amount,
        native_amount,
    });
    Ok(native_amount)
}

/// Arguments of a claim packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimArgs {
    /// The redemption being paid out.
    pub record_id: UserRedemptionId,
}

/// Pays out a claimable redemption from the redemption account.
pub fn claim_undelegated_tokens(
    engine: &mut Engine,
    chain_id: &str,
    epoch: EpochNumber,
    receiver: &str,
) -> StakeResult<()> {
    let zone = require_host_zone(engine.store(), chain_id)?;
    zone.ensure_not_halted()?;

    let id = UserRedemptionId::new(chain_id, epoch, receiver);
    let mut record = engine
        .store()
        .get_user_redemption_record(&id)?
        .ok_or_else(|| StakeError::not_found("user redemption record", &id))?;
    if record.claim_is_pending {
        return Err(StakeError::validation(format!("a claim of {id} is already in flight")));
    }

    let unbonding = engine
        .store()
        .get_host_zone_unbonding(epoch, chain_id)?
        .ok_or_else(|| StakeError::not_found("unbonding for day", epoch))?;
    if unbonding.status != HostZoneUnbondingStatus::Claimable {
        return Err(StakeError::validation(format!(
            "unbonding of {chain_id} for day {epoch} is {}, not claimable yet",
            unbonding.status
        )));
    }

    let redemption_address = zone.require_ica_address(IcaAccountType::Redemption)?;
    let msg = HostMsg::SendCoins {
        from_address: redemption_address,
        to_address: receiver.to_string(),
        amount: vec![Coin::new(&record.denom, record.native_token_amount)],
    };
    let args = encode_args(&ClaimArgs {
        record_id: id.clone(),
    })?;

    record.claim_is_pending = true;
    engine.store_mut().set_user_redemption_record(&record)?;

    let timeout = engine.ica_timeout();
    dispatch::submit_txs(
        engine,
        zone.ica_tx(IcaAccountType::Redemption, vec![msg], timeout, CLAIM, args),
    )?;

    info!(zone = %chain_id, %epoch, %receiver, amount = %record.native_token_amount, "claiming undelegated tokens");
    Ok(())
}

/// Settles a claim. A failed claim can be retried.
pub fn claim_callback(
    engine: &mut Engine,
    packet: &PacketId,
    ack: &AckResponse,
    args: &[u8],
) -> StakeResult<()> {
    let ClaimArgs { record_id } = decode_args(args)?;

    let Some(mut record) = engine.store().get_user_redemption_record(&record_id)? else {
        warn!(%packet, id = %record_id, "claimed redemption record no longer exists");
        return Ok(());
    };

    if !ack.is_success() {
        warn!(%packet, id = %record_id, status = ?ack.status, "claim failed");
        record.claim_is_pending = false;
        engine.store_mut().set_user_redemption_record(&record)?;
        return Ok(());
    }

    engine.store_mut().delete_user_redemption_record(&record_id)?;

    if let Some(mut unbonding) = engine
        .store()
        .get_host_zone_unbonding(record_id.epoch_number, &record_id.host_zone_id)?
    {
        unbonding.claimable_native_tokens = unbonding
            .claimable_native_tokens
            .saturating_sub(record.native_token_amount);
        let id_string = record_id.to_string();
        unbonding.user_redemption_records.retain(|id| *id != id_string);
        engine.store_mut().set_host_zone_unbonding(&unbonding)?;
    }

    info!(%packet, id = %record_id, amount = %record.native_token_amount, "claim settled");
    engine.emit(StakeEvent::ClaimUndelegated {
        zone: record_id.host_zone_id.clone(),
        epoch: record_id.epoch_number,
        receiver: record_id.receiver.clone(),
        amount: record.native_token_amount,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use liquid_stake_primitives::{address::encode_address, decimal::Dec};

    use super::*;
    use crate::{
        epochs::EpochIdentifier,
        host_zone::set_host_zone,
        msgs::Msg,
        testing::{host_address, TestEnv, USER, ZONE},
    };

    fn redeem(env: &mut TestEnv, amount: Amount, receiver: &str) -> StakeResult<()> {
        env.deliver(Msg::RedeemStake {
            creator: USER.to_string(),
            amount,
            host_zone: ZONE.to_string(),
            receiver: receiver.to_string(),
        })
    }

    #[test]
    fn test_liquid_stake_mints_at_the_redemption_rate() {
        let mut env = TestEnv::new();
        let mut zone = env.zone();
        zone.redemption_rate = Dec::from_ratio(3, 2).unwrap();
        set_host_zone(env.engine.store_mut(), &zone).unwrap();

        env.fund(USER, 301);
        env.liquid_stake(USER, 301).unwrap();

        // 301 / 1.5 truncates
        assert_eq!(env.st_balance(USER), 200);
        assert_eq!(
            bank::balance(env.engine.store(), &zone.deposit_address, &zone.ibc_denom).unwrap(),
            301
        );

        let epoch = env.epoch(EpochIdentifier::StrideEpoch);
        let record = env
            .engine
            .store()
            .get_transfer_deposit_record(ZONE, epoch)
            .unwrap()
            .expect("deposit record must exist");
        assert_eq!(record.amount, 301);
        assert!(env.engine.events().iter().any(|event| matches!(
            event,
            StakeEvent::LiquidStake { native_amount: 301, st_amount: 200, lsm: false, .. }
        )));
    }

    #[test]
    fn test_liquid_stake_rejects_bad_requests() {
        let mut env = TestEnv::new();
        env.fund(USER, 50);

        assert!(matches!(env.liquid_stake(USER, 0), Err(StakeError::Validation(_))));
        assert!(env
            .deliver(Msg::LiquidStake {
                creator: USER.to_string(),
                amount: 10,
                host_denom: "uosmo".to_string(),
            })
            .is_err());

        // nothing is minted when the deposit cannot be paid
        assert!(matches!(
            env.liquid_stake(USER, 100),
            Err(StakeError::InsufficientFunds { .. })
        ));
        assert_eq!(env.st_balance(USER), 0);
    }

    #[test]
    fn test_halted_zone_refuses_user_operations() {
        let mut env = TestEnv::new();
        env.fund(USER, 100);
        let mut zone = env.zone();
        zone.halted = true;
        set_host_zone(env.engine.store_mut(), &zone).unwrap();

        assert!(matches!(env.liquid_stake(USER, 100), Err(StakeError::ZoneHalted(_))));
        assert!(matches!(
            redeem(&mut env, 10, &host_address(1)),
            Err(StakeError::ZoneHalted(_))
        ));
        assert!(matches!(
            env.deliver(Msg::ClaimUndelegatedTokens {
                creator: USER.to_string(),
                host_zone_id: ZONE.to_string(),
                epoch: 1,
                receiver: host_address(1),
            }),
            Err(StakeError::ZoneHalted(_))
        ));
    }

    #[test]
    fn test_redemptions_to_one_receiver_share_a_record() {
        let mut env = TestEnv::new();
        env.add_validators(&[(1, 1)]);
        env.stake_and_delegate(USER, 100);
        let receiver = host_address(1);

        redeem(&mut env, 30, &receiver).unwrap();
        redeem(&mut env, 20, &receiver).unwrap();

        let day = env.epoch(EpochIdentifier::Day);
        let record = env
            .engine
            .store()
            .get_user_redemption_record(&UserRedemptionId::new(ZONE, day, &receiver))
            .unwrap()
            .expect("redemption record must exist");
        assert_eq!(record.native_token_amount, 50);
        assert_eq!(record.st_token_amount, 50);
        assert_eq!(record.sender, USER);

        let unbonding = env.engine.store().get_host_zone_unbonding(day, ZONE).unwrap().unwrap();
        assert_eq!(unbonding.user_redemption_records.len(), 1);
        assert_eq!(unbonding.native_token_amount, 50);
        assert_eq!(env.st_balance(USER), 50);
    }

    #[test]
    fn test_redeem_checks_receiver_and_delegations() {
        let mut env = TestEnv::new();
        env.add_validators(&[(1, 1)]);
        env.stake_and_delegate(USER, 100);

        // derivative minted after the last delegation is not backed by stake yet
        env.fund(USER, 100);
        env.liquid_stake(USER, 100).unwrap();
        assert_eq!(env.st_balance(USER), 200);

        let foreign = encode_address("osmo", &[1; 20]).unwrap();
        assert!(redeem(&mut env, 10, &foreign).is_err());

        assert!(matches!(
            redeem(&mut env, 150, &host_address(1)),
            Err(StakeError::Validation(_))
        ));
        assert!(matches!(
            redeem(&mut env, 0, &host_address(1)),
            Err(StakeError::Validation(_))
        ));
        assert_eq!(env.st_balance(USER), 200);

        redeem(&mut env, 100, &host_address(1)).unwrap();
        assert_eq!(env.st_balance(USER), 100);
    }
}
