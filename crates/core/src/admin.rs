//! Host zone registration and the other admin operations on zones and their accounts.

use std::collections::BTreeMap;

use liquid_stake_ica::{
    account::parse_owner,
    dispatch,
    host_zone_owner,
    signals::{ChannelSignal, ChannelToRegistry, Signal},
    IcaAccountType,
};
use liquid_stake_primitives::{
    address::{module_address, validate_address},
    decimal::Dec,
    denom::{st_denom, DenomTrace, CHANNEL_PREFIX},
    types::Amount,
};
use liquid_stake_records::{
    DepositRecordStatus, DepositSource, HostZoneUnbonding, HostZoneUnbondingStatus,
    LsmDepositStatus, RecordStore,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    bank,
    engine::{Engine, MODULE},
    epochs::{current_epoch, EpochIdentifier},
    errors::{StakeError, StakeResult},
    events::StakeEvent,
    host_zone::{
        all_host_zones, get_host_zone, require_host_zone, set_host_zone, CommunityPoolRebate,
        HostZone, RedemptionRateBounds,
    },
    rate, trade_route,
    validators::{set_validator, validators_for_zone},
};

/// A host zone to register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostZoneConfig {
    /// Connection to the host. Its light client names the chain.
    pub connection_id: String,

    /// Transfer channel to the host, controller side.
    pub transfer_channel_id: String,

    /// The transfer channel's id on the host. Defaults to the controller-side id.
    #[serde(default)]
    pub counterparty_channel_id: Option<String>,

    /// Bech32 account prefix on the host.
    pub bech32_prefix: String,

    /// Native denom on the host.
    pub host_denom: String,

    /// Unbonding period of the host, in days.
    pub unbonding_period: u64,

    /// Overrides the default lower halt bound.
    #[serde(default)]
    pub min_redemption_rate: Option<Dec>,

    /// Overrides the default upper halt bound.
    #[serde(default)]
    pub max_redemption_rate: Option<Dec>,

    /// Whether LSM shares are accepted.
    #[serde(default)]
    pub lsm_enabled: bool,

    /// Overrides the default cap on messages per ICA tx.
    #[serde(default)]
    pub max_messages_per_ica_tx: Option<usize>,
}

/// Registers a host zone, opens its first records and registers its six accounts.
pub fn register_host_zone(engine: &mut Engine, config: &HostZoneConfig) -> StakeResult<HostZone> {
    let chain_id = engine
        .clients()
        .chain_id(&config.connection_id)
        .ok_or_else(|| StakeError::not_found("client for connection", &config.connection_id))?
        .to_string();

    if config.bech32_prefix.is_empty() || config.host_denom.is_empty() {
        return Err(StakeError::validation("prefix and host denom must be set"));
    }
    if !config.transfer_channel_id.starts_with(CHANNEL_PREFIX) {
        return Err(StakeError::validation(format!(
            "invalid transfer channel {}",
            config.transfer_channel_id
        )));
    }
    let counterparty_channel_id = config
        .counterparty_channel_id
        .clone()
        .unwrap_or_else(|| config.transfer_channel_id.clone());
    if !counterparty_channel_id.starts_with(CHANNEL_PREFIX) {
        return Err(StakeError::validation(format!(
            "invalid counterparty channel {counterparty_channel_id}"
        )));
    }
    if config.unbonding_period == 0 {
        return Err(StakeError::validation("unbonding period must be positive"));
    }

    if get_host_zone(engine.store(), &chain_id)?.is_some() {
        return Err(StakeError::validation(format!(
            "host zone {chain_id} is already registered"
        )));
    }
    for zone in all_host_zones(engine.store())? {
        let clash = zone.host_denom == config.host_denom
            || zone.transfer_channel_id == config.transfer_channel_id
            || zone.connection_id == config.connection_id;
        if clash {
            return Err(StakeError::validation(format!(
                "host zone {} already uses this denom, channel or connection",
                zone.chain_id
            )));
        }
    }

    let params = engine.params();
    let mut bounds = RedemptionRateBounds::from_params(params);
    if let Some(min) = config.min_redemption_rate {
        bounds.outer_min = min;
    }
    if let Some(max) = config.max_redemption_rate {
        bounds.outer_max = max;
    }
    bounds.validate()?;

    let deposit_address = module_address(&params.controller_prefix, MODULE, &chain_id)?;
    let community_pool_holding_address = module_address(
        &params.controller_prefix,
        MODULE,
        &format!("{chain_id}.community_pool"),
    )?;
    let max_messages_per_ica_tx = config
        .max_messages_per_ica_tx
        .unwrap_or(params.max_messages_per_ica_tx as usize);
    if max_messages_per_ica_tx == 0 {
        return Err(StakeError::validation("max messages per ica tx must be positive"));
    }

    let ibc_denom = bank::set_denom_trace(
        engine.store_mut(),
        &DenomTrace::single_hop(&config.transfer_channel_id, &config.host_denom),
    )?;

    let zone = HostZone {
        chain_id: chain_id.clone(),
        bech32_prefix: config.bech32_prefix.clone(),
        host_denom: config.host_denom.clone(),
        st_denom: st_denom(&config.host_denom),
        ibc_denom,
        transfer_channel_id: config.transfer_channel_id.clone(),
        counterparty_channel_id,
        connection_id: config.connection_id.clone(),
        deposit_address,
        community_pool_holding_address,
        ica_addresses: BTreeMap::new(),
        last_redemption_rate: Dec::ONE,
        redemption_rate: Dec::ONE,
        bounds,
        total_delegations: 0,
        unbonding_period: config.unbonding_period,
        halted: false,
        lsm_enabled: config.lsm_enabled,
        deprecated: false,
        community_pool_rebate: None,
        max_messages_per_ica_tx,
        withdrawal_balance: 0,
        withdrawal_address_set: false,
        in_flight: BTreeMap::new(),
    };
    set_host_zone(engine.store_mut(), &zone)?;

    let stride_epoch = current_epoch(engine.store(), EpochIdentifier::StrideEpoch)?;
    engine.store_mut().append_deposit_record(
        &chain_id,
        &zone.host_denom,
        0,
        DepositRecordStatus::TransferQueue,
        DepositSource::StrideDeposit,
        stride_epoch,
    )?;

    let day = current_epoch(engine.store(), EpochIdentifier::Day)?;
    engine
        .store_mut()
        .set_host_zone_unbonding(&HostZoneUnbonding::new(day, &chain_id, &zone.host_denom))?;

    for account_type in IcaAccountType::HOST_ZONE {
        dispatch::register_account(
            engine,
            &host_zone_owner(&chain_id, account_type),
            &zone.connection_id,
        )?;
    }

    info!(zone = %chain_id, denom = %zone.host_denom, connection = %zone.connection_id, "registered host zone");
    engine.emit(StakeEvent::HostZoneRegistered {
        zone: chain_id,
    });

    Ok(zone)
}

/// Applies a signal from an account's channel to the zone or route that owns the account.
pub(crate) fn handle_channel_signal(engine: &mut Engine, signal: Signal) -> StakeResult<()> {
    let Signal::FromChannel(ChannelSignal::ToRegistry(signal)) = signal;
    info!(%signal, "received channel signal");

    match signal {
        ChannelToRegistry::AccountBound {
            owner,
            account_type,
            address,
            ..
        } => {
            if matches!(
                account_type,
                IcaAccountType::ConverterTrade | IcaAccountType::ConverterUnwind
            ) {
                return trade_route::bind_account(engine, &owner, account_type, &address);
            }

            let (chain_id, _) = parse_owner(&owner)?;
            let mut zone = require_host_zone(engine.store(), chain_id)?;
            validate_address(&address, &zone.bech32_prefix)?;

            // the reward address lives on the delegation account
            if matches!(
                account_type,
                IcaAccountType::Delegation | IcaAccountType::Withdrawal
            ) {
                zone.withdrawal_address_set = false;
            }
            zone.ica_addresses.insert(account_type, address.clone());
            set_host_zone(engine.store_mut(), &zone)?;

            engine.emit(StakeEvent::IcaAccountBound { owner, address });
        }

        ChannelToRegistry::AccountClosed {
            owner,
            account_type,
        } => {
            if !matches!(
                account_type,
                IcaAccountType::ConverterTrade | IcaAccountType::ConverterUnwind
            ) {
                let (chain_id, _) = parse_owner(&owner)?;
                let mut zone = require_host_zone(engine.store(), chain_id)?;
                zone.clear_phases_for(account_type);
                set_host_zone(engine.store_mut(), &zone)?;
            }

            warn!(%owner, "interchain account channel closed");
            engine.emit(StakeEvent::IcaChannelClosed { owner });
        }
    }

    Ok(())
}

/// Reopens the closed channel of one of a zone's accounts.
///
/// Work that was in flight on the delegation account is put back in its queue, since its
/// acknowledgements will never arrive.
pub fn restore_interchain_account(
    engine: &mut Engine,
    chain_id: &str,
    account_type: IcaAccountType,
) -> StakeResult<()> {
    let zone = require_host_zone(engine.store(), chain_id)?;
    if !IcaAccountType::HOST_ZONE.contains(&account_type) {
        return Err(StakeError::validation(format!(
            "{account_type} is not a host zone account"
        )));
    }

    let owner = host_zone_owner(chain_id, account_type);
    let channel = dispatch::get_channel(engine.store(), &owner)?
        .ok_or_else(|| StakeError::not_found("channel", &owner))?;
    if channel.context().connection_id != zone.connection_id {
        return Err(StakeError::validation(format!(
            "channel of {owner} runs over {}, not {}",
            channel.context().connection_id,
            zone.connection_id
        )));
    }

    dispatch::restore_channel(engine, &owner)?;

    if account_type == IcaAccountType::Delegation {
        revert_delegation_work(engine, chain_id)?;
    }

    info!(zone = %chain_id, %owner, "restoring interchain account");
    Ok(())
}

fn revert_delegation_work(engine: &mut Engine, chain_id: &str) -> StakeResult<()> {
    let store = engine.store_mut();

    for mut record in
        store.deposit_records_by_status(chain_id, DepositRecordStatus::DelegationInProgress)?
    {
        record.status = DepositRecordStatus::DelegationQueue;
        store.set_deposit_record(&record)?;
    }

    let reverts = [
        (
            HostZoneUnbondingStatus::UnbondingInProgress,
            HostZoneUnbondingStatus::UnbondingQueue,
        ),
        (
            HostZoneUnbondingStatus::ExitTransferInProgress,
            HostZoneUnbondingStatus::ExitTransferQueue,
        ),
    ];
    for (from, to) in reverts {
        for mut unbonding in store.host_zone_unbondings_by_status(chain_id, from)? {
            unbonding.status = to;
            store.set_host_zone_unbonding(&unbonding)?;
        }
    }

    for mut deposit in
        store.lsm_deposits_by_status(chain_id, LsmDepositStatus::DetokenizationInProgress)?
    {
        deposit.status = LsmDepositStatus::DetokenizationQueue;
        store.set_lsm_deposit(&deposit)?;
    }

    for mut validator in validators_for_zone(store, chain_id)? {
        if validator.delegation_changes_in_progress > 0 {
            validator.delegation_changes_in_progress = 0;
            set_validator(store, chain_id, &validator)?;
        }
    }

    Ok(())
}

/// Lifts the halt of a zone whose redemption rate is back inside its outer bounds.
///
/// The rate is recomputed from the zone's current balances before it is checked.
pub fn resume_host_zone(engine: &mut Engine, chain_id: &str) -> StakeResult<()> {
    if !require_host_zone(engine.store(), chain_id)?.halted {
        return Err(StakeError::validation(format!("host zone {chain_id} is not halted")));
    }

    rate::update_redemption_rate(engine, chain_id)?;
    let mut zone = require_host_zone(engine.store(), chain_id)?;
    if !zone.bounds.within_outer(zone.redemption_rate) {
        return Err(StakeError::validation(format!(
            "redemption rate {} of {chain_id} is still outside its outer bounds",
            zone.redemption_rate
        )));
    }

    zone.halted = false;
    set_host_zone(engine.store_mut(), &zone)?;

    info!(zone = %chain_id, "resumed host zone");
    engine.emit(StakeEvent::HostZoneResumed {
        zone: chain_id.to_string(),
    });
    Ok(())
}

/// Replaces the alert bounds of a zone.
pub fn update_inner_redemption_rate_bounds(
    engine: &mut Engine,
    chain_id: &str,
    min: Dec,
    max: Dec,
) -> StakeResult<()> {
    let mut zone = require_host_zone(engine.store(), chain_id)?;

    let bounds = RedemptionRateBounds {
        inner_min: min,
        inner_max: max,
        ..zone.bounds
    };
    bounds.validate()?;

    zone.bounds = bounds;
    set_host_zone(engine.store_mut(), &zone)?;

    info!(zone = %chain_id, %min, %max, "updated inner redemption rate bounds");
    Ok(())
}

/// Sets or clears the community pool rebate of a zone. A zero rate or amount clears it.
pub fn set_community_pool_rebate(
    engine: &mut Engine,
    chain_id: &str,
    rebate_rate: Dec,
    liquid_staked_st_token_amount: Amount,
) -> StakeResult<()> {
    let mut zone = require_host_zone(engine.store(), chain_id)?;

    if rebate_rate > Dec::ONE {
        return Err(StakeError::validation(format!(
            "rebate rate {rebate_rate} is above one"
        )));
    }

    zone.community_pool_rebate = if rebate_rate.is_zero() || liquid_staked_st_token_amount == 0 {
        None
    } else {
        Some(CommunityPoolRebate {
            rebate_rate,
            liquid_staked_st_token_amount,
        })
    };
    set_host_zone(engine.store_mut(), &zone)?;

    info!(zone = %chain_id, rate = %rebate_rate, amount = %liquid_staked_st_token_amount, "set community pool rebate");
    Ok(())
}

#[cfg(test)]
mod tests {
    use liquid_stake_ica::packet::PacketPayload;

    use super::*;
    use crate::{
        msgs::Msg,
        testing::{zone_config, TestEnv, ADMIN, USER, ZONE},
    };

    fn resume() -> Msg {
        Msg::ResumeHostZone {
            creator: ADMIN.to_string(),
            chain_id: ZONE.to_string(),
        }
    }

    #[test]
    fn test_registration_binds_every_account() {
        let env = TestEnv::new();
        let zone = env.zone();

        assert_eq!(zone.ica_addresses.len(), IcaAccountType::HOST_ZONE.len());
        assert_eq!(zone.redemption_rate, Dec::ONE);
        assert!(zone.deposit_address.starts_with("stride1"));
        assert!(env
            .events
            .iter()
            .any(|event| matches!(event, StakeEvent::HostZoneRegistered { .. })));
    }

    #[test]
    fn test_zone_cannot_be_registered_twice() {
        let mut env = TestEnv::new();

        let err = env
            .deliver(Msg::RegisterHostZone {
                creator: ADMIN.to_string(),
                config: zone_config(),
            })
            .unwrap_err();
        assert!(matches!(err, StakeError::Validation(_)));
    }

    #[test]
    fn test_admin_messages_need_an_admin() {
        let mut env = TestEnv::new();

        let err = env
            .deliver(Msg::ResumeHostZone {
                creator: USER.to_string(),
                chain_id: ZONE.to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, StakeError::Unauthorized(_)));
    }

    #[test]
    fn test_halted_zone_resumes_once_its_rate_recovers() {
        let mut env = TestEnv::new();
        env.fund(USER, 1_000);
        env.liquid_stake(USER, 1_000).unwrap();

        // a phantom delegation doubles the backing of every derivative
        let mut zone = env.zone();
        zone.total_delegations = 1_000;
        set_host_zone(env.engine.store_mut(), &zone).unwrap();
        rate::update_redemption_rate(&mut env.engine, ZONE).unwrap();
        assert!(env.zone().halted);
        assert_eq!(env.zone().redemption_rate, Dec::from_int(2));

        assert!(matches!(env.deliver(resume()), Err(StakeError::Validation(_))));
        assert!(env.zone().halted);

        let mut zone = env.zone();
        zone.total_delegations = 0;
        set_host_zone(env.engine.store_mut(), &zone).unwrap();

        // the scheduler keeps the rate of a halted zone current
        env.next_stride_epoch();
        let zone = env.zone();
        assert!(zone.halted);
        assert_eq!(zone.redemption_rate, Dec::ONE);
        let halts = env
            .events
            .iter()
            .filter(|event| matches!(event, StakeEvent::RedemptionRateHalt { .. }))
            .count();
        assert_eq!(halts, 1);

        env.deliver(resume()).unwrap();
        assert!(!env.zone().halted);
        env.fund(USER, 10);
        env.liquid_stake(USER, 10).unwrap();
    }

    #[test]
    fn test_resume_recomputes_the_rate() {
        let mut env = TestEnv::new();
        env.fund(USER, 1_000);
        env.liquid_stake(USER, 1_000).unwrap();

        // a stale out-of-bounds rate does not block a zone whose balances are sound
        let mut zone = env.zone();
        zone.halted = true;
        zone.redemption_rate = Dec::from_int(2);
        set_host_zone(env.engine.store_mut(), &zone).unwrap();

        env.deliver(resume()).unwrap();
        let zone = env.zone();
        assert!(!zone.halted);
        assert_eq!(zone.redemption_rate, Dec::ONE);
    }

    #[test]
    fn test_restoring_the_delegation_account_requeues_its_work() {
        let mut env = TestEnv::new();
        env.add_validators(&[(1, 1)]);
        env.fund(USER, 100);
        env.liquid_stake(USER, 100).unwrap();
        env.next_stride_epoch();

        env.hold_packets = true;
        env.next_stride_epoch();
        let packet = env.held.pop().expect("delegation must be sent");
        assert!(matches!(packet.payload, PacketPayload::Ica(_)));

        env.engine.timeout_packet(&packet.id).unwrap();
        env.hold_packets = false;

        let owner = host_zone_owner(ZONE, IcaAccountType::Delegation);
        let channel = dispatch::get_channel(env.engine.store(), &owner).unwrap().unwrap();
        assert_eq!(channel.state().open_channel(), None);
        let queued = env
            .engine
            .store()
            .deposit_records_by_status(ZONE, DepositRecordStatus::DelegationQueue)
            .unwrap();
        assert_eq!(queued.len(), 1);

        env.deliver(Msg::RestoreInterchainAccount {
            creator: ADMIN.to_string(),
            chain_id: ZONE.to_string(),
            account_type: IcaAccountType::Delegation,
        })
        .unwrap();
        env.relay();
        let channel = dispatch::get_channel(env.engine.store(), &owner).unwrap().unwrap();
        assert!(channel.state().open_channel().is_some());

        env.next_stride_epoch();
        assert_eq!(env.zone().total_delegations, 100);
    }

    #[test]
    fn test_closed_fee_account_reopens_on_a_new_channel() {
        let mut env = TestEnv::new();
        let owner = host_zone_owner(ZONE, IcaAccountType::Fee);
        let port = liquid_stake_ica::port_id(&owner);
        let open = |env: &TestEnv| {
            dispatch::get_channel(env.engine.store(), &owner)
                .unwrap()
                .unwrap()
                .state()
                .open_channel()
                .map(str::to_string)
        };

        let channel = open(&env).expect("fee channel must be open");
        env.engine.chan_close_init(&port, &channel).unwrap();
        env.engine.chan_close_confirm(&port, &channel).unwrap();
        assert_eq!(open(&env), None);
        assert!(env
            .engine
            .events()
            .iter()
            .any(|event| matches!(event, StakeEvent::IcaChannelClosed { owner: closed } if *closed == owner)));

        // a redelivered confirm changes nothing
        assert!(env.engine.chan_close_confirm(&port, &channel).is_err());
        assert_eq!(open(&env), None);

        env.deliver(Msg::RestoreInterchainAccount {
            creator: ADMIN.to_string(),
            chain_id: ZONE.to_string(),
            account_type: IcaAccountType::Fee,
        })
        .unwrap();
        env.relay();

        let reopened = open(&env).expect("fee channel must reopen");
        assert_ne!(reopened, channel);
        assert!(env.zone().ica_address(IcaAccountType::Fee).is_some());
    }

    #[test]
    fn test_rebate_above_one_is_refused() {
        let mut env = TestEnv::new();

        let set = |rate: Dec| Msg::SetCommunityPoolRebate {
            creator: ADMIN.to_string(),
            chain_id: ZONE.to_string(),
            rebate_rate: rate,
            liquid_staked_st_token_amount: 1_000,
        };
        assert!(env.deliver(set(Dec::from_int(2))).is_err());

        env.deliver(set(Dec::from_percent(50))).unwrap();
        let rebate = env.zone().community_pool_rebate.expect("rebate must be set");
        assert_eq!(rebate.rebate_rate, Dec::from_percent(50));

        env.deliver(set(Dec::ZERO)).unwrap();
        assert_eq!(env.zone().community_pool_rebate, None);
    }
}
