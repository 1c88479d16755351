//! The workflow scheduler: epoch hooks that move every zone's pipelines forward.
//!
//! Each step of a zone runs in its own transaction. A failing step is logged and rolled back
//! without holding back the other steps or zones; it is retried at the next matching epoch.

pub mod community_pool;
pub mod deposits;
pub mod rewards;
pub mod unbonding;

use liquid_stake_primitives::types::EpochNumber;
use liquid_stake_records::{HostZoneUnbonding, HostZoneUnbondingStatus, RecordStore};
use tracing::{debug, info, warn};

use crate::{
    engine::Engine,
    epochs::{EpochHooks, EpochIdentifier},
    errors::StakeResult,
    host_zone::all_host_zones,
    lsm, rate, rebalance, slash,
};

/// The hooks the engine is built with. Day boundaries run before stride epoch boundaries.
pub fn epoch_hooks() -> EpochHooks {
    EpochHooks::new()
        .before_start(day_epoch_start)
        .before_start(stride_epoch_start)
}

/// Runs one step of a zone in a nested transaction, logging a failure instead of returning it.
pub(crate) fn run_step<T>(
    engine: &mut Engine,
    chain_id: &str,
    step: &'static str,
    f: impl FnOnce(&mut Engine) -> StakeResult<T>,
) -> Option<T> {
    match engine.transact(f) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(zone = %chain_id, %step, %err, "scheduler step failed");
            None
        }
    }
}

fn active_zones(engine: &Engine) -> StakeResult<Vec<String>> {
    Ok(all_host_zones(engine.store())?
        .into_iter()
        .filter(|zone| zone.is_active())
        .map(|zone| zone.chain_id)
        .collect())
}

/// Zones that are halted but not deprecated. Only their redemption rate is kept current.
fn halted_zones(engine: &Engine) -> StakeResult<Vec<String>> {
    Ok(all_host_zones(engine.store())?
        .into_iter()
        .filter(|zone| zone.halted && !zone.deprecated)
        .map(|zone| zone.chain_id)
        .collect())
}

fn day_epoch_start(engine: &mut Engine, identifier: EpochIdentifier, day: EpochNumber) -> StakeResult<()> {
    if identifier != EpochIdentifier::Day {
        return Ok(());
    }

    for chain_id in active_zones(engine)? {
        run_step(engine, &chain_id, "unbond", |e| {
            unbonding::initiate_unbonding(e, &chain_id, day)
        });
    }

    run_step(engine, "*", "cleanup unbondings", |e| cleanup_unbondings(e, day));

    // deprecated zones take no new redemptions, halted ones may after they resume
    let zones: Vec<_> = all_host_zones(engine.store())?
        .into_iter()
        .filter(|zone| !zone.deprecated)
        .collect();
    for zone in zones {
        if engine
            .store()
            .get_host_zone_unbonding(day, &zone.chain_id)?
            .is_none()
        {
            engine.store_mut().set_host_zone_unbonding(&HostZoneUnbonding::new(
                day,
                &zone.chain_id,
                &zone.host_denom,
            ))?;
        }
    }

    info!(%day, "day epoch processed");
    Ok(())
}

/// Deletes unbondings with nothing left to do: claimable ones whose redemptions were all claimed
/// and empty queued ones of past days.
fn cleanup_unbondings(engine: &mut Engine, day: EpochNumber) -> StakeResult<usize> {
    let done: Vec<_> = engine
        .store()
        .all_host_zone_unbondings()?
        .into_iter()
        .filter(|unbonding| match unbonding.status {
            HostZoneUnbondingStatus::Claimable => unbonding.user_redemption_records.is_empty(),
            HostZoneUnbondingStatus::UnbondingQueue => {
                unbonding.epoch_number < day && unbonding.st_token_amount == 0
            }
            _ => false,
        })
        .collect();

    for unbonding in &done {
        engine
            .store_mut()
            .delete_host_zone_unbonding(unbonding.epoch_number, &unbonding.host_zone_id)?;
    }

    if !done.is_empty() {
        debug!(removed = %done.len(), "cleaned up unbondings");
    }
    Ok(done.len())
}

fn stride_epoch_start(
    engine: &mut Engine,
    identifier: EpochIdentifier,
    epoch: EpochNumber,
) -> StakeResult<()> {
    if identifier != EpochIdentifier::StrideEpoch {
        return Ok(());
    }

    let params = engine.params().clone();
    let due = |interval: u64| epoch % interval == 0;
    let halted = halted_zones(engine)?;

    for chain_id in active_zones(engine)? {
        let chain_id = chain_id.as_str();

        run_step(engine, chain_id, "open deposit record", |e| {
            deposits::open_deposit_record(e, chain_id, epoch)
        });
        run_step(engine, chain_id, "stake community pool holdings", |e| {
            community_pool::stake_pool_holdings(e, chain_id)
        });
        if due(params.deposit_interval) {
            run_step(engine, chain_id, "transfer", |e| {
                deposits::transfer_deposits(e, chain_id, epoch)
            });
        }
        if due(params.delegate_interval) {
            run_step(engine, chain_id, "delegate", |e| deposits::delegate_deposits(e, chain_id));
        }
        run_step(engine, chain_id, "set withdrawal address", |e| {
            rewards::set_withdrawal_address(e, chain_id)
        });
        if due(params.rewards_interval) {
            run_step(engine, chain_id, "withdraw rewards", |e| {
                rewards::withdraw_rewards(e, chain_id)
            });
        }
        if due(params.reinvest_interval) {
            run_step(engine, chain_id, "query withdrawal balance", |e| {
                rewards::query_withdrawal_balance(e, chain_id)
            });
            run_step(engine, chain_id, "query fee balance", |e| {
                rewards::query_fee_balance(e, chain_id)
            });
        }
        run_step(engine, chain_id, "query community pool balances", |e| {
            community_pool::query_pool_balances(e, chain_id)
        });
        run_step(engine, chain_id, "sweep", |e| {
            unbonding::sweep_unbonded_tokens(e, chain_id)
        });
        run_step(engine, chain_id, "detokenize", |e| {
            lsm::detokenize_deposits(e, chain_id)
        });
        run_step(engine, chain_id, "deferred slash checks", |e| {
            slash::query_deferred_slash_checks(e, chain_id)
        });
        if due(params.redemption_rate_interval) {
            run_step(engine, chain_id, "redemption rate", |e| {
                rate::update_redemption_rate(e, chain_id)
            });
        }
        if due(params.rebalance_interval) {
            run_step(engine, chain_id, "rebalance", |e| {
                rebalance::rebalance(e, chain_id, params.rebalance_max_swaps)
            });
        }
    }

    if due(params.redemption_rate_interval) {
        for chain_id in halted {
            run_step(engine, &chain_id, "redemption rate", |e| {
                rate::update_redemption_rate(e, &chain_id)
            });
        }
    }

    debug!(%epoch, "stride epoch processed");
    Ok(())
}
