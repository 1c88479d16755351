//! Slash detection.
//!
//! Each validator's share rate is queried on the host. When it moves while the validator holds
//! stake, the delegation account's shares with the validator are queried too, and the difference
//! between what the shares are worth and what the core thinks is delegated is the slash.

use liquid_stake_icq::{
    keeper::submit_query,
    types::STAKING_STORE_QUERY_WITH_PROOF,
    Query, TimeoutPolicy,
};
use liquid_stake_ica::IcaAccountType;
use liquid_stake_primitives::decimal::Dec;
use tracing::{debug, info, warn};

use crate::{
    callbacks::{DELEGATOR_SHARES, VALIDATOR_SHARES_RATE},
    engine::{Engine, MODULE},
    epochs::{current_epoch, stride_epoch_query_timeout, EpochIdentifier},
    errors::{StakeError, StakeResult},
    events::StakeEvent,
    host_zone::{require_host_zone, set_host_zone},
    rebalance,
    remote::{delegation_key, decode_value, validator_key, RemoteDelegation, RemoteValidator},
    scheduler::run_step,
    validators::{get_validator, require_validator, set_validator, validators_for_zone},
};

fn query_timeout(engine: &Engine) -> StakeResult<u64> {
    stride_epoch_query_timeout(engine.store(), engine.params(), engine.block().time)
}

fn callback_validator(query: &Query) -> StakeResult<String> {
    String::from_utf8(query.callback_data.clone())
        .map_err(|e| StakeError::Encoding(format!("validator address in callback data: {e}")))
}

/// Queries the share rate of a validator.
pub fn query_shares_rate(engine: &mut Engine, chain_id: &str, validator_address: &str) -> StakeResult<String> {
    let zone = require_host_zone(engine.store(), chain_id)?;
    require_validator(engine.store(), chain_id, validator_address)?;

    let query = Query::new(
        &zone.connection_id,
        chain_id,
        STAKING_STORE_QUERY_WITH_PROOF,
        validator_key(validator_address),
        MODULE,
        VALIDATOR_SHARES_RATE,
    )
    .with_callback_data(validator_address.as_bytes().to_vec())
    .with_timeout(query_timeout(engine)?, TimeoutPolicy::RejectQueryResponse);

    let id = submit_query(engine, query, false)?;
    debug!(zone = %chain_id, validator = %validator_address, %id, "queried validator share rate");
    Ok(id)
}

fn query_delegator_shares(
    engine: &mut Engine,
    chain_id: &str,
    delegation_address: &str,
    validator_address: &str,
) -> StakeResult<String> {
    let zone = require_host_zone(engine.store(), chain_id)?;

    let query = Query::new(
        &zone.connection_id,
        chain_id,
        STAKING_STORE_QUERY_WITH_PROOF,
        delegation_key(delegation_address, validator_address),
        MODULE,
        DELEGATOR_SHARES,
    )
    .with_callback_data(validator_address.as_bytes().to_vec())
    .with_timeout(query_timeout(engine)?, TimeoutPolicy::RetryQueryRequest);

    let id = submit_query(engine, query, false)?;
    info!(zone = %chain_id, validator = %validator_address, %id, "queried delegator shares");
    Ok(id)
}

/// Records a validator's share rate and starts a slash check if the rate moved.
pub fn validator_shares_rate_callback(
    engine: &mut Engine,
    result: &[u8],
    query: &Query,
) -> StakeResult<()> {
    let chain_id = query.chain_id.as_str();
    let address = callback_validator(query)?;

    let Some(remote) = decode_value::<RemoteValidator>(result)? else {
        warn!(zone = %chain_id, validator = %address, "validator not found on host");
        return Ok(());
    };

    record_shares_rate(engine, chain_id, &address, remote.shares_to_tokens_rate()?)
}

/// Stores a share rate observed for a validator and starts a slash check if the rate moved.
///
/// A move seen while the validator's delegation is changing or already being checked leaves the
/// validator pending. The check then starts from the next observed rate.
pub(crate) fn record_shares_rate(
    engine: &mut Engine,
    chain_id: &str,
    address: &str,
    rate: Dec,
) -> StakeResult<()> {
    // removed while the query was in flight
    let Some(mut validator) = get_validator(engine.store(), chain_id, address)? else {
        return Ok(());
    };

    let previous = validator.shares_to_tokens_rate;
    validator.shares_to_tokens_rate = rate;
    validator.rate_epoch = current_epoch(engine.store(), EpochIdentifier::StrideEpoch)?;

    if !previous.is_zero() && previous != rate {
        info!(zone = %chain_id, validator = %address, %previous, %rate, "validator share rate moved");
        validator.slash_check_pending = true;
    }
    if validator.delegation == 0 {
        validator.slash_check_pending = false;
    }

    let checkable =
        validator.delegation_changes_in_progress == 0 && !validator.slash_query_in_progress;
    if !(validator.slash_check_pending && checkable) {
        if validator.slash_check_pending {
            debug!(zone = %chain_id, validator = %address, "slash check deferred");
        }
        set_validator(engine.store_mut(), chain_id, &validator)?;
        debug!(zone = %chain_id, validator = %address, %rate, "updated validator share rate");
        return Ok(());
    }

    let zone = require_host_zone(engine.store(), chain_id)?;
    let Some(delegation_address) = zone.ica_address(IcaAccountType::Delegation).map(str::to_string)
    else {
        set_validator(engine.store_mut(), chain_id, &validator)?;
        return Ok(());
    };

    validator.slash_query_in_progress = true;
    set_validator(engine.store_mut(), chain_id, &validator)?;

    query_delegator_shares(engine, chain_id, &delegation_address, address)?;
    Ok(())
}

/// Queries the share rate of every validator of a zone whose slash check was deferred and can
/// run now. Returns the number of queries submitted.
pub fn query_deferred_slash_checks(engine: &mut Engine, chain_id: &str) -> StakeResult<usize> {
    let ready: Vec<String> = validators_for_zone(engine.store(), chain_id)?
        .into_iter()
        .filter(|v| {
            v.slash_check_pending
                && v.delegation_changes_in_progress == 0
                && !v.slash_query_in_progress
        })
        .map(|v| v.address)
        .collect();

    for address in &ready {
        query_shares_rate(engine, chain_id, address)?;
    }
    Ok(ready.len())
}

/// Compares the value of the delegation account's shares with the recorded delegation and applies
/// the difference as a slash.
///
/// A slash above the cap halts the zone instead of being applied.
pub fn delegator_shares_callback(
    engine: &mut Engine,
    result: &[u8],
    query: &Query,
) -> StakeResult<()> {
    let chain_id = query.chain_id.as_str();
    let address = callback_validator(query)?;

    let Some(mut validator) = get_validator(engine.store(), chain_id, &address)? else {
        return Ok(());
    };
    validator.slash_query_in_progress = false;

    let Some(remote) = decode_value::<RemoteDelegation>(result)? else {
        warn!(zone = %chain_id, validator = %address, "delegation not found on host");
        validator.slash_check_pending = false;
        set_validator(engine.store_mut(), chain_id, &validator)?;
        return Ok(());
    };

    // the recorded delegation is stale until the in-flight changes settle
    if validator.delegation_changes_in_progress > 0 {
        info!(zone = %chain_id, validator = %address, "delegation changes in flight, deferring slash check");
        validator.slash_check_pending = true;
        set_validator(engine.store_mut(), chain_id, &validator)?;
        return Ok(());
    }

    validator.slash_check_pending = false;
    let tokens = validator
        .shares_to_tokens_rate
        .checked_mul(remote.shares)?
        .truncate_int()?;
    if tokens >= validator.delegation {
        set_validator(engine.store_mut(), chain_id, &validator)?;
        return Ok(());
    }

    let slash_amount = validator.delegation - tokens;
    let slash = Dec::from_ratio(slash_amount, validator.delegation)?;
    let mut zone = require_host_zone(engine.store(), chain_id)?;

    if slash > engine.params().max_slash_rate() {
        let err = StakeError::SlashExceedsCap {
            validator: address.clone(),
            slash,
        };
        warn!(zone = %chain_id, %err, "halting zone");

        zone.halted = true;
        set_host_zone(engine.store_mut(), &zone)?;
        set_validator(engine.store_mut(), chain_id, &validator)?;

        engine.emit(StakeEvent::SlashHalt {
            zone: chain_id.to_string(),
            validator: address,
            slash,
        });
        return Ok(());
    }

    let kept = Dec::ONE.checked_sub(slash)?;
    let weight = kept.mul_int_truncate(u128::from(validator.weight))?;
    validator.weight = u64::try_from(weight).unwrap_or(validator.weight);
    validator.delegation = tokens;
    zone.total_delegations = zone.total_delegations.saturating_sub(slash_amount);

    set_validator(engine.store_mut(), chain_id, &validator)?;
    set_host_zone(engine.store_mut(), &zone)?;

    warn!(zone = %chain_id, validator = %address, amount = %slash_amount, %slash, "applied slash");
    engine.emit(StakeEvent::ValidatorSlashed {
        zone: chain_id.to_string(),
        validator: address,
        amount: slash_amount,
    });

    // the lowered weight moves stake off the slashed validator
    let max_swaps = engine.params().rebalance_max_swaps;
    run_step(engine, chain_id, "rebalance after slash", |e| {
        rebalance::rebalance(e, chain_id, max_swaps)
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use liquid_stake_icq::{keeper::all_queries, ResponseOutcome};

    use super::*;
    use crate::{
        msgs::Msg,
        testing::{TestEnv, ADMIN, USER, ZONE},
    };

    fn request_rate_update(env: &mut TestEnv, validator: &str) {
        env.deliver(Msg::UpdateValidatorSharesExchRate {
            creator: ADMIN.to_string(),
            chain_id: ZONE.to_string(),
            valoper: validator.to_string(),
        })
        .unwrap();
    }

    fn validator(env: &TestEnv, address: &str) -> crate::validators::Validator {
        require_validator(env.engine.store(), ZONE, address).unwrap()
    }

    #[test]
    fn test_resubmitted_rate_query_keeps_its_id() {
        let mut env = TestEnv::new();
        let address = env.add_validators(&[(1, 1)]).remove(0);
        env.next_block();

        let first = query_shares_rate(&mut env.engine, ZONE, &address).unwrap();
        let second = query_shares_rate(&mut env.engine, ZONE, &address).unwrap();
        assert_eq!(first, second);

        let matching = all_queries(env.engine.store())
            .unwrap()
            .into_iter()
            .filter(|query| query.id == first)
            .count();
        assert_eq!(matching, 1);
    }

    #[test]
    fn test_unchanged_rate_starts_no_slash_check() {
        let mut env = TestEnv::new();
        let address = env.add_validators(&[(1, 1)]).remove(0);
        env.stake_and_delegate(USER, 100);

        request_rate_update(&mut env, &address);
        env.next_block();
        assert!(!validator(&env, &address).slash_query_in_progress);
        assert_eq!(validator(&env, &address).shares_to_tokens_rate, Dec::ONE);
    }

    #[test]
    fn test_slash_check_retries_after_timeout() {
        let mut env = TestEnv::new();
        let address = env.add_validators(&[(1, 10)]).remove(0);
        env.stake_and_delegate(USER, 100);
        env.host.slash(&address, 5);

        request_rate_update(&mut env, &address);
        env.next_block();
        assert!(validator(&env, &address).slash_query_in_progress);

        let delegation = delegation_key(&env.ica(IcaAccountType::Delegation), &address);
        env.answer_queries = false;
        env.next_block();
        let expired = env
            .unanswered
            .iter()
            .find(|request| request.request_data == delegation)
            .cloned()
            .expect("delegator shares must be queried");

        // the check outlives the epoch it was started in
        env.next_stride_epoch();
        let retried = env
            .unanswered
            .iter()
            .find(|request| request.request_data == delegation && request.id != expired.id)
            .cloned()
            .expect("delegator shares must be queried again");

        assert_eq!(env.answer(&expired), ResponseOutcome::Missing);
        assert_eq!(env.answer(&retried), ResponseOutcome::Applied);
        env.relay();

        let slashed = validator(&env, &address);
        assert!(!slashed.slash_query_in_progress);
        assert_eq!(slashed.delegation, 95);
        assert_eq!(slashed.weight, 9);
        assert_eq!(env.zone().total_delegations, 95);
        env.assert_delegations_match();
        assert!(env
            .events
            .iter()
            .any(|event| matches!(event, StakeEvent::ValidatorSlashed { amount: 5, .. })));
    }

    #[test]
    fn test_slash_above_cap_halts_zone() {
        let mut env = TestEnv::new();
        let address = env.add_validators(&[(1, 10)]).remove(0);
        env.stake_and_delegate(USER, 100);
        env.host.slash(&address, 20);

        request_rate_update(&mut env, &address);
        env.next_block();
        env.next_block();

        let zone = env.zone();
        assert!(zone.halted);
        assert_eq!(zone.total_delegations, 100);
        assert_eq!(validator(&env, &address).delegation, 100);
        assert!(env
            .events
            .iter()
            .any(|event| matches!(event, StakeEvent::SlashHalt { .. })));
    }

    #[test]
    fn test_rate_move_during_delegation_is_checked_once_it_settles() {
        let mut env = TestEnv::new();
        let address = env.add_validators(&[(1, 10)]).remove(0);
        env.stake_and_delegate(USER, 100);

        env.fund(USER, 100);
        env.liquid_stake(USER, 100).unwrap();
        env.next_stride_epoch();
        env.hold_packets = true;
        env.next_stride_epoch();
        assert!(validator(&env, &address).delegation_changes_in_progress > 0);

        env.host.slash(&address, 5);
        request_rate_update(&mut env, &address);
        env.next_block();
        let deferred = validator(&env, &address);
        assert!(deferred.slash_check_pending);
        assert!(!deferred.slash_query_in_progress);
        assert_eq!(deferred.delegation, 100);

        env.release_held();
        let settled = validator(&env, &address);
        assert_eq!(settled.delegation_changes_in_progress, 0);
        assert_eq!(settled.delegation, 200);

        env.next_stride_epoch();
        let slashed = validator(&env, &address);
        let on_host = env
            .host
            .delegation_tokens(&env.ica(IcaAccountType::Delegation), &address);
        assert!(!slashed.slash_check_pending);
        assert!(slashed.delegation < 200);
        assert_eq!(slashed.delegation, on_host);
        env.assert_delegations_match();
        assert!(env
            .events
            .iter()
            .any(|event| matches!(event, StakeEvent::ValidatorSlashed { .. })));
    }

    #[test]
    fn test_applied_slash_rebalances_the_zone() {
        let mut env = TestEnv::new();
        let addresses = env.add_validators(&[(1, 10), (2, 10)]);
        env.stake_and_delegate(USER, 200);
        env.host.slash(&addresses[0], 5);

        request_rate_update(&mut env, &addresses[0]);
        env.next_block();

        assert!(env
            .events
            .iter()
            .any(|event| matches!(event, StakeEvent::Rebalanced { swaps: 1, .. })));
        let slashed = validator(&env, &addresses[0]);
        assert_eq!(slashed.weight, 9);
        assert_eq!(slashed.delegation, 92);
        assert_eq!(validator(&env, &addresses[1]).delegation, 103);
        assert_eq!(env.zone().total_delegations, 195);
        env.assert_delegations_match();
    }

    #[test]
    fn test_slash_without_imbalance_sends_no_redelegation() {
        let mut env = TestEnv::new();
        let address = env.add_validators(&[(1, 10)]).remove(0);
        env.stake_and_delegate(USER, 100);
        env.host.slash(&address, 5);

        request_rate_update(&mut env, &address);
        env.next_block();

        assert_eq!(validator(&env, &address).delegation, 95);
        assert!(!env
            .events
            .iter()
            .any(|event| matches!(event, StakeEvent::Rebalanced { .. })));
    }
}
