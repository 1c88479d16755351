//! The per-zone validator set and how stake is allocated across it.

use std::collections::BTreeMap;

use liquid_stake_db::{KeyBuf, KvStore};
use liquid_stake_primitives::{
    address::validate_valoper_address,
    decimal::Dec,
    types::{Amount, EpochNumber},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    engine::Engine,
    errors::{StakeError, StakeResult},
    host_zone::{require_host_zone, set_host_zone},
    row_spec::ValidatorRowSpec,
};

/// A validator of a host zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Human readable name.
    pub name: String,

    /// Operator address on the host.
    pub address: String,

    /// Target weight.
    pub weight: u64,

    /// Native delegated by the delegation account.
    pub delegation: Amount,

    /// Set while a delegator-shares query checks the validator for a slash.
    pub slash_query_in_progress: bool,

    /// Set when the share rate moved but the slash check could not run yet. Cleared once a check
    /// settles.
    pub slash_check_pending: bool,

    /// Tokens per delegation share, as last observed. Zero until first observed.
    pub shares_to_tokens_rate: Dec,

    /// Stride epoch in which the rate was observed.
    pub rate_epoch: EpochNumber,

    /// Delegate, undelegate and redelegate packets in flight against the validator.
    pub delegation_changes_in_progress: u64,
}

impl Validator {
    /// Creates a validator with no delegation.
    pub fn new(name: impl Into<String>, address: impl Into<String>, weight: u64) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            weight,
            delegation: 0,
            slash_query_in_progress: false,
            slash_check_pending: false,
            shares_to_tokens_rate: Dec::ZERO,
            rate_epoch: 0,
            delegation_changes_in_progress: 0,
        }
    }
}

fn validator_key(chain_id: &str, address: &str) -> (String, String) {
    (chain_id.to_string(), address.to_string())
}

/// Reads a validator.
pub fn get_validator(
    store: &KvStore,
    chain_id: &str,
    address: &str,
) -> StakeResult<Option<Validator>> {
    Ok(store.get_row::<ValidatorRowSpec>(&validator_key(chain_id, address))?)
}

/// Reads a validator, failing if it does not exist.
pub fn require_validator(store: &KvStore, chain_id: &str, address: &str) -> StakeResult<Validator> {
    get_validator(store, chain_id, address)?
        .ok_or_else(|| StakeError::not_found("validator", format!("{chain_id}/{address}")))
}

/// Writes a validator.
pub fn set_validator(store: &mut KvStore, chain_id: &str, validator: &Validator) -> StakeResult<()> {
    Ok(store.put_row::<ValidatorRowSpec>(&validator_key(chain_id, &validator.address), validator)?)
}

/// Returns the validators of a zone in address order.
pub fn validators_for_zone(store: &KvStore, chain_id: &str) -> StakeResult<Vec<Validator>> {
    let prefix = KeyBuf::new().str(chain_id)?.finish();
    Ok(store
        .collect_rows::<ValidatorRowSpec>(&prefix)?
        .into_iter()
        .map(|(_, validator)| validator)
        .collect())
}

/// Adjusts the in-flight change counter of each of `addresses` by one.
pub(crate) fn mark_delegation_changes(
    store: &mut KvStore,
    chain_id: &str,
    addresses: &[&str],
    in_flight: bool,
) -> StakeResult<()> {
    for address in addresses {
        let Some(mut validator) = get_validator(store, chain_id, address)? else {
            continue;
        };

        validator.delegation_changes_in_progress = if in_flight {
            validator.delegation_changes_in_progress + 1
        } else {
            validator.delegation_changes_in_progress.saturating_sub(1)
        };
        set_validator(store, chain_id, &validator)?;
    }

    Ok(())
}

/// Adds `amount` to a validator's delegation and to the zone's total.
pub(crate) fn add_delegation(
    store: &mut KvStore,
    chain_id: &str,
    address: &str,
    amount: Amount,
) -> StakeResult<()> {
    let mut validator = require_validator(store, chain_id, address)?;
    let mut zone = require_host_zone(store, chain_id)?;

    validator.delegation += amount;
    zone.total_delegations += amount;

    set_validator(store, chain_id, &validator)?;
    set_host_zone(store, &zone)
}

/// Removes up to `amount` from a validator's delegation and the same from the zone's total.
///
/// Returns what was removed. Less than `amount` is removed only if the delegation shrank while
/// the change was in flight, e.g. after a slash was applied.
pub(crate) fn remove_delegation(
    store: &mut KvStore,
    chain_id: &str,
    address: &str,
    amount: Amount,
) -> StakeResult<Amount> {
    let mut validator = require_validator(store, chain_id, address)?;
    let mut zone = require_host_zone(store, chain_id)?;

    let removed = amount.min(validator.delegation);
    if removed < amount {
        warn!(
            zone = %chain_id,
            validator = %address,
            %amount,
            delegation = %validator.delegation,
            "removing more than is delegated"
        );
    }

    validator.delegation -= removed;
    zone.total_delegations = zone.total_delegations.saturating_sub(removed);

    set_validator(store, chain_id, &validator)?;
    set_host_zone(store, &zone)?;
    Ok(removed)
}

// ===== Allocation =====

/// Splits `total` across the validators that take new stake, in proportion to their weights.
///
/// Validators under a slash check are left out. The validators are ordered by weight, then by
/// address, each gets the floor of its share and the last one takes the remainder.
pub fn target_amounts(validators: &[Validator], total: Amount) -> StakeResult<Vec<(String, Amount)>> {
    let mut eligible: Vec<&Validator> = validators
        .iter()
        .filter(|validator| !validator.slash_query_in_progress)
        .collect();
    eligible.sort_by(|a, b| a.weight.cmp(&b.weight).then_with(|| a.address.cmp(&b.address)));

    let total_weight: u128 = eligible.iter().map(|v| u128::from(v.weight)).sum();
    if total_weight == 0 {
        return Err(StakeError::validation("no validator has a non-zero weight"));
    }

    let mut targets = Vec::with_capacity(eligible.len());
    let mut allocated: Amount = 0;
    for (i, validator) in eligible.iter().enumerate() {
        let target = if i + 1 == eligible.len() {
            total - allocated
        } else {
            u128::from(validator.weight)
                .checked_mul(total)
                .ok_or_else(|| StakeError::validation("delegation target overflow"))?
                / total_weight
        };

        allocated += target;
        targets.push((validator.address.clone(), target));
    }

    Ok(targets)
}

/// Splits a new delegation of `amount` across the validators by weight. Empty splits are dropped.
pub fn delegation_splits(validators: &[Validator], amount: Amount) -> StakeResult<Vec<(String, Amount)>> {
    Ok(target_amounts(validators, amount)?
        .into_iter()
        .filter(|(_, amount)| *amount > 0)
        .collect())
}

/// Splits an undelegation of `amount` across the validators.
///
/// Each validator first gives up the stake it holds above its target for the reduced total,
/// largest excess first. Anything left comes out of the remaining delegations in the same
/// order. Validators under a slash check are not touched.
pub fn unbonding_splits(
    validators: &[Validator],
    total_delegations: Amount,
    amount: Amount,
) -> StakeResult<Vec<(String, Amount)>> {
    if amount > total_delegations {
        return Err(StakeError::validation(format!(
            "cannot unbond {amount} out of {total_delegations} delegated"
        )));
    }

    let eligible: Vec<&Validator> = validators
        .iter()
        .filter(|validator| !validator.slash_query_in_progress)
        .collect();
    let targets: BTreeMap<String, Amount> = target_amounts(validators, total_delegations - amount)?
        .into_iter()
        .collect();

    let mut capacities: Vec<(&str, Amount, Amount)> = eligible
        .iter()
        .map(|validator| {
            let target = targets.get(&validator.address).copied().unwrap_or_default();
            (
                validator.address.as_str(),
                validator.delegation.saturating_sub(target),
                validator.delegation,
            )
        })
        .collect();
    capacities.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut taken: BTreeMap<&str, Amount> = BTreeMap::new();
    let mut remaining = amount;

    for (address, capacity, _) in &capacities {
        let take = remaining.min(*capacity);
        if take > 0 {
            *taken.entry(address).or_default() += take;
            remaining -= take;
        }
    }

    for (address, _, delegation) in &capacities {
        if remaining == 0 {
            break;
        }

        let already = taken.get(address).copied().unwrap_or_default();
        let take = remaining.min(delegation - already);
        if take > 0 {
            *taken.entry(address).or_default() += take;
            remaining -= take;
        }
    }

    if remaining > 0 {
        return Err(StakeError::validation(format!(
            "validators cannot cover an undelegation of {amount}, {remaining} short"
        )));
    }

    Ok(taken
        .into_iter()
        .map(|(address, amount)| (address.to_string(), amount))
        .collect())
}

/// A redelegation between two validators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redelegation {
    /// Operator address of the over-delegated validator.
    pub src: String,

    /// Operator address of the under-delegated validator.
    pub dst: String,

    /// Amount moved.
    pub amount: Amount,
}

/// Pairs over-delegated validators with under-delegated ones, largest imbalance first.
///
/// At most `max_swaps` redelegations are returned. Anything left is deferred to a later run.
pub fn rebalance_moves(
    validators: &[Validator],
    total_delegations: Amount,
    max_swaps: usize,
) -> StakeResult<Vec<Redelegation>> {
    let targets: BTreeMap<String, Amount> = target_amounts(validators, total_delegations)?
        .into_iter()
        .collect();

    let mut surplus = Vec::new();
    let mut deficit = Vec::new();
    for validator in validators.iter().filter(|v| !v.slash_query_in_progress) {
        let target = targets.get(&validator.address).copied().unwrap_or_default();
        if validator.delegation > target {
            surplus.push((validator.address.clone(), validator.delegation - target));
        } else if validator.delegation < target {
            deficit.push((validator.address.clone(), target - validator.delegation));
        }
    }

    let by_size = |a: &(String, Amount), b: &(String, Amount)| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0));
    surplus.sort_by(by_size);
    deficit.sort_by(by_size);

    let mut moves = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < surplus.len() && j < deficit.len() && moves.len() < max_swaps {
        let amount = surplus[i].1.min(deficit[j].1);
        moves.push(Redelegation {
            src: surplus[i].0.clone(),
            dst: deficit[j].0.clone(),
            amount,
        });

        surplus[i].1 -= amount;
        deficit[j].1 -= amount;
        if surplus[i].1 == 0 {
            i += 1;
        }
        if deficit[j].1 == 0 {
            j += 1;
        }
    }

    Ok(moves)
}

// ===== Admin Operations =====

/// A validator to add to a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Human readable name.
    pub name: String,

    /// Operator address on the host.
    pub address: String,

    /// Target weight.
    pub weight: u64,
}

/// Adds validators to a zone and queries each one's share rate.
pub fn add_validators(
    engine: &mut Engine,
    chain_id: &str,
    validators: &[ValidatorConfig],
) -> StakeResult<()> {
    let zone = require_host_zone(engine.store(), chain_id)?;

    for config in validators {
        validate_valoper_address(&config.address, &zone.bech32_prefix)?;
        if get_validator(engine.store(), chain_id, &config.address)?.is_some() {
            return Err(StakeError::validation(format!(
                "validator {} already exists on {chain_id}",
                config.address
            )));
        }

        let validator = Validator::new(&config.name, &config.address, config.weight);
        set_validator(engine.store_mut(), chain_id, &validator)?;
        info!(zone = %chain_id, validator = %config.address, weight = %config.weight, "added validator");

        crate::slash::query_shares_rate(engine, chain_id, &config.address)?;
    }

    Ok(())
}

/// Replaces the weights of the named validators.
pub fn change_weights(
    engine: &mut Engine,
    chain_id: &str,
    weights: &[(String, u64)],
) -> StakeResult<()> {
    require_host_zone(engine.store(), chain_id)?;

    for (address, weight) in weights {
        let mut validator = require_validator(engine.store(), chain_id, address)?;
        validator.weight = *weight;
        set_validator(engine.store_mut(), chain_id, &validator)?;
    }

    let validators = validators_for_zone(engine.store(), chain_id)?;
    if validators.iter().all(|validator| validator.weight == 0) {
        return Err(StakeError::validation("at least one validator needs a non-zero weight"));
    }

    info!(zone = %chain_id, changed = %weights.len(), "changed validator weights");
    Ok(())
}

/// Removes a validator that holds no stake and has nothing in flight.
pub fn remove_validator(engine: &mut Engine, chain_id: &str, address: &str) -> StakeResult<()> {
    let validator = require_validator(engine.store(), chain_id, address)?;

    if validator.delegation > 0 {
        return Err(StakeError::validation(format!(
            "validator {address} still holds {} delegated",
            validator.delegation
        )));
    }
    if validator.delegation_changes_in_progress > 0 {
        return Err(StakeError::validation(format!(
            "validator {address} has {} delegation changes in flight",
            validator.delegation_changes_in_progress
        )));
    }

    engine
        .store_mut()
        .delete_row::<ValidatorRowSpec>(&validator_key(chain_id, address))?;

    info!(zone = %chain_id, validator = %address, "removed validator");
    Ok(())
}
