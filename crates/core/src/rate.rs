//! The redemption rate: native value backing one unit of derivative.

use liquid_stake_db::KvStore;
use liquid_stake_primitives::{decimal::Dec, types::Amount};
use liquid_stake_records::{DepositRecordStatus, LsmDepositStatus, RecordStore};
use tracing::{debug, info, warn};

use crate::{
    bank,
    engine::Engine,
    errors::{StakeError, StakeResult},
    events::StakeEvent,
    host_zone::{require_host_zone, set_host_zone, HostZone},
    validators::get_validator,
};

/// The native value held by a zone, by where it sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NativeBalance {
    /// Delegated to validators.
    pub delegated: Amount,

    /// On the host but not delegated yet, including in-transit LSM shares at their share rate.
    pub undelegated: Amount,

    /// On the controller, waiting to be transferred.
    pub pending: Amount,
}

impl NativeBalance {
    /// Everything backing the derivative.
    pub const fn total(&self) -> Amount {
        self.delegated + self.undelegated + self.pending
    }
}

/// Tallies the native value backing `zone`'s derivative.
pub fn native_balance(store: &KvStore, zone: &HostZone) -> StakeResult<NativeBalance> {
    let sum_records = |status| -> StakeResult<Amount> {
        Ok(store
            .deposit_records_by_status(&zone.chain_id, status)?
            .iter()
            .map(|record| record.amount)
            .sum())
    };

    let pending = sum_records(DepositRecordStatus::TransferQueue)?
        + sum_records(DepositRecordStatus::TransferInProgress)?;

    let mut undelegated = sum_records(DepositRecordStatus::DelegationQueue)?
        + sum_records(DepositRecordStatus::DelegationInProgress)?
        + zone.withdrawal_balance;

    for deposit in store.lsm_deposits_for_zone(&zone.chain_id)? {
        // nothing has been minted for a pending deposit yet
        if deposit.status == LsmDepositStatus::DepositPending {
            continue;
        }

        let Some(validator) = get_validator(store, &zone.chain_id, &deposit.validator_address)?
        else {
            continue;
        };
        undelegated += validator.shares_to_tokens_rate.mul_int_truncate(deposit.amount)?;
    }

    Ok(NativeBalance {
        delegated: zone.total_delegations,
        undelegated,
        pending,
    })
}

/// Derivative minted for a deposit of `amount` native at `rate`.
pub fn mint_amount(rate: Dec, amount: Amount) -> StakeResult<Amount> {
    let st_amount = rate.int_quo_truncate(amount)?;
    if st_amount == 0 {
        return Err(StakeError::validation(format!(
            "a deposit of {amount} at a redemption rate of {rate} mints nothing"
        )));
    }

    Ok(st_amount)
}

/// Native owed for redeeming `st_amount` derivative at `rate`.
pub fn redeem_amount(rate: Dec, st_amount: Amount) -> StakeResult<Amount> {
    Ok(rate.mul_int_truncate(st_amount)?)
}

/// Recomputes the redemption rate of a zone and applies the bounds to it.
///
/// A rate outside the outer bounds halts the zone. A rate outside the inner bounds only raises
/// an alert. With no derivative in circulation the rate is left as it is.
///
/// Halted zones keep being updated so that they can be resumed once the rate recovers. The halt
/// event is only emitted when the zone is first halted.
pub fn update_redemption_rate(engine: &mut Engine, chain_id: &str) -> StakeResult<Dec> {
    let mut zone = require_host_zone(engine.store(), chain_id)?;
    let balance = native_balance(engine.store(), &zone)?;
    let supply = bank::supply(engine.store(), &zone.st_denom)?;

    if supply == 0 {
        debug!(zone = %chain_id, "no derivative in circulation, keeping the redemption rate");
        return Ok(zone.redemption_rate);
    }

    let rate = Dec::from_ratio(balance.total(), supply)?;
    zone.last_redemption_rate = zone.redemption_rate;
    zone.redemption_rate = rate;

    let halt = !zone.bounds.within_outer(rate);
    let alert = !halt && !zone.bounds.within_inner(rate);
    let newly_halted = halt && !zone.halted;
    let recovered = !halt && zone.halted;
    if halt {
        zone.halted = true;
    }
    set_host_zone(engine.store_mut(), &zone)?;

    info!(
        zone = %chain_id,
        %rate,
        delegated = %balance.delegated,
        undelegated = %balance.undelegated,
        pending = %balance.pending,
        %supply,
        "updated redemption rate"
    );
    engine.emit(StakeEvent::RedemptionRateUpdated {
        zone: chain_id.to_string(),
        rate,
    });

    if recovered {
        info!(zone = %chain_id, %rate, "redemption rate back inside the outer bounds, zone can be resumed");
    }

    if newly_halted {
        warn!(zone = %chain_id, %rate, "redemption rate outside the outer bounds, halting zone");
        engine.emit(StakeEvent::RedemptionRateHalt {
            zone: chain_id.to_string(),
            rate,
        });
    } else if alert {
        warn!(zone = %chain_id, %rate, "redemption rate outside the inner bounds");
        engine.emit(StakeEvent::RedemptionRateAlert {
            zone: chain_id.to_string(),
            rate,
        });
    }

    Ok(rate)
}
