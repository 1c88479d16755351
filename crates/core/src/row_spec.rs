//! Row specifications of the tables owned by the core.

use liquid_stake_db::{KVRowSpec, TablePrefix};
use liquid_stake_primitives::{denom::DenomTrace, types::Amount};

use crate::{
    epochs::EpochTracker, host_zone::HostZone, trade_route::TradeRoute, validators::Validator,
};

/// ZST for the host zone row spec, keyed by chain id.
#[derive(Debug)]
pub struct HostZoneRowSpec;

impl KVRowSpec for HostZoneRowSpec {
    const PREFIX: TablePrefix = TablePrefix::HostZone;
    type Key = String;
    type Value = HostZone;
}

/// ZST for the validator row spec, keyed by `(chain id, operator address)`.
#[derive(Debug)]
pub struct ValidatorRowSpec;

impl KVRowSpec for ValidatorRowSpec {
    const PREFIX: TablePrefix = TablePrefix::Validator;
    type Key = (String, String);
    type Value = Validator;
}

/// ZST for the epoch tracker row spec, keyed by identifier.
#[derive(Debug)]
pub struct EpochTrackerRowSpec;

impl KVRowSpec for EpochTrackerRowSpec {
    const PREFIX: TablePrefix = TablePrefix::EpochTracker;
    type Key = String;
    type Value = EpochTracker;
}

/// ZST for the trade route row spec, keyed by `(reward denom, host denom)`.
#[derive(Debug)]
pub struct TradeRouteRowSpec;

impl KVRowSpec for TradeRouteRowSpec {
    const PREFIX: TablePrefix = TablePrefix::TradeRoute;
    type Key = (String, String);
    type Value = TradeRoute;
}

/// ZST for the denom trace row spec, keyed by hash denom.
#[derive(Debug)]
pub struct DenomTraceRowSpec;

impl KVRowSpec for DenomTraceRowSpec {
    const PREFIX: TablePrefix = TablePrefix::DenomTrace;
    type Key = String;
    type Value = DenomTrace;
}

/// ZST for the balance row spec, keyed by `(address, denom)`.
#[derive(Debug)]
pub struct BalanceRowSpec;

impl KVRowSpec for BalanceRowSpec {
    const PREFIX: TablePrefix = TablePrefix::Balance;
    type Key = (String, String);
    type Value = Amount;
}

/// ZST for the supply row spec, keyed by denom.
#[derive(Debug)]
pub struct SupplyRowSpec;

impl KVRowSpec for SupplyRowSpec {
    const PREFIX: TablePrefix = TablePrefix::Supply;
    type Key = String;
    type Value = Amount;
}
