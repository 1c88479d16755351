//! Row specs for the query tables.

use liquid_stake_db::{KVRowSpec, TablePrefix};

use crate::types::{DataPoint, Query};

/// ZST for the pending query row spec, keyed by query id.
#[derive(Debug)]
pub struct QueryRowSpec;

impl KVRowSpec for QueryRowSpec {
    const PREFIX: TablePrefix = TablePrefix::Query;
    type Key = String;
    type Value = Query;
}

/// ZST for the data point row spec, keyed by query id.
#[derive(Debug)]
pub struct DataPointRowSpec;

impl KVRowSpec for DataPointRowSpec {
    const PREFIX: TablePrefix = TablePrefix::DataPoint;
    type Key = String;
    type Value = DataPoint;
}
