//! Row specs for the record tables.

use liquid_stake_db::{DbResult, KVRowSpec, KeyBuf, KeyReader, PackableKey, TablePrefix};
use liquid_stake_primitives::types::EpochNumber;

use crate::types::{
    DepositRecord, HostZoneUnbonding, LsmTokenDeposit, UserRedemptionId, UserRedemptionRecord,
};

impl PackableKey for UserRedemptionId {
    fn pack(&self) -> DbResult<Vec<u8>> {
        Ok(KeyBuf::new()
            .str(&self.host_zone_id)?
            .u64(self.epoch_number)
            .str(&self.receiver)?
            .finish())
    }

    fn unpack(bytes: &[u8]) -> DbResult<Self> {
        let mut reader = KeyReader::new(bytes);
        let host_zone_id = reader.str()?;
        let epoch_number = reader.u64()?;
        let receiver = reader.str()?;
        reader.finish()?;

        Ok(Self {
            host_zone_id,
            epoch_number,
            receiver,
        })
    }
}

/// ZST for the deposit record row spec, keyed by record id.
#[derive(Debug)]
pub struct DepositRecordRowSpec;

impl KVRowSpec for DepositRecordRowSpec {
    const PREFIX: TablePrefix = TablePrefix::DepositRecord;
    type Key = u64;
    type Value = DepositRecord;
}

/// ZST for the user redemption record row spec.
#[derive(Debug)]
pub struct UserRedemptionRowSpec;

impl KVRowSpec for UserRedemptionRowSpec {
    const PREFIX: TablePrefix = TablePrefix::UserRedemption;
    type Key = UserRedemptionId;
    type Value = UserRedemptionRecord;
}

/// ZST for the host zone unbonding row spec, keyed by `(epoch, zone)`.
#[derive(Debug)]
pub struct HostZoneUnbondingRowSpec;

impl KVRowSpec for HostZoneUnbondingRowSpec {
    const PREFIX: TablePrefix = TablePrefix::HostZoneUnbonding;
    type Key = (EpochNumber, String);
    type Value = HostZoneUnbonding;
}

/// ZST for the LSM deposit row spec, keyed by `(zone, lsm denom)`.
#[derive(Debug)]
pub struct LsmDepositRowSpec;

impl KVRowSpec for LsmDepositRowSpec {
    const PREFIX: TablePrefix = TablePrefix::LsmDeposit;
    type Key = (String, String);
    type Value = LsmTokenDeposit;
}
