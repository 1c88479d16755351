//! Persistence interface for records.

use liquid_stake_db::{KeyBuf, KvStore};
use liquid_stake_primitives::types::{Amount, EpochNumber};
use tracing::debug;

use crate::{
    errors::RecordResult,
    row_spec::{
        DepositRecordRowSpec, HostZoneUnbondingRowSpec, LsmDepositRowSpec, UserRedemptionRowSpec,
    },
    types::{
        DepositRecord, DepositRecordStatus, DepositSource, HostZoneUnbonding,
        HostZoneUnbondingStatus, LsmDepositStatus, LsmTokenDeposit, UserRedemptionId,
        UserRedemptionRecord,
    },
};

/// Name of the counter that hands out deposit record ids.
pub const DEPOSIT_RECORD_COUNTER: &str = "deposit_record";

/// Standard persistence interface for the record tables.
///
/// Reads are total: a missing row is `Ok(None)`, never an error.
pub trait RecordStore {
    // ── Deposit Records ──────────────────────────────────────────────

    /// Gets, if present, the [`DepositRecord`] with the given id.
    fn get_deposit_record(&self, id: u64) -> RecordResult<Option<DepositRecord>>;

    /// Sets a [`DepositRecord`] under its id.
    fn set_deposit_record(&mut self, record: &DepositRecord) -> RecordResult<()>;

    /// Deletes the [`DepositRecord`] with the given id.
    fn delete_deposit_record(&mut self, id: u64) -> RecordResult<()>;

    /// Creates a new [`DepositRecord`] with the next id.
    fn append_deposit_record(
        &mut self,
        host_zone_id: &str,
        denom: &str,
        amount: Amount,
        status: DepositRecordStatus,
        source: DepositSource,
        epoch: EpochNumber,
    ) -> RecordResult<DepositRecord>;

    /// Lazily iterates over every [`DepositRecord`] in id order.
    fn iter_deposit_records(&self) -> impl Iterator<Item = RecordResult<DepositRecord>>;

    /// Returns the deposit records of a zone in the given status, in id order.
    fn deposit_records_by_status(
        &self,
        host_zone_id: &str,
        status: DepositRecordStatus,
    ) -> RecordResult<Vec<DepositRecord>>;

    /// Returns the user-deposit record of a zone that is still collecting liquid stakes in the
    /// given epoch.
    fn get_transfer_deposit_record(
        &self,
        host_zone_id: &str,
        epoch: EpochNumber,
    ) -> RecordResult<Option<DepositRecord>>;

    // ── User Redemption Records ──────────────────────────────────────

    /// Gets, if present, the [`UserRedemptionRecord`] with the given id.
    fn get_user_redemption_record(
        &self,
        id: &UserRedemptionId,
    ) -> RecordResult<Option<UserRedemptionRecord>>;

    /// Sets a [`UserRedemptionRecord`] under its id.
    fn set_user_redemption_record(&mut self, record: &UserRedemptionRecord) -> RecordResult<()>;

    /// Deletes the [`UserRedemptionRecord`] with the given id.
    fn delete_user_redemption_record(&mut self, id: &UserRedemptionId) -> RecordResult<()>;

    /// Returns every [`UserRedemptionRecord`] of a zone, ordered by epoch then receiver.
    fn user_redemption_records_for_zone(
        &self,
        host_zone_id: &str,
    ) -> RecordResult<Vec<UserRedemptionRecord>>;

    // ── Host Zone Unbondings ─────────────────────────────────────────

    /// Gets, if present, the [`HostZoneUnbonding`] of a zone in an epoch.
    fn get_host_zone_unbonding(
        &self,
        epoch: EpochNumber,
        host_zone_id: &str,
    ) -> RecordResult<Option<HostZoneUnbonding>>;

    /// Sets a [`HostZoneUnbonding`] under `(epoch, zone)`.
    fn set_host_zone_unbonding(&mut self, unbonding: &HostZoneUnbonding) -> RecordResult<()>;

    /// Deletes the [`HostZoneUnbonding`] of a zone in an epoch.
    fn delete_host_zone_unbonding(
        &mut self,
        epoch: EpochNumber,
        host_zone_id: &str,
    ) -> RecordResult<()>;

    /// Returns every [`HostZoneUnbonding`], ordered by epoch then zone.
    fn all_host_zone_unbondings(&self) -> RecordResult<Vec<HostZoneUnbonding>>;

    /// Returns the unbondings of a zone in the given status, ordered by epoch.
    fn host_zone_unbondings_by_status(
        &self,
        host_zone_id: &str,
        status: HostZoneUnbondingStatus,
    ) -> RecordResult<Vec<HostZoneUnbonding>>;

    // ── LSM Deposits ─────────────────────────────────────────────────

    /// Gets, if present, the [`LsmTokenDeposit`] of a zone for an LSM denom.
    fn get_lsm_deposit(
        &self,
        host_zone_id: &str,
        denom: &str,
    ) -> RecordResult<Option<LsmTokenDeposit>>;

    /// Sets an [`LsmTokenDeposit`] under `(zone, denom)`.
    fn set_lsm_deposit(&mut self, deposit: &LsmTokenDeposit) -> RecordResult<()>;

    /// Deletes the [`LsmTokenDeposit`] of a zone for an LSM denom.
    fn delete_lsm_deposit(&mut self, host_zone_id: &str, denom: &str) -> RecordResult<()>;

    /// Returns the LSM deposits of a zone in the given status, ordered by denom.
    fn lsm_deposits_by_status(
        &self,
        host_zone_id: &str,
        status: LsmDepositStatus,
    ) -> RecordResult<Vec<LsmTokenDeposit>>;

    /// Returns every LSM deposit of a zone, ordered by denom.
    fn lsm_deposits_for_zone(&self, host_zone_id: &str) -> RecordResult<Vec<LsmTokenDeposit>>;
}

impl RecordStore for KvStore {
    fn get_deposit_record(&self, id: u64) -> RecordResult<Option<DepositRecord>> {
        Ok(self.get_row::<DepositRecordRowSpec>(&id)?)
    }

    fn set_deposit_record(&mut self, record: &DepositRecord) -> RecordResult<()> {
        Ok(self.put_row::<DepositRecordRowSpec>(&record.id, record)?)
    }

    fn delete_deposit_record(&mut self, id: u64) -> RecordResult<()> {
        Ok(self.delete_row::<DepositRecordRowSpec>(&id)?)
    }

    fn append_deposit_record(
        &mut self,
        host_zone_id: &str,
        denom: &str,
        amount: Amount,
        status: DepositRecordStatus,
        source: DepositSource,
        epoch: EpochNumber,
    ) -> RecordResult<DepositRecord> {
        let id = self.next_sequence(DEPOSIT_RECORD_COUNTER)?;
        let record = DepositRecord {
            id,
            amount,
            denom: denom.to_string(),
            host_zone_id: host_zone_id.to_string(),
            status,
            source,
            deposit_epoch_number: epoch,
        };
        self.set_deposit_record(&record)?;

        debug!(%id, zone = %host_zone_id, %amount, %status, "appended deposit record");
        Ok(record)
    }

    fn iter_deposit_records(&self) -> impl Iterator<Item = RecordResult<DepositRecord>> {
        self.iter_rows::<DepositRecordRowSpec>(&[])
            .map(|row| row.map(|(_, record)| record).map_err(Into::into))
    }

    fn deposit_records_by_status(
        &self,
        host_zone_id: &str,
        status: DepositRecordStatus,
    ) -> RecordResult<Vec<DepositRecord>> {
        let mut records = Vec::new();
        for record in self.iter_deposit_records() {
            let record = record?;
            if record.host_zone_id == host_zone_id && record.status == status {
                records.push(record);
            }
        }

        Ok(records)
    }

    fn get_transfer_deposit_record(
        &self,
        host_zone_id: &str,
        epoch: EpochNumber,
    ) -> RecordResult<Option<DepositRecord>> {
        Ok(self
            .deposit_records_by_status(host_zone_id, DepositRecordStatus::TransferQueue)?
            .into_iter()
            .find(|record| {
                record.deposit_epoch_number == epoch && record.source == DepositSource::StrideDeposit
            }))
    }

    fn get_user_redemption_record(
        &self,
        id: &UserRedemptionId,
    ) -> RecordResult<Option<UserRedemptionRecord>> {
        Ok(self.get_row::<UserRedemptionRowSpec>(id)?)
    }

    fn set_user_redemption_record(&mut self, record: &UserRedemptionRecord) -> RecordResult<()> {
        Ok(self.put_row::<UserRedemptionRowSpec>(&record.id, record)?)
    }

    fn delete_user_redemption_record(&mut self, id: &UserRedemptionId) -> RecordResult<()> {
        Ok(self.delete_row::<UserRedemptionRowSpec>(id)?)
    }

    fn user_redemption_records_for_zone(
        &self,
        host_zone_id: &str,
    ) -> RecordResult<Vec<UserRedemptionRecord>> {
        let prefix = KeyBuf::new().str(host_zone_id)?.finish();
        Ok(self
            .collect_rows::<UserRedemptionRowSpec>(&prefix)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    fn get_host_zone_unbonding(
        &self,
        epoch: EpochNumber,
        host_zone_id: &str,
    ) -> RecordResult<Option<HostZoneUnbonding>> {
        Ok(self.get_row::<HostZoneUnbondingRowSpec>(&(epoch, host_zone_id.to_string()))?)
    }

    fn set_host_zone_unbonding(&mut self, unbonding: &HostZoneUnbonding) -> RecordResult<()> {
        let key = (unbonding.epoch_number, unbonding.host_zone_id.clone());
        Ok(self.put_row::<HostZoneUnbondingRowSpec>(&key, unbonding)?)
    }

    fn delete_host_zone_unbonding(
        &mut self,
        epoch: EpochNumber,
        host_zone_id: &str,
    ) -> RecordResult<()> {
        Ok(self.delete_row::<HostZoneUnbondingRowSpec>(&(epoch, host_zone_id.to_string()))?)
    }

    fn all_host_zone_unbondings(&self) -> RecordResult<Vec<HostZoneUnbonding>> {
        Ok(self
            .collect_rows::<HostZoneUnbondingRowSpec>(&[])?
            .into_iter()
            .map(|(_, unbonding)| unbonding)
            .collect())
    }

    fn host_zone_unbondings_by_status(
        &self,
        host_zone_id: &str,
        status: HostZoneUnbondingStatus,
    ) -> RecordResult<Vec<HostZoneUnbonding>> {
        Ok(self
            .all_host_zone_unbondings()?
            .into_iter()
            .filter(|unbonding| unbonding.host_zone_id == host_zone_id && unbonding.status == status)
            .collect())
    }

    fn get_lsm_deposit(
        &self,
        host_zone_id: &str,
        denom: &str,
    ) -> RecordResult<Option<LsmTokenDeposit>> {
        let key = (host_zone_id.to_string(), denom.to_string());
        Ok(self.get_row::<LsmDepositRowSpec>(&key)?)
    }

    fn set_lsm_deposit(&mut self, deposit: &LsmTokenDeposit) -> RecordResult<()> {
        let key = (deposit.host_zone_id.clone(), deposit.denom.clone());
        Ok(self.put_row::<LsmDepositRowSpec>(&key, deposit)?)
    }

    fn delete_lsm_deposit(&mut self, host_zone_id: &str, denom: &str) -> RecordResult<()> {
        let key = (host_zone_id.to_string(), denom.to_string());
        Ok(self.delete_row::<LsmDepositRowSpec>(&key)?)
    }

    fn lsm_deposits_by_status(
        &self,
        host_zone_id: &str,
        status: LsmDepositStatus,
    ) -> RecordResult<Vec<LsmTokenDeposit>> {
        Ok(self
            .lsm_deposits_for_zone(host_zone_id)?
            .into_iter()
            .filter(|deposit| deposit.status == status)
            .collect())
    }

    fn lsm_deposits_for_zone(&self, host_zone_id: &str) -> RecordResult<Vec<LsmTokenDeposit>> {
        let prefix = KeyBuf::new().str(host_zone_id)?.finish();
        Ok(self
            .collect_rows::<LsmDepositRowSpec>(&prefix)?
            .into_iter()
            .map(|(_, deposit)| deposit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONE: &str = "cosmoshub-4";
    const OTHER_ZONE: &str = "osmosis-1";

    fn append(store: &mut KvStore, zone: &str, status: DepositRecordStatus, epoch: u64) -> u64 {
        store
            .append_deposit_record(
                zone,
                "uatom",
                100,
                status,
                DepositSource::StrideDeposit,
                epoch,
            )
            .unwrap()
            .id
    }

    #[test]
    fn test_deposit_records_are_ordered_by_insertion() {
        let mut store = KvStore::new();
        let a = append(&mut store, ZONE, DepositRecordStatus::DelegationQueue, 1);
        let _ = append(&mut store, OTHER_ZONE, DepositRecordStatus::DelegationQueue, 1);
        let b = append(&mut store, ZONE, DepositRecordStatus::TransferQueue, 2);
        let c = append(&mut store, ZONE, DepositRecordStatus::DelegationQueue, 2);

        let ids: Vec<_> = store
            .deposit_records_by_status(ZONE, DepositRecordStatus::DelegationQueue)
            .unwrap()
            .into_iter()
            .map(|record| record.id)
            .collect();
        assert_eq!(ids, vec![a, c]);

        let transfer = store.get_transfer_deposit_record(ZONE, 2).unwrap().unwrap();
        assert_eq!(transfer.id, b);
        assert!(store.get_transfer_deposit_record(ZONE, 3).unwrap().is_none());

        store.delete_deposit_record(a).unwrap();
        assert!(store.get_deposit_record(a).unwrap().is_none());
        assert_eq!(store.iter_deposit_records().count(), 3);
    }

    #[test]
    fn test_one_unbonding_per_epoch_and_zone() {
        let mut store = KvStore::new();

        let mut unbonding = HostZoneUnbonding::new(10, ZONE, "uatom");
        store.set_host_zone_unbonding(&unbonding).unwrap();
        unbonding.native_token_amount = 50;
        store.set_host_zone_unbonding(&unbonding).unwrap();
        store
            .set_host_zone_unbonding(&HostZoneUnbonding::new(10, OTHER_ZONE, "uosmo"))
            .unwrap();
        store
            .set_host_zone_unbonding(&HostZoneUnbonding::new(9, ZONE, "uatom"))
            .unwrap();

        let all = store.all_host_zone_unbondings().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].epoch_number, 9);

        let stored = store.get_host_zone_unbonding(10, ZONE).unwrap().unwrap();
        assert_eq!(stored.native_token_amount, 50);

        let queued = store
            .host_zone_unbondings_by_status(ZONE, HostZoneUnbondingStatus::UnbondingQueue)
            .unwrap();
        assert_eq!(queued.len(), 2);

        store.delete_host_zone_unbonding(10, ZONE).unwrap();
        assert!(store.get_host_zone_unbonding(10, ZONE).unwrap().is_none());
    }

    #[test]
    fn test_user_redemption_records_by_zone() {
        let mut store = KvStore::new();
        for (zone, epoch, receiver) in [(ZONE, 2, "r1"), (ZONE, 1, "r2"), (OTHER_ZONE, 1, "r1")] {
            let record = UserRedemptionRecord {
                id: UserRedemptionId::new(zone, epoch, receiver),
                sender: "stride1sender".to_string(),
                native_token_amount: 1,
                st_token_amount: 1,
                denom: "uatom".to_string(),
                claim_is_pending: false,
            };
            store.set_user_redemption_record(&record).unwrap();
        }

        let records = store.user_redemption_records_for_zone(ZONE).unwrap();
        let epochs: Vec<_> = records.iter().map(|r| r.id.epoch_number).collect();
        assert_eq!(epochs, vec![1, 2]);

        let id = UserRedemptionId::new(ZONE, 1, "r2");
        store.delete_user_redemption_record(&id).unwrap();
        assert!(store.get_user_redemption_record(&id).unwrap().is_none());
    }

    #[test]
    fn test_lsm_deposits_by_status() {
        let mut store = KvStore::new();
        let deposit = |denom: &str, status| LsmTokenDeposit {
            deposit_id: LsmTokenDeposit::derive_id(1, ZONE, "stride1s", denom),
            host_zone_id: ZONE.to_string(),
            denom: denom.to_string(),
            ibc_denom: format!("ibc/{denom}"),
            staker_address: "stride1s".to_string(),
            validator_address: "cosmosvaloper1v".to_string(),
            amount: 10,
            st_token_amount: 10,
            status,
        };

        store
            .set_lsm_deposit(&deposit("cosmosvaloper1v/1", LsmDepositStatus::DepositPending))
            .unwrap();
        store
            .set_lsm_deposit(&deposit("cosmosvaloper1v/2", LsmDepositStatus::DetokenizationQueue))
            .unwrap();

        let pending = store
            .lsm_deposits_by_status(ZONE, LsmDepositStatus::DepositPending)
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].denom, "cosmosvaloper1v/1");
        assert_eq!(store.lsm_deposits_for_zone(ZONE).unwrap().len(), 2);
        assert!(store.lsm_deposits_for_zone(OTHER_ZONE).unwrap().is_empty());

        store.delete_lsm_deposit(ZONE, "cosmosvaloper1v/1").unwrap();
        assert!(store.get_lsm_deposit(ZONE, "cosmosvaloper1v/1").unwrap().is_none());
    }
}
