//! Record types.

use std::fmt;

use liquid_stake_primitives::types::{Amount, BlockHeight, EpochNumber, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{RecordError, RecordResult};

/// Where the native asset of a [`DepositRecord`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepositSource {
    /// A user liquid stake on the controller chain.
    StrideDeposit,
    /// Reinvested rewards swept out of the withdrawal ICA.
    WithdrawalIca,
}

/// Pipeline position of a [`DepositRecord`].
///
/// Records advance in declaration order. Failed packets revert a record to the matching queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DepositRecordStatus {
    /// Waiting on the controller to be transferred to the host.
    TransferQueue,
    /// An IBC transfer to the host is in flight.
    TransferInProgress,
    /// Sitting in the delegation ICA, waiting to be delegated.
    DelegationQueue,
    /// A delegation ICA is in flight.
    DelegationInProgress,
}

impl fmt::Display for DepositRecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TransferQueue => "TRANSFER_QUEUE",
            Self::TransferInProgress => "TRANSFER_IN_PROGRESS",
            Self::DelegationQueue => "DELEGATION_QUEUE",
            Self::DelegationInProgress => "DELEGATION_IN_PROGRESS",
        };
        write!(f, "{s}")
    }
}

/// A batch of native asset moving from the controller chain into delegations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    /// Monotonic id, which also defines insertion order.
    pub id: u64,

    /// Native amount carried by the record.
    pub amount: Amount,

    /// Native denom on the host.
    pub denom: String,

    /// Chain id of the zone.
    pub host_zone_id: String,

    /// Pipeline position.
    pub status: DepositRecordStatus,

    /// Origin of the funds.
    pub source: DepositSource,

    /// Stride epoch in which the record was opened.
    pub deposit_epoch_number: EpochNumber,
}

/// Pipeline position of a [`HostZoneUnbonding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HostZoneUnbondingStatus {
    /// Collecting redemptions, waiting for an unbonding epoch.
    UnbondingQueue,
    /// An undelegate ICA is in flight.
    UnbondingInProgress,
    /// Unbonding on the host, waiting for the completion time.
    ExitTransferQueue,
    /// The sweep into the redemption ICA is in flight.
    ExitTransferInProgress,
    /// Users may claim.
    Claimable,
}

impl fmt::Display for HostZoneUnbondingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnbondingQueue => "UNBONDING_QUEUE",
            Self::UnbondingInProgress => "UNBONDING_IN_PROGRESS",
            Self::ExitTransferQueue => "EXIT_TRANSFER_QUEUE",
            Self::ExitTransferInProgress => "EXIT_TRANSFER_IN_PROGRESS",
            Self::Claimable => "CLAIMABLE",
        };
        write!(f, "{s}")
    }
}

/// The aggregate of all redemptions of one zone in one day epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostZoneUnbonding {
    /// Day epoch the redemptions were requested in.
    pub epoch_number: EpochNumber,

    /// Chain id of the zone.
    pub host_zone_id: String,

    /// Pipeline position.
    pub status: HostZoneUnbondingStatus,

    /// Derivative escrowed for the redemptions.
    pub st_token_amount: Amount,

    /// Native owed for the redemptions.
    pub native_token_amount: Amount,

    /// Native still held for unclaimed redemptions once claimable.
    pub claimable_native_tokens: Amount,

    /// Native the in-flight undelegation was asked to unbond.
    pub native_tokens_to_unbond: Amount,

    /// Derivative burned once the in-flight undelegation is acknowledged.
    pub st_tokens_to_burn: Amount,

    /// Native denom on the host.
    pub denom: String,

    /// Latest unbonding completion time reported by the host, in unix nanos.
    pub unbonding_time: Timestamp,

    /// Ids of the user redemption records folded into this unbonding.
    pub user_redemption_records: Vec<String>,
}

impl HostZoneUnbonding {
    /// Creates an empty unbonding in the queue.
    pub fn new(epoch_number: EpochNumber, host_zone_id: &str, denom: &str) -> Self {
        Self {
            epoch_number,
            host_zone_id: host_zone_id.to_string(),
            status: HostZoneUnbondingStatus::UnbondingQueue,
            st_token_amount: 0,
            native_token_amount: 0,
            claimable_native_tokens: 0,
            native_tokens_to_unbond: 0,
            st_tokens_to_burn: 0,
            denom: denom.to_string(),
            unbonding_time: 0,
            user_redemption_records: Vec::new(),
        }
    }
}

/// The identity of a [`UserRedemptionRecord`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserRedemptionId {
    /// Chain id of the zone.
    pub host_zone_id: String,

    /// Day epoch the redemption was requested in.
    pub epoch_number: EpochNumber,

    /// Receiver on the host.
    pub receiver: String,
}

impl UserRedemptionId {
    /// Creates a new id.
    pub fn new(host_zone_id: &str, epoch_number: EpochNumber, receiver: &str) -> Self {
        Self {
            host_zone_id: host_zone_id.to_string(),
            epoch_number,
            receiver: receiver.to_string(),
        }
    }

    /// Parses a `{zone}.{epoch}.{receiver}` string.
    pub fn parse(id: &str) -> RecordResult<Self> {
        let invalid = || RecordError::InvalidRedemptionId(id.to_string());

        // zone ids may contain dots, receivers never do
        let (rest, receiver) = id.rsplit_once('.').ok_or_else(invalid)?;
        let (host_zone_id, epoch) = rest.rsplit_once('.').ok_or_else(invalid)?;
        let epoch_number = epoch.parse().map_err(|_| invalid())?;

        if host_zone_id.is_empty() || receiver.is_empty() {
            return Err(invalid());
        }

        Ok(Self::new(host_zone_id, epoch_number, receiver))
    }
}

impl fmt::Display for UserRedemptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.host_zone_id, self.epoch_number, self.receiver
        )
    }
}

/// A single receiver's redemptions within one zone and day epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRedemptionRecord {
    /// The compound id.
    pub id: UserRedemptionId,

    /// The controller-side account that requested the redemption.
    pub sender: String,

    /// Native owed to the receiver.
    pub native_token_amount: Amount,

    /// Derivative escrowed for this record.
    pub st_token_amount: Amount,

    /// Native denom on the host.
    pub denom: String,

    /// Set while a claim transfer is in flight.
    pub claim_is_pending: bool,
}

/// Pipeline position of an [`LsmTokenDeposit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LsmDepositStatus {
    /// Waiting on the share-rate query before anything is minted.
    DepositPending,
    /// Minted; waiting to be transferred to the delegation ICA.
    TransferQueue,
    /// The transfer to the delegation ICA is in flight.
    TransferInProgress,
    /// The transfer failed. Requires manual intervention.
    TransferFailed,
    /// On the host, waiting to be redeemed into a delegation.
    DetokenizationQueue,
    /// The redeem-tokens ICA is in flight.
    DetokenizationInProgress,
    /// The redeem-tokens ICA failed. Retried on the next epoch.
    DetokenizationFailed,
}

impl fmt::Display for LsmDepositStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DepositPending => "DEPOSIT_PENDING",
            Self::TransferQueue => "TRANSFER_QUEUE",
            Self::TransferInProgress => "TRANSFER_IN_PROGRESS",
            Self::TransferFailed => "TRANSFER_FAILED",
            Self::DetokenizationQueue => "DETOKENIZATION_QUEUE",
            Self::DetokenizationInProgress => "DETOKENIZATION_IN_PROGRESS",
            Self::DetokenizationFailed => "DETOKENIZATION_FAILED",
        };
        write!(f, "{s}")
    }
}

/// A tokenized delegation share received from a staker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LsmTokenDeposit {
    /// Hex sha256 of `{height}-{zone}-{staker}-{denom}`.
    pub deposit_id: String,

    /// Chain id of the zone.
    pub host_zone_id: String,

    /// LSM base denom on the host, `{valoper}/{record id}`.
    pub denom: String,

    /// Hash denom of the share token on the controller.
    pub ibc_denom: String,

    /// Controller-side staker.
    pub staker_address: String,

    /// Operator address of the validator the shares are delegated to.
    pub validator_address: String,

    /// Number of shares deposited.
    pub amount: Amount,

    /// Derivative minted, or tentatively owed while the deposit is pending.
    pub st_token_amount: Amount,

    /// Pipeline position.
    pub status: LsmDepositStatus,
}

impl LsmTokenDeposit {
    /// Derives the deposit id.
    pub fn derive_id(
        height: BlockHeight,
        host_zone_id: &str,
        staker_address: &str,
        denom: &str,
    ) -> String {
        let preimage = format!("{height}-{host_zone_id}-{staker_address}-{denom}");
        hex::encode(Sha256::digest(preimage.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_redemption_id_round_trips_through_string() {
        let id = UserRedemptionId::new("cosmoshub-4", 12, "cosmos1receiver");
        assert_eq!(id.to_string(), "cosmoshub-4.12.cosmos1receiver");
        assert_eq!(UserRedemptionId::parse(&id.to_string()).unwrap(), id);

        let dotted = UserRedemptionId::new("evmos_9001-2.a", 3, "evmos1r");
        assert_eq!(UserRedemptionId::parse(&dotted.to_string()).unwrap(), dotted);
    }

    #[test]
    fn test_user_redemption_id_rejects_garbage() {
        assert!(UserRedemptionId::parse("cosmoshub-4").is_err());
        assert!(UserRedemptionId::parse("cosmoshub-4.x.cosmos1r").is_err());
        assert!(UserRedemptionId::parse(".1.cosmos1r").is_err());
        assert!(UserRedemptionId::parse("cosmoshub-4.1.").is_err());
    }

    #[test]
    fn test_lsm_deposit_id_is_deterministic() {
        let id = LsmTokenDeposit::derive_id(10, "cosmoshub-4", "stride1s", "cosmosvaloper1v/1");
        assert_eq!(id.len(), 64);
        assert_eq!(
            id,
            LsmTokenDeposit::derive_id(10, "cosmoshub-4", "stride1s", "cosmosvaloper1v/1")
        );
        assert_ne!(
            id,
            LsmTokenDeposit::derive_id(11, "cosmoshub-4", "stride1s", "cosmosvaloper1v/1")
        );
    }

    #[test]
    fn test_status_display() {
        assert_eq!(DepositRecordStatus::DelegationQueue.to_string(), "DELEGATION_QUEUE");
        assert_eq!(HostZoneUnbondingStatus::Claimable.to_string(), "CLAIMABLE");
        assert_eq!(
            LsmDepositStatus::DetokenizationQueue.to_string(),
            "DETOKENIZATION_QUEUE"
        );
    }
}
