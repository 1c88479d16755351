//! Types for the protocol parameters.

use liquid_stake_primitives::decimal::Dec;
use serde::{Deserialize, Serialize};

use crate::{default::*, errors::ParamsError};

/// The protocol parameters shared by every host zone.
///
/// Missing fields fall back to their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Number of stride epochs between deposit transfers.
    pub deposit_interval: u64,

    /// Number of stride epochs between delegations.
    pub delegate_interval: u64,

    /// Number of stride epochs between reward reinvestments.
    pub reinvest_interval: u64,

    /// Number of stride epochs between reward withdrawals.
    pub rewards_interval: u64,

    /// Number of stride epochs between redemption rate updates.
    pub redemption_rate_interval: u64,

    /// Number of stride epochs between validator rebalances.
    pub rebalance_interval: u64,

    /// Protocol commission on rewards, in percent.
    pub stride_commission: u64,

    /// Timeout for ICA packets that are not aligned to an epoch, in nanoseconds.
    pub ica_timeout_nanos: u64,

    /// The last `1 / buffer_size` of a stride epoch is kept free for packets to land.
    pub buffer_size: u64,

    /// Timeout for IBC token transfers, in nanoseconds.
    pub ibc_transfer_timeout_nanos: u64,

    /// Lower halt bound of the redemption rate, in percent.
    pub safety_min_redemption_rate_threshold: u64,

    /// Upper halt bound of the redemption rate, in percent.
    pub safety_max_redemption_rate_threshold: u64,

    /// Lower alert bound of the redemption rate, in percent.
    pub inner_min_redemption_rate_threshold: u64,

    /// Upper alert bound of the redemption rate, in percent.
    pub inner_max_redemption_rate_threshold: u64,

    /// Cap on delegation ICA calls per zone per epoch.
    pub max_stake_ica_calls_per_epoch: u64,

    /// Largest slash, in percent of a validator's delegation, that is applied without halting.
    pub safety_max_slash_percent: u64,

    /// Number of redelegations sent per rebalance ICA transaction.
    pub rebalance_batch_size: usize,

    /// Number of redelegation pairs emitted by a scheduled rebalance.
    pub rebalance_max_swaps: usize,

    /// Cap on messages in a single ICA transaction for newly registered zones.
    pub max_messages_per_ica_tx: u64,

    /// Number of stride epochs per day epoch.
    pub stride_epochs_per_day_epoch: u64,

    /// Tolerated drift of a validator's share rate during an LSM liquid stake, in percent.
    pub lsm_rate_tolerance_percent: u64,

    /// Timeout of the share-rate query issued for an LSM liquid stake, in nanoseconds.
    pub lsm_query_timeout_nanos: u64,

    /// Timeout of the ICA that redeems LSM shares on the host, in nanoseconds.
    pub detokenization_timeout_nanos: u64,

    /// Bech32 account prefix on the controller chain.
    pub controller_prefix: String,

    /// Addresses allowed to run admin operations.
    pub admins: Vec<String>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            deposit_interval: DEPOSIT_INTERVAL,
            delegate_interval: DELEGATE_INTERVAL,
            reinvest_interval: REINVEST_INTERVAL,
            rewards_interval: REWARDS_INTERVAL,
            redemption_rate_interval: REDEMPTION_RATE_INTERVAL,
            rebalance_interval: REBALANCE_INTERVAL,
            stride_commission: STRIDE_COMMISSION,
            ica_timeout_nanos: ICA_TIMEOUT_NANOS,
            buffer_size: BUFFER_SIZE,
            ibc_transfer_timeout_nanos: IBC_TRANSFER_TIMEOUT_NANOS,
            safety_min_redemption_rate_threshold: SAFETY_MIN_REDEMPTION_RATE_THRESHOLD,
            safety_max_redemption_rate_threshold: SAFETY_MAX_REDEMPTION_RATE_THRESHOLD,
            inner_min_redemption_rate_threshold: INNER_MIN_REDEMPTION_RATE_THRESHOLD,
            inner_max_redemption_rate_threshold: INNER_MAX_REDEMPTION_RATE_THRESHOLD,
            max_stake_ica_calls_per_epoch: MAX_STAKE_ICA_CALLS_PER_EPOCH,
            safety_max_slash_percent: SAFETY_MAX_SLASH_PERCENT,
            rebalance_batch_size: REBALANCE_BATCH_SIZE,
            rebalance_max_swaps: REBALANCE_MAX_SWAPS,
            max_messages_per_ica_tx: MAX_MESSAGES_PER_ICA_TX,
            stride_epochs_per_day_epoch: STRIDE_EPOCHS_PER_DAY_EPOCH,
            lsm_rate_tolerance_percent: LSM_RATE_TOLERANCE_PERCENT,
            lsm_query_timeout_nanos: LSM_QUERY_TIMEOUT_NANOS,
            detokenization_timeout_nanos: DETOKENIZATION_TIMEOUT_NANOS,
            controller_prefix: CONTROLLER_PREFIX.to_string(),
            admins: Vec::new(),
        }
    }
}

impl Params {
    /// Checks the parameters for internal consistency.
    pub fn validate(&self) -> Result<(), ParamsError> {
        let positive = [
            ("deposit_interval", self.deposit_interval),
            ("delegate_interval", self.delegate_interval),
            ("reinvest_interval", self.reinvest_interval),
            ("rewards_interval", self.rewards_interval),
            ("redemption_rate_interval", self.redemption_rate_interval),
            ("rebalance_interval", self.rebalance_interval),
            ("buffer_size", self.buffer_size),
            ("max_messages_per_ica_tx", self.max_messages_per_ica_tx),
            ("stride_epochs_per_day_epoch", self.stride_epochs_per_day_epoch),
            ("rebalance_batch_size", self.rebalance_batch_size as u64),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ParamsError::Zero(*name));
        }

        let percents = [
            ("stride_commission", self.stride_commission),
            ("safety_max_slash_percent", self.safety_max_slash_percent),
            ("lsm_rate_tolerance_percent", self.lsm_rate_tolerance_percent),
        ];
        if let Some((name, value)) = percents.iter().find(|(_, value)| *value > 100) {
            return Err(ParamsError::PercentTooLarge {
                name: *name,
                value: *value,
            });
        }

        let nested = self.safety_min_redemption_rate_threshold
            <= self.inner_min_redemption_rate_threshold
            && self.inner_min_redemption_rate_threshold < 100
            && 100 <= self.inner_max_redemption_rate_threshold
            && self.inner_max_redemption_rate_threshold <= self.safety_max_redemption_rate_threshold;
        if !nested {
            return Err(ParamsError::InvalidThresholds);
        }

        Ok(())
    }

    /// Returns `true` if `address` may run admin operations.
    pub fn is_admin(&self, address: &str) -> bool {
        self.admins.iter().any(|admin| admin == address)
    }

    /// The commission taken from rewards as a decimal.
    pub fn commission_rate(&self) -> Dec {
        Dec::from_percent(self.stride_commission)
    }

    /// The default `(min, max)` halt bounds of the redemption rate.
    pub fn outer_bounds(&self) -> (Dec, Dec) {
        (
            Dec::from_percent(self.safety_min_redemption_rate_threshold),
            Dec::from_percent(self.safety_max_redemption_rate_threshold),
        )
    }

    /// The default `(min, max)` alert bounds of the redemption rate.
    pub fn inner_bounds(&self) -> (Dec, Dec) {
        (
            Dec::from_percent(self.inner_min_redemption_rate_threshold),
            Dec::from_percent(self.inner_max_redemption_rate_threshold),
        )
    }

    /// The largest slash applied without halting, as a decimal.
    pub fn max_slash_rate(&self) -> Dec {
        Dec::from_percent(self.safety_max_slash_percent)
    }

    /// The tolerated LSM share-rate drift as a decimal.
    pub fn lsm_rate_tolerance(&self) -> Dec {
        Dec::from_percent(self.lsm_rate_tolerance_percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let params = Params::default();
        assert!(params.validate().is_ok());

        let (outer_min, outer_max) = params.outer_bounds();
        assert_eq!(outer_min.to_string(), "0.900000000000000000");
        assert_eq!(outer_max.to_string(), "1.500000000000000000");

        let (inner_min, inner_max) = params.inner_bounds();
        assert_eq!(inner_min.to_string(), "0.950000000000000000");
        assert_eq!(inner_max.to_string(), "1.050000000000000000");
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let params = r#"
            stride_commission = 5
            admins = ["stride1admin"]
        "#;

        let params: Params = toml::from_str(params).expect("must be able to parse params");
        assert_eq!(params.stride_commission, 5);
        assert_eq!(params.deposit_interval, DEPOSIT_INTERVAL);
        assert_eq!(params.controller_prefix, CONTROLLER_PREFIX);
        assert!(params.is_admin("stride1admin"));
        assert!(!params.is_admin("stride1someoneelse"));
    }

    #[test]
    fn params_serde_toml() {
        let params = Params::default();
        let serialized = toml::to_string(&params).expect("must be able to serialize params");
        let deserialized: Params =
            toml::from_str(&serialized).expect("must be able to deserialize params");

        assert_eq!(params, deserialized);
    }

    #[test]
    fn invalid_params_are_rejected() {
        let params = Params {
            buffer_size: 0,
            ..Params::default()
        };
        assert_eq!(params.validate(), Err(ParamsError::Zero("buffer_size")));

        let params = Params {
            stride_commission: 101,
            ..Params::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ParamsError::PercentTooLarge { name: "stride_commission", value: 101 })
        ));

        let params = Params {
            inner_min_redemption_rate_threshold: 85,
            ..Params::default()
        };
        assert_eq!(params.validate(), Err(ParamsError::InvalidThresholds));
    }
}
