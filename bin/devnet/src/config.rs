use std::time::Duration;

use liquid_stake_core::{HostZoneConfig, Msg};
use liquid_stake_primitives::types::Amount;
use serde::{Deserialize, Serialize};

/// The local network: the host zones to simulate and the messages to deliver along the way.
///
/// None of this is consensus-critical; it only shapes the simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Config {
    /// Sender of the admin messages that set up the zones. Added to the params' admins.
    pub admin: String,

    /// Unix time of the genesis block, in seconds.
    pub genesis_time: u64,

    /// Simulated time between two blocks, in seconds.
    pub block_time: u64,

    /// Wall-clock time between two blocks.
    #[serde(with = "millis")]
    pub tick_interval: Duration,

    /// Host zones to register.
    pub zones: Vec<ZoneSpec>,

    /// Native vouchers credited to controller accounts at genesis.
    #[serde(default)]
    pub funds: Vec<Funding>,

    /// Messages delivered at given heights.
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// A host zone and its chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ZoneSpec {
    /// Chain id of the host.
    pub chain_id: String,

    /// The zone as registered on the controller.
    #[serde(flatten)]
    pub zone: HostZoneConfig,

    /// Rewards accrued by every delegation each block.
    #[serde(default)]
    pub rewards_per_block: Amount,

    /// Validators running on the host.
    pub validators: Vec<ValidatorSpec>,
}

/// A validator of a simulated host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ValidatorSpec {
    /// Human readable name.
    pub name: String,

    /// Operator address. Derived from the validator's position when absent.
    pub address: Option<String>,

    /// Target weight on the controller.
    pub weight: u64,

    /// Self-bonded tokens on the host.
    pub tokens: Option<Amount>,
}

/// Vouchers credited to a controller account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Funding {
    /// The account.
    pub address: String,

    /// Chain id of the zone whose native token is credited.
    pub zone: String,

    /// Amount credited.
    pub amount: Amount,
}

/// A message delivered at a height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Action {
    /// Height at which the message is delivered, after the block has run.
    pub height: u64,

    /// The message.
    pub msg: Msg,
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_reads_from_toml() {
        let config: Config = toml::from_str(
            r#"
            admin = "stride1admin"
            genesis_time = 1700000000
            block_time = 3600
            tick_interval = 250

            [[zones]]
            chain_id = "cosmoshub-4"
            connection_id = "connection-0"
            transfer_channel_id = "channel-0"
            bech32_prefix = "cosmos"
            host_denom = "uatom"
            unbonding_period = 21
            lsm_enabled = true
            rewards_per_block = 10

            [[zones.validators]]
            name = "alpha"
            weight = 2

            [[funds]]
            address = "stride1user"
            zone = "cosmoshub-4"
            amount = 1000

            [[actions]]
            height = 3
            msg = { liquid_stake = { creator = "stride1user", amount = 500, host_denom = "uatom" } }
            "#,
        )
        .expect("must parse");

        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.zones[0].zone.host_denom, "uatom");
        assert_eq!(config.zones[0].validators[0].address, None);
        assert_eq!(config.actions[0].msg.name(), "liquid_stake");
    }
}
