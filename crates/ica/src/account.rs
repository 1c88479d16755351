//! Interchain account types and owner naming.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::IcaError;

/// Prefix of every controller port.
pub const CONTROLLER_PORT_PREFIX: &str = "icacontroller-";

/// The role of an interchain account on a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IcaAccountType {
    /// Holds and delegates the staked native asset.
    Delegation,
    /// Receives staking rewards.
    Withdrawal,
    /// Receives the protocol commission.
    Fee,
    /// Holds unbonded native asset until users claim it.
    Redemption,
    /// Receives tokens the community pool wants liquid staked.
    CommunityPoolDeposit,
    /// Returns derivative tokens and rebates to the community pool.
    CommunityPoolReturn,
    /// Trades reward tokens into the native asset on a trade zone.
    ConverterTrade,
    /// Unwinds reward tokens into their base denom before trading.
    ConverterUnwind,
}

impl IcaAccountType {
    /// Every account type, in declaration order.
    pub const ALL: [IcaAccountType; 8] = [
        IcaAccountType::Delegation,
        IcaAccountType::Withdrawal,
        IcaAccountType::Fee,
        IcaAccountType::Redemption,
        IcaAccountType::CommunityPoolDeposit,
        IcaAccountType::CommunityPoolReturn,
        IcaAccountType::ConverterTrade,
        IcaAccountType::ConverterUnwind,
    ];

    /// The accounts every host zone registers.
    pub const HOST_ZONE: [IcaAccountType; 6] = [
        IcaAccountType::Delegation,
        IcaAccountType::Withdrawal,
        IcaAccountType::Fee,
        IcaAccountType::Redemption,
        IcaAccountType::CommunityPoolDeposit,
        IcaAccountType::CommunityPoolReturn,
    ];

    /// The name used in owner strings.
    pub const fn as_str(&self) -> &'static str {
        match self {
            IcaAccountType::Delegation => "DELEGATION",
            IcaAccountType::Withdrawal => "WITHDRAWAL",
            IcaAccountType::Fee => "FEE",
            IcaAccountType::Redemption => "REDEMPTION",
            IcaAccountType::CommunityPoolDeposit => "COMMUNITY_POOL_DEPOSIT",
            IcaAccountType::CommunityPoolReturn => "COMMUNITY_POOL_RETURN",
            IcaAccountType::ConverterTrade => "CONVERTER_TRADE",
            IcaAccountType::ConverterUnwind => "CONVERTER_UNWIND",
        }
    }
}

impl fmt::Display for IcaAccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IcaAccountType {
    type Err = IcaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IcaAccountType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| IcaError::InvalidOwner(s.to_string()))
    }
}

/// Owner string of a host zone account: `{zone}.{TYPE}`.
pub fn host_zone_owner(chain_id: &str, account_type: IcaAccountType) -> String {
    format!("{chain_id}.{account_type}")
}

/// Owner string of a trade route account: `{zone}.{rewardDenom}-{hostDenom}.{TYPE}`.
pub fn trade_route_owner(
    chain_id: &str,
    reward_denom: &str,
    host_denom: &str,
    account_type: IcaAccountType,
) -> String {
    format!("{chain_id}.{reward_denom}-{host_denom}.{account_type}")
}

/// Controller port of an owner: `icacontroller-{owner}`.
pub fn port_id(owner: &str) -> String {
    format!("{CONTROLLER_PORT_PREFIX}{owner}")
}

/// Extracts the owner from a controller port.
pub fn owner_from_port(port_id: &str) -> Result<&str, IcaError> {
    port_id
        .strip_prefix(CONTROLLER_PORT_PREFIX)
        .filter(|owner| !owner.is_empty())
        .ok_or_else(|| IcaError::InvalidOwner(port_id.to_string()))
}

/// Splits an owner into its chain id and account type.
///
/// For trade route owners the chain id is everything before the first `.`; the denom pair in
/// the middle is not returned.
pub fn parse_owner(owner: &str) -> Result<(&str, IcaAccountType), IcaError> {
    let invalid = || IcaError::InvalidOwner(owner.to_string());

    let (rest, suffix) = owner.rsplit_once('.').ok_or_else(invalid)?;
    let account_type = suffix.parse()?;

    let chain_id = match account_type {
        IcaAccountType::ConverterTrade | IcaAccountType::ConverterUnwind => {
            rest.split_once('.').map(|(chain_id, _)| chain_id).ok_or_else(invalid)?
        }
        _ => rest,
    };

    if chain_id.is_empty() {
        return Err(invalid());
    }

    Ok((chain_id, account_type))
}
