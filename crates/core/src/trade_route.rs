//! Trade routes: accounts that convert reward tokens into a zone's native asset.

use liquid_stake_db::KvStore;
use liquid_stake_ica::{dispatch, trade_route_owner, HostMsg, IcaAccountType, IcaTx};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    engine::Engine,
    errors::{StakeError, StakeResult},
    events::StakeEvent,
    host_zone::require_host_zone,
    row_spec::TradeRouteRowSpec,
};

/// Message the trade controller is authorized to send from the trade account.
pub const TRADE_MSG_TYPE_URL: &str = "/osmosis.poolmanager.v1beta1.MsgSwapExactAmountIn";

/// A route converting `reward_denom` into `host_denom` on a trade zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRoute {
    /// Denom of the reward token on the host.
    pub reward_denom: String,

    /// Native denom of the host zone.
    pub host_denom: String,

    /// Chain id of the host zone.
    pub host_zone_id: String,

    /// Chain id of the trade zone.
    pub trade_chain_id: String,

    /// Connection to the trade zone.
    pub trade_connection_id: String,

    /// Address of the converter-unwind account on the host. Empty until bound.
    pub unwind_address: String,

    /// Address of the converter-trade account on the trade zone. Empty until bound.
    pub trade_address: String,

    /// Account currently authorized to trade from the trade account.
    pub trade_controller: Option<String>,
}

impl TradeRoute {
    /// Owner of the route's account of `account_type`.
    pub fn owner(&self, account_type: IcaAccountType) -> String {
        let chain_id = match account_type {
            IcaAccountType::ConverterTrade => &self.trade_chain_id,
            _ => &self.host_zone_id,
        };
        trade_route_owner(chain_id, &self.reward_denom, &self.host_denom, account_type)
    }
}

fn route_key(reward_denom: &str, host_denom: &str) -> (String, String) {
    (reward_denom.to_string(), host_denom.to_string())
}

/// Reads a route.
pub fn get_trade_route(
    store: &KvStore,
    reward_denom: &str,
    host_denom: &str,
) -> StakeResult<Option<TradeRoute>> {
    Ok(store.get_row::<TradeRouteRowSpec>(&route_key(reward_denom, host_denom))?)
}

/// Writes a route.
pub fn set_trade_route(store: &mut KvStore, route: &TradeRoute) -> StakeResult<()> {
    Ok(store.put_row::<TradeRouteRowSpec>(
        &route_key(&route.reward_denom, &route.host_denom),
        route,
    )?)
}

/// Returns every route.
pub fn all_trade_routes(store: &KvStore) -> StakeResult<Vec<TradeRoute>> {
    Ok(store
        .collect_rows::<TradeRouteRowSpec>(&[])?
        .into_iter()
        .map(|(_, route)| route)
        .collect())
}

/// Creates a route and registers its two accounts.
pub fn create_trade_route(
    engine: &mut Engine,
    host_zone_id: &str,
    reward_denom: &str,
    trade_connection_id: &str,
) -> StakeResult<TradeRoute> {
    let zone = require_host_zone(engine.store(), host_zone_id)?;

    if reward_denom.is_empty() || reward_denom == zone.host_denom {
        return Err(StakeError::validation(format!(
            "invalid reward denom {reward_denom:?}"
        )));
    }
    if get_trade_route(engine.store(), reward_denom, &zone.host_denom)?.is_some() {
        return Err(StakeError::validation(format!(
            "trade route {reward_denom} -> {} already exists",
            zone.host_denom
        )));
    }

    let trade_chain_id = engine
        .clients()
        .chain_id(trade_connection_id)
        .ok_or_else(|| StakeError::not_found("client for connection", trade_connection_id))?
        .to_string();

    let route = TradeRoute {
        reward_denom: reward_denom.to_string(),
        host_denom: zone.host_denom.clone(),
        host_zone_id: zone.chain_id.clone(),
        trade_chain_id,
        trade_connection_id: trade_connection_id.to_string(),
        unwind_address: String::new(),
        trade_address: String::new(),
        trade_controller: None,
    };
    set_trade_route(engine.store_mut(), &route)?;

    dispatch::register_account(
        engine,
        &route.owner(IcaAccountType::ConverterUnwind),
        &zone.connection_id,
    )?;
    dispatch::register_account(
        engine,
        &route.owner(IcaAccountType::ConverterTrade),
        trade_connection_id,
    )?;

    info!(
        zone = %host_zone_id,
        reward = %reward_denom,
        trade_chain = %route.trade_chain_id,
        "created trade route"
    );
    Ok(route)
}

/// Binds an account address reported for one of a route's accounts.
pub(crate) fn bind_account(
    engine: &mut Engine,
    owner: &str,
    account_type: IcaAccountType,
    address: &str,
) -> StakeResult<()> {
    let mut route = all_trade_routes(engine.store())?
        .into_iter()
        .find(|route| route.owner(account_type) == owner)
        .ok_or_else(|| StakeError::not_found("trade route for owner", owner))?;

    match account_type {
        IcaAccountType::ConverterTrade => route.trade_address = address.to_string(),
        IcaAccountType::ConverterUnwind => route.unwind_address = address.to_string(),
        _ => return Err(StakeError::validation(format!("{owner} is not a trade route account"))),
    }
    set_trade_route(engine.store_mut(), &route)?;

    engine.emit(StakeEvent::IcaAccountBound {
        owner: owner.to_string(),
        address: address.to_string(),
    });
    Ok(())
}

/// Whether a trade controller is being authorized or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionChange {
    /// Authorize the controller.
    Grant,
    /// Remove the controller's authorization.
    Revoke,
}

/// Grants or revokes the permission of `address` to trade from a route's trade account.
pub fn toggle_trade_controller(
    engine: &mut Engine,
    reward_denom: &str,
    host_denom: &str,
    change: PermissionChange,
    address: &str,
) -> StakeResult<()> {
    let mut route = get_trade_route(engine.store(), reward_denom, host_denom)?
        .ok_or_else(|| StakeError::not_found("trade route", format!("{reward_denom}-{host_denom}")))?;

    if route.trade_address.is_empty() {
        return Err(StakeError::not_found(
            "trade account address",
            route.owner(IcaAccountType::ConverterTrade),
        ));
    }

    let granter = route.trade_address.clone();
    let grantee = address.to_string();
    let msg_type_url = TRADE_MSG_TYPE_URL.to_string();
    let msg = match change {
        PermissionChange::Grant => HostMsg::Grant {
            granter,
            grantee,
            msg_type_url,
        },
        PermissionChange::Revoke => HostMsg::Revoke {
            granter,
            grantee,
            msg_type_url,
        },
    };

    let tx = IcaTx {
        owner: route.owner(IcaAccountType::ConverterTrade),
        connection_id: route.trade_connection_id.clone(),
        msgs: vec![msg],
        timeout_timestamp: engine.ica_timeout(),
        callback_id: String::new(),
        callback_args: Vec::new(),
        max_messages: 1,
    };
    dispatch::submit_txs(engine, tx)?;

    route.trade_controller = match change {
        PermissionChange::Grant => Some(address.to_string()),
        PermissionChange::Revoke => None,
    };
    set_trade_route(engine.store_mut(), &route)?;

    info!(reward = %reward_denom, host = %host_denom, ?change, controller = %address, "toggled trade controller");
    Ok(())
}

#[cfg(test)]
mod tests {
    use liquid_stake_ica::packet::PacketPayload;

    use super::*;
    use crate::{
        msgs::Msg,
        testing::{TestEnv, ADMIN, GENESIS_TIME, HOST_DENOM, ZONE},
    };

    const REWARD: &str = "ureward";
    const TRADE_CONNECTION: &str = "connection-1";
    const TRADE_CHAIN: &str = "osmosis-1";

    fn env_with_trade_client() -> TestEnv {
        let mut env = TestEnv::new();
        env.engine
            .create_client(TRADE_CONNECTION, TRADE_CHAIN, 1, GENESIS_TIME)
            .unwrap();
        env
    }

    fn create(env: &mut TestEnv, reward_denom: &str) -> StakeResult<()> {
        env.deliver(Msg::CreateTradeRoute {
            creator: ADMIN.to_string(),
            host_zone_id: ZONE.to_string(),
            reward_denom: reward_denom.to_string(),
            trade_connection_id: TRADE_CONNECTION.to_string(),
        })
    }

    fn toggle(env: &mut TestEnv, change: PermissionChange, controller: &str) -> StakeResult<()> {
        env.deliver(Msg::ToggleTradeController {
            creator: ADMIN.to_string(),
            reward_denom: REWARD.to_string(),
            host_denom: HOST_DENOM.to_string(),
            change,
            address: controller.to_string(),
        })
    }

    fn route(env: &TestEnv) -> TradeRoute {
        get_trade_route(env.engine.store(), REWARD, HOST_DENOM)
            .unwrap()
            .expect("route must exist")
    }

    #[test]
    fn test_create_binds_both_converter_accounts() {
        let mut env = env_with_trade_client();
        create(&mut env, REWARD).unwrap();

        let created = route(&env);
        assert_eq!(created.host_zone_id, ZONE);
        assert_eq!(created.trade_chain_id, TRADE_CHAIN);
        assert!(created.unwind_address.is_empty());
        assert!(created.trade_address.is_empty());

        env.relay();
        let bound = route(&env);
        assert!(!bound.unwind_address.is_empty());
        assert!(!bound.trade_address.is_empty());
        assert_ne!(bound.unwind_address, bound.trade_address);
        assert_eq!(all_trade_routes(env.engine.store()).unwrap(), vec![bound]);
    }

    #[test]
    fn test_create_rejects_bad_routes() {
        let mut env = env_with_trade_client();

        assert!(matches!(create(&mut env, HOST_DENOM), Err(StakeError::Validation(_))));
        assert!(matches!(create(&mut env, ""), Err(StakeError::Validation(_))));

        create(&mut env, REWARD).unwrap();
        assert!(matches!(create(&mut env, REWARD), Err(StakeError::Validation(_))));

        let mut no_client = TestEnv::new();
        assert!(matches!(
            create(&mut no_client, REWARD),
            Err(StakeError::NotFound { .. })
        ));
    }

    #[test]
    fn test_toggle_sends_grant_and_revoke_from_trade_account() {
        let mut env = env_with_trade_client();
        create(&mut env, REWARD).unwrap();

        // the trade account is not bound until its channel opens
        assert!(matches!(
            toggle(&mut env, PermissionChange::Grant, "osmo1controller"),
            Err(StakeError::NotFound { .. })
        ));
        env.relay();

        let trade_address = route(&env).trade_address;
        env.hold_packets = true;
        for change in [PermissionChange::Grant, PermissionChange::Revoke] {
            toggle(&mut env, change, "osmo1controller").unwrap();
            env.relay();

            let packet = env.held.pop().expect("permission change must be sent");
            assert_eq!(packet.connection_id, TRADE_CONNECTION);
            let PacketPayload::Ica(data) = packet.payload else {
                panic!("expected an interchain account packet");
            };

            let granter = trade_address.clone();
            let grantee = "osmo1controller".to_string();
            let msg_type_url = TRADE_MSG_TYPE_URL.to_string();
            let expected = match change {
                PermissionChange::Grant => HostMsg::Grant {
                    granter,
                    grantee,
                    msg_type_url,
                },
                PermissionChange::Revoke => HostMsg::Revoke {
                    granter,
                    grantee,
                    msg_type_url,
                },
            };
            assert_eq!(data.msgs().unwrap(), vec![expected]);
        }
        assert_eq!(route(&env).trade_controller, None);
    }

    #[test]
    fn test_grant_records_the_controller() {
        let mut env = env_with_trade_client();
        create(&mut env, REWARD).unwrap();
        env.relay();

        toggle(&mut env, PermissionChange::Grant, "osmo1controller").unwrap();
        env.relay();
        assert_eq!(route(&env).trade_controller.as_deref(), Some("osmo1controller"));
    }
}
