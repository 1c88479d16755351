//! Community pool staking.
//!
//! The host's community pool sends native tokens to the zone's deposit account. They are moved to
//! the controller's holding account and liquid staked there, and the derivative is transferred to
//! the return account. The return account donates whatever it holds back to the community pool,
//! reward rebates included.

use liquid_stake_ica::{
    dispatch::{self, TransferRequest},
    AckResponse, HostMsg, IcaAccountType, PacketId,
};
use liquid_stake_icq::{keeper::submit_query, types::BANK_STORE_QUERY_WITH_PROOF, Query, TimeoutPolicy};
use liquid_stake_primitives::{coin::Coin, denom::TRANSFER_PORT, types::Amount};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    bank,
    callbacks::{
        COMMUNITY_POOL_BALANCE, COMMUNITY_POOL_DEPOSIT, COMMUNITY_POOL_RETURN, FUND_COMMUNITY_POOL,
    },
    codec::{decode_args, encode_args},
    engine::{Engine, MODULE},
    epochs::{stride_epoch_query_timeout, stride_epoch_timeout},
    errors::{StakeError, StakeResult},
    events::StakeEvent,
    host_zone::{require_host_zone, set_host_zone, HostZone, WorkflowPhase},
    remote::{balance_key, decode_value, RemoteBalance},
    user,
};

/// The account and denom a pool balance query looked at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolBalanceArgs {
    pub account_type: IcaAccountType,
    pub denom: String,
}

/// Arguments of a packet that moves pool tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTransferArgs {
    /// The zone.
    pub host_zone_id: String,

    /// Denom on the sending chain.
    pub denom: String,

    pub amount: Amount,
}

impl PoolTransferArgs {
    fn new(zone: &HostZone, token: &Coin) -> Self {
        Self {
            host_zone_id: zone.chain_id.clone(),
            denom: token.denom.clone(),
            amount: token.amount,
        }
    }
}

fn pool_accounts_bound(zone: &HostZone) -> bool {
    zone.ica_address(IcaAccountType::CommunityPoolDeposit).is_some()
        && zone.ica_address(IcaAccountType::CommunityPoolReturn).is_some()
}

fn query_pool_balance(
    engine: &mut Engine,
    zone: &HostZone,
    account_type: IcaAccountType,
    denom: &str,
) -> StakeResult<String> {
    let address = zone.require_ica_address(account_type)?;
    let timeout = stride_epoch_query_timeout(engine.store(), engine.params(), engine.block().time)?;
    let args = encode_args(&PoolBalanceArgs {
        account_type,
        denom: denom.to_string(),
    })?;

    let query = Query::new(
        &zone.connection_id,
        &zone.chain_id,
        BANK_STORE_QUERY_WITH_PROOF,
        balance_key(&address, denom),
        MODULE,
        COMMUNITY_POOL_BALANCE,
    )
    .with_callback_data(args)
    .with_timeout(timeout, TimeoutPolicy::RejectQueryResponse);

    let id = submit_query(engine, query, false)?;
    debug!(zone = %zone.chain_id, account = %account_type, %denom, %id, "queried pool balance");
    Ok(id)
}

/// Queries the native balance of the deposit account, and the derivative and native balances of
/// the return account. Accounts with packets in flight are skipped. Returns the number of queries.
pub fn query_pool_balances(engine: &mut Engine, chain_id: &str) -> StakeResult<usize> {
    let zone = require_host_zone(engine.store(), chain_id)?;
    if !pool_accounts_bound(&zone) {
        return Ok(0);
    }

    let mut submitted = 0;
    if !zone.phase_in_flight(WorkflowPhase::CommunityPoolDeposit) {
        query_pool_balance(engine, &zone, IcaAccountType::CommunityPoolDeposit, &zone.host_denom)?;
        submitted += 1;
    }
    if !zone.phase_in_flight(WorkflowPhase::CommunityPoolReturn) {
        for denom in [zone.st_denom_on_host(), zone.host_denom.clone()] {
            query_pool_balance(engine, &zone, IcaAccountType::CommunityPoolReturn, &denom)?;
            submitted += 1;
        }
    }
    Ok(submitted)
}

/// Moves an observed pool balance along. Deposits go to the holding account and the return
/// account's balance is donated to the community pool.
pub fn pool_balance_callback(engine: &mut Engine, result: &[u8], query: &Query) -> StakeResult<()> {
    let args: PoolBalanceArgs = decode_args(&query.callback_data)?;
    let chain_id = query.chain_id.as_str();

    let amount = decode_value::<RemoteBalance>(result)?
        .map(|balance| balance.amount)
        .unwrap_or_default();
    if amount == 0 {
        debug!(zone = %chain_id, account = %args.account_type, denom = %args.denom, "pool account is empty");
        return Ok(());
    }

    let zone = require_host_zone(engine.store(), chain_id)?;
    let token = Coin::new(&args.denom, amount);
    match args.account_type {
        IcaAccountType::CommunityPoolDeposit => transfer_deposit_to_holding(engine, zone, token),
        IcaAccountType::CommunityPoolReturn => fund_community_pool(engine, zone, token),
        other => Err(StakeError::validation(format!(
            "{other} is not a community pool account"
        ))),
    }
}

fn transfer_deposit_to_holding(engine: &mut Engine, mut zone: HostZone, token: Coin) -> StakeResult<()> {
    if zone.phase_in_flight(WorkflowPhase::CommunityPoolDeposit) {
        return Ok(());
    }

    let timeout = stride_epoch_timeout(engine.store(), engine.params())?;
    let msg = HostMsg::Transfer {
        source_port: TRANSFER_PORT.to_string(),
        source_channel: zone.counterparty_channel_id.clone(),
        token: token.clone(),
        sender: zone.require_ica_address(IcaAccountType::CommunityPoolDeposit)?,
        receiver: zone.community_pool_holding_address.clone(),
        timeout_timestamp: timeout,
        memo: String::new(),
    };
    let args = encode_args(&PoolTransferArgs::new(&zone, &token))?;
    dispatch::submit_txs(
        engine,
        zone.ica_tx(
            IcaAccountType::CommunityPoolDeposit,
            vec![msg],
            timeout,
            COMMUNITY_POOL_DEPOSIT,
            args,
        ),
    )?;

    zone.begin_phase(WorkflowPhase::CommunityPoolDeposit, 1);
    set_host_zone(engine.store_mut(), &zone)?;

    info!(zone = %zone.chain_id, %token, "moving community pool deposit to the holding account");
    Ok(())
}

fn fund_community_pool(engine: &mut Engine, mut zone: HostZone, token: Coin) -> StakeResult<()> {
    let timeout = stride_epoch_timeout(engine.store(), engine.params())?;
    let msg = HostMsg::FundCommunityPool {
        amount: vec![token.clone()],
        depositor: zone.require_ica_address(IcaAccountType::CommunityPoolReturn)?,
    };
    let args = encode_args(&PoolTransferArgs::new(&zone, &token))?;
    dispatch::submit_txs(
        engine,
        zone.ica_tx(
            IcaAccountType::CommunityPoolReturn,
            vec![msg],
            timeout,
            FUND_COMMUNITY_POOL,
            args,
        ),
    )?;

    zone.begin_phase(WorkflowPhase::CommunityPoolReturn, 1);
    set_host_zone(engine.store_mut(), &zone)?;

    info!(zone = %zone.chain_id, %token, "funding the community pool");
    Ok(())
}

/// Settles the transfer of a pool deposit. The tokens reach the holding account as vouchers.
pub fn deposit_transfer_callback(
    engine: &mut Engine,
    packet: &PacketId,
    ack: &AckResponse,
    args: &[u8],
) -> StakeResult<()> {
    let args: PoolTransferArgs = decode_args(args)?;

    let mut zone = require_host_zone(engine.store(), &args.host_zone_id)?;
    zone.end_phase(WorkflowPhase::CommunityPoolDeposit);
    set_host_zone(engine.store_mut(), &zone)?;

    if !ack.is_success() {
        warn!(%packet, zone = %args.host_zone_id, status = ?ack.status, "community pool deposit transfer failed");
        return Ok(());
    }

    info!(%packet, zone = %args.host_zone_id, amount = %args.amount, "community pool deposit sent");
    Ok(())
}

/// Settles a donation to the community pool.
pub fn fund_community_pool_callback(
    engine: &mut Engine,
    packet: &PacketId,
    ack: &AckResponse,
    args: &[u8],
) -> StakeResult<()> {
    let args: PoolTransferArgs = decode_args(args)?;

    let mut zone = require_host_zone(engine.store(), &args.host_zone_id)?;
    zone.end_phase(WorkflowPhase::CommunityPoolReturn);
    set_host_zone(engine.store_mut(), &zone)?;

    if !ack.is_success() {
        warn!(%packet, zone = %args.host_zone_id, status = ?ack.status, "community pool funding failed");
        return Ok(());
    }

    info!(%packet, zone = %args.host_zone_id, denom = %args.denom, amount = %args.amount, "community pool funded");
    engine.emit(StakeEvent::CommunityPoolFunded {
        zone: args.host_zone_id,
        denom: args.denom,
        amount: args.amount,
    });
    Ok(())
}

/// Liquid stakes the native vouchers in the holding account and transfers all the derivative it
/// holds to the return account. Returns the derivative sent.
pub fn stake_pool_holdings(engine: &mut Engine, chain_id: &str) -> StakeResult<Amount> {
    let zone = require_host_zone(engine.store(), chain_id)?;
    let holding = zone.community_pool_holding_address.clone();

    let native = bank::balance(engine.store(), &holding, &zone.ibc_denom)?;
    if native > 0 {
        let st_amount = user::liquid_stake(engine, &holding, native, &zone.host_denom)?;
        info!(zone = %chain_id, %native, st = %st_amount, "liquid staked community pool deposit");
        engine.emit(StakeEvent::CommunityPoolStaked {
            zone: chain_id.to_string(),
            native_amount: native,
            st_amount,
        });
    }

    let Some(return_address) = zone
        .ica_address(IcaAccountType::CommunityPoolReturn)
        .map(str::to_string)
    else {
        return Ok(0);
    };
    let st_amount = bank::balance(engine.store(), &holding, &zone.st_denom)?;
    if st_amount == 0 {
        return Ok(0);
    }

    let token = Coin::new(&zone.st_denom, st_amount);
    bank::send(
        engine.store_mut(),
        &holding,
        &bank::escrow_address(&zone.transfer_channel_id),
        &token,
    )?;
    let timeout_timestamp = engine.transfer_timeout();
    dispatch::send_transfer(
        engine,
        TransferRequest {
            channel_id: zone.transfer_channel_id.clone(),
            connection_id: zone.connection_id.clone(),
            token: token.clone(),
            sender: holding,
            receiver: return_address,
            timeout_timestamp,
            callback_id: COMMUNITY_POOL_RETURN.to_string(),
            callback_args: encode_args(&PoolTransferArgs::new(&zone, &token))?,
        },
    )?;

    debug!(zone = %chain_id, st = %st_amount, "returning derivative to the community pool");
    Ok(st_amount)
}

/// Settles the transfer of derivative to the return account. A failed transfer gives the
/// derivative back to the holding account, which sends it again at the next epoch.
pub fn return_transfer_callback(
    engine: &mut Engine,
    packet: &PacketId,
    ack: &AckResponse,
    args: &[u8],
) -> StakeResult<()> {
    let args: PoolTransferArgs = decode_args(args)?;
    if ack.is_success() {
        debug!(%packet, zone = %args.host_zone_id, amount = %args.amount, "derivative reached the return account");
        return Ok(());
    }

    let zone = require_host_zone(engine.store(), &args.host_zone_id)?;
    bank::send(
        engine.store_mut(),
        &bank::escrow_address(&zone.transfer_channel_id),
        &zone.community_pool_holding_address,
        &Coin::new(&args.denom, args.amount),
    )?;

    warn!(%packet, zone = %args.host_zone_id, status = ?ack.status, "returning derivative failed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use liquid_stake_ica::packet::PacketPayload;

    use super::*;
    use crate::{
        remote::encode_value,
        testing::{TestEnv, HOST_DENOM},
    };

    fn holding(env: &TestEnv, denom: &str) -> Amount {
        let zone = env.zone();
        bank::balance(env.engine.store(), &zone.community_pool_holding_address, denom).unwrap()
    }

    /// Funds the deposit account and runs the epoch that brings the tokens to the controller.
    fn deposit_from_pool(env: &mut TestEnv, amount: Amount) {
        let deposit_account = env.ica(IcaAccountType::CommunityPoolDeposit);
        env.host.credit(&deposit_account, HOST_DENOM, amount);
        env.next_stride_epoch();
    }

    #[test]
    fn test_pool_deposit_is_staked_and_donated_back() {
        let mut env = TestEnv::new();
        env.add_validators(&[(1, 1)]);
        deposit_from_pool(&mut env, 500);

        let zone = env.zone();
        assert_eq!(holding(&env, &zone.ibc_denom), 500);
        assert_eq!(env.host.balance(&env.ica(IcaAccountType::CommunityPoolDeposit), HOST_DENOM), 0);
        assert!(!zone.phase_in_flight(WorkflowPhase::CommunityPoolDeposit));

        env.next_stride_epoch();
        assert_eq!(holding(&env, &zone.ibc_denom), 0);
        assert_eq!(holding(&env, &zone.st_denom), 0);
        assert_eq!(env.host.community_pool.get(&zone.st_denom_on_host()), Some(&500));
        assert_eq!(
            env.host.balance(&env.ica(IcaAccountType::CommunityPoolReturn), &zone.st_denom_on_host()),
            0
        );
        // the returned derivative stays in supply while it is on the host
        assert_eq!(bank::supply(env.engine.store(), &zone.st_denom).unwrap(), 500);

        assert!(env.events.iter().any(|event| matches!(
            event,
            StakeEvent::CommunityPoolStaked {
                native_amount: 500,
                st_amount: 500,
                ..
            }
        )));
        assert!(env.events.iter().any(|event| matches!(
            event,
            StakeEvent::CommunityPoolFunded { amount: 500, .. }
        )));
    }

    #[test]
    fn test_rebates_in_the_return_account_are_donated() {
        let mut env = TestEnv::new();
        let return_account = env.ica(IcaAccountType::CommunityPoolReturn);
        env.host.credit(&return_account, HOST_DENOM, 40);

        env.next_stride_epoch();
        assert_eq!(env.host.community_pool.get(HOST_DENOM), Some(&40));
        assert_eq!(env.host.balance(&return_account, HOST_DENOM), 0);
        assert!(!env.zone().phase_in_flight(WorkflowPhase::CommunityPoolReturn));
    }

    #[test]
    fn test_failed_return_transfer_is_sent_again() {
        let mut env = TestEnv::new();
        env.add_validators(&[(1, 1)]);
        deposit_from_pool(&mut env, 300);

        env.hold_packets = true;
        env.next_stride_epoch();
        let zone = env.zone();
        let position = env
            .held
            .iter()
            .position(|packet| matches!(packet.payload, PacketPayload::Transfer(_)))
            .expect("derivative transfer must be sent");
        let transfer = env.held.remove(position);
        assert_eq!(holding(&env, &zone.st_denom), 0);

        env.engine.timeout_packet(&transfer.id).unwrap();
        assert_eq!(holding(&env, &zone.st_denom), 300);
        let escrow = bank::escrow_address(&zone.transfer_channel_id);
        assert_eq!(bank::balance(env.engine.store(), &escrow, &zone.st_denom).unwrap(), 0);

        env.release_held();
        env.next_stride_epoch();
        assert_eq!(holding(&env, &zone.st_denom), 0);
        assert_eq!(env.host.community_pool.get(&zone.st_denom_on_host()), Some(&300));
    }

    #[test]
    fn test_nothing_is_queried_before_the_pool_accounts_are_bound() {
        let mut env = TestEnv::new();
        let mut zone = env.zone();
        zone.ica_addresses.remove(&IcaAccountType::CommunityPoolReturn);
        set_host_zone(env.engine.store_mut(), &zone).unwrap();

        assert_eq!(query_pool_balances(&mut env.engine, &zone.chain_id).unwrap(), 0);
    }

    #[test]
    fn test_balances_of_other_accounts_are_rejected() {
        let mut env = TestEnv::new();
        let zone = env.zone();
        let fee_account = env.ica(IcaAccountType::Fee);
        let query = Query::new(
            &zone.connection_id,
            &zone.chain_id,
            BANK_STORE_QUERY_WITH_PROOF,
            balance_key(&fee_account, HOST_DENOM),
            MODULE,
            COMMUNITY_POOL_BALANCE,
        )
        .with_callback_data(
            encode_args(&PoolBalanceArgs {
                account_type: IcaAccountType::Fee,
                denom: HOST_DENOM.to_string(),
            })
            .unwrap(),
        );
        let result = encode_value(&RemoteBalance {
            address: fee_account,
            denom: HOST_DENOM.to_string(),
            amount: 10,
        })
        .unwrap();

        assert!(pool_balance_callback(&mut env.engine, &result, &query).is_err());
    }
}
