//! Routes delivered messages to their handlers.

use tracing::{debug, info};

use crate::{
    admin, lsm,
    engine::Engine,
    errors::{StakeError, StakeResult},
    msgs::Msg,
    rebalance, slash, trade_route, user, validators,
};

/// Handles `msg`. The caller runs it in a transaction.
pub fn handle(engine: &mut Engine, msg: Msg) -> StakeResult<()> {
    if msg.is_admin() && !engine.params().is_admin(msg.creator()) {
        return Err(StakeError::Unauthorized(msg.creator().to_string()));
    }
    debug!(msg = %msg.name(), creator = %msg.creator(), "handling message");

    match msg {
        Msg::RegisterHostZone { config, .. } => {
            admin::register_host_zone(engine, &config)?;
        }
        Msg::AddValidators {
            host_zone,
            validators,
            ..
        } => validators::add_validators(engine, &host_zone, &validators)?,
        Msg::ChangeValidatorWeights {
            host_zone, weights, ..
        } => validators::change_weights(engine, &host_zone, &weights)?,
        Msg::DeleteValidator {
            host_zone,
            validator_address,
            ..
        } => validators::remove_validator(engine, &host_zone, &validator_address)?,
        Msg::RestoreInterchainAccount {
            chain_id,
            account_type,
            ..
        } => admin::restore_interchain_account(engine, &chain_id, account_type)?,
        Msg::ResumeHostZone { chain_id, .. } => admin::resume_host_zone(engine, &chain_id)?,
        Msg::UpdateInnerRedemptionRateBounds {
            chain_id,
            min_inner_redemption_rate,
            max_inner_redemption_rate,
            ..
        } => admin::update_inner_redemption_rate_bounds(
            engine,
            &chain_id,
            min_inner_redemption_rate,
            max_inner_redemption_rate,
        )?,
        Msg::SetCommunityPoolRebate {
            chain_id,
            rebate_rate,
            liquid_staked_st_token_amount,
            ..
        } => admin::set_community_pool_rebate(
            engine,
            &chain_id,
            rebate_rate,
            liquid_staked_st_token_amount,
        )?,
        Msg::CreateTradeRoute {
            host_zone_id,
            reward_denom,
            trade_connection_id,
            ..
        } => {
            trade_route::create_trade_route(engine, &host_zone_id, &reward_denom, &trade_connection_id)?;
        }
        Msg::ToggleTradeController {
            reward_denom,
            host_denom,
            change,
            address,
            ..
        } => trade_route::toggle_trade_controller(engine, &reward_denom, &host_denom, change, &address)?,
        Msg::RebalanceValidators {
            host_zone,
            max_swaps,
            ..
        } => {
            let sent = rebalance::rebalance(engine, &host_zone, max_swaps)?;
            info!(zone = %host_zone, %sent, "rebalance requested");
        }
        Msg::UpdateValidatorSharesExchRate {
            chain_id, valoper, ..
        } => {
            slash::query_shares_rate(engine, &chain_id, &valoper)?;
        }
        Msg::LiquidStake {
            creator,
            amount,
            host_denom,
        } => {
            user::liquid_stake(engine, &creator, amount, &host_denom)?;
        }
        Msg::LsmLiquidStake {
            creator,
            amount,
            lsm_token_ibc_denom,
        } => {
            lsm::lsm_liquid_stake(engine, &creator, amount, &lsm_token_ibc_denom)?;
        }
        Msg::RedeemStake {
            creator,
            amount,
            host_zone,
            receiver,
        } => {
            user::redeem_stake(engine, &creator, &host_zone, amount, &receiver)?;
        }
        Msg::ClaimUndelegatedTokens {
            host_zone_id,
            epoch,
            receiver,
            ..
        } => user::claim_undelegated_tokens(engine, &host_zone_id, epoch, &receiver)?,
    }

    Ok(())
}
