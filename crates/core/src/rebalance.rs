//! Redelegations that move a zone's stake back towards its validator weights.

use liquid_stake_ica::{dispatch, AckResponse, HostMsg, IcaAccountType, PacketId};
use liquid_stake_primitives::coin::Coin;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    callbacks::REBALANCE,
    codec::{decode_args, encode_args},
    engine::Engine,
    epochs::stride_epoch_timeout,
    errors::{StakeError, StakeResult},
    events::StakeEvent,
    host_zone::{require_host_zone, set_host_zone, WorkflowPhase},
    validators::{
        add_delegation, mark_delegation_changes, rebalance_moves, remove_delegation,
        validators_for_zone, Redelegation,
    },
};

/// Arguments of a rebalance packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceArgs {
    /// The zone.
    pub host_zone_id: String,

    /// The redelegations carried by the packet.
    pub moves: Vec<Redelegation>,
}

fn touched(moves: &[Redelegation]) -> Vec<&str> {
    moves
        .iter()
        .flat_map(|m| [m.src.as_str(), m.dst.as_str()])
        .collect()
}

/// Redelegates up to `max_swaps` imbalances of a zone and returns how many were sent.
pub fn rebalance(engine: &mut Engine, chain_id: &str, max_swaps: usize) -> StakeResult<usize> {
    let mut zone = require_host_zone(engine.store(), chain_id)?;

    if zone.phase_in_flight(WorkflowPhase::Rebalance) {
        return Err(StakeError::validation(format!(
            "a rebalance of {chain_id} is already in flight"
        )));
    }

    let validators = validators_for_zone(engine.store(), chain_id)?;
    if let Some(busy) = validators
        .iter()
        .find(|v| v.delegation_changes_in_progress > 0)
    {
        return Err(StakeError::validation(format!(
            "validator {} has delegation changes in flight",
            busy.address
        )));
    }

    let moves = rebalance_moves(&validators, zone.total_delegations, max_swaps)?;
    if moves.is_empty() {
        return Ok(0);
    }

    let delegation_address = zone.require_ica_address(IcaAccountType::Delegation)?;
    let batch_size = engine
        .params()
        .rebalance_batch_size
        .min(zone.max_messages_per_ica_tx)
        .max(1);
    let timeout = stride_epoch_timeout(engine.store(), engine.params())?;

    let mut packets = 0;
    for batch in moves.chunks(batch_size) {
        let msgs = batch
            .iter()
            .map(|m| HostMsg::BeginRedelegate {
                delegator_address: delegation_address.clone(),
                validator_src_address: m.src.clone(),
                validator_dst_address: m.dst.clone(),
                amount: Coin::new(&zone.host_denom, m.amount),
            })
            .collect();
        let args = encode_args(&RebalanceArgs {
            host_zone_id: chain_id.to_string(),
            moves: batch.to_vec(),
        })?;

        dispatch::submit_txs(
            engine,
            zone.ica_tx(IcaAccountType::Delegation, msgs, timeout, REBALANCE, args),
        )?;
        mark_delegation_changes(engine.store_mut(), chain_id, &touched(batch), true)?;
        packets += 1;
    }

    zone.begin_phase(WorkflowPhase::Rebalance, packets);
    set_host_zone(engine.store_mut(), &zone)?;

    info!(zone = %chain_id, swaps = %moves.len(), %packets, "rebalancing validators");
    engine.emit(StakeEvent::Rebalanced {
        zone: chain_id.to_string(),
        swaps: moves.len(),
    });
    Ok(moves.len())
}

/// Settles a batch of redelegations.
pub fn rebalance_callback(
    engine: &mut Engine,
    packet: &PacketId,
    ack: &AckResponse,
    args: &[u8],
) -> StakeResult<()> {
    let args: RebalanceArgs = decode_args(args)?;
    let chain_id = args.host_zone_id.as_str();

    mark_delegation_changes(engine.store_mut(), chain_id, &touched(&args.moves), false)?;
    let mut zone = require_host_zone(engine.store(), chain_id)?;
    zone.end_phase(WorkflowPhase::Rebalance);
    set_host_zone(engine.store_mut(), &zone)?;

    if !ack.is_success() {
        warn!(zone = %chain_id, %packet, status = ?ack.status, "rebalance failed");
        return Ok(());
    }

    for m in &args.moves {
        let moved = remove_delegation(engine.store_mut(), chain_id, &m.src, m.amount)?;
        add_delegation(engine.store_mut(), chain_id, &m.dst, moved)?;
    }

    info!(zone = %chain_id, %packet, swaps = %args.moves.len(), "rebalance settled");
    Ok(())
}
