//! The controller engine, one simulated chain per connection and the relayer between them.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Result};
use liquid_stake_core::{
    bank, test_utils::SimulatedHost, validators::ValidatorConfig, Engine, Msg, StakeEvent,
};
use liquid_stake_ica::{
    channel::ChannelDuty,
    packet::{PacketPayload, TransferPacketData},
    Acknowledgement, OutboundPacket,
};
use liquid_stake_icq::{commitment_proof, QueryRequest, ResponseOutcome};
use liquid_stake_params::Params;
use liquid_stake_primitives::{
    address::{encode_address, module_address},
    denom::DenomTrace,
    types::{Amount, BlockHeight, BlockInfo, Timestamp, NANOS_PER_SEC},
};
use tracing::{debug, info, warn};

use crate::{
    config::{Action, Config, ZoneSpec},
    constants::{DEFAULT_VALIDATOR_TOKENS, FIRST_ICA_CHANNEL, GENESIS_HEIGHT, MAX_RELAY_ROUNDS},
};

/// A simulated host chain behind one connection.
#[derive(Debug)]
struct HostChain {
    chain_id: String,
    prefix: String,
    /// Controller's end of the transfer channel.
    transfer_channel_id: String,
    /// Host's end of the transfer channel.
    counterparty_channel_id: String,
    height: BlockHeight,
    rewards_per_block: Amount,
    state: SimulatedHost,
}

/// What a relay pass delivered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RelayStats {
    pub handshakes: usize,
    pub packets: usize,
    pub timeouts: usize,
    pub inbound_transfers: usize,
    pub queries: usize,
}

/// The controller and its hosts.
#[derive(Debug)]
pub(crate) struct Devnet {
    engine: Engine,
    hosts: BTreeMap<String, HostChain>,
    actions: Vec<Action>,
    block_time: Timestamp,
    next_channel: u64,
}

impl Devnet {
    /// Starts the controller at genesis, registers every zone with its validators and credits the
    /// genesis funds.
    pub(crate) fn bootstrap(mut params: Params, config: Config) -> Result<Self> {
        if !params.admins.contains(&config.admin) {
            params.admins.push(config.admin.clone());
        }

        let genesis_time = config.genesis_time.saturating_mul(NANOS_PER_SEC);
        let engine = Engine::new(params, BlockInfo::new(GENESIS_HEIGHT, genesis_time))
            .context("invalid params")?;

        let mut actions = config.actions;
        actions.sort_by_key(|action| action.height);

        let mut devnet = Self {
            engine,
            hosts: BTreeMap::new(),
            actions,
            block_time: config.block_time.saturating_mul(NANOS_PER_SEC),
            next_channel: FIRST_ICA_CHANNEL,
        };

        for zone in &config.zones {
            devnet.add_zone(&config.admin, zone, genesis_time)?;
        }
        devnet.relay()?;

        for funding in &config.funds {
            let zone = config
                .zones
                .iter()
                .find(|zone| zone.chain_id == funding.zone)
                .ok_or_else(|| anyhow!("funds for unknown zone {}", funding.zone))?;

            devnet
                .engine
                .recv_transfer(
                    &zone.zone.transfer_channel_id,
                    &zone.zone.host_denom,
                    &funding.address,
                    funding.amount,
                )
                .with_context(|| format!("could not fund {}", funding.address))?;
        }

        info!(zones = %config.zones.len(), funded = %config.funds.len(), "devnet bootstrapped");
        Ok(devnet)
    }

    fn add_zone(&mut self, admin: &str, spec: &ZoneSpec, genesis_time: Timestamp) -> Result<()> {
        let connection_id = &spec.zone.connection_id;
        if self.hosts.contains_key(connection_id) {
            bail!("connection {connection_id} is used by more than one zone");
        }

        self.engine
            .create_client(connection_id, &spec.chain_id, GENESIS_HEIGHT, genesis_time)
            .with_context(|| format!("could not create client for {}", spec.chain_id))?;

        let mut state = SimulatedHost::new(
            &spec.zone.host_denom,
            spec.zone.unbonding_period,
            genesis_time,
        );
        let mut validators = Vec::with_capacity(spec.validators.len());
        for (index, validator) in spec.validators.iter().enumerate() {
            let address = match &validator.address {
                Some(address) => address.clone(),
                None => {
                    let seed = u8::try_from(index + 1).context("too many validators")?;
                    encode_address(&format!("{}valoper", spec.zone.bech32_prefix), &[seed; 20])?
                }
            };
            state.add_validator(&address, validator.tokens.unwrap_or(DEFAULT_VALIDATOR_TOKENS));
            validators.push(ValidatorConfig {
                name: validator.name.clone(),
                address,
                weight: validator.weight,
            });
        }

        self.hosts.insert(
            connection_id.clone(),
            HostChain {
                chain_id: spec.chain_id.clone(),
                prefix: spec.zone.bech32_prefix.clone(),
                transfer_channel_id: spec.zone.transfer_channel_id.clone(),
                counterparty_channel_id: spec
                    .zone
                    .counterparty_channel_id
                    .clone()
                    .unwrap_or_else(|| spec.zone.transfer_channel_id.clone()),
                height: GENESIS_HEIGHT,
                rewards_per_block: spec.rewards_per_block,
                state,
            },
        );

        self.engine
            .deliver(Msg::RegisterHostZone {
                creator: admin.to_string(),
                config: spec.zone.clone(),
            })
            .with_context(|| format!("could not register {}", spec.chain_id))?;
        self.engine
            .deliver(Msg::AddValidators {
                creator: admin.to_string(),
                host_zone: spec.chain_id.clone(),
                validators,
            })
            .with_context(|| format!("could not add validators to {}", spec.chain_id))?;

        info!(zone = %spec.chain_id, connection = %connection_id, "added host zone");
        Ok(())
    }

    /// Height of the last executed block.
    pub(crate) fn height(&self) -> BlockHeight {
        self.engine.block().height
    }

    /// Runs the next block on every chain, delivers the actions due at its height and relays
    /// everything the controller produced. Returns the events of the block.
    pub(crate) fn step(&mut self) -> Result<Vec<StakeEvent>> {
        let previous = self.engine.block();
        let block = BlockInfo::new(previous.height + 1, previous.time + self.block_time);

        for (connection_id, host) in &mut self.hosts {
            host.height += 1;
            host.state.advance_to(block.time);
            host.state.accrue_rewards(host.rewards_per_block);
            self.engine
                .update_client(connection_id, host.height, block.time)
                .with_context(|| format!("could not update client of {}", host.chain_id))?;
        }

        self.engine.begin_block(block)?;
        self.engine.end_block()?;

        let due = self
            .actions
            .iter()
            .take_while(|action| action.height <= block.height)
            .count();
        for action in self.actions.drain(..due).collect::<Vec<_>>() {
            let name = action.msg.name();
            match self.engine.deliver(action.msg) {
                Ok(()) => info!(height = %block.height, msg = %name, "delivered scripted message"),
                Err(err) => warn!(height = %block.height, msg = %name, %err, "scripted message failed"),
            }
        }

        let stats = self.relay()?;
        debug!(height = %block.height, ?stats, "relayed block");

        Ok(self.engine.take_events())
    }

    /// Drains the outbox and the hosts' outgoing transfers until both stay empty.
    pub(crate) fn relay(&mut self) -> Result<RelayStats> {
        let mut stats = RelayStats::default();

        for _ in 0..MAX_RELAY_ROUNDS {
            let inbound = self.relay_inbound_transfers()?;
            stats.inbound_transfers += inbound;

            let outbox = self.engine.take_outbox();
            if outbox.is_empty() && inbound == 0 {
                return Ok(stats);
            }

            for duty in outbox.channel_duties {
                self.open_channel(duty)?;
                stats.handshakes += 1;
            }
            for packet in outbox.packets {
                if self.deliver_packet(packet)? {
                    stats.packets += 1;
                } else {
                    stats.timeouts += 1;
                }
            }
            for request in outbox.query_requests {
                self.answer(&request)?;
                stats.queries += 1;
            }
        }

        warn!(rounds = %MAX_RELAY_ROUNDS, "outbox did not drain");
        Ok(stats)
    }

    /// Delivers the transfers the hosts sent to the controller. Returns how many there were.
    fn relay_inbound_transfers(&mut self) -> Result<usize> {
        let mut delivered = 0;
        for host in self.hosts.values_mut() {
            for transfer in host.state.take_outbound() {
                if transfer.channel_id != host.counterparty_channel_id {
                    warn!(chain = %host.chain_id, channel = %transfer.channel_id, "dropped transfer on unknown channel");
                    continue;
                }
                self.engine
                    .recv_transfer(
                        &host.transfer_channel_id,
                        &transfer.denom,
                        &transfer.receiver,
                        transfer.amount,
                    )
                    .with_context(|| format!("could not receive transfer from {}", host.chain_id))?;
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    fn host(&mut self, connection_id: &str) -> Result<&mut HostChain> {
        self.hosts
            .get_mut(connection_id)
            .ok_or_else(|| anyhow!("no host behind connection {connection_id}"))
    }

    fn open_channel(&mut self, duty: ChannelDuty) -> Result<()> {
        let ChannelDuty::OpenChannel {
            owner,
            port_id,
            connection_id,
            ..
        } = duty;

        let prefix = self.host(&connection_id)?.prefix.clone();
        let address = module_address(&prefix, "ica", &owner)?;
        let channel_id = format!("channel-{}", self.next_channel);
        self.next_channel += 1;

        self.engine.chan_open_ack(&port_id, &channel_id, &address)?;
        debug!(%owner, %channel_id, %address, "opened channel");
        Ok(())
    }

    /// Delivers a packet, or times it out if the host is already past its timeout. Returns whether
    /// it was delivered.
    fn deliver_packet(&mut self, packet: OutboundPacket) -> Result<bool> {
        let denom = match &packet.payload {
            PacketPayload::Transfer(data) => bank::get_denom_trace(self.engine.store(), &data.denom)?
                .map(|trace| trace.base_denom),
            PacketPayload::Ica(_) => None,
        };

        let host = self.host(&packet.connection_id)?;
        if host.state.time() >= packet.timeout_timestamp {
            self.engine.timeout_packet(&packet.id)?;
            warn!(packet = %packet.id, "packet timed out");
            return Ok(false);
        }

        let ack = match &packet.payload {
            PacketPayload::Transfer(data) => {
                let denom = denom.unwrap_or_else(|| {
                    DenomTrace::single_hop(&host.counterparty_channel_id, &data.denom).ibc_denom()
                });
                receive_transfer(&mut host.state, data, &denom)
            }
            PacketPayload::Ica(data) => match data.msgs() {
                Ok(msgs) => match host.state.execute_tx(&msgs) {
                    Ok(responses) => Acknowledgement::success(&responses)?,
                    Err(err) => Acknowledgement::Error(err),
                },
                Err(err) => Acknowledgement::Error(err.to_string()),
            },
        };

        self.engine.acknowledge_packet(&packet.id, &ack)?;
        Ok(true)
    }

    fn answer(&mut self, request: &QueryRequest) -> Result<ResponseOutcome> {
        let host = self.host(&request.connection_id)?;
        let result = host.state.query(&request.request_data);
        let proof = commitment_proof(&request.request_data, &result);
        let height = host.height;

        let outcome = self
            .engine
            .submit_query_response(&request.id, &result, &proof, height)?;
        if outcome != ResponseOutcome::Applied {
            debug!(id = %request.id, ?outcome, "query response not applied");
        }
        Ok(outcome)
    }
}

/// Credits a transfer on the host as `denom`. Vouchers of the host's own tokens arrive as their
/// base denom, controller tokens as vouchers over the host's end of the channel.
fn receive_transfer(host: &mut SimulatedHost, data: &TransferPacketData, denom: &str) -> Acknowledgement {
    let Ok(amount) = data.amount.parse::<Amount>() else {
        return Acknowledgement::Error(format!("invalid amount {}", data.amount));
    };

    host.credit(&data.receiver, denom, amount);
    Acknowledgement::Result(Vec::new())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use liquid_stake_core::{
        host_zone::require_host_zone, scheduler::rewards::reward_collector_address, HostZoneConfig,
    };
    use liquid_stake_ica::IcaAccountType;

    use super::*;
    use crate::config::{Funding, ValidatorSpec};

    const ADMIN: &str = "stride1admin";
    const USER: &str = "stride1user";
    const ZONE: &str = "cosmoshub-4";

    fn config() -> Config {
        Config {
            admin: ADMIN.to_string(),
            genesis_time: 1_700_000_000,
            block_time: 3_600,
            tick_interval: Duration::from_millis(1),
            zones: vec![ZoneSpec {
                chain_id: ZONE.to_string(),
                zone: HostZoneConfig {
                    connection_id: "connection-0".to_string(),
                    transfer_channel_id: "channel-0".to_string(),
                    counterparty_channel_id: None,
                    bech32_prefix: "cosmos".to_string(),
                    host_denom: "uatom".to_string(),
                    unbonding_period: 21,
                    min_redemption_rate: None,
                    max_redemption_rate: None,
                    lsm_enabled: false,
                    max_messages_per_ica_tx: None,
                },
                rewards_per_block: 0,
                validators: vec![
                    ValidatorSpec {
                        name: "alpha".to_string(),
                        address: None,
                        weight: 1,
                        tokens: None,
                    },
                    ValidatorSpec {
                        name: "beta".to_string(),
                        address: None,
                        weight: 3,
                        tokens: None,
                    },
                ],
            }],
            funds: vec![Funding {
                address: USER.to_string(),
                zone: ZONE.to_string(),
                amount: 1_000,
            }],
            actions: vec![Action {
                height: 2,
                msg: Msg::LiquidStake {
                    creator: USER.to_string(),
                    amount: 1_000,
                    host_denom: "uatom".to_string(),
                },
            }],
        }
    }

    #[test]
    fn test_scripted_stake_reaches_the_validators() {
        let mut devnet = Devnet::bootstrap(Params::default(), config()).expect("must bootstrap");

        let mut events = Vec::new();
        for _ in 0..24 {
            events.extend(devnet.step().expect("block must run"));
        }

        assert!(events
            .iter()
            .any(|event| matches!(event, StakeEvent::LiquidStake { native_amount: 1_000, .. })));

        let host = &devnet.hosts["connection-0"].state;
        let staked: Amount = host
            .delegations
            .keys()
            .map(|(delegator, validator)| host.delegation_tokens(delegator, validator))
            .sum();
        assert_eq!(staked, 1_000);
    }

    #[test]
    fn test_host_transfers_reach_the_controller() {
        let mut devnet = Devnet::bootstrap(Params::default(), config()).expect("must bootstrap");
        let zone = require_host_zone(devnet.engine.store(), ZONE).expect("zone must exist");
        let fee_account = zone
            .ica_address(IcaAccountType::Fee)
            .expect("fee account must be open")
            .to_string();
        devnet
            .hosts
            .get_mut("connection-0")
            .expect("host must exist")
            .state
            .credit(&fee_account, "uatom", 40);

        for _ in 0..24 {
            devnet.step().expect("block must run");
        }

        let collector = reward_collector_address(devnet.engine.params()).expect("must derive");
        assert_eq!(
            bank::balance(devnet.engine.store(), &collector, &zone.ibc_denom).expect("must read"),
            40
        );
        assert_eq!(devnet.hosts["connection-0"].state.balance(&fee_account, "uatom"), 0);
    }

    #[test]
    fn test_zones_need_their_own_connection() {
        let mut config = config();
        let mut second = config.zones[0].clone();
        second.chain_id = "osmosis-1".to_string();
        config.zones.push(second);

        assert!(Devnet::bootstrap(Params::default(), config).is_err());
    }
}
