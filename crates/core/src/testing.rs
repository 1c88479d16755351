//! An engine wired to a simulated host chain by an in-process relayer.
//!
//! [`TestEnv`] registers one zone on a fresh engine, opens its accounts and then moves block by
//! block. After every block the relayer drains the outbox: handshakes are acked, packets are
//! executed against the [`SimulatedHost`] and acknowledged, and queries are answered from the host's
//! state with a proof the light client accepts.

use liquid_stake_ica::{
    channel::ChannelDuty,
    packet::{IcaPacketData, PacketPayload, TransferPacketData},
    Acknowledgement, IcaAccountType, OutboundPacket,
};
use liquid_stake_icq::{commitment_proof, QueryRequest, ResponseOutcome};
use liquid_stake_params::Params;
use liquid_stake_primitives::{
    address::{encode_address, module_address},
    denom::DenomTrace,
    types::{Amount, BlockHeight, BlockInfo, Timestamp, NANOS_PER_SEC},
};

use crate::{
    admin::HostZoneConfig,
    bank,
    engine::Engine,
    epochs::{require_epoch_tracker, EpochIdentifier},
    errors::StakeResult,
    events::StakeEvent,
    host_zone::{require_host_zone, HostZone},
    msgs::Msg,
    test_utils::SimulatedHost,
    validators::{validators_for_zone, ValidatorConfig},
};

pub(crate) const ADMIN: &str = "stride1admin";
pub(crate) const USER: &str = "stride1user";
pub(crate) const ZONE: &str = "cosmoshub-4";
pub(crate) const CONNECTION: &str = "connection-0";
pub(crate) const TRANSFER_CHANNEL: &str = "channel-0";
pub(crate) const PREFIX: &str = "cosmos";
pub(crate) const HOST_DENOM: &str = "uatom";
pub(crate) const GENESIS_TIME: Timestamp = 1_700_000_000 * NANOS_PER_SEC;

const BLOCK_TIME: u64 = 6 * NANOS_PER_SEC;
const VALIDATOR_TOKENS: Amount = 1_000_000_000;
const UNBONDING_DAYS: u64 = 6;

/// A host account address derived from `seed`.
pub(crate) fn host_address(seed: u8) -> String {
    encode_address(PREFIX, &[seed; 20]).expect("must encode")
}

/// A host operator address derived from `seed`.
pub(crate) fn valoper(seed: u8) -> String {
    encode_address(&format!("{PREFIX}valoper"), &[seed; 20]).expect("must encode")
}

/// The zone [`TestEnv::new`] registers.
pub(crate) fn zone_config() -> HostZoneConfig {
    HostZoneConfig {
        connection_id: CONNECTION.to_string(),
        transfer_channel_id: TRANSFER_CHANNEL.to_string(),
        counterparty_channel_id: None,
        bech32_prefix: PREFIX.to_string(),
        host_denom: HOST_DENOM.to_string(),
        unbonding_period: UNBONDING_DAYS,
        min_redemption_rate: None,
        max_redemption_rate: None,
        lsm_enabled: true,
        max_messages_per_ica_tx: None,
    }
}

/// The zone of [`zone_config`] as registered on a fresh engine.
pub(crate) fn test_zone() -> HostZone {
    TestEnv::new().zone()
}

/// An engine with one registered zone, a simulated host and a relayer between them.
#[derive(Debug)]
pub(crate) struct TestEnv {
    pub(crate) engine: Engine,
    pub(crate) host: SimulatedHost,
    /// When unset, query requests pile up in `unanswered`.
    pub(crate) answer_queries: bool,
    pub(crate) unanswered: Vec<QueryRequest>,
    /// When set, packets pile up in `held` instead of reaching the host.
    pub(crate) hold_packets: bool,
    pub(crate) held: Vec<OutboundPacket>,
    /// Events emitted since the environment was created.
    pub(crate) events: Vec<StakeEvent>,
    host_height: BlockHeight,
    next_channel: u64,
}

impl TestEnv {
    /// Registers the zone of [`zone_config`] and opens its accounts.
    pub(crate) fn new() -> Self {
        let params = Params {
            admins: vec![ADMIN.to_string()],
            ..Params::default()
        };
        Self::with(params, zone_config())
    }

    pub(crate) fn with(params: Params, config: HostZoneConfig) -> Self {
        let mut engine =
            Engine::new(params, BlockInfo::new(1, GENESIS_TIME)).expect("params must be valid");
        engine
            .create_client(CONNECTION, ZONE, 1, GENESIS_TIME)
            .expect("must create client");

        let mut env = Self {
            engine,
            host: SimulatedHost::new(HOST_DENOM, UNBONDING_DAYS, GENESIS_TIME),
            answer_queries: true,
            unanswered: Vec::new(),
            hold_packets: false,
            held: Vec::new(),
            events: Vec::new(),
            host_height: 1,
            next_channel: 1,
        };

        env.deliver(Msg::RegisterHostZone {
            creator: ADMIN.to_string(),
            config,
        })
        .expect("must register zone");
        env.relay();
        env
    }

    pub(crate) fn zone(&self) -> HostZone {
        require_host_zone(self.engine.store(), ZONE).expect("zone must exist")
    }

    /// Address of one of the zone's interchain accounts.
    pub(crate) fn ica(&self, account_type: IcaAccountType) -> String {
        self.zone()
            .require_ica_address(account_type)
            .expect("account must be bound")
    }

    pub(crate) fn deliver(&mut self, msg: Msg) -> StakeResult<()> {
        self.engine.deliver(msg)
    }

    /// Adds validators with the given seeds and weights on both chains. Their share rates are
    /// queried at the next block.
    pub(crate) fn add_validators(&mut self, validators: &[(u8, u64)]) -> Vec<String> {
        let configs: Vec<ValidatorConfig> = validators
            .iter()
            .map(|(seed, weight)| ValidatorConfig {
                name: format!("validator-{seed}"),
                address: valoper(*seed),
                weight: *weight,
            })
            .collect();
        for config in &configs {
            self.host.add_validator(&config.address, VALIDATOR_TOKENS);
        }

        self.deliver(Msg::AddValidators {
            creator: ADMIN.to_string(),
            host_zone: ZONE.to_string(),
            validators: configs.clone(),
        })
        .expect("must add validators");
        configs.into_iter().map(|config| config.address).collect()
    }

    /// Credits `address` with the native voucher on the controller.
    pub(crate) fn fund(&mut self, address: &str, amount: Amount) {
        self.engine
            .recv_transfer(TRANSFER_CHANNEL, HOST_DENOM, address, amount)
            .expect("must receive transfer");
    }

    pub(crate) fn liquid_stake(&mut self, staker: &str, amount: Amount) -> StakeResult<()> {
        self.deliver(Msg::LiquidStake {
            creator: staker.to_string(),
            amount,
            host_denom: HOST_DENOM.to_string(),
        })
    }

    /// Funds `staker`, liquid stakes `amount` and runs the epochs that move it into delegation.
    pub(crate) fn stake_and_delegate(&mut self, staker: &str, amount: Amount) {
        self.fund(staker, amount);
        self.liquid_stake(staker, amount).expect("must liquid stake");
        // one epoch transfers the deposit, the next delegates it
        self.next_stride_epoch();
        self.next_stride_epoch();
    }

    /// Asserts that the zone's total delegation is the sum of its validators' delegations.
    pub(crate) fn assert_delegations_match(&self) {
        let validators =
            validators_for_zone(self.engine.store(), ZONE).expect("must read validators");
        let sum: Amount = validators.iter().map(|v| v.delegation).sum();
        assert_eq!(sum, self.zone().total_delegations, "validator delegations drift from the zone");
    }

    pub(crate) fn st_balance(&self, address: &str) -> Amount {
        bank::balance(self.engine.store(), address, &self.zone().st_denom).expect("must read balance")
    }

    // ===== Blocks =====

    /// Runs a block at `time` and relays everything it produced.
    pub(crate) fn block_at(&mut self, time: Timestamp) {
        let block = BlockInfo::new(self.engine.block().height + 1, time);

        self.host_height += 1;
        self.host.advance_to(time);
        self.engine
            .update_client(CONNECTION, self.host_height, time)
            .expect("must update client");

        self.engine.begin_block(block).expect("must begin block");
        self.engine.end_block().expect("must end block");
        self.relay();
    }

    pub(crate) fn next_block(&mut self) {
        self.block_at(self.engine.block().time + BLOCK_TIME);
    }

    /// Runs the block that starts the next stride epoch.
    pub(crate) fn next_stride_epoch(&mut self) {
        self.block_at(self.epoch_start(EpochIdentifier::StrideEpoch));
    }

    /// Runs stride epochs up to and including the one that starts the next day epoch.
    pub(crate) fn next_day(&mut self) {
        let day = self.epoch(EpochIdentifier::Day);
        while self.epoch(EpochIdentifier::Day) == day {
            self.next_stride_epoch();
        }
    }

    pub(crate) fn epoch(&self, identifier: EpochIdentifier) -> u64 {
        require_epoch_tracker(self.engine.store(), identifier)
            .expect("tracker must exist")
            .epoch_number
    }

    fn epoch_start(&self, identifier: EpochIdentifier) -> Timestamp {
        let start = require_epoch_tracker(self.engine.store(), identifier)
            .expect("tracker must exist")
            .next_epoch_start_time;

        // the genesis epochs start at the genesis block's own time
        start.max(self.engine.block().time + BLOCK_TIME)
    }

    // ===== Relayer =====

    /// Delivers everything in the outbox until it stays empty.
    pub(crate) fn relay(&mut self) {
        for _ in 0..16 {
            let inbound = self.host.take_outbound();
            for transfer in &inbound {
                self.engine
                    .recv_transfer(TRANSFER_CHANNEL, &transfer.denom, &transfer.receiver, transfer.amount)
                    .expect("inbound transfer must apply");
            }

            let outbox = self.engine.take_outbox();
            if outbox.is_empty() && inbound.is_empty() {
                break;
            }

            for duty in outbox.channel_duties {
                self.open_channel(duty);
            }
            for packet in outbox.packets {
                if self.hold_packets {
                    self.held.push(packet);
                } else {
                    self.deliver_packet(packet);
                }
            }
            for request in outbox.query_requests {
                if self.answer_queries {
                    self.answer(&request);
                } else {
                    self.unanswered.push(request);
                }
            }
        }

        self.events.extend(self.engine.take_events());
    }

    /// Delivers the packets held back while `hold_packets` was set, then relays what they produced.
    pub(crate) fn release_held(&mut self) {
        self.hold_packets = false;
        for packet in std::mem::take(&mut self.held) {
            self.deliver_packet(packet);
        }
        self.relay();
    }

    fn open_channel(&mut self, duty: ChannelDuty) {
        let ChannelDuty::OpenChannel { owner, port_id, .. } = duty;

        let channel_id = format!("channel-{}", self.next_channel);
        self.next_channel += 1;
        let address = module_address(PREFIX, "ica", &owner).expect("must derive address");

        self.engine
            .chan_open_ack(&port_id, &channel_id, &address)
            .expect("must ack channel");
    }

    fn deliver_packet(&mut self, packet: OutboundPacket) {
        let ack = match &packet.payload {
            PacketPayload::Transfer(data) => self.receive_transfer(data),
            PacketPayload::Ica(data) => self.execute_tx(data),
        };

        self.engine
            .acknowledge_packet(&packet.id, &ack)
            .expect("acknowledgement must apply");
    }

    fn receive_transfer(&mut self, data: &TransferPacketData) -> Acknowledgement {
        let Ok(amount) = data.amount.parse::<Amount>() else {
            return Acknowledgement::Error(format!("invalid amount {}", data.amount));
        };

        // vouchers of the host's own tokens unwind to their base denom, controller tokens become
        // vouchers over the host's end of the channel
        let denom = match bank::get_denom_trace(self.engine.store(), &data.denom) {
            Ok(Some(trace)) => trace.base_denom,
            _ => DenomTrace::single_hop(TRANSFER_CHANNEL, &data.denom).ibc_denom(),
        };
        self.host.credit(&data.receiver, &denom, amount);
        Acknowledgement::Result(Vec::new())
    }

    fn execute_tx(&mut self, data: &IcaPacketData) -> Acknowledgement {
        let msgs = match data.msgs() {
            Ok(msgs) => msgs,
            Err(err) => return Acknowledgement::Error(err.to_string()),
        };

        match self.host.execute_tx(&msgs) {
            Ok(responses) => Acknowledgement::success(&responses).expect("responses must encode"),
            Err(err) => Acknowledgement::Error(err),
        }
    }

    /// Answers a query request from the host's current state.
    pub(crate) fn answer(&mut self, request: &QueryRequest) -> ResponseOutcome {
        let result = self.host.query(&request.request_data);
        let proof = commitment_proof(&request.request_data, &result);

        self.engine
            .submit_query_response(&request.id, &result, &proof, self.host_height)
            .expect("query response must apply")
    }
}
