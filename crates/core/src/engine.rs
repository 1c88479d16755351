//! The engine owns the state of the liquid staking core and drives it block by block.
//!
//! It is the host of both the query layer and the dispatch layer: queries, packets and channel
//! handshakes it produces are collected in an [`Outbox`] that the relayer drains after each
//! block, and everything the relayer brings back enters through one of the entry points below.
//! Every entry point runs in its own transaction, so a failure leaves no trace in the store, the
//! outbox or the event log.

use liquid_stake_db::KvStore;
use liquid_stake_ica::{
    channel::{ChannelDuty, ChannelSMCfg},
    dispatch as ica_dispatch,
    signals::Signal,
    AckCallback, AckCallbacks, Acknowledgement, IcaHost, OutboundPacket, PacketId,
};
use liquid_stake_icq::{
    keeper as icq_keeper, ClientStore, LightClient, ProofOps, QueryCallback, QueryCallbacks,
    QueryHost, QueryRequest, ResponseOutcome,
};
use liquid_stake_params::Params;
use liquid_stake_primitives::{
    coin::Coin,
    denom::DenomTrace,
    types::{Amount, BlockHeight, BlockInfo, Timestamp},
};
use tracing::{debug, info};

use crate::{
    admin, bank, callbacks,
    epochs::{advance_epochs, init_epoch_trackers, EpochHooks},
    errors::{StakeError, StakeResult},
    events::StakeEvent,
    msg_server,
    msgs::Msg,
    scheduler,
};

/// Name under which the core registers its query callbacks and derives module accounts.
pub const MODULE: &str = "stakeibc";

/// Work handed to the relayer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outbox {
    /// Packets to deliver to the counterparty.
    pub packets: Vec<OutboundPacket>,

    /// Channel handshakes to start.
    pub channel_duties: Vec<ChannelDuty>,

    /// Queries to run against host chains.
    pub query_requests: Vec<QueryRequest>,
}

impl Outbox {
    /// Returns `true` if there is nothing to relay.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty() && self.channel_duties.is_empty() && self.query_requests.is_empty()
    }

    fn marks(&self) -> (usize, usize, usize) {
        (
            self.packets.len(),
            self.channel_duties.len(),
            self.query_requests.len(),
        )
    }

    fn truncate(&mut self, (packets, duties, requests): (usize, usize, usize)) {
        self.packets.truncate(packets);
        self.channel_duties.truncate(duties);
        self.query_requests.truncate(requests);
    }
}

/// The liquid staking core.
#[derive(Debug)]
pub struct Engine {
    store: KvStore,
    params: Params,
    block: BlockInfo,
    clients: ClientStore,
    query_callbacks: QueryCallbacks<Engine>,
    ack_callbacks: AckCallbacks<Engine>,
    epoch_hooks: EpochHooks,
    channel_cfg: ChannelSMCfg,
    outbox: Outbox,
    events: Vec<StakeEvent>,
}

impl Engine {
    /// Creates an engine at `genesis`. Every epoch starts its first period at the genesis time.
    pub fn new(params: Params, genesis: BlockInfo) -> StakeResult<Self> {
        params.validate().map_err(StakeError::validation)?;

        let mut engine = Self {
            store: KvStore::new(),
            params,
            block: genesis,
            clients: ClientStore::new(),
            query_callbacks: callbacks::query_callbacks(),
            ack_callbacks: callbacks::ack_callbacks(),
            epoch_hooks: scheduler::epoch_hooks(),
            channel_cfg: ChannelSMCfg::default(),
            outbox: Outbox::default(),
            events: Vec::new(),
        };
        init_epoch_trackers(&mut engine.store, &engine.params, genesis.time)?;

        info!(height = %genesis.height, time = %genesis.time, "engine initialized");
        Ok(engine)
    }

    // ===== Accessors =====

    /// The state store.
    pub const fn store(&self) -> &KvStore {
        &self.store
    }

    /// The state store, mutably.
    pub fn store_mut(&mut self) -> &mut KvStore {
        &mut self.store
    }

    /// The protocol parameters.
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// The block being executed.
    pub const fn block(&self) -> BlockInfo {
        self.block
    }

    /// The light clients of every connection.
    pub const fn clients(&self) -> &ClientStore {
        &self.clients
    }

    /// The hooks run at epoch boundaries.
    pub const fn epoch_hooks(&self) -> &EpochHooks {
        &self.epoch_hooks
    }

    /// Work produced since the outbox was last drained.
    pub const fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Drains the outbox.
    pub fn take_outbox(&mut self) -> Outbox {
        std::mem::take(&mut self.outbox)
    }

    /// Events emitted since the log was last drained.
    pub fn events(&self) -> &[StakeEvent] {
        &self.events
    }

    /// Drains the event log.
    pub fn take_events(&mut self) -> Vec<StakeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Appends an event to the log.
    pub fn emit(&mut self, event: StakeEvent) {
        debug!(?event, "emitted event");
        self.events.push(event);
    }

    /// Absolute timeout of ICA packets that are not tied to an epoch.
    pub fn ica_timeout(&self) -> Timestamp {
        self.block.time.saturating_add(self.params.ica_timeout_nanos)
    }

    /// Absolute timeout of token transfers.
    pub fn transfer_timeout(&self) -> Timestamp {
        self.block.time.saturating_add(self.params.ibc_transfer_timeout_nanos)
    }

    /// Latest host time seen by the light client of `connection_id`.
    pub fn host_time(&self, connection_id: &str) -> StakeResult<Timestamp> {
        self.clients
            .latest_time(connection_id)
            .ok_or_else(|| StakeError::not_found("client for connection", connection_id))
    }

    /// Runs `f` in a nested transaction.
    ///
    /// If `f` fails, its store writes are rolled back and the packets, requests and events it
    /// produced are dropped.
    pub fn transact<T>(&mut self, f: impl FnOnce(&mut Self) -> StakeResult<T>) -> StakeResult<T> {
        let marks = self.outbox.marks();
        let events = self.events.len();

        self.store.begin();
        match f(self) {
            Ok(value) => {
                self.store.commit()?;
                Ok(value)
            }
            Err(err) => {
                self.store.rollback()?;
                self.outbox.truncate(marks);
                self.events.truncate(events);
                Err(err)
            }
        }
    }

    // ===== Block Lifecycle =====

    /// Starts executing `block`: expires overdue queries and advances the epochs.
    pub fn begin_block(&mut self, block: BlockInfo) -> StakeResult<()> {
        if block.height <= self.block.height || block.time < self.block.time {
            return Err(StakeError::validation(format!(
                "block {} at {} does not follow block {} at {}",
                block.height, block.time, self.block.height, self.block.time
            )));
        }

        self.block = block;
        let expired = icq_keeper::begin_block(self)?;
        if expired > 0 {
            debug!(height = %block.height, %expired, "expired queries");
        }

        advance_epochs(self)
    }

    /// Finishes the current block: emits the query requests that are due.
    pub fn end_block(&mut self) -> StakeResult<()> {
        icq_keeper::end_block(self)?;
        Ok(())
    }

    // ===== Transactions =====

    /// Executes a user or admin message.
    pub fn deliver(&mut self, msg: Msg) -> StakeResult<()> {
        self.transact(|engine| msg_server::handle(engine, msg))
    }

    // ===== Relayer Entry Points =====

    /// Creates the light client of a connection to a host.
    pub fn create_client(
        &mut self,
        connection_id: &str,
        chain_id: &str,
        height: BlockHeight,
        time: Timestamp,
    ) -> StakeResult<()> {
        self.clients
            .create_client(connection_id, chain_id, height, time)
            .map_err(StakeError::Validation)
    }

    /// Moves the light client of a connection forward.
    pub fn update_client(
        &mut self,
        connection_id: &str,
        height: BlockHeight,
        time: Timestamp,
    ) -> StakeResult<()> {
        self.clients
            .update_client(connection_id, height, time)
            .map_err(StakeError::Validation)
    }

    /// Handles the acknowledgement of a packet.
    pub fn acknowledge_packet(&mut self, packet: &PacketId, ack: &Acknowledgement) -> StakeResult<()> {
        self.transact(|engine| ica_dispatch::on_acknowledgement(engine, packet, ack))
    }

    /// Handles the timeout of a packet.
    pub fn timeout_packet(&mut self, packet: &PacketId) -> StakeResult<()> {
        self.transact(|engine| ica_dispatch::on_timeout(engine, packet))
    }

    /// Handles a relayed query response.
    pub fn submit_query_response(
        &mut self,
        id: &str,
        result: &[u8],
        proof: &ProofOps,
        height: BlockHeight,
    ) -> StakeResult<ResponseOutcome> {
        self.transact(|engine| icq_keeper::on_response(engine, id, result, proof, height))
    }

    /// Handles the open-ack of an interchain account channel.
    pub fn chan_open_ack(&mut self, port_id: &str, channel_id: &str, address: &str) -> StakeResult<()> {
        self.transact(|engine| ica_dispatch::on_chan_open_ack(engine, port_id, channel_id, address))
    }

    /// Handles the host starting to close an interchain account channel.
    pub fn chan_close_init(&mut self, port_id: &str, channel_id: &str) -> StakeResult<()> {
        self.transact(|engine| ica_dispatch::on_chan_close_init(engine, port_id, channel_id))
    }

    /// Handles an interchain account channel finishing to close.
    pub fn chan_close_confirm(&mut self, port_id: &str, channel_id: &str) -> StakeResult<()> {
        self.transact(|engine| ica_dispatch::on_chan_close_confirm(engine, port_id, channel_id))
    }

    /// Credits a token transfer received from a host over `channel_id`.
    ///
    /// The receiver is credited with the voucher of `base_denom` and the voucher's trace is
    /// recorded. Returns the voucher denom.
    pub fn recv_transfer(
        &mut self,
        channel_id: &str,
        base_denom: &str,
        receiver: &str,
        amount: Amount,
    ) -> StakeResult<String> {
        self.transact(|engine| {
            let denom = bank::set_denom_trace(
                &mut engine.store,
                &DenomTrace::single_hop(channel_id, base_denom),
            )?;
            bank::mint(&mut engine.store, receiver, &Coin::new(&denom, amount))?;

            debug!(%channel_id, %denom, %receiver, %amount, "received transfer");
            Ok(denom)
        })
    }
}

impl IcaHost for Engine {
    type Error = StakeError;

    fn store(&self) -> &KvStore {
        &self.store
    }

    fn store_mut(&mut self) -> &mut KvStore {
        &mut self.store
    }

    fn block(&self) -> BlockInfo {
        self.block
    }

    fn channel_config(&self) -> &ChannelSMCfg {
        &self.channel_cfg
    }

    fn ack_callback(&self, callback_id: &str) -> Option<AckCallback<Self>> {
        self.ack_callbacks.get(callback_id)
    }

    fn emit_packet(&mut self, packet: OutboundPacket) {
        self.outbox.packets.push(packet);
    }

    fn emit_channel_duty(&mut self, duty: ChannelDuty) {
        self.outbox.channel_duties.push(duty);
    }

    fn route_signal(&mut self, signal: Signal) -> StakeResult<()> {
        admin::handle_channel_signal(self, signal)
    }
}

impl QueryHost for Engine {
    type Error = StakeError;

    fn store(&self) -> &KvStore {
        &self.store
    }

    fn store_mut(&mut self) -> &mut KvStore {
        &mut self.store
    }

    fn block(&self) -> BlockInfo {
        self.block
    }

    fn light_client(&self) -> &dyn LightClient {
        &self.clients
    }

    fn query_callback(&self, module: &str, callback_id: &str) -> Option<QueryCallback<Self>> {
        self.query_callbacks.get(module, callback_id)
    }

    fn emit_query_request(&mut self, request: QueryRequest) {
        self.outbox.query_requests.push(request);
    }

    fn transact<T, F>(&mut self, f: F) -> StakeResult<T>
    where
        F: FnOnce(&mut Self) -> StakeResult<T>,
    {
        Engine::transact(self, f)
    }
}

#[cfg(test)]
mod tests {
    use liquid_stake_records::{DepositRecordStatus, RecordStore};

    use super::*;
    use crate::{
        epochs::{current_epoch, EpochIdentifier},
        testing::{TestEnv, USER, ZONE},
    };

    #[test]
    fn test_failed_message_leaves_no_trace() {
        let mut env = TestEnv::new();
        env.fund(USER, 50);

        let err = env.liquid_stake(USER, 100).unwrap_err();
        assert!(matches!(
            err,
            StakeError::InsufficientFunds {
                needed: 100,
                available: 50,
                ..
            }
        ));

        assert_eq!(env.st_balance(USER), 0);
        let epoch = current_epoch(env.engine.store(), EpochIdentifier::StrideEpoch).unwrap();
        let record = env
            .engine
            .store()
            .get_transfer_deposit_record(ZONE, epoch)
            .unwrap()
            .expect("record must exist");
        assert_eq!(record.status, DepositRecordStatus::TransferQueue);
        assert_eq!(record.amount, 0);
        assert!(env.engine.take_outbox().is_empty());
    }

    #[test]
    fn test_rolled_back_transaction_drops_its_writes_and_events() {
        let mut env = TestEnv::new();
        let st_denom = env.zone().st_denom;

        let result: StakeResult<()> = env.engine.transact(|engine| {
            bank::mint(engine.store_mut(), USER, &Coin::new(&st_denom, 10))?;
            engine.emit(StakeEvent::HostZoneResumed {
                zone: ZONE.to_string(),
            });
            Err(StakeError::validation("abort"))
        });

        assert!(result.is_err());
        assert_eq!(env.st_balance(USER), 0);
        assert!(env.engine.events().is_empty());
    }

    #[test]
    fn test_blocks_only_move_forward() {
        let mut env = TestEnv::new();
        env.next_block();
        let current = env.engine.block();

        let earlier = BlockInfo::new(current.height + 1, current.time - 1);
        assert!(matches!(env.engine.begin_block(earlier), Err(StakeError::Validation(_))));

        let same_height = BlockInfo::new(current.height, current.time + 1);
        assert!(env.engine.begin_block(same_height).is_err());
        assert_eq!(env.engine.block(), current);
    }
}
