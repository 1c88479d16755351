//! Sending packets, channel lifecycle and acknowledgement routing.

use liquid_stake_db::KvStore;
use liquid_stake_primitives::{coin::Coin, types::Timestamp};
use tracing::{debug, info, warn};

use crate::{
    account::owner_from_port,
    callbacks::CallbackData,
    channel::{ChannelError, ChannelEvent, ChannelOutput, ChannelSM},
    errors::{IcaError, IcaResult},
    host::IcaHost,
    packet::{
        AckResponse, Acknowledgement, IcaPacketData, IcaTx, OutboundPacket, PacketId,
        PacketPayload, TransferPacketData, TRANSFER_PORT,
    },
    row_spec::{CallbackDataRowSpec, ChannelRowSpec, SequenceRowSpec},
};

/// An outbound token transfer from the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Transfer channel to send on.
    pub channel_id: String,

    /// Connection the channel runs over.
    pub connection_id: String,

    /// The token, in its controller-side denom.
    pub token: Coin,

    /// Sender on the controller.
    pub sender: String,

    /// Receiver on the counterparty.
    pub receiver: String,

    /// Absolute timeout in unix nanos.
    pub timeout_timestamp: Timestamp,

    /// Ack callback to run. Empty when no callback is needed.
    pub callback_id: String,

    /// Opaque arguments handed back to the callback.
    pub callback_args: Vec<u8>,
}

/// Reads the channel state machine of `owner`.
pub fn get_channel(store: &KvStore, owner: &str) -> IcaResult<Option<ChannelSM>> {
    Ok(store.get_row::<ChannelRowSpec>(&owner.to_string())?)
}

/// Reads the callback data stored for a packet.
pub fn get_callback_data(store: &KvStore, packet: &PacketId) -> IcaResult<Option<CallbackData>> {
    Ok(store.get_row::<CallbackDataRowSpec>(&callback_key(packet))?)
}

fn callback_key(packet: &PacketId) -> (String, String, u64) {
    (
        packet.port_id.clone(),
        packet.channel_id.clone(),
        packet.sequence,
    )
}

fn next_sequence(store: &mut KvStore, port_id: &str, channel_id: &str) -> IcaResult<u64> {
    let key = (port_id.to_string(), channel_id.to_string());
    let sequence = store.get_row::<SequenceRowSpec>(&key)?.unwrap_or(1);
    store.put_row::<SequenceRowSpec>(&key, &(sequence + 1))?;
    Ok(sequence)
}

/// Feeds `event` to the channel of `sm`, persists the result and hands its output on.
fn apply_channel_event<H: IcaHost>(
    host: &mut H,
    mut sm: ChannelSM,
    event: ChannelEvent,
) -> Result<(), H::Error> {
    let cfg = host.channel_config().clone();
    let output: ChannelOutput = sm.process_event(&cfg, event).map_err(IcaError::from)?;

    host.store_mut()
        .put_row::<ChannelRowSpec>(&sm.context.owner, &sm)
        .map_err(IcaError::from)?;

    debug!(owner = %sm.context.owner, state = %sm.state, "channel transitioned");

    for duty in output.duties {
        host.emit_channel_duty(duty);
    }
    for signal in output.signals {
        host.route_signal(signal.into())?;
    }

    Ok(())
}

/// Registers a new interchain account and starts its channel handshake.
pub fn register_account<H: IcaHost>(
    host: &mut H,
    owner: &str,
    connection_id: &str,
) -> Result<(), H::Error> {
    let sm = match get_channel(host.store(), owner)? {
        Some(sm) => sm,
        None => ChannelSM::new(owner, connection_id)?,
    };

    info!(%owner, %connection_id, "registering interchain account");
    apply_channel_event(host, sm, ChannelEvent::OpenInit)
}

/// Reopens the closed channel of an existing account under the same owner.
pub fn restore_channel<H: IcaHost>(host: &mut H, owner: &str) -> Result<(), H::Error> {
    let sm = get_channel(host.store(), owner)?
        .ok_or_else(|| IcaError::UnknownChannel(owner.to_string()))?;

    info!(%owner, "restoring interchain account channel");
    apply_channel_event(host, sm, ChannelEvent::OpenInit)
}

fn channel_for_port(store: &KvStore, port_id: &str) -> IcaResult<ChannelSM> {
    let owner = owner_from_port(port_id)?;
    get_channel(store, owner)?.ok_or_else(|| IcaError::UnknownChannel(owner.to_string()))
}

/// Handles the open-ack of an account's channel, binding the reported address.
pub fn on_chan_open_ack<H: IcaHost>(
    host: &mut H,
    port_id: &str,
    channel_id: &str,
    address: &str,
) -> Result<(), H::Error> {
    let sm = channel_for_port(host.store(), port_id)?;
    apply_channel_event(
        host,
        sm,
        ChannelEvent::OpenAck {
            channel_id: channel_id.to_string(),
            address: address.to_string(),
        },
    )
}

/// Handles the host starting to close an account's channel.
pub fn on_chan_close_init<H: IcaHost>(
    host: &mut H,
    port_id: &str,
    channel_id: &str,
) -> Result<(), H::Error> {
    let sm = channel_for_port(host.store(), port_id)?;
    apply_channel_event(
        host,
        sm,
        ChannelEvent::CloseInit {
            channel_id: channel_id.to_string(),
        },
    )
}

/// Handles an account's channel finishing to close.
pub fn on_chan_close_confirm<H: IcaHost>(
    host: &mut H,
    port_id: &str,
    channel_id: &str,
) -> Result<(), H::Error> {
    let sm = channel_for_port(host.store(), port_id)?;
    apply_channel_event(
        host,
        sm,
        ChannelEvent::CloseConfirm {
            channel_id: channel_id.to_string(),
        },
    )
}

/// Sends `tx` as exactly one packet and returns its sequence.
///
/// Fails with [`IcaError::ChunkOverflow`] if the tx carries more than `tx.max_messages`
/// messages. Nothing is written in that case.
pub fn submit_txs<H: IcaHost>(host: &mut H, tx: IcaTx) -> Result<u64, H::Error> {
    if tx.msgs.is_empty() {
        return Err(IcaError::EmptyTx(tx.owner).into());
    }
    if tx.msgs.len() > tx.max_messages {
        return Err(IcaError::ChunkOverflow {
            count: tx.msgs.len(),
            max: tx.max_messages,
        }
        .into());
    }

    let sm = get_channel(host.store(), &tx.owner)?
        .ok_or_else(|| IcaError::UnknownChannel(tx.owner.clone()))?;
    let channel_id = sm
        .state()
        .open_channel()
        .ok_or_else(|| IcaError::ChannelNotOpen(tx.owner.clone()))?
        .to_string();
    let port_id = sm.port_id();

    let data = IcaPacketData::execute_tx(&tx.msgs, "")?;
    let sequence = next_sequence(host.store_mut(), &port_id, &channel_id)?;
    let id = PacketId::new(port_id, channel_id, sequence);

    if !tx.callback_id.is_empty() {
        let callback = CallbackData {
            packet: id.clone(),
            callback_id: tx.callback_id.clone(),
            callback_args: tx.callback_args,
        };
        host.store_mut()
            .put_row::<CallbackDataRowSpec>(&callback_key(&id), &callback)
            .map_err(IcaError::from)?;
    }

    info!(
        owner = %tx.owner,
        channel = %id.channel_id,
        %sequence,
        msgs = %tx.msgs.len(),
        callback = %tx.callback_id,
        "submitted ica tx"
    );

    host.emit_packet(OutboundPacket {
        id,
        connection_id: tx.connection_id,
        timeout_timestamp: tx.timeout_timestamp,
        payload: PacketPayload::Ica(data),
    });

    Ok(sequence)
}

/// Sends `tx` as one packet per chunk of at most `tx.max_messages` messages.
///
/// Every chunk carries the same callback and arguments.
pub fn submit_chunked<H: IcaHost>(host: &mut H, tx: IcaTx) -> Result<Vec<u64>, H::Error> {
    let chunk_size = tx.max_messages.max(1);
    let mut sequences = Vec::new();

    for chunk in tx.msgs.chunks(chunk_size) {
        let sequence = submit_txs(
            host,
            IcaTx {
                msgs: chunk.to_vec(),
                owner: tx.owner.clone(),
                connection_id: tx.connection_id.clone(),
                timeout_timestamp: tx.timeout_timestamp,
                callback_id: tx.callback_id.clone(),
                callback_args: tx.callback_args.clone(),
                max_messages: chunk_size,
            },
        )?;
        sequences.push(sequence);
    }

    Ok(sequences)
}

/// Sends a token transfer from the controller and returns its sequence.
pub fn send_transfer<H: IcaHost>(host: &mut H, req: TransferRequest) -> Result<u64, H::Error> {
    let sequence = next_sequence(host.store_mut(), TRANSFER_PORT, &req.channel_id)?;
    let id = PacketId::new(TRANSFER_PORT, req.channel_id.clone(), sequence);

    if !req.callback_id.is_empty() {
        let callback = CallbackData {
            packet: id.clone(),
            callback_id: req.callback_id.clone(),
            callback_args: req.callback_args,
        };
        host.store_mut()
            .put_row::<CallbackDataRowSpec>(&callback_key(&id), &callback)
            .map_err(IcaError::from)?;
    }

    info!(
        channel = %req.channel_id,
        %sequence,
        token = %req.token,
        receiver = %req.receiver,
        "sent transfer"
    );

    host.emit_packet(OutboundPacket {
        id,
        connection_id: req.connection_id,
        timeout_timestamp: req.timeout_timestamp,
        payload: PacketPayload::Transfer(TransferPacketData::new(
            &req.token,
            &req.sender,
            &req.receiver,
            "",
        )),
    });

    Ok(sequence)
}

fn run_callback<H: IcaHost>(
    host: &mut H,
    packet: &PacketId,
    response: &AckResponse,
) -> Result<(), H::Error> {
    let Some(data) = get_callback_data(host.store(), packet)? else {
        debug!(port = %packet.port_id, sequence = %packet.sequence, "no callback for packet");
        return Ok(());
    };

    host.store_mut()
        .delete_row::<CallbackDataRowSpec>(&callback_key(packet))
        .map_err(IcaError::from)?;

    let callback = host
        .ack_callback(&data.callback_id)
        .ok_or_else(|| IcaError::UnknownCallback(data.callback_id.clone()))?;

    callback(host, packet, response, &data.callback_args)
}

/// Routes the acknowledgement of `packet` to its callback.
pub fn on_acknowledgement<H: IcaHost>(
    host: &mut H,
    packet: &PacketId,
    ack: &Acknowledgement,
) -> Result<(), H::Error> {
    let response = AckResponse::from_ack(packet, ack)?;

    if let Some(error) = &response.error {
        warn!(port = %packet.port_id, sequence = %packet.sequence, %error, "packet failed");
    }

    run_callback(host, packet, &response)
}

/// Handles the timeout of `packet`.
///
/// Interchain account channels are ordered, so the channel closes before the callback runs.
pub fn on_timeout<H: IcaHost>(host: &mut H, packet: &PacketId) -> Result<(), H::Error> {
    warn!(port = %packet.port_id, sequence = %packet.sequence, "packet timed out");

    if !packet.is_transfer() {
        let sm = channel_for_port(host.store(), &packet.port_id)?;
        let event = ChannelEvent::PacketTimeout {
            channel_id: packet.channel_id.clone(),
        };

        match apply_channel_event(host, sm, event) {
            Ok(()) => {}
            Err(err) => {
                // a channel only closes once; later timeouts on it just run their callbacks
                let closed = get_channel(host.store(), owner_from_port(&packet.port_id)?)?
                    .is_some_and(|sm| sm.state().open_channel() != Some(packet.channel_id.as_str()));
                if !closed {
                    return Err(err);
                }
                debug!(%err, "channel already closed");
            }
        }
    }

    run_callback(host, packet, &AckResponse::timeout())
}

/// Returns `true` if `err` only reports a repeated channel event.
pub fn is_duplicate_channel_event(err: &IcaError) -> bool {
    matches!(err, IcaError::Channel(ChannelError::Duplicate { .. }))
}
