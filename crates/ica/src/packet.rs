//! Packet envelopes and acknowledgements.

use std::fmt;

use liquid_stake_primitives::{coin::Coin, types::Timestamp};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{IcaError, IcaResult},
    msgs::{HostMsg, MsgResponse},
};

/// Port used for token transfers.
pub const TRANSFER_PORT: &str = "transfer";

/// Identifies a packet sent by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PacketId {
    /// Source port.
    pub port_id: String,

    /// Source channel.
    pub channel_id: String,

    /// Send sequence on the channel.
    pub sequence: u64,
}

impl PacketId {
    /// Creates a new packet id.
    pub fn new(port_id: impl Into<String>, channel_id: impl Into<String>, sequence: u64) -> Self {
        Self {
            port_id: port_id.into(),
            channel_id: channel_id.into(),
            sequence,
        }
    }

    /// Returns `true` if the packet is a token transfer rather than an ICA tx.
    pub fn is_transfer(&self) -> bool {
        self.port_id == TRANSFER_PORT
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.port_id, self.channel_id, self.sequence)
    }
}

/// The only ICA packet type the controller sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IcaPacketType {
    /// Execute the encoded messages as one transaction.
    ExecuteTx,
}

/// Payload of an ICA packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcaPacketData {
    /// Always [`IcaPacketType::ExecuteTx`].
    #[serde(rename = "type")]
    pub packet_type: IcaPacketType,

    /// The encoded messages.
    pub data: Vec<u8>,

    /// Free-form memo.
    pub memo: String,
}

impl IcaPacketData {
    /// Encodes `msgs` into an execute-tx envelope.
    pub fn execute_tx(msgs: &[HostMsg], memo: impl Into<String>) -> IcaResult<Self> {
        let data = serde_json::to_vec(msgs).map_err(|e| IcaError::Encoding(e.to_string()))?;
        Ok(Self {
            packet_type: IcaPacketType::ExecuteTx,
            data,
            memo: memo.into(),
        })
    }

    /// Decodes the messages carried by the envelope.
    pub fn msgs(&self) -> IcaResult<Vec<HostMsg>> {
        serde_json::from_slice(&self.data).map_err(|e| IcaError::Encoding(e.to_string()))
    }
}

/// Payload of a token transfer packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPacketData {
    /// Denom as seen by the sender.
    pub denom: String,

    /// Amount as a decimal string.
    pub amount: String,

    /// Sender on the controller.
    pub sender: String,

    /// Receiver on the counterparty.
    pub receiver: String,

    /// Free-form memo.
    pub memo: String,
}

impl TransferPacketData {
    /// Creates a transfer payload for `token`.
    pub fn new(token: &Coin, sender: &str, receiver: &str, memo: &str) -> Self {
        Self {
            denom: token.denom.clone(),
            amount: token.amount.to_string(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            memo: memo.to_string(),
        }
    }
}

/// The body of an outbound packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketPayload {
    /// A transaction for an interchain account.
    Ica(IcaPacketData),
    /// A token transfer.
    Transfer(TransferPacketData),
}

/// A packet handed to the relayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundPacket {
    /// The packet's identity.
    pub id: PacketId,

    /// Connection the channel runs over.
    pub connection_id: String,

    /// Absolute timeout in unix nanos.
    pub timeout_timestamp: Timestamp,

    /// The body.
    pub payload: PacketPayload,
}

/// An acknowledgement written by the counterparty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Acknowledgement {
    /// The packet executed. For ICA packets the bytes encode the message responses.
    Result(Vec<u8>),
    /// The packet failed.
    Error(String),
}

impl Acknowledgement {
    /// A successful acknowledgement carrying `responses`.
    pub fn success(responses: &[MsgResponse]) -> IcaResult<Self> {
        let bytes =
            serde_json::to_vec(responses).map_err(|e| IcaError::Encoding(e.to_string()))?;
        Ok(Acknowledgement::Result(bytes))
    }
}

/// How a packet ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckStatus {
    /// Every message executed.
    Success,
    /// The counterparty returned an error acknowledgement.
    Failure,
    /// The packet timed out.
    Timeout,
}

/// The decoded outcome of a packet, as handed to ack callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckResponse {
    /// How the packet ended.
    pub status: AckStatus,

    /// One response per message on success, empty otherwise.
    pub msg_responses: Vec<MsgResponse>,

    /// The error string of a failed acknowledgement.
    pub error: Option<String>,
}

impl AckResponse {
    /// Decodes an acknowledgement for the packet `id`.
    ///
    /// Transfer acknowledgements carry no message responses. An ICA result that cannot be
    /// decoded is an error.
    pub fn from_ack(id: &PacketId, ack: &Acknowledgement) -> IcaResult<Self> {
        match ack {
            Acknowledgement::Result(bytes) => {
                let msg_responses = if id.is_transfer() || bytes.is_empty() {
                    Vec::new()
                } else {
                    serde_json::from_slice(bytes).map_err(|e| IcaError::Encoding(e.to_string()))?
                };

                Ok(Self {
                    status: AckStatus::Success,
                    msg_responses,
                    error: None,
                })
            }
            Acknowledgement::Error(error) => Ok(Self {
                status: AckStatus::Failure,
                msg_responses: Vec::new(),
                error: Some(error.clone()),
            }),
        }
    }

    /// The response handed to callbacks when a packet times out.
    pub const fn timeout() -> Self {
        Self {
            status: AckStatus::Timeout,
            msg_responses: Vec::new(),
            error: None,
        }
    }

    /// Returns `true` if every message executed.
    pub fn is_success(&self) -> bool {
        self.status == AckStatus::Success
    }
}

/// A batch of messages to send from one interchain account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcaTx {
    /// Owner of the sending account.
    pub owner: String,

    /// Connection the account lives on.
    pub connection_id: String,

    /// The messages, executed in order.
    pub msgs: Vec<HostMsg>,

    /// Absolute timeout in unix nanos.
    pub timeout_timestamp: Timestamp,

    /// Ack callback to run. Empty when no callback is needed.
    pub callback_id: String,

    /// Opaque arguments handed back to the callback.
    pub callback_args: Vec<u8>,

    /// Largest number of messages one packet may carry.
    pub max_messages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_tx_envelope() {
        let msgs = vec![HostMsg::SetWithdrawAddress {
            delegator_address: "cosmos1d".to_string(),
            withdraw_address: "cosmos1w".to_string(),
        }];
        let packet = IcaPacketData::execute_tx(&msgs, "").unwrap();

        let json = serde_json::to_string(&packet).unwrap();
        assert!(json.contains("\"type\":\"EXECUTE_TX\""));
        assert_eq!(packet.msgs().unwrap(), msgs);
    }

    #[test]
    fn test_ack_decoding() {
        let ica = PacketId::new("icacontroller-cosmoshub-4.DELEGATION", "channel-1", 3);
        let ack = Acknowledgement::success(&[MsgResponse::Undelegate {
            completion_time: 7,
        }])
        .unwrap();

        let response = AckResponse::from_ack(&ica, &ack).unwrap();
        assert!(response.is_success());
        assert_eq!(response.msg_responses.len(), 1);

        let transfer = PacketId::new(TRANSFER_PORT, "channel-0", 1);
        let response = AckResponse::from_ack(&transfer, &Acknowledgement::Result(vec![1]))
            .unwrap();
        assert!(response.is_success());
        assert!(response.msg_responses.is_empty());

        let failed =
            AckResponse::from_ack(&ica, &Acknowledgement::Error("out of gas".to_string()))
                .unwrap();
        assert_eq!(failed.status, AckStatus::Failure);
        assert_eq!(failed.error.as_deref(), Some("out of gas"));

        assert!(AckResponse::from_ack(&ica, &Acknowledgement::Result(vec![0xff])).is_err());
    }
}
