//! Registry of ack callbacks and the data persisted for each sent packet.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    host::IcaHost,
    packet::{AckResponse, PacketId},
};

/// A function run with the outcome of a packet.
///
/// Receives the host, the packet, the decoded outcome and the arguments stored at send time.
pub type AckCallback<H> =
    fn(&mut H, &PacketId, &AckResponse, &[u8]) -> Result<(), <H as IcaHost>::Error>;

/// Ack callbacks keyed by callback id.
///
/// Populated once at construction and read-only afterwards.
pub struct AckCallbacks<H: IcaHost> {
    callbacks: BTreeMap<&'static str, AckCallback<H>>,
}

impl<H: IcaHost> AckCallbacks<H> {
    /// Creates an empty registry.
    pub const fn new() -> Self {
        Self {
            callbacks: BTreeMap::new(),
        }
    }

    /// Registers a callback under `id`.
    pub fn with(mut self, id: &'static str, callback: AckCallback<H>) -> Self {
        self.callbacks.insert(id, callback);
        self
    }

    /// Looks up a callback.
    pub fn get(&self, id: &str) -> Option<AckCallback<H>> {
        self.callbacks.get(id).copied()
    }
}

impl<H: IcaHost> Default for AckCallbacks<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: IcaHost> fmt::Debug for AckCallbacks<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckCallbacks")
            .field("callbacks", &self.callbacks.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// What to run when the packet under `packet` is acknowledged or times out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackData {
    /// The packet.
    pub packet: PacketId,

    /// The callback to run.
    pub callback_id: String,

    /// Arguments handed to the callback.
    pub callback_args: Vec<u8>,
}
