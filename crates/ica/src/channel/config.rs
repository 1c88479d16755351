//! Static configuration of the Channel State Machine.

use serde::{Deserialize, Serialize};

/// Version string negotiated for interchain account channels.
pub const ICS27_VERSION: &str = "ics27-1";

/// Configuration shared by every channel state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSMCfg {
    /// Version proposed in the channel handshake.
    pub version: String,
}

impl Default for ChannelSMCfg {
    fn default() -> Self {
        Self {
            version: ICS27_VERSION.to_string(),
        }
    }
}
