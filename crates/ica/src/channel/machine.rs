//! The Channel State Machine (CSM).
//!
//! Responsible for tracking whether an interchain account can be used, and for telling the owner
//! of the account when its address is bound or its channel is lost.

use serde::{Deserialize, Serialize};

use crate::{
    account::{parse_owner, port_id, IcaAccountType},
    channel::{
        config::ChannelSMCfg,
        duties::ChannelDuty,
        errors::{ChannelError, ChannelResult},
        events::ChannelEvent,
        state::ChannelState,
    },
    errors::IcaResult,
    signals::{ChannelSignal, ChannelToRegistry},
};

/// Identity of the account a channel state machine tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSMCtx {
    /// Owner string of the account.
    pub owner: String,

    /// Connection the account lives on.
    pub connection_id: String,

    /// The account slot parsed from the owner.
    pub account_type: IcaAccountType,
}

/// The State Machine that tracks the channel of one interchain account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSM {
    /// Context associated with this instance.
    pub context: ChannelSMCtx,
    /// The current state.
    pub state: ChannelState,
}

/// What a transition asks of the outside world.
///
/// Duties go to the relayer, signals to the owner of the account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelOutput {
    /// Handshakes the relayer has to start.
    pub duties: Vec<ChannelDuty>,
    /// Notices for the host zone registry.
    pub signals: Vec<ChannelSignal>,
}

impl ChannelOutput {
    fn duty(duty: ChannelDuty) -> Self {
        Self {
            duties: vec![duty],
            signals: Vec::new(),
        }
    }

    fn signal(signal: ChannelToRegistry) -> Self {
        Self {
            duties: Vec::new(),
            signals: vec![ChannelSignal::ToRegistry(signal)],
        }
    }

    /// Returns `true` if the transition asks for nothing.
    pub fn is_empty(&self) -> bool {
        self.duties.is_empty() && self.signals.is_empty()
    }
}

impl ChannelSM {
    /// Creates a state machine for `owner` in [`ChannelState::Closed`].
    pub fn new(owner: impl Into<String>, connection_id: impl Into<String>) -> IcaResult<Self> {
        let owner = owner.into();
        let (_, account_type) = parse_owner(&owner)?;

        Ok(ChannelSM {
            context: ChannelSMCtx {
                owner,
                connection_id: connection_id.into(),
                account_type,
            },
            state: ChannelState::new(),
        })
    }

    /// Returns a reference to the context.
    pub const fn context(&self) -> &ChannelSMCtx {
        &self.context
    }

    /// Returns a reference to the current state.
    pub const fn state(&self) -> &ChannelState {
        &self.state
    }

    /// The controller port of the account.
    pub fn port_id(&self) -> String {
        port_id(&self.context.owner)
    }

    /// Applies `event`. A refused event leaves the state untouched.
    pub fn process_event(
        &mut self,
        cfg: &ChannelSMCfg,
        event: ChannelEvent,
    ) -> ChannelResult<ChannelOutput> {
        match event {
            ChannelEvent::OpenInit => self.process_open_init(cfg),
            ChannelEvent::OpenAck {
                channel_id,
                address,
            } => self.process_open_ack(channel_id, address),
            ChannelEvent::PacketTimeout { channel_id } => {
                self.process_close(channel_id, "PacketTimeout")
            }
            ChannelEvent::CloseInit { channel_id } => self.process_close_init(channel_id),
            ChannelEvent::CloseConfirm { channel_id } => {
                self.process_close(channel_id, "CloseConfirm")
            }
        }
    }

    /// The account address while the channel is open.
    pub fn address(&self) -> Option<&str> {
        match &self.state {
            ChannelState::Open { address, .. } => Some(address),
            _ => None,
        }
    }

    fn process_open_init(&mut self, cfg: &ChannelSMCfg) -> ChannelResult<ChannelOutput> {
        match &self.state {
            ChannelState::Closed { .. } => {
                self.state = ChannelState::Opening;

                Ok(ChannelOutput::duty(ChannelDuty::OpenChannel {
                    owner: self.context.owner.clone(),
                    port_id: self.port_id(),
                    connection_id: self.context.connection_id.clone(),
                    version: cfg.version.clone(),
                }))
            }
            ChannelState::Opening => Err(ChannelError::Duplicate {
                state: self.state.to_string(),
                event: ChannelEvent::OpenInit.to_string(),
            }),
            ChannelState::Open { .. } | ChannelState::Closing { .. } => {
                Err(ChannelError::Rejected {
                    state: self.state.clone(),
                    reason: "channel must be closed before it can be reopened".to_string(),
                })
            }
        }
    }

    fn process_open_ack(&mut self, channel_id: String, address: String) -> ChannelResult<ChannelOutput> {
        match &self.state {
            ChannelState::Opening => {
                let signal = ChannelToRegistry::AccountBound {
                    owner: self.context.owner.clone(),
                    account_type: self.context.account_type,
                    channel_id: channel_id.clone(),
                    address: address.clone(),
                };

                self.state = ChannelState::Open {
                    channel_id,
                    address,
                };

                Ok(ChannelOutput::signal(signal))
            }
            ChannelState::Open {
                channel_id: open, ..
            } if *open == channel_id => Err(ChannelError::Duplicate {
                state: self.state.to_string(),
                event: ChannelEvent::OpenAck {
                    channel_id,
                    address,
                }
                .to_string(),
            }),
            _ => Err(ChannelError::InvalidEvent {
                state: self.state.to_string(),
                event: ChannelEvent::OpenAck {
                    channel_id,
                    address,
                }
                .to_string(),
                reason: Some("no handshake in progress".to_string()),
            }),
        }
    }

    fn process_close_init(&mut self, channel_id: String) -> ChannelResult<ChannelOutput> {
        match &self.state {
            ChannelState::Open {
                channel_id: open, ..
            } if *open == channel_id => {
                self.state = ChannelState::Closing { channel_id };
                Ok(ChannelOutput::default())
            }
            ChannelState::Closing { channel_id: closing } if *closing == channel_id => {
                Err(ChannelError::Duplicate {
                    state: self.state.to_string(),
                    event: ChannelEvent::CloseInit { channel_id }.to_string(),
                })
            }
            _ => Err(ChannelError::Rejected {
                state: self.state.clone(),
                reason: format!("{channel_id} is not the open channel"),
            }),
        }
    }

    fn process_close(&mut self, channel_id: String, event: &str) -> ChannelResult<ChannelOutput> {
        let current = match &self.state {
            ChannelState::Open {
                channel_id: current,
                ..
            }
            | ChannelState::Closing {
                channel_id: current,
            } => current,
            ChannelState::Closed {
                last_channel_id: Some(last),
            } if *last == channel_id => {
                return Err(ChannelError::Duplicate {
                    state: self.state.to_string(),
                    event: format!("{event}({channel_id})"),
                });
            }
            _ => {
                return Err(ChannelError::InvalidEvent {
                    state: self.state.to_string(),
                    event: format!("{event}({channel_id})"),
                    reason: Some("channel is not open".to_string()),
                });
            }
        };

        if *current != channel_id {
            return Err(ChannelError::Rejected {
                state: self.state.clone(),
                reason: format!("{channel_id} is not the current channel"),
            });
        }

        self.state = ChannelState::Closed {
            last_channel_id: Some(channel_id),
        };

        Ok(ChannelOutput::signal(ChannelToRegistry::AccountClosed {
            owner: self.context.owner.clone(),
            account_type: self.context.account_type,
        }))
    }
}
