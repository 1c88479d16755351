//! Row specs for the dispatch tables.

use liquid_stake_db::{KVRowSpec, TablePrefix};

use crate::{callbacks::CallbackData, channel::ChannelSM};

/// ZST for the ack callback data row spec, keyed by `(port, channel, sequence)`.
#[derive(Debug)]
pub struct CallbackDataRowSpec;

impl KVRowSpec for CallbackDataRowSpec {
    const PREFIX: TablePrefix = TablePrefix::CallbackData;
    type Key = (String, String, u64);
    type Value = CallbackData;
}

/// ZST for the channel state machine row spec, keyed by owner.
#[derive(Debug)]
pub struct ChannelRowSpec;

impl KVRowSpec for ChannelRowSpec {
    const PREFIX: TablePrefix = TablePrefix::Channel;
    type Key = String;
    type Value = ChannelSM;
}

/// ZST for the next send sequence of a channel, keyed by `(port, channel)`.
#[derive(Debug)]
pub struct SequenceRowSpec;

impl KVRowSpec for SequenceRowSpec {
    const PREFIX: TablePrefix = TablePrefix::Sequence;
    type Key = (String, String);
    type Value = u64;
}
