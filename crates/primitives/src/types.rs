//! Common type aliases and small value types shared across the workspace.

use serde::{Deserialize, Serialize};

/// The number of an epoch as tracked by an epoch tracker.
pub type EpochNumber = u64;

/// Height of a block on either the controller chain or a host chain.
pub type BlockHeight = u64;

/// Unix timestamp in nanoseconds.
pub type Timestamp = u64;

/// An integer token amount.
pub type Amount = u128;

/// Number of nanoseconds in a second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Number of nanoseconds in a minute.
pub const NANOS_PER_MINUTE: u64 = 60 * NANOS_PER_SEC;

/// Number of nanoseconds in an hour.
pub const NANOS_PER_HOUR: u64 = 60 * NANOS_PER_MINUTE;

/// Number of nanoseconds in a day.
pub const NANOS_PER_DAY: u64 = 24 * NANOS_PER_HOUR;

/// Header information of the block currently being executed on the controller chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockInfo {
    /// The height of the block.
    pub height: BlockHeight,

    /// The block time in unix nanoseconds.
    pub time: Timestamp,
}

impl BlockInfo {
    /// Creates a new [`BlockInfo`].
    pub const fn new(height: BlockHeight, time: Timestamp) -> Self {
        Self { height, time }
    }

    /// Returns the block that follows this one, `block_time` nanoseconds later.
    pub const fn next(&self, block_time: u64) -> Self {
        Self {
            height: self.height + 1,
            time: self.time + block_time,
        }
    }
}
