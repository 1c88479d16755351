//! One-byte prefixes that separate the logical tables.

/// The table a key belongs to. The discriminant is the first byte of every key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TablePrefix {
    /// Deposit records, keyed by id.
    DepositRecord = 0x01,
    /// User redemption records, keyed by `{zone, epoch, receiver}`.
    UserRedemption = 0x02,
    /// Host zone unbondings, keyed by `{epoch, zone}`.
    HostZoneUnbonding = 0x03,
    /// Validators, keyed by `{zone, operator address}`.
    Validator = 0x04,
    /// Host zones, keyed by chain id.
    HostZone = 0x05,
    /// Pending remote queries, keyed by query id.
    Query = 0x06,
    /// Latest response per remote query id.
    DataPoint = 0x07,
    /// Epoch trackers, keyed by identifier.
    EpochTracker = 0x08,
    /// Trade routes, keyed by `{reward denom, host denom}`.
    TradeRoute = 0x09,
    /// LSM token deposits, keyed by `{zone, denom, deposit id}`.
    LsmDeposit = 0x0A,
    /// Ack callback data, keyed by `{port, channel, sequence}`.
    CallbackData = 0x0B,
    /// ICA channel state, keyed by owner.
    Channel = 0x0C,
    /// Next send sequence per channel.
    Sequence = 0x0D,
    /// Controller-side account balances, keyed by `{address, denom}`.
    Balance = 0x0E,
    /// Controller-side token supply, keyed by denom.
    Supply = 0x0F,
    /// Monotonic counters, keyed by name.
    Counter = 0x10,
    /// IBC denom traces, keyed by hash denom.
    DenomTrace = 0x11,
}

impl TablePrefix {
    /// Returns the prefix byte.
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Returns `body` with the prefix byte in front.
    pub fn prepend(self, body: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(body.len() + 1);
        key.push(self.byte());
        key.extend_from_slice(body);
        key
    }
}
