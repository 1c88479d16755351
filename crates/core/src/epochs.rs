//! Named epochs and the hooks run at their boundaries.

use std::fmt;

use liquid_stake_db::KvStore;
use liquid_stake_params::Params;
use liquid_stake_primitives::{
    decimal::Dec,
    types::{EpochNumber, Timestamp, NANOS_PER_DAY, NANOS_PER_HOUR},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    engine::Engine,
    errors::{StakeError, StakeResult},
    row_spec::EpochTrackerRowSpec,
};

/// The named epochs. Boundaries are processed in declaration order within a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EpochIdentifier {
    /// Drives unbondings.
    Day,
    /// Tracked for external consumers.
    Hour,
    /// Tracked for external consumers.
    Mint,
    /// Drives deposits, delegations, reinvestment, sweeps and rate updates.
    StrideEpoch,
}

impl EpochIdentifier {
    /// Every identifier in processing order.
    pub const ALL: [EpochIdentifier; 4] = [
        EpochIdentifier::Day,
        EpochIdentifier::Hour,
        EpochIdentifier::Mint,
        EpochIdentifier::StrideEpoch,
    ];

    /// The identifier as stored.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EpochIdentifier::Day => "day",
            EpochIdentifier::Hour => "hour",
            EpochIdentifier::Mint => "mint",
            EpochIdentifier::StrideEpoch => "stride_epoch",
        }
    }

    /// Length of one epoch. A stride epoch is an even share of a day.
    pub fn duration(&self, params: &Params) -> u64 {
        match self {
            EpochIdentifier::Day => NANOS_PER_DAY,
            EpochIdentifier::Hour | EpochIdentifier::Mint => NANOS_PER_HOUR,
            EpochIdentifier::StrideEpoch => NANOS_PER_DAY / params.stride_epochs_per_day_epoch,
        }
    }
}

impl fmt::Display for EpochIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress of one named epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochTracker {
    /// The epoch.
    pub identifier: EpochIdentifier,

    /// Number of the current epoch. Zero until the first boundary.
    pub epoch_number: EpochNumber,

    /// Length of one epoch, in nanos.
    pub duration: u64,

    /// When the next epoch starts, in unix nanos.
    pub next_epoch_start_time: Timestamp,
}

impl EpochTracker {
    /// When the current epoch started.
    pub const fn start_time(&self) -> Timestamp {
        self.next_epoch_start_time.saturating_sub(self.duration)
    }

    /// How far into the current epoch `now` is, in `[0, 1]`.
    pub fn elapsed_share(&self, now: Timestamp) -> StakeResult<Dec> {
        let elapsed = now.saturating_sub(self.start_time()).min(self.duration);
        Ok(Dec::from_ratio(u128::from(elapsed), u128::from(self.duration))?)
    }
}

/// Reads the tracker of `identifier`.
pub fn get_epoch_tracker(
    store: &KvStore,
    identifier: EpochIdentifier,
) -> StakeResult<Option<EpochTracker>> {
    Ok(store.get_row::<EpochTrackerRowSpec>(&identifier.as_str().to_string())?)
}

/// Reads the tracker of `identifier`, failing if it does not exist.
pub fn require_epoch_tracker(
    store: &KvStore,
    identifier: EpochIdentifier,
) -> StakeResult<EpochTracker> {
    get_epoch_tracker(store, identifier)?
        .ok_or_else(|| StakeError::not_found("epoch tracker", identifier))
}

/// Writes a tracker.
pub fn set_epoch_tracker(store: &mut KvStore, tracker: &EpochTracker) -> StakeResult<()> {
    Ok(store.put_row::<EpochTrackerRowSpec>(&tracker.identifier.as_str().to_string(), tracker)?)
}

/// The number of the current epoch of `identifier`.
pub fn current_epoch(store: &KvStore, identifier: EpochIdentifier) -> StakeResult<EpochNumber> {
    Ok(require_epoch_tracker(store, identifier)?.epoch_number)
}

/// Creates every tracker so that its first epoch starts at `genesis_time`.
pub fn init_epoch_trackers(
    store: &mut KvStore,
    params: &Params,
    genesis_time: Timestamp,
) -> StakeResult<()> {
    for identifier in EpochIdentifier::ALL {
        if get_epoch_tracker(store, identifier)?.is_some() {
            continue;
        }

        set_epoch_tracker(
            store,
            &EpochTracker {
                identifier,
                epoch_number: 0,
                duration: identifier.duration(params),
                next_epoch_start_time: genesis_time,
            },
        )?;
    }

    Ok(())
}

/// A function run at an epoch boundary with the identifier and the epoch number.
pub type EpochHook = fn(&mut Engine, EpochIdentifier, EpochNumber) -> StakeResult<()>;

/// Hooks run at epoch boundaries, in registration order.
#[derive(Clone, Default)]
pub struct EpochHooks {
    before_start: Vec<EpochHook>,
    after_end: Vec<EpochHook>,
}

impl EpochHooks {
    /// Creates an empty set of hooks.
    pub const fn new() -> Self {
        Self {
            before_start: Vec::new(),
            after_end: Vec::new(),
        }
    }

    /// Registers a hook run as an epoch starts, with the new epoch's number.
    pub fn before_start(mut self, hook: EpochHook) -> Self {
        self.before_start.push(hook);
        self
    }

    /// Registers a hook run as an epoch ends, with the ending epoch's number.
    pub fn after_end(mut self, hook: EpochHook) -> Self {
        self.after_end.push(hook);
        self
    }
}

impl fmt::Debug for EpochHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpochHooks")
            .field("before_start", &self.before_start.len())
            .field("after_end", &self.after_end.len())
            .finish()
    }
}

fn run_hooks(engine: &mut Engine, hooks: &[EpochHook], identifier: EpochIdentifier, number: u64) {
    for hook in hooks {
        if let Err(err) = engine.transact(|engine| hook(engine, identifier, number)) {
            warn!(epoch = %identifier, %number, %err, "epoch hook failed");
        }
    }
}

/// Advances every tracker whose next epoch has started and runs the boundary hooks.
///
/// A tracker advances by at most one epoch per block. Each hook runs in its own transaction so
/// that a failing hook does not roll back the others.
pub fn advance_epochs(engine: &mut Engine) -> StakeResult<()> {
    let now = engine.block().time;
    let hooks = engine.epoch_hooks().clone();

    for identifier in EpochIdentifier::ALL {
        let mut tracker = require_epoch_tracker(engine.store(), identifier)?;
        if now < tracker.next_epoch_start_time {
            continue;
        }

        if tracker.epoch_number > 0 {
            run_hooks(engine, &hooks.after_end, identifier, tracker.epoch_number);
        }

        tracker.epoch_number += 1;
        tracker.next_epoch_start_time = tracker.next_epoch_start_time.saturating_add(tracker.duration);
        set_epoch_tracker(engine.store_mut(), &tracker)?;

        info!(epoch = %identifier, number = %tracker.epoch_number, "epoch started");
        run_hooks(engine, &hooks.before_start, identifier, tracker.epoch_number);
    }

    Ok(())
}

/// Timeout of packets that must land before the current stride epoch ends.
///
/// The last `1 / buffer_size` of the epoch is kept free so that late packets time out before the
/// next epoch re-queues their work.
pub fn stride_epoch_timeout(store: &KvStore, params: &Params) -> StakeResult<Timestamp> {
    let tracker = require_epoch_tracker(store, EpochIdentifier::StrideEpoch)?;
    let buffer = tracker.duration / params.buffer_size;
    Ok(tracker.next_epoch_start_time.saturating_sub(buffer))
}

/// Time left until [`stride_epoch_timeout`], or the default ICA timeout once that point has passed.
pub fn stride_epoch_query_timeout(store: &KvStore, params: &Params, now: Timestamp) -> StakeResult<u64> {
    let deadline = stride_epoch_timeout(store, params)?;
    Ok(match deadline.checked_sub(now) {
        Some(left) if left > 0 => left,
        _ => params.ica_timeout_nanos,
    })
}

/// Timeout of packets that must land before the current day epoch ends.
pub fn day_epoch_timeout(store: &KvStore) -> StakeResult<Timestamp> {
    Ok(require_epoch_tracker(store, EpochIdentifier::Day)?.next_epoch_start_time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_epochs_divide_the_day() {
        let params = Params::default();
        assert_eq!(
            EpochIdentifier::StrideEpoch.duration(&params) * params.stride_epochs_per_day_epoch,
            EpochIdentifier::Day.duration(&params)
        );
    }

    #[test]
    fn test_elapsed_share() {
        let tracker = EpochTracker {
            identifier: EpochIdentifier::StrideEpoch,
            epoch_number: 3,
            duration: 100,
            next_epoch_start_time: 1_000,
        };

        assert_eq!(tracker.start_time(), 900);
        assert_eq!(tracker.elapsed_share(900).unwrap(), Dec::ZERO);
        assert_eq!(tracker.elapsed_share(925).unwrap(), Dec::from_percent(25));
        assert_eq!(tracker.elapsed_share(2_000).unwrap(), Dec::ONE);
    }

    #[test]
    fn test_trackers_start_at_genesis() {
        let params = Params::default();
        let mut store = KvStore::new();
        init_epoch_trackers(&mut store, &params, 42).unwrap();

        for identifier in EpochIdentifier::ALL {
            let tracker = require_epoch_tracker(&store, identifier).unwrap();
            assert_eq!(tracker.epoch_number, 0);
            assert_eq!(tracker.next_epoch_start_time, 42);
        }
    }

    #[test]
    fn test_stride_epoch_timeout_keeps_a_buffer() {
        let params = Params::default();
        let mut store = KvStore::new();
        init_epoch_trackers(&mut store, &params, 0).unwrap();

        let mut tracker = require_epoch_tracker(&store, EpochIdentifier::StrideEpoch).unwrap();
        tracker.next_epoch_start_time = tracker.duration;
        set_epoch_tracker(&mut store, &tracker).unwrap();

        let timeout = stride_epoch_timeout(&store, &params).unwrap();
        assert_eq!(timeout, tracker.duration - tracker.duration / params.buffer_size);
    }
}
