use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::logger::player::LogPlayer;

/// Global control-loop clock used to align every subsystem's records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleNumber(pub u64);

pub const CYCLE_MS: u64 = 20;

impl CycleNumber {
    pub fn new() -> Self {
        CycleNumber(0)
    }

    pub fn next(&self) -> Self {
        CycleNumber(self.0 + 1)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CycleNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CycleNumber {
    fn from(value: u64) -> Self {
        CycleNumber(value)
    }
}

/// Monotonic microsecond time source.
///
/// Implementations never go backwards. Clock rollback is not handled by any
/// consumer in this crate.
pub trait TimeSource: Send + Sync {
    fn now_micros(&self) -> u64;
}

/// Wall-clock independent monotonic clock, zeroed at construction.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Externally driven clock. Used for simulated runs and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_micros: u64) -> Self {
        Self {
            now: AtomicU64::new(start_micros),
        }
    }

    pub fn set(&self, micros: u64) {
        self.now.store(micros, Ordering::SeqCst);
    }

    pub fn advance(&self, micros: u64) {
        self.now.fetch_add(micros, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now_micros(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Reproduces the timestamps recorded alongside each cycle of a log.
///
/// `seek` selects the cycle; `now_micros` then returns that cycle's recorded
/// timestamp. Before the first successful seek it reads as zero.
#[derive(Debug)]
pub struct ReplayClock {
    player: Arc<LogPlayer>,
    current: AtomicU64,
}

impl ReplayClock {
    pub fn new(player: Arc<LogPlayer>) -> Self {
        Self {
            player,
            current: AtomicU64::new(0),
        }
    }

    /// Moves to `cycle`. Returns the recorded timestamp, or `None` when the
    /// log holds no marker for that cycle.
    pub fn seek(&self, cycle: CycleNumber) -> Option<u64> {
        let ts = self.player.timestamp_at(cycle)?;
        self.current.store(ts, Ordering::SeqCst);
        Some(ts)
    }
}

impl TimeSource for ReplayClock {
    fn now_micros(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}
