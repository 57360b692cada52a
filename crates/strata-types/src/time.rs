use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Hybrid timestamp: wall-clock milliseconds plus a logical counter for
/// events stamped within the same millisecond. Total order is physical
/// time first, logical counter second.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Milliseconds since the Unix epoch.
    pub physical_ms: u64,
    /// Logical counter for events at the same physical time.
    pub logical: u32,
}

impl Timestamp {
    pub fn new(physical_ms: u64, logical: u32) -> Self {
        Self {
            physical_ms,
            logical,
        }
    }

    /// Current wall-clock time with a zero logical counter.
    pub fn now() -> Self {
        let physical_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            physical_ms,
            logical: 0,
        }
    }

    /// Zero timestamp, ordered before all real events.
    pub fn genesis() -> Self {
        Self {
            physical_ms: 0,
            logical: 0,
        }
    }

    /// Milliseconds elapsed between this stamp and `now`, saturating at
    /// zero if `now` is earlier.
    pub fn age_ms(&self, now: Timestamp) -> u64 {
        now.physical_ms.saturating_sub(self.physical_ms)
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.physical_ms
            .cmp(&other.physical_ms)
            .then(self.logical.cmp(&other.logical))
    }
}

/// Issues strictly increasing timestamps. When the wall clock stalls or
/// steps backwards within a burst of writes, the logical counter advances
/// instead, so `created_at`/`updated_at` never move backwards.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<Timestamp>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }

    /// Next timestamp, strictly greater than every stamp issued before it
    /// by this clock.
    pub fn stamp(&self) -> Timestamp {
        let wall = Timestamp::now();
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = match *last {
            Some(prev) if wall.physical_ms <= prev.physical_ms => Timestamp {
                physical_ms: prev.physical_ms,
                logical: prev.logical + 1,
            },
            _ => wall,
        };
        *last = Some(next);
        next
    }
}
