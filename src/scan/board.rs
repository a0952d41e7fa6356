//! board.rs
//! PublishedDistance exchange between the scan thread (sole writer) and the
//! control thread (sole reader).
//!
//! The writer keeps its own copy of all sector readings and publishes a whole
//! immutable snapshot by swapping an `Arc` under a `parking_lot::Mutex`. The
//! lock guards only the pointer swap / clone, never a sensor sample or an
//! actuator command. Both sides wait at most `lock_timeout`:
//! - writer: on timeout the snapshot is not swapped; its local copy keeps the
//!   reading, so the next successful publish carries it.
//! - reader: on timeout it reuses the last snapshot it saw (stale, never torn).

use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};

/// Out-of-physical-range marker: no pass has completed for this sector yet.
pub const UNKNOWN_DISTANCE: f32 = 999.0;

/// Most recent completed sector minimum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectorReading {
    pub distance_cm: f32,
    /// Angle (degrees) at which the minimum was seen.
    pub angle: u16,
}

impl SectorReading {
    pub const UNKNOWN: SectorReading = SectorReading {
        distance_cm: UNKNOWN_DISTANCE,
        angle: 0,
    };

    pub fn new(distance_cm: f32, angle: u16) -> Self {
        Self { distance_cm, angle }
    }

    /// False for the startup sentinel; consumers must not treat it as a distance.
    #[inline]
    pub fn is_known(&self) -> bool {
        self.distance_cm.is_finite() && self.distance_cm > 0.0 && self.distance_cm < UNKNOWN_DISTANCE
    }
}

/// Immutable per-motor view published by the scan thread.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceSnapshot {
    readings: Vec<SectorReading>,
    version: u64,
}

impl DistanceSnapshot {
    fn unknown(motors: usize) -> Self {
        Self {
            readings: vec![SectorReading::UNKNOWN; motors],
            version: 0,
        }
    }

    /// Reading for `motor`; unknown for an index past the end.
    pub fn get(&self, motor: usize) -> SectorReading {
        self.readings
            .get(motor)
            .copied()
            .unwrap_or(SectorReading::UNKNOWN)
    }

    pub fn readings(&self) -> &[SectorReading] {
        &self.readings
    }

    /// Count of successful publishes that produced this snapshot.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Whether a read observed the current snapshot or fell back to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    Fresh,
    Stale,
}

pub struct DistanceBoard {
    current: Mutex<Arc<DistanceSnapshot>>,
    lock_timeout: Duration,
}

impl DistanceBoard {
    /// Create the board and its single writer / single reader pair.
    pub fn channel(motors: usize, lock_timeout: Duration) -> (DistanceWriter, DistanceReader) {
        let initial = Arc::new(DistanceSnapshot::unknown(motors));
        let board = Arc::new(DistanceBoard {
            current: Mutex::new(initial.clone()),
            lock_timeout,
        });
        let writer = DistanceWriter {
            board: board.clone(),
            local: vec![SectorReading::UNKNOWN; motors],
            version: 0,
        };
        let reader = DistanceReader {
            board,
            cached: initial,
        };
        (writer, reader)
    }
}

/// Scan-side handle. Not `Clone`: there is exactly one writer.
pub struct DistanceWriter {
    board: Arc<DistanceBoard>,
    local: Vec<SectorReading>,
    version: u64,
}

impl DistanceWriter {
    /// Record `reading` for `motor` and try to swap in a new snapshot.
    ///
    /// Returns `false` if the lock could not be taken in time. The reading
    /// stays in the local copy either way.
    pub fn publish(&mut self, motor: usize, reading: SectorReading) -> bool {
        let Some(slot) = self.local.get_mut(motor) else {
            return false;
        };
        *slot = reading;

        let next = Arc::new(DistanceSnapshot {
            readings: self.local.clone(),
            version: self.version + 1,
        });
        match self.board.current.try_lock_for(self.board.lock_timeout) {
            Some(mut guard) => {
                *guard = next;
                self.version += 1;
                true
            }
            None => false,
        }
    }

    /// Writer's own view, including readings not yet swapped in.
    pub fn local(&self) -> &[SectorReading] {
        &self.local
    }
}

/// Control-side handle holding the last snapshot it managed to read.
pub struct DistanceReader {
    board: Arc<DistanceBoard>,
    cached: Arc<DistanceSnapshot>,
}

impl DistanceReader {
    /// Latest snapshot, or the cached one if the lock is contended past the timeout.
    pub fn read(&mut self) -> (Arc<DistanceSnapshot>, Fetch) {
        match self.board.current.try_lock_for(self.board.lock_timeout) {
            Some(guard) => {
                self.cached = guard.clone();
                (self.cached.clone(), Fetch::Fresh)
            }
            None => (self.cached.clone(), Fetch::Stale),
        }
    }

    pub fn cached(&self) -> &DistanceSnapshot {
        &self.cached
    }
}
