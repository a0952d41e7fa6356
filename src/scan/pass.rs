//! pass.rs
//! One directional traversal of the arc and its per-sector minimum tracking.
//!
//! A sector is published when the scan leaves it: the next angle of the pass
//! belongs to another sector, or the pass ends. That single rule covers the
//! forward and backward directions alike, so both agree on seam ownership
//! through [`SectorMap::sector_of`].

use super::board::SectorReading;
use super::sector::SectorMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// arc min → arc max
    Forward,
    /// arc max → arc min
    Backward,
}

/// Angles visited by one pass. The far endpoint is only included when the
/// step lands on it.
pub fn pass_angles(arc_min: u16, arc_max: u16, step: u16, direction: Direction) -> Vec<u16> {
    if step == 0 || arc_min > arc_max {
        return Vec::new();
    }
    let count = ((arc_max - arc_min) / step) as usize + 1;
    match direction {
        Direction::Forward => (0..count).map(|i| arc_min + i as u16 * step).collect(),
        Direction::Backward => (0..count).map(|i| arc_max - i as u16 * step).collect(),
    }
}

/// A sample the minimum tracker accepts.
#[inline]
pub fn is_valid_sample(distance_cm: f32) -> bool {
    distance_cm.is_finite() && distance_cm > 0.0
}

#[derive(Debug, Clone, Copy, Default)]
struct SectorSlot {
    best: Option<SectorReading>,
    published: bool,
}

/// Running minima for every sector during one pass.
#[derive(Debug, Clone)]
pub struct ScanPass {
    direction: Direction,
    slots: Vec<SectorSlot>,
}

impl ScanPass {
    pub fn new(direction: Direction, sectors: usize) -> Self {
        Self {
            direction,
            slots: vec![SectorSlot::default(); sectors],
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Current minimum of `sector`, if any valid sample has been seen.
    pub fn best(&self, sector: usize) -> Option<SectorReading> {
        self.slots.get(sector).and_then(|s| s.best)
    }

    /// Feed the sample taken at `angle`.
    ///
    /// `next` is the angle the pass will visit after this one (`None` at the
    /// end of the pass). Returns the sector and its minimum when this sample
    /// closes a sector that holds at least one valid reading.
    pub fn record(
        &mut self,
        map: &SectorMap,
        angle: u16,
        distance_cm: f32,
        next: Option<u16>,
    ) -> Option<(usize, SectorReading)> {
        let sector = map.sector_of(angle)?;
        let slot = self.slots.get_mut(sector)?;

        if is_valid_sample(distance_cm) {
            let improves = slot.best.is_none_or(|b| distance_cm < b.distance_cm);
            if improves {
                slot.best = Some(SectorReading::new(distance_cm, angle));
            }
        }

        let leaving = match next {
            None => true,
            Some(n) => map.sector_of(n) != Some(sector),
        };
        if !leaving || slot.published {
            return None;
        }
        let best = slot.best?;
        slot.published = true;
        Some((sector, best))
    }

    /// Sectors that were closed with a reading during this pass.
    pub fn published_count(&self) -> usize {
        self.slots.iter().filter(|s| s.published).count()
    }
}
