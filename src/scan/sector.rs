//! sector.rs
//! Angular sectors, one per motor, and the angle → sector lookup.
//!
//! Sectors are contiguous and non-overlapping. Which side owns a shared seam
//! is a [`SeamOwner`] policy rather than an accident of loop conditions, so
//! forward and backward passes agree on membership.

use crate::config::{CoreConfig, SeamOwner, SectorConfig};

/// Span of the scan arc owned by one motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sector {
    pub motor: usize,
    pub angle_min: u16,
    pub angle_max: u16,
}

impl Sector {
    #[inline]
    pub fn width(&self) -> u16 {
        self.angle_max - self.angle_min
    }
}

#[derive(Debug, Clone)]
pub struct SectorMap {
    sectors: Vec<Sector>,
    seam: SeamOwner,
}

impl SectorMap {
    /// Build from already-validated sector bounds.
    pub fn new(bounds: &[SectorConfig], seam: SeamOwner) -> Self {
        let sectors = bounds
            .iter()
            .enumerate()
            .map(|(motor, b)| Sector {
                motor,
                angle_min: b.min,
                angle_max: b.max,
            })
            .collect();
        Self { sectors, seam }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(&config.sectors, config.scan.seam)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    pub fn get(&self, motor: usize) -> Option<&Sector> {
        self.sectors.get(motor)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sector> {
        self.sectors.iter()
    }

    pub fn seam(&self) -> SeamOwner {
        self.seam
    }

    /// Lowest angle covered by any sector.
    pub fn arc_min(&self) -> u16 {
        self.sectors.first().map(|s| s.angle_min).unwrap_or(0)
    }

    /// Highest angle covered by any sector.
    pub fn arc_max(&self) -> u16 {
        self.sectors.last().map(|s| s.angle_max).unwrap_or(0)
    }

    /// Sector owning `angle`, or `None` outside the covered arc.
    pub fn sector_of(&self, angle: u16) -> Option<usize> {
        let last = self.sectors.len().checked_sub(1)?;
        self.sectors.iter().position(|s| match self.seam {
            SeamOwner::Upper => {
                angle >= s.angle_min
                    && (angle < s.angle_max || (s.motor == last && angle == s.angle_max))
            }
            SeamOwner::Lower => {
                angle <= s.angle_max
                    && (angle > s.angle_min || (s.motor == 0 && angle == s.angle_min))
            }
        })
    }
}
