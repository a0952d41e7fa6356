//! classifier.rs
//! Distance → range category → setpoint, with the Far-range adaptive baseline.
//!
//! `classify` is a pure function of (distance, thresholds). Baseline capture is
//! a side effect owned by the control cycle; this module only says *what* to
//! capture on a transition.

use crate::config::{RangeConfig, SetpointConfig};

/// Returned for Unknown/OutOfBounds: do not run PI, hand over to safety.
pub const INVALID_SETPOINT: f32 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DistanceRange {
    /// Sensor error or no reading yet.
    #[default]
    Unknown = 0,
    Far = 1,
    Medium = 2,
    Close = 3,
    OutOfBounds = 4,
}

impl DistanceRange {
    /// Far, Medium or Close.
    #[inline]
    pub fn is_valid(&self) -> bool {
        matches!(self, DistanceRange::Far | DistanceRange::Medium | DistanceRange::Close)
    }
}

/// Band edges in centimeters, ascending.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub near: f32,
    pub close_max: f32,
    pub medium_max: f32,
    pub far_max: f32,
}

impl Thresholds {
    pub fn new(close_max: f32, medium_max: f32, far_max: f32) -> Self {
        Self {
            near: 0.0,
            close_max,
            medium_max,
            far_max,
        }
    }

    /// `near + (base - near) * scale` for each of the three maxima.
    pub fn scaled(ranges: &RangeConfig, scale: f32) -> Self {
        let near = ranges.near_limit_cm;
        let at = |base: f32| near + (base - near) * scale;
        Self {
            near,
            close_max: at(ranges.close_max_cm),
            medium_max: at(ranges.medium_max_cm),
            far_max: at(ranges.far_max_cm),
        }
    }

    pub fn classify(&self, distance_cm: f32) -> DistanceRange {
        // Negated comparison so NaN lands here too.
        if !(distance_cm >= 0.0) {
            return DistanceRange::Unknown;
        }
        if distance_cm >= self.medium_max && distance_cm <= self.far_max {
            DistanceRange::Far
        } else if distance_cm >= self.close_max && distance_cm < self.medium_max {
            DistanceRange::Medium
        } else if distance_cm >= self.near && distance_cm < self.close_max {
            DistanceRange::Close
        } else {
            DistanceRange::OutOfBounds
        }
    }
}

impl From<&RangeConfig> for Thresholds {
    fn from(r: &RangeConfig) -> Self {
        Self::scaled(r, 1.0)
    }
}

/// Range → target measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetpointPolicy {
    far_default: f32,
    medium: f32,
    close: f32,
    security_offset: f32,
    medium_to_far_baseline: f32,
}

impl SetpointPolicy {
    pub fn new(c: &SetpointConfig) -> Self {
        Self {
            far_default: c.far,
            medium: c.medium,
            close: c.close,
            security_offset: c.security_offset,
            medium_to_far_baseline: c.medium_to_far_baseline,
        }
    }

    pub fn setpoint(&self, range: DistanceRange, baseline: Option<f32>) -> f32 {
        match range {
            // A non-positive capture (unloaded pad) counts as no baseline.
            DistanceRange::Far => match baseline {
                Some(b) if b > 0.0 => b + self.security_offset,
                _ => self.far_default,
            },
            DistanceRange::Medium => self.medium,
            DistanceRange::Close => self.close,
            DistanceRange::Unknown | DistanceRange::OutOfBounds => INVALID_SETPOINT,
        }
    }

    /// Baseline to capture when moving `prev` → `next`, or `None` to keep the current one.
    ///
    /// Only a fresh entry into Far captures: from Medium the calibrated
    /// reference value, from anywhere else the live measurement.
    pub fn baseline_on_entry(&self, prev: DistanceRange, next: DistanceRange, measurement: f32) -> Option<f32> {
        if next != DistanceRange::Far || prev == DistanceRange::Far {
            return None;
        }
        Some(if prev == DistanceRange::Medium {
            self.medium_to_far_baseline
        } else {
            measurement
        })
    }
}

#[inline]
pub fn is_valid_setpoint(setpoint: f32) -> bool {
    setpoint.is_finite() && setpoint >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SetpointPolicy {
        SetpointPolicy::new(&SetpointConfig::default())
    }

    #[test]
    fn classify_reference_points() {
        let t = Thresholds::new(100.0, 200.0, 300.0);
        assert_eq!(t.classify(40.0), DistanceRange::Close);
        assert_eq!(t.classify(150.0), DistanceRange::Medium);
        assert_eq!(t.classify(250.0), DistanceRange::Far);
        assert_eq!(t.classify(400.0), DistanceRange::OutOfBounds);
        assert_eq!(t.classify(-1.0), DistanceRange::Unknown);
        assert_eq!(t.classify(f32::NAN), DistanceRange::Unknown);
    }

    #[test]
    fn band_edges() {
        let t = Thresholds::new(100.0, 200.0, 300.0);
        assert_eq!(t.classify(99.9), DistanceRange::Close);
        assert_eq!(t.classify(100.0), DistanceRange::Medium);
        assert_eq!(t.classify(200.0), DistanceRange::Far);
        assert_eq!(t.classify(300.0), DistanceRange::Far);
        assert_eq!(t.classify(300.1), DistanceRange::OutOfBounds);
    }

    #[test]
    fn closeness_is_monotonic_as_distance_shrinks() {
        let t = Thresholds::new(100.0, 200.0, 300.0);
        let rank = |r: DistanceRange| match r {
            DistanceRange::Far => 1,
            DistanceRange::Medium => 2,
            DistanceRange::Close => 3,
            _ => 0,
        };
        let mut last = 0;
        for d in (0..=300).rev() {
            let r = rank(t.classify(d as f32));
            assert!(r >= last, "d={}", d);
            last = r;
        }
    }

    #[test]
    fn near_limit_carves_out_bottom_band() {
        let ranges = RangeConfig {
            near_limit_cm: 50.0,
            ..RangeConfig::default()
        };
        let t = Thresholds::from(&ranges);
        assert_eq!(t.classify(40.0), DistanceRange::OutOfBounds);
        assert_eq!(t.classify(60.0), DistanceRange::Close);
    }

    #[test]
    fn scaling_moves_maxima_around_near_limit() {
        let ranges = RangeConfig {
            near_limit_cm: 50.0,
            ..RangeConfig::default()
        };
        let t = Thresholds::scaled(&ranges, 2.0);
        assert_eq!(t.near, 50.0);
        assert_eq!(t.close_max, 150.0);
        assert_eq!(t.medium_max, 350.0);
        assert_eq!(t.far_max, 550.0);
        assert_eq!(t.classify(400.0), DistanceRange::Far);
    }

    #[test]
    fn setpoints_follow_range_and_baseline() {
        let p = policy();
        assert_eq!(p.setpoint(DistanceRange::Close, None), 4.0);
        assert_eq!(p.setpoint(DistanceRange::Medium, Some(9.0)), 2.0);
        assert_eq!(p.setpoint(DistanceRange::Far, None), 1.0);
        assert_eq!(p.setpoint(DistanceRange::Far, Some(0.75)), 1.25);
        assert_eq!(p.setpoint(DistanceRange::Far, Some(0.0)), 1.0);
        assert!(!is_valid_setpoint(p.setpoint(DistanceRange::OutOfBounds, Some(1.0))));
        assert!(!is_valid_setpoint(p.setpoint(DistanceRange::Unknown, None)));
    }

    #[test]
    fn baseline_captured_only_on_fresh_far_entry() {
        let p = policy();
        // From Medium: calibrated reference reproduces the fixed Far setpoint.
        let b = p.baseline_on_entry(DistanceRange::Medium, DistanceRange::Far, 3.7);
        assert_eq!(b, Some(0.5));
        assert_eq!(p.setpoint(DistanceRange::Far, b), 1.0);

        assert_eq!(p.baseline_on_entry(DistanceRange::Close, DistanceRange::Far, 3.7), Some(3.7));
        assert_eq!(p.baseline_on_entry(DistanceRange::Unknown, DistanceRange::Far, 0.2), Some(0.2));
        assert_eq!(p.baseline_on_entry(DistanceRange::Far, DistanceRange::Far, 3.7), None);
        assert_eq!(p.baseline_on_entry(DistanceRange::Far, DistanceRange::Medium, 3.7), None);
    }
}
