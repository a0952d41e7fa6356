//! settings.rs
//! Runtime-tunable scan parameters.
//!
//! Written by the command processor, read by the scan thread once per
//! iteration. Every access is a bounded `try_lock_for`; setters validate
//! before touching the shared value, so a rejected request leaves it unchanged.

use crate::config::{ANGLE_LIMIT_MAX, ANGLE_LIMIT_MIN, SETTLE_MAX_MS, STEP_MAX, STEP_MIN, ScanConfig};
use crate::error::CommandError;
use parking_lot::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    pub sweep_enabled: bool,
    pub arc_min: u16,
    pub arc_max: u16,
    pub step: u16,
    pub settle_ms: u64,
    pub manual_angle: u16,
}

impl From<&ScanConfig> for ScanSettings {
    fn from(c: &ScanConfig) -> Self {
        Self {
            sweep_enabled: c.sweep_enabled,
            arc_min: c.arc_min,
            arc_max: c.arc_max,
            step: c.step,
            settle_ms: c.settle_ms,
            manual_angle: c.manual_angle,
        }
    }
}

fn check_angle(what: &'static str, angle: u16) -> Result<(), CommandError> {
    if (ANGLE_LIMIT_MIN..=ANGLE_LIMIT_MAX).contains(&angle) {
        Ok(())
    } else {
        Err(CommandError::OutOfRange {
            what,
            value: angle as f32,
            min: ANGLE_LIMIT_MIN as f32,
            max: ANGLE_LIMIT_MAX as f32,
        })
    }
}

pub struct SharedScanSettings {
    inner: Mutex<ScanSettings>,
    lock_timeout: Duration,
}

impl SharedScanSettings {
    pub fn new(initial: ScanSettings, lock_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(initial),
            lock_timeout,
        }
    }

    /// Copy of the current settings, or `None` if the lock is busy.
    pub fn snapshot(&self) -> Option<ScanSettings> {
        self.inner.try_lock_for(self.lock_timeout).map(|g| *g)
    }

    fn update<F>(&self, apply: F) -> Result<(), CommandError>
    where
        F: FnOnce(&mut ScanSettings) -> Result<(), CommandError>,
    {
        let mut guard = self
            .inner
            .try_lock_for(self.lock_timeout)
            .ok_or(CommandError::Busy("scan settings"))?;
        let mut next = *guard;
        apply(&mut next)?;
        *guard = next;
        Ok(())
    }

    pub fn set_sweep_enabled(&self, enabled: bool) -> Result<(), CommandError> {
        self.update(|s| {
            s.sweep_enabled = enabled;
            Ok(())
        })
    }

    pub fn set_arc_min(&self, angle: u16) -> Result<(), CommandError> {
        check_angle("MIN", angle)?;
        self.update(|s| {
            if angle >= s.arc_max {
                return Err(CommandError::InvalidRange {
                    min: angle,
                    max: s.arc_max,
                });
            }
            s.arc_min = angle;
            Ok(())
        })
    }

    pub fn set_arc_max(&self, angle: u16) -> Result<(), CommandError> {
        check_angle("MAX", angle)?;
        self.update(|s| {
            if s.arc_min >= angle {
                return Err(CommandError::InvalidRange {
                    min: s.arc_min,
                    max: angle,
                });
            }
            s.arc_max = angle;
            Ok(())
        })
    }

    pub fn set_step(&self, step: u16) -> Result<(), CommandError> {
        if !(STEP_MIN..=STEP_MAX).contains(&step) {
            return Err(CommandError::OutOfRange {
                what: "STEP",
                value: step as f32,
                min: STEP_MIN as f32,
                max: STEP_MAX as f32,
            });
        }
        self.update(|s| {
            s.step = step;
            Ok(())
        })
    }

    pub fn set_settle_ms(&self, settle_ms: u64) -> Result<(), CommandError> {
        if settle_ms > SETTLE_MAX_MS {
            return Err(CommandError::OutOfRange {
                what: "SETTLE",
                value: settle_ms as f32,
                min: 0.0,
                max: SETTLE_MAX_MS as f32,
            });
        }
        self.update(|s| {
            s.settle_ms = settle_ms;
            Ok(())
        })
    }

    /// Only accepted while the sweep is disabled.
    pub fn set_manual_angle(&self, angle: u16) -> Result<(), CommandError> {
        check_angle("ANGLE", angle)?;
        self.update(|s| {
            if s.sweep_enabled {
                return Err(CommandError::SweepActive);
            }
            s.manual_angle = angle;
            Ok(())
        })
    }
}
