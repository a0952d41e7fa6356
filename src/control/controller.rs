//! controller.rs
//! Per-motor PI law with anti-windup, output saturation and a deadband.
//!
//! - One `PiController` per motor, no cross-motor coupling.
//! - Gains are shared by all motors and tunable at runtime through
//!   [`SharedGains`]; a new value applies from the next `step`.
//! - The deadband only gates the emitted command. The integrator keeps
//!   integrating error underneath it.

use crate::config::CoreConfig;
use crate::error::CommandError;
use parking_lot::Mutex;
use std::time::Duration;

/// Floor on Ki when sizing the integrator clamp.
pub const KI_EPSILON: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PiGains {
    pub kp: f32,
    pub ki: f32,
}

impl PiGains {
    /// Finite, non-negative gains only.
    pub fn new(kp: f32, ki: f32) -> Result<Self, CommandError> {
        let ok = |g: f32| g.is_finite() && g >= 0.0;
        if ok(kp) && ok(ki) {
            Ok(Self { kp, ki })
        } else {
            Err(CommandError::InvalidGain { kp, ki })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PiLimits {
    pub output_min: f32,
    pub output_max: f32,
    /// |raw| below this is emitted as 0.
    pub min_run: f32,
    /// Control period in seconds.
    pub dt: f32,
}

impl PiLimits {
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            output_min: config.controller.output_min,
            output_max: config.controller.output_max,
            min_run: config.controller.min_run,
            dt: config.dt_secs(),
        }
    }

    /// Bound on |integrator| so that `Ki * integrator` alone never exceeds `output_max`.
    #[inline]
    pub fn integrator_limit(&self, ki: f32) -> f32 {
        self.output_max / ki.max(KI_EPSILON)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PiController {
    integrator: f32,
}

impl PiController {
    pub fn new() -> Self {
        Self::default()
    }

    /// One control step. Positive ⇒ forward, negative ⇒ reverse, 0 ⇒ brake.
    pub fn step(&mut self, gains: PiGains, limits: &PiLimits, setpoint: f32, measurement: f32) -> f32 {
        let error = setpoint - measurement;

        let bound = limits.integrator_limit(gains.ki);
        self.integrator = (self.integrator + error * limits.dt).clamp(-bound, bound);

        let raw = (gains.kp * error + gains.ki * self.integrator).clamp(limits.output_min, limits.output_max);

        if raw.abs() < limits.min_run { 0.0 } else { raw }
    }

    pub fn reset(&mut self) {
        self.integrator = 0.0;
    }

    #[inline]
    pub fn integrator(&self) -> f32 {
        self.integrator
    }
}

/// Runtime-tunable gains shared by every motor.
pub struct SharedGains {
    inner: Mutex<PiGains>,
    lock_timeout: Duration,
}

impl SharedGains {
    pub fn new(initial: PiGains, lock_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(initial),
            lock_timeout,
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(
            PiGains {
                kp: config.controller.kp,
                ki: config.controller.ki,
            },
            config.lock_timeout(),
        )
    }

    /// Validate, then replace both gains. Rejected input leaves the gains untouched.
    pub fn set(&self, kp: f32, ki: f32) -> Result<(), CommandError> {
        let gains = PiGains::new(kp, ki)?;
        let mut guard = self
            .inner
            .try_lock_for(self.lock_timeout)
            .ok_or(CommandError::Busy("gains"))?;
        *guard = gains;
        Ok(())
    }

    pub fn get(&self) -> Option<PiGains> {
        self.inner.try_lock_for(self.lock_timeout).map(|g| *g)
    }

    pub fn get_or(&self, cached: PiGains) -> PiGains {
        self.get().unwrap_or(cached)
    }
}
