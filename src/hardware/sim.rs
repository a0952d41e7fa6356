//! sim.rs
//! Simulated collaborators for the harness binary, tests and benches.
//! - ObstacleField: distance as a function of head angle, changeable at runtime
//! - SimHead / SimRangeSensor: head angle shared through an atomic, noisy readings with occasional timeouts
//! - SimPlant / SimActuator / SimPads: pads integrate the last commanded duty, reads averaged with `average::Mean`

use super::{ActuatorDriver, DistanceSensor, PressureSource, ScanHead};
use crate::config::MeasurementUnit;
use crate::utils::atomic::AtomicF32;
use average::Mean;
use parking_lot::Mutex;
use rand::{random_bool, random_range};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU16, Ordering},
    },
    time::Instant,
};

/// Sentinel a timed-out range finder returns.
pub const TIMEOUT_READING: f32 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    /// Center angle (degrees).
    pub angle: u16,
    /// Half-width (degrees) over which the obstacle is seen.
    pub half_width: u16,
    pub distance_cm: f32,
}

/// What the range finder would see at each angle.
pub struct ObstacleField {
    obstacles: Mutex<Vec<Obstacle>>,
    background_cm: AtomicF32,
}

impl ObstacleField {
    pub fn new(background_cm: f32) -> Self {
        Self {
            obstacles: Mutex::new(Vec::new()),
            background_cm: AtomicF32::new(background_cm),
        }
    }

    pub fn set(&self, obstacles: Vec<Obstacle>) {
        *self.obstacles.lock() = obstacles;
    }

    /// Distance seen where no obstacle is.
    pub fn set_background(&self, background_cm: f32) {
        self.background_cm.store(background_cm);
    }

    /// Nearest obstacle covering `angle`, or the background.
    pub fn distance_at(&self, angle: u16) -> f32 {
        self.obstacles
            .lock()
            .iter()
            .filter(|o| angle.abs_diff(o.angle) <= o.half_width)
            .map(|o| o.distance_cm)
            .fold(self.background_cm.load(), f32::min)
    }
}

pub struct SimHead {
    angle: Arc<AtomicU16>,
}

impl SimHead {
    pub fn new(angle: Arc<AtomicU16>) -> Self {
        Self { angle }
    }
}

impl ScanHead for SimHead {
    fn set_angle(&mut self, degrees: u16) {
        self.angle.store(degrees, Ordering::Relaxed);
    }
}

pub struct SimRangeSensor {
    field: Arc<ObstacleField>,
    angle: Arc<AtomicU16>,
    noise_cm: f32,
    timeout_rate: f64,
}

impl SimRangeSensor {
    pub fn new(field: Arc<ObstacleField>, angle: Arc<AtomicU16>) -> Self {
        Self {
            field,
            angle,
            noise_cm: 0.0,
            timeout_rate: 0.0,
        }
    }

    /// ± uniform noise in centimeters.
    pub fn with_noise(mut self, noise_cm: f32) -> Self {
        self.noise_cm = noise_cm.abs();
        self
    }

    /// Probability in `[0, 1]` that a sample times out.
    pub fn with_timeouts(mut self, rate: f64) -> Self {
        self.timeout_rate = rate.clamp(0.0, 1.0);
        self
    }
}

impl DistanceSensor for SimRangeSensor {
    fn sample_distance(&mut self) -> f32 {
        if self.timeout_rate > 0.0 && random_bool(self.timeout_rate) {
            return TIMEOUT_READING;
        }
        let d = self.field.distance_at(self.angle.load(Ordering::Relaxed));
        let noise = if self.noise_cm > 0.0 {
            random_range(-self.noise_cm..self.noise_cm)
        } else {
            0.0
        };
        (d + noise).max(0.1)
    }
}

/// Duty last commanded per motor.
pub struct SimPlant {
    duties: Vec<AtomicF32>,
}

impl SimPlant {
    pub fn new(motors: usize) -> Self {
        Self {
            duties: (0..motors).map(|_| AtomicF32::new(0.0)).collect(),
        }
    }

    pub fn duty(&self, motor: usize) -> f32 {
        self.duties.get(motor).map(AtomicF32::load).unwrap_or(0.0)
    }
}

pub struct SimActuator {
    plant: Arc<SimPlant>,
}

impl SimActuator {
    pub fn new(plant: Arc<SimPlant>) -> Self {
        Self { plant }
    }
}

impl ActuatorDriver for SimActuator {
    fn drive(&mut self, motor: usize, duty: f32) {
        if let Some(d) = self.plant.duties.get(motor) {
            d.store(duty.clamp(-100.0, 100.0));
        }
    }
}

/// Pads whose load ramps with the commanded duty: forward loads, reverse
/// unloads, brake holds.
pub struct SimPads {
    plant: Arc<SimPlant>,
    load: Vec<f32>,
    last: Vec<Instant>,
    /// Load change per second at 100 % duty.
    rate: f32,
    full_scale: f32,
    noise: f32,
}

impl SimPads {
    pub fn new(plant: Arc<SimPlant>, unit: MeasurementUnit) -> Self {
        let (rate, full_scale, noise) = match unit {
            MeasurementUnit::Newtons => (8.0, 20.0, 0.02),
            MeasurementUnit::Millivolts => (640.0, 1_600.0, 2.0),
        };
        let motors = plant.duties.len();
        let now = Instant::now();
        Self {
            plant,
            load: vec![0.0; motors],
            last: vec![now; motors],
            rate,
            full_scale,
            noise,
        }
    }

    fn advance(&mut self, motor: usize, now: Instant) -> f32 {
        let dt = now.saturating_duration_since(self.last[motor]).as_secs_f32();
        self.last[motor] = now;
        let duty = self.plant.duty(motor) / 100.0;
        let next = self.load[motor] + duty * self.rate * dt;
        self.load[motor] = next.clamp(0.0, self.full_scale);
        self.load[motor]
    }
}

impl PressureSource for SimPads {
    fn read_measurement(&mut self, motor: usize, samples: usize) -> f32 {
        if motor >= self.load.len() {
            return 0.0;
        }
        let load = self.advance(motor, Instant::now());
        let noise = self.noise;
        let mean: Mean = (0..samples.max(1))
            .map(|_| (load + random_range(-noise..=noise)) as f64)
            .collect();
        (mean.mean() as f32).max(0.0)
    }
}
