//! fusion.rs
//! Primary + secondary range finder behind a single [`DistanceSensor`].
//!
//! Each reading is validated against its own sensor's limits; the smaller
//! valid one wins and the supplier is recorded for telemetry.

use super::DistanceSensor;
use crate::config::SensorLimits;
use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

/// Which sensor supplied the last reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ActiveSensor {
    None = 0,
    Primary = 1,
    Secondary = 2,
}

impl ActiveSensor {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ActiveSensor::Primary,
            2 => ActiveSensor::Secondary,
            _ => ActiveSensor::None,
        }
    }
}

/// Shared indicator, written by the scan thread and read by telemetry.
#[derive(Debug, Default)]
pub struct ActiveSensorCell(AtomicU8);

impl ActiveSensorCell {
    #[inline]
    pub fn load(&self) -> ActiveSensor {
        ActiveSensor::from_u8(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, sensor: ActiveSensor) {
        self.0.store(sensor as u8, Ordering::Relaxed);
    }
}

pub struct FusedSensor<P, S> {
    primary: P,
    primary_limits: SensorLimits,
    secondary: Option<(S, SensorLimits)>,
    indicator: Arc<ActiveSensorCell>,
}

impl<P: DistanceSensor, S: DistanceSensor> FusedSensor<P, S> {
    pub fn new(primary: P, primary_limits: SensorLimits) -> Self {
        Self {
            primary,
            primary_limits,
            secondary: None,
            indicator: Arc::new(ActiveSensorCell::default()),
        }
    }

    pub fn with_secondary(mut self, secondary: S, limits: SensorLimits) -> Self {
        self.secondary = Some((secondary, limits));
        self
    }

    pub fn indicator(&self) -> Arc<ActiveSensorCell> {
        self.indicator.clone()
    }
}

impl<P: DistanceSensor, S: DistanceSensor> DistanceSensor for FusedSensor<P, S> {
    fn sample_distance(&mut self) -> f32 {
        let p = self.primary.sample_distance();
        let primary = self.primary_limits.accepts(p).then_some(p);
        let secondary = self.secondary.as_mut().and_then(|(sensor, limits)| {
            let s = sensor.sample_distance();
            limits.accepts(s).then_some(s)
        });

        let (distance, source) = match (primary, secondary) {
            (Some(p), Some(s)) if s < p => (s, ActiveSensor::Secondary),
            (Some(p), _) => (p, ActiveSensor::Primary),
            (None, Some(s)) => (s, ActiveSensor::Secondary),
            (None, None) => (-1.0, ActiveSensor::None),
        };
        self.indicator.store(source);
        distance
    }
}
