//! cycle.rs
//! Control context: one fixed-period tick over every motor.
//!
//! Per tick:
//! 1. Read the published distances (stale snapshot on lock contention).
//! 2. Thresholds from the runtime range scale.
//! 3. Gains (previous copy on lock contention).
//! 4. Per motor: classify, measure, capture baseline, setpoint, safety update.
//! 5. PI for every Normal motor in one batch.
//! 6. Overwrite every non-Normal motor with its state's fixed command.
//! 7. Drive, then publish telemetry scalars.
//!
//! The tick never waits on the scanner; an overrun is counted, never skipped.

use super::classifier::{DistanceRange, SetpointPolicy, Thresholds, is_valid_setpoint};
use super::controller::{PiController, PiGains, PiLimits, SharedGains};
use super::safety::{SafetyMachine, SafetyPolicy, SafetyState};
use crate::config::{CoreConfig, RangeConfig};
use crate::hardware::{ActuatorDriver, PressureSource};
use crate::scan::board::{DistanceReader, Fetch, SectorReading};
use crate::scan::sector::{Sector, SectorMap};
use crate::utils::atomic::AtomicF32;
use crate::utils::metrics::{Diagnostics, Event, EventRecorder, LockSite};
use crate::utils::telemetry::TelemetryBoard;
use log::{debug, info, warn};
use std::{
    sync::{Arc, atomic::Ordering},
    time::{Duration, Instant},
};

/// Everything the cycle knows about one motor.
#[derive(Debug, Clone)]
pub struct MotorChannel {
    pub motor: usize,
    pub sector: Sector,
    pub reading: SectorReading,
    pub range: DistanceRange,
    pub baseline: Option<f32>,
    pub setpoint: f32,
    pub measurement: f32,
    pub command: f32,
    pub pi: PiController,
    pub safety: SafetyMachine,
    override_command: Option<f32>,
}

impl MotorChannel {
    fn new(sector: Sector, now: Instant) -> Self {
        Self {
            motor: sector.motor,
            sector,
            reading: SectorReading::UNKNOWN,
            range: DistanceRange::Unknown,
            baseline: None,
            setpoint: 0.0,
            measurement: 0.0,
            command: 0.0,
            pi: PiController::new(),
            safety: SafetyMachine::new(now),
            override_command: None,
        }
    }

    pub fn state(&self) -> SafetyState {
        self.safety.state()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    /// Distances came from the cached snapshot.
    pub stale: bool,
    pub commands: Vec<f32>,
    pub states: Vec<SafetyState>,
    pub exec: Duration,
}

pub struct ControlCycle<A, P> {
    reader: DistanceReader,
    actuator: A,
    pressure: P,
    channels: Vec<MotorChannel>,
    ranges: RangeConfig,
    range_scale: Arc<AtomicF32>,
    setpoints: SetpointPolicy,
    safety: SafetyPolicy,
    limits: PiLimits,
    gains: Arc<SharedGains>,
    cached_gains: PiGains,
    pressure_samples: usize,
    period: Duration,
    last_tick: Option<Instant>,
    cycle: u64,
    telemetry: Arc<TelemetryBoard>,
    events: EventRecorder,
    diagnostics: Arc<Diagnostics>,
}

impl<A: ActuatorDriver, P: PressureSource> ControlCycle<A, P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &CoreConfig,
        reader: DistanceReader,
        actuator: A,
        pressure: P,
        gains: Arc<SharedGains>,
        range_scale: Arc<AtomicF32>,
        telemetry: Arc<TelemetryBoard>,
        events: EventRecorder,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        let now = Instant::now();
        let map = SectorMap::from_config(config);
        let cached_gains = gains.get_or(PiGains {
            kp: config.controller.kp,
            ki: config.controller.ki,
        });
        Self {
            reader,
            actuator,
            pressure,
            channels: map.iter().map(|s| MotorChannel::new(*s, now)).collect(),
            ranges: config.ranges,
            range_scale,
            setpoints: SetpointPolicy::new(&config.setpoints),
            safety: SafetyPolicy::from(&config.safety),
            limits: PiLimits::from_config(config),
            gains,
            cached_gains,
            pressure_samples: config.controller.pressure_samples,
            period: config.control_period(),
            last_tick: None,
            cycle: 0,
            telemetry,
            events,
            diagnostics,
        }
    }

    pub fn channels(&self) -> &[MotorChannel] {
        &self.channels
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn gains(&self) -> PiGains {
        self.cached_gains
    }

    /// Zero every integrator. Used at init.
    pub fn reset_controllers(&mut self) {
        for ch in &mut self.channels {
            ch.pi.reset();
        }
    }

    /// Brake every motor. Called on shutdown.
    pub fn brake_all(&mut self) {
        for ch in &mut self.channels {
            ch.command = 0.0;
            self.actuator.drive(ch.motor, 0.0);
        }
    }

    /// Run a tick if at least one period has elapsed since the previous one.
    pub fn poll(&mut self, now: Instant) -> Option<CycleReport> {
        let due = match self.last_tick {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.period,
        };
        if !due {
            return None;
        }
        self.last_tick = Some(now);
        Some(self.tick(now))
    }

    pub fn tick(&mut self, now: Instant) -> CycleReport {
        let started = Instant::now();

        // ====================================================================
        // Inputs: distances, thresholds, gains
        // ====================================================================
        let (snapshot, fetch) = self.reader.read();
        let stale = fetch == Fetch::Stale;
        if stale {
            self.contended(LockSite::DistanceRead);
        }

        let scale = self.range_scale.load();
        let thresholds = Thresholds::scaled(&self.ranges, scale);

        match self.gains.get() {
            Some(g) => self.cached_gains = g,
            None => self.contended(LockSite::Gains),
        }
        let gains = self.cached_gains;

        // ====================================================================
        // Per motor: classify → baseline → setpoint → safety
        // ====================================================================
        for ch in &mut self.channels {
            ch.reading = snapshot.get(ch.motor);
            let range = if ch.reading.is_known() {
                thresholds.classify(ch.reading.distance_cm)
            } else {
                DistanceRange::Unknown
            };
            ch.measurement = self.pressure.read_measurement(ch.motor, self.pressure_samples);

            if range != ch.range {
                if let Some(b) = self.setpoints.baseline_on_entry(ch.range, range, ch.measurement) {
                    ch.baseline = Some(b);
                }
                self.events.record(Event::RangeChanged {
                    ts_ns: self.events.now_ns(),
                    motor: ch.motor,
                    from: ch.range,
                    to: range,
                });
                debug!("[Control] motor {} range {:?} -> {:?}", ch.motor, ch.range, range);
                ch.range = range;
            }

            ch.setpoint = self.setpoints.setpoint(range, ch.baseline);
            let valid = range.is_valid() && is_valid_setpoint(ch.setpoint);

            let step = ch.safety.update(&self.safety, valid, ch.measurement, now);
            if let Some((from, to)) = step.transition {
                self.events.record(Event::SafetyTransition {
                    ts_ns: self.events.now_ns(),
                    motor: ch.motor,
                    from,
                    to,
                });
                match (from, to) {
                    (SafetyState::Normal, _) => {
                        Diagnostics::bump(&self.diagnostics.safety_trips);
                        warn!(
                            "[Control] motor {} tripped: range {:?} at {:.1} cm, deflating",
                            ch.motor, range, ch.reading.distance_cm
                        );
                    }
                    (_, SafetyState::Normal) => {
                        info!("[Control] motor {} back to normal from {:?}", ch.motor, from)
                    }
                    _ => debug!("[Control] motor {} {:?} -> {:?}", ch.motor, from, to),
                }
            }
            if step.reset_controller {
                ch.pi.reset();
            }
            ch.override_command = step.command;
        }

        // ====================================================================
        // PI batch for Normal motors, then safety overrides win
        // ====================================================================
        for ch in self.channels.iter_mut().filter(|c| c.state() == SafetyState::Normal) {
            ch.command = ch.pi.step(gains, &self.limits, ch.setpoint, ch.measurement);
        }
        for ch in &mut self.channels {
            if let Some(cmd) = ch.override_command {
                ch.command = cmd;
            }
        }

        // ====================================================================
        // Outputs: actuators, telemetry
        // ====================================================================
        for ch in &self.channels {
            self.actuator.drive(ch.motor, ch.command);
        }

        self.cycle += 1;
        self.publish_telemetry(scale, &thresholds);
        Diagnostics::bump(&self.diagnostics.cycles);

        let exec = started.elapsed();
        if exec > self.period {
            Diagnostics::bump(&self.diagnostics.overruns);
            self.events.record(Event::CycleOverrun {
                ts_ns: self.events.now_ns(),
                cycle: self.cycle,
                exec_us: exec.as_micros() as u64,
            });
            debug!("[Control] cycle {} overran: {:?} > {:?}", self.cycle, exec, self.period);
        }

        CycleReport {
            cycle: self.cycle,
            stale,
            commands: self.channels.iter().map(|c| c.command).collect(),
            states: self.channels.iter().map(|c| c.state()).collect(),
            exec,
        }
    }

    fn contended(&self, site: LockSite) {
        let counter = match site {
            LockSite::Gains => &self.diagnostics.gains_contention,
            _ => &self.diagnostics.stale_reads,
        };
        Diagnostics::bump(counter);
        self.events.record(Event::LockContention {
            ts_ns: self.events.now_ns(),
            site,
        });
        debug!("[Control] {:?} busy, using previous value", site);
    }

    fn publish_telemetry(&self, scale: f32, thresholds: &Thresholds) {
        let t = &self.telemetry;
        for ch in &self.channels {
            if let Some(m) = t.motor(ch.motor) {
                m.setpoint.store(ch.setpoint);
                m.measurement.store(ch.measurement);
                m.command.store(ch.command);
                m.distance_cm.store(ch.reading.distance_cm);
                m.sector_angle.store(ch.reading.angle, Ordering::Relaxed);
                m.safety.store(ch.state() as u8, Ordering::Relaxed);
                m.range.store(ch.range as u8, Ordering::Relaxed);
            }
        }
        t.range_scale.store(scale);
        t.thresholds[0].store(thresholds.close_max);
        t.thresholds[1].store(thresholds.medium_max);
        t.thresholds[2].store(thresholds.far_max);
        t.cycle.store(self.cycle, Ordering::Relaxed);
    }
}
