//! Control tick driven end to end through the distance board, with recording
//! collaborators in place of the motor driver and the pressure pads.

use sector_control::{
    CoreConfig,
    control::{
        classifier::DistanceRange,
        controller::SharedGains,
        cycle::ControlCycle,
        safety::SafetyState,
    },
    hardware::{ActuatorDriver, PressureSource, fusion::ActiveSensorCell},
    scan::board::{DistanceBoard, DistanceWriter, SectorReading},
    utils::{
        atomic::AtomicF32,
        metrics::{Diagnostics, Event, EventRecorder},
        telemetry::TelemetryBoard,
    },
};
use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

const MS: Duration = Duration::from_millis(1);

struct Recorder(Arc<Mutex<Vec<f32>>>);

impl ActuatorDriver for Recorder {
    fn drive(&mut self, motor: usize, duty: f32) {
        self.0.lock().unwrap()[motor] = duty;
    }
}

struct Pads(Arc<Mutex<Vec<f32>>>);

impl PressureSource for Pads {
    fn read_measurement(&mut self, motor: usize, _samples: usize) -> f32 {
        self.0.lock().unwrap()[motor]
    }
}

struct Rig {
    cycle: ControlCycle<Recorder, Pads>,
    writer: DistanceWriter,
    duties: Arc<Mutex<Vec<f32>>>,
    loads: Arc<Mutex<Vec<f32>>>,
    gains: Arc<SharedGains>,
    scale: Arc<AtomicF32>,
    events: EventRecorder,
    diagnostics: Arc<Diagnostics>,
    telemetry: Arc<TelemetryBoard>,
}

impl Rig {
    fn new() -> Self {
        let config = CoreConfig::default();
        let motors = config.motor_count();
        let (writer, reader) = DistanceBoard::channel(motors, config.lock_timeout());
        let duties = Arc::new(Mutex::new(vec![0.0; motors]));
        let loads = Arc::new(Mutex::new(vec![0.0; motors]));
        let gains = Arc::new(SharedGains::from_config(&config));
        let scale = Arc::new(AtomicF32::new(1.0));
        let telemetry = Arc::new(TelemetryBoard::new(motors, Arc::new(ActiveSensorCell::default())));
        let events = EventRecorder::new();
        let diagnostics = Arc::new(Diagnostics::default());

        let cycle = ControlCycle::new(
            &config,
            reader,
            Recorder(duties.clone()),
            Pads(loads.clone()),
            gains.clone(),
            scale.clone(),
            telemetry.clone(),
            events.clone(),
            diagnostics.clone(),
        );
        Self {
            cycle,
            writer,
            duties,
            loads,
            gains,
            scale,
            events,
            diagnostics,
            telemetry,
        }
    }

    fn see_all(&mut self, distance_cm: f32) {
        for motor in 0..4 {
            assert!(self.writer.publish(motor, SectorReading::new(distance_cm, 20 + 40 * motor as u16)));
        }
    }

    fn set_load(&self, motor: usize, value: f32) {
        self.loads.lock().unwrap()[motor] = value;
    }

    fn duty(&self, motor: usize) -> f32 {
        self.duties.lock().unwrap()[motor]
    }
}

#[test]
fn far_entry_captures_live_measurement_as_baseline() {
    let mut rig = Rig::new();
    rig.see_all(250.0);
    for m in 0..4 {
        rig.set_load(m, 0.75);
    }

    let report = rig.cycle.tick(Instant::now());
    let ch = &rig.cycle.channels()[0];
    assert_eq!(ch.range, DistanceRange::Far);
    assert_eq!(ch.baseline, Some(0.75));
    assert!((ch.setpoint - 1.25).abs() < 1e-6);
    // Small error stays inside the deadband.
    assert_eq!(report.commands, vec![0.0; 4]);
    assert!(report.states.iter().all(|s| *s == SafetyState::Normal));
}

#[test]
fn close_obstacle_drives_forward() {
    let mut rig = Rig::new();
    rig.see_all(250.0);
    assert!(rig.writer.publish(1, SectorReading::new(50.0, 70)));

    rig.cycle.tick(Instant::now());
    assert_eq!(rig.cycle.channels()[1].range, DistanceRange::Close);
    assert_eq!(rig.cycle.channels()[1].setpoint, 4.0);
    let duty = rig.duty(1);
    assert!(duty >= 40.0 && duty <= 100.0, "duty {}", duty);

    let t = rig.telemetry.motor(1).unwrap();
    assert_eq!(t.command.load(), duty);
    assert_eq!(t.distance_cm.load(), 50.0);
}

#[test]
fn lost_sector_unwinds_then_recovers_with_fresh_integrator() {
    let mut rig = Rig::new();
    let t0 = Instant::now();
    rig.see_all(250.0);
    for i in 0..5 {
        rig.cycle.tick(t0 + 20 * MS * i);
    }
    assert!(rig.cycle.channels()[2].pi.integrator() > 0.0);

    // Sector 2 loses its reading while its pad is loaded.
    assert!(rig.writer.publish(2, SectorReading::UNKNOWN));
    rig.set_load(2, 10.0);
    let trip = t0 + 100 * MS;
    let report = rig.cycle.tick(trip);
    assert_eq!(report.states[2], SafetyState::Deflating);
    assert_eq!(rig.duty(2), -60.0);
    // Neighbours keep running.
    assert_eq!(report.states[0], SafetyState::Normal);

    let report = rig.cycle.tick(trip + 1_000 * MS);
    assert_eq!(report.states[2], SafetyState::Deflating);

    let report = rig.cycle.tick(trip + 2_000 * MS);
    assert_eq!(report.states[2], SafetyState::Releasing);
    assert_eq!(rig.duty(2), -60.0);

    // Valid again mid-release: straight back to Normal.
    assert!(rig.writer.publish(2, SectorReading::new(250.0, 110)));
    rig.set_load(2, 3.0);
    let report = rig.cycle.tick(trip + 2_020 * MS);
    assert_eq!(report.states[2], SafetyState::Normal);

    let ch = &rig.cycle.channels()[2];
    assert_eq!(ch.baseline, Some(3.0));
    assert!((ch.setpoint - 3.5).abs() < 1e-6);
    // One step of 0.5 error at 20 ms on a zeroed integrator.
    assert!((ch.pi.integrator() - 0.01).abs() < 1e-5, "{}", ch.pi.integrator());

    assert_eq!(rig.diagnostics.snapshot().safety_trips, 1);
    let transitions: Vec<(SafetyState, SafetyState)> = rig
        .events
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            Event::SafetyTransition { motor: 2, from, to, .. } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (SafetyState::Normal, SafetyState::Deflating),
            (SafetyState::Deflating, SafetyState::Releasing),
            (SafetyState::Releasing, SafetyState::Normal),
        ]
    );
}

#[test]
fn shrinking_range_scale_pushes_far_out_of_bounds() {
    let mut rig = Rig::new();
    rig.see_all(250.0);
    rig.cycle.tick(Instant::now());
    assert!(rig.cycle.channels().iter().all(|c| c.range == DistanceRange::Far));

    rig.scale.store(0.5);
    let report = rig.cycle.tick(Instant::now());
    assert!(rig.cycle.channels().iter().all(|c| c.range == DistanceRange::OutOfBounds));
    assert!(report.states.iter().all(|s| *s == SafetyState::Deflating));
    assert_eq!(report.commands, vec![-60.0; 4]);
    assert_eq!(rig.diagnostics.snapshot().safety_trips, 4);
    assert_eq!(rig.telemetry.thresholds[2].load(), 150.0);
}

#[test]
fn gain_update_applies_on_next_tick() {
    let mut rig = Rig::new();
    rig.see_all(50.0);
    rig.cycle.tick(Instant::now());
    assert!(rig.duty(0) > 0.0);

    rig.gains.set(0.0, 0.0).unwrap();
    let report = rig.cycle.tick(Instant::now());
    assert_eq!(rig.cycle.gains().kp, 0.0);
    assert_eq!(report.commands, vec![0.0; 4]);
}

#[test]
fn poll_runs_once_per_period() {
    let mut rig = Rig::new();
    rig.see_all(250.0);
    let t0 = Instant::now();
    assert!(rig.cycle.poll(t0).is_some());
    assert!(rig.cycle.poll(t0 + 5 * MS).is_none());
    assert!(rig.cycle.poll(t0 + 20 * MS).is_some());
    assert_eq!(rig.diagnostics.snapshot().cycles, 2);
}
