//! scanner.rs
//! Scan context: sweeps the head across the arc and publishes per-sector minima.
//! - Settle and reading delays are explicit SpinSleeper waits, not acknowledgments from the head
//! - Settings are re-read once per cycle; on lock contention the last copy is reused
//! - Manual mode holds one angle and republishes the owning sector with that single reading

use super::board::{DistanceWriter, SectorReading};
use super::pass::{Direction, ScanPass, is_valid_sample, pass_angles};
use super::sector::SectorMap;
use super::settings::{ScanSettings, SharedScanSettings};
use crate::config::{CoreConfig, SweepMode};
use crate::hardware::{DistanceSensor, ScanHead};
use crate::utils::metrics::{Diagnostics, Event, EventRecorder, LockSite};
use crate::utils::telemetry::TelemetryBoard;
use log::debug;
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

pub struct SectorScanner<S, H> {
    sensor: S,
    head: H,
    map: SectorMap,
    writer: DistanceWriter,
    settings: Arc<SharedScanSettings>,
    cached: ScanSettings,
    mode: SweepMode,
    reading_delay: Duration,
    idle_angle: u16,
    idle_pause: Duration,
    telemetry: Arc<TelemetryBoard>,
    events: EventRecorder,
    diagnostics: Arc<Diagnostics>,
    sleeper: SpinSleeper,
}

impl<S: DistanceSensor, H: ScanHead> SectorScanner<S, H> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &CoreConfig,
        sensor: S,
        head: H,
        writer: DistanceWriter,
        settings: Arc<SharedScanSettings>,
        telemetry: Arc<TelemetryBoard>,
        events: EventRecorder,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            sensor,
            head,
            map: SectorMap::from_config(config),
            writer,
            cached: ScanSettings::from(&config.scan),
            settings,
            mode: config.scan.mode,
            reading_delay: Duration::from_millis(config.scan.reading_delay_ms),
            idle_angle: config.scan.idle_angle,
            idle_pause: Duration::from_millis(config.scan.idle_pause_ms),
            telemetry,
            events,
            diagnostics,
            sleeper: SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread),
        }
    }

    pub fn map(&self) -> &SectorMap {
        &self.map
    }

    pub fn settings(&self) -> ScanSettings {
        self.cached
    }

    #[inline]
    fn pause(&self, d: Duration) {
        if !d.is_zero() {
            self.sleeper.sleep(d);
        }
    }

    /// Pull the tunable parameters, keeping the previous copy if the lock is busy.
    pub fn refresh_settings(&mut self) -> ScanSettings {
        match self.settings.snapshot() {
            Some(s) => self.cached = s,
            None => {
                Diagnostics::bump(&self.diagnostics.settings_contention);
                self.events.record(Event::LockContention {
                    ts_ns: self.events.now_ns(),
                    site: LockSite::ScanSettings,
                });
                debug!("[Scanner] settings busy, reusing previous");
            }
        }
        self.cached
    }

    /// Move, settle, sample once, then wait the reading delay.
    pub fn sample_at(&mut self, angle: u16, settle: Duration) -> f32 {
        self.head.set_angle(angle);
        self.telemetry.set_scan_angle(angle);
        self.pause(settle);

        let distance = self.sensor.sample_distance();
        Diagnostics::bump(&self.diagnostics.samples);
        if !is_valid_sample(distance) {
            Diagnostics::bump(&self.diagnostics.invalid_samples);
        }

        self.pause(self.reading_delay);
        distance
    }

    fn publish(&mut self, motor: usize, reading: SectorReading) {
        if self.writer.publish(motor, reading) {
            Diagnostics::bump(&self.diagnostics.publications);
            self.events.record(Event::SectorPublished {
                ts_ns: self.events.now_ns(),
                motor,
                distance_cm: reading.distance_cm,
                angle: reading.angle,
            });
            debug!(
                "[Scanner] sector {} -> {:.1} cm @ {}°",
                motor, reading.distance_cm, reading.angle
            );
        } else {
            // Kept in the writer's local copy; the next successful publish carries it.
            Diagnostics::bump(&self.diagnostics.missed_publishes);
            self.events.record(Event::LockContention {
                ts_ns: self.events.now_ns(),
                site: LockSite::DistanceWrite,
            });
            debug!("[Scanner] board busy, sector {} deferred", motor);
        }
    }

    /// One directional pass. Returns the number of sectors closed with a reading.
    pub fn run_pass(&mut self, direction: Direction, settings: ScanSettings, running: &AtomicBool) -> usize {
        let angles = pass_angles(settings.arc_min, settings.arc_max, settings.step, direction);
        let settle = Duration::from_millis(settings.settle_ms);
        let mut pass = ScanPass::new(direction, self.map.len());

        for (i, &angle) in angles.iter().enumerate() {
            if !running.load(Ordering::Acquire) {
                break;
            }
            let distance = self.sample_at(angle, settle);
            let next = angles.get(i + 1).copied();
            if let Some((motor, reading)) = pass.record(&self.map, angle, distance, next) {
                self.publish(motor, reading);
            }
        }
        debug!("[Scanner] {:?} pass closed {} sectors", pass.direction(), pass.published_count());
        pass.published_count()
    }

    /// Hold the manual angle and republish its sector with the single reading.
    /// Returns whether a reading was published.
    pub fn run_manual(&mut self, settings: ScanSettings) -> bool {
        let angle = settings.manual_angle;
        let distance = self.sample_at(angle, Duration::from_millis(settings.settle_ms));
        match self.map.sector_of(angle) {
            Some(motor) if is_valid_sample(distance) => {
                self.publish(motor, SectorReading::new(distance, angle));
                true
            }
            _ => false,
        }
    }

    /// Full sweep cycle (forward, then backward when bidirectional) followed by
    /// the idle park, or one manual sample when sweeping is disabled.
    pub fn step_cycle(&mut self, running: &AtomicBool) -> usize {
        let settings = self.refresh_settings();
        if !settings.sweep_enabled {
            return usize::from(self.run_manual(settings));
        }

        let mut published = self.run_pass(Direction::Forward, settings, running);
        if self.mode == SweepMode::Bidirectional && running.load(Ordering::Acquire) {
            published += self.run_pass(Direction::Backward, settings, running);
        }

        self.head.set_angle(self.idle_angle);
        self.telemetry.set_scan_angle(self.idle_angle);
        self.pause(self.idle_pause);
        published
    }

    /// Scan thread body.
    pub fn run(&mut self, running: Arc<AtomicBool>) {
        debug!(
            "[Scanner] started, {} sectors, {:?}, seam owned by {:?} side",
            self.map.len(),
            self.mode,
            self.map.seam()
        );
        while running.load(Ordering::Acquire) {
            self.step_cycle(&running);
        }
        debug!("[Scanner] stopped.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::fusion::ActiveSensorCell;
    use crate::scan::board::{DistanceBoard, DistanceReader};
    use std::sync::Mutex;

    /// Distance as a function of the last commanded angle.
    struct FieldSensor {
        angle: Arc<Mutex<u16>>,
        field: fn(u16) -> f32,
    }

    impl DistanceSensor for FieldSensor {
        fn sample_distance(&mut self) -> f32 {
            let a = *self.angle.lock().unwrap();
            (self.field)(a)
        }
    }

    struct Head {
        angle: Arc<Mutex<u16>>,
        visited: Arc<Mutex<Vec<u16>>>,
    }

    impl ScanHead for Head {
        fn set_angle(&mut self, degrees: u16) {
            *self.angle.lock().unwrap() = degrees;
            self.visited.lock().unwrap().push(degrees);
        }
    }

    struct Rig {
        scanner: SectorScanner<FieldSensor, Head>,
        reader: DistanceReader,
        settings: Arc<SharedScanSettings>,
        visited: Arc<Mutex<Vec<u16>>>,
        events: EventRecorder,
    }

    fn rig(mode: SweepMode, field: fn(u16) -> f32) -> Rig {
        let mut config = CoreConfig::default();
        config.scan.mode = mode;
        config.scan.settle_ms = 0;
        config.scan.reading_delay_ms = 0;
        config.scan.idle_pause_ms = 0;

        let angle = Arc::new(Mutex::new(0));
        let visited = Arc::new(Mutex::new(Vec::new()));
        let (writer, reader) = DistanceBoard::channel(config.motor_count(), Duration::from_millis(5));
        let settings = Arc::new(SharedScanSettings::new(
            ScanSettings::from(&config.scan),
            Duration::from_millis(5),
        ));
        let telemetry = Arc::new(TelemetryBoard::new(4, Arc::new(ActiveSensorCell::default())));
        let events = EventRecorder::new();
        let scanner = SectorScanner::new(
            &config,
            FieldSensor { angle: angle.clone(), field },
            Head { angle, visited: visited.clone() },
            writer,
            settings.clone(),
            telemetry,
            events.clone(),
            Arc::new(Diagnostics::default()),
        );
        Rig { scanner, reader, settings, visited, events }
    }

    fn obstacle_at_100(a: u16) -> f32 {
        if a == 100 { 60.0 } else { 250.0 }
    }

    #[test]
    fn forward_cycle_publishes_every_sector_then_parks() {
        let mut r = rig(SweepMode::Forward, obstacle_at_100);
        let running = AtomicBool::new(true);
        assert_eq!(r.scanner.step_cycle(&running), 4);

        let (snap, _) = r.reader.read();
        assert_eq!(snap.get(2), SectorReading::new(60.0, 100));
        assert_eq!(snap.get(0).distance_cm, 250.0);
        assert_eq!(r.visited.lock().unwrap().last(), Some(&90));
    }

    #[test]
    fn bidirectional_cycle_publishes_twice_per_sector() {
        let mut r = rig(SweepMode::Bidirectional, obstacle_at_100);
        let running = AtomicBool::new(true);
        assert_eq!(r.scanner.step_cycle(&running), 8);

        let published: Vec<usize> = r
            .events
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                Event::SectorPublished { motor, .. } => Some(motor),
                _ => None,
            })
            .collect();
        assert_eq!(published, vec![0, 1, 2, 3, 3, 2, 1, 0]);

        let visited = r.visited.lock().unwrap();
        assert_eq!(visited[0], 5);
        assert!(visited.contains(&175));
        assert_eq!(visited[visited.len() - 2], 5);
    }

    #[test]
    fn timeouts_do_not_overwrite_last_known_value() {
        let mut r = rig(SweepMode::Forward, obstacle_at_100);
        let running = AtomicBool::new(true);
        r.scanner.step_cycle(&running);

        // Every sample of the next pass times out.
        r.scanner.sensor.field = |_| -1.0;
        assert_eq!(r.scanner.step_cycle(&running), 0);
        let (snap, _) = r.reader.read();
        assert_eq!(snap.get(2), SectorReading::new(60.0, 100));
    }

    #[test]
    fn manual_mode_republishes_owning_sector() {
        let mut r = rig(SweepMode::Bidirectional, |a| if a == 30 { 75.0 } else { 250.0 });
        r.settings.set_sweep_enabled(false).unwrap();
        r.settings.set_manual_angle(30).unwrap();

        let running = AtomicBool::new(true);
        assert_eq!(r.scanner.step_cycle(&running), 1);
        let (snap, _) = r.reader.read();
        assert_eq!(snap.get(0), SectorReading::new(75.0, 30));
        assert!(!snap.get(1).is_known());
        assert_eq!(r.visited.lock().unwrap().as_slice(), &[30]);
    }

    #[test]
    fn narrowed_arc_from_settings_is_honoured() {
        let mut r = rig(SweepMode::Forward, obstacle_at_100);
        r.settings.set_arc_min(90).unwrap();
        r.settings.set_step(10).unwrap();
        let running = AtomicBool::new(true);
        // Sectors 2 and 3 only.
        assert_eq!(r.scanner.step_cycle(&running), 2);
        let visited = r.visited.lock().unwrap();
        assert_eq!(visited.first(), Some(&90));
        assert!(visited.iter().all(|&a| a >= 90));
    }

    #[test]
    fn stop_flag_ends_pass_between_steps() {
        let mut r = rig(SweepMode::Forward, obstacle_at_100);
        let running = AtomicBool::new(false);
        let settings = r.scanner.settings();
        assert_eq!(r.scanner.run_pass(Direction::Forward, settings, &running), 0);
        assert!(r.visited.lock().unwrap().is_empty());
    }
}
