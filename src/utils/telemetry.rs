//! telemetry.rs
//! Per-motor telemetry scalars and the low-priority publishing loop.
//!
//! - The control thread writes every scalar once per cycle, the scan thread
//!   writes the head angle; nothing here takes a lock.
//! - Each scalar is word-atomic. A record may mix values from two adjacent
//!   cycles across fields, never within one field.
//! - The publishing loop snapshots the board at its own rate and hands a
//!   fixed-shape [`TelemetryRecord`] to a [`TelemetrySink`].

use crate::error::TelemetryError;
use crate::hardware::fusion::ActiveSensorCell;
use crate::utils::atomic::AtomicF32;
use crate::utils::metrics::Diagnostics;
use crossbeam::channel::{Sender, TrySendError};
use csv::Writer;
use log::{debug, error};
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::{
    io::Write,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, AtomicU16, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

#[derive(Debug, Default)]
pub struct MotorScalars {
    pub setpoint: AtomicF32,
    pub measurement: AtomicF32,
    pub command: AtomicF32,
    pub distance_cm: AtomicF32,
    pub sector_angle: AtomicU16,
    pub safety: AtomicU8,
    pub range: AtomicU8,
}

pub struct TelemetryBoard {
    motors: Vec<MotorScalars>,
    pub scan_angle: AtomicU16,
    pub range_scale: AtomicF32,
    /// Close/Medium, Medium/Far, Far/OutOfBounds boundaries in effect this cycle.
    pub thresholds: [AtomicF32; 3],
    pub cycle: AtomicU64,
    active_sensor: Arc<ActiveSensorCell>,
    start: Instant,
}

impl TelemetryBoard {
    pub fn new(motors: usize, active_sensor: Arc<ActiveSensorCell>) -> Self {
        Self {
            motors: (0..motors).map(|_| MotorScalars::default()).collect(),
            scan_angle: AtomicU16::new(0),
            range_scale: AtomicF32::new(1.0),
            thresholds: Default::default(),
            cycle: AtomicU64::new(0),
            active_sensor,
            start: Instant::now(),
        }
    }

    pub fn motor(&self, index: usize) -> Option<&MotorScalars> {
        self.motors.get(index)
    }

    pub fn motor_count(&self) -> usize {
        self.motors.len()
    }

    #[inline]
    pub fn set_scan_angle(&self, angle: u16) {
        self.scan_angle.store(angle, Ordering::Relaxed);
    }

    /// Read every scalar once into a record.
    pub fn snapshot(&self) -> TelemetryRecord {
        TelemetryRecord {
            ts_ms: self.start.elapsed().as_millis() as u64,
            cycle: self.cycle.load(Ordering::Relaxed),
            scan_angle: self.scan_angle.load(Ordering::Relaxed),
            active_sensor: self.active_sensor.load() as u8,
            range_scale: self.range_scale.load(),
            thresholds: [
                self.thresholds[0].load(),
                self.thresholds[1].load(),
                self.thresholds[2].load(),
            ],
            motors: self
                .motors
                .iter()
                .map(|m| MotorTelemetry {
                    setpoint: m.setpoint.load(),
                    measurement: m.measurement.load(),
                    command: m.command.load(),
                    distance_cm: m.distance_cm.load(),
                    sector_angle: m.sector_angle.load(Ordering::Relaxed),
                    safety: m.safety.load(Ordering::Relaxed),
                    range: m.range.load(Ordering::Relaxed),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorTelemetry {
    pub setpoint: f32,
    pub measurement: f32,
    pub command: f32,
    pub distance_cm: f32,
    pub sector_angle: u16,
    /// `SafetyState` ordinal.
    pub safety: u8,
    /// `DistanceRange` ordinal.
    pub range: u8,
}

/// Fixed-shape record published every telemetry period.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub ts_ms: u64,
    pub cycle: u64,
    pub scan_angle: u16,
    /// `ActiveSensor` ordinal.
    pub active_sensor: u8,
    pub range_scale: f32,
    pub thresholds: [f32; 3],
    pub motors: Vec<MotorTelemetry>,
}

impl TelemetryRecord {
    /// Column names for `motors` motors, matching [`TelemetryRecord::fields`].
    pub fn header(motors: usize) -> Vec<String> {
        let mut h: Vec<String> = [
            "ts_ms",
            "cycle",
            "scan_angle",
            "active_sensor",
            "range_scale",
            "th_close",
            "th_medium",
            "th_far",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        for m in 0..motors {
            for col in ["setpoint", "measurement", "command", "distance", "angle", "safety", "range"] {
                h.push(format!("m{}_{}", m, col));
            }
        }
        h
    }

    pub fn fields(&self) -> Vec<String> {
        let mut f = vec![
            self.ts_ms.to_string(),
            self.cycle.to_string(),
            self.scan_angle.to_string(),
            self.active_sensor.to_string(),
            format!("{:.3}", self.range_scale),
            format!("{:.1}", self.thresholds[0]),
            format!("{:.1}", self.thresholds[1]),
            format!("{:.1}", self.thresholds[2]),
        ];
        for m in &self.motors {
            f.push(format!("{:.3}", m.setpoint));
            f.push(format!("{:.3}", m.measurement));
            f.push(format!("{:.1}", m.command));
            f.push(format!("{:.1}", m.distance_cm));
            f.push(m.sector_angle.to_string());
            f.push(m.safety.to_string());
            f.push(m.range.to_string());
        }
        f
    }
}

/// Consumer of telemetry records (wire encoder, file, test probe).
pub trait TelemetrySink: Send {
    fn publish(&mut self, record: &TelemetryRecord) -> Result<(), TelemetryError>;

    fn flush(&mut self) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// One CSV row per record, flattened per-motor columns.
pub struct CsvTelemetrySink<W: Write> {
    wtr: Writer<W>,
    motors: usize,
    header_written: bool,
}

impl<W: Write + Send> CsvTelemetrySink<W> {
    pub fn new(inner: W, motors: usize) -> Self {
        Self {
            wtr: csv::WriterBuilder::new().has_headers(false).from_writer(inner),
            motors,
            header_written: false,
        }
    }

    pub fn into_inner(self) -> Option<W> {
        self.wtr.into_inner().ok()
    }
}

impl<W: Write + Send> TelemetrySink for CsvTelemetrySink<W> {
    fn publish(&mut self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        if !self.header_written {
            self.wtr.write_record(TelemetryRecord::header(self.motors))?;
            self.header_written = true;
        }
        self.wtr.write_record(record.fields())?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TelemetryError> {
        self.wtr.flush()?;
        Ok(())
    }
}

/// Non-blocking hand-off to another thread. A full channel drops the record
/// and reports [`TelemetryError::Full`].
pub struct ChannelSink {
    tx: Sender<TelemetryRecord>,
}

impl ChannelSink {
    pub fn new(tx: Sender<TelemetryRecord>) -> Self {
        Self { tx }
    }
}

impl TelemetrySink for ChannelSink {
    fn publish(&mut self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        self.tx.try_send(record.clone()).map_err(|e| match e {
            TrySendError::Full(_) => TelemetryError::Full,
            TrySendError::Disconnected(_) => TelemetryError::Disconnected,
        })
    }
}

/// Periodic publishing loop. Runs until `running` is cleared or the sink disconnects.
pub fn run_telemetry(
    board: Arc<TelemetryBoard>,
    mut sink: Box<dyn TelemetrySink>,
    period: Duration,
    running: Arc<AtomicBool>,
    diagnostics: Arc<Diagnostics>,
) {
    let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
    let mut next_deadline = Instant::now() + period;

    while running.load(Ordering::Acquire) {
        let now = Instant::now();
        if now < next_deadline {
            sleeper.sleep(next_deadline - now);
        }

        let record = board.snapshot();
        match sink.publish(&record) {
            Ok(()) => Diagnostics::bump(&diagnostics.telemetry_records),
            Err(TelemetryError::Disconnected) => {
                debug!("[Telemetry] consumer gone, stopping");
                break;
            }
            Err(TelemetryError::Full) => {
                Diagnostics::bump(&diagnostics.telemetry_dropped);
                debug!("[Telemetry] consumer full, record dropped");
            }
            Err(e) => {
                Diagnostics::bump(&diagnostics.telemetry_dropped);
                error!("[Telemetry] publish failed: {}", e);
            }
        }

        next_deadline += period;
        // Do not try to catch up after a long stall.
        if next_deadline < Instant::now() {
            next_deadline = Instant::now() + period;
        }
    }

    if let Err(e) = sink.flush() {
        error!("[Telemetry] flush failed: {}", e);
    }
    debug!("[Telemetry] stopped.");
}
