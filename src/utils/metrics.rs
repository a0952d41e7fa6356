//! Event recording and diagnostics counters for the control core.
//!
//! Two independent paths:
//! - **EventRecorder:** lock-free queue (16K capacity) → background CSV export (nanosecond timestamps).
//! - **Diagnostics:** plain atomic counters, bumped from any thread, read as a snapshot.
//!
//! Neither path ever blocks the scan or control thread.

use crate::control::classifier::DistanceRange;
use crate::control::safety::SafetyState;
use crossbeam_queue::ArrayQueue;
use log::error;
use std::{
    fs::File,
    io::{BufWriter, Write},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

/// Shared resource whose lock was not acquired within the bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockSite {
    DistanceRead,
    DistanceWrite,
    ScanSettings,
    Gains,
}

impl LockSite {
    fn label(&self) -> &'static str {
        match self {
            LockSite::DistanceRead => "distance_read",
            LockSite::DistanceWrite => "distance_write",
            LockSite::ScanSettings => "scan_settings",
            LockSite::Gains => "gains",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Scan thread closed a sector and published its minimum.
    SectorPublished {
        ts_ns: u64,
        motor: usize,
        distance_cm: f32,
        angle: u16,
    },
    RangeChanged {
        ts_ns: u64,
        motor: usize,
        from: DistanceRange,
        to: DistanceRange,
    },
    SafetyTransition {
        ts_ns: u64,
        motor: usize,
        from: SafetyState,
        to: SafetyState,
    },
    LockContention {
        ts_ns: u64,
        site: LockSite,
    },
    /// Control tick whose own execution exceeded the period.
    CycleOverrun {
        ts_ns: u64,
        cycle: u64,
        exec_us: u64,
    },
}

impl Event {
    /// CSV row: ts_ns,event,motor,field1,field2
    pub fn to_csv_row(&self) -> String {
        match self {
            Event::SectorPublished { ts_ns, motor, distance_cm, angle } => {
                format!("{},SectorPublished,{},{},{}", ts_ns, motor, distance_cm, angle)
            }
            Event::RangeChanged { ts_ns, motor, from, to } => {
                format!("{},RangeChanged,{},{:?},{:?}", ts_ns, motor, from, to)
            }
            Event::SafetyTransition { ts_ns, motor, from, to } => {
                format!("{},SafetyTransition,{},{:?},{:?}", ts_ns, motor, from, to)
            }
            Event::LockContention { ts_ns, site } => {
                format!("{},LockContention,,{},", ts_ns, site.label())
            }
            Event::CycleOverrun { ts_ns, cycle, exec_us } => {
                format!("{},CycleOverrun,,{},{}", ts_ns, cycle, exec_us)
            }
        }
    }
}

const EVENT_QUEUE_CAPACITY: usize = 16_384;

/// Non-blocking event recorder with background CSV export.
///
/// `record()` appends to a lock-free queue and returns immediately; when the
/// queue is full the event is dropped and counted.
pub struct EventRecorder {
    queue: Arc<ArrayQueue<Event>>,
    dropped: Arc<AtomicU64>,
    run_start: Instant,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity.max(1))),
            dropped: Arc::new(AtomicU64::new(0)),
            run_start: Instant::now(),
        }
    }

    #[inline]
    pub fn record(&self, event: Event) {
        if self.queue.push(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Nanosecond timestamp since recorder creation.
    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.run_start.elapsed().as_nanos() as u64
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Pop everything currently queued. Used by tests and one-shot exports.
    pub fn drain(&self) -> Vec<Event> {
        let mut out = Vec::with_capacity(self.queue.len());
        while let Some(e) = self.queue.pop() {
            out.push(e);
        }
        out
    }

    /// Spawns a thread draining the queue to `output_csv`.
    /// Exits once `running` is cleared and the queue is empty.
    pub fn start_exporter(
        &self,
        output_csv: String,
        running: Arc<AtomicBool>,
    ) -> thread::JoinHandle<()> {
        let queue = self.queue.clone();

        thread::spawn(move || match File::create(&output_csv) {
            Ok(file) => {
                let mut writer = BufWriter::new(file);
                let _ = writeln!(writer, "ts_ns,event,motor,field1,field2");

                loop {
                    match queue.pop() {
                        Some(event) => {
                            let _ = writeln!(writer, "{}", event.to_csv_row());
                        }
                        None => {
                            if !running.load(Ordering::Relaxed) && queue.is_empty() {
                                break;
                            }
                            thread::sleep(Duration::from_millis(10));
                        }
                    }
                }

                let _ = writer.flush();
            }
            Err(e) => {
                error!("Failed to create event CSV {}: {}", output_csv, e);
            }
        })
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventRecorder {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            dropped: self.dropped.clone(),
            run_start: self.run_start,
        }
    }
}

/// Runtime counters. All increments are `Relaxed`; values are only ever summed.
#[derive(Debug, Default)]
pub struct Diagnostics {
    pub cycles: AtomicU64,
    pub overruns: AtomicU64,
    pub samples: AtomicU64,
    pub invalid_samples: AtomicU64,
    pub publications: AtomicU64,
    pub stale_reads: AtomicU64,
    pub missed_publishes: AtomicU64,
    pub settings_contention: AtomicU64,
    pub gains_contention: AtomicU64,
    pub safety_trips: AtomicU64,
    pub telemetry_records: AtomicU64,
    pub telemetry_dropped: AtomicU64,
    pub rejected_commands: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiagnosticsSnapshot {
    pub cycles: u64,
    pub overruns: u64,
    pub samples: u64,
    pub invalid_samples: u64,
    pub publications: u64,
    pub stale_reads: u64,
    pub missed_publishes: u64,
    pub settings_contention: u64,
    pub gains_contention: u64,
    pub safety_trips: u64,
    pub telemetry_records: u64,
    pub telemetry_dropped: u64,
    pub rejected_commands: u64,
}

impl Diagnostics {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let r = |c: &AtomicU64| c.load(Ordering::Relaxed);
        DiagnosticsSnapshot {
            cycles: r(&self.cycles),
            overruns: r(&self.overruns),
            samples: r(&self.samples),
            invalid_samples: r(&self.invalid_samples),
            publications: r(&self.publications),
            stale_reads: r(&self.stale_reads),
            missed_publishes: r(&self.missed_publishes),
            settings_contention: r(&self.settings_contention),
            gains_contention: r(&self.gains_contention),
            safety_trips: r(&self.safety_trips),
            telemetry_records: r(&self.telemetry_records),
            telemetry_dropped: r(&self.telemetry_dropped),
            rejected_commands: r(&self.rejected_commands),
        }
    }
}
