//! runtime.rs
//! Thread orchestration for the control core.
//!
//! Three independent OS threads, none waiting on another:
//! - **scan:** sweep loop, priority above telemetry.
//! - **telemetry:** lowest priority, publishes the scalar board at its own rate.
//! - **control:** highest priority, optionally pinned to a core; polls the
//!   cycle with "at least one period elapsed" gating.
//!
//! They share only the distance board, the tunable settings/gains, the range
//! scale and the telemetry scalars. Shutdown is a single `AtomicBool`.

use crate::command::CommandProcessor;
use crate::config::CoreConfig;
use crate::control::controller::SharedGains;
use crate::control::cycle::ControlCycle;
use crate::error::{ConfigError, Result};
use crate::hardware::fusion::ActiveSensorCell;
use crate::hardware::{ActuatorDriver, DistanceSensor, PressureSource, ScanHead};
use crate::scan::board::DistanceBoard;
use crate::scan::scanner::SectorScanner;
use crate::scan::settings::{ScanSettings, SharedScanSettings};
use crate::utils::atomic::AtomicF32;
use crate::utils::metrics::{Diagnostics, DiagnosticsSnapshot, EventRecorder};
use crate::utils::telemetry::{TelemetryBoard, TelemetrySink, run_telemetry};
use log::{debug, error, info};
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use thread_priority::{ThreadBuilderExt, ThreadPriority, ThreadPriorityValue};

/// Idle wait between control polls.
const CONTROL_POLL: Duration = Duration::from_millis(1);

/// Every external collaborator the core needs.
pub struct Hardware<S, H, A, P> {
    pub sensor: S,
    pub head: H,
    pub actuator: A,
    pub pressure: P,
    /// Active-sensor indicator reported in telemetry.
    pub indicator: Arc<ActiveSensorCell>,
}

pub struct Runtime {
    running: Arc<AtomicBool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
    commands: CommandProcessor,
    telemetry: Arc<TelemetryBoard>,
    diagnostics: Arc<Diagnostics>,
    events: EventRecorder,
}

fn spawn<F>(name: &'static str, priority: ThreadPriority, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn_with_priority(priority, move |res| {
            if let Err(e) = res {
                debug!("[Runtime] {} thread priority not applied: {:?}", name, e);
            }
            body();
        })
        .map_err(|source| ConfigError::Spawn { name, source })
}

fn pin_to_core(core: usize) {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    match core_ids.get(core) {
        Some(core_id) if core_affinity::set_for_current(*core_id) => {
            info!("[Runtime] control thread pinned to core {}", core)
        }
        Some(_) => error!("[Runtime] failed to pin control thread to core {}", core),
        None => error!("[Runtime] core {} not among available cores", core),
    }
}

/// Stop and join threads already started when a later spawn fails.
fn abort(running: &AtomicBool, handles: Vec<(&'static str, JoinHandle<()>)>, e: ConfigError) -> ConfigError {
    running.store(false, Ordering::Release);
    for (_, handle) in handles {
        let _ = handle.join();
    }
    error!("[Runtime] startup aborted: {}", e);
    e
}

impl Runtime {
    /// Validate `config` and start the scan, telemetry and control threads.
    pub fn start<S, H, A, P>(
        config: &CoreConfig,
        hardware: Hardware<S, H, A, P>,
        sink: Box<dyn TelemetrySink>,
    ) -> Result<Self>
    where
        S: DistanceSensor + 'static,
        H: ScanHead + 'static,
        A: ActuatorDriver + 'static,
        P: PressureSource + 'static,
    {
        config.validate()?;

        let motors = config.motor_count();
        let lock_timeout = config.lock_timeout();
        let running = Arc::new(AtomicBool::new(true));
        let diagnostics = Arc::new(Diagnostics::default());
        let events = EventRecorder::new();

        let (writer, reader) = DistanceBoard::channel(motors, lock_timeout);
        let settings = Arc::new(SharedScanSettings::new(ScanSettings::from(&config.scan), lock_timeout));
        let gains = Arc::new(SharedGains::from_config(config));
        let range_scale = Arc::new(AtomicF32::new(config.ranges.scale));
        let telemetry = Arc::new(TelemetryBoard::new(motors, hardware.indicator.clone()));
        telemetry.range_scale.store(config.ranges.scale);

        let commands = CommandProcessor::new(
            settings.clone(),
            gains.clone(),
            range_scale.clone(),
            diagnostics.clone(),
        );

        info!(
            "[Runtime] {} motors, arc {}..{}° step {}°, {:?} sweep, control {} Hz, telemetry {} Hz, unit {}",
            motors,
            config.scan.arc_min,
            config.scan.arc_max,
            config.scan.step,
            config.scan.mode,
            config.timing.control_hz,
            config.timing.telemetry_hz,
            config.unit.label()
        );

        let mut handles = Vec::with_capacity(3);

        // ====================================================================
        // Control: highest priority, never waits on the scanner
        // ====================================================================
        let mut cycle = ControlCycle::new(
            config,
            reader,
            hardware.actuator,
            hardware.pressure,
            gains,
            range_scale,
            telemetry.clone(),
            events.clone(),
            diagnostics.clone(),
        );
        let control_core = config.timing.control_core;
        let run = running.clone();
        handles.push((
            "control",
            spawn("control", ThreadPriority::Max, move || {
                if let Some(core) = control_core {
                    pin_to_core(core);
                }
                cycle.reset_controllers();
                let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
                while run.load(Ordering::Acquire) {
                    cycle.poll(Instant::now());
                    sleeper.sleep(CONTROL_POLL);
                }
                cycle.brake_all();
                debug!("[Control] stopped, motors braked.");
            })?,
        ));

        // ====================================================================
        // Scan: above telemetry
        // ====================================================================
        let mut scanner = SectorScanner::new(
            config,
            hardware.sensor,
            hardware.head,
            writer,
            settings,
            telemetry.clone(),
            events.clone(),
            diagnostics.clone(),
        );
        let scan_priority = ThreadPriorityValue::try_from(60u8)
            .map(ThreadPriority::Crossplatform)
            .unwrap_or(ThreadPriority::Max);
        let run = running.clone();
        match spawn("scan", scan_priority, move || scanner.run(run)) {
            Ok(h) => handles.push(("scan", h)),
            Err(e) => return Err(abort(&running, handles, e)),
        }

        // ====================================================================
        // Telemetry: lowest priority
        // ====================================================================
        let board = telemetry.clone();
        let period = config.telemetry_period();
        let run = running.clone();
        let diag = diagnostics.clone();
        match spawn("telemetry", ThreadPriority::Min, move || {
            run_telemetry(board, sink, period, run, diag)
        }) {
            Ok(h) => handles.push(("telemetry", h)),
            Err(e) => return Err(abort(&running, handles, e)),
        }

        Ok(Self {
            running,
            handles,
            commands,
            telemetry,
            diagnostics,
            events,
        })
    }

    pub fn commands(&self) -> &CommandProcessor {
        &self.commands
    }

    pub fn telemetry(&self) -> &Arc<TelemetryBoard> {
        &self.telemetry
    }

    pub fn events(&self) -> &EventRecorder {
        &self.events
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Stop all threads and join them. Motors are braked by the control thread on its way out.
    pub fn shutdown(self) -> DiagnosticsSnapshot {
        self.running.store(false, Ordering::Release);
        for (name, handle) in self.handles {
            match handle.join() {
                Ok(()) => debug!("[Runtime] {} thread joined", name),
                Err(_) => error!("[Runtime] {} thread panicked", name),
            }
        }
        let snapshot = self.diagnostics.snapshot();
        info!("[Runtime] stopped after {} control cycles", snapshot.cycles);
        snapshot
    }
}
