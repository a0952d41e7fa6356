//! # Sector Control Simulation Entry Point
//!
//! Runs the control core against simulated hardware for a fixed duration.
//!
//! ## Usage
//! `sector-control [config.toml] [seconds]`
//! - no config path (or `-`): reference four-motor build, Newton presets
//! - seconds defaults to 10
//!
//! ## Scenario
//! The obstacle field changes in phases while the core runs: open room (Far),
//! something approaching sector 1 (Medium then Close), the whole view opening
//! past the far limit (OutOfBounds, safety unwind), then back to the open room.
//! A few tuning commands are issued along the way and their replies logged.
//!
//! ## Outputs
//! - `data/telemetry.csv`: per-motor scalars at the telemetry rate
//! - `data/events.csv`: sector publications, range changes, safety transitions, contention
//! - `data/config.toml`: the configuration actually run, with every default filled in

use log::{error, info, warn};
use sector_control::{
    CoreConfig, Hardware, Runtime,
    config::MeasurementUnit,
    hardware::{
        fusion::FusedSensor,
        sim::{Obstacle, ObstacleField, SimActuator, SimHead, SimPads, SimPlant, SimRangeSensor},
    },
    utils::telemetry::CsvTelemetrySink,
};
use std::{
    env,
    fs::{File, create_dir_all},
    io::BufWriter,
    process,
    sync::{Arc, atomic::AtomicU16},
    thread,
    time::{Duration, Instant},
};

const DEFAULT_DURATION_SECS: u64 = 10;
const OPEN_ROOM_CM: f32 = 250.0;
const OPEN_VIEW_CM: f32 = 450.0;
const TELEMETRY_CSV: &str = "data/telemetry.csv";
const EVENTS_CSV: &str = "data/events.csv";
const EFFECTIVE_CONFIG: &str = "data/config.toml";

/// Scenario phase, by fraction of the run elapsed.
fn stage_world(field: &ObstacleField, progress: f32) {
    match progress {
        p if p < 0.3 => {
            field.set_background(OPEN_ROOM_CM);
            field.set(Vec::new());
        }
        p if p < 0.6 => {
            // Approach from the room edge to well inside Close.
            let t = (p - 0.3) / 0.3;
            field.set_background(OPEN_ROOM_CM);
            field.set(vec![Obstacle {
                angle: 65,
                half_width: 12,
                distance_cm: OPEN_ROOM_CM - t * 190.0,
            }]);
        }
        p if p < 0.8 => {
            field.set_background(OPEN_VIEW_CM);
            field.set(Vec::new());
        }
        _ => {
            field.set_background(OPEN_ROOM_CM);
            field.set(Vec::new());
        }
    }
}

fn load_config(arg: Option<&str>) -> sector_control::error::Result<CoreConfig> {
    match arg {
        None | Some("-") => Ok(CoreConfig::for_unit(MeasurementUnit::Newtons)),
        Some(path) => {
            info!("[Main] loading configuration from {}", path);
            CoreConfig::from_file(path)
        }
    }
}

fn main() {
    env_logger::init();
    info!("=== SECTOR CONTROL START ===");

    let args: Vec<String> = env::args().collect();
    let config = match load_config(args.get(1).map(String::as_str)) {
        Ok(c) => c,
        Err(e) => {
            error!("[Main] configuration rejected: {}", e);
            process::exit(1);
        }
    };
    let duration = Duration::from_secs(
        args.get(2)
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_DURATION_SECS),
    );

    if let Err(e) = create_dir_all("data") {
        error!("[Main] cannot create data/: {}", e);
        process::exit(1);
    }
    if let Err(e) = config.to_file(EFFECTIVE_CONFIG) {
        warn!("[Main] cannot write {}: {}", EFFECTIVE_CONFIG, e);
    }

    // ========================================================================
    // Simulated world
    // ========================================================================
    let field = Arc::new(ObstacleField::new(OPEN_ROOM_CM));
    let head_angle = Arc::new(AtomicU16::new(config.scan.idle_angle));
    let primary = SimRangeSensor::new(field.clone(), head_angle.clone())
        .with_noise(1.5)
        .with_timeouts(0.02);
    let mut sensor = FusedSensor::new(primary, config.fusion.primary);
    if let Some(limits) = config.fusion.secondary {
        let secondary = SimRangeSensor::new(field.clone(), head_angle.clone()).with_noise(4.0);
        sensor = sensor.with_secondary(secondary, limits);
    }
    let indicator = sensor.indicator();

    let plant = Arc::new(SimPlant::new(config.motor_count()));
    let hardware = Hardware {
        sensor,
        head: SimHead::new(head_angle),
        actuator: SimActuator::new(plant.clone()),
        pressure: SimPads::new(plant, config.unit),
        indicator,
    };

    let sink = match File::create(TELEMETRY_CSV) {
        Ok(file) => CsvTelemetrySink::new(BufWriter::new(file), config.motor_count()),
        Err(e) => {
            error!("[Main] cannot create {}: {}", TELEMETRY_CSV, e);
            process::exit(1);
        }
    };

    let runtime = match Runtime::start(&config, hardware, Box::new(sink)) {
        Ok(rt) => rt,
        Err(e) => {
            error!("[Main] startup failed: {}", e);
            process::exit(1);
        }
    };
    let exporter = runtime
        .events()
        .start_exporter(EVENTS_CSV.to_string(), runtime.running());

    // ========================================================================
    // Scenario
    // ========================================================================
    let script = [
        (0.1, "PI:STATUS"),
        (0.2, "SWEEP:STATUS"),
        (0.45, "RANGE:SCALE:1.2"),
        (0.55, "RANGE:SCALE:1.0"),
        (0.9, "PI:GAINS:10:40"),
    ];
    let mut next_command = 0;
    let started = Instant::now();
    info!("[Main] running for {:?}", duration);

    while started.elapsed() < duration {
        let progress = started.elapsed().as_secs_f32() / duration.as_secs_f32().max(f32::EPSILON);
        stage_world(&field, progress);

        while let Some(&(at, line)) = script.get(next_command) {
            if progress < at {
                break;
            }
            match runtime.commands().handle_line(line) {
                Some(reply) if reply.starts_with("ERR") => warn!("[Main] {} -> {}", line, reply),
                Some(reply) => info!("[Main] {} -> {}", line, reply),
                None => {}
            }
            next_command += 1;
        }

        thread::sleep(Duration::from_millis(50));
    }

    let events = runtime.events().clone();
    let diag = runtime.shutdown();
    if exporter.join().is_err() {
        error!("[Main] event exporter panicked");
    }

    info!("=== SECTOR CONTROL SUMMARY ===");
    info!(
        "[Main] cycles={} overruns={} safety_trips={}",
        diag.cycles, diag.overruns, diag.safety_trips
    );
    info!(
        "[Main] samples={} invalid={} publications={} missed_publishes={}",
        diag.samples, diag.invalid_samples, diag.publications, diag.missed_publishes
    );
    info!(
        "[Main] stale_reads={} settings_contention={} gains_contention={}",
        diag.stale_reads, diag.settings_contention, diag.gains_contention
    );
    info!(
        "[Main] telemetry records={} dropped={} rejected_commands={} events_dropped={}",
        diag.telemetry_records,
        diag.telemetry_dropped,
        diag.rejected_commands,
        events.dropped()
    );
    info!("=== SECTOR CONTROL FINISHED ===");
}
