//! Error types for the control core.
//!
//! Only two kinds of failure ever surface as `Err`:
//! - [`ConfigError`]: configuration invariant violations, checked once at startup.
//! - [`CommandError`]: a runtime tuning request rejected at the command boundary.
//!
//! [`TelemetryError`] stays inside the telemetry thread.
//!
//! Sensor timeouts and lock contention are recovered locally (sentinel values,
//! stale fallbacks) and never become errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Fatal startup problems. The core refuses to run with any of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("at least one motor is required")]
    NoMotors,

    #[error("sector {index} is empty or inverted: [{min}, {max}]")]
    SectorInverted { index: usize, min: u16, max: u16 },

    #[error("gap or overlap between sector {index} (max {max}) and sector {next} (min {next_min})")]
    SectorMisaligned {
        index: usize,
        max: u16,
        next: usize,
        next_min: u16,
    },

    #[error("sectors span [{sectors_min}, {sectors_max}] but scan arc is [{arc_min}, {arc_max}]")]
    ArcCoverage {
        sectors_min: u16,
        sectors_max: u16,
        arc_min: u16,
        arc_max: u16,
    },

    #[error("scan parameter invalid: {0}")]
    Scan(String),

    #[error("distance thresholds invalid: {0}")]
    Thresholds(String),

    #[error("setpoints invalid: {0}")]
    Setpoints(String),

    #[error("controller parameters invalid: {0}")]
    Controller(String),

    #[error("safety parameters invalid: {0}")]
    Safety(String),

    #[error("timing invalid: {0}")]
    Timing(String),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

/// A rejected runtime tuning request. Core state is unchanged when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("{what}:{value} outside [{min}, {max}]")]
    OutOfRange {
        what: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("MIN:{min} >= MAX:{max}")]
    InvalidRange { min: u16, max: u16 },

    #[error("manual angle rejected while sweep is enabled")]
    SweepActive,

    #[error("gains must be finite and non-negative (kp={kp}, ki={ki})")]
    InvalidGain { kp: f32, ki: f32 },

    #[error("{0} busy, retry")]
    Busy(&'static str),

    #[error("unrecognised command: {0}")]
    Unknown(String),
}

/// Telemetry sink failure. Logged by the telemetry thread; never reaches control.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("telemetry consumer full, record dropped")]
    Full,

    #[error("telemetry consumer disconnected")]
    Disconnected,
}

impl CommandError {
    /// Reply token used on the command line protocol (`ERR:<KIND>:<detail>`).
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::OutOfRange { .. } => "OUT_OF_RANGE",
            CommandError::InvalidRange { .. } => "INVALID_RANGE",
            CommandError::SweepActive => "SWEEP_ACTIVE",
            CommandError::InvalidGain { .. } => "INVALID_GAIN",
            CommandError::Busy(_) => "MUTEX",
            CommandError::Unknown(_) => "INVALID_COMMAND",
        }
    }
}
