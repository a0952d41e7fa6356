//! command.rs
//! Text command processor: one request per line, one reply per line.
//!
//! ```text
//! SWEEP:ENABLE | SWEEP:DISABLE | SWEEP:STATUS
//! SWEEP:MIN:<deg> | SWEEP:MAX:<deg> | SWEEP:STEP:<deg> | SWEEP:SETTLE:<ms>
//! SERVO:ANGLE:<deg>
//! PI:GAINS:<kp>:<ki> | PI:STATUS
//! RANGE:SCALE:<factor>
//! ```
//!
//! Replies are `ACK:<request>`, `STATUS:<fields>` or `ERR:<KIND>:<detail>`.
//! Every setter validates first; a rejected request changes nothing.

use crate::control::controller::SharedGains;
use crate::error::CommandError;
use crate::scan::settings::SharedScanSettings;
use crate::utils::atomic::AtomicF32;
use crate::utils::metrics::Diagnostics;
use log::{info, warn};
use std::sync::Arc;

pub const RANGE_SCALE_MIN: f32 = 0.25;
pub const RANGE_SCALE_MAX: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SweepEnable,
    SweepDisable,
    SweepMin(u16),
    SweepMax(u16),
    SweepStep(u16),
    SweepSettle(u64),
    SweepStatus,
    ServoAngle(u16),
    PiGains { kp: f32, ki: f32 },
    PiStatus,
    RangeScale(f32),
}

/// Integer argument, range-checked into `T`.
fn int_arg<T: TryFrom<i64>>(what: &'static str, raw: &str, min: i64, max: i64) -> Result<T, CommandError> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| CommandError::Unknown(format!("{}:{}", what, raw)))?;
    if value < min || value > max {
        return Err(CommandError::OutOfRange {
            what,
            value: value as f32,
            min: min as f32,
            max: max as f32,
        });
    }
    T::try_from(value).map_err(|_| CommandError::Unknown(format!("{}:{}", what, raw)))
}

fn float_arg(what: &'static str, raw: &str) -> Result<f32, CommandError> {
    raw.trim()
        .parse()
        .map_err(|_| CommandError::Unknown(format!("{}:{}", what, raw)))
}

impl Command {
    /// Parse one line. Angle/step/settle bounds are checked here; cross-field
    /// rules (min < max, sweep state) are checked by the setters.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        use crate::config::{ANGLE_LIMIT_MAX, ANGLE_LIMIT_MIN, SETTLE_MAX_MS, STEP_MAX, STEP_MIN};
        let (amin, amax) = (ANGLE_LIMIT_MIN as i64, ANGLE_LIMIT_MAX as i64);

        let line = line.trim();
        let parts: Vec<&str> = line.split(':').collect();
        match parts.as_slice() {
            ["SWEEP", "ENABLE"] => Ok(Command::SweepEnable),
            ["SWEEP", "DISABLE"] => Ok(Command::SweepDisable),
            ["SWEEP", "STATUS"] => Ok(Command::SweepStatus),
            ["SWEEP", "MIN", v] => int_arg("MIN", v, amin, amax).map(Command::SweepMin),
            ["SWEEP", "MAX", v] => int_arg("MAX", v, amin, amax).map(Command::SweepMax),
            ["SWEEP", "STEP", v] => {
                int_arg("STEP", v, STEP_MIN as i64, STEP_MAX as i64).map(Command::SweepStep)
            }
            ["SWEEP", "SETTLE", v] => {
                int_arg("SETTLE", v, 0, SETTLE_MAX_MS as i64).map(Command::SweepSettle)
            }
            ["SERVO", "ANGLE", v] => int_arg("ANGLE", v, amin, amax).map(Command::ServoAngle),
            ["PI", "GAINS", kp, ki] => Ok(Command::PiGains {
                kp: float_arg("KP", kp)?,
                ki: float_arg("KI", ki)?,
            }),
            ["PI", "STATUS"] => Ok(Command::PiStatus),
            ["RANGE", "SCALE", v] => {
                let scale = float_arg("SCALE", v)?;
                if !(RANGE_SCALE_MIN..=RANGE_SCALE_MAX).contains(&scale) {
                    return Err(CommandError::OutOfRange {
                        what: "SCALE",
                        value: scale,
                        min: RANGE_SCALE_MIN,
                        max: RANGE_SCALE_MAX,
                    });
                }
                Ok(Command::RangeScale(scale))
            }
            _ => Err(CommandError::Unknown(line.to_string())),
        }
    }
}

/// The command-processing collaborator: owns handles to every tunable.
pub struct CommandProcessor {
    settings: Arc<SharedScanSettings>,
    gains: Arc<SharedGains>,
    range_scale: Arc<AtomicF32>,
    diagnostics: Arc<Diagnostics>,
}

impl CommandProcessor {
    pub fn new(
        settings: Arc<SharedScanSettings>,
        gains: Arc<SharedGains>,
        range_scale: Arc<AtomicF32>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            settings,
            gains,
            range_scale,
            diagnostics,
        }
    }

    /// Apply `cmd`, returning the success reply body.
    pub fn execute(&self, cmd: Command) -> Result<String, CommandError> {
        match cmd {
            Command::SweepEnable => self.settings.set_sweep_enabled(true).map(|_| "ACK:SWEEP:ENABLE".into()),
            Command::SweepDisable => self.settings.set_sweep_enabled(false).map(|_| "ACK:SWEEP:DISABLE".into()),
            Command::SweepMin(a) => self.settings.set_arc_min(a).map(|_| format!("ACK:SWEEP:MIN:{}", a)),
            Command::SweepMax(a) => self.settings.set_arc_max(a).map(|_| format!("ACK:SWEEP:MAX:{}", a)),
            Command::SweepStep(s) => self.settings.set_step(s).map(|_| format!("ACK:SWEEP:STEP:{}", s)),
            Command::SweepSettle(ms) => self
                .settings
                .set_settle_ms(ms)
                .map(|_| format!("ACK:SWEEP:SETTLE:{}", ms)),
            Command::ServoAngle(a) => self
                .settings
                .set_manual_angle(a)
                .map(|_| format!("ACK:SERVO:ANGLE:{}", a)),
            Command::SweepStatus => {
                let s = self.settings.snapshot().ok_or(CommandError::Busy("scan settings"))?;
                Ok(format!(
                    "STATUS:SWEEP:{}:MIN:{}:MAX:{}:STEP:{}:SETTLE:{}:ANGLE:{}",
                    if s.sweep_enabled { "ON" } else { "OFF" },
                    s.arc_min,
                    s.arc_max,
                    s.step,
                    s.settle_ms,
                    s.manual_angle
                ))
            }
            Command::PiGains { kp, ki } => self
                .gains
                .set(kp, ki)
                .map(|_| format!("ACK:PI:GAINS:{}:{}", kp, ki)),
            Command::PiStatus => {
                let g = self.gains.get().ok_or(CommandError::Busy("gains"))?;
                Ok(format!("STATUS:PI:KP:{}:KI:{}", g.kp, g.ki))
            }
            Command::RangeScale(scale) => {
                self.range_scale.store(scale);
                Ok(format!("ACK:RANGE:SCALE:{}", scale))
            }
        }
    }

    /// Parse, apply and render one line. Blank lines get no reply.
    pub fn handle_line(&self, line: &str) -> Option<String> {
        if line.trim().is_empty() {
            return None;
        }
        let reply = Command::parse(line).and_then(|cmd| self.execute(cmd));
        Some(match reply {
            Ok(ack) => {
                info!("[Command] {} -> {}", line.trim(), ack);
                ack
            }
            Err(e) => {
                Diagnostics::bump(&self.diagnostics.rejected_commands);
                warn!("[Command] rejected {}: {}", line.trim(), e);
                format!("ERR:{}:{}", e.kind(), e)
            }
        })
    }
}
