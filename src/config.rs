//! Core configuration.
//!
//! Loaded from TOML, or built from a [`MeasurementUnit`] preset. A file only has
//! to name what it changes: missing sections and fields are filled from the
//! preset of the file's `unit` (Newtons when `unit` is absent).
//!
//! [`CoreConfig::validate`] is the single startup gate for configuration
//! invariants. Nothing downstream re-checks them.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

/// Physical travel limits of the scan head (degrees).
pub const ANGLE_LIMIT_MIN: u16 = 0;
pub const ANGLE_LIMIT_MAX: u16 = 180;

/// Accepted sweep step range (degrees).
pub const STEP_MIN: u16 = 1;
pub const STEP_MAX: u16 = 20;

/// Accepted settle / reading delay range (milliseconds).
pub const SETTLE_MAX_MS: u64 = 500;

/// Unit the pressure/force acquisition reports in. Only the presets differ;
/// the algorithms treat the value as "larger = more force".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementUnit {
    /// Calibrated force.
    #[default]
    Newtons,
    /// Raw pad voltage.
    Millivolts,
}

impl MeasurementUnit {
    pub fn label(&self) -> &'static str {
        match self {
            MeasurementUnit::Newtons => "N",
            MeasurementUnit::Millivolts => "mV",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SweepMode {
    /// min → max, then restart at min.
    Forward,
    /// min → max → min, publishing in both directions.
    #[default]
    Bidirectional,
}

/// Which sector owns an angle that sits exactly on a shared seam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SeamOwner {
    /// `[min, max)`, the final sector closes on its max.
    #[default]
    Upper,
    /// `(min, max]`, the first sector closes on its min.
    Lower,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawConfig")]
pub struct CoreConfig {
    pub unit: MeasurementUnit,
    pub scan: ScanConfig,
    pub sectors: Vec<SectorConfig>,
    pub ranges: RangeConfig,
    pub setpoints: SetpointConfig,
    pub controller: ControllerConfig,
    pub safety: SafetyConfig,
    pub timing: TimingConfig,
    pub fusion: FusionConfig,
}

// ============================================================================
// File overlay
// ============================================================================

/// On-disk shape of [`CoreConfig`]. Unit-independent sections are taken whole
/// (with their own field defaults); unit-dependent ones are overlaid field by
/// field on the preset of `unit`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    unit: MeasurementUnit,
    scan: Option<ScanConfig>,
    sectors: Option<Vec<SectorConfig>>,
    ranges: Option<RangeConfig>,
    setpoints: SetpointOverlay,
    controller: ControllerOverlay,
    safety: SafetyOverlay,
    timing: Option<TimingConfig>,
    fusion: Option<FusionConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SetpointOverlay {
    far: Option<f32>,
    medium: Option<f32>,
    close: Option<f32>,
    security_offset: Option<f32>,
    medium_to_far_baseline: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ControllerOverlay {
    kp: Option<f32>,
    ki: Option<f32>,
    output_min: Option<f32>,
    output_max: Option<f32>,
    min_run: Option<f32>,
    pressure_samples: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SafetyOverlay {
    reverse_duty: Option<f32>,
    deflate_ms: Option<u64>,
    release_ms: Option<u64>,
    safe_threshold: Option<f32>,
}

impl SetpointOverlay {
    fn over(self, base: SetpointConfig) -> SetpointConfig {
        SetpointConfig {
            far: self.far.unwrap_or(base.far),
            medium: self.medium.unwrap_or(base.medium),
            close: self.close.unwrap_or(base.close),
            security_offset: self.security_offset.unwrap_or(base.security_offset),
            medium_to_far_baseline: self
                .medium_to_far_baseline
                .unwrap_or(base.medium_to_far_baseline),
        }
    }
}

impl ControllerOverlay {
    fn over(self, base: ControllerConfig) -> ControllerConfig {
        ControllerConfig {
            kp: self.kp.unwrap_or(base.kp),
            ki: self.ki.unwrap_or(base.ki),
            output_min: self.output_min.unwrap_or(base.output_min),
            output_max: self.output_max.unwrap_or(base.output_max),
            min_run: self.min_run.unwrap_or(base.min_run),
            pressure_samples: self.pressure_samples.unwrap_or(base.pressure_samples),
        }
    }
}

impl SafetyOverlay {
    fn over(self, base: SafetyConfig) -> SafetyConfig {
        SafetyConfig {
            reverse_duty: self.reverse_duty.unwrap_or(base.reverse_duty),
            deflate_ms: self.deflate_ms.unwrap_or(base.deflate_ms),
            release_ms: self.release_ms.or(base.release_ms),
            safe_threshold: self.safe_threshold.or(base.safe_threshold),
        }
    }
}

impl From<RawConfig> for CoreConfig {
    fn from(raw: RawConfig) -> Self {
        let preset = CoreConfig::for_unit(raw.unit);
        Self {
            unit: raw.unit,
            scan: raw.scan.unwrap_or(preset.scan),
            sectors: raw.sectors.unwrap_or(preset.sectors),
            ranges: raw.ranges.unwrap_or(preset.ranges),
            setpoints: raw.setpoints.over(preset.setpoints),
            controller: raw.controller.over(preset.controller),
            safety: raw.safety.over(preset.safety),
            timing: raw.timing.unwrap_or(preset.timing),
            fusion: raw.fusion.unwrap_or(preset.fusion),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub arc_min: u16,
    pub arc_max: u16,
    pub step: u16,
    pub settle_ms: u64,
    /// Extra wait after each sample.
    pub reading_delay_ms: u64,
    pub idle_angle: u16,
    pub idle_pause_ms: u64,
    pub manual_angle: u16,
    pub sweep_enabled: bool,
    pub mode: SweepMode,
    pub seam: SeamOwner,
}

/// Angular span owned by one motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorConfig {
    pub min: u16,
    pub max: u16,
}

/// Distance bands in centimeters. `near_limit_cm` is the lower edge of Close;
/// the three maxima are the Close/Medium, Medium/Far and Far/OutOfBounds boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    pub near_limit_cm: f32,
    pub close_max_cm: f32,
    pub medium_max_cm: f32,
    pub far_max_cm: f32,
    /// Initial runtime scale applied to the three maxima.
    pub scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetpointConfig {
    /// Far setpoint used until a baseline is captured.
    pub far: f32,
    pub medium: f32,
    pub close: f32,
    /// Added to the captured baseline while in Far.
    pub security_offset: f32,
    /// Baseline used when Far is entered directly from Medium.
    pub medium_to_far_baseline: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub kp: f32,
    pub ki: f32,
    pub output_min: f32,
    pub output_max: f32,
    /// Deadband: |output| below this is emitted as 0.
    pub min_run: f32,
    /// Samples averaged per pad reading.
    pub pressure_samples: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Magnitude of the reverse command while deflating/releasing (%).
    pub reverse_duty: f32,
    pub deflate_ms: u64,
    /// `None` skips the Releasing state.
    pub release_ms: Option<u64>,
    /// When set, deflation ends early once the measurement drops to this value,
    /// and recovery to Normal additionally requires the measurement below it.
    pub safe_threshold: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub control_hz: u32,
    pub telemetry_hz: u32,
    /// Bounded wait on every shared-state lock.
    pub lock_timeout_ms: u64,
    /// Pin the control thread to this core when set.
    pub control_core: Option<usize>,
}

/// Validity window for one distance sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorLimits {
    pub min_cm: f32,
    pub max_cm: f32,
}

impl SensorLimits {
    #[inline]
    pub fn accepts(&self, distance_cm: f32) -> bool {
        distance_cm > 0.0 && distance_cm >= self.min_cm && distance_cm <= self.max_cm
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub primary: SensorLimits,
    /// Fused secondary sensor; `None` runs the primary alone.
    pub secondary: Option<SensorLimits>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            arc_min: 5,
            arc_max: 175,
            step: 5,
            settle_ms: 5,
            reading_delay_ms: 5,
            idle_angle: 90,
            idle_pause_ms: 100,
            manual_angle: 90,
            sweep_enabled: true,
            mode: SweepMode::Bidirectional,
            seam: SeamOwner::Upper,
        }
    }
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            near_limit_cm: 0.0,
            close_max_cm: 100.0,
            medium_max_cm: 200.0,
            far_max_cm: 300.0,
            scale: 1.0,
        }
    }
}

impl SetpointConfig {
    pub fn for_unit(unit: MeasurementUnit) -> Self {
        match unit {
            MeasurementUnit::Newtons => Self {
                far: 1.0,
                medium: 2.0,
                close: 4.0,
                security_offset: 0.5,
                medium_to_far_baseline: 0.5,
            },
            // ~80 mV per N on the reference pads
            MeasurementUnit::Millivolts => Self {
                far: 80.0,
                medium: 160.0,
                close: 320.0,
                security_offset: 40.0,
                medium_to_far_baseline: 40.0,
            },
        }
    }
}

impl Default for SetpointConfig {
    fn default() -> Self {
        Self::for_unit(MeasurementUnit::Newtons)
    }
}

impl ControllerConfig {
    pub fn for_unit(unit: MeasurementUnit) -> Self {
        let (kp, ki) = match unit {
            MeasurementUnit::Newtons => (12.0, 48.0),
            MeasurementUnit::Millivolts => (0.15, 0.60),
        };
        Self {
            kp,
            ki,
            output_min: -100.0,
            output_max: 100.0,
            min_run: 40.0,
            pressure_samples: 8,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::for_unit(MeasurementUnit::Newtons)
    }
}

impl SafetyConfig {
    pub fn for_unit(unit: MeasurementUnit) -> Self {
        let safe_threshold = match unit {
            MeasurementUnit::Newtons => 5.0,
            MeasurementUnit::Millivolts => 400.0,
        };
        Self {
            reverse_duty: 60.0,
            deflate_ms: 2_000,
            release_ms: Some(1_300),
            safe_threshold: Some(safe_threshold),
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self::for_unit(MeasurementUnit::Newtons)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            control_hz: 50,
            telemetry_hz: 50,
            lock_timeout_ms: 10,
            control_core: None,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            primary: SensorLimits {
                min_cm: 0.0,
                max_cm: 1_000.0,
            },
            secondary: Some(SensorLimits {
                min_cm: 30.0,
                max_cm: 500.0,
            }),
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::for_unit(MeasurementUnit::Newtons)
    }
}

impl CoreConfig {
    /// Reference four-motor build with the presets of `unit`.
    pub fn for_unit(unit: MeasurementUnit) -> Self {
        Self {
            unit,
            scan: ScanConfig::default(),
            sectors: vec![
                SectorConfig { min: 5, max: 45 },
                SectorConfig { min: 45, max: 90 },
                SectorConfig { min: 90, max: 135 },
                SectorConfig { min: 135, max: 175 },
            ],
            ranges: RangeConfig::default(),
            setpoints: SetpointConfig::for_unit(unit),
            controller: ControllerConfig::for_unit(unit),
            safety: SafetyConfig::for_unit(unit),
            timing: TimingConfig::default(),
            fusion: FusionConfig::default(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: CoreConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    #[inline]
    pub fn motor_count(&self) -> usize {
        self.sectors.len()
    }

    pub fn control_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.timing.control_hz.max(1) as f64)
    }

    /// Control period in seconds, the `dt` of the PI law.
    pub fn dt_secs(&self) -> f32 {
        1.0 / self.timing.control_hz.max(1) as f32
    }

    pub fn telemetry_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.timing.telemetry_hz.max(1) as f64)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.timing.lock_timeout_ms)
    }

    /// Check every startup invariant. Called once before any thread starts.
    pub fn validate(&self) -> Result<()> {
        self.validate_sectors()?;
        self.validate_scan()?;
        self.validate_ranges()?;
        self.validate_setpoints()?;
        self.validate_controller()?;
        self.validate_safety()?;
        self.validate_timing()?;
        Ok(())
    }

    fn validate_sectors(&self) -> Result<()> {
        if self.sectors.is_empty() {
            return Err(ConfigError::NoMotors);
        }
        for (index, s) in self.sectors.iter().enumerate() {
            if s.min >= s.max {
                return Err(ConfigError::SectorInverted {
                    index,
                    min: s.min,
                    max: s.max,
                });
            }
        }
        for (index, pair) in self.sectors.windows(2).enumerate() {
            if pair[0].max != pair[1].min {
                return Err(ConfigError::SectorMisaligned {
                    index,
                    max: pair[0].max,
                    next: index + 1,
                    next_min: pair[1].min,
                });
            }
        }
        let sectors_min = self.sectors[0].min;
        let sectors_max = self.sectors[self.sectors.len() - 1].max;
        if sectors_min != self.scan.arc_min || sectors_max != self.scan.arc_max {
            return Err(ConfigError::ArcCoverage {
                sectors_min,
                sectors_max,
                arc_min: self.scan.arc_min,
                arc_max: self.scan.arc_max,
            });
        }
        Ok(())
    }

    fn validate_scan(&self) -> Result<()> {
        let s = &self.scan;
        if s.arc_min >= s.arc_max || s.arc_max > ANGLE_LIMIT_MAX {
            return Err(ConfigError::Scan(format!(
                "arc [{}, {}] must satisfy {} <= min < max <= {}",
                s.arc_min, s.arc_max, ANGLE_LIMIT_MIN, ANGLE_LIMIT_MAX
            )));
        }
        if !(STEP_MIN..=STEP_MAX).contains(&s.step) {
            return Err(ConfigError::Scan(format!(
                "step {} outside [{}, {}]",
                s.step, STEP_MIN, STEP_MAX
            )));
        }
        if s.settle_ms > SETTLE_MAX_MS || s.reading_delay_ms > SETTLE_MAX_MS {
            return Err(ConfigError::Scan(format!(
                "settle {} ms / reading delay {} ms above {} ms",
                s.settle_ms, s.reading_delay_ms, SETTLE_MAX_MS
            )));
        }
        if s.idle_angle > ANGLE_LIMIT_MAX || s.manual_angle > ANGLE_LIMIT_MAX {
            return Err(ConfigError::Scan(format!(
                "idle {} / manual {} angle beyond {}",
                s.idle_angle, s.manual_angle, ANGLE_LIMIT_MAX
            )));
        }
        Ok(())
    }

    fn validate_ranges(&self) -> Result<()> {
        let r = &self.ranges;
        let ordered = r.near_limit_cm >= 0.0
            && r.near_limit_cm < r.close_max_cm
            && r.close_max_cm < r.medium_max_cm
            && r.medium_max_cm < r.far_max_cm;
        if !ordered {
            return Err(ConfigError::Thresholds(format!(
                "need 0 <= near {} < close {} < medium {} < far {}",
                r.near_limit_cm, r.close_max_cm, r.medium_max_cm, r.far_max_cm
            )));
        }
        if !(r.scale.is_finite() && r.scale > 0.0) {
            return Err(ConfigError::Thresholds(format!("scale {} must be > 0", r.scale)));
        }
        Ok(())
    }

    fn validate_setpoints(&self) -> Result<()> {
        let s = &self.setpoints;
        if !(s.far > 0.0 && s.medium > s.far && s.close > s.medium) {
            return Err(ConfigError::Setpoints(format!(
                "need close {} > medium {} > far {} > 0",
                s.close, s.medium, s.far
            )));
        }
        if s.security_offset < 0.0 || s.medium_to_far_baseline < 0.0 {
            return Err(ConfigError::Setpoints(
                "security offset and medium->far baseline must be non-negative".into(),
            ));
        }
        Ok(())
    }

    fn validate_controller(&self) -> Result<()> {
        let c = &self.controller;
        if !(c.kp >= 0.0 && c.ki >= 0.0 && c.kp.is_finite() && c.ki.is_finite()) {
            return Err(ConfigError::Controller(format!(
                "gains must be non-negative (kp={}, ki={})",
                c.kp, c.ki
            )));
        }
        if !(c.output_max > 0.0 && c.output_min < 0.0) {
            return Err(ConfigError::Controller(format!(
                "output limits [{}, {}] must straddle zero",
                c.output_min, c.output_max
            )));
        }
        if !(c.min_run >= 0.0 && c.min_run < c.output_max) {
            return Err(ConfigError::Controller(format!(
                "deadband {} must lie in [0, {})",
                c.min_run, c.output_max
            )));
        }
        if c.pressure_samples == 0 {
            return Err(ConfigError::Controller("pressure_samples must be >= 1".into()));
        }
        Ok(())
    }

    fn validate_safety(&self) -> Result<()> {
        let s = &self.safety;
        if !(s.reverse_duty > 0.0 && s.reverse_duty <= self.controller.output_max) {
            return Err(ConfigError::Safety(format!(
                "reverse duty {} must lie in (0, {}]",
                s.reverse_duty, self.controller.output_max
            )));
        }
        if s.deflate_ms == 0 {
            return Err(ConfigError::Safety("deflate_ms must be > 0".into()));
        }
        if let Some(t) = s.safe_threshold {
            if !(t.is_finite() && t >= 0.0) {
                return Err(ConfigError::Safety(format!("safe threshold {} invalid", t)));
            }
        }
        Ok(())
    }

    fn validate_timing(&self) -> Result<()> {
        let t = &self.timing;
        if t.control_hz == 0 || t.telemetry_hz == 0 {
            return Err(ConfigError::Timing(format!(
                "control {} Hz / telemetry {} Hz must be > 0",
                t.control_hz, t.telemetry_hz
            )));
        }
        if t.lock_timeout_ms == 0 {
            return Err(ConfigError::Timing("lock_timeout_ms must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.motor_count(), 4);
        assert_eq!(config.controller.kp, 12.0);
        assert!((config.dt_secs() - 0.02).abs() < 1e-6);
    }

    #[test]
    fn millivolt_preset_is_valid_and_scaled() {
        let config = CoreConfig::for_unit(MeasurementUnit::Millivolts);
        assert!(config.validate().is_ok());
        assert_eq!(config.controller.kp, 0.15);
        assert_eq!(config.setpoints.medium, 160.0);
    }

    #[test]
    fn rejects_sector_gap() {
        let mut config = CoreConfig::default();
        config.sectors[1].min = 50;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SectorMisaligned { index: 0, .. })
        ));
    }

    #[test]
    fn rejects_inverted_sector() {
        let mut config = CoreConfig::default();
        config.sectors[2] = SectorConfig { min: 135, max: 90 };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SectorInverted { index: 2, .. })
        ));
    }

    #[test]
    fn rejects_arc_not_covered() {
        let mut config = CoreConfig::default();
        config.scan.arc_max = 180;
        assert!(matches!(config.validate(), Err(ConfigError::ArcCoverage { .. })));
    }

    #[test]
    fn rejects_zero_step_and_no_motors() {
        let mut config = CoreConfig::default();
        config.scan.step = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Scan(_))));

        let mut config = CoreConfig::default();
        config.sectors.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoMotors)));
    }

    #[test]
    fn rejects_unordered_thresholds_and_setpoints() {
        let mut config = CoreConfig::default();
        config.ranges.medium_max_cm = 350.0;
        assert!(matches!(config.validate(), Err(ConfigError::Thresholds(_))));

        let mut config = CoreConfig::default();
        config.setpoints.close = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Setpoints(_))));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let toml_content = r#"
unit = "newtons"

[scan]
step = 10
mode = "forward"

[controller]
kp = 6.0
"#;
        let config: CoreConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.scan.step, 10);
        assert_eq!(config.scan.mode, SweepMode::Forward);
        assert_eq!(config.scan.arc_min, 5);
        assert_eq!(config.controller.kp, 6.0);
        assert_eq!(config.controller.ki, 48.0);
        assert_eq!(config.sectors.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unit_alone_selects_its_presets() {
        let config: CoreConfig = toml::from_str("unit = \"millivolts\"").unwrap();
        assert_eq!(config, CoreConfig::for_unit(MeasurementUnit::Millivolts));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_millivolt_sections_keep_millivolt_fields() {
        let toml_content = r#"
unit = "millivolts"

[controller]
kp = 0.2

[safety]
deflate_ms = 1500

[setpoints]
close = 300.0
"#;
        let config: CoreConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.controller.kp, 0.2);
        assert_eq!(config.controller.ki, 0.60);
        assert_eq!(config.safety.deflate_ms, 1_500);
        assert_eq!(config.safety.safe_threshold, Some(400.0));
        assert_eq!(config.setpoints.close, 300.0);
        assert_eq!(config.setpoints.far, 80.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_round_trip_keeps_sections() {
        let mut config = CoreConfig::for_unit(MeasurementUnit::Millivolts);
        config.controller.kp = 0.2;
        config.scan.mode = SweepMode::Forward;
        let path = std::env::temp_dir().join(format!(
            "sector_control_round_trip_{}.toml",
            std::process::id()
        ));
        config.to_file(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("[scan]"));
        assert!(text.contains("[[sectors]]"));
        let back = CoreConfig::from_file(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn shipped_millivolt_file_matches_preset() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/millivolts.toml");
        let config = CoreConfig::from_file(path).unwrap();
        assert_eq!(config, CoreConfig::for_unit(MeasurementUnit::Millivolts));
        assert!(config.validate().is_ok());
    }
}
