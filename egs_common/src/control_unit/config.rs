//! Configuration structures for the transmission controller.
//!
//! Every section is optional in TOML and falls back to the defaults from
//! [`crate::consts`]. Numeric parameters are bounds-checked by `validate()`.

use serde::{Deserialize, Serialize};

use super::gear::TransmissionVariant;
use crate::config::{ConfigError, SharedConfig};
use crate::consts::{
    CYCLE_TIME_MS, OVERSPEED_RPM, RATIO_TOLERANCE_DEFAULT, SAMPLER_REFRESH_DELAY_MS,
    SAMPLES_PER_VISIT, SHIFT_TIMEOUT_MS, SIGNAL_MAX_AGE_MS, SOLENOID_SHORT_THRESHOLD_ADC,
    STALE_FAULT_CYCLES, STATIONARY_RPM, DUTY_PERCENT_MAX,
};
use crate::hal::config::HalConfig;

// ─── Top-Level Config ───────────────────────────────────────────────

/// Complete controller configuration, one TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TcuConfig {
    #[serde(default)]
    pub shared: SharedConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub gearbox: GearboxConfig,
    #[serde(default)]
    pub shift: ShiftConfig,
    #[serde(default)]
    pub solenoids: SolenoidConfig,
    #[serde(default)]
    pub hal: HalConfig,
}

impl TcuConfig {
    /// Validate all sections.
    ///
    /// # Errors
    ///
    /// `ConfigError::ValidationError` naming the section and parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        let checks = [
            ("control", self.control.validate()),
            ("gearbox", self.gearbox.validate()),
            ("shift", self.shift.validate()),
            ("solenoids", self.solenoids.validate()),
            ("hal", self.hal.validate()),
        ];
        for (section, result) in checks {
            result.map_err(|e| ConfigError::ValidationError(format!("[{section}] {e}")))?;
        }
        Ok(())
    }
}

// ─── Control Loop ───────────────────────────────────────────────────

/// Cycle timing and signal freshness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Control cycle period [ms].
    #[serde(default = "default_cycle_time_ms")]
    pub cycle_time_ms: u32,

    /// Maximum age of a bus signal [ms].
    #[serde(default = "default_signal_max_age_ms")]
    pub signal_max_age_ms: u64,

    /// Consecutive stale cycles before `STALE_SIGNAL` latches.
    #[serde(default = "default_stale_fault_cycles")]
    pub stale_fault_cycles: u32,
}

fn default_cycle_time_ms() -> u32 {
    CYCLE_TIME_MS
}
fn default_signal_max_age_ms() -> u64 {
    SIGNAL_MAX_AGE_MS
}
fn default_stale_fault_cycles() -> u32 {
    STALE_FAULT_CYCLES
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            cycle_time_ms: CYCLE_TIME_MS,
            signal_max_age_ms: SIGNAL_MAX_AGE_MS,
            stale_fault_cycles: STALE_FAULT_CYCLES,
        }
    }
}

impl ControlConfig {
    pub const CYCLE_TIME_MS_MIN: u32 = 1;
    pub const CYCLE_TIME_MS_MAX: u32 = 1000;

    pub fn validate(&self) -> Result<(), String> {
        if self.cycle_time_ms < Self::CYCLE_TIME_MS_MIN
            || self.cycle_time_ms > Self::CYCLE_TIME_MS_MAX
        {
            return Err(format!(
                "cycle_time_ms {} out of range [{}, {}]",
                self.cycle_time_ms,
                Self::CYCLE_TIME_MS_MIN,
                Self::CYCLE_TIME_MS_MAX
            ));
        }
        if self.signal_max_age_ms < self.cycle_time_ms as u64 {
            return Err(format!(
                "signal_max_age_ms {} shorter than one cycle ({} ms)",
                self.signal_max_age_ms, self.cycle_time_ms
            ));
        }
        if self.stale_fault_cycles == 0 {
            return Err("stale_fault_cycles must be at least 1".to_string());
        }
        Ok(())
    }
}

// ─── Gearbox ────────────────────────────────────────────────────────

/// Gear model and plausibility limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GearboxConfig {
    /// Ratio set to classify against.
    #[serde(default)]
    pub variant: TransmissionVariant,

    /// Relative window half-width around each nominal ratio.
    #[serde(default = "default_ratio_tolerance")]
    pub ratio_tolerance: f64,

    /// Lowest forward gear is Second instead of First.
    #[serde(default = "default_true")]
    pub start_in_second: bool,

    /// Output speed at or below which no ratio is computed [rpm].
    #[serde(default = "default_stationary_rpm")]
    pub stationary_rpm: u32,

    /// Turbine speed above which the reading is implausible [rpm].
    #[serde(default = "default_overspeed_rpm")]
    pub overspeed_rpm: u32,
}

fn default_ratio_tolerance() -> f64 {
    RATIO_TOLERANCE_DEFAULT
}
fn default_true() -> bool {
    true
}
fn default_stationary_rpm() -> u32 {
    STATIONARY_RPM
}
fn default_overspeed_rpm() -> u32 {
    OVERSPEED_RPM
}

impl Default for GearboxConfig {
    fn default() -> Self {
        Self {
            variant: TransmissionVariant::default(),
            ratio_tolerance: RATIO_TOLERANCE_DEFAULT,
            start_in_second: true,
            stationary_rpm: STATIONARY_RPM,
            overspeed_rpm: OVERSPEED_RPM,
        }
    }
}

impl GearboxConfig {
    pub const RATIO_TOLERANCE_MAX: f64 = 0.5;

    pub fn validate(&self) -> Result<(), String> {
        if !(self.ratio_tolerance > 0.0 && self.ratio_tolerance <= Self::RATIO_TOLERANCE_MAX) {
            return Err(format!(
                "ratio_tolerance {} out of range (0, {}]",
                self.ratio_tolerance,
                Self::RATIO_TOLERANCE_MAX
            ));
        }
        if self.overspeed_rpm <= self.stationary_rpm {
            return Err(format!(
                "overspeed_rpm {} must exceed stationary_rpm {}",
                self.overspeed_rpm, self.stationary_rpm
            ));
        }
        Ok(())
    }
}

// ─── Shift Procedure ────────────────────────────────────────────────

/// Timing and pressures of a single-step shift. Duties in tenths of a percent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftConfig {
    /// Deadline for one shift, measured in loop time [ms].
    #[serde(default = "default_shift_timeout_ms")]
    pub timeout_ms: u64,

    /// How long the shift solenoid is held energised [ms].
    #[serde(default = "default_solenoid_hold_ms")]
    pub solenoid_hold_ms: u64,

    /// Modulating pressure during the shift.
    #[serde(default = "default_shift_mpc")]
    pub shift_mpc_percent: u16,

    /// Shift pressure during the shift.
    #[serde(default = "default_shift_spc")]
    pub shift_spc_percent: u16,

    /// Modulating pressure outside a shift.
    #[serde(default = "default_idle_mpc")]
    pub idle_mpc_percent: u16,
}

fn default_shift_timeout_ms() -> u64 {
    SHIFT_TIMEOUT_MS
}
fn default_solenoid_hold_ms() -> u64 {
    400
}
fn default_shift_mpc() -> u16 {
    600
}
fn default_shift_spc() -> u16 {
    500
}
fn default_idle_mpc() -> u16 {
    250
}

impl Default for ShiftConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_shift_timeout_ms(),
            solenoid_hold_ms: default_solenoid_hold_ms(),
            shift_mpc_percent: default_shift_mpc(),
            shift_spc_percent: default_shift_spc(),
            idle_mpc_percent: default_idle_mpc(),
        }
    }
}

impl ShiftConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.solenoid_hold_ms == 0 || self.solenoid_hold_ms >= self.timeout_ms {
            return Err(format!(
                "solenoid_hold_ms {} must be in (0, timeout_ms {})",
                self.solenoid_hold_ms, self.timeout_ms
            ));
        }
        for (name, value) in [
            ("shift_mpc_percent", self.shift_mpc_percent),
            ("shift_spc_percent", self.shift_spc_percent),
            ("idle_mpc_percent", self.idle_mpc_percent),
        ] {
            if value > DUTY_PERCENT_MAX {
                return Err(format!("{name} {value} exceeds {DUTY_PERCENT_MAX}"));
            }
        }
        Ok(())
    }
}

// ─── Solenoids ──────────────────────────────────────────────────────

/// Current sensing, calibration and feedback supervision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolenoidConfig {
    /// Idle reading above which a channel fails calibration [raw counts].
    #[serde(default = "default_short_threshold")]
    pub short_threshold_adc: u16,

    /// Averaged blocks per channel visit.
    #[serde(default = "default_samples_per_visit")]
    pub samples_per_visit: usize,

    /// Delay before each visit after calibration [ms].
    #[serde(default = "default_refresh_delay_ms")]
    pub refresh_delay_ms: u64,

    /// Commanded duty at or above which current is expected.
    #[serde(default = "default_feedback_min_percent")]
    pub feedback_min_percent: u16,

    /// Current below which a commanded channel counts as open [mA].
    #[serde(default = "default_open_circuit_ma")]
    pub open_circuit_ma: f32,

    /// Consecutive open cycles before `SOLENOID_FEEDBACK` latches.
    #[serde(default = "default_feedback_fault_cycles")]
    pub feedback_fault_cycles: u32,
}

fn default_short_threshold() -> u16 {
    SOLENOID_SHORT_THRESHOLD_ADC
}
fn default_samples_per_visit() -> usize {
    SAMPLES_PER_VISIT
}
fn default_refresh_delay_ms() -> u64 {
    SAMPLER_REFRESH_DELAY_MS
}
fn default_feedback_min_percent() -> u16 {
    500
}
fn default_open_circuit_ma() -> f32 {
    50.0
}
fn default_feedback_fault_cycles() -> u32 {
    25
}

impl Default for SolenoidConfig {
    fn default() -> Self {
        Self {
            short_threshold_adc: SOLENOID_SHORT_THRESHOLD_ADC,
            samples_per_visit: SAMPLES_PER_VISIT,
            refresh_delay_ms: SAMPLER_REFRESH_DELAY_MS,
            feedback_min_percent: default_feedback_min_percent(),
            open_circuit_ma: default_open_circuit_ma(),
            feedback_fault_cycles: default_feedback_fault_cycles(),
        }
    }
}

impl SolenoidConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.samples_per_visit == 0 {
            return Err("samples_per_visit must be at least 1".to_string());
        }
        if self.feedback_min_percent > DUTY_PERCENT_MAX {
            return Err(format!(
                "feedback_min_percent {} exceeds {DUTY_PERCENT_MAX}",
                self.feedback_min_percent
            ));
        }
        if self.open_circuit_ma.is_nan() || self.open_circuit_ma < 0.0 {
            return Err(format!("open_circuit_ma {} invalid", self.open_circuit_ma));
        }
        if self.feedback_fault_cycles == 0 {
            return Err("feedback_fault_cycles must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = TcuConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.control.cycle_time_ms, 20);
        assert_eq!(cfg.control.signal_max_age_ms, 100);
        assert_eq!(cfg.gearbox.variant, TransmissionVariant::Large);
        assert!(cfg.gearbox.start_in_second);
        assert_eq!(cfg.solenoids.short_threshold_adc, 500);
        assert_eq!(cfg.hal.driver, "simulation");
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let cfg = TcuConfig::from_toml_str(
            r#"
[gearbox]
variant = "small"
start_in_second = false
"#,
        )
        .unwrap();
        assert_eq!(cfg.gearbox.variant, TransmissionVariant::Small);
        assert!(!cfg.gearbox.start_in_second);
        assert_eq!(cfg.gearbox.overspeed_rpm, 10_000);
    }

    #[test]
    fn validation_names_section() {
        let mut cfg = TcuConfig::default();
        cfg.control.cycle_time_ms = 0;
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("[control]") && err.contains("cycle_time_ms"), "{err}");
    }

    #[test]
    fn max_age_shorter_than_cycle_rejected() {
        let cfg = ControlConfig {
            cycle_time_ms: 50,
            signal_max_age_ms: 20,
            ..ControlConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn tolerance_bounds() {
        let mut cfg = GearboxConfig::default();
        cfg.ratio_tolerance = 0.0;
        assert!(cfg.validate().is_err());
        cfg.ratio_tolerance = 0.6;
        assert!(cfg.validate().is_err());
        cfg.ratio_tolerance = 0.5;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn shift_hold_must_fit_timeout() {
        let mut cfg = ShiftConfig::default();
        cfg.solenoid_hold_ms = cfg.timeout_ms;
        assert!(cfg.validate().is_err());
        cfg.solenoid_hold_ms = 10;
        cfg.shift_spc_percent = 1001;
        assert!(cfg.validate().unwrap_err().contains("shift_spc_percent"));
    }

    #[test]
    fn solenoid_bounds() {
        let mut cfg = SolenoidConfig::default();
        cfg.samples_per_visit = 0;
        assert!(cfg.validate().is_err());
        cfg.samples_per_visit = 3;
        cfg.open_circuit_ma = f32::NAN;
        assert!(cfg.validate().is_err());
    }
}
