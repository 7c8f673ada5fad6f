//! System-wide constants for the EGS workspace.
//!
//! Single source of truth for numeric limits and defaults. Imported by all
//! crates.

use static_assertions::const_assert;

/// Number of solenoid channels (Y3, Y4, Y5, MPC, SPC, TCC).
pub const NUM_SOLENOIDS: usize = 6;

/// Full-scale duty request, in tenths of a percent.
pub const DUTY_PERCENT_MAX: u16 = 1000;

/// PWM duty resolution used for every solenoid channel [bits].
pub const PWM_RESOLUTION_BITS: u8 = 12;

/// PWM frequency of the shift and pressure solenoids [Hz].
pub const SOLENOID_PWM_FREQ_HZ: u32 = 1000;

/// PWM frequency of the torque converter clutch solenoid [Hz].
pub const TCC_PWM_FREQ_HZ: u32 = 100;

/// Supply voltage the solenoid duty tables are calibrated for [mV].
pub const NOMINAL_SOLENOID_VOLTAGE_MV: u16 = 12_000;

/// Idle ADC reading above which a channel is considered shorted [raw counts].
pub const SOLENOID_SHORT_THRESHOLD_ADC: u16 = 500;

/// ADC counts to milliamps (0.005 Ω shunt, INA180A3 amplifier).
pub const ADC_TO_MA: f32 = 0.0974;

/// Averaged blocks taken per channel visit of the current sampler.
pub const SAMPLES_PER_VISIT: usize = 3;

/// Raw samples per DMA block.
pub const SAMPLES_PER_BLOCK: usize = 1024;

/// Delay before each channel visit once calibration is done (~5 Hz per channel).
pub const SAMPLER_REFRESH_DELAY_MS: u64 = 33;

/// Default gear-ratio tolerance (±10%).
pub const RATIO_TOLERANCE_DEFAULT: f64 = 0.10;

/// Output speed at or below which the vehicle counts as stationary [rpm].
pub const STATIONARY_RPM: u32 = 50;

/// Engine speed limit used by shift-point logic [rpm].
pub const REDLINE_RPM: u32 = 4000;

/// Engine speed below which the engine is about to stall [rpm].
pub const STALL_RPM: u32 = 700;

/// Input speed above which the turbine sensor reading is implausible [rpm].
pub const OVERSPEED_RPM: u32 = 10_000;

/// Default control cycle period [ms].
pub const CYCLE_TIME_MS: u32 = 20;

/// Default maximum age of a bus signal before it is stale [ms].
pub const SIGNAL_MAX_AGE_MS: u64 = 100;

/// Default consecutive stale cycles before a StaleSignal fault latches.
pub const STALE_FAULT_CYCLES: u32 = 10;

/// Default bound on a single shift procedure [ms].
pub const SHIFT_TIMEOUT_MS: u64 = 1000;

/// Capacity of the bus signal cache (distinct frame ids).
pub const MAX_TRACKED_FRAMES: usize = 16;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/tcu.toml";

const_assert!(NUM_SOLENOIDS == 6);
const_assert!(SAMPLES_PER_VISIT > 0);
const_assert!(PWM_RESOLUTION_BITS <= 16);
const_assert!(SOLENOID_SHORT_THRESHOLD_ADC > 0);
