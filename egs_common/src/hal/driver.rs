//! HAL driver trait, peripheral traits and error types.
//!
//! This module defines:
//! - `HalDriver` trait - Pluggable backend that hands out peripherals
//! - `PwmOutput`, `AdcMux`, `VoltageSense`, `CanBus` - Peripheral interfaces
//! - `HalError` enum - Error types for HAL operations
//! - `DriverFactory` type alias - Factory function type

use crate::can::FrameId;
use crate::control_unit::solenoid::SolenoidId;
use crate::hal::config::HalConfig;
use std::sync::Arc;
use thiserror::Error;

/// Error types for HAL operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Driver initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Hardware communication error
    #[error("Hardware communication error: {0}")]
    CommunicationError(String),

    /// Driver not found
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// Peripheral already handed out or never initialised
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),
}

/// Factory function type for creating driver instances.
pub type DriverFactory = fn() -> Box<dyn HalDriver>;

/// One bus frame as it travels through the HAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame {
    pub id: FrameId,
    pub payload: u64,
}

/// A PWM output driving one solenoid.
pub trait PwmOutput: Send {
    /// Set carrier frequency and duty resolution.
    fn configure(&mut self, freq_hz: u32, resolution_bits: u8) -> Result<(), HalError>;

    /// Full-scale duty value at the configured resolution.
    fn max_duty(&self) -> u32;

    /// Apply a raw duty value, `0..=max_duty()`.
    fn set_duty(&mut self, duty: u32) -> Result<(), HalError>;

    /// Raw duty currently applied.
    fn duty(&self) -> u32;
}

/// Multiplexed current-sense ADC shared by all solenoids.
pub trait AdcMux: Send {
    /// Route `channel` to the converter.
    fn select(&mut self, channel: u8) -> Result<(), HalError>;

    /// Fill `buf` with raw samples of the selected channel. Returns the number
    /// of samples written.
    fn read_block(&mut self, buf: &mut [u16]) -> Result<usize, HalError>;
}

/// Solenoid supply voltage sense.
pub trait VoltageSense: Send + Sync {
    /// Supply voltage in millivolts. `0` means the measurement failed.
    fn supply_mv(&self) -> u16;
}

/// Bus transport.
pub trait CanBus: Send {
    /// Next received frame, if any. Never blocks.
    fn receive(&mut self) -> Option<RawFrame>;

    /// Queue a frame for transmission.
    fn transmit(&mut self, frame: RawFrame) -> Result<(), HalError>;
}

/// Trait defining the interface for HAL drivers.
///
/// # Lifecycle
///
/// 1. `init()` - Called once before anything is taken
/// 2. `take_*()` / `voltage_sense()` - Peripherals moved out to their owners
/// 3. `shutdown()` - Called after the control loop has stopped
///
/// Each `take_*` succeeds once per peripheral; a second call returns
/// `HalError::ResourceUnavailable`.
pub trait HalDriver: Send {
    /// Returns the driver's unique identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Returns the driver's semantic version.
    fn version(&self) -> &'static str;

    /// Initialize the driver.
    ///
    /// # Errors
    /// Return `HalError::InitFailed` or `HalError::ConfigError` if
    /// initialization cannot complete.
    fn init(&mut self, config: &HalConfig) -> Result<(), HalError>;

    /// Move out the PWM output of one solenoid.
    fn take_pwm(&mut self, id: SolenoidId) -> Result<Box<dyn PwmOutput>, HalError>;

    /// Move out the current-sense ADC.
    fn take_adc(&mut self) -> Result<Box<dyn AdcMux>, HalError>;

    /// Shared handle to the supply voltage sense.
    fn voltage_sense(&self) -> Result<Arc<dyn VoltageSense>, HalError>;

    /// Move out the bus transport.
    fn take_bus(&mut self) -> Result<Box<dyn CanBus>, HalError>;

    /// Graceful shutdown of the driver.
    fn shutdown(&mut self) -> Result<(), HalError>;
}
