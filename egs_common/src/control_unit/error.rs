//! Fault types of the transmission controller.
//!
//! Startup faults are `thiserror` enums and stop the process before any duty
//! is commanded. Runtime faults are a `bitflags` set latched by the control
//! loop; while any flag is set the controller holds gear and refuses shifts.

use super::gear::GearTableError;
use super::solenoid::SolenoidId;
use crate::config::ConfigError;
use crate::hal::driver::HalError;
use bitflags::bitflags;
use static_assertions::const_assert;
use thiserror::Error;

bitflags! {
    /// Latched runtime faults.
    ///
    /// Published in the 5-bit `FEHLER` signal of GS_218.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RuntimeFault: u8 {
        /// Speed or selector frame stale for too many consecutive cycles.
        const STALE_SIGNAL        = 0x01;
        /// Ratio matched no gear window while not shifting.
        const UNCLASSIFIABLE_RATIO = 0x02;
        /// Shift procedure missed its deadline.
        const SHIFT_TIMEOUT       = 0x04;
        /// Turbine speed above the plausibility limit.
        const OVERSPEED           = 0x08;
        /// Commanded solenoid draws no current.
        const SOLENOID_FEEDBACK   = 0x10;
    }
}

const_assert!(RuntimeFault::all().bits() <= 0x1F);

impl Default for RuntimeFault {
    fn default() -> Self {
        Self::empty()
    }
}

/// Calibration of the current-sense baseline failed.
#[derive(Debug, Clone, Error)]
pub enum CalibrationFault {
    /// Idle reading above the short-circuit threshold.
    #[error("solenoid {channel} shorted: idle reading {vref} exceeds {threshold}")]
    Shorted {
        channel: SolenoidId,
        vref: u16,
        threshold: u16,
    },

    /// Current sense could not be read.
    #[error("solenoid {channel} current sense failed: {source}")]
    Sense {
        channel: SolenoidId,
        #[source]
        source: HalError,
    },
}

impl CalibrationFault {
    /// The offending channel.
    pub fn channel(&self) -> SolenoidId {
        match self {
            Self::Shorted { channel, .. } | Self::Sense { channel, .. } => *channel,
        }
    }
}

/// Any fault that prevents the controller from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("hardware init failed: {0}")]
    Hal(#[from] HalError),

    #[error("calibration failed: {0}")]
    Calibration(#[from] CalibrationFault),

    #[error("invalid gear ratio table: {0}")]
    GearTable(#[from] GearTableError),
}
