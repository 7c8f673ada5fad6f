//! Prelude module for common re-exports.
//!
//! ```rust
//! use egs_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};
pub use crate::control_unit::config::TcuConfig;

// ─── Bus Frames ─────────────────────────────────────────────────────
pub use crate::can::{
    CanFrame, FrameId, GS_218_ID, GS_338_ID, GS_418_ID, GS_558_ID, GearCode, Gs218, Gs338,
    Gs418, Gs558, SelectorPosition,
};

// ─── Gear Model ─────────────────────────────────────────────────────
pub use crate::control_unit::gear::{Gear, GearRatioTable, ShiftDirection, TransmissionVariant};

// ─── Faults ─────────────────────────────────────────────────────────
pub use crate::control_unit::error::{CalibrationFault, RuntimeFault, StartupError};

// ─── Hardware ───────────────────────────────────────────────────────
pub use crate::control_unit::solenoid::SolenoidId;
pub use crate::hal::driver::{HalDriver, HalError, RawFrame};
