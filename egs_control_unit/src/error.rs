//! Runtime fault supervision.
//!
//! Fault types live in `egs_common::control_unit::error`; this module holds
//! the debouncing used before a condition becomes a latched fault.

pub mod persistence;

pub use egs_common::control_unit::error::{CalibrationFault, RuntimeFault, StartupError};
pub use persistence::PersistentCondition;
