//! EGS Common Library
//!
//! Shared constants, configuration loading, bus frame layouts, the gear model
//! and the hardware abstraction traits used by every crate of the EGS
//! transmission controller workspace.
//!
//! # Module Structure
//!
//! - [`can`] - Bus frame identifiers, bit-field layouts and typed GS frames
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - System-wide numeric limits and defaults
//! - [`control_unit`] - Gear model, ratio table, controller config and fault types
//! - [`hal`] - Hardware abstraction traits (PWM, ADC, supply sense, bus)
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use egs_common::prelude::*;
//!
//! let mut frame = Gs218::default();
//! frame.set_gic(GearCode::D3);
//! assert_eq!(frame.gic(), GearCode::D3);
//! ```

pub mod can;
pub mod config;
pub mod consts;
pub mod control_unit;
pub mod hal;
pub mod prelude;
