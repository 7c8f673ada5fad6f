//! # EGS HAL Library
//!
//! Pluggable hardware backends for the transmission controller.
//!
//! Drivers implement the `HalDriver` trait defined in `egs_common::hal::driver`
//! and are looked up by name through a [`DriverRegistry`].
//!
//! # Module Structure
//!
//! - [`driver_registry`] - Driver factory registration
//! - [`drivers`] - HAL driver implementations
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          egs_hal                              │
//! │  ┌─────────────────────┐        ┌──────────────────────────┐  │
//! │  │  Driver Registry    │──────► │  HalDriver (trait object)│  │
//! │  └─────────────────────┘        └────────────┬─────────────┘  │
//! │                                              │ take_*()       │
//! │                                              ▼                │
//! │                 PwmOutput × 6 · AdcMux · VoltageSense · CanBus │
//! └───────────────────────────────────────────────────────────────┘
//! ```

pub mod driver_registry;
pub mod drivers;

pub use crate::driver_registry::DriverRegistry;
