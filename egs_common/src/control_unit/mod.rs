//! Transmission control shared types.
//!
//! Types shared between the control core, HAL backends and tests: the gear
//! model and ratio table, controller configuration, fault types and solenoid
//! identities.

pub mod config;
pub mod error;
pub mod gear;
pub mod solenoid;
