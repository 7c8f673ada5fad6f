//! # EGS Control Unit Library
//!
//! Control core of the 722.6 transmission controller. Each cycle it drains
//! the bus into a freshness-tracked signal cache, classifies the engaged gear
//! from the turbine/output speed ratio, reconciles it with the requested gear
//! and hands single-step shifts to a supervised worker that drives the
//! solenoids.
//!
//! ## Components
//!
//! 1. **SignalCache** ([`bus`]): latest payload + arrival time per frame id
//! 2. **GearClassifier** ([`gearbox::classifier`]): ratio → gear
//! 3. **GearboxController** ([`gearbox::controller`]): target/actual gear,
//!    fault latching, status publication
//! 4. **ShiftSupervisor** ([`gearbox::shift`]): shift worker with deadline
//! 5. **SolenoidBank** ([`solenoid`]): PWM duty, supply compensation,
//!    current sensing, calibration
//! 6. **CycleRunner** ([`cycle`]): fixed-period loop and timing statistics
//!
//! ## Startup Order
//!
//! Solenoid duty can only be commanded through a [`solenoid::SolenoidBank`],
//! which exists only once [`solenoid::UncalibratedBank::calibrate_all`] has
//! succeeded.

pub mod bus;
pub mod config;
pub mod cycle;
pub mod error;
pub mod gearbox;
pub mod solenoid;
