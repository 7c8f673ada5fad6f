//! Hardware abstraction layer.
//!
//! The control core never touches hardware directly. It consumes PWM outputs,
//! the multiplexed current-sense ADC, the supply voltage sense and the bus
//! through the traits in [`driver`], all handed out by a [`driver::HalDriver`]
//! selected by name.

pub mod config;
pub mod driver;
