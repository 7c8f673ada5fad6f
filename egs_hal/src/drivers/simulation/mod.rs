//! Simulation driver module.
//!
//! Software stand-in for the valve body, the current-sense front end, the
//! supply rail and the vehicle bus.

mod driver;
mod io;
mod plant;

pub use driver::SimulationDriver;
pub use io::{SimAdc, SimBus, SimPwm, SimVoltage};
pub use plant::{SimPlant, SimulationConfig};

use egs_common::hal::driver::HalDriver;

/// Factory function to create a simulation driver instance.
pub fn create_driver() -> Box<dyn HalDriver> {
    Box::new(SimulationDriver::new())
}
