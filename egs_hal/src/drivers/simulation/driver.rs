//! Simulation driver implementation.
//!
//! The `SimulationDriver` implements the `HalDriver` trait on top of a
//! [`SimPlant`], so the full controller can run on a desk without a valve
//! body or vehicle bus.

use super::io::{SimAdc, SimBus, SimPwm, SimVoltage};
use super::plant::{SimPlant, SimulationConfig};
use egs_common::consts::NUM_SOLENOIDS;
use egs_common::control_unit::solenoid::SolenoidId;
use egs_common::hal::config::HalConfig;
use egs_common::hal::driver::{AdcMux, CanBus, HalDriver, HalError, PwmOutput, VoltageSense};
use std::sync::Arc;
use tracing::info;

/// Simulation driver implementing the HalDriver trait.
pub struct SimulationDriver {
    name: &'static str,
    version: &'static str,
    initialized: bool,
    plant: SimPlant,
    pwm_taken: [bool; NUM_SOLENOIDS],
    adc_taken: bool,
    bus_taken: bool,
}

impl SimulationDriver {
    /// Create a new simulation driver instance.
    pub fn new() -> Self {
        Self {
            name: "simulation",
            version: env!("CARGO_PKG_VERSION"),
            initialized: false,
            plant: SimPlant::default(),
            pwm_taken: [false; NUM_SOLENOIDS],
            adc_taken: false,
            bus_taken: false,
        }
    }

    /// Handle to the simulated plant. Stays valid across `init()`.
    pub fn plant(&self) -> SimPlant {
        self.plant.clone()
    }

    fn ensure_initialized(&self) -> Result<(), HalError> {
        if self.initialized {
            Ok(())
        } else {
            Err(HalError::InitFailed(
                "simulation driver not initialised".into(),
            ))
        }
    }

    fn take_flag(flag: &mut bool, what: &str) -> Result<(), HalError> {
        if std::mem::replace(flag, true) {
            return Err(HalError::ResourceUnavailable(format!(
                "{what} already taken"
            )));
        }
        Ok(())
    }
}

impl Default for SimulationDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl HalDriver for SimulationDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> &'static str {
        self.version
    }

    fn init(&mut self, config: &HalConfig) -> Result<(), HalError> {
        let sim = SimulationConfig::from_section(config.driver_section(self.name))?;
        info!(
            "Initializing simulation driver: {:?} gearbox in gear {}, supply {} mV, {} shorted, {} open",
            sim.variant,
            sim.initial_gear,
            sim.supply_mv,
            sim.shorted_channels.len(),
            sim.open_channels.len()
        );
        self.plant.reconfigure(sim);
        self.pwm_taken = [false; NUM_SOLENOIDS];
        self.adc_taken = false;
        self.bus_taken = false;
        self.initialized = true;
        Ok(())
    }

    fn take_pwm(&mut self, id: SolenoidId) -> Result<Box<dyn PwmOutput>, HalError> {
        self.ensure_initialized()?;
        Self::take_flag(&mut self.pwm_taken[id.index()], id.name())?;
        Ok(Box::new(SimPwm::new(id, self.plant.clone())))
    }

    fn take_adc(&mut self) -> Result<Box<dyn AdcMux>, HalError> {
        self.ensure_initialized()?;
        Self::take_flag(&mut self.adc_taken, "current-sense ADC")?;
        Ok(Box::new(SimAdc::new(self.plant.clone())))
    }

    fn voltage_sense(&self) -> Result<Arc<dyn VoltageSense>, HalError> {
        self.ensure_initialized()?;
        Ok(Arc::new(SimVoltage::new(self.plant.clone())))
    }

    fn take_bus(&mut self) -> Result<Box<dyn CanBus>, HalError> {
        self.ensure_initialized()?;
        Self::take_flag(&mut self.bus_taken, "bus")?;
        Ok(Box::new(SimBus::new(self.plant.clone())))
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        info!(
            "Simulation driver shutdown, {} frames transmitted",
            self.plant.transmit_count()
        );
        self.initialized = false;
        Ok(())
    }
}
