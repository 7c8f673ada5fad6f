//! Shared rig for the integration tests.

mod gear_requests;
mod shift_cycle;
mod startup;

use egs_common::config::ConfigLoader;
use egs_common::control_unit::config::TcuConfig;
use egs_common::control_unit::error::StartupError;
use egs_common::hal::driver::{HalDriver, HalError};
use egs_control_unit::bus::{GEARBOX_FRAMES, SignalCache};
use egs_control_unit::cycle::CycleRunner;
use egs_control_unit::gearbox::{CycleOutput, GearboxController, GearboxHandle};
use egs_control_unit::solenoid::{SolenoidBank, UncalibratedBank};
use egs_hal::drivers::simulation::{SimPlant, SimulationDriver};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Parse without validation so tests can use out-of-policy timings.
pub fn config(toml: &str) -> TcuConfig {
    TcuConfig::from_toml_str(toml).expect("test config parses")
}

pub struct Rig {
    pub plant: SimPlant,
    pub runner: CycleRunner,
    pub driver: SimulationDriver,
    period: Duration,
}

impl Rig {
    pub fn start(config: &TcuConfig) -> Result<Self, StartupError> {
        let mut driver = SimulationDriver::new();
        let plant = driver.plant();
        driver.init(&config.hal)?;

        let supply = driver.voltage_sense()?;
        let bank = Arc::new(UncalibratedBank::new(&mut driver, &config.solenoids)?.calibrate_all()?);
        bank.start_sampler()?;

        let cache = Arc::new(
            SignalCache::new(&GEARBOX_FRAMES).map_err(|e| HalError::InitFailed(e.to_string()))?,
        );
        let controller = GearboxController::new(config, Arc::clone(&cache), bank, supply)?;
        let bus = driver.take_bus()?;

        Ok(Self {
            plant,
            runner: CycleRunner::new(controller, cache, bus, config.control.cycle_time_ms),
            driver,
            period: Duration::from_millis(config.control.cycle_time_ms as u64),
        })
    }

    pub fn handle(&self) -> GearboxHandle {
        self.runner.controller().handle()
    }

    pub fn bank(&self) -> &Arc<SolenoidBank> {
        self.runner.controller().bank()
    }

    /// One cycle followed by a period of wall time.
    pub fn cycle(&mut self) -> CycleOutput {
        let out = self.runner.step();
        thread::sleep(self.period);
        out
    }

    /// Cycle until `done` holds, at most `max_cycles` times.
    pub fn cycle_until(
        &mut self,
        max_cycles: usize,
        mut done: impl FnMut(&CycleOutput) -> bool,
    ) -> Option<CycleOutput> {
        for _ in 0..max_cycles {
            let out = self.cycle();
            if done(&out) {
                return Some(out);
            }
        }
        None
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.runner.shutdown();
    }
}
