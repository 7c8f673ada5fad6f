//! Driver registry for HAL drivers.
//!
//! Provides a `DriverRegistry` struct for registering and retrieving HAL driver
//! factories. This uses constructor-injection rather than global state.

use egs_common::hal::driver::{DriverFactory, HalDriver, HalError};
use std::collections::HashMap;

/// Registry of available HAL drivers.
///
/// Constructed at startup, populated via `register()`, and queried by the
/// binary with the driver name from configuration or the command line.
pub struct DriverRegistry {
    factories: HashMap<&'static str, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding every driver built into this crate.
    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::new();
        crate::drivers::register_all_drivers(&mut registry);
        registry
    }

    /// Register a driver factory.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: DriverFactory) {
        if self.factories.contains_key(name) {
            panic!("Driver '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Get a driver factory by name.
    pub fn get_factory(&self, name: &str) -> Option<DriverFactory> {
        self.factories.get(name).copied()
    }

    /// Create a driver instance by name.
    ///
    /// # Errors
    /// Returns `HalError::DriverNotFound` if no driver with the given name is registered.
    pub fn create_driver(&self, name: &str) -> Result<Box<dyn HalDriver>, HalError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| HalError::DriverNotFound(name.to_string()))?;
        Ok(factory())
    }

    /// List all registered driver names, sorted.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egs_common::control_unit::solenoid::SolenoidId;
    use egs_common::hal::config::HalConfig;
    use egs_common::hal::driver::{AdcMux, CanBus, PwmOutput, VoltageSense};
    use std::sync::Arc;

    struct NullDriver;

    impl HalDriver for NullDriver {
        fn name(&self) -> &'static str {
            "null"
        }

        fn version(&self) -> &'static str {
            "0.1.0"
        }

        fn init(&mut self, _config: &HalConfig) -> Result<(), HalError> {
            Ok(())
        }

        fn take_pwm(&mut self, id: SolenoidId) -> Result<Box<dyn PwmOutput>, HalError> {
            Err(HalError::ResourceUnavailable(id.to_string()))
        }

        fn take_adc(&mut self) -> Result<Box<dyn AdcMux>, HalError> {
            Err(HalError::ResourceUnavailable("adc".into()))
        }

        fn voltage_sense(&self) -> Result<Arc<dyn VoltageSense>, HalError> {
            Err(HalError::ResourceUnavailable("supply".into()))
        }

        fn take_bus(&mut self) -> Result<Box<dyn CanBus>, HalError> {
            Err(HalError::ResourceUnavailable("bus".into()))
        }

        fn shutdown(&mut self) -> Result<(), HalError> {
            Ok(())
        }
    }

    fn create_null_driver() -> Box<dyn HalDriver> {
        Box::new(NullDriver)
    }

    #[test]
    fn registry_register_and_create() {
        let mut reg = DriverRegistry::new();
        reg.register("null", create_null_driver);

        let driver = reg.create_driver("null").expect("should create");
        assert_eq!(driver.name(), "null");
    }

    #[test]
    fn registry_driver_not_found() {
        let reg = DriverRegistry::new();
        let result = reg.create_driver("bench");
        assert!(matches!(result, Err(HalError::DriverNotFound(name)) if name == "bench"));
    }

    #[test]
    fn builtin_registry_has_simulation() {
        let reg = DriverRegistry::with_builtin_drivers();
        assert_eq!(reg.list_drivers(), vec!["simulation"]);
        let driver = reg.create_driver("simulation").unwrap();
        assert_eq!(driver.name(), "simulation");
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn registry_duplicate_panics() {
        let mut reg = DriverRegistry::new();
        reg.register("dup", create_null_driver);
        reg.register("dup", create_null_driver);
    }
}
