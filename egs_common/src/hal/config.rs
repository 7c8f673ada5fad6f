//! HAL configuration (`[hal]` section).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_driver() -> String {
    "simulation".to_string()
}

/// Backend selection plus opaque per-driver tables.
///
/// ```toml
/// [hal]
/// driver = "simulation"
///
/// [hal.driver_config.simulation]
/// supply_mv = 13800
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HalConfig {
    /// Registered driver name.
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Driver-specific configuration. Key = driver name.
    #[serde(default)]
    pub driver_config: HashMap<String, toml::Value>,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            driver_config: HashMap::new(),
        }
    }
}

impl HalConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.driver.trim().is_empty() {
            return Err("driver cannot be empty".to_string());
        }
        Ok(())
    }

    /// Table for `driver`, if present.
    pub fn driver_section(&self, driver: &str) -> Option<&toml::Value> {
        self.driver_config.get(driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_section_lookup() {
        let cfg: HalConfig = toml::from_str(
            r#"
driver = "simulation"

[driver_config.simulation]
supply_mv = 12500
"#,
        )
        .unwrap();
        let section = cfg.driver_section("simulation").unwrap();
        assert_eq!(
            section.get("supply_mv").and_then(toml::Value::as_integer),
            Some(12500)
        );
        assert!(cfg.driver_section("bench").is_none());
    }

    #[test]
    fn empty_driver_rejected() {
        let cfg = HalConfig {
            driver: String::new(),
            ..HalConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
