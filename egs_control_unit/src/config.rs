//! TOML configuration loader with validation.
//!
//! A single file (default `config/tcu.toml`) holds every section of
//! [`TcuConfig`]. Missing sections take their defaults; present ones are
//! bounds-checked before the controller starts.

use egs_common::config::{ConfigError, ConfigLoader};
use egs_common::control_unit::config::TcuConfig;
use std::path::Path;
use tracing::info;

/// Load and validate the controller configuration.
pub fn load_config(path: &Path) -> Result<TcuConfig, ConfigError> {
    let config = TcuConfig::load(path)?;
    config.validate()?;
    info!(
        "Config {} OK: service={}, cycle={} ms, variant={:?}, driver={}",
        path.display(),
        config.shared.service_name,
        config.control.cycle_time_ms,
        config.gearbox.variant,
        config.hal.driver
    );
    Ok(config)
}

/// Parse and validate an in-memory document.
pub fn load_config_from_str(content: &str) -> Result<TcuConfig, ConfigError> {
    let config = TcuConfig::from_toml_str(content)?;
    config.validate()?;
    Ok(config)
}
