//! Configuration loading traits and types.
//!
//! Every EGS binary reads a single TOML file. Sections are deserialized into
//! plain structs with `serde`, then checked with `validate()` before use.
//!
//! # Usage
//!
//! ```rust,no_run
//! use egs_common::config::{ConfigError, ConfigLoader, SharedConfig};
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Debug, Deserialize)]
//! struct ToolConfig {
//!     shared: SharedConfig,
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = ToolConfig::load(Path::new("config/tcu.toml"))?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// File could not be read or TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, per-cycle tracing.
    Trace,
    /// Debug information useful during bench testing.
    Debug,
    /// Startup, calibration and shift events.
    #[default]
    Info,
    /// Runtime faults.
    Warn,
    /// Startup faults only.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared across all EGS applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "egs-tcu-bench"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_service_name() -> String {
    "egs-tcu".to_string()
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// Blanket-implemented for every `DeserializeOwned` type.
///
/// - `ConfigError::FileNotFound` if the file does not exist
/// - `ConfigError::ParseError` if it cannot be read or is not valid TOML
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(format!("{}: {e}", path.display()))
            }
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from an in-memory TOML document.
    fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        #[serde(default)]
        shared: SharedConfig,
    }

    #[test]
    fn log_level_parses_lowercase() {
        #[derive(Debug, Deserialize)]
        struct Level {
            level: LogLevel,
        }

        let parsed: Level = toml::from_str("level = \"warn\"").unwrap();
        assert_eq!(parsed.level, LogLevel::Warn);
        assert!(toml::from_str::<Level>("level = \"WARN\"").is_err());
    }

    #[test]
    fn log_level_directive_matches_serde_name() {
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            #[derive(Serialize)]
            struct Level {
                level: LogLevel,
            }
            let text = toml::to_string(&Level { level }).unwrap();
            assert!(text.contains(level.as_directive()), "{text}");
        }
    }

    #[test]
    fn shared_config_defaults_when_section_missing() {
        let cfg = Wrapper::from_toml_str("").unwrap();
        assert_eq!(cfg.shared.service_name, "egs-tcu");
        assert_eq!(cfg.shared.log_level, LogLevel::Info);
        assert!(cfg.shared.validate().is_ok());
    }

    #[test]
    fn blank_service_name_rejected() {
        let cfg = Wrapper::from_toml_str("[shared]\nservice_name = \"  \"\n").unwrap();
        assert!(matches!(
            cfg.shared.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn load_missing_file() {
        let result = Wrapper::load(Path::new("/nonexistent/egs/tcu.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn load_rejects_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[shared\nservice_name = ").unwrap();
        let result = Wrapper::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
log_level = "debug"
service_name = "bench-rig"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let cfg = Wrapper::load(file.path()).unwrap();
        assert_eq!(cfg.shared.log_level, LogLevel::Debug);
        assert_eq!(cfg.shared.service_name, "bench-rig");
    }
}
