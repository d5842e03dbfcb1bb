//! Configuration System using Figment
//!
//! Configuration is loaded from:
//! 1. `config/daq_settings.toml` (base configuration, optional)
//! 2. Environment variables (prefixed with `DAQ_SETTINGS_`)
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! DAQ_SETTINGS_APPLICATION__LOG_LEVEL=debug
//! DAQ_SETTINGS_PARAMETERS__CACHE_MAX_SIZE=0
//! DAQ_SETTINGS_STAGE__MAX_MM=25.0
//! ```
//!
//! # Example
//!
//! ```no_run
//! use daq_settings::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! println!("Log level: {}", config.application.log_level);
//! # Ok::<(), daq_settings::config::ConfigError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::parameter::{ParameterContext, ParameterDefaults};
use crate::units::UnitRegistry;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/daq_settings.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DAQ_SETTINGS_";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File or environment could not be read or parsed.
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    /// Values were read but are not acceptable.
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Defaults for every parameter tree
    pub parameters: ParameterDefaults,
    /// Mock stage travel limits
    pub stage: StageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Mock stage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Lower travel limit in mm
    pub min_mm: f64,
    /// Upper travel limit in mm
    pub max_mm: f64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            min_mm: 0.0,
            max_mm: default_stage_max(),
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_name() -> String {
    "daq-settings".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_stage_max() -> f64 {
    10.0
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl AppConfig {
    /// Load configuration from `config/daq_settings.toml` and environment
    /// variables.
    ///
    /// Precedence (highest to lowest):
    /// 1. Environment variables (`DAQ_SETTINGS_` prefix)
    /// 2. The config file, when present
    /// 3. Built-in defaults
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if a source cannot be parsed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults and the environment apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Log format is valid (pretty, json)
    /// - Tolerance warning fraction is in (0, 1]
    /// - Stage limits are finite and ordered
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        let fraction = self.parameters.tolerance_warning_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid tolerance_warning_fraction {}. Must be in (0, 1]",
                fraction
            )));
        }

        let stage = &self.stage;
        if !stage.min_mm.is_finite() || !stage.max_mm.is_finite() || stage.min_mm > stage.max_mm {
            return Err(ConfigError::ValidationError(format!(
                "Invalid stage limits [{}, {}] mm",
                stage.min_mm, stage.max_mm
            )));
        }

        Ok(())
    }

    /// Parameter context over the shared unit registry with these defaults.
    pub fn parameter_context(&self) -> ParameterContext {
        ParameterContext::new(UnitRegistry::shared(), self.parameters.clone())
    }

    /// Defaults applied to parameter trees.
    pub fn parameter_defaults(&self) -> &ParameterDefaults {
        &self.parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ToleranceCombine;

    #[test]
    fn test_config_validation_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = AppConfig::default();
        config.application.log_level = "loud".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid log_level"));
    }

    #[test]
    fn test_config_validation_invalid_fraction() {
        let mut config = AppConfig::default();
        config.parameters.tolerance_warning_fraction = 0.0;
        assert!(config.validate().is_err());
        config.parameters.tolerance_warning_fraction = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_stage_limits() {
        let mut config = AppConfig::default();
        config.stage.min_mm = 5.0;
        config.stage.max_mm = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parameter_context_uses_defaults() {
        let mut config = AppConfig::default();
        config.parameters.tolerance_combine = ToleranceCombine::Any;
        let context = config.parameter_context();
        assert_eq!(context.defaults.tolerance_combine, ToleranceCombine::Any);
        assert_eq!(context.defaults.cache_max_size, 100);
    }
}
