//! Tracing initialization.
//!
//! `RUST_LOG` takes precedence; otherwise the configured level applies to
//! the whole process.
//!
//! ```bash
//! RUST_LOG=daq_settings=debug daq-settings demo
//! DAQ_SETTINGS_APPLICATION__LOG_FORMAT=json daq-settings demo
//! ```

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;

/// Install a global fmt subscriber in `pretty` or `json` format.
///
/// Returns `false` when a subscriber was already installed, which makes
/// repeated initialization (tests, embedding applications) harmless.
pub fn init(log_level: &str, log_format: &str) -> bool {
    let builder = fmt().with_env_filter(env_filter(log_level)).with_target(true);
    let result = match log_format {
        "json" => builder.json().try_init(),
        _ => builder.pretty().try_init(),
    };
    result.is_ok()
}

/// `RUST_LOG` when set and parseable, otherwise `log_level`.
pub fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

/// [`init`] from the `application` section of the configuration.
pub fn init_from_config(config: &AppConfig) -> bool {
    init(&config.application.log_level, &config.application.log_format)
}
