//! Layered configuration loading.

use serial_test::serial;
use std::fs;
use tempfile::TempDir;

use daq_settings::config::{AppConfig, ConfigError};
use daq_settings::logging;
use daq_settings::parameter::{Parameter, ToleranceCombine};

fn write_config(contents: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("daq_settings.toml");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
#[serial]
fn missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = AppConfig::load_from(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, AppConfig::default());
    assert_eq!(config.parameters.cache_max_size, 100);
    assert_eq!(config.parameters.tolerance_combine, ToleranceCombine::All);
}

#[test]
#[serial]
fn file_values_are_applied() {
    let (_dir, path) = write_config(
        r#"
[application]
log_level = "debug"
log_format = "json"

[parameters]
cache_max_size = 4
tolerance_combine = "any"

[stage]
max_mm = 25.0
"#,
    );
    let config = AppConfig::load_from(&path).unwrap();
    assert_eq!(config.application.log_level, "debug");
    assert_eq!(config.application.log_format, "json");
    assert_eq!(config.application.name, "daq-settings");
    assert_eq!(config.parameters.cache_max_size, 4);
    assert_eq!(config.parameters.tolerance_combine, ToleranceCombine::Any);
    assert_eq!(config.stage.max_mm, 25.0);

    let p = Parameter::builder("gain", 1.0)
        .tolerance_percent(1.0)
        .tolerance_absolute(0.1)
        .context(config.parameter_context())
        .build()
        .unwrap();
    assert_eq!(p.get_cache_stats().max_cache_size, 4);
    // either bound suffices under "any"
    let report = p.validate_tolerance("gain", 100.0, 100.6).unwrap().unwrap();
    assert!(report.within_tolerance);
}

#[test]
#[serial]
fn environment_overrides_file() {
    let (_dir, path) = write_config("[application]\nlog_level = \"debug\"\n");
    std::env::set_var("DAQ_SETTINGS_APPLICATION__LOG_LEVEL", "warn");
    std::env::set_var("DAQ_SETTINGS_PARAMETERS__CACHE_MAX_SIZE", "0");
    let result = AppConfig::load_from(&path);
    std::env::remove_var("DAQ_SETTINGS_APPLICATION__LOG_LEVEL");
    std::env::remove_var("DAQ_SETTINGS_PARAMETERS__CACHE_MAX_SIZE");

    let config = result.unwrap();
    assert_eq!(config.application.log_level, "warn");
    assert_eq!(config.parameters.cache_max_size, 0);
}

#[test]
#[serial]
fn invalid_values_are_rejected() {
    let (_dir, path) = write_config("[application]\nlog_format = \"xml\"\n");
    assert!(matches!(
        AppConfig::load_from(&path),
        Err(ConfigError::ValidationError(_))
    ));

    let (_dir, path) = write_config("[stage]\nmin_mm = 3.0\nmax_mm = 1.0\n");
    assert!(matches!(
        AppConfig::load_from(&path),
        Err(ConfigError::ValidationError(_))
    ));

    let (_dir, path) = write_config("[parameters]\ncache_max_size = \"many\"\n");
    assert!(matches!(
        AppConfig::load_from(&path),
        Err(ConfigError::LoadError(_))
    ));
}

#[test]
#[serial]
fn config_renders_as_toml() {
    let config = AppConfig::default();
    let text = toml::to_string_pretty(&config).unwrap();
    let back: AppConfig = toml::from_str(&text).unwrap();
    assert_eq!(back, config);
}

#[test]
fn logging_initializes_once() {
    let config = AppConfig::default();
    let _ = logging::init_from_config(&config);
    assert!(!logging::init_from_config(&config));
}
