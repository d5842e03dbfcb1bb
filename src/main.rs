//! daq-settings command line tool.
//!
//! Drives the mock instruments through the feedback protocol, converts
//! quantities and round-trips serialized settings trees.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use daq_settings::config::AppConfig;
use daq_settings::device::{Device, MockStage, MockSynthesizer, UpdateOutcome};
use daq_settings::logging;
use daq_settings::parameter::{Parameter, Value, ValueMap};
use daq_settings::units::{UnitRegistry, UnitSystem};

#[derive(Parser)]
#[command(name = "daq-settings")]
#[command(about = "Validated instrument settings with hardware feedback", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to config/daq_settings.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the stage and synthesizer scenarios and print their feedback
    Demo,

    /// Convert a quantity such as "2.85 GHz" into another unit
    Convert {
        /// Quantity text, magnitude followed by unit
        quantity: String,
        /// Target unit
        unit: String,
    },

    /// Show dimensionality and compatible units of a unit expression
    Units {
        /// Unit expression, e.g. "mm/s"
        unit: String,
    },

    /// Apply a JSON settings file to a mock device
    Apply {
        /// Target device
        #[arg(value_enum)]
        device: DeviceKind,
        /// JSON object of settings; quantities as {"magnitude", "units"}
        file: PathBuf,
    },

    /// Read a serialized parameter tree and write it back
    Roundtrip {
        /// Serialized parameter JSON
        file: PathBuf,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DeviceKind {
    Stage,
    Synthesizer,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AppConfig::load().context("Failed to load configuration")?,
    };
    logging::init_from_config(&config);

    match cli.command {
        Commands::Demo => run_demo(&config),
        Commands::Convert { quantity, unit } => run_convert(&quantity, &unit),
        Commands::Units { unit } => run_units(&unit),
        Commands::Apply { device, file } => run_apply(&config, device, &file),
        Commands::Roundtrip { file, output } => run_roundtrip(&file, output.as_deref()),
        Commands::Config => {
            let text = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            print!("{}", text);
            Ok(())
        }
    }
}

fn stage(config: &AppConfig) -> Result<MockStage> {
    Ok(MockStage::with_context(
        config.parameter_context(),
        config.stage.min_mm,
        config.stage.max_mm,
    )?)
}

fn print_outcome(title: &str, outcome: &UpdateOutcome) -> Result<()> {
    println!("== {}", title);
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(())
}

fn run_demo(config: &AppConfig) -> Result<()> {
    let units = UnitRegistry::shared();
    let mut stage = stage(config)?;
    let (_, max_mm) = stage.limits();

    let request = ValueMap::from([(
        "position".to_string(),
        Value::from(units.quantity(max_mm / 2.0, "mm")?),
    )]);
    print_outcome("stage: move within travel", &stage.update_and_get_with_feedback(&request)?)?;

    let request = ValueMap::from([(
        "position".to_string(),
        Value::from(units.quantity(max_mm * 5.0, "mm")?),
    )]);
    print_outcome("stage: move past travel", &stage.update_and_get_with_feedback(&request)?)?;

    stage.inject_fault("timeout");
    let request = ValueMap::from([("position".to_string(), Value::from(units.quantity(1.0, "mm")?))]);
    print_outcome("stage: transport fault", &stage.update_and_get_with_feedback(&request)?)?;

    let mut synth =
        MockSynthesizer::with_context(config.parameter_context())?.with_frequency_offset(25e3);
    let request = ValueMap::from([
        ("frequency".to_string(), Value::from(units.quantity(2.85, "GHz")?)),
        ("power".to_string(), Value::Float(30.0)),
        ("output".to_string(), Value::Bool(true)),
    ]);
    print_outcome("synthesizer: drift and clamp", &synth.update_and_get_with_feedback(&request)?)?;

    let check = synth.validate_parameter("frequency", &Value::from(units.quantity(7.0, "GHz")?))?;
    println!("== synthesizer: pre-flight check of 7 GHz");
    println!("{}", serde_json::to_string_pretty(&check)?);
    Ok(())
}

fn run_convert(quantity: &str, unit: &str) -> Result<()> {
    let units = UnitRegistry::shared();
    let parsed = units
        .parse_quantity(quantity)
        .with_context(|| format!("Invalid quantity '{}'", quantity))?;
    let converted = units.convert(&parsed, unit)?;
    println!("{} = {}", parsed, converted);
    println!("display unit: {}", units.best_display_unit(&parsed));
    Ok(())
}

fn run_units(unit: &str) -> Result<()> {
    let units = UnitRegistry::shared();
    let resolved = units.unit(unit)?;
    let sample = units.quantity(1.0, unit)?;
    let report = serde_json::json!({
        "unit": resolved.symbol(),
        "dimensionality": resolved.dimension().to_string(),
        "compatible_units": units.compatible_units_for(&resolved.dimension()),
        "display_unit": units.best_display_unit(&sample),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Settings request from plain JSON; `{"magnitude", "units"}` objects
/// become quantities.
fn request_from_json(json: &serde_json::Value) -> Result<ValueMap> {
    let units = UnitRegistry::shared();
    let Some(object) = json.as_object() else {
        bail!("settings file must contain a JSON object");
    };
    object
        .iter()
        .map(|(key, value)| -> Result<(String, Value)> {
            let parsed = match (
                value.get("magnitude").and_then(serde_json::Value::as_f64),
                value.get("units").and_then(serde_json::Value::as_str),
            ) {
                (Some(magnitude), Some(unit)) => Value::from(units.quantity(magnitude, unit)?),
                _ => Value::from_plain_json(value),
            };
            Ok((key.clone(), parsed))
        })
        .collect()
}

fn run_apply(config: &AppConfig, device: DeviceKind, file: &Path) -> Result<()> {
    let text =
        fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", file.display()))?;
    let request = request_from_json(&json)?;

    let mut device: Box<dyn Device> = match device {
        DeviceKind::Stage => Box::new(stage(config)?),
        DeviceKind::Synthesizer => Box::new(MockSynthesizer::with_context(config.parameter_context())?),
    };
    info!(device = device.name(), file = %file.display(), "applying settings file");
    let outcome = device.update_and_get_with_feedback(&request)?;
    print_outcome(device.name(), &outcome)
}

fn run_roundtrip(file: &Path, output: Option<&Path>) -> Result<()> {
    let text =
        fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let parameter = Parameter::from_json_str(&text)
        .with_context(|| format!("Invalid parameter tree in {}", file.display()))?;
    let rendered = parameter.to_json_string()?;
    match output {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", rendered),
    }
    Ok(())
}
