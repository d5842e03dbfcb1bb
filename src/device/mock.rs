//! Mock Hardware Implementations
//!
//! Simulated devices for tests, benchmarks and the CLI. Both run the real
//! feedback protocol against in-memory hardware state.
//!
//! # Available Mocks
//!
//! - `MockStage` - linear stage that clamps to its travel limits and can be
//!   told to fail its next update at the transport level
//! - `MockSynthesizer` - RF source with range clamping, readback offsets and
//!   seeded jitter, classified with tolerance metadata

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use super::feedback::{classify_with_tolerance, FeedbackReason};
use super::validation::coerce_quantity;
use super::{probe_not_found, Device, Probe};
use crate::error::{AppResult, DaqError};
use crate::parameter::{Parameter, ParameterContext, Value, ValueKind, ValueMap};
use crate::units::Quantity;

// =============================================================================
// MockStage - Simulated Motion Stage
// =============================================================================

const STAGE_PROBES: &[Probe] = &[
    Probe::new("position", "Encoder position"),
    Probe::new("velocity", "Configured velocity"),
    Probe::new("moving", "Motion in progress"),
];

/// Mock linear stage.
///
/// Requests outside the travel limits are clamped and recorded as
/// `"position clamped to <x> mm"`. [`inject_fault`](Self::inject_fault)
/// makes the next update fail before touching the hardware.
///
/// # Example
///
/// ```rust
/// use daq_settings::device::{Device, FeedbackReason, MockStage};
/// use daq_settings::parameter::{Value, ValueMap};
///
/// let mut stage = MockStage::new().unwrap();
/// let request = ValueMap::from([("position".to_string(), Value::Float(50.0))]);
/// let feedback = stage.get_feedback_only(&request).unwrap();
/// assert_eq!(feedback["position"].reason, FeedbackReason::Clamped);
/// ```
#[derive(Debug)]
pub struct MockStage {
    settings: Parameter,
    position_mm: f64,
    velocity_mm_s: f64,
    min_mm: f64,
    max_mm: f64,
    last_error: Option<String>,
    pending_fault: Option<String>,
}

impl MockStage {
    /// Stage at 0 mm with 0-10 mm travel.
    pub fn new() -> AppResult<Self> {
        Self::with_limits(0.0, 10.0)
    }

    /// Stage with custom travel limits.
    pub fn with_limits(min_mm: f64, max_mm: f64) -> AppResult<Self> {
        Self::with_context(ParameterContext::default(), min_mm, max_mm)
    }

    /// Stage in an explicit parameter context.
    pub fn with_context(context: ParameterContext, min_mm: f64, max_mm: f64) -> AppResult<Self> {
        if !(min_mm <= max_mm) {
            return Err(DaqError::Device(format!(
                "invalid travel limits [{}, {}] mm",
                min_mm, max_mm
            )));
        }
        let units = context.units.clone();
        let start = 0.0_f64.clamp(min_mm, max_mm);
        let settings = Parameter::from_children([
            Parameter::builder("position", units.quantity(start, "mm")?)
                .info("Stage position")
                .visible(true)
                .context(context.clone())
                .build()?,
            Parameter::builder("velocity", units.quantity(1.0, "mm/s")?)
                .info("Motion velocity")
                .min_value(0.0)
                .context(context)
                .build()?,
        ])?;
        Ok(Self {
            settings,
            position_mm: start,
            velocity_mm_s: 1.0,
            min_mm,
            max_mm,
            last_error: None,
            pending_fault: None,
        })
    }

    /// Apply initial settings through [`Device::update`].
    pub fn with_settings(mut self, initial: &ValueMap) -> AppResult<Self> {
        self.update(initial)?;
        Ok(self)
    }

    /// Fail the next update with `"communication error: <message>"`.
    pub fn inject_fault(&mut self, message: impl Into<String>) {
        self.pending_fault = Some(message.into());
    }

    /// Travel limits in mm.
    pub fn limits(&self) -> (f64, f64) {
        (self.min_mm, self.max_mm)
    }

    fn requested_in(&self, key: &str, value: &Value, unit: &str) -> AppResult<f64> {
        let checked = self.settings.check(key, value)?;
        let quantity = checked
            .as_quantity()
            .ok_or_else(|| DaqError::NotAQuantity(key.to_string()))?;
        Ok(self.settings.context().units.convert(quantity, unit)?.magnitude())
    }

    fn quantity(&self, magnitude: f64, unit: &str) -> AppResult<Quantity> {
        Ok(self.settings.context().units.quantity(magnitude, unit)?)
    }
}

impl Device for MockStage {
    fn name(&self) -> &str {
        "stage"
    }

    fn settings(&self) -> &Parameter {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut Parameter {
        &mut self.settings
    }

    fn probes(&self) -> &[Probe] {
        STAGE_PROBES
    }

    fn read_probe(&mut self, key: &str) -> AppResult<Value> {
        match key {
            "position" => Ok(self.quantity(self.position_mm, "mm")?.into()),
            "velocity" => Ok(self.quantity(self.velocity_mm_s, "mm/s")?.into()),
            "moving" => Ok(Value::Bool(false)),
            other => Err(probe_not_found(self.name(), other)),
        }
    }

    fn update(&mut self, settings: &ValueMap) -> AppResult<()> {
        self.last_error = None;
        if let Some(fault) = self.pending_fault.take() {
            let message = format!("communication error: {}", fault);
            warn!(device = "stage", "{}", message);
            self.last_error = Some(message);
            return Ok(());
        }

        for (key, value) in settings {
            match key.as_str() {
                "position" => {
                    let requested = self.requested_in(key, value, "mm")?;
                    let actual = requested.clamp(self.min_mm, self.max_mm);
                    if actual != requested {
                        let message = format!("position clamped to {} mm", actual);
                        warn!(device = "stage", requested, "{}", message);
                        self.last_error = Some(message);
                    }
                    debug!(device = "stage", position_mm = actual, "moved");
                    self.position_mm = actual;
                    let q = self.quantity(actual, "mm")?;
                    self.settings.set("position", q)?;
                }
                "velocity" => {
                    let requested = self.requested_in(key, value, "mm/s")?;
                    let q = self.quantity(requested, "mm/s")?;
                    self.settings.set("velocity", q)?;
                    self.velocity_mm_s = requested;
                }
                _ => self.settings.set(key, value)?,
            }
        }
        Ok(())
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

// =============================================================================
// MockSynthesizer - Simulated RF Source
// =============================================================================

const SYNTH_PROBES: &[Probe] = &[
    Probe::new("frequency", "Output frequency"),
    Probe::new("power", "Output power (dBm)"),
    Probe::new("output", "RF output enabled"),
    Probe::new("locked", "Reference PLL locked"),
];

/// Mock RF synthesizer.
///
/// Requests outside the settings ranges (9 kHz-6 GHz, -110-20 dBm) are
/// clamped to the bound. Readbacks carry an optional fixed offset and
/// seeded uniform jitter, so drift and tolerance violations are
/// reproducible. Classification uses the settings' range and tolerance
/// metadata.
#[derive(Debug)]
pub struct MockSynthesizer {
    settings: Parameter,
    frequency_hz: f64,
    power_dbm: f64,
    output: bool,
    locked: bool,
    frequency_offset_hz: f64,
    power_offset_db: f64,
    jitter: Option<(StdRng, f64)>,
    last_error: Option<String>,
}

impl MockSynthesizer {
    /// Synthesizer at 1 GHz, -10 dBm, output off.
    pub fn new() -> AppResult<Self> {
        Self::with_context(ParameterContext::default())
    }

    /// Synthesizer in an explicit parameter context.
    pub fn with_context(context: ParameterContext) -> AppResult<Self> {
        let settings = Parameter::from_children([
            Parameter::builder("frequency", context.units.quantity(1e9, "Hz")?)
                .valid_values(ValueKind::Float)
                .info("Output frequency")
                .visible(true)
                .range(9e3, 6e9)
                .tolerance_percent(0.001)
                .context(context.clone())
                .build()?,
            Parameter::builder("power", -10.0)
                .info("Output power")
                .visible(true)
                .units("dBm")
                .range(-110.0, 20.0)
                .tolerance_absolute(0.5)
                .context(context.clone())
                .build()?,
            Parameter::builder("output", false)
                .info("RF output enabled")
                .visible(true)
                .context(context)
                .build()?,
        ])?;
        Ok(Self {
            settings,
            frequency_hz: 1e9,
            power_dbm: -10.0,
            output: false,
            locked: true,
            frequency_offset_hz: 0.0,
            power_offset_db: 0.0,
            jitter: None,
            last_error: None,
        })
    }

    /// Constant offset added to every frequency readback.
    pub fn with_frequency_offset(mut self, offset_hz: f64) -> Self {
        self.frequency_offset_hz = offset_hz;
        self
    }

    /// Constant offset added to every power readback.
    pub fn with_power_offset(mut self, offset_db: f64) -> Self {
        self.power_offset_db = offset_db;
        self
    }

    /// Uniform power jitter in `[-amplitude_db, amplitude_db]` from a seeded
    /// generator.
    pub fn with_jitter(mut self, seed: u64, amplitude_db: f64) -> Self {
        self.jitter = Some((StdRng::seed_from_u64(seed), amplitude_db.abs()));
        self
    }

    /// Apply initial settings through [`Device::update`].
    pub fn with_settings(mut self, initial: &ValueMap) -> AppResult<Self> {
        self.update(initial)?;
        Ok(self)
    }

    /// Clamp `requested` into the key's range, noting it in `last_error`.
    fn clamp(&mut self, key: &str, requested: f64, unit: &str) -> f64 {
        let Some(meta) = self.settings.metadata(key) else {
            return requested;
        };
        let actual = meta.rules.clamp(requested);
        if actual != requested {
            let message = format!("{} clamped to {} {}", key, actual, unit);
            warn!(device = "synthesizer", requested, "{}", message);
            self.last_error = Some(message);
        }
        actual
    }
}

impl Device for MockSynthesizer {
    fn name(&self) -> &str {
        "synthesizer"
    }

    fn settings(&self) -> &Parameter {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut Parameter {
        &mut self.settings
    }

    fn probes(&self) -> &[Probe] {
        SYNTH_PROBES
    }

    fn read_probe(&mut self, key: &str) -> AppResult<Value> {
        match key {
            "frequency" => Ok(self
                .settings
                .context()
                .units
                .quantity(self.frequency_hz + self.frequency_offset_hz, "Hz")?
                .into()),
            "power" => {
                let jitter = match &mut self.jitter {
                    Some((rng, amplitude)) if *amplitude > 0.0 => {
                        rng.gen_range(-*amplitude..=*amplitude)
                    }
                    _ => 0.0,
                };
                Ok(Value::Float(self.power_dbm + self.power_offset_db + jitter))
            }
            "output" => Ok(Value::Bool(self.output)),
            "locked" => Ok(Value::Bool(self.locked)),
            other => Err(probe_not_found(self.name(), other)),
        }
    }

    fn update(&mut self, settings: &ValueMap) -> AppResult<()> {
        self.last_error = None;
        for (key, value) in settings {
            match key.as_str() {
                "frequency" => {
                    let Some(Value::Quantity(current)) = self.settings.get("frequency") else {
                        return Err(DaqError::NotAQuantity(key.clone()));
                    };
                    let requested = coerce_quantity(&self.settings, key, current, value)?;
                    let hz = self.settings.context().units.convert(&requested, "Hz")?;
                    let actual = self.clamp(key, hz.magnitude(), "Hz");
                    self.settings.set("frequency", hz.with_magnitude(actual))?;
                    self.frequency_hz = actual;
                    self.locked = true;
                }
                "power" => {
                    let requested = match value {
                        Value::Str(text) => text.trim().parse().ok(),
                        other => other.as_f64(),
                    }
                    .ok_or_else(|| DaqError::Coercion {
                        key: key.clone(),
                        value: value.to_string(),
                        reason: "expected a number".into(),
                    })?;
                    let actual = self.clamp(key, requested, "dBm");
                    self.settings.set("power", actual)?;
                    self.power_dbm = actual;
                }
                "output" => {
                    self.settings.set("output", value)?;
                    self.output = value.as_bool().unwrap_or(false);
                }
                _ => self.settings.set(key, value)?,
            }
        }
        Ok(())
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn classify(&self, key: &str, requested: &Value, actual: &Value) -> (FeedbackReason, String) {
        classify_with_tolerance(&self.settings, self.last_error(), key, requested, actual)
    }
}
