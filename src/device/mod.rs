//! Device contract and the update / read-back / classify feedback protocol.
//!
//! A [`Device`] owns one settings [`Parameter`] tree and declares a set of
//! [`Probe`]s. Probes are always read from hardware (or a simulation), never
//! echoed from the settings tree.
//!
//! # Feedback protocol
//!
//! [`Device::update_and_get_with_feedback`] is the core state machine:
//!
//! 1. snapshot the current settings of the requested keys,
//! 2. [`update`](Device::update) the hardware,
//! 3. [`read_probes`](Device::read_probes),
//! 4. compare requested vs actual per key and classify each difference,
//! 5. return [`UpdateOutcome`].
//!
//! Clamping, drift and transport faults are reported as feedback, never as
//! errors. Errors are reserved for paths that do not exist and values that
//! cannot be coerced at all.
//!
//! The model is synchronous: every call blocks until the hardware round trip
//! completes, and callers serialize access to one device themselves.

pub mod feedback;
pub mod mock;
pub mod validation;

pub use feedback::{
    classify_basic, classify_with_tolerance, values_equal, Feedback, FeedbackReason,
    FeedbackRecord, UpdateOutcome,
};
pub use mock::{MockStage, MockSynthesizer};
pub use validation::{ParameterCheck, ParameterRanges};

use tracing::{info, warn};

use crate::error::{AppResult, DaqError};
use crate::parameter::{Parameter, Value, ValueMap};

/// A named, hardware-observed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    /// Key in [`Device::read_probes`] output.
    pub name: &'static str,
    /// Human description.
    pub info: &'static str,
}

impl Probe {
    /// Declare a probe.
    pub const fn new(name: &'static str, info: &'static str) -> Self {
        Self { name, info }
    }
}

/// An instrument mediating between requested settings and hardware state.
pub trait Device {
    /// Instance name used in messages.
    fn name(&self) -> &str;

    /// Settings tree.
    fn settings(&self) -> &Parameter;

    /// Mutable settings tree.
    fn settings_mut(&mut self) -> &mut Parameter;

    /// Declared probes.
    fn probes(&self) -> &[Probe];

    /// Read one probe from hardware.
    fn read_probe(&mut self, key: &str) -> AppResult<Value>;

    /// Apply a partial settings mapping.
    ///
    /// The default merges into the settings tree. Drivers override this to
    /// command hardware; they may clamp, and report transport faults through
    /// [`last_error`](Self::last_error) instead of failing.
    fn update(&mut self, settings: &ValueMap) -> AppResult<()> {
        self.settings_mut().update(settings)
    }

    /// Last error string recorded by the driver during the latest update.
    fn last_error(&self) -> Option<&str> {
        None
    }

    /// Read every declared probe, in declaration order of keys.
    fn read_probes(&mut self) -> AppResult<ValueMap> {
        let names: Vec<&'static str> = self.probes().iter().map(|p| p.name).collect();
        names
            .into_iter()
            .map(|name| Ok((name.to_string(), self.read_probe(name)?)))
            .collect()
    }

    /// Explain why `actual` differs from `requested`.
    fn classify(&self, key: &str, requested: &Value, actual: &Value) -> (FeedbackReason, String) {
        classify_basic(self.last_error(), key, requested, actual)
    }

    /// Update, read back and classify every requested key.
    fn update_and_get_with_feedback(&mut self, settings: &ValueMap) -> AppResult<UpdateOutcome> {
        let previous: ValueMap = settings
            .keys()
            .filter_map(|k| self.settings().get_path(k).map(|v| (k.clone(), v.clone())))
            .collect();

        info!(
            device = self.name(),
            keys = ?settings.keys().collect::<Vec<_>>(),
            "applying settings"
        );
        self.update(settings)?;
        let actual_values = self.read_probes()?;

        let mut feedback = Feedback::new();
        for (key, requested) in settings {
            let record = match actual_values.get(key) {
                None => FeedbackRecord {
                    changed: false,
                    requested: requested.clone(),
                    actual: None,
                    reason: FeedbackReason::NotFound,
                    message: format!("'{}' is not reported by any probe", key),
                },
                Some(actual) if values_equal(requested, actual) => FeedbackRecord {
                    changed: false,
                    requested: requested.clone(),
                    actual: Some(actual.clone()),
                    reason: FeedbackReason::Success,
                    message: format!("{}: set to {}", key, actual),
                },
                Some(actual) => {
                    let (reason, message) = self.classify(key, requested, actual);
                    FeedbackRecord {
                        changed: true,
                        requested: requested.clone(),
                        actual: Some(actual.clone()),
                        reason,
                        message,
                    }
                }
            };
            if record.reason != FeedbackReason::Success {
                warn!(
                    device = self.name(),
                    key = %key,
                    reason = %record.reason,
                    "{}",
                    record.message
                );
            }
            feedback.insert(key.clone(), record);
        }

        Ok(UpdateOutcome {
            actual_values,
            feedback,
            previous,
        })
    }

    /// Actual values after one update.
    fn update_and_get(&mut self, settings: &ValueMap) -> AppResult<ValueMap> {
        Ok(self.update_and_get_with_feedback(settings)?.actual_values)
    }

    /// Feedback records from one update.
    fn get_feedback_only(&mut self, settings: &ValueMap) -> AppResult<Feedback> {
        Ok(self.update_and_get_with_feedback(settings)?.feedback)
    }

    /// Pre-flight check of `value` for the dotted settings `path`.
    fn validate_parameter(&self, path: &str, value: &Value) -> AppResult<ParameterCheck> {
        validation::validate_parameter(self.settings(), path, value)
    }

    /// Range metadata for the dotted settings `path`.
    fn get_parameter_ranges(&self, path: &str) -> ParameterRanges {
        validation::get_parameter_ranges(self.settings(), path)
    }
}

/// Error for a probe the device does not declare.
pub fn probe_not_found(device: &str, probe: &str) -> DaqError {
    DaqError::ProbeNotFound {
        device: device.to_string(),
        probe: probe.to_string(),
    }
}
