//! Requested-vs-actual comparison and feedback classification.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::parameter::{Parameter, Value, ValueMap};

/// Relative epsilon used when comparing floating point readbacks.
pub const RELATIVE_EPSILON: f64 = 1e-9;

/// Why a requested setting ended up where it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackReason {
    /// Hardware reports the requested value (or one within tolerance).
    Success,
    /// Driver reported a clamp without saying which bound.
    Clamped,
    /// Request was below the minimum and the hardware sits at it.
    ClampedToMin,
    /// Request was above the maximum and the hardware sits at it.
    ClampedToMax,
    /// Readback is outside the configured tolerance.
    ToleranceViolation,
    /// Readback is within tolerance but close to the bound.
    HardwareDrift,
    /// Driver reported a transport or hardware fault.
    Error,
    /// Values differ and no signal explains why.
    Unknown,
    /// No probe reports the requested key.
    NotFound,
}

impl FeedbackReason {
    /// Serialized name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackReason::Success => "success",
            FeedbackReason::Clamped => "clamped",
            FeedbackReason::ClampedToMin => "clamped_to_min",
            FeedbackReason::ClampedToMax => "clamped_to_max",
            FeedbackReason::ToleranceViolation => "tolerance_violation",
            FeedbackReason::HardwareDrift => "hardware_drift",
            FeedbackReason::Error => "error",
            FeedbackReason::Unknown => "unknown",
            FeedbackReason::NotFound => "not_found",
        }
    }

    /// Only `Error` outcomes warrant interrupting the user.
    pub fn is_error(&self) -> bool {
        matches!(self, FeedbackReason::Error)
    }
}

impl fmt::Display for FeedbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one requested key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRecord {
    /// Hardware value differs from the request.
    pub changed: bool,
    /// Value the caller asked for.
    pub requested: Value,
    /// Value read back, if any probe reports the key.
    pub actual: Option<Value>,
    /// Classification.
    pub reason: FeedbackReason,
    /// Human-readable explanation.
    pub message: String,
}

/// Per-key feedback, ordered by key.
pub type Feedback = BTreeMap<String, FeedbackRecord>;

/// Everything one `update_and_get_with_feedback` call produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateOutcome {
    /// All probe readings after the update.
    pub actual_values: ValueMap,
    /// Per requested key.
    pub feedback: Feedback,
    /// Settings values of the requested keys before the update.
    pub previous: ValueMap,
}

fn close(a: f64, b: f64) -> bool {
    a == b || (a - b).abs() <= RELATIVE_EPSILON * a.abs().max(b.abs())
}

/// Requested and actual agree.
///
/// Quantities are compared by magnitude after conversion into the actual
/// value's unit, a bare number against a quantity is taken in the
/// quantity's unit, numbers use a tight relative epsilon, and a requested
/// mapping only needs its own keys to agree.
pub fn values_equal(requested: &Value, actual: &Value) -> bool {
    match (requested, actual) {
        (Value::Quantity(r), Value::Quantity(a)) => r
            .to(a.unit())
            .map(|r| close(r.magnitude(), a.magnitude()))
            .unwrap_or(false),
        (Value::Int(_) | Value::Float(_), Value::Quantity(a)) => requested
            .as_f64()
            .is_some_and(|r| close(r, a.magnitude())),
        (Value::Quantity(r), Value::Int(_) | Value::Float(_)) => {
            actual.as_f64().is_some_and(|a| close(r.magnitude(), a))
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            match (requested.as_f64(), actual.as_f64()) {
                (Some(r), Some(a)) => close(r, a),
                _ => false,
            }
        }
        (Value::Map(r), Value::Nested(a)) => r
            .iter()
            .all(|(k, v)| a.get(k).is_some_and(|av| values_equal(v, av))),
        (Value::Map(r), Value::Map(a)) => r
            .iter()
            .all(|(k, v)| a.get(k).is_some_and(|av| values_equal(v, av))),
        _ => requested == actual,
    }
}

fn mentions(last_error: Option<&str>, needle: &str) -> bool {
    last_error.is_some_and(|e| e.to_lowercase().contains(needle))
}

/// Classification from the driver's last-error string alone.
pub fn classify_basic(
    last_error: Option<&str>,
    key: &str,
    requested: &Value,
    actual: &Value,
) -> (FeedbackReason, String) {
    if mentions(last_error, "error") {
        return (
            FeedbackReason::Error,
            format!("{}: {}", key, last_error.unwrap_or_default()),
        );
    }
    if mentions(last_error, "clamped") {
        return (
            FeedbackReason::Clamped,
            format!(
                "{}: requested {}, hardware set {} ({})",
                key,
                requested,
                actual,
                last_error.unwrap_or_default()
            ),
        );
    }
    (
        FeedbackReason::Unknown,
        format!("{}: requested {}, hardware reports {}", key, requested, actual),
    )
}

/// Express a bare number in the unit of the key's current quantity.
fn normalize(settings: &Parameter, path: &str, value: &Value) -> Value {
    match (settings.get_path(path), value) {
        (Some(Value::Quantity(current)), Value::Int(_) | Value::Float(_)) => value
            .as_f64()
            .map(|n| Value::Quantity(current.with_magnitude(n)))
            .unwrap_or_else(|| value.clone()),
        _ => value.clone(),
    }
}

/// Classification using the settings tree's range and tolerance metadata
/// on top of the last-error signal.
///
/// Order: transport error, clamp to a range bound, tolerance report, then
/// the basic clamp / unknown fallback.
pub fn classify_with_tolerance(
    settings: &Parameter,
    last_error: Option<&str>,
    key: &str,
    requested: &Value,
    actual: &Value,
) -> (FeedbackReason, String) {
    if mentions(last_error, "error") {
        return classify_basic(last_error, key, requested, actual);
    }

    let Some((node, leaf)) = settings.resolve(key) else {
        return classify_basic(last_error, key, requested, actual);
    };
    let Some(meta) = node.metadata(leaf) else {
        return classify_basic(last_error, key, requested, actual);
    };
    let rules = &meta.rules;
    let requested_n = rules.numeric(&normalize(settings, key, requested));
    let actual_n = rules.numeric(&normalize(settings, key, actual));

    if let (Some(req), Some(act)) = (requested_n, actual_n) {
        if let Some(max) = rules.max_value {
            if req > max && close(act, max) {
                return (
                    FeedbackReason::ClampedToMax,
                    format!("{}: requested {} exceeds maximum {}, hardware set {}", key, requested, max, actual),
                );
            }
        }
        if let Some(min) = rules.min_value {
            if req < min && close(act, min) {
                return (
                    FeedbackReason::ClampedToMin,
                    format!("{}: requested {} below minimum {}, hardware set {}", key, requested, min, actual),
                );
            }
        }

        if let Some(report) = meta.tolerance.evaluate(req, act) {
            let detail = format!(
                "deviation {} ({:.4}%)",
                report.deviation_absolute, report.deviation_percent
            );
            return match (report.within_tolerance, report.warning_threshold_exceeded) {
                (true, false) => (
                    FeedbackReason::Success,
                    format!("{}: within tolerance, {}", key, detail),
                ),
                (true, true) => (
                    FeedbackReason::HardwareDrift,
                    format!("{}: within tolerance but drifting, {}", key, detail),
                ),
                (false, _) if mentions(last_error, "clamped") => {
                    classify_basic(last_error, key, requested, actual)
                }
                (false, _) => (
                    FeedbackReason::ToleranceViolation,
                    format!("{}: outside tolerance, {}", key, detail),
                ),
            };
        }
    }

    classify_basic(last_error, key, requested, actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{UnitRegistry, UnitSystem};

    #[test]
    fn test_values_equal() {
        let units = UnitRegistry::shared();
        let ghz = Value::Quantity(units.quantity(2.85, "GHz").unwrap());
        let hz = Value::Quantity(units.quantity(2.85e9, "Hz").unwrap());
        let mm = Value::Quantity(units.quantity(2.85, "mm").unwrap());
        assert!(values_equal(&ghz, &hz));
        assert!(!values_equal(&ghz, &mm));
        assert!(values_equal(&Value::Float(2.85), &ghz));
        assert!(values_equal(&Value::Int(3), &Value::Float(3.0)));
        assert!(values_equal(&Value::Float(0.1 + 0.2), &Value::Float(0.3)));
        assert!(!values_equal(&Value::Float(1.0), &Value::Float(1.001)));
        assert!(!values_equal(&Value::Float(f64::NAN), &Value::Float(f64::NAN)));
        assert!(values_equal(&Value::from("a"), &Value::from("a")));
    }

    #[test]
    fn test_basic_classification() {
        let (reason, _) = classify_basic(
            Some("communication error: timeout"),
            "position",
            &Value::Float(1.0),
            &Value::Float(0.0),
        );
        assert_eq!(reason, FeedbackReason::Error);

        let (reason, message) = classify_basic(
            Some("position clamped to 10 mm"),
            "position",
            &Value::Float(50.0),
            &Value::Float(10.0),
        );
        assert_eq!(reason, FeedbackReason::Clamped);
        assert!(message.contains("clamped to 10 mm"));

        let (reason, _) = classify_basic(None, "x", &Value::Int(1), &Value::Int(2));
        assert_eq!(reason, FeedbackReason::Unknown);
    }

    fn power() -> Parameter {
        Parameter::builder("power", -10.0)
            .units("dBm")
            .range(-110.0, 20.0)
            .tolerance_absolute(0.5)
            .build()
            .unwrap()
    }

    #[test]
    fn test_tolerance_classification() {
        let settings = power();
        let classify = |requested: f64, actual: f64| {
            classify_with_tolerance(
                &settings,
                None,
                "power",
                &Value::Float(requested),
                &Value::Float(actual),
            )
            .0
        };
        assert_eq!(classify(-10.0, -9.9), FeedbackReason::Success);
        assert_eq!(classify(-10.0, -9.55), FeedbackReason::HardwareDrift);
        assert_eq!(classify(-10.0, -9.0), FeedbackReason::ToleranceViolation);
        assert_eq!(classify(30.0, 20.0), FeedbackReason::ClampedToMax);
        assert_eq!(classify(-200.0, -110.0), FeedbackReason::ClampedToMin);
    }

    #[test]
    fn test_error_wins_over_metadata() {
        let settings = power();
        let (reason, _) = classify_with_tolerance(
            &settings,
            Some("communication error: port closed"),
            "power",
            &Value::Float(30.0),
            &Value::Float(20.0),
        );
        assert_eq!(reason, FeedbackReason::Error);
    }

    #[test]
    fn test_reason_serializes_snake_case() {
        let json = serde_json::to_value(FeedbackReason::ClampedToMax).unwrap();
        assert_eq!(json, "clamped_to_max");
        assert_eq!(FeedbackReason::NotFound.to_string(), "not_found");
    }
}
