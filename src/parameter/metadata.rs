//! Per-key metadata and the enhanced (range / pattern / custom) rule set.

use regex::Regex;
use std::fmt;
use std::sync::Arc;

use super::schema::ValidValues;
use super::tolerance::ToleranceConfig;
use super::value::Value;
use crate::error::{ValidationError, ValidationRule};
use crate::units::Unit;

/// Custom predicate. Returning `false` rejects the value.
pub type Validator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Range, pattern and custom rules configured for one key.
#[derive(Clone, Default)]
pub struct ValidationRules {
    /// Inclusive minimum for numeric values.
    pub min_value: Option<f64>,
    /// Inclusive maximum for numeric values.
    pub max_value: Option<f64>,
    /// Regex applied to string values only.
    pub pattern: Option<Regex>,
    /// Arbitrary predicate. Not serializable.
    pub validator: Option<Validator>,
    /// Unit the bounds are expressed in, for quantity-valued keys.
    pub unit: Option<Unit>,
}

impl fmt::Debug for ValidationRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRules")
            .field("min_value", &self.min_value)
            .field("max_value", &self.max_value)
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .field("has_validator", &self.validator.is_some())
            .field("unit", &self.unit.as_ref().map(Unit::symbol))
            .finish()
    }
}

impl ValidationRules {
    /// No rule configured.
    pub fn is_empty(&self) -> bool {
        self.min_value.is_none()
            && self.max_value.is_none()
            && self.pattern.is_none()
            && self.validator.is_none()
    }

    /// Run every configured rule against `value`.
    ///
    /// Quantities are compared in [`unit`](Self::unit) when it is
    /// dimensionally compatible, otherwise by raw magnitude.
    pub fn check(&self, key: &str, value: &Value) -> Result<(), ValidationError> {
        if let Some(number) = numeric_in(value, self.unit.as_ref()) {
            if let Some(min) = self.min_value {
                if !(number >= min) {
                    return Err(ValidationError::new(
                        key,
                        value.to_string(),
                        ValidationRule::MinValue(min),
                    ));
                }
            }
            if let Some(max) = self.max_value {
                if !(number <= max) {
                    return Err(ValidationError::new(
                        key,
                        value.to_string(),
                        ValidationRule::MaxValue(max),
                    ));
                }
            }
        }

        if let (Some(pattern), Value::Str(text)) = (&self.pattern, value) {
            if !pattern.is_match(text) {
                return Err(ValidationError::new(
                    key,
                    value.to_string(),
                    ValidationRule::Pattern(pattern.as_str().to_string()),
                ));
            }
        }

        if let Some(validator) = &self.validator {
            if !validator(value) {
                return Err(ValidationError::new(
                    key,
                    value.to_string(),
                    ValidationRule::Custom,
                ));
            }
        }

        Ok(())
    }

    /// Numeric view of `value` in the bounds' unit.
    pub fn numeric(&self, value: &Value) -> Option<f64> {
        numeric_in(value, self.unit.as_ref())
    }

    /// Bound `number` into `[min_value, max_value]`.
    pub fn clamp(&self, number: f64) -> f64 {
        let mut out = number;
        if let Some(max) = self.max_value {
            out = out.min(max);
        }
        if let Some(min) = self.min_value {
            out = out.max(min);
        }
        out
    }

    /// Serializable part of the rules.
    pub(crate) fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut out = serde_json::Map::new();
        if let Some(min) = self.min_value {
            out.insert("min_value".into(), min.into());
        }
        if let Some(max) = self.max_value {
            out.insert("max_value".into(), max.into());
        }
        if let Some(pattern) = &self.pattern {
            out.insert("pattern".into(), pattern.as_str().into());
        }
        if let Some(unit) = &self.unit {
            if self.min_value.is_some() || self.max_value.is_some() {
                out.insert("units".into(), unit.symbol().into());
            }
        }
        out
    }
}

/// Numeric view of `value`, with quantities expressed in `reference`.
pub(crate) fn numeric_in(value: &Value, reference: Option<&Unit>) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Quantity(q) => match reference {
            Some(unit) if q.unit() != unit => q.to(unit).ok().map(|c| c.magnitude()),
            _ => Some(q.magnitude()),
        },
        _ => None,
    }
}

/// Everything a [`Parameter`](super::Parameter) knows about one key
/// besides its value.
#[derive(Debug, Clone)]
pub struct KeyMeta {
    /// Type / enum / schema constraint.
    pub valid_values: ValidValues,
    /// Human description.
    pub info: String,
    /// Display hint.
    pub visible: bool,
    /// Unit tag for values that are not quantities.
    pub units: String,
    /// Enhanced rules.
    pub rules: ValidationRules,
    /// Readback tolerance.
    pub tolerance: ToleranceConfig,
}

impl KeyMeta {
    /// Metadata synthesized for a value without declared constraints.
    pub fn inferred(value: &Value, tolerance: ToleranceConfig) -> Self {
        Self {
            valid_values: ValidValues::infer(value),
            info: String::new(),
            visible: false,
            units: String::new(),
            rules: ValidationRules::default(),
            tolerance,
        }
    }
}
