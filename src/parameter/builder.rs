//! Builder for single-key parameters.

use regex::Regex;
use std::sync::Arc;

use super::metadata::{KeyMeta, ValidationRules, Validator};
use super::schema::ValidValues;
use super::tolerance::ToleranceCombine;
use super::value::Value;
use super::{Entry, Parameter, ParameterContext};
use crate::error::AppResult;

/// Builder for a single-key [`Parameter`].
///
/// # Example
///
/// ```rust
/// use daq_settings::parameter::{Parameter, ValueKind};
///
/// let position = Parameter::builder("position", 0.0)
///     .valid_values(ValueKind::Float)
///     .info("Stage position")
///     .units("mm")
///     .range(0.0, 10.0)
///     .tolerance_absolute(0.01)
///     .build()
///     .unwrap();
/// assert!(position.contains_key("position"));
/// ```
pub struct ParameterBuilder {
    name: String,
    value: Value,
    valid_values: Option<ValidValues>,
    info: String,
    visible: bool,
    units: String,
    min_value: Option<f64>,
    max_value: Option<f64>,
    pattern: Option<String>,
    validator: Option<Validator>,
    tolerance_percent: Option<f64>,
    tolerance_absolute: Option<f64>,
    tolerance_enabled: Option<bool>,
    tolerance_combine: Option<ToleranceCombine>,
    context: Option<ParameterContext>,
}

impl ParameterBuilder {
    /// Start with a name and an initial value.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            valid_values: None,
            info: String::new(),
            visible: false,
            units: String::new(),
            min_value: None,
            max_value: None,
            pattern: None,
            validator: None,
            tolerance_percent: None,
            tolerance_absolute: None,
            tolerance_enabled: None,
            tolerance_combine: None,
            context: None,
        }
    }

    /// Type, enum or schema constraint. Inferred from the value when unset.
    pub fn valid_values(mut self, valid_values: impl Into<ValidValues>) -> Self {
        self.valid_values = Some(valid_values.into());
        self
    }

    /// Shorthand for an enumeration constraint.
    pub fn choices(self, choices: Vec<Value>) -> Self {
        self.valid_values(ValidValues::Enum(choices))
    }

    /// Human-readable description.
    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }

    /// Display hint.
    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Unit tag for values that are not quantities.
    pub fn units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    /// Inclusive minimum.
    pub fn min_value(mut self, min: f64) -> Self {
        self.min_value = Some(min);
        self
    }

    /// Inclusive maximum.
    pub fn max_value(mut self, max: f64) -> Self {
        self.max_value = Some(max);
        self
    }

    /// Inclusive range.
    pub fn range(self, min: f64, max: f64) -> Self {
        self.min_value(min).max_value(max)
    }

    /// Regex that string values must match.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Custom predicate; returning `false` rejects the value.
    pub fn validator(mut self, validator: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Allowed deviation in percent of the target.
    pub fn tolerance_percent(mut self, percent: f64) -> Self {
        self.tolerance_percent = Some(percent);
        self
    }

    /// Allowed absolute deviation.
    pub fn tolerance_absolute(mut self, absolute: f64) -> Self {
        self.tolerance_absolute = Some(absolute);
        self
    }

    /// Force tolerance checking on or off.
    pub fn tolerance_enabled(mut self, enabled: bool) -> Self {
        self.tolerance_enabled = Some(enabled);
        self
    }

    /// How percent and absolute bounds combine.
    pub fn tolerance_combine(mut self, combine: ToleranceCombine) -> Self {
        self.tolerance_combine = Some(combine);
        self
    }

    /// Unit system and defaults. The shared registry is used when unset.
    pub fn context(mut self, context: ParameterContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Validate the initial value and build the parameter.
    pub fn build(self) -> AppResult<Parameter> {
        let context = self.context.unwrap_or_default();
        let pattern = self.pattern.as_deref().map(Regex::new).transpose()?;

        let mut tolerance = context.default_tolerance();
        tolerance.percent = self.tolerance_percent;
        tolerance.absolute = self.tolerance_absolute;
        tolerance.enabled = self.tolerance_enabled;
        if let Some(combine) = self.tolerance_combine {
            tolerance.combine = combine;
        }

        let meta = KeyMeta {
            valid_values: self
                .valid_values
                .unwrap_or_else(|| ValidValues::infer(&self.value)),
            info: self.info,
            visible: self.visible,
            units: self.units,
            rules: ValidationRules {
                min_value: self.min_value,
                max_value: self.max_value,
                pattern,
                validator: self.validator,
                unit: self.value.as_quantity().map(|q| q.unit().clone()),
            },
            tolerance,
        };

        let entry = Entry::validated(self.name, self.value, meta, &context)?;
        let mut parameter = Parameter::empty_in(context);
        parameter.push_entry(entry)?;
        Ok(parameter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DaqError;
    use crate::parameter::{ParameterDefaults, ValueKind};
    use crate::units::UnitRegistry;

    #[test]
    fn test_invalid_pattern() {
        let err = Parameter::builder("name", "x")
            .pattern("([")
            .build()
            .unwrap_err();
        assert!(matches!(err, DaqError::InvalidPattern(_)));
    }

    #[test]
    fn test_context_defaults_flow_into_tolerance() {
        let context = ParameterContext::new(
            Arc::new(UnitRegistry::new()),
            ParameterDefaults {
                cache_max_size: 7,
                tolerance_combine: ToleranceCombine::Any,
                tolerance_warning_fraction: 0.5,
            },
        );
        let p = Parameter::builder("x", 1.0)
            .tolerance_percent(1.0)
            .context(context)
            .build()
            .unwrap();
        let tolerance = &p.metadata("x").unwrap().tolerance;
        assert_eq!(tolerance.combine, ToleranceCombine::Any);
        assert_eq!(tolerance.warning_fraction, 0.5);
        assert_eq!(p.get_cache_stats().max_cache_size, 7);
    }

    #[test]
    fn test_custom_validator_on_build_and_set() {
        let build = |v: i64| {
            Parameter::builder("even", v)
                .valid_values(ValueKind::Int)
                .validator(|v| v.as_i64().is_some_and(|i| i % 2 == 0))
                .build()
        };
        assert!(build(3).is_err());
        let mut p = build(2).unwrap();
        assert!(p.set("even", 5).is_err());
        assert_eq!(p.get("even"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_map_value_becomes_nested() {
        let map = crate::parameter::ValueMap::from([("count".to_string(), Value::Int(1))]);
        let p = Parameter::builder("device", map).build().unwrap();
        assert!(p.get_nested("device").is_some());
    }
}
