//! Pre-flight parameter checks and range introspection.

use serde::Serialize;

use crate::error::{AppResult, DaqError};
use crate::parameter::{Parameter, ValidValues, Value, ValueKind};
use crate::units::Quantity;

/// Result of [`validate_parameter`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterCheck {
    /// The value could be applied unchanged.
    pub valid: bool,
    /// Human-readable explanation.
    pub message: String,
    /// Closest acceptable value, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clamped_value: Option<Value>,
}

impl ParameterCheck {
    fn valid() -> Self {
        Self {
            valid: true,
            message: "valid".to_string(),
            clamped_value: None,
        }
    }

    fn invalid(message: impl Into<String>, clamped_value: Option<Value>) -> Self {
        Self {
            valid: false,
            message: message.into(),
            clamped_value,
        }
    }
}

/// Result of [`get_parameter_ranges`]. Empty for unknown paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterRanges {
    /// Inclusive minimum.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive maximum.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Type / enum / schema constraint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_values: Option<ValidValues>,
    /// Runtime type of the current value.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    /// Unit of the current quantity, or the key's unit tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl ParameterRanges {
    /// Nothing known about the path.
    pub fn is_empty(&self) -> bool {
        *self == ParameterRanges::default()
    }
}

fn coercion(path: &str, value: &Value, reason: impl Into<String>) -> DaqError {
    DaqError::Coercion {
        key: path.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Turn a caller-supplied value into a quantity for a key currently holding
/// `current`.
///
/// Bare numbers and dimensionless strings take `current`'s unit, strings
/// such as `"2.5 GHz"` are parsed, quantities pass through unchecked.
pub fn coerce_quantity(
    node: &Parameter,
    path: &str,
    current: &Quantity,
    value: &Value,
) -> AppResult<Quantity> {
    match value {
        Value::Int(_) | Value::Float(_) => Ok(current.with_magnitude(value.as_f64().unwrap_or(f64::NAN))),
        Value::Quantity(q) => Ok(q.clone()),
        Value::Str(text) => {
            let parsed = node
                .context()
                .units
                .parse_quantity(text)
                .map_err(|e| coercion(path, value, e.to_string()))?;
            if parsed.dimension().is_dimensionless() && parsed.units().is_empty() {
                Ok(current.with_magnitude(parsed.magnitude()))
            } else {
                Ok(parsed)
            }
        }
        other => Err(coercion(
            path,
            other,
            format!("expected a number or quantity for a value in {}", current.units()),
        )),
    }
}

/// Check `value` against the leaf at dotted `path` without touching the
/// tree.
///
/// Quantity leaves accept numbers, unit strings and quantities. An
/// incompatible dimensionality is invalid with no clamp; a compatible but
/// different unit is invalid with `clamped_value` converted into the
/// existing unit and bounded by the range; a range violation is invalid with
/// `clamped_value` at the violated bound. Plain leaves defer to
/// [`Parameter::check`].
pub fn validate_parameter(
    settings: &Parameter,
    path: &str,
    value: &Value,
) -> AppResult<ParameterCheck> {
    let (node, key) = settings
        .resolve(path)
        .ok_or_else(|| DaqError::ParameterNotFound(path.to_string()))?;
    let meta = node
        .metadata(key)
        .ok_or_else(|| DaqError::ParameterNotFound(path.to_string()))?;

    if let Some(Value::Quantity(current)) = node.get(key) {
        let incoming = coerce_quantity(node, path, current, value)?;
        if !incoming.unit().is_compatible(current.unit()) {
            return Ok(ParameterCheck::invalid(
                format!(
                    "incompatible units for '{}': {} ({}) cannot be expressed in {} ({})",
                    path,
                    incoming.units(),
                    incoming.dimension(),
                    current.units(),
                    current.dimension()
                ),
                None,
            ));
        }
        let converted = incoming.to(current.unit())?;
        let rules = &meta.rules;
        let bounded = match rules.numeric(&Value::Quantity(converted.clone())) {
            Some(n) if rules.clamp(n) != n => {
                let clamped = rules.clamp(n);
                match &rules.unit {
                    Some(unit) => Quantity::new(clamped, unit.clone()).to(current.unit())?,
                    None => converted.with_magnitude(clamped),
                }
            }
            _ => converted.clone(),
        };

        if incoming.unit() != current.unit() {
            return Ok(ParameterCheck::invalid(
                format!(
                    "unit mismatch for '{}': expected {}, got {}",
                    path,
                    current.units(),
                    incoming.units()
                ),
                Some(Value::Quantity(bounded)),
            ));
        }
        if bounded != converted {
            return Ok(ParameterCheck::invalid(
                format!(
                    "{} for '{}' is outside [{}, {}]",
                    incoming,
                    path,
                    fmt_bound(rules.min_value),
                    fmt_bound(rules.max_value)
                ),
                Some(Value::Quantity(bounded)),
            ));
        }
        return match node.check(key, Value::Quantity(converted)) {
            Ok(_) => Ok(ParameterCheck::valid()),
            Err(DaqError::Validation(e)) => Ok(ParameterCheck::invalid(e.to_string(), None)),
            Err(e) => Err(e),
        };
    }

    let kind = meta.valid_values.kind();
    let value = match (kind, value) {
        (Some(ValueKind::Float), Value::Str(text)) => Value::Float(
            text.trim()
                .parse()
                .map_err(|_| coercion(path, value, "not a number"))?,
        ),
        (Some(ValueKind::Int), Value::Str(text)) => Value::Int(
            text.trim()
                .parse()
                .map_err(|_| coercion(path, value, "not an integer"))?,
        ),
        (Some(k), v) if !k.accepts(v) => {
            return Err(coercion(path, v, format!("expected {}", k.name())));
        }
        (_, v) => v.clone(),
    };

    match node.check(key, value.clone()) {
        Ok(_) => Ok(ParameterCheck::valid()),
        Err(DaqError::Validation(e)) => {
            let rules = &meta.rules;
            let clamped = rules.numeric(&value).map(|n| {
                let bound = rules.clamp(n);
                if kind == Some(ValueKind::Int) && bound.fract() == 0.0 {
                    Value::Int(bound as i64)
                } else {
                    Value::Float(bound)
                }
            });
            let clamped = clamped.filter(|c| c.as_f64() != value.as_f64());
            Ok(ParameterCheck::invalid(e.to_string(), clamped))
        }
        Err(DaqError::TypeMismatch { expected, found, .. }) => Ok(ParameterCheck::invalid(
            format!("{} is not {}", found, expected),
            None,
        )),
        Err(e) => Err(e),
    }
}

fn fmt_bound(bound: Option<f64>) -> String {
    bound.map(|b| b.to_string()).unwrap_or_else(|| "..".to_string())
}

/// Range metadata for the leaf at dotted `path`.
pub fn get_parameter_ranges(settings: &Parameter, path: &str) -> ParameterRanges {
    let Some((node, key)) = settings.resolve(path) else {
        return ParameterRanges::default();
    };
    let (Some(meta), Some(value)) = (node.metadata(key), node.get(key)) else {
        return ParameterRanges::default();
    };
    let units = match value {
        Value::Quantity(q) => Some(q.units().to_string()),
        _ if !meta.units.is_empty() => Some(meta.units.clone()),
        _ => None,
    };
    ParameterRanges {
        min: meta.rules.min_value,
        max: meta.rules.max_value,
        valid_values: Some(meta.valid_values.clone()),
        value_type: Some(value.type_name().to_string()),
        units,
    }
}
