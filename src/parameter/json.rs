//! JSON-with-units serialization of parameter trees.
//!
//! Layout:
//!
//! ```text
//! {
//!   "frequency": {"value": 2.85e9, "units": "Hz", "pint_quantity": true},
//!   "power":     {"value": -10.0,  "units": "dBm", "pint_quantity": false},
//!   "device":    { "count": {...}, "_metadata": {...} },
//!   "_metadata": {
//!     "valid_values":     {"frequency": "float", ...},
//!     "info":             {"frequency": "f", ...},
//!     "visible":          {"frequency": false, ...},
//!     "validation_rules": {"frequency": {"min_value": 9000.0, "units": "Hz"}, ...}
//!   }
//! }
//! ```
//!
//! A child object carrying its own `_metadata` block is a nested parameter.
//! Custom validators are not serializable and are dropped.
//!
//! Quantities inside lists and `{"enum": [...]}` entries take the leaf shape
//! as well. Non-finite floats are written as `"NaN"`, `"inf"` or `"-inf"`:
//! bare at a leaf declared `float` or `quantity`, wrapped in the leaf shape
//! everywhere else.

use regex::Regex;
use serde_json::{json, Map, Value as Json};

use super::metadata::{KeyMeta, ValidationRules};
use super::schema::ValidValues;
use super::tolerance::ToleranceCombine;
use super::schema::ValueKind;
use super::value::Value;
use super::{Entry, Parameter, ParameterContext, METADATA_KEY};
use crate::error::{AppResult, DaqError};
use crate::units::UnitSystem;

impl Parameter {
    /// Serialize values, units and metadata.
    pub fn to_json(&self) -> Json {
        let mut out = Map::new();
        let mut valid_values = Map::new();
        let mut info = Map::new();
        let mut visible = Map::new();
        let mut rules = Map::new();

        for entry in &self.entries {
            let node = match &entry.value {
                Value::Nested(child) => child.to_json(),
                Value::Quantity(_) => tagged_value(&entry.value),
                Value::Float(f) => json!({
                    "value": float_json(*f),
                    "units": entry.meta.units,
                    "pint_quantity": false,
                }),
                other => json!({
                    "value": tagged_value(other),
                    "units": entry.meta.units,
                    "pint_quantity": false,
                }),
            };
            out.insert(entry.key.clone(), node);

            valid_values.insert(entry.key.clone(), entry.meta.valid_values.to_json());
            info.insert(entry.key.clone(), Json::String(entry.meta.info.clone()));
            visible.insert(entry.key.clone(), Json::Bool(entry.meta.visible));
            let key_rules = rules_to_json(&entry.meta);
            if !key_rules.is_empty() {
                rules.insert(entry.key.clone(), Json::Object(key_rules));
            }
        }

        out.insert(
            METADATA_KEY.to_string(),
            json!({
                "valid_values": valid_values,
                "info": info,
                "visible": visible,
                "validation_rules": rules,
            }),
        );
        Json::Object(out)
    }

    /// Pretty-printed [`to_json`](Self::to_json).
    pub fn to_json_string(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_json())?)
    }

    /// Rebuild a tree with the shared unit registry.
    pub fn from_json(json: &Json) -> AppResult<Parameter> {
        Self::from_json_in(ParameterContext::default(), json)
    }

    /// Parse text produced by [`to_json_string`](Self::to_json_string).
    pub fn from_json_str(text: &str) -> AppResult<Parameter> {
        Self::from_json(&serde_json::from_str(text)?)
    }

    /// Rebuild a tree in an explicit context. Every value is validated
    /// against its restored metadata.
    pub fn from_json_in(context: ParameterContext, json: &Json) -> AppResult<Parameter> {
        let obj = json
            .as_object()
            .ok_or_else(|| DaqError::InvalidJson("expected an object".into()))?;
        let empty = Map::new();
        let metadata = obj
            .get(METADATA_KEY)
            .and_then(Json::as_object)
            .unwrap_or(&empty);
        let section = |name: &str| metadata.get(name).and_then(Json::as_object);

        let mut out = Parameter::empty_in(context.clone());
        for (key, node) in obj {
            if key == METADATA_KEY {
                continue;
            }
            let node_obj = node
                .as_object()
                .ok_or_else(|| DaqError::InvalidJson(format!("'{}' is not an object", key)))?;

            let declared = section("valid_values")
                .and_then(|s| s.get(key))
                .map(|v| ValidValues::from_json(v, context.units.as_ref()))
                .transpose()?;

            let (value, units) = if node_obj.contains_key(METADATA_KEY) {
                (
                    Value::Nested(Parameter::from_json_in(context.clone(), node)?),
                    String::new(),
                )
            } else {
                let kind = declared.as_ref().and_then(ValidValues::kind);
                read_leaf(&context, key, node_obj, kind)?
            };

            let valid_values = declared.unwrap_or_else(|| ValidValues::infer(&value));
            let info = section("info")
                .and_then(|s| s.get(key))
                .and_then(Json::as_str)
                .unwrap_or_default()
                .to_string();
            let visible = section("visible")
                .and_then(|s| s.get(key))
                .and_then(Json::as_bool)
                .unwrap_or(false);
            let mut meta = KeyMeta {
                valid_values,
                info,
                visible,
                units,
                rules: ValidationRules::default(),
                tolerance: context.default_tolerance(),
            };
            if let Some(rules) = section("validation_rules")
                .and_then(|s| s.get(key))
                .and_then(Json::as_object)
            {
                rules_from_json(&context, key, rules, &mut meta)?;
            }

            let entry = Entry::validated(key.clone(), value, meta, &context)?;
            out.push_entry(entry)?;
        }
        Ok(out)
    }
}

fn read_leaf(
    context: &ParameterContext,
    key: &str,
    node: &Map<String, Json>,
    kind: Option<ValueKind>,
) -> AppResult<(Value, String)> {
    let raw = node
        .get("value")
        .ok_or_else(|| DaqError::InvalidJson(format!("'{}' has no value", key)))?;
    let units = node
        .get("units")
        .and_then(Json::as_str)
        .unwrap_or_default()
        .to_string();
    let is_quantity = node
        .get("pint_quantity")
        .and_then(Json::as_bool)
        .unwrap_or(false);

    if is_quantity {
        let magnitude = json_float(raw)
            .ok_or_else(|| DaqError::InvalidJson(format!("'{}' magnitude is not a number", key)))?;
        let quantity = context.units.quantity(magnitude, &units)?;
        return Ok((Value::Quantity(quantity), String::new()));
    }
    let numeric = matches!(kind, Some(ValueKind::Float | ValueKind::Quantity));
    match non_finite(raw) {
        Some(f) if numeric => Ok((Value::Float(f), units)),
        _ => Ok((untag_value(context.units.as_ref(), raw)?, units)),
    }
}

/// Leaf-shaped JSON for a value. Quantities and non-finite floats become
/// `{"value", "units", "pint_quantity"}` objects, recursively inside lists
/// and mappings.
pub(crate) fn tagged_value(value: &Value) -> Json {
    match value {
        Value::Quantity(q) => json!({
            "value": float_json(q.magnitude()),
            "units": q.units(),
            "pint_quantity": true,
        }),
        Value::Float(f) if !f.is_finite() => json!({
            "value": float_json(*f),
            "units": "",
            "pint_quantity": false,
        }),
        Value::List(items) => Json::Array(items.iter().map(tagged_value).collect()),
        Value::Map(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), tagged_value(v)))
                .collect(),
        ),
        other => other.to_plain_json(),
    }
}

/// Inverse of [`tagged_value`]; quantities are rebuilt through `units`.
pub(crate) fn untag_value(units: &dyn UnitSystem, json: &Json) -> AppResult<Value> {
    match json {
        Json::Array(items) => Ok(Value::List(
            items
                .iter()
                .map(|item| untag_value(units, item))
                .collect::<AppResult<_>>()?,
        )),
        Json::Object(obj) => match leaf_parts(obj) {
            Some((raw, unit, true)) => {
                let magnitude = json_float(raw).ok_or_else(|| {
                    DaqError::InvalidJson(format!("quantity magnitude is not a number: {}", raw))
                })?;
                Ok(Value::Quantity(units.quantity(magnitude, unit)?))
            }
            Some((raw, _, false)) => match non_finite(raw) {
                Some(f) => Ok(Value::Float(f)),
                None => untag_value(units, raw),
            },
            None => Ok(Value::Map(
                obj.iter()
                    .map(|(k, v)| Ok((k.clone(), untag_value(units, v)?)))
                    .collect::<AppResult<_>>()?,
            )),
        },
        other => Ok(Value::from_plain_json(other)),
    }
}

/// `(value, units, pint_quantity)` when `obj` has exactly the leaf shape.
fn leaf_parts(obj: &Map<String, Json>) -> Option<(&Json, &str, bool)> {
    if obj.len() != 3 {
        return None;
    }
    let raw = obj.get("value")?;
    let units = obj.get("units")?.as_str()?;
    let is_quantity = obj.get("pint_quantity")?.as_bool()?;
    Some((raw, units, is_quantity))
}

fn float_json(f: f64) -> Json {
    if f.is_nan() {
        Json::from("NaN")
    } else if f.is_infinite() {
        Json::from(if f > 0.0 { "inf" } else { "-inf" })
    } else {
        Json::from(f)
    }
}

fn non_finite(json: &Json) -> Option<f64> {
    match json.as_str()? {
        "NaN" => Some(f64::NAN),
        "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

fn json_float(json: &Json) -> Option<f64> {
    json.as_f64().or_else(|| non_finite(json))
}

fn rules_to_json(meta: &KeyMeta) -> Map<String, Json> {
    let mut out = meta.rules.to_json();
    let tolerance = &meta.tolerance;
    if let Some(percent) = tolerance.percent {
        out.insert("tolerance_percent".into(), percent.into());
    }
    if let Some(absolute) = tolerance.absolute {
        out.insert("tolerance_absolute".into(), absolute.into());
    }
    if let Some(enabled) = tolerance.enabled {
        out.insert("tolerance_enabled".into(), enabled.into());
    }
    if tolerance.is_enabled() {
        out.insert("tolerance_combine".into(), tolerance.combine.as_str().into());
    }
    out
}

fn rules_from_json(
    context: &ParameterContext,
    key: &str,
    rules: &Map<String, Json>,
    meta: &mut KeyMeta,
) -> AppResult<()> {
    meta.rules.min_value = rules.get("min_value").and_then(Json::as_f64);
    meta.rules.max_value = rules.get("max_value").and_then(Json::as_f64);
    meta.rules.pattern = rules
        .get("pattern")
        .and_then(Json::as_str)
        .map(Regex::new)
        .transpose()?;
    meta.rules.unit = rules
        .get("units")
        .and_then(Json::as_str)
        .map(|u| context.units.unit(u))
        .transpose()?;

    meta.tolerance.percent = rules.get("tolerance_percent").and_then(Json::as_f64);
    meta.tolerance.absolute = rules.get("tolerance_absolute").and_then(Json::as_f64);
    meta.tolerance.enabled = rules.get("tolerance_enabled").and_then(Json::as_bool);
    if let Some(name) = rules.get("tolerance_combine").and_then(Json::as_str) {
        meta.tolerance.combine = ToleranceCombine::from_name(name).ok_or_else(|| {
            DaqError::InvalidJson(format!("'{}' has unknown tolerance_combine '{}'", key, name))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ValueKind;
    use crate::units::{UnitRegistry, UnitSystem};

    #[test]
    fn test_leaf_shape() {
        let units = UnitRegistry::shared();
        let p = Parameter::from_children([
            Parameter::builder("frequency", units.quantity(2.85e9, "Hz").unwrap())
                .info("f")
                .build()
                .unwrap(),
            Parameter::builder("power", -10.0).units("dBm").build().unwrap(),
        ])
        .unwrap();
        let json = p.to_json();
        assert_eq!(
            json["frequency"],
            json!({"value": 2.85e9, "units": "Hz", "pint_quantity": true})
        );
        assert_eq!(
            json["power"],
            json!({"value": -10.0, "units": "dBm", "pint_quantity": false})
        );
        assert_eq!(json["_metadata"]["info"]["frequency"], "f");
        assert_eq!(json["_metadata"]["valid_values"]["frequency"], "quantity");
    }

    #[test]
    fn test_key_order_preserved() {
        let p = Parameter::from_values([("zeta", 1), ("alpha", 2), ("mid", 3)]).unwrap();
        let json = p.to_json();
        let keys: Vec<&str> = json
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid", "_metadata"]);
        let back = Parameter::from_json(&json).unwrap();
        assert_eq!(back.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_rules_round_trip() {
        let p = Parameter::builder("filename", "data.txt")
            .valid_values(ValueKind::Str)
            .pattern(r"^\w+\.txt$")
            .build()
            .unwrap();
        let mut back = Parameter::from_json(&p.to_json()).unwrap();
        assert!(back.set("filename", "bad name.txt").is_err());

        let p = Parameter::builder("x", 1.0)
            .range(0.0, 2.0)
            .tolerance_percent(1.0)
            .tolerance_absolute(0.5)
            .build()
            .unwrap();
        let back = Parameter::from_json(&p.to_json()).unwrap();
        let meta = back.metadata("x").unwrap();
        assert_eq!(meta.rules.max_value, Some(2.0));
        assert_eq!(meta.tolerance, p.metadata("x").unwrap().tolerance);
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(
            Parameter::from_json(&json!([1, 2])),
            Err(DaqError::InvalidJson(_))
        ));
        assert!(matches!(
            Parameter::from_json(&json!({"x": {"units": ""}})),
            Err(DaqError::InvalidJson(_))
        ));
        assert!(matches!(
            Parameter::from_json(&json!({"x": {"value": 1.0, "units": "furlong", "pint_quantity": true}})),
            Err(DaqError::Units(_))
        ));
    }

    #[test]
    fn test_tagged_values_nest() {
        let units = UnitRegistry::shared();
        let value = Value::List(vec![
            Value::from(units.quantity(1.0, "mm").unwrap()),
            Value::Float(f64::NEG_INFINITY),
            Value::Int(3),
        ]);
        let json = tagged_value(&value);
        assert_eq!(
            json,
            json!([
                {"value": 1.0, "units": "mm", "pint_quantity": true},
                {"value": "-inf", "units": "", "pint_quantity": false},
                3
            ])
        );
        assert_eq!(untag_value(units.as_ref(), &json).unwrap(), value);

        // a plain mapping that only resembles a leaf stays a mapping
        let json = json!({"value": 1, "units": "mm"});
        assert!(matches!(
            untag_value(units.as_ref(), &json).unwrap(),
            Value::Map(_)
        ));
    }

    #[test]
    fn test_non_finite_leaf_needs_numeric_kind() {
        let json = json!({
            "gain": {"value": "inf", "units": "", "pint_quantity": false},
            "label": {"value": "inf", "units": "", "pint_quantity": false},
            "_metadata": {"valid_values": {"gain": "float", "label": "str"}}
        });
        let p = Parameter::from_json(&json).unwrap();
        assert_eq!(p.get("gain"), Some(&Value::Float(f64::INFINITY)));
        assert_eq!(p.get("label"), Some(&Value::from("inf")));
    }

    #[test]
    fn test_restored_values_are_validated() {
        let json = json!({
            "count": {"value": 2.5, "units": "", "pint_quantity": false},
            "_metadata": {"valid_values": {"count": "int"}}
        });
        assert!(matches!(
            Parameter::from_json(&json),
            Err(DaqError::TypeMismatch { .. })
        ));
    }
}
