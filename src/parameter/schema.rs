//! `valid_values` constraints: a type tag, an enumeration, or a nested
//! structural schema.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use super::json::{tagged_value, untag_value};
use super::value::Value;
use crate::error::{AppResult, DaqError};
use crate::units::UnitSystem;

/// Type tag for [`ValidValues::Type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Anything.
    Any,
    /// `Bool`.
    Bool,
    /// `Int` only; floats are rejected even when integral.
    Int,
    /// `Float`, `Int` or a `Quantity` (magnitude counts).
    Float,
    /// `Str`.
    Str,
    /// `Quantity`, or a plain number taken in the key's current unit.
    Quantity,
    /// `List`.
    List,
    /// `Map` or `Nested`.
    Map,
}

impl ValueKind {
    /// Tag used in serialized metadata.
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Any => "any",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::Quantity => "quantity",
            ValueKind::List => "list",
            ValueKind::Map => "map",
        }
    }

    /// Parse a serialized tag.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "any" => ValueKind::Any,
            "bool" => ValueKind::Bool,
            "int" => ValueKind::Int,
            "float" => ValueKind::Float,
            "str" => ValueKind::Str,
            "quantity" => ValueKind::Quantity,
            "list" => ValueKind::List,
            "map" => ValueKind::Map,
            _ => return None,
        })
    }

    /// Runtime type check.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ValueKind::Any, _) => true,
            (ValueKind::Bool, Value::Bool(_)) => true,
            (ValueKind::Int, Value::Int(_)) => true,
            (ValueKind::Float, Value::Float(_) | Value::Int(_) | Value::Quantity(_)) => true,
            (ValueKind::Str, Value::Str(_)) => true,
            (ValueKind::Quantity, Value::Quantity(_) | Value::Float(_) | Value::Int(_)) => true,
            (ValueKind::List, Value::List(_)) => true,
            (ValueKind::Map, Value::Map(_) | Value::Nested(_)) => true,
            _ => false,
        }
    }
}

/// Per-key type/shape constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidValues {
    /// Value must be of this kind.
    Type(ValueKind),
    /// Value must be one of these.
    Enum(Vec<Value>),
    /// Value must be a mapping with exactly these keys, each valid against
    /// its own constraint.
    Schema(Vec<(String, ValidValues)>),
}

impl ValidValues {
    /// Constraint implied by a value's runtime type.
    pub fn infer(value: &Value) -> ValidValues {
        match value {
            Value::Null => ValidValues::Type(ValueKind::Any),
            Value::Bool(_) => ValidValues::Type(ValueKind::Bool),
            Value::Int(_) => ValidValues::Type(ValueKind::Int),
            Value::Float(_) => ValidValues::Type(ValueKind::Float),
            Value::Str(_) => ValidValues::Type(ValueKind::Str),
            Value::Quantity(_) => ValidValues::Type(ValueKind::Quantity),
            Value::List(_) => ValidValues::Type(ValueKind::List),
            Value::Map(map) => ValidValues::Schema(
                map.iter()
                    .map(|(k, v)| (k.clone(), ValidValues::infer(v)))
                    .collect(),
            ),
            Value::Nested(p) => ValidValues::Schema(p.schema()),
        }
    }

    /// Pure validity check. `Null` is always valid.
    pub fn is_valid(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            ValidValues::Type(kind) => kind.accepts(value),
            ValidValues::Enum(allowed) => allowed.iter().any(|a| a == value),
            ValidValues::Schema(schema) => match value {
                Value::Map(map) => {
                    map.len() == schema.len()
                        && schema.iter().all(|(key, constraint)| {
                            map.get(key).is_some_and(|v| constraint.is_valid(v))
                        })
                }
                Value::Nested(param) => {
                    param.len() == schema.len()
                        && schema.iter().all(|(key, constraint)| {
                            param.get(key).is_some_and(|v| constraint.is_valid(v))
                        })
                }
                _ => false,
            },
        }
    }

    /// Kind tag when this is a plain type constraint.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            ValidValues::Type(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Key component for the validation cache; `None` disables caching.
    pub(crate) fn cache_tag(&self) -> Option<String> {
        match self {
            ValidValues::Type(kind) => Some(kind.name().to_string()),
            ValidValues::Enum(values) => Some(format!("enum{:?}", values)),
            ValidValues::Schema(_) => None,
        }
    }

    /// `"float"`, `{"enum": [...]}` or `{"schema": {...}}`. Enum entries use
    /// the leaf shape for quantities.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ValidValues::Type(kind) => serde_json::Value::String(kind.name().to_string()),
            ValidValues::Enum(values) => serde_json::json!({
                "enum": values.iter().map(tagged_value).collect::<Vec<_>>(),
            }),
            ValidValues::Schema(schema) => {
                let entries: serde_json::Map<String, serde_json::Value> = schema
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                serde_json::json!({ "schema": entries })
            }
        }
    }

    /// Inverse of [`ValidValues::to_json`]; enum quantities are rebuilt
    /// through `units`.
    pub fn from_json(json: &serde_json::Value, units: &dyn UnitSystem) -> AppResult<ValidValues> {
        let invalid = || DaqError::InvalidJson(format!("bad valid_values entry: {}", json));
        match json {
            serde_json::Value::String(name) => {
                ValueKind::from_name(name).map(ValidValues::Type).ok_or_else(invalid)
            }
            serde_json::Value::Object(obj) => {
                if let Some(serde_json::Value::Array(values)) = obj.get("enum") {
                    values
                        .iter()
                        .map(|v| untag_value(units, v))
                        .collect::<AppResult<Vec<_>>>()
                        .map(ValidValues::Enum)
                } else if let Some(serde_json::Value::Object(entries)) = obj.get("schema") {
                    entries
                        .iter()
                        .map(|(k, v)| Ok((k.clone(), ValidValues::from_json(v, units)?)))
                        .collect::<AppResult<Vec<_>>>()
                        .map(ValidValues::Schema)
                } else {
                    Err(invalid())
                }
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for ValidValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidValues::Type(kind) => write!(f, "{}", kind.name()),
            ValidValues::Enum(values) => {
                let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "one of [{}]", items.join(", "))
            }
            ValidValues::Schema(schema) => {
                let keys: Vec<&str> = schema.iter().map(|(k, _)| k.as_str()).collect();
                write!(f, "mapping with keys {{{}}}", keys.join(", "))
            }
        }
    }
}

impl Serialize for ValidValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<ValueKind> for ValidValues {
    fn from(kind: ValueKind) -> Self {
        ValidValues::Type(kind)
    }
}

impl From<Vec<Value>> for ValidValues {
    fn from(values: Vec<Value>) -> Self {
        ValidValues::Enum(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ValueMap;
    use crate::units::UnitRegistry;

    fn map(entries: &[(&str, Value)]) -> Value {
        Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<ValueMap>(),
        )
    }

    #[test]
    fn test_type_rules() {
        let int = ValidValues::Type(ValueKind::Int);
        let float = ValidValues::Type(ValueKind::Float);
        assert!(int.is_valid(&Value::Null));
        assert!(float.is_valid(&Value::Int(3)));
        assert!(!int.is_valid(&Value::Float(3.0)));
        assert!(!ValidValues::Type(ValueKind::Str).is_valid(&Value::Int(1)));
    }

    #[test]
    fn test_enum_membership() {
        let modes = ValidValues::Enum(vec!["auto".into(), "manual".into()]);
        assert!(modes.is_valid(&"manual".into()));
        assert!(!modes.is_valid(&"turbo".into()));
    }

    #[test]
    fn test_schema_exact_key_set() {
        let schema = ValidValues::Schema(vec![
            ("a".into(), ValueKind::Int.into()),
            ("b".into(), ValueKind::Int.into()),
        ]);
        assert!(schema.is_valid(&map(&[("a", 1.into()), ("b", 2.into())])));
        // missing
        assert!(!schema.is_valid(&map(&[("a", 1.into())])));
        // extra
        assert!(!schema.is_valid(&map(&[
            ("a", 1.into()),
            ("b", 2.into()),
            ("c", 3.into())
        ])));
        // member type
        assert!(!schema.is_valid(&map(&[("a", 1.into()), ("b", 2.5.into())])));
        // not a mapping
        assert!(!schema.is_valid(&Value::Int(1)));
    }

    #[test]
    fn test_json_tags() {
        let constraint = ValidValues::Schema(vec![
            ("mode".into(), ValidValues::Enum(vec!["a".into(), "b".into()])),
            ("gain".into(), ValueKind::Float.into()),
        ]);
        let json = constraint.to_json();
        assert_eq!(
            json,
            serde_json::json!({"schema": {"mode": {"enum": ["a", "b"]}, "gain": "float"}})
        );
        let units = UnitRegistry::new();
        assert_eq!(ValidValues::from_json(&json, &units).unwrap(), constraint);
        assert!(ValidValues::from_json(&serde_json::json!("complex"), &units).is_err());

        let gigahertz = |f: f64| Value::from(units.quantity(f, "GHz").unwrap());
        let constraint = ValidValues::Enum(vec![gigahertz(1.0), gigahertz(2.0)]);
        let json = constraint.to_json();
        assert_eq!(
            json["enum"][0],
            serde_json::json!({"value": 1.0, "units": "GHz", "pint_quantity": true})
        );
        assert_eq!(ValidValues::from_json(&json, &units).unwrap(), constraint);
    }
}
