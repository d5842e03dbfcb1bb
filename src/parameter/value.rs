//! Tagged values stored in a [`Parameter`](super::Parameter).

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use super::Parameter;
use crate::units::Quantity;

/// Plain key → value mapping used for partial settings and probe readings.
pub type ValueMap = BTreeMap<String, Value>;

/// A setting value.
///
/// `Map` is only ever an *incoming* plain mapping; once stored in a
/// parameter it becomes `Nested`, so per-key metadata survives at every
/// level of the tree.
#[derive(Debug, Clone)]
pub enum Value {
    /// Unset optional value.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Text.
    Str(String),
    /// Physical quantity.
    Quantity(Quantity),
    /// Ordered list.
    List(Vec<Value>),
    /// Plain mapping (input only).
    Map(ValueMap),
    /// Nested parameter tree.
    Nested(Parameter),
}

impl Value {
    /// Short type name used in messages and serialized schemas.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Quantity(_) => "quantity",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Nested(_) => "parameter",
        }
    }

    /// Numeric view: ints, floats and quantity magnitudes.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Quantity(q) => Some(q.magnitude()),
            _ => None,
        }
    }

    /// Integer view (no float truncation).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Boolean view.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String view.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Quantity view.
    pub fn as_quantity(&self) -> Option<&Quantity> {
        match self {
            Value::Quantity(q) => Some(q),
            _ => None,
        }
    }

    /// Nested parameter view.
    pub fn as_parameter(&self) -> Option<&Parameter> {
        match self {
            Value::Nested(p) => Some(p),
            _ => None,
        }
    }

    /// True for `Map` and `Nested`.
    pub fn is_mapping(&self) -> bool {
        matches!(self, Value::Map(_) | Value::Nested(_))
    }

    /// True for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Key used by the validation cache. Only scalars are cached.
    pub(crate) fn fingerprint(&self) -> Option<String> {
        match self {
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Str(_) => {
                Some(format!("{:?}", self))
            }
            // bit pattern keeps 0.0 / -0.0 / NaN distinct
            Value::Float(f) => Some(format!("Float({:#x})", f.to_bits())),
            Value::Quantity(q) => Some(format!(
                "Quantity({:#x} {})",
                q.magnitude().to_bits(),
                q.units()
            )),
            Value::List(_) | Value::Map(_) | Value::Nested(_) => None,
        }
    }

    /// JSON without unit annotations. Quantities become
    /// `{"magnitude": .., "units": ..}`.
    pub fn to_plain_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Quantity(q) => serde_json::json!({
                "magnitude": q.magnitude(),
                "units": q.units(),
            }),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_plain_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_plain_json()))
                    .collect(),
            ),
            Value::Nested(p) => p.to_plain_json(),
        }
    }

    /// Inverse of [`Value::to_plain_json`] for units-free JSON. Integers stay
    /// `Int`, objects become `Map`.
    pub fn from_plain_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_plain_json).collect())
            }
            serde_json::Value::Object(obj) => Value::Map(
                obj.iter()
                    .map(|(k, v)| (k.clone(), Value::from_plain_json(v)))
                    .collect(),
            ),
        }
    }
}

fn mapping_eq(map: &ValueMap, param: &Parameter) -> bool {
    map.len() == param.len()
        && map
            .iter()
            .all(|(k, v)| param.get(k).map(|pv| pv == v).unwrap_or(false))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Quantity(a), Value::Quantity(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Nested(a), Value::Nested(b)) => a == b,
            (Value::Map(m), Value::Nested(p)) | (Value::Nested(p), Value::Map(m)) => {
                mapping_eq(m, p)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "'{}'", s),
            Value::Quantity(q) => write!(f, "{}", q),
            Value::List(_) | Value::Map(_) | Value::Nested(_) => {
                write!(f, "{}", self.to_plain_json())
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_plain_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Quantity> for Value {
    fn from(value: Quantity) -> Self {
        Value::Quantity(value)
    }
}

impl From<Parameter> for Value {
    fn from(value: Parameter) -> Self {
        Value::Nested(value)
    }
}

impl From<ValueMap> for Value {
    fn from(value: ValueMap) -> Self {
        Value::Map(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<&Value> for Value {
    fn from(value: &Value) -> Self {
        value.clone()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}
