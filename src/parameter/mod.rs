//! Parameter - nested, self-describing, unit-aware settings tree
//!
//! A [`Parameter`] is an ordered mapping from key to [`Value`] where every key
//! carries a full metadata record ([`KeyMeta`]): a `valid_values` constraint,
//! a description, a visibility hint, a unit tag, optional range / pattern /
//! custom rules and a readback tolerance.
//!
//! # Invariants
//!
//! - Keys are unique and keep insertion order.
//! - Every key has exactly one metadata record; there is no way to add a value
//!   without one.
//! - A plain mapping stored into a parameter becomes a nested `Parameter`, so
//!   metadata stays reachable at every depth.
//! - Every assignment re-runs validation before it commits. On failure the
//!   prior value is kept and a typed error is returned.
//!
//! # Example
//!
//! ```rust
//! use daq_settings::parameter::{Parameter, ValueKind};
//! use daq_settings::units::{UnitRegistry, UnitSystem};
//!
//! let units = UnitRegistry::shared();
//! let mut p = Parameter::builder("frequency", units.quantity(2.85e9, "Hz").unwrap())
//!     .valid_values(ValueKind::Float)
//!     .info("f")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(p.get_value_in_units("GHz", "frequency").unwrap().magnitude(), 2.85);
//! p.set("frequency", 3.0e9).unwrap();
//! assert!(p.is_pint_quantity("frequency"));
//! ```

mod builder;
mod cache;
mod json;
mod metadata;
mod schema;
mod tolerance;
mod value;

pub use builder::ParameterBuilder;
pub use cache::BoundedCache;
pub use metadata::{KeyMeta, ValidationRules, Validator};
pub use schema::{ValidValues, ValueKind};
pub use tolerance::{ToleranceCombine, ToleranceConfig, ToleranceReport, DEFAULT_WARNING_FRACTION};
pub use value::{Value, ValueMap};

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppResult, DaqError};
use crate::units::{Quantity, UnitError, UnitRegistry, UnitSystem};

/// Key reserved for the serialized metadata block.
pub const METADATA_KEY: &str = "_metadata";

/// Crate-wide defaults applied to newly built parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterDefaults {
    /// Capacity of each cache. `0` disables caching.
    pub cache_max_size: usize,
    /// Combination policy for keys that do not choose one.
    pub tolerance_combine: ToleranceCombine,
    /// Fraction of a tolerance bound at which a warning fires.
    pub tolerance_warning_fraction: f64,
}

impl Default for ParameterDefaults {
    fn default() -> Self {
        Self {
            cache_max_size: 100,
            tolerance_combine: ToleranceCombine::All,
            tolerance_warning_fraction: DEFAULT_WARNING_FRACTION,
        }
    }
}

/// Unit system and defaults shared by every node of a tree.
#[derive(Debug, Clone)]
pub struct ParameterContext {
    /// Unit system used for parsing and conversion.
    pub units: Arc<dyn UnitSystem>,
    /// Defaults for caches and tolerance.
    pub defaults: ParameterDefaults,
}

impl ParameterContext {
    /// Context over an explicit unit system.
    pub fn new(units: Arc<dyn UnitSystem>, defaults: ParameterDefaults) -> Self {
        Self { units, defaults }
    }

    /// Tolerance record with no bounds and the context's policy defaults.
    pub(crate) fn default_tolerance(&self) -> ToleranceConfig {
        ToleranceConfig {
            combine: self.defaults.tolerance_combine,
            warning_fraction: self.defaults.tolerance_warning_fraction,
            ..Default::default()
        }
    }
}

impl Default for ParameterContext {
    fn default() -> Self {
        Self {
            units: UnitRegistry::shared(),
            defaults: ParameterDefaults::default(),
        }
    }
}

/// Sizes reported by [`Parameter::get_cache_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries in the conversion cache.
    pub conversion_cache_size: usize,
    /// Entries in the validation cache.
    pub validation_cache_size: usize,
    /// Capacity of each cache.
    pub max_cache_size: usize,
}

/// Result of [`Parameter::get_unit_info`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UnitInfo {
    /// Key holds a quantity.
    Quantity {
        /// Magnitude in the stored unit.
        magnitude: f64,
        /// Stored unit symbol.
        units: String,
        /// Rendered dimensionality.
        dimensionality: String,
    },
    /// Key holds a plain value with an optional unit tag.
    Plain {
        /// Stored value.
        value: Value,
        /// Unit tag, possibly empty.
        units: String,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) key: String,
    pub(crate) value: Value,
    pub(crate) meta: KeyMeta,
    /// Last committed quantity, kept for unit-aware readers.
    pub(crate) original: Option<Quantity>,
}

impl Entry {
    /// Validate an initial value against its metadata and build the entry.
    pub(crate) fn validated(
        key: String,
        value: Value,
        meta: KeyMeta,
        context: &ParameterContext,
    ) -> AppResult<Entry> {
        let value = match value {
            Value::Map(map) => Value::Nested(Parameter::from_values_in(context.clone(), map)?),
            other => other,
        };
        if !meta.valid_values.is_valid(&value) {
            return Err(DaqError::TypeMismatch {
                key,
                expected: meta.valid_values.to_string(),
                found: value.to_string(),
            });
        }
        let value = match value {
            Value::Int(i) if meta.valid_values.kind() == Some(ValueKind::Float) => {
                Value::Float(i as f64)
            }
            other => other,
        };
        meta.rules.check(&key, &value)?;
        let original = value.as_quantity().cloned();
        Ok(Entry {
            key,
            value,
            meta,
            original,
        })
    }
}

type ConversionKey = (String, String);
type ValidationKey = (String, String, String);

/// Ordered, nested, validated key/value tree with per-key metadata.
///
/// Interior caches use `RefCell`, so a `Parameter` is `Send` but not `Sync`.
/// Share one between threads behind a mutex.
#[derive(Clone)]
pub struct Parameter {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    context: ParameterContext,
    conversion_cache: RefCell<BoundedCache<ConversionKey, Quantity>>,
    validation_cache: RefCell<BoundedCache<ValidationKey, bool>>,
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|e| (&e.key, &e.value)))
            .finish()
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|(a, b)| a.key == b.key && a.value == b.value)
    }
}

impl Default for Parameter {
    fn default() -> Self {
        Self::empty()
    }
}

impl Parameter {
    // ---------------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------------

    /// Empty tree using the shared unit registry.
    pub fn empty() -> Self {
        Self::empty_in(ParameterContext::default())
    }

    /// Empty tree in an explicit context.
    pub fn empty_in(context: ParameterContext) -> Self {
        let capacity = context.defaults.cache_max_size;
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            context,
            conversion_cache: RefCell::new(BoundedCache::new(capacity)),
            validation_cache: RefCell::new(BoundedCache::new(capacity)),
        }
    }

    /// Single-key parameter with inferred constraints.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> AppResult<Self> {
        Self::builder(name, value).build()
    }

    /// Start building a single-key parameter.
    pub fn builder(name: impl Into<String>, value: impl Into<Value>) -> ParameterBuilder {
        ParameterBuilder::new(name, value)
    }

    /// Tree from plain `(key, value)` pairs; constraints are inferred from
    /// each value and nested maps become nested parameters.
    pub fn from_values<I, K, V>(values: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::from_values_in(ParameterContext::default(), values)
    }

    /// [`from_values`](Self::from_values) in an explicit context.
    pub fn from_values_in<I, K, V>(context: ParameterContext, values: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut out = Self::empty_in(context);
        for (key, value) in values {
            let value = value.into();
            let meta = KeyMeta::inferred(&value, out.context.default_tolerance());
            let entry = Entry::validated(key.into(), value, meta, &out.context)?;
            out.push_entry(entry)?;
        }
        Ok(out)
    }

    /// Merge child parameters, keeping each child's metadata verbatim.
    ///
    /// The context of the first child is adopted. Duplicate keys fail.
    pub fn from_children(children: impl IntoIterator<Item = Parameter>) -> AppResult<Self> {
        let mut children = children.into_iter().peekable();
        let context = children
            .peek()
            .map(|c| c.context.clone())
            .unwrap_or_default();
        let mut out = Self::empty_in(context);
        for child in children {
            out.merge(child)?;
        }
        Ok(out)
    }

    /// Append every key of `other`. Fails on the first duplicate and leaves
    /// `self` unchanged.
    pub fn merge(&mut self, other: Parameter) -> AppResult<()> {
        if let Some(dup) = other.entries.iter().find(|e| self.index.contains_key(&e.key)) {
            return Err(DaqError::DuplicateKey(dup.key.clone()));
        }
        for entry in other.entries {
            self.push_entry(entry)?;
        }
        Ok(())
    }

    pub(crate) fn push_entry(&mut self, entry: Entry) -> AppResult<()> {
        if entry.key == METADATA_KEY {
            return Err(DaqError::ReservedKey(entry.key));
        }
        if self.index.contains_key(&entry.key) {
            return Err(DaqError::DuplicateKey(entry.key));
        }
        self.index.insert(entry.key.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Access
    // ---------------------------------------------------------------------

    /// Unit system and defaults of this tree.
    pub fn context(&self) -> &ParameterContext {
        &self.context
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    /// `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|e| (e.key.as_str(), &e.value))
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `key` exists at this level.
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Stored value, unchanged.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entry(key).map(|e| &e.value)
    }

    /// Nested parameter stored at `key`.
    pub fn get_nested(&self, key: &str) -> Option<&Parameter> {
        self.get(key).and_then(Value::as_parameter)
    }

    /// Mutable nested parameter stored at `key`. Assignments through it are
    /// validated by the child's own metadata.
    pub fn get_nested_mut(&mut self, key: &str) -> Option<&mut Parameter> {
        let idx = *self.index.get(key)?;
        match &mut self.entries[idx].value {
            Value::Nested(p) => Some(p),
            _ => None,
        }
    }

    /// Metadata record for `key`.
    pub fn metadata(&self, key: &str) -> Option<&KeyMeta> {
        self.entry(key).map(|e| &e.meta)
    }

    /// `valid_values` per key.
    pub fn valid_values(&self) -> impl Iterator<Item = (&str, &ValidValues)> {
        self.entries
            .iter()
            .map(|e| (e.key.as_str(), &e.meta.valid_values))
    }

    /// Description per key.
    pub fn info(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.key.as_str(), e.meta.info.as_str()))
    }

    /// Visibility hint per key.
    pub fn visible(&self) -> impl Iterator<Item = (&str, bool)> {
        self.entries.iter().map(|e| (e.key.as_str(), e.meta.visible))
    }

    /// Unit tag per key. Quantity-valued keys report their current unit.
    pub fn units(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|e| {
            let units = match &e.value {
                Value::Quantity(q) => q.units(),
                _ => e.meta.units.as_str(),
            };
            (e.key.as_str(), units)
        })
    }

    /// Structural schema of this level, used when the tree is itself the
    /// `valid_values` of a parent key.
    pub fn schema(&self) -> Vec<(String, ValidValues)> {
        self.entries
            .iter()
            .map(|e| (e.key.clone(), e.meta.valid_values.clone()))
            .collect()
    }

    fn entry(&self, key: &str) -> Option<&Entry> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    fn position(&self, key: &str) -> AppResult<usize> {
        self.index
            .get(key)
            .copied()
            .ok_or_else(|| DaqError::KeyNotFound(key.to_string()))
    }

    // ---------------------------------------------------------------------
    // Dotted paths
    // ---------------------------------------------------------------------

    /// Parent parameter and leaf key for a dotted path such as
    /// `"device.count"`. `None` when any segment is missing.
    pub fn resolve<'a, 'p>(&'a self, path: &'p str) -> Option<(&'a Parameter, &'p str)> {
        let (parents, leaf) = match path.rsplit_once('.') {
            Some((parents, leaf)) => (Some(parents), leaf),
            None => (None, path),
        };
        let mut node = self;
        if let Some(parents) = parents {
            for segment in parents.split('.') {
                node = node.get_nested(segment)?;
            }
        }
        node.contains_key(leaf).then_some((node, leaf))
    }

    fn resolve_mut<'a, 'p>(&'a mut self, path: &'p str) -> Option<(&'a mut Parameter, &'p str)> {
        let (parents, leaf) = match path.rsplit_once('.') {
            Some((parents, leaf)) => (Some(parents), leaf),
            None => (None, path),
        };
        let mut node = self;
        if let Some(parents) = parents {
            for segment in parents.split('.') {
                node = node.get_nested_mut(segment)?;
            }
        }
        if node.contains_key(leaf) {
            Some((node, leaf))
        } else {
            None
        }
    }

    /// Value at a dotted path.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        self.resolve(path).and_then(|(node, leaf)| node.get(leaf))
    }

    /// Validated assignment at a dotted path.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> AppResult<()> {
        let (node, leaf) = self
            .resolve_mut(path)
            .ok_or_else(|| DaqError::ParameterNotFound(path.to_string()))?;
        node.set(leaf, value)
    }

    // ---------------------------------------------------------------------
    // Validation and assignment
    // ---------------------------------------------------------------------

    /// Pure type / enum / schema check.
    ///
    /// `Null` is always valid, `Int` and quantities are accepted where
    /// `Float` is expected, `Float` is not accepted where `Int` is, and a
    /// schema requires exactly its key set.
    pub fn is_valid(value: &Value, valid_values: &ValidValues) -> bool {
        valid_values.is_valid(value)
    }

    /// Dry run of [`set`](Self::set): the value that would be stored.
    pub fn check(&self, key: &str, value: impl Into<Value>) -> AppResult<Value> {
        let idx = self.position(key)?;
        self.prepare(idx, value.into())
    }

    /// Validate and assign. On failure the prior value is kept.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> AppResult<()> {
        let idx = self.position(key)?;
        let prepared = self.prepare(idx, value.into())?;
        self.commit(idx, prepared);
        Ok(())
    }

    /// Assign several keys in order. Each key is atomic; keys applied before
    /// a failing one stay applied.
    pub fn update<I, K, V>(&mut self, values: I) -> AppResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (key, value) in values {
            self.set(key.as_ref(), value)?;
        }
        Ok(())
    }

    fn cached_is_valid(&self, entry: &Entry, value: &Value) -> bool {
        let valid_values = &entry.meta.valid_values;
        let (Some(fingerprint), Some(tag)) = (value.fingerprint(), valid_values.cache_tag()) else {
            return valid_values.is_valid(value);
        };
        let cache_key = (entry.key.clone(), fingerprint, tag);
        let hit = self.validation_cache.borrow().get(&cache_key);
        if let Some(ok) = hit {
            debug!(key = %entry.key, "validation cache hit");
            return ok;
        }
        let ok = valid_values.is_valid(value);
        self.validation_cache.borrow_mut().insert(cache_key, ok);
        ok
    }

    /// Full validation pipeline without mutation.
    fn prepare(&self, idx: usize, value: Value) -> AppResult<Value> {
        let entry = &self.entries[idx];
        let key = entry.key.as_str();

        if !self.cached_is_valid(entry, &value) {
            debug!(key, value = %value, "rejected by valid_values");
            return Err(DaqError::TypeMismatch {
                key: key.to_string(),
                expected: entry.meta.valid_values.to_string(),
                found: value.to_string(),
            });
        }

        let is_float = entry.meta.valid_values.kind() == Some(ValueKind::Float);
        let coerced = match (&entry.value, value) {
            (Value::Nested(current), Value::Map(map)) => {
                let mut next = current.clone();
                next.update(map)?;
                Value::Nested(next)
            }
            (_, Value::Map(map)) => {
                Value::Nested(Parameter::from_values_in(self.context.clone(), map)?)
            }
            (Value::Quantity(current), Value::Int(i)) => {
                Value::Quantity(current.with_magnitude(i as f64))
            }
            (Value::Quantity(current), Value::Float(f)) => {
                Value::Quantity(current.with_magnitude(f))
            }
            (Value::Quantity(current), Value::Quantity(q)) => {
                if !current.unit().is_compatible(q.unit()) {
                    return Err(UnitError::IncompatibleUnits {
                        from: q.units().to_string(),
                        to: current.units().to_string(),
                        from_dimension: q.dimension().to_string(),
                        to_dimension: current.dimension().to_string(),
                    }
                    .into());
                }
                Value::Quantity(q)
            }
            (_, Value::Int(i)) if is_float => Value::Float(i as f64),
            (_, other) => other,
        };

        entry.meta.rules.check(key, &coerced)?;
        Ok(coerced)
    }

    fn commit(&mut self, idx: usize, value: Value) {
        let entry = &mut self.entries[idx];
        if entry.value == value {
            debug!(key = %entry.key, "value unchanged");
            return;
        }
        debug!(key = %entry.key, value = %value, "committed");
        entry.original = value.as_quantity().cloned();
        entry.value = value;
        let key = entry.key.clone();
        self.invalidate(&key);
    }

    fn invalidate(&self, key: &str) {
        self.conversion_cache
            .borrow_mut()
            .retain(|(k, _)| k.as_str() != key);
        self.validation_cache
            .borrow_mut()
            .retain(|(k, _, _)| k.as_str() != key);
    }

    // ---------------------------------------------------------------------
    // Units
    // ---------------------------------------------------------------------

    /// Whether `key` holds a physical quantity.
    pub fn is_pint_quantity(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Value::Quantity(_)))
    }

    /// Quantity stored at `key`.
    pub fn quantity(&self, key: &str) -> AppResult<&Quantity> {
        let entry = self
            .entry(key)
            .ok_or_else(|| DaqError::KeyNotFound(key.to_string()))?;
        entry
            .value
            .as_quantity()
            .ok_or_else(|| DaqError::NotAQuantity(key.to_string()))
    }

    /// Last committed quantity for `key`, including its unit at the time.
    pub fn original_quantity(&self, key: &str) -> Option<&Quantity> {
        self.entry(key).and_then(|e| e.original.as_ref())
    }

    /// Value of `key` expressed in `target`. Results are memoised per
    /// `(key, target)` until the key changes.
    pub fn get_value_in_units(&self, target: &str, key: &str) -> AppResult<Quantity> {
        let cache_key = (key.to_string(), target.to_string());
        let hit = self.conversion_cache.borrow().get(&cache_key);
        if let Some(q) = hit {
            debug!(key, target, "conversion cache hit");
            return Ok(q);
        }
        let converted = self.context.units.convert(self.quantity(key)?, target)?;
        self.conversion_cache
            .borrow_mut()
            .insert(cache_key, converted.clone());
        Ok(converted)
    }

    /// Assign `value` expressed in `unit`.
    pub fn set_value_with_units(&mut self, value: f64, unit: &str, key: &str) -> AppResult<()> {
        let quantity = self.context.units.quantity(value, unit)?;
        self.set(key, quantity)
    }

    /// Re-express the stored quantity in `target`, in place.
    pub fn convert_units(&mut self, target: &str, key: &str) -> AppResult<()> {
        let idx = self.position(key)?;
        let converted = self.context.units.convert(self.quantity(key)?, target)?;
        self.commit(idx, Value::Quantity(converted));
        Ok(())
    }

    /// Magnitude / unit / dimensionality, or the plain value and its tag.
    pub fn get_unit_info(&self, key: &str) -> AppResult<UnitInfo> {
        let entry = self
            .entry(key)
            .ok_or_else(|| DaqError::KeyNotFound(key.to_string()))?;
        Ok(match &entry.value {
            Value::Quantity(q) => UnitInfo::Quantity {
                magnitude: q.magnitude(),
                units: q.units().to_string(),
                dimensionality: q.dimension().to_string(),
            },
            other => UnitInfo::Plain {
                value: other.clone(),
                units: entry.meta.units.clone(),
            },
        })
    }

    /// Fail unless both unit names share a dimensionality.
    pub fn validate_units(&self, a: &str, b: &str) -> AppResult<()> {
        Ok(self.context.units.validate_units(a, b)?)
    }

    /// Units a picker could offer for `key`. Plain values use their unit
    /// tag; a tag the registry does not know is returned on its own.
    pub fn get_compatible_units(&self, key: &str) -> AppResult<Vec<String>> {
        let entry = self
            .entry(key)
            .ok_or_else(|| DaqError::KeyNotFound(key.to_string()))?;
        if let Value::Quantity(q) = &entry.value {
            return Ok(self.context.units.compatible_units_for(&q.dimension()));
        }
        if entry.meta.units.is_empty() {
            return Ok(Vec::new());
        }
        Ok(match self.context.units.unit(&entry.meta.units) {
            Ok(unit) => self.context.units.compatible_units_for(&unit.dimension()),
            Err(_) => vec![entry.meta.units.clone()],
        })
    }

    // ---------------------------------------------------------------------
    // Tolerance
    // ---------------------------------------------------------------------

    /// Compare an achieved value against a target under `key`'s tolerance.
    /// `Ok(None)` when tolerance checking is disabled for the key.
    pub fn validate_tolerance(
        &self,
        key: &str,
        target: f64,
        actual: f64,
    ) -> AppResult<Option<ToleranceReport>> {
        let entry = self
            .entry(key)
            .ok_or_else(|| DaqError::KeyNotFound(key.to_string()))?;
        Ok(entry.meta.tolerance.evaluate(target, actual))
    }

    // ---------------------------------------------------------------------
    // Caches
    // ---------------------------------------------------------------------

    /// Drop every cached conversion and validation result, recursively.
    pub fn clear_cache(&self) {
        self.conversion_cache.borrow_mut().clear();
        self.validation_cache.borrow_mut().clear();
        for entry in &self.entries {
            if let Value::Nested(child) = &entry.value {
                child.clear_cache();
            }
        }
    }

    /// Current cache sizes for this level.
    pub fn get_cache_stats(&self) -> CacheStats {
        let conversion = self.conversion_cache.borrow();
        CacheStats {
            conversion_cache_size: conversion.len(),
            validation_cache_size: self.validation_cache.borrow().len(),
            max_cache_size: conversion.capacity(),
        }
    }

    /// Replace both caches with empty ones of capacity `size`, recursively.
    pub fn set_cache_max_size(&mut self, size: usize) {
        self.context.defaults.cache_max_size = size;
        self.conversion_cache = RefCell::new(BoundedCache::new(size));
        self.validation_cache = RefCell::new(BoundedCache::new(size));
        for entry in &mut self.entries {
            if let Value::Nested(child) = &mut entry.value {
                child.set_cache_max_size(size);
            }
        }
    }

    /// Builder-style [`set_cache_max_size`](Self::set_cache_max_size).
    pub fn with_cache_max_size(mut self, size: usize) -> Self {
        self.set_cache_max_size(size);
        self
    }

    /// Values only, without unit annotations or metadata.
    pub fn to_plain_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|e| (e.key.clone(), e.value.to_plain_json()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationRule;

    fn units() -> Arc<dyn UnitSystem> {
        UnitRegistry::shared()
    }

    fn frequency() -> Parameter {
        Parameter::builder("frequency", units().quantity(2.85e9, "Hz").unwrap())
            .valid_values(ValueKind::Float)
            .info("f")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let p = Parameter::new("count", 3).unwrap();
        let meta = p.metadata("count").unwrap();
        assert_eq!(meta.valid_values, ValidValues::Type(ValueKind::Int));
        assert_eq!(meta.info, "");
        assert!(!meta.visible);
        assert_eq!(meta.units, "");
        assert!(!meta.tolerance.is_enabled());
    }

    #[test]
    fn test_invalid_initial_value_fails_like_assignment() {
        let err = Parameter::builder("count", 3.5)
            .valid_values(ValueKind::Int)
            .build()
            .unwrap_err();
        assert!(matches!(err, DaqError::TypeMismatch { .. }));

        let err = Parameter::builder("position", 12.0)
            .range(0.0, 10.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, DaqError::Validation(_)));
    }

    #[test]
    fn test_reserved_key_rejected() {
        let err = Parameter::new(METADATA_KEY, 1).unwrap_err();
        assert!(matches!(err, DaqError::ReservedKey(_)));
    }

    #[test]
    fn test_int_accepted_for_float_and_stored_as_float() {
        let mut p = Parameter::new("gain", 1.5).unwrap();
        p.set("gain", 2).unwrap();
        assert_eq!(p.get("gain"), Some(&Value::Float(2.0)));
        let err = Parameter::new("n", 1).unwrap().set("n", 2.0).unwrap_err();
        assert!(matches!(err, DaqError::TypeMismatch { .. }));
    }

    #[test]
    fn test_pattern_rule_blocks_mutation() {
        let mut p = Parameter::builder("filename", "data.txt")
            .valid_values(ValueKind::Str)
            .pattern(r"^[a-zA-Z0-9_]+\.txt$")
            .build()
            .unwrap();
        let err = p.set("filename", "data file.txt").unwrap_err();
        let DaqError::Validation(v) = err else {
            panic!("expected validation error");
        };
        assert!(matches!(v.rule, ValidationRule::Pattern(_)));
        assert_eq!(p.get("filename"), Some(&Value::from("data.txt")));
        p.set("filename", "data2.txt").unwrap();
        assert_eq!(p.get("filename"), Some(&Value::from("data2.txt")));
    }

    #[test]
    fn test_enum_values() {
        let mut p = Parameter::builder("mode", "auto")
            .choices(vec!["auto".into(), "manual".into()])
            .build()
            .unwrap();
        p.set("mode", "manual").unwrap();
        assert!(p.set("mode", "turbo").is_err());
        assert_eq!(p.get("mode").and_then(Value::as_str), Some("manual"));
    }

    #[test]
    fn test_plain_number_keeps_quantity_unit() {
        let mut p = frequency();
        p.set("frequency", 3.0e9).unwrap();
        let q = p.quantity("frequency").unwrap();
        assert_eq!(q.magnitude(), 3.0e9);
        assert_eq!(q.units(), "Hz");
        assert!(p.is_pint_quantity("frequency"));
    }

    #[test]
    fn test_compatible_quantity_accepted_incompatible_rejected() {
        let mut p = frequency();
        p.set_value_with_units(1.5, "GHz", "frequency").unwrap();
        assert_eq!(p.quantity("frequency").unwrap().units(), "GHz");
        assert_eq!(p.original_quantity("frequency").unwrap().units(), "GHz");

        let err = p.set_value_with_units(1.0, "mm", "frequency").unwrap_err();
        assert!(matches!(
            err,
            DaqError::Units(UnitError::IncompatibleUnits { .. })
        ));
        assert_eq!(p.quantity("frequency").unwrap().magnitude(), 1.5);
    }

    #[test]
    fn test_quantity_range_in_construction_unit() {
        let mut p = Parameter::builder("frequency", units().quantity(1e9, "Hz").unwrap())
            .range(9e3, 6e9)
            .build()
            .unwrap();
        p.set_value_with_units(5.0, "GHz", "frequency").unwrap();
        assert!(p.set_value_with_units(7.0, "GHz", "frequency").is_err());
        // bounds stay in Hz after an in-place conversion
        p.convert_units("MHz", "frequency").unwrap();
        assert!(p.set("frequency", 5000.0).is_ok());
        assert!(p.set("frequency", 7000.0).is_err());
    }

    #[test]
    fn test_conversion_cache() {
        let p = frequency();
        let first = p.get_value_in_units("GHz", "frequency").unwrap();
        assert_eq!(first.magnitude(), 2.85);
        assert!(p.get_cache_stats().conversion_cache_size > 0);
        let second = p.get_value_in_units("GHz", "frequency").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_mutation_invalidates_conversion_cache() {
        let mut p = frequency();
        p.get_value_in_units("GHz", "frequency").unwrap();
        p.set("frequency", 1e9).unwrap();
        assert_eq!(p.get_cache_stats().conversion_cache_size, 0);
        assert_eq!(
            p.get_value_in_units("GHz", "frequency").unwrap().magnitude(),
            1.0
        );
    }

    #[test]
    fn test_self_assignment_keeps_caches() {
        let mut p = frequency();
        p.get_value_in_units("GHz", "frequency").unwrap();
        let before = p.get_cache_stats();
        let current = p.get("frequency").cloned().unwrap();
        p.set("frequency", current).unwrap();
        assert_eq!(p.get_cache_stats().conversion_cache_size, before.conversion_cache_size);
    }

    #[test]
    fn test_cache_disabled() {
        let p = frequency().with_cache_max_size(0);
        p.get_value_in_units("GHz", "frequency").unwrap();
        let stats = p.get_cache_stats();
        assert_eq!(stats.conversion_cache_size, 0);
        assert_eq!(stats.max_cache_size, 0);
    }

    #[test]
    fn test_clear_cache() {
        let mut p = frequency();
        p.get_value_in_units("GHz", "frequency").unwrap();
        p.set("frequency", 2e9).unwrap();
        p.set("frequency", 2.5e9).unwrap();
        p.clear_cache();
        let stats = p.get_cache_stats();
        assert_eq!(stats.conversion_cache_size, 0);
        assert_eq!(stats.validation_cache_size, 0);
    }

    #[test]
    fn test_unit_info() {
        let p = Parameter::from_children([
            frequency(),
            Parameter::builder("power", -10.0).units("dBm").build().unwrap(),
        ])
        .unwrap();
        assert_eq!(
            p.get_unit_info("frequency").unwrap(),
            UnitInfo::Quantity {
                magnitude: 2.85e9,
                units: "Hz".into(),
                dimensionality: "1 / [time]".into(),
            }
        );
        assert_eq!(
            p.get_unit_info("power").unwrap(),
            UnitInfo::Plain {
                value: Value::Float(-10.0),
                units: "dBm".into(),
            }
        );
        assert_eq!(p.get_compatible_units("power").unwrap(), vec!["dBm"]);
        let freq_units = p.get_compatible_units("frequency").unwrap();
        for u in ["Hz", "kHz", "MHz", "GHz", "THz"] {
            assert!(freq_units.iter().any(|x| x == u), "missing {}", u);
        }
    }

    #[test]
    fn test_not_a_quantity() {
        let p = Parameter::new("count", 1).unwrap();
        assert!(matches!(
            p.get_value_in_units("Hz", "count"),
            Err(DaqError::NotAQuantity(_))
        ));
        assert!(matches!(
            p.get_value_in_units("Hz", "missing"),
            Err(DaqError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_tolerance_via_parameter() {
        let p = Parameter::builder("position", 0.0)
            .tolerance_absolute(0.1)
            .build()
            .unwrap();
        let report = p.validate_tolerance("position", 0.0, 0.05).unwrap().unwrap();
        assert_eq!(report.deviation_percent, 0.0);
        assert!(report.within_tolerance);

        let plain = Parameter::new("count", 1).unwrap();
        assert!(plain.validate_tolerance("count", 1.0, 2.0).unwrap().is_none());
    }

    #[test]
    fn test_from_children_rejects_duplicates() {
        let err = Parameter::from_children([
            Parameter::new("a", 1).unwrap(),
            Parameter::new("a", 2).unwrap(),
        ])
        .unwrap_err();
        assert!(matches!(err, DaqError::DuplicateKey(_)));
    }

    #[test]
    fn test_paths() {
        let mut p = Parameter::from_values([
            ("name", Value::from("stage")),
            (
                "device",
                Value::Map(ValueMap::from([
                    ("count".to_string(), Value::Int(1)),
                    ("gain".to_string(), Value::Float(0.5)),
                ])),
            ),
        ])
        .unwrap();
        assert!(p.get_nested("device").is_some());
        assert_eq!(p.get_path("device.count"), Some(&Value::Int(1)));
        p.set_path("device.gain", 0.75).unwrap();
        assert_eq!(p.get_path("device.gain"), Some(&Value::Float(0.75)));
        assert!(matches!(
            p.set_path("device.offset", 1.0),
            Err(DaqError::ParameterNotFound(_))
        ));
        assert!(p.resolve("name.count").is_none());
    }

    #[test]
    fn test_path_results_outlive_path_text() {
        let p = Parameter::from_values([(
            "device",
            Value::Map(ValueMap::from([("count".to_string(), Value::Int(1))])),
        )])
        .unwrap();
        let value = {
            let path = format!("{}.{}", "device", "count");
            p.get_path(&path)
        };
        assert_eq!(value, Some(&Value::Int(1)));

        let (node, leaf) = p.resolve("device.count").unwrap();
        assert_eq!(leaf, "count");
        assert_eq!(node.len(), 1);
    }

    #[test]
    fn test_nested_merge_requires_exact_keys() {
        let mut p = Parameter::from_values([(
            "device",
            Value::Map(ValueMap::from([
                ("count".to_string(), Value::Int(1)),
                ("gain".to_string(), Value::Float(0.5)),
            ])),
        )])
        .unwrap();

        let partial = ValueMap::from([("count".to_string(), Value::Int(2))]);
        assert!(matches!(
            p.set("device", partial),
            Err(DaqError::TypeMismatch { .. })
        ));

        let full = ValueMap::from([
            ("count".to_string(), Value::Int(2)),
            ("gain".to_string(), Value::Float(0.25)),
        ]);
        p.set("device", full).unwrap();
        let device = p.get_nested("device").unwrap();
        assert_eq!(device.get("count"), Some(&Value::Int(2)));

        // a child rule failure leaves the whole nested key untouched
        let bad = ValueMap::from([
            ("count".to_string(), Value::Int(5)),
            ("gain".to_string(), Value::Str("high".into())),
        ]);
        assert!(p.set("device", bad).is_err());
        assert_eq!(p.get_path("device.count"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_check_is_dry_run() {
        let p = frequency();
        let coerced = p.check("frequency", 1e9).unwrap();
        assert_eq!(coerced.as_quantity().unwrap().units(), "Hz");
        assert_eq!(p.quantity("frequency").unwrap().magnitude(), 2.85e9);
    }
}
