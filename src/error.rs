//! Custom error types for the settings core.
//!
//! This module defines the primary error type, `DaqError`, shared by the
//! parameter tree and the device layer. Using the `thiserror` crate, it
//! provides one consistent way to report everything that can go wrong while
//! building, editing, validating or serializing instrument settings.
//!
//! ## Error Hierarchy
//!
//! - **`TypeMismatch`**: the value's runtime type or enum membership fails
//!   `Parameter::is_valid`. Raised at construction or assignment time.
//! - **`Validation`**: a configured range, pattern or custom rule rejected the
//!   value. Carries a [`ValidationError`] naming the rule and bound.
//! - **`Units`**: wraps [`UnitError`] for unknown units, unparseable
//!   quantities and incompatible dimensionalities.
//! - **`KeyNotFound` / `ParameterNotFound` / `ProbeNotFound`**: the caller
//!   referenced something that does not exist at all. Never conflated with a
//!   validation failure.
//! - **`Coercion`**: a value cannot be turned into the parameter's type or
//!   unit (e.g. the string `"fast"` for a frequency).
//! - **`Serialization` / `InvalidJson`**: JSON encoding or a malformed
//!   serialized tree.
//!
//! Hardware-side adjustments (clamping, drift, transport faults) are *not*
//! errors; they are reported through feedback records.
//!
//! By using `#[from]`, `DaqError` can be created from the underlying error
//! types, so the `?` operator works throughout the crate.

use thiserror::Error;

use crate::units::UnitError;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Errors raised by parameter trees and devices.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Value type or enum membership does not match `valid_values`.
    #[error("Invalid value for '{key}': expected {expected}, got {found}")]
    TypeMismatch {
        /// Offending key.
        key: String,
        /// Rendered `valid_values` constraint.
        expected: String,
        /// Rendered offending value.
        found: String,
    },

    /// A range, pattern or custom rule rejected the value.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Unit parsing or conversion failure.
    #[error(transparent)]
    Units(#[from] UnitError),

    /// Key does not exist in this parameter.
    #[error("Key '{0}' not found")]
    KeyNotFound(String),

    /// Dotted parameter path does not exist in the settings tree.
    #[error("Parameter '{0}' not found")]
    ParameterNotFound(String),

    /// Probe is not declared by the device.
    #[error("Probe '{probe}' not found on device '{device}'")]
    ProbeNotFound {
        /// Device name.
        device: String,
        /// Requested probe.
        probe: String,
    },

    /// Unit operation requested on a key that does not hold a quantity.
    #[error("Key '{0}' does not hold a physical quantity")]
    NotAQuantity(String),

    /// Two children contributed the same key.
    #[error("Duplicate key '{0}'")]
    DuplicateKey(String),

    /// Key name collides with the serialized metadata block.
    #[error("Key '{0}' is reserved")]
    ReservedKey(String),

    /// Value cannot be turned into the parameter's type or unit.
    #[error("Cannot coerce {value} for '{key}': {reason}")]
    Coercion {
        /// Target key or path.
        key: String,
        /// Rendered value.
        value: String,
        /// Why coercion failed.
        reason: String,
    },

    /// JSON encoding failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Serialized tree does not follow the expected layout.
    #[error("Invalid serialized parameter: {0}")]
    InvalidJson(String),

    /// Pattern rule is not a valid regular expression.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Device-level failure outside the feedback channel.
    #[error("Device error: {0}")]
    Device(String),
}

/// Which enhanced validation rule rejected a value.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationRule {
    /// Value below the inclusive minimum.
    MinValue(f64),
    /// Value above the inclusive maximum.
    MaxValue(f64),
    /// String did not match the regex.
    Pattern(String),
    /// Custom predicate returned false.
    Custom,
}

impl std::fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationRule::MinValue(min) => write!(f, "below minimum {}", min),
            ValidationRule::MaxValue(max) => write!(f, "above maximum {}", max),
            ValidationRule::Pattern(p) => write!(f, "does not match pattern '{}'", p),
            ValidationRule::Custom => write!(f, "rejected by custom validator"),
        }
    }
}

/// Enhanced-rule failure with enough context to show a user.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Validation failed for '{key}': value {value} {rule}")]
pub struct ValidationError {
    /// Offending key.
    pub key: String,
    /// Rendered value.
    pub value: String,
    /// Violated rule.
    pub rule: ValidationRule,
}

impl ValidationError {
    /// Create a validation error.
    pub fn new(key: impl Into<String>, value: impl Into<String>, rule: ValidationRule) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            rule,
        }
    }
}
