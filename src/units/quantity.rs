//! `Unit` and `Quantity` value types.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;

use super::{Dimension, UnitError};

/// A resolved unit: symbol as written, dimension and affine map to SI base.
///
/// `base = magnitude * scale + offset`. Offset is non-zero only for affine
/// temperature scales such as `degC`.
#[derive(Debug, Clone)]
pub struct Unit {
    symbol: String,
    dimension: Dimension,
    scale: f64,
    offset: f64,
}

impl Unit {
    /// Create a unit from its parts.
    pub fn new(symbol: impl Into<String>, dimension: Dimension, scale: f64, offset: f64) -> Self {
        Self {
            symbol: symbol.into(),
            dimension,
            scale,
            offset,
        }
    }

    /// The dimensionless unit.
    pub fn dimensionless() -> Self {
        Self::new("", Dimension::NONE, 1.0, 0.0)
    }

    /// Symbol exactly as parsed (e.g. `"GHz"`).
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Dimension vector.
    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Factor to SI base.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Offset to SI base.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Same dimension as `other`.
    pub fn is_compatible(&self, other: &Unit) -> bool {
        self.dimension == other.dimension
    }
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
            && self.dimension == other.dimension
            && self.scale == other.scale
            && self.offset == other.offset
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// A magnitude paired with a physical unit.
///
/// Immutable; [`Quantity::to`] returns a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    magnitude: f64,
    unit: Unit,
}

impl Quantity {
    /// Pair a magnitude with a resolved unit.
    pub fn new(magnitude: f64, unit: Unit) -> Self {
        Self { magnitude, unit }
    }

    /// Numeric part, expressed in [`Quantity::unit`].
    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    /// Unit of the magnitude.
    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Shorthand for `unit().symbol()`.
    pub fn units(&self) -> &str {
        self.unit.symbol()
    }

    /// Dimension of the unit.
    pub fn dimension(&self) -> Dimension {
        self.unit.dimension()
    }

    /// Magnitude in SI base units.
    pub fn base_magnitude(&self) -> f64 {
        self.magnitude * self.unit.scale + self.unit.offset
    }

    /// Convert into `target`, failing when the dimensions differ.
    pub fn to(&self, target: &Unit) -> Result<Quantity, UnitError> {
        if !self.unit.is_compatible(target) {
            return Err(UnitError::IncompatibleUnits {
                from: self.unit.symbol.clone(),
                to: target.symbol.clone(),
                from_dimension: self.unit.dimension.to_string(),
                to_dimension: target.dimension.to_string(),
            });
        }
        if self.unit == *target {
            return Ok(self.clone());
        }
        let magnitude = (self.base_magnitude() - target.offset) / target.scale;
        Ok(Quantity::new(magnitude, target.clone()))
    }

    /// Same quantity with a different magnitude.
    pub fn with_magnitude(&self, magnitude: f64) -> Quantity {
        Quantity::new(magnitude, self.unit.clone())
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.symbol.is_empty() {
            write!(f, "{}", self.magnitude)
        } else {
            write!(f, "{} {}", self.magnitude, self.unit.symbol)
        }
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Quantity", 2)?;
        state.serialize_field("magnitude", &self.magnitude)?;
        state.serialize_field("units", &self.unit.symbol)?;
        state.end()
    }
}

/// True when both quantities share a dimensionality.
pub fn dimensionality_equal(a: &Quantity, b: &Quantity) -> bool {
    a.dimension() == b.dimension()
}
