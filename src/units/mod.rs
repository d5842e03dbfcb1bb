//! Unit System Adapter
//!
//! A small closed unit algebra for instrument settings: every unit is a
//! dimension vector over the SI base dimensions plus an affine map to SI base
//! units. Quantities convert only within their dimensionality.
//!
//! The registry is injected rather than global. Code that needs units takes
//! an `Arc<dyn UnitSystem>`; [`UnitRegistry::shared`] provides an immutable
//! process-wide default so tests can substitute their own registry.
//!
//! # Example
//!
//! ```rust
//! use daq_settings::units::{UnitRegistry, UnitSystem};
//!
//! let units = UnitRegistry::shared();
//! let f = units.quantity(2.85e9, "Hz").unwrap();
//! let ghz = units.convert(&f, "GHz").unwrap();
//! assert_eq!(ghz.magnitude(), 2.85);
//! assert_eq!(units.best_display_unit(&f), "GHz");
//! ```

mod dimension;
mod quantity;
mod registry;

pub use dimension::Dimension;
pub use quantity::{dimensionality_equal, Quantity, Unit};
pub use registry::UnitRegistry;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Errors raised while parsing or converting units.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    /// Symbol is not in the registry.
    #[error("Unknown unit '{0}'")]
    UnknownUnit(String),

    /// Dimensions differ, no conversion exists.
    #[error("Cannot convert from '{from}' ({from_dimension}) to '{to}' ({to_dimension})")]
    IncompatibleUnits {
        /// Source unit symbol.
        from: String,
        /// Target unit symbol.
        to: String,
        /// Source dimensionality.
        from_dimension: String,
        /// Target dimensionality.
        to_dimension: String,
    },

    /// Text is not `<number> [unit]`.
    #[error("Cannot parse quantity '{0}'")]
    Parse(String),
}

static QUANTITY_RE: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(r"^\s*([-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)\s*(.*?)\s*$")
});

/// Parses unit names and builds quantities.
///
/// Implementations must be pure: the same input always produces the same
/// unit, so caches keyed by unit symbol stay valid.
pub trait UnitSystem: Send + Sync + std::fmt::Debug {
    /// Resolve a unit expression such as `"GHz"` or `"m/s^2"`.
    fn unit(&self, name: &str) -> Result<Unit, UnitError>;

    /// Every unit name sharing `dimension`, ordered by scale.
    fn compatible_units_for(&self, dimension: &Dimension) -> Vec<String>;

    /// Build a quantity from magnitude and unit name.
    fn quantity(&self, magnitude: f64, unit: &str) -> Result<Quantity, UnitError> {
        Ok(Quantity::new(magnitude, self.unit(unit)?))
    }

    /// Parse text like `"10 mm"`, `"2.85e9Hz"` or a bare number
    /// (dimensionless).
    fn parse_quantity(&self, text: &str) -> Result<Quantity, UnitError> {
        let re = QUANTITY_RE
            .as_ref()
            .map_err(|_| UnitError::Parse(text.to_string()))?;
        let caps = re
            .captures(text)
            .ok_or_else(|| UnitError::Parse(text.to_string()))?;
        let magnitude: f64 = caps[1]
            .parse()
            .map_err(|_| UnitError::Parse(text.to_string()))?;
        self.quantity(magnitude, &caps[2])
    }

    /// Convert `quantity` into the named unit.
    fn convert(&self, quantity: &Quantity, target: &str) -> Result<Quantity, UnitError> {
        quantity.to(&self.unit(target)?)
    }

    /// Fail with [`UnitError::IncompatibleUnits`] unless both names share a
    /// dimensionality.
    fn validate_units(&self, a: &str, b: &str) -> Result<(), UnitError> {
        let ua = self.unit(a)?;
        let ub = self.unit(b)?;
        if ua.is_compatible(&ub) {
            Ok(())
        } else {
            Err(UnitError::IncompatibleUnits {
                from: a.to_string(),
                to: b.to_string(),
                from_dimension: ua.dimension().to_string(),
                to_dimension: ub.dimension().to_string(),
            })
        }
    }

    /// Display-only unit choice based on magnitude thresholds. Never used
    /// for validation.
    fn best_display_unit(&self, quantity: &Quantity) -> String {
        let dimension = quantity.dimension();
        let base = quantity.base_magnitude().abs();

        if dimension == Dimension::FREQUENCY {
            return if base >= 1e9 {
                "GHz"
            } else if base >= 1e6 {
                "MHz"
            } else if base >= 1e3 {
                "kHz"
            } else {
                "Hz"
            }
            .to_string();
        }

        let base_symbol = if dimension == Dimension::VOLTAGE {
            Some("V")
        } else if dimension == Dimension::POWER {
            Some("W")
        } else if dimension == Dimension::CURRENT {
            Some("A")
        } else {
            None
        };

        match base_symbol {
            Some(symbol) if base > 0.0 && base < 1.0 => format!("m{}", symbol),
            Some(symbol) => symbol.to_string(),
            None => quantity.units().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity_forms() {
        let units = UnitRegistry::new();
        let q = units.parse_quantity("10 mm").unwrap();
        assert_eq!(q.magnitude(), 10.0);
        assert_eq!(q.units(), "mm");

        let q = units.parse_quantity("2.85e9Hz").unwrap();
        assert_eq!(q.magnitude(), 2.85e9);
        assert_eq!(q.dimension(), Dimension::FREQUENCY);

        let q = units.parse_quantity(" -3.5 ").unwrap();
        assert!(q.dimension().is_dimensionless());

        assert!(matches!(
            units.parse_quantity("fast"),
            Err(UnitError::Parse(_))
        ));
        assert!(matches!(
            units.parse_quantity("5 furlongs"),
            Err(UnitError::UnknownUnit(_))
        ));
    }

    #[test]
    fn test_best_display_unit() {
        let units = UnitRegistry::new();
        let check = |mag: f64, unit: &str, expected: &str| {
            let q = units.quantity(mag, unit).unwrap();
            assert_eq!(units.best_display_unit(&q), expected, "{} {}", mag, unit);
        };
        check(2.85e9, "Hz", "GHz");
        check(2.5, "MHz", "MHz");
        check(12_000.0, "Hz", "kHz");
        check(50.0, "Hz", "Hz");
        check(0.25, "V", "mV");
        check(250.0, "mW", "mW");
        check(3.0, "W", "W");
        check(0.0, "A", "A");
        check(4.0, "mm", "mm");
    }

    #[test]
    fn test_validate_units() {
        let units = UnitRegistry::new();
        assert!(units.validate_units("Hz", "GHz").is_ok());
        assert!(matches!(
            units.validate_units("Hz", "mm"),
            Err(UnitError::IncompatibleUnits { .. })
        ));
    }

    #[test]
    fn test_dimensionality_equal() {
        let units = UnitRegistry::new();
        let a = units.quantity(1.0, "kHz").unwrap();
        let b = units.quantity(1.0, "1/s").unwrap();
        let c = units.quantity(1.0, "s").unwrap();
        assert!(dimensionality_equal(&a, &b));
        assert!(!dimensionality_equal(&a, &c));
    }
}
