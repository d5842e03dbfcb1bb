//! Dimension vectors over the seven SI base dimensions.

use std::fmt;

/// Names of the base dimensions, in vector order.
const BASE_NAMES: [&str; 7] = [
    "length",
    "mass",
    "time",
    "current",
    "temperature",
    "substance",
    "luminosity",
];

/// Exponents of length, mass, time, current, temperature, amount of
/// substance and luminous intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dimension([i8; 7]);

impl Dimension {
    /// Dimensionless.
    pub const NONE: Dimension = Dimension([0; 7]);
    /// `[length]`
    pub const LENGTH: Dimension = Dimension([1, 0, 0, 0, 0, 0, 0]);
    /// `[mass]`
    pub const MASS: Dimension = Dimension([0, 1, 0, 0, 0, 0, 0]);
    /// `[time]`
    pub const TIME: Dimension = Dimension([0, 0, 1, 0, 0, 0, 0]);
    /// `[current]`
    pub const CURRENT: Dimension = Dimension([0, 0, 0, 1, 0, 0, 0]);
    /// `[temperature]`
    pub const TEMPERATURE: Dimension = Dimension([0, 0, 0, 0, 1, 0, 0]);
    /// `[substance]`
    pub const SUBSTANCE: Dimension = Dimension([0, 0, 0, 0, 0, 1, 0]);
    /// `[luminosity]`
    pub const LUMINOSITY: Dimension = Dimension([0, 0, 0, 0, 0, 0, 1]);
    /// `1 / [time]`
    pub const FREQUENCY: Dimension = Dimension([0, 0, -1, 0, 0, 0, 0]);
    /// `[length] ** 2 * [mass] / [time] ** 3`
    pub const POWER: Dimension = Dimension([2, 1, -3, 0, 0, 0, 0]);
    /// `[length] ** 2 * [mass] / [time] ** 3 / [current]`
    pub const VOLTAGE: Dimension = Dimension([2, 1, -3, -1, 0, 0, 0]);

    /// Build from raw exponents.
    pub const fn from_exponents(exponents: [i8; 7]) -> Self {
        Dimension(exponents)
    }

    /// Raw exponents.
    pub fn exponents(&self) -> [i8; 7] {
        self.0
    }

    /// True when every exponent is zero.
    pub fn is_dimensionless(&self) -> bool {
        self.0.iter().all(|e| *e == 0)
    }

    /// Raise every exponent to an integer power. `None` when an exponent
    /// leaves the `i8` range.
    pub fn checked_powi(self, n: i8) -> Option<Self> {
        let mut out = self.0;
        for e in out.iter_mut() {
            *e = e.checked_mul(n)?;
        }
        Some(Dimension(out))
    }

    /// Product of two dimensions. `None` on exponent overflow.
    pub fn checked_mul(self, rhs: Dimension) -> Option<Self> {
        let mut out = self.0;
        for (e, r) in out.iter_mut().zip(rhs.0) {
            *e = e.checked_add(r)?;
        }
        Some(Dimension(out))
    }

    /// Quotient of two dimensions. `None` on exponent overflow.
    pub fn checked_div(self, rhs: Dimension) -> Option<Self> {
        let mut out = self.0;
        for (e, r) in out.iter_mut().zip(rhs.0) {
            *e = e.checked_sub(r)?;
        }
        Some(Dimension(out))
    }
}

fn write_term(f: &mut fmt::Formatter<'_>, name: &str, exp: i8) -> fmt::Result {
    if exp == 1 {
        write!(f, "[{}]", name)
    } else {
        write!(f, "[{}] ** {}", name, exp)
    }
}

impl fmt::Display for Dimension {
    /// Renders like `[length] ** 2 * [mass] / [time] ** 3`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "dimensionless");
        }

        let numerator: Vec<_> = BASE_NAMES
            .iter()
            .zip(self.0)
            .filter(|(_, e)| *e > 0)
            .collect();
        let denominator: Vec<_> = BASE_NAMES
            .iter()
            .zip(self.0)
            .filter(|(_, e)| *e < 0)
            .collect();

        if numerator.is_empty() {
            write!(f, "1")?;
        }
        for (i, (name, exp)) in numerator.iter().enumerate() {
            if i > 0 {
                write!(f, " * ")?;
            }
            write_term(f, name, *exp)?;
        }
        for (name, exp) in denominator {
            write!(f, " / ")?;
            write_term(f, name, -exp)?;
        }
        Ok(())
    }
}
