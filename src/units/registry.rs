//! Default SI unit registry.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

use super::{Dimension, Unit, UnitError, UnitSystem};

/// SI prefixes, `da` first so it wins over `d`.
const PREFIXES: &[(&str, f64)] = &[
    ("da", 1e1),
    ("Y", 1e24),
    ("Z", 1e21),
    ("E", 1e18),
    ("P", 1e15),
    ("T", 1e12),
    ("G", 1e9),
    ("M", 1e6),
    ("k", 1e3),
    ("h", 1e2),
    ("d", 1e-1),
    ("c", 1e-2),
    ("m", 1e-3),
    ("u", 1e-6),
    ("µ", 1e-6),
    ("μ", 1e-6),
    ("n", 1e-9),
    ("p", 1e-12),
    ("f", 1e-15),
    ("a", 1e-18),
    ("z", 1e-21),
    ("y", 1e-24),
];

/// Prefixes offered by [`UnitSystem::compatible_units_for`].
const DISPLAY_PREFIXES: &[&str] = &["p", "n", "u", "m", "k", "M", "G", "T"];

#[derive(Debug, Clone)]
struct BaseUnit {
    symbol: &'static str,
    dimension: Dimension,
    scale: f64,
    offset: f64,
    prefixable: bool,
}

const fn dim(e: [i8; 7]) -> Dimension {
    Dimension::from_exponents(e)
}

fn builtin_units() -> Vec<BaseUnit> {
    let unit = |symbol, dimension, scale, prefixable| BaseUnit {
        symbol,
        dimension,
        scale,
        offset: 0.0,
        prefixable,
    };

    vec![
        // base
        unit("m", Dimension::LENGTH, 1.0, true),
        unit("g", Dimension::MASS, 1e-3, true),
        unit("s", Dimension::TIME, 1.0, true),
        unit("A", Dimension::CURRENT, 1.0, true),
        unit("K", Dimension::TEMPERATURE, 1.0, true),
        unit("mol", Dimension::SUBSTANCE, 1.0, true),
        unit("cd", Dimension::LUMINOSITY, 1.0, true),
        // derived
        unit("Hz", Dimension::FREQUENCY, 1.0, true),
        unit("N", dim([1, 1, -2, 0, 0, 0, 0]), 1.0, true),
        unit("Pa", dim([-1, 1, -2, 0, 0, 0, 0]), 1.0, true),
        unit("bar", dim([-1, 1, -2, 0, 0, 0, 0]), 1e5, true),
        unit("Torr", dim([-1, 1, -2, 0, 0, 0, 0]), 101_325.0 / 760.0, false),
        unit("J", dim([2, 1, -2, 0, 0, 0, 0]), 1.0, true),
        unit("eV", dim([2, 1, -2, 0, 0, 0, 0]), 1.602_176_634e-19, true),
        unit("W", Dimension::POWER, 1.0, true),
        unit("C", dim([0, 0, 1, 1, 0, 0, 0]), 1.0, true),
        unit("V", Dimension::VOLTAGE, 1.0, true),
        unit("ohm", dim([2, 1, -3, -2, 0, 0, 0]), 1.0, true),
        unit("Ω", dim([2, 1, -3, -2, 0, 0, 0]), 1.0, true),
        unit("S", dim([-2, -1, 3, 2, 0, 0, 0]), 1.0, true),
        unit("F", dim([-2, -1, 4, 2, 0, 0, 0]), 1.0, true),
        unit("H", dim([2, 1, -2, -2, 0, 0, 0]), 1.0, true),
        unit("Wb", dim([2, 1, -2, -1, 0, 0, 0]), 1.0, true),
        unit("T", dim([0, 1, -2, -1, 0, 0, 0]), 1.0, true),
        unit("L", dim([3, 0, 0, 0, 0, 0, 0]), 1e-3, true),
        // non-SI
        unit("min", Dimension::TIME, 60.0, false),
        unit("h", Dimension::TIME, 3600.0, false),
        unit("in", Dimension::LENGTH, 0.0254, false),
        unit("rad", Dimension::NONE, 1.0, true),
        unit("deg", Dimension::NONE, std::f64::consts::PI / 180.0, false),
        unit("%", Dimension::NONE, 1e-2, false),
        unit("ppm", Dimension::NONE, 1e-6, false),
        BaseUnit {
            symbol: "degC",
            dimension: Dimension::TEMPERATURE,
            scale: 1.0,
            offset: 273.15,
            prefixable: false,
        },
        BaseUnit {
            symbol: "degF",
            dimension: Dimension::TEMPERATURE,
            scale: 5.0 / 9.0,
            offset: 459.67 * 5.0 / 9.0,
            prefixable: false,
        },
    ]
}

static SHARED: Lazy<Arc<UnitRegistry>> = Lazy::new(|| Arc::new(UnitRegistry::new()));

/// SI registry with prefixes and compound expressions (`m/s^2`,
/// `kg*m**2/s**3`, `1/s`).
#[derive(Debug, Clone)]
pub struct UnitRegistry {
    units: Vec<BaseUnit>,
    index: HashMap<&'static str, usize>,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitRegistry {
    /// Build the builtin registry.
    pub fn new() -> Self {
        let units = builtin_units();
        let index = units
            .iter()
            .enumerate()
            .map(|(i, u)| (u.symbol, i))
            .collect();
        Self { units, index }
    }

    /// Immutable process-wide registry, built on first use.
    pub fn shared() -> Arc<UnitRegistry> {
        Arc::clone(&SHARED)
    }

    /// Resolve one symbol with an optional SI prefix.
    fn lookup(&self, symbol: &str) -> Option<(f64, &BaseUnit)> {
        if let Some(&i) = self.index.get(symbol) {
            return Some((1.0, &self.units[i]));
        }
        PREFIXES.iter().find_map(|(prefix, factor)| {
            let rest = symbol.strip_prefix(prefix)?;
            let &i = self.index.get(rest)?;
            let base = &self.units[i];
            base.prefixable.then_some((*factor, base))
        })
    }

    /// Parse `symbol`, `symbol^n` or `symbol**n`.
    fn term(&self, term: &str, full: &str) -> Result<(Dimension, f64, f64), UnitError> {
        let (symbol, exponent) = match term.split_once('^') {
            Some((s, e)) => {
                let e: i8 = e
                    .trim()
                    .parse()
                    .map_err(|_| UnitError::UnknownUnit(full.to_string()))?;
                (s.trim(), e)
            }
            None => (term.trim(), 1),
        };

        if symbol == "1" {
            return Ok((Dimension::NONE, 1.0, 0.0));
        }

        let (factor, base) = self
            .lookup(symbol)
            .ok_or_else(|| UnitError::UnknownUnit(full.to_string()))?;
        let dimension = base
            .dimension
            .checked_powi(exponent)
            .ok_or_else(|| UnitError::UnknownUnit(full.to_string()))?;
        let scale = (factor * base.scale).powi(i32::from(exponent));
        Ok((dimension, scale, base.offset))
    }
}

impl UnitSystem for UnitRegistry {
    fn unit(&self, name: &str) -> Result<Unit, UnitError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(Unit::dimensionless());
        }

        let normalized = name.replace("**", "^");
        let mut dimension = Dimension::NONE;
        let mut scale = 1.0;
        let mut offset = 0.0;
        let mut terms = 0usize;
        let mut divide = false;
        let mut current = String::new();

        let mut apply = |text: &str, divide: bool| -> Result<(), UnitError> {
            if text.trim().is_empty() {
                return Err(UnitError::UnknownUnit(name.to_string()));
            }
            let (d, s, o) = self.term(text, name)?;
            let combined = if divide {
                scale /= s;
                dimension.checked_div(d)
            } else {
                scale *= s;
                dimension.checked_mul(d)
            };
            dimension = combined.ok_or_else(|| UnitError::UnknownUnit(name.to_string()))?;
            offset = o;
            terms += 1;
            Ok(())
        };

        for ch in normalized.chars() {
            match ch {
                '*' | '/' => {
                    apply(&current, divide)?;
                    current.clear();
                    divide = ch == '/';
                }
                _ => current.push(ch),
            }
        }
        apply(&current, divide)?;

        // affine offsets only make sense for a lone unit
        let offset = if terms == 1 && !normalized.contains('^') {
            offset
        } else {
            0.0
        };

        Ok(Unit::new(name, dimension, scale, offset))
    }

    fn compatible_units_for(&self, dimension: &Dimension) -> Vec<String> {
        let mut found: Vec<(String, f64)> = Vec::new();
        for base in self.units.iter().filter(|u| u.dimension == *dimension) {
            found.push((base.symbol.to_string(), base.scale));
            if base.prefixable {
                for prefix in DISPLAY_PREFIXES {
                    let factor = PREFIXES
                        .iter()
                        .find(|(p, _)| p == prefix)
                        .map(|(_, f)| *f)
                        .unwrap_or(1.0);
                    found.push((format!("{}{}", prefix, base.symbol), factor * base.scale));
                }
            }
        }

        found.sort_by(|a, b| a.1.total_cmp(&b.1));
        let mut names: Vec<String> = Vec::with_capacity(found.len());
        for (name, _) in found {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_lookup() {
        let units = UnitRegistry::new();
        let ghz = units.unit("GHz").unwrap();
        assert_eq!(ghz.scale(), 1e9);
        assert_eq!(ghz.dimension(), Dimension::FREQUENCY);

        let mm = units.unit("mm").unwrap();
        assert_eq!(mm.scale(), 1e-3);

        let kg = units.unit("kg").unwrap();
        assert_eq!(kg.dimension(), Dimension::MASS);
        assert!((kg.scale() - 1.0).abs() < 1e-12);

        assert_eq!(units.unit("µm").unwrap().scale(), 1e-6);
        assert_eq!(units.unit("um").unwrap().scale(), 1e-6);
    }

    #[test]
    fn test_exact_symbols_win_over_prefixes() {
        let units = UnitRegistry::new();
        assert_eq!(units.unit("T").unwrap().dimension(), dim([0, 1, -2, -1, 0, 0, 0]));
        assert_eq!(units.unit("min").unwrap().scale(), 60.0);
        assert_eq!(units.unit("Pa").unwrap().scale(), 1.0);
        assert_eq!(units.unit("dam").unwrap().scale(), 10.0);
    }

    #[test]
    fn test_non_prefixable_rejects_prefix() {
        let units = UnitRegistry::new();
        assert!(matches!(units.unit("kdegC"), Err(UnitError::UnknownUnit(_))));
        assert!(matches!(units.unit("furlong"), Err(UnitError::UnknownUnit(_))));
    }

    #[test]
    fn test_compound_units() {
        let units = UnitRegistry::new();
        let accel = units.unit("m/s^2").unwrap();
        assert_eq!(accel.dimension(), dim([1, 0, -2, 0, 0, 0, 0]));

        let power = units.unit("kg*m**2/s**3").unwrap();
        assert_eq!(power.dimension(), Dimension::POWER);
        assert!((power.scale() - 1.0).abs() < 1e-12);

        let per_second = units.unit("1/s").unwrap();
        assert_eq!(per_second.dimension(), Dimension::FREQUENCY);

        let speed = units.unit("mm/s").unwrap();
        assert_eq!(speed.scale(), 1e-3);
        assert_eq!(speed.symbol(), "mm/s");

        assert!(units.unit("m//s").is_err());
    }

    #[test]
    fn test_exponent_overflow_is_an_error() {
        let units = UnitRegistry::new();
        assert!(matches!(
            units.parse_quantity("5 m^100*m^100"),
            Err(UnitError::UnknownUnit(_))
        ));
        assert!(matches!(units.unit("m^100/m^-100"), Err(UnitError::UnknownUnit(_))));
        assert!(units.unit("s^-128^2").is_err());
        assert_eq!(units.unit("m^100/m^99").unwrap().dimension(), Dimension::LENGTH);
    }

    #[test]
    fn test_compatible_units_for_frequency() {
        let units = UnitRegistry::new();
        let names = units.compatible_units_for(&Dimension::FREQUENCY);
        for expected in ["Hz", "kHz", "MHz", "GHz", "THz"] {
            assert!(names.contains(&expected.to_string()), "missing {}", expected);
        }
        let pos = |n: &str| names.iter().position(|x| x == n).unwrap();
        assert!(pos("Hz") < pos("kHz"));
        assert!(pos("MHz") < pos("GHz"));
    }

    #[test]
    fn test_compatible_units_for_length_includes_inch() {
        let units = UnitRegistry::new();
        let names = units.compatible_units_for(&Dimension::LENGTH);
        assert!(names.contains(&"mm".to_string()));
        assert!(names.contains(&"in".to_string()));
        assert!(!names.contains(&"Hz".to_string()));
    }

    #[test]
    fn test_shared_registry_is_single_instance() {
        let a = UnitRegistry::shared();
        let b = UnitRegistry::shared();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
