//! Readback tolerance: how far an achieved value may drift from the
//! requested one before it is flagged.

use serde::{Deserialize, Serialize};

/// Default fraction of a bound at which a warning is raised.
pub const DEFAULT_WARNING_FRACTION: f64 = 0.8;

/// How configured percent and absolute bounds combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToleranceCombine {
    /// Every configured bound must hold. Configuring both tightens the check.
    #[default]
    All,
    /// Any configured bound is sufficient.
    Any,
}

impl ToleranceCombine {
    /// Serialized name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToleranceCombine::All => "all",
            ToleranceCombine::Any => "any",
        }
    }

    /// Parse a serialized name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "all" => Some(ToleranceCombine::All),
            "any" => Some(ToleranceCombine::Any),
            _ => None,
        }
    }
}

/// Tolerance settings for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct ToleranceConfig {
    /// Allowed deviation in percent of the target.
    pub percent: Option<f64>,
    /// Allowed deviation in the value's own unit.
    pub absolute: Option<f64>,
    /// Explicit switch. `None` means "enabled iff a bound is configured".
    pub enabled: Option<bool>,
    /// Combination policy when both bounds are set.
    pub combine: ToleranceCombine,
    /// Warn once the deviation reaches this fraction of a bound.
    pub warning_fraction: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            percent: None,
            absolute: None,
            enabled: None,
            combine: ToleranceCombine::All,
            warning_fraction: DEFAULT_WARNING_FRACTION,
        }
    }
}

/// Outcome of [`ToleranceConfig::evaluate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToleranceReport {
    /// Deviation is acceptable under the configured bounds.
    pub within_tolerance: bool,
    /// `|actual - target| / |target| * 100`, or 0 for a zero target.
    pub deviation_percent: f64,
    /// `|actual - target|`.
    pub deviation_absolute: f64,
    /// Within tolerance but close to a bound.
    pub warning_threshold_exceeded: bool,
}

impl ToleranceConfig {
    /// Whether [`evaluate`](Self::evaluate) produces a report.
    pub fn is_enabled(&self) -> bool {
        self.enabled
            .unwrap_or(self.percent.is_some() || self.absolute.is_some())
    }

    /// Compare `actual` against `target`. `None` when disabled.
    ///
    /// Enabled with no bound configured means an exact match is required.
    pub fn evaluate(&self, target: f64, actual: f64) -> Option<ToleranceReport> {
        if !self.is_enabled() {
            return None;
        }

        let deviation_absolute = (actual - target).abs();
        let deviation_percent = if target == 0.0 {
            if deviation_absolute.is_finite() {
                0.0
            } else {
                deviation_absolute
            }
        } else {
            deviation_absolute / target.abs() * 100.0
        };

        let within_tolerance = if !deviation_absolute.is_finite() || !deviation_percent.is_finite()
        {
            false
        } else {
            let absolute_ok = self.absolute.map(|bound| deviation_absolute <= bound);
            let percent_ok = self.percent.map(|bound| deviation_percent <= bound);
            match (absolute_ok, percent_ok) {
                (None, None) => deviation_absolute == 0.0,
                (Some(ok), None) | (None, Some(ok)) => ok,
                (Some(a), Some(p)) => match self.combine {
                    ToleranceCombine::All => a && p,
                    ToleranceCombine::Any => a || p,
                },
            }
        };

        let near = |deviation: f64, bound: Option<f64>| {
            bound.is_some_and(|b| b > 0.0 && deviation >= self.warning_fraction * b)
        };
        let warning_threshold_exceeded = within_tolerance
            && (near(deviation_absolute, self.absolute) || near(deviation_percent, self.percent));

        Some(ToleranceReport {
            within_tolerance,
            deviation_percent,
            deviation_absolute,
            warning_threshold_exceeded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(percent: Option<f64>, absolute: Option<f64>) -> ToleranceConfig {
        ToleranceConfig {
            percent,
            absolute,
            ..Default::default()
        }
    }

    #[test]
    fn test_disabled_without_bounds() {
        assert!(ToleranceConfig::default().evaluate(1.0, 2.0).is_none());
        let exact = ToleranceConfig {
            enabled: Some(true),
            ..Default::default()
        };
        assert!(exact.evaluate(1.0, 1.0).unwrap().within_tolerance);
        assert!(!exact.evaluate(1.0, 1.1).unwrap().within_tolerance);
        let off = ToleranceConfig {
            enabled: Some(false),
            ..config(Some(1.0), None)
        };
        assert!(off.evaluate(1.0, 2.0).is_none());
    }

    #[test]
    fn test_zero_target() {
        let report = config(None, Some(0.1)).evaluate(0.0, 0.05).unwrap();
        assert_eq!(report.deviation_percent, 0.0);
        assert!(report.within_tolerance);
        assert!(!report.warning_threshold_exceeded);
    }

    #[test]
    fn test_both_bounds_must_hold() {
        let tol = config(Some(1.0), Some(0.5));
        let report = tol.evaluate(100.0, 100.6).unwrap();
        assert!(!report.within_tolerance);
        assert!(report.deviation_percent < 1.0);

        let any = ToleranceConfig {
            combine: ToleranceCombine::Any,
            ..tol
        };
        assert!(any.evaluate(100.0, 100.6).unwrap().within_tolerance);
    }

    #[test]
    fn test_warning_threshold() {
        let tol = config(None, Some(1.0));
        let report = tol.evaluate(10.0, 10.85).unwrap();
        assert!(report.within_tolerance);
        assert!(report.warning_threshold_exceeded);

        let report = tol.evaluate(10.0, 10.5).unwrap();
        assert!(!report.warning_threshold_exceeded);

        let report = tol.evaluate(10.0, 12.0).unwrap();
        assert!(!report.within_tolerance);
        assert!(!report.warning_threshold_exceeded);
    }

    #[test]
    fn test_non_finite_is_outside() {
        let tol = config(Some(5.0), Some(1.0));
        let report = tol.evaluate(10.0, f64::NAN).unwrap();
        assert!(report.deviation_absolute.is_nan());
        assert!(!report.within_tolerance);

        let report = tol.evaluate(0.0, f64::INFINITY).unwrap();
        assert!(report.deviation_percent.is_infinite());
        assert!(!report.within_tolerance);
    }
}
