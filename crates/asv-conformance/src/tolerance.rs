//! The approximate-equality rule every numeric comparison goes through.
//!
//! Console numbers are rounded decimal text while the store keeps full
//! precision, so no reconciler compares floats with `==` directly.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_DECIMAL_PLACES: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Tolerance {
    /// `round(|a - b|, places) == 0`.
    DecimalPlaces { places: u32 },
    /// Agreement to `digits` significant digits of the larger magnitude.
    SignificantDigits { digits: u32 },
    /// `|a - b| <= abs_tol + rel_tol * |expected|`.
    AbsRel { abs_tol: f64, rel_tol: f64 },
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DecimalPlaces {
            places: DEFAULT_DECIMAL_PLACES,
        }
    }
}

impl Tolerance {
    #[must_use]
    pub fn decimal_places(places: u32) -> Self {
        Self::DecimalPlaces { places }
    }

    /// `expected` is the console value, `actual` the stored one.
    #[must_use]
    pub fn approx_eq(&self, expected: f64, actual: f64) -> bool {
        if expected == actual {
            return true;
        }
        if !expected.is_finite() || !actual.is_finite() {
            return false;
        }
        let diff = (expected - actual).abs();
        match *self {
            Self::DecimalPlaces { places } => {
                let scale = 10f64.powi(places_exponent(places));
                (diff * scale).round() == 0.0
            }
            Self::SignificantDigits { digits } => {
                let magnitude = expected.abs().max(actual.abs());
                let scale = 10f64.powi(places_exponent(digits));
                (diff / magnitude * scale).round() == 0.0
            }
            Self::AbsRel { abs_tol, rel_tol } => diff <= abs_tol + rel_tol * expected.abs(),
        }
    }
}

fn places_exponent(places: u32) -> i32 {
    i32::try_from(places).unwrap_or(i32::MAX)
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DecimalPlaces { places } => write!(f, "{places} decimal places"),
            Self::SignificantDigits { digits } => write!(f, "{digits} significant digits"),
            Self::AbsRel { abs_tol, rel_tol } => write!(f, "abs_tol={abs_tol} rel_tol={rel_tol}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Tolerance;

    #[test]
    fn default_matches_seven_decimal_places() {
        let tol = Tolerance::default();
        assert!(tol.approx_eq(0.123_456_78, 0.123_456_81));
        assert!(!tol.approx_eq(0.123_456_7, 0.123_457_7));
        assert!(tol.approx_eq(1.0e-9, 0.0));
    }

    #[test]
    fn significant_digits_scale_with_magnitude() {
        let tol = Tolerance::SignificantDigits { digits: 9 };
        assert!(tol.approx_eq(3.831_044_450_2e4, 3.831_044_450_213_7e4));
        assert!(!tol.approx_eq(3.831_044e4, 3.831_055e4));
    }

    #[test]
    fn abs_rel_uses_expected_magnitude() {
        let tol = Tolerance::AbsRel {
            abs_tol: 0.0,
            rel_tol: 1e-3,
        };
        assert!(tol.approx_eq(1000.0, 1000.9));
        assert!(!tol.approx_eq(1000.0, 1001.1));
    }

    #[test]
    fn non_finite_values_only_match_themselves() {
        let tol = Tolerance::default();
        assert!(tol.approx_eq(f64::INFINITY, f64::INFINITY));
        assert!(!tol.approx_eq(f64::INFINITY, f64::NEG_INFINITY));
        assert!(!tol.approx_eq(f64::NAN, f64::NAN));
        assert!(!tol.approx_eq(1.0, f64::NAN));
    }
}
