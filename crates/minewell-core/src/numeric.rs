//! Floating-point helpers shared by the engines.
//!
//! Monthly folds run for up to a decade, so running totals are kept with
//! Neumaier compensated summation rather than a naive `+=`.

use serde::{Deserialize, Serialize};

/// Compensated running sum (Neumaier variant of Kahan summation).
///
/// # Examples
///
/// ```
/// use minewell_core::numeric::StableSum;
/// let mut s = StableSum::default();
/// s.add(1e16);
/// s.add(1.0);
/// s.add(-1e16);
/// assert_eq!(s.value(), 1.0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StableSum {
    sum: f64,
    compensation: f64,
}

impl StableSum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, x: f64) {
        let t = self.sum + x;
        if self.sum.abs() >= x.abs() {
            self.compensation += (self.sum - t) + x;
        } else {
            self.compensation += (x - t) + self.sum;
        }
        self.sum = t;
    }

    pub fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}

impl FromIterator<f64> for StableSum {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut s = StableSum::new();
        for x in iter {
            s.add(x);
        }
        s
    }
}

/// Compensated sum of an iterator of values.
pub fn stable_sum<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values.into_iter().collect::<StableSum>().value()
}

/// `num / den`, or `fallback` when the denominator is not positive.
pub fn ratio_or(num: f64, den: f64, fallback: f64) -> f64 {
    if den > 0.0 { num / den } else { fallback }
}

/// Relative equality with an absolute floor for values near zero.
pub fn approx_eq_rel(a: f64, b: f64, rel: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= rel * scale
}

/// Linear interpolation over sorted `(x, y)` knots, clamped at both ends.
///
/// Knots must be sorted by `x` with strictly increasing abscissae.
pub fn interpolate(knots: &[(f64, f64)], x: f64) -> f64 {
    let Some(&(x0, y0)) = knots.first() else {
        return 0.0;
    };
    if x <= x0 {
        return y0;
    }
    for pair in knots.windows(2) {
        let (lo_x, lo_y) = pair[0];
        let (hi_x, hi_y) = pair[1];
        if x <= hi_x {
            let t = (x - lo_x) / (hi_x - lo_x);
            return lo_y + t * (hi_y - lo_y);
        }
    }
    knots[knots.len() - 1].1
}
