//! Standard health-score and reserve-draw policy.
//!
//! The health score is the product of two piecewise-linear lookup curves,
//! one over the cost-coverage ratio and one over yield fulfillment, scaled
//! to `[0, 100]`. Both curves are clamped at their end knots.

use minewell_core::constants::FULL_HEALTH_COVERAGE;
use minewell_core::numeric::interpolate;
use minewell_core::traits::WaterfallPolicy;

/// Coverage ratio → component score. Saturates at [`FULL_HEALTH_COVERAGE`].
pub const COVERAGE_KNOTS: [(f64, f64); 4] = [
    (0.0, 0.0),
    (1.0, 0.6),
    (1.2, 0.85),
    (FULL_HEALTH_COVERAGE, 1.0),
];

/// Yield fulfillment → component score. Saturates at full fulfillment.
pub const FULFILLMENT_KNOTS: [(f64, f64); 3] = [(0.0, 0.0), (0.5, 0.6), (1.0, 1.0)];

/// The waterfall policy used unless a caller supplies its own.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardPolicy {
    coverage_knots: Vec<(f64, f64)>,
    fulfillment_knots: Vec<(f64, f64)>,
    max_draw_fraction: f64,
}

impl Default for StandardPolicy {
    fn default() -> Self {
        Self {
            coverage_knots: COVERAGE_KNOTS.to_vec(),
            fulfillment_knots: FULFILLMENT_KNOTS.to_vec(),
            max_draw_fraction: 1.0,
        }
    }
}

impl StandardPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap each reserve draw at `fraction` of the balance. Clamped to `[0, 1]`.
    pub fn with_max_draw_fraction(mut self, fraction: f64) -> Self {
        self.max_draw_fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        self
    }

    pub fn max_draw_fraction(&self) -> f64 {
        self.max_draw_fraction
    }

    pub fn coverage_component(&self, coverage_ratio: f64) -> f64 {
        interpolate(&self.coverage_knots, coverage_ratio)
    }

    pub fn fulfillment_component(&self, yield_fulfillment: f64) -> f64 {
        interpolate(&self.fulfillment_knots, yield_fulfillment)
    }
}

impl WaterfallPolicy for StandardPolicy {
    fn health_score(&self, coverage_ratio: f64, yield_fulfillment: f64) -> f64 {
        if coverage_ratio.is_nan() || yield_fulfillment.is_nan() {
            return 0.0;
        }
        let score = 100.0
            * self.coverage_component(coverage_ratio)
            * self.fulfillment_component(yield_fulfillment);
        if score.is_nan() { 0.0 } else { score.clamp(0.0, 100.0) }
    }

    fn reserve_draw(&self, available: f64, requested: f64) -> f64 {
        let limit = available.max(0.0) * self.max_draw_fraction;
        requested.max(0.0).min(limit)
    }
}
