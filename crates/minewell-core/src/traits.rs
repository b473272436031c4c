//! Trait interfaces for Minewell.
//!
//! These traits define the seams between the crates:
//! - [`CurveSource`]: per-scenario exogenous curves (callers implement;
//!   [`CurveSet`](crate::curves::CurveSet) is the stock in-memory one)
//! - [`WaterfallPolicy`]: health scoring and reserve-draw limits
//!   (minewell-engine implements)

use crate::curves::ScenarioCurves;
use crate::error::CurveError;
use crate::scenario::Scenario;

/// Supplies the monthly price and hash-price series for a scenario.
///
/// Implementations must be fully materialised: `simulate` pulls every
/// scenario's curves before the first month runs and never calls back into
/// the source from inside the monthly loop.
pub trait CurveSource: Send + Sync {
    /// Curves for `scenario`, or [`CurveError::MissingScenario`].
    fn curves(&self, scenario: Scenario) -> Result<ScenarioCurves, CurveError>;

    /// Scenarios this source can serve, in bear → bull order.
    fn scenarios(&self) -> Vec<Scenario>;
}

/// Policy functions the mining waterfall delegates to.
///
/// Kept behind a trait so each can be tested and swapped independently of
/// the monthly state machine.
pub trait WaterfallPolicy: Send + Sync {
    /// Month health in `[0, 100]` from the cost-coverage ratio and the yield
    /// fulfillment ratio. Must be non-decreasing in both arguments.
    fn health_score(&self, coverage_ratio: f64, yield_fulfillment: f64) -> f64;

    /// Quantity that may be drawn from a reserve holding `available` to meet
    /// a shortfall of `requested`. Never exceeds either argument.
    fn reserve_draw(&self, available: f64, requested: f64) -> f64;
}
