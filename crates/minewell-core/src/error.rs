//! Error types for Minewell.
use thiserror::Error;

use crate::scenario::Scenario;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("bucket allocations sum to {total}%, expected 100% ± {tolerance}")] AllocationSum { total: f64, tolerance: f64 },
    #[error("{field} must be positive and finite, got {value}")] NonPositive { field: &'static str, value: f64 },
    #[error("{field} must be finite and non-negative, got {value}")] Negative { field: &'static str, value: f64 },
    #[error("{field} must lie in [0, 1], got {value}")] FractionOutOfRange { field: &'static str, value: f64 },
    #[error("zero denominator: {0}")] ZeroDenominator(&'static str),
    #[error("tenor must be at least one month")] ZeroTenor,
    #[error("APR schedule entry {index} has from_month {from} > to_month {to}")] InvalidSchedule { index: usize, from: u32, to: u32 },
    #[error("ladder rung {index}: {reason}")] InvalidLadderRung { index: usize, reason: String },
    #[error("ladder shares sum to {total}, at most 1 allowed")] LadderOversubscribed { total: f64 },
    #[error("max LTV {max_ltv} must be below liquidation LTV {liquidation_ltv}")] LtvOrdering { max_ltv: f64, liquidation_ltv: f64 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CurveError {
    #[error("no curves supplied for scenario {0}")] MissingScenario(Scenario),
    #[error("{scenario} {series} curve covers {have} months, tenor needs {need}")] InsufficientCoverage { scenario: Scenario, series: &'static str, have: usize, need: usize },
    #[error("{scenario} {series} curve has invalid value {value} at month {month}")] InvalidPoint { scenario: Scenario, series: &'static str, month: usize, value: f64 },
    #[error("empty scenario set")] EmptyScenarioSet,
    #[error("curve generation: {0}")] Generation(String),
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)] Config(#[from] ConfigError),
    #[error(transparent)] Curve(#[from] CurveError),
    #[error("simulation cancelled")] Cancelled,
}
