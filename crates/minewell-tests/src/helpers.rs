//! Shared builders for curve sets and full runs.

use std::collections::BTreeMap;

use minewell_core::config::{CollateralConfig, ProductConfig, ProductSpec};
use minewell_core::curves::{CurveSet, ScenarioCurves};
use minewell_core::scenario::Scenario;
use minewell_engine::simulate::{
    BucketScenarioResult, CollateralScenarioResult, RunResult, simulate,
};

/// Network hash-price used when a test only cares about price.
pub const BASE_HASHPRICE: f64 = 0.000_5;

/// Constant price and hash-price for `months`.
pub fn flat(price: f64, hashprice: f64, months: usize) -> ScenarioCurves {
    ScenarioCurves {
        prices: vec![price; months],
        hashprice: vec![hashprice; months],
    }
}

/// `prices` with a constant hash-price.
pub fn from_prices(prices: &[f64], hashprice: f64) -> ScenarioCurves {
    ScenarioCurves {
        prices: prices.to_vec(),
        hashprice: vec![hashprice; prices.len()],
    }
}

/// Straight-line price path from `start` to `end`, inclusive.
pub fn linear_path(start: f64, end: f64, months: usize) -> Vec<f64> {
    if months <= 1 {
        return vec![start; months];
    }
    let step = (end - start) / (months - 1) as f64;
    (0..months).map(|m| start + step * m as f64).collect()
}

/// Bear falls, base drifts up, bull rallies past the default holding target.
pub fn three_scenarios(months: usize) -> CurveSet {
    CurveSet::new()
        .with(Scenario::Bear, from_prices(&linear_path(90_000.0, 45_000.0, months), 0.000_35))
        .with(Scenario::Base, from_prices(&linear_path(90_000.0, 130_000.0, months), BASE_HASHPRICE))
        .with(Scenario::Bull, from_prices(&linear_path(90_000.0, 300_000.0, months), 0.000_6))
}

/// Every scenario gets the same curves.
pub fn uniform(curves: ScenarioCurves) -> CurveSet {
    Scenario::ALL
        .into_iter()
        .fold(CurveSet::new(), |set, s| set.with(s, curves.clone()))
}

/// Run a bucket product and unwrap the per-scenario map.
pub fn run_buckets(config: &ProductConfig, curves: &CurveSet) -> BTreeMap<Scenario, BucketScenarioResult> {
    match simulate(&ProductSpec::Buckets(config.clone()), curves) {
        Ok(RunResult::Buckets(results)) => results,
        Ok(other) => panic!("bucket product produced {other:?}"),
        Err(e) => panic!("bucket run failed: {e}"),
    }
}

/// Run a collateral product and unwrap the per-scenario map.
pub fn run_collateral(
    config: &CollateralConfig,
    curves: &CurveSet,
) -> BTreeMap<Scenario, CollateralScenarioResult> {
    match simulate(&ProductSpec::Collateral(config.clone()), curves) {
        Ok(RunResult::Collateral(results)) => results,
        Ok(other) => panic!("collateral product produced {other:?}"),
        Err(e) => panic!("collateral run failed: {e}"),
    }
}
