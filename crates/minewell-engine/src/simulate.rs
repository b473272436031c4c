//! The `simulate` entry point.
//!
//! Validates the product, materialises every scenario's curves, then folds
//! each scenario over its months in parallel. Results are all-or-nothing:
//! any error or a cancellation discards every scenario.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use minewell_core::config::{CollateralConfig, ProductConfig, ProductSpec};
use minewell_core::curves::ScenarioCurves;
use minewell_core::error::{CurveError, SimError};
use minewell_core::scenario::Scenario;
use minewell_core::traits::{CurveSource, WaterfallPolicy};

use crate::aggregation::{AggregatedResult, AggregationEngine, DecisionInputs, MonthView};
use crate::collateral::{
    CollateralEngine, CollateralMonth, CollateralSummary, StrikeEvent, StrikeStatus,
};
use crate::commercial::{CommercialOverlay, apply_upfront};
use crate::holding::{HoldingMonth, HoldingSummary, HoldingTracker};
use crate::policy::StandardPolicy;
use crate::waterfall::{MiningSummary, MiningWaterfallEngine, MonthInputs, MonthlyWaterfallRecord};
use crate::yield_accrual::{YieldAccrual, YieldMonth, YieldSummary};

/// Shared cancellation flag, polled once per simulated month.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), SimError> {
        if self.is_cancelled() {
            Err(SimError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketScenarioResult {
    pub yield_summary: YieldSummary,
    pub yield_months: Vec<YieldMonth>,
    pub holding_summary: HoldingSummary,
    pub holding_months: Vec<HoldingMonth>,
    pub mining_summary: MiningSummary,
    pub waterfall: Vec<MonthlyWaterfallRecord>,
    pub aggregated: AggregatedResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralScenarioResult {
    pub months: Vec<CollateralMonth>,
    pub summary: CollateralSummary,
    pub strikes: Vec<StrikeStatus>,
    pub strike_events: Vec<StrikeEvent>,
}

/// Per-scenario output of a run, shaped by the product mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "scenarios", rename_all = "snake_case")]
pub enum RunResult {
    Buckets(BTreeMap<Scenario, BucketScenarioResult>),
    Collateral(BTreeMap<Scenario, CollateralScenarioResult>),
}

impl RunResult {
    pub fn scenarios(&self) -> Vec<Scenario> {
        match self {
            Self::Buckets(m) => m.keys().copied().collect(),
            Self::Collateral(m) => m.keys().copied().collect(),
        }
    }
}

/// Run every scenario `curves` serves with the standard policy.
pub fn simulate(spec: &ProductSpec, curves: &dyn CurveSource) -> Result<RunResult, SimError> {
    simulate_with(spec, curves, &StandardPolicy::new(), &CancelToken::new())
}

pub fn simulate_with(
    spec: &ProductSpec,
    curves: &dyn CurveSource,
    policy: &dyn WaterfallPolicy,
    cancel: &CancelToken,
) -> Result<RunResult, SimError> {
    spec.validate()?;
    let tenor = spec.tenor_months() as usize;
    let inputs = materialise(curves, tenor)?;

    match spec {
        ProductSpec::Buckets(config) => {
            let results = inputs
                .par_iter()
                .map(|(scenario, c)| {
                    debug!(%scenario, tenor, "bucket scenario start");
                    let result = run_buckets(config, c, policy, cancel)?;
                    info!(
                        %scenario,
                        decision = %result.aggregated.decision,
                        final_value = result.aggregated.metrics.final_value.net,
                        "bucket scenario finished"
                    );
                    Ok((*scenario, result))
                })
                .collect::<Result<Vec<_>, SimError>>()?;
            Ok(RunResult::Buckets(results.into_iter().collect()))
        }
        ProductSpec::Collateral(config) => {
            let results = inputs
                .par_iter()
                .map(|(scenario, c)| {
                    debug!(%scenario, tenor, "collateral scenario start");
                    let result = run_collateral(config, c, cancel)?;
                    info!(
                        %scenario,
                        final_ltv = result.summary.final_ltv,
                        liquidation_risk_months = result.summary.liquidation_risk_months,
                        "collateral scenario finished"
                    );
                    Ok((*scenario, result))
                })
                .collect::<Result<Vec<_>, SimError>>()?;
            Ok(RunResult::Collateral(results.into_iter().collect()))
        }
    }
}

/// Pull and check every scenario's curves before any month runs.
fn materialise(source: &dyn CurveSource, tenor: usize) -> Result<Vec<(Scenario, ScenarioCurves)>, CurveError> {
    let mut scenarios = source.scenarios();
    scenarios.sort();
    scenarios.dedup();
    if scenarios.is_empty() {
        return Err(CurveError::EmptyScenarioSet);
    }
    scenarios
        .into_iter()
        .map(|scenario| {
            let curves = source.curves(scenario)?;
            curves.validate(scenario, tenor)?;
            Ok((scenario, curves))
        })
        .collect()
}

pub fn run_buckets(
    config: &ProductConfig,
    curves: &ScenarioCurves,
    policy: &dyn WaterfallPolicy,
    cancel: &CancelToken,
) -> Result<BucketScenarioResult, SimError> {
    let tenor = config.tenor_months;
    let gross = config.gross_amounts();
    let (net, upfront) = apply_upfront(gross, config.capital_raised, config.commercial.upfront_pct);

    let accrual = YieldAccrual::new(&config.yield_bucket, net.yield_bucket);
    let mining = MiningWaterfallEngine::new(&config.mining_bucket, net.mining, policy);
    let mut overlay = CommercialOverlay::new(config.commercial, upfront);
    let mut aggregation = AggregationEngine::new(config.capital_raised, &config.early_close, tenor as usize);

    let mut yield_state = accrual.initial_state();
    let mut holding = HoldingTracker::from_config(&config.holding_bucket, net.holding, net.mining);
    let mut waterfall_state = mining.initial_state();

    let mut yield_months = Vec::with_capacity(tenor as usize);
    let mut holding_months = Vec::with_capacity(tenor as usize);
    let mut waterfall = Vec::with_capacity(tenor as usize);

    for (month, (&price, &hashprice)) in (0..tenor).zip(curves.prices.iter().zip(&curves.hashprice)) {
        cancel.check()?;

        let (ys, ym) = accrual.step(yield_state, month);
        yield_state = ys;

        // Bonus reflects strikes from earlier months only.
        let input = MonthInputs {
            month,
            price,
            hashprice,
            bonus_active: holding.struck,
        };
        let (ws, wm) = mining.step(waterfall_state, input);
        waterfall_state = ws;

        let (hs, hm) = HoldingTracker::step(holding, month, price);
        holding = hs;

        let aum = ym.bucket_value + hm.value + wm.bucket_value;
        let management_fee = overlay.accrue_management(aum);
        aggregation.record(
            MonthView {
                yield_month: &ym,
                holding_month: &hm,
                mining_month: &wm,
            },
            management_fee,
        );

        yield_months.push(ym);
        holding_months.push(hm);
        waterfall.push(wm);
    }

    let final_price = curves.prices.get(tenor.saturating_sub(1) as usize).copied().unwrap_or(0.0);
    let yield_summary = accrual.summarize(&yield_state, tenor);
    let holding_summary = HoldingTracker::summarize(&holding, net.holding, final_price);
    let mining_summary = mining.summarize(&waterfall_state, final_price);

    let performance_fee = overlay.performance_fee(mining_summary.final_value, gross.mining);
    let fees = overlay.finish(performance_fee);
    let decision_inputs = DecisionInputs {
        deficit_months: mining_summary.deficit_months,
        total_months: mining_summary.months,
        mean_coverage_ratio: mining_summary.mean_coverage_ratio,
        mean_yield_fulfillment: mining_summary.mean_yield_fulfillment,
        final_health_score: mining_summary.final_health_score,
    };
    let aggregated = aggregation.finish(&decision_inputs, fees);

    Ok(BucketScenarioResult {
        yield_summary,
        yield_months,
        holding_summary,
        holding_months,
        mining_summary,
        waterfall,
        aggregated,
    })
}

pub fn run_collateral(
    config: &CollateralConfig,
    curves: &ScenarioCurves,
    cancel: &CancelToken,
) -> Result<CollateralScenarioResult, SimError> {
    let tenor = config.tenor_months;
    let engine = CollateralEngine::new(config);
    let (mut state, opening) = engine.open();
    let mut months = Vec::with_capacity(tenor as usize);

    for (month, (&price, &hashprice)) in (0..tenor).zip(curves.prices.iter().zip(&curves.hashprice)) {
        cancel.check()?;
        let (next, record) = engine.step(state, month, price, hashprice);
        state = next;
        months.push(record);
    }

    let final_price = curves.prices.get(tenor.saturating_sub(1) as usize).copied().unwrap_or(0.0);
    let (summary, strikes, strike_events) = engine.summarize(state, opening, final_price);
    Ok(CollateralScenarioResult {
        months,
        summary,
        strikes,
        strike_events,
    })
}
