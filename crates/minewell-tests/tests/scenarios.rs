//! Worked examples run end to end.
//!
//! Each test builds a concrete product and market path whose outcome can be
//! reasoned out by hand, runs it through `simulate` and checks the headline
//! figures.

use minewell_core::config::fixtures::{collateral, fleet, product};
use minewell_core::config::{AprScheduleEntry, CloseCheckFrequency, ProductSpec};
use minewell_core::curves::CurveSet;
use minewell_core::error::{ConfigError, CurveError, SimError};
use minewell_core::scenario::Scenario;
use minewell_core::types::LadderRung;
use minewell_engine::aggregation::Decision;
use minewell_engine::policy::StandardPolicy;
use minewell_engine::production::ProductionModel;
use minewell_engine::simulate::simulate;
use minewell_engine::waterfall::{MiningWaterfallEngine, MonthInputs};
use minewell_tests::helpers::{
    BASE_HASHPRICE, flat, from_prices, linear_path, run_buckets, run_collateral, three_scenarios, uniform,
};

const MONTHS: usize = 36;

// ---------------------------------------------------------------------------
// Holding target
// ---------------------------------------------------------------------------

#[test]
fn ten_million_thirty_thirty_forty_targets_two_hundred_ten_thousand() {
    let results = run_buckets(&product(), &three_scenarios(MONTHS));
    let h = &results[&Scenario::Base].holding_summary;
    assert!((h.quantity - 33.333_333).abs() < 1e-5);
    assert!((h.target_sell_price - 210_000.0).abs() < 1e-6);
}

#[test]
fn bull_rally_strikes_holding_and_bumps_mining_yield() {
    let results = run_buckets(&product(), &three_scenarios(MONTHS));
    let bull = &results[&Scenario::Bull];
    let strike = bull.holding_summary.strike_month.expect("bull path crosses 210k");
    assert!(bull.holding_summary.realized_value.unwrap() >= 7_000_000.0 - 1e-6);
    assert!((bull.waterfall[strike as usize].applied_yield_rate - 0.08).abs() < 1e-12);
    assert!((bull.waterfall[strike as usize + 1].applied_yield_rate - 0.12).abs() < 1e-12);

    // Bear never gets near the target.
    let bear = &results[&Scenario::Bear];
    assert!(!bear.holding_summary.struck);
    assert!(bear.waterfall.iter().all(|m| m.applied_yield_rate == 0.08));
}

#[test]
fn partial_reconstitution_still_bumps_and_ladders_the_rest() {
    let mut config = product();
    config.holding_bucket.capital_recon_pct = 70.0;
    config.holding_bucket.extra_yield_strikes = vec![
        LadderRung { price_trigger: 120_000.0, sell_fraction: 0.5 },
        LadderRung { price_trigger: 150_000.0, sell_fraction: 0.5 },
    ];
    let results = run_buckets(&config, &three_scenarios(MONTHS));
    let bull = &results[&Scenario::Bull];
    let h = &bull.holding_summary;
    assert!((h.target_sell_price - 210_000.0).abs() < 1e-6);
    assert!((h.recon_quantity + h.extra_yield_quantity - h.quantity).abs() < 1e-12);

    let strike = h.strike_month.expect("bull path crosses 210k");
    assert!((bull.waterfall[strike as usize + 1].applied_yield_rate - 0.12).abs() < 1e-12);
    assert!((h.realized_value.unwrap() - h.recon_quantity * bull.holding_months[strike as usize].price).abs() < 1e-6);

    let fired: Vec<u32> = h.extra_yield_strikes.iter().filter_map(|e| e.trigger_month).collect();
    assert_eq!(fired.len(), 2);
    assert!(fired[0] <= fired[1]);
    let ladder_cash: f64 = bull.holding_months.iter().map(|m| m.extra_yield_this_month).sum();
    assert!((ladder_cash - h.extra_yield_total).abs() < 1e-6);
    assert!((h.final_value - h.realized_value.unwrap() - h.extra_yield_total).abs() < 1e-6);

    // Base never reaches 150k, so only the first rung sells.
    let base = &results[&Scenario::Base].holding_summary;
    assert!(!base.struck);
    assert_eq!(base.extra_yield_strikes.iter().filter(|e| e.fired).count(), 1);
}

#[test]
fn upfront_fee_lowers_target_basis_proportionally() {
    let mut config = product();
    config.commercial.upfront_pct = 2.0;
    let results = run_buckets(&config, &three_scenarios(MONTHS));
    let h = &results[&Scenario::Base].holding_summary;
    // 2% off every bucket: 2.94M holding, 3.92M mining.
    assert!((h.allocation - 2_940_000.0).abs() < 1e-6);
    assert!((h.target_sell_price - 6_860_000.0 / h.quantity).abs() < 1e-6);
    assert!((h.target_sell_price - 210_000.0).abs() < 1e-6);
    let fees = &results[&Scenario::Base].aggregated.fees;
    assert_eq!(fees.upfront.total, 200_000.0);
}

// ---------------------------------------------------------------------------
// Mining waterfall
// ---------------------------------------------------------------------------

#[test]
fn forty_thousand_of_output_against_fifty_thousand_of_cost_is_deficit() {
    let config = product();
    let model = ProductionModel::new(&config.mining_bucket.fleet);
    let unit = model.month(BASE_HASHPRICE, 1.0);
    // Price at which output is worth exactly 80% of cost.
    let price = 0.8 * unit.total_cost() / unit.quantity;

    let policy = StandardPolicy::new();
    let engine = MiningWaterfallEngine::new(&config.mining_bucket, 4_000_000.0, &policy);
    let (state, rec) = engine.step(
        engine.initial_state(),
        MonthInputs {
            month: 0,
            price,
            hashprice: BASE_HASHPRICE,
            bonus_active: false,
        },
    );
    assert!((rec.coverage_ratio - 0.8).abs() < 1e-9);
    assert!(rec.deficit);
    assert_eq!(rec.yield_paid, 0.0);
    assert_eq!(rec.retained, 0.0);
    assert_eq!(state.deficit_months, 1);
}

#[test]
fn healthy_fleet_is_approved() {
    let results = run_buckets(&product(), &uniform(flat(100_000.0, BASE_HASHPRICE, MONTHS)));
    let r = &results[&Scenario::Base];
    assert_eq!(r.mining_summary.deficit_months, 0);
    assert!(r.mining_summary.mean_coverage_ratio > 1.5);
    assert!((r.mining_summary.mean_yield_fulfillment - 1.0).abs() < 1e-12);
    assert_eq!(r.aggregated.decision, Decision::Approved);
    // Mining yield is 8% of 4M, paid monthly in full.
    assert!((r.mining_summary.total_yield_paid - 4_000_000.0 * 0.08 * 3.0).abs() < 1e-3);
}

#[test]
fn collapsing_hashprice_blocks_subscriptions() {
    let results = run_buckets(&product(), &uniform(flat(60_000.0, 0.000_2, MONTHS)));
    let r = &results[&Scenario::Bear];
    assert_eq!(r.mining_summary.deficit_months, MONTHS as u32);
    assert_eq!(r.aggregated.decision, Decision::Blocked);
    assert_eq!(r.aggregated.decision_reasons.len(), 4);
}

#[test]
fn take_profit_ladder_moves_reserve_into_cash() {
    let mut config = product();
    config.mining_bucket.take_profit_ladder = vec![
        LadderRung {
            price_trigger: 150_000.0,
            sell_fraction: 0.5,
        },
        LadderRung {
            price_trigger: 120_000.0,
            sell_fraction: 0.25,
        },
    ];
    let curves = uniform(from_prices(&linear_path(90_000.0, 180_000.0, MONTHS), BASE_HASHPRICE));
    let r = &run_buckets(&config, &curves)[&Scenario::Base];
    let ladder = &r.mining_summary.take_profit_ladder;
    assert_eq!(ladder[0].price_trigger, 120_000.0);
    assert!(ladder.iter().all(|e| e.fired));
    assert!(ladder[0].trigger_month < ladder[1].trigger_month);
    let cash: f64 = ladder.iter().map(|e| e.proceeds).sum();
    assert!((r.mining_summary.take_profit_cash - cash).abs() < 1e-6);
    assert!(
        (r.mining_summary.final_value
            - (r.mining_summary.final_reserve_value + r.mining_summary.take_profit_cash))
            .abs()
            < 1e-6
    );
}

// ---------------------------------------------------------------------------
// Aggregation, early close and fees
// ---------------------------------------------------------------------------

#[test]
fn generous_schedule_closes_early_at_quarter_end() {
    let mut config = product();
    // 40% APR on 3M is 100k a month. With mining yield the 36% target is
    // crossed in month 29, so the tenth quarter end is the first to pass.
    config.yield_bucket.schedule = vec![AprScheduleEntry {
        from_month: 0,
        to_month: 35,
        apr: 0.40,
    }];
    let r = &run_buckets(&config, &uniform(flat(100_000.0, BASE_HASHPRICE, MONTHS)))[&Scenario::Base];
    let close = r.aggregated.early_close;
    assert!(close.triggered);
    let month = close.close_month.unwrap();
    assert_eq!((month + 1) % 3, 0);
    assert!(r.aggregated.months[month as usize].cumulative_yield_pct >= 36.0);
    assert!(r.aggregated.months[month as usize - 3].cumulative_yield_pct < 36.0);
    assert_eq!(close.close_quarter, Some((month + 1) / 3));
    assert_eq!(r.aggregated.metrics.effective_tenor_months, month + 1);
    // The run itself still covers the full tenor.
    assert_eq!(r.aggregated.metrics.simulated_months, MONTHS as u32);
}

#[test]
fn monthly_checks_close_no_later_than_quarterly() {
    let mut quarterly = product();
    quarterly.early_close.target_pct = 10.0;
    let mut monthly = quarterly.clone();
    monthly.early_close.frequency = CloseCheckFrequency::Monthly;
    let curves = uniform(flat(100_000.0, BASE_HASHPRICE, MONTHS));
    let q = run_buckets(&quarterly, &curves)[&Scenario::Base].aggregated.early_close;
    let m = run_buckets(&monthly, &curves)[&Scenario::Base].aggregated.early_close;
    assert!(m.close_month.unwrap() <= q.close_month.unwrap());
}

#[test]
fn gross_and_net_differ_by_fees() {
    let mut config = product();
    config.commercial.upfront_pct = 1.0;
    config.commercial.management_pct = 1.5;
    config.commercial.performance_pct = 20.0;
    let r = &run_buckets(&config, &uniform(flat(100_000.0, BASE_HASHPRICE, MONTHS)))[&Scenario::Base];
    let fees = &r.aggregated.fees;
    let metrics = &r.aggregated.metrics;
    assert_eq!(fees.management_monthly.len(), MONTHS);
    assert!(fees.management_total > 0.0);
    let last = r.aggregated.months.last().unwrap();
    let bucket_sum = last.yield_value + last.holding_value + last.mining_value;
    assert_eq!(metrics.final_value.gross, bucket_sum);
    let expected_gap = fees.management_total + fees.performance_fee;
    assert!((metrics.final_value.gross - metrics.final_value.net - expected_gap).abs() < 1e-6);
    assert!(metrics.total_return_pct.gross > metrics.total_return_pct.net);
    assert!(metrics.capital_preservation_ratio.gross > metrics.capital_preservation_ratio.net);
}

#[test]
fn upfront_fee_only_reduces_starting_allocations() {
    let mut config = product();
    config.commercial.upfront_pct = 2.0;
    let r = &run_buckets(&config, &uniform(flat(100_000.0, BASE_HASHPRICE, MONTHS)))[&Scenario::Base];
    let metrics = &r.aggregated.metrics;
    assert_eq!(r.aggregated.fees.upfront.total, 200_000.0);
    assert_eq!(metrics.final_value.gross, r.aggregated.months.last().unwrap().total_value);
    assert_eq!(metrics.final_value.gross, metrics.final_value.net);
    let years = MONTHS as f64 / 12.0;
    let expected_apr = metrics.total_yield_paid / metrics.capital_raised / years;
    assert!((metrics.effective_apr - expected_apr).abs() < 1e-12);
}

#[test]
fn aum_view_tracks_holding_and_reserve_quantity() {
    let r = &run_buckets(&product(), &uniform(flat(100_000.0, BASE_HASHPRICE, MONTHS)))[&Scenario::Base];
    let last = r.aggregated.aum.last().unwrap();
    let expected = r.holding_summary.quantity + r.mining_summary.final_reserve_quantity;
    assert!((last.total_quantity - expected).abs() < 1e-9);
    assert!(r.aggregated.aum_summary.peak_quantity >= last.total_quantity);
}

// ---------------------------------------------------------------------------
// Collateral mode
// ---------------------------------------------------------------------------

#[test]
fn collateral_strike_repays_debt_and_raises_yield() {
    let mut config = collateral();
    config.strike_ladder = vec![LadderRung {
        price_trigger: 150_000.0,
        sell_fraction: 0.3,
    }];
    let curves = uniform(from_prices(&linear_path(90_000.0, 200_000.0, MONTHS), BASE_HASHPRICE));
    let r = &run_collateral(&config, &curves)[&Scenario::Base];

    assert_eq!(r.summary.strikes_fired, 1);
    assert_eq!(r.summary.strikes_total, 1);
    let event = r.strike_events[0];
    assert!(event.price >= 150_000.0);
    assert!(event.debt_repaid > 0.0);
    let month = event.month as usize;
    assert!(r.months[month].ltv <= r.months[month].ltv_pre_strike);
    assert!((r.months[month + 1].applied_yield_rate - 0.12).abs() < 1e-12);
    assert!((r.months[month].applied_yield_rate - 0.08).abs() < 1e-12);
    assert_eq!(r.summary.opening.capex_shortfall, 0.0);
}

#[test]
fn collateral_crash_flags_liquidation_risk_without_aborting() {
    let mut config = collateral();
    config.fleet.miner_count = 900;
    let curves = uniform(from_prices(&linear_path(90_000.0, 15_000.0, MONTHS), BASE_HASHPRICE));
    let r = &run_collateral(&config, &curves)[&Scenario::Bear];
    assert_eq!(r.months.len(), MONTHS);
    assert!(r.summary.liquidation_risk_months > 0);
    assert!(r.summary.max_ltv >= config.liquidation_ltv);
    assert!(r.summary.final_debt > 0.0);
}

#[test]
fn collateral_net_equity_identity_holds_every_month() {
    let config = collateral();
    let r = &run_collateral(&config, &three_scenarios(MONTHS))[&Scenario::Base];
    for m in &r.months {
        let equity = m.collateral_value - m.debt + m.reserve;
        assert!((m.net_equity - equity).abs() < 1e-6);
    }
}

// ---------------------------------------------------------------------------
// Input validation
// ---------------------------------------------------------------------------

#[test]
fn zero_buying_price_is_a_config_error() {
    let mut config = product();
    config.holding_bucket.buying_price = 0.0;
    let err = simulate(&ProductSpec::Buckets(config), &three_scenarios(MONTHS)).unwrap_err();
    assert!(matches!(err, SimError::Config(_)));
}

#[test]
fn allocations_must_sum_to_one_hundred() {
    let mut config = product();
    config.allocation.yield_pct = 31.0;
    let err = simulate(&ProductSpec::Buckets(config), &three_scenarios(MONTHS)).unwrap_err();
    assert!(matches!(err, SimError::Config(ConfigError::AllocationSum { .. })));
}

#[test]
fn curve_shorter_than_tenor_is_rejected() {
    let err = simulate(&ProductSpec::Buckets(product()), &three_scenarios(24)).unwrap_err();
    assert!(matches!(
        err,
        SimError::Curve(CurveError::InsufficientCoverage { need: 36, .. })
    ));
}

#[test]
fn non_positive_price_is_rejected() {
    let mut prices = vec![100_000.0; MONTHS];
    prices[7] = 0.0;
    let curves = CurveSet::new().with(Scenario::Base, from_prices(&prices, BASE_HASHPRICE));
    let err = simulate(&ProductSpec::Buckets(product()), &curves).unwrap_err();
    assert!(matches!(
        err,
        SimError::Curve(CurveError::InvalidPoint { month: 7, .. })
    ));
}

#[test]
fn single_miner_fleet_is_still_valid() {
    let mut config = collateral();
    config.fleet = fleet(1);
    let r = run_collateral(&config, &three_scenarios(MONTHS));
    assert_eq!(r.len(), 3);
}
