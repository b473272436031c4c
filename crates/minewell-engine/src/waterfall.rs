//! Mining bucket waterfall.
//!
//! Each month's output is allocated in strict priority order:
//!
//! 1. **Cost**: sell output to meet operating cost, drawing any shortfall
//!    from the capitalization reserve through the policy.
//! 2. **Yield**: pay `allocation × applied_rate / 12`, from remaining output
//!    first, then topping up from the reserve. No yield is paid in a deficit
//!    month.
//! 3. **Retention**: everything left joins the reserve.
//!
//! The take-profit ladder then runs against the reserve.
//!
//! [`MiningWaterfallEngine::step`] is a pure transition: it consumes the
//! previous [`WaterfallState`] and returns the next one plus the month's
//! record, so a scenario is a fold over its months.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use minewell_core::config::MiningBucketConfig;
use minewell_core::constants::{DEFICIT_COVERAGE_THRESHOLD, MONTHS_PER_YEAR, RATIO_CEILING};
use minewell_core::numeric::{StableSum, ratio_or};
use minewell_core::traits::WaterfallPolicy;

use crate::ladder::{Ladder, LadderEntry};
use crate::production::ProductionModel;

/// Exogenous inputs for one month.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthInputs {
    pub month: u32,
    pub price: f64,
    pub hashprice: f64,
    /// Whether the holding target was struck in an earlier month.
    pub bonus_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyWaterfallRecord {
    pub month: u32,
    pub price: f64,
    pub quantity_produced: f64,
    /// Operating cost in cash.
    pub operating_cost: f64,
    /// Operating cost converted to asset quantity at spot.
    pub cost_quantity: f64,
    pub sold_for_cost: f64,
    pub reserve_draw_for_cost: f64,
    pub allocated_to_yield: f64,
    pub reserve_draw_for_yield: f64,
    pub applied_yield_rate: f64,
    pub yield_target: f64,
    pub yield_paid: f64,
    pub retained: f64,
    pub reserve_quantity: f64,
    pub reserve_value: f64,
    pub take_profit_quantity: f64,
    pub take_profit_proceeds: f64,
    /// Cumulative take-profit cash held by the bucket.
    pub take_profit_cash: f64,
    pub coverage_ratio: f64,
    pub yield_fulfillment: f64,
    pub health_score: f64,
    pub deficit: bool,
    /// Reserve at spot plus take-profit cash.
    pub bucket_value: f64,
}

/// State carried from one month to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallState {
    pub reserve_quantity: f64,
    pub take_profit_cash: StableSum,
    pub yield_paid: StableSum,
    pub produced: StableSum,
    pub coverage: StableSum,
    pub fulfillment: StableSum,
    pub deficit_months: u32,
    pub months: u32,
    pub last_health: f64,
    pub ladder: Ladder,
}

impl WaterfallState {
    pub fn deficit_ratio(&self) -> f64 {
        ratio_or(f64::from(self.deficit_months), f64::from(self.months), 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningSummary {
    pub allocation: f64,
    pub months: u32,
    pub total_produced: f64,
    pub total_yield_paid: f64,
    pub final_reserve_quantity: f64,
    pub final_reserve_value: f64,
    pub take_profit_cash: f64,
    pub final_value: f64,
    pub deficit_months: u32,
    pub mean_coverage_ratio: f64,
    pub mean_yield_fulfillment: f64,
    pub final_health_score: f64,
    pub take_profit_ladder: Vec<LadderEntry>,
}

pub struct MiningWaterfallEngine<'a> {
    production: ProductionModel,
    allocation: f64,
    base_apr: f64,
    bonus_apr: f64,
    ladder: Ladder,
    policy: &'a dyn WaterfallPolicy,
}

impl<'a> MiningWaterfallEngine<'a> {
    /// `allocation` is the bucket's cash allocation after upfront fees.
    pub fn new(config: &MiningBucketConfig, allocation: f64, policy: &'a dyn WaterfallPolicy) -> Self {
        Self {
            production: ProductionModel::new(&config.fleet),
            allocation,
            base_apr: config.base_yield_apr,
            bonus_apr: config.bonus_yield_apr,
            ladder: Ladder::new(&config.take_profit_ladder),
            policy,
        }
    }

    pub fn initial_state(&self) -> WaterfallState {
        WaterfallState {
            reserve_quantity: 0.0,
            take_profit_cash: StableSum::new(),
            yield_paid: StableSum::new(),
            produced: StableSum::new(),
            coverage: StableSum::new(),
            fulfillment: StableSum::new(),
            deficit_months: 0,
            months: 0,
            last_health: 0.0,
            ladder: self.ladder.clone(),
        }
    }

    pub fn applied_rate(&self, bonus_active: bool) -> f64 {
        if bonus_active {
            self.base_apr + self.bonus_apr
        } else {
            self.base_apr
        }
    }

    /// Advance one month.
    pub fn step(
        &self,
        mut state: WaterfallState,
        input: MonthInputs,
    ) -> (WaterfallState, MonthlyWaterfallRecord) {
        let price = input.price;
        let prod = self.production.month(input.hashprice, price);
        let produced = prod.quantity;
        let operating_cost = prod.total_cost();
        let cost_quantity = prod.cost_quantity(price);

        // 1. cost
        let sold_for_cost = produced.min(cost_quantity);
        let reserve_draw_for_cost = self
            .policy
            .reserve_draw(state.reserve_quantity, cost_quantity - sold_for_cost);
        state.reserve_quantity = (state.reserve_quantity - reserve_draw_for_cost).max(0.0);
        let deficit = produced + reserve_draw_for_cost < DEFICIT_COVERAGE_THRESHOLD * cost_quantity;
        let mut remaining = produced - sold_for_cost;

        // 2. yield
        let applied_yield_rate = self.applied_rate(input.bonus_active);
        let yield_target = self.allocation * applied_yield_rate / MONTHS_PER_YEAR;
        let target_quantity = ratio_or(yield_target, price, 0.0);
        let (allocated_to_yield, reserve_draw_for_yield) = if deficit {
            (0.0, 0.0)
        } else {
            let from_output = remaining.min(target_quantity);
            remaining -= from_output;
            let top_up = self
                .policy
                .reserve_draw(state.reserve_quantity, target_quantity - from_output);
            state.reserve_quantity = (state.reserve_quantity - top_up).max(0.0);
            (from_output, top_up)
        };
        let yield_paid = (allocated_to_yield + reserve_draw_for_yield) * price;
        let yield_fulfillment = if deficit {
            if yield_target > 0.0 { 0.0 } else { 1.0 }
        } else {
            ratio_or(allocated_to_yield + reserve_draw_for_yield, target_quantity, 1.0).min(1.0)
        };

        // 3. retention
        let retained = remaining.max(0.0);
        state.reserve_quantity += retained;

        // take-profit
        let fills = state.ladder.fire(input.month, price, state.reserve_quantity);
        let mut take_profit_quantity = 0.0;
        let mut take_profit_proceeds = 0.0;
        for fill in &fills {
            take_profit_quantity += fill.quantity;
            take_profit_proceeds += fill.proceeds;
            state.take_profit_cash.add(fill.proceeds);
            info!(
                month = input.month,
                price,
                quantity = fill.quantity,
                proceeds = fill.proceeds,
                "take-profit rung fired"
            );
        }
        state.reserve_quantity = (state.reserve_quantity - take_profit_quantity).max(0.0);

        let coverage_ratio = ratio_or(produced * price, operating_cost, RATIO_CEILING);
        let health_score = self.policy.health_score(coverage_ratio, yield_fulfillment);

        if deficit {
            state.deficit_months += 1;
            warn!(
                month = input.month,
                produced,
                cost_quantity,
                reserve_draw = reserve_draw_for_cost,
                "mining deficit month"
            );
        }
        state.months += 1;
        state.produced.add(produced);
        state.yield_paid.add(yield_paid);
        state.coverage.add(coverage_ratio);
        state.fulfillment.add(yield_fulfillment);
        state.last_health = health_score;

        let reserve_value = state.reserve_quantity * price;
        let take_profit_cash = state.take_profit_cash.value();
        let record = MonthlyWaterfallRecord {
            month: input.month,
            price,
            quantity_produced: produced,
            operating_cost,
            cost_quantity,
            sold_for_cost,
            reserve_draw_for_cost,
            allocated_to_yield,
            reserve_draw_for_yield,
            applied_yield_rate,
            yield_target,
            yield_paid,
            retained,
            reserve_quantity: state.reserve_quantity,
            reserve_value,
            take_profit_quantity,
            take_profit_proceeds,
            take_profit_cash,
            coverage_ratio,
            yield_fulfillment,
            health_score,
            deficit,
            bucket_value: reserve_value + take_profit_cash,
        };
        (state, record)
    }

    pub fn summarize(&self, state: &WaterfallState, final_price: f64) -> MiningSummary {
        let months = f64::from(state.months);
        let final_reserve_value = state.reserve_quantity * final_price;
        let take_profit_cash = state.take_profit_cash.value();
        MiningSummary {
            allocation: self.allocation,
            months: state.months,
            total_produced: state.produced.value(),
            total_yield_paid: state.yield_paid.value(),
            final_reserve_quantity: state.reserve_quantity,
            final_reserve_value,
            take_profit_cash,
            final_value: final_reserve_value + take_profit_cash,
            deficit_months: state.deficit_months,
            mean_coverage_ratio: ratio_or(state.coverage.value(), months, 0.0),
            mean_yield_fulfillment: ratio_or(state.fulfillment.value(), months, 0.0),
            final_health_score: state.last_health,
            take_profit_ladder: state.ladder.entries().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::StandardPolicy;
    use minewell_core::config::fixtures::product;
    use minewell_core::types::LadderRung;
    use proptest::prelude::*;

    const HP: f64 = 0.000_5;

    fn config() -> MiningBucketConfig {
        product().mining_bucket
    }

    fn input(month: u32, price: f64) -> MonthInputs {
        MonthInputs {
            month,
            price,
            hashprice: HP,
            bonus_active: false,
        }
    }

    fn run(
        engine: &MiningWaterfallEngine<'_>,
        inputs: impl IntoIterator<Item = MonthInputs>,
    ) -> (WaterfallState, Vec<MonthlyWaterfallRecord>) {
        let mut state = engine.initial_state();
        let mut records = Vec::new();
        for i in inputs {
            let (next, rec) = engine.step(state, i);
            state = next;
            records.push(rec);
        }
        (state, records)
    }

    #[test]
    fn healthy_month_pays_full_yield_and_retains() {
        let policy = StandardPolicy::new();
        let engine = MiningWaterfallEngine::new(&config(), 4_000_000.0, &policy);
        let (_, rec) = engine.step(engine.initial_state(), input(0, 100_000.0));

        assert!(!rec.deficit);
        assert_eq!(rec.sold_for_cost, rec.cost_quantity);
        assert!((rec.yield_target - 4_000_000.0 * 0.08 / 12.0).abs() < 1e-6);
        assert!((rec.yield_paid - rec.yield_target).abs() < 1e-6);
        assert_eq!(rec.yield_fulfillment, 1.0);
        let balance = rec.sold_for_cost + rec.allocated_to_yield + rec.retained;
        assert!((balance - rec.quantity_produced).abs() < 1e-12);
        assert_eq!(rec.reserve_quantity, rec.retained);
    }

    #[test]
    fn shortfall_drawn_from_reserve_avoids_deficit() {
        let policy = StandardPolicy::new();
        let engine = MiningWaterfallEngine::new(&config(), 4_000_000.0, &policy);
        let mut state = engine.initial_state();
        state.reserve_quantity = 100.0;
        // Price low enough that output does not cover cost.
        let (state, rec) = engine.step(state, input(0, 20_000.0));
        assert!(rec.sold_for_cost < rec.cost_quantity);
        assert!((rec.reserve_draw_for_cost - (rec.cost_quantity - rec.sold_for_cost)).abs() < 1e-12);
        assert!(!rec.deficit);
        assert!(rec.reserve_draw_for_yield > 0.0);
        assert!(state.reserve_quantity < 100.0);
    }

    #[test]
    fn empty_reserve_and_low_output_flags_deficit_without_yield() {
        let policy = StandardPolicy::new();
        let engine = MiningWaterfallEngine::new(&config(), 4_000_000.0, &policy);
        let (state, rec) = engine.step(engine.initial_state(), input(0, 20_000.0));
        assert!(rec.deficit);
        assert_eq!(rec.yield_paid, 0.0);
        assert_eq!(rec.yield_fulfillment, 0.0);
        assert_eq!(rec.retained, 0.0);
        assert_eq!(state.deficit_months, 1);
        assert!(rec.coverage_ratio < 0.95);
    }

    #[test]
    fn bonus_raises_applied_rate() {
        let policy = StandardPolicy::new();
        let engine = MiningWaterfallEngine::new(&config(), 4_000_000.0, &policy);
        let mut i = input(0, 100_000.0);
        i.bonus_active = true;
        let (_, rec) = engine.step(engine.initial_state(), i);
        assert!((rec.applied_yield_rate - 0.12).abs() < 1e-12);
    }

    #[test]
    fn take_profit_fires_once_and_keeps_cash() {
        let mut cfg = config();
        cfg.take_profit_ladder = vec![LadderRung {
            price_trigger: 150_000.0,
            sell_fraction: 0.5,
        }];
        let policy = StandardPolicy::new();
        let engine = MiningWaterfallEngine::new(&cfg, 4_000_000.0, &policy);
        let prices = [100_000.0, 100_000.0, 160_000.0, 170_000.0];
        let (state, records) = run(
            &engine,
            prices.iter().enumerate().map(|(m, &p)| input(m as u32, p)),
        );
        assert_eq!(records[1].take_profit_quantity, 0.0);
        assert!(records[2].take_profit_quantity > 0.0);
        assert_eq!(records[3].take_profit_quantity, 0.0);
        let entry = state.ladder.entries()[0];
        assert_eq!(entry.trigger_month, Some(2));
        assert!((records[3].take_profit_cash - entry.proceeds).abs() < 1e-6);
        assert!(
            (records[3].bucket_value - (records[3].reserve_value + entry.proceeds)).abs() < 1e-6
        );
    }

    #[test]
    fn summary_means_and_health() {
        let policy = StandardPolicy::new();
        let engine = MiningWaterfallEngine::new(&config(), 4_000_000.0, &policy);
        let (state, records) = run(&engine, (0..12).map(|m| input(m, 100_000.0)));
        let s = engine.summarize(&state, 100_000.0);
        assert_eq!(s.months, 12);
        assert_eq!(s.deficit_months, 0);
        assert!((s.mean_coverage_ratio - records[0].coverage_ratio).abs() < 1e-9);
        assert_eq!(s.final_health_score, records[11].health_score);
        assert!((s.final_value - records[11].bucket_value).abs() < 1e-6);
    }

    #[test]
    fn forty_thousand_output_against_fifty_thousand_cost_is_deficit() {
        let policy = StandardPolicy::new();
        let price = 100_000.0;
        let mut cfg = config();
        cfg.fleet.miner_count = 1;

        // Hash-price that yields 0.4 units (40,000 at spot) for this fleet.
        let per_unit_hp = ProductionModel::new(&cfg.fleet).month(1.0, price).quantity;
        let hashprice = 0.4 / per_unit_hp;
        // Lift the hosting fee until total cost reaches 50,000.
        let base_cost = ProductionModel::new(&cfg.fleet).month(hashprice, price).total_cost();
        cfg.fleet.hosting.hosting_fee_per_kw_month +=
            (50_000.0 - base_cost) / cfg.fleet.fleet_power_kw();

        let engine = MiningWaterfallEngine::new(&cfg, 0.0, &policy);
        let (_, rec) = engine.step(
            engine.initial_state(),
            MonthInputs { month: 0, price, hashprice, bonus_active: false },
        );
        assert!((rec.operating_cost - 50_000.0).abs() < 1e-6);
        assert!((rec.quantity_produced * price - 40_000.0).abs() < 1e-6);
        assert!((rec.coverage_ratio - 0.8).abs() < 1e-9);
        assert!(rec.deficit);
    }

    proptest! {
        #[test]
        fn deficit_iff_covered_below_threshold(
            prices in proptest::collection::vec(5_000.0f64..250_000.0, 1..48),
            hp in 0.0f64..0.002,
            draw_fraction in 0.0f64..=1.0,
        ) {
            let policy = StandardPolicy::new().with_max_draw_fraction(draw_fraction);
            let engine = MiningWaterfallEngine::new(&config(), 4_000_000.0, &policy);
            let mut state = engine.initial_state();
            for (m, &price) in prices.iter().enumerate() {
                let (next, rec) = engine.step(state, MonthInputs {
                    month: m as u32, price, hashprice: hp, bonus_active: false,
                });
                state = next;
                let covered = rec.quantity_produced + rec.reserve_draw_for_cost;
                prop_assert_eq!(rec.deficit, covered < 0.95 * rec.cost_quantity);
                prop_assert!(rec.reserve_quantity >= 0.0);
                prop_assert!(rec.retained >= 0.0);
                prop_assert!(rec.quantity_produced >= 0.0);
                prop_assert!((0.0..=100.0).contains(&rec.health_score));
                prop_assert!(rec.yield_fulfillment <= 1.0);
            }
        }
    }
}
