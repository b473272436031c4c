//! Collateralised product: hold the asset, borrow against it, mine into it.
//!
//! At inception post-fee capital buys collateral at the buying price (the
//! remainder, if any, is a cash reserve) and debt is drawn to buy the
//! fleet, capped at the maximum loan-to-value. Each month:
//!
//! 1. the reserve earns its yield;
//! 2. mined output joins the collateral;
//! 3. operating cost is met from that output, then the reserve, then new
//!    debt inside the max-LTV headroom; anything left is a cost shortfall;
//! 4. interest accrues on the debt;
//! 5. investor yield is paid from the reserve, then by selling collateral,
//!    until early close;
//! 6. loan-to-value is checked against the liquidation threshold;
//! 7. the strike ladder fires, repaying debt first and sending any surplus
//!    to the reserve. The first strike raises the investor yield rate from
//!    the next month on.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use minewell_core::config::CollateralConfig;
use minewell_core::constants::{FLOAT_REL_TOLERANCE, MONTHS_PER_YEAR, RATIO_CEILING};
use minewell_core::numeric::{StableSum, ratio_or};

use crate::aggregation::{EarlyClose, EarlyCloseTracker};
use crate::commercial::{CommercialOverlay, FeeBreakdown, GrossNet, UpfrontFee};
use crate::ladder::{Ladder, LadderEntry};
use crate::production::ProductionModel;

/// Debt over collateral value; [`RATIO_CEILING`] when debt has no backing.
pub fn loan_to_value(debt: f64, collateral_value: f64) -> f64 {
    if debt <= 0.0 {
        0.0
    } else {
        ratio_or(debt, collateral_value, RATIO_CEILING).min(RATIO_CEILING)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollateralOpening {
    pub capital_raised: f64,
    pub effective_capital: f64,
    pub collateral_purchased: f64,
    pub initial_reserve: f64,
    pub miner_capex: f64,
    pub debt_for_capex: f64,
    /// Capex the max-LTV ceiling left unfunded.
    pub capex_shortfall: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrikeStatus {
    #[serde(flatten)]
    pub entry: LadderEntry,
    pub debt_repaid: f64,
    pub surplus_to_reserve: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrikeEvent {
    pub month: u32,
    pub strike_price: f64,
    pub price: f64,
    pub quantity_sold: f64,
    pub proceeds: f64,
    pub debt_repaid: f64,
    pub surplus_to_reserve: f64,
    pub remaining_debt: f64,
    pub remaining_collateral: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralMonth {
    pub month: u32,
    pub price: f64,
    pub quantity_produced: f64,
    pub collateral_quantity: f64,
    pub collateral_value: f64,
    pub reserve: f64,
    pub debt: f64,
    pub reserve_yield: f64,
    pub operating_cost: f64,
    /// Output quantity sold to meet cost.
    pub cost_from_output: f64,
    pub cost_from_reserve: f64,
    pub minted_for_cost: f64,
    pub cost_shortfall: bool,
    pub interest: f64,
    pub management_fee: f64,
    pub applied_yield_rate: f64,
    pub yield_obligation: f64,
    pub yield_from_reserve: f64,
    pub yield_from_collateral: f64,
    pub yield_quantity_sold: f64,
    pub yield_paid: f64,
    pub yield_fulfillment: f64,
    pub cumulative_yield: f64,
    pub ltv_pre_strike: f64,
    pub ltv: f64,
    pub liquidation_risk: bool,
    pub strike_quantity: f64,
    pub strike_proceeds: f64,
    pub strike_debt_repaid: f64,
    pub net_equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollateralState {
    pub collateral_quantity: f64,
    pub debt: f64,
    pub reserve: f64,
    pub ltv: f64,
    pub liquidation_ltv: f64,
    pub bonus_active: bool,
    pub ladder: Ladder,
    pub strike_extras: Vec<(f64, f64)>,
    pub events: Vec<StrikeEvent>,
    pub early_close: EarlyCloseTracker,
    pub overlay: CommercialOverlay,
    pub totals: CollateralTotals,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CollateralTotals {
    pub produced: StableSum,
    pub operating_cost: StableSum,
    pub interest: StableSum,
    pub debt_repaid: StableSum,
    pub reserve_yield: StableSum,
    pub yield_paid: StableSum,
    pub liquidation_risk_months: u32,
    pub cost_shortfall_months: u32,
    pub months: u32,
    pub max_ltv: f64,
    pub min_ltv: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralSummary {
    pub opening: CollateralOpening,
    pub months: u32,
    pub final_collateral_quantity: f64,
    pub final_collateral_value: f64,
    pub final_debt: f64,
    pub final_reserve: f64,
    pub final_ltv: f64,
    pub max_ltv: f64,
    pub min_ltv: f64,
    pub net_equity: GrossNet,
    pub total_return_pct: GrossNet,
    pub total_produced: f64,
    pub total_operating_cost: f64,
    pub total_interest: f64,
    pub total_debt_repaid: f64,
    pub total_reserve_yield: f64,
    pub total_yield_paid: f64,
    pub effective_yield_apr: f64,
    pub liquidation_risk_months: u32,
    pub cost_shortfall_months: u32,
    pub strikes_fired: usize,
    pub strikes_total: usize,
    pub early_close: EarlyClose,
    pub fees: FeeBreakdown,
}

pub struct CollateralEngine<'a> {
    config: &'a CollateralConfig,
    production: ProductionModel,
}

impl<'a> CollateralEngine<'a> {
    pub fn new(config: &'a CollateralConfig) -> Self {
        Self {
            config,
            production: ProductionModel::new(&config.fleet),
        }
    }

    /// Buy collateral, set aside the reserve and borrow for the fleet.
    pub fn open(&self) -> (CollateralState, CollateralOpening) {
        let c = self.config;
        let upfront_total = c.capital_raised * c.commercial.upfront_pct / 100.0;
        let effective_capital = c.capital_raised - upfront_total;
        let collateral_capital = effective_capital * c.collateral_allocation_pct / 100.0;
        let initial_reserve = effective_capital - collateral_capital;
        let collateral_purchased = ratio_or(collateral_capital, c.buying_price, 0.0);

        let max_debt = collateral_purchased * c.buying_price * c.max_ltv;
        let miner_capex = c.fleet.fleet_value();
        let debt_for_capex = miner_capex.min(max_debt.max(0.0));
        let capex_shortfall = miner_capex - debt_for_capex;
        if capex_shortfall > 0.0 {
            warn!(miner_capex, debt_for_capex, capex_shortfall, "fleet capex exceeds borrowing headroom");
        }

        let upfront = UpfrontFee {
            total: upfront_total,
            ..Default::default()
        };
        let ladder = Ladder::new(&c.strike_ladder);
        let strike_extras = vec![(0.0, 0.0); ladder.entries().len()];
        let state = CollateralState {
            collateral_quantity: collateral_purchased,
            debt: debt_for_capex,
            reserve: initial_reserve,
            ltv: loan_to_value(debt_for_capex, collateral_purchased * c.buying_price),
            liquidation_ltv: c.liquidation_ltv,
            bonus_active: false,
            ladder,
            strike_extras,
            events: Vec::new(),
            early_close: EarlyCloseTracker::new(&c.early_close),
            overlay: CommercialOverlay::new(c.commercial, upfront),
            totals: CollateralTotals::default(),
        };
        let opening = CollateralOpening {
            capital_raised: c.capital_raised,
            effective_capital,
            collateral_purchased,
            initial_reserve,
            miner_capex,
            debt_for_capex,
            capex_shortfall,
        };
        (state, opening)
    }

    pub fn applied_rate(&self, bonus_active: bool) -> f64 {
        if bonus_active {
            self.config.base_yield_apr + self.config.bonus_yield_apr
        } else {
            self.config.base_yield_apr
        }
    }

    pub fn step(
        &self,
        mut s: CollateralState,
        month: u32,
        price: f64,
        hashprice: f64,
    ) -> (CollateralState, CollateralMonth) {
        let c = self.config;

        // 1. reserve yield
        let reserve_yield = s.reserve * c.reserve_yield_apr / MONTHS_PER_YEAR;
        s.reserve += reserve_yield;

        // 2. production into collateral
        let prod = self.production.month(hashprice, price);
        let produced = prod.quantity;
        s.collateral_quantity += produced;

        // 3. operating cost: output, reserve, new debt
        let operating_cost = prod.total_cost();
        let cost_from_output = produced.min(prod.cost_quantity(price));
        s.collateral_quantity -= cost_from_output;
        let mut outstanding = (operating_cost - cost_from_output * price).max(0.0);
        let cost_from_reserve = s.reserve.min(outstanding);
        s.reserve -= cost_from_reserve;
        outstanding -= cost_from_reserve;
        let mut minted_for_cost = 0.0;
        let mut cost_shortfall = false;
        if outstanding > 0.0 {
            let headroom = (s.collateral_quantity * price * c.max_ltv - s.debt).max(0.0);
            minted_for_cost = outstanding.min(headroom);
            s.debt += minted_for_cost;
            cost_shortfall = outstanding - minted_for_cost > operating_cost * FLOAT_REL_TOLERANCE;
        }
        if cost_shortfall {
            s.totals.cost_shortfall_months += 1;
            warn!(month, operating_cost, unfunded = outstanding - minted_for_cost, "collateral cost shortfall");
        }

        // 4. interest
        let interest = s.debt * c.borrowing_apr / MONTHS_PER_YEAR;
        s.debt += interest;

        // management fee on net equity before distributions
        let equity = s.collateral_quantity * price - s.debt + s.reserve;
        let management_fee = s.overlay.accrue_management(equity);

        // 5. investor yield
        let applied_yield_rate = self.applied_rate(s.bonus_active);
        let yield_obligation = c.capital_raised * applied_yield_rate / MONTHS_PER_YEAR;
        let (mut yield_from_reserve, mut yield_from_collateral, mut yield_quantity_sold) = (0.0, 0.0, 0.0);
        let closed = s.early_close.is_closed();
        if !closed {
            yield_from_reserve = s.reserve.min(yield_obligation);
            s.reserve -= yield_from_reserve;
            let remaining = yield_obligation - yield_from_reserve;
            if remaining > 0.0 && price > 0.0 {
                yield_quantity_sold = (remaining / price).min(s.collateral_quantity.max(0.0));
                yield_from_collateral = yield_quantity_sold * price;
                s.collateral_quantity -= yield_quantity_sold;
            }
        }
        let yield_paid = yield_from_reserve + yield_from_collateral;
        s.totals.yield_paid.add(yield_paid);
        let cumulative_yield = s.totals.yield_paid.value();
        if !closed {
            let pct = ratio_or(cumulative_yield, c.capital_raised, 0.0) * 100.0;
            s.early_close.observe(month, pct);
        }
        let yield_fulfillment = if closed {
            1.0
        } else {
            ratio_or(yield_paid, yield_obligation, 1.0)
        };

        // 6. LTV before strikes
        let ltv_pre_strike = loan_to_value(s.debt, s.collateral_quantity * price);
        let liquidation_risk = ltv_pre_strike >= s.liquidation_ltv;
        if liquidation_risk {
            s.totals.liquidation_risk_months += 1;
            warn!(month, ltv = ltv_pre_strike, threshold = s.liquidation_ltv, "liquidation risk");
        }

        // 7. strikes
        let fills = s.ladder.fire(month, price, s.collateral_quantity);
        let (mut strike_quantity, mut strike_proceeds, mut strike_debt_repaid) = (0.0, 0.0, 0.0);
        for fill in fills {
            let repay = fill.proceeds.min(s.debt);
            let surplus = fill.proceeds - repay;
            s.debt -= repay;
            s.reserve += surplus;
            s.collateral_quantity -= fill.quantity;
            s.totals.debt_repaid.add(repay);
            s.strike_extras[fill.index] = (repay, surplus);
            strike_quantity += fill.quantity;
            strike_proceeds += fill.proceeds;
            strike_debt_repaid += repay;
            s.bonus_active = true;
            let strike_price = s.ladder.entries()[fill.index].price_trigger;
            info!(month, strike_price, price, sold = fill.quantity, repaid = repay, "strike fired");
            s.events.push(StrikeEvent {
                month,
                strike_price,
                price,
                quantity_sold: fill.quantity,
                proceeds: fill.proceeds,
                debt_repaid: repay,
                surplus_to_reserve: surplus,
                remaining_debt: s.debt,
                remaining_collateral: s.collateral_quantity,
            });
        }
        s.collateral_quantity = s.collateral_quantity.max(0.0);
        s.debt = s.debt.max(0.0);

        let collateral_value = s.collateral_quantity * price;
        s.ltv = loan_to_value(s.debt, collateral_value);
        let net_equity = collateral_value - s.debt + s.reserve;

        let t = &mut s.totals;
        t.months += 1;
        t.produced.add(produced);
        t.operating_cost.add(operating_cost);
        t.interest.add(interest);
        t.reserve_yield.add(reserve_yield);
        t.max_ltv = t.max_ltv.max(s.ltv);
        t.min_ltv = Some(t.min_ltv.map_or(s.ltv, |m| m.min(s.ltv)));

        let record = CollateralMonth {
            month,
            price,
            quantity_produced: produced,
            collateral_quantity: s.collateral_quantity,
            collateral_value,
            reserve: s.reserve,
            debt: s.debt,
            reserve_yield,
            operating_cost,
            cost_from_output,
            cost_from_reserve,
            minted_for_cost,
            cost_shortfall,
            interest,
            management_fee,
            applied_yield_rate,
            yield_obligation,
            yield_from_reserve,
            yield_from_collateral,
            yield_quantity_sold,
            yield_paid,
            yield_fulfillment,
            cumulative_yield,
            ltv_pre_strike,
            ltv: s.ltv,
            liquidation_risk,
            strike_quantity,
            strike_proceeds,
            strike_debt_repaid,
            net_equity,
        };
        (s, record)
    }

    /// Strike ladder with the repayment split of every fired rung.
    pub fn strike_status(state: &CollateralState) -> Vec<StrikeStatus> {
        state
            .ladder
            .entries()
            .iter()
            .zip(&state.strike_extras)
            .map(|(entry, &(debt_repaid, surplus_to_reserve))| StrikeStatus {
                entry: *entry,
                debt_repaid,
                surplus_to_reserve,
            })
            .collect()
    }

    pub fn summarize(
        &self,
        state: CollateralState,
        opening: CollateralOpening,
        final_price: f64,
    ) -> (CollateralSummary, Vec<StrikeStatus>, Vec<StrikeEvent>) {
        let c = self.config;
        let strikes = Self::strike_status(&state);
        let strikes_fired = state.ladder.fired_count();
        let t = state.totals;
        let collateral_value = state.collateral_quantity * final_price;
        let equity = collateral_value - state.debt + state.reserve;
        let performance_fee = state.overlay.performance_fee(equity, c.capital_raised);
        let fees = state.overlay.finish(performance_fee);
        let net_equity = GrossNet {
            gross: equity,
            net: equity - fees.management_total - fees.performance_fee,
        };
        let years = f64::from(t.months) / MONTHS_PER_YEAR;
        let total_yield_paid = t.yield_paid.value();

        let summary = CollateralSummary {
            opening,
            months: t.months,
            final_collateral_quantity: state.collateral_quantity,
            final_collateral_value: collateral_value,
            final_debt: state.debt,
            final_reserve: state.reserve,
            final_ltv: state.ltv,
            max_ltv: t.max_ltv,
            min_ltv: t.min_ltv.unwrap_or(0.0),
            net_equity,
            total_return_pct: net_equity.return_pct(c.capital_raised),
            total_produced: t.produced.value(),
            total_operating_cost: t.operating_cost.value(),
            total_interest: t.interest.value(),
            total_debt_repaid: t.debt_repaid.value(),
            total_reserve_yield: t.reserve_yield.value(),
            total_yield_paid,
            effective_yield_apr: ratio_or(ratio_or(total_yield_paid, c.capital_raised, 0.0), years, 0.0),
            liquidation_risk_months: t.liquidation_risk_months,
            cost_shortfall_months: t.cost_shortfall_months,
            strikes_fired,
            strikes_total: strikes.len(),
            early_close: state.early_close.record(),
            fees,
        };
        (summary, strikes, state.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minewell_core::config::fixtures::collateral;
    use minewell_core::types::LadderRung;
    use proptest::prelude::*;

    const HP: f64 = 0.000_5;

    fn run(
        config: &CollateralConfig,
        prices: &[f64],
    ) -> (CollateralState, CollateralOpening, Vec<CollateralMonth>) {
        let engine = CollateralEngine::new(config);
        let (mut state, opening) = engine.open();
        let mut months = Vec::new();
        for (m, &p) in prices.iter().enumerate() {
            let (next, rec) = engine.step(state, m as u32, p, HP);
            state = next;
            months.push(rec);
        }
        (state, opening, months)
    }

    #[test]
    fn ltv_edge_cases() {
        assert_eq!(loan_to_value(0.0, 0.0), 0.0);
        assert_eq!(loan_to_value(10.0, 0.0), RATIO_CEILING);
        assert_eq!(loan_to_value(50.0, 100.0), 0.5);
    }

    #[test]
    fn opening_buys_collateral_and_borrows_capex() {
        let c = collateral();
        let (state, opening) = CollateralEngine::new(&c).open();
        assert!((opening.collateral_purchased - 10_000_000.0 / 90_000.0).abs() < 1e-9);
        assert_eq!(opening.initial_reserve, 0.0);
        assert_eq!(opening.miner_capex, 1_000_000.0);
        assert_eq!(opening.debt_for_capex, 1_000_000.0);
        assert_eq!(opening.capex_shortfall, 0.0);
        assert!((state.ltv - 0.1).abs() < 1e-12);
    }

    #[test]
    fn capex_capped_by_max_ltv() {
        let mut c = collateral();
        c.max_ltv = 0.05;
        let (_, opening) = CollateralEngine::new(&c).open();
        assert!((opening.debt_for_capex - 500_000.0).abs() < 1e-6);
        assert!((opening.capex_shortfall - 500_000.0).abs() < 1e-6);
    }

    #[test]
    fn partial_allocation_keeps_reserve_earning() {
        let mut c = collateral();
        c.collateral_allocation_pct = 80.0;
        let (_, opening, months) = run(&c, &[100_000.0]);
        assert!((opening.initial_reserve - 2_000_000.0).abs() < 1e-6);
        assert!((months[0].reserve_yield - 2_000_000.0 * 0.04 / 12.0).abs() < 1e-6);
        assert!((months[0].yield_from_reserve - months[0].yield_obligation).abs() < 1e-6);
        assert_eq!(months[0].yield_quantity_sold, 0.0);
    }

    #[test]
    fn interest_accrues_monthly() {
        let c = collateral();
        let (_, _, months) = run(&c, &[100_000.0]);
        assert!((months[0].interest - 1_000_000.0 * 0.08 / 12.0).abs() < 1e-6);
    }

    #[test]
    fn strike_repays_debt_then_funds_reserve_and_activates_bonus() {
        let mut c = collateral();
        c.strike_ladder = vec![LadderRung {
            price_trigger: 150_000.0,
            sell_fraction: 0.25,
        }];
        let (state, _, months) = run(&c, &[100_000.0, 160_000.0, 170_000.0, 180_000.0]);
        let m = &months[1];
        assert!(m.strike_quantity > 0.0);
        assert!(m.debt < 1e-6);
        assert!(m.reserve > 0.0);
        assert!((m.applied_yield_rate - 0.08).abs() < 1e-12);
        assert!((months[2].applied_yield_rate - 0.12).abs() < 1e-12);
        assert_eq!(months[3].strike_quantity, 0.0);
        assert_eq!(state.events.len(), 1);
        let status = CollateralEngine::strike_status(&state);
        assert_eq!(status[0].entry.trigger_month, Some(1));
        assert!((status[0].debt_repaid + status[0].surplus_to_reserve - status[0].entry.proceeds).abs() < 1e-6);
    }

    #[test]
    fn crash_flags_liquidation_risk() {
        let mut c = collateral();
        c.max_ltv = 0.5;
        c.liquidation_ltv = 0.6;
        c.fleet.miner_count = 1_000;
        let (state, _, months) = run(&c, &[90_000.0, 20_000.0, 10_000.0]);
        assert!(months.iter().any(|m| m.liquidation_risk));
        assert!(state.totals.liquidation_risk_months > 0);
    }

    #[test]
    fn early_close_stops_yield() {
        let mut c = collateral();
        c.early_close.target_pct = 1.9;
        c.early_close.frequency = minewell_core::config::CloseCheckFrequency::Monthly;
        let (state, _, months) = run(&c, &[100_000.0; 6]);
        let close = state.early_close.record();
        assert_eq!(close.close_month, Some(2));
        assert!(months[2].yield_paid > 0.0);
        assert_eq!(months[3].yield_paid, 0.0);
        assert_eq!(months[5].yield_paid, 0.0);
    }

    #[test]
    fn summary_reports_fees_and_equity() {
        let mut c = collateral();
        c.commercial.upfront_pct = 1.0;
        c.commercial.management_pct = 1.2;
        let engine = CollateralEngine::new(&c);
        let (mut state, opening) = engine.open();
        for m in 0..12 {
            state = engine.step(state, m, 100_000.0, HP).0;
        }
        let (summary, strikes, events) = engine.summarize(state, opening, 100_000.0);
        assert_eq!(summary.fees.upfront.total, 100_000.0);
        assert!(summary.fees.management_total > 0.0);
        let equity = summary.final_collateral_value - summary.final_debt + summary.final_reserve;
        assert_eq!(summary.net_equity.gross, equity);
        assert!(
            (summary.net_equity.gross - summary.net_equity.net
                - summary.fees.management_total
                - summary.fees.performance_fee)
                .abs()
                < 1e-6
        );
        assert!(strikes.is_empty() && events.is_empty());
        assert_eq!(summary.months, 12);
    }

    proptest! {
        #[test]
        fn quantities_and_debt_never_negative(
            prices in proptest::collection::vec(5_000.0f64..300_000.0, 1..60),
            triggers in proptest::collection::vec((50_000.0f64..300_000.0, 0.05f64..=1.0), 0..4),
        ) {
            let mut c = collateral();
            c.strike_ladder = triggers
                .iter()
                .map(|&(price_trigger, sell_fraction)| LadderRung { price_trigger, sell_fraction })
                .collect();
            let (state, _, months) = run(&c, &prices);
            for m in &months {
                prop_assert!(m.collateral_quantity >= 0.0);
                prop_assert!(m.debt >= 0.0);
                prop_assert!(m.reserve >= -1e-6);
                prop_assert_eq!(m.liquidation_risk, m.ltv_pre_strike >= c.liquidation_ltv);
                if m.strike_debt_repaid > 0.0 && m.ltv_pre_strike < 1.0 {
                    prop_assert!(m.ltv <= m.ltv_pre_strike + 1e-12);
                }
            }
            prop_assert!(state.ladder.fired_count() <= c.strike_ladder.len());
        }
    }
}
