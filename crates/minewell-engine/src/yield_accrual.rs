//! Yield bucket accrual.
//!
//! Monthly yield is `allocation × rate / 12`. The rate is the first schedule
//! entry covering the month, else the base APR. Yield accumulates additively
//! unless compounding is switched on, in which case each month's yield is
//! added to the balance that earns the next month's.

use serde::{Deserialize, Serialize};

use minewell_core::config::YieldBucketConfig;
use minewell_core::constants::MONTHS_PER_YEAR;
use minewell_core::numeric::{StableSum, ratio_or};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YieldState {
    /// Balance the next month's yield accrues on.
    pub balance: f64,
    pub cumulative_yield: StableSum,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YieldMonth {
    pub month: u32,
    pub apr: f64,
    pub yield_amount: f64,
    pub cumulative_yield: f64,
    /// Allocation plus all yield accrued so far.
    pub bucket_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YieldSummary {
    pub allocation: f64,
    pub total_yield: f64,
    pub final_value: f64,
    pub effective_apr: f64,
}

pub struct YieldAccrual<'a> {
    config: &'a YieldBucketConfig,
    allocation: f64,
}

impl<'a> YieldAccrual<'a> {
    pub fn new(config: &'a YieldBucketConfig, allocation: f64) -> Self {
        Self { config, allocation }
    }

    pub fn initial_state(&self) -> YieldState {
        YieldState {
            balance: self.allocation,
            cumulative_yield: StableSum::new(),
        }
    }

    /// APR in force for `month`.
    pub fn rate_for(&self, month: u32) -> f64 {
        self.config
            .schedule
            .iter()
            .find(|entry| entry.covers(month))
            .map_or(self.config.base_apr, |entry| entry.apr)
    }

    pub fn step(&self, mut state: YieldState, month: u32) -> (YieldState, YieldMonth) {
        let apr = self.rate_for(month);
        let yield_amount = state.balance * apr / MONTHS_PER_YEAR;
        state.cumulative_yield.add(yield_amount);
        if self.config.compounding {
            state.balance += yield_amount;
        }
        let cumulative_yield = state.cumulative_yield.value();
        let record = YieldMonth {
            month,
            apr,
            yield_amount,
            cumulative_yield,
            bucket_value: self.allocation + cumulative_yield,
        };
        (state, record)
    }

    pub fn summarize(&self, state: &YieldState, months: u32) -> YieldSummary {
        let total_yield = state.cumulative_yield.value();
        let years = f64::from(months) / MONTHS_PER_YEAR;
        YieldSummary {
            allocation: self.allocation,
            total_yield,
            final_value: self.allocation + total_yield,
            effective_apr: ratio_or(ratio_or(total_yield, self.allocation, 0.0), years, 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minewell_core::config::AprScheduleEntry;

    fn config(schedule: Vec<AprScheduleEntry>, compounding: bool) -> YieldBucketConfig {
        YieldBucketConfig {
            base_apr: 0.06,
            schedule,
            compounding,
        }
    }

    fn run(accrual: &YieldAccrual<'_>, months: u32) -> (YieldState, Vec<YieldMonth>) {
        let mut state = accrual.initial_state();
        let mut out = Vec::new();
        for m in 0..months {
            let (next, rec) = accrual.step(state, m);
            state = next;
            out.push(rec);
        }
        (state, out)
    }

    #[test]
    fn fixed_rate_accrues_additively() {
        let cfg = config(vec![], false);
        let accrual = YieldAccrual::new(&cfg, 3_000_000.0);
        let (state, months) = run(&accrual, 36);
        assert!((months[0].yield_amount - 15_000.0).abs() < 1e-9);
        assert!((state.cumulative_yield.value() - 540_000.0).abs() < 1e-6);
        let s = accrual.summarize(&state, 36);
        assert!((s.effective_apr - 0.06).abs() < 1e-12);
        assert!((s.final_value - 3_540_000.0).abs() < 1e-6);
    }

    #[test]
    fn first_covering_schedule_entry_wins() {
        let cfg = config(
            vec![
                AprScheduleEntry { from_month: 0, to_month: 5, apr: 0.12 },
                AprScheduleEntry { from_month: 3, to_month: 11, apr: 0.03 },
            ],
            false,
        );
        let accrual = YieldAccrual::new(&cfg, 1_200.0);
        assert_eq!(accrual.rate_for(0), 0.12);
        assert_eq!(accrual.rate_for(5), 0.12);
        assert_eq!(accrual.rate_for(6), 0.03);
        assert_eq!(accrual.rate_for(12), 0.06);
        let (_, months) = run(&accrual, 13);
        assert!((months[0].yield_amount - 12.0).abs() < 1e-12);
        assert!((months[12].yield_amount - 6.0).abs() < 1e-12);
    }

    #[test]
    fn compounding_grows_balance() {
        let cfg = config(vec![], true);
        let accrual = YieldAccrual::new(&cfg, 1_000.0);
        let (state, _) = run(&accrual, 12);
        let expected = 1_000.0 * ((1.0f64 + 0.005).powi(12) - 1.0);
        assert!((state.cumulative_yield.value() - expected).abs() < 1e-9);
        assert!((state.balance - (1_000.0 + expected)).abs() < 1e-9);
    }

    #[test]
    fn zero_allocation_earns_nothing() {
        let cfg = config(vec![], false);
        let accrual = YieldAccrual::new(&cfg, 0.0);
        let (state, _) = run(&accrual, 6);
        assert_eq!(state.cumulative_yield.value(), 0.0);
        assert_eq!(accrual.summarize(&state, 6).effective_apr, 0.0);
    }
}
