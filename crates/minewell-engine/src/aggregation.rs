//! Portfolio aggregation, early close and the subscription decision.

use serde::{Deserialize, Serialize};
use tracing::info;

use minewell_core::config::EarlyCloseConfig;
use minewell_core::constants::{
    BLOCKED_DEFICIT_RATIO, MONTHS_PER_QUARTER, MONTHS_PER_YEAR, TARGET_COVERAGE_RATIO,
    TARGET_HEALTH_SCORE, TARGET_YIELD_FULFILLMENT,
};
use minewell_core::numeric::{StableSum, ratio_or};

use crate::commercial::{FeeBreakdown, GrossNet};
use crate::holding::HoldingMonth;
use crate::waterfall::MonthlyWaterfallRecord;
use crate::yield_accrual::YieldMonth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approved,
    Adjust,
    Blocked,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Approved => "APPROVED",
            Self::Adjust => "ADJUST",
            Self::Blocked => "BLOCKED",
        })
    }
}

/// Run-level metrics the decision is taken on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionInputs {
    pub deficit_months: u32,
    pub total_months: u32,
    pub mean_coverage_ratio: f64,
    pub mean_yield_fulfillment: f64,
    pub final_health_score: f64,
}

/// Classify a run.
///
/// BLOCKED depends only on the share of deficit months. Every threshold
/// produces one reason line, met or not.
pub fn decide(inputs: &DecisionInputs) -> (Decision, Vec<String>) {
    let ratio = ratio_or(
        f64::from(inputs.deficit_months),
        f64::from(inputs.total_months),
        0.0,
    );
    let limit_pct = BLOCKED_DEFICIT_RATIO * 100.0;
    let mut reasons = Vec::with_capacity(4);

    let blocked = ratio > BLOCKED_DEFICIT_RATIO;
    reasons.push(if blocked {
        format!(
            "too many deficit months: {}/{} ({:.1}%) exceeds {limit_pct:.0}%",
            inputs.deficit_months,
            inputs.total_months,
            ratio * 100.0
        )
    } else if inputs.deficit_months > 0 {
        format!(
            "deficit months {}/{} ({:.1}%) within the {limit_pct:.0}% limit",
            inputs.deficit_months,
            inputs.total_months,
            ratio * 100.0
        )
    } else {
        "no deficit months".to_string()
    });

    let coverage_ok = inputs.mean_coverage_ratio >= TARGET_COVERAGE_RATIO;
    reasons.push(format!(
        "mean cost coverage {:.2} {} target {TARGET_COVERAGE_RATIO:.2}",
        inputs.mean_coverage_ratio,
        if coverage_ok { "meets" } else { "below" }
    ));
    let fulfillment_ok = inputs.mean_yield_fulfillment >= TARGET_YIELD_FULFILLMENT;
    reasons.push(format!(
        "mean yield fulfillment {:.1}% {} target {:.0}%",
        inputs.mean_yield_fulfillment * 100.0,
        if fulfillment_ok { "meets" } else { "below" },
        TARGET_YIELD_FULFILLMENT * 100.0
    ));
    let health_ok = inputs.final_health_score >= TARGET_HEALTH_SCORE;
    reasons.push(format!(
        "final health score {:.0}/100 {} target {TARGET_HEALTH_SCORE:.0}",
        inputs.final_health_score,
        if health_ok { "meets" } else { "below" }
    ));

    let decision = if blocked {
        Decision::Blocked
    } else if inputs.deficit_months > 0 || !coverage_ok || !fulfillment_ok || !health_ok {
        Decision::Adjust
    } else {
        Decision::Approved
    };
    (decision, reasons)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarlyClose {
    pub triggered: bool,
    pub target_pct: f64,
    pub close_month: Option<u32>,
    /// 1-based quarter containing the close month.
    pub close_quarter: Option<u32>,
    pub cumulative_yield_pct: Option<f64>,
}

/// Checks cumulative yield against the close target at period boundaries.
///
/// The first passing check is recorded and never re-evaluated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarlyCloseTracker {
    period: u32,
    record: EarlyClose,
}

impl EarlyCloseTracker {
    pub fn new(config: &EarlyCloseConfig) -> Self {
        Self {
            period: config.frequency.period_months().max(1),
            record: EarlyClose {
                triggered: false,
                target_pct: config.target_pct,
                close_month: None,
                close_quarter: None,
                cumulative_yield_pct: None,
            },
        }
    }

    /// Whether `month` (0-based) ends a check period.
    pub fn is_check_month(&self, month: u32) -> bool {
        (month + 1) % self.period == 0
    }

    /// Returns true if the product closes at this month.
    pub fn observe(&mut self, month: u32, cumulative_yield_pct: f64) -> bool {
        if self.record.triggered || !self.is_check_month(month) {
            return false;
        }
        if cumulative_yield_pct >= self.record.target_pct {
            self.record.triggered = true;
            self.record.close_month = Some(month);
            self.record.close_quarter = Some((month + 1).div_ceil(MONTHS_PER_QUARTER));
            self.record.cumulative_yield_pct = Some(cumulative_yield_pct);
            info!(month, cumulative_yield_pct, "early close triggered");
            return true;
        }
        false
    }

    pub fn is_closed(&self) -> bool {
        self.record.triggered
    }

    pub fn record(&self) -> EarlyClose {
        self.record
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMonth {
    pub month: u32,
    pub yield_value: f64,
    pub holding_value: f64,
    pub mining_value: f64,
    pub total_value: f64,
    /// Yield bucket plus mining yield paid, cumulative.
    pub cumulative_yield: f64,
    pub cumulative_yield_pct: f64,
    pub management_fee: f64,
}

/// Asset held across the holding and mining buckets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AumMonth {
    pub month: u32,
    pub price: f64,
    pub holding_quantity: f64,
    pub reserve_quantity: f64,
    pub total_quantity: f64,
    pub total_value: f64,
    pub holding_struck_this_month: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AumSummary {
    pub final_quantity: f64,
    pub final_value: f64,
    pub peak_quantity: f64,
    pub peak_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub capital_raised: f64,
    pub simulated_months: u32,
    /// `close_month + 1` after an early close, else the simulated months.
    pub effective_tenor_months: u32,
    pub total_yield_paid: f64,
    pub final_value: GrossNet,
    pub total_return_pct: GrossNet,
    /// Yield paid to investors over capital raised, annualised.
    pub effective_apr: f64,
    pub capital_preservation_ratio: GrossNet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub months: Vec<PortfolioMonth>,
    pub aum: Vec<AumMonth>,
    pub aum_summary: AumSummary,
    pub decision: Decision,
    pub decision_reasons: Vec<String>,
    pub early_close: EarlyClose,
    pub metrics: SummaryMetrics,
    pub fees: FeeBreakdown,
}

/// Buckets' states for one month, as seen by the aggregator.
pub struct MonthView<'a> {
    pub yield_month: &'a YieldMonth,
    pub holding_month: &'a HoldingMonth,
    pub mining_month: &'a MonthlyWaterfallRecord,
}

/// Folds bucket months into portfolio totals.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationEngine {
    capital_raised: f64,
    early_close: EarlyCloseTracker,
    mining_yield: StableSum,
    months: Vec<PortfolioMonth>,
    aum: Vec<AumMonth>,
    aum_summary: AumSummary,
}

impl AggregationEngine {
    pub fn new(capital_raised: f64, early_close: &EarlyCloseConfig, tenor_months: usize) -> Self {
        Self {
            capital_raised,
            early_close: EarlyCloseTracker::new(early_close),
            mining_yield: StableSum::new(),
            months: Vec::with_capacity(tenor_months),
            aum: Vec::with_capacity(tenor_months),
            aum_summary: AumSummary::default(),
        }
    }

    pub fn early_close(&self) -> &EarlyCloseTracker {
        &self.early_close
    }

    /// Total portfolio value of the most recent month.
    pub fn last_total(&self) -> f64 {
        self.months.last().map_or(0.0, |m| m.total_value)
    }

    /// Record one month. Returns the portfolio total for the month.
    pub fn record(&mut self, view: MonthView<'_>, management_fee: f64) -> f64 {
        let MonthView {
            yield_month,
            holding_month,
            mining_month,
        } = view;
        let month = mining_month.month;

        self.mining_yield.add(mining_month.yield_paid);
        let cumulative_yield = yield_month.cumulative_yield + self.mining_yield.value();
        let cumulative_yield_pct = ratio_or(cumulative_yield, self.capital_raised, 0.0) * 100.0;
        self.early_close.observe(month, cumulative_yield_pct);

        let total_value = yield_month.bucket_value + holding_month.value + mining_month.bucket_value;
        self.months.push(PortfolioMonth {
            month,
            yield_value: yield_month.bucket_value,
            holding_value: holding_month.value,
            mining_value: mining_month.bucket_value,
            total_value,
            cumulative_yield,
            cumulative_yield_pct,
            management_fee,
        });

        let total_quantity = holding_month.held_quantity + mining_month.reserve_quantity;
        let aum_value = total_quantity * mining_month.price;
        self.aum.push(AumMonth {
            month,
            price: mining_month.price,
            holding_quantity: holding_month.held_quantity,
            reserve_quantity: mining_month.reserve_quantity,
            total_quantity,
            total_value: aum_value,
            holding_struck_this_month: holding_month.struck_this_month,
        });
        let s = &mut self.aum_summary;
        s.final_quantity = total_quantity;
        s.final_value = aum_value;
        s.peak_quantity = s.peak_quantity.max(total_quantity);
        s.peak_value = s.peak_value.max(aum_value);

        total_value
    }

    /// Close the run: classify and compute headline metrics.
    ///
    /// Gross is the final bucket total, which is already net of the upfront
    /// fee. Net also takes off management and performance fees.
    pub fn finish(self, decision_inputs: &DecisionInputs, fees: FeeBreakdown) -> AggregatedResult {
        let (decision, decision_reasons) = decide(decision_inputs);
        let simulated_months = self.months.len() as u32;
        let early_close = self.early_close.record();
        let effective_tenor_months = early_close
            .close_month
            .map_or(simulated_months, |m| m + 1);

        let bucket_total = self.last_total();
        let total_yield_paid = self.months.last().map_or(0.0, |m| m.cumulative_yield);
        let final_value = GrossNet {
            gross: bucket_total,
            net: bucket_total - fees.management_total - fees.performance_fee,
        };
        let years = f64::from(simulated_months) / MONTHS_PER_YEAR;
        let capital = self.capital_raised;

        let metrics = SummaryMetrics {
            capital_raised: capital,
            simulated_months,
            effective_tenor_months,
            total_yield_paid,
            final_value,
            total_return_pct: final_value.return_pct(capital),
            effective_apr: ratio_or(ratio_or(total_yield_paid, capital, 0.0), years, 0.0),
            capital_preservation_ratio: GrossNet {
                gross: ratio_or(final_value.gross, capital, 0.0),
                net: ratio_or(final_value.net, capital, 0.0),
            },
        };

        AggregatedResult {
            months: self.months,
            aum: self.aum,
            aum_summary: self.aum_summary,
            decision,
            decision_reasons,
            early_close,
            metrics,
            fees,
        }
    }
}
