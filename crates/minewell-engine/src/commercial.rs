//! Commercial fee overlay.
//!
//! - Upfront: `capital × upfront_pct`, taken from each bucket in proportion
//!   to its allocation before the first month.
//! - Management: `AUM × annual_pct / 12`, accrued every month.
//! - Performance: once at tenor end, `performance_pct` of the capitalization
//!   value above its starting allocation.
//!
//! All percentages are in percent, not fractions.

use serde::{Deserialize, Serialize};

use minewell_core::config::{BucketAmounts, CommercialConfig};
use minewell_core::constants::MONTHS_PER_YEAR;
use minewell_core::numeric::{StableSum, ratio_or};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UpfrontFee {
    pub total: f64,
    pub yield_deduction: f64,
    pub holding_deduction: f64,
    pub mining_deduction: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub upfront: UpfrontFee,
    pub management_monthly: Vec<f64>,
    pub management_total: f64,
    pub performance_fee: f64,
    pub total: f64,
}

/// Split the upfront fee across buckets and return the post-fee amounts.
///
/// # Examples
///
/// ```
/// use minewell_core::config::BucketAmounts;
/// use minewell_engine::commercial::apply_upfront;
///
/// let gross = BucketAmounts { yield_bucket: 300.0, holding: 300.0, mining: 400.0 };
/// let (net, fee) = apply_upfront(gross, 1_000.0, 2.0);
/// assert_eq!(fee.total, 20.0);
/// assert_eq!(fee.mining_deduction, 8.0);
/// assert_eq!(net.mining, 392.0);
/// ```
pub fn apply_upfront(gross: BucketAmounts, capital_raised: f64, upfront_pct: f64) -> (BucketAmounts, UpfrontFee) {
    let total_alloc = gross.total();
    if upfront_pct <= 0.0 || total_alloc <= 0.0 {
        return (gross, UpfrontFee::default());
    }
    let total = capital_raised * upfront_pct / 100.0;
    let share = |amount: f64| total * amount / total_alloc;
    let fee = UpfrontFee {
        total,
        yield_deduction: share(gross.yield_bucket),
        holding_deduction: share(gross.holding),
        mining_deduction: share(gross.mining),
    };
    let net = BucketAmounts {
        yield_bucket: gross.yield_bucket - fee.yield_deduction,
        holding: gross.holding - fee.holding_deduction,
        mining: gross.mining - fee.mining_deduction,
    };
    (net, fee)
}

/// Running fee ledger for one scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct CommercialOverlay {
    config: CommercialConfig,
    upfront: UpfrontFee,
    management: StableSum,
    management_monthly: Vec<f64>,
}

impl CommercialOverlay {
    pub fn new(config: CommercialConfig, upfront: UpfrontFee) -> Self {
        Self {
            config,
            upfront,
            management: StableSum::new(),
            management_monthly: Vec::new(),
        }
    }

    pub fn upfront(&self) -> &UpfrontFee {
        &self.upfront
    }

    /// Accrue this month's management fee on `aum` and return it.
    pub fn accrue_management(&mut self, aum: f64) -> f64 {
        let fee = aum.max(0.0) * self.config.management_pct / 100.0 / MONTHS_PER_YEAR;
        self.management.add(fee);
        self.management_monthly.push(fee);
        fee
    }

    pub fn management_total(&self) -> f64 {
        self.management.value()
    }

    /// Performance fee on the gain of `final_value` over `initial_value`.
    pub fn performance_fee(&self, final_value: f64, initial_value: f64) -> f64 {
        (final_value - initial_value).max(0.0) * self.config.performance_pct / 100.0
    }

    /// Close the ledger with the performance fee computed at tenor end.
    pub fn finish(self, performance_fee: f64) -> FeeBreakdown {
        let management_total = self.management.value();
        FeeBreakdown {
            upfront: self.upfront,
            management_total,
            performance_fee,
            total: self.upfront.total + management_total + performance_fee,
            management_monthly: self.management_monthly,
        }
    }
}

/// Headline figures in gross (pre-fee) and net (post-fee) form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrossNet {
    pub gross: f64,
    pub net: f64,
}

impl GrossNet {
    /// Return on capital in percent for both variants.
    pub fn return_pct(&self, capital: f64) -> GrossNet {
        GrossNet {
            gross: ratio_or(self.gross - capital, capital, 0.0) * 100.0,
            net: ratio_or(self.net - capital, capital, 0.0) * 100.0,
        }
    }
}
