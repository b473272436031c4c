//! Monthly production and operating cost of a deployed fleet.
//!
//! Purely functional: each call maps one month's network and price point to
//! output quantity and cash cost. No state is carried between months.

use serde::{Deserialize, Serialize};

use minewell_core::constants::{DAYS_PER_MONTH, HOURS_PER_DAY, MONTHS_PER_YEAR, TH_PER_PH};
use minewell_core::numeric::{StableSum, ratio_or};
use minewell_core::types::{FleetConfig, HostingSite, MaintenanceBasis, MinerSpec};

/// Output and cost of one month.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MonthlyProduction {
    /// Uptime after curtailment and calibration, in `[0, 1]`.
    pub effective_uptime: f64,
    /// Asset units mined.
    pub quantity: f64,
    pub electricity_cost: f64,
    pub hosting_cost: f64,
    pub maintenance_cost: f64,
}

impl MonthlyProduction {
    /// Total operating cost in cash.
    pub fn total_cost(&self) -> f64 {
        self.electricity_cost + self.hosting_cost + self.maintenance_cost
    }

    /// Asset quantity that must be sold at `price` to meet the operating cost.
    pub fn cost_quantity(&self, price: f64) -> f64 {
        ratio_or(self.total_cost(), price, 0.0)
    }
}

/// Converts a fleet and hosting terms into monthly output.
#[derive(Debug, Clone)]
pub struct ProductionModel {
    fleet: FleetConfig,
}

impl ProductionModel {
    pub fn new(fleet: &FleetConfig) -> Self {
        Self {
            fleet: fleet.clone(),
        }
    }

    pub fn fleet(&self) -> &FleetConfig {
        &self.fleet
    }

    /// Site uptime after curtailment, scaled by the calibration factor.
    pub fn effective_uptime(&self) -> f64 {
        (self.fleet.hosting.effective_uptime() * self.fleet.calibration.uptime_factor).clamp(0.0, 1.0)
    }

    /// Production for a month with network hash-price `hashprice` (asset per
    /// PH per day) and spot `price`.
    ///
    /// # Examples
    ///
    /// ```
    /// use minewell_core::types::*;
    /// use minewell_engine::production::ProductionModel;
    ///
    /// let fleet = FleetConfig {
    ///     miner: MinerSpec {
    ///         name: "unit".into(),
    ///         hashrate_th: 1_000.0,
    ///         power_w: 1_000.0,
    ///         unit_price: 0.0,
    ///         lifetime_months: 12,
    ///         maintenance_pct: 0.0,
    ///     },
    ///     hosting: HostingSite {
    ///         name: "site".into(),
    ///         electricity_rate: 0.0,
    ///         hosting_fee_per_kw_month: 0.0,
    ///         uptime_expectation: 1.0,
    ///         curtailment_pct: 0.0,
    ///         capacity_mw: None,
    ///     },
    ///     miner_count: 1,
    ///     maintenance_basis: MaintenanceBasis::FleetValue,
    ///     calibration: Calibration::default(),
    /// };
    /// let month = ProductionModel::new(&fleet).month(0.001, 100_000.0);
    /// // 1 PH × 0.001 per PH per day × 30.44 days
    /// assert!((month.quantity - 0.03044).abs() < 1e-12);
    /// ```
    pub fn month(&self, hashprice: f64, price: f64) -> MonthlyProduction {
        let fleet = &self.fleet;
        let uptime = self.effective_uptime();
        let fleet_ph = fleet.fleet_hashrate_th() / TH_PER_PH;
        let quantity = (hashprice * fleet_ph * DAYS_PER_MONTH * uptime
            * fleet.calibration.production_adjustment)
            .max(0.0);

        let power_kw = fleet.fleet_power_kw();
        let electricity_cost =
            power_kw * HOURS_PER_DAY * DAYS_PER_MONTH * uptime * fleet.hosting.electricity_rate;
        let hosting_cost = power_kw * fleet.hosting.hosting_fee_per_kw_month;
        let maintenance_cost = match fleet.maintenance_basis {
            MaintenanceBasis::FleetValue => {
                fleet.fleet_value() * fleet.miner.maintenance_pct / MONTHS_PER_YEAR
            }
            MaintenanceBasis::Revenue => quantity * price * fleet.miner.maintenance_pct,
        };

        MonthlyProduction {
            effective_uptime: uptime,
            quantity,
            electricity_cost,
            hosting_cost,
            maintenance_cost,
        }
    }
}

/// One month of a single miner's cash flow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitMonth {
    pub month: u32,
    pub quantity: f64,
    pub revenue: f64,
    pub operating_cost: f64,
    pub depreciation: f64,
    pub ebit: f64,
    pub cumulative_ebit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitEconomics {
    pub months: Vec<UnitMonth>,
    /// First month whose cumulative EBIT is non-negative.
    pub break_even_month: Option<u32>,
    pub total_quantity: f64,
    pub total_revenue: f64,
    pub total_ebit: f64,
}

/// Per-miner economics over the months both curves cover.
///
/// Depreciation is straight-line over the miner's lifetime and stops once
/// the unit is fully written off.
pub fn unit_economics(
    miner: &MinerSpec,
    hosting: &HostingSite,
    prices: &[f64],
    hashprice: &[f64],
) -> UnitEconomics {
    let fleet = FleetConfig {
        miner: miner.clone(),
        hosting: hosting.clone(),
        miner_count: 1,
        maintenance_basis: MaintenanceBasis::default(),
        calibration: Default::default(),
    };
    let model = ProductionModel::new(&fleet);
    let monthly_depreciation = ratio_or(miner.unit_price, f64::from(miner.lifetime_months), 0.0);

    let mut cumulative = StableSum::new();
    let mut quantity = StableSum::new();
    let mut revenue = StableSum::new();
    let mut break_even_month = None;
    let mut months = Vec::with_capacity(prices.len().min(hashprice.len()));

    for (i, (&price, &hp)) in prices.iter().zip(hashprice).enumerate() {
        let month = i as u32;
        let prod = model.month(hp, price);
        let month_revenue = prod.quantity * price;
        let depreciation = if month < miner.lifetime_months {
            monthly_depreciation
        } else {
            0.0
        };
        let ebit = month_revenue - prod.total_cost() - depreciation;
        cumulative.add(ebit);
        quantity.add(prod.quantity);
        revenue.add(month_revenue);
        if break_even_month.is_none() && cumulative.value() >= 0.0 {
            break_even_month = Some(month);
        }
        months.push(UnitMonth {
            month,
            quantity: prod.quantity,
            revenue: month_revenue,
            operating_cost: prod.total_cost(),
            depreciation,
            ebit,
            cumulative_ebit: cumulative.value(),
        });
    }

    UnitEconomics {
        months,
        break_even_month,
        total_quantity: quantity.value(),
        total_revenue: revenue.value(),
        total_ebit: cumulative.value(),
    }
}
