//! Product configuration snapshots and their validation.
//!
//! A run is described by a [`ProductSpec`]: either the three-bucket product
//! or the collateralised alternative. Both are immutable inputs; every check
//! that could otherwise surface as a division by zero or an out-of-range
//! month runs here, before the first simulated month.

use serde::{Deserialize, Serialize};

use crate::constants::{
    ALLOCATION_TOLERANCE_PCT, DEFAULT_BASE_YIELD_APR, DEFAULT_BONUS_YIELD_APR,
    DEFAULT_CAPITAL_RECON_PCT, DEFAULT_EARLY_CLOSE_TARGET_PCT, DEFAULT_RESERVE_YIELD_APR,
    FLOAT_REL_TOLERANCE,
};
use crate::error::ConfigError;
use crate::types::{FleetConfig, LadderRung, fraction, non_negative, positive, validate_ladder};

/// Percentage split of capital across the three buckets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub yield_pct: f64,
    pub holding_pct: f64,
    pub mining_pct: f64,
}

impl Allocation {
    pub fn total_pct(&self) -> f64 {
        self.yield_pct + self.holding_pct + self.mining_pct
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("allocation.yield_pct", self.yield_pct)?;
        non_negative("allocation.holding_pct", self.holding_pct)?;
        non_negative("allocation.mining_pct", self.mining_pct)?;
        let total = self.total_pct();
        if (total - 100.0).abs() > ALLOCATION_TOLERANCE_PCT {
            return Err(ConfigError::AllocationSum {
                total,
                tolerance: ALLOCATION_TOLERANCE_PCT,
            });
        }
        Ok(())
    }
}

/// Cash amounts per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BucketAmounts {
    pub yield_bucket: f64,
    pub holding: f64,
    pub mining: f64,
}

impl BucketAmounts {
    pub fn total(&self) -> f64 {
        self.yield_bucket + self.holding + self.mining
    }
}

/// An APR override for an inclusive month range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AprScheduleEntry {
    pub from_month: u32,
    pub to_month: u32,
    pub apr: f64,
}

impl AprScheduleEntry {
    pub fn covers(&self, month: u32) -> bool {
        (self.from_month..=self.to_month).contains(&month)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldBucketConfig {
    pub base_apr: f64,
    /// Piecewise overrides; the first entry covering a month wins.
    #[serde(default)]
    pub schedule: Vec<AprScheduleEntry>,
    /// Reinvest each month's yield into the accruing balance.
    #[serde(default)]
    pub compounding: bool,
}

/// The held position splits into a capital-reconstitution tranche, sold in
/// one strike at the target price, and an extra-yield tranche sold through
/// its own ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingBucketConfig {
    /// Entry price of the held position.
    pub buying_price: f64,
    /// Overrides the derived target sell price.
    #[serde(default)]
    pub target_sell_price: Option<f64>,
    /// Share of the position (percent) in the reconstitution tranche.
    #[serde(default = "default_capital_recon_pct")]
    pub capital_recon_pct: f64,
    /// Each rung sells `sell_fraction` of the extra-yield tranche; fractions
    /// sum to at most one.
    #[serde(default)]
    pub extra_yield_strikes: Vec<LadderRung>,
}

impl HoldingBucketConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buying_price == 0.0 {
            return Err(ConfigError::ZeroDenominator("holding_bucket.buying_price"));
        }
        positive("holding_bucket.buying_price", self.buying_price)?;
        if let Some(target) = self.target_sell_price {
            positive("holding_bucket.target_sell_price", target)?;
        }
        fraction("holding_bucket.capital_recon_pct", self.capital_recon_pct / 100.0)?;
        validate_ladder(&self.extra_yield_strikes)?;
        let total: f64 = self.extra_yield_strikes.iter().map(|r| r.sell_fraction).sum();
        if total > 1.0 + FLOAT_REL_TOLERANCE {
            return Err(ConfigError::LadderOversubscribed { total });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningBucketConfig {
    pub fleet: FleetConfig,
    #[serde(default = "default_base_yield_apr")]
    pub base_yield_apr: f64,
    #[serde(default = "default_bonus_yield_apr")]
    pub bonus_yield_apr: f64,
    #[serde(default)]
    pub take_profit_ladder: Vec<LadderRung>,
}

/// Commercial fees, all in percent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CommercialConfig {
    #[serde(default)]
    pub upfront_pct: f64,
    /// Annual management fee on assets under management.
    #[serde(default)]
    pub management_pct: f64,
    /// Share of capitalization value above its initial allocation.
    #[serde(default)]
    pub performance_pct: f64,
}

impl CommercialConfig {
    pub fn is_empty(&self) -> bool {
        self.upfront_pct == 0.0 && self.management_pct == 0.0 && self.performance_pct == 0.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("commercial.upfront_pct", self.upfront_pct)?;
        non_negative("commercial.management_pct", self.management_pct)?;
        non_negative("commercial.performance_pct", self.performance_pct)?;
        if self.upfront_pct >= 100.0 {
            return Err(ConfigError::FractionOutOfRange {
                field: "commercial.upfront_pct",
                value: self.upfront_pct / 100.0,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseCheckFrequency {
    Monthly,
    #[default]
    Quarterly,
}

impl CloseCheckFrequency {
    pub fn period_months(&self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Quarterly => crate::constants::MONTHS_PER_QUARTER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarlyCloseConfig {
    /// Cumulative yield, as percent of capital raised, that closes the product.
    pub target_pct: f64,
    #[serde(default)]
    pub frequency: CloseCheckFrequency,
}

impl Default for EarlyCloseConfig {
    fn default() -> Self {
        Self {
            target_pct: DEFAULT_EARLY_CLOSE_TARGET_PCT,
            frequency: CloseCheckFrequency::Quarterly,
        }
    }
}

/// The three-bucket product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductConfig {
    pub capital_raised: f64,
    pub tenor_months: u32,
    pub allocation: Allocation,
    pub yield_bucket: YieldBucketConfig,
    pub holding_bucket: HoldingBucketConfig,
    pub mining_bucket: MiningBucketConfig,
    #[serde(default)]
    pub commercial: CommercialConfig,
    #[serde(default)]
    pub early_close: EarlyCloseConfig,
}

impl ProductConfig {
    /// Bucket amounts before any fee is taken.
    pub fn gross_amounts(&self) -> BucketAmounts {
        BucketAmounts {
            yield_bucket: self.capital_raised * self.allocation.yield_pct / 100.0,
            holding: self.capital_raised * self.allocation.holding_pct / 100.0,
            mining: self.capital_raised * self.allocation.mining_pct / 100.0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("capital_raised", self.capital_raised)?;
        if self.tenor_months == 0 {
            return Err(ConfigError::ZeroTenor);
        }
        self.allocation.validate()?;

        non_negative("yield_bucket.base_apr", self.yield_bucket.base_apr)?;
        for (index, entry) in self.yield_bucket.schedule.iter().enumerate() {
            if entry.from_month > entry.to_month {
                return Err(ConfigError::InvalidSchedule {
                    index,
                    from: entry.from_month,
                    to: entry.to_month,
                });
            }
            non_negative("yield_bucket.schedule.apr", entry.apr)?;
        }

        self.holding_bucket.validate()?;
        if self.allocation.holding_pct == 0.0 {
            // The target sell price divides by the held quantity.
            return Err(ConfigError::ZeroDenominator("allocation.holding_pct"));
        }

        let mining = &self.mining_bucket;
        mining.fleet.validate()?;
        non_negative("mining_bucket.base_yield_apr", mining.base_yield_apr)?;
        non_negative("mining_bucket.bonus_yield_apr", mining.bonus_yield_apr)?;
        validate_ladder(&mining.take_profit_ladder)?;

        self.commercial.validate()?;
        non_negative("early_close.target_pct", self.early_close.target_pct)?;
        Ok(())
    }
}

/// The collateralised alternative: hold the asset, borrow against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralConfig {
    pub capital_raised: f64,
    pub tenor_months: u32,
    /// Share of (post-fee) capital converted to collateral; the remainder is
    /// kept as a cash reserve.
    #[serde(default = "default_collateral_pct")]
    pub collateral_allocation_pct: f64,
    pub buying_price: f64,
    /// Loan-to-value ceiling for new borrowing, as a fraction.
    pub max_ltv: f64,
    pub borrowing_apr: f64,
    /// Loan-to-value at which the position is flagged for liquidation risk.
    pub liquidation_ltv: f64,
    pub fleet: FleetConfig,
    #[serde(default)]
    pub strike_ladder: Vec<LadderRung>,
    #[serde(default = "default_reserve_yield_apr")]
    pub reserve_yield_apr: f64,
    #[serde(default = "default_base_yield_apr")]
    pub base_yield_apr: f64,
    #[serde(default = "default_bonus_yield_apr")]
    pub bonus_yield_apr: f64,
    #[serde(default)]
    pub early_close: EarlyCloseConfig,
    #[serde(default)]
    pub commercial: CommercialConfig,
}

impl CollateralConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("capital_raised", self.capital_raised)?;
        if self.tenor_months == 0 {
            return Err(ConfigError::ZeroTenor);
        }
        if self.buying_price == 0.0 {
            return Err(ConfigError::ZeroDenominator("buying_price"));
        }
        positive("buying_price", self.buying_price)?;
        fraction(
            "collateral_allocation_pct",
            self.collateral_allocation_pct / 100.0,
        )?;
        fraction("max_ltv", self.max_ltv)?;
        positive("liquidation_ltv", self.liquidation_ltv)?;
        if self.max_ltv >= self.liquidation_ltv {
            return Err(ConfigError::LtvOrdering {
                max_ltv: self.max_ltv,
                liquidation_ltv: self.liquidation_ltv,
            });
        }
        non_negative("borrowing_apr", self.borrowing_apr)?;
        non_negative("reserve_yield_apr", self.reserve_yield_apr)?;
        non_negative("base_yield_apr", self.base_yield_apr)?;
        non_negative("bonus_yield_apr", self.bonus_yield_apr)?;
        self.fleet.validate()?;
        validate_ladder(&self.strike_ladder)?;
        self.commercial.validate()?;
        non_negative("early_close.target_pct", self.early_close.target_pct)?;
        Ok(())
    }
}

/// The product under simulation, selected once at the entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ProductSpec {
    Buckets(ProductConfig),
    Collateral(CollateralConfig),
}

impl ProductSpec {
    pub fn tenor_months(&self) -> u32 {
        match self {
            Self::Buckets(c) => c.tenor_months,
            Self::Collateral(c) => c.tenor_months,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Buckets(c) => c.validate(),
            Self::Collateral(c) => c.validate(),
        }
    }
}

fn default_base_yield_apr() -> f64 {
    DEFAULT_BASE_YIELD_APR
}

fn default_bonus_yield_apr() -> f64 {
    DEFAULT_BONUS_YIELD_APR
}

fn default_reserve_yield_apr() -> f64 {
    DEFAULT_RESERVE_YIELD_APR
}

fn default_capital_recon_pct() -> f64 {
    DEFAULT_CAPITAL_RECON_PCT
}

fn default_collateral_pct() -> f64 {
    100.0
}

/// Ready-made configurations for tests across the workspace.
#[cfg(any(test, feature = "testing"))]
pub mod fixtures {
    use super::*;
    use crate::types::{Calibration, HostingSite, MaintenanceBasis, MinerSpec};

    pub fn fleet(miner_count: u32) -> FleetConfig {
        FleetConfig {
            miner: MinerSpec {
                name: "S21".into(),
                hashrate_th: 200.0,
                power_w: 3_500.0,
                unit_price: 5_000.0,
                lifetime_months: 48,
                maintenance_pct: 0.02,
            },
            hosting: HostingSite {
                name: "Hydro".into(),
                electricity_rate: 0.05,
                hosting_fee_per_kw_month: 5.0,
                uptime_expectation: 0.95,
                curtailment_pct: 0.0,
                capacity_mw: None,
            },
            miner_count,
            maintenance_basis: MaintenanceBasis::FleetValue,
            calibration: Calibration::default(),
        }
    }

    /// 10M raised, 30/30/40, buying price 90k, 36 months.
    pub fn product() -> ProductConfig {
        ProductConfig {
            capital_raised: 10_000_000.0,
            tenor_months: 36,
            allocation: Allocation {
                yield_pct: 30.0,
                holding_pct: 30.0,
                mining_pct: 40.0,
            },
            yield_bucket: YieldBucketConfig {
                base_apr: 0.06,
                schedule: Vec::new(),
                compounding: false,
            },
            holding_bucket: HoldingBucketConfig {
                buying_price: 90_000.0,
                target_sell_price: None,
                capital_recon_pct: DEFAULT_CAPITAL_RECON_PCT,
                extra_yield_strikes: Vec::new(),
            },
            mining_bucket: MiningBucketConfig {
                fleet: fleet(800),
                base_yield_apr: DEFAULT_BASE_YIELD_APR,
                bonus_yield_apr: DEFAULT_BONUS_YIELD_APR,
                take_profit_ladder: Vec::new(),
            },
            commercial: CommercialConfig::default(),
            early_close: EarlyCloseConfig::default(),
        }
    }

    pub fn collateral() -> CollateralConfig {
        CollateralConfig {
            capital_raised: 10_000_000.0,
            tenor_months: 36,
            collateral_allocation_pct: 100.0,
            buying_price: 90_000.0,
            max_ltv: 0.5,
            borrowing_apr: 0.08,
            liquidation_ltv: 0.8,
            fleet: fleet(200),
            strike_ladder: Vec::new(),
            reserve_yield_apr: DEFAULT_RESERVE_YIELD_APR,
            base_yield_apr: DEFAULT_BASE_YIELD_APR,
            bonus_yield_apr: DEFAULT_BONUS_YIELD_APR,
            early_close: EarlyCloseConfig::default(),
            commercial: CommercialConfig::default(),
        }
    }
}
