//! Fleet, hosting and ladder building blocks shared by both product modes.

use serde::{Deserialize, Serialize};

use crate::constants::W_PER_KW;
use crate::error::ConfigError;

/// A miner model as published by the hardware vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinerSpec {
    #[serde(default)]
    pub name: String,
    /// Hash rate per unit in TH/s.
    pub hashrate_th: f64,
    /// Power draw per unit in watts.
    pub power_w: f64,
    /// Purchase price per unit.
    pub unit_price: f64,
    /// Useful life used for straight-line depreciation.
    pub lifetime_months: u32,
    /// Maintenance cost as a fraction (of fleet value per year, or of mined
    /// revenue, depending on [`MaintenanceBasis`]).
    pub maintenance_pct: f64,
}

impl MinerSpec {
    /// Efficiency in joules per terahash.
    pub fn efficiency_j_per_th(&self) -> Option<f64> {
        (self.hashrate_th > 0.0).then(|| self.power_w / self.hashrate_th)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("miner.hashrate_th", self.hashrate_th)?;
        positive("miner.power_w", self.power_w)?;
        non_negative("miner.unit_price", self.unit_price)?;
        fraction("miner.maintenance_pct", self.maintenance_pct)?;
        if self.lifetime_months == 0 {
            return Err(ConfigError::ZeroDenominator("miner.lifetime_months"));
        }
        Ok(())
    }
}

/// Terms offered by a hosting site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostingSite {
    #[serde(default)]
    pub name: String,
    /// Electricity price per kWh.
    pub electricity_rate: f64,
    /// Flat hosting fee per kW of installed load per month.
    #[serde(default)]
    pub hosting_fee_per_kw_month: f64,
    /// Expected share of the month the fleet is hashing.
    pub uptime_expectation: f64,
    /// Share of uptime lost to grid curtailment.
    #[serde(default)]
    pub curtailment_pct: f64,
    /// Site capacity in MW, if capped.
    #[serde(default)]
    pub capacity_mw: Option<f64>,
}

impl HostingSite {
    /// `uptime × (1 − curtailment)`.
    pub fn effective_uptime(&self) -> f64 {
        self.uptime_expectation * (1.0 - self.curtailment_pct)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("hosting.electricity_rate", self.electricity_rate)?;
        non_negative("hosting.hosting_fee_per_kw_month", self.hosting_fee_per_kw_month)?;
        fraction("hosting.uptime_expectation", self.uptime_expectation)?;
        fraction("hosting.curtailment_pct", self.curtailment_pct)?;
        if let Some(mw) = self.capacity_mw {
            non_negative("hosting.capacity_mw", mw)?;
        }
        Ok(())
    }
}

/// What the maintenance percentage is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceBasis {
    /// Annual percentage of the fleet's purchase value, charged monthly.
    #[default]
    FleetValue,
    /// Percentage of the month's mined output at spot.
    Revenue,
}

/// Realised-vs-model correction factors from ops calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub uptime_factor: f64,
    pub production_adjustment: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            uptime_factor: 1.0,
            production_adjustment: 1.0,
        }
    }
}

/// A deployed fleet: miner model × count at one hosting site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    pub miner: MinerSpec,
    pub hosting: HostingSite,
    pub miner_count: u32,
    #[serde(default)]
    pub maintenance_basis: MaintenanceBasis,
    #[serde(default)]
    pub calibration: Calibration,
}

impl FleetConfig {
    pub fn fleet_hashrate_th(&self) -> f64 {
        self.miner.hashrate_th * f64::from(self.miner_count)
    }

    pub fn fleet_power_kw(&self) -> f64 {
        self.miner.power_w * f64::from(self.miner_count) / W_PER_KW
    }

    /// Purchase value of the whole fleet.
    pub fn fleet_value(&self) -> f64 {
        self.miner.unit_price * f64::from(self.miner_count)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.miner.validate()?;
        self.hosting.validate()?;
        non_negative("calibration.uptime_factor", self.calibration.uptime_factor)?;
        non_negative(
            "calibration.production_adjustment",
            self.calibration.production_adjustment,
        )?;
        Ok(())
    }
}

/// One rung of a trigger-once ladder: when spot reaches `price_trigger`,
/// sell `sell_fraction` of the quantity held at that moment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LadderRung {
    pub price_trigger: f64,
    pub sell_fraction: f64,
}

/// Validate every rung of a ladder.
pub fn validate_ladder(rungs: &[LadderRung]) -> Result<(), ConfigError> {
    for (index, rung) in rungs.iter().enumerate() {
        if !(rung.price_trigger.is_finite() && rung.price_trigger > 0.0) {
            return Err(ConfigError::InvalidLadderRung {
                index,
                reason: format!("price trigger {} must be positive", rung.price_trigger),
            });
        }
        if !(rung.sell_fraction > 0.0 && rung.sell_fraction <= 1.0) {
            return Err(ConfigError::InvalidLadderRung {
                index,
                reason: format!("sell fraction {} must lie in (0, 1]", rung.sell_fraction),
            });
        }
    }
    Ok(())
}

pub(crate) fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

pub(crate) fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

pub(crate) fn fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::FractionOutOfRange { field, value })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn effective_uptime_applies_curtailment() {
        let site = HostingSite {
            curtailment_pct: 0.1,
            ..hydro_site()
        };
        assert!((site.effective_uptime() - 0.855).abs() < 1e-12);
    }

    #[test]
    fn fleet_aggregates_scale_with_count() {
        let f = fleet(100);
        assert_eq!(f.fleet_hashrate_th(), 14_000.0);
        assert_eq!(f.fleet_power_kw(), 301.0);
        assert_eq!(f.fleet_value(), 400_000.0);
    }

    #[test]
    fn efficiency_in_joules_per_th() {
        let e = s19().efficiency_j_per_th().unwrap();
        assert!((e - 21.5).abs() < 1e-12);
    }

    #[test]
    fn zero_lifetime_is_a_zero_denominator() {
        let miner = MinerSpec {
            lifetime_months: 0,
            ..s19()
        };
        assert_eq!(
            miner.validate(),
            Err(ConfigError::ZeroDenominator("miner.lifetime_months"))
        );
    }

    #[test]
    fn uptime_above_one_rejected() {
        let site = HostingSite {
            uptime_expectation: 1.2,
            ..hydro_site()
        };
        assert!(matches!(
            site.validate(),
            Err(ConfigError::FractionOutOfRange { field: "hosting.uptime_expectation", .. })
        ));
    }

    #[test]
    fn ladder_rejects_zero_fraction_and_bad_trigger() {
        let bad_fraction = [LadderRung { price_trigger: 100.0, sell_fraction: 0.0 }];
        assert!(validate_ladder(&bad_fraction).is_err());
        let bad_trigger = [LadderRung { price_trigger: f64::NAN, sell_fraction: 0.5 }];
        assert!(validate_ladder(&bad_trigger).is_err());
        let ok = [LadderRung { price_trigger: 150_000.0, sell_fraction: 1.0 }];
        assert!(validate_ladder(&ok).is_ok());
    }

    #[test]
    fn fleet_deserializes_with_defaults() {
        let json = r#"{
            "miner": {"hashrate_th": 200.0, "power_w": 3500.0, "unit_price": 5000.0,
                      "lifetime_months": 36, "maintenance_pct": 0.02},
            "hosting": {"electricity_rate": 0.06, "uptime_expectation": 0.97},
            "miner_count": 10
        }"#;
        let f: FleetConfig = serde_json::from_str(json).unwrap();
        assert_eq!(f.maintenance_basis, MaintenanceBasis::FleetValue);
        assert_eq!(f.calibration, Calibration::default());
        assert_eq!(f.hosting.curtailment_pct, 0.0);
    }
}
