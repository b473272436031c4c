//! Blending a fleet spread over several hosting sites into one effective site.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use minewell_core::constants::{LOW_UPTIME_WARNING, W_PER_KW};
use minewell_core::error::ConfigError;
use minewell_core::numeric::StableSum;
use minewell_core::types::{HostingSite, MinerSpec};

/// A batch of miners placed at one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteAllocation {
    pub site: HostingSite,
    pub miner: MinerSpec,
    pub miner_count: u32,
}

impl SiteAllocation {
    pub fn power_kw(&self) -> f64 {
        self.miner.power_w * f64::from(self.miner_count) / W_PER_KW
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteLoad {
    pub site_name: String,
    pub power_kw: f64,
    pub capacity_kw: Option<f64>,
    pub miner_count: u32,
}

/// Power-weighted terms across all sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostingBlend {
    pub total_power_kw: f64,
    pub electricity_rate: f64,
    pub hosting_fee_per_kw_month: f64,
    pub uptime_expectation: f64,
    pub curtailment_pct: f64,
    pub per_site: Vec<SiteLoad>,
    pub warnings: Vec<String>,
}

impl HostingBlend {
    /// The blend as a single site usable in a [`FleetConfig`](minewell_core::types::FleetConfig).
    pub fn as_site(&self, name: impl Into<String>) -> HostingSite {
        HostingSite {
            name: name.into(),
            electricity_rate: self.electricity_rate,
            hosting_fee_per_kw_month: self.hosting_fee_per_kw_month,
            uptime_expectation: self.uptime_expectation,
            curtailment_pct: self.curtailment_pct,
            capacity_mw: None,
        }
    }
}

/// Blend site terms weighted by the power each site carries.
///
/// Sites are grouped by name. Returns an error when the allocations carry no
/// power at all, since every blended term would divide by zero.
pub fn blend_allocations(allocations: &[SiteAllocation]) -> Result<HostingBlend, ConfigError> {
    let mut total = StableSum::new();
    let mut elec = StableSum::new();
    let mut fee = StableSum::new();
    let mut uptime = StableSum::new();
    let mut curtail = StableSum::new();
    let mut per_site: BTreeMap<&str, (SiteLoad, &HostingSite)> = BTreeMap::new();

    for alloc in allocations {
        alloc.site.validate()?;
        let kw = alloc.power_kw();
        total.add(kw);
        elec.add(kw * alloc.site.electricity_rate);
        fee.add(kw * alloc.site.hosting_fee_per_kw_month);
        uptime.add(kw * alloc.site.uptime_expectation);
        curtail.add(kw * alloc.site.curtailment_pct);

        let entry = per_site.entry(alloc.site.name.as_str()).or_insert_with(|| {
            (
                SiteLoad {
                    site_name: alloc.site.name.clone(),
                    power_kw: 0.0,
                    capacity_kw: alloc.site.capacity_mw.map(|mw| mw * W_PER_KW),
                    miner_count: 0,
                },
                &alloc.site,
            )
        });
        entry.0.power_kw += kw;
        entry.0.miner_count += alloc.miner_count;
    }

    let total_kw = total.value();
    if total_kw <= 0.0 {
        return Err(ConfigError::ZeroDenominator("site allocation power"));
    }

    let mut warnings = Vec::new();
    for (load, _) in per_site.values() {
        if let Some(cap) = load.capacity_kw
            && load.power_kw > cap
        {
            warnings.push(format!(
                "capacity exceeded at {}: {:.1} kW allocated vs {:.1} kW available",
                load.site_name, load.power_kw, cap
            ));
        }
    }
    if per_site.len() == 1 {
        warnings.push("single-site concentration: all miners at one location".to_string());
    }
    for (load, site) in per_site.values() {
        if site.uptime_expectation < LOW_UPTIME_WARNING {
            warnings.push(format!(
                "low uptime at {}: {:.0}%",
                load.site_name,
                site.uptime_expectation * 100.0
            ));
        }
    }
    for w in &warnings {
        warn!(warning = %w, "hosting allocation");
    }

    Ok(HostingBlend {
        total_power_kw: total_kw,
        electricity_rate: elec.value() / total_kw,
        hosting_fee_per_kw_month: fee.value() / total_kw,
        uptime_expectation: uptime.value() / total_kw,
        curtailment_pct: curtail.value() / total_kw,
        per_site: per_site.into_values().map(|(load, _)| load).collect(),
        warnings,
    })
}
