//! Subcommand implementations. Every command reads JSON inputs and writes a
//! JSON document to a file or stdout.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use minewell_core::config::ProductSpec;
use minewell_core::curves::{
    CurveSet, NetworkCurveSpec, PriceCurveSpec, ScenarioCurves, network_curve, price_curve,
};
use minewell_core::scenario::Scenario;
use minewell_core::types::FleetConfig;
use minewell_engine::calibration::{OpsObservation, calibrate};
use minewell_engine::hosting::{SiteAllocation, blend_allocations};
use minewell_engine::production::unit_economics;
use minewell_engine::simulate::{RunResult, simulate};

/// Recipe for one scenario's generated curves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioCurveSpec {
    pub price: PriceCurveSpec,
    pub network: NetworkCurveSpec,
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn write_json<T: Serialize>(value: &T, output: Option<&Path>, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .context("Failed to serialize output")?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
        }
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

fn scenario_curves(curves: &CurveSet, scenario: Scenario) -> Result<&ScenarioCurves> {
    curves
        .get(scenario)
        .with_context(|| format!("Curve file has no {scenario} scenario"))
}

pub fn run_simulate(
    product: &Path,
    curves: &Path,
    scenario: Option<Scenario>,
) -> Result<RunResult> {
    let spec: ProductSpec = read_json(product)?;
    let mut set: CurveSet = read_json(curves)?;
    if let Some(only) = scenario {
        let selected = scenario_curves(&set, only)?.clone();
        set = CurveSet::new().with(only, selected);
    }

    let result = simulate(&spec, &set).context("Simulation failed")?;
    match &result {
        RunResult::Buckets(scenarios) => {
            for (scenario, r) in scenarios {
                info!(
                    %scenario,
                    decision = %r.aggregated.decision,
                    net_return_pct = r.aggregated.metrics.total_return_pct.net,
                    deficit_months = r.mining_summary.deficit_months,
                    "result"
                );
            }
        }
        RunResult::Collateral(scenarios) => {
            for (scenario, r) in scenarios {
                info!(
                    %scenario,
                    final_ltv = r.summary.final_ltv,
                    net_equity = r.summary.net_equity.net,
                    strikes_fired = r.summary.strikes_fired,
                    "result"
                );
            }
        }
    }
    Ok(result)
}

/// Build a [`CurveSet`] from per-scenario recipes.
///
/// With `band_pct`, the file must hold only a `base` recipe; bear and bull
/// are derived from it by the confidence band.
pub fn run_curves(spec: &Path, band_pct: Option<f64>) -> Result<CurveSet> {
    let recipes: BTreeMap<Scenario, ScenarioCurveSpec> = read_json(spec)?;
    if recipes.is_empty() {
        bail!("Curve recipe file {} names no scenarios", spec.display());
    }
    if let Some(band) = band_pct {
        if recipes.len() != 1 {
            bail!("--band derives bear and bull from a single base recipe, {} has {}", spec.display(), recipes.len());
        }
        let recipe = recipes
            .get(&Scenario::Base)
            .with_context(|| format!("--band needs a base recipe in {}", spec.display()))?;
        let base = generate(Scenario::Base, recipe)?;
        return CurveSet::banded(&base, band).context("Confidence band derivation failed");
    }
    let mut set = CurveSet::new();
    for (scenario, recipe) in &recipes {
        set.insert(*scenario, generate(*scenario, recipe)?);
    }
    Ok(set)
}

fn generate(scenario: Scenario, recipe: &ScenarioCurveSpec) -> Result<ScenarioCurves> {
    if recipe.price.months != recipe.network.months {
        bail!(
            "{scenario}: price curve has {} months but network curve has {}",
            recipe.price.months,
            recipe.network.months
        );
    }
    let prices = price_curve(&recipe.price).with_context(|| format!("{scenario} price curve"))?;
    let network = network_curve(&recipe.network).with_context(|| format!("{scenario} network curve"))?;
    for w in &network.warnings {
        warn!(%scenario, "{w}");
    }
    Ok(ScenarioCurves {
        prices,
        hashprice: network.hashprice,
    })
}

pub fn run_allocate(sites: &Path) -> Result<minewell_engine::hosting::HostingBlend> {
    let allocations: Vec<SiteAllocation> = read_json(sites)?;
    let blend = blend_allocations(&allocations).context("Hosting blend failed")?;
    info!(
        total_power_kw = blend.total_power_kw,
        electricity_rate = blend.electricity_rate,
        warnings = blend.warnings.len(),
        "hosting blend"
    );
    Ok(blend)
}

pub fn run_calibrate(
    fleet: &Path,
    history: &Path,
    curves: &Path,
    scenario: Scenario,
) -> Result<minewell_engine::calibration::CalibrationReport> {
    let fleet: FleetConfig = read_json(fleet)?;
    let history: Vec<OpsObservation> = read_json(history)?;
    let set: CurveSet = read_json(curves)?;
    let c = scenario_curves(&set, scenario)?;
    let report = calibrate(&history, &c.hashprice, &fleet);
    for flag in &report.flags {
        warn!("{flag}");
    }
    Ok(report)
}

pub fn run_unit_economics(
    fleet: &Path,
    curves: &Path,
    scenario: Scenario,
) -> Result<minewell_engine::production::UnitEconomics> {
    let fleet: FleetConfig = read_json(fleet)?;
    let set: CurveSet = read_json(curves)?;
    let c = scenario_curves(&set, scenario)?;
    let economics = unit_economics(&fleet.miner, &fleet.hosting, &c.prices, &c.hashprice);
    info!(
        break_even_month = ?economics.break_even_month,
        total_ebit = economics.total_ebit,
        "unit economics"
    );
    Ok(economics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minewell_core::config::fixtures::{fleet, product};

    fn flat_set(months: usize) -> CurveSet {
        let flat = |p: f64, h: f64| ScenarioCurves {
            prices: vec![p; months],
            hashprice: vec![h; months],
        };
        CurveSet::new()
            .with(Scenario::Bear, flat(60_000.0, 0.000_4))
            .with(Scenario::Base, flat(100_000.0, 0.000_5))
            .with(Scenario::Bull, flat(250_000.0, 0.000_6))
    }

    #[test]
    fn simulate_round_trips_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let product_path = dir.path().join("product.json");
        let curves_path = dir.path().join("curves.json");
        let out_path = dir.path().join("out").join("result.json");
        write_json(&ProductSpec::Buckets(product()), Some(&product_path), true).unwrap();
        write_json(&flat_set(36), Some(&curves_path), false).unwrap();

        let result = run_simulate(&product_path, &curves_path, None).unwrap();
        write_json(&result, Some(&out_path), false).unwrap();
        assert_eq!(result.scenarios(), Scenario::ALL.to_vec());
        let back: serde_json::Value = read_json(&out_path).unwrap();
        assert_eq!(back["mode"], "buckets");
        assert_eq!(back["scenarios"].as_object().map(|m| m.len()), Some(3));
    }

    #[test]
    fn simulate_can_select_one_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let product_path = dir.path().join("product.json");
        let curves_path = dir.path().join("curves.json");
        write_json(&ProductSpec::Buckets(product()), Some(&product_path), false).unwrap();
        write_json(&flat_set(36), Some(&curves_path), false).unwrap();

        let result = run_simulate(&product_path, &curves_path, Some(Scenario::Bull)).unwrap();
        assert_eq!(result.scenarios(), vec![Scenario::Bull]);
    }

    #[test]
    fn missing_input_file_reports_path() {
        let err = run_simulate(Path::new("/nonexistent/p.json"), Path::new("c.json"), None).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/p.json"));
    }

    #[test]
    fn curves_are_generated_per_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let recipe_path = dir.path().join("recipe.json");
        let recipe = serde_json::json!({
            "base": {
                "price": {"start_price": 90000.0, "months": 36, "anchors": {"1": 120000.0}},
                "network": {"months": 36, "starting_hashrate_eh": 700.0, "monthly_growth": 0.02,
                            "starting_fees_per_block": 0.1}
            }
        });
        fs::write(&recipe_path, recipe.to_string()).unwrap();
        let set = run_curves(&recipe_path, None).unwrap();
        let base = set.get(Scenario::Base).unwrap();
        assert_eq!(base.prices.len(), 36);
        assert_eq!(base.hashprice.len(), 36);
        assert_eq!(base.prices[12], 120_000.0);
    }

    #[test]
    fn mismatched_recipe_lengths_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let recipe_path = dir.path().join("recipe.json");
        let recipe = serde_json::json!({
            "bear": {
                "price": {"start_price": 90000.0, "months": 24},
                "network": {"months": 36, "starting_hashrate_eh": 700.0, "monthly_growth": 0.0,
                            "starting_fees_per_block": 0.1}
            }
        });
        fs::write(&recipe_path, recipe.to_string()).unwrap();
        assert!(run_curves(&recipe_path, None).is_err());
    }

    #[test]
    fn band_derives_bear_and_bull_from_base() {
        let dir = tempfile::tempdir().unwrap();
        let recipe_path = dir.path().join("recipe.json");
        let recipe = serde_json::json!({
            "base": {
                "price": {"start_price": 100000.0, "months": 12},
                "network": {"months": 12, "starting_hashrate_eh": 700.0, "monthly_growth": 0.0,
                            "starting_fees_per_block": 0.1}
            }
        });
        fs::write(&recipe_path, recipe.to_string()).unwrap();
        let set = run_curves(&recipe_path, Some(10.0)).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.get(Scenario::Bear).unwrap().prices[0], 90_000.0);
        assert_eq!(set.get(Scenario::Bull).unwrap().prices[0], 110_000.0);
    }

    #[test]
    fn band_needs_a_lone_base_recipe() {
        let dir = tempfile::tempdir().unwrap();
        let recipe_path = dir.path().join("recipe.json");
        let leg = serde_json::json!({
            "price": {"start_price": 100000.0, "months": 12},
            "network": {"months": 12, "starting_hashrate_eh": 700.0, "monthly_growth": 0.0,
                        "starting_fees_per_block": 0.1}
        });
        fs::write(&recipe_path, serde_json::json!({"bull": leg}).to_string()).unwrap();
        assert!(run_curves(&recipe_path, Some(10.0)).is_err());
        fs::write(&recipe_path, serde_json::json!({"base": leg, "bull": leg}).to_string()).unwrap();
        assert!(run_curves(&recipe_path, Some(10.0)).is_err());
    }

    #[test]
    fn unit_economics_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let fleet_path = dir.path().join("fleet.json");
        let curves_path = dir.path().join("curves.json");
        write_json(&fleet(1), Some(&fleet_path), false).unwrap();
        write_json(&flat_set(48), Some(&curves_path), false).unwrap();
        let e = run_unit_economics(&fleet_path, &curves_path, Scenario::Base).unwrap();
        assert_eq!(e.months.len(), 48);
    }
}
