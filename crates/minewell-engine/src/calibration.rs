//! Calibrating the production model against realised fleet history.

use serde::{Deserialize, Serialize};
use tracing::warn;

use minewell_core::numeric::{StableSum, ratio_or};
use minewell_core::types::{Calibration, FleetConfig};

use crate::production::ProductionModel;

const UPTIME_FACTOR_FLOOR: f64 = 0.90;
const PRODUCTION_GAP_FLOOR: f64 = 0.85;
const PRODUCTION_CONSERVATIVE_CEILING: f64 = 1.10;

/// One month of observed operations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpsObservation {
    pub month: u32,
    pub quantity_produced: f64,
    pub uptime: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthComparison {
    pub month: u32,
    pub predicted_quantity: f64,
    pub actual_quantity: f64,
    pub variance_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub uptime_factor: f64,
    pub production_adjustment: f64,
    pub variance_p50: f64,
    pub variance_p90: f64,
    pub months: Vec<MonthComparison>,
    pub flags: Vec<String>,
}

impl CalibrationReport {
    /// Factors to feed back into a [`FleetConfig`].
    pub fn calibration(&self) -> Calibration {
        Calibration {
            uptime_factor: self.uptime_factor,
            production_adjustment: self.production_adjustment,
        }
    }
}

/// Compare an uncalibrated model of `fleet` against `history`.
///
/// Observations whose month falls outside `hashprice` are skipped. The
/// fleet's own calibration is ignored so repeated calibration is stable.
pub fn calibrate(
    history: &[OpsObservation],
    hashprice: &[f64],
    fleet: &FleetConfig,
) -> CalibrationReport {
    let raw = FleetConfig {
        calibration: Calibration::default(),
        ..fleet.clone()
    };
    let model = ProductionModel::new(&raw);
    let assumed_uptime = raw.hosting.effective_uptime();

    let mut actual = StableSum::new();
    let mut predicted = StableSum::new();
    let mut uptime = StableSum::new();
    let mut months = Vec::with_capacity(history.len());

    for obs in history {
        let Some(&hp) = hashprice.get(obs.month as usize) else {
            continue;
        };
        // Price only matters for revenue-based maintenance, which is unused here.
        let predicted_quantity = model.month(hp, 0.0).quantity;
        actual.add(obs.quantity_produced);
        predicted.add(predicted_quantity);
        uptime.add(obs.uptime);
        months.push(MonthComparison {
            month: obs.month,
            predicted_quantity,
            actual_quantity: obs.quantity_produced,
            variance_pct: ratio_or(
                obs.quantity_produced - predicted_quantity,
                predicted_quantity,
                0.0,
            ) * 100.0,
        });
    }

    let n = months.len() as f64;
    let uptime_factor = if months.is_empty() {
        1.0
    } else {
        ratio_or(uptime.value() / n, assumed_uptime, 1.0)
    };
    let production_adjustment = ratio_or(actual.value(), predicted.value(), 1.0);

    let mut flags = Vec::new();
    if uptime_factor < UPTIME_FACTOR_FLOOR {
        flags.push(format!(
            "realised uptime factor {uptime_factor:.2} is below {UPTIME_FACTOR_FLOOR:.2}; model is optimistic"
        ));
    }
    if production_adjustment < PRODUCTION_GAP_FLOOR {
        flags.push(format!(
            "production is {:.0}% below model",
            (1.0 - production_adjustment) * 100.0
        ));
    }
    if production_adjustment > PRODUCTION_CONSERVATIVE_CEILING {
        flags.push(format!(
            "production is {:.0}% above model; model may be conservative",
            (production_adjustment - 1.0) * 100.0
        ));
    }
    for f in &flags {
        warn!(flag = %f, "ops calibration");
    }

    let mut variances: Vec<f64> = months.iter().map(|m| m.variance_pct).collect();
    variances.sort_by(f64::total_cmp);

    CalibrationReport {
        uptime_factor,
        production_adjustment,
        variance_p50: percentile(&variances, 0.5),
        variance_p90: percentile(&variances, 0.9),
        months,
        flags,
    }
}

/// Lower nearest-rank percentile of sorted values; 0 when empty.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 * q) as usize).min(sorted.len() - 1);
    sorted[idx]
}
