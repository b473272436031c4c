//! Exogenous monthly curves and deterministic curve generators.
//!
//! A [`CurveSet`] maps each [`Scenario`] to a price series and a hash-price
//! series (asset mined per PH per day). The generators reproduce the
//! deterministic curve builders used to prepare scenario inputs:
//! anchor-interpolated price paths and a subsidy/fee/hash-rate network model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{
    BLOCKS_PER_DAY, DEFAULT_BLOCK_SUBSIDY, FEE_MONTHLY_GROWTH, PRICE_NOISE_AMPLITUDE, TH_PER_PH,
};
use crate::error::CurveError;
use crate::scenario::Scenario;
use crate::traits::CurveSource;

/// One scenario's monthly inputs. Index 0 is the first simulated month.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScenarioCurves {
    /// Spot price of the mined asset.
    pub prices: Vec<f64>,
    /// Network hash-price in asset units per PH per day.
    pub hashprice: Vec<f64>,
}

impl ScenarioCurves {
    /// Check both series cover `tenor` months with usable values.
    ///
    /// Prices must be strictly positive (every waterfall step divides by
    /// spot); hash-price may be zero but not negative.
    pub fn validate(&self, scenario: Scenario, tenor: usize) -> Result<(), CurveError> {
        check_series(scenario, "price", &self.prices, tenor, |v| v > 0.0)?;
        check_series(scenario, "hashprice", &self.hashprice, tenor, |v| v >= 0.0)
    }

    /// Months both series cover.
    pub fn horizon(&self) -> usize {
        self.prices.len().min(self.hashprice.len())
    }
}

fn check_series(
    scenario: Scenario,
    series: &'static str,
    values: &[f64],
    tenor: usize,
    accept: impl Fn(f64) -> bool,
) -> Result<(), CurveError> {
    if values.len() < tenor {
        return Err(CurveError::InsufficientCoverage {
            scenario,
            series,
            have: values.len(),
            need: tenor,
        });
    }
    for (month, &value) in values.iter().take(tenor).enumerate() {
        if !value.is_finite() || !accept(value) {
            return Err(CurveError::InvalidPoint {
                scenario,
                series,
                month,
                value,
            });
        }
    }
    Ok(())
}

/// Fully materialised curves for every scenario of a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurveSet {
    scenarios: BTreeMap<Scenario, ScenarioCurves>,
}

impl CurveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, scenario: Scenario, curves: ScenarioCurves) -> Self {
        self.scenarios.insert(scenario, curves);
        self
    }

    pub fn insert(&mut self, scenario: Scenario, curves: ScenarioCurves) {
        self.scenarios.insert(scenario, curves);
    }

    pub fn get(&self, scenario: Scenario) -> Option<&ScenarioCurves> {
        self.scenarios.get(&scenario)
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// Derive all three scenarios from one base curve and a confidence band.
    ///
    /// Bear scales price and hash-price by `1 - band`, bull by `1 + band`.
    /// A zero band leaves the three scenarios identical and logs a warning.
    ///
    /// # Examples
    ///
    /// ```
    /// use minewell_core::curves::{CurveSet, ScenarioCurves};
    /// use minewell_core::scenario::Scenario;
    ///
    /// let base = ScenarioCurves { prices: vec![100_000.0; 12], hashprice: vec![0.0005; 12] };
    /// let set = CurveSet::banded(&base, 20.0).unwrap();
    /// assert_eq!(set.get(Scenario::Bear).unwrap().prices[0], 80_000.0);
    /// assert_eq!(set.get(Scenario::Bull).unwrap().prices[0], 120_000.0);
    /// ```
    pub fn banded(base: &ScenarioCurves, band_pct: f64) -> Result<Self, CurveError> {
        if !(band_pct.is_finite() && (0.0..100.0).contains(&band_pct)) {
            return Err(CurveError::Generation(format!(
                "confidence band {band_pct}% must lie in [0, 100)"
            )));
        }
        if band_pct == 0.0 {
            warn!("base curve reused for every scenario without a confidence band; bear and bull equal base");
        }
        let band = band_pct / 100.0;
        let scaled = |factor: f64| ScenarioCurves {
            prices: base.prices.iter().map(|p| round_cents(p * factor)).collect(),
            hashprice: base.hashprice.iter().map(|h| h * factor).collect(),
        };
        Ok(Self::new()
            .with(Scenario::Bear, scaled(1.0 - band))
            .with(Scenario::Base, base.clone())
            .with(Scenario::Bull, scaled(1.0 + band)))
    }
}

impl CurveSource for CurveSet {
    fn curves(&self, scenario: Scenario) -> Result<ScenarioCurves, CurveError> {
        self.scenarios
            .get(&scenario)
            .cloned()
            .ok_or(CurveError::MissingScenario(scenario))
    }

    fn scenarios(&self) -> Vec<Scenario> {
        self.scenarios.keys().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// Price curves
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Straight lines between anchors; flat after the last one.
    #[default]
    Linear,
    /// Hold each anchor until the next.
    Step,
    /// Use `custom_prices` verbatim.
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCurveSpec {
    pub start_price: f64,
    pub months: usize,
    /// Year index → price. Year `y` lands on month `12 * y`.
    #[serde(default)]
    pub anchors: BTreeMap<u32, f64>,
    #[serde(default)]
    pub interpolation: Interpolation,
    #[serde(default)]
    pub custom_prices: Vec<f64>,
    /// Seed for deterministic ±5% noise; `None` disables noise.
    #[serde(default)]
    pub noise_seed: Option<u64>,
}

/// Build a monthly price path from a [`PriceCurveSpec`].
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use minewell_core::curves::{price_curve, Interpolation, PriceCurveSpec};
///
/// let spec = PriceCurveSpec {
///     start_price: 100_000.0,
///     months: 13,
///     anchors: BTreeMap::from([(1, 124_000.0)]),
///     interpolation: Interpolation::Linear,
///     custom_prices: vec![],
///     noise_seed: None,
/// };
/// let prices = price_curve(&spec).unwrap();
/// assert_eq!(prices[0], 100_000.0);
/// assert_eq!(prices[6], 112_000.0);
/// assert_eq!(prices[12], 124_000.0);
/// ```
pub fn price_curve(spec: &PriceCurveSpec) -> Result<Vec<f64>, CurveError> {
    if spec.months == 0 {
        return Err(CurveError::Generation("price curve needs at least one month".into()));
    }
    if !(spec.start_price.is_finite() && spec.start_price > 0.0) {
        return Err(CurveError::Generation(format!(
            "start price {} must be positive",
            spec.start_price
        )));
    }

    let raw = match spec.interpolation {
        Interpolation::Custom => {
            let mut prices: Vec<f64> = spec.custom_prices.iter().take(spec.months).copied().collect();
            let fill = prices.last().copied().unwrap_or(spec.start_price);
            prices.resize(spec.months, fill);
            prices
        }
        Interpolation::Linear | Interpolation::Step => {
            let anchors = month_anchors(spec);
            (0..spec.months)
                .map(|m| anchored_price(&anchors, m, spec.interpolation))
                .collect()
        }
    };

    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            let factor = match spec.noise_seed {
                Some(seed) => 1.0 + deterministic_noise(seed, i as u64) * PRICE_NOISE_AMPLITUDE,
                None => 1.0,
            };
            round_cents(p * factor)
        })
        .collect())
}

fn month_anchors(spec: &PriceCurveSpec) -> Vec<(usize, f64)> {
    let mut anchors: BTreeMap<usize, f64> = BTreeMap::new();
    for (&year, &price) in &spec.anchors {
        let month = year as usize * 12;
        if month < spec.months {
            anchors.insert(month, price);
        } else if month == spec.months {
            anchors.insert(spec.months - 1, price);
        }
    }
    anchors.entry(0).or_insert(spec.start_price);
    anchors.into_iter().collect()
}

fn anchored_price(anchors: &[(usize, f64)], month: usize, mode: Interpolation) -> f64 {
    // anchors is sorted and always contains month 0.
    let lower = anchors
        .iter()
        .rev()
        .find(|(m, _)| *m <= month)
        .copied()
        .unwrap_or(anchors[0]);
    if mode == Interpolation::Step {
        return lower.1;
    }
    match anchors.iter().find(|(m, _)| *m >= month) {
        Some(&(upper_m, upper_p)) if upper_m != lower.0 => {
            let t = (month - lower.0) as f64 / (upper_m - lower.0) as f64;
            lower.1 + t * (upper_p - lower.1)
        }
        _ => lower.1,
    }
}

/// Deterministic value in `[-1, 1]` from a seed and month index.
pub fn deterministic_noise(seed: u64, index: u64) -> f64 {
    const MASK: u64 = 0xFFFF_FFFF;
    let mut x = seed ^ index.wrapping_mul(2_654_435_761);
    for _ in 0..3 {
        x = ((x ^ (x >> 16)).wrapping_mul(0x85EB_CA6B)) & MASK;
        x = ((x ^ (x >> 13)).wrapping_mul(0xC2B2_AE35)) & MASK;
        x = (x ^ (x >> 16)) & MASK;
    }
    (x as f64 / MASK as f64) * 2.0 - 1.0
}

fn round_cents(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Network curves
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeRegime {
    Low,
    #[default]
    Base,
    High,
}

impl FeeRegime {
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Low => 0.5,
            Self::Base => 1.0,
            Self::High => 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkCurveSpec {
    pub months: usize,
    pub starting_hashrate_eh: f64,
    /// Geometric monthly growth of network hash rate.
    pub monthly_growth: f64,
    /// Month indices at which the block subsidy halves.
    #[serde(default)]
    pub halving_months: Vec<u32>,
    #[serde(default = "default_subsidy")]
    pub starting_subsidy: f64,
    #[serde(default)]
    pub fee_regime: FeeRegime,
    pub starting_fees_per_block: f64,
}

fn default_subsidy() -> f64 {
    DEFAULT_BLOCK_SUBSIDY
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkCurve {
    pub difficulty: Vec<f64>,
    pub hashprice: Vec<f64>,
    pub fees_per_block: Vec<f64>,
    pub hashrate_eh: Vec<f64>,
    pub warnings: Vec<String>,
}

/// Generate network economics month by month.
///
/// Hash-price is `(subsidy + fees) × blocks/day / network TH × 1000`, i.e.
/// asset mined per PH of hash rate per day.
pub fn network_curve(spec: &NetworkCurveSpec) -> Result<NetworkCurve, CurveError> {
    if spec.months == 0 {
        return Err(CurveError::Generation("network curve needs at least one month".into()));
    }
    if !(spec.starting_hashrate_eh.is_finite() && spec.starting_hashrate_eh > 0.0) {
        return Err(CurveError::Generation(format!(
            "starting hash rate {} EH/s must be positive",
            spec.starting_hashrate_eh
        )));
    }
    if spec.monthly_growth <= -1.0 {
        return Err(CurveError::Generation(format!(
            "monthly growth {} would drive hash rate to zero",
            spec.monthly_growth
        )));
    }

    let mut out = NetworkCurve::default();
    let mut prev_hashprice: Option<f64> = None;
    let fee_mult = spec.fee_regime.multiplier();

    for m in 0..spec.months {
        let hashrate_eh = spec.starting_hashrate_eh * (1.0 + spec.monthly_growth).powi(m as i32);
        let hashrate_th = hashrate_eh * 1e6;
        let difficulty = hashrate_th * 2f64.powi(32) / 600.0;

        let halvings = spec.halving_months.iter().filter(|&&h| h as usize <= m).count();
        let subsidy = spec.starting_subsidy / 2f64.powi(halvings as i32);

        let fees = spec.starting_fees_per_block * fee_mult * (1.0 + FEE_MONTHLY_GROWTH * m as f64);
        let hashprice = (subsidy + fees) * BLOCKS_PER_DAY / hashrate_th * TH_PER_PH;

        if let Some(prev) = prev_hashprice
            && hashprice > prev * 1.1
            && spec.monthly_growth > 0.0
        {
            out.warnings.push(format!(
                "month {m}: hashprice rising (+{:.1}%) while difficulty also rising, check fee assumptions",
                (hashprice / prev - 1.0) * 100.0
            ));
        }
        prev_hashprice = Some(hashprice);

        out.difficulty.push(difficulty.round());
        out.hashprice.push(hashprice);
        out.fees_per_block.push(fees);
        out.hashrate_eh.push(hashrate_eh);
    }

    for &h in &spec.halving_months {
        if (h as usize) < spec.months {
            out.warnings.push(format!(
                "halving at month {h}: subsidy drops to {}",
                spec.starting_subsidy
                    / 2f64.powi(spec.halving_months.iter().filter(|&&x| x <= h).count() as i32)
            ));
        }
    }

    debug!(
        months = spec.months,
        warnings = out.warnings.len(),
        "generated network curve"
    );
    Ok(out)
}
