//! Model constants. Cash amounts are in the quote currency (USD); asset
//! quantities are in whole units of the mined asset (BTC).

/// Average days per calendar month used by every monthly production figure.
pub const DAYS_PER_MONTH: f64 = 30.44;

pub const HOURS_PER_DAY: f64 = 24.0;

pub const MONTHS_PER_YEAR: f64 = 12.0;

/// Months per early-close check period when checks run quarterly.
pub const MONTHS_PER_QUARTER: u32 = 3;

/// Terahash per petahash. Network curves quote hash-price per PH per day.
pub const TH_PER_PH: f64 = 1_000.0;

/// Watts per kilowatt.
pub const W_PER_KW: f64 = 1_000.0;

/// Blocks mined per day at the target 10-minute interval.
pub const BLOCKS_PER_DAY: f64 = 144.0;

/// Allowed deviation (in percentage points) of the three bucket allocations
/// from 100%.
pub const ALLOCATION_TOLERANCE_PCT: f64 = 0.5;

/// A month is in deficit when produced plus drawn output covers less than
/// this share of the required operating cost.
pub const DEFICIT_COVERAGE_THRESHOLD: f64 = 0.95;

/// Share of deficit months above which a product is BLOCKED.
pub const BLOCKED_DEFICIT_RATIO: f64 = 0.20;

/// Mean cost-coverage ratio below which a product needs adjustment.
pub const TARGET_COVERAGE_RATIO: f64 = 1.2;

/// Mean yield fulfillment below which a product needs adjustment.
pub const TARGET_YIELD_FULFILLMENT: f64 = 0.95;

/// Final health score below which a product needs adjustment.
pub const TARGET_HEALTH_SCORE: f64 = 50.0;

/// Coverage ratio at which the health score's coverage component saturates.
pub const FULL_HEALTH_COVERAGE: f64 = 1.5;

/// Reported coverage / loan-to-value ceiling when the denominator is zero.
pub const RATIO_CEILING: f64 = 999.0;

/// Default cumulative-yield target (percent of capital) for early close.
pub const DEFAULT_EARLY_CLOSE_TARGET_PCT: f64 = 36.0;

/// Default mining-bucket base yield APR.
pub const DEFAULT_BASE_YIELD_APR: f64 = 0.08;

/// Default yield bump applied once the holding target is struck.
pub const DEFAULT_BONUS_YIELD_APR: f64 = 0.04;

/// Default share (percent) of the held position reserved for capital
/// reconstitution.
pub const DEFAULT_CAPITAL_RECON_PCT: f64 = 100.0;

/// Default APR earned by the collateral-mode cash reserve.
pub const DEFAULT_RESERVE_YIELD_APR: f64 = 0.04;

/// Hosting sites with an uptime expectation below this are flagged.
pub const LOW_UPTIME_WARNING: f64 = 0.90;

/// Maximum relative amplitude of deterministic price noise.
pub const PRICE_NOISE_AMPLITUDE: f64 = 0.05;

/// Monthly growth applied to per-block fees in generated network curves.
pub const FEE_MONTHLY_GROWTH: f64 = 0.001;

/// Block subsidy at the start of generated network curves.
pub const DEFAULT_BLOCK_SUBSIDY: f64 = 3.125;

/// Relative tolerance used when comparing accumulated floating quantities.
pub const FLOAT_REL_TOLERANCE: f64 = 1e-9;
