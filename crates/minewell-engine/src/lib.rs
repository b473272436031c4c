//! # minewell-engine — Monthly simulation engines for mining-backed products.
//!
//! Bucket mode runs three engines side by side and folds them together:
//! - **Yield accrual**: fixed or scheduled APR on the yield allocation.
//! - **Holding tracker**: buy once, liquidate in full at the derived target.
//! - **Mining waterfall**: output pays cost, then yield, then the reserve.
//!
//! Aggregation adds early close, the decision and the fee overlay.
//! Collateral mode replaces all of that with a single borrowed-debt engine.
//! [`simulate`] dispatches on the product mode and runs scenarios in
//! parallel.

pub mod aggregation;
pub mod calibration;
pub mod collateral;
pub mod commercial;
pub mod holding;
pub mod hosting;
pub mod ladder;
pub mod policy;
pub mod production;
pub mod simulate;
pub mod waterfall;
pub mod yield_accrual;

pub use aggregation::{Decision, decide};
pub use policy::StandardPolicy;
pub use production::ProductionModel;
pub use simulate::{CancelToken, RunResult, simulate, simulate_with};
