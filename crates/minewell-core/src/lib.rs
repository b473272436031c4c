//! # minewell-core
//! Configuration, curve and error types shared by the Minewell simulator.
//!
//! Nothing here runs a month of simulation; the engines live in
//! `minewell-engine` and implement the traits defined in [`traits`].

pub mod config;
pub mod constants;
pub mod curves;
pub mod error;
pub mod numeric;
pub mod scenario;
pub mod traits;
pub mod types;

pub use config::ProductSpec;
pub use curves::{CurveSet, ScenarioCurves};
pub use error::{ConfigError, CurveError, SimError};
pub use scenario::Scenario;
