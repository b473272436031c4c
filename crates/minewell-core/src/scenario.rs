//! Market scenarios.
//!
//! Every run evaluates the same product against a closed set of exogenous
//! market paths. Scenario identity is an enum so curve lookups and result
//! maps cannot be keyed by a misspelled string.
//!
//! # Examples
//!
//! ```
//! use minewell_core::scenario::Scenario;
//! assert_eq!("bull".parse::<Scenario>().unwrap(), Scenario::Bull);
//! assert_eq!(Scenario::Bear.to_string(), "bear");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// Adverse price and network path.
    Bear,
    /// Central case.
    #[default]
    Base,
    /// Favourable price and network path.
    Bull,
}

impl Scenario {
    /// All scenarios in bear → bull order.
    pub const ALL: [Scenario; 3] = [Scenario::Bear, Scenario::Base, Scenario::Bull];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bear => "bear",
            Self::Base => "base",
            Self::Bull => "bull",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownScenario(pub String);

impl fmt::Display for UnknownScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown scenario: {}", self.0)
    }
}

impl std::error::Error for UnknownScenario {}

impl FromStr for Scenario {
    type Err = UnknownScenario;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bear" => Ok(Self::Bear),
            "base" => Ok(Self::Base),
            "bull" => Ok(Self::Bull),
            other => Err(UnknownScenario(other.to_string())),
        }
    }
}
