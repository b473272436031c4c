//! Held position and its target-price strike.
//!
//! The position is bought once at the configured buying price and split in
//! two tranches. The reconstitution tranche is sold in full the first month
//! spot reaches the target sell price; that strike raises the mining
//! bucket's yield rate for every later month. By default the target is
//! derived so that selling the whole position at target returns the holding
//! and mining allocations together. The extra-yield tranche is sold piece by
//! piece through its own ladder.

use serde::{Deserialize, Serialize};
use tracing::info;

use minewell_core::config::HoldingBucketConfig;
use minewell_core::numeric::ratio_or;

use crate::ladder::{Ladder, LadderEntry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingState {
    pub quantity: f64,
    pub recon_quantity: f64,
    pub extra_quantity: f64,
    pub buying_price: f64,
    pub target_sell_price: f64,
    pub struck: bool,
    pub strike_month: Option<u32>,
    /// Cash realised at the strike.
    pub realized_value: Option<f64>,
    pub extra_strikes: Ladder,
    pub extra_sold: f64,
    /// Cash realised by the extra-yield ladder so far.
    pub extra_realized: f64,
}

impl HoldingState {
    /// Bucket value at `price`: unsold units at spot plus realised cash.
    pub fn value(&self, price: f64) -> f64 {
        self.held_quantity() * price + self.realized_value.unwrap_or(0.0) + self.extra_realized
    }

    /// Quantity still held across both tranches.
    pub fn held_quantity(&self) -> f64 {
        self.recon_held() + self.extra_held()
    }

    fn recon_held(&self) -> f64 {
        if self.struck { 0.0 } else { self.recon_quantity }
    }

    fn extra_held(&self) -> f64 {
        (self.extra_quantity - self.extra_sold).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoldingMonth {
    pub month: u32,
    pub price: f64,
    pub held_quantity: f64,
    pub recon_quantity: f64,
    pub extra_yield_quantity: f64,
    pub value: f64,
    pub struck: bool,
    pub struck_this_month: bool,
    pub extra_yield_realized: f64,
    pub extra_yield_this_month: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingSummary {
    pub allocation: f64,
    pub quantity: f64,
    pub buying_price: f64,
    pub target_sell_price: f64,
    pub recon_quantity: f64,
    pub struck: bool,
    pub strike_month: Option<u32>,
    pub realized_value: Option<f64>,
    pub extra_yield_quantity: f64,
    pub extra_yield_strikes: Vec<LadderEntry>,
    pub extra_yield_total: f64,
    pub final_value: f64,
    pub total_return_pct: f64,
}

/// Strike detection for the held position.
#[derive(Debug, Clone, Copy, Default)]
pub struct HoldingTracker;

impl HoldingTracker {
    /// Buy `holding_allocation / buying_price` units, all of them in the
    /// reconstitution tranche, with the derived target.
    ///
    /// Callers validate that both `buying_price` and `holding_allocation`
    /// are positive.
    ///
    /// # Examples
    ///
    /// ```
    /// use minewell_engine::holding::HoldingTracker;
    ///
    /// let h = HoldingTracker::open(3_000_000.0, 4_000_000.0, 90_000.0);
    /// assert!((h.quantity - 33.333_333).abs() < 1e-6);
    /// assert!((h.target_sell_price - 210_000.0).abs() < 1e-6);
    /// ```
    pub fn open(holding_allocation: f64, mining_allocation: f64, buying_price: f64) -> HoldingState {
        let quantity = ratio_or(holding_allocation, buying_price, 0.0);
        HoldingState {
            quantity,
            recon_quantity: quantity,
            extra_quantity: 0.0,
            buying_price,
            target_sell_price: ratio_or(holding_allocation + mining_allocation, quantity, f64::INFINITY),
            struck: false,
            strike_month: None,
            realized_value: None,
            extra_strikes: Ladder::default(),
            extra_sold: 0.0,
            extra_realized: 0.0,
        }
    }

    /// Open the position with the configured tranche split, ladder and
    /// optional target override.
    pub fn from_config(
        config: &HoldingBucketConfig,
        holding_allocation: f64,
        mining_allocation: f64,
    ) -> HoldingState {
        let mut state = Self::open(holding_allocation, mining_allocation, config.buying_price);
        if let Some(target) = config.target_sell_price {
            state.target_sell_price = target;
        }
        state.recon_quantity = state.quantity * config.capital_recon_pct / 100.0;
        state.extra_quantity = state.quantity - state.recon_quantity;
        state.extra_strikes = Ladder::new(&config.extra_yield_strikes);
        state
    }

    /// Observe `price` for `month`. The strike and each extra-yield rung
    /// fire at most once.
    pub fn step(mut state: HoldingState, month: u32, price: f64) -> (HoldingState, HoldingMonth) {
        let mut struck_this_month = false;
        if !state.struck && state.recon_quantity > 0.0 && price >= state.target_sell_price {
            let realized = state.recon_quantity * price;
            state.struck = true;
            state.strike_month = Some(month);
            state.realized_value = Some(realized);
            struck_this_month = true;
            info!(month, price, target = state.target_sell_price, realized, "holding target struck");
        }

        let mut extra_yield_this_month = 0.0;
        if state.extra_quantity > 0.0 {
            for fill in state.extra_strikes.fire_shares(month, price, state.extra_quantity) {
                state.extra_sold += fill.quantity;
                state.extra_realized += fill.proceeds;
                extra_yield_this_month += fill.proceeds;
            }
            if extra_yield_this_month > 0.0 {
                info!(month, price, proceeds = extra_yield_this_month, "extra-yield strike");
            }
        }

        let record = HoldingMonth {
            month,
            price,
            held_quantity: state.held_quantity(),
            recon_quantity: state.recon_held(),
            extra_yield_quantity: state.extra_held(),
            value: state.value(price),
            struck: state.struck,
            struck_this_month,
            extra_yield_realized: state.extra_realized,
            extra_yield_this_month,
        };
        (state, record)
    }

    pub fn summarize(state: &HoldingState, allocation: f64, final_price: f64) -> HoldingSummary {
        let final_value = state.value(final_price);
        HoldingSummary {
            allocation,
            quantity: state.quantity,
            buying_price: state.buying_price,
            target_sell_price: state.target_sell_price,
            recon_quantity: state.recon_quantity,
            struck: state.struck,
            strike_month: state.strike_month,
            realized_value: state.realized_value,
            extra_yield_quantity: state.extra_quantity,
            extra_yield_strikes: state.extra_strikes.entries().to_vec(),
            extra_yield_total: state.extra_realized,
            final_value,
            total_return_pct: ratio_or(final_value - allocation, allocation, 0.0) * 100.0,
        }
    }
}
