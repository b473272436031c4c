//! Trigger-once price ladders.
//!
//! Used for the mining bucket's take-profit ladder and the collateral strike
//! ladder. Rungs are sorted by ascending trigger once, at construction. Each
//! rung fires at most once, the first month spot reaches its trigger, and
//! sells its fraction of whatever quantity is still available at that point
//! in the evaluation.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use minewell_core::types::LadderRung;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LadderEntry {
    pub price_trigger: f64,
    pub sell_fraction: f64,
    pub fired: bool,
    pub trigger_month: Option<u32>,
    pub quantity_sold: f64,
    pub proceeds: f64,
}

impl From<LadderRung> for LadderEntry {
    fn from(rung: LadderRung) -> Self {
        Self {
            price_trigger: rung.price_trigger,
            sell_fraction: rung.sell_fraction,
            fired: false,
            trigger_month: None,
            quantity_sold: 0.0,
            proceeds: 0.0,
        }
    }
}

/// One rung firing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LadderFill {
    pub index: usize,
    pub quantity: f64,
    pub proceeds: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ladder {
    entries: Vec<LadderEntry>,
}

impl Ladder {
    pub fn new(rungs: &[LadderRung]) -> Self {
        let mut entries: Vec<LadderEntry> = rungs.iter().copied().map(LadderEntry::from).collect();
        // Stable: equal triggers keep their configured order.
        entries.sort_by_key(|e| OrderedFloat(e.price_trigger));
        Self { entries }
    }

    pub fn entries(&self) -> &[LadderEntry] {
        &self.entries
    }

    pub fn fired_count(&self) -> usize {
        self.entries.iter().filter(|e| e.fired).count()
    }

    pub fn any_fired(&self) -> bool {
        self.entries.iter().any(|e| e.fired)
    }

    /// Fire every unfired rung whose trigger `price` reaches, lowest first.
    ///
    /// Each fill sells `sell_fraction` of the quantity left after earlier
    /// fills this month, so the total never exceeds `available`.
    pub fn fire(&mut self, month: u32, price: f64, available: f64) -> Vec<LadderFill> {
        let mut remaining = available.max(0.0);
        self.fire_with(month, price, |fraction| {
            let quantity = remaining * fraction;
            remaining -= quantity;
            quantity
        })
    }

    /// Fire reached rungs, each selling `sell_fraction` of a fixed `tranche`
    /// rather than of what is left.
    pub fn fire_shares(&mut self, month: u32, price: f64, tranche: f64) -> Vec<LadderFill> {
        let tranche = tranche.max(0.0);
        self.fire_with(month, price, |fraction| tranche * fraction)
    }

    fn fire_with(&mut self, month: u32, price: f64, mut quantity_for: impl FnMut(f64) -> f64) -> Vec<LadderFill> {
        let mut fills = Vec::new();
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if entry.fired || price < entry.price_trigger {
                continue;
            }
            let quantity = quantity_for(entry.sell_fraction);
            let proceeds = quantity * price;
            entry.fired = true;
            entry.trigger_month = Some(month);
            entry.quantity_sold = quantity;
            entry.proceeds = proceeds;
            fills.push(LadderFill {
                index,
                quantity,
                proceeds,
            });
        }
        fills
    }
}
