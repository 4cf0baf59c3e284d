//! Inventory valuation as a pure fold over batch state.
//!
//! Nothing here is stored: every figure is recomputed from the batches it is
//! given, so there is no running total that can drift from the ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use leanstock_core::{BatchId, Money, PartId};

use crate::batch::{Batch, sort_fifo};
use crate::part::Part;

/// One batch row of a part breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchValuation {
    pub batch_id: BatchId,
    pub location_label: String,
    pub quantity: i64,
    pub unit_cost: Money,
    pub value: Money,
}

/// Value of one part; rows are in canonical FIFO order, so the first row is
/// the batch the next pick will consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartValuation {
    pub part_id: PartId,
    pub total_quantity: i64,
    pub total_value: Money,
    pub batches: Vec<BatchValuation>,
}

impl PartValuation {
    pub fn oldest(&self) -> Option<&BatchValuation> {
        self.batches.first()
    }
}

/// Totals across every part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationSummary {
    pub parts: usize,
    pub batches: usize,
    pub units: i64,
    pub total_value: Money,
}

/// A part whose on-hand quantity is under its minimum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStock {
    pub part_id: PartId,
    pub on_hand: i64,
    pub minimum: i64,
}

/// Σ quantity × unit cost over the active batches.
pub fn total_value<'a, I>(batches: I) -> Money
where
    I: IntoIterator<Item = &'a Batch>,
{
    batches
        .into_iter()
        .filter(|b| b.is_active())
        .map(Batch::value)
        .sum()
}

/// Group active batches by part (ascending part id).
pub fn part_breakdown<'a, I>(batches: I) -> Vec<PartValuation>
where
    I: IntoIterator<Item = &'a Batch>,
{
    let mut by_part: BTreeMap<PartId, Vec<Batch>> = BTreeMap::new();
    for batch in batches.into_iter().filter(|b| b.is_active()) {
        by_part.entry(batch.part_id()).or_default().push(batch.clone());
    }

    by_part
        .into_iter()
        .map(|(part_id, mut batches)| {
            sort_fifo(&mut batches);
            let rows: Vec<BatchValuation> = batches
                .iter()
                .map(|b| BatchValuation {
                    batch_id: b.id_typed(),
                    location_label: b.location().label().to_string(),
                    quantity: b.quantity(),
                    unit_cost: b.unit_cost(),
                    value: b.value(),
                })
                .collect();
            PartValuation {
                part_id,
                total_quantity: rows.iter().map(|r| r.quantity).sum(),
                total_value: rows.iter().map(|r| r.value).sum(),
                batches: rows,
            }
        })
        .collect()
}

pub fn summarize(breakdown: &[PartValuation]) -> ValuationSummary {
    ValuationSummary {
        parts: breakdown.len(),
        batches: breakdown.iter().map(|p| p.batches.len()).sum(),
        units: breakdown.iter().map(|p| p.total_quantity).sum(),
        total_value: breakdown.iter().map(|p| p.total_value).sum(),
    }
}

/// Parts under their minimum-stock threshold, in catalog order.
///
/// Parts missing from `breakdown` count as zero on hand.
pub fn below_minimum(parts: &[Part], breakdown: &[PartValuation]) -> Vec<LowStock> {
    parts
        .iter()
        .filter(|p| p.minimum_stock > 0)
        .filter_map(|p| {
            let on_hand = breakdown
                .iter()
                .find(|v| v.part_id == p.id)
                .map(|v| v.total_quantity)
                .unwrap_or(0);
            (on_hand < p.minimum_stock).then(|| LowStock {
                part_id: p.id,
                on_hand,
                minimum: p.minimum_stock,
            })
        })
        .collect()
}
