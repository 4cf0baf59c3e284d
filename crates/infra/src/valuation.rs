//! Inventory valuation over the ledger's cached state.

use std::sync::Arc;

use leanstock_core::{Money, PartId};
use leanstock_inventory::{LowStock, Part, PartValuation, ValuationSummary, below_minimum, part_breakdown, summarize, total_value};

use crate::gateway::StockGateway;
use crate::ledger::BatchLedger;

pub struct ValuationAggregator<G> {
    ledger: Arc<BatchLedger<G>>,
}

impl<G: StockGateway> ValuationAggregator<G> {
    pub fn new(ledger: Arc<BatchLedger<G>>) -> Self {
        Self { ledger }
    }

    /// Σ quantity × unit cost over every active batch.
    pub fn total_value(&self) -> Money {
        total_value(&self.ledger.all_batches())
    }

    pub fn part_breakdown(&self) -> Vec<PartValuation> {
        part_breakdown(&self.ledger.all_batches())
    }

    /// Valuation of one part; `None` when it has no active batch.
    pub fn part_value(&self, part_id: PartId) -> Option<PartValuation> {
        part_breakdown(&self.ledger.active_batches(part_id)).into_iter().next()
    }

    pub fn summary(&self) -> ValuationSummary {
        summarize(&self.part_breakdown())
    }

    /// Parts from `catalog` whose on-hand quantity is under their minimum.
    pub fn low_stock(&self, catalog: &[Part]) -> Vec<LowStock> {
        below_minimum(catalog, &self.part_breakdown())
    }
}
