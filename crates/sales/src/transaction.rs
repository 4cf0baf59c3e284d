use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use leanstock_core::{BatchId, Money, PartId, StockError, StockResult, TransactionId};
use leanstock_inventory::ConsumptionPlan;

/// One requested part of a sale: `quantity` units of `part_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleComponent {
    pub part_id: PartId,
    pub quantity: i64,
}

impl SaleComponent {
    pub fn new(part_id: PartId, quantity: i64) -> Self {
        Self { part_id, quantity }
    }
}

/// Units actually consumed for a sale, at the cost of the batch they came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLine {
    pub part_id: PartId,
    /// `None` only for lines migrated from history that predates batch tracking.
    pub batch_id: Option<BatchId>,
    pub location_label: Option<String>,
    pub quantity: i64,
    pub unit_cost: Money,
}

impl TransactionLine {
    pub fn cost(&self) -> Money {
        self.unit_cost.times(self.quantity)
    }
}

/// Immutable record of a sale.
///
/// Built once from the executed plans and never edited afterwards; there are
/// no setters. Margin is never read back from storage; it is recomputed from
/// the stored cost and sale amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredTransaction")]
pub struct Transaction {
    id: TransactionId,
    recorded_at: DateTime<Utc>,
    description: String,
    lines: Vec<TransactionLine>,
    total_cost: Money,
    sale_amount: Money,
    margin: Money,
}

#[derive(Deserialize)]
struct StoredTransaction {
    id: TransactionId,
    recorded_at: DateTime<Utc>,
    description: String,
    lines: Vec<TransactionLine>,
    total_cost: Money,
    sale_amount: Money,
}

impl From<StoredTransaction> for Transaction {
    fn from(stored: StoredTransaction) -> Self {
        Self::restored(
            stored.id,
            stored.recorded_at,
            stored.description,
            stored.lines,
            stored.total_cost,
            stored.sale_amount,
        )
    }
}

impl Transaction {
    /// Build a transaction from the executed plans of every component.
    ///
    /// Cost is Σ line quantity × line unit cost; margin is sale amount − cost.
    pub fn from_plans(
        id: TransactionId,
        recorded_at: DateTime<Utc>,
        description: impl Into<String>,
        plans: &[ConsumptionPlan],
        sale_amount: Money,
    ) -> StockResult<Self> {
        if plans.is_empty() {
            return Err(StockError::EmptySale);
        }
        if sale_amount.is_negative() {
            return Err(StockError::invalid_quantity(format!(
                "sale amount cannot be negative ({sale_amount})"
            )));
        }

        let lines: Vec<TransactionLine> = plans
            .iter()
            .flat_map(|plan| {
                plan.lines().iter().map(move |line| TransactionLine {
                    part_id: plan.part_id(),
                    batch_id: Some(line.batch_id),
                    location_label: Some(line.location_label.clone()),
                    quantity: line.quantity,
                    unit_cost: line.unit_cost,
                })
            })
            .collect();

        Ok(Self::from_lines(id, recorded_at, description, lines, sale_amount))
    }

    pub(crate) fn from_lines(
        id: TransactionId,
        recorded_at: DateTime<Utc>,
        description: impl Into<String>,
        lines: Vec<TransactionLine>,
        sale_amount: Money,
    ) -> Self {
        let total_cost: Money = lines.iter().map(TransactionLine::cost).sum();
        Self {
            id,
            recorded_at,
            description: description.into(),
            lines,
            total_cost,
            sale_amount,
            margin: sale_amount - total_cost,
        }
    }

    /// Rebuild a record whose totals were fixed when it was first written.
    pub(crate) fn restored(
        id: TransactionId,
        recorded_at: DateTime<Utc>,
        description: String,
        lines: Vec<TransactionLine>,
        total_cost: Money,
        sale_amount: Money,
    ) -> Self {
        Self {
            id,
            recorded_at,
            description,
            lines,
            total_cost,
            sale_amount,
            margin: sale_amount - total_cost,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn lines(&self) -> &[TransactionLine] {
        &self.lines
    }

    pub fn total_cost(&self) -> Money {
        self.total_cost
    }

    pub fn sale_amount(&self) -> Money {
        self.sale_amount
    }

    pub fn margin(&self) -> Money {
        self.margin
    }

    pub fn units(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}
