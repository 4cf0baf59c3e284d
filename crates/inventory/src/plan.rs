//! Consumption planning.
//!
//! Planning is a pure function of a batch snapshot. It never mutates the
//! snapshot it reads; applying a plan is a separate, explicit step.

use serde::{Deserialize, Serialize};

use leanstock_core::{BatchId, Money, PartId, StockError, StockResult};

use crate::batch::{Batch, active_in_fifo_order};

/// One line of a plan: take `quantity` units from `batch_id` at `unit_cost`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLine {
    pub batch_id: BatchId,
    pub location_label: String,
    pub quantity: i64,
    pub unit_cost: Money,
}

impl PlanLine {
    pub fn cost(&self) -> Money {
        self.unit_cost.times(self.quantity)
    }
}

/// Ordered lines that together satisfy a requested quantity of one part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionPlan {
    part_id: PartId,
    requested: i64,
    pinned: Option<BatchId>,
    lines: Vec<PlanLine>,
}

impl ConsumptionPlan {
    pub fn part_id(&self) -> PartId {
        self.part_id
    }

    pub fn requested(&self) -> i64 {
        self.requested
    }

    pub fn pinned(&self) -> Option<BatchId> {
        self.pinned
    }

    pub fn lines(&self) -> &[PlanLine] {
        &self.lines
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Σ line quantity × line unit cost.
    pub fn total_cost(&self) -> Money {
        self.lines.iter().map(PlanLine::cost).sum()
    }
}

/// Plan the consumption of `quantity` units of `part_id`.
///
/// Without a pin, walks the active batches in canonical FIFO order and takes
/// `min(remaining, batch.quantity)` from each. With a pin, only the named
/// batch is considered and there is no fallback to FIFO.
///
/// `batches` may contain other parts and depleted batches; they are ignored.
pub fn plan_consumption(
    part_id: PartId,
    batches: &[Batch],
    quantity: i64,
    pinned: Option<BatchId>,
) -> StockResult<ConsumptionPlan> {
    if quantity <= 0 {
        return Err(StockError::invalid_quantity(format!(
            "requested quantity must be positive, got {quantity}"
        )));
    }

    let lines = match pinned {
        Some(batch_id) => vec![plan_pinned(part_id, batches, quantity, batch_id)?],
        None => plan_fifo(part_id, batches, quantity)?,
    };

    Ok(ConsumptionPlan {
        part_id,
        requested: quantity,
        pinned,
        lines,
    })
}

fn plan_pinned(
    part_id: PartId,
    batches: &[Batch],
    quantity: i64,
    batch_id: BatchId,
) -> StockResult<PlanLine> {
    let batch = batches
        .iter()
        .find(|b| b.id_typed() == batch_id && b.part_id() == part_id)
        .ok_or(StockError::UnknownBatch(batch_id))?;

    if batch.quantity() < quantity {
        return Err(StockError::insufficient(part_id, quantity, batch.quantity()));
    }

    Ok(line(batch, quantity))
}

fn plan_fifo(part_id: PartId, batches: &[Batch], quantity: i64) -> StockResult<Vec<PlanLine>> {
    let ordered = active_in_fifo_order(part_id, batches);

    let mut remaining = quantity;
    let mut lines = Vec::new();
    for batch in &ordered {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(batch.quantity());
        lines.push(line(batch, take));
        remaining -= take;
    }

    if remaining > 0 {
        let available = ordered.iter().map(Batch::quantity).sum();
        return Err(StockError::insufficient(part_id, quantity, available));
    }

    Ok(lines)
}

fn line(batch: &Batch, quantity: i64) -> PlanLine {
    PlanLine {
        batch_id: batch.id_typed(),
        location_label: batch.location().label().to_string(),
        quantity,
        unit_cost: batch.unit_cost(),
    }
}

/// Check that every line of `plan` still fits in `batches`.
///
/// Used right before execution so a plan computed from an older snapshot is
/// rejected instead of driving a batch negative halfway through.
pub fn verify_plan(plan: &ConsumptionPlan, batches: &[Batch]) -> StockResult<()> {
    for line in plan.lines() {
        let batch = batches
            .iter()
            .find(|b| b.id_typed() == line.batch_id)
            .ok_or(StockError::UnknownBatch(line.batch_id))?;
        if batch.quantity() < line.quantity {
            return Err(StockError::insufficient(
                plan.part_id(),
                line.quantity,
                batch.quantity(),
            ));
        }
    }
    Ok(())
}

/// Deduct a plan from an in-memory snapshot.
///
/// Either every line applies or the snapshot is left untouched.
pub fn apply_plan(plan: &ConsumptionPlan, batches: &mut [Batch]) -> StockResult<()> {
    verify_plan(plan, batches)?;
    for line in plan.lines() {
        if let Some(batch) = batches.iter_mut().find(|b| b.id_typed() == line.batch_id) {
            batch.apply_delta(-line.quantity)?;
        }
    }
    Ok(())
}
