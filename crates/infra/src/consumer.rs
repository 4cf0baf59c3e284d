//! FIFO consumption against the ledger.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use leanstock_core::{BatchId, PartId, StockError, StockResult};
use leanstock_inventory::{ConsumptionPlan, plan_consumption, verify_plan};

use crate::gateway::StockGateway;
use crate::guard::PartGuard;
use crate::ledger::BatchLedger;

/// A plan whose every line was applied to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedPlan {
    pub plan: ConsumptionPlan,
    pub executed_at: DateTime<Utc>,
}

pub struct FifoConsumer<G> {
    ledger: Arc<BatchLedger<G>>,
}

impl<G: StockGateway> FifoConsumer<G> {
    pub fn new(ledger: Arc<BatchLedger<G>>) -> Self {
        Self { ledger }
    }

    /// Plan against the cached batches. Read-only.
    pub fn plan(&self, part_id: PartId, quantity: i64, pinned: Option<BatchId>) -> StockResult<ConsumptionPlan> {
        plan_consumption(part_id, &self.ledger.batches(part_id), quantity, pinned)
    }

    /// Apply a plan computed earlier.
    ///
    /// Lines are re-checked against current state first, so a stale plan is
    /// refused with nothing written.
    pub async fn execute(&self, plan: ConsumptionPlan) -> StockResult<ExecutedPlan> {
        let guard = self.ledger.lock_part(plan.part_id()).await;
        self.execute_locked(&guard, plan).await
    }

    /// Refresh, plan and execute while holding the part guard throughout.
    pub async fn consume(&self, part_id: PartId, quantity: i64, pinned: Option<BatchId>) -> StockResult<ExecutedPlan> {
        let guard = self.ledger.lock_part(part_id).await;
        self.ledger.refresh_locked(&guard, part_id).await?;
        let plan = plan_consumption(part_id, &self.ledger.batches(part_id), quantity, pinned)?;
        self.execute_locked(&guard, plan).await
    }

    pub(crate) async fn execute_locked(&self, guard: &PartGuard, plan: ConsumptionPlan) -> StockResult<ExecutedPlan> {
        let part_id = plan.part_id();
        if !guard.covers(part_id) {
            return Err(StockError::PartNotLocked(part_id));
        }
        verify_plan(&plan, &self.ledger.batches(part_id))?;

        let total = plan.lines().len();
        for (applied, line) in plan.lines().iter().enumerate() {
            if let Err(e) = self
                .ledger
                .adjust_quantity(guard, line.batch_id, -line.quantity)
                .await
            {
                error!(
                    part_id = %part_id,
                    batch_id = %line.batch_id,
                    applied,
                    total,
                    error = %e,
                    "consumption partially applied"
                );
                return Err(e);
            }
        }

        info!(
            part_id = %part_id,
            quantity = plan.total_quantity(),
            cost = %plan.total_cost(),
            lines = total,
            "stock consumed"
        );
        Ok(ExecutedPlan {
            plan,
            executed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayOp;
    use crate::test_support::*;
    use leanstock_core::Money;

    #[tokio::test]
    async fn plan_takes_old_bin_before_new() {
        let (ledger, _) = shelf_with_stock().await;
        let consumer = FifoConsumer::new(ledger);

        let plan = consumer.plan(PART, 4, None).unwrap();
        let lines: Vec<_> = plan
            .lines()
            .iter()
            .map(|l| (l.location_label.as_str(), l.quantity, l.unit_cost.cents()))
            .collect();
        assert_eq!(lines, vec![("A-1-3-B", 3, 200), ("A-1-3-A", 1, 300)]);
        assert_eq!(plan.total_cost(), Money::from_cents(900));
    }

    #[tokio::test]
    async fn insufficient_stock_fails_without_mutation() {
        let (ledger, gw) = shelf_with_stock().await;
        let consumer = FifoConsumer::new(ledger);

        let err = consumer.plan(PART, 10, None).unwrap_err();
        assert_eq!(err, StockError::insufficient(PART, 10, 8));

        let err = consumer.consume(PART, 10, None).await.unwrap_err();
        assert_eq!(err, StockError::insufficient(PART, 10, 8));
        assert_eq!(gw.mutation_count(), 0);
    }

    #[tokio::test]
    async fn execute_decrements_exactly_the_planned_batches() {
        let (ledger, gw) = shelf_with_stock().await;
        let consumer = FifoConsumer::new(Arc::clone(&ledger));

        let plan = consumer.plan(PART, 4, None).unwrap();
        let old = plan.lines()[0].batch_id;
        let new = plan.lines()[1].batch_id;
        consumer.execute(plan).await.unwrap();

        assert_eq!(gw.record(old).unwrap().quantity, 0);
        assert_eq!(gw.record(new).unwrap().quantity, 4);
        assert_eq!(gw.mutation_count(), 2);
        assert_eq!(ledger.active_batches(PART).len(), 1);
    }

    #[tokio::test]
    async fn stale_plan_is_refused_before_any_write() {
        let (ledger, gw) = shelf_with_stock().await;
        let consumer = FifoConsumer::new(ledger);

        let first = consumer.plan(PART, 6, None).unwrap();
        let second = consumer.plan(PART, 6, None).unwrap();
        consumer.execute(first).await.unwrap();
        let writes = gw.mutation_count();

        let err = consumer.execute(second).await.unwrap_err();
        assert!(matches!(err, StockError::InsufficientStock { .. }));
        assert_eq!(gw.mutation_count(), writes);
    }

    #[tokio::test]
    async fn pinned_consumption_never_falls_back() {
        let (ledger, _) = shelf_with_stock().await;
        let consumer = FifoConsumer::new(Arc::clone(&ledger));
        let new = ledger.active_batches(PART)[1].id_typed();

        let executed = consumer.consume(PART, 2, Some(new)).await.unwrap();
        assert_eq!(executed.plan.lines().len(), 1);
        assert_eq!(executed.plan.lines()[0].batch_id, new);

        let err = consumer.plan(PART, 4, Some(new)).unwrap_err();
        assert_eq!(err, StockError::insufficient(PART, 4, 3));
    }

    #[tokio::test]
    async fn failure_mid_plan_reports_the_failing_batch() {
        let (ledger, gw) = shelf_with_stock().await;
        let consumer = FifoConsumer::new(ledger);

        let plan = consumer.plan(PART, 4, None).unwrap();
        let second = plan.lines()[1].batch_id;
        gw.fail_next(GatewayOp::SetQuantity, Some(second), StockError::unavailable("timeout"));

        let err = consumer.execute(plan).await.unwrap_err();
        assert!(err.is_transient());
        // First line went through; the failing one did not.
        assert_eq!(gw.mutation_count(), 1);
        assert_eq!(gw.record(second).unwrap().quantity, 5);
    }
}
