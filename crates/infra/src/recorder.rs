//! Sale recording: consume every component FIFO and keep the margin history.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

use leanstock_core::{Money, PartId, StockError, TransactionId};
use leanstock_inventory::{Batch, ConsumptionPlan, apply_plan, plan_consumption};
use leanstock_sales::{SaleComponent, Transaction, TransactionHistory};

use crate::consumer::FifoConsumer;
use crate::gateway::StockGateway;
use crate::kv::{HistoryStore, HistoryStoreError, KeyValueStore};
use crate::ledger::BatchLedger;

#[derive(Debug, Error)]
pub enum RecordSaleError {
    #[error(transparent)]
    Stock(#[from] StockError),

    /// Stock was consumed and the sale is in the in-memory history, but
    /// writing it to the store failed.
    #[error("sale {} was applied but could not be persisted: {source}", .transaction.id())]
    NotPersisted {
        transaction: Box<Transaction>,
        source: HistoryStoreError,
    },
}

pub struct TransactionRecorder<G, S> {
    ledger: Arc<BatchLedger<G>>,
    consumer: FifoConsumer<G>,
    store: HistoryStore<S>,
    history: RwLock<TransactionHistory>,
    // Serializes append + save so the persisted list never loses a sale.
    persist: AsyncMutex<()>,
}

impl<G: StockGateway, S: KeyValueStore> TransactionRecorder<G, S> {
    /// Load the persisted history and return a ready recorder.
    pub async fn open(ledger: Arc<BatchLedger<G>>, store: S) -> Result<Self, HistoryStoreError> {
        let store = HistoryStore::new(store);
        let history = store.load().await?;
        info!(
            transactions = history.len(),
            cumulative_margin = %history.cumulative_margin(),
            "sale history loaded"
        );
        Ok(Self {
            consumer: FifoConsumer::new(Arc::clone(&ledger)),
            ledger,
            store,
            history: RwLock::new(history),
            persist: AsyncMutex::new(()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, TransactionHistory> {
        self.history.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a sale of `components` for `sale_amount`.
    ///
    /// Every component is planned before anything is written; if one cannot
    /// be satisfied the sale is refused and no batch changes.
    pub async fn record_sale(
        &self,
        description: &str,
        components: &[SaleComponent],
        sale_amount: Money,
    ) -> Result<Transaction, RecordSaleError> {
        if components.is_empty() {
            return Err(StockError::EmptySale.into());
        }
        if sale_amount.is_negative() {
            return Err(StockError::invalid_quantity(format!("sale amount cannot be negative ({sale_amount})")).into());
        }

        let parts: BTreeSet<_> = components.iter().map(|c| c.part_id).collect();
        let guard = self.ledger.lock_parts(parts.iter().copied()).await;
        for part_id in guard.parts() {
            self.ledger.refresh_locked(&guard, *part_id).await?;
        }

        let plans = self.plan_all(description, &parts, components)?;

        for (executed, plan) in plans.iter().enumerate() {
            if let Err(e) = self.consumer.execute_locked(&guard, plan.clone()).await {
                error!(
                    sale = description,
                    executed,
                    total = plans.len(),
                    part_id = %plan.part_id(),
                    error = %e,
                    "sale partially executed"
                );
                return Err(e.into());
            }
        }
        drop(guard);

        let transaction = Transaction::from_plans(TransactionId::new(), Utc::now(), description, &plans, sale_amount)?;
        self.append(transaction.clone()).await?;

        info!(
            transaction_id = %transaction.id(),
            sale = description,
            units = transaction.units(),
            cost = %transaction.total_cost(),
            sale_amount = %transaction.sale_amount(),
            margin = %transaction.margin(),
            "sale recorded"
        );
        Ok(transaction)
    }

    /// Plan every component against one scratch view so repeated parts never
    /// claim the same units twice.
    fn plan_all(
        &self,
        description: &str,
        parts: &BTreeSet<PartId>,
        components: &[SaleComponent],
    ) -> Result<Vec<ConsumptionPlan>, StockError> {
        let mut scratch: Vec<Batch> = parts.iter().flat_map(|p| self.ledger.batches(*p)).collect();
        let mut plans = Vec::with_capacity(components.len());
        for component in components {
            let plan = plan_consumption(component.part_id, &scratch, component.quantity, None)
                .and_then(|plan| apply_plan(&plan, &mut scratch).map(|_| plan))
                .inspect_err(|e| warn!(sale = description, part_id = %component.part_id, error = %e, "sale refused"))?;
            plans.push(plan);
        }
        Ok(plans)
    }

    async fn append(&self, transaction: Transaction) -> Result<(), RecordSaleError> {
        let _persist = self.persist.lock().await;
        let snapshot = {
            let mut history = self.history.write().unwrap_or_else(|e| e.into_inner());
            history.append(transaction.clone());
            history.clone()
        };

        self.store.save(&snapshot).await.map_err(|source| {
            error!(transaction_id = %transaction.id(), error = %source, "failed to persist sale history");
            RecordSaleError::NotPersisted {
                transaction: Box::new(transaction),
                source,
            }
        })
    }

    pub fn history(&self) -> TransactionHistory {
        self.read().clone()
    }

    pub fn cumulative_margin(&self) -> Money {
        self.read().cumulative_margin()
    }

    pub fn cumulative_revenue(&self) -> Money {
        self.read().cumulative_revenue()
    }

    pub fn cumulative_cost(&self) -> Money {
        self.read().cumulative_cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayOp;
    use crate::kv::InMemoryKeyValueStore;
    use crate::test_support::*;
    use leanstock_sales::TRANSACTIONS_KEY;

    async fn recorder() -> (
        TransactionRecorder<Arc<crate::gateway::InMemoryStockGateway>, Arc<InMemoryKeyValueStore>>,
        Arc<crate::gateway::InMemoryStockGateway>,
        Arc<InMemoryKeyValueStore>,
    ) {
        let (ledger, gw) = shelf_with_stock().await;
        gw.seed_batch(OTHER_PART, SOLID_BIN, 2, Money::from_cents(5000), at(0));
        ledger.refresh(OTHER_PART).await.unwrap();
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let recorder = TransactionRecorder::open(ledger, Arc::clone(&kv)).await.unwrap();
        (recorder, gw, kv)
    }

    #[tokio::test]
    async fn sale_uses_fifo_cost_and_persists() {
        let (recorder, _, kv) = recorder().await;

        let tx = recorder
            .record_sale(
                "Gaming build",
                &[SaleComponent::new(PART, 4), SaleComponent::new(OTHER_PART, 1)],
                Money::from_cents(10_000),
            )
            .await
            .unwrap();

        assert_eq!(tx.total_cost(), Money::from_cents(900 + 5000));
        assert_eq!(tx.margin(), Money::from_cents(4100));
        assert_eq!(recorder.cumulative_margin(), Money::from_cents(4100));
        assert_eq!(recorder.cumulative_revenue(), Money::from_cents(10_000));
        assert_eq!(recorder.cumulative_cost(), Money::from_cents(5900));
        assert!(kv.snapshot().contains_key(TRANSACTIONS_KEY));
    }

    #[tokio::test]
    async fn one_unsatisfiable_component_leaves_every_batch_unchanged() {
        let (recorder, gw, _) = recorder().await;
        let before = gw.records();

        let err = recorder
            .record_sale(
                "too much",
                &[SaleComponent::new(PART, 2), SaleComponent::new(OTHER_PART, 3)],
                Money::from_cents(1000),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RecordSaleError::Stock(StockError::InsufficientStock { requested: 3, available: 2, .. })
        ));
        assert_eq!(gw.records(), before);
        assert_eq!(gw.mutation_count(), 0);
        assert!(recorder.history().is_empty());
    }

    #[tokio::test]
    async fn repeated_part_components_do_not_double_claim() {
        let (recorder, gw, _) = recorder().await;

        let err = recorder
            .record_sale(
                "split lines",
                &[SaleComponent::new(PART, 5), SaleComponent::new(PART, 4)],
                Money::from_cents(1000),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RecordSaleError::Stock(StockError::InsufficientStock { .. })));
        assert_eq!(gw.mutation_count(), 0);

        let tx = recorder
            .record_sale(
                "split lines",
                &[SaleComponent::new(PART, 5), SaleComponent::new(PART, 3)],
                Money::from_cents(3000),
            )
            .await
            .unwrap();
        // 3 × 2.00 + 5 × 3.00
        assert_eq!(tx.total_cost(), Money::from_cents(2100));
        assert_eq!(tx.units(), 8);
    }

    #[tokio::test]
    async fn empty_and_negative_sales_are_refused() {
        let (recorder, _, _) = recorder().await;
        let err = recorder.record_sale("x", &[], Money::ZERO).await.unwrap_err();
        assert!(matches!(err, RecordSaleError::Stock(StockError::EmptySale)));

        let err = recorder
            .record_sale("x", &[SaleComponent::new(PART, 1)], Money::from_cents(-1))
            .await
            .unwrap_err();
        assert!(matches!(err, RecordSaleError::Stock(StockError::InvalidQuantity(_))));
    }

    #[tokio::test]
    async fn persistence_failure_keeps_the_sale_in_memory() {
        let (recorder, _, kv) = recorder().await;
        kv.set_fail_writes(true);

        let err = recorder
            .record_sale("offline", &[SaleComponent::new(PART, 1)], Money::from_cents(500))
            .await
            .unwrap_err();
        let RecordSaleError::NotPersisted { transaction, .. } = err else {
            panic!("expected NotPersisted");
        };
        assert_eq!(recorder.history().len(), 1);
        assert_eq!(recorder.history().transactions()[0].id(), transaction.id());
    }

    #[tokio::test]
    async fn sale_missed_by_a_failed_marker_write_is_saved_with_the_next_one() {
        let (recorder, _, kv) = recorder().await;
        kv.fail_writes_to(leanstock_sales::SCHEMA_VERSION_KEY);

        let err = recorder
            .record_sale("first", &[SaleComponent::new(PART, 1)], Money::from_cents(500))
            .await
            .unwrap_err();
        assert!(matches!(err, RecordSaleError::NotPersisted { .. }));

        kv.set_fail_writes(false);
        recorder
            .record_sale("second", &[SaleComponent::new(PART, 1)], Money::from_cents(500))
            .await
            .unwrap();

        let (ledger, _) = shelf_with_stock().await;
        let reopened = TransactionRecorder::open(ledger, Arc::clone(&kv)).await.unwrap();
        assert_eq!(reopened.history().len(), 2);
        assert_eq!(reopened.history(), recorder.history());
    }

    #[tokio::test]
    async fn history_survives_reopen() {
        let (recorder, _, kv) = recorder().await;
        recorder
            .record_sale("first", &[SaleComponent::new(PART, 1)], Money::from_cents(500))
            .await
            .unwrap();

        let (ledger, _) = shelf_with_stock().await;
        let reopened = TransactionRecorder::open(ledger, Arc::clone(&kv)).await.unwrap();
        assert_eq!(reopened.history(), recorder.history());
        assert_eq!(reopened.cumulative_margin(), Money::from_cents(300));
    }

    #[tokio::test]
    async fn remote_failure_during_execution_is_surfaced() {
        let (recorder, gw, _) = recorder().await;
        gw.fail_next(GatewayOp::SetQuantity, None, StockError::unavailable("timeout"));

        let err = recorder
            .record_sale("flaky", &[SaleComponent::new(PART, 1)], Money::from_cents(500))
            .await
            .unwrap_err();
        assert!(matches!(err, RecordSaleError::Stock(StockError::RemoteUnavailable(_))));
        assert!(recorder.history().is_empty());
    }
}
