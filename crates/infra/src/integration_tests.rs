//! End-to-end scenarios across the stock services.
//!
//! Receive → rotate → consume → sell → value, over the in-memory store and a
//! real SQLite history database.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use leanstock_core::{Money, StockError};
    use leanstock_sales::SaleComponent;

    use crate::consumer::FifoConsumer;
    use crate::gateway::{GatewayOp, InMemoryStockGateway, StockGateway};
    use crate::kv::SqliteKeyValueStore;
    use crate::recorder::{RecordSaleError, TransactionRecorder};
    use crate::rotation::RotationPolicy;
    use crate::test_support::*;
    use crate::valuation::ValuationAggregator;

    struct Services {
        gw: Arc<InMemoryStockGateway>,
        ledger: Arc<TestLedger>,
        rotation: RotationPolicy<Arc<InMemoryStockGateway>>,
        consumer: FifoConsumer<Arc<InMemoryStockGateway>>,
        valuation: ValuationAggregator<Arc<InMemoryStockGateway>>,
    }

    async fn services() -> Services {
        let gw = gateway();
        let ledger = ledger_for(&gw).await;
        Services {
            rotation: RotationPolicy::new(Arc::clone(&ledger)),
            consumer: FifoConsumer::new(Arc::clone(&ledger)),
            valuation: ValuationAggregator::new(Arc::clone(&ledger)),
            gw,
            ledger,
        }
    }

    #[tokio::test]
    async fn receive_rotate_then_pick_oldest_first() {
        let s = services().await;

        s.rotation.on_receive(PART, NEW_BIN, 3, Money::from_cents(200)).await.unwrap();
        let receipt = s.rotation.on_receive(PART, NEW_BIN, 5, Money::from_cents(300)).await.unwrap();
        assert_eq!(receipt.rotated.len(), 1);
        assert_eq!(receipt.rotated[0].quantity, 3);

        let plan = s.consumer.plan(PART, 4, None).unwrap();
        assert_eq!(plan.total_cost(), Money::from_cents(900));
        assert_eq!(plan.lines()[0].location_label, "A-1-3-B");

        let writes = s.gw.mutation_count();
        assert!(matches!(
            s.consumer.plan(PART, 10, None),
            Err(StockError::InsufficientStock { requested: 10, available: 8, .. })
        ));
        assert_eq!(s.gw.mutation_count(), writes);

        s.consumer.execute(plan).await.unwrap();
        let left = s.ledger.active_batches(PART);
        assert_eq!(left.len(), 1);
        assert_eq!((left[0].quantity(), left[0].unit_cost()), (4, Money::from_cents(300)));
    }

    #[tokio::test]
    async fn old_stock_empties_before_new_stock_is_touched() {
        let s = services().await;
        s.rotation.on_receive(PART, NEW_BIN, 3, Money::from_cents(200)).await.unwrap();
        s.rotation.on_receive(PART, NEW_BIN, 5, Money::from_cents(300)).await.unwrap();

        for _ in 0..3 {
            s.consumer.consume(PART, 1, None).await.unwrap();
            let new = s
                .ledger
                .active_batches(PART)
                .into_iter()
                .find(|b| b.location().id() == NEW_BIN)
                .unwrap();
            assert_eq!(new.quantity(), 5);
        }
        let executed = s.consumer.consume(PART, 1, None).await.unwrap();
        assert_eq!(executed.plan.lines()[0].location_label, "A-1-3-A");
    }

    #[tokio::test]
    async fn valuation_of_two_lots() {
        let s = services().await;
        s.rotation.on_receive(PART, OLD_BIN, 2, Money::from_cents(500)).await.unwrap();
        s.rotation.on_receive(PART, SOLID_BIN, 3, Money::from_cents(150)).await.unwrap();

        assert_eq!(s.valuation.total_value(), Money::from_cents(1450));
        assert_eq!(s.valuation.total_value().to_string(), "14.50");
    }

    #[tokio::test]
    async fn valuation_matches_a_fresh_fetch_after_mixed_activity() {
        let s = services().await;
        s.rotation.on_receive(PART, NEW_BIN, 3, Money::from_cents(200)).await.unwrap();
        s.rotation.on_receive(PART, NEW_BIN, 5, Money::from_cents(300)).await.unwrap();
        s.rotation.on_receive(OTHER_PART, SOLID_BIN, 7, Money::from_cents(75)).await.unwrap();
        s.consumer.consume(PART, 4, None).await.unwrap();
        s.consumer.consume(OTHER_PART, 2, None).await.unwrap();

        let mut fresh = Money::ZERO;
        for part_id in [PART, OTHER_PART] {
            for record in s.gw.fetch_batches_for_part(part_id).await.unwrap() {
                fresh += record.unit_cost.times(record.quantity);
            }
        }

        let value = s.valuation.total_value();
        assert_eq!(value, s.valuation.total_value());
        assert_eq!(value, fresh);
        assert_eq!(value, Money::from_cents(4 * 300 + 5 * 75));
    }

    #[tokio::test]
    async fn sale_is_atomic_at_plan_time_and_history_persists_in_sqlite() {
        let s = services().await;
        s.rotation.on_receive(PART, NEW_BIN, 3, Money::from_cents(200)).await.unwrap();
        s.rotation.on_receive(PART, NEW_BIN, 5, Money::from_cents(300)).await.unwrap();
        s.rotation.on_receive(OTHER_PART, SOLID_BIN, 1, Money::from_cents(5000)).await.unwrap();

        let kv = Arc::new(SqliteKeyValueStore::connect("sqlite::memory:").await.unwrap());
        let recorder = TransactionRecorder::open(Arc::clone(&s.ledger), Arc::clone(&kv))
            .await
            .unwrap();

        let before = s.gw.records();
        let err = recorder
            .record_sale(
                "too many PSUs",
                &[SaleComponent::new(PART, 1), SaleComponent::new(OTHER_PART, 2)],
                Money::from_cents(20_000),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RecordSaleError::Stock(StockError::InsufficientStock { .. })));
        assert_eq!(s.gw.records(), before);

        let tx = recorder
            .record_sale(
                "Gaming build #1",
                &[SaleComponent::new(PART, 4), SaleComponent::new(OTHER_PART, 1)],
                Money::from_cents(10_000),
            )
            .await
            .unwrap();
        assert_eq!(tx.margin(), Money::from_cents(10_000 - 900 - 5000));

        let reopened = TransactionRecorder::open(Arc::clone(&s.ledger), Arc::clone(&kv))
            .await
            .unwrap();
        assert_eq!(reopened.history(), recorder.history());
        assert_eq!(reopened.cumulative_margin(), Money::from_cents(4100));
    }

    #[tokio::test]
    async fn partial_execution_is_reported_and_not_recorded() {
        let s = services().await;
        s.rotation.on_receive(PART, NEW_BIN, 3, Money::from_cents(200)).await.unwrap();
        s.rotation.on_receive(PART, NEW_BIN, 5, Money::from_cents(300)).await.unwrap();
        let new = s
            .ledger
            .active_batches(PART)
            .into_iter()
            .find(|b| b.location().id() == NEW_BIN)
            .unwrap();

        let kv = Arc::new(SqliteKeyValueStore::connect("sqlite::memory:").await.unwrap());
        let recorder = TransactionRecorder::open(Arc::clone(&s.ledger), kv).await.unwrap();
        s.gw.fail_next(GatewayOp::SetQuantity, Some(new.id_typed()), StockError::unavailable("gateway timeout"));

        let err = recorder
            .record_sale("half done", &[SaleComponent::new(PART, 4)], Money::from_cents(1000))
            .await
            .unwrap_err();
        assert!(matches!(err, RecordSaleError::Stock(StockError::RemoteUnavailable(_))));
        assert!(recorder.history().is_empty());

        // The Old line went through before the failure.
        let old = s
            .ledger
            .batches(PART)
            .into_iter()
            .find(|b| b.location().id() == OLD_BIN)
            .unwrap();
        assert_eq!(old.quantity(), 0);
        assert_eq!(s.gw.record(new.id_typed()).unwrap().quantity, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn refresh_and_consume_wait_for_an_in_flight_guard() {
        let s = services().await;
        s.rotation.on_receive(PART, NEW_BIN, 3, Money::from_cents(200)).await.unwrap();
        s.rotation.on_receive(PART, NEW_BIN, 5, Money::from_cents(300)).await.unwrap();
        let writes = s.gw.mutation_count();

        let held = s.ledger.lock_part(PART).await;

        let ledger = Arc::clone(&s.ledger);
        let refresh = tokio::spawn(async move { ledger.refresh(PART).await });
        let consumer = FifoConsumer::new(Arc::clone(&s.ledger));
        let consume = tokio::spawn(async move { consumer.consume(PART, 2, None).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!refresh.is_finished());
        assert!(!consume.is_finished());
        assert_eq!(s.gw.mutation_count(), writes);

        drop(held);
        refresh.await.unwrap().unwrap();
        let executed = consume.await.unwrap().unwrap();
        assert_eq!(executed.plan.total_quantity(), 2);
        assert_eq!(s.ledger.active_batches(PART).iter().map(|b| b.quantity()).sum::<i64>(), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_consumers_cannot_both_take_the_same_units() {
        let s = services().await;
        s.rotation.on_receive(PART, NEW_BIN, 3, Money::from_cents(200)).await.unwrap();
        s.rotation.on_receive(PART, NEW_BIN, 5, Money::from_cents(300)).await.unwrap();

        let first = FifoConsumer::new(Arc::clone(&s.ledger));
        let second = FifoConsumer::new(Arc::clone(&s.ledger));
        let (a, b) = tokio::join!(
            tokio::spawn(async move { first.consume(PART, 6, None).await }),
            tokio::spawn(async move { second.consume(PART, 6, None).await }),
        );
        let results = [a.unwrap(), b.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let refused = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(matches!(
            refused,
            StockError::InsufficientStock { requested: 6, available: 2, .. }
        ));

        let fresh: i64 = s
            .gw
            .fetch_batches_for_part(PART)
            .await
            .unwrap()
            .iter()
            .map(|r| r.quantity)
            .sum();
        assert_eq!(fresh, 2);
    }
}
