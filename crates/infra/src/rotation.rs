//! Bin rotation on receipt.
//!
//! Receiving into a New bin first moves whatever the part already holds there
//! to the Old bin of the same shelf, so the older stock is picked first.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use leanstock_core::{BatchId, LocationId, Money, PartId, StockError, StockResult};
use leanstock_inventory::{Batch, Location};

use crate::gateway::StockGateway;
use crate::guard::PartGuard;
use crate::ledger::BatchLedger;

/// A lot moved out of the New bin during a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotatedLot {
    /// Batch id before the move.
    pub batch_id: BatchId,
    /// Batch id at the Old bin (same id unless the store split it).
    pub moved_batch_id: BatchId,
    pub from: String,
    pub to: String,
    pub quantity: i64,
    pub unit_cost: Money,
}

/// Outcome of a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub batch: Batch,
    pub rotated: Vec<RotatedLot>,
}

pub struct RotationPolicy<G> {
    ledger: Arc<BatchLedger<G>>,
}

impl<G: StockGateway> RotationPolicy<G> {
    pub fn new(ledger: Arc<BatchLedger<G>>) -> Self {
        Self { ledger }
    }

    /// Receive `quantity` units of `part_id` at `target_location_id`.
    ///
    /// On `RotationFailure` the new batch is not created; lots moved before
    /// the failing one stay moved.
    pub async fn on_receive(
        &self,
        part_id: PartId,
        target_location_id: LocationId,
        quantity: i64,
        unit_cost: Money,
    ) -> StockResult<Receipt> {
        if quantity <= 0 || unit_cost.is_negative() {
            let err = StockError::invalid_quantity(format!(
                "cannot receive {quantity} units of part {part_id} at unit cost {unit_cost}"
            ));
            error!(part_id = %part_id, error = %err, "rejected receipt");
            return Err(err);
        }
        let target = self
            .ledger
            .location(target_location_id)
            .ok_or(StockError::UnknownLocation(target_location_id))?;

        let guard = self.ledger.lock_part(part_id).await;
        self.ledger.refresh_locked(&guard, part_id).await?;

        let rotated = if target.is_new_bin() {
            self.rotate_out(&guard, part_id, &target).await?
        } else {
            Vec::new()
        };

        let batch = self
            .ledger
            .create_batch(&guard, part_id, target_location_id, quantity, unit_cost)
            .await?;

        info!(
            part_id = %part_id,
            batch_id = %batch.id_typed(),
            location = %target.label(),
            quantity,
            unit_cost = %unit_cost,
            rotated = rotated.len(),
            "stock received"
        );
        Ok(Receipt { batch, rotated })
    }

    async fn rotate_out(&self, guard: &PartGuard, part_id: PartId, target: &Location) -> StockResult<Vec<RotatedLot>> {
        let occupants: Vec<Batch> = self
            .ledger
            .active_batches(part_id)
            .into_iter()
            .filter(|b| b.location().id() == target.id())
            .collect();
        if occupants.is_empty() {
            return Ok(Vec::new());
        }

        let Some(old_bin) = self.ledger.counterpart(target) else {
            warn!(
                part_id = %part_id,
                location = %target.label(),
                lots = occupants.len(),
                "no Old bin on this shelf, rotation skipped"
            );
            return Ok(Vec::new());
        };

        let total = occupants.len();
        let mut rotated = Vec::with_capacity(total);
        for lot in occupants {
            let moved = self
                .ledger
                .relocate(guard, lot.id_typed(), old_bin.id())
                .await
                .map_err(|e| {
                    let reason = format!("{e} ({} of {total} lots moved)", rotated.len());
                    error!(
                        part_id = %part_id,
                        batch_id = %lot.id_typed(),
                        moved = rotated.len(),
                        total,
                        error = %e,
                        "bin rotation failed"
                    );
                    StockError::RotationFailure {
                        part_id,
                        batch_id: lot.id_typed(),
                        reason,
                    }
                })?;

            rotated.push(RotatedLot {
                batch_id: lot.id_typed(),
                moved_batch_id: moved.id_typed(),
                from: target.label().to_string(),
                to: old_bin.label().to_string(),
                quantity: lot.quantity(),
                unit_cost: lot.unit_cost(),
            });
        }
        Ok(rotated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayOp;
    use crate::test_support::*;

    #[tokio::test]
    async fn receiving_into_new_bin_moves_current_stock_to_old() {
        let gw = gateway();
        gw.seed_batch(PART, NEW_BIN, 3, Money::from_cents(200), at(0));
        let ledger = ledger_for(&gw).await;
        let policy = RotationPolicy::new(Arc::clone(&ledger));

        let receipt = policy
            .on_receive(PART, NEW_BIN, 5, Money::from_cents(300))
            .await
            .unwrap();

        assert_eq!(receipt.rotated.len(), 1);
        assert_eq!(receipt.rotated[0].to, "A-1-3-B");
        assert_eq!(receipt.batch.location().label(), "A-1-3-A");

        let active = ledger.active_batches(PART);
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].location().id(), OLD_BIN);
        assert_eq!((active[0].quantity(), active[0].unit_cost()), (3, Money::from_cents(200)));
        assert_eq!(active[1].location().id(), NEW_BIN);
        assert_eq!((active[1].quantity(), active[1].unit_cost()), (5, Money::from_cents(300)));
    }

    #[tokio::test]
    async fn each_lot_is_moved_separately() {
        let gw = gateway();
        gw.seed_batch(PART, NEW_BIN, 2, Money::from_cents(100), at(0));
        gw.seed_batch(PART, NEW_BIN, 4, Money::from_cents(150), at(5));
        gw.seed_batch(OTHER_PART, NEW_BIN, 9, Money::from_cents(50), at(5));
        let ledger = ledger_for(&gw).await;
        let policy = RotationPolicy::new(Arc::clone(&ledger));

        let receipt = policy
            .on_receive(PART, NEW_BIN, 1, Money::from_cents(200))
            .await
            .unwrap();

        assert_eq!(receipt.rotated.len(), 2);
        let old: Vec<_> = ledger
            .active_batches(PART)
            .into_iter()
            .filter(|b| b.location().id() == OLD_BIN)
            .map(|b| (b.quantity(), b.unit_cost().cents()))
            .collect();
        assert_eq!(old.len(), 2);
        assert!(old.contains(&(2, 100)));
        assert!(old.contains(&(4, 150)));

        // Other parts in the bin are untouched.
        let other = gw.fetch_batches_for_part(OTHER_PART).await.unwrap();
        assert_eq!(other[0].location_id, NEW_BIN);
    }

    #[tokio::test]
    async fn old_and_solid_bins_receive_directly() {
        let gw = gateway();
        gw.seed_batch(PART, OLD_BIN, 3, Money::from_cents(200), at(0));
        let ledger = ledger_for(&gw).await;
        let policy = RotationPolicy::new(Arc::clone(&ledger));

        let receipt = policy.on_receive(PART, OLD_BIN, 2, Money::from_cents(250)).await.unwrap();
        assert!(receipt.rotated.is_empty());
        let receipt = policy.on_receive(PART, SOLID_BIN, 1, Money::from_cents(250)).await.unwrap();
        assert!(receipt.rotated.is_empty());
        assert_eq!(ledger.active_batches(PART).len(), 3);
    }

    #[tokio::test]
    async fn missing_old_counterpart_skips_rotation() {
        let gw = gateway();
        gw.seed_batch(PART, LONE_NEW_BIN, 3, Money::from_cents(200), at(0));
        let ledger = ledger_for(&gw).await;
        let policy = RotationPolicy::new(Arc::clone(&ledger));

        let receipt = policy
            .on_receive(PART, LONE_NEW_BIN, 5, Money::from_cents(300))
            .await
            .unwrap();

        assert!(receipt.rotated.is_empty());
        let active = ledger.active_batches(PART);
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|b| b.location().id() == LONE_NEW_BIN));
    }

    #[tokio::test]
    async fn relocation_failure_aborts_before_creating_the_batch() {
        let gw = gateway();
        let lot = gw.seed_batch(PART, NEW_BIN, 3, Money::from_cents(200), at(0));
        let ledger = ledger_for(&gw).await;
        let policy = RotationPolicy::new(Arc::clone(&ledger));
        gw.fail_next(GatewayOp::Relocate, Some(lot), StockError::unavailable("connection reset"));

        let err = policy
            .on_receive(PART, NEW_BIN, 5, Money::from_cents(300))
            .await
            .unwrap_err();

        match err {
            StockError::RotationFailure { part_id, batch_id, reason } => {
                assert_eq!(part_id, PART);
                assert_eq!(batch_id, lot);
                assert!(reason.contains("0 of 1 lots moved"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(gw.mutation_count(), 0);
        assert_eq!(gw.records().len(), 1);
    }

    #[tokio::test]
    async fn invalid_receipt_is_rejected_before_any_remote_call() {
        let gw = gateway();
        let ledger = ledger_for(&gw).await;
        let policy = RotationPolicy::new(Arc::clone(&ledger));
        gw.fail_next(GatewayOp::FetchBatches, None, StockError::unavailable("should not be reached"));

        let err = policy.on_receive(PART, NEW_BIN, 0, Money::ZERO).await.unwrap_err();
        assert!(matches!(err, StockError::InvalidQuantity(_)));

        // The injected failure is still pending.
        assert!(gw.fetch_batches_for_part(PART).await.is_err());
    }
}
