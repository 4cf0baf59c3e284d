use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use leanstock_core::{BatchId, LocationId, Money, PartId, StockError, StockResult};

use super::{BatchRecord, LocationRecord, Relocated, StockGateway};

/// Gateway operation, used to target injected failures.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GatewayOp {
    FetchBatches,
    Create,
    SetQuantity,
    Relocate,
    FetchLocations,
}

#[derive(Debug)]
struct InjectedFailure {
    op: GatewayOp,
    batch_id: Option<BatchId>,
    error: StockError,
}

#[derive(Debug, Clone)]
struct StoredBatch {
    part_id: PartId,
    location_id: LocationId,
    quantity: i64,
    unit_cost: Money,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    locations: BTreeMap<LocationId, String>,
    batches: BTreeMap<BatchId, StoredBatch>,
    next_batch_id: u64,
    last_stamp: Option<DateTime<Utc>>,
    failures: Vec<InjectedFailure>,
    mutations: usize,
}

impl State {
    /// Wall-clock time, strictly increasing across calls.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    fn take_failure(&mut self, op: GatewayOp, batch_id: Option<BatchId>) -> StockResult<()> {
        let hit = self
            .failures
            .iter()
            .position(|f| f.op == op && (f.batch_id.is_none() || f.batch_id == batch_id));
        match hit {
            Some(idx) => Err(self.failures.remove(idx).error),
            None => Ok(()),
        }
    }

    fn label(&self, location_id: LocationId) -> StockResult<&str> {
        self.locations
            .get(&location_id)
            .map(String::as_str)
            .ok_or(StockError::UnknownLocation(location_id))
    }

    fn insert(&mut self, batch: StoredBatch) -> BatchId {
        self.next_batch_id += 1;
        let id = BatchId::new(self.next_batch_id);
        self.batches.insert(id, batch);
        id
    }
}

/// In-memory inventory backend for tests/dev.
///
/// Behaves like the remote store: assigns batch ids, timestamps placements,
/// keeps depleted batches, and splits a batch on partial relocation. Failures
/// can be injected per operation (optionally per batch) to exercise error
/// paths; each injected failure fires once.
#[derive(Debug, Default)]
pub struct InMemoryStockGateway {
    state: Mutex<State>,
}

impl InMemoryStockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_location(&self, location_id: LocationId, label: impl Into<String>) {
        self.state().locations.insert(location_id, label.into());
    }

    /// Insert a batch directly, bypassing mutation accounting.
    pub fn seed_batch(
        &self,
        part_id: PartId,
        location_id: LocationId,
        quantity: i64,
        unit_cost: Money,
        updated_at: DateTime<Utc>,
    ) -> BatchId {
        self.state().insert(StoredBatch {
            part_id,
            location_id,
            quantity,
            unit_cost,
            updated_at,
        })
    }

    /// Make the next matching call fail with `error`.
    pub fn fail_next(&self, op: GatewayOp, batch_id: Option<BatchId>, error: StockError) {
        self.state().failures.push(InjectedFailure {
            op,
            batch_id,
            error,
        });
    }

    /// Number of successful mutating calls (create, set quantity, relocate).
    pub fn mutation_count(&self) -> usize {
        self.state().mutations
    }

    pub fn record(&self, batch_id: BatchId) -> Option<BatchRecord> {
        let state = self.state();
        let batch = state.batches.get(&batch_id)?;
        Some(to_record(&state, batch_id, batch))
    }

    /// Every stored batch, depleted ones included.
    pub fn records(&self) -> Vec<BatchRecord> {
        let state = self.state();
        state
            .batches
            .iter()
            .map(|(id, b)| to_record(&state, *id, b))
            .collect()
    }
}

fn to_record(state: &State, batch_id: BatchId, batch: &StoredBatch) -> BatchRecord {
    BatchRecord {
        batch_id,
        part_id: batch.part_id,
        location_id: batch.location_id,
        location_label: state
            .locations
            .get(&batch.location_id)
            .cloned()
            .unwrap_or_default(),
        quantity: batch.quantity,
        unit_cost: batch.unit_cost,
        last_updated_at: batch.updated_at,
    }
}

#[async_trait::async_trait]
impl StockGateway for InMemoryStockGateway {
    async fn fetch_batches_for_part(&self, part_id: PartId) -> StockResult<Vec<BatchRecord>> {
        let mut state = self.state();
        state.take_failure(GatewayOp::FetchBatches, None)?;
        Ok(state
            .batches
            .iter()
            .filter(|(_, b)| b.part_id == part_id)
            .map(|(id, b)| to_record(&state, *id, b))
            .collect())
    }

    async fn create_batch(
        &self,
        part_id: PartId,
        location_id: LocationId,
        quantity: i64,
        unit_cost: Money,
    ) -> StockResult<BatchId> {
        let mut state = self.state();
        state.take_failure(GatewayOp::Create, None)?;
        state.label(location_id)?;
        if quantity <= 0 || unit_cost.is_negative() {
            return Err(StockError::rejected(format!(
                "create rejected: quantity {quantity}, unit cost {unit_cost}"
            )));
        }

        let updated_at = state.stamp();
        let id = state.insert(StoredBatch {
            part_id,
            location_id,
            quantity,
            unit_cost,
            updated_at,
        });
        state.mutations += 1;
        Ok(id)
    }

    async fn set_batch_quantity(&self, batch_id: BatchId, quantity: i64) -> StockResult<()> {
        let mut state = self.state();
        state.take_failure(GatewayOp::SetQuantity, Some(batch_id))?;
        if quantity < 0 {
            return Err(StockError::rejected(format!(
                "batch {batch_id}: quantity {quantity} is negative"
            )));
        }
        let batch = state
            .batches
            .get_mut(&batch_id)
            .ok_or(StockError::UnknownBatch(batch_id))?;
        batch.quantity = quantity;
        state.mutations += 1;
        Ok(())
    }

    async fn relocate_batch(
        &self,
        batch_id: BatchId,
        new_location_id: LocationId,
        quantity: i64,
    ) -> StockResult<Relocated> {
        let mut state = self.state();
        state.take_failure(GatewayOp::Relocate, Some(batch_id))?;
        state.label(new_location_id)?;

        let source = state
            .batches
            .get(&batch_id)
            .cloned()
            .ok_or(StockError::UnknownBatch(batch_id))?;
        if quantity <= 0 || quantity > source.quantity {
            return Err(StockError::rejected(format!(
                "batch {batch_id} holds {}, cannot move {quantity}",
                source.quantity
            )));
        }

        let stamp = state.stamp();
        let moved_to = if quantity == source.quantity {
            if let Some(batch) = state.batches.get_mut(&batch_id) {
                batch.location_id = new_location_id;
                batch.updated_at = stamp;
            }
            batch_id
        } else {
            if let Some(batch) = state.batches.get_mut(&batch_id) {
                batch.quantity -= quantity;
            }
            state.insert(StoredBatch {
                location_id: new_location_id,
                quantity,
                updated_at: stamp,
                ..source
            })
        };
        state.mutations += 1;
        Ok(Relocated { batch_id: moved_to })
    }

    async fn fetch_locations(&self) -> StockResult<Vec<LocationRecord>> {
        let mut state = self.state();
        state.take_failure(GatewayOp::FetchLocations, None)?;
        Ok(state
            .locations
            .iter()
            .map(|(id, label)| LocationRecord {
                location_id: *id,
                label: label.clone(),
            })
            .collect())
    }
}
