//! Batch ledger: the single owner of cached batch state.
//!
//! Reads are served from the cache filled by [`BatchLedger::refresh`].
//! Mutations go to the gateway first and touch the cache only after the
//! gateway acknowledged them, and they require a [`PartGuard`] covering the
//! batch's part.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, error, warn};

use leanstock_core::{BatchId, LocationId, Money, PartId, StockError, StockResult};
use leanstock_inventory::{Batch, Location, LocationDirectory, active_in_fifo_order, sort_fifo};

use crate::gateway::{BatchRecord, StockGateway};
use crate::guard::{PartGuard, PartLocks};

pub struct BatchLedger<G> {
    gateway: G,
    directory: RwLock<LocationDirectory>,
    batches: RwLock<HashMap<PartId, Vec<Batch>>>,
    locks: PartLocks,
}

impl<G: StockGateway> BatchLedger<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            directory: RwLock::new(LocationDirectory::new()),
            batches: RwLock::new(HashMap::new()),
            locks: PartLocks::new(),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    fn directory(&self) -> RwLockReadGuard<'_, LocationDirectory> {
        self.directory.read().unwrap_or_else(|e| e.into_inner())
    }

    fn directory_mut(&self) -> RwLockWriteGuard<'_, LocationDirectory> {
        self.directory.write().unwrap_or_else(|e| e.into_inner())
    }

    fn cache(&self) -> RwLockReadGuard<'_, HashMap<PartId, Vec<Batch>>> {
        self.batches.read().unwrap_or_else(|e| e.into_inner())
    }

    fn cache_mut(&self) -> RwLockWriteGuard<'_, HashMap<PartId, Vec<Batch>>> {
        self.batches.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Load the location directory from the store. Returns the number of bins.
    pub async fn load_locations(&self) -> StockResult<usize> {
        let records = self.gateway.fetch_locations().await?;
        let (directory, skipped) = LocationDirectory::from_records(
            records.into_iter().map(|r| (r.location_id, r.label)),
        );
        for (location_id, label) in &skipped {
            debug!(location_id = %location_id, label = %label, "location is not a bin, skipped");
        }

        let bins = directory.len();
        *self.directory_mut() = directory;
        Ok(bins)
    }

    pub fn location(&self, location_id: LocationId) -> Option<Location> {
        self.directory().get(location_id).cloned()
    }

    /// The other bin of `location`'s split shelf.
    pub fn counterpart(&self, location: &Location) -> Option<Location> {
        self.directory().counterpart(location).cloned()
    }

    pub async fn lock_part(&self, part_id: PartId) -> PartGuard {
        self.locks.lock(part_id).await
    }

    /// Lock several parts in ascending id order.
    pub async fn lock_parts<I>(&self, part_ids: I) -> PartGuard
    where
        I: IntoIterator<Item = PartId>,
    {
        self.locks.lock_many(part_ids).await
    }

    fn require(guard: &PartGuard, part_id: PartId) -> StockResult<()> {
        if guard.covers(part_id) {
            Ok(())
        } else {
            Err(StockError::PartNotLocked(part_id))
        }
    }

    /// Reload one part from the store; returns its active batches.
    pub async fn refresh(&self, part_id: PartId) -> StockResult<Vec<Batch>> {
        let guard = self.lock_part(part_id).await;
        self.refresh_locked(&guard, part_id).await
    }

    pub async fn refresh_parts<I>(&self, part_ids: I) -> StockResult<()>
    where
        I: IntoIterator<Item = PartId>,
    {
        let guard = self.lock_parts(part_ids).await;
        for part_id in guard.parts() {
            self.refresh_locked(&guard, *part_id).await?;
        }
        Ok(())
    }

    /// Reload one part while the caller already holds its guard.
    pub async fn refresh_locked(&self, guard: &PartGuard, part_id: PartId) -> StockResult<Vec<Batch>> {
        Self::require(guard, part_id)?;

        let records = self.gateway.fetch_batches_for_part(part_id).await?;
        let mut batches = Vec::with_capacity(records.len());
        for record in records {
            if record.part_id != part_id {
                warn!(part_id = %part_id, batch_id = %record.batch_id, "store returned a batch of another part, ignored");
                continue;
            }
            let Some(location) = self.resolve_location(&record) else {
                continue;
            };
            let batch = Batch::new(
                record.batch_id,
                record.part_id,
                location,
                record.quantity,
                record.unit_cost,
                record.last_updated_at,
            )
            .inspect_err(|e| error!(part_id = %part_id, batch_id = %record.batch_id, error = %e, "store holds an invalid batch"))?;
            batches.push(batch);
        }

        sort_fifo(&mut batches);
        let active = active_in_fifo_order(part_id, &batches);
        self.cache_mut().insert(part_id, batches);
        Ok(active)
    }

    /// Directory entry for the record's location, or its label parsed once and remembered.
    fn resolve_location(&self, record: &BatchRecord) -> Option<Location> {
        if let Some(location) = self.location(record.location_id) {
            return Some(location);
        }
        match Location::parse(record.location_id, &record.location_label) {
            Ok(location) => {
                self.directory_mut().insert(location.clone());
                Some(location)
            }
            Err(e) => {
                warn!(
                    batch_id = %record.batch_id,
                    location_id = %record.location_id,
                    error = %e,
                    "batch sits in a location that is not a bin, ignored"
                );
                None
            }
        }
    }

    /// Active batches of a part in canonical FIFO order.
    pub fn active_batches(&self, part_id: PartId) -> Vec<Batch> {
        match self.cache().get(&part_id) {
            Some(batches) => active_in_fifo_order(part_id, batches),
            None => Vec::new(),
        }
    }

    /// Every cached batch of a part, depleted ones included.
    pub fn batches(&self, part_id: PartId) -> Vec<Batch> {
        self.cache().get(&part_id).cloned().unwrap_or_default()
    }

    pub fn batch(&self, batch_id: BatchId) -> Option<Batch> {
        self.cache()
            .values()
            .flatten()
            .find(|b| b.id_typed() == batch_id)
            .cloned()
    }

    /// Parts with cached state, ascending.
    pub fn parts(&self) -> Vec<PartId> {
        let mut parts: Vec<PartId> = self.cache().keys().copied().collect();
        parts.sort();
        parts
    }

    pub fn all_batches(&self) -> Vec<Batch> {
        let cache = self.cache();
        let mut parts: Vec<&PartId> = cache.keys().collect();
        parts.sort();
        parts
            .into_iter()
            .filter_map(|p| cache.get(p))
            .flatten()
            .cloned()
            .collect()
    }

    pub async fn create_batch(
        &self,
        guard: &PartGuard,
        part_id: PartId,
        location_id: LocationId,
        quantity: i64,
        unit_cost: Money,
    ) -> StockResult<Batch> {
        Self::require(guard, part_id)?;
        if quantity <= 0 || unit_cost.is_negative() {
            let err = StockError::invalid_quantity(format!(
                "cannot create batch of part {part_id} with quantity {quantity} at unit cost {unit_cost}"
            ));
            error!(part_id = %part_id, error = %err, "rejected batch creation");
            return Err(err);
        }
        let location = self
            .location(location_id)
            .ok_or(StockError::UnknownLocation(location_id))?;

        let batch_id = self
            .gateway
            .create_batch(part_id, location_id, quantity, unit_cost)
            .await?;

        let batch = Batch::new(batch_id, part_id, location, quantity, unit_cost, Utc::now())?;
        self.insert_cached(batch.clone());
        Ok(batch)
    }

    /// Change a batch's quantity by `delta` and persist the new absolute value.
    pub async fn adjust_quantity(&self, guard: &PartGuard, batch_id: BatchId, delta: i64) -> StockResult<Batch> {
        let current = self.batch(batch_id).ok_or(StockError::UnknownBatch(batch_id))?;
        Self::require(guard, current.part_id())?;

        let quantity = current.quantity_after(delta).inspect_err(|e| {
            error!(
                part_id = %current.part_id(),
                batch_id = %batch_id,
                delta,
                error = %e,
                "quantity adjustment would drive batch negative"
            )
        })?;

        self.gateway.set_batch_quantity(batch_id, quantity).await?;

        let mut updated = current;
        updated.set_quantity(quantity)?;
        let mut cache = self.cache_mut();
        if let Some(slot) = cache
            .get_mut(&updated.part_id())
            .and_then(|batches| batches.iter_mut().find(|b| b.id_typed() == batch_id))
        {
            *slot = updated.clone();
        }
        Ok(updated)
    }

    /// Move a whole batch to another location, keeping its unit cost.
    ///
    /// Returns the batch as it now sits at the destination. If the store
    /// reports a different id for the moved units, the source is recorded as
    /// depleted and the new id is cached in its place.
    pub async fn relocate(&self, guard: &PartGuard, batch_id: BatchId, location_id: LocationId) -> StockResult<Batch> {
        let current = self.batch(batch_id).ok_or(StockError::UnknownBatch(batch_id))?;
        Self::require(guard, current.part_id())?;
        if !current.is_active() {
            return Err(StockError::invalid_quantity(format!(
                "batch {batch_id} is depleted and cannot be moved"
            )));
        }
        let target = self
            .location(location_id)
            .ok_or(StockError::UnknownLocation(location_id))?;

        let relocated = self
            .gateway
            .relocate_batch(batch_id, location_id, current.quantity())
            .await?;
        let moved_at = Utc::now();

        let mut cache = self.cache_mut();
        let batches = cache.entry(current.part_id()).or_default();

        if relocated.batch_id == batch_id {
            let mut moved = current.clone();
            moved.move_to(target, moved_at);
            match batches.iter_mut().find(|b| b.id_typed() == batch_id) {
                Some(slot) => *slot = moved.clone(),
                None => batches.push(moved.clone()),
            }
            sort_fifo(batches);
            return Ok(moved);
        }

        if let Some(source) = batches.iter_mut().find(|b| b.id_typed() == batch_id) {
            source.deplete();
        }
        let moved = Batch::new(
            relocated.batch_id,
            current.part_id(),
            target,
            current.quantity(),
            current.unit_cost(),
            moved_at,
        )?;
        batches.push(moved.clone());
        sort_fifo(batches);
        Ok(moved)
    }

    fn insert_cached(&self, batch: Batch) {
        let mut cache = self.cache_mut();
        let batches = cache.entry(batch.part_id()).or_default();
        batches.retain(|b| b.id_typed() != batch.id_typed());
        batches.push(batch);
        sort_fifo(batches);
    }
}
