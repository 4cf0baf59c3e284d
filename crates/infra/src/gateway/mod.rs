//! Seam to the remote inventory store.
//!
//! The engine never talks to the backend directly; everything goes through
//! [`StockGateway`]. Each call is one independent remote operation: there is
//! no cross-call transaction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use leanstock_core::{BatchId, LocationId, Money, PartId, StockResult};

pub mod http;
pub mod in_memory;

pub use http::HttpStockGateway;
pub use in_memory::{GatewayOp, InMemoryStockGateway};

/// A batch as the remote store reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub batch_id: BatchId,
    pub part_id: PartId,
    pub location_id: LocationId,
    pub location_label: String,
    pub quantity: i64,
    pub unit_cost: Money,
    pub last_updated_at: DateTime<Utc>,
}

/// A stock location as the remote store reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub location_id: LocationId,
    pub label: String,
}

/// Acknowledgement of a relocation.
///
/// A full transfer keeps the batch identity (`batch_id` is the source); a
/// partial one splits off a new batch at the destination.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Relocated {
    pub batch_id: BatchId,
}

/// Remote inventory backend.
#[async_trait::async_trait]
pub trait StockGateway: Send + Sync {
    async fn fetch_batches_for_part(&self, part_id: PartId) -> StockResult<Vec<BatchRecord>>;

    async fn create_batch(
        &self,
        part_id: PartId,
        location_id: LocationId,
        quantity: i64,
        unit_cost: Money,
    ) -> StockResult<BatchId>;

    async fn set_batch_quantity(&self, batch_id: BatchId, quantity: i64) -> StockResult<()>;

    /// Move `quantity` units of a batch to `new_location_id`.
    async fn relocate_batch(
        &self,
        batch_id: BatchId,
        new_location_id: LocationId,
        quantity: i64,
    ) -> StockResult<Relocated>;

    /// Every stock location, for building the location directory once.
    async fn fetch_locations(&self) -> StockResult<Vec<LocationRecord>>;
}

#[async_trait::async_trait]
impl<G> StockGateway for Arc<G>
where
    G: StockGateway + ?Sized,
{
    async fn fetch_batches_for_part(&self, part_id: PartId) -> StockResult<Vec<BatchRecord>> {
        (**self).fetch_batches_for_part(part_id).await
    }

    async fn create_batch(
        &self,
        part_id: PartId,
        location_id: LocationId,
        quantity: i64,
        unit_cost: Money,
    ) -> StockResult<BatchId> {
        (**self)
            .create_batch(part_id, location_id, quantity, unit_cost)
            .await
    }

    async fn set_batch_quantity(&self, batch_id: BatchId, quantity: i64) -> StockResult<()> {
        (**self).set_batch_quantity(batch_id, quantity).await
    }

    async fn relocate_batch(
        &self,
        batch_id: BatchId,
        new_location_id: LocationId,
        quantity: i64,
    ) -> StockResult<Relocated> {
        (**self)
            .relocate_batch(batch_id, new_location_id, quantity)
            .await
    }

    async fn fetch_locations(&self) -> StockResult<Vec<LocationRecord>> {
        (**self).fetch_locations().await
    }
}
