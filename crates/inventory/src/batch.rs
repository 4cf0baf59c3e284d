use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use leanstock_core::{BatchId, Entity, Money, PartId, StockError, StockResult};

use crate::location::Location;

/// Lifecycle of a batch. A depleted batch is kept for audit, never deleted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Active,
    Depleted,
}

/// One lot of one part, received at one unit cost, sitting in one location.
///
/// The unit cost is fixed for the life of the batch; only the quantity and
/// the location change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    id: BatchId,
    part_id: PartId,
    location: Location,
    quantity: i64,
    unit_cost: Money,
    updated_at: DateTime<Utc>,
}

impl Batch {
    pub fn new(
        id: BatchId,
        part_id: PartId,
        location: Location,
        quantity: i64,
        unit_cost: Money,
        updated_at: DateTime<Utc>,
    ) -> StockResult<Self> {
        if quantity < 0 {
            return Err(StockError::invalid_quantity(format!(
                "batch {id} has negative quantity {quantity}"
            )));
        }
        if unit_cost.is_negative() {
            return Err(StockError::invalid_quantity(format!(
                "batch {id} has negative unit cost {unit_cost}"
            )));
        }
        Ok(Self {
            id,
            part_id,
            location,
            quantity,
            unit_cost,
            updated_at,
        })
    }

    pub fn id_typed(&self) -> BatchId {
        self.id
    }

    pub fn part_id(&self) -> PartId {
        self.part_id
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn unit_cost(&self) -> Money {
        self.unit_cost
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn state(&self) -> BatchState {
        if self.quantity > 0 {
            BatchState::Active
        } else {
            BatchState::Depleted
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == BatchState::Active
    }

    /// quantity × unit cost.
    pub fn value(&self) -> Money {
        self.unit_cost.times(self.quantity)
    }

    /// Quantity after applying `delta`, or `InvalidQuantity` if it would go negative.
    pub fn quantity_after(&self, delta: i64) -> StockResult<i64> {
        match self.quantity.checked_add(delta) {
            Some(q) if q >= 0 => Ok(q),
            _ => Err(StockError::invalid_quantity(format!(
                "batch {} holds {}, cannot apply {delta:+}",
                self.id, self.quantity
            ))),
        }
    }

    /// Apply a quantity change and return the new quantity.
    pub fn apply_delta(&mut self, delta: i64) -> StockResult<i64> {
        let quantity = self.quantity_after(delta)?;
        self.quantity = quantity;
        Ok(quantity)
    }

    /// Overwrite the quantity with an absolute value the store accepted.
    pub fn set_quantity(&mut self, quantity: i64) -> StockResult<()> {
        if quantity < 0 {
            return Err(StockError::invalid_quantity(format!(
                "batch {} cannot hold {quantity}",
                self.id
            )));
        }
        self.quantity = quantity;
        Ok(())
    }

    /// Mark every unit as gone, e.g. after the whole lot moved elsewhere.
    pub fn deplete(&mut self) {
        self.quantity = 0;
    }

    /// Record that the whole batch now sits in `location`.
    pub fn move_to(&mut self, location: Location, at: DateTime<Utc>) {
        self.location = location;
        self.updated_at = at;
    }

    /// Canonical consumption key: bin rank, then oldest first, then id.
    pub fn fifo_key(&self) -> (u8, DateTime<Utc>, BatchId) {
        (self.location.fifo_rank(), self.updated_at, self.id)
    }
}

impl Entity for Batch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Sort batches into canonical FIFO order in place.
///
/// Old (and solid) bins come before New bins; within a rank the oldest
/// `updated_at` wins; batch id breaks ties. Consumption and display both use
/// this order.
pub fn sort_fifo(batches: &mut [Batch]) {
    batches.sort_by_key(Batch::fifo_key);
}

/// The active batches of `part_id`, in canonical FIFO order.
pub fn active_in_fifo_order<'a, I>(part_id: PartId, batches: I) -> Vec<Batch>
where
    I: IntoIterator<Item = &'a Batch>,
{
    let mut active: Vec<Batch> = batches
        .into_iter()
        .filter(|b| b.part_id == part_id && b.is_active())
        .cloned()
        .collect();
    sort_fifo(&mut active);
    active
}
