//! Inventory domain module: batches, bins, FIFO planning and valuation.
//!
//! This crate contains business rules for batch-tracked stock, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod batch;
pub mod location;
pub mod part;
pub mod plan;
pub mod valuation;

pub use batch::{Batch, BatchState, active_in_fifo_order, sort_fifo};
pub use location::{BinKind, BinTag, Location, LocationDirectory, ShelfCoordinate};
pub use part::Part;
pub use plan::{ConsumptionPlan, PlanLine, apply_plan, plan_consumption, verify_plan};
pub use valuation::{
    BatchValuation, LowStock, PartValuation, ValuationSummary, below_minimum, part_breakdown,
    summarize, total_value,
};
