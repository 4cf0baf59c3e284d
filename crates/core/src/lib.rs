//! `leanstock-core`: shared primitives for batch-tracked stock.
//!
//! This crate contains **pure** building blocks (no IO): identifiers, money,
//! the stock error taxonomy and the entity/value-object marker traits.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use entity::Entity;
pub use error::{StockError, StockResult};
pub use id::{BatchId, LocationId, PartId, TransactionId};
pub use money::Money;
pub use value_object::ValueObject;
