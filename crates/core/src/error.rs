//! Stock error model.

use thiserror::Error;

use crate::id::{BatchId, LocationId, PartId};

/// Result type used across the stock engine.
pub type StockResult<T> = Result<T, StockError>;

/// Error raised by batch planning, rotation, consumption and the gateway seam.
///
/// Every variant carries enough context (part, batch, quantities) for the
/// caller to show an actionable message without re-querying state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// A consumption request cannot be satisfied from active batches.
    ///
    /// Raised during planning, so nothing has been mutated.
    #[error("insufficient stock for part {part_id}: requested {requested}, available {available}")]
    InsufficientStock {
        part_id: PartId,
        requested: i64,
        available: i64,
    },

    /// A quantity or cost failed validation, or a mutation would drive a
    /// batch negative.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Relocating the current New-bin stock failed; the incoming batch was not created.
    #[error("rotation failed for part {part_id} while moving batch {batch_id}: {reason}")]
    RotationFailure {
        part_id: PartId,
        batch_id: BatchId,
        reason: String,
    },

    /// Transient failure talking to the remote inventory store.
    ///
    /// Mutations are not idempotent, so callers retry explicitly.
    #[error("inventory backend unavailable: {0}")]
    RemoteUnavailable(String),

    /// The remote store refused the request.
    #[error("inventory backend rejected request: {0}")]
    RemoteRejected(String),

    #[error("unknown batch {0}")]
    UnknownBatch(BatchId),

    #[error("unknown location {0}")]
    UnknownLocation(LocationId),

    /// A location label does not follow `<Zone>-<Column>-<Level>[-<A|B>]`.
    #[error("invalid location label: {0}")]
    InvalidLocationLabel(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A ledger mutation was attempted without holding the part's in-flight guard.
    #[error("part {0} is not locked by this operation")]
    PartNotLocked(PartId),

    /// A sale was submitted without any components.
    #[error("sale has no components")]
    EmptySale,
}

impl StockError {
    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::RemoteUnavailable(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::RemoteRejected(msg.into())
    }

    pub fn insufficient(part_id: PartId, requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            part_id,
            requested,
            available,
        }
    }

    /// Whether retrying the same call later might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(_))
    }
}
