use serde::{Deserialize, Serialize};

use leanstock_core::PartId;

/// Catalog entry as far as stock rules care about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub name: String,
    pub sku: String,
    /// Reorder threshold; 0 disables the low-stock check.
    pub minimum_stock: i64,
}

impl Part {
    pub fn new(id: PartId, name: impl Into<String>, sku: impl Into<String>, minimum_stock: i64) -> Self {
        Self {
            id,
            name: name.into(),
            sku: sku.into(),
            minimum_stock: minimum_stock.max(0),
        }
    }
}
