//! Infrastructure layer: stock gateway adapters, the batch ledger and the
//! services built on it, history persistence, configuration.

pub mod config;
pub mod consumer;
pub mod gateway;
pub mod guard;
pub mod kv;
pub mod ledger;
pub mod recorder;
pub mod rotation;
pub mod valuation;

mod integration_tests;
#[cfg(test)]
mod test_support;

pub use config::{ConfigError, StockConfig};
pub use consumer::{ExecutedPlan, FifoConsumer};
pub use gateway::{BatchRecord, HttpStockGateway, InMemoryStockGateway, LocationRecord, Relocated, StockGateway};
pub use guard::{PartGuard, PartLocks};
pub use kv::{HistoryStore, HistoryStoreError, InMemoryKeyValueStore, KeyValueStore, SqliteKeyValueStore};
pub use ledger::BatchLedger;
pub use recorder::{RecordSaleError, TransactionRecorder};
pub use rotation::{Receipt, RotatedLot, RotationPolicy};
pub use valuation::ValuationAggregator;
