//! Sales domain module: immutable sale transactions and their history.
//!
//! Pure domain logic; persistence goes through the key-value adapters in
//! `leanstock-infra`.

pub mod history;
pub mod transaction;

pub use history::{
    CUMULATIVE_MARGIN_KEY, DISCARDED_TRANSACTIONS_KEY_PREFIX, DecodedHistory, EncodedHistory, SCHEMA_VERSION, SCHEMA_VERSION_KEY,
    TRANSACTIONS_KEY, TransactionHistory, decode_history, encode_history,
};
pub use transaction::{SaleComponent, Transaction, TransactionLine};
