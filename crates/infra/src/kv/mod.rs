//! Key-value persistence for local state (sale history).

use std::sync::Arc;

use thiserror::Error;

pub mod history;
pub mod in_memory;
pub mod sqlite;

pub use history::HistoryStore;
pub use in_memory::InMemoryKeyValueStore;
pub use sqlite::SqliteKeyValueStore;

#[derive(Debug, Error)]
pub enum HistoryStoreError {
    #[error("key-value backend error: {0}")]
    Backend(String),

    #[error("failed to encode sale history: {0}")]
    Encode(#[from] serde_json::Error),
}

impl HistoryStoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// String-keyed, string-valued store.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, HistoryStoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), HistoryStoreError>;

    async fn remove(&self, key: &str) -> Result<(), HistoryStoreError>;
}

#[async_trait::async_trait]
impl<S> KeyValueStore for Arc<S>
where
    S: KeyValueStore + ?Sized,
{
    async fn get(&self, key: &str) -> Result<Option<String>, HistoryStoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), HistoryStoreError> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), HistoryStoreError> {
        (**self).remove(key).await
    }
}
