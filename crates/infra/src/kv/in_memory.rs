use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{HistoryStoreError, KeyValueStore};

/// In-memory key-value store for tests/dev.
///
/// Writes can be made to fail to exercise persistence errors.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: Mutex<WriteFailure>,
}

#[derive(Debug, Default)]
enum WriteFailure {
    #[default]
    None,
    All,
    Key(String),
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        store
            .entries()
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        store
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn failure(&self) -> MutexGuard<'_, WriteFailure> {
        self.fail_writes.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_fail_writes(&self, fail: bool) {
        *self.failure() = if fail { WriteFailure::All } else { WriteFailure::None };
    }

    /// Fail writes to `key` only; other keys stay writable.
    pub fn fail_writes_to(&self, key: &str) {
        *self.failure() = WriteFailure::Key(key.to_string());
    }

    fn check_writable(&self, key: &str) -> Result<(), HistoryStoreError> {
        match &*self.failure() {
            WriteFailure::None => Ok(()),
            WriteFailure::All => Err(HistoryStoreError::backend("store is read-only")),
            WriteFailure::Key(k) if k == key => Err(HistoryStoreError::backend(format!("write to {key} rejected"))),
            WriteFailure::Key(_) => Ok(()),
        }
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries().clone()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, HistoryStoreError> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), HistoryStoreError> {
        self.check_writable(key)?;
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), HistoryStoreError> {
        self.check_writable(key)?;
        self.entries().remove(key);
        Ok(())
    }
}
