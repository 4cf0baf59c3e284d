//! Sale history persisted under fixed keys.

use chrono::Utc;
use tracing::{info, warn};

use leanstock_sales::{
    CUMULATIVE_MARGIN_KEY, DISCARDED_TRANSACTIONS_KEY_PREFIX, SCHEMA_VERSION, SCHEMA_VERSION_KEY,
    TRANSACTIONS_KEY, TransactionHistory, decode_history, encode_history,
};

use super::{HistoryStoreError, KeyValueStore};

pub struct HistoryStore<S> {
    store: S,
}

impl<S: KeyValueStore> HistoryStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Read the stored history.
    ///
    /// Older schemas are migrated and written back. Unreadable payloads are
    /// copied to a backup key, then dropped with a warning. The stored
    /// cumulative margin is only a cache of the fold and is rewritten when it
    /// disagrees.
    pub async fn load(&self) -> Result<TransactionHistory, HistoryStoreError> {
        let version = self.store.get(SCHEMA_VERSION_KEY).await?;
        let payload = self.store.get(TRANSACTIONS_KEY).await?;
        let decoded = decode_history(version.as_deref(), payload.as_deref());

        if let Some(from) = decoded.migrated_from {
            info!(
                from,
                to = SCHEMA_VERSION,
                transactions = decoded.history.len(),
                "migrated sale history"
            );
        }
        if decoded.marker_mismatch && decoded.migrated_from.is_none() {
            warn!(stored_version = ?version, "sale history did not match its version marker, rewriting");
        }
        if let Some(reason) = &decoded.discarded {
            let backup_key = format!("{DISCARDED_TRANSACTIONS_KEY_PREFIX}.{}", Utc::now().timestamp_millis());
            if let Some(raw) = &payload {
                self.store.set(&backup_key, raw).await?;
            }
            warn!(reason = %reason, backup_key = %backup_key, "discarded unreadable sale history");
        }

        if decoded.needs_rewrite() {
            self.save(&decoded.history).await?;
            return Ok(decoded.history);
        }

        let margin = decoded.history.cumulative_margin();
        let stored = self.store.get(CUMULATIVE_MARGIN_KEY).await?;
        if !decoded.history.is_empty() && stored.as_deref() != Some(margin.cents().to_string().as_str()) {
            warn!(
                stored = ?stored,
                recomputed = margin.cents(),
                "stored cumulative margin disagrees with history, rewriting"
            );
            self.store
                .set(CUMULATIVE_MARGIN_KEY, &margin.cents().to_string())
                .await?;
        }

        Ok(decoded.history)
    }

    /// Write the whole history. The version marker goes first so a payload
    /// is never left behind without the marker describing it; the margin is
    /// derived and goes last.
    pub async fn save(&self, history: &TransactionHistory) -> Result<(), HistoryStoreError> {
        let encoded = encode_history(history)?;
        self.store
            .set(SCHEMA_VERSION_KEY, &encoded.schema_version)
            .await?;
        self.store.set(TRANSACTIONS_KEY, &encoded.transactions).await?;
        self.store
            .set(CUMULATIVE_MARGIN_KEY, &encoded.cumulative_margin)
            .await?;
        Ok(())
    }
}
