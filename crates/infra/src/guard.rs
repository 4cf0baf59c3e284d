//! Per-part in-flight guards.
//!
//! One async mutex per part id, created lazily. Every operation that reads
//! then writes a part's batches (refresh, rotation, plan + execute, sale)
//! holds the part's guard for its whole duration. Multi-part acquisition is
//! always in ascending part-id order.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use leanstock_core::PartId;

#[derive(Debug, Default)]
pub struct PartLocks {
    locks: Mutex<HashMap<PartId, Arc<AsyncMutex<()>>>>,
}

impl PartLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, part_id: PartId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(part_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn lock(&self, part_id: PartId) -> PartGuard {
        let held = self.handle(part_id).lock_owned().await;
        PartGuard {
            parts: vec![part_id],
            _held: vec![held],
        }
    }

    /// Lock every distinct part in `part_ids`, smallest id first.
    pub async fn lock_many<I>(&self, part_ids: I) -> PartGuard
    where
        I: IntoIterator<Item = PartId>,
    {
        let ordered: BTreeSet<PartId> = part_ids.into_iter().collect();
        let mut parts = Vec::with_capacity(ordered.len());
        let mut held = Vec::with_capacity(ordered.len());
        for part_id in ordered {
            held.push(self.handle(part_id).lock_owned().await);
            parts.push(part_id);
        }
        PartGuard { parts, _held: held }
    }

    /// Non-blocking variant of [`PartLocks::lock`].
    pub fn try_lock(&self, part_id: PartId) -> Option<PartGuard> {
        let held = self.handle(part_id).try_lock_owned().ok()?;
        Some(PartGuard {
            parts: vec![part_id],
            _held: vec![held],
        })
    }
}

/// Proof that the holder owns the in-flight guard of some parts.
///
/// Released on drop.
#[derive(Debug)]
pub struct PartGuard {
    parts: Vec<PartId>,
    _held: Vec<OwnedMutexGuard<()>>,
}

impl PartGuard {
    pub fn covers(&self, part_id: PartId) -> bool {
        self.parts.binary_search(&part_id).is_ok()
    }

    /// Locked parts, ascending.
    pub fn parts(&self) -> &[PartId] {
        &self.parts
    }
}
