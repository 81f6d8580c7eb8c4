//! Keyed per-source mutex
//!
//! Overlapping syncs of the same source serialize on its entry; different
//! sources never contend. An entry is dropped when its last holder releases
//! it with nobody waiting.

use std::sync::Arc;

use addrsync_core::domain::SourceId;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per source ID
#[derive(Debug, Default)]
pub struct SourceLocks {
    locks: DashMap<SourceId, Arc<Mutex<()>>>,
}

/// Exclusive access to one source; released on drop
#[derive(Debug)]
pub struct SourceGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a DashMap<SourceId, Arc<Mutex<()>>>,
    id: SourceId,
}

impl Drop for SourceGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // waiters hold a clone of the Arc, so their entry survives
        self.locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl SourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `id`
    pub async fn acquire(&self, id: &SourceId) -> SourceGuard<'_> {
        // clone out of the map so no shard lock is held across the await
        let lock = self
            .locks
            .entry(*id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        SourceGuard {
            guard: Some(guard),
            locks: &self.locks,
            id: *id,
        }
    }

    /// True while some task holds the lock for `id`
    pub fn is_locked(&self, id: &SourceId) -> bool {
        self.locks
            .get(id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Number of sources with a live entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
