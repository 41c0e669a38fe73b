mod error;
mod mutations;
mod plan;
mod queries;

pub use error::EngineError;
pub use plan::{Plan, Write, enumerate_dates};

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use ulid::Ulid;

use crate::store::{AvailabilityStore, JournalStore, StoreError};

/// Exclusive hold on one guide's calendar. Dropping it releases the mutex
/// and removes the map entry when nobody else is holding or awaiting it.
pub(super) struct GuideLock<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a DashMap<Ulid, Arc<Mutex<()>>>,
    guide_id: Ulid,
}

impl Drop for GuideLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters own a clone of the Arc; a count of one is the map's own.
        // `remove_if` runs under the shard lock that `lock_guide` clones under.
        self.locks
            .remove_if(&self.guide_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Engine bound to one organization's journal.
pub type TenantEngine = SchedulingEngine<JournalStore>;

/// Applies calendar edits for the guides of one store.
///
/// Every top-level operation holds the guide's lock from its first read to
/// its last write, so two edits of the same guide never interleave.
pub struct SchedulingEngine<S> {
    store: Arc<S>,
    guide_locks: DashMap<Ulid, Arc<Mutex<()>>>,
}

impl<S: AvailabilityStore> SchedulingEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            guide_locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub(super) async fn lock_guide(&self, guide_id: Ulid) -> GuideLock<'_> {
        let lock = self
            .guide_locks
            .entry(guide_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        GuideLock {
            guard: Some(lock.lock_owned().await),
            locks: &self.guide_locks,
            guide_id,
        }
    }

    /// Issue planned deletes/updates in order. Stops at the first failure;
    /// earlier writes stay applied.
    pub(super) async fn apply_writes(&self, writes: &[Write]) -> Result<(), StoreError> {
        for write in writes {
            match *write {
                Write::Delete(id) => {
                    self.store.delete_slot(id).await?;
                    metrics::counter!(crate::observability::SLOT_WRITES_TOTAL, "kind" => "delete")
                        .increment(1);
                }
                Write::Update { id, status } => {
                    self.store.update_status(id, status).await?;
                    metrics::counter!(crate::observability::SLOT_WRITES_TOTAL, "kind" => "update")
                        .increment(1);
                }
            }
        }
        Ok(())
    }
}
