//! Work queue with scoped claims.
//!
//! [`WorkQueue::iter`] yields [`ClaimedItem`]s. Each claim must end in
//! exactly one of `complete`, `fail` or `release`. A claim dropped without
//! one (error path, panic) is released in the background. Claims orphaned by
//! a crashed process are reset by [`WorkQueue::recover`] on the next run.

use tracing::{error, warn};

use crate::db::Db;
use crate::db::work::{EnqueueResult, RepopulateCounts};
use crate::error::Result;
use crate::model::work::{NewWorkItem, State, WorkItem, WorkPayload};

/// Handle on the durable queue.
#[derive(Clone)]
pub struct WorkQueue {
    db: Db,
}

impl WorkQueue {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Remove every item in `state`. Only `new` is accepted.
    pub async fn clear(&self, state: State) -> Result<u64> {
        self.db.clear(state).await
    }

    /// Add one `new` item, skipping references that are already claimable.
    pub async fn enqueue(&self, new: NewWorkItem) -> Result<EnqueueResult> {
        self.db.enqueue(new).await
    }

    /// Bulk load in a single transaction, optionally clearing `new` items first.
    pub async fn load(&self, items: &[NewWorkItem], clear_new: bool) -> Result<RepopulateCounts> {
        self.db.repopulate(items, clear_new).await
    }

    /// Reset claims left behind by a process that died mid-item.
    pub async fn recover(&self) -> Result<u64> {
        self.db.recover_in_progress().await
    }

    /// Start a claiming pass over the items that are `new` right now.
    ///
    /// Items enqueued after this call, and items released during the pass,
    /// are left for the next run.
    pub async fn iter(&self) -> Result<WorkIter> {
        let horizon = self.db.queue_horizon().await?;
        Ok(WorkIter {
            db: self.db.clone(),
            cursor: 0,
            horizon,
        })
    }
}

/// A single, non-restartable pass over the queue in FIFO order.
pub struct WorkIter {
    db: Db,
    cursor: i64,
    horizon: i64,
}

impl WorkIter {
    /// Claim the next item, or `None` once the pass is exhausted.
    pub async fn next(&mut self) -> Result<Option<ClaimedItem>> {
        let Some(item) = self.db.claim_next(self.cursor, self.horizon).await? else {
            self.cursor = self.horizon;
            return Ok(None);
        };
        self.cursor = item.seq;
        Ok(Some(ClaimedItem {
            db: self.db.clone(),
            item,
            finalized: false,
        }))
    }
}

/// An item held exclusively by this worker.
#[must_use = "a claimed item must be completed, failed or released"]
pub struct ClaimedItem {
    db: Db,
    item: WorkItem,
    finalized: bool,
}

impl ClaimedItem {
    pub fn item(&self) -> &WorkItem {
        &self.item
    }

    pub fn payload(&self) -> &WorkPayload {
        &self.item.payload
    }

    /// Mark the item `done`.
    pub async fn complete(mut self) -> Result<WorkItem> {
        let item = self.db.complete_work(self.item.id).await?;
        self.finalized = true;
        Ok(item)
    }

    /// Mark the item `failed` with `reason` for manual review.
    pub async fn fail(mut self, reason: &str) -> Result<WorkItem> {
        let item = self.db.fail_work(self.item.id, reason).await?;
        self.finalized = true;
        Ok(item)
    }

    /// Return the item to `new` so a later run can retry it.
    pub async fn release(mut self) -> Result<WorkItem> {
        let item = self.db.release_work(self.item.id).await?;
        self.finalized = true;
        Ok(item)
    }
}

impl Drop for ClaimedItem {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        let id = self.item.id;
        let reference = self.item.reference.clone();
        warn!(%id, %reference, "claimed item dropped without finalize, releasing");

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            // No runtime to release on; startup recovery will pick it up.
            return;
        };
        let db = self.db.clone();
        handle.spawn(async move {
            if let Err(e) = db.release_work(id).await {
                error!(%id, %reference, "failed to release dropped claim: {e}");
            }
        });
    }
}
