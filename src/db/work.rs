//! Work item operations: enqueue with reference dedup, atomic claim, finalize.

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use sqlx::types::Json;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::work::*;
use crate::telemetry::metrics;

const ITEM_COLUMNS: &str = "seq, id, reference, payload, state, failure_reason, attempts, created_at, updated_at, completed_at";

/// Result of enqueueing a single item.
#[derive(Debug)]
pub enum EnqueueResult {
    /// New work item created in state `new`.
    Created(Box<WorkItem>),
    /// A claimable item already exists for this reference; nothing inserted.
    Duplicate { reference: String },
}

/// Counts from a bulk repopulation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RepopulateCounts {
    pub cleared: u64,
    pub created: u64,
    pub duplicates: u64,
}

/// Validate a state transition, returning an error if disallowed.
fn validate_transition(from: State, to: State) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

impl super::Db {
    /// Insert one `new` item. Re-enqueueing a reference that is still
    /// `new` or `in_progress` is a no-op reported as `Duplicate`.
    pub async fn enqueue(&self, new: NewWorkItem) -> Result<EnqueueResult> {
        let id = WorkId::new();
        let inserted = insert_on(self.pool(), id, &new, Utc::now()).await?;
        record_enqueue(inserted);

        if inserted {
            let item = self.get_work_item(id).await?;
            Ok(EnqueueResult::Created(Box::new(item)))
        } else {
            Ok(EnqueueResult::Duplicate {
                reference: new.reference,
            })
        }
    }

    /// Replace the pending batch in one transaction: optionally delete all
    /// `new` items, then enqueue `items`. Either everything commits or
    /// nothing does.
    pub async fn repopulate(&self, items: &[NewWorkItem], clear_new: bool) -> Result<RepopulateCounts> {
        let mut tx = self.pool().begin().await?;
        let mut counts = RepopulateCounts::default();

        if clear_new {
            counts.cleared = clear_on(&mut *tx, State::New).await?;
        }

        let now = Utc::now();
        for new in items {
            if insert_on(&mut *tx, WorkId::new(), new, now).await? {
                counts.created += 1;
            } else {
                counts.duplicates += 1;
            }
        }

        tx.commit().await?;

        metrics::work_enqueued().add(counts.created, &[KeyValue::new("result", "ok")]);
        metrics::work_enqueued().add(counts.duplicates, &[KeyValue::new("result", "duplicate")]);

        Ok(counts)
    }

    /// Delete every item in `state`. Only `new` items may be cleared;
    /// finished items are the historical record and claimed items belong
    /// to a running worker.
    pub async fn clear(&self, state: State) -> Result<u64> {
        clear_on(self.pool(), state).await
    }

    /// Highest sequence number currently in the queue (0 if empty).
    pub async fn queue_horizon(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(seq), 0) FROM work_items")
            .fetch_one(self.pool())
            .await?;
        Ok(row.0)
    }

    /// Atomically claim the oldest `new` item with `after < seq <= horizon`.
    ///
    /// The `state = 'new'` guard on the UPDATE makes this a compare-and-swap,
    /// so two workers can never hold the same item.
    pub async fn claim_next(&self, after: i64, horizon: i64) -> Result<Option<WorkItem>> {
        let row: Option<WorkItemRow> = sqlx::query_as(&format!(
            "UPDATE work_items
             SET state = 'in_progress', attempts = attempts + 1, updated_at = ?1
             WHERE seq = (
                 SELECT seq FROM work_items
                 WHERE state = 'new' AND seq > ?2 AND seq <= ?3
                 ORDER BY seq ASC LIMIT 1
             )
             AND state = 'new'
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(Utc::now())
        .bind(after)
        .bind(horizon)
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        record_transition(State::New, State::InProgress);
        row.try_into_work_item().map(Some)
    }

    /// In progress → done.
    pub async fn complete_work(&self, id: WorkId) -> Result<WorkItem> {
        self.finalize(id, State::Done, None).await
    }

    /// In progress → failed, storing `reason` for manual review.
    pub async fn fail_work(&self, id: WorkId, reason: &str) -> Result<WorkItem> {
        self.finalize(id, State::Failed, Some(reason)).await
    }

    /// In progress → new, making the item claimable again.
    pub async fn release_work(&self, id: WorkId) -> Result<WorkItem> {
        self.finalize(id, State::New, None).await
    }

    /// Reset items left `in_progress` by a worker that died mid-item.
    /// Only safe while no other worker is running.
    pub async fn recover_in_progress(&self) -> Result<u64> {
        let recovered = sqlx::query(
            "UPDATE work_items SET state = 'new', updated_at = ?1 WHERE state = 'in_progress'",
        )
        .bind(Utc::now())
        .execute(self.pool())
        .await?
        .rows_affected();

        if recovered > 0 {
            metrics::work_state_transitions().add(
                recovered,
                &[
                    KeyValue::new("from", State::InProgress.as_str()),
                    KeyValue::new("to", State::New.as_str()),
                ],
            );
        }
        Ok(recovered)
    }

    /// Get a work item by ID.
    pub async fn get_work_item(&self, id: WorkId) -> Result<WorkItem> {
        let row: Option<WorkItemRow> =
            sqlx::query_as(&format!("SELECT {ITEM_COLUMNS} FROM work_items WHERE id = ?1"))
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;

        row.ok_or_else(|| Error::NotFound(format!("work item {id}")))?
            .try_into_work_item()
    }

    /// The claimable (new or in-progress) item for a reference, if any.
    pub async fn find_active_by_reference(&self, reference: &str) -> Result<Option<WorkItem>> {
        let row: Option<WorkItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM work_items
             WHERE reference = ?1 AND state IN ('new', 'in_progress')"
        ))
        .bind(reference)
        .fetch_optional(self.pool())
        .await?;

        row.map(WorkItemRow::try_into_work_item).transpose()
    }

    /// Every item ever recorded for a reference, oldest first.
    pub async fn list_by_reference(&self, reference: &str) -> Result<Vec<WorkItem>> {
        let rows: Vec<WorkItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM work_items WHERE reference = ?1 ORDER BY seq ASC"
        ))
        .bind(reference)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(WorkItemRow::try_into_work_item).collect()
    }

    /// List work items, optionally filtered by state, newest first.
    pub async fn list_work_items(&self, state: Option<State>, limit: i64) -> Result<Vec<WorkItem>> {
        let rows: Vec<WorkItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM work_items
             WHERE (?1 IS NULL OR state = ?1)
             ORDER BY seq DESC
             LIMIT ?2"
        ))
        .bind(state.map(State::as_str))
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(WorkItemRow::try_into_work_item).collect()
    }

    /// Number of items per state. States with no items are omitted.
    pub async fn count_by_state(&self) -> Result<Vec<(State, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM work_items GROUP BY state ORDER BY state")
                .fetch_all(self.pool())
                .await?;

        rows.into_iter()
            .map(|(state, count)| state.parse::<State>().map(|s| (s, count)))
            .collect()
    }

    /// Move a claimed item to `to`. Fails if the item is not `in_progress`.
    async fn finalize(&self, id: WorkId, to: State, reason: Option<&str>) -> Result<WorkItem> {
        validate_transition(State::InProgress, to)?;

        let now = Utc::now();
        let completed_at = to.is_terminal().then_some(now);

        let rows_affected = sqlx::query(
            "UPDATE work_items
             SET state = ?1, failure_reason = ?2, updated_at = ?3, completed_at = ?4
             WHERE id = ?5 AND state = 'in_progress'",
        )
        .bind(to.as_str())
        .bind(reason)
        .bind(now)
        .bind(completed_at)
        .bind(id.0)
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected == 0 {
            let current = self.get_work_item(id).await?;
            return Err(Error::InvalidTransition {
                from: current.state.to_string(),
                to: to.to_string(),
            });
        }

        record_transition(State::InProgress, to);
        self.get_work_item(id).await
    }
}

/// Delete every item in `state`; anything but `new` is refused.
async fn clear_on<'e, E>(exec: E, state: State) -> Result<u64>
where
    E: sqlx::SqliteExecutor<'e>,
{
    if state != State::New {
        return Err(Error::NotClearable(state));
    }
    let removed = sqlx::query("DELETE FROM work_items WHERE state = ?1")
        .bind(state.as_str())
        .execute(exec)
        .await?
        .rows_affected();
    Ok(removed)
}

/// Insert a `new` item unless a claimable one exists for the same reference.
/// Returns whether a row was written.
async fn insert_on<'e, E>(exec: E, id: WorkId, new: &NewWorkItem, now: DateTime<Utc>) -> Result<bool>
where
    E: sqlx::SqliteExecutor<'e>,
{
    let rows_affected = sqlx::query(
        "INSERT INTO work_items (id, reference, payload, state, attempts, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'new', 0, ?4, ?4)
         ON CONFLICT DO NOTHING",
    )
    .bind(id.0)
    .bind(&new.reference)
    .bind(Json(&new.payload))
    .bind(now)
    .execute(exec)
    .await?
    .rows_affected();

    Ok(rows_affected == 1)
}

fn record_enqueue(inserted: bool) {
    metrics::work_enqueued().add(
        1,
        &[KeyValue::new("result", if inserted { "ok" } else { "duplicate" })],
    );
}

fn record_transition(from: State, to: State) {
    metrics::work_state_transitions().add(
        1,
        &[
            KeyValue::new("from", from.as_str()),
            KeyValue::new("to", to.as_str()),
        ],
    );
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct WorkItemRow {
    seq: i64,
    id: Uuid,
    reference: String,
    payload: Json<WorkPayload>,
    state: String,
    failure_reason: Option<String>,
    attempts: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl WorkItemRow {
    fn try_into_work_item(self) -> Result<WorkItem> {
        Ok(WorkItem {
            id: WorkId(self.id),
            seq: self.seq,
            reference: self.reference,
            payload: self.payload.0,
            state: self.state.parse()?,
            failure_reason: self.failure_reason,
            attempts: self.attempts as u32,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}
