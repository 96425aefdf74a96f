//! Work item model.
//!
//! A work item is one entity waiting for remediation. It is keyed by the
//! entity's natural reference and carries only the id needed to re-fetch
//! the entity at process time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A unit of durable queue state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identifier.
    pub id: WorkId,

    /// Insertion order. Iteration claims items in ascending `seq`.
    pub seq: i64,

    /// Natural key of the entity (its national identifier).
    /// At most one claimable item exists per reference.
    pub reference: String,

    /// Minimal data needed to reprocess the item.
    pub payload: WorkPayload,

    /// Current lifecycle state.
    pub state: State,

    /// Why the item failed. Only set when `state` is `Failed`.
    pub failure_reason: Option<String>,

    /// Number of times the item has been claimed.
    pub attempts: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Payload stored with a work item. Never holds entity state beyond the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkPayload {
    pub cpr: String,
}

/// Newtype for work item IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkId(pub Uuid);

impl WorkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Waiting to be claimed.
    New,
    /// Claimed by a worker for the current run.
    InProgress,
    /// Remediation applied. Terminal.
    Done,
    /// Rejected by the remote system; left for manual review. Terminal.
    Failed,
}

impl State {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: State) -> bool {
        use State::*;
        matches!(
            (self, to),
            (New, InProgress)
                | (InProgress, Done)
                | (InProgress, Failed)
                | (InProgress, New) // released after a fault
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Done | State::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::New => "new",
            State::InProgress => "in_progress",
            State::Done => "done",
            State::Failed => "failed",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for State {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(State::New),
            "in_progress" | "in-progress" => Ok(State::InProgress),
            "done" => Ok(State::Done),
            "failed" => Ok(State::Failed),
            _ => Err(crate::error::Error::Other(format!("unknown state: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// A work item about to be enqueued.
#[derive(Debug, Clone)]
pub struct NewWorkItem {
    pub(crate) reference: String,
    pub(crate) payload: WorkPayload,
}

impl NewWorkItem {
    /// Work item for the entity with the given national identifier.
    /// The reference and the payload both carry the identifier.
    pub fn for_cpr(cpr: impl Into<String>) -> Self {
        let cpr = cpr.into();
        Self {
            reference: cpr.clone(),
            payload: WorkPayload { cpr },
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }
}
