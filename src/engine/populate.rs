//! Population mode: discover candidates and load them into the queue.

use std::sync::Arc;

use tracing::{error, info};

use super::queue::WorkQueue;
use crate::client::CaseClient;
use crate::db::work::RepopulateCounts;
use crate::discovery::{CandidateFilter, discover};
use crate::error::Result;
use crate::model::entity::QueryFilter;
use crate::model::work::NewWorkItem;

/// How a population run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopulationOutcome {
    /// Discovery succeeded and the batch was loaded.
    Loaded {
        candidates: usize,
        counts: RepopulateCounts,
    },
    /// The candidate query failed; the queue was left untouched.
    DiscoveryFailed { error: String },
}

pub struct Populator {
    queue: WorkQueue,
    client: Arc<dyn CaseClient>,
    filter: CandidateFilter,
    query: Vec<QueryFilter>,
}

impl Populator {
    pub fn new(queue: WorkQueue, client: Arc<dyn CaseClient>, query: Vec<QueryFilter>) -> Self {
        Self {
            queue,
            client,
            filter: CandidateFilter::default(),
            query,
        }
    }

    pub fn with_filter(mut self, filter: CandidateFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Discover and enqueue.
    ///
    /// A remote failure during discovery is logged and reported as
    /// `DiscoveryFailed`; nothing is cleared or enqueued. Local storage
    /// errors propagate.
    pub async fn run(&self, clear_new: bool) -> Result<PopulationOutcome> {
        info!(filters = self.query.len(), clear_new, "populating work queue");

        let candidates = match discover(self.client.as_ref(), &self.filter, &self.query).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "failed to fetch candidates, nothing enqueued");
                return Ok(PopulationOutcome::DiscoveryFailed {
                    error: e.to_string(),
                });
            }
        };

        let items: Vec<NewWorkItem> = candidates
            .iter()
            .map(|entity| NewWorkItem::for_cpr(&entity.cpr))
            .collect();
        let counts = self.queue.load(&items, clear_new).await?;

        info!(
            candidates = items.len(),
            cleared = counts.cleared,
            created = counts.created,
            duplicates = counts.duplicates,
            "work queue populated"
        );
        Ok(PopulationOutcome::Loaded {
            candidates: items.len(),
            counts,
        })
    }
}
