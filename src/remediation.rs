//! Remediation: put the marker on one record.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::client::{CaseClient, ClientError};

/// Title of the marker this worker creates.
pub const MARKER_TITLE: &str = "Teknisk forlængelse - sygedagpenge";

/// Outcome of a failed [`Remediation::apply`].
#[derive(Debug)]
pub enum ApplyError {
    /// The case system rejected this record. Route it to manual review.
    Rejected(String),
    /// Infrastructure failure; the record itself may be fine.
    Fault(ClientError),
}

impl From<ClientError> for ApplyError {
    fn from(err: ClientError) -> Self {
        if err.is_rejection() {
            ApplyError::Rejected(err.to_string())
        } else {
            ApplyError::Fault(err)
        }
    }
}

impl std::fmt::Display for ApplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplyError::Rejected(reason) => write!(f, "rejected: {reason}"),
            ApplyError::Fault(err) => write!(f, "fault: {err}"),
        }
    }
}

/// Applies the remediation marker through an injected case client.
#[derive(Clone)]
pub struct Remediation {
    client: Arc<dyn CaseClient>,
    marker_title: String,
}

impl Remediation {
    pub fn new(client: Arc<dyn CaseClient>) -> Self {
        Self {
            client,
            marker_title: MARKER_TITLE.to_string(),
        }
    }

    /// Re-fetch the record and create the marker starting on `start_date`.
    ///
    /// Does not check for an existing marker; that happens at discovery.
    pub async fn apply(&self, cpr: &str, start_date: NaiveDate) -> Result<(), ApplyError> {
        let entity = self.client.fetch_by_id(cpr).await?;
        self.client
            .create_marker(&entity, &self.marker_title, start_date)
            .await?;
        debug!(cpr, %start_date, marker = %self.marker_title, "marker created");
        Ok(())
    }
}
