//! The case-management system, as seen by the engine.
//!
//! The engine only talks to [`CaseClient`]; [`http::HttpCaseClient`] is the
//! production implementation. Components receive the client as an injected
//! `Arc<dyn CaseClient>`.

pub mod http;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::model::entity::{Entity, EntityPage, QueryFilter};

pub use http::HttpCaseClient;

/// Errors reported by a [`CaseClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The remote system refused the request for a business reason.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// Non-success response that is not a business rejection (5xx, throttling, ...).
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Authentication or authorization failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Connection, timeout or protocol failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body did not have the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ClientError {
    /// True for per-record business errors that should route the record to
    /// manual review rather than stop the run.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ClientError::Rejected { .. })
    }
}

/// Operations the engine needs from the case-management system.
#[async_trait]
pub trait CaseClient: Send + Sync {
    /// Run a query; `filters` are forwarded verbatim.
    async fn fetch_matching(&self, filters: &[QueryFilter]) -> Result<EntityPage, ClientError>;

    /// Fetch one record fresh by its national identifier.
    async fn fetch_by_id(&self, cpr: &str) -> Result<Entity, ClientError>;

    /// Create a marker on the record starting on `start_date`.
    async fn create_marker(
        &self,
        entity: &Entity,
        marker_name: &str,
        start_date: NaiveDate,
    ) -> Result<(), ClientError>;
}
