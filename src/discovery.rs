//! Candidate discovery: query the case system, keep only records that need
//! the remediation marker.
//!
//! Two stages, applied in order:
//! 1. the prolongation reason must equal [`EXPECTED_REASON`] exactly;
//! 2. the record must not already carry an active marker with the
//!    remediation title.
//!
//! Exclusions are filtering decisions, not errors. A record that passes
//! both stages but has no national identifier cannot be queued and is
//! skipped with a warning.

use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{debug, info, warn};

use crate::client::{CaseClient, ClientError};
use crate::model::entity::{Entity, QueryFilter};
use crate::remediation::MARKER_TITLE;
use crate::telemetry::metrics;

/// Prolongation reason that marks a record as a candidate.
pub const EXPECTED_REASON: &str = "Der udbetales sygedagpenge ud over begrænsningen i § 24, \
fordi der ikke er modtaget en afgørelse om forlængelse eller ophør af anden årsag";

/// Why a record was or was not selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Candidate,
    ReasonMismatch,
    ActiveMarker,
    MissingCpr,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Candidate => "candidate",
            Verdict::ReasonMismatch => "reason_mismatch",
            Verdict::ActiveMarker => "active_marker",
            Verdict::MissingCpr => "missing_cpr",
        }
    }
}

/// The two-stage candidate predicate.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    pub expected_reason: String,
    pub marker_title: String,
}

impl Default for CandidateFilter {
    fn default() -> Self {
        Self {
            expected_reason: EXPECTED_REASON.to_string(),
            marker_title: MARKER_TITLE.to_string(),
        }
    }
}

impl CandidateFilter {
    pub fn judge(&self, entity: &Entity) -> Verdict {
        if !self.reason_matches(entity) {
            Verdict::ReasonMismatch
        } else if self.has_active_marker(entity) {
            Verdict::ActiveMarker
        } else if !entity.has_cpr() {
            Verdict::MissingCpr
        } else {
            Verdict::Candidate
        }
    }

    /// Exact, case-sensitive match; a missing prolongation never matches.
    pub fn reason_matches(&self, entity: &Entity) -> bool {
        entity
            .prolongation
            .as_ref()
            .and_then(|p| p.reason_name.as_deref())
            .is_some_and(|reason| reason == self.expected_reason)
    }

    /// Stops at the first active marker with the remediation title.
    pub fn has_active_marker(&self, entity: &Entity) -> bool {
        entity
            .markers()
            .iter()
            .any(|m| m.title == self.marker_title && m.is_active())
    }
}

/// Query the case system and return the records that need remediation,
/// in the order the remote system returned them.
///
/// Any remote error fails the whole batch; no partial result is returned.
pub async fn discover(
    client: &dyn CaseClient,
    filter: &CandidateFilter,
    query: &[QueryFilter],
) -> Result<Vec<Entity>, ClientError> {
    let started = Instant::now();
    let page = client.fetch_matching(query).await?;
    let fetched = page.data.len();

    let mut candidates = Vec::new();
    let (mut reason_mismatch, mut active_marker, mut missing_cpr) = (0u64, 0u64, 0u64);
    for entity in page.data {
        let verdict = filter.judge(&entity);
        match verdict {
            Verdict::Candidate => candidates.push(entity),
            Verdict::ReasonMismatch => reason_mismatch += 1,
            Verdict::ActiveMarker => {
                debug!(cpr = %entity.cpr, "already marked, skipping");
                active_marker += 1;
            }
            Verdict::MissingCpr => {
                warn!(id = ?entity.citizen_id, "candidate has no cpr, skipping");
                missing_cpr += 1;
            }
        }
    }

    let entities = metrics::discovery_entities();
    entities.add(candidates.len() as u64, &[KeyValue::new("outcome", Verdict::Candidate.as_str())]);
    entities.add(reason_mismatch, &[KeyValue::new("outcome", Verdict::ReasonMismatch.as_str())]);
    entities.add(active_marker, &[KeyValue::new("outcome", Verdict::ActiveMarker.as_str())]);
    entities.add(missing_cpr, &[KeyValue::new("outcome", Verdict::MissingCpr.as_str())]);
    metrics::operation_duration_ms().record(
        started.elapsed().as_secs_f64() * 1000.0,
        &[KeyValue::new("operation", "discovery")],
    );

    info!(
        fetched,
        candidates = candidates.len(),
        reason_mismatch,
        active_marker,
        missing_cpr,
        "discovery finished"
    );
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::{Marker, ProlongationInfo};

    fn entity(reason: Option<&str>, tags: Option<Vec<Marker>>) -> Entity {
        Entity {
            cpr: "0101011234".to_string(),
            citizen_id: None,
            prolongation: reason.map(|r| ProlongationInfo {
                reason_name: Some(r.to_string()),
            }),
            tags,
        }
    }

    fn marker(title: &str, end: Option<&str>) -> Marker {
        Marker {
            title: title.to_string(),
            start: Some("2024-01-01".to_string()),
            end: end.map(str::to_string),
        }
    }

    #[test]
    fn reason_must_match_exactly() {
        let filter = CandidateFilter::default();
        assert_eq!(filter.judge(&entity(Some(EXPECTED_REASON), None)), Verdict::Candidate);
        assert_eq!(
            filter.judge(&entity(Some(&EXPECTED_REASON.to_uppercase()), None)),
            Verdict::ReasonMismatch
        );
        assert_eq!(
            filter.judge(&entity(Some(&format!("{EXPECTED_REASON} ")), None)),
            Verdict::ReasonMismatch
        );
        assert_eq!(filter.judge(&entity(None, None)), Verdict::ReasonMismatch);
    }

    #[test]
    fn prolongation_without_reason_is_excluded() {
        let mut e = entity(Some(EXPECTED_REASON), None);
        e.prolongation = Some(ProlongationInfo { reason_name: None });
        assert_eq!(CandidateFilter::default().judge(&e), Verdict::ReasonMismatch);
    }

    #[test]
    fn active_marker_excludes_regardless_of_others() {
        let tags = vec![
            marker("Andet", None),
            marker(MARKER_TITLE, Some("2023-05-01")),
            marker(MARKER_TITLE, None),
        ];
        let e = entity(Some(EXPECTED_REASON), Some(tags));
        assert_eq!(CandidateFilter::default().judge(&e), Verdict::ActiveMarker);
    }

    #[test]
    fn ended_or_unrelated_markers_do_not_exclude() {
        let tags = vec![marker(MARKER_TITLE, Some("2023-05-01")), marker("Andet", None)];
        let e = entity(Some(EXPECTED_REASON), Some(tags));
        assert_eq!(CandidateFilter::default().judge(&e), Verdict::Candidate);
    }

    #[test]
    fn candidate_without_cpr_is_skipped() {
        let mut e = entity(Some(EXPECTED_REASON), None);
        e.cpr.clear();
        assert_eq!(CandidateFilter::default().judge(&e), Verdict::MissingCpr);

        // Excluded records never need one.
        e.prolongation = None;
        assert_eq!(CandidateFilter::default().judge(&e), Verdict::ReasonMismatch);
    }

    #[test]
    fn reason_is_checked_before_markers() {
        let e = entity(Some("anden årsag"), Some(vec![marker(MARKER_TITLE, None)]));
        assert_eq!(CandidateFilter::default().judge(&e), Verdict::ReasonMismatch);
    }
}
