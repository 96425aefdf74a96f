//! In-process stand-in for the case-management system.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use case_reconciler::client::{CaseClient, ClientError};
use case_reconciler::discovery::EXPECTED_REASON;
use case_reconciler::model::entity::{Entity, EntityPage, Marker, ProlongationInfo, QueryFilter};
use chrono::NaiveDate;

/// Records are kept in insertion order; searches return all of them.
/// Created markers are written back, so a later search sees them.
#[derive(Default)]
pub struct FakeCaseClient {
    entities: Mutex<Vec<Entity>>,
    search_failure: Mutex<Option<String>>,
    rejections: Mutex<HashMap<String, String>>,
    faults: Mutex<HashSet<String>>,
    created: Mutex<Vec<(String, String, NaiveDate)>>,
    queries: Mutex<Vec<Vec<QueryFilter>>>,
}

impl FakeCaseClient {
    pub fn with_entities(entities: Vec<Entity>) -> Self {
        Self {
            entities: Mutex::new(entities),
            ..Default::default()
        }
    }

    pub fn fail_search(&self, message: &str) {
        *self.search_failure.lock().unwrap() = Some(message.to_string());
    }

    /// `fetch_by_id` for `cpr` answers with a business rejection.
    pub fn reject(&self, cpr: &str, message: &str) {
        self.rejections
            .lock()
            .unwrap()
            .insert(cpr.to_string(), message.to_string());
    }

    /// `create_marker` for `cpr` fails with a 503.
    pub fn fault(&self, cpr: &str) {
        self.faults.lock().unwrap().insert(cpr.to_string());
    }

    pub fn clear_faults(&self) {
        self.faults.lock().unwrap().clear();
    }

    /// (cpr, marker title, start date) for every marker created, in order.
    pub fn created(&self) -> Vec<(String, String, NaiveDate)> {
        self.created.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<Vec<QueryFilter>> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl CaseClient for FakeCaseClient {
    async fn fetch_matching(&self, filters: &[QueryFilter]) -> Result<EntityPage, ClientError> {
        self.queries.lock().unwrap().push(filters.to_vec());
        if let Some(ref message) = *self.search_failure.lock().unwrap() {
            return Err(ClientError::Status {
                status: 503,
                body: message.clone(),
            });
        }
        Ok(EntityPage {
            data: self.entities.lock().unwrap().clone(),
            has_more: false,
        })
    }

    async fn fetch_by_id(&self, cpr: &str) -> Result<Entity, ClientError> {
        if let Some(message) = self.rejections.lock().unwrap().get(cpr) {
            return Err(ClientError::Rejected {
                status: 422,
                message: message.clone(),
            });
        }
        self.entities
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.cpr == cpr)
            .cloned()
            .ok_or_else(|| ClientError::Rejected {
                status: 404,
                message: format!("borger {cpr} findes ikke"),
            })
    }

    async fn create_marker(
        &self,
        entity: &Entity,
        marker_name: &str,
        start_date: NaiveDate,
    ) -> Result<(), ClientError> {
        if self.faults.lock().unwrap().contains(&entity.cpr) {
            return Err(ClientError::Status {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        let mut entities = self.entities.lock().unwrap();
        if let Some(stored) = entities.iter_mut().find(|e| e.cpr == entity.cpr) {
            stored.tags.get_or_insert_with(Vec::new).push(Marker {
                title: marker_name.to_string(),
                start: Some(start_date.to_string()),
                end: None,
            });
        }
        self.created.lock().unwrap().push((
            entity.cpr.clone(),
            marker_name.to_string(),
            start_date,
        ));
        Ok(())
    }
}

pub fn borger(cpr: &str, reason: Option<&str>, tags: Vec<Marker>) -> Entity {
    Entity {
        cpr: cpr.to_string(),
        citizen_id: None,
        prolongation: reason.map(|r| ProlongationInfo {
            reason_name: Some(r.to_string()),
        }),
        tags: Some(tags),
    }
}

/// A record that should be selected.
pub fn candidate(cpr: &str) -> Entity {
    borger(cpr, Some(EXPECTED_REASON), Vec::new())
}

pub fn marker(title: &str, end: Option<&str>) -> Marker {
    Marker {
        title: title.to_string(),
        start: Some("2024-02-01".to_string()),
        end: end.map(str::to_string),
    }
}
