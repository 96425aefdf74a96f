//! HTTP client for the case-management API.
//!
//! Authenticates with an OAuth2 client-credentials token (cached until
//! shortly before expiry) plus an API key header on every request.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{CaseClient, ClientError};
use crate::config::CaseApiConfig;
use crate::config::secrets::{ExposeSecret, SecretString};
use crate::model::entity::{Entity, EntityPage, QueryFilter};

const PAGE_SIZE: u32 = 100;
const MAX_PAGES: u32 = 1_000;
/// Refresh the token this long before the server says it expires.
const TOKEN_LEEWAY: Duration = Duration::from_secs(60);

pub struct HttpCaseClient {
    http: reqwest::Client,
    config: CaseApiConfig,
    token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    value: SecretString,
    refresh_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    filters: &'a [QueryFilter],
    paging: Paging,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Paging {
    page_number: u32,
    page_size: u32,
}

#[derive(Serialize)]
struct NewMarker<'a> {
    title: &'a str,
    start: NaiveDate,
    end: Option<NaiveDate>,
}

impl HttpCaseClient {
    pub fn new(config: CaseApiConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// Current access token, fetching a new one if missing or near expiry.
    async fn access_token(&self) -> Result<String, ClientError> {
        let mut cached = self.token.lock().await;
        if let Some(ref token) = *cached {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.expose_secret().to_string());
            }
        }

        debug!(token_url = %self.config.token_url, "requesting access token");
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose_secret()),
                ("resource", self.config.resource.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Auth(format!("token endpoint returned {status}: {body}")));
        }
        let token: TokenResponse = decode(response).await?;

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(300));
        let value = token.access_token;
        *cached = Some(CachedToken {
            value: SecretString::from(value.clone()),
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_LEEWAY),
        });
        Ok(value)
    }

    /// Attach auth headers, send, and turn non-success statuses into errors.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let token = self.access_token().await?;
        let response = request
            .bearer_auth(token)
            .header("apikey", self.config.api_key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, body))
    }
}

#[async_trait]
impl CaseClient for HttpCaseClient {
    async fn fetch_matching(&self, filters: &[QueryFilter]) -> Result<EntityPage, ClientError> {
        let mut all = EntityPage::default();

        for page_number in 0..MAX_PAGES {
            let request = self.http.post(self.url("/citizens/search")).json(&SearchRequest {
                filters,
                paging: Paging {
                    page_number,
                    page_size: PAGE_SIZE,
                },
            });
            let page: EntityPage = decode(self.send(request).await?).await?;
            debug!(page_number, count = page.data.len(), has_more = page.has_more, "search page");

            let last = !page.has_more || page.data.is_empty();
            all.data.extend(page.data);
            if last {
                return Ok(all);
            }
        }

        Err(ClientError::Decode(format!(
            "search did not terminate after {MAX_PAGES} pages"
        )))
    }

    async fn fetch_by_id(&self, cpr: &str) -> Result<Entity, ClientError> {
        let request = self.http.get(self.url(&format!("/citizens/{cpr}")));
        decode(self.send(request).await?).await
    }

    async fn create_marker(
        &self,
        entity: &Entity,
        marker_name: &str,
        start_date: NaiveDate,
    ) -> Result<(), ClientError> {
        let path = format!("/citizens/{}/tags", entity.remote_key());
        let request = self.http.post(self.url(&path)).json(&NewMarker {
            title: marker_name,
            start: start_date,
            end: None,
        });
        self.send(request).await?;
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
}

/// Map a non-success response to an error class.
///
/// Client errors that describe the record itself are business rejections;
/// everything else is an infrastructure fault.
fn classify(status: StatusCode, body: String) -> ClientError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ClientError::Auth(format!("{status}: {body}"))
        }
        StatusCode::BAD_REQUEST
        | StatusCode::NOT_FOUND
        | StatusCode::CONFLICT
        | StatusCode::UNPROCESSABLE_ENTITY => ClientError::Rejected {
            status: status.as_u16(),
            message: error_message(&body).unwrap_or_else(|| format!("{status}")),
        },
        _ => ClientError::Status {
            status: status.as_u16(),
            body,
        },
    }
}

/// Pull a human-readable message out of an error body.
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return Some(trimmed.to_string());
    };
    ["message", "detail", "title", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
        .or_else(|| Some(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_statuses_are_rejections() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::NOT_FOUND,
            StatusCode::CONFLICT,
            StatusCode::UNPROCESSABLE_ENTITY,
        ] {
            let err = classify(status, r#"{"message":"Borger er lukket"}"#.to_string());
            assert!(err.is_rejection(), "{status} should be a rejection");
            assert_eq!(err.to_string(), "Borger er lukket");
        }
    }

    #[test]
    fn infrastructure_statuses_are_faults() {
        for status in [
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
        ] {
            assert!(!classify(status, String::new()).is_rejection());
        }
    }

    #[test]
    fn error_message_falls_back_to_raw_body() {
        assert_eq!(error_message("plain text").as_deref(), Some("plain text"));
        assert_eq!(
            error_message(r#"{"detail":"missing tag"}"#).as_deref(),
            Some("missing tag")
        );
        assert_eq!(
            error_message(r#"{"code":7}"#).as_deref(),
            Some(r#"{"code":7}"#)
        );
        assert_eq!(error_message("  "), None);
    }

    #[test]
    fn rejection_without_body_uses_status_text() {
        let err = classify(StatusCode::CONFLICT, String::new());
        assert_eq!(err.to_string(), "409 Conflict");
    }
}
