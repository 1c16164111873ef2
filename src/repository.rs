//! Code repository lookup via the paperswithcode API.
//!
//! API Details:
//! - Paper search: GET /papers/?arxiv_id={id}
//! - Repositories: GET /papers/{paper_id}/repositories/
//! - No authentication
//!
//! A missing match is not an error; every failure degrades to `None`.

use crate::error::{DigestError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// paperswithcode API base URL
const PAPERSWITHCODE_API_URL: &str = "https://paperswithcode.com/api/v1";

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Finds the public code repository of a paper.
#[async_trait]
pub trait RepositoryLookup: Send + Sync {
    /// URL of the first associated repository, if any.
    async fn code_url(&self, arxiv_id: &str) -> Option<String>;
}

/// Paginated list response
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    count: u64,
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

impl<T> Page<T> {
    fn first(self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        self.results.into_iter().next()
    }
}

#[derive(Debug, Deserialize)]
struct PaperHit {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryHit {
    url: String,
}

/// paperswithcode API client
pub struct PapersWithCodeClient {
    client: Client,
    base_url: String,
}

impl PapersWithCodeClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(PAPERSWITHCODE_API_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| DigestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_page<T: DeserializeOwned>(&self, url: Url) -> Result<Page<T>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DigestError::Api {
                code: status.as_u16() as i32,
                message: format!("paperswithcode API error: {}", status),
            });
        }
        Ok(response.json().await?)
    }

    /// Lookup with errors surfaced
    pub async fn lookup(&self, arxiv_id: &str) -> Result<Option<String>> {
        let url = Url::parse_with_params(
            &format!("{}/papers/", self.base_url),
            &[("arxiv_id", arxiv_id)],
        )
        .map_err(|e| DigestError::Config(format!("Invalid paperswithcode URL: {}", e)))?;
        let Some(paper) = self.get_page::<PaperHit>(url).await?.first() else {
            return Ok(None);
        };

        let url = Url::parse(&format!("{}/papers/{}/repositories/", self.base_url, paper.id))
            .map_err(|e| DigestError::Parse(format!("Invalid paper id {:?}: {}", paper.id, e)))?;
        Ok(self
            .get_page::<RepositoryHit>(url)
            .await?
            .first()
            .map(|repo| repo.url))
    }
}

#[async_trait]
impl RepositoryLookup for PapersWithCodeClient {
    async fn code_url(&self, arxiv_id: &str) -> Option<String> {
        match self.lookup(arxiv_id).await {
            Ok(url) => url,
            Err(e) => {
                debug!(arxiv_id, error = %e, "Error when searching code repository");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query},
        http::StatusCode,
        routing::get,
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn papers(Query(params): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
        match params.get("arxiv_id").map(String::as_str) {
            Some("2401.00001") => (
                StatusCode::OK,
                Json(json!({"count": 1, "results": [{"id": "scaling-laws"}]})),
            ),
            Some("2401.00002") => (
                StatusCode::OK,
                Json(json!({"count": 1, "results": [{"id": "no-code"}]})),
            ),
            Some("2401.00003") => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))),
            _ => (StatusCode::OK, Json(json!({"count": 0, "results": []}))),
        }
    }

    async fn repositories(Path(id): Path<String>) -> Json<Value> {
        if id == "scaling-laws" {
            Json(json!({
                "count": 2,
                "results": [
                    {"url": "https://github.com/example/scaling"},
                    {"url": "https://github.com/fork/scaling"}
                ]
            }))
        } else {
            Json(json!({"count": 0, "results": []}))
        }
    }

    async fn spawn_api() -> String {
        let app = Router::new()
            .route("/papers/", get(papers))
            .route("/papers/{id}/repositories/", get(repositories));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_page_first() {
        let page: Page<RepositoryHit> =
            serde_json::from_str(r#"{"count": 1, "results": [{"url": "u"}]}"#).unwrap();
        assert_eq!(page.first().map(|r| r.url), Some("u".to_string()));

        let empty: Page<RepositoryHit> = serde_json::from_str(r#"{"count": 0}"#).unwrap();
        assert!(empty.first().is_none());
    }

    #[tokio::test]
    async fn test_code_url() {
        let client = PapersWithCodeClient::with_base_url(spawn_api().await).unwrap();

        assert_eq!(
            client.code_url("2401.00001").await.as_deref(),
            Some("https://github.com/example/scaling")
        );
        assert_eq!(client.code_url("2401.00002").await, None);
        assert_eq!(client.code_url("9999.99999").await, None);
    }

    #[tokio::test]
    async fn test_id_is_escaped_in_query() {
        let client = PapersWithCodeClient::with_base_url(spawn_api().await).unwrap();

        // Unescaped, the server would read arxiv_id=2401.00001 and find a match
        assert_eq!(client.lookup("2401.00001&page=2").await.unwrap(), None);
        assert_eq!(client.lookup("2401.00001 ").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_http_failure_degrades_to_none() {
        let client = PapersWithCodeClient::with_base_url(spawn_api().await).unwrap();

        assert!(client.lookup("2401.00003").await.is_err());
        assert_eq!(client.code_url("2401.00003").await, None);
    }
}
