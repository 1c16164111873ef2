//! arXiv API client.
//!
//! Fetches paper records from the Atom query API and downloads e-print
//! source archives.
//!
//! API Details:
//! - Query endpoint: GET /api/query (`id_list` or `search_query`)
//! - Source endpoint: GET /e-print/{id}, usually a gzipped tarball
//! - Rate limit: one request every 3 seconds is the documented courtesy

use crate::error::{DigestError, OptionExt, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// arXiv Atom API endpoint
const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

/// e-print (source archive) endpoint
const ARXIV_EPRINT_URL: &str = "https://arxiv.org/e-print";

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Author as listed in the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
}

/// One upstream paper record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArxivRecord {
    /// Entry URL, e.g. `http://arxiv.org/abs/2401.00001v2`
    pub entry_id: String,
    pub title: String,
    pub summary: String,
    pub authors: Vec<Author>,
    pub categories: Vec<String>,
    pub pdf_url: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

impl ArxivRecord {
    /// Identifier after `/abs/`, version suffix included
    pub fn short_id(&self) -> &str {
        self.entry_id
            .rsplit_once("/abs/")
            .map(|(_, id)| id)
            .unwrap_or(&self.entry_id)
    }
}

/// Downloads the source archive of a record into a directory.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Returns the path of the downloaded file inside `dir`.
    async fn download_source(&self, record: &ArxivRecord, dir: &Path) -> Result<PathBuf>;
}

// === Atom feed types ===

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    published: Option<DateTime<Utc>>,
    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,
    /// DOI entries put `<arxiv:doi>` and its link between the others;
    /// collecting them needs quick-xml's `overlapped-lists`.
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@title", default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term")]
    term: String,
}

/// Non-empty and free of list separators and whitespace
fn is_plausible_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(',') && !id.chars().any(char::is_whitespace)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an Atom response into records. Error entries are dropped.
pub fn parse_feed(xml: &str) -> Result<Vec<ArxivRecord>> {
    let feed: Feed = quick_xml::de::from_str(xml)
        .map_err(|e| DigestError::Parse(format!("Failed to parse arXiv feed: {}", e)))?;

    Ok(feed
        .entries
        .into_iter()
        .filter(|entry| !entry.id.contains("/api/errors"))
        .map(|entry| ArxivRecord {
            entry_id: entry.id.trim().to_string(),
            title: collapse_whitespace(&entry.title),
            summary: collapse_whitespace(&entry.summary),
            authors: entry
                .authors
                .into_iter()
                .map(|a| Author {
                    name: a.name.trim().to_string(),
                })
                .collect(),
            categories: entry.categories.into_iter().map(|c| c.term).collect(),
            pdf_url: entry
                .links
                .into_iter()
                .find(|l| l.title.as_deref() == Some("pdf"))
                .map(|l| l.href),
            published: entry.published,
        })
        .collect())
}

/// arXiv API client
pub struct ArxivClient {
    client: Client,
    api_url: String,
    eprint_url: String,
}

impl ArxivClient {
    pub fn new() -> Result<Self> {
        Self::with_endpoints(ARXIV_API_URL, ARXIV_EPRINT_URL)
    }

    /// Client against custom endpoints (mirrors, tests)
    pub fn with_endpoints(api_url: impl Into<String>, eprint_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("rustarxiv/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| DigestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            eprint_url: eprint_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Fetch records by identifier, in the order the API returns them
    pub async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<ArxivRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(bad) = ids.iter().find(|id| !is_plausible_id(id)) {
            return Err(DigestError::Validation(format!("invalid arXiv id: {:?}", bad)));
        }
        let id_list = ids.join(",");
        let max_results = ids.len().to_string();
        self.query(&[("id_list", id_list.as_str()), ("max_results", max_results.as_str())])
            .await
    }

    /// Fetch a single record
    pub async fn fetch_one(&self, id: &str) -> Result<ArxivRecord> {
        self.fetch_by_ids(&[id.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_parse("arXiv returned no entry")
    }

    /// Newest records matching a search expression such as `cat:cs.CL`
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<ArxivRecord>> {
        let max_results = max_results.to_string();
        self.query(&[
            ("search_query", query),
            ("max_results", max_results.as_str()),
            ("sortBy", "submittedDate"),
            ("sortOrder", "descending"),
        ])
        .await
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<Vec<ArxivRecord>> {
        debug!(url = %self.api_url, params = ?params, "Querying arXiv");

        let response = self.client.get(&self.api_url).query(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DigestError::Api {
                code: status.as_u16() as i32,
                message: format!("arXiv API error: {} - {}", status, error_text),
            });
        }

        let records = parse_feed(&response.text().await?)?;
        info!(count = records.len(), "Fetched arXiv records");
        Ok(records)
    }
}

#[async_trait]
impl SourceFetcher for ArxivClient {
    async fn download_source(&self, record: &ArxivRecord, dir: &Path) -> Result<PathBuf> {
        let short_id = record.short_id();
        let url = format!("{}/{}", self.eprint_url, short_id);
        debug!(url = %url, "Downloading source archive");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DigestError::Api {
                code: status.as_u16() as i32,
                message: format!("e-print download failed: {}", status),
            });
        }

        let bytes = response.bytes().await?;
        let path = dir.join(format!("{}.tar.gz", short_id.replace('/', "_")));
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}
