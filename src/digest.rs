//! Batch enrichment of arXiv records into digest rows.
//!
//! Papers are independent of each other; a bounded number are processed
//! at a time so the LLM backend is not flooded. Output keeps input order.

use crate::arxiv::{ArxivRecord, Author, SourceFetcher};
use crate::extraction::SCORE_RANGE;
use crate::llm::ChatBackend;
use crate::paper::Paper;
use crate::repository::RepositoryLookup;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Default number of papers enriched concurrently
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Names shown before the list is cut with ", ..."
const MAX_LISTED: usize = 5;

const UNKNOWN_AFFILIATION: &str = "Unknown Affiliation";

const FULL_STAR: char = '★';
const HALF_STAR: char = '½';

#[derive(Debug, Clone)]
pub struct DigestOptions {
    /// Papers processed at the same time
    pub concurrency: usize,
    /// Query the repository lookup for a code URL
    pub lookup_code: bool,
}

impl Default for DigestOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            lookup_code: true,
        }
    }
}

/// External collaborators of the pipeline
#[derive(Clone, Copy)]
pub struct DigestDeps<'a> {
    pub fetcher: &'a dyn SourceFetcher,
    pub backend: &'a dyn ChatBackend,
    pub lookup: &'a dyn RepositoryLookup,
}

/// One rendered paper of the digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestEntry {
    pub arxiv_id: String,
    pub title: String,
    pub authors: String,
    pub affiliations: String,
    pub score: f64,
    pub stars: String,
    pub topic: Option<String>,
    pub tldr: Option<String>,
    pub summary: String,
    pub pdf_url: Option<String>,
    pub code_url: Option<String>,
}

/// Comma-joined, cut after five entries
pub fn join_truncated<S: AsRef<str>>(items: &[S]) -> String {
    let mut joined = items
        .iter()
        .take(MAX_LISTED)
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(", ");
    if items.len() > MAX_LISTED {
        joined.push_str(", ...");
    }
    joined
}

pub fn format_authors(authors: &[Author]) -> String {
    let names: Vec<&str> = authors.iter().map(|a| a.name.as_str()).collect();
    join_truncated(&names)
}

pub fn format_affiliations(affiliations: Option<&[String]>) -> String {
    match affiliations {
        Some(list) => join_truncated(list),
        None => UNKNOWN_AFFILIATION.to_string(),
    }
}

/// Whole stars plus a half star per started half point
pub fn stars(score: f64) -> String {
    let (low, high) = SCORE_RANGE;
    if score <= low {
        return String::new();
    }
    if score >= high {
        return FULL_STAR.to_string().repeat(high as usize);
    }
    let full = score.trunc();
    let half = (2.0 * (score - full)) as usize;
    let mut out = FULL_STAR.to_string().repeat(full as usize);
    if half > 0 {
        out.push(HALF_STAR);
    }
    out
}

/// Resolve, extract and render a single record.
pub async fn enrich_paper(
    record: ArxivRecord,
    deps: DigestDeps<'_>,
    options: &DigestOptions,
) -> DigestEntry {
    let paper = Paper::resolve(record, deps.fetcher).await;
    debug!(arxiv_id = %paper.arxiv_id, "Generating properties");

    paper.generate_base_properties(deps.backend).await;
    paper.generate_extended_property(deps.backend).await;

    let code_url = if options.lookup_code {
        paper.code_url(deps.lookup).await.map(str::to_string)
    } else {
        None
    };

    let score = paper.score(deps.backend).await;
    let summary = paper.tldr_and_topic(deps.backend).await;

    DigestEntry {
        arxiv_id: paper.arxiv_id.clone(),
        title: paper.title.clone(),
        authors: format_authors(&paper.authors),
        affiliations: format_affiliations(paper.affiliations(deps.backend).await),
        score,
        stars: stars(score),
        topic: summary.topic().map(str::to_string),
        tldr: summary.tldr().map(str::to_string),
        summary: paper.summary.clone(),
        pdf_url: paper.pdf_url.clone(),
        code_url,
    }
}

async fn enrich_bounded(
    record: ArxivRecord,
    deps: DigestDeps<'_>,
    options: &DigestOptions,
    semaphore: &Semaphore,
) -> DigestEntry {
    let _permit = semaphore.acquire().await;
    enrich_paper(record, deps, options).await
}

/// Enrich every record, `options.concurrency` at a time.
///
/// Returns one entry per record, in input order. A paper whose
/// extraction degrades still yields an entry.
pub async fn enrich_papers(
    records: Vec<ArxivRecord>,
    deps: DigestDeps<'_>,
    options: &DigestOptions,
) -> Vec<DigestEntry> {
    let total = records.len();
    info!(count = total, concurrency = options.concurrency, "Starting digest enrichment");

    let semaphore = Semaphore::new(options.concurrency.max(1));
    let futures: Vec<_> = records
        .into_iter()
        .map(|record| enrich_bounded(record, deps, options, &semaphore))
        .collect();

    let entries = join_all(futures).await;

    let with_affiliations = entries
        .iter()
        .filter(|e| e.affiliations != UNKNOWN_AFFILIATION)
        .count();
    info!(
        total = total,
        with_affiliations = with_affiliations,
        "Digest enrichment complete"
    );

    entries
}
