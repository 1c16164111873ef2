//! Paper entity.
//!
//! Source resolution and section extraction happen once, when the paper is
//! constructed. Affiliations, score, TLDR/topic and the code URL are
//! computed on first read and cached for the lifetime of the value.

use crate::archive::{resolve_archive, SourceText};
use crate::arxiv::{ArxivRecord, Author, SourceFetcher};
use crate::extraction::{extract_affiliations, extract_score, extract_summary, Summary};
use crate::latex;
use crate::literal::Literal;
use crate::llm::ChatBackend;
use crate::prompts::tldr::TldrInput;
use crate::repository::RepositoryLookup;
use crate::sections;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use tempfile::TempDir;
use tokio::sync::OnceCell;
use tracing::{debug, info_span, warn, Instrument, Span};

static VERSION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"v\d+$").expect("valid version regex"));

/// Identifier without its trailing `vN`
pub fn strip_version(short_id: &str) -> String {
    VERSION_SUFFIX.replace(short_id, "").into_owned()
}

/// Same URL over https; anything but a leading `http://` is kept as is
pub fn secure_url(raw: &str) -> String {
    match raw.strip_prefix("http://") {
        Some(rest) => format!("https://{}", rest),
        None => raw.to_string(),
    }
}

#[derive(Debug)]
pub struct Paper {
    pub arxiv_id: String,
    pub title: String,
    pub summary: String,
    pub authors: Vec<Author>,
    pub categories: Vec<String>,
    pub pdf_url: Option<String>,
    pub published: Option<DateTime<Utc>>,
    source_text: Option<SourceText>,
    introduction: String,
    conclusion: String,
    affiliations: OnceCell<Option<Vec<String>>>,
    score: OnceCell<f64>,
    tldr_and_topic: OnceCell<Summary>,
    code_url: OnceCell<Option<String>>,
}

impl Paper {
    /// Download the source archive into a scratch directory and build the
    /// paper from it. The directory is removed before this returns.
    pub async fn resolve(record: ArxivRecord, fetcher: &dyn SourceFetcher) -> Self {
        let arxiv_id = strip_version(record.short_id());
        let source_text = fetch_source(&record, fetcher, &arxiv_id).await;
        Self::from_source(record, source_text)
    }

    /// Build from already-resolved sources and extract sections.
    pub fn from_source(record: ArxivRecord, source_text: Option<SourceText>) -> Self {
        let arxiv_id = strip_version(record.short_id());

        let (introduction, conclusion) = match &source_text {
            Some(source) => {
                let content = latex::strip_markup(&source.full_text());
                (
                    sections::introduction(&content),
                    sections::conclusion(&content),
                )
            }
            None => (String::new(), String::new()),
        };

        Self {
            arxiv_id,
            title: record.title,
            summary: record.summary,
            authors: record.authors,
            categories: record.categories,
            pdf_url: record.pdf_url.as_deref().map(secure_url),
            published: record.published,
            source_text,
            introduction,
            conclusion,
            affiliations: OnceCell::new(),
            score: OnceCell::new(),
            tldr_and_topic: OnceCell::new(),
            code_url: OnceCell::new(),
        }
    }

    pub fn source_text(&self) -> Option<&SourceText> {
        self.source_text.as_ref()
    }

    pub fn introduction(&self) -> &str {
        &self.introduction
    }

    pub fn conclusion(&self) -> &str {
        &self.conclusion
    }

    /// Categories rendered as a Python list, e.g. `['cs.CL', 'cs.AI']`
    pub fn category_repr(&self) -> String {
        Literal::List(
            self.categories
                .iter()
                .map(|c| Literal::Str(c.clone()))
                .collect(),
        )
        .to_string()
    }

    /// Span carrying the paper id, so client logs name the paper too
    fn span(&self) -> Span {
        info_span!("paper", arxiv_id = %self.arxiv_id)
    }

    /// Affiliations, `None` without an author block or a usable answer.
    pub async fn affiliations(&self, backend: &dyn ChatBackend) -> Option<&[String]> {
        self.affiliations
            .get_or_init(|| async {
                let source = self.source_text.as_ref()?;
                let content = source.full_text();
                let Some(block) = sections::author_block(&content) else {
                    debug!(
                        arxiv_id = %self.arxiv_id,
                        "Failed to extract affiliations: no author information found"
                    );
                    return None;
                };
                extract_affiliations(backend, block, &self.arxiv_id).await
            }
            .instrument(self.span()))
            .await
            .as_deref()
    }

    /// Score in [0, 5]; computes affiliations first if needed.
    pub async fn score(&self, backend: &dyn ChatBackend) -> f64 {
        *self
            .score
            .get_or_init(|| async {
                let affiliations = self.affiliations(backend).await;
                extract_score(backend, affiliations, &self.arxiv_id).await
            }
            .instrument(self.span()))
            .await
    }

    pub async fn tldr_and_topic(&self, backend: &dyn ChatBackend) -> &Summary {
        self.tldr_and_topic
            .get_or_init(|| async {
                let category = self.category_repr();
                let input = TldrInput {
                    title: &self.title,
                    summary: &self.summary,
                    introduction: &self.introduction,
                    conclusion: &self.conclusion,
                    category: &category,
                };
                extract_summary(backend, &input, &self.arxiv_id).await
            }
            .instrument(self.span()))
            .await
    }

    pub async fn tldr(&self, backend: &dyn ChatBackend) -> Option<&str> {
        self.tldr_and_topic(backend).await.tldr()
    }

    pub async fn topic(&self, backend: &dyn ChatBackend) -> Option<&str> {
        self.tldr_and_topic(backend).await.topic()
    }

    pub async fn code_url(&self, lookup: &dyn RepositoryLookup) -> Option<&str> {
        self.code_url
            .get_or_init(|| lookup.code_url(&self.arxiv_id).instrument(self.span()))
            .await
            .as_deref()
    }

    /// Affiliations and score
    pub async fn generate_base_properties(&self, backend: &dyn ChatBackend) {
        self.score(backend).await;
    }

    /// TLDR and topic
    pub async fn generate_extended_property(&self, backend: &dyn ChatBackend) {
        self.tldr_and_topic(backend).await;
    }

    /// Forget every backend-derived field so the next read recomputes it.
    pub fn reset_derived(&mut self) {
        self.affiliations.take();
        self.score.take();
        self.tldr_and_topic.take();
        self.code_url.take();
    }
}

async fn fetch_source(
    record: &ArxivRecord,
    fetcher: &dyn SourceFetcher,
    arxiv_id: &str,
) -> Option<SourceText> {
    let dir = match TempDir::new() {
        Ok(dir) => dir,
        Err(e) => {
            warn!(arxiv_id, error = %e, "Failed to create scratch directory");
            return None;
        }
    };

    let path = match fetcher.download_source(record, dir.path()).await {
        Ok(path) => path,
        Err(e) => {
            warn!(arxiv_id, error = %e, "Failed to download source archive");
            return None;
        }
    };

    let id = arxiv_id.to_string();
    match tokio::task::spawn_blocking(move || resolve_archive(&path, &id)).await {
        Ok(source) => source,
        Err(e) => {
            warn!(arxiv_id, error = %e, "Source resolution task failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::write_tarball;
    use crate::error::{DigestError, Result};
    use crate::extraction::DEFAULT_SCORE;
    use crate::testing::ScriptedBackend;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const MAIN_TEX: &str = r"\documentclass{article}
\begin{document}
\title{Scaling Laws}
\author{Ada Lovelace \\ MIT}
\maketitle
\section{Introduction}
We study X~\cite{foo}.
\begin{figure}a plot\end{figure}
\section{Conclusion}
It works.
\end{document}
";

    fn record(entry_id: &str) -> ArxivRecord {
        ArxivRecord {
            entry_id: entry_id.to_string(),
            title: "Scaling Laws".to_string(),
            summary: "We study scaling.".to_string(),
            authors: vec![Author {
                name: "Ada Lovelace".to_string(),
            }],
            categories: vec!["cs.CL".to_string(), "cs.AI".to_string()],
            pdf_url: Some("http://arxiv.org/pdf/2401.00001v2".to_string()),
            published: None,
        }
    }

    /// Serves a prepared tarball, or fails when there is none.
    struct FakeFetcher {
        tarball: Option<PathBuf>,
        last_dir: Mutex<Option<PathBuf>>,
    }

    impl FakeFetcher {
        fn new(tarball: Option<PathBuf>) -> Self {
            Self {
                tarball,
                last_dir: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl SourceFetcher for FakeFetcher {
        async fn download_source(&self, record: &ArxivRecord, dir: &Path) -> Result<PathBuf> {
            *self.last_dir.lock().unwrap() = Some(dir.to_path_buf());
            let source = self.tarball.as_ref().ok_or(DigestError::Api {
                code: 404,
                message: "missing".to_string(),
            })?;
            let target = dir.join(format!("{}.tar.gz", record.short_id()));
            std::fs::copy(source, &target)?;
            Ok(target)
        }
    }

    struct CountingLookup {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RepositoryLookup for CountingLookup {
        async fn code_url(&self, _arxiv_id: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some("https://github.com/example/scaling".to_string())
        }
    }

    async fn resolved_paper() -> Paper {
        let scratch = TempDir::new().unwrap();
        let tarball = write_tarball(scratch.path(), &[("main.tex", MAIN_TEX)]);
        let fetcher = FakeFetcher::new(Some(tarball));
        Paper::resolve(record("http://arxiv.org/abs/2401.00001v2"), &fetcher).await
    }

    #[test]
    fn test_identity_normalization() {
        assert_eq!(strip_version("2401.00001v12"), "2401.00001");
        assert_eq!(strip_version("2401.00001"), "2401.00001");
        assert_eq!(strip_version("math.AG/0601001v1"), "math.AG/0601001");

        let paper = Paper::from_source(record("http://arxiv.org/abs/2401.00001v2"), None);
        assert_eq!(paper.arxiv_id, "2401.00001");
        assert_eq!(
            paper.pdf_url.as_deref(),
            Some("https://arxiv.org/pdf/2401.00001v2")
        );
        assert_eq!(paper.category_repr(), "['cs.CL', 'cs.AI']");
    }

    #[test]
    fn test_secure_url_only_rewrites_scheme() {
        assert_eq!(secure_url("http://arxiv.org"), "https://arxiv.org");
        assert_eq!(
            secure_url("http://arxiv.org/pdf/2401.00001v2"),
            "https://arxiv.org/pdf/2401.00001v2"
        );
        assert_eq!(secure_url("https://arxiv.org/pdf/x"), "https://arxiv.org/pdf/x");
        assert_eq!(secure_url("ftp://mirror/http://x"), "ftp://mirror/http://x");
        assert_eq!(secure_url("not a url"), "not a url");
    }

    #[tokio::test]
    async fn test_resolve_extracts_sections_and_cleans_up() {
        let scratch = TempDir::new().unwrap();
        let tarball = write_tarball(scratch.path(), &[("main.tex", MAIN_TEX)]);
        let fetcher = FakeFetcher::new(Some(tarball));
        let paper = Paper::resolve(record("http://arxiv.org/abs/2401.00001v2"), &fetcher).await;

        let source = paper.source_text().unwrap();
        assert_eq!(source.main_document.as_deref(), Some("main.tex"));

        assert!(paper.introduction().starts_with("\\section{Introduction}"));
        assert!(paper.introduction().contains("We study X."));
        assert!(!paper.introduction().contains("cite"));
        assert!(!paper.introduction().contains("a plot"));
        assert!(paper.conclusion().contains("It works."));
        assert!(!paper.conclusion().contains("\\end{document}"));

        let dir = fetcher.last_dir.lock().unwrap().clone().unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_download_failure_leaves_empty_sections() {
        let fetcher = FakeFetcher::new(None);
        let paper = Paper::resolve(record("http://arxiv.org/abs/2401.00001v2"), &fetcher).await;
        assert!(paper.source_text().is_none());
        assert_eq!(paper.introduction(), "");
        assert_eq!(paper.conclusion(), "");
        let dir = fetcher.last_dir.lock().unwrap().clone().unwrap();
        assert!(!dir.exists());

        let backend = ScriptedBackend::answering(&["['MIT']", "['MIT']", "5"]);
        assert_eq!(paper.affiliations(&backend).await, None);
        assert_eq!(paper.score(&backend).await, DEFAULT_SCORE);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_archive_is_cleaned_up() {
        let scratch = TempDir::new().unwrap();
        let junk = scratch.path().join("junk.tar.gz");
        std::fs::write(&junk, b"plain text, not an archive").unwrap();
        let fetcher = FakeFetcher::new(Some(junk));

        let paper = Paper::resolve(record("http://arxiv.org/abs/2401.00001v2"), &fetcher).await;
        assert!(paper.source_text().is_none());
        assert_eq!(paper.introduction(), "");

        let dir = fetcher.last_dir.lock().unwrap().clone().unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_no_author_block_makes_no_call() {
        let source = SourceText {
            files: vec![],
            main_document: Some("main.tex".to_string()),
            assembled: Some("\\title{T}\\maketitle\\section{Introduction} x".to_string()),
        };
        let paper = Paper::from_source(record("http://arxiv.org/abs/2401.00001v2"), Some(source));
        let backend = ScriptedBackend::answering(&["['MIT']"]);

        assert_eq!(paper.affiliations(&backend).await, None);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_base_properties_are_cached() {
        let paper = resolved_paper().await;
        let backend = ScriptedBackend::answering(&["MIT, MIT", "['MIT', 'MIT']", "4.5"]);

        paper.generate_base_properties(&backend).await;
        assert_eq!(backend.call_count(), 3);
        assert!(backend.calls()[0][1].content.contains("Ada Lovelace"));

        assert_eq!(paper.affiliations(&backend).await, Some(&["MIT".to_string()][..]));
        assert_eq!(paper.score(&backend).await, 4.5);
        paper.generate_base_properties(&backend).await;
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_extended_property() {
        let paper = resolved_paper().await;
        let backend = ScriptedBackend::answering(&[
            "draft",
            "{'tldr': '研究了缩放定律', 'topic': 'Scaling Laws'}",
        ]);

        paper.generate_extended_property(&backend).await;
        assert_eq!(paper.tldr(&backend).await, Some("研究了缩放定律"));
        assert_eq!(paper.topic(&backend).await, Some("Scaling Laws"));
        assert_eq!(backend.call_count(), 2);

        let prompt = &backend.calls()[0][1].content;
        assert!(prompt.contains("Scaling Laws"));
        assert!(prompt.contains("We study X."));
        assert!(prompt.contains("['cs.CL', 'cs.AI']"));
    }

    #[tokio::test]
    async fn test_reset_derived_recomputes() {
        let mut paper = resolved_paper().await;
        let backend = ScriptedBackend::new([Some("draft"), None, Some("draft"), Some("{'tldr': 'ok'}")]);

        assert_eq!(*paper.tldr_and_topic(&backend).await, Summary::Absent);
        paper.reset_derived();
        assert_eq!(paper.tldr(&backend).await, Some("ok"));
        assert_eq!(paper.topic(&backend).await, None);
        assert_eq!(backend.call_count(), 4);
    }

    #[tokio::test]
    async fn test_code_url_is_cached() {
        let paper = Paper::from_source(record("http://arxiv.org/abs/2401.00001v2"), None);
        let lookup = CountingLookup {
            calls: AtomicUsize::new(0),
        };

        assert_eq!(
            paper.code_url(&lookup).await,
            Some("https://github.com/example/scaling")
        );
        assert_eq!(
            paper.code_url(&lookup).await,
            Some("https://github.com/example/scaling")
        );
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }
}
