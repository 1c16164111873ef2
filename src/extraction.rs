//! Structured extraction on top of a free-text backend.
//!
//! Every step follows the same protocol: generate an answer, optionally
//! ask the backend to repair its own answer into a valid literal, then
//! decode the repaired text locally with [`crate::literal`]. The three
//! field extractors below differ only in prompts, decoder and in how
//! they treat a missing or undecodable answer.

use crate::error::{DigestError, OptionExt, Result};
use crate::literal::{parse_literal, Literal};
use crate::llm::{ChatBackend, ChatMessage};
use crate::prompts::{affiliations, score, tldr};
use crate::tokens::{truncate_to_tokens, PROMPT_TOKEN_BUDGET};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Score used when affiliations are missing or the backend gives none
pub const DEFAULT_SCORE: f64 = 1.0;

/// Inclusive score bounds
pub const SCORE_RANGE: (f64, f64) = (0.0, 5.0);

static FIRST_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*?\]").expect("valid list regex"));

/// Raw outcome of one generate/repair/decode run
#[derive(Debug)]
pub enum Extraction<T> {
    /// Decoded value
    Resolved(T),
    /// The backend answered but the answer did not decode
    Unparsed { raw: String, error: DigestError },
    /// The backend produced no text
    NoAnswer,
}

/// Generate → repair → decode, written once for every field.
pub struct StructuredExtractor<'a> {
    backend: &'a dyn ChatBackend,
    system_prompt: &'a str,
    repair_prompt: Option<&'a str>,
    token_budget: usize,
}

impl<'a> StructuredExtractor<'a> {
    pub fn new(backend: &'a dyn ChatBackend, system_prompt: &'a str) -> Self {
        Self {
            backend,
            system_prompt,
            repair_prompt: None,
            token_budget: PROMPT_TOKEN_BUDGET,
        }
    }

    /// Add a second call that coerces the first answer into literal syntax
    pub fn with_repair(mut self, repair_prompt: &'a str) -> Self {
        self.repair_prompt = Some(repair_prompt);
        self
    }

    pub fn with_token_budget(mut self, token_budget: usize) -> Self {
        self.token_budget = token_budget;
        self
    }

    pub async fn extract<T, F>(&self, prompt: &str, decode: F) -> Extraction<T>
    where
        F: FnOnce(&str) -> Result<T>,
    {
        let prompt = truncate_to_tokens(prompt, self.token_budget);
        let messages = [
            ChatMessage::system(self.system_prompt),
            ChatMessage::user(prompt),
        ];
        let Some(mut answer) = self.backend.generate(&messages).await else {
            return Extraction::NoAnswer;
        };

        if let Some(repair_prompt) = self.repair_prompt {
            let messages = [ChatMessage::system(repair_prompt), ChatMessage::user(answer)];
            answer = match self.backend.generate(&messages).await {
                Some(repaired) => repaired,
                None => return Extraction::NoAnswer,
            };
        }

        match decode(&answer) {
            Ok(value) => Extraction::Resolved(value),
            Err(error) => Extraction::Unparsed { raw: answer, error },
        }
    }
}

/// First bracketed list in `text`, stringified element-wise, duplicates
/// dropped (first occurrence kept).
pub fn decode_affiliations(text: &str) -> Result<Vec<String>> {
    let list = FIRST_LIST
        .find(text)
        .ok_or_parse("no list literal in response")?;
    let items = parse_literal(list.as_str())?
        .into_items()
        .ok_or_parse("affiliations are not a list")?;

    let mut seen = std::collections::HashSet::new();
    Ok(items
        .into_iter()
        .map(|item| item.to_string())
        .filter(|item| seen.insert(item.clone()))
        .collect())
}

/// Numeric literal, clamped into [`SCORE_RANGE`]
pub fn decode_score(text: &str) -> Result<f64> {
    let value = parse_literal(text)?
        .as_f64()
        .ok_or_parse("score is not a number")?;
    Ok(value.clamp(SCORE_RANGE.0, SCORE_RANGE.1))
}

/// Dict literal with `tldr` and `topic` keys
pub fn decode_summary(text: &str) -> Result<(Option<String>, Option<String>)> {
    let literal = parse_literal(text)?;
    if !literal.is_dict() {
        return Err(DigestError::Parse("summary is not a dict".to_string()));
    }
    let field = |key: &str| match literal.get(key) {
        None | Some(Literal::None) => None,
        Some(value) => Some(value.to_string()),
    };
    Ok((field("tldr"), field("topic")))
}

/// TLDR/topic of a paper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Summary {
    Resolved {
        tldr: Option<String>,
        topic: Option<String>,
    },
    /// Answer kept verbatim as the TLDR because it did not decode
    Degraded { raw: String },
    Absent,
}

impl Summary {
    pub fn tldr(&self) -> Option<&str> {
        match self {
            Summary::Resolved { tldr, .. } => tldr.as_deref(),
            Summary::Degraded { raw } => Some(raw),
            Summary::Absent => None,
        }
    }

    pub fn topic(&self) -> Option<&str> {
        match self {
            Summary::Resolved { topic, .. } => topic.as_deref(),
            _ => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Summary::Degraded { .. })
    }
}

/// Affiliations from the `\author ... \maketitle` block.
///
/// `None` when the backend gives no answer or the repaired answer is not
/// a list literal.
pub async fn extract_affiliations(
    backend: &dyn ChatBackend,
    author_block: &str,
    arxiv_id: &str,
) -> Option<Vec<String>> {
    let prompt = affiliations::build_user_prompt(author_block);
    let extractor = StructuredExtractor::new(backend, affiliations::SYSTEM_PROMPT)
        .with_repair(affiliations::REPAIR_PROMPT);

    match extractor.extract(&prompt, decode_affiliations).await {
        Extraction::Resolved(list) => Some(list),
        Extraction::Unparsed { error, .. } => {
            debug!(arxiv_id, error = %error, "Failed to extract affiliations");
            None
        }
        Extraction::NoAnswer => {
            debug!(arxiv_id, "Failed to extract affiliations: no answer from backend");
            None
        }
    }
}

/// Score for a set of affiliations. Single call, no repair pass.
///
/// Missing or empty affiliations score [`DEFAULT_SCORE`] without a call;
/// the score prompt asks for that same value on an empty list.
pub async fn extract_score(
    backend: &dyn ChatBackend,
    affiliations: Option<&[String]>,
    arxiv_id: &str,
) -> f64 {
    let affiliations = match affiliations {
        Some(list) if !list.is_empty() => list,
        _ => return DEFAULT_SCORE,
    };

    let rendered = Literal::List(
        affiliations
            .iter()
            .map(|a| Literal::Str(a.clone()))
            .collect(),
    )
    .to_string();
    let prompt = score::build_user_prompt(&rendered);
    let extractor = StructuredExtractor::new(backend, score::SYSTEM_PROMPT);

    match extractor.extract(&prompt, decode_score).await {
        Extraction::Resolved(value) => value,
        Extraction::Unparsed { raw, error } => {
            warn!(arxiv_id, raw = %raw, error = %error, "Could not parse score, using default");
            DEFAULT_SCORE
        }
        Extraction::NoAnswer => {
            debug!(arxiv_id, "No score from backend, using default");
            DEFAULT_SCORE
        }
    }
}

/// TLDR and topic for a paper.
pub async fn extract_summary(
    backend: &dyn ChatBackend,
    input: &tldr::TldrInput<'_>,
    arxiv_id: &str,
) -> Summary {
    let prompt = tldr::build_user_prompt(input);
    let extractor =
        StructuredExtractor::new(backend, tldr::SYSTEM_PROMPT).with_repair(tldr::REPAIR_PROMPT);

    match extractor.extract(&prompt, decode_summary).await {
        Extraction::Resolved((tldr, topic)) => Summary::Resolved { tldr, topic },
        Extraction::Unparsed { raw, error } => {
            warn!(
                arxiv_id,
                error = %error,
                "Could not parse summary to dict, display it in tldr directly"
            );
            Summary::Degraded { raw }
        }
        Extraction::NoAnswer => {
            debug!(arxiv_id, "No summary from backend");
            Summary::Absent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;

    const ARXIV_ID: &str = "2401.00001";

    fn tldr_input() -> tldr::TldrInput<'static> {
        tldr::TldrInput {
            title: "A Paper",
            summary: "An abstract.",
            introduction: "",
            conclusion: "",
            category: "['cs.AI']",
        }
    }

    #[test]
    fn test_decode_affiliations_deduplicates() {
        let list = decode_affiliations("Fixed: ['A', 'B', 'A']").unwrap();
        assert_eq!(list, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_decode_affiliations_stringifies() {
        let list = decode_affiliations("[1, 'MIT', None]").unwrap();
        assert_eq!(list, vec!["1", "MIT", "None"]);
        assert_eq!(decode_affiliations("[]").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_decode_affiliations_failures() {
        assert!(decode_affiliations("no list here").is_err());
        assert!(decode_affiliations("[Tsinghua University]").is_err());
    }

    #[test]
    fn test_decode_score() {
        assert_eq!(decode_score("3.5").unwrap(), 3.5);
        assert_eq!(decode_score("4").unwrap(), 4.0);
        assert_eq!(decode_score("7").unwrap(), 5.0);
        assert_eq!(decode_score("-1").unwrap(), 0.0);
        assert!(decode_score("Score: 4").is_err());
        assert!(decode_score("'4'").is_err());
    }

    #[test]
    fn test_decode_summary() {
        let (tldr, topic) = decode_summary("{'tldr': 'x', 'topic': 'y'}").unwrap();
        assert_eq!(tldr.as_deref(), Some("x"));
        assert_eq!(topic.as_deref(), Some("y"));

        let (tldr, topic) = decode_summary("{'tldr': 'only'}").unwrap();
        assert_eq!(tldr.as_deref(), Some("only"));
        assert_eq!(topic, None);

        assert!(decode_summary("['x', 'y']").is_err());
        assert!(decode_summary("tldr: x").is_err());
    }

    #[tokio::test]
    async fn test_affiliations_use_generate_then_repair() {
        let backend = ScriptedBackend::answering(&[
            "Affiliations: A, B, A",
            "['A', 'B', 'A']",
        ]);
        let list = extract_affiliations(&backend, "\\author{x}\\maketitle", ARXIV_ID).await;
        assert_eq!(list, Some(vec!["A".to_string(), "B".to_string()]));

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0][0].content, affiliations::SYSTEM_PROMPT);
        assert!(calls[0][1].content.contains("\\author{x}\\maketitle"));
        assert_eq!(calls[1][0].content, affiliations::REPAIR_PROMPT);
        assert_eq!(calls[1][1].content, "Affiliations: A, B, A");
    }

    #[tokio::test]
    async fn test_affiliations_absent_on_unparsable_repair() {
        let backend = ScriptedBackend::answering(&["junk", "still junk"]);
        assert_eq!(extract_affiliations(&backend, "\\author{x}\\maketitle", ARXIV_ID).await, None);
    }

    #[tokio::test]
    async fn test_affiliations_skip_repair_without_answer() {
        let backend = ScriptedBackend::new([None::<&str>]);
        assert_eq!(extract_affiliations(&backend, "\\author{x}\\maketitle", ARXIV_ID).await, None);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_score_without_affiliations_makes_no_call() {
        let backend = ScriptedBackend::answering(&["5"]);
        assert_eq!(extract_score(&backend, None, ARXIV_ID).await, DEFAULT_SCORE);
        assert_eq!(extract_score(&backend, Some(&[][..]), ARXIV_ID).await, DEFAULT_SCORE);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_score_single_call() {
        let backend = ScriptedBackend::answering(&["4.5"]);
        let affiliations = vec!["MIT".to_string(), "Google".to_string()];
        assert_eq!(extract_score(&backend, Some(affiliations.as_slice()), ARXIV_ID).await, 4.5);

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].content, score::SYSTEM_PROMPT);
        assert!(calls[0][1].content.ends_with("['MIT', 'Google']"));
    }

    #[tokio::test]
    async fn test_score_defaults_when_backend_fails() {
        let affiliations = vec!["MIT".to_string()];
        let silent = ScriptedBackend::new([None::<&str>]);
        assert_eq!(extract_score(&silent, Some(affiliations.as_slice()), ARXIV_ID).await, DEFAULT_SCORE);

        let chatty = ScriptedBackend::answering(&["I would say about four"]);
        assert_eq!(extract_score(&chatty, Some(affiliations.as_slice()), ARXIV_ID).await, DEFAULT_SCORE);
    }

    /// Collects formatted log lines from the current thread.
    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn test_score_without_answer_is_logged_with_id() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let affiliations = vec!["MIT".to_string()];
        let silent = ScriptedBackend::new([None::<&str>]);
        let score = extract_score(&silent, Some(affiliations.as_slice()), ARXIV_ID).await;

        assert_eq!(score, DEFAULT_SCORE);
        let output = logs.contents();
        assert!(output.contains("No score from backend"));
        assert!(output.contains(ARXIV_ID));
    }

    #[tokio::test]
    async fn test_summary_resolved() {
        let backend = ScriptedBackend::answering(&["draft", "{'tldr': 'x', 'topic': 'y'}"]);
        let summary = extract_summary(&backend, &tldr_input(), ARXIV_ID).await;
        assert_eq!(summary.tldr(), Some("x"));
        assert_eq!(summary.topic(), Some("y"));
        assert_eq!(backend.calls()[1][0].content, tldr::REPAIR_PROMPT);
    }

    #[tokio::test]
    async fn test_summary_degrades_to_raw_text() {
        let backend = ScriptedBackend::answering(&["draft", "这篇论文提出了新方法"]);
        let summary = extract_summary(&backend, &tldr_input(), ARXIV_ID).await;
        assert!(summary.is_degraded());
        assert_eq!(summary.tldr(), Some("这篇论文提出了新方法"));
        assert_eq!(summary.topic(), None);
    }

    #[tokio::test]
    async fn test_summary_absent_without_answer() {
        let backend = ScriptedBackend::new([Some("draft"), None]);
        let summary = extract_summary(&backend, &tldr_input(), ARXIV_ID).await;
        assert_eq!(summary, Summary::Absent);
        assert_eq!(summary.tldr(), None);
    }

    #[tokio::test]
    async fn test_prompt_is_truncated_to_budget() {
        let backend = ScriptedBackend::answering(&["[]", "[]"]);
        let extractor = StructuredExtractor::new(&backend, "system")
            .with_repair("repair")
            .with_token_budget(10);
        let long_prompt = "token ".repeat(500);
        let result = extractor.extract(&long_prompt, decode_affiliations).await;

        assert!(matches!(result, Extraction::Resolved(ref v) if v.is_empty()));
        let sent = &backend.calls()[0][1].content;
        assert!(sent.len() < long_prompt.len());
        assert!(long_prompt.starts_with(sent.as_str()));
    }
}
