//! Text-level LaTeX cleanup.
//!
//! Pattern based only: there is no parser here and nothing is validated.
//! Cleaning strips comments, disabled blocks, forced line breaks and
//! redundant whitespace; markup stripping removes citations, figures and
//! tables before sections are extracted.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Source file extension
pub const TEX_EXT: &str = ".tex";

/// Compiled bibliography extension
pub const BBL_EXT: &str = ".bbl";

/// Marker that identifies a root document
pub const BEGIN_DOCUMENT: &str = "\\begin{document}";

static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%.*").expect("valid line comment regex"));
static COMMENT_ENV: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\\begin\{comment\}.*?\\end\{comment\}").expect("valid comment env regex")
});
static IFFALSE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\\iffalse\b.*?\\fi\b").expect("valid iffalse regex")
});
static FORCED_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\\\").expect("valid line break regex"));
static NEWLINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n+").expect("valid newline regex"));
static SPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r\x0C]{3,}").expect("valid whitespace regex"));

static INCLUDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(?:input|include)\{([^}]+)\}").expect("valid include regex")
});

static CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"~?\\cite[a-zA-Z]*\*?(?:\[[^\]]*\])*\{[^}]*\}").expect("valid citation regex")
});
static FIGURE_ENV: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\\begin\{figure\*?\}.*?\\end\{figure\*?\}").expect("valid figure regex")
});
static TABLE_ENV: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\\begin\{table\*?\}.*?\\end\{table\*?\}").expect("valid table regex")
});

fn clean_pass(raw: &str) -> String {
    let text = LINE_COMMENT.replace_all(raw, "");
    let text = COMMENT_ENV.replace_all(&text, "");
    let text = IFFALSE_BLOCK.replace_all(&text, "");
    let text = FORCED_BREAK.replace_all(&text, "");
    let text = NEWLINE_RUN.replace_all(&text, "\n");
    SPACE_RUN.replace_all(&text, " ").into_owned()
}

/// Clean one decoded source file.
///
/// Removing `\\` can join the pieces of a new `\fi` or `\end{comment}`,
/// so the rules are reapplied until the text stops changing. Every rule
/// only shortens the text, which bounds the loop.
pub fn clean_source(raw: &str) -> String {
    let mut text = clean_pass(raw);
    loop {
        let next = clean_pass(&text);
        if next == text {
            return text;
        }
        text = next;
    }
}

/// Whether cleaned text carries a `\begin{document}` marker
pub fn has_document_body(text: &str) -> bool {
    text.contains(BEGIN_DOCUMENT)
}

/// Archive member name an include directive points at.
pub fn include_target(reference: &str) -> String {
    let name = reference.trim();
    let name = name.strip_prefix("./").unwrap_or(name);
    if name.ends_with(TEX_EXT) {
        name.to_string()
    } else {
        format!("{}{}", name, TEX_EXT)
    }
}

/// Replace each `\input{..}`/`\include{..}` of `main` with the referenced
/// file's text, or nothing when the file is not in the archive.
///
/// Only the directives written in `main` are expanded; directives inside
/// the substituted text are left as they are.
pub fn expand_includes(main: &str, files: &HashMap<&str, &str>) -> String {
    INCLUDE
        .replace_all(main, |caps: &Captures| {
            let target = include_target(&caps[1]);
            files.get(target.as_str()).copied().unwrap_or("").to_string()
        })
        .into_owned()
}

/// Remove citations (with a leading `~`), figures and tables.
pub fn strip_markup(text: &str) -> String {
    let text = CITATION.replace_all(text, "");
    let text = FIGURE_ENV.replace_all(&text, "");
    TABLE_ENV.replace_all(&text, "").into_owned()
}
