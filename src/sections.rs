//! Section and author-block extraction from flattened LaTeX.

use regex::Regex;
use std::sync::LazyLock;

static INTRODUCTION: LazyLock<Regex> = LazyLock::new(|| section_pattern("Introduction"));
static CONCLUSION: LazyLock<Regex> = LazyLock::new(|| section_pattern("Conclusion"));
static AUTHOR_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\\author.*?\\maketitle").expect("valid author block regex")
});

/// From `\section{<title>}` up to, not including, the first of `\section`,
/// `\end{document}`, `\bibliography`, `\appendix` or the end of text.
fn section_pattern(title: &str) -> Regex {
    let pattern = format!(
        r"(?s)(\\section\{{{}\}}.*?)(?:\\section|\\end\{{document\}}|\\bibliography|\\appendix|\z)",
        regex::escape(title)
    );
    Regex::new(&pattern).expect("valid section regex")
}

fn first_section(re: &Regex, text: &str) -> String {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Introduction section, empty when there is none
pub fn introduction(text: &str) -> String {
    first_section(&INTRODUCTION, text)
}

/// Conclusion section, empty when there is none
pub fn conclusion(text: &str) -> String {
    first_section(&CONCLUSION, text)
}

/// Text from the first `\author` through the following `\maketitle`
pub fn author_block(text: &str) -> Option<&str> {
    AUTHOR_BLOCK.find(text).map(|m| m.as_str())
}
