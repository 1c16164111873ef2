//! TLDR and topic prompts.

/// System prompt for the summary call
pub const SYSTEM_PROMPT: &str = "You are an assistant who perfectly summarizes scientific papers and gives the user the core idea of the paper. Make sure your response can be parsed directly as a Python literal.";

/// System prompt for the repair call
pub const REPAIR_PROMPT: &str = "You are a Python dict assistant. Check that the input is a valid Python dict literal with the keys 'tldr' and 'topic'. If it is not, fix it. If it is, return it unchanged. Make sure your response can be parsed directly as a Python literal.";

/// User prompt template
/// Placeholders: {category}, {paper_title}, {paper_abstract}, {introduction}, {conclusion}
pub const USER_PROMPT_TEMPLATE: &str = r#"Given the title, abstract, introduction and conclusion (if any) of a paper in LaTeX format, write a one-sentence TLDR summary in Chinese. Also propose one relevant search topic in English (e.g. LLM Position Embedding) related to the paper's category, {category}.

\title{{paper_title}}
\begin{abstract}{paper_abstract}\end{abstract}
{introduction}
{conclusion}

Respond with a Python dict with 'tldr' and 'topic' as keys, i.e. {'tldr': "...", 'topic': "..."}. Make sure the response can be parsed directly as a Python literal. Return plain text only, without any intermediate results."#;

/// Paper fields embedded in the summary prompt
#[derive(Debug, Clone, Copy)]
pub struct TldrInput<'a> {
    pub title: &'a str,
    pub summary: &'a str,
    pub introduction: &'a str,
    pub conclusion: &'a str,
    pub category: &'a str,
}

/// Build user prompt. Placeholders are filled in template order so paper
/// text that happens to contain a placeholder is left alone.
pub fn build_user_prompt(input: &TldrInput<'_>) -> String {
    let fields = [
        ("{category}", input.category),
        ("{paper_title}", input.title),
        ("{paper_abstract}", input.summary),
        ("{introduction}", input.introduction),
        ("{conclusion}", input.conclusion),
    ];

    let mut out = String::with_capacity(USER_PROMPT_TEMPLATE.len() + input.summary.len());
    let mut rest = USER_PROMPT_TEMPLATE;
    for (placeholder, value) in fields {
        match rest.find(placeholder) {
            Some(idx) => {
                out.push_str(&rest[..idx]);
                out.push_str(value);
                rest = &rest[idx + placeholder.len()..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_user_prompt() {
        let prompt = build_user_prompt(&TldrInput {
            title: "Attention Is All You Need",
            summary: "We propose the Transformer.",
            introduction: "\\section{Introduction} RNNs are slow.",
            conclusion: "",
            category: "['cs.CL', 'cs.LG']",
        });
        assert!(prompt.contains("\\title{Attention Is All You Need}"));
        assert!(prompt.contains("\\begin{abstract}We propose the Transformer.\\end{abstract}"));
        assert!(prompt.contains("category, ['cs.CL', 'cs.LG']."));
        assert!(prompt.contains("RNNs are slow."));
        assert!(prompt.contains("{'tldr': \"...\", 'topic': \"...\"}"));
    }

    #[test]
    fn test_placeholder_text_in_paper_is_kept() {
        let prompt = build_user_prompt(&TldrInput {
            title: "On {conclusion} tokens",
            summary: "s",
            introduction: "i",
            conclusion: "c",
            category: "cs.AI",
        });
        assert!(prompt.contains("\\title{On {conclusion} tokens}"));
    }
}
