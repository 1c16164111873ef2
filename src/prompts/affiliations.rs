//! Affiliation extraction prompts.

/// System prompt for the extraction call
pub const SYSTEM_PROMPT: &str = r#"You are an assistant who perfectly extracts the affiliations of authors from the author information of a paper.
Return a Python list of affiliations sorted by author order, e.g. ['Tsinghua University', 'Peking University'].
When an affiliation has several levels, such as 'Department of Computer Science, Tsinghua University', return only the top-level one ('Tsinghua University').
Do not repeat an affiliation. If no affiliation is found, return an empty list [].
Return only the final list, without any intermediate results."#;

/// System prompt for the repair call
pub const REPAIR_PROMPT: &str = r#"You are a Python list assistant. Check that the input is a valid Python list literal.
If it is not, fix it. If it already is, return it unchanged.
Return only the list."#;

/// User prompt template
/// Placeholders: {author_block}
pub const USER_PROMPT_TEMPLATE: &str = r#"Given the author information of a paper in LaTeX format, extract the affiliations of the authors as a Python list sorted by author order. If no affiliation is found, return an empty list '[]'. The author information follows:
{author_block}"#;

/// Build user prompt with the `\author ... \maketitle` region
pub fn build_user_prompt(author_block: &str) -> String {
    USER_PROMPT_TEMPLATE.replace("{author_block}", author_block)
}
