//! Affiliation-based relevance score prompts.

/// System prompt for the scoring call
pub const SYSTEM_PROMPT: &str = r#"You are an assistant who perfectly scores a paper based on the affiliations of its authors.
You prefer papers about knowledge and analysis over plain applications.
If no affiliation is given, return 1.
The score is a number between 0 and 5 in steps of 0.5.
Return only the score, without any intermediate results."#;

/// Preferred institutions, most preferred first within each list
pub const PREFERENCE_RUBRIC: &str = r#"USA university list: [
    Carnegie Mellon University,
    University of Illinois at Urbana-Champaign,
    University of Maryland - College Park,
    University of California - San Diego,
    Cornell University,
    University of Michigan,
    Stanford University,
    Georgia Institute of Technology,
    Massachusetts Institute of Technology,
    University of California - Los Angeles,
    University of California - Berkeley,
    University of Massachusetts Amherst,
    New York University,
    University of Washington]
China university list: [Peking University, Tsinghua University, Hong Kong University of Science and Technology, Shanghai Jiao Tong University, Zhejiang University, Chinese Academy of Sciences]
Lab list: [OpenAI, Deepseek-AI, DeepMind, Meta, Google, Alibaba, Tencent, ByteDance, Microsoft, Nvidia, Huawei, Facebook, Amazon, IBM Watson, Intel, Apple]"#;

/// User prompt template
/// Placeholders: {rubric}, {affiliations}
pub const USER_PROMPT_TEMPLATE: &str = r#"Given the author affiliations, generate a score for the paper. For reference only, here is my affiliation preference list; entries listed higher are preferred.

{rubric}

The affiliations of this paper are: {affiliations}"#;

/// Build user prompt from an already rendered affiliation list
pub fn build_user_prompt(affiliations: &str) -> String {
    USER_PROMPT_TEMPLATE
        .replace("{rubric}", PREFERENCE_RUBRIC)
        .replace("{affiliations}", affiliations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_user_prompt() {
        let prompt = build_user_prompt("['MIT', 'Google']");
        assert!(prompt.contains("Carnegie Mellon University"));
        assert!(prompt.ends_with("The affiliations of this paper are: ['MIT', 'Google']"));
    }
}
