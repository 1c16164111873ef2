//! Prompt templates for the LLM extraction steps.
//!
//! Each submodule holds the system instruction, the repair instruction
//! where the step has a repair pass, and a builder for the user prompt.

pub mod affiliations;
pub mod score;
pub mod tldr;
