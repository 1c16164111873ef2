//! # rustarxiv
//!
//! arXiv paper enrichment pipeline - LaTeX source resolution and LLM
//! metadata extraction
//!
//! ## Modules
//!
//! - [`arxiv`] - arXiv Atom API client and e-print download
//! - [`archive`] - main-document selection in source tarballs
//! - [`latex`] - LaTeX cleaning and include assembly
//! - [`sections`] - Introduction/Conclusion and author block extraction
//! - [`llm`] - chat completion client with rate-limit retries
//! - [`literal`] - safe Python-literal decoder for model output
//! - [`extraction`] - generate → repair → decode protocol
//! - [`paper`] - paper entity with lazily cached derived fields
//! - [`repository`] - paperswithcode repository lookup
//! - [`digest`] - bounded-concurrency batch enrichment
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustarxiv::arxiv::ArxivClient;
//! use rustarxiv::llm::{LlmClient, LlmConfig};
//! use rustarxiv::paper::Paper;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let arxiv = ArxivClient::new()?;
//!     let llm = LlmClient::new(LlmConfig::new("https://api.openai.com", "sk-...", "gpt-4o"))?;
//!
//!     let record = arxiv.fetch_one("2401.00001").await?;
//!     let paper = Paper::resolve(record, &arxiv).await;
//!     println!("{:?} scored {}", paper.tldr(&llm).await, paper.score(&llm).await);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod arxiv;
pub mod digest;
pub mod error;
pub mod extraction;
pub mod latex;
pub mod literal;
pub mod llm;
pub mod paper;
pub mod prompts;
pub mod repository;
pub mod sections;
pub mod tokens;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{DigestError, Result};
