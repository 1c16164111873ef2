//! Custom error types for rustarxiv.
//!
//! Errors are raised inside clients and parsers; the per-paper pipeline
//! turns them into absent or degraded fields instead of propagating.

use thiserror::Error;

/// Main error type for rustarxiv operations.
#[derive(Debug, Error)]
pub enum DigestError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response or document parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by the backend (HTTP 429) on the given attempt
    #[error("Rate limited on attempt {0}")]
    RateLimited(u32),

    /// External API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message from API
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Source archive is not a readable tarball or holds no `.tex` file
    #[error("Archive error: {0}")]
    Archive(String),

    /// Model output is not a data literal of the expected shape
    #[error("Literal error at offset {offset}: {message}")]
    Literal {
        /// Byte offset into the decoded text
        offset: usize,
        message: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias using `DigestError`
pub type Result<T> = std::result::Result<T, DigestError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| DigestError::Parse(msg.to_string()))
    }
}
