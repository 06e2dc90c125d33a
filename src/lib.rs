//! Ripple-Index: a topical crawl, index and search engine
//!
//! This crate discovers article links on registered news sources, keeps the
//! pages that are on-topic, tokenizes and TF-IDF indexes their text, and
//! answers relevance-ranked search queries over the resulting corpus.

pub mod config;
pub mod context;
pub mod dedup;
pub mod indexer;
pub mod pipeline;
pub mod queue;
pub mod search;
pub mod source;
pub mod store;
pub mod text;

use thiserror::Error;

/// Main error type for Ripple-Index operations
#[derive(Debug, Error)]
pub enum RippleError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Crawler or scraper \"{0}\" does not exist")]
    UnknownSource(String),

    #[error("Session failed for source {source_name}: {message}")]
    Session {
        source_name: String,
        message: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] store::StorageError),

    #[error("Document not found: {0}")]
    DocumentNotFound(i64),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RippleError {
    /// Whether a failed job should go back to its queue for another attempt
    ///
    /// Unknown sources and rejected sessions can never succeed on retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::UnknownSource(_) | Self::Session { .. } | Self::Config(_)
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Ripple-Index operations
pub type Result<T> = std::result::Result<T, RippleError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use context::Context;
pub use pipeline::Pipeline;
pub use search::{SearchEngine, SearchResult};
pub use store::{CrawlAction, DocumentId, LinkTask};
