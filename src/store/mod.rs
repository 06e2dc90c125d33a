//! Storage module for persisting corpus data
//!
//! This module holds the two stores the pipeline talks to:
//! - The primary document store (scraped articles, term tables, TF-IDF vectors)
//! - The cache store (visited markers, staged idf values, the roll lock and
//!   the pending-term list)
//!
//! Both are SQLite-backed and shared between worker tasks behind a mutex.

mod cache;
mod documents;
mod schema;
mod traits;

pub use cache::SqliteCache;
pub use documents::SqliteDocumentStore;
pub use traits::{CacheOp, CacheStore, DocumentStore, StorageError, StorageResult};

use std::fmt;

/// Primary store identifier of a document
pub type DocumentId = i64;

/// What the pipeline should do with a discovered link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlAction {
    /// Fetch the page and follow its links
    Crawl,
    /// Fetch the page and store it as an article
    Scrape,
}

impl CrawlAction {
    /// Numeric code used in visited-marker keys
    pub fn code(&self) -> u8 {
        match self {
            Self::Crawl => 0,
            Self::Scrape => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Crawl),
            1 => Some(Self::Scrape),
            _ => None,
        }
    }
}

impl fmt::Display for CrawlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crawl => write!(f, "crawl"),
            Self::Scrape => write!(f, "scrape"),
        }
    }
}

/// A link discovered by a source crawler
///
/// `priority` is the topical relevance (higher is more relevant); the pipeline
/// negates it when enqueueing so relevant links are processed first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTask {
    pub url: String,
    pub action: CrawlAction,
    pub priority: i64,
}

/// Structured fields extracted from an article page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Article {
    /// Canonical URL declared by the page, if any
    pub url: Option<String>,
    pub title: Option<String>,
    /// Plain-text article body
    pub text: String,
    pub author: Option<String>,
    pub published: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub site_name: Option<String>,
    pub links: Vec<String>,
}

/// A freshly scraped page, ready to be inserted
#[derive(Debug, Clone)]
pub struct ScrapedDocument {
    pub url: String,
    pub raw_html: String,
    pub article: Article,
    /// Name of the source crawler that produced it
    pub source: String,
}

/// Weight of one term in a document's TF-IDF vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermWeight {
    pub tf: f64,
    pub idf: f64,
}

impl TermWeight {
    pub fn tfidf(&self) -> f64 {
        self.tf * self.idf
    }
}

/// Per-term TF-IDF weights of a document, in term-table order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TfIdfVector {
    pub entries: Vec<(String, TermWeight)>,
}

impl TfIdfVector {
    pub fn get(&self, term: &str) -> Option<&TermWeight> {
        self.entries
            .iter()
            .find(|(t, _)| t == term)
            .map(|(_, weight)| weight)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A document as held by the primary store
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: DocumentId,
    pub url: String,
    pub source: String,
    pub article: Article,
    pub created_at: String,
    /// Set once by the tokenizer
    pub terms: Option<crate::text::TermTable>,
    /// Set by the indexer; only `idf` changes afterwards
    pub tfidf: Option<TfIdfVector>,
}

impl StoredDocument {
    /// URL used to collapse duplicate articles in search results
    pub fn dedup_url(&self) -> &str {
        self.article.url.as_deref().unwrap_or(&self.url)
    }
}
