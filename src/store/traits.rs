//! Storage traits and error types
//!
//! This module defines the trait interfaces for the primary document store and
//! the cache store, and their shared error type.

use crate::store::{DocumentId, ScrapedDocument, StoredDocument, TfIdfVector};
use crate::text::TermTable;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(DocumentId),

    #[error("Duplicate document URL: {0}")]
    DuplicateUrl(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for the primary document store
///
/// Implementations must be safe to share between worker tasks; each call is
/// atomic with respect to a single document.
pub trait DocumentStore: Send + Sync {
    // ===== Documents =====

    /// Inserts a scraped document
    ///
    /// # Arguments
    ///
    /// * `doc` - The scraped article with its source name and raw HTML
    ///
    /// # Returns
    ///
    /// * `Ok(DocumentId)` - Id of the new document
    /// * `Err(StorageError::DuplicateUrl)` - A document with the same URL exists
    fn insert_document(&self, doc: &ScrapedDocument) -> StorageResult<DocumentId>;

    /// Loads a document with its term table and TF-IDF vector
    ///
    /// # Arguments
    ///
    /// * `id` - Id returned by [`insert_document`](Self::insert_document)
    ///
    /// # Returns
    ///
    /// * `Ok(Some(StoredDocument))` - The document; `terms` and `tfidf` are `None` until computed
    /// * `Ok(None)` - No document has this id
    fn get_document(&self, id: DocumentId) -> StorageResult<Option<StoredDocument>>;

    /// Finds a document by its (unique) URL
    fn find_by_url(&self, url: &str) -> StorageResult<Option<StoredDocument>>;

    /// Lists documents from one source, in insertion order
    fn find_by_source(&self, source: &str) -> StorageResult<Vec<StoredDocument>>;

    /// Lists ids of documents that have no TF-IDF vector yet
    fn find_missing_tfidf(&self) -> StorageResult<Vec<DocumentId>>;

    /// Lists document URLs with id greater than `after`, at most `limit` of them
    ///
    /// Used to page through the whole collection in bounded batches.
    fn document_urls(&self, after: DocumentId, limit: usize)
        -> StorageResult<Vec<(DocumentId, String)>>;

    /// Finds indexed documents whose term set intersects `terms`
    fn find_indexed_by_terms(&self, terms: &[String]) -> StorageResult<Vec<StoredDocument>>;

    // ===== Terms and weights =====

    /// Stores a document's term table
    ///
    /// Term tables are write-once: returns `false` without writing when the
    /// document was already tokenized.
    fn set_terms(&self, id: DocumentId, terms: &TermTable) -> StorageResult<bool>;

    /// Stores a document's TF-IDF vector, replacing any previous one
    fn set_tfidf(&self, id: DocumentId, vector: &TfIdfVector) -> StorageResult<()>;

    /// Sets `idf` for `term` in every stored TF-IDF vector that has it
    ///
    /// Runs as one batched write; `tf` is left untouched.
    ///
    /// # Arguments
    ///
    /// * `term` - Stemmed term as stored in the vectors
    /// * `idf` - New inverse document frequency
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of vector entries updated, 0 when no vector has the term
    fn update_term_idf(&self, term: &str, idf: f64) -> StorageResult<usize>;

    // ===== Statistics =====

    /// Total number of documents
    fn count_documents(&self) -> StorageResult<u64>;

    /// Number of documents whose term table contains `term`
    fn count_documents_with_term(&self, term: &str) -> StorageResult<u64>;

    // ===== Corpus profile =====

    /// Replaces the stored corpus profile (term, average normalized frequency)
    fn replace_corpus_profile(&self, profile: &[(String, f64)]) -> StorageResult<()>;

    /// Reads the corpus profile, ordered by term
    fn corpus_profile(&self) -> StorageResult<Vec<(String, f64)>>;
}

/// A write queued in a cache pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum CacheOp {
    HSet {
        key: String,
        field: String,
        value: String,
    },
    LPush {
        key: String,
        value: String,
    },
}

/// Trait for the cache/broker store
///
/// A small key-value surface: hashes, lists, and an expiring lock.
pub trait CacheStore: Send + Sync {
    // ===== Hashes =====

    fn hset(&self, key: &str, field: &str, value: &str) -> StorageResult<()>;

    /// Sets a hash field only when it is absent
    ///
    /// Returns `true` when this call created the field. Concurrent callers
    /// racing on the same field see exactly one `true`.
    fn hsetnx(&self, key: &str, field: &str, value: &str) -> StorageResult<bool>;

    fn hget(&self, key: &str, field: &str) -> StorageResult<Option<String>>;

    fn hexists(&self, key: &str, field: &str) -> StorageResult<bool>;

    /// Reads and removes a hash field in one step
    fn htake(&self, key: &str, field: &str) -> StorageResult<Option<String>>;

    // ===== Lists =====

    /// Pushes onto the head of a list
    fn lpush(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Pops from the tail of a list (the oldest pushed value)
    fn rpop(&self, key: &str) -> StorageResult<Option<String>>;

    fn llen(&self, key: &str) -> StorageResult<u64>;

    // ===== Batching =====

    /// Applies a batch of writes atomically
    fn pipeline(&self, ops: &[CacheOp]) -> StorageResult<()>;

    // ===== Locks =====

    /// Takes a named lock unless it is held and unexpired
    ///
    /// Returns `true` when the caller now holds the lock.
    fn try_lock(&self, name: &str, ttl: Duration) -> StorageResult<bool>;

    fn release_lock(&self, name: &str) -> StorageResult<()>;
}
