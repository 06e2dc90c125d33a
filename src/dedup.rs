//! Visited markers for (url, action) pairs
//!
//! Markers live in a single cache hash, one field per pair, so checking and
//! marking a link costs one key lookup. Markers are never deleted.

use crate::store::{CacheOp, CacheStore, CrawlAction, DocumentStore, StorageResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Cache hash holding every visited marker
pub const VISITED_KEY: &str = "links";

const MARKED: &str = "true";

/// Presence test over visited (url, action) pairs
#[derive(Clone)]
pub struct VisitedStore {
    cache: Arc<dyn CacheStore>,
}

fn field(url: &str, action: CrawlAction) -> String {
    format!("{}:{}", url, action.code())
}

impl VisitedStore {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    pub fn exists(&self, url: &str, action: CrawlAction) -> StorageResult<bool> {
        self.cache.hexists(VISITED_KEY, &field(url, action))
    }

    /// Marks a pair as visited; marking twice is harmless
    pub fn mark(&self, url: &str, action: CrawlAction) -> StorageResult<()> {
        self.cache.hset(VISITED_KEY, &field(url, action), MARKED)
    }

    /// Marks a pair as visited in one atomic step
    ///
    /// Returns `true` only for the caller that created the marker, so a pair
    /// is claimed once even when crawl workers race on it.
    pub fn mark_if_new(&self, url: &str, action: CrawlAction) -> StorageResult<bool> {
        self.cache.hsetnx(VISITED_KEY, &field(url, action), MARKED)
    }

    /// Pre-marks every stored document URL as visited for `Scrape`
    ///
    /// Pages through the primary store `batch` URLs at a time, writing each
    /// page of markers in one pipelined batch. Returns the number of URLs
    /// marked.
    pub fn reconcile(&self, documents: &dyn DocumentStore, batch: usize) -> StorageResult<u64> {
        let batch = batch.max(1);
        let mut after = 0;
        let mut marked = 0u64;

        loop {
            let page = documents.document_urls(after, batch)?;
            let Some((last_id, _)) = page.last() else {
                break;
            };
            after = *last_id;

            let ops: Vec<CacheOp> = page
                .iter()
                .map(|(_, url)| CacheOp::HSet {
                    key: VISITED_KEY.to_string(),
                    field: field(url, CrawlAction::Scrape),
                    value: MARKED.to_string(),
                })
                .collect();
            self.cache.pipeline(&ops)?;

            marked += page.len() as u64;
            debug!("Reconciled {} visited markers", marked);

            if page.len() < batch {
                break;
            }
        }

        info!("Reconciled {} stored documents with visited markers", marked);
        Ok(marked)
    }
}
