//! Explicitly constructed process context
//!
//! Holds the store handles and the components built on them. Everything that
//! needs a store receives it from here; there are no global connections.

use crate::config::Config;
use crate::dedup::VisitedStore;
use crate::indexer::Indexer;
use crate::search::SearchEngine;
use crate::source::{Crawler, HttpFetcher, PageFetcher, ReadabilityExtractor, SourceRegistry};
use crate::store::{CacheStore, DocumentStore, SqliteCache, SqliteDocumentStore};
use crate::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub struct Context {
    pub config: Arc<Config>,
    pub documents: Arc<dyn DocumentStore>,
    pub cache: Arc<dyn CacheStore>,
    pub visited: VisitedStore,
    pub indexer: Arc<Indexer>,
}

impl Context {
    /// Opens the primary and cache stores at the configured paths
    pub fn open(config: Config) -> Result<Self> {
        let documents = SqliteDocumentStore::new(Path::new(&config.store.database_path))?;
        let cache = SqliteCache::new(Path::new(&config.store.cache_path))?;
        info!(
            "Opened stores at {} and {}",
            config.store.database_path, config.store.cache_path
        );
        Ok(Self::from_stores(config, Arc::new(documents), Arc::new(cache)))
    }

    /// Context over throwaway in-memory stores
    pub fn in_memory(config: Config) -> Result<Self> {
        let documents = SqliteDocumentStore::new_in_memory()?;
        let cache = SqliteCache::new_in_memory()?;
        Ok(Self::from_stores(config, Arc::new(documents), Arc::new(cache)))
    }

    pub fn from_stores(
        config: Config,
        documents: Arc<dyn DocumentStore>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            visited: VisitedStore::new(cache.clone()),
            indexer: Arc::new(Indexer::new(documents.clone(), cache.clone())),
            documents,
            cache,
        }
    }

    pub fn search_engine(&self) -> SearchEngine {
        SearchEngine::new(self.documents.clone())
    }

    /// Crawler over the built-in sources using `fetcher`
    pub fn crawler(&self, fetcher: Arc<dyn PageFetcher>) -> Crawler {
        Crawler::new(
            SourceRegistry::with_defaults(),
            fetcher,
            Arc::new(ReadabilityExtractor),
            self.visited.clone(),
            &self.config,
        )
    }

    /// Crawler fetching over HTTP with the configured client settings
    pub fn http_crawler(&self) -> Result<Crawler> {
        let fetcher = HttpFetcher::new(&self.config.fetch)?;
        Ok(self.crawler(Arc::new(fetcher)))
    }

    /// Releases the store handles
    ///
    /// Connections close once the last component holding them is dropped.
    pub fn close(self) {
        info!("Closing stores");
    }
}
