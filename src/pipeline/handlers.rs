//! Job handlers for the four pipeline stages

use super::Queues;
use crate::indexer::Indexer;
use crate::queue::{Job, JobHandler};
use crate::source::Crawler;
use crate::store::{CrawlAction, DocumentId, DocumentStore, StorageError};
use crate::{Result, RippleError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Crawls a page and routes every discovered link to the crawl or scrape queue
pub(super) struct CrawlHandler {
    pub crawler: Arc<Crawler>,
    pub queues: Queues,
}

#[async_trait]
impl JobHandler<String> for CrawlHandler {
    async fn handle(&self, job: &Job<String>) -> Result<()> {
        let tasks = self.crawler.crawl(&job.name, &job.data).await?;

        for task in &tasks {
            let queue = match task.action {
                CrawlAction::Crawl => &self.queues.crawl,
                CrawlAction::Scrape => &self.queues.scrape,
            };
            queue.add(&job.name, task.url.clone(), -task.priority);
        }

        debug!("Crawled {} ({} new tasks)", job.data, tasks.len());
        Ok(())
    }
}

/// Scrapes an article and stores it
pub(super) struct ScrapeHandler {
    pub crawler: Arc<Crawler>,
    pub documents: Arc<dyn DocumentStore>,
    pub queues: Queues,
    /// Send new documents straight to the index queue
    pub index_enabled: bool,
}

#[async_trait]
impl JobHandler<String> for ScrapeHandler {
    async fn handle(&self, job: &Job<String>) -> Result<()> {
        let Some(doc) = self.crawler.scrape(&job.name, &job.data).await? else {
            return Ok(());
        };

        let id = match self.documents.insert_document(&doc) {
            Ok(id) => id,
            Err(StorageError::DuplicateUrl(url)) => {
                info!("{} is already stored, skipping", url);
                return Ok(());
            }
            Err(e) => return Err(RippleError::Storage(e)),
        };

        info!("Stored {} as document {}", doc.url, id);
        if self.index_enabled {
            self.queues.index.add(&job.name, id, 0);
        } else {
            self.queues.tokenize.add(&job.name, id, 0);
        }
        Ok(())
    }
}

pub(super) struct TokenizeHandler {
    pub indexer: Arc<Indexer>,
}

#[async_trait]
impl JobHandler<DocumentId> for TokenizeHandler {
    async fn handle(&self, job: &Job<DocumentId>) -> Result<()> {
        self.indexer.tokenize_document(job.data)?;
        Ok(())
    }
}

/// Indexes a document and wakes the idf roller
pub(super) struct IndexHandler {
    pub indexer: Arc<Indexer>,
    pub roller_wake: Arc<Notify>,
}

#[async_trait]
impl JobHandler<DocumentId> for IndexHandler {
    async fn handle(&self, job: &Job<DocumentId>) -> Result<()> {
        self.indexer.index_document(job.data)?;
        self.roller_wake.notify_one();
        Ok(())
    }
}
