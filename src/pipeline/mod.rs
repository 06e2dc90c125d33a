//! Queue orchestration for the crawl → scrape → index pipeline
//!
//! This module wires the four job queues to their handlers:
//! - crawl: discover links on a page (never retried)
//! - scrape: store an on-topic article
//! - tokenize: compute a document's term table
//! - index: compute a document's TF-IDF vector and wake the idf roller
//!
//! On start-up [`Pipeline::bootstrap`] reconciles visited markers with the
//! primary store and restores crawl and scrape jobs saved by the previous
//! shutdown. It then either seeds the crawl queue (empty store) or re-queues
//! every document that is still missing its TF-IDF vector.

pub mod frontier;
mod handlers;

use crate::config::{Config, PipelineConfig};
use crate::context::Context;
use crate::dedup::VisitedStore;
use crate::indexer::{IdfRoller, Indexer};
use crate::queue::{spawn_workers, JobQueue, QueueName, QueueOptions};
use crate::source::Crawler;
use crate::store::{CacheStore, DocumentId, DocumentStore};
use crate::Result;
use handlers::{CrawlHandler, IndexHandler, ScrapeHandler, TokenizeHandler};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The four pipeline queues
///
/// Crawl and scrape jobs carry a URL, tokenize and index jobs a document id;
/// every job is named after its source.
#[derive(Clone)]
pub struct Queues {
    pub crawl: Arc<JobQueue<String>>,
    pub scrape: Arc<JobQueue<String>>,
    pub tokenize: Arc<JobQueue<DocumentId>>,
    pub index: Arc<JobQueue<DocumentId>>,
}

impl Queues {
    pub fn new(config: &PipelineConfig) -> Self {
        let retrying = QueueOptions {
            delay: config.job_delay(),
            max_attempts: config.retry_attempts,
            retry_delay: config.retry_delay(),
        };
        let crawl = QueueOptions {
            max_attempts: 1,
            ..retrying.clone()
        };

        Self {
            crawl: Arc::new(JobQueue::new(QueueName::Crawl, crawl)),
            scrape: Arc::new(JobQueue::new(QueueName::Scrape, retrying.clone())),
            tokenize: Arc::new(JobQueue::new(QueueName::Tokenize, retrying.clone())),
            index: Arc::new(JobQueue::new(QueueName::Index, retrying)),
        }
    }

    /// No job is waiting or running in any queue
    ///
    /// Checked upstream first, so a job handing work downstream is never missed.
    pub fn is_idle(&self) -> bool {
        self.crawl.is_idle()
            && self.scrape.is_idle()
            && self.tokenize.is_idle()
            && self.index.is_idle()
    }

    fn close(&self) {
        self.crawl.close();
        self.scrape.close();
        self.tokenize.close();
        self.index.close();
    }
}

/// What bootstrap put on the queues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bootstrap {
    /// Empty store: this many seeds went to the crawl queue
    Seeded(usize),
    /// Non-empty store: this many unindexed documents went to the index queue
    Healed(usize),
}

pub struct Pipeline {
    config: Arc<Config>,
    documents: Arc<dyn DocumentStore>,
    cache: Arc<dyn CacheStore>,
    visited: VisitedStore,
    indexer: Arc<Indexer>,
    crawler: Arc<Crawler>,
    queues: Queues,
    roller: Option<IdfRoller>,
    roller_wake: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Pipeline {
    pub fn new(ctx: &Context, crawler: Crawler) -> Self {
        let queues = Queues::new(&ctx.config.pipeline);
        let roller = IdfRoller::new(ctx.indexer.clone(), queues.index.clone(), &ctx.config.indexer);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config: ctx.config.clone(),
            documents: ctx.documents.clone(),
            cache: ctx.cache.clone(),
            visited: ctx.visited.clone(),
            indexer: ctx.indexer.clone(),
            crawler: Arc::new(crawler),
            queues,
            roller_wake: roller.waker(),
            roller: Some(roller),
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    pub fn queues(&self) -> &Queues {
        &self.queues
    }

    /// Prepares the queues for a run
    ///
    /// Reconciles visited markers with the primary store and restores the
    /// jobs saved by the last [`shutdown`](Self::shutdown). An empty store is
    /// then seeded from the configured seeds; otherwise every document
    /// missing its TF-IDF vector is re-queued for indexing.
    ///
    /// # Returns
    ///
    /// * `Ok(Bootstrap)` - Whether the queues were seeded or healed, and how many jobs that added
    /// * `Err(RippleError)` - A store could not be read or written
    pub fn bootstrap(&self) -> Result<Bootstrap> {
        self.visited
            .reconcile(self.documents.as_ref(), self.config.pipeline.reconcile_batch)?;

        let resumed = frontier::restore(self.cache.as_ref(), &self.queues)?;
        if resumed > 0 {
            info!("Resumed {} crawl and scrape jobs from the last run", resumed);
        }

        if self.documents.count_documents()? == 0 {
            let seeds = self.config.effective_seeds();
            for seed in &seeds {
                self.queues.crawl.add(&seed.source, seed.url.clone(), 0);
            }
            info!("Empty store, seeded crawl queue with {} pages", seeds.len());
            return Ok(Bootstrap::Seeded(seeds.len()));
        }

        let missing = self.documents.find_missing_tfidf()?;
        for &id in &missing {
            let source = self
                .documents
                .get_document(id)?
                .map(|doc| doc.source)
                .unwrap_or_default();
            self.queues.index.add(&source, id, 0);
        }
        if !missing.is_empty() {
            info!("Re-queued {} documents missing TF-IDF vectors", missing.len());
        }
        Ok(Bootstrap::Healed(missing.len()))
    }

    /// Spawns the enabled worker pools and the idf roller
    pub fn start(&mut self) {
        if !self.handles.is_empty() {
            warn!("Pipeline already started");
            return;
        }

        let workers = &self.config.workers;
        let counts = &self.config.pipeline;

        if workers.crawl {
            let handler = Arc::new(CrawlHandler {
                crawler: self.crawler.clone(),
                queues: self.queues.clone(),
            });
            self.handles.extend(spawn_workers(
                self.queues.crawl.clone(),
                counts.crawl_workers,
                handler,
            ));
        }

        if workers.scrape {
            let handler = Arc::new(ScrapeHandler {
                crawler: self.crawler.clone(),
                documents: self.documents.clone(),
                queues: self.queues.clone(),
                index_enabled: workers.index,
            });
            self.handles.extend(spawn_workers(
                self.queues.scrape.clone(),
                counts.scrape_workers,
                handler,
            ));
        }

        if workers.tokenize {
            let handler = Arc::new(TokenizeHandler {
                indexer: self.indexer.clone(),
            });
            self.handles.extend(spawn_workers(
                self.queues.tokenize.clone(),
                counts.tokenize_workers,
                handler,
            ));
        }

        if workers.index {
            let handler = Arc::new(IndexHandler {
                indexer: self.indexer.clone(),
                roller_wake: self.roller_wake.clone(),
            });
            self.handles.extend(spawn_workers(
                self.queues.index.clone(),
                counts.index_workers,
                handler,
            ));

            if let Some(roller) = self.roller.take() {
                self.handles.push(roller.spawn(self.shutdown_tx.subscribe()));
            }
        }

        info!(
            "Pipeline started (crawl: {}, scrape: {}, tokenize: {}, index: {})",
            workers.crawl, workers.scrape, workers.tokenize, workers.index
        );
    }

    /// Closes the queues, stops the roller and waits for every task
    ///
    /// Crawl and scrape jobs still waiting are saved for the next
    /// [`bootstrap`](Self::bootstrap). Waiting tokenize and index jobs are
    /// dropped; bootstrap re-queues unindexed documents anyway.
    pub async fn shutdown(mut self) {
        info!("Shutting down pipeline");
        self.queues.close();
        self.shutdown_tx.send_replace(true);

        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!("Pipeline task ended abnormally: {}", e);
            }
        }

        match frontier::save(self.cache.as_ref(), &self.queues) {
            Ok(0) => {}
            Ok(saved) => info!("Saved {} waiting crawl and scrape jobs", saved),
            Err(e) => error!("Failed to save waiting jobs: {}", e),
        }
        info!("Pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeedEntry;
    use crate::source::testing::StaticFetcher;
    use crate::store::{Article, CrawlAction, ScrapedDocument};
    use std::time::Duration;

    const INDEX: &str = "https://iris.paho.org/journal/en/index";
    const INDEX_HTML: &str = r#"
        <html><body>
            <a href="/journal/en/articles/masks">Masks</a>
            <a href="/journal/en/articles/vaccines">Vaccines</a>
            <a href="/about">About</a>
        </body></html>
    "#;
    const MASKS: &str = "https://iris.paho.org/journal/en/articles/masks";
    const MASKS_HTML: &str = r#"
        <html><head><title>Masks</title></head><body><article>
            <p>Masks reduce transmission. Wearing masks indoors lowers infection.</p>
        </article></body></html>
    "#;
    const VACCINES: &str = "https://iris.paho.org/journal/en/articles/vaccines";
    const VACCINES_HTML: &str = r#"
        <html><head><title>Vaccines</title></head><body><article>
            <p>Vaccine trials show strong protection against severe illness.</p>
        </article></body></html>
    "#;

    fn config() -> Config {
        let mut config = Config::default();
        config.pipeline.job_delay_ms = 0;
        config.pipeline.retry_delay_ms = 0;
        config.seeds = vec![SeedEntry {
            source: "COVIDCorpus".to_string(),
            url: INDEX.to_string(),
        }];
        config
    }

    fn pipeline(ctx: &Context) -> Pipeline {
        let fetcher = StaticFetcher::new(&[
            (INDEX, INDEX_HTML),
            (MASKS, MASKS_HTML),
            (VACCINES, VACCINES_HTML),
        ]);
        Pipeline::new(ctx, ctx.crawler(Arc::new(fetcher)))
    }

    fn insert(ctx: &Context, url: &str, text: &str) -> DocumentId {
        ctx.documents
            .insert_document(&ScrapedDocument {
                url: url.to_string(),
                raw_html: String::new(),
                article: Article {
                    text: text.to_string(),
                    ..Article::default()
                },
                source: "WSJ".to_string(),
            })
            .unwrap()
    }

    async fn wait_idle(pipeline: &Pipeline) {
        for _ in 0..200 {
            if pipeline.queues().is_idle() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("pipeline did not drain");
    }

    #[test]
    fn test_bootstrap_seeds_empty_store() {
        let mut config = config();
        config.seeds.clear();
        let ctx = Context::in_memory(config).unwrap();
        let pipeline = pipeline(&ctx);

        let expected = ctx.config.effective_seeds();
        assert_eq!(pipeline.bootstrap().unwrap(), Bootstrap::Seeded(expected.len()));

        let pending = pipeline.queues().crawl.pending();
        let seeded: Vec<(String, String)> = pending
            .iter()
            .map(|job| (job.name.clone(), job.data.clone()))
            .collect();
        let wanted: Vec<(String, String)> = expected
            .into_iter()
            .map(|seed| (seed.source, seed.url))
            .collect();
        assert_eq!(seeded, wanted);
        assert!(pending.iter().all(|job| job.priority == 0));
        assert!(pipeline.queues().index.is_empty());
    }

    #[test]
    fn test_bootstrap_heals_unindexed_documents() {
        let ctx = Context::in_memory(config()).unwrap();
        let indexed = insert(&ctx, "https://www.wsj.com/articles/a", "lockdown lifted");
        let missing = insert(&ctx, "https://www.wsj.com/articles/b", "booster shots");
        ctx.indexer.index_document(indexed).unwrap();

        let pipeline = pipeline(&ctx);
        assert_eq!(pipeline.bootstrap().unwrap(), Bootstrap::Healed(1));

        let pending = pipeline.queues().index.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].data, missing);
        assert_eq!(pending[0].name, "WSJ");
        assert!(pipeline.queues().crawl.is_empty());

        // Stored URLs are never scheduled for scraping again
        for url in ["https://www.wsj.com/articles/a", "https://www.wsj.com/articles/b"] {
            assert!(ctx.visited.exists(url, CrawlAction::Scrape).unwrap());
        }
    }

    #[tokio::test]
    async fn test_crawl_to_search() {
        let ctx = Context::in_memory(config()).unwrap();
        let mut pipeline = pipeline(&ctx);
        pipeline.bootstrap().unwrap();
        pipeline.start();

        wait_idle(&pipeline).await;
        assert_eq!(ctx.documents.count_documents().unwrap(), 2);
        assert!(ctx.documents.find_missing_tfidf().unwrap().is_empty());

        let results = ctx.search_engine().search("masks").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, MASKS);
        assert_eq!(results[0].source, "COVIDCorpus");
        assert_eq!(results[0].title.as_deref(), Some("Masks"));

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_waiting_jobs_survive_restart() {
        let mut first = config();
        first.workers.scrape = false;
        let ctx = Context::in_memory(first).unwrap();

        let mut run = pipeline(&ctx);
        run.bootstrap().unwrap();
        run.start();
        for _ in 0..200 {
            if run.queues().crawl.is_idle() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(run.queues().scrape.len(), 2);
        run.shutdown().await;
        assert_eq!(ctx.cache.llen(frontier::FRONTIER_KEY).unwrap(), 2);

        // Same stores, scraping enabled again
        let ctx = Context::from_stores(config(), ctx.documents.clone(), ctx.cache.clone());
        let mut run = pipeline(&ctx);
        assert_eq!(run.bootstrap().unwrap(), Bootstrap::Seeded(1));
        assert_eq!(run.queues().scrape.len(), 2);
        run.start();

        wait_idle(&run).await;
        assert_eq!(ctx.documents.count_documents().unwrap(), 2);
        assert_eq!(ctx.cache.llen(frontier::FRONTIER_KEY).unwrap(), 0);
        run.shutdown().await;
    }

    #[tokio::test]
    async fn test_scrapes_route_to_tokenize_without_indexer() {
        let mut config = config();
        config.workers.index = false;
        let ctx = Context::in_memory(config).unwrap();
        let mut pipeline = pipeline(&ctx);
        pipeline.bootstrap().unwrap();
        pipeline.start();

        wait_idle(&pipeline).await;
        let docs = ctx.documents.find_by_source("COVIDCorpus").unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|doc| doc.terms.is_some()));
        assert!(docs.iter().all(|doc| doc.tfidf.is_none()));

        pipeline.shutdown().await;
    }
}
