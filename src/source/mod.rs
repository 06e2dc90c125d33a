//! News sources and the crawl/scrape operations over them
//!
//! Each source implements [`SourceCrawler`]: given a fetched page it decides
//! whether the page is on-topic and which links are worth following. Sources
//! are looked up by name in a [`SourceRegistry`], and [`Crawler`] wraps a
//! source with fetching, dedup and article extraction to provide the two
//! pipeline operations:
//!
//! - `crawl(url)`: discover links and turn them into [`LinkTask`]s
//! - `scrape(url)`: turn an on-topic page into a [`ScrapedDocument`]

mod covid_corpus;
mod economist;
mod extract;
mod fetch;
mod nytimes;
mod wsj;

pub use covid_corpus::CovidCorpusCrawler;
pub use economist::EconomistCrawler;
pub use extract::{resolve_link, ArticleExtractor, ReadabilityExtractor};
pub use fetch::{build_http_client, FetchedPage, HttpFetcher, PageFetcher, Session};
pub use nytimes::NyTimesCrawler;
pub use wsj::WsjCrawler;

use crate::config::{Config, TopicConfig};
use crate::dedup::VisitedStore;
use crate::store::{CrawlAction, LinkTask, ScrapedDocument};
use crate::{Result, RippleError};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Names of every built-in source
pub const SOURCE_NAMES: &[&str] = &["Economist", "NYTimes", "WSJ", "COVIDCorpus"];

/// Outcome of evaluating a page against a source's rules
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub is_topical: bool,
    /// Absolute URLs of candidate pages
    pub links: Vec<String>,
}

/// Per-source page classification
pub trait SourceCrawler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether requests carry the source's session cookie when one is configured
    fn requires_session(&self) -> bool {
        false
    }

    /// Whether discovered links are themselves articles
    ///
    /// When true every new link is scheduled for scraping as well as
    /// crawling, and the crawled page itself is not scraped.
    fn links_are_articles(&self) -> bool {
        false
    }

    fn classify(&self, page: &FetchedPage, topic: &TopicConfig) -> Classification;
}

type Factory = Box<dyn Fn() -> Arc<dyn SourceCrawler> + Send + Sync>;

/// Source name to crawler factory
pub struct SourceRegistry {
    factories: HashMap<&'static str, Factory>,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl SourceRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Creates a registry holding every built-in source
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("Economist", || Arc::new(EconomistCrawler::new()));
        registry.register("NYTimes", || Arc::new(NyTimesCrawler::new()));
        registry.register("WSJ", || Arc::new(WsjCrawler::new()));
        registry.register("COVIDCorpus", || Arc::new(CovidCorpusCrawler::new()));
        registry
    }

    pub fn register<F>(&mut self, name: &'static str, factory: F)
    where
        F: Fn() -> Arc<dyn SourceCrawler> + Send + Sync + 'static,
    {
        self.factories.insert(name, Box::new(factory));
    }

    /// Instantiates the crawler registered under `name`
    pub fn create(&self, name: &str) -> Result<Arc<dyn SourceCrawler>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| RippleError::UnknownSource(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Compiles a built-in pattern
pub(crate) fn pattern(re: &str) -> Regex {
    Regex::new(re).unwrap_or_else(|e| panic!("invalid built-in pattern {}: {}", re, e))
}

/// Text of every element matching `css`, one entry per element
pub(crate) fn texts(document: &Html, css: &str) -> Vec<String> {
    match Selector::parse(css) {
        Ok(selector) => document
            .select(&selector)
            .map(|element| element.text().collect::<String>())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Absolute `href` values of every element matching `css`
pub(crate) fn hrefs(document: &Html, css: &str, page: &FetchedPage) -> Vec<String> {
    let (Ok(selector), Ok(base_url)) = (Selector::parse(css), Url::parse(&page.final_url)) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_link(href, &base_url))
        .collect()
}

/// Crawl and scrape operations over registered sources
pub struct Crawler {
    registry: SourceRegistry,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn ArticleExtractor>,
    visited: VisitedStore,
    topic: TopicConfig,
    sessions: HashMap<String, Session>,
    settle: Duration,
}

impl Crawler {
    pub fn new(
        registry: SourceRegistry,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn ArticleExtractor>,
        visited: VisitedStore,
        config: &Config,
    ) -> Self {
        let sessions = registry
            .names()
            .into_iter()
            .filter_map(|name| {
                let cookie = config.session_cookie(name)?;
                let session = Session {
                    source: name.to_string(),
                    cookie: cookie.to_string(),
                };
                Some((name.to_string(), session))
            })
            .collect();

        Self {
            registry,
            fetcher,
            extractor,
            visited,
            topic: config.topic.clone(),
            sessions,
            settle: Duration::from_millis(config.fetch.settle_ms),
        }
    }

    /// Topical relevance of a URL: 1 when it mentions a keyword
    fn priority(&self, url: &str) -> i64 {
        if self.topic.matches_url(url) {
            1
        } else {
            0
        }
    }

    /// Resolves the session (if any) and fetches the page
    ///
    /// Sources that want a session are still fetched without one when no
    /// cookie is configured; they just see the anonymous page.
    async fn load(&self, source: &dyn SourceCrawler, url: &str) -> Result<FetchedPage> {
        let session = if source.requires_session() {
            let session = self.sessions.get(source.name());
            if session.is_none() {
                debug!(
                    "No session configured for {}, fetching {} anonymously",
                    source.name(),
                    url
                );
            }
            session
        } else {
            None
        };

        let page = self.fetcher.fetch(url, session).await?;

        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        Ok(page)
    }

    /// Discovers links on `url`
    ///
    /// Yields nothing for off-topic pages. Every yielded (url, action) pair
    /// is marked visited first, so it is never yielded again.
    pub async fn crawl(&self, source_name: &str, url: &str) -> Result<Vec<LinkTask>> {
        let source = self.registry.create(source_name)?;
        let page = self.load(source.as_ref(), url).await?;
        let classification = source.classify(&page, &self.topic);

        if !classification.is_topical {
            debug!("{} is not topical, nothing to crawl", url);
            return Ok(Vec::new());
        }

        info!("{} links found on {}", classification.links.len(), url);

        let mut tasks = Vec::new();
        for link in &classification.links {
            if self.visited.mark_if_new(link, CrawlAction::Crawl)? {
                tasks.push(LinkTask {
                    url: link.clone(),
                    action: CrawlAction::Crawl,
                    priority: self.priority(link),
                });
            }
        }

        let articles: Vec<&str> = if source.links_are_articles() {
            classification.links.iter().map(String::as_str).collect()
        } else {
            vec![url]
        };

        for article in articles {
            if self.visited.mark_if_new(article, CrawlAction::Scrape)? {
                tasks.push(LinkTask {
                    url: article.to_string(),
                    action: CrawlAction::Scrape,
                    priority: self.priority(article),
                });
            } else {
                debug!("{} already scheduled for scraping", article);
            }
        }

        Ok(tasks)
    }

    /// Extracts the article at `url`
    ///
    /// Off-topic pages and pages without article text produce `Ok(None)`.
    pub async fn scrape(&self, source_name: &str, url: &str) -> Result<Option<ScrapedDocument>> {
        let source = self.registry.create(source_name)?;
        let page = self.load(source.as_ref(), url).await?;

        if !source.classify(&page, &self.topic).is_topical {
            debug!("{} is not topical, skipping scrape", url);
            return Ok(None);
        }

        let article = self.extractor.extract(&page);
        if article.text.trim().is_empty() {
            debug!("No article text extracted from {}", url);
            return Ok(None);
        }

        Ok(Some(ScrapedDocument {
            url: url.to_string(),
            raw_html: page.html,
            article,
            source: source.name().to_string(),
        }))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StaticFetcher;
    use super::*;
    use crate::config::SessionEntry;
    use crate::store::SqliteCache;

    const INDEX: &str = "https://www.wsj.com/news/health";
    const INDEX_HTML: &str = r#"
        <html><body>
            <h4>Coronavirus Latest</h4>
            <a href="https://www.wsj.com/articles/covid-19-cases-rise-1">One</a>
            <a href="https://www.wsj.com/articles/markets-today-2">Two</a>
            <a href="https://www.wsj.com/news/other">Skip</a>
        </body></html>
    "#;
    const OFF_TOPIC_HTML: &str = r#"
        <html><body><h4>Markets</h4>
            <a href="https://www.wsj.com/articles/markets-3">Three</a>
            <p>Stocks rose.</p>
        </body></html>
    "#;
    const ARTICLE: &str = "https://www.wsj.com/articles/covid-19-cases-rise-1";
    const ARTICLE_HTML: &str = r#"
        <html><head><title>Cases rise</title></head><body>
            <h4>Coronavirus</h4>
            <article><p>Covid cases rose again as the vaccine rollout slowed.</p></article>
        </body></html>
    "#;

    fn crawler(fetcher: StaticFetcher, with_session: bool) -> (Crawler, VisitedStore) {
        let mut config = Config::default();
        if with_session {
            config.sessions.push(SessionEntry {
                source: "WSJ".to_string(),
                cookie: "sid=1".to_string(),
            });
        }
        let visited = VisitedStore::new(Arc::new(SqliteCache::new_in_memory().unwrap()));
        let crawler = Crawler::new(
            SourceRegistry::with_defaults(),
            Arc::new(fetcher),
            Arc::new(ReadabilityExtractor),
            visited.clone(),
            &config,
        );
        (crawler, visited)
    }

    #[test]
    fn test_registry_lookup() {
        let registry = SourceRegistry::with_defaults();
        let mut expected = SOURCE_NAMES.to_vec();
        expected.sort_unstable();
        assert_eq!(registry.names(), expected);

        assert_eq!(registry.create("NYTimes").unwrap().name(), "NYTimes");
        let err = registry.create("Gazette").err().unwrap();
        assert!(matches!(err, RippleError::UnknownSource(ref name) if name == "Gazette"));
        assert_eq!(
            err.to_string(),
            "Crawler or scraper \"Gazette\" does not exist"
        );
    }

    #[tokio::test]
    async fn test_crawl_yields_links_and_page() {
        let (crawler, visited) = crawler(StaticFetcher::new(&[(INDEX, INDEX_HTML)]), true);

        let tasks = crawler.crawl("WSJ", INDEX).await.unwrap();
        assert_eq!(
            tasks,
            vec![
                LinkTask {
                    url: "https://www.wsj.com/articles/covid-19-cases-rise-1".to_string(),
                    action: CrawlAction::Crawl,
                    priority: 1,
                },
                LinkTask {
                    url: "https://www.wsj.com/articles/markets-today-2".to_string(),
                    action: CrawlAction::Crawl,
                    priority: 0,
                },
                LinkTask {
                    url: INDEX.to_string(),
                    action: CrawlAction::Scrape,
                    priority: 0,
                },
            ]
        );
        assert!(visited.exists(INDEX, CrawlAction::Scrape).unwrap());
    }

    #[tokio::test]
    async fn test_crawl_never_yields_a_pair_twice() {
        let (crawler, _) = crawler(StaticFetcher::new(&[(INDEX, INDEX_HTML)]), true);

        assert_eq!(crawler.crawl("WSJ", INDEX).await.unwrap().len(), 3);
        assert!(crawler.crawl("WSJ", INDEX).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_off_topic_page_yields_nothing() {
        let (crawler, visited) = crawler(StaticFetcher::new(&[(INDEX, OFF_TOPIC_HTML)]), true);

        assert!(crawler.crawl("WSJ", INDEX).await.unwrap().is_empty());
        assert!(!visited.exists(INDEX, CrawlAction::Scrape).unwrap());
        assert!(crawler.scrape("WSJ", INDEX).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scrape_extracts_article() {
        let (crawler, _) = crawler(StaticFetcher::new(&[(ARTICLE, ARTICLE_HTML)]), true);

        let doc = crawler.scrape("WSJ", ARTICLE).await.unwrap().unwrap();
        assert_eq!(doc.url, ARTICLE);
        assert_eq!(doc.source, "WSJ");
        assert_eq!(doc.article.title.as_deref(), Some("Cases rise"));
        assert!(doc.article.text.contains("vaccine rollout"));
        assert!(doc.raw_html.contains("<article>"));
    }

    #[tokio::test]
    async fn test_missing_session_fetches_anonymously() {
        let fetcher = Arc::new(StaticFetcher::new(&[(INDEX, INDEX_HTML)]));
        let visited = VisitedStore::new(Arc::new(SqliteCache::new_in_memory().unwrap()));
        let crawler = Crawler::new(
            SourceRegistry::with_defaults(),
            fetcher.clone(),
            Arc::new(ReadabilityExtractor),
            visited,
            &Config::default(),
        );

        let tasks = crawler.crawl("WSJ", INDEX).await.unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(*fetcher.requests.lock().unwrap(), vec![INDEX.to_string()]);
        assert_eq!(*fetcher.sessions.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn test_configured_session_is_sent() {
        let fetcher = Arc::new(StaticFetcher::new(&[(INDEX, INDEX_HTML)]));
        let mut config = Config::default();
        config.sessions.push(SessionEntry {
            source: "WSJ".to_string(),
            cookie: "sid=1".to_string(),
        });
        let visited = VisitedStore::new(Arc::new(SqliteCache::new_in_memory().unwrap()));
        let crawler = Crawler::new(
            SourceRegistry::with_defaults(),
            fetcher.clone(),
            Arc::new(ReadabilityExtractor),
            visited,
            &config,
        );

        crawler.crawl("WSJ", INDEX).await.unwrap();
        assert_eq!(
            *fetcher.sessions.lock().unwrap(),
            vec![Some("sid=1".to_string())]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_crawls_claim_each_link_once() {
        const LINKS: usize = 500;
        let listing: String = (0..LINKS)
            .map(|i| format!(r#"<a href="/journal/en/articles/a-{}">{}</a>"#, i, i))
            .collect();
        let html = format!("<html><body>{}</body></html>", listing);
        let indexes: Vec<String> = (0..4)
            .map(|i| format!("https://iris.paho.org/journal/en/index-{}", i))
            .collect();
        let pages: Vec<(&str, &str)> = indexes
            .iter()
            .map(|url| (url.as_str(), html.as_str()))
            .collect();

        let (crawler, _) = crawler(StaticFetcher::new(&pages), false);
        let crawler = Arc::new(crawler);

        let handles: Vec<_> = indexes
            .iter()
            .cloned()
            .map(|url| {
                let crawler = crawler.clone();
                tokio::spawn(async move { crawler.crawl("COVIDCorpus", &url).await })
            })
            .collect();

        let mut tasks = Vec::new();
        for handle in handles {
            tasks.extend(handle.await.unwrap().unwrap());
        }

        let crawls = tasks
            .iter()
            .filter(|t| t.action == CrawlAction::Crawl)
            .count();
        let scrapes = tasks
            .iter()
            .filter(|t| t.action == CrawlAction::Scrape)
            .count();
        assert_eq!(crawls, LINKS);
        assert_eq!(scrapes, LINKS);
    }

    #[tokio::test]
    async fn test_unknown_source_and_fetch_failure() {
        let (crawler, _) = crawler(StaticFetcher::new(&[]), true);

        assert!(matches!(
            crawler.crawl("Gazette", INDEX).await,
            Err(RippleError::UnknownSource(_))
        ));

        let err = crawler.scrape("WSJ", INDEX).await.err().unwrap();
        assert!(matches!(err, RippleError::Fetch { .. }));
        assert!(err.is_retryable());
    }
}
