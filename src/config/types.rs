use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Ripple-Index
///
/// Every section has defaults, so an empty file yields a runnable configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub fetch: FetchConfig,
    pub pipeline: PipelineConfig,
    pub workers: WorkersConfig,
    pub indexer: IndexerConfig,
    pub topic: TopicConfig,
    #[serde(rename = "seed")]
    pub seeds: Vec<SeedEntry>,
    #[serde(rename = "session")]
    pub sessions: Vec<SessionEntry>,
}

impl Config {
    /// Seed entries used when the primary store is empty
    ///
    /// Falls back to the built-in seed list when the file declares none.
    pub fn effective_seeds(&self) -> Vec<SeedEntry> {
        if self.seeds.is_empty() {
            default_seeds()
        } else {
            self.seeds.clone()
        }
    }

    /// Looks up the configured session cookie for a source
    pub fn session_cookie(&self, source: &str) -> Option<&str> {
        self.sessions
            .iter()
            .find(|s| s.source == source)
            .map(|s| s.cookie.as_str())
    }
}

/// Locations of the primary store and the cache store
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite document database
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the SQLite cache database (dedup markers, idf staging, locks)
    #[serde(rename = "cache-path")]
    pub cache_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: "./ripple.db".to_string(),
            cache_path: "./ripple-cache.db".to_string(),
        }
    }
}

/// Page fetching configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Time to let a fetched page settle before it is evaluated (milliseconds)
    #[serde(rename = "settle-ms")]
    pub settle_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("ripple-index/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            settle_ms: 0,
        }
    }
}

/// Queue and worker pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fixed throttle delay applied to every enqueued job (milliseconds)
    #[serde(rename = "job-delay-ms")]
    pub job_delay_ms: u64,

    /// Attempts for scrape, tokenize and index jobs (crawl jobs never retry)
    #[serde(rename = "retry-attempts")]
    pub retry_attempts: u32,

    /// Delay before a failed job becomes available again (milliseconds)
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    #[serde(rename = "crawl-workers")]
    pub crawl_workers: usize,

    #[serde(rename = "scrape-workers")]
    pub scrape_workers: usize,

    #[serde(rename = "tokenize-workers")]
    pub tokenize_workers: usize,

    #[serde(rename = "index-workers")]
    pub index_workers: usize,

    /// Number of visited markers written per batch during start-up reconciliation
    #[serde(rename = "reconcile-batch")]
    pub reconcile_batch: usize,
}

impl PipelineConfig {
    pub fn job_delay(&self) -> Duration {
        Duration::from_millis(self.job_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            job_delay_ms: 5_000,
            retry_attempts: 3,
            retry_delay_ms: 5_000,
            crawl_workers: 1,
            scrape_workers: 1,
            tokenize_workers: 1,
            index_workers: 1,
            reconcile_batch: 1_000,
        }
    }
}

/// Which pipeline stages run in this process
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub crawl: bool,
    pub scrape: bool,
    pub tokenize: bool,
    pub index: bool,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            crawl: true,
            scrape: true,
            tokenize: true,
            index: true,
        }
    }
}

/// Corpus-wide idf roll configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Wait before retrying an idle or skipped roll cycle (seconds)
    #[serde(rename = "idf-quiescence-secs")]
    pub idf_quiescence_secs: u64,

    /// Expiry of the roll lock (seconds)
    #[serde(rename = "idf-lock-ttl-secs")]
    pub idf_lock_ttl_secs: u64,
}

impl IndexerConfig {
    pub fn quiescence(&self) -> Duration {
        Duration::from_secs(self.idf_quiescence_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.idf_lock_ttl_secs)
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            idf_quiescence_secs: 30,
            idf_lock_ttl_secs: 30,
        }
    }
}

/// Topical keyword list used to prioritise discovered links
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub keywords: Vec<String>,
}

impl TopicConfig {
    /// Case-insensitive substring match of any keyword against a URL
    pub fn matches_url(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        self.keywords
            .iter()
            .any(|keyword| url.contains(&keyword.to_lowercase()))
    }
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            keywords: vec![
                "covid-19".to_string(),
                "coronavirus".to_string(),
                "omicron".to_string(),
            ],
        }
    }
}

/// A bootstrap seed: which source crawls which starting page
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SeedEntry {
    pub source: String,
    pub url: String,
}

/// Cookie header sent with every request made on behalf of a source
#[derive(Debug, Clone, Deserialize)]
pub struct SessionEntry {
    pub source: String,
    pub cookie: String,
}

/// Known-topical starting pages, one per news source
pub fn default_seeds() -> Vec<SeedEntry> {
    [
        (
            "Economist",
            "https://www.economist.com/science-and-technology/2021/11/28/what-to-do-about-covid-19s-threatening-new-variant",
        ),
        (
            "WSJ",
            "https://www.wsj.com/articles/as-omicron-threat-looms-delta-variant-pushes-covid-19-cases-higher-11638633600",
        ),
        (
            "NYTimes",
            "https://www.nytimes.com/2021/12/03/us/coronavirus-omicron-sequencing.html",
        ),
    ]
    .into_iter()
    .map(|(source, url)| SeedEntry {
        source: source.to_string(),
        url: url.to_string(),
    })
    .collect()
}
