//! Waiting crawl and scrape jobs kept across restarts
//!
//! Visited markers are written when a link is queued, so a job lost at
//! shutdown could never be queued again. On shutdown every waiting crawl and
//! scrape job is written to the cache list [`FRONTIER_KEY`]; bootstrap moves
//! them back onto their queues.

use super::Queues;
use crate::store::{CacheOp, CacheStore, CrawlAction, StorageResult};
use tracing::{debug, warn};

/// Cache list holding saved jobs, oldest first
pub const FRONTIER_KEY: &str = "frontier";

/// A saved job: `action<TAB>priority<TAB>source<TAB>url`
fn encode(action: CrawlAction, priority: i64, source: &str, url: &str) -> String {
    format!("{}\t{}\t{}\t{}", action.code(), priority, source, url)
}

fn decode(entry: &str) -> Option<(CrawlAction, i64, &str, &str)> {
    let mut parts = entry.splitn(4, '\t');
    let action = CrawlAction::from_code(parts.next()?.parse().ok()?)?;
    let priority = parts.next()?.parse().ok()?;
    let source = parts.next()?;
    let url = parts.next()?;
    Some((action, priority, source, url))
}

/// Writes every waiting crawl and scrape job to the cache in one batch
///
/// # Arguments
///
/// * `cache` - Cache store that outlives the process
/// * `queues` - Queues to snapshot; they should already be closed
///
/// # Returns
///
/// * `Ok(usize)` - Number of jobs saved
/// * `Err(StorageError)` - The batch could not be written; nothing was saved
pub fn save(cache: &dyn CacheStore, queues: &Queues) -> StorageResult<usize> {
    let ops: Vec<CacheOp> = [
        (CrawlAction::Crawl, &queues.crawl),
        (CrawlAction::Scrape, &queues.scrape),
    ]
    .into_iter()
    .flat_map(|(action, queue)| {
        queue.pending().into_iter().map(move |job| CacheOp::LPush {
            key: FRONTIER_KEY.to_string(),
            value: encode(action, job.priority, &job.name, &job.data),
        })
    })
    .collect();

    cache.pipeline(&ops)?;
    debug!("Saved {} waiting jobs", ops.len());
    Ok(ops.len())
}

/// Moves saved jobs back onto their queues, emptying the saved list
///
/// Malformed entries are logged and dropped. Returns the number of jobs
/// restored.
pub fn restore(cache: &dyn CacheStore, queues: &Queues) -> StorageResult<usize> {
    let mut restored = 0;

    while let Some(entry) = cache.rpop(FRONTIER_KEY)? {
        let Some((action, priority, source, url)) = decode(&entry) else {
            warn!("Dropping malformed saved job: {:?}", entry);
            continue;
        };

        let queue = match action {
            CrawlAction::Crawl => &queues.crawl,
            CrawlAction::Scrape => &queues.scrape,
        };
        queue.add(source, url.to_string(), priority);
        restored += 1;
    }

    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::store::SqliteCache;

    fn queues() -> Queues {
        Queues::new(&PipelineConfig {
            job_delay_ms: 0,
            ..PipelineConfig::default()
        })
    }

    #[test]
    fn test_save_then_restore_keeps_routing_and_priority() {
        let cache = SqliteCache::new_in_memory().unwrap();
        let before = queues();
        before
            .crawl
            .add("WSJ", "https://www.wsj.com/news/health".to_string(), -1);
        before
            .crawl
            .add("WSJ", "https://www.wsj.com/news/markets".to_string(), 0);
        before.scrape.add(
            "COVIDCorpus",
            "https://iris.paho.org/journal/en/articles/masks".to_string(),
            0,
        );

        assert_eq!(save(&cache, &before).unwrap(), 3);
        assert_eq!(cache.llen(FRONTIER_KEY).unwrap(), 3);

        let after = queues();
        assert_eq!(restore(&cache, &after).unwrap(), 3);
        assert_eq!(cache.llen(FRONTIER_KEY).unwrap(), 0);

        let crawl: Vec<(String, String, i64)> = after
            .crawl
            .pending()
            .into_iter()
            .map(|job| (job.name, job.data, job.priority))
            .collect();
        assert_eq!(
            crawl,
            vec![
                ("WSJ".to_string(), "https://www.wsj.com/news/health".to_string(), -1),
                ("WSJ".to_string(), "https://www.wsj.com/news/markets".to_string(), 0),
            ]
        );

        let scrape = after.scrape.pending();
        assert_eq!(scrape.len(), 1);
        assert_eq!(scrape[0].name, "COVIDCorpus");
        assert_eq!(scrape[0].data, "https://iris.paho.org/journal/en/articles/masks");
    }

    #[test]
    fn test_restore_drops_malformed_entries() {
        let cache = SqliteCache::new_in_memory().unwrap();
        cache.lpush(FRONTIER_KEY, "9\t0\tWSJ\thttps://a").unwrap();
        cache.lpush(FRONTIER_KEY, "garbage").unwrap();
        cache
            .lpush(FRONTIER_KEY, &encode(CrawlAction::Scrape, 0, "WSJ", "https://b"))
            .unwrap();

        let q = queues();
        assert_eq!(restore(&cache, &q).unwrap(), 1);
        assert_eq!(q.scrape.pending()[0].data, "https://b");
        assert!(q.crawl.is_empty());
    }

    #[test]
    fn test_url_with_tab_survives() {
        let entry = encode(CrawlAction::Crawl, 1, "NYTimes", "https://x/a\tb");
        assert_eq!(
            decode(&entry),
            Some((CrawlAction::Crawl, 1, "NYTimes", "https://x/a\tb"))
        );
    }
}
