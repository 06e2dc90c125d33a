//! Integration tests for the pipeline
//!
//! These tests serve a small article corpus from a wiremock server and run
//! the full crawl → scrape → index cycle over real HTTP, then query it.

use ripple_index::config::parse_config;
use ripple_index::indexer::IDF_QUEUE_KEY;
use ripple_index::pipeline::Bootstrap;
use ripple_index::store::{CacheStore, CrawlAction, DocumentStore};
use ripple_index::{Config, Context, Pipeline};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration seeded with the corpus index page
fn create_test_config(base_url: &str, dir: &TempDir) -> Config {
    let toml = format!(
        r#"
[store]
database-path = "{db}"
cache-path = "{cache}"

[fetch]
timeout-secs = 5

[pipeline]
job-delay-ms = 0
retry-attempts = 2
retry-delay-ms = 0
scrape-workers = 2

[indexer]
idf-quiescence-secs = 1

[[seed]]
source = "COVIDCorpus"
url = "{base}/journal/en/index"
"#,
        db = dir.path().join("docs.db").display(),
        cache = dir.path().join("cache.db").display(),
        base = base_url,
    );
    parse_config(&toml).expect("Failed to parse test config")
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html")
}

/// Mounts the index page and three articles
async fn mount_corpus(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/journal/en/index"))
        .respond_with(html(
            r#"<html><body>
                <a href="/journal/en/articles/masks">Masks</a>
                <a href="/journal/en/articles/vaccines">Vaccines</a>
                <a href="/journal/en/articles/ventilation">Ventilation</a>
                <a href="/journal/en/about">About</a>
            </body></html>"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/journal/en/articles/masks"))
        .respond_with(html(
            r#"<html><head>
                <title>Masks and transmission</title>
                <meta property="og:site_name" content="Pan American Journal">
            </head><body><article>
                <p>Masks reduce transmission in crowded rooms.</p>
                <p>Wearing masks indoors lowers infection rates.</p>
            </article></body></html>"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/journal/en/articles/vaccines"))
        .respond_with(html(
            r#"<html><head><title>Vaccine trials</title></head><body><article>
                <p>Vaccine trials show strong protection against severe illness.</p>
                <p>Masks remain advised in hospitals.</p>
            </article></body></html>"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/journal/en/articles/ventilation"))
        .respond_with(html(
            r#"<html><head><title>Ventilation</title></head><body><article>
                <p>Opening windows improves ventilation in schools.</p>
            </article></body></html>"#,
        ))
        .mount(server)
        .await;
}

async fn wait_idle(pipeline: &Pipeline) {
    for _ in 0..500 {
        if pipeline.queues().is_idle() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Pipeline did not drain");
}

async fn run_to_idle(ctx: &Context) -> Bootstrap {
    let crawler = ctx.http_crawler().expect("Failed to build crawler");
    let mut pipeline = Pipeline::new(ctx, crawler);
    let bootstrap = pipeline.bootstrap().expect("Bootstrap failed");
    pipeline.start();
    wait_idle(&pipeline).await;
    pipeline.shutdown().await;
    bootstrap
}

#[tokio::test]
async fn test_full_pipeline_over_http() {
    let mock_server = MockServer::start().await;
    mount_corpus(&mock_server).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir);

    let ctx = Context::open(config).unwrap();
    assert_eq!(run_to_idle(&ctx).await, Bootstrap::Seeded(1));

    assert_eq!(ctx.documents.count_documents().unwrap(), 3);
    assert!(ctx.documents.find_missing_tfidf().unwrap().is_empty());

    // Both articles mentioning masks match; ventilation does not
    let results = ctx.search_engine().search("masks").unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].score >= results[1].score);
    assert!(results.iter().all(|r| r.source == "COVIDCorpus"));

    let masks = results
        .iter()
        .find(|r| r.url.ends_with("/journal/en/articles/masks"))
        .expect("masks article missing from results");
    assert_eq!(masks.title.as_deref(), Some("Masks and transmission"));
    assert_eq!(masks.site_name.as_deref(), Some("Pan American Journal"));
    assert!(results
        .iter()
        .any(|r| r.url.ends_with("/journal/en/articles/vaccines")));

    let article_url = format!("{}/journal/en/articles/masks", mock_server.uri());
    assert!(ctx.visited.exists(&article_url, CrawlAction::Scrape).unwrap());
}

#[tokio::test]
async fn test_restart_does_not_rescrape() {
    let mock_server = MockServer::start().await;
    mount_corpus(&mock_server).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir);

    let ctx = Context::open(config.clone()).unwrap();
    run_to_idle(&ctx).await;
    ctx.close();

    // Stores survive the restart; nothing is missing a vector
    let ctx = Context::open(config).unwrap();
    assert_eq!(run_to_idle(&ctx).await, Bootstrap::Healed(0));
    assert_eq!(ctx.documents.count_documents().unwrap(), 3);
}

#[tokio::test]
async fn test_restart_resumes_waiting_scrapes() {
    let mock_server = MockServer::start().await;
    mount_corpus(&mock_server).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir);

    // First run crawls but leaves every article waiting in the scrape queue
    let mut crawl_only = config.clone();
    crawl_only.workers.scrape = false;
    let ctx = Context::open(crawl_only).unwrap();
    let mut pipeline = Pipeline::new(&ctx, ctx.http_crawler().unwrap());
    assert_eq!(pipeline.bootstrap().unwrap(), Bootstrap::Seeded(1));
    pipeline.start();
    for _ in 0..500 {
        if pipeline.queues().crawl.is_idle() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(pipeline.queues().scrape.len(), 3);
    pipeline.shutdown().await;
    assert_eq!(ctx.documents.count_documents().unwrap(), 0);
    ctx.close();

    let ctx = Context::open(config).unwrap();
    run_to_idle(&ctx).await;
    assert_eq!(ctx.documents.count_documents().unwrap(), 3);
    assert_eq!(ctx.search_engine().search("masks").unwrap().len(), 2);
}

#[tokio::test]
async fn test_idf_roll_drains_pending_terms() {
    let mock_server = MockServer::start().await;
    mount_corpus(&mock_server).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir);

    let ctx = Context::open(config).unwrap();
    let crawler = ctx.http_crawler().unwrap();
    let mut pipeline = Pipeline::new(&ctx, crawler);
    pipeline.bootstrap().unwrap();
    pipeline.start();
    wait_idle(&pipeline).await;

    let mut pending = ctx.cache.llen(IDF_QUEUE_KEY).unwrap();
    for _ in 0..300 {
        if pending == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        pending = ctx.cache.llen(IDF_QUEUE_KEY).unwrap();
    }
    assert_eq!(pending, 0);

    // Every vector holding "mask" carries the same, latest idf
    let idfs: Vec<f64> = ctx
        .documents
        .find_by_source("COVIDCorpus")
        .unwrap()
        .iter()
        .filter_map(|doc| doc.tfidf.as_ref()?.get("mask").map(|w| w.idf))
        .collect();
    assert_eq!(idfs.len(), 2);
    assert!((idfs[0] - idfs[1]).abs() < 1e-12);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_failing_article_is_retried_then_dropped() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/journal/en/index"))
        .respond_with(html(
            r#"<html><body><a href="/journal/en/articles/broken">Broken</a></body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    // One crawl attempt plus two scrape attempts
    Mock::given(method("GET"))
        .and(path("/journal/en/articles/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let ctx = Context::open(create_test_config(&mock_server.uri(), &dir)).unwrap();
    run_to_idle(&ctx).await;

    assert_eq!(ctx.documents.count_documents().unwrap(), 0);
}
