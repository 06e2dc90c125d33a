//! Ripple-Index main entry point
//!
//! This is the command-line interface for the Ripple-Index crawl, index and
//! search engine.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use ripple_index::config::{load_config_with_hash, Config};
use ripple_index::{Context, Pipeline};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Ripple-Index: a topical crawl, index and search engine
///
/// Ripple-Index follows links on registered news sources, keeps the articles
/// that match its topic, indexes them with TF-IDF and answers ranked search
/// queries over the collected corpus.
#[derive(Parser, Debug)]
#[command(name = "ripple-index")]
#[command(version)]
#[command(about = "A topical crawl, index and search engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline workers and the idf roller until Ctrl-C
    Run,

    /// Print documents ranked against a query
    Search {
        #[arg(required = true)]
        query: Vec<String>,

        /// Show at most this many results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print the number of stored documents
    NumDocs,

    /// Rebuild the corpus profile from one source's documents
    RebuildCorpus {
        #[arg(long, default_value = "COVIDCorpus")]
        source: String,
    },

    /// Validate the configuration and print the effective settings
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    match cli.command {
        Command::Check => handle_check(&config),
        Command::Run => handle_run(config).await,
        Command::Search { query, limit } => handle_search(config, &query.join(" "), limit),
        Command::NumDocs => {
            let ctx = Context::open(config)?;
            println!("{}", ctx.search_engine().num_docs()?);
            Ok(())
        }
        Command::RebuildCorpus { source } => {
            let ctx = Context::open(config)?;
            let terms = ctx.indexer.rebuild_corpus_profile(&source)?;
            println!("Corpus profile rebuilt from {}: {} terms", source, terms);
            Ok(())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ripple_index=info,warn"),
            1 => EnvFilter::new("ripple_index=debug,info"),
            2 => EnvFilter::new("ripple_index=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles `check`: prints what a run would use
fn handle_check(config: &Config) -> anyhow::Result<()> {
    println!("=== Ripple-Index Configuration ===\n");

    println!("Stores:");
    println!("  Documents: {}", config.store.database_path);
    println!("  Cache: {}", config.store.cache_path);

    println!("\nFetching:");
    println!("  User agent: {}", config.fetch.user_agent);
    println!("  Timeout: {}s", config.fetch.timeout_secs);
    println!("  Settle time: {}ms", config.fetch.settle_ms);

    let pipeline = &config.pipeline;
    println!("\nPipeline:");
    println!("  Job delay: {}ms", pipeline.job_delay_ms);
    println!(
        "  Retries: {} attempts, {}ms apart (crawl jobs never retry)",
        pipeline.retry_attempts, pipeline.retry_delay_ms
    );
    let workers = &config.workers;
    for (stage, enabled, count) in [
        ("crawl", workers.crawl, pipeline.crawl_workers),
        ("scrape", workers.scrape, pipeline.scrape_workers),
        ("tokenize", workers.tokenize, pipeline.tokenize_workers),
        ("index", workers.index, pipeline.index_workers),
    ] {
        if enabled {
            println!("  {} workers: {}", stage, count);
        } else {
            println!("  {} workers: disabled", stage);
        }
    }

    println!("\nIndexer:");
    println!("  idf quiescence: {}s", config.indexer.idf_quiescence_secs);
    println!("  idf lock TTL: {}s", config.indexer.idf_lock_ttl_secs);

    println!("\nTopic keywords: {}", config.topic.keywords.join(", "));

    let seeds = config.effective_seeds();
    println!("\nSeeds ({}):", seeds.len());
    for seed in &seeds {
        println!("  - [{}] {}", seed.source, seed.url);
    }

    println!("\nSessions ({}):", config.sessions.len());
    for session in &config.sessions {
        println!("  - {}", session.source);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles `run`: bootstraps the queues and processes jobs until Ctrl-C
async fn handle_run(config: Config) -> anyhow::Result<()> {
    let ctx = Context::open(config)?;
    let crawler = ctx.http_crawler()?;
    let mut pipeline = Pipeline::new(&ctx, crawler);

    let bootstrap = pipeline.bootstrap()?;
    tracing::info!("Bootstrap: {:?}", bootstrap);

    pipeline.start();
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Interrupt received");

    pipeline.shutdown().await;
    ctx.close();
    Ok(())
}

/// Handles `search`: prints ranked results
fn handle_search(config: Config, query: &str, limit: Option<usize>) -> anyhow::Result<()> {
    let ctx = Context::open(config)?;
    let mut results = ctx.search_engine().search(query)?;
    if let Some(limit) = limit {
        results.truncate(limit);
    }

    if results.is_empty() {
        println!("No results for \"{}\"", query);
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{:>3}. [{:.4}] {}",
            rank + 1,
            result.score,
            result.title.as_deref().unwrap_or("(untitled)")
        );
        println!("     {} ({})", result.url, result.source);
        if let Some(description) = &result.description {
            println!("     {}", description);
        }
    }
    Ok(())
}
