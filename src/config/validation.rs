use crate::config::types::{
    Config, IndexerConfig, PipelineConfig, SeedEntry, SessionEntry, StoreConfig, TopicConfig,
};
use crate::source::SOURCE_NAMES;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_store_config(&config.store)?;
    validate_pipeline_config(&config.pipeline)?;
    validate_indexer_config(&config.indexer)?;
    validate_topic_config(&config.topic)?;
    validate_seeds(&config.seeds)?;
    validate_sessions(&config.sessions)?;
    Ok(())
}

fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.cache_path.is_empty() {
        return Err(ConfigError::Validation(
            "cache_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates queue and worker pool settings
fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    let pools = [
        ("crawl_workers", config.crawl_workers),
        ("scrape_workers", config.scrape_workers),
        ("tokenize_workers", config.tokenize_workers),
        ("index_workers", config.index_workers),
    ];

    for (name, count) in pools {
        if count < 1 || count > 64 {
            return Err(ConfigError::Validation(format!(
                "{} must be between 1 and 64, got {}",
                name, count
            )));
        }
    }

    if config.retry_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "retry_attempts must be >= 1, got {}",
            config.retry_attempts
        )));
    }

    if config.reconcile_batch < 1 {
        return Err(ConfigError::Validation(
            "reconcile_batch must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_indexer_config(config: &IndexerConfig) -> Result<(), ConfigError> {
    if config.idf_lock_ttl_secs < 1 {
        return Err(ConfigError::Validation(
            "idf_lock_ttl_secs must be >= 1".to_string(),
        ));
    }

    if config.idf_quiescence_secs < 1 {
        return Err(ConfigError::Validation(
            "idf_quiescence_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_topic_config(config: &TopicConfig) -> Result<(), ConfigError> {
    if config.keywords.is_empty() {
        return Err(ConfigError::Validation(
            "topic keywords cannot be empty".to_string(),
        ));
    }

    if config.keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "topic keywords cannot contain blank entries".to_string(),
        ));
    }

    Ok(())
}

/// Validates bootstrap seeds: known source, absolute http(s) URL
fn validate_seeds(seeds: &[SeedEntry]) -> Result<(), ConfigError> {
    for seed in seeds {
        validate_source_name(&seed.source)?;

        let url = Url::parse(&seed.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed.url, e))
        })?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use HTTP or HTTPS scheme",
                seed.url
            )));
        }
    }

    Ok(())
}

fn validate_sessions(sessions: &[SessionEntry]) -> Result<(), ConfigError> {
    for session in sessions {
        validate_source_name(&session.source)?;

        if session.cookie.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Session cookie for '{}' cannot be empty",
                session.source
            )));
        }
    }

    Ok(())
}

fn validate_source_name(name: &str) -> Result<(), ConfigError> {
    if !SOURCE_NAMES.contains(&name) {
        return Err(ConfigError::Validation(format!(
            "Unknown source '{}', expected one of: {}",
            name,
            SOURCE_NAMES.join(", ")
        )));
    }
    Ok(())
}
