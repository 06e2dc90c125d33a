//! Configuration module for Ripple-Index
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use ripple_index::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("ripple.toml")).unwrap();
//! println!("Index workers: {}", config.pipeline.index_workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    default_seeds, Config, FetchConfig, IndexerConfig, PipelineConfig, SeedEntry, SessionEntry,
    StoreConfig, TopicConfig, WorkersConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
