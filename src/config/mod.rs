//! Configuration module
//!
//! Loads, parses and validates the TOML run configuration. Every section
//! except `[crawl]` is optional and falls back to defaults.
//!
//! # Example
//!
//! ```no_run
//! use intent_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawl.toml")).unwrap();
//! println!("Crawling {} for '{}'", config.crawl.seed_url, config.crawl.intent);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    ChunkingConfig, Config, CrawlConfig, FetchConfig, FetchStrategy, FilterConfig, ModelConfig,
    OutputConfig, PolitenessConfig,
};

pub use parser::{
    compute_config_hash, hash_config_text, load_config, load_config_with_hash, parse_config,
};
pub use validation::{validate, MAX_DEPTH_LIMIT, MAX_WORKERS};
