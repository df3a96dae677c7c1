//! intent-crawler: an intent-guided web crawler
//!
//! Given a seed URL and a natural-language goal, this crate repeatedly fetches
//! pages, extracts readable content, asks a language model how relevant each
//! page is and which links deserve a visit, and schedules those links on a
//! priority frontier until the page or depth budget runs out. Everything it
//! learns lands in a layered store (raw markup, processed documents and model
//! judgments, final report).

pub mod chunking;
pub mod config;
pub mod crawler;
pub mod intent;
pub mod model;
pub mod output;
pub mod retry;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Extraction error: {0}")]
    Extract(#[from] crawler::ExtractError),

    #[error("Model error: {0}")]
    Model(#[from] model::ModelError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: state::RunPhase,
        to: state::RunPhase,
    },

    #[error("External backend unreachable for {consecutive} consecutive pages (last error: {last_error})")]
    FatalExternal { consecutive: u32, last_error: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlerError {
    /// Maps this error onto the crawl error taxonomy
    ///
    /// Page-level errors (`TransientExternal`, `PermanentSkip`) never stop a run;
    /// run-level errors (`ConfigurationError`, `FatalExternal`) do.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Config(_) => ErrorClass::ConfigurationError,
            Self::Url(_) | Self::Extract(_) => ErrorClass::PermanentSkip,
            Self::Fetch(e) => e.class(),
            Self::Model(e) => e.class(),
            Self::FatalExternal { .. } => ErrorClass::FatalExternal,
            Self::InvalidTransition { .. } => ErrorClass::ConfigurationError,
            Self::Storage(_) | Self::Output(_) | Self::Database(_) | Self::Io(_) => {
                ErrorClass::PermanentSkip
            }
        }
    }
}

/// Error taxonomy shared by every stage of a crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Network or timeout failure on a fetch or model call; retried with backoff
    TransientExternal,
    /// The page cannot be used; it is marked failed and the crawl continues
    PermanentSkip,
    /// Invalid run parameters; the run fails before crawling starts
    ConfigurationError,
    /// A backend stayed unreachable across consecutive pages; the run aborts
    FatalExternal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientExternal => "transient_external",
            Self::PermanentSkip => "permanent_skip",
            Self::ConfigurationError => "configuration_error",
            Self::FatalExternal => "fatal_external",
        }
    }

    /// Returns true if the run must stop
    pub fn is_run_level(&self) -> bool {
        matches!(self, Self::ConfigurationError | Self::FatalExternal)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Frontier, FrontierEntry, Orchestrator, Priority};
pub use intent::IntentProfile;
pub use state::{RunPhase, VisitStatus, VisitedRecord};
pub use url::{extract_domain, normalize_url, url_key};
