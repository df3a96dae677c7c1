use serde::Deserialize;

/// Main configuration structure for a crawl run
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub politeness: PolitenessConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Seed, intent and budget for one crawl
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// URL the crawl starts from (depth 0, priority 1)
    #[serde(rename = "seed-url")]
    pub seed_url: String,

    /// Free-text description of what the crawl is looking for
    pub intent: String,

    /// Maximum number of pages fetched in one run
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Maximum link depth from the seed
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Number of pages processed concurrently
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Skip deep analysis for pages the classifier marks irrelevant
    #[serde(rename = "skip-irrelevant", default = "default_true")]
    pub skip_irrelevant: bool,

    /// Consecutive pages with unreachable backends before the run aborts
    #[serde(
        rename = "max-consecutive-failures",
        default = "default_max_consecutive_failures"
    )]
    pub max_consecutive_failures: u32,
}

/// URL admission policy for the frontier
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    /// Domain patterns (e.g. "example.edu" or "*.example.edu"); empty means the seed host
    #[serde(rename = "allowed-domains", default)]
    pub allowed_domains: Vec<String>,

    /// Substrings that exclude a URL
    #[serde(rename = "exclude-patterns", default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Path extensions that exclude a URL
    #[serde(rename = "exclude-extensions", default = "default_exclude_extensions")]
    pub exclude_extensions: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            allowed_domains: Vec::new(),
            exclude_patterns: default_exclude_patterns(),
            exclude_extensions: default_exclude_extensions(),
        }
    }
}

/// Which fetch strategy backs the crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// Plain HTTP client
    Http,
    /// Headless Chromium
    Browser,
}

/// Page fetch settings
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_strategy")]
    pub strategy: FetchStrategy,

    /// Per-attempt timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Total attempts for transient failures
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff between attempts (milliseconds), doubled per attempt
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            timeout_secs: default_fetch_timeout(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
            user_agent: default_user_agent(),
        }
    }
}

/// Per-domain rate limiting
#[derive(Debug, Clone, Deserialize)]
pub struct PolitenessConfig {
    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "min-domain-interval-ms", default = "default_domain_interval")]
    pub min_domain_interval_ms: u64,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            min_domain_interval_ms: default_domain_interval(),
        }
    }
}

/// Text chunking for bounded-context analysis
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    #[serde(rename = "chunk-size", default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared with the previous chunk
    #[serde(default = "default_overlap")]
    pub overlap: usize,

    /// Maximum analyzer calls per page; 0 analyzes every chunk
    #[serde(rename = "max-chunks-per-page", default = "default_max_chunks")]
    pub max_chunks_per_page: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            max_chunks_per_page: default_max_chunks(),
        }
    }
}

/// Language model endpoint and model selection
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Base URL of the Ollama server
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(rename = "intent-model", default = "default_large_model")]
    pub intent_model: String,

    #[serde(rename = "classifier-model", default = "default_small_model")]
    pub classifier_model: String,

    #[serde(rename = "analyzer-model", default = "default_large_model")]
    pub analyzer_model: String,

    /// Per-call timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_model_timeout")]
    pub timeout_secs: u64,

    /// Total attempts for transient failures
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Keyword score at or above which the fallback classifier calls a page relevant
    #[serde(rename = "relevance-threshold", default = "default_relevance_threshold")]
    pub relevance_threshold: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            intent_model: default_large_model(),
            classifier_model: default_small_model(),
            analyzer_model: default_large_model(),
            timeout_secs: default_model_timeout(),
            max_attempts: default_max_attempts(),
            temperature: default_temperature(),
            relevance_threshold: default_relevance_threshold(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Root directory of the layered store
    #[serde(rename = "data-dir", default = "default_data_dir")]
    pub data_dir: String,

    /// Path to the SQLite run ledger
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,

    /// Path to the markdown report
    #[serde(rename = "report-path", default = "default_report_path")]
    pub report_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_path: default_database_path(),
            report_path: default_report_path(),
        }
    }
}

fn default_max_pages() -> u32 {
    50
}

fn default_max_depth() -> u32 {
    2
}

fn default_workers() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_exclude_patterns() -> Vec<String> {
    [
        "/login",
        "/logout",
        "/signin",
        "/signup",
        "/search",
        "/cart",
        "/checkout",
        "/calendar",
        "/sitemap",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_exclude_extensions() -> Vec<String> {
    [
        ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".rar", ".tar", ".gz",
        ".7z", ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".svg", ".ico", ".webp", ".mp3", ".mp4",
        ".avi", ".mov", ".wmv", ".flv", ".wav", ".exe", ".msi", ".dmg", ".apk", ".deb", ".rpm",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_strategy() -> FetchStrategy {
    FetchStrategy::Http
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    2000
}

fn default_user_agent() -> String {
    format!("intent-crawler/{}", env!("CARGO_PKG_VERSION"))
}

fn default_domain_interval() -> u64 {
    1000
}

fn default_chunk_size() -> usize {
    1000
}

fn default_overlap() -> usize {
    200
}

fn default_max_chunks() -> usize {
    0
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_large_model() -> String {
    "qwen3:1.7b".to_string()
}

fn default_small_model() -> String {
    "qwen3:0.6b".to_string()
}

fn default_model_timeout() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.2
}

fn default_relevance_threshold() -> f64 {
    0.2
}

fn default_data_dir() -> String {
    "./crawl_data".to_string()
}

fn default_database_path() -> String {
    "./crawl_data/ledger.db".to_string()
}

fn default_report_path() -> String {
    "./crawl_data/report.md".to_string()
}
