use crate::config::types::{
    ChunkingConfig, Config, CrawlConfig, FetchConfig, FilterConfig, ModelConfig, OutputConfig,
};
use crate::url::matches_wildcard;
use crate::ConfigError;
use url::Url;

/// Upper bound on `max-depth`
pub const MAX_DEPTH_LIMIT: u32 = 32;

/// Upper bound on `workers`
pub const MAX_WORKERS: u32 = 32;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let seed = validate_crawl_config(&config.crawl)?;
    validate_filter_config(&config.filter, &seed)?;
    validate_fetch_config(&config.fetch)?;
    validate_chunking_config(&config.chunking)?;
    validate_model_config(&config.model)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the seed, intent and budgets, returning the parsed seed URL
fn validate_crawl_config(config: &CrawlConfig) -> Result<Url, ConfigError> {
    if config.seed_url.trim().is_empty() {
        return Err(ConfigError::Validation(
            "seed-url cannot be empty".to_string(),
        ));
    }

    let seed = Url::parse(config.seed_url.trim())
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed-url '{}': {}", config.seed_url, e)))?;

    if seed.scheme() != "http" && seed.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "seed-url '{}' must use http or https",
            config.seed_url
        )));
    }

    if seed.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "seed-url '{}' has no host",
            config.seed_url
        )));
    }

    if config.intent.trim().is_empty() {
        return Err(ConfigError::Validation("intent cannot be empty".to_string()));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max-pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.max_depth > MAX_DEPTH_LIMIT {
        return Err(ConfigError::Validation(format!(
            "max-depth must be <= {}, got {}",
            MAX_DEPTH_LIMIT, config.max_depth
        )));
    }

    if config.workers < 1 || config.workers > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and {}, got {}",
            MAX_WORKERS, config.workers
        )));
    }

    if config.max_consecutive_failures < 1 {
        return Err(ConfigError::Validation(format!(
            "max-consecutive-failures must be >= 1, got {}",
            config.max_consecutive_failures
        )));
    }

    Ok(seed)
}

/// Validates domain patterns and checks the seed is admissible under them
fn validate_filter_config(config: &FilterConfig, seed: &Url) -> Result<(), ConfigError> {
    for pattern in &config.allowed_domains {
        validate_domain_pattern(pattern)?;
    }

    if config.exclude_patterns.iter().any(|p| p.is_empty()) {
        return Err(ConfigError::InvalidPattern(
            "exclude-patterns cannot contain an empty pattern".to_string(),
        ));
    }

    for ext in &config.exclude_extensions {
        if !ext.starts_with('.') || ext.len() < 2 {
            return Err(ConfigError::InvalidPattern(format!(
                "exclude-extensions entry '{}' must look like '.ext'",
                ext
            )));
        }
    }

    // A seed the frontier would reject leaves nothing to crawl
    let host = seed.host_str().unwrap_or_default().to_lowercase();
    if !config.allowed_domains.is_empty()
        && !config
            .allowed_domains
            .iter()
            .any(|pattern| matches_wildcard(&pattern.to_lowercase(), &host))
    {
        return Err(ConfigError::Validation(format!(
            "seed host '{}' is not covered by allowed-domains",
            host
        )));
    }

    if let Some(pattern) = config
        .exclude_patterns
        .iter()
        .find(|p| seed.as_str().contains(p.as_str()))
    {
        return Err(ConfigError::Validation(format!(
            "seed-url matches exclude pattern '{}'",
            pattern
        )));
    }

    let path = seed.path().to_lowercase();
    if let Some(ext) = config
        .exclude_extensions
        .iter()
        .find(|ext| path.ends_with(&ext.to_lowercase()))
    {
        return Err(ConfigError::Validation(format!(
            "seed-url has excluded extension '{}'",
            ext
        )));
    }

    Ok(())
}

/// Validates fetch configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "fetch timeout-secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "fetch max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates chunk parameters
fn validate_chunking_config(config: &ChunkingConfig) -> Result<(), ConfigError> {
    if config.chunk_size == 0 {
        return Err(ConfigError::Validation(
            "chunk-size must be >= 1".to_string(),
        ));
    }

    if config.overlap >= config.chunk_size {
        return Err(ConfigError::Validation(format!(
            "overlap ({}) must be smaller than chunk-size ({})",
            config.overlap, config.chunk_size
        )));
    }

    Ok(())
}

/// Validates model configuration
fn validate_model_config(config: &ModelConfig) -> Result<(), ConfigError> {
    Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid model endpoint: {}", e)))?;

    for (name, model) in [
        ("intent-model", &config.intent_model),
        ("classifier-model", &config.classifier_model),
        ("analyzer-model", &config.analyzer_model),
    ] {
        if model.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "model timeout-secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "model max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if !(0.0..=2.0).contains(&config.temperature) {
        return Err(ConfigError::Validation(format!(
            "temperature must be between 0 and 2, got {}",
            config.temperature
        )));
    }

    if !(0.0..=1.0).contains(&config.relevance_threshold) {
        return Err(ConfigError::Validation(format!(
            "relevance-threshold must be between 0 and 1, got {}",
            config.relevance_threshold
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.data_dir.is_empty() {
        return Err(ConfigError::Validation(
            "data-dir cannot be empty".to_string(),
        ));
    }

    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.report_path.is_empty() {
        return Err(ConfigError::Validation(
            "report-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a domain pattern (supports wildcards)
pub(crate) fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    if let Some(domain) = pattern.strip_prefix("*.") {
        validate_domain_string(domain)
    } else {
        validate_domain_string(pattern)
    }
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    // "localhost" is the one dotless host worth allowing
    if !domain.contains('.') && domain != "localhost" {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}
