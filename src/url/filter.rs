//! URL admission policy: domain allow-list, exclude patterns and extensions

use crate::config::FilterConfig;
use crate::url::host::{extract_domain, matches_wildcard, subdomain_pattern};
use std::fmt;
use url::Url;

/// Why a URL was refused by the filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterReason {
    /// The host is not covered by the allow-list
    DomainNotAllowed(String),
    /// The URL contains an excluded substring
    ExcludedPattern(String),
    /// The path ends with an excluded extension
    ExcludedExtension(String),
    /// The URL has no host
    MissingHost,
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DomainNotAllowed(host) => write!(f, "domain not allowed: {}", host),
            Self::ExcludedPattern(p) => write!(f, "matches exclude pattern: {}", p),
            Self::ExcludedExtension(e) => write!(f, "excluded file type: {}", e),
            Self::MissingHost => f.write_str("missing host"),
        }
    }
}

/// Decides which normalized URLs may enter the frontier
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    allowed_domains: Vec<String>,
    exclude_patterns: Vec<String>,
    exclude_extensions: Vec<String>,
}

impl UrlFilter {
    /// Builds a filter with explicit rules; an empty allow-list admits every host
    pub fn new(
        allowed_domains: Vec<String>,
        exclude_patterns: Vec<String>,
        exclude_extensions: Vec<String>,
    ) -> Self {
        Self {
            allowed_domains: allowed_domains.into_iter().map(|d| d.to_lowercase()).collect(),
            exclude_patterns,
            exclude_extensions: exclude_extensions
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect(),
        }
    }

    /// Builds the filter for a run; without an allow-list the seed host and its
    /// subdomains are the only admitted hosts
    pub fn from_config(config: &FilterConfig, seed: &Url) -> Self {
        let mut allowed = config.allowed_domains.clone();
        if allowed.is_empty() {
            if let Some(host) = extract_domain(seed) {
                allowed.push(subdomain_pattern(&host));
            }
        }
        Self::new(
            allowed,
            config.exclude_patterns.clone(),
            config.exclude_extensions.clone(),
        )
    }

    /// Adds exclude patterns (e.g. ones derived from the intent)
    pub fn extend_excludes<I: IntoIterator<Item = String>>(&mut self, patterns: I) {
        for pattern in patterns {
            if !pattern.is_empty() && !self.exclude_patterns.contains(&pattern) {
                self.exclude_patterns.push(pattern);
            }
        }
    }

    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }

    /// Checks a normalized URL against the policy
    pub fn check(&self, url: &Url) -> Result<(), FilterReason> {
        let host = extract_domain(url).ok_or(FilterReason::MissingHost)?;

        if !self.allowed_domains.is_empty()
            && !self
                .allowed_domains
                .iter()
                .any(|pattern| matches_wildcard(pattern, &host))
        {
            return Err(FilterReason::DomainNotAllowed(host));
        }

        if let Some(pattern) = self
            .exclude_patterns
            .iter()
            .find(|p| url.as_str().contains(p.as_str()))
        {
            return Err(FilterReason::ExcludedPattern(pattern.clone()));
        }

        let path = url.path().to_lowercase();
        if let Some(ext) = self.exclude_extensions.iter().find(|e| path.ends_with(e.as_str())) {
            return Err(FilterReason::ExcludedExtension(ext.clone()));
        }

        Ok(())
    }

    pub fn allows(&self, url: &Url) -> bool {
        self.check(url).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn seed_filter() -> UrlFilter {
        UrlFilter::from_config(&FilterConfig::default(), &url("https://example.edu/"))
    }

    #[test]
    fn test_seed_host_default_allow_list() {
        let filter = seed_filter();
        assert!(filter.allows(&url("https://example.edu/apply")));
        assert!(filter.allows(&url("https://grad.example.edu/apply")));
        assert_eq!(
            filter.check(&url("https://other.org/")),
            Err(FilterReason::DomainNotAllowed("other.org".to_string()))
        );
    }

    #[test]
    fn test_explicit_allow_list() {
        let filter = UrlFilter::new(vec!["example.edu".into(), "*.partner.org".into()], vec![], vec![]);
        assert!(filter.allows(&url("https://example.edu/")));
        assert!(filter.allows(&url("https://a.partner.org/")));
        assert!(!filter.allows(&url("https://www.example.edu/")));
    }

    #[test]
    fn test_empty_allow_list_admits_everything() {
        let filter = UrlFilter::new(vec![], vec![], vec![]);
        assert!(filter.allows(&url("https://anything.example/")));
    }

    #[test]
    fn test_default_exclude_patterns() {
        let filter = seed_filter();
        assert!(matches!(
            filter.check(&url("https://example.edu/login")),
            Err(FilterReason::ExcludedPattern(_))
        ));
        assert!(filter.allows(&url("https://example.edu/research")));
    }

    #[test]
    fn test_default_exclude_extensions() {
        let filter = seed_filter();
        assert_eq!(
            filter.check(&url("https://example.edu/brochure.PDF")),
            Err(FilterReason::ExcludedExtension(".pdf".to_string()))
        );
        assert!(filter.allows(&url("https://example.edu/page.html")));
    }

    #[test]
    fn test_extend_excludes() {
        let mut filter = seed_filter();
        filter.extend_excludes(vec!["/alumni".to_string(), String::new()]);
        assert!(!filter.allows(&url("https://example.edu/alumni/news")));
    }
}
