use url::Url;

/// Extracts the lowercase host of a URL, if it has one
///
/// # Examples
///
/// ```
/// use url::Url;
/// use intent_crawler::url::extract_domain;
///
/// let url = Url::parse("https://Admissions.Example.EDU:8443/apply").unwrap();
/// assert_eq!(extract_domain(&url), Some("admissions.example.edu".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Checks if a host matches a domain pattern
///
/// `"example.edu"` matches only that host. `"*.example.edu"` matches the bare
/// domain and any subdomain at any depth. Both sides are expected lowercase.
///
/// # Examples
///
/// ```
/// use intent_crawler::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.example.edu", "example.edu"));
/// assert!(matches_wildcard("*.example.edu", "grad.admissions.example.edu"));
/// assert!(!matches_wildcard("*.example.edu", "notexample.edu"));
/// assert!(!matches_wildcard("example.edu", "www.example.edu"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || candidate
                    .strip_suffix(base)
                    .map_or(false, |prefix| prefix.ends_with('.'))
        }
        None => candidate == pattern,
    }
}

/// Returns the wildcard pattern covering a host and all of its subdomains
pub fn subdomain_pattern(host: &str) -> String {
    format!("*.{}", host.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain_ignores_port_and_path() {
        let url = Url::parse("http://127.0.0.1:4010/a/b?c=d").unwrap();
        assert_eq!(extract_domain(&url), Some("127.0.0.1".to_string()));
    }

    #[test]
    fn test_extract_domain_without_host() {
        let url = Url::parse("data:text/plain,hello").unwrap();
        assert_eq!(extract_domain(&url), None);
    }

    #[test]
    fn test_exact_pattern() {
        assert!(matches_wildcard("example.edu", "example.edu"));
        assert!(!matches_wildcard("example.edu", "grad.example.edu"));
        assert!(!matches_wildcard("grad.example.edu", "example.edu"));
    }

    #[test]
    fn test_wildcard_pattern_depths() {
        assert!(matches_wildcard("*.example.edu", "example.edu"));
        assert!(matches_wildcard("*.example.edu", "www.example.edu"));
        assert!(matches_wildcard("*.example.edu", "a.b.c.example.edu"));
    }

    #[test]
    fn test_wildcard_requires_label_boundary() {
        assert!(!matches_wildcard("*.example.edu", "myexample.edu"));
        assert!(!matches_wildcard("*.example.edu", "example.edu.evil.com"));
        assert!(!matches_wildcard("*.example.edu", ""));
    }

    #[test]
    fn test_subdomain_pattern() {
        assert_eq!(subdomain_pattern("Example.EDU"), "*.example.edu");
        assert!(matches_wildcard(&subdomain_pattern("example.edu"), "apply.example.edu"));
    }
}
