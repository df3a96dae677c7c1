//! URL handling module
//!
//! Normalization, host matching, frontier admission filtering and the stable
//! keys that address a URL's artifacts in the layered store.

mod filter;
mod host;
mod normalize;

pub use filter::{FilterReason, UrlFilter};
pub use host::{extract_domain, matches_wildcard, subdomain_pattern};
pub use normalize::{normalize_relative, normalize_url};

use sha2::{Digest, Sha256};
use url::Url;

/// Stable store key for a normalized URL
///
/// The key is the hex SHA-256 of the normalized URL string, so the same URL
/// always maps to the same key across runs and across store layers.
///
/// # Examples
///
/// ```
/// use intent_crawler::url::{normalize_url, url_key};
///
/// let a = normalize_url("https://example.edu/apply/").unwrap();
/// let b = normalize_url("https://EXAMPLE.edu/apply#form").unwrap();
/// assert_eq!(url_key(&a), url_key(&b));
/// assert_eq!(url_key(&a).len(), 64);
/// ```
pub fn url_key(url: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_str().as_bytes());
    hex::encode(hasher.finalize())
}
