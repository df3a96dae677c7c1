//! HTML extraction: readable text, links, contacts and metadata
//!
//! This module turns fetched markup into the pieces the pipeline needs:
//! - Page title (`<title>`, falling back to the first `<h1>`)
//! - Main text with boilerplate (`nav`, `header`, `footer`, scripts) removed
//!   and a blank line between block elements
//! - Outbound links, resolved and normalized, with their anchor text
//! - Contact tokens (`mailto:`/`tel:` links, emails and phone numbers in text)
//! - Description, canonical URL and document language

use crate::url::normalize_relative;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;
use url::Url;

const MAX_EMAILS: usize = 20;
const MAX_PHONES: usize = 10;

/// Elements whose content is never part of the readable text
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "header", "footer", "svg", "iframe",
];

/// Elements that start a new paragraph in the extracted text
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "main", "aside", "blockquote", "pre", "ul", "ol", "li",
    "dl", "dt", "dd", "table", "tr", "td", "th", "h1", "h2", "h3", "h4", "h5", "h6", "br",
    "form", "figure", "figcaption", "address",
];

/// A link found on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLink {
    /// Absolute, normalized target
    pub url: String,
    pub anchor_text: String,
}

/// Structured metadata from the document head
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub description: Option<String>,
    pub canonical: Option<String>,
    pub language: Option<String>,
}

/// Everything extracted from one page's markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub text: String,
    pub links: Vec<RawLink>,
    pub contacts: BTreeSet<String>,
    pub metadata: PageMetadata,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("page has no readable text")]
    EmptyContent,

    #[error("invalid extraction pattern: {0}")]
    Pattern(String),
}

/// Capability to turn markup into an [`ExtractedPage`]
pub trait Extractor: Send + Sync {
    fn extract(&self, markup: &str, url: &Url) -> Result<ExtractedPage, ExtractError>;
}

/// Extractor backed by `scraper`
pub struct HtmlExtractor {
    title: Selector,
    h1: Selector,
    body: Selector,
    anchors: Selector,
    description: Selector,
    canonical: Selector,
    html: Selector,
    email: Regex,
    phones: Vec<Regex>,
}

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Pattern(format!("{}: {:?}", css, e)))
}

fn regex(pattern: &str) -> Result<Regex, ExtractError> {
    Regex::new(pattern).map_err(|e| ExtractError::Pattern(e.to_string()))
}

impl HtmlExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        Ok(Self {
            title: selector("title")?,
            h1: selector("h1")?,
            body: selector("body")?,
            anchors: selector("a[href]")?,
            description: selector("meta[name='description'][content]")?,
            canonical: selector("link[rel='canonical'][href]")?,
            html: selector("html[lang]")?,
            email: regex(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")?,
            phones: vec![
                regex(r"\b\d{3}[-.\s]?\d{3}[-.\s]?\d{4}\b")?,
                regex(r"\+?\d{1,3}[-.\s]?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b")?,
            ],
        })
    }

    fn extract_title(&self, document: &Html) -> Option<String> {
        document
            .select(&self.title)
            .next()
            .or_else(|| document.select(&self.h1).next())
            .map(|element| collapse_whitespace(&element.text().collect::<String>()))
            .filter(|s| !s.is_empty())
    }

    fn extract_text(&self, document: &Html) -> String {
        let root = document
            .select(&self.body)
            .next()
            .unwrap_or_else(|| document.root_element());
        let mut collector = TextCollector::default();
        collector.walk(root);
        collector.finish()
    }

    /// Collects links and `mailto:`/`tel:` contacts
    fn extract_links(
        &self,
        document: &Html,
        base_url: &Url,
        contacts: &mut BTreeSet<String>,
    ) -> Vec<RawLink> {
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for element in document.select(&self.anchors) {
            // Skip if it has the download attribute
            if element.value().attr("download").is_some() {
                continue;
            }
            let Some(href) = element.value().attr("href").map(str::trim) else {
                continue;
            };

            let lower = href.to_ascii_lowercase();
            if let Some(rest) = lower.strip_prefix("mailto:") {
                let address = rest.split('?').next().unwrap_or_default().trim();
                if !address.is_empty() {
                    contacts.insert(address.to_string());
                }
                continue;
            }
            if lower.starts_with("tel:") {
                let number = href[4..].trim();
                if !number.is_empty() {
                    contacts.insert(number.to_string());
                }
                continue;
            }
            if href.is_empty()
                || href.starts_with('#')
                || lower.starts_with("javascript:")
                || lower.starts_with("data:")
            {
                continue;
            }

            let Ok(url) = normalize_relative(base_url, href) else {
                continue;
            };
            if seen.insert(url.as_str().to_string()) {
                links.push(RawLink {
                    url: url.to_string(),
                    anchor_text: collapse_whitespace(&element.text().collect::<String>()),
                });
            }
        }

        links
    }

    fn extract_text_contacts(&self, text: &str, contacts: &mut BTreeSet<String>) {
        for m in self.email.find_iter(text).take(MAX_EMAILS) {
            contacts.insert(m.as_str().to_lowercase());
        }

        let mut phones = BTreeSet::new();
        for pattern in &self.phones {
            for m in pattern.find_iter(text) {
                if phones.len() >= MAX_PHONES {
                    break;
                }
                phones.insert(m.as_str().trim().to_string());
            }
        }
        contacts.extend(phones);
    }

    fn extract_metadata(&self, document: &Html, base_url: &Url) -> PageMetadata {
        let description = document
            .select(&self.description)
            .next()
            .and_then(|e| e.value().attr("content"))
            .map(collapse_whitespace)
            .filter(|s| !s.is_empty());
        let canonical = document
            .select(&self.canonical)
            .next()
            .and_then(|e| e.value().attr("href"))
            .and_then(|href| normalize_relative(base_url, href).ok())
            .map(|u| u.to_string());
        let language = document
            .select(&self.html)
            .next()
            .and_then(|e| e.value().attr("lang"))
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());

        PageMetadata {
            description,
            canonical,
            language,
        }
    }
}

impl Extractor for HtmlExtractor {
    fn extract(&self, markup: &str, url: &Url) -> Result<ExtractedPage, ExtractError> {
        let document = Html::parse_document(markup);

        let text = self.extract_text(&document);
        if text.is_empty() {
            return Err(ExtractError::EmptyContent);
        }

        let mut contacts = BTreeSet::new();
        let links = self.extract_links(&document, url, &mut contacts);
        self.extract_text_contacts(&text, &mut contacts);

        Ok(ExtractedPage {
            title: self.extract_title(&document),
            links,
            contacts,
            metadata: self.extract_metadata(&document, url),
            text,
        })
    }
}

/// Accumulates text into paragraphs while walking the DOM
#[derive(Default)]
struct TextCollector {
    paragraphs: Vec<String>,
    current: String,
}

impl TextCollector {
    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.current.push_str(text),
                Node::Element(e) => {
                    let name = e.name();
                    if SKIPPED_ELEMENTS.contains(&name) {
                        continue;
                    }
                    let Some(child_element) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let is_block = BLOCK_ELEMENTS.contains(&name);
                    if is_block {
                        self.break_paragraph();
                    }
                    self.walk(child_element);
                    if is_block {
                        self.break_paragraph();
                    }
                }
                _ => {}
            }
        }
    }

    fn break_paragraph(&mut self) {
        let paragraph = collapse_whitespace(&self.current);
        if !paragraph.is_empty() {
            self.paragraphs.push(paragraph);
        }
        self.current.clear();
    }

    fn finish(mut self) -> String {
        self.break_paragraph();
        self.paragraphs.join("\n\n")
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
