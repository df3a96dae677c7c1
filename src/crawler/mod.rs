//! Crawler module for page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The priority frontier and visited log
//! - HTTP and headless-browser fetching behind one [`Fetcher`] capability
//! - HTML extraction of text, links, contacts and metadata
//! - Per-host politeness
//! - The per-page pipeline and the orchestrating crawl loop

mod browser;
mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod pipeline;
mod scheduler;

pub use browser::BrowserFetcher;
pub use coordinator::{
    build_orchestrator, run_crawl, Collaborators, CrawlSettings, Orchestrator, RunReport,
};
pub use fetcher::{build_http_client, FetchError, FetchErrorReason, FetchedPage, Fetcher, HttpFetcher};
pub use frontier::{Frontier, FrontierEntry, FrontierStats, Priority, PushOutcome};
pub use parser::{ExtractError, ExtractedPage, Extractor, HtmlExtractor, PageMetadata, RawLink};
pub use pipeline::{ExternalHealth, PageDocument, PageOutcome, PagePipeline, UrlClaims};
pub use scheduler::DomainGate;
