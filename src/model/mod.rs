//! Language model judgments
//!
//! [`ModelBackend`] is the transport capability ([`OllamaBackend`] in
//! production, scripted fakes in tests). [`ModelClient`] wraps it with timeout,
//! retry and the single validation boundary. The typed adapters on top
//! ([`RelevanceClassifier`], [`DeepAnalyzer`], and the intent compiler) never
//! fail: when the model is unusable they return a keyword-based
//! [`Verdict::Fallback`].

pub mod analyzer;
pub mod classifier;
pub mod client;
pub mod fallback;
pub mod ollama;
pub mod schema;
mod traits;

pub use analyzer::{AnalysisInput, AnalysisResult, CandidateLink, DeepAnalyzer, MAX_CANDIDATE_LINKS};
pub use classifier::{Classification, RelevanceClassifier};
pub use client::{CallFailure, FallbackCause, ModelClient, Verdict};
pub use ollama::OllamaBackend;
pub use schema::{AnalysisResponse, ClassifierVerdict};
pub use traits::{ModelBackend, ModelError, ModelRequest, ModelRole};
