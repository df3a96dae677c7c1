//! Intent profile and its compiler
//!
//! The free-text goal of a run is compiled once into an [`IntentProfile`]
//! (category, keywords, focus phrases, weighted priority signals). Every later
//! stage reads it through an `Arc` and never mutates it.

mod compiler;
mod profile;

pub use compiler::IntentCompiler;
pub use profile::{IntentCategory, IntentProfile};
