//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `RunPhase` / `StopReason`: the run-level state machine
//! - `VisitedRecord`: the one record each attempted URL gets
//! - `DomainState`: per-host slot reservations for the politeness gate
//! - `CrawlState`: frontier, budget and counters for one run

mod crawl_state;
mod domain_state;
mod run_phase;
mod visit;

// Re-export main types
pub use crawl_state::{Budget, CrawlState, VisitCounts};
pub use domain_state::DomainState;
pub use run_phase::{RunPhase, StopReason};
pub use visit::{VisitStatus, VisitedRecord};
