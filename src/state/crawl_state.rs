use crate::crawler::Frontier;
use crate::state::{RunPhase, StopReason, VisitStatus, VisitedRecord};
use crate::CrawlerError;
use chrono::{DateTime, Utc};

/// Page and depth limits for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub max_pages: u32,
    pub max_depth: u32,
}

/// Success / failure / skip tallies over the visited log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisitCounts {
    pub success: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl VisitCounts {
    pub fn total(&self) -> u32 {
        self.success + self.failed + self.skipped
    }
}

/// Everything a run mutates while it crawls
///
/// Owned by the orchestrator and passed by reference; there is no global
/// crawl state, so independent runs can share a process.
#[derive(Debug)]
pub struct CrawlState {
    pub frontier: Frontier,
    pub budget: Budget,
    pub pages_processed: u32,
    pub started_at: DateTime<Utc>,
    phase: RunPhase,
    stop_reason: Option<StopReason>,
    counts: VisitCounts,
}

impl CrawlState {
    pub fn new(frontier: Frontier, budget: Budget) -> Self {
        Self {
            frontier,
            budget,
            pages_processed: 0,
            started_at: Utc::now(),
            phase: RunPhase::Idle,
            stop_reason: None,
            counts: VisitCounts::default(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn counts(&self) -> VisitCounts {
        self.counts
    }

    /// Moves the run to `next`, rejecting illegal transitions
    pub fn transition(&mut self, next: RunPhase) -> Result<(), CrawlerError> {
        if !self.phase.can_transition_to(next) {
            return Err(CrawlerError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!(from = %self.phase, to = %next, "run phase change");
        self.phase = next;
        Ok(())
    }

    /// Ends the run for `reason`, entering the matching terminal phase
    pub fn finish(&mut self, reason: StopReason) -> Result<(), CrawlerError> {
        self.transition(reason.final_phase())?;
        self.stop_reason = Some(reason);
        Ok(())
    }

    pub fn budget_exhausted(&self) -> bool {
        self.pages_processed >= self.budget.max_pages
    }

    pub fn remaining_budget(&self) -> u32 {
        self.budget.max_pages.saturating_sub(self.pages_processed)
    }

    /// Records an attempted page and charges it against the page budget
    ///
    /// Returns false if the URL already had a record; the budget is not
    /// charged twice for it.
    pub fn record(&mut self, record: VisitedRecord) -> bool {
        let status = record.status;
        if !self.frontier.record_visit(record) {
            return false;
        }
        self.pages_processed += 1;
        match status {
            VisitStatus::Success => self.counts.success += 1,
            VisitStatus::Failed => self.counts.failed += 1,
            VisitStatus::Skipped => self.counts.skipped += 1,
        }
        true
    }
}
