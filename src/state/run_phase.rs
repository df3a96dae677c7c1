/// Run-level state machine for one crawl
///
/// A run moves `Idle -> Running -> {Completed, Aborted}` exactly once.
use std::fmt;

/// Represents the current phase of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    /// Created from configuration, nothing fetched yet
    Idle,

    /// The main loop is pulling from the frontier
    Running,

    // ===== Terminal States =====
    /// Stopped by budget, frontier exhaustion or interrupt
    Completed,

    /// Stopped by an unrecoverable external failure
    Aborted,
}

impl RunPhase {
    /// Returns true if the run can no longer change phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Checks whether moving to `next` is a legal transition
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Aborted)
        )
    }

    /// Converts the phase to its ledger string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }

    /// Parses a phase from its ledger string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Why a run left the `Running` phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// `max-pages` pages were processed
    BudgetExhausted,
    /// Nothing left to pop
    FrontierExhausted,
    /// The user cancelled the run
    Interrupted,
    /// External backends stayed unreachable
    FatalExternal,
}

impl StopReason {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::BudgetExhausted => "budget_exhausted",
            Self::FrontierExhausted => "frontier_exhausted",
            Self::Interrupted => "interrupted",
            Self::FatalExternal => "fatal_external",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "budget_exhausted" => Some(Self::BudgetExhausted),
            "frontier_exhausted" => Some(Self::FrontierExhausted),
            "interrupted" => Some(Self::Interrupted),
            "fatal_external" => Some(Self::FatalExternal),
            _ => None,
        }
    }

    /// The terminal phase a run ends in for this reason
    pub fn final_phase(&self) -> RunPhase {
        match self {
            Self::FatalExternal => RunPhase::Aborted,
            _ => RunPhase::Completed,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
