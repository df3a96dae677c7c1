use std::time::Duration;
use tokio::time::Instant;

/// Tracks the state of a host during crawling
///
/// Holds what the politeness gate needs: how many requests went to the host
/// and the earliest instant the next one may start.
#[derive(Debug, Clone, Default)]
pub struct DomainState {
    /// Number of requests granted to this host in the current run
    pub request_count: u32,

    /// Earliest time the next request may be issued
    pub next_slot: Option<Instant>,
}

impl DomainState {
    /// Creates a new DomainState with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if a request can be made to this host right now
    pub fn can_request(&self, now: Instant) -> bool {
        self.next_slot.map_or(true, |slot| now >= slot)
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now.
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        match self.next_slot {
            Some(slot) if slot > now => Some(slot - now),
            _ => None,
        }
    }

    /// Claims the next request slot and returns how long the caller must wait for it
    ///
    /// Each reservation pushes the following slot `interval` further out, so
    /// concurrent callers for the same host are serialized without polling.
    pub fn reserve(&mut self, now: Instant, interval: Duration) -> Duration {
        let start = match self.next_slot {
            Some(slot) if slot > now => slot,
            _ => now,
        };
        self.next_slot = Some(start + interval);
        self.request_count += 1;
        start - now
    }
}
