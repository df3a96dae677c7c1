//! Per-host politeness gate
//!
//! Every fetch first asks the gate for a slot on its host. Slots on one host
//! are handed out at least `interval` apart; a worker whose slot is in the
//! future sleeps until then instead of polling.

use crate::state::DomainState;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum-interval rate limiter keyed by host
#[derive(Debug)]
pub struct DomainGate {
    interval: Duration,
    domains: Mutex<HashMap<String, DomainState>>,
}

impl DomainGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            domains: Mutex::new(HashMap::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until `host` may receive another request
    ///
    /// The slot is reserved before sleeping, so concurrent callers for the
    /// same host line up one interval apart.
    pub async fn wait_turn(&self, host: &str) {
        let wait = {
            let mut domains = self.domains.lock().await;
            domains
                .entry(host.to_string())
                .or_insert_with(DomainState::new)
                .reserve(Instant::now(), self.interval)
        };

        if !wait.is_zero() {
            tracing::debug!(host, wait_ms = wait.as_millis() as u64, "waiting for host slot");
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of requests granted to `host` so far
    pub async fn request_count(&self, host: &str) -> u32 {
        self.domains
            .lock()
            .await
            .get(host)
            .map_or(0, |state| state.request_count)
    }
}
