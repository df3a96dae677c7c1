//! URL frontier: an indexed priority queue plus the visited log
//!
//! Pending entries live in a binary min-heap keyed by `(priority, enqueued_at)`.
//! A side table maps every pending URL to its heap slot, so re-discovering a
//! queued URL at a better priority updates it in place in O(log n) and a URL
//! is never queued twice.
//!
//! Priorities are numeric with **1 the most urgent and 3 the least**.

use crate::state::{VisitStatus, VisitedRecord};
use crate::url::{normalize_relative, normalize_url, FilterReason, UrlFilter};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use url::Url;

/// Scheduling priority of a frontier entry (1 = most urgent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    High = 1,
    Medium = 2,
    Low = 3,
}

impl Priority {
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Clamps any integer into the 1..=3 range
    pub fn from_rank(rank: i64) -> Self {
        match rank {
            i64::MIN..=1 => Self::High,
            2 => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p.rank()
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::High),
            2 => Ok(Self::Medium),
            3 => Ok(Self::Low),
            other => Err(format!("priority must be 1, 2 or 3, got {}", other)),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rank())
    }
}

/// A pending URL waiting to be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: Url,
    pub depth: u32,
    pub priority: Priority,
    pub discovered_from: Option<Url>,
    /// Monotonic sequence number; breaks ties within a priority band (FIFO)
    pub enqueued_at: u64,
}

impl FrontierEntry {
    fn key(&self) -> (Priority, u64) {
        (self.priority, self.enqueued_at)
    }
}

/// What a push did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// A new entry was queued
    Queued,
    /// An already-pending entry got a better priority
    Improved,
    /// Already pending at the same or a better priority; nothing changed
    Duplicate,
    /// Already attempted in this run
    Visited,
    /// Deeper than the depth budget
    TooDeep,
    /// Refused by the URL filter
    Filtered(FilterReason),
    /// Could not be parsed or normalized
    Invalid,
}

impl PushOutcome {
    /// Returns true if the frontier changed
    pub fn accepted(&self) -> bool {
        matches!(self, Self::Queued | Self::Improved)
    }
}

/// Running counters over everything offered to the frontier
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrontierStats {
    pub added: u64,
    pub improved: u64,
    pub duplicates: u64,
    pub rejected_visited: u64,
    pub rejected_depth: u64,
    pub rejected_filtered: u64,
    pub rejected_invalid: u64,
    /// Entries queued per priority rank
    pub by_priority: BTreeMap<u8, u64>,
    /// Entries queued per depth
    pub by_depth: BTreeMap<u32, u64>,
}

/// Pending URLs plus the record of every URL attempted in this run
#[derive(Debug)]
pub struct Frontier {
    heap: Vec<FrontierEntry>,
    positions: HashMap<String, usize>,
    visited: Vec<VisitedRecord>,
    visited_index: HashMap<String, usize>,
    filter: UrlFilter,
    max_depth: u32,
    next_seq: u64,
    stats: FrontierStats,
}

impl Frontier {
    pub fn new(filter: UrlFilter, max_depth: u32) -> Self {
        Self {
            heap: Vec::new(),
            positions: HashMap::new(),
            visited: Vec::new(),
            visited_index: HashMap::new(),
            filter,
            max_depth,
            next_seq: 0,
            stats: FrontierStats::default(),
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn filter(&self) -> &UrlFilter {
        &self.filter
    }

    /// Offers a URL; returns true if the frontier changed
    ///
    /// Relative URLs are resolved against `discovered_from`.
    pub fn push(
        &mut self,
        url: &str,
        priority: Priority,
        depth: u32,
        discovered_from: Option<&Url>,
    ) -> bool {
        self.offer(url, priority, depth, discovered_from).accepted()
    }

    /// Like [`Frontier::push`] but reports why a URL was or was not queued
    pub fn offer(
        &mut self,
        url: &str,
        priority: Priority,
        depth: u32,
        discovered_from: Option<&Url>,
    ) -> PushOutcome {
        let outcome = self.admit(url, priority, depth, discovered_from);
        match &outcome {
            PushOutcome::Queued => {
                self.stats.added += 1;
                *self.stats.by_priority.entry(priority.rank()).or_default() += 1;
                *self.stats.by_depth.entry(depth).or_default() += 1;
            }
            PushOutcome::Improved => self.stats.improved += 1,
            PushOutcome::Duplicate => self.stats.duplicates += 1,
            PushOutcome::Visited => self.stats.rejected_visited += 1,
            PushOutcome::TooDeep => self.stats.rejected_depth += 1,
            PushOutcome::Filtered(_) => self.stats.rejected_filtered += 1,
            PushOutcome::Invalid => self.stats.rejected_invalid += 1,
        }
        outcome
    }

    fn admit(
        &mut self,
        url: &str,
        priority: Priority,
        depth: u32,
        discovered_from: Option<&Url>,
    ) -> PushOutcome {
        let normalized = match discovered_from {
            Some(base) => normalize_relative(base, url),
            None => normalize_url(url),
        };
        let normalized = match normalized {
            Ok(u) => u,
            Err(e) => {
                tracing::trace!(url, "rejected unparsable url: {}", e);
                return PushOutcome::Invalid;
            }
        };

        let key = normalized.as_str().to_string();
        if self.visited_index.contains_key(&key) {
            return PushOutcome::Visited;
        }
        if depth > self.max_depth {
            return PushOutcome::TooDeep;
        }
        if let Err(reason) = self.filter.check(&normalized) {
            tracing::trace!(url = %normalized, "filtered: {}", reason);
            return PushOutcome::Filtered(reason);
        }

        let entry = FrontierEntry {
            url: normalized,
            depth,
            priority,
            discovered_from: discovered_from.cloned(),
            enqueued_at: self.next_seq,
        };

        if let Some(&pos) = self.positions.get(&key) {
            if priority >= self.heap[pos].priority {
                return PushOutcome::Duplicate;
            }
            self.next_seq += 1;
            self.heap[pos] = entry;
            self.sift_up(pos);
            return PushOutcome::Improved;
        }

        self.next_seq += 1;
        self.heap.push(entry);
        let pos = self.heap.len() - 1;
        self.positions.insert(key, pos);
        self.sift_up(pos);
        PushOutcome::Queued
    }

    /// Removes and returns the most urgent entry (FIFO within a priority)
    pub fn pop(&mut self) -> Option<FrontierEntry> {
        if self.heap.is_empty() {
            return None;
        }
        Some(self.remove_at(0))
    }

    pub fn size(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Returns true if `url` is waiting in the queue
    pub fn is_pending(&self, url: &Url) -> bool {
        self.positions.contains_key(url.as_str())
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        self.visited_index.contains_key(url.as_str())
    }

    /// Records the outcome of an attempted URL
    ///
    /// Returns false (and changes nothing) if the URL already has a record.
    /// A pending entry for the same URL is dropped, since it can never be
    /// attempted again.
    pub fn record_visit(&mut self, record: VisitedRecord) -> bool {
        let key = record.url.as_str().to_string();
        if self.visited_index.contains_key(&key) {
            tracing::warn!(url = %record.url, "visit already recorded, ignoring");
            return false;
        }
        if let Some(&pos) = self.positions.get(&key) {
            self.remove_at(pos);
        }
        self.visited_index.insert(key, self.visited.len());
        self.visited.push(record);
        true
    }

    /// Visit records in the order they were made
    pub fn visited_records(&self) -> &[VisitedRecord] {
        &self.visited
    }

    pub fn visited_count(&self, status: VisitStatus) -> usize {
        self.visited.iter().filter(|r| r.status == status).count()
    }

    /// Pending entries in pop order, without draining the queue
    pub fn pending_entries(&self) -> Vec<FrontierEntry> {
        let mut entries = self.heap.clone();
        entries.sort_by_key(|e| e.key());
        entries
    }

    pub fn stats(&self) -> &FrontierStats {
        &self.stats
    }

    fn remove_at(&mut self, pos: usize) -> FrontierEntry {
        let last = self.heap.len() - 1;
        self.swap(pos, last);
        // `pos` is a valid index here, so the heap is non-empty
        let removed = self.heap.remove(last);
        self.positions.remove(removed.url.as_str());
        if pos < self.heap.len() {
            self.sift_down(pos);
            self.sift_up(pos);
        }
        removed
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.heap.swap(a, b);
        self.positions.insert(self.heap[a].url.as_str().to_string(), a);
        self.positions.insert(self.heap[b].url.as_str().to_string(), b);
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.heap[pos].key() >= self.heap[parent].key() {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < len && self.heap[left].key() < self.heap[smallest].key() {
                smallest = left;
            }
            if right < len && self.heap[right].key() < self.heap[smallest].key() {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.swap(pos, smallest);
            pos = smallest;
        }
    }
}
